use chrono::{Duration, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Late,
    Absent,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct AttendanceRecord {
    pub id: u64,
    pub employee_id: u64,
    #[schema(value_type = String, format = "date", example = "2026-03-02")]
    pub date: NaiveDate,
    #[schema(value_type = Option<String>, example = "09:02:11")]
    pub check_in: Option<NaiveTime>,
    #[schema(value_type = Option<String>, example = "17:45:00")]
    pub check_out: Option<NaiveTime>,
    #[schema(example = 8.72)]
    pub hours: Option<f64>,
    #[schema(example = "present")]
    pub status: String,
}

#[derive(Debug, Serialize, PartialEq, ToSchema)]
pub struct AttendanceSummary {
    /// Number of records the percentage was computed over (at most 30)
    pub records: usize,
    pub present: usize,
    pub late: usize,
    pub absent: usize,
    /// Share of present or late days, rounded to the nearest integer
    pub percentage: u32,
}

/// Window used for the attendance percentage
pub const SUMMARY_WINDOW: usize = 30;

impl AttendanceSummary {
    /// Summarizes the most recent records. Divides by the records actually
    /// available, not by the window size.
    pub fn from_statuses<'a, I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut summary = AttendanceSummary {
            records: 0,
            present: 0,
            late: 0,
            absent: 0,
            percentage: 0,
        };

        for status in statuses.into_iter().take(SUMMARY_WINDOW) {
            summary.records += 1;
            match status.parse::<AttendanceStatus>() {
                Ok(AttendanceStatus::Present) => summary.present += 1,
                Ok(AttendanceStatus::Late) => summary.late += 1,
                _ => summary.absent += 1,
            }
        }

        if summary.records > 0 {
            let attended = (summary.present + summary.late) as f64;
            summary.percentage = (attended * 100.0 / summary.records as f64).round() as u32;
        }

        summary
    }
}

/// Status for a punch-in at `at`
pub fn punch_in_status(at: NaiveTime, late_after: NaiveTime) -> AttendanceStatus {
    if at > late_after {
        AttendanceStatus::Late
    } else {
        AttendanceStatus::Present
    }
}

/// Hours between punch-in and punch-out, two decimals. A punch-out earlier
/// than the punch-in is treated as crossing midnight.
pub fn worked_hours(check_in: NaiveTime, check_out: NaiveTime) -> f64 {
    let mut span = check_out.signed_duration_since(check_in);
    if span < Duration::zero() {
        span += Duration::hours(24);
    }
    let hours = span.num_seconds() as f64 / 3600.0;
    (hours * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn percentage_uses_available_records() {
        // 4 of 6 attended => 66.67 => 67, not 4/30
        let s = AttendanceSummary::from_statuses(
            ["present", "late", "absent", "present", "absent", "late"].into_iter(),
        );
        assert_eq!(s.records, 6);
        assert_eq!(s.present, 2);
        assert_eq!(s.late, 2);
        assert_eq!(s.absent, 2);
        assert_eq!(s.percentage, 67);
    }

    #[test]
    fn percentage_rounds_half_up() {
        // 1 of 8 => 12.5 => 13
        let mut statuses = vec!["absent"; 7];
        statuses.push("present");
        let s = AttendanceSummary::from_statuses(statuses);
        assert_eq!(s.percentage, 13);
    }

    #[test]
    fn only_last_thirty_records_count() {
        let mut statuses = vec!["present"; 30];
        statuses.extend(vec!["absent"; 10]);
        let s = AttendanceSummary::from_statuses(statuses);
        assert_eq!(s.records, 30);
        assert_eq!(s.percentage, 100);
    }

    #[test]
    fn no_records_means_zero() {
        let s = AttendanceSummary::from_statuses(Vec::<&str>::new());
        assert_eq!(s.records, 0);
        assert_eq!(s.percentage, 0);
    }

    #[test]
    fn late_after_threshold() {
        assert_eq!(punch_in_status(t(9, 15), t(9, 15)), AttendanceStatus::Present);
        assert_eq!(punch_in_status(t(9, 16), t(9, 15)), AttendanceStatus::Late);
        assert_eq!(punch_in_status(t(8, 0), t(9, 15)), AttendanceStatus::Present);
    }

    #[test]
    fn hours_between_punches() {
        assert_eq!(worked_hours(t(9, 0), t(17, 30)), 8.5);
        assert_eq!(worked_hours(t(9, 0), t(9, 20)), 0.33);
        assert_eq!(worked_hours(t(22, 0), t(6, 0)), 8.0);
    }
}
