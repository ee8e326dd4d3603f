use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Payroll {
    pub id: u64,
    pub employee_id: u64,
    #[schema(value_type = String, format = "date")]
    pub month: NaiveDate,
    pub base_salary: f64,
    pub bonus: f64,
    pub deductions: f64,
    pub net_salary: f64,
}

pub fn net_salary(base_salary: f64, bonus: f64, deductions: f64) -> f64 {
    base_salary + bonus - deductions
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PeriodStatus {
    Open,
    Processing,
    Closed,
}

/// A payroll month window. At most one period is active at a time.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct PayrollPeriod {
    pub id: u64,
    #[schema(example = 3)]
    pub month: u8,
    #[schema(example = 2026)]
    pub year: u16,
    pub is_active: bool,
    #[schema(example = "open")]
    pub status: String,
}

impl PayrollPeriod {
    /// First day of the period, matching `payroll.month`
    pub fn first_day(month: u8, year: u16) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(year as i32, month as u32, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn net_is_base_plus_bonus_minus_deductions() {
        assert_eq!(net_salary(50_000.0, 5_000.0, 2_000.0), 53_000.0);
        assert_eq!(net_salary(1_000.0, 0.0, 1_500.0), -500.0);
    }

    #[test]
    fn first_day_rejects_bad_months() {
        assert_eq!(
            PayrollPeriod::first_day(2, 2026),
            NaiveDate::from_ymd_opt(2026, 2, 1)
        );
        assert_eq!(PayrollPeriod::first_day(0, 2026), None);
        assert_eq!(PayrollPeriod::first_day(13, 2026), None);
    }

    #[test]
    fn period_status_parses() {
        assert_eq!("closed".parse::<PeriodStatus>().unwrap(), PeriodStatus::Closed);
        assert_eq!(PeriodStatus::Processing.as_ref(), "processing");
    }
}
