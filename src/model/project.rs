use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProjectStatus {
    Planned,
    Active,
    OnHold,
    Completed,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Project {
    pub id: u64,
    #[schema(example = "Payroll migration")]
    pub name: String,
    pub scope: Option<String>,
    #[schema(value_type = String, format = "date")]
    pub start_date: NaiveDate,
    #[schema(value_type = Option<String>, format = "date")]
    pub end_date: Option<NaiveDate>,
    #[schema(example = "active")]
    pub status: String,
    /// Percent complete, 0..=100
    #[schema(example = 40)]
    pub completion: u8,
    pub budget: f64,
    pub spent: f64,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct ProjectMember {
    pub employee_id: u64,
    #[schema(example = "lead")]
    pub role: String,
}

/// Remaining budget; negative when overspent
pub fn remaining_budget(budget: f64, spent: f64) -> f64 {
    budget - spent
}

pub fn valid_completion(value: u8) -> bool {
    value <= 100
}

pub fn valid_dates(start: NaiveDate, end: Option<NaiveDate>) -> bool {
    end.is_none_or(|end| end >= start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_bounds() {
        assert!(valid_completion(0));
        assert!(valid_completion(100));
        assert!(!valid_completion(101));
    }

    #[test]
    fn end_date_not_before_start() {
        let d = |day| NaiveDate::from_ymd_opt(2026, 5, day).unwrap();
        assert!(valid_dates(d(1), None));
        assert!(valid_dates(d(1), Some(d(1))));
        assert!(!valid_dates(d(2), Some(d(1))));
    }

    #[test]
    fn status_wire_names() {
        assert_eq!(ProjectStatus::OnHold.as_ref(), "on_hold");
        assert_eq!("on_hold".parse::<ProjectStatus>().unwrap(), ProjectStatus::OnHold);
        assert_eq!(remaining_budget(100.0, 120.0), -20.0);
    }
}
