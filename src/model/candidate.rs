use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

/// Recruitment pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Stage {
    Applied,
    Screening,
    Interview,
    Offered,
    Hired,
    Rejected,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Hired | Stage::Rejected)
    }

    fn next(self) -> Option<Stage> {
        match self {
            Stage::Applied => Some(Stage::Screening),
            Stage::Screening => Some(Stage::Interview),
            Stage::Interview => Some(Stage::Offered),
            Stage::Offered => Some(Stage::Hired),
            Stage::Hired | Stage::Rejected => None,
        }
    }

    /// Candidates move one step forward, or get rejected from any open stage
    pub fn can_move_to(self, to: Stage) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == Stage::Rejected || self.next() == Some(to)
    }
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Candidate {
    pub id: u64,
    #[schema(example = "Ada Lovelace")]
    pub name: String,
    #[schema(example = "ada@example.com")]
    pub email: String,
    pub phone: Option<String>,
    #[schema(example = "Backend Engineer")]
    pub position: String,
    pub resume_url: Option<String>,
    #[schema(example = "screening")]
    pub stage: String,
    pub notes: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_one_step_only() {
        assert!(Stage::Applied.can_move_to(Stage::Screening));
        assert!(Stage::Offered.can_move_to(Stage::Hired));
        assert!(!Stage::Applied.can_move_to(Stage::Interview));
        assert!(!Stage::Interview.can_move_to(Stage::Screening));
        assert!(!Stage::Screening.can_move_to(Stage::Screening));
    }

    #[test]
    fn rejection_from_open_stages() {
        for stage in [Stage::Applied, Stage::Screening, Stage::Interview, Stage::Offered] {
            assert!(stage.can_move_to(Stage::Rejected), "{stage} -> rejected");
        }
    }

    #[test]
    fn terminal_stages_are_final() {
        assert!(!Stage::Hired.can_move_to(Stage::Rejected));
        assert!(!Stage::Rejected.can_move_to(Stage::Applied));
        assert!(!Stage::Rejected.can_move_to(Stage::Screening));
    }
}
