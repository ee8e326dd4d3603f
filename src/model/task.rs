use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskStatus {
    Open,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ResponseKind {
    Text,
    Document,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Task {
    pub id: u64,
    #[schema(example = "Prepare Q2 KRA review")]
    pub title: String,
    pub description: Option<String>,
    pub assigned_to: u64,
    pub assigned_by: u64,
    pub project_id: Option<u64>,
    #[schema(value_type = String, format = "date")]
    pub due_date: NaiveDate,
    #[schema(value_type = Option<String>, example = "17:00:00")]
    pub due_time: Option<NaiveTime>,
    #[schema(example = "high")]
    pub priority: String,
    #[schema(example = "open")]
    pub status: String,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct TaskResponse {
    pub id: u64,
    pub task_id: u64,
    pub employee_id: u64,
    #[schema(example = "text")]
    pub kind: String,
    pub message: Option<String>,
    pub document_url: Option<String>,
    #[schema(example = "pending")]
    pub review_status: String,
    pub reviewer_id: Option<u64>,
    pub review_note: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub reviewed_at: Option<DateTime<Utc>>,
}

/// A text response needs a message, a document response needs a url
pub fn response_payload_is_complete(
    kind: ResponseKind,
    message: Option<&str>,
    document_url: Option<&str>,
) -> bool {
    let filled = |v: Option<&str>| v.is_some_and(|s| !s.trim().is_empty());
    match kind {
        ResponseKind::Text => filled(message),
        ResponseKind::Document => filled(document_url),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_response_needs_message() {
        assert!(response_payload_is_complete(ResponseKind::Text, Some("done"), None));
        assert!(!response_payload_is_complete(ResponseKind::Text, Some("  "), None));
        assert!(!response_payload_is_complete(
            ResponseKind::Text,
            None,
            Some("https://cdn/x.pdf")
        ));
    }

    #[test]
    fn document_response_needs_url() {
        assert!(response_payload_is_complete(
            ResponseKind::Document,
            None,
            Some("https://cdn/x.pdf")
        ));
        assert!(!response_payload_is_complete(ResponseKind::Document, Some("see attached"), None));
    }

    #[test]
    fn status_names() {
        assert_eq!(TaskStatus::InProgress.as_ref(), "in_progress");
        assert_eq!("urgent".parse::<TaskPriority>().unwrap(), TaskPriority::Urgent);
    }
}
