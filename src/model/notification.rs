use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Notification {
    pub id: u64,
    pub employee_id: u64,
    #[schema(example = "New task assigned")]
    pub title: String,
    pub message: String,
    /// Frontend route the notification points at
    #[schema(example = "/tasks/14")]
    pub link: Option<String>,
    pub is_read: bool,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}
