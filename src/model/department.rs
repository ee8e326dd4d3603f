use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Department {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = "Finance")]
    pub name: String,
    #[schema(nullable = true)]
    pub description: Option<String>,
    /// Employee heading the department
    #[schema(example = 12, nullable = true)]
    pub head_id: Option<u64>,
    #[schema(example = 250000.0)]
    pub budget: f64,
}

/// Slim member row used when listing a department by role
#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct DepartmentMember {
    pub id: u64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: String,
}
