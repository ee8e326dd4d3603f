use crate::{
    api::{created, done, ok},
    auth::user::AuthUser,
    error::{AppError, AppResult},
    model::project::{
        Project, ProjectMember, ProjectStatus, remaining_budget, valid_completion, valid_dates,
    },
    utils::{
        db_utils::{build_update_sql, execute_update},
        pagination::{PageWindow, Paginated},
        validation::require_non_empty,
    },
};
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::MySqlPool;
use std::collections::HashSet;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

const UPDATABLE_COLUMNS: &[&str] = &[
    "name",
    "scope",
    "start_date",
    "end_date",
    "status",
    "completion",
    "budget",
    "spent",
];

const PROJECT_COLUMNS: &str =
    "id, name, scope, start_date, end_date, status, completion, budget, spent, created_at";

#[derive(Deserialize, ToSchema)]
pub struct CreateProject {
    #[schema(example = "Payroll migration")]
    pub name: String,
    pub scope: Option<String>,
    #[schema(value_type = String, format = "date", example = "2026-04-01")]
    pub start_date: NaiveDate,
    #[schema(value_type = Option<String>, format = "date", example = "2026-09-30")]
    pub end_date: Option<NaiveDate>,
    pub status: Option<ProjectStatus>,
    #[schema(example = 0)]
    pub completion: Option<u8>,
    #[schema(example = 120000.0)]
    pub budget: Option<f64>,
    #[serde(default)]
    pub department_ids: Vec<u64>,
    #[serde(default)]
    pub members: Vec<ProjectMember>,
}

impl CreateProject {
    fn validate(&self) -> AppResult<()> {
        require_non_empty("name", &self.name)?;
        if !valid_dates(self.start_date, self.end_date) {
            return Err(AppError::bad_request("end_date cannot be before start_date"));
        }
        if self.completion.is_some_and(|c| !valid_completion(c)) {
            return Err(AppError::bad_request("completion must be between 0 and 100"));
        }
        if self.budget.is_some_and(|b| b < 0.0) {
            return Err(AppError::bad_request("budget cannot be negative"));
        }
        check_members(&self.members)
    }
}

#[derive(Deserialize, ToSchema)]
pub struct ReplaceMembers {
    pub members: Vec<ProjectMember>,
}

#[derive(Deserialize, IntoParams)]
pub struct ProjectQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    /// planned, active, on_hold or completed
    pub status: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct ProjectDetail {
    #[serde(flatten)]
    pub project: Project,
    pub remaining_budget: f64,
    pub members: Vec<ProjectMember>,
    pub department_ids: Vec<u64>,
}

fn check_members(members: &[ProjectMember]) -> AppResult<()> {
    let mut seen = HashSet::new();
    for m in members {
        if !seen.insert(m.employee_id) {
            return Err(AppError::bad_request(format!(
                "employee {} listed more than once",
                m.employee_id
            )));
        }
        require_non_empty("role", &m.role)?;
    }
    Ok(())
}

fn validate_update(body: &Value) -> AppResult<()> {
    if let Some(v) = body.get("completion") {
        let valid = v.as_u64().is_some_and(|c| c <= 100);
        if !valid {
            return Err(AppError::bad_request("completion must be between 0 and 100"));
        }
    }
    if let Some(v) = body.get("status") {
        let valid = v.as_str().is_some_and(|s| s.parse::<ProjectStatus>().is_ok());
        if !valid {
            return Err(AppError::bad_request(
                "status must be one of planned, active, on_hold, completed",
            ));
        }
    }
    if let Some(v) = body.get("name") {
        require_non_empty("name", v.as_str().unwrap_or_default())?;
    }
    Ok(())
}

async fn fetch_project(pool: &MySqlPool, project_id: u64) -> AppResult<Project> {
    sqlx::query_as::<_, Project>(&format!(
        "SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?"
    ))
    .bind(project_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("Project not found"))
}

#[utoipa::path(
    get,
    path = "/api/projects",
    params(ProjectQuery),
    responses((status = 200, description = "Paginated projects", body = Object)),
    security(("bearer_auth" = [])),
    tag = "Project"
)]
pub async fn list_projects(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<ProjectQuery>,
) -> AppResult<HttpResponse> {
    let window = PageWindow::new(query.page, query.per_page, 20);

    let status = match query.status.as_deref() {
        Some(s) => Some(
            s.parse::<ProjectStatus>()
                .map_err(|_| AppError::bad_request(format!("Unknown project status '{s}'")))?,
        ),
        None => None,
    };
    let filter = if status.is_some() { "WHERE status = ?" } else { "" };

    let count_sql = format!("SELECT COUNT(*) FROM projects {filter}");
    let mut count = sqlx::query_scalar::<_, i64>(&count_sql);
    if let Some(s) = status {
        count = count.bind(s.as_ref().to_string());
    }
    let total = count.fetch_one(pool.get_ref()).await?;

    let data_sql =
        format!("SELECT {PROJECT_COLUMNS} FROM projects {filter} ORDER BY created_at DESC LIMIT ? OFFSET ?");
    let mut data = sqlx::query_as::<_, Project>(&data_sql);
    if let Some(s) = status {
        data = data.bind(s.as_ref().to_string());
    }
    let projects = data
        .bind(window.limit())
        .bind(window.offset())
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(Paginated::new(projects, window, total)))
}

#[utoipa::path(
    get,
    path = "/api/projects/{project_id}",
    params(("project_id" = u64, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Project with members and departments", body = ProjectDetail),
        (status = 404, description = "Project not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Project"
)]
pub async fn get_project(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let project_id = path.into_inner();
    let project = fetch_project(pool.get_ref(), project_id).await?;

    let members = sqlx::query_as::<_, ProjectMember>(
        "SELECT employee_id, role FROM project_members WHERE project_id = ? ORDER BY employee_id",
    )
    .bind(project_id)
    .fetch_all(pool.get_ref())
    .await?;

    let department_ids = sqlx::query_scalar::<_, u64>(
        "SELECT department_id FROM project_departments WHERE project_id = ? ORDER BY department_id",
    )
    .bind(project_id)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(ok(ProjectDetail {
        remaining_budget: remaining_budget(project.budget, project.spent),
        project,
        members,
        department_ids,
    }))
}

#[utoipa::path(
    post,
    path = "/api/projects",
    request_body = CreateProject,
    responses(
        (status = 201, description = "Project created"),
        (status = 400, description = "Validation failed")
    ),
    security(("bearer_auth" = [])),
    tag = "Project"
)]
pub async fn create_project(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateProject>,
) -> AppResult<HttpResponse> {
    auth.require_manager_or_above()?;
    payload.validate()?;

    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        INSERT INTO projects (name, scope, start_date, end_date, status, completion, budget)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.name.trim())
    .bind(&payload.scope)
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(payload.status.unwrap_or(ProjectStatus::Planned).as_ref())
    .bind(payload.completion.unwrap_or(0))
    .bind(payload.budget.unwrap_or(0.0))
    .execute(&mut *tx)
    .await?;

    let project_id = result.last_insert_id();

    for department_id in payload.department_ids.iter().collect::<HashSet<_>>() {
        sqlx::query("INSERT INTO project_departments (project_id, department_id) VALUES (?, ?)")
            .bind(project_id)
            .bind(*department_id)
            .execute(&mut *tx)
            .await?;
    }

    for member in &payload.members {
        sqlx::query("INSERT INTO project_members (project_id, employee_id, role) VALUES (?, ?, ?)")
            .bind(project_id)
            .bind(member.employee_id)
            .bind(member.role.trim())
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    info!(project_id, by = auth.user_id, "Project created");
    Ok(created("Project created", project_id))
}

#[utoipa::path(
    put,
    path = "/api/projects/{project_id}",
    params(("project_id" = u64, Path, description = "Project ID")),
    request_body(content = Object, description = "Any subset of the project fields"),
    responses(
        (status = 200, description = "Project updated"),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Project not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Project"
)]
pub async fn update_project(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> AppResult<HttpResponse> {
    auth.require_manager_or_above()?;
    let project_id = path.into_inner();
    validate_update(&body)?;

    let current = fetch_project(pool.get_ref(), project_id).await?;

    // dates are checked against the stored values when only one side changes
    let date_of = |key: &str| -> AppResult<Option<NaiveDate>> {
        match body.get(key) {
            None => Ok(None),
            Some(Value::Null) => Ok(None),
            Some(v) => v
                .as_str()
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
                .map(Some)
                .ok_or_else(|| AppError::bad_request(format!("{key} must be YYYY-MM-DD"))),
        }
    };
    let start = date_of("start_date")?.unwrap_or(current.start_date);
    let end = if body.get("end_date").is_some() {
        date_of("end_date")?
    } else {
        current.end_date
    };
    if !valid_dates(start, end) {
        return Err(AppError::bad_request("end_date cannot be before start_date"));
    }

    let update = build_update_sql("projects", &body, UPDATABLE_COLUMNS, "id", project_id)?;
    execute_update(pool.get_ref(), update).await?;

    Ok(done("Project updated"))
}

#[utoipa::path(
    delete,
    path = "/api/projects/{project_id}",
    params(("project_id" = u64, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Project deleted"),
        (status = 404, description = "Project not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Project"
)]
pub async fn delete_project(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let project_id = path.into_inner();

    let mut tx = pool.begin().await?;

    let result = sqlx::query("DELETE FROM projects WHERE id = ?")
        .bind(project_id)
        .execute(&mut *tx)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Project not found"));
    }

    sqlx::query("DELETE FROM project_members WHERE project_id = ?")
        .bind(project_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM project_departments WHERE project_id = ?")
        .bind(project_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE tasks SET project_id = NULL WHERE project_id = ?")
        .bind(project_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    info!(project_id, by = auth.user_id, "Project deleted");
    Ok(done("Project deleted"))
}

#[utoipa::path(
    put,
    path = "/api/projects/{project_id}/members",
    params(("project_id" = u64, Path, description = "Project ID")),
    request_body = ReplaceMembers,
    responses(
        (status = 200, description = "Member list replaced"),
        (status = 404, description = "Project not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Project"
)]
pub async fn replace_members(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<ReplaceMembers>,
) -> AppResult<HttpResponse> {
    auth.require_manager_or_above()?;
    let project_id = path.into_inner();
    check_members(&payload.members)?;
    fetch_project(pool.get_ref(), project_id).await?;

    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM project_members WHERE project_id = ?")
        .bind(project_id)
        .execute(&mut *tx)
        .await?;

    for member in &payload.members {
        sqlx::query("INSERT INTO project_members (project_id, employee_id, role) VALUES (?, ?, ?)")
            .bind(project_id)
            .bind(member.employee_id)
            .bind(member.role.trim())
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Project members updated",
        "data": { "members": payload.members.len() }
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(id: u64, role: &str) -> ProjectMember {
        ProjectMember {
            employee_id: id,
            role: role.into(),
        }
    }

    #[test]
    fn duplicate_members_are_rejected() {
        assert!(check_members(&[member(1, "lead"), member(2, "dev")]).is_ok());
        assert!(check_members(&[member(1, "lead"), member(1, "dev")]).is_err());
        assert!(check_members(&[member(3, " ")]).is_err());
    }

    #[test]
    fn update_checks_completion_and_status() {
        assert!(validate_update(&json!({ "completion": 100 })).is_ok());
        assert!(validate_update(&json!({ "completion": 101 })).is_err());
        assert!(validate_update(&json!({ "completion": -1 })).is_err());
        assert!(validate_update(&json!({ "status": "on_hold" })).is_ok());
        assert!(validate_update(&json!({ "status": "paused" })).is_err());
    }

    #[test]
    fn create_rejects_reversed_dates() {
        let payload: CreateProject = serde_json::from_value(json!({
            "name": "Audit",
            "start_date": "2026-05-02",
            "end_date": "2026-05-01"
        }))
        .unwrap();
        assert!(payload.validate().is_err());

        let payload: CreateProject = serde_json::from_value(json!({
            "name": "Audit",
            "start_date": "2026-05-02",
            "completion": 20
        }))
        .unwrap();
        assert!(payload.validate().is_ok());
    }
}
