use crate::{
    api::{created, done, notification::notify, ok},
    auth::user::AuthUser,
    error::{AppError, AppResult},
    model::task::{
        ResponseKind, ReviewStatus, Task, TaskPriority, TaskResponse, TaskStatus,
        response_payload_is_complete,
    },
    utils::{
        db_utils::{SqlValue, bind_values},
        pagination::{PageWindow, Paginated},
        validation::require_non_empty,
    },
};
use actix_web::{HttpResponse, web};
use chrono::{Local, NaiveDate, NaiveTime};
use serde::Deserialize;
use sqlx::MySqlPool;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

const TASK_COLUMNS: &str = "id, title, description, assigned_to, assigned_by, project_id, \
     due_date, due_time, priority, status, created_at";

const RESPONSE_COLUMNS: &str = "id, task_id, employee_id, kind, message, document_url, \
     review_status, reviewer_id, review_note, created_at, reviewed_at";

#[derive(Deserialize, ToSchema)]
pub struct CreateTask {
    #[schema(example = "Prepare Q2 KRA review")]
    pub title: String,
    pub description: Option<String>,
    #[schema(example = 7)]
    pub assigned_to: u64,
    pub project_id: Option<u64>,
    #[schema(value_type = String, format = "date", example = "2026-06-30")]
    pub due_date: NaiveDate,
    #[schema(value_type = Option<String>, example = "17:00:00")]
    pub due_time: Option<NaiveTime>,
    pub priority: Option<TaskPriority>,
}

impl CreateTask {
    fn validate(&self, today: NaiveDate) -> AppResult<()> {
        require_non_empty("title", &self.title)?;
        if self.due_date < today {
            return Err(AppError::bad_request("due_date cannot be in the past"));
        }
        Ok(())
    }
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateTaskStatus {
    pub status: TaskStatus,
}

#[derive(Deserialize, IntoParams)]
pub struct TaskQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    /// open, in_progress or completed
    pub status: Option<String>,
    /// Managers only: tasks of one employee
    pub assigned_to: Option<u64>,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateTaskResponse {
    pub task_id: u64,
    pub kind: ResponseKind,
    pub message: Option<String>,
    pub document_url: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct ReviewResponse {
    /// approved or rejected
    pub status: ReviewStatus,
    pub note: Option<String>,
}

async fn fetch_task(pool: &MySqlPool, task_id: u64) -> AppResult<Task> {
    sqlx::query_as::<_, Task>(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?"))
        .bind(task_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Task not found"))
}

fn can_see_task(auth: &AuthUser, task: &Task) -> bool {
    auth.role.is_manager_or_above()
        || auth.employee_id == Some(task.assigned_to)
        || auth.employee_id == Some(task.assigned_by)
}

#[utoipa::path(
    get,
    path = "/api/tasks",
    params(TaskQuery),
    responses((status = 200, description = "My tasks, or all tasks for managers", body = Object)),
    security(("bearer_auth" = [])),
    tag = "Task"
)]
pub async fn list_tasks(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<TaskQuery>,
) -> AppResult<HttpResponse> {
    let window = PageWindow::new(query.page, query.per_page, 20);

    let mut conditions = Vec::new();
    let mut bindings = Vec::new();

    if auth.role.is_manager_or_above() {
        if let Some(assignee) = query.assigned_to {
            conditions.push("assigned_to = ?");
            bindings.push(SqlValue::U64(assignee));
        }
    } else {
        conditions.push("assigned_to = ?");
        bindings.push(SqlValue::U64(auth.employee()?));
    }

    if let Some(status) = query.status.as_deref() {
        let status = status
            .parse::<TaskStatus>()
            .map_err(|_| AppError::bad_request(format!("Unknown task status '{status}'")))?;
        conditions.push("status = ?");
        bindings.push(SqlValue::String(status.as_ref().to_string()));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    let count_sql = format!("SELECT COUNT(*) FROM tasks {where_clause}");
    let total = bind_values!(
        sqlx::query_scalar::<_, i64>(&count_sql),
        bindings.clone()
    )
    .fetch_one(pool.get_ref())
    .await?;

    let data_sql = format!(
        "SELECT {TASK_COLUMNS} FROM tasks {where_clause} \
         ORDER BY due_date ASC, id DESC LIMIT ? OFFSET ?"
    );
    let tasks = bind_values!(sqlx::query_as::<_, Task>(&data_sql), bindings)
        .bind(window.limit())
        .bind(window.offset())
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(Paginated::new(tasks, window, total)))
}

#[utoipa::path(
    get,
    path = "/api/tasks/{task_id}",
    params(("task_id" = u64, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Task found", body = Task),
        (status = 404, description = "Task not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Task"
)]
pub async fn get_task(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let task = fetch_task(pool.get_ref(), path.into_inner()).await?;

    if !can_see_task(&auth, &task) {
        return Err(AppError::Forbidden("Not allowed to view this task".into()));
    }

    Ok(ok(task))
}

/// Assigns a task and notifies the assignee
#[utoipa::path(
    post,
    path = "/api/tasks",
    request_body = CreateTask,
    responses(
        (status = 201, description = "Task created"),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Assignee not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Task"
)]
pub async fn create_task(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateTask>,
) -> AppResult<HttpResponse> {
    auth.require_manager_or_above()?;
    let assigned_by = auth.employee()?;
    payload.validate(Local::now().date_naive())?;

    let assignee = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM employees WHERE id = ?")
        .bind(payload.assigned_to)
        .fetch_one(pool.get_ref())
        .await?;
    if assignee == 0 {
        return Err(AppError::not_found("Assignee not found"));
    }

    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        INSERT INTO tasks
        (title, description, assigned_to, assigned_by, project_id, due_date, due_time, priority)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.title.trim())
    .bind(&payload.description)
    .bind(payload.assigned_to)
    .bind(assigned_by)
    .bind(payload.project_id)
    .bind(payload.due_date)
    .bind(payload.due_time)
    .bind(payload.priority.unwrap_or(TaskPriority::Medium).as_ref())
    .execute(&mut *tx)
    .await?;

    let task_id = result.last_insert_id();

    notify(
        &mut *tx,
        payload.assigned_to,
        "New task assigned",
        &format!("{} (due {})", payload.title.trim(), payload.due_date),
        Some(format!("/tasks/{task_id}").as_str()),
    )
    .await?;

    tx.commit().await?;

    info!(task_id, assigned_to = payload.assigned_to, assigned_by, "Task created");
    Ok(created("Task created", task_id))
}

#[utoipa::path(
    put,
    path = "/api/tasks/{task_id}/status",
    params(("task_id" = u64, Path, description = "Task ID")),
    request_body = UpdateTaskStatus,
    responses(
        (status = 200, description = "Status updated"),
        (status = 403, description = "Not the assignee"),
        (status = 404, description = "Task not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Task"
)]
pub async fn update_task_status(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateTaskStatus>,
) -> AppResult<HttpResponse> {
    let task = fetch_task(pool.get_ref(), path.into_inner()).await?;

    if !(auth.role.is_manager_or_above() || auth.employee_id == Some(task.assigned_to)) {
        return Err(AppError::Forbidden("Only the assignee can update this task".into()));
    }

    sqlx::query("UPDATE tasks SET status = ? WHERE id = ?")
        .bind(payload.status.as_ref())
        .bind(task.id)
        .execute(pool.get_ref())
        .await?;

    Ok(done("Task status updated"))
}

#[utoipa::path(
    delete,
    path = "/api/tasks/{task_id}",
    params(("task_id" = u64, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Task deleted"),
        (status = 404, description = "Task not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Task"
)]
pub async fn delete_task(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require_manager_or_above()?;
    let task_id = path.into_inner();

    let mut tx = pool.begin().await?;

    let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
        .bind(task_id)
        .execute(&mut *tx)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Task not found"));
    }

    sqlx::query("DELETE FROM task_responses WHERE task_id = ?")
        .bind(task_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    info!(task_id, by = auth.user_id, "Task deleted");
    Ok(done("Task deleted"))
}

/// Text or document response by the assignee
#[utoipa::path(
    post,
    path = "/api/task-responses",
    request_body = CreateTaskResponse,
    responses(
        (status = 201, description = "Response submitted"),
        (status = 400, description = "Message or document missing"),
        (status = 403, description = "Not the assignee")
    ),
    security(("bearer_auth" = [])),
    tag = "Task"
)]
pub async fn create_response(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateTaskResponse>,
) -> AppResult<HttpResponse> {
    let employee_id = auth.employee()?;

    if !response_payload_is_complete(
        payload.kind,
        payload.message.as_deref(),
        payload.document_url.as_deref(),
    ) {
        return Err(AppError::bad_request(match payload.kind {
            ResponseKind::Text => "message is required for a text response",
            ResponseKind::Document => "document_url is required for a document response",
        }));
    }

    let task = fetch_task(pool.get_ref(), payload.task_id).await?;
    if task.assigned_to != employee_id {
        return Err(AppError::Forbidden("Only the assignee can respond to this task".into()));
    }

    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        INSERT INTO task_responses (task_id, employee_id, kind, message, document_url)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(task.id)
    .bind(employee_id)
    .bind(payload.kind.as_ref())
    .bind(&payload.message)
    .bind(&payload.document_url)
    .execute(&mut *tx)
    .await?;

    notify(
        &mut *tx,
        task.assigned_by,
        "Task response submitted",
        &format!("A response was submitted for \"{}\"", task.title),
        Some(format!("/tasks/{}", task.id).as_str()),
    )
    .await?;

    tx.commit().await?;

    Ok(created("Response submitted", result.last_insert_id()))
}

#[utoipa::path(
    get,
    path = "/api/task-responses/task/{task_id}",
    params(("task_id" = u64, Path, description = "Task ID")),
    responses((status = 200, description = "Responses for the task, newest first", body = [TaskResponse])),
    security(("bearer_auth" = [])),
    tag = "Task"
)]
pub async fn list_responses(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let task = fetch_task(pool.get_ref(), path.into_inner()).await?;

    if !can_see_task(&auth, &task) {
        return Err(AppError::Forbidden("Not allowed to view this task".into()));
    }

    let responses = sqlx::query_as::<_, TaskResponse>(&format!(
        "SELECT {RESPONSE_COLUMNS} FROM task_responses WHERE task_id = ? ORDER BY created_at DESC"
    ))
    .bind(task.id)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(ok(responses))
}

/// Approves or rejects a pending response; approval completes the task
#[utoipa::path(
    put,
    path = "/api/task-responses/{response_id}/review",
    params(("response_id" = u64, Path, description = "Task response ID")),
    request_body = ReviewResponse,
    responses(
        (status = 200, description = "Response reviewed"),
        (status = 400, description = "Response already reviewed"),
        (status = 404, description = "Response not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Task"
)]
pub async fn review_response(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<ReviewResponse>,
) -> AppResult<HttpResponse> {
    auth.require_manager_or_above()?;
    let response_id = path.into_inner();

    if payload.status == ReviewStatus::Pending {
        return Err(AppError::bad_request("status must be approved or rejected"));
    }

    let (task_id, responder) = sqlx::query_as::<_, (u64, u64)>(
        "SELECT task_id, employee_id FROM task_responses WHERE id = ?",
    )
    .bind(response_id)
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or_else(|| AppError::not_found("Task response not found"))?;

    let mut tx = pool.begin().await?;

    // only a pending response changes; a concurrent review loses
    let result = sqlx::query(
        r#"
        UPDATE task_responses
        SET review_status = ?, reviewer_id = ?, review_note = ?, reviewed_at = CURRENT_TIMESTAMP
        WHERE id = ? AND review_status = 'pending'
        "#,
    )
    .bind(payload.status.as_ref())
    .bind(auth.employee_id)
    .bind(&payload.note)
    .bind(response_id)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::bad_request("Only pending responses can be reviewed"));
    }

    if payload.status == ReviewStatus::Approved {
        sqlx::query("UPDATE tasks SET status = ? WHERE id = ?")
            .bind(TaskStatus::Completed.as_ref())
            .bind(task_id)
            .execute(&mut *tx)
            .await?;
    }

    notify(
        &mut *tx,
        responder,
        "Task response reviewed",
        &format!("Your response was {}", payload.status),
        Some(format!("/tasks/{task_id}").as_str()),
    )
    .await?;

    tx.commit().await?;

    info!(response_id, task_id, status = %payload.status, "Task response reviewed");
    Ok(done("Response reviewed"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn due_date_cannot_be_in_the_past() {
        let today = NaiveDate::from_ymd_opt(2026, 6, 10).unwrap();
        let task: CreateTask = serde_json::from_value(json!({
            "title": "Close books",
            "assigned_to": 3,
            "due_date": "2026-06-09"
        }))
        .unwrap();
        assert!(task.validate(today).is_err());

        let task: CreateTask = serde_json::from_value(json!({
            "title": "Close books",
            "assigned_to": 3,
            "due_date": "2026-06-10",
            "priority": "urgent"
        }))
        .unwrap();
        assert!(task.validate(today).is_ok());
        assert_eq!(task.priority, Some(TaskPriority::Urgent));
    }

    #[test]
    fn review_payload_uses_status_names() {
        let review: ReviewResponse =
            serde_json::from_value(json!({ "status": "approved", "note": "ok" })).unwrap();
        assert_eq!(review.status, ReviewStatus::Approved);
        assert!(serde_json::from_value::<ReviewResponse>(json!({ "status": "maybe" })).is_err());
    }

    #[test]
    fn status_update_accepts_snake_case() {
        let update: UpdateTaskStatus =
            serde_json::from_value(json!({ "status": "in_progress" })).unwrap();
        assert_eq!(update.status, TaskStatus::InProgress);
    }
}
