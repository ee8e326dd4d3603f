use crate::{
    api::{created, done, notification::notify, ok},
    auth::user::AuthUser,
    error::{AppError, AppResult},
    model::leave_request::{LeaveRequest, LeaveStatus, LeaveType, leave_days},
    utils::{
        db_utils::{SqlValue, bind_values},
        pagination::{PageWindow, Paginated},
    },
};
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::Deserialize;
use sqlx::MySqlPool;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

const LEAVE_COLUMNS: &str = "id, employee_id, start_date, end_date, leave_type, status, created_at";

#[derive(Deserialize, ToSchema)]
pub struct CreateLeave {
    #[schema(example = "2026-01-01", format = "date", value_type = String)]
    pub start_date: NaiveDate,
    #[schema(example = "2026-01-03", format = "date", value_type = String)]
    pub end_date: NaiveDate,
    /// enum ensures Swagger dropdown
    pub leave_type: LeaveType,
}

#[derive(Deserialize, IntoParams)]
pub struct LeaveFilter {
    /// Filter by employee ID (HR/Admin only)
    #[param(example = 123)]
    pub employee_id: Option<u64>,
    /// Filter by leave status
    #[param(example = "pending")]
    pub status: Option<String>,
    /// Pagination page number (start with 1)
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/* =========================
Create leave request
========================= */
#[utoipa::path(
    post,
    path = "/api/leave",
    request_body(
        content = CreateLeave,
        description = "Leave request payload",
        content_type = "application/json"
    ),
    responses(
        (status = 201, description = "Leave request submitted successfully", body = Object, example = json!({
            "success": true,
            "message": "Leave request submitted",
            "data": { "id": 12 }
        })),
        (status = 400, description = "start_date cannot be after end_date"),
        (status = 403, description = "No employee profile")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn create_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateLeave>,
) -> AppResult<HttpResponse> {
    let employee_id = auth.employee()?;

    if payload.start_date > payload.end_date {
        return Err(AppError::bad_request("start_date cannot be after end_date"));
    }

    let result = sqlx::query(
        r#"
        INSERT INTO leave_requests (employee_id, start_date, end_date, leave_type, status)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(employee_id)
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(payload.leave_type.as_ref())
    .bind(LeaveStatus::Pending.as_ref())
    .execute(pool.get_ref())
    .await?;

    info!(
        employee_id,
        days = leave_days(payload.start_date, payload.end_date),
        leave_type = %payload.leave_type,
        "Leave requested"
    );

    Ok(created("Leave request submitted", result.last_insert_id()))
}

/// Moves a pending request to `status` and tells the employee
async fn decide(pool: &MySqlPool, leave_id: u64, status: LeaveStatus) -> AppResult<()> {
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        "UPDATE leave_requests SET status = ? WHERE id = ? AND status = 'pending'",
    )
    .bind(status.as_ref())
    .bind(leave_id)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::bad_request("Leave request not found or already processed"));
    }

    let (employee_id, start_date, end_date) = sqlx::query_as::<_, (u64, NaiveDate, NaiveDate)>(
        "SELECT employee_id, start_date, end_date FROM leave_requests WHERE id = ?",
    )
    .bind(leave_id)
    .fetch_one(&mut *tx)
    .await?;

    notify(
        &mut *tx,
        employee_id,
        &format!("Leave {status}"),
        &format!("Your leave from {start_date} to {end_date} was {status}"),
        Some(format!("/leave/{leave_id}").as_str()),
    )
    .await?;

    tx.commit().await?;
    Ok(())
}

#[utoipa::path(
    put,
    path = "/api/leave/{leave_id}/approve",
    params(("leave_id" = u64, Path, description = "ID of the leave request to approve")),
    responses(
        (status = 200, description = "Leave approved successfully", body = Object, example = json!({
            "success": true,
            "message": "Leave approved"
        })),
        (status = 400, description = "Leave request not found or already processed")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn approve_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let leave_id = path.into_inner();

    decide(pool.get_ref(), leave_id, LeaveStatus::Approved).await?;

    info!(leave_id, by = auth.user_id, "Leave approved");
    Ok(done("Leave approved"))
}

#[utoipa::path(
    put,
    path = "/api/leave/{leave_id}/reject",
    params(("leave_id" = u64, Path, description = "ID of the leave request to reject")),
    responses(
        (status = 200, description = "Leave rejected successfully", body = Object, example = json!({
            "success": true,
            "message": "Leave rejected"
        })),
        (status = 400, description = "Leave request not found or already processed")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn reject_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let leave_id = path.into_inner();

    decide(pool.get_ref(), leave_id, LeaveStatus::Rejected).await?;

    info!(leave_id, by = auth.user_id, "Leave rejected");
    Ok(done("Leave rejected"))
}

#[utoipa::path(
    get,
    path = "/api/leave/{leave_id}",
    params(("leave_id" = u64, Path, description = "ID of the leave request to fetch")),
    responses(
        (status = 200, description = "Leave request found", body = LeaveRequest),
        (status = 404, description = "Leave request not found", body = Object, example = json!({
            "success": false,
            "message": "Leave request not found"
        }))
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn get_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let leave_id = path.into_inner();

    let leave = sqlx::query_as::<_, LeaveRequest>(&format!(
        "SELECT {LEAVE_COLUMNS} FROM leave_requests WHERE id = ?"
    ))
    .bind(leave_id)
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or_else(|| AppError::not_found("Leave request not found"))?;

    if auth.require_hr_or_admin().is_err() && auth.employee_id != Some(leave.employee_id) {
        return Err(AppError::Forbidden("Not allowed to view this leave request".into()));
    }

    Ok(ok(leave))
}

#[utoipa::path(
    get,
    path = "/api/leave",
    params(LeaveFilter),
    responses((status = 200, description = "Paginated leave list", body = Object)),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn list_leaves(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<LeaveFilter>,
) -> AppResult<HttpResponse> {
    let window = PageWindow::new(query.page, query.per_page, 10);

    let mut conditions = Vec::new();
    let mut bindings = Vec::new();

    // employees only ever see their own requests
    let employee_id = if auth.require_hr_or_admin().is_ok() {
        query.employee_id
    } else {
        Some(auth.employee()?)
    };

    if let Some(id) = employee_id {
        conditions.push("employee_id = ?");
        bindings.push(SqlValue::U64(id));
    }

    if let Some(status) = query.status.as_deref() {
        let status = status
            .to_ascii_lowercase()
            .parse::<LeaveStatus>()
            .map_err(|_| AppError::bad_request("status must be pending, approved or rejected"))?;
        conditions.push("status = ?");
        bindings.push(SqlValue::String(status.as_ref().to_string()));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    let count_sql = format!("SELECT COUNT(*) FROM leave_requests {where_clause}");
    let total = bind_values!(
        sqlx::query_scalar::<_, i64>(&count_sql),
        bindings.clone()
    )
    .fetch_one(pool.get_ref())
    .await?;

    let data_sql = format!(
        "SELECT {LEAVE_COLUMNS} FROM leave_requests {where_clause} \
         ORDER BY created_at DESC LIMIT ? OFFSET ?"
    );
    let data = bind_values!(sqlx::query_as::<_, LeaveRequest>(&data_sql), bindings)
        .bind(window.limit())
        .bind(window.offset())
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(Paginated::new(data, window, total)))
}
