use crate::{
    api::{done, ok},
    auth::user::AuthUser,
    config::Config,
    error::{AppError, AppResult, conflict_on_duplicate},
    model::attendance::{
        AttendanceRecord, AttendanceSummary, SUMMARY_WINDOW, punch_in_status, worked_hours,
    },
};
use actix_web::{HttpResponse, web};
use chrono::{Local, NaiveTime, Timelike};
use serde::Deserialize;
use serde_json::json;
use sqlx::MySqlPool;
use tracing::info;
use utoipa::IntoParams;

#[derive(Deserialize, IntoParams)]
pub struct HistoryQuery {
    /// Number of most recent records, 1..=90 (default 30)
    pub limit: Option<u32>,
}

/// Summary over the employee's most recent records
pub async fn load_summary(pool: &MySqlPool, employee_id: u64) -> AppResult<AttendanceSummary> {
    let statuses = sqlx::query_scalar::<_, String>(
        r#"
        SELECT status FROM attendance
        WHERE employee_id = ?
        ORDER BY date DESC
        LIMIT ?
        "#,
    )
    .bind(employee_id)
    .bind(SUMMARY_WINDOW as i64)
    .fetch_all(pool)
    .await?;

    Ok(AttendanceSummary::from_statuses(statuses.iter().map(String::as_str)))
}

/// Punch-in endpoint
#[utoipa::path(
    post,
    path = "/api/attendance",
    responses(
        (status = 201, description = "Punched in", body = Object, example = json!({
            "success": true,
            "message": "Punched in successfully",
            "data": { "status": "late", "check_in": "09:21:04" }
        })),
        (status = 403, description = "No employee profile"),
        (status = 409, description = "Already punched in today", body = Object, example = json!({
            "success": false,
            "message": "Already punched in today"
        }))
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn punch_in(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    let employee_id = auth.employee()?;

    let now = Local::now().naive_local();
    let at = whole_seconds(now.time());
    let status = punch_in_status(at, config.attendance_late_after);

    sqlx::query(
        r#"
        INSERT INTO attendance (employee_id, date, check_in, status)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(employee_id)
    .bind(now.date())
    .bind(at)
    .bind(status.as_ref())
    .execute(pool.get_ref())
    .await
    .map_err(|e| conflict_on_duplicate(e, "Already punched in today"))?;

    info!(employee_id, status = %status, "Punched in");

    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "message": "Punched in successfully",
        "data": { "status": status, "check_in": at }
    })))
}

/// Punch-out endpoint
#[utoipa::path(
    put,
    path = "/api/attendance",
    responses(
        (status = 200, description = "Punched out", body = Object, example = json!({
            "success": true,
            "message": "Punched out successfully",
            "data": { "hours": 8.25 }
        })),
        (status = 400, description = "No open punch-in for today")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn punch_out(auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    let employee_id = auth.employee()?;

    let now = Local::now().naive_local();
    let at = whole_seconds(now.time());

    let (record_id, check_in) = sqlx::query_as::<_, (u64, NaiveTime)>(
        r#"
        SELECT id, check_in FROM attendance
        WHERE employee_id = ? AND date = ? AND check_in IS NOT NULL AND check_out IS NULL
        "#,
    )
    .bind(employee_id)
    .bind(now.date())
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or_else(|| AppError::bad_request("No active punch-in found for today"))?;

    let hours = worked_hours(check_in, at);

    // guarded so a concurrent punch-out cannot overwrite the first one
    let result = sqlx::query(
        "UPDATE attendance SET check_out = ?, hours = ? WHERE id = ? AND check_out IS NULL",
    )
    .bind(at)
    .bind(hours)
    .bind(record_id)
    .execute(pool.get_ref())
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::bad_request("No active punch-in found for today"));
    }

    info!(employee_id, hours, "Punched out");

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Punched out successfully",
        "data": { "hours": hours }
    })))
}

#[utoipa::path(
    get,
    path = "/api/attendance/me",
    params(HistoryQuery),
    responses((status = 200, description = "Most recent attendance records", body = [AttendanceRecord])),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn my_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<HistoryQuery>,
) -> AppResult<HttpResponse> {
    let employee_id = auth.employee()?;
    let limit = query.limit.unwrap_or(30).clamp(1, 90);

    let records = sqlx::query_as::<_, AttendanceRecord>(
        r#"
        SELECT id, employee_id, date, check_in, check_out, hours, status
        FROM attendance
        WHERE employee_id = ?
        ORDER BY date DESC
        LIMIT ?
        "#,
    )
    .bind(employee_id)
    .bind(limit as i64)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(ok(records))
}

#[utoipa::path(
    get,
    path = "/api/attendance/me/summary",
    responses((status = 200, description = "Attendance percentage over the last 30 records", body = AttendanceSummary)),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn my_summary(auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    let employee_id = auth.employee()?;
    let summary = load_summary(pool.get_ref(), employee_id).await?;
    Ok(ok(summary))
}

/// Marks employees without a record for the day as absent
#[utoipa::path(
    post,
    path = "/api/attendance/absences",
    responses((status = 200, description = "Absences recorded for today")),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn record_absences(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    let today = Local::now().date_naive();

    let result = sqlx::query(
        r#"
        INSERT INTO attendance (employee_id, date, status)
        SELECT e.id, ?, 'absent'
        FROM employees e
        WHERE e.status = 'active'
          AND NOT EXISTS (
              SELECT 1 FROM attendance a WHERE a.employee_id = e.id AND a.date = ?
          )
        "#,
    )
    .bind(today)
    .bind(today)
    .execute(pool.get_ref())
    .await?;

    info!(date = %today, marked = result.rows_affected(), "Absences recorded");
    Ok(done("Absences recorded for today"))
}

/// TIME columns hold whole seconds
fn whole_seconds(t: NaiveTime) -> NaiveTime {
    t.with_nanosecond(0).unwrap_or(t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn punch_times_drop_fractions() {
        let t = NaiveTime::from_hms_nano_opt(9, 14, 59, 999_000_000).unwrap();
        let truncated = whole_seconds(t);
        assert_eq!(truncated, NaiveTime::from_hms_opt(9, 14, 59).unwrap());
        assert_eq!(
            punch_in_status(truncated, NaiveTime::from_hms_opt(9, 15, 0).unwrap()),
            crate::model::attendance::AttendanceStatus::Present
        );
    }
}
