use crate::{
    api::done,
    auth::user::AuthUser,
    error::{AppError, AppResult},
    model::notification::Notification,
    utils::pagination::{PageWindow, Paginated},
};
use actix_web::{HttpResponse, web};
use serde::Deserialize;
use sqlx::{MySql, MySqlPool, Executor};
use utoipa::IntoParams;

/// Stores an in-app notification for an employee
pub async fn notify<'e, E>(
    executor: E,
    employee_id: u64,
    title: &str,
    message: &str,
    link: Option<&str>,
) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = MySql>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO notifications (employee_id, title, message, link)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(employee_id)
    .bind(title)
    .bind(message)
    .bind(link)
    .execute(executor)
    .await?;

    Ok(result.last_insert_id())
}

#[derive(Deserialize, IntoParams)]
pub struct NotificationQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    /// Only unread notifications
    pub unread: Option<bool>,
}

#[utoipa::path(
    get,
    path = "/api/notifications",
    params(NotificationQuery),
    responses(
        (status = 200, description = "My notifications, unread first", body = Object),
        (status = 403, description = "No employee profile")
    ),
    security(("bearer_auth" = [])),
    tag = "Notification"
)]
pub async fn list_notifications(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<NotificationQuery>,
) -> AppResult<HttpResponse> {
    let employee_id = auth.employee()?;
    let window = PageWindow::new(query.page, query.per_page, 20);
    let unread_only = query.unread.unwrap_or(false);

    let filter = if unread_only {
        "WHERE employee_id = ? AND is_read = FALSE"
    } else {
        "WHERE employee_id = ?"
    };

    let total = sqlx::query_scalar::<_, i64>(&format!(
        "SELECT COUNT(*) FROM notifications {filter}"
    ))
    .bind(employee_id)
    .fetch_one(pool.get_ref())
    .await?;

    let data = sqlx::query_as::<_, Notification>(&format!(
        r#"
        SELECT id, employee_id, title, message, link, is_read, created_at
        FROM notifications
        {filter}
        ORDER BY is_read ASC, created_at DESC
        LIMIT ? OFFSET ?
        "#
    ))
    .bind(employee_id)
    .bind(window.limit())
    .bind(window.offset())
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(Paginated::new(data, window, total)))
}

#[utoipa::path(
    put,
    path = "/api/notifications/{notification_id}/read",
    params(("notification_id" = u64, Path, description = "Notification ID")),
    responses(
        (status = 200, description = "Marked as read"),
        (status = 404, description = "Notification not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Notification"
)]
pub async fn mark_read(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let employee_id = auth.employee()?;
    let notification_id = path.into_inner();

    let found = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM notifications WHERE id = ? AND employee_id = ?",
    )
    .bind(notification_id)
    .bind(employee_id)
    .fetch_one(pool.get_ref())
    .await?;

    if found == 0 {
        return Err(AppError::not_found("Notification not found"));
    }

    sqlx::query("UPDATE notifications SET is_read = TRUE WHERE id = ?")
        .bind(notification_id)
        .execute(pool.get_ref())
        .await?;

    Ok(done("Notification marked as read"))
}

#[utoipa::path(
    put,
    path = "/api/notifications/read-all",
    responses((status = 200, description = "All notifications marked as read")),
    security(("bearer_auth" = [])),
    tag = "Notification"
)]
pub async fn mark_all_read(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> AppResult<HttpResponse> {
    let employee_id = auth.employee()?;

    let result = sqlx::query(
        "UPDATE notifications SET is_read = TRUE WHERE employee_id = ? AND is_read = FALSE",
    )
    .bind(employee_id)
    .execute(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": "Notifications marked as read",
        "data": { "updated": result.rows_affected() }
    })))
}
