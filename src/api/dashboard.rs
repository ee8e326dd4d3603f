use crate::{
    api::{attendance::load_summary, ok},
    auth::user::AuthUser,
    error::{AppError, AppResult},
    model::{
        attendance::AttendanceSummary, employee::Employee, payroll::PayrollPeriod,
    },
};
use actix_web::{HttpResponse, web};
use chrono::Local;
use serde::Serialize;
use sqlx::MySqlPool;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct MyDashboard {
    pub profile: Employee,
    pub attendance: AttendanceSummary,
    pub open_tasks: i64,
    pub unread_mail: i64,
    pub unread_notifications: i64,
    pub pending_leave: i64,
}

#[derive(Serialize, sqlx::FromRow, ToSchema)]
pub struct DepartmentHeadcount {
    pub id: u64,
    pub name: String,
    pub employees: i64,
}

#[derive(Serialize, sqlx::FromRow, ToSchema)]
pub struct Headcount {
    pub total: i64,
    pub active: i64,
    pub inactive: i64,
    pub terminated: i64,
}

#[derive(Serialize, ToSchema)]
pub struct AdminDashboard {
    pub headcount: Headcount,
    pub departments: Vec<DepartmentHeadcount>,
    pub open_candidates: i64,
    pub pending_leave: i64,
    pub present_today: i64,
    pub active_projects: i64,
    pub active_period: Option<PayrollPeriod>,
}

async fn count(pool: &MySqlPool, sql: &str, employee_id: Option<u64>) -> Result<i64, sqlx::Error> {
    let mut query = sqlx::query_scalar::<_, i64>(sql);
    if let Some(id) = employee_id {
        query = query.bind(id);
    }
    query.fetch_one(pool).await
}

#[utoipa::path(
    get,
    path = "/api/dashboard/me",
    responses(
        (status = 200, description = "Profile and personal counters", body = MyDashboard),
        (status = 403, description = "No employee profile")
    ),
    security(("bearer_auth" = [])),
    tag = "Dashboard"
)]
pub async fn my_dashboard(auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    let employee_id = auth.employee()?;
    let pool = pool.get_ref();

    let profile = sqlx::query_as::<_, Employee>(
        r#"
        SELECT id, employee_code, first_name, last_name, email, phone, department_id,
               job_title_id, role, salary, hire_date, status, avatar_url
        FROM employees WHERE id = ?
        "#,
    )
    .bind(employee_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("Employee not found"))?;

    let (attendance, open_tasks, unread_mail, unread_notifications, pending_leave) = futures::try_join!(
        load_summary(pool, employee_id),
        async {
            count(
                pool,
                "SELECT COUNT(*) FROM tasks WHERE assigned_to = ? AND status <> 'completed'",
                Some(employee_id),
            )
            .await
            .map_err(AppError::from)
        },
        async {
            count(
                pool,
                "SELECT COUNT(*) FROM mails \
                 WHERE recipient_id = ? AND is_read = FALSE AND deleted_by_recipient = FALSE",
                Some(employee_id),
            )
            .await
            .map_err(AppError::from)
        },
        async {
            count(
                pool,
                "SELECT COUNT(*) FROM notifications WHERE employee_id = ? AND is_read = FALSE",
                Some(employee_id),
            )
            .await
            .map_err(AppError::from)
        },
        async {
            count(
                pool,
                "SELECT COUNT(*) FROM leave_requests WHERE employee_id = ? AND status = 'pending'",
                Some(employee_id),
            )
            .await
            .map_err(AppError::from)
        },
    )?;

    Ok(ok(MyDashboard {
        profile,
        attendance,
        open_tasks,
        unread_mail,
        unread_notifications,
        pending_leave,
    }))
}

#[utoipa::path(
    get,
    path = "/api/dashboard/admin",
    responses(
        (status = 200, description = "Organization overview", body = AdminDashboard),
        (status = 403, description = "HR/Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Dashboard"
)]
pub async fn admin_dashboard(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let pool = pool.get_ref();

    let headcount = sqlx::query_as::<_, Headcount>(
        r#"
        SELECT
            COUNT(*) AS total,
            CAST(COALESCE(SUM(status = 'active'), 0) AS SIGNED) AS active,
            CAST(COALESCE(SUM(status = 'inactive'), 0) AS SIGNED) AS inactive,
            CAST(COALESCE(SUM(status = 'terminated'), 0) AS SIGNED) AS terminated
        FROM employees
        "#,
    )
    .fetch_one(pool)
    .await?;

    let departments = sqlx::query_as::<_, DepartmentHeadcount>(
        r#"
        SELECT d.id, d.name, COUNT(e.id) AS employees
        FROM departments d
        LEFT JOIN employees e ON e.department_id = d.id AND e.status = 'active'
        GROUP BY d.id, d.name
        ORDER BY d.name
        "#,
    )
    .fetch_all(pool)
    .await?;

    let open_candidates = count(
        pool,
        "SELECT COUNT(*) FROM candidates WHERE stage NOT IN ('hired', 'rejected')",
        None,
    )
    .await?;
    let pending_leave = count(
        pool,
        "SELECT COUNT(*) FROM leave_requests WHERE status = 'pending'",
        None,
    )
    .await?;
    // punches are stored with the server's local date, not the database clock
    let present_today = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM attendance WHERE date = ? AND status IN ('present', 'late')",
    )
    .bind(Local::now().date_naive())
    .fetch_one(pool)
    .await?;
    let active_projects = count(
        pool,
        "SELECT COUNT(*) FROM projects WHERE status = 'active'",
        None,
    )
    .await?;

    let active_period = sqlx::query_as::<_, PayrollPeriod>(
        "SELECT id, month, year, is_active, status FROM payroll_periods WHERE is_active = TRUE LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;

    Ok(ok(AdminDashboard {
        headcount,
        departments,
        open_candidates,
        pending_leave,
        present_today,
        active_projects,
        active_period,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn admin_dashboard_shape() {
        let dashboard = AdminDashboard {
            headcount: Headcount {
                total: 5,
                active: 4,
                inactive: 1,
                terminated: 0,
            },
            departments: vec![DepartmentHeadcount {
                id: 1,
                name: "Finance".into(),
                employees: 4,
            }],
            open_candidates: 2,
            pending_leave: 1,
            present_today: 3,
            active_projects: 0,
            active_period: None,
        };

        let value = serde_json::to_value(&dashboard).unwrap();
        assert_eq!(value["headcount"]["active"], 4);
        assert_eq!(value["departments"][0], json!({ "id": 1, "name": "Finance", "employees": 4 }));
        assert!(value["active_period"].is_null());
    }
}
