use crate::{
    api::{created, done, ok},
    auth::user::AuthUser,
    error::{AppError, AppResult, conflict_on_duplicate},
    model::payroll::{Payroll, PayrollPeriod, PeriodStatus, net_salary},
    utils::{
        db_utils::{SqlValue, bind_values},
        pagination::{PageWindow, Paginated},
    },
};
use actix_web::{HttpResponse, web};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

const PAYROLL_COLUMNS: &str =
    "id, employee_id, month, base_salary, bonus, deductions, net_salary";

#[derive(Deserialize, ToSchema)]
pub struct CreatePayroll {
    #[schema(example = 1001)]
    pub employee_id: u64,

    /// Any day of the month; stored as the first day
    #[schema(example = "2026-01-01", value_type = String, format = "date")]
    pub month: NaiveDate,

    #[schema(example = 50000.0)]
    pub base_salary: f64,

    #[schema(example = 5000.0)]
    #[serde(default)]
    pub bonus: f64,

    #[schema(example = 2000.0)]
    #[serde(default)]
    pub deductions: f64,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdatePayroll {
    #[schema(example = 52000.0)]
    pub base_salary: Option<f64>,

    #[schema(example = 6000.0)]
    pub bonus: Option<f64>,

    #[schema(example = 2500.0)]
    pub deductions: Option<f64>,
}

#[derive(Deserialize, IntoParams)]
pub struct PayrollQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub employee_id: Option<u64>,
}

#[derive(Deserialize, IntoParams)]
pub struct ReportQuery {
    /// `YYYY-MM`
    #[param(example = "2026-03")]
    pub month: String,
}

#[derive(Deserialize, ToSchema)]
pub struct CreatePeriod {
    #[schema(example = 3)]
    pub month: u8,
    #[schema(example = 2026)]
    pub year: u16,
}

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct PayrollReport {
    #[sqlx(skip)]
    #[schema(example = "2026-03")]
    pub month: String,
    pub count: i64,
    pub total_base: f64,
    pub total_bonus: f64,
    pub total_deductions: f64,
    pub total_net: f64,
}

fn check_amounts(values: &[(&str, f64)]) -> AppResult<()> {
    for (field, value) in values {
        if !value.is_finite() || *value < 0.0 {
            return Err(AppError::bad_request(format!("{field} must be a non-negative number")));
        }
    }
    Ok(())
}

/// First day of the month named by `YYYY-MM`
pub fn parse_month(value: &str) -> Option<NaiveDate> {
    let (year, month) = value.trim().split_once('-')?;
    if year.len() != 4 || month.len() != 2 {
        return None;
    }
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, 1)
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

#[utoipa::path(
    post,
    path = "/api/payroll",
    request_body = CreatePayroll,
    responses(
        (status = 201, description = "Payroll created"),
        (status = 400, description = "Invalid amounts"),
        (status = 409, description = "Payroll already exists for this month")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn create_payroll(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreatePayroll>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    check_amounts(&[
        ("base_salary", payload.base_salary),
        ("bonus", payload.bonus),
        ("deductions", payload.deductions),
    ])?;

    let month = first_of_month(payload.month);
    let net = net_salary(payload.base_salary, payload.bonus, payload.deductions);

    let result = sqlx::query(
        r#"
        INSERT INTO payroll
        (employee_id, month, base_salary, bonus, deductions, net_salary)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.employee_id)
    .bind(month)
    .bind(payload.base_salary)
    .bind(payload.bonus)
    .bind(payload.deductions)
    .bind(net)
    .execute(pool.get_ref())
    .await
    .map_err(|e| conflict_on_duplicate(e, "Payroll already exists for this month"))?;

    info!(payroll_id = result.last_insert_id(), employee_id = payload.employee_id, %month, "Payroll created");
    Ok(created("Payroll created successfully", result.last_insert_id()))
}

#[utoipa::path(
    put,
    path = "/api/payroll/{payroll_id}",
    request_body = UpdatePayroll,
    params(("payroll_id" = u64, Path, description = "Payroll ID")),
    responses(
        (status = 200, description = "Payroll updated"),
        (status = 404, description = "Payroll not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn update_payroll(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<UpdatePayroll>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;

    let payroll_id = path.into_inner();

    let (current_base, current_bonus, current_deductions) =
        sqlx::query_as::<_, (f64, f64, f64)>(
            "SELECT base_salary, bonus, deductions FROM payroll WHERE id = ?",
        )
        .bind(payroll_id)
        .fetch_optional(pool.get_ref())
        .await?
        .ok_or_else(|| AppError::not_found("Payroll record not found"))?;

    let base_salary = body.base_salary.unwrap_or(current_base);
    let bonus = body.bonus.unwrap_or(current_bonus);
    let deductions = body.deductions.unwrap_or(current_deductions);
    check_amounts(&[
        ("base_salary", base_salary),
        ("bonus", bonus),
        ("deductions", deductions),
    ])?;

    sqlx::query(
        r#"
        UPDATE payroll
        SET base_salary = ?, bonus = ?, deductions = ?, net_salary = ?
        WHERE id = ?
        "#,
    )
    .bind(base_salary)
    .bind(bonus)
    .bind(deductions)
    .bind(net_salary(base_salary, bonus, deductions))
    .bind(payroll_id)
    .execute(pool.get_ref())
    .await?;

    Ok(done("Payroll updated successfully"))
}

#[utoipa::path(
    get,
    path = "/api/payroll/{payroll_id}",
    params(("payroll_id" = u64, Path, description = "Payroll ID")),
    responses(
        (status = 200, body = Payroll),
        (status = 404, description = "Payroll not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn get_payroll(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let payroll_id = path.into_inner();

    let payroll = sqlx::query_as::<_, Payroll>(&format!(
        "SELECT {PAYROLL_COLUMNS} FROM payroll WHERE id = ?"
    ))
    .bind(payroll_id)
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or_else(|| AppError::not_found("Payroll not found"))?;

    // employees may read their own payslips
    if auth.require_hr_or_admin().is_err() && auth.employee_id != Some(payroll.employee_id) {
        return Err(AppError::Forbidden("Not allowed to view this payroll".into()));
    }

    Ok(ok(payroll))
}

#[utoipa::path(
    get,
    path = "/api/payroll",
    params(PayrollQuery),
    responses((status = 200, description = "Paginated payroll records", body = Object)),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn list_payrolls(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<PayrollQuery>,
) -> AppResult<HttpResponse> {
    let window = PageWindow::new(query.page, query.per_page, 10);

    let employee_filter = if auth.require_hr_or_admin().is_ok() {
        query.employee_id
    } else {
        Some(auth.employee()?)
    };

    let (where_clause, bindings) = match employee_filter {
        Some(id) => ("WHERE employee_id = ?", vec![SqlValue::U64(id)]),
        None => ("", Vec::new()),
    };

    let count_sql = format!("SELECT COUNT(*) FROM payroll {where_clause}");
    let total = bind_values!(
        sqlx::query_scalar::<_, i64>(&count_sql),
        bindings.clone()
    )
    .fetch_one(pool.get_ref())
    .await?;

    let data_sql = format!(
        "SELECT {PAYROLL_COLUMNS} FROM payroll {where_clause} \
         ORDER BY month DESC, id DESC LIMIT ? OFFSET ?"
    );
    let data = bind_values!(sqlx::query_as::<_, Payroll>(&data_sql), bindings)
        .bind(window.limit())
        .bind(window.offset())
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(Paginated::new(data, window, total)))
}

/// Totals for one month
#[utoipa::path(
    get,
    path = "/api/payroll/report",
    params(ReportQuery),
    responses(
        (status = 200, description = "Monthly totals", body = PayrollReport),
        (status = 400, description = "month must be YYYY-MM")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn payroll_report(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<ReportQuery>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    let month = parse_month(&query.month)
        .ok_or_else(|| AppError::bad_request("month must be formatted as YYYY-MM"))?;

    let mut report = sqlx::query_as::<_, PayrollReport>(
        r#"
        SELECT
            COUNT(*) AS count,
            CAST(COALESCE(SUM(base_salary), 0) AS DOUBLE) AS total_base,
            CAST(COALESCE(SUM(bonus), 0) AS DOUBLE) AS total_bonus,
            CAST(COALESCE(SUM(deductions), 0) AS DOUBLE) AS total_deductions,
            CAST(COALESCE(SUM(net_salary), 0) AS DOUBLE) AS total_net
        FROM payroll
        WHERE month = ?
        "#,
    )
    .bind(month)
    .fetch_one(pool.get_ref())
    .await?;

    report.month = month.format("%Y-%m").to_string();
    Ok(ok(report))
}

#[utoipa::path(
    get,
    path = "/api/payroll-periods",
    responses((status = 200, description = "All payroll periods, newest first", body = [PayrollPeriod])),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn list_periods(auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    let periods = sqlx::query_as::<_, PayrollPeriod>(
        "SELECT id, month, year, is_active, status FROM payroll_periods ORDER BY year DESC, month DESC",
    )
    .fetch_all(pool.get_ref())
    .await?;

    Ok(ok(periods))
}

#[utoipa::path(
    post,
    path = "/api/payroll-periods",
    request_body = CreatePeriod,
    responses(
        (status = 201, description = "Period created"),
        (status = 400, description = "month must be 1..=12"),
        (status = 409, description = "Period already exists")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn create_period(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreatePeriod>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;

    if PayrollPeriod::first_day(payload.month, payload.year).is_none() {
        return Err(AppError::bad_request("month must be between 1 and 12"));
    }

    let result = sqlx::query("INSERT INTO payroll_periods (month, year, status) VALUES (?, ?, ?)")
        .bind(payload.month)
        .bind(payload.year)
        .bind(PeriodStatus::Open.as_ref())
        .execute(pool.get_ref())
        .await
        .map_err(|e| conflict_on_duplicate(e, "Payroll period already exists"))?;

    Ok(created("Payroll period created", result.last_insert_id()))
}

/// Makes one period active and deactivates every other one
#[utoipa::path(
    put,
    path = "/api/payroll-periods/{period_id}/activate",
    params(("period_id" = u64, Path, description = "Payroll period ID")),
    responses(
        (status = 200, description = "Period activated"),
        (status = 400, description = "Closed periods cannot be activated"),
        (status = 404, description = "Period not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn activate_period(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let period_id = path.into_inner();

    let mut tx = pool.begin().await?;

    let status = sqlx::query_scalar::<_, String>(
        "SELECT status FROM payroll_periods WHERE id = ? FOR UPDATE",
    )
    .bind(period_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::not_found("Payroll period not found"))?;

    if status == PeriodStatus::Closed.as_ref() {
        return Err(AppError::bad_request("Closed periods cannot be activated"));
    }

    sqlx::query("UPDATE payroll_periods SET is_active = FALSE WHERE is_active = TRUE")
        .execute(&mut *tx)
        .await?;

    sqlx::query("UPDATE payroll_periods SET is_active = TRUE, status = ? WHERE id = ?")
        .bind(PeriodStatus::Processing.as_ref())
        .bind(period_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    info!(period_id, by = auth.user_id, "Payroll period activated");
    Ok(done("Payroll period activated"))
}

#[utoipa::path(
    put,
    path = "/api/payroll-periods/{period_id}/close",
    params(("period_id" = u64, Path, description = "Payroll period ID")),
    responses(
        (status = 200, description = "Period closed"),
        (status = 404, description = "Period not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn close_period(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let period_id = path.into_inner();

    let result = sqlx::query(
        "UPDATE payroll_periods SET status = ?, is_active = FALSE WHERE id = ?",
    )
    .bind(PeriodStatus::Closed.as_ref())
    .bind(period_id)
    .execute(pool.get_ref())
    .await?;

    if result.rows_affected() == 0 {
        let exists =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM payroll_periods WHERE id = ?")
                .bind(period_id)
                .fetch_one(pool.get_ref())
                .await?;
        if exists == 0 {
            return Err(AppError::not_found("Payroll period not found"));
        }
    }

    info!(period_id, by = auth.user_id, "Payroll period closed");
    Ok(done("Payroll period closed"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_month_format() {
        assert_eq!(parse_month("2026-03"), NaiveDate::from_ymd_opt(2026, 3, 1));
        assert_eq!(parse_month(" 2026-12 "), NaiveDate::from_ymd_opt(2026, 12, 1));
        assert_eq!(parse_month("2026-13"), None);
        assert_eq!(parse_month("2026-3"), None);
        assert_eq!(parse_month("03-2026"), None);
        assert_eq!(parse_month("march"), None);
    }

    #[test]
    fn payroll_month_is_normalized() {
        let d = NaiveDate::from_ymd_opt(2026, 2, 17).unwrap();
        assert_eq!(first_of_month(d), NaiveDate::from_ymd_opt(2026, 2, 1).unwrap());
    }

    #[test]
    fn amounts_must_be_non_negative() {
        assert!(check_amounts(&[("bonus", 0.0), ("base_salary", 10.0)]).is_ok());
        assert!(check_amounts(&[("deductions", -1.0)]).is_err());
        assert!(check_amounts(&[("bonus", f64::NAN)]).is_err());
    }
}
