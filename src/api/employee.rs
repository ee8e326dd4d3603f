use crate::{
    api::{attendance, created, done, ok},
    auth::user::AuthUser,
    error::{AppError, AppResult, conflict_on_duplicate},
    media::MediaHandle,
    model::employee::{Employee, EmployeeDocument, EmployeeStatus},
    utils::{
        db_utils::{SqlValue, bind_values, build_update_sql, execute_update},
        pagination::{PageWindow, Paginated},
        validation::{require_email, require_non_empty},
    },
};
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::MySqlPool;
use tracing::{debug, info, warn};
use utoipa::{IntoParams, ToSchema};

/// Columns HR may change through `PUT /employees/{id}`
const UPDATABLE_COLUMNS: &[&str] = &[
    "employee_code",
    "first_name",
    "last_name",
    "email",
    "phone",
    "department_id",
    "job_title_id",
    "role",
    "salary",
    "hire_date",
    "status",
    "avatar_url",
];

const EMPLOYEE_COLUMNS: &str = "id, employee_code, first_name, last_name, email, phone, \
     department_id, job_title_id, role, salary, hire_date, status, avatar_url";

#[derive(Deserialize, Serialize, ToSchema)]
pub struct CreateEmployee {
    #[schema(example = "EMP-3000")]
    pub employee_code: String,
    #[schema(example = "Jane")]
    pub first_name: String,
    #[schema(example = "Roe")]
    pub last_name: String,
    #[schema(example = "jane.roe@company.com", format = "email")]
    pub email: String,
    #[schema(example = "+8801712345678")]
    pub phone: Option<String>,
    #[schema(example = 1)]
    pub department_id: u64,
    #[schema(example = 2)]
    pub job_title_id: u64,
    #[schema(example = "engineer")]
    pub role: Option<String>,
    #[schema(example = 48000.0)]
    pub salary: Option<f64>,
    #[schema(example = "2026-01-01", format = "date", value_type = String)]
    pub hire_date: NaiveDate,
}

impl CreateEmployee {
    fn validate(&self) -> AppResult<()> {
        require_non_empty("employee_code", &self.employee_code)?;
        require_non_empty("first_name", &self.first_name)?;
        require_non_empty("last_name", &self.last_name)?;
        require_email("email", &self.email)?;
        if self.salary.is_some_and(|s| s < 0.0) {
            return Err(AppError::bad_request("salary cannot be negative"));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct EmployeeQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub department_id: Option<u64>,
    pub job_title_id: Option<u64>,
    pub status: Option<String>,
    /// Matches first name, last name or email
    pub search: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct AttachDocument {
    #[schema(example = "Employment contract")]
    pub title: String,
    #[schema(example = "https://res.cloudinary.com/demo/raw/upload/hrm/contract.pdf")]
    pub url: String,
    #[serde(rename = "publicId")]
    #[schema(example = "hrm/contract")]
    pub public_id: String,
}

/// Rejects payload values that would break invariants the table cannot enforce
fn validate_update(body: &Value) -> AppResult<()> {
    if let Some(email) = body.get("email") {
        require_email("email", email.as_str().unwrap_or_default())?;
    }
    if let Some(status) = body.get("status") {
        let valid = status
            .as_str()
            .is_some_and(|s| s.parse::<EmployeeStatus>().is_ok());
        if !valid {
            return Err(AppError::bad_request(
                "status must be one of active, inactive, terminated",
            ));
        }
    }
    for field in ["first_name", "last_name", "employee_code"] {
        if let Some(v) = body.get(field) {
            require_non_empty(field, v.as_str().unwrap_or_default())?;
        }
    }
    if body.get("salary").and_then(Value::as_f64).is_some_and(|s| s < 0.0) {
        return Err(AppError::bad_request("salary cannot be negative"));
    }
    Ok(())
}

fn parse_status_filter(raw: &str) -> AppResult<EmployeeStatus> {
    raw.trim()
        .to_ascii_lowercase()
        .parse::<EmployeeStatus>()
        .map_err(|_| AppError::bad_request("status must be one of active, inactive, terminated"))
}

async fn ensure_employee_exists(pool: &MySqlPool, employee_id: u64) -> AppResult<()> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM employees WHERE id = ?")
        .bind(employee_id)
        .fetch_one(pool)
        .await?;

    if count == 0 {
        return Err(AppError::not_found("Employee not found"));
    }
    Ok(())
}

/// Create Employee
#[utoipa::path(
    post,
    path = "/api/employees",
    request_body = CreateEmployee,
    responses(
        (status = 201, description = "Employee created successfully", body = Object, example = json!({
            "success": true,
            "message": "Employee created successfully",
            "data": { "id": 42 }
        })),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Employee code or email already in use")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn create_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateEmployee>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    payload.validate()?;

    let result = sqlx::query(
        r#"
        INSERT INTO employees
        (employee_code, first_name, last_name, email, phone, department_id, job_title_id,
         role, salary, hire_date)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.employee_code.trim())
    .bind(payload.first_name.trim())
    .bind(payload.last_name.trim())
    .bind(payload.email.trim())
    .bind(&payload.phone)
    .bind(payload.department_id)
    .bind(payload.job_title_id)
    .bind(payload.role.as_deref().unwrap_or("staff"))
    .bind(payload.salary.unwrap_or(0.0))
    .bind(payload.hire_date)
    .execute(pool.get_ref())
    .await
    .map_err(|e| conflict_on_duplicate(e, "Employee code or email already in use"))?;

    info!(employee_id = result.last_insert_id(), by = auth.user_id, "Employee created");

    Ok(created("Employee created successfully", result.last_insert_id()))
}

#[utoipa::path(
    get,
    path = "/api/employees",
    params(EmployeeQuery),
    responses(
        (status = 200, description = "Paginated employee list", body = Object)
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn list_employees(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<EmployeeQuery>,
) -> AppResult<HttpResponse> {
    auth.require_manager_or_above()?;

    let window = PageWindow::new(query.page, query.per_page, 20);

    // ---------- build WHERE clause dynamically ----------
    let mut conditions = Vec::new();
    let mut bindings: Vec<SqlValue> = Vec::new();

    if let Some(department_id) = query.department_id {
        conditions.push("department_id = ?");
        bindings.push(SqlValue::U64(department_id));
    }

    if let Some(job_title_id) = query.job_title_id {
        conditions.push("job_title_id = ?");
        bindings.push(SqlValue::U64(job_title_id));
    }

    if let Some(status) = query.status.as_deref() {
        let status = parse_status_filter(status)?;
        conditions.push("status = ?");
        bindings.push(SqlValue::String(status.as_ref().to_string()));
    }

    if let Some(search) = query.search.as_deref().filter(|s| !s.trim().is_empty()) {
        conditions.push("(first_name LIKE ? OR last_name LIKE ? OR email LIKE ?)");
        let like = format!("%{}%", search.trim());
        bindings.push(SqlValue::String(like.clone()));
        bindings.push(SqlValue::String(like.clone()));
        bindings.push(SqlValue::String(like));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    // ---------- total count ----------
    let count_sql = format!("SELECT COUNT(*) FROM employees {where_clause}");
    debug!(sql = %count_sql, bindings = ?bindings, "Counting employees");

    let total = bind_values!(sqlx::query_scalar::<_, i64>(&count_sql), bindings.clone())
        .fetch_one(pool.get_ref())
        .await?;

    // ---------- data query ----------
    let data_sql = format!(
        "SELECT {EMPLOYEE_COLUMNS} FROM employees {where_clause} ORDER BY id DESC LIMIT ? OFFSET ?"
    );
    debug!(sql = %data_sql, page = window.page, per_page = window.per_page, "Fetching employees");

    let employees = bind_values!(sqlx::query_as::<_, Employee>(&data_sql), bindings)
        .bind(window.limit())
        .bind(window.offset())
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(Paginated::new(employees, window, total)))
}

/// Get Employee by ID
#[utoipa::path(
    get,
    path = "/api/employees/{employee_id}",
    params(("employee_id" = u64, Path, description = "Employee ID")),
    responses(
        (status = 200, description = "Employee found", body = Employee),
        (status = 404, description = "Employee not found", body = Object, example = json!({
            "success": false,
            "message": "Employee not found"
        }))
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn get_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let employee_id = path.into_inner();

    if !auth.can_access_employee(employee_id) {
        return Err(AppError::Forbidden("Not allowed to view this employee".into()));
    }

    let employee = sqlx::query_as::<_, Employee>(&format!(
        "SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE id = ?"
    ))
    .bind(employee_id)
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or_else(|| AppError::not_found("Employee not found"))?;

    Ok(ok(employee))
}

/// Update Employee (partial)
#[utoipa::path(
    put,
    path = "/api/employees/{employee_id}",
    params(("employee_id" = u64, Path, description = "Employee ID")),
    request_body(content = Object, description = "Any subset of the employee fields"),
    responses(
        (status = 200, description = "Employee updated successfully"),
        (status = 400, description = "Unknown or invalid field"),
        (status = 404, description = "Employee not found")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn update_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    let employee_id = path.into_inner();
    validate_update(&body)?;

    let update = build_update_sql("employees", &body, UPDATABLE_COLUMNS, "id", employee_id)?;

    let affected = execute_update(pool.get_ref(), update)
        .await
        .map_err(|e| conflict_on_duplicate(e, "Employee code or email already in use"))?;

    // MySQL reports 0 rows for an unchanged row too
    if affected == 0 {
        ensure_employee_exists(pool.get_ref(), employee_id).await?;
    }

    Ok(done("Employee updated successfully"))
}

/// Delete Employee
#[utoipa::path(
    delete,
    path = "/api/employees/{employee_id}",
    params(("employee_id" = u64, Path, description = "Employee ID")),
    responses(
        (status = 200, description = "Successfully deleted"),
        (status = 404, description = "Employee not found")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn delete_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    let employee_id = path.into_inner();

    let result = sqlx::query("DELETE FROM employees WHERE id = ?")
        .bind(employee_id)
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Employee not found"));
    }

    info!(employee_id, by = auth.user_id, "Employee deleted");
    Ok(done("Successfully deleted"))
}

#[utoipa::path(
    get,
    path = "/api/employees/{employee_id}/documents",
    params(("employee_id" = u64, Path, description = "Employee ID")),
    responses((status = 200, description = "Documents attached to the employee", body = [EmployeeDocument])),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn list_documents(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let employee_id = path.into_inner();

    if !auth.can_access_employee(employee_id) {
        return Err(AppError::Forbidden("Not allowed to view these documents".into()));
    }

    let documents = sqlx::query_as::<_, EmployeeDocument>(
        r#"
        SELECT id, employee_id, title, url, public_id, uploaded_at
        FROM employee_documents
        WHERE employee_id = ?
        ORDER BY uploaded_at DESC
        "#,
    )
    .bind(employee_id)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(ok(documents))
}

/// Attach a file previously uploaded through `/upload`
#[utoipa::path(
    post,
    path = "/api/employees/{employee_id}/documents",
    params(("employee_id" = u64, Path, description = "Employee ID")),
    request_body = AttachDocument,
    responses(
        (status = 201, description = "Document attached"),
        (status = 404, description = "Employee not found")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn add_document(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<AttachDocument>,
) -> AppResult<HttpResponse> {
    let employee_id = path.into_inner();

    if !auth.can_access_employee(employee_id) {
        return Err(AppError::Forbidden("Not allowed to add documents here".into()));
    }

    require_non_empty("title", &payload.title)?;
    require_non_empty("url", &payload.url)?;
    require_non_empty("publicId", &payload.public_id)?;
    ensure_employee_exists(pool.get_ref(), employee_id).await?;

    let result = sqlx::query(
        r#"
        INSERT INTO employee_documents (employee_id, title, url, public_id)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(employee_id)
    .bind(payload.title.trim())
    .bind(&payload.url)
    .bind(&payload.public_id)
    .execute(pool.get_ref())
    .await?;

    Ok(created("Document attached", result.last_insert_id()))
}

/// Remove a document and its stored file
#[utoipa::path(
    delete,
    path = "/api/employees/{employee_id}/documents/{document_id}",
    params(
        ("employee_id" = u64, Path, description = "Employee ID"),
        ("document_id" = u64, Path, description = "Document ID")
    ),
    responses(
        (status = 200, description = "Document removed"),
        (status = 404, description = "Document not found")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn delete_document(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    media: web::Data<MediaHandle>,
    path: web::Path<(u64, u64)>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    let (employee_id, document_id) = path.into_inner();

    let public_id = sqlx::query_scalar::<_, String>(
        "SELECT public_id FROM employee_documents WHERE id = ? AND employee_id = ?",
    )
    .bind(document_id)
    .bind(employee_id)
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or_else(|| AppError::not_found("Document not found"))?;

    sqlx::query("DELETE FROM employee_documents WHERE id = ?")
        .bind(document_id)
        .execute(pool.get_ref())
        .await?;

    // the row is gone either way; a stale file is only logged
    match media.store() {
        Ok(store) => {
            if let Err(e) = store.destroy(&public_id).await {
                warn!(error = %e, public_id, "Failed to remove stored document");
            }
        }
        Err(_) => warn!(public_id, "File storage disabled, stored document left in place"),
    }

    Ok(done("Document removed"))
}

#[utoipa::path(
    get,
    path = "/api/employees/{employee_id}/attendance-summary",
    params(("employee_id" = u64, Path, description = "Employee ID")),
    responses((status = 200, description = "Attendance over the last 30 records", body = crate::model::attendance::AttendanceSummary)),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn attendance_summary(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let employee_id = path.into_inner();

    if !auth.can_access_employee(employee_id) {
        return Err(AppError::Forbidden("Not allowed to view this employee".into()));
    }

    let summary = attendance::load_summary(pool.get_ref(), employee_id).await?;
    Ok(ok(summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> CreateEmployee {
        CreateEmployee {
            employee_code: "EMP-1".into(),
            first_name: "Jane".into(),
            last_name: "Roe".into(),
            email: "jane.roe@company.com".into(),
            phone: None,
            department_id: 1,
            job_title_id: 1,
            role: None,
            salary: Some(1000.0),
            hire_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
        }
    }

    #[test]
    fn create_payload_validation() {
        assert!(payload().validate().is_ok());

        let mut bad = payload();
        bad.email = "jane.roe(at)company.com".into();
        assert!(bad.validate().is_err());

        let mut bad = payload();
        bad.first_name = " ".into();
        assert!(bad.validate().is_err());

        let mut bad = payload();
        bad.salary = Some(-1.0);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn update_payload_validation() {
        assert!(validate_update(&json!({ "first_name": "Ann", "status": "inactive" })).is_ok());
        assert!(validate_update(&json!({ "email": "nope" })).is_err());
        assert!(validate_update(&json!({ "email": 5 })).is_err());
        assert!(validate_update(&json!({ "status": "retired" })).is_err());
        assert!(validate_update(&json!({ "last_name": "" })).is_err());
        assert!(validate_update(&json!({ "salary": -10 })).is_err());
    }

    #[test]
    fn status_filter_accepts_known_values_only() {
        assert_eq!(parse_status_filter("active").unwrap(), EmployeeStatus::Active);
        assert_eq!(parse_status_filter(" Terminated ").unwrap(), EmployeeStatus::Terminated);
        assert!(matches!(parse_status_filter("retired"), Err(AppError::BadRequest(_))));
        assert!(parse_status_filter("active' OR '1'='1").is_err());
    }

    #[test]
    fn id_column_is_not_updatable() {
        assert!(
            build_update_sql("employees", &json!({ "id": 9 }), UPDATABLE_COLUMNS, "id", 1).is_err()
        );
    }
}
