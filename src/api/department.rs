use crate::{
    api::{created, done, ok},
    auth::user::AuthUser,
    error::{AppError, AppResult, conflict_on_duplicate},
    model::department::{Department, DepartmentMember},
    utils::{
        db_utils::{build_update_sql, execute_update},
        validation::require_non_empty,
    },
};
use actix_web::{HttpResponse, web};
use serde::Deserialize;
use serde_json::Value;
use sqlx::MySqlPool;
use std::collections::BTreeMap;
use tracing::info;
use utoipa::ToSchema;

const UPDATABLE_COLUMNS: &[&str] = &["name", "description", "head_id", "budget"];

#[derive(Deserialize, ToSchema)]
pub struct CreateDepartment {
    #[schema(example = "Finance")]
    pub name: String,
    pub description: Option<String>,
    #[schema(example = 12)]
    pub head_id: Option<u64>,
    #[schema(example = 250000.0)]
    pub budget: Option<f64>,
}

/// Groups member rows by their role label, keeping row order inside a group
pub fn group_by_role(members: Vec<DepartmentMember>) -> BTreeMap<String, Vec<DepartmentMember>> {
    let mut grouped: BTreeMap<String, Vec<DepartmentMember>> = BTreeMap::new();
    for member in members {
        grouped.entry(member.role.clone()).or_default().push(member);
    }
    grouped
}

#[utoipa::path(
    get,
    path = "/api/departments",
    responses((status = 200, description = "All departments", body = [Department])),
    security(("bearer_auth" = [])),
    tag = "Department"
)]
pub async fn list_departments(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> AppResult<HttpResponse> {
    let departments = sqlx::query_as::<_, Department>(
        "SELECT id, name, description, head_id, budget FROM departments ORDER BY name",
    )
    .fetch_all(pool.get_ref())
    .await?;

    Ok(ok(departments))
}

#[utoipa::path(
    get,
    path = "/api/departments/{department_id}",
    params(("department_id" = u64, Path, description = "Department ID")),
    responses(
        (status = 200, description = "Department found", body = Department),
        (status = 404, description = "Department not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Department"
)]
pub async fn get_department(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let department = sqlx::query_as::<_, Department>(
        "SELECT id, name, description, head_id, budget FROM departments WHERE id = ?",
    )
    .bind(path.into_inner())
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or_else(|| AppError::not_found("Department not found"))?;

    Ok(ok(department))
}

#[utoipa::path(
    post,
    path = "/api/departments",
    request_body = CreateDepartment,
    responses(
        (status = 201, description = "Department created"),
        (status = 400, description = "Name is required"),
        (status = 409, description = "Department name already exists")
    ),
    security(("bearer_auth" = [])),
    tag = "Department"
)]
pub async fn create_department(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateDepartment>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    require_non_empty("name", &payload.name)?;

    let result = sqlx::query(
        "INSERT INTO departments (name, description, head_id, budget) VALUES (?, ?, ?, ?)",
    )
    .bind(payload.name.trim())
    .bind(&payload.description)
    .bind(payload.head_id)
    .bind(payload.budget.unwrap_or(0.0))
    .execute(pool.get_ref())
    .await
    .map_err(|e| conflict_on_duplicate(e, "Department name already exists"))?;

    info!(department_id = result.last_insert_id(), "Department created");
    Ok(created("Department created", result.last_insert_id()))
}

#[utoipa::path(
    put,
    path = "/api/departments/{department_id}",
    params(("department_id" = u64, Path, description = "Department ID")),
    request_body(content = Object, description = "Any of name, description, head_id, budget"),
    responses(
        (status = 200, description = "Department updated"),
        (status = 404, description = "Department not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Department"
)]
pub async fn update_department(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let department_id = path.into_inner();

    if let Some(name) = body.get("name") {
        require_non_empty("name", name.as_str().unwrap_or_default())?;
    }

    let update = build_update_sql("departments", &body, UPDATABLE_COLUMNS, "id", department_id)?;
    let affected = execute_update(pool.get_ref(), update)
        .await
        .map_err(|e| conflict_on_duplicate(e, "Department name already exists"))?;

    if affected == 0 {
        let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM departments WHERE id = ?")
            .bind(department_id)
            .fetch_one(pool.get_ref())
            .await?;
        if exists == 0 {
            return Err(AppError::not_found("Department not found"));
        }
    }

    Ok(done("Department updated"))
}

#[utoipa::path(
    delete,
    path = "/api/departments/{department_id}",
    params(("department_id" = u64, Path, description = "Department ID")),
    responses(
        (status = 200, description = "Department deleted"),
        (status = 404, description = "Department not found"),
        (status = 409, description = "Department still has employees")
    ),
    security(("bearer_auth" = [])),
    tag = "Department"
)]
pub async fn delete_department(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let department_id = path.into_inner();

    let members = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM employees WHERE department_id = ?",
    )
    .bind(department_id)
    .fetch_one(pool.get_ref())
    .await?;

    if members > 0 {
        return Err(AppError::Conflict(format!(
            "Department still has {members} employee(s)"
        )));
    }

    let result = sqlx::query("DELETE FROM departments WHERE id = ?")
        .bind(department_id)
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Department not found"));
    }

    sqlx::query("DELETE FROM project_departments WHERE department_id = ?")
        .bind(department_id)
        .execute(pool.get_ref())
        .await?;

    info!(department_id, "Department deleted");
    Ok(done("Department deleted"))
}

#[utoipa::path(
    get,
    path = "/api/departments/{department_id}/members",
    params(("department_id" = u64, Path, description = "Department ID")),
    responses(
        (status = 200, description = "Members grouped by role", body = Object, example = json!({
            "success": true,
            "data": {
                "engineer": [{ "id": 4, "first_name": "Sam", "last_name": "Lee", "email": "sam@company.com", "role": "engineer" }],
                "lead": [{ "id": 2, "first_name": "Kim", "last_name": "Ray", "email": "kim@company.com", "role": "lead" }]
            }
        })),
        (status = 404, description = "Department not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Department"
)]
pub async fn department_members(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let department_id = path.into_inner();

    let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM departments WHERE id = ?")
        .bind(department_id)
        .fetch_one(pool.get_ref())
        .await?;
    if exists == 0 {
        return Err(AppError::not_found("Department not found"));
    }

    let members = sqlx::query_as::<_, DepartmentMember>(
        r#"
        SELECT id, first_name, last_name, email, role
        FROM employees
        WHERE department_id = ? AND status = 'active'
        ORDER BY role, last_name, first_name
        "#,
    )
    .bind(department_id)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(ok(group_by_role(members)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(id: u64, role: &str) -> DepartmentMember {
        DepartmentMember {
            id,
            first_name: format!("F{id}"),
            last_name: format!("L{id}"),
            email: format!("m{id}@company.com"),
            role: role.into(),
        }
    }

    #[test]
    fn members_are_grouped_by_role() {
        let grouped = group_by_role(vec![
            member(1, "engineer"),
            member(2, "lead"),
            member(3, "engineer"),
        ]);

        assert_eq!(grouped.len(), 2);
        let engineers: Vec<u64> = grouped["engineer"].iter().map(|m| m.id).collect();
        assert_eq!(engineers, vec![1, 3]);
        assert_eq!(grouped["lead"].len(), 1);
    }

    #[test]
    fn empty_department_has_no_groups() {
        assert!(group_by_role(Vec::new()).is_empty());
    }
}
