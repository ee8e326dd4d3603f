use crate::{
    api::{created, done, ok},
    auth::user::AuthUser,
    error::{AppError, AppResult},
    model::candidate::{Candidate, Stage},
    utils::{
        db_utils::{SqlValue, bind_values, build_update_sql, execute_update},
        pagination::{PageWindow, Paginated},
        validation::{require_email, require_non_empty},
    },
};
use actix_web::{HttpResponse, web};
use serde::Deserialize;
use serde_json::Value;
use sqlx::MySqlPool;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

const CANDIDATE_COLUMNS: &str =
    "id, name, email, phone, position, resume_url, stage, notes, created_at";

/// Stage is only changed through `PUT /candidates/{id}/stage`
const UPDATABLE_COLUMNS: &[&str] = &["name", "email", "phone", "position", "resume_url", "notes"];

#[derive(Deserialize, ToSchema)]
pub struct CreateCandidate {
    #[schema(example = "Ada Lovelace")]
    pub name: String,
    #[schema(example = "ada@example.com")]
    pub email: String,
    pub phone: Option<String>,
    #[schema(example = "Backend Engineer")]
    pub position: String,
    pub resume_url: Option<String>,
    pub notes: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct MoveStage {
    pub stage: Stage,
}

#[derive(Deserialize, IntoParams)]
pub struct CandidateQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub stage: Option<String>,
    /// Substring match on the position
    pub position: Option<String>,
}

async fn current_stage(pool: &MySqlPool, candidate_id: u64) -> AppResult<Stage> {
    let stage = sqlx::query_scalar::<_, String>("SELECT stage FROM candidates WHERE id = ?")
        .bind(candidate_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Candidate not found"))?;

    stage
        .parse::<Stage>()
        .map_err(|_| AppError::Internal(anyhow::anyhow!("unknown stage '{stage}' stored for candidate {candidate_id}")))
}

#[utoipa::path(
    get,
    path = "/api/candidates",
    params(CandidateQuery),
    responses((status = 200, description = "Paginated candidates", body = Object)),
    security(("bearer_auth" = [])),
    tag = "Recruitment"
)]
pub async fn list_candidates(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<CandidateQuery>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let window = PageWindow::new(query.page, query.per_page, 20);

    let mut conditions = Vec::new();
    let mut bindings = Vec::new();

    if let Some(stage) = query.stage.as_deref() {
        let stage = stage
            .parse::<Stage>()
            .map_err(|_| AppError::bad_request(format!("Unknown stage '{stage}'")))?;
        conditions.push("stage = ?");
        bindings.push(SqlValue::String(stage.as_ref().to_string()));
    }

    if let Some(position) = query.position.as_deref().filter(|p| !p.trim().is_empty()) {
        conditions.push("position LIKE ?");
        bindings.push(SqlValue::String(format!("%{}%", position.trim())));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    let count_sql = format!("SELECT COUNT(*) FROM candidates {where_clause}");
    let total = bind_values!(
        sqlx::query_scalar::<_, i64>(&count_sql),
        bindings.clone()
    )
    .fetch_one(pool.get_ref())
    .await?;

    let data_sql = format!(
        "SELECT {CANDIDATE_COLUMNS} FROM candidates {where_clause} \
         ORDER BY created_at DESC LIMIT ? OFFSET ?"
    );
    let data = bind_values!(sqlx::query_as::<_, Candidate>(&data_sql), bindings)
        .bind(window.limit())
        .bind(window.offset())
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(Paginated::new(data, window, total)))
}

#[utoipa::path(
    get,
    path = "/api/candidates/{candidate_id}",
    params(("candidate_id" = u64, Path, description = "Candidate ID")),
    responses(
        (status = 200, description = "Candidate found", body = Candidate),
        (status = 404, description = "Candidate not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Recruitment"
)]
pub async fn get_candidate(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    let candidate = sqlx::query_as::<_, Candidate>(&format!(
        "SELECT {CANDIDATE_COLUMNS} FROM candidates WHERE id = ?"
    ))
    .bind(path.into_inner())
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or_else(|| AppError::not_found("Candidate not found"))?;

    Ok(ok(candidate))
}

#[utoipa::path(
    post,
    path = "/api/candidates",
    request_body = CreateCandidate,
    responses(
        (status = 201, description = "Candidate created in the applied stage"),
        (status = 400, description = "Validation failed")
    ),
    security(("bearer_auth" = [])),
    tag = "Recruitment"
)]
pub async fn create_candidate(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateCandidate>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    require_non_empty("name", &payload.name)?;
    require_non_empty("position", &payload.position)?;
    require_email("email", &payload.email)?;

    let result = sqlx::query(
        r#"
        INSERT INTO candidates (name, email, phone, position, resume_url, stage, notes)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.name.trim())
    .bind(payload.email.trim())
    .bind(&payload.phone)
    .bind(payload.position.trim())
    .bind(&payload.resume_url)
    .bind(Stage::Applied.as_ref())
    .bind(&payload.notes)
    .execute(pool.get_ref())
    .await?;

    info!(candidate_id = result.last_insert_id(), "Candidate created");
    Ok(created("Candidate created", result.last_insert_id()))
}

#[utoipa::path(
    put,
    path = "/api/candidates/{candidate_id}",
    params(("candidate_id" = u64, Path, description = "Candidate ID")),
    request_body(content = Object, description = "Any of name, email, phone, position, resume_url, notes"),
    responses(
        (status = 200, description = "Candidate updated"),
        (status = 400, description = "Unknown or invalid field"),
        (status = 404, description = "Candidate not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Recruitment"
)]
pub async fn update_candidate(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let candidate_id = path.into_inner();

    if let Some(email) = body.get("email") {
        require_email("email", email.as_str().unwrap_or_default())?;
    }
    for field in ["name", "position"] {
        if let Some(v) = body.get(field) {
            require_non_empty(field, v.as_str().unwrap_or_default())?;
        }
    }

    current_stage(pool.get_ref(), candidate_id).await?;

    let update = build_update_sql("candidates", &body, UPDATABLE_COLUMNS, "id", candidate_id)?;
    execute_update(pool.get_ref(), update).await?;

    Ok(done("Candidate updated"))
}

#[utoipa::path(
    delete,
    path = "/api/candidates/{candidate_id}",
    params(("candidate_id" = u64, Path, description = "Candidate ID")),
    responses(
        (status = 200, description = "Candidate deleted"),
        (status = 404, description = "Candidate not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Recruitment"
)]
pub async fn delete_candidate(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    let result = sqlx::query("DELETE FROM candidates WHERE id = ?")
        .bind(path.into_inner())
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Candidate not found"));
    }

    Ok(done("Candidate deleted"))
}

/// Moves a candidate through the hiring pipeline
#[utoipa::path(
    put,
    path = "/api/candidates/{candidate_id}/stage",
    params(("candidate_id" = u64, Path, description = "Candidate ID")),
    request_body = MoveStage,
    responses(
        (status = 200, description = "Stage changed"),
        (status = 400, description = "Transition not allowed", body = Object, example = json!({
            "success": false,
            "message": "Cannot move candidate from applied to offered"
        })),
        (status = 404, description = "Candidate not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Recruitment"
)]
pub async fn move_stage(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<MoveStage>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let candidate_id = path.into_inner();

    let from = current_stage(pool.get_ref(), candidate_id).await?;
    let to = payload.stage;

    if !from.can_move_to(to) {
        return Err(AppError::bad_request(format!(
            "Cannot move candidate from {from} to {to}"
        )));
    }

    // compare-and-set on the stage read above
    let result = sqlx::query("UPDATE candidates SET stage = ? WHERE id = ? AND stage = ?")
        .bind(to.as_ref())
        .bind(candidate_id)
        .bind(from.as_ref())
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Conflict("Candidate stage changed concurrently, retry".into()));
    }

    info!(candidate_id, from = %from, to = %to, by = auth.user_id, "Candidate stage changed");
    Ok(done(&format!("Candidate moved to {to}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stage_payload_parses_lowercase() {
        let m: MoveStage = serde_json::from_value(json!({ "stage": "interview" })).unwrap();
        assert_eq!(m.stage, Stage::Interview);
        assert!(serde_json::from_value::<MoveStage>(json!({ "stage": "Onboarded" })).is_err());
    }

    #[test]
    fn stage_is_not_a_free_update() {
        let err = build_update_sql(
            "candidates",
            &json!({ "stage": "hired" }),
            UPDATABLE_COLUMNS,
            "id",
            1,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
