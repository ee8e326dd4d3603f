use crate::{
    api::done,
    auth::{
        claims::{LinkEmployee, LoginReq, RegisterReq, TokenPair, TokenType, UserRow},
        jwt::{Subject, bearer, generate_access_token, generate_refresh_token, verify_token},
        password::{hash_password, verify_password},
        user::AuthUser,
    },
    config::Config,
    error::{AppError, AppResult, conflict_on_duplicate},
    model::role::Role,
    utils::username_index,
};
use actix_web::{HttpRequest, HttpResponse, web};
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{debug, error, info, instrument};

fn token_error(e: jsonwebtoken::errors::Error) -> AppError {
    AppError::Internal(anyhow::anyhow!("token signing failed: {e}"))
}

/// Issues an access/refresh pair and persists the refresh token id
async fn issue_tokens(
    subject: &Subject,
    pool: &MySqlPool,
    config: &Config,
) -> AppResult<TokenPair> {
    let access_token =
        generate_access_token(subject, &config.jwt_secret, config.access_token_ttl)
            .map_err(token_error)?;

    let (refresh_token, refresh_claims) =
        generate_refresh_token(subject, &config.jwt_secret, config.refresh_token_ttl)
            .map_err(token_error)?;

    debug!(user_id = subject.user_id, jti = %refresh_claims.jti, "Storing refresh token");

    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, jti, expires_at)
        VALUES (?, ?, FROM_UNIXTIME(?))
        "#,
    )
    .bind(subject.user_id)
    .bind(&refresh_claims.jti)
    .bind(refresh_claims.exp as i64)
    .execute(pool)
    .await?;

    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

/// User registration. Public sign-up always creates an unlinked Employee
/// account; HR links it to a profile and an administrator grants other roles.
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterReq,
    responses(
        (status = 201, description = "User registered"),
        (status = 400, description = "Missing username or password, or unknown field"),
        (status = 409, description = "Username already taken")
    ),
    tag = "Auth"
)]
pub async fn register(
    user: web::Json<RegisterReq>,
    pool: web::Data<MySqlPool>,
) -> AppResult<HttpResponse> {
    let username = user.username.trim();

    if username.is_empty() || user.password.is_empty() {
        return Err(AppError::bad_request("Username and password must not be empty"));
    }

    if user.password.len() < 8 {
        return Err(AppError::bad_request("Password must be at least 8 characters"));
    }

    if !username_index::is_available(username, pool.get_ref()).await {
        return Err(AppError::Conflict("Username already taken".into()));
    }

    let hashed = hash_password(&user.password)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("password hashing failed: {e}")))?;

    sqlx::query(r#"INSERT INTO users (username, password, role_id) VALUES (?, ?, ?)"#)
    .bind(username)
    .bind(hashed)
    .bind(Role::Employee.id())
    .execute(pool.get_ref())
    .await
    .map_err(|e| conflict_on_duplicate(e, "Username already exists"))?;

    username_index::mark_taken(username).await;
    info!(username, "User registered");

    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "message": "User registered successfully"
    })))
}

/// Links a user account to an employee profile. A profile backs at most one
/// account. The link shows up in tokens issued from the next login.
#[utoipa::path(
    put,
    path = "/api/users/{user_id}/employee",
    params(("user_id" = u64, Path, description = "User account id")),
    request_body = LinkEmployee,
    responses(
        (status = 200, description = "Account linked"),
        (status = 403, description = "HR/Admin only"),
        (status = 404, description = "User or employee not found"),
        (status = 409, description = "Employee already linked to another account")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn link_employee(
    auth: AuthUser,
    path: web::Path<u64>,
    body: web::Json<LinkEmployee>,
    pool: web::Data<MySqlPool>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let user_id = path.into_inner();
    let employee_id = body.employee_id;
    let pool = pool.get_ref();

    let user_exists = sqlx::query_scalar::<_, u64>("SELECT id FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .is_some();
    if !user_exists {
        return Err(AppError::not_found("User not found"));
    }

    let employee_exists = sqlx::query_scalar::<_, u64>("SELECT id FROM employees WHERE id = ?")
        .bind(employee_id)
        .fetch_optional(pool)
        .await?
        .is_some();
    if !employee_exists {
        return Err(AppError::not_found("Employee not found"));
    }

    sqlx::query("UPDATE users SET employee_id = ? WHERE id = ?")
        .bind(employee_id)
        .bind(user_id)
        .execute(pool)
        .await
        .map_err(|e| conflict_on_duplicate(e, "Employee already linked to another account"))?;

    info!(user_id, employee_id, linked_by = auth.user_id, "Employee linked to user");
    Ok(done("Employee linked to user"))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginReq,
    responses(
        (status = 200, description = "Token pair", body = TokenPair),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "Auth"
)]
#[instrument(
    name = "auth_login",
    skip(pool, config, user),
    fields(username = %user.username)
)]
pub async fn login(
    user: web::Json<LoginReq>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    info!("Login request received");

    if user.username.trim().is_empty() || user.password.is_empty() {
        return Err(AppError::bad_request("Username or password required"));
    }

    let db_user = sqlx::query_as::<_, UserRow>(
        r#"
        SELECT id, username, password, role_id, employee_id, is_active
        FROM users
        WHERE username = ?
        "#,
    )
    .bind(user.username.trim())
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or_else(|| {
        info!("Invalid credentials: user not found");
        AppError::Unauthorized("Invalid credentials".into())
    })?;

    if let Err(e) = verify_password(&user.password, &db_user.password) {
        info!(error = %e, "Invalid credentials: password mismatch");
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    }

    if !db_user.is_active {
        return Err(AppError::Forbidden("Account is disabled".into()));
    }

    let subject = Subject {
        user_id: db_user.id,
        username: db_user.username,
        role: db_user.role_id,
        employee_id: db_user.employee_id,
    };

    let tokens = issue_tokens(&subject, pool.get_ref(), &config).await?;

    // non-fatal
    if let Err(e) = sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = ?")
        .bind(db_user.id)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to update last_login_at");
    }

    username_index::mark_taken(&subject.username).await;
    info!("Login successful");

    Ok(HttpResponse::Ok().json(tokens))
}

/// Rotates a refresh token. The presented token is revoked and a new pair issued.
#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "New token pair", body = TokenPair),
        (status = 401, description = "Refresh token invalid, expired or revoked")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn refresh_token(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    let unauthorized = || AppError::Unauthorized("Invalid refresh token".into());

    let token = bearer(
        req.headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok()),
    )
    .ok_or_else(unauthorized)?;

    let claims = verify_token(token, &config.jwt_secret).map_err(|_| unauthorized())?;

    if claims.token_type != TokenType::Refresh {
        return Err(unauthorized());
    }

    // only the first concurrent rotation wins
    let revoked = sqlx::query(
        r#"
        UPDATE refresh_tokens
        SET revoked = TRUE
        WHERE jti = ? AND revoked = FALSE AND expires_at > NOW()
        "#,
    )
    .bind(&claims.jti)
    .execute(pool.get_ref())
    .await?;

    if revoked.rows_affected() == 0 {
        return Err(unauthorized());
    }

    let tokens = issue_tokens(&Subject::from(&claims), pool.get_ref(), &config).await?;

    Ok(HttpResponse::Ok().json(tokens))
}

/// Revokes the presented refresh token. Always answers 204.
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 204, description = "Logged out")),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn logout(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> HttpResponse {
    let Some(token) = bearer(
        req.headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok()),
    ) else {
        return HttpResponse::NoContent().finish();
    };

    let claims = match verify_token(token, &config.jwt_secret) {
        Ok(c) if c.token_type == TokenType::Refresh => c,
        _ => return HttpResponse::NoContent().finish(),
    };

    if let Err(e) = sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE jti = ?")
        .bind(&claims.jti)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to revoke refresh token");
    }

    HttpResponse::NoContent().finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, test};
    use serde_json::json;
    use sqlx::mysql::MySqlPoolOptions;

    // never connects; every request below is rejected before a query runs
    fn lazy_pool() -> web::Data<MySqlPool> {
        web::Data::new(
            MySqlPoolOptions::new()
                .connect_lazy("mysql://localhost/hrm_test")
                .unwrap(),
        )
    }

    fn auth_header(config: &Config, role: u8) -> String {
        let token = generate_access_token(
            &Subject {
                user_id: 7,
                username: "someone".into(),
                role,
                employee_id: Some(3),
            },
            &config.jwt_secret,
            60,
        )
        .unwrap();
        format!("Bearer {token}")
    }

    #[actix_web::test]
    async fn register_rejects_self_chosen_employee_profile() {
        let app = test::init_service(
            App::new()
                .app_data(lazy_pool())
                .route("/auth/register", web::post().to(register)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/auth/register")
            .set_json(json!({
                "username": "mallory",
                "password": "long enough password",
                "employee_id": 1
            }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);

        let req = test::TestRequest::post()
            .uri("/auth/register")
            .set_json(json!({ "username": "mallory", "password": "short" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);
    }

    #[actix_web::test]
    async fn only_hr_or_admin_can_link_employees() {
        let config = Config::for_tests();
        let employee = auth_header(&config, Role::Employee.id());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(config))
                .app_data(lazy_pool())
                .route("/api/users/{id}/employee", web::put().to(link_employee)),
        )
        .await;

        let req = test::TestRequest::put()
            .uri("/api/users/7/employee")
            .insert_header(("Authorization", employee))
            .set_json(json!({ "employee_id": 1 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 403);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
    }

    #[actix_web::test]
    async fn link_requires_an_employee_id() {
        let config = Config::for_tests();
        let hr = auth_header(&config, Role::Hr.id());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(config))
                .app_data(lazy_pool())
                .route("/api/users/{id}/employee", web::put().to(link_employee)),
        )
        .await;

        let req = test::TestRequest::put()
            .uri("/api/users/7/employee")
            .insert_header(("Authorization", hr))
            .set_json(json!({}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);
    }
}
