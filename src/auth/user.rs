use crate::auth::claims::TokenType;
use crate::auth::jwt::{bearer, verify_token};
use crate::config::Config;
use crate::error::AppError;
use crate::model::role::Role;
use actix_web::{
    FromRequest, HttpMessage, HttpRequest, dev::Payload, error::ErrorUnauthorized, web::Data,
};
use futures::future::{Ready, ready};

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub username: String,
    pub role: Role,

    /// Present only if this user is linked to an employee record
    pub employee_id: Option<u64>,
}

impl AuthUser {
    /// Builds the user from a bearer token; only access tokens are accepted
    pub fn from_token(token: &str, secret: &str) -> Result<Self, &'static str> {
        let claims = verify_token(token, secret).map_err(|_| "Invalid or expired token")?;

        if claims.token_type != TokenType::Access {
            return Err("Access token required");
        }

        let role = Role::from_id(claims.role).ok_or("Invalid role")?;

        Ok(AuthUser {
            user_id: claims.user_id,
            username: claims.sub,
            role,
            employee_id: claims.employee_id,
        })
    }
}

impl FromRequest for AuthUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        // set by auth_middleware on protected scopes
        if let Some(user) = req.extensions().get::<AuthUser>() {
            return ready(Ok(user.clone()));
        }

        let token = match bearer(
            req.headers()
                .get("Authorization")
                .and_then(|h| h.to_str().ok()),
        ) {
            Some(t) => t,
            None => return ready(Err(ErrorUnauthorized("Missing token"))),
        };

        let config = match req.app_data::<Data<Config>>() {
            Some(c) => c,
            None => {
                return ready(Err(actix_web::error::ErrorInternalServerError(
                    "Config missing",
                )));
            }
        };

        ready(AuthUser::from_token(token, &config.jwt_secret).map_err(ErrorUnauthorized))
    }
}

impl AuthUser {
    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(AppError::Forbidden("Admin only".into()))
        }
    }

    pub fn require_hr_or_admin(&self) -> Result<(), AppError> {
        if matches!(self.role, Role::Admin | Role::Hr) {
            Ok(())
        } else {
            Err(AppError::Forbidden("HR/Admin only".into()))
        }
    }

    pub fn require_manager_or_above(&self) -> Result<(), AppError> {
        if self.role.is_manager_or_above() {
            Ok(())
        } else {
            Err(AppError::Forbidden("Manager/HR/Admin only".into()))
        }
    }

    /// Employee profile of the caller, for self-service endpoints
    pub fn employee(&self) -> Result<u64, AppError> {
        self.employee_id
            .ok_or_else(|| AppError::Forbidden("No employee profile".into()))
    }

    /// Callers may read their own records; managers and above may read anyone's
    pub fn can_access_employee(&self, employee_id: u64) -> bool {
        self.role.is_manager_or_above() || self.employee_id == Some(employee_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::{Subject, generate_access_token, generate_refresh_token};

    fn subject(role: u8) -> Subject {
        Subject {
            user_id: 1,
            username: "hr.lead".into(),
            role,
            employee_id: Some(5),
        }
    }

    #[test]
    fn refresh_tokens_cannot_authenticate_requests() {
        let (refresh, _) = generate_refresh_token(&subject(2), "k", 60).unwrap();
        assert_eq!(
            AuthUser::from_token(&refresh, "k").unwrap_err(),
            "Access token required"
        );
    }

    #[test]
    fn unknown_role_is_rejected() {
        let token = generate_access_token(&subject(42), "k", 60).unwrap();
        assert_eq!(AuthUser::from_token(&token, "k").unwrap_err(), "Invalid role");
    }

    #[test]
    fn role_checks() {
        let token = generate_access_token(&subject(2), "k", 60).unwrap();
        let hr = AuthUser::from_token(&token, "k").unwrap();

        assert!(hr.require_hr_or_admin().is_ok());
        assert!(hr.require_manager_or_above().is_ok());
        assert!(hr.require_admin().is_err());
        assert!(hr.can_access_employee(99));
        assert_eq!(hr.employee().unwrap(), 5);
    }

    #[test]
    fn employees_only_see_themselves() {
        let token = generate_access_token(&subject(3), "k", 60).unwrap();
        let me = AuthUser::from_token(&token, "k").unwrap();

        assert!(me.can_access_employee(5));
        assert!(!me.can_access_employee(6));
        assert!(me.require_manager_or_above().is_err());
    }
}
