use crate::{
    api::{
        attendance, candidate, dashboard, department, employee, leave_request, mail,
        notification, payroll, project, task, upload,
    },
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use anyhow::{Context, Result};
use std::sync::Arc;

type Limiter = Arc<Governor<PeerIpKeyExtractor, NoOpMiddleware>>;

/// Milliseconds between replenished requests for a per-minute budget
fn replenish_interval_ms(requests_per_min: u32) -> u64 {
    (60_000 / u64::from(requests_per_min.max(1))).max(1)
}

fn build_limiter(name: &str, requests_per_min: u32) -> Result<Limiter> {
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(replenish_interval_ms(requests_per_min))
        .burst_size(requests_per_min.max(1))
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .with_context(|| format!("invalid rate limit for {name}: {requests_per_min}/min"))?;
    Ok(Arc::new(Governor::new(&cfg)))
}

/// Per-IP limiters, built once and shared by every worker
#[derive(Clone)]
pub struct Limiters {
    login: Limiter,
    register: Limiter,
    refresh: Limiter,
    protected: Limiter,
    upload: Limiter,
}

impl Limiters {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            login: build_limiter("login", config.rate_login_per_min)?,
            register: build_limiter("register", config.rate_register_per_min)?,
            refresh: build_limiter("refresh", config.rate_refresh_per_min)?,
            protected: build_limiter("protected routes", config.rate_protected_per_min)?,
            upload: build_limiter("upload", config.rate_upload_per_min)?,
        })
    }
}

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config, limiters: &Limiters) {
    // Public routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/login")
                    .wrap(limiters.login.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/register")
                    .wrap(limiters.register.clone())
                    .route(web::post().to(handlers::register)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(limiters.refresh.clone())
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(limiters.login.clone())
                    .route(web::post().to(handlers::logout)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware))
            .wrap(limiters.protected.clone())
            .service(
                web::resource("/users/{id}/employee")
                    .route(web::put().to(handlers::link_employee)),
            )
            .service(
                web::scope("/employees")
                    .service(
                        web::resource("")
                            .route(web::post().to(employee::create_employee))
                            .route(web::get().to(employee::list_employees)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(employee::get_employee))
                            .route(web::put().to(employee::update_employee))
                            .route(web::delete().to(employee::delete_employee)),
                    )
                    .service(
                        web::resource("/{id}/documents")
                            .route(web::get().to(employee::list_documents))
                            .route(web::post().to(employee::add_document)),
                    )
                    .service(
                        web::resource("/{id}/documents/{document_id}")
                            .route(web::delete().to(employee::delete_document)),
                    )
                    .service(
                        web::resource("/{id}/attendance-summary")
                            .route(web::get().to(employee::attendance_summary)),
                    ),
            )
            .service(
                web::scope("/departments")
                    .service(
                        web::resource("")
                            .route(web::get().to(department::list_departments))
                            .route(web::post().to(department::create_department)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(department::get_department))
                            .route(web::put().to(department::update_department))
                            .route(web::delete().to(department::delete_department)),
                    )
                    .service(
                        web::resource("/{id}/members")
                            .route(web::get().to(department::department_members)),
                    ),
            )
            .service(
                web::scope("/projects")
                    .service(
                        web::resource("")
                            .route(web::get().to(project::list_projects))
                            .route(web::post().to(project::create_project)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(project::get_project))
                            .route(web::put().to(project::update_project))
                            .route(web::delete().to(project::delete_project)),
                    )
                    .service(
                        web::resource("/{id}/members")
                            .route(web::put().to(project::replace_members)),
                    ),
            )
            .service(
                web::scope("/tasks")
                    .service(
                        web::resource("")
                            .route(web::get().to(task::list_tasks))
                            .route(web::post().to(task::create_task)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(task::get_task))
                            .route(web::delete().to(task::delete_task)),
                    )
                    .service(
                        web::resource("/{id}/status")
                            .route(web::put().to(task::update_task_status)),
                    ),
            )
            .service(
                web::scope("/task-responses")
                    .service(web::resource("").route(web::post().to(task::create_response)))
                    .service(
                        web::resource("/task/{task_id}")
                            .route(web::get().to(task::list_responses)),
                    )
                    .service(
                        web::resource("/{id}/review")
                            .route(web::put().to(task::review_response)),
                    ),
            )
            .service(
                web::scope("/attendance")
                    .service(
                        web::resource("")
                            .route(web::post().to(attendance::punch_in))
                            .route(web::put().to(attendance::punch_out)),
                    )
                    .service(web::resource("/me").route(web::get().to(attendance::my_attendance)))
                    .service(
                        web::resource("/me/summary").route(web::get().to(attendance::my_summary)),
                    )
                    .service(
                        web::resource("/absences")
                            .route(web::post().to(attendance::record_absences)),
                    ),
            )
            .service(
                web::scope("/payroll")
                    .service(
                        web::resource("")
                            .route(web::post().to(payroll::create_payroll))
                            .route(web::get().to(payroll::list_payrolls)),
                    )
                    // before /{id} so "report" is not taken for an id
                    .service(web::resource("/report").route(web::get().to(payroll::payroll_report)))
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(payroll::get_payroll))
                            .route(web::put().to(payroll::update_payroll)),
                    ),
            )
            .service(
                web::scope("/payroll-periods")
                    .service(
                        web::resource("")
                            .route(web::get().to(payroll::list_periods))
                            .route(web::post().to(payroll::create_period)),
                    )
                    .service(
                        web::resource("/{id}/activate")
                            .route(web::put().to(payroll::activate_period)),
                    )
                    .service(
                        web::resource("/{id}/close").route(web::put().to(payroll::close_period)),
                    ),
            )
            .service(
                web::scope("/leave")
                    .service(
                        web::resource("")
                            .route(web::get().to(leave_request::list_leaves))
                            .route(web::post().to(leave_request::create_leave)),
                    )
                    .service(web::resource("/{id}").route(web::get().to(leave_request::get_leave)))
                    .service(
                        web::resource("/{id}/approve")
                            .route(web::put().to(leave_request::approve_leave)),
                    )
                    .service(
                        web::resource("/{id}/reject")
                            .route(web::put().to(leave_request::reject_leave)),
                    ),
            )
            .service(
                web::scope("/candidates")
                    .service(
                        web::resource("")
                            .route(web::get().to(candidate::list_candidates))
                            .route(web::post().to(candidate::create_candidate)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(candidate::get_candidate))
                            .route(web::put().to(candidate::update_candidate))
                            .route(web::delete().to(candidate::delete_candidate)),
                    )
                    .service(
                        web::resource("/{id}/stage").route(web::put().to(candidate::move_stage)),
                    ),
            )
            .service(
                web::scope("/mail")
                    .service(web::resource("").route(web::post().to(mail::send_mail)))
                    .service(web::resource("/inbox").route(web::get().to(mail::inbox)))
                    .service(web::resource("/outbox").route(web::get().to(mail::outbox)))
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(mail::get_mail))
                            .route(web::delete().to(mail::delete_mail)),
                    )
                    .service(web::resource("/{id}/star").route(web::put().to(mail::toggle_star)))
                    .service(web::resource("/{id}/read").route(web::put().to(mail::toggle_read)))
                    .service(web::resource("/{id}/thread").route(web::get().to(mail::thread))),
            )
            .service(
                web::scope("/notifications")
                    .service(
                        web::resource("").route(web::get().to(notification::list_notifications)),
                    )
                    .service(
                        web::resource("/read-all")
                            .route(web::put().to(notification::mark_all_read)),
                    )
                    .service(
                        web::resource("/{id}/read").route(web::put().to(notification::mark_read)),
                    ),
            )
            .service(
                web::scope("/upload")
                    .wrap(limiters.upload.clone())
                    .service(web::resource("").route(web::delete().to(upload::delete_upload)))
                    .service(web::resource("/single").route(web::post().to(upload::upload_single)))
                    .service(
                        web::resource("/multiple").route(web::post().to(upload::upload_multiple)),
                    ),
            )
            .service(
                web::scope("/dashboard")
                    .service(web::resource("/me").route(web::get().to(dashboard::my_dashboard)))
                    .service(
                        web::resource("/admin").route(web::get().to(dashboard::admin_dashboard)),
                    ),
            ),
    );
}

// LOGIN
//  ├─ access_token (15 min)
//  └─ refresh_token (7 days)

// API REQUEST
//  └─ Authorization: Bearer access_token

// ACCESS EXPIRED
//  └─ POST /auth/refresh with refresh_token
//       └─ returns new access_token

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replenish_interval_never_hits_zero() {
        assert_eq!(replenish_interval_ms(60), 1_000);
        assert_eq!(replenish_interval_ms(0), 60_000);
        assert_eq!(replenish_interval_ms(1_000_000), 1);
    }

    #[test]
    fn zero_budget_still_builds_a_limiter() {
        assert!(build_limiter("login", 0).is_ok());
    }
}
