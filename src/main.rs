use actix_web::middleware::{Logger, NormalizePath};
use actix_web::web::{self, Data};
use actix_web::{App, HttpServer, Responder, get};
use anyhow::Context;
use std::sync::Arc;

mod api;
mod auth;
mod config;
mod db;
mod docs;
mod error;
mod mailer;
mod media;
mod model;
mod routes;
mod utils;

use crate::config::Config;
use crate::docs::ApiDoc;
use crate::error::AppError;
use crate::mailer::{MailerHandle, SmtpMailer};
use crate::media::{CloudinaryClient, MediaHandle};
use crate::routes::Limiters;
use crate::utils::username_index;
use tracing::{error, info, warn};
use tracing_appender::rolling;
use utoipa::OpenApi; // ← needed for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

#[get("/")]
async fn index() -> impl Responder {
    "HRM portal is running"
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!("Server starting...");

    let pool = db::init_db(&config.database_url)
        .await
        .context("failed to connect to database")?;
    db::migrate(&pool).await.context("failed to run migrations")?;

    let pool_for_warmup = pool.clone();
    actix_web::rt::spawn(async move {
        // every username goes into the filter, logins from the last 30 days into the cache
        if let Err(e) = username_index::warmup(&pool_for_warmup, 30, 250).await {
            error!(error = ?e, "Failed to warm up username index");
        }
    });

    let media = match config.media.clone() {
        Some(media_config) => {
            info!(cloud = %media_config.cloud_name, "Media storage enabled");
            MediaHandle::new(Arc::new(CloudinaryClient::new(media_config)))
        }
        None => {
            warn!("MEDIA_* credentials not set, uploads are disabled");
            MediaHandle::disabled()
        }
    };

    let mailer = match config.smtp.as_ref() {
        Some(smtp) => MailerHandle::new(Arc::new(
            SmtpMailer::new(smtp).context("invalid SMTP configuration")?,
        )),
        None => {
            warn!("SMTP_HOST not set, external mail will be marked failed");
            MailerHandle::disabled()
        }
    };

    let limiters = Limiters::from_config(&config)?;
    let server_addr = config.server_addr.clone();

    let pool = Data::new(pool);
    let config = Data::new(config);
    let media = Data::new(media);
    let mailer = Data::new(mailer);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // ← important: wildcard {_:.*} to match JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(pool.clone())
            .app_data(config.clone())
            .app_data(media.clone())
            .app_data(mailer.clone())
            .app_data(web::JsonConfig::default().error_handler(|err, _req| {
                AppError::bad_request(format!("Invalid JSON body: {err}")).into()
            }))
            .app_data(web::QueryConfig::default().error_handler(|err, _req| {
                AppError::bad_request(format!("Invalid query string: {err}")).into()
            }))
            .service(index)
            // Configure auth + protected routes with rate limiting
            .configure(|cfg| routes::configure(cfg, &config, &limiters))
    })
    .bind(server_addr)?
    .run()
    .await?;

    Ok(())
}
