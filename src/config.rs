use anyhow::{Context, Result};
use chrono::NaiveTime;
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,
    pub access_token_ttl: usize,
    pub refresh_token_ttl: usize,

    // Rate limiting
    pub rate_login_per_min: u32,
    pub rate_register_per_min: u32,
    pub rate_refresh_per_min: u32,
    pub rate_protected_per_min: u32,
    pub rate_upload_per_min: u32,

    pub api_prefix: String,
    pub log_dir: String,

    /// Punch-ins after this time are recorded as late
    pub attendance_late_after: NaiveTime,

    pub upload: UploadLimits,
    pub media: Option<MediaConfig>,
    pub smtp: Option<SmtpConfig>,
}

#[derive(Clone, Debug)]
pub struct UploadLimits {
    pub max_file_bytes: usize,
    pub max_files: usize,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_file_bytes: 10 * 1024 * 1024,
            max_files: 10,
        }
    }
}

/// Credentials for the hosted media API (Cloudinary compatible)
#[derive(Clone, Debug)]
pub struct MediaConfig {
    pub api_base: String,
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub folder: String,
}

#[derive(Clone, Debug)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
}

fn required(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("{key} must be set"))
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw}")),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let late_after = optional("ATTENDANCE_LATE_AFTER").unwrap_or_else(|| "09:15".to_string());
        let attendance_late_after = NaiveTime::parse_from_str(&late_after, "%H:%M")
            .with_context(|| format!("ATTENDANCE_LATE_AFTER must be HH:MM, got {late_after}"))?;

        let defaults = UploadLimits::default();

        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            access_token_ttl: parsed("ACCESS_TOKEN_TTL", 900)?, // 15 min
            refresh_token_ttl: parsed("REFRESH_TOKEN_TTL", 604_800)?, // 7 days

            rate_login_per_min: parsed("RATE_LOGIN_PER_MIN", 60)?,
            rate_register_per_min: parsed("RATE_REGISTER_PER_MIN", 30)?,
            rate_refresh_per_min: parsed("RATE_REFRESH_PER_MIN", 30)?,
            rate_protected_per_min: parsed("RATE_PROTECTED_PER_MIN", 1000)?,
            rate_upload_per_min: parsed("RATE_UPLOAD_PER_MIN", 120)?,

            api_prefix: optional("API_PREFIX").unwrap_or_else(|| "/api".to_string()),
            log_dir: optional("LOG_DIR").unwrap_or_else(|| "logs".to_string()),
            attendance_late_after,

            upload: UploadLimits {
                max_file_bytes: parsed("UPLOAD_MAX_FILE_BYTES", defaults.max_file_bytes)?,
                max_files: parsed("UPLOAD_MAX_FILES", defaults.max_files)?,
            },
            media: MediaConfig::from_env(),
            smtp: SmtpConfig::from_env()?,
        })
    }
}

impl MediaConfig {
    /// `None` unless all three credentials are present
    fn from_env() -> Option<Self> {
        Some(Self {
            cloud_name: optional("MEDIA_CLOUD_NAME")?,
            api_key: optional("MEDIA_API_KEY")?,
            api_secret: optional("MEDIA_API_SECRET")?,
            api_base: optional("MEDIA_API_BASE")
                .unwrap_or_else(|| "https://api.cloudinary.com".to_string()),
            folder: optional("MEDIA_FOLDER").unwrap_or_else(|| "hrm".to_string()),
        })
    }
}

impl SmtpConfig {
    fn from_env() -> Result<Option<Self>> {
        let Some(host) = optional("SMTP_HOST") else {
            return Ok(None);
        };

        Ok(Some(Self {
            port: parsed("SMTP_PORT", 587)?,
            username: optional("SMTP_USERNAME"),
            password: optional("SMTP_PASSWORD"),
            from: optional("SMTP_FROM").unwrap_or_else(|| format!("hrm@{host}")),
            host,
        }))
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests() -> Self {
        Self {
            database_url: "mysql://localhost/hrm_test".into(),
            jwt_secret: "test-secret".into(),
            server_addr: "127.0.0.1:0".into(),
            access_token_ttl: 900,
            refresh_token_ttl: 3600,
            rate_login_per_min: 60,
            rate_register_per_min: 30,
            rate_refresh_per_min: 30,
            rate_protected_per_min: 1000,
            rate_upload_per_min: 120,
            api_prefix: "/api".into(),
            log_dir: "logs".into(),
            attendance_late_after: NaiveTime::from_hms_opt(9, 15, 0).unwrap_or_default(),
            upload: UploadLimits::default(),
            media: None,
            smtp: None,
        }
    }
}
