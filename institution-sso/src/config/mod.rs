use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct SsoConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub mongodb: MongoConfig,
    pub directory: DirectoryConfig,
    pub smtp: SmtpConfig,
    /// Days before a reconfirmation deadline at which users are prompted.
    /// Unset or non-positive disables reconfirmation prompts.
    pub reconfirm_notification_days: Option<i64>,
    pub strict_notifications: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryConfig {
    /// Base URL of the affiliation directory; empty disables directory calls.
    pub url: String,
    pub user: String,
    pub password: String,
    pub timeout_ms: u64,
    pub retry_interval_ms: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            user: String::new(),
            password: String::new(),
            timeout_ms: 5000,
            retry_interval_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub from_email: String,
    pub from_name: String,
    pub enabled: bool,
}

impl SsoConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;
        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";

        Ok(SsoConfig {
            common: common_config,
            mongodb: MongoConfig {
                uri: get_env("MONGODB_URI", None, is_prod)?,
                database: get_env("MONGODB_DATABASE", Some("sharelatex"), is_prod)?,
            },
            directory: DirectoryConfig {
                url: get_env("DIRECTORY_API_URL", Some(""), is_prod)?,
                user: get_env("DIRECTORY_API_USER", Some(""), is_prod)?,
                password: get_env("DIRECTORY_API_PASSWORD", Some(""), is_prod)?,
                timeout_ms: get_env("DIRECTORY_API_TIMEOUT_MS", Some("5000"), false)?
                    .parse()
                    .unwrap_or(5000),
                retry_interval_ms: get_env("DIRECTORY_API_RETRY_INTERVAL_MS", Some("200"), false)?
                    .parse()
                    .unwrap_or(200),
            },
            smtp: SmtpConfig {
                host: get_env("SMTP_HOST", Some("smtp.gmail.com"), false)?,
                port: get_env("SMTP_PORT", Some("587"), false)?
                    .parse()
                    .unwrap_or(587),
                user: get_env("SMTP_USER", Some(""), false)?,
                password: get_env("SMTP_PASSWORD", Some(""), false)?,
                from_email: get_env("SMTP_FROM_EMAIL", Some("noreply@example.com"), false)?,
                from_name: get_env("SMTP_FROM_NAME", Some("Security Notifications"), false)?,
                enabled: parse_flag(env::var("SMTP_ENABLED").ok().as_deref()),
            },
            reconfirm_notification_days: parse_days(
                env::var("RECONFIRM_NOTIFICATION_DAYS").ok().as_deref(),
            ),
            strict_notifications: parse_flag(env::var("STRICT_NOTIFICATIONS").ok().as_deref()),
        })
    }
}

fn parse_flag(raw: Option<&str>) -> bool {
    raw.and_then(|v| v.trim().parse().ok()).unwrap_or(false)
}

fn parse_days(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|v| v.trim().parse().ok())
        .filter(|days: &i64| *days > 0)
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}
