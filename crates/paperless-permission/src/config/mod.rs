use std::env;
use std::fmt;
use std::path::PathBuf;

use crate::slips::SlipSettings;

/// Distinguishes runtime behavior for different stages of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub database: DatabaseConfig,
    pub links: LinkConfig,
    pub email: EmailConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let path = env::var("DATABASE_PATH")
            .unwrap_or_else(|_| "data/paperless-permission.sqlite3".to_string());

        let salt = env::var("LINK_ID_SALT").unwrap_or_default();
        if salt.is_empty() && environment == AppEnvironment::Production {
            return Err(ConfigError::MissingLinkSalt);
        }

        let base_url = env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:8000".to_string());
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidBaseUrl { value: base_url });
        }

        let from_address =
            env::var("EMAIL_FROM_ADDRESS").unwrap_or_else(|_| "activities@localhost".to_string());
        let signature =
            env::var("EMAIL_SIGNATURE").unwrap_or_else(|_| "Activities Office".to_string());
        let outbox = env::var("MAIL_OUTBOX_PATH")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            database: DatabaseConfig {
                path: PathBuf::from(path),
            },
            links: LinkConfig {
                salt,
                base_url: base_url.trim_end_matches('/').to_string(),
            },
            email: EmailConfig {
                from_address,
                signature,
                outbox,
            },
            telemetry: TelemetryConfig { log_level },
        })
    }

    /// Settings handed to the permission slip service.
    pub fn slip_settings(&self) -> SlipSettings {
        SlipSettings {
            link_salt: self.links.salt.clone(),
            base_url: self.links.base_url.clone(),
            from_address: self.email.from_address.clone(),
            signature: self.email.signature.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

/// Inputs to link token derivation and slip URLs.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub salt: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub from_address: String,
    pub signature: String,
    /// JSON lines file receiving outbound mail. Mail is only logged when unset.
    pub outbox: Option<PathBuf>,
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

#[derive(Debug)]
pub enum ConfigError {
    MissingLinkSalt,
    InvalidBaseUrl { value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingLinkSalt => {
                write!(f, "LINK_ID_SALT must be set in production")
            }
            ConfigError::InvalidBaseUrl { value } => {
                write!(f, "BASE_URL must start with http:// or https://, got '{}'", value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
