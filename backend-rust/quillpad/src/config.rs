use std::env;
use thiserror::Error;

use crate::media::AvatarProvider;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be a number, got {value:?}")]
    NotANumber { name: &'static str, value: String },
    #[error("{name} must be between {min} and {max}, got {value}")]
    OutOfRange {
        name: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },
    #[error("AVATAR_PROVIDER must be \"uploads\" or \"placeholder\", got {0:?}")]
    UnknownAvatarProvider(String),
}

/// Runtime settings, read from the environment (and `.env` if present)
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub jwt_secret: String,
    pub upload_dir: String,
    pub session_days: i64,
    pub admin_username: Option<String>,
    pub max_upload_bytes: usize,
    pub avatar_provider: AvatarProvider,
}

/// Roughly ten years; keeps session expiry arithmetic in range
pub const MAX_SESSION_DAYS: i64 = 3650;

const DEFAULT_JWT_SECRET: &str = "default_jwt_secret_change_me";

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let jwt_secret = lookup("JWT_SECRET").unwrap_or_else(|| {
            log::warn!("JWT_SECRET not set, using default (not secure for production!)");
            DEFAULT_JWT_SECRET.to_string()
        });

        Ok(Self {
            port: parse_or(&lookup, "PORT", 8069)?,
            database_path: lookup("DATABASE_PATH").unwrap_or_else(|| "quillpad.db".to_string()),
            jwt_secret,
            upload_dir: lookup("UPLOAD_DIR").unwrap_or_else(|| "uploads".to_string()),
            session_days: bounded(parse_or(&lookup, "SESSION_DAYS", 7)?, "SESSION_DAYS", 1, MAX_SESSION_DAYS)?,
            admin_username: lookup("ADMIN_USERNAME").filter(|s| !s.trim().is_empty()),
            max_upload_bytes: parse_or(&lookup, "MAX_UPLOAD_BYTES", 5 * 1024 * 1024)?,
            avatar_provider: avatar_provider(lookup("AVATAR_PROVIDER"))?,
        })
    }
}

fn bounded(value: i64, name: &'static str, min: i64, max: i64) -> Result<i64, ConfigError> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::OutOfRange { name, value, min, max })
    }
}

fn avatar_provider(value: Option<String>) -> Result<AvatarProvider, ConfigError> {
    match value.as_deref().map(str::trim) {
        None | Some("") | Some("uploads") => Ok(AvatarProvider::Uploads {
            base_url: "/uploads".to_string(),
        }),
        Some("placeholder") => Ok(AvatarProvider::Placeholder),
        Some(other) => Err(ConfigError::UnknownAvatarProvider(other.to_string())),
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::NotANumber { name, value }),
    }
}
