use std::time::Duration;

/// Startup configuration errors.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Where account records live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountBackend {
    KeyValue,
    Relational,
}

impl AccountBackend {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "keyvalue" | "mongodb" => Some(AccountBackend::KeyValue),
            "relational" | "sqlite" => Some(AccountBackend::Relational),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Tree,
    Json,
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub sentry_dsn: Option<String>,
    pub environment: String,
    pub log_format: LogFormat,
    pub account_backend: AccountBackend,
    pub database_path: String,
    pub mongodb_uri: String,
    pub mongodb_database: String,
    pub mongodb_collection: String,
    pub scan_page_size: i64,
    pub store_timeout: Duration,
    pub jwt_secret: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a Config from a key lookup (as env vars would be read).
    /// Used directly in tests to avoid mutating process-global environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = get("PORT").and_then(|v| v.parse().ok()).unwrap_or(8080);

        let log_format = match get("LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Tree,
        };

        let account_backend = match get("ACCOUNT_BACKEND") {
            None => AccountBackend::KeyValue,
            Some(raw) => AccountBackend::parse(&raw).ok_or(ConfigError::Invalid {
                key: "ACCOUNT_BACKEND",
                value: raw,
            })?,
        };

        let scan_page_size = match get("SCAN_PAGE_SIZE") {
            None => 100,
            Some(raw) => match raw.parse::<i64>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "SCAN_PAGE_SIZE",
                        value: raw,
                    })
                }
            },
        };

        let store_timeout = match get("STORE_TIMEOUT_SECS") {
            None => Duration::from_secs(10),
            Some(raw) => match raw.parse::<u64>() {
                Ok(n) if n > 0 => Duration::from_secs(n),
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "STORE_TIMEOUT_SECS",
                        value: raw,
                    })
                }
            },
        };

        let jwt_secret = get("JWT_AUTH_SECRET").ok_or(ConfigError::Missing("JWT_AUTH_SECRET"))?;

        Ok(Config {
            port,
            sentry_dsn: get("SENTRY_DSN"),
            environment: get("ENVIRONMENT").unwrap_or_else(|| "local".to_string()),
            log_format,
            account_backend,
            database_path: get("DATABASE_PATH").unwrap_or_else(|| "sandbox.db".to_string()),
            mongodb_uri: get("MONGODB_URI").unwrap_or_else(|| "mongodb://localhost:27017".to_string()),
            mongodb_database: get("MONGODB_DATABASE").unwrap_or_else(|| "sandbox".to_string()),
            mongodb_collection: get("MONGODB_COLLECTION").unwrap_or_else(|| "accounts".to_string()),
            scan_page_size,
            store_timeout,
            jwt_secret,
        })
    }
}
