use std::env;
use std::time::Duration;

/// Minimum length of the token signing secret in bytes
pub const MIN_JWT_SECRET_LEN: usize = 32;

/// Longest accepted session lifetime, one year
pub const MAX_SESSION_TIMEOUT_SECONDS: u64 = 365 * 24 * 60 * 60;

/// Server configuration loaded from environment variables
#[derive(Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Bind address
    pub bind_addr: String,
    /// PostgreSQL database URL
    pub database_url: String,
    /// Token signing secret
    pub jwt_secret: String,
    /// Lifetime of sessions and the tokens they carry
    pub session_timeout_seconds: u64,
    /// Consecutive failed logins that lock an account
    pub max_failed_login_attempts: i32,
    pub db_max_connections: u32,
    pub db_max_lifetime_seconds: u64,
    pub db_idle_timeout_seconds: u64,
    pub db_acquire_timeout_seconds: u64,
    /// Interval of the expired-session prune task, 0 disables it
    pub session_cleanup_interval_seconds: u64,
    /// Mark the auth cookie `Secure`
    pub cookie_secure: bool,
    /// CORS allowed origins (comma-separated in env var)
    pub cors_origins: Vec<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret =
            lookup("JWT_SECRET").ok_or_else(|| ConfigError::MissingEnvVar("JWT_SECRET".to_string()))?;
        if jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::InvalidValue(format!(
                "JWT_SECRET must be at least {MIN_JWT_SECRET_LEN} bytes"
            )));
        }

        let database_url = match lookup("DATABASE_URL") {
            Some(url) => url,
            None => database_url_from_parts(&lookup)?,
        };

        let port = match lookup("PORT") {
            Some(v) => v.trim().parse().map_err(|_| ConfigError::InvalidPort)?,
            None => 8080,
        };

        let max_failed_login_attempts = parse_or(&lookup, "MAX_FAILED_LOGIN_ATTEMPTS", 5)?;
        if max_failed_login_attempts < 1 {
            return Err(ConfigError::InvalidValue(
                "MAX_FAILED_LOGIN_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        let session_timeout_seconds = parse_or(&lookup, "SESSION_TIMEOUT_SECONDS", 86_400)?;
        if session_timeout_seconds == 0 || session_timeout_seconds > MAX_SESSION_TIMEOUT_SECONDS {
            return Err(ConfigError::InvalidValue(format!(
                "SESSION_TIMEOUT_SECONDS must be between 1 and {MAX_SESSION_TIMEOUT_SECONDS}"
            )));
        }

        Ok(Self {
            port,
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0".to_string()),
            database_url,
            jwt_secret,
            session_timeout_seconds,
            max_failed_login_attempts,
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 10)?,
            db_max_lifetime_seconds: parse_or(&lookup, "DB_MAX_LIFETIME_SECONDS", 3600)?,
            db_idle_timeout_seconds: parse_or(&lookup, "DB_IDLE_TIMEOUT_SECONDS", 1800)?,
            db_acquire_timeout_seconds: parse_or(&lookup, "DB_ACQUIRE_TIMEOUT_SECONDS", 10)?,
            session_cleanup_interval_seconds: parse_or(
                &lookup,
                "SESSION_CLEANUP_INTERVAL_SECONDS",
                300,
            )?,
            cookie_secure: lookup("COOKIE_SECURE")
                .map(|v| v.to_lowercase() == "true")
                .unwrap_or(false),
            cors_origins: lookup("CORS_ALLOW_ORIGINS")
                .map(|s| {
                    s.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_else(|| {
                    vec![
                        "http://localhost:3000".to_string(),
                        "http://127.0.0.1:3000".to_string(),
                    ]
                }),
        })
    }

    /// Get the full bind address (addr:port)
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    pub fn session_lifetime(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.session_timeout_seconds as i64)
    }

    pub fn db_max_lifetime(&self) -> Duration {
        Duration::from_secs(self.db_max_lifetime_seconds)
    }

    pub fn db_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.db_idle_timeout_seconds)
    }

    pub fn db_acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.db_acquire_timeout_seconds)
    }
}

// Secrets stay out of logs
impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("port", &self.port)
            .field("bind_addr", &self.bind_addr)
            .field("session_timeout_seconds", &self.session_timeout_seconds)
            .field("max_failed_login_attempts", &self.max_failed_login_attempts)
            .field("db_max_connections", &self.db_max_connections)
            .field(
                "session_cleanup_interval_seconds",
                &self.session_cleanup_interval_seconds,
            )
            .field("cookie_secure", &self.cookie_secure)
            .field("cors_origins", &self.cors_origins)
            .finish_non_exhaustive()
    }
}

fn database_url_from_parts<F>(lookup: &F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let required = |key: &str| lookup(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()));

    let user = required("DB_USER").map_err(|_| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?;
    let password = required("DB_PASSWORD")?;
    let host = required("DB_HOST")?;
    let name = required("DB_NAME")?;
    let port: u16 = match lookup("DB_PORT") {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("DB_PORT: {v}")))?,
        None => 5432,
    };

    Ok(format!("postgres://{user}:{password}@{host}:{port}/{name}"))
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{key}: {v}"))),
        None => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid port number")]
    InvalidPort,
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}
