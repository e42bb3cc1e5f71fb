use std::{env, fmt};

use actix_web::cookie::Key;

use crate::errors::AppError;

const MIN_SESSION_KEY_LEN: usize = 64;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub port: u16,
    pub session_key: String,
    pub frontend_url: String,
    pub default_admin_email: String,
    pub default_admin_password: Option<String>,
}

// Secrets stay out of the startup log.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &self.database_url)
            .field("bind_addr", &self.bind_addr)
            .field("port", &self.port)
            .field("frontend_url", &self.frontend_url)
            .field("default_admin_email", &self.default_admin_email)
            .finish_non_exhaustive()
    }
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_owned())
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let session_key = env::var("SESSION_KEY")?;
        let port = var_or("PORT", "8080")
            .parse()
            .map_err(|e| AppError::Config(format!("PORT: {}", e)))?;
        let config = Config {
            database_url: var_or("DATABASE_URL", "sqlite://quotedesk.db"),
            bind_addr: var_or("BIND_ADDR", "0.0.0.0"),
            port,
            session_key,
            frontend_url: var_or("FRONTEND_URL", "http://localhost:5173"),
            default_admin_email: var_or("DEFAULT_ADMIN_EMAIL", "admin@gmail.com"),
            default_admin_password: env::var("DEFAULT_ADMIN_PASSWORD").ok().filter(|p| !p.is_empty()),
        };
        config.validate()?;
        Ok(config)
    }

    /// Defaults suitable for tests and local runs; only the session key is required.
    pub fn with_session_key(session_key: impl Into<String>) -> Self {
        Config {
            database_url: "sqlite::memory:".to_owned(),
            bind_addr: "127.0.0.1".to_owned(),
            port: 8080,
            session_key: session_key.into(),
            frontend_url: "http://localhost:5173".to_owned(),
            default_admin_email: "admin@gmail.com".to_owned(),
            default_admin_password: None,
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.session_key.len() < MIN_SESSION_KEY_LEN {
            return Err(AppError::Config(format!(
                "SESSION_KEY must be at least {} bytes",
                MIN_SESSION_KEY_LEN
            )));
        }
        Ok(())
    }

    pub fn session_key(&self) -> Key {
        Key::from(self.session_key.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_session_key_is_rejected() {
        assert!(Config::with_session_key("short").validate().is_err());
        assert!(Config::with_session_key("k".repeat(64)).validate().is_ok());
    }

    #[test]
    fn debug_output_hides_secrets() {
        let mut config = Config::with_session_key("s".repeat(64));
        config.default_admin_password = Some("hunter2hunter2".to_owned());
        let printed = format!("{:?}", config);
        assert!(!printed.contains("ssss"));
        assert!(!printed.contains("hunter2"));
    }
}
