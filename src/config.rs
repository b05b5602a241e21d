use std::net::SocketAddr;
use thiserror::Error;

const DEFAULT_DATABASE_URL: &str = "sqlite://pc_concept.db?mode=rwc";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 5000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("PORT must be a valid port number, got {0:?}")]
    InvalidPort(String),
    #[error("{host}:{port} is not a valid bind address")]
    InvalidAddress { host: String, port: u16 },
}

/// Runtime settings, read from the environment after `.env` is loaded.
///
/// | Env Var        | Default                            |
/// |----------------|------------------------------------|
/// | `DATABASE_URL` | `sqlite://pc_concept.db?mode=rwc`  |
/// | `HOST`         | `0.0.0.0`                          |
/// | `PORT`         | `5000`                             |
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.into());
        let host = lookup("HOST").unwrap_or_else(|| DEFAULT_HOST.into());
        let port = match lookup("PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidPort(raw))?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            database_url,
            host,
            port,
        })
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| ConfigError::InvalidAddress {
                host: self.host.clone(),
                port: self.port,
            })
    }
}
