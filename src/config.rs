use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use log::info;

use crate::error::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub bind_address: String,
    pub jwt_secret: String,
    pub upload_path: String,
    pub public_base_url: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub refresh_interval: Duration,
    pub request_timeout: Duration,
    pub run_migrations: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, Error> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 5)?,
            bind_address: dotenv::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8000".into()),
            jwt_secret: required("JWT_SECRET")?,
            upload_path: dotenv::var("UPLOAD_PATH").unwrap_or_else(|_| "./uploads".into()),
            public_base_url: dotenv::var("PUBLIC_BASE_URL").unwrap_or_else(|_| "http://localhost:8000".into()),
            openai_api_key: dotenv::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            openai_model: dotenv::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o".into()),
            refresh_interval: Duration::from_secs(parse_or("REFRESH_INTERVAL_SECS", 30)?),
            request_timeout: Duration::from_secs(parse_or("REQUEST_TIMEOUT_SECS", 10)?),
            run_migrations: parse_or("RUN_MIGRATIONS", false)?,
        })
    }
}

fn required(key: &str) -> Result<String, Error> {
    dotenv::var(key).map_err(|_| Error::ServerError(format!("environment variable {} not been set", key)))
}

fn parse_or<T>(key: &str, default: T) -> Result<T, Error>
where
    T: FromStr + Display,
    T::Err: Display,
{
    match dotenv::var(key) {
        Ok(v) => v.trim().parse().map_err(|e| Error::ServerError(format!("invalid {} value: {}", key, e))),
        Err(_) => {
            info!("{} not set, using default: {}", key, default);
            Ok(default)
        }
    }
}
