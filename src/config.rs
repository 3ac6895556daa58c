use std::env;

use crate::pagination::MAX_PAGE_LIMIT;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub db_max_connections: u32,
    pub page_limit_max: u32,
    /// Any origin when unset.
    pub cors_allow_origin: Option<String>,
}

fn parsed_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<T>().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let db_max_connections = parsed_or("DB_MAX_CONNECTIONS", 10u32).max(1);
        let page_limit_max = parsed_or("PAGE_LIMIT_MAX", MAX_PAGE_LIMIT).max(1);
        let cors_allow_origin = env::var("CORS_ALLOW_ORIGIN")
            .ok()
            .filter(|s| !s.trim().is_empty());

        Ok(Self {
            database_url,
            bind_addr,
            db_max_connections,
            page_limit_max,
            cors_allow_origin,
        })
    }
}
