use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

pub const DEV_JWT_SECRET: &str = "dev-secret-change-me";

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    /// In-process cache and presence when unset.
    pub redis_url: Option<String>,
    pub cache_ttl: Duration,
    pub send_timeout: Duration,
    pub channel_capacity: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let port = var("RALLY_PORT", "3000")
            .parse()
            .context("RALLY_PORT must be a port number")?;
        let cache_ttl_secs: u64 = var("RALLY_CACHE_TTL_SECS", "300")
            .parse()
            .context("RALLY_CACHE_TTL_SECS must be a number of seconds")?;
        let send_timeout_ms: u64 = var("RALLY_SEND_TIMEOUT_MS", "5000")
            .parse()
            .context("RALLY_SEND_TIMEOUT_MS must be a number of milliseconds")?;
        let channel_capacity: usize = var("RALLY_CHANNEL_CAPACITY", "64")
            .parse()
            .context("RALLY_CHANNEL_CAPACITY must be a positive number")?;
        if channel_capacity == 0 {
            anyhow::bail!("RALLY_CHANNEL_CAPACITY must be a positive number");
        }

        Ok(Self {
            host: var("RALLY_HOST", "0.0.0.0"),
            port,
            db_path: PathBuf::from(var("RALLY_DB_PATH", "rally.db")),
            jwt_secret: var("RALLY_JWT_SECRET", DEV_JWT_SECRET),
            redis_url: lookup("RALLY_REDIS_URL").filter(|url| !url.is_empty()),
            cache_ttl: Duration::from_secs(cache_ttl_secs),
            send_timeout: Duration::from_millis(send_timeout_ms),
            channel_capacity,
        })
    }
}
