use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Postgres URL; the server falls back to the in-memory store when unset.
    pub database_url: Option<String>,
    pub port: u16,
    pub score_cache_ttl_secs: u64,
    pub score_cache_capacity: u64,
    pub ledger_lock_timeout_ms: u64,
    pub rate_limit_per_second: u64,
    pub rate_limit_burst: u32,
}

fn parse_var<T: FromStr>(name: &str, default: T, hint: &str) -> anyhow::Result<T> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be {}", name, hint)),
        _ => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = match std::env::var("DB_URL").or_else(|_| std::env::var("DATABASE_URL"))
        {
            Ok(url) if !url.trim().is_empty() => {
                if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                    anyhow::bail!("DB_URL must start with postgresql:// or postgres://");
                }
                Some(url)
            }
            _ => None,
        };

        let config = Self {
            database_url,
            port: parse_var("PORT", 3000, "a valid number between 1-65535")?,
            score_cache_ttl_secs: parse_var("SCORE_CACHE_TTL_SECS", 300, "a whole number of seconds")?,
            score_cache_capacity: parse_var("SCORE_CACHE_CAPACITY", 10_000, "a positive number")?,
            ledger_lock_timeout_ms: parse_var(
                "LEDGER_LOCK_TIMEOUT_MS",
                5_000,
                "a whole number of milliseconds",
            )?,
            rate_limit_per_second: parse_var("RATE_LIMIT_PER_SECOND", 10, "a positive number")?,
            rate_limit_burst: parse_var("RATE_LIMIT_BURST", 20, "a positive number")?,
        };

        if config.rate_limit_per_second == 0 || config.rate_limit_burst == 0 {
            anyhow::bail!("RATE_LIMIT_PER_SECOND and RATE_LIMIT_BURST must be greater than 0");
        }

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        match &config.database_url {
            Some(url) => tracing::debug!(
                "Database URL: {}...",
                url.chars().take(20).collect::<String>()
            ),
            None => tracing::info!("No database configured, using in-memory store"),
        }
        tracing::debug!(
            "Score cache: ttl {}s, capacity {}",
            config.score_cache_ttl_secs,
            config.score_cache_capacity
        );
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }

    pub fn score_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.score_cache_ttl_secs)
    }

    /// `LEDGER_LOCK_TIMEOUT_MS=0` waits for a busy customer without a bound.
    pub fn ledger_lock_timeout(&self) -> Option<Duration> {
        match self.ledger_lock_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}
