//! Configuration loaded from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use crate::listing::{MAX_PER_PAGE, PagingLimits};

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port (default: 3000).
    pub port: u16,

    /// PostgreSQL connection URL.
    pub database_url: String,

    /// Maximum database connections in pool (default: 10).
    pub database_max_connections: u32,

    /// CORS allowed origins (comma-separated, default: "*").
    pub cors_allowed_origins: Vec<String>,

    /// Smallest accepted `per_page` (default: 1).
    pub listing_min_per_page: u32,

    /// `per_page` when the client sends none (default: 25).
    pub listing_default_per_page: u32,

    /// Largest accepted `per_page`; larger requests are capped (default: 100).
    pub listing_max_per_page: u32,

    /// Statement timeout for tree fetch queries (default: 10s).
    pub fetch_statement_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let port = var_or("PORT", 3000).context("PORT must be a valid u16")?;

        let database_url =
            env::var("DATABASE_URL").context("DATABASE_URL environment variable is required")?;

        let database_max_connections = var_or("DATABASE_MAX_CONNECTIONS", 10)
            .context("DATABASE_MAX_CONNECTIONS must be a valid u32")?;

        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_else(|_| vec!["*".to_string()]);

        let listing_min_per_page = var_or("LISTING_MIN_PER_PAGE", 1)
            .context("LISTING_MIN_PER_PAGE must be a valid u32")?;
        let listing_default_per_page = var_or("LISTING_DEFAULT_PER_PAGE", 25)
            .context("LISTING_DEFAULT_PER_PAGE must be a valid u32")?;
        let listing_max_per_page = var_or("LISTING_MAX_PER_PAGE", MAX_PER_PAGE)
            .context("LISTING_MAX_PER_PAGE must be a valid u32")?;

        let fetch_statement_timeout = var_or("FETCH_STATEMENT_TIMEOUT_SECS", 10u64)
            .map(Duration::from_secs)
            .context("FETCH_STATEMENT_TIMEOUT_SECS must be a valid number of seconds")?;

        let config = Self {
            port,
            database_url,
            database_max_connections,
            cors_allowed_origins,
            listing_min_per_page,
            listing_default_per_page,
            listing_max_per_page,
            fetch_statement_timeout,
        };
        config.paging_limits()?;
        Ok(config)
    }

    /// Validated paging limits.
    pub fn paging_limits(&self) -> Result<PagingLimits> {
        let limits = PagingLimits {
            min_per_page: self.listing_min_per_page,
            default_per_page: self.listing_default_per_page,
            max_per_page: self.listing_max_per_page,
        };
        validate_paging(&limits)?;
        Ok(limits)
    }
}

/// Check `1 <= min <= default <= max`.
pub fn validate_paging(limits: &PagingLimits) -> Result<()> {
    if limits.min_per_page < 1 {
        bail!("LISTING_MIN_PER_PAGE must be at least 1");
    }
    if limits.default_per_page < limits.min_per_page {
        bail!(
            "LISTING_DEFAULT_PER_PAGE ({}) is below LISTING_MIN_PER_PAGE ({})",
            limits.default_per_page,
            limits.min_per_page
        );
    }
    if limits.max_per_page < limits.default_per_page {
        bail!(
            "LISTING_MAX_PER_PAGE ({}) is below LISTING_DEFAULT_PER_PAGE ({})",
            limits.max_per_page,
            limits.default_per_page
        );
    }
    Ok(())
}

fn var_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => Ok(raw.trim().parse()?),
        Err(_) => Ok(default),
    }
}
