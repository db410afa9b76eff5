//! Application state shared across all handlers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::config::Config;
use crate::listing::{PagingLimits, TreeFetcher};
use crate::listings::{ListingRegistry, RegisteredListing};
use crate::store::PgTreeFetcher;

/// Shared application state.
///
/// Wrapped in Arc internally so Clone is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// PostgreSQL connection pool.
    db: PgPool,

    /// Listings served by the API.
    listings: ListingRegistry,

    /// Bounds applied to client paging input.
    paging: PagingLimits,

    /// Statement timeout for tree fetches.
    fetch_timeout: Duration,

    /// Listings served from preloaded trees instead of the database.
    preloaded: HashMap<String, Arc<dyn TreeFetcher>>,
}

impl AppState {
    /// Connect to the database and register the built-in listings.
    pub async fn new(config: &Config) -> Result<Self> {
        let paging = config.paging_limits()?;

        let db = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .connect(&config.database_url)
            .await
            .context("failed to connect to PostgreSQL")?;

        let listings = ListingRegistry::with_defaults().context("failed to register listings")?;

        info!(
            listings = listings.len(),
            min_per_page = paging.min_per_page,
            default_per_page = paging.default_per_page,
            max_per_page = paging.max_per_page,
            "application state initialized"
        );

        Ok(Self::from_parts(
            db,
            listings,
            paging,
            config.fetch_statement_timeout,
        ))
    }

    /// Assemble state from already-built parts.
    pub fn from_parts(
        db: PgPool,
        listings: ListingRegistry,
        paging: PagingLimits,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                db,
                listings,
                paging,
                fetch_timeout,
                preloaded: HashMap::new(),
            }),
        }
    }

    /// Serve `listing` from `fetcher` instead of the database.
    ///
    /// Must be called before the state is shared; returns `None` once
    /// other clones exist.
    pub fn with_preloaded(mut self, listing: &str, fetcher: Arc<dyn TreeFetcher>) -> Option<Self> {
        Arc::get_mut(&mut self.inner)?
            .preloaded
            .insert(listing.to_string(), fetcher);
        Some(self)
    }

    /// Get the database pool.
    pub fn db(&self) -> &PgPool {
        &self.inner.db
    }

    pub fn listings(&self) -> &ListingRegistry {
        &self.inner.listings
    }

    pub fn paging(&self) -> PagingLimits {
        self.inner.paging
    }

    /// Tree fetcher for one listing.
    pub fn fetcher_for(&self, listing: &RegisteredListing) -> Arc<dyn TreeFetcher> {
        match self.inner.preloaded.get(listing.name()) {
            Some(fetcher) => Arc::clone(fetcher),
            None => Arc::new(PgTreeFetcher::new(
                self.inner.db.clone(),
                listing.schema(),
                self.inner.fetch_timeout,
            )),
        }
    }

    /// Check if PostgreSQL is healthy.
    pub async fn postgres_healthy(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.inner.db).await.is_ok()
    }
}
