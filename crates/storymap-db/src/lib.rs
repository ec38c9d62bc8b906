//! # storymap-db
//!
//! PostgreSQL storage layer for storymap.
//!
//! This crate provides:
//! - Connection pool management
//! - A capability probe that picks the storage shape from the live schema
//! - Story and pin repositories whose column lists follow that probe
//! - [`MapStore`](storymap_core::MapStore) for [`Database`], applying write
//!   batches in one transaction
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use storymap_db::{Database, StoryMap};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/storymap").await?;
//!     let map = StoryMap::new(Arc::new(db));
//!     for pin in map.list_pins().await? {
//!         println!("{} ({})", pin.title, pin.pin_type);
//!     }
//!     Ok(())
//! }
//! ```
pub mod pins;
pub mod pool;
pub mod probe;
mod rows;
mod store;
pub mod stories;

// Test fixtures for integration tests
// Note: Always compiled so integration tests (in tests/) can use them
pub mod test_fixtures;

use std::sync::Arc;

// Re-export core types
pub use storymap_core::*;

pub use pins::PgPinRepository;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use probe::{Capabilities, CapabilityCache, TableSpec, MAP_PINS, STORIES};
pub use stories::PgStoryRepository;

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Story repository.
    pub stories: PgStoryRepository,
    /// Map pin repository.
    pub pins: PgPinRepository,
    /// Columns the connected schema has, shared by both repositories.
    pub capabilities: Arc<CapabilityCache>,
}

impl Database {
    /// Create a Database from a pool, probing the schema once.
    pub async fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Result<Self> {
        let caps = Arc::new(CapabilityCache::probe(pool.clone()).await?);
        Ok(Self::with_capabilities(pool, caps))
    }

    /// Create a Database with known capabilities, without probing.
    pub fn with_capabilities(pool: sqlx::Pool<sqlx::Postgres>, caps: Arc<CapabilityCache>) -> Self {
        Self {
            stories: PgStoryRepository::new(pool.clone(), caps.clone()),
            pins: PgPinRepository::new(pool.clone(), caps.clone()),
            capabilities: caps,
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Self::new(pool).await
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Self::new(pool).await
    }

    /// Run pending migrations, then re-probe the schema.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        self.refresh_capabilities().await
    }

    /// Probe the schema again, e.g. after DDL outside this process.
    pub async fn refresh_capabilities(&self) -> Result<()> {
        self.capabilities.refresh().await.map(|_| ())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
