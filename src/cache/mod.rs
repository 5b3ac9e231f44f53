//! Query cache
//!
//! Read paths store their results under a query key; write paths drop every
//! key under the affected prefix so the next read goes to the database.
//!
//! ```rust,ignore
//! let cache = create_cache(&CacheConfig::default());
//! cache.set(&keys::report(7), &report, cache.default_ttl()).await?;
//! cache.delete_prefix(keys::REPORTS_PREFIX).await?;
//! ```

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::CacheConfig;

pub use memory::MemoryCache;

/// Cache operations used by the services.
///
/// Generic methods keep this out of `dyn`; services hold the concrete
/// [`Cache`] type.
#[async_trait]
pub trait CacheLayer: Send + Sync {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>>;

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Drop every key starting with `prefix`
    async fn delete_prefix(&self, prefix: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

pub type Cache = MemoryCache;

/// Query keys
pub mod keys {
    /// Everything derived from the reports table, including comment counts
    pub const REPORTS_PREFIX: &str = "reports:";

    pub const REPORT_MARKERS: &str = "reports:markers";

    pub fn report(id: i64) -> String {
        format!("reports:item:{}", id)
    }

    pub fn comments(report_id: i64) -> String {
        format!("comments:report:{}", report_id)
    }
}

pub fn create_cache(config: &CacheConfig) -> Arc<Cache> {
    tracing::info!(
        ttl_seconds = config.ttl_seconds,
        max_capacity = config.max_capacity,
        "Using in-memory query cache"
    );
    Arc::new(MemoryCache::new(
        config.max_capacity,
        Duration::from_secs(config.ttl_seconds),
    ))
}
