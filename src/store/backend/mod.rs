mod memory;
mod sqlite;

pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::BackendConfig;
use crate::error::StoreError;
use crate::models::LookupRoute;

/// Storage of the routes snapshots, one per source.
///
/// Results of a source always list its filtered routes before
/// its imported routes. Routes that are not exported are not kept.
#[async_trait]
pub trait RoutesBackend: Send + Sync {
    /// Replace all routes of a source
    async fn set_routes(&self, source_id: &str, routes: Vec<LookupRoute>) -> Result<(), StoreError>;

    /// Routes of a source whose network starts with the prefix (case-insensitive)
    async fn find_by_prefix_at(
        &self,
        source_id: &str,
        prefix: &str,
    ) -> Result<Vec<LookupRoute>, StoreError>;

    /// Routes of a source learned from any of the neighbors
    async fn find_by_neighbors_at(
        &self,
        source_id: &str,
        neighbor_ids: &[String],
    ) -> Result<Vec<LookupRoute>, StoreError>;

    async fn find_by_prefix(&self, prefix: &str) -> Result<Vec<LookupRoute>, StoreError>;

    async fn find_by_neighbors(&self, neighbor_ids: &[String]) -> Result<Vec<LookupRoute>, StoreError>;

    /// (imported, filtered)
    async fn count_routes_at(&self, source_id: &str) -> Result<(usize, usize), StoreError>;
}

pub fn from_config(config: &BackendConfig) -> Result<Arc<dyn RoutesBackend>, StoreError> {
    let backend: Arc<dyn RoutesBackend> = match config {
        BackendConfig::Memory => Arc::new(MemoryBackend::new()),
        BackendConfig::Sqlite(path) => Arc::new(SqliteBackend::open(path)?),
    };
    Ok(backend)
}
