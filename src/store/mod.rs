pub mod backend;
mod housekeeping;
mod neighbors;
mod routes;
mod sources;

pub use backend::{MemoryBackend, RoutesBackend, SqliteBackend};
pub use housekeeping::{housekeeping, start_housekeeping, HousekeepingStats};
pub use neighbors::NeighborsStore;
pub use routes::{RoutesSearchResult, RoutesStore};
pub use sources::{SourceStatus, SourcesStore, State};

use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;

use crate::config::{HousekeepingConfig, StoreConfig};
use crate::error::StoreError;
use crate::models::SourceConfig;

#[derive(Serialize, Debug, Clone)]
pub struct SourceNeighborsStats {
    pub source_id: String,
    pub name: String,
    #[serde(flatten)]
    pub status: SourceStatus,
    pub neighbors: usize,
}

#[derive(Serialize, Debug, Clone)]
pub struct NeighborsStoreStats {
    pub total_neighbors: usize,
    pub sources: Vec<SourceNeighborsStats>,
}

#[derive(Serialize, Debug, Clone)]
pub struct SourceRoutesStats {
    pub source_id: String,
    pub name: String,
    #[serde(flatten)]
    pub status: SourceStatus,
    pub imported: usize,
    pub filtered: usize,
}

#[derive(Serialize, Debug, Clone)]
pub struct RoutesStoreStats {
    pub total_imported: usize,
    pub total_filtered: usize,
    pub sources: Vec<SourceRoutesStats>,
}

/// The stores of a looking glass, built and started in order:
/// neighbors first, routes on top of them, then housekeeping.
pub struct Stores {
    pub neighbors: Arc<NeighborsStore>,
    pub routes: Arc<RoutesStore>,
    sources: Vec<Arc<SourceConfig>>,
    housekeeping: HousekeepingConfig,
}

impl Stores {
    pub fn new(config: &StoreConfig, sources: Vec<SourceConfig>) -> Result<Self, StoreError> {
        let sources: Vec<Arc<SourceConfig>> = sources.into_iter().map(Arc::new).collect();
        let backend = backend::from_config(&config.backend)?;
        let neighbors = Arc::new(NeighborsStore::new(sources.clone(), config));
        let routes = Arc::new(RoutesStore::new(
            sources.clone(),
            Arc::clone(&neighbors),
            backend,
            config,
        ));
        Ok(Self {
            neighbors,
            routes,
            sources,
            housekeeping: config.housekeeping.clone(),
        })
    }

    pub fn sources(&self) -> &[Arc<SourceConfig>] {
        &self.sources
    }

    /// Spawn the refresh loops and the housekeeping task
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        vec![
            Arc::clone(&self.neighbors).start(),
            Arc::clone(&self.routes).start(),
            start_housekeeping(self.sources.clone(), self.housekeeping.clone()),
        ]
    }
}
