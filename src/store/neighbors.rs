use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use log::{debug, error, warn};
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use super::sources::SourcesStore;
use super::{NeighborsStoreStats, SourceNeighborsStats};
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::models::{Neighbor, NeighborStatus, SourceConfig};
use crate::pools;
use crate::search::{NeighborFilter, NeighborQuery};

/// Neighbors of one source as of one refresh
struct NeighborsSnapshot {
    neighbors: Vec<Arc<Neighbor>>,
    // neighbor id -> position in `neighbors`
    index: HashMap<String, usize>,
    cached_at: DateTime<Utc>,
}

impl NeighborsSnapshot {
    fn new(neighbors: Vec<Arc<Neighbor>>) -> Self {
        let index = neighbors
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();
        Self {
            neighbors,
            index,
            cached_at: Utc::now(),
        }
    }

    fn get(&self, neighbor_id: &str) -> Option<&Arc<Neighbor>> {
        self.index.get(neighbor_id).map(|&i| &self.neighbors[i])
    }
}

pub struct NeighborsStore {
    sources: SourcesStore,
    // source id -> latest snapshot
    snapshots: RwLock<HashMap<String, Arc<NeighborsSnapshot>>>,
    fetch_timeout: Duration,
    check_interval: Duration,
    status_refresh: bool,
}

impl NeighborsStore {
    pub fn new(sources: Vec<Arc<SourceConfig>>, config: &StoreConfig) -> Self {
        Self {
            sources: SourcesStore::new(sources, &config.neighbors),
            snapshots: RwLock::new(HashMap::new()),
            fetch_timeout: config.fetch_timeout,
            check_interval: config.refresh_check_interval,
            status_refresh: config.enable_neighbors_status_refresh,
        }
    }

    pub fn sources(&self) -> &SourcesStore {
        &self.sources
    }

    /// Refresh every due source in the background, forever
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            debug!(
                "Starting neighbors store [refresh interval {}s]",
                self.sources.refresh_interval().as_secs()
            );
            loop {
                for source_id in self.sources.get_source_ids_for_refresh() {
                    if let Err(err) = self.sources.lock_source(&source_id) {
                        debug!("{}", err);
                        continue;
                    }
                    let store = Arc::clone(&self);
                    tokio::spawn(async move {
                        let _ = store.refresh_locked(&source_id).await;
                    });
                }
                sleep(self.check_interval).await;
            }
        })
    }

    /// Refresh all due sources concurrently and wait for them.
    /// A failing source does not affect the others.
    pub async fn update(&self) {
        let ids = self.sources.get_source_ids_for_refresh();
        let refreshes = ids.iter().map(|id| self.update_source(id));
        join_all(refreshes).await;
    }

    pub async fn update_source(&self, source_id: &str) -> Result<(), StoreError> {
        self.sources.lock_source(source_id)?;
        self.refresh_locked(source_id).await
    }

    async fn refresh_locked(&self, source_id: &str) -> Result<(), StoreError> {
        match self.fetch_neighbors(source_id).await {
            Ok(neighbors) => {
                debug!("Refreshed {} neighbors of {}", neighbors.len(), source_id);
                let snapshot = Arc::new(NeighborsSnapshot::new(neighbors));
                self.snapshots
                    .write()
                    .insert(source_id.to_string(), snapshot);
                self.sources.refresh_success(source_id);
                Ok(())
            }
            Err(err) => {
                error!("Refreshing neighbors of {} failed: {}", source_id, err);
                self.sources.refresh_error(source_id, &err);
                Err(err)
            }
        }
    }

    async fn fetch_neighbors(&self, source_id: &str) -> Result<Vec<Arc<Neighbor>>, StoreError> {
        let instance = self.sources.get_instance(source_id)?;
        let response = timeout(self.fetch_timeout, instance.neighbors())
            .await
            .map_err(|_| StoreError::timeout(source_id, self.fetch_timeout))?
            .map_err(|err| StoreError::fetch(source_id, err))?;

        let pools = pools::global();
        let neighbors = response
            .neighbors
            .into_iter()
            .map(|n| {
                let neighbor = Arc::try_unwrap(n).unwrap_or_else(|n| (*n).clone());
                Arc::new(neighbor.normalize(source_id, pools))
            })
            .collect();
        Ok(neighbors)
    }

    fn snapshot(&self, source_id: &str) -> Option<Arc<NeighborsSnapshot>> {
        self.snapshots.read().get(source_id).cloned()
    }

    /// Neighbors of a source, with the live session status on top
    /// when status refresh is enabled
    pub async fn get_neighbors_at(&self, source_id: &str) -> Result<Vec<Arc<Neighbor>>, StoreError> {
        let instance = self.sources.get_instance(source_id)?;
        let neighbors = match self.snapshot(source_id) {
            Some(snapshot) => snapshot.neighbors.clone(),
            None => return Ok(Vec::new()),
        };
        if !self.status_refresh {
            return Ok(neighbors);
        }

        let status = match timeout(self.fetch_timeout, instance.neighbors_status()).await {
            Ok(Ok(response)) => response.neighbors,
            Ok(Err(err)) => {
                warn!("Neighbors status of {} unavailable: {}", source_id, err);
                return Ok(neighbors);
            }
            Err(_) => {
                warn!("Neighbors status of {} timed out", source_id);
                return Ok(neighbors);
            }
        };
        let status: HashMap<&str, &NeighborStatus> =
            status.iter().map(|s| (s.id.as_str(), s)).collect();
        Ok(neighbors
            .into_iter()
            .map(|n| match status.get(n.id.as_str()) {
                Some(s) => Arc::new(n.with_status(s)),
                None => n,
            })
            .collect())
    }

    pub fn get_neighbor_at(&self, source_id: &str, neighbor_id: &str) -> Option<Arc<Neighbor>> {
        self.snapshot(source_id)
            .and_then(|snapshot| snapshot.get(neighbor_id).cloned())
    }

    pub fn lookup_neighbors_at(&self, source_id: &str, query: &NeighborQuery) -> Vec<Arc<Neighbor>> {
        match self.snapshot(source_id) {
            Some(snapshot) => snapshot
                .neighbors
                .iter()
                .filter(|n| query.matches(n))
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Matching neighbors per source id; "AS<n>" selects by ASN,
    /// anything else matches the description
    pub fn lookup_neighbors(&self, query: &str) -> HashMap<String, Vec<Arc<Neighbor>>> {
        let query = NeighborQuery::parse(query);
        self.sources
            .get_source_ids()
            .into_iter()
            .map(|id| {
                let neighbors = self.lookup_neighbors_at(&id, &query);
                (id, neighbors)
            })
            .collect()
    }

    /// Neighbors of all sources matching the filter
    pub fn filter_neighbors(&self, filter: &NeighborFilter) -> Vec<Arc<Neighbor>> {
        if filter.is_empty() {
            return Vec::new();
        }
        let mut result = Vec::new();
        for source_id in self.sources.get_source_ids() {
            if let Some(snapshot) = self.snapshot(&source_id) {
                result.extend(
                    snapshot
                        .neighbors
                        .iter()
                        .filter(|n| filter.matches(n))
                        .cloned(),
                );
            }
        }
        result
    }

    pub fn source_cached_at(&self, source_id: &str) -> Option<DateTime<Utc>> {
        self.snapshot(source_id).map(|snapshot| snapshot.cached_at)
    }

    pub fn stats(&self) -> NeighborsStoreStats {
        let sources: Vec<SourceNeighborsStats> = self
            .sources
            .get_sources()
            .iter()
            .filter_map(|source| {
                let status = self.sources.get_status(&source.id).ok()?;
                let neighbors = self
                    .snapshot(&source.id)
                    .map_or(0, |snapshot| snapshot.neighbors.len());
                Some(SourceNeighborsStats {
                    source_id: source.id.clone(),
                    name: source.name.clone(),
                    status,
                    neighbors,
                })
            })
            .collect();
        NeighborsStoreStats {
            total_neighbors: sources.iter().map(|s| s.neighbors).sum(),
            sources,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Meta, NeighborsResponse, NeighborsStatusResponse, RoutesResponse, Source, SourceResult,
        StatusResponse,
    };
    use crate::store::State;
    use async_trait::async_trait;

    struct StaticNeighbors(Vec<Neighbor>);

    #[async_trait]
    impl Source for StaticNeighbors {
        async fn status(&self) -> SourceResult<StatusResponse> {
            Err("unavailable".into())
        }
        async fn neighbors(&self) -> SourceResult<NeighborsResponse> {
            Ok(NeighborsResponse {
                meta: Meta::new("test", Utc::now()),
                neighbors: self.0.iter().cloned().map(Arc::new).collect(),
            })
        }
        async fn neighbors_status(&self) -> SourceResult<NeighborsStatusResponse> {
            Ok(NeighborsStatusResponse {
                meta: Meta::new("test", Utc::now()),
                neighbors: vec![NeighborStatus {
                    id: "n1".to_string(),
                    state: "Down".to_string(),
                    uptime: Duration::from_secs(0),
                }],
            })
        }
        async fn routes(&self, _: &str) -> SourceResult<RoutesResponse> {
            Err("unavailable".into())
        }
        async fn routes_received(&self, _: &str) -> SourceResult<RoutesResponse> {
            Err("unavailable".into())
        }
        async fn routes_filtered(&self, _: &str) -> SourceResult<RoutesResponse> {
            Err("unavailable".into())
        }
        async fn routes_not_exported(&self, _: &str) -> SourceResult<RoutesResponse> {
            Err("unavailable".into())
        }
        async fn all_routes(&self) -> SourceResult<RoutesResponse> {
            Err("unavailable".into())
        }
        fn expire_caches(&self) -> usize {
            0
        }
    }

    fn neighbor(id: &str, asn: u32, description: &str) -> Neighbor {
        let mut neighbor = Neighbor::new(id, "192.0.2.1", asn);
        neighbor.state = "Up".to_string();
        neighbor.description = description.to_string();
        neighbor
    }

    fn store(status_refresh: bool) -> NeighborsStore {
        let source = StaticNeighbors(vec![
            neighbor("n1", 2342, "Exchange AS2342"),
            neighbor("n2", 23, "Customer of AS2342"),
        ]);
        let sources = vec![Arc::new(SourceConfig::new("rs1", "RS 1", Arc::new(source)))];
        let mut config = StoreConfig::default();
        config.enable_neighbors_status_refresh = status_refresh;
        NeighborsStore::new(sources, &config)
    }

    #[tokio::test]
    async fn test_update_and_lookup() {
        let store = store(false);
        assert!(store.source_cached_at("rs1").is_none());
        store.update().await;
        assert_eq!(store.sources().get_status("rs1").unwrap().state, State::Ready);
        assert!(store.source_cached_at("rs1").is_some());

        let neighbors = store.get_neighbors_at("rs1").await.unwrap();
        assert_eq!(neighbors.len(), 2);
        assert_eq!(neighbors[0].state, "up");
        assert_eq!(&*neighbors[0].source_id, "rs1");

        let found = store.lookup_neighbors("AS2342");
        assert_eq!(found["rs1"].len(), 1);
        assert_eq!(found["rs1"][0].id, "n1");
        let found = store.lookup_neighbors("customer");
        assert_eq!(found["rs1"][0].id, "n2");

        assert_eq!(store.get_neighbor_at("rs1", "n2").unwrap().asn, 23);
        assert!(store.get_neighbor_at("rs1", "n3").is_none());
        assert_eq!(store.stats().total_neighbors, 2);
    }

    #[tokio::test]
    async fn test_status_overlay() {
        let store = store(true);
        store.update().await;
        let neighbors = store.get_neighbors_at("rs1").await.unwrap();
        assert_eq!(neighbors[0].state, "down");
        assert_eq!(neighbors[1].state, "up");
        // The snapshot itself is unchanged
        assert_eq!(store.get_neighbor_at("rs1", "n1").unwrap().state, "up");
    }

    #[tokio::test]
    async fn test_filter_neighbors() {
        let store = store(false);
        store.update().await;
        let filter = NeighborFilter::new(Some("exchange"), Some(23));
        assert_eq!(store.filter_neighbors(&filter).len(), 2);
        let filter = NeighborFilter::new(None, None);
        assert!(store.filter_neighbors(&filter).is_empty());
    }

    #[tokio::test]
    async fn test_unknown_source() {
        let store = store(false);
        assert_eq!(
            store.get_neighbors_at("rs9").await.unwrap_err(),
            StoreError::SourceNotFound("rs9".to_string())
        );
        assert!(store.update_source("rs9").await.is_err());
    }
}
