use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use log::{debug, error};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use super::backend::RoutesBackend;
use super::neighbors::NeighborsStore;
use super::sources::SourcesStore;
use super::{RoutesStoreStats, SourceRoutesStats};
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::models::{
    CommunityMap, LookupRoute, Neighbor, Route, RouteState, RoutesResponse, SourceConfig,
    SourceResult,
};
use crate::pools::{self, Pools};
use crate::search::SearchFilters;

/// Routes matching a search, split by state, with the facets
/// to narrow it further
#[derive(Serialize, Debug, Clone)]
pub struct RoutesSearchResult {
    pub imported: Vec<LookupRoute>,
    pub filtered: Vec<LookupRoute>,
    pub filters_available: SearchFilters,
    pub filters_applied: SearchFilters,
}

fn dedup_route(route: Arc<Route>, pools: &Pools) -> Arc<Route> {
    let route = Arc::try_unwrap(route).unwrap_or_else(|r| (*r).clone());
    Arc::new(route.dedup(pools))
}

/// Attach the neighbor and the source a stored route belongs to
fn enrich(
    routes: Vec<LookupRoute>,
    neighbors: &NeighborsStore,
    source: &Arc<SourceConfig>,
) -> Vec<LookupRoute> {
    routes
        .into_iter()
        .map(|r| {
            let neighbor = neighbors.get_neighbor_at(&source.id, &r.route.neighbor_id);
            r.with_neighbor(neighbor).with_source(Arc::clone(source))
        })
        .collect()
}

pub struct RoutesStore {
    sources: SourcesStore,
    neighbors: Arc<NeighborsStore>,
    backend: Arc<dyn RoutesBackend>,
    // source id -> time of the last stored snapshot
    cached_at: RwLock<HashMap<String, DateTime<Utc>>>,
    fetch_timeout: Duration,
    check_interval: Duration,
    community_labels: CommunityMap,
}

impl RoutesStore {
    pub fn new(
        sources: Vec<Arc<SourceConfig>>,
        neighbors: Arc<NeighborsStore>,
        backend: Arc<dyn RoutesBackend>,
        config: &StoreConfig,
    ) -> Self {
        Self {
            sources: SourcesStore::new(sources, &config.routes),
            neighbors,
            backend,
            cached_at: RwLock::new(HashMap::new()),
            fetch_timeout: config.fetch_timeout,
            check_interval: config.refresh_check_interval,
            community_labels: config.bgp_communities.clone(),
        }
    }

    pub fn sources(&self) -> &SourcesStore {
        &self.sources
    }

    /// Refresh every due source in the background, forever
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            debug!(
                "Starting routes store [refresh interval {}s]",
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
    /// A failing source keeps its previous snapshot.
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
        let result = match self.fetch_routes(source_id).await {
            Ok(routes) => {
                let count = routes.len();
                self.backend
                    .set_routes(source_id, routes)
                    .await
                    .map(|_| count)
            }
            Err(err) => Err(err),
        };
        match result {
            Ok(count) => {
                debug!("Refreshed {} routes of {}", count, source_id);
                self.cached_at
                    .write()
                    .insert(source_id.to_string(), Utc::now());
                self.sources.refresh_success(source_id);
                Ok(())
            }
            Err(err) => {
                error!("Refreshing routes of {} failed: {}", source_id, err);
                self.sources.refresh_error(source_id, &err);
                Err(err)
            }
        }
    }

    /// Filtered and imported routes of a source, deduplicated
    async fn fetch_routes(&self, source_id: &str) -> Result<Vec<LookupRoute>, StoreError> {
        let instance = self.sources.get_instance(source_id)?;
        let response = self.with_timeout(source_id, instance.all_routes()).await?;

        let pools = pools::global();
        let source_id = pools.source_ids.acquire(source_id);
        let filtered = response
            .filtered
            .into_iter()
            .map(|r| (r, RouteState::Filtered));
        let imported = response
            .imported
            .into_iter()
            .map(|r| (r, RouteState::Imported));
        Ok(filtered
            .chain(imported)
            .map(|(route, state)| {
                LookupRoute::new(dedup_route(route, pools), state, Arc::clone(&source_id))
            })
            .collect())
    }

    /// Query one source in its own task
    pub fn lookup_prefix_at(
        &self,
        source_id: &str,
        prefix: &str,
    ) -> Result<JoinHandle<Vec<LookupRoute>>, StoreError> {
        let source = self.sources.get_source(source_id)?;
        let backend = Arc::clone(&self.backend);
        let neighbors = Arc::clone(&self.neighbors);
        let prefix = prefix.trim().to_lowercase();
        Ok(tokio::spawn(async move {
            match backend.find_by_prefix_at(&source.id, &prefix).await {
                Ok(routes) => enrich(routes, &neighbors, &source),
                Err(err) => {
                    error!("Prefix lookup at {} failed: {}", source.id, err);
                    Vec::new()
                }
            }
        }))
    }

    /// Routes of every source with a network starting with the prefix.
    /// Sources are queried concurrently; results follow source order.
    pub async fn lookup_prefix(&self, prefix: &str) -> Vec<LookupRoute> {
        let handles: Vec<_> = self
            .sources
            .get_source_ids()
            .iter()
            .filter_map(|id| self.lookup_prefix_at(id, prefix).ok())
            .collect();
        collect_lookups(handles).await
    }

    pub fn lookup_neighbors_prefixes_at(
        &self,
        source_id: &str,
        neighbor_ids: Vec<String>,
    ) -> Result<JoinHandle<Vec<LookupRoute>>, StoreError> {
        let source = self.sources.get_source(source_id)?;
        let backend = Arc::clone(&self.backend);
        let neighbors = Arc::clone(&self.neighbors);
        Ok(tokio::spawn(async move {
            match backend.find_by_neighbors_at(&source.id, &neighbor_ids).await {
                Ok(routes) => enrich(routes, &neighbors, &source),
                Err(err) => {
                    error!("Neighbors lookup at {} failed: {}", source.id, err);
                    Vec::new()
                }
            }
        }))
    }

    /// Routes of already resolved neighbors, keyed by source id
    pub async fn lookup_prefix_for_neighbors(
        &self,
        neighbors: &HashMap<String, Vec<Arc<Neighbor>>>,
    ) -> Vec<LookupRoute> {
        let handles: Vec<_> = self
            .sources
            .get_source_ids()
            .iter()
            .filter_map(|id| {
                let ids: Vec<String> = neighbors.get(id)?.iter().map(|n| n.id.clone()).collect();
                if ids.is_empty() {
                    return None;
                }
                self.lookup_neighbors_prefixes_at(id, ids).ok()
            })
            .collect();
        collect_lookups(handles).await
    }

    /// Prefix lookup narrowed by the applied filters
    pub async fn search_prefix(&self, prefix: &str, applied: &SearchFilters) -> RoutesSearchResult {
        let routes = self.lookup_prefix(prefix).await;
        self.search_result(routes, applied)
    }

    /// Routes of the neighbors matching a query ("AS2342" or a
    /// description), narrowed by the applied filters
    pub async fn search_neighbors(&self, query: &str, applied: &SearchFilters) -> RoutesSearchResult {
        let neighbors = self.neighbors.lookup_neighbors(query);
        let routes = self.lookup_prefix_for_neighbors(&neighbors).await;
        self.search_result(routes, applied)
    }

    fn search_result(&self, routes: Vec<LookupRoute>, applied: &SearchFilters) -> RoutesSearchResult {
        let mut available = SearchFilters::new();
        let mut imported = Vec::new();
        let mut filtered = Vec::new();
        for route in routes {
            if !applied.match_route(&route) {
                continue;
            }
            available.update_from_lookup_route(&route);
            match route.state {
                RouteState::Imported => imported.push(route),
                RouteState::Filtered => filtered.push(route),
                RouteState::NotExported => (),
            }
        }

        let mut filters_applied = applied.clone();
        filters_applied.merge_properties(&available);
        filters_applied.apply_community_labels(&self.community_labels);
        let mut filters_available = available.sub(applied);
        filters_available.apply_community_labels(&self.community_labels);

        RoutesSearchResult {
            imported,
            filtered,
            filters_available,
            filters_applied,
        }
    }

    /// Await a source request, bounded by the fetch timeout
    async fn with_timeout<T, F>(&self, source_id: &str, request: F) -> Result<T, StoreError>
    where
        F: Future<Output = SourceResult<T>>,
    {
        timeout(self.fetch_timeout, request)
            .await
            .map_err(|_| StoreError::timeout(source_id, self.fetch_timeout))?
            .map_err(|err| StoreError::fetch(source_id, err))
    }

    /// Received routes of a neighbor, straight from the source
    pub async fn routes_received_at(
        &self,
        source_id: &str,
        neighbor_id: &str,
    ) -> Result<RoutesResponse, StoreError> {
        let instance = self.sources.get_instance(source_id)?;
        self.with_timeout(source_id, instance.routes_received(neighbor_id))
            .await
    }

    pub async fn routes_filtered_at(
        &self,
        source_id: &str,
        neighbor_id: &str,
    ) -> Result<RoutesResponse, StoreError> {
        let instance = self.sources.get_instance(source_id)?;
        self.with_timeout(source_id, instance.routes_filtered(neighbor_id))
            .await
    }

    pub async fn routes_not_exported_at(
        &self,
        source_id: &str,
        neighbor_id: &str,
    ) -> Result<RoutesResponse, StoreError> {
        let instance = self.sources.get_instance(source_id)?;
        self.with_timeout(source_id, instance.routes_not_exported(neighbor_id))
            .await
    }

    pub fn cached_at(&self, source_id: &str) -> Option<DateTime<Utc>> {
        self.cached_at.read().get(source_id).cloned()
    }

    pub async fn stats(&self) -> RoutesStoreStats {
        let mut sources = Vec::new();
        for source in self.sources.get_sources() {
            let status = match self.sources.get_status(&source.id) {
                Ok(status) => status,
                Err(_) => continue,
            };
            let (imported, filtered) = match self.backend.count_routes_at(&source.id).await {
                Ok(counts) => counts,
                Err(err) => {
                    error!("Counting routes of {} failed: {}", source.id, err);
                    (0, 0)
                }
            };
            sources.push(SourceRoutesStats {
                source_id: source.id.clone(),
                name: source.name.clone(),
                status,
                imported,
                filtered,
            });
        }
        RoutesStoreStats {
            total_imported: sources.iter().map(|s| s.imported).sum(),
            total_filtered: sources.iter().map(|s| s.filtered).sum(),
            sources,
        }
    }
}

/// Await every lookup task in spawn order
async fn collect_lookups(handles: Vec<JoinHandle<Vec<LookupRoute>>>) -> Vec<LookupRoute> {
    let mut routes = Vec::new();
    for handle in handles {
        match handle.await {
            Ok(found) => routes.extend(found),
            Err(err) => error!("Lookup task failed: {}", err),
        }
    }
    routes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Community, Meta, NeighborsResponse, NeighborsStatusResponse, Source, StatusResponse};
    use crate::search::FilterGroupKey;
    use crate::store::backend::MemoryBackend;
    use async_trait::async_trait;

    struct StaticRoutes {
        neighbors: Vec<Arc<Neighbor>>,
        imported: Vec<Arc<Route>>,
        filtered: Vec<Arc<Route>>,
    }

    #[async_trait]
    impl Source for StaticRoutes {
        async fn status(&self) -> SourceResult<StatusResponse> {
            Err("unavailable".into())
        }
        async fn neighbors(&self) -> SourceResult<NeighborsResponse> {
            Ok(NeighborsResponse {
                meta: Meta::new("test", Utc::now()),
                neighbors: self.neighbors.clone(),
            })
        }
        async fn neighbors_status(&self) -> SourceResult<NeighborsStatusResponse> {
            Err("unavailable".into())
        }
        async fn routes(&self, _: &str) -> SourceResult<RoutesResponse> {
            Err("unavailable".into())
        }
        async fn routes_received(&self, neighbor_id: &str) -> SourceResult<RoutesResponse> {
            let mut response = RoutesResponse::new(Meta::new("test", Utc::now()));
            response.imported = self
                .imported
                .iter()
                .filter(|r| &*r.neighbor_id == neighbor_id)
                .cloned()
                .collect();
            Ok(response)
        }
        async fn routes_filtered(&self, _: &str) -> SourceResult<RoutesResponse> {
            Err("unavailable".into())
        }
        async fn routes_not_exported(&self, _: &str) -> SourceResult<RoutesResponse> {
            Err("unavailable".into())
        }
        async fn all_routes(&self) -> SourceResult<RoutesResponse> {
            let mut response = RoutesResponse::new(Meta::new("test", Utc::now()));
            response.imported = self.imported.clone();
            response.filtered = self.filtered.clone();
            Ok(response)
        }
        fn expire_caches(&self) -> usize {
            0
        }
    }

    fn route(id: &str, network: &str, neighbor_id: &str, communities: &[&[u32]]) -> Arc<Route> {
        let mut route = Route::new(id, network, neighbor_id);
        route.bgp.communities = communities.iter().map(|c| Community::new(c)).collect();
        Arc::new(route)
    }

    fn neighbor(id: &str, asn: u32) -> Arc<Neighbor> {
        let mut neighbor = Neighbor::new(id, "192.0.2.1", asn);
        neighbor.description = format!("Peer AS{}", asn);
        Arc::new(neighbor)
    }

    async fn stores() -> RoutesStore {
        let source = StaticRoutes {
            neighbors: vec![neighbor("n1", 2342), neighbor("n2", 23)],
            imported: vec![
                route("r1", "10.0.0.0/24", "n1", &[&[23, 42]]),
                route("r2", "10.0.1.0/24", "n2", &[&[23, 42], &[65535, 666]]),
            ],
            filtered: vec![route("r3", "10.0.2.0/24", "n2", &[])],
        };
        let sources = vec![Arc::new(SourceConfig::new("rs1", "RS 1", Arc::new(source)))];
        let config = StoreConfig::default();
        let neighbors = Arc::new(NeighborsStore::new(sources.clone(), &config));
        neighbors.update().await;
        let store = RoutesStore::new(sources, neighbors, Arc::new(MemoryBackend::new()), &config);
        store.update().await;
        store
    }

    #[tokio::test]
    async fn test_lookup_prefix() {
        let store = stores().await;
        let routes = store.lookup_prefix("10.0.").await;
        let ids: Vec<&str> = routes.iter().map(|r| r.route.id.as_str()).collect();
        assert_eq!(ids, vec!["r3", "r1", "r2"]);
        assert_eq!(routes[1].neighbor.as_ref().unwrap().asn, 2342);
        assert_eq!(routes[1].source.as_ref().unwrap().name, "RS 1");
        assert!(routes[2].is_blackhole());
        assert!(store.cached_at("rs1").is_some());
        assert!(store.lookup_prefix_at("rs9", "10.").is_err());
    }

    #[tokio::test]
    async fn test_search_neighbors() {
        let store = stores().await;
        let applied = SearchFilters::new();
        let result = store.search_neighbors("AS23", &applied).await;
        assert_eq!(result.imported.len(), 1);
        assert_eq!(result.filtered.len(), 1);
        assert_eq!(result.imported[0].route.id, "r2");
    }

    #[tokio::test]
    async fn test_search_prefix_facets() {
        let store = stores().await;
        let applied = SearchFilters::from_query(vec![("asns", "23")]).unwrap();
        let result = store.search_prefix("10.", &applied).await;
        assert_eq!(result.imported.len(), 1);
        assert_eq!(result.filtered.len(), 1);

        // The applied ASN is no longer offered, communities are
        assert!(result.filters_available.group(FilterGroupKey::Asns).is_empty());
        assert_eq!(result.filters_available.group(FilterGroupKey::Communities).len(), 2);
        let asn = &result.filters_applied.group(FilterGroupKey::Asns).filters()[0];
        assert_eq!(asn.name, "Peer AS23");
        assert_eq!(asn.cardinality, 2);
    }

    #[tokio::test]
    async fn test_unmatched_filter_counts_nothing() {
        let store = stores().await;
        let applied = SearchFilters::from_query(vec![("communities", "65000:1")]).unwrap();
        let result = store.search_prefix("10.", &applied).await;
        assert!(result.imported.is_empty());
        assert!(result.filtered.is_empty());
        let community = &result.filters_applied.group(FilterGroupKey::Communities).filters()[0];
        assert_eq!(community.cardinality, 0);
        assert!(result.filters_available.is_empty());
    }

    #[tokio::test]
    async fn test_stats_and_neighbor_routes() {
        let store = stores().await;
        let stats = store.stats().await;
        assert_eq!(stats.total_imported, 2);
        assert_eq!(stats.total_filtered, 1);

        let received = store.routes_received_at("rs1", "n1").await.unwrap();
        assert_eq!(received.imported.len(), 1);
        assert!(store.routes_filtered_at("rs1", "n1").await.is_err());
        assert_eq!(
            store.routes_received_at("rs9", "n1").await.unwrap_err(),
            StoreError::SourceNotFound("rs9".to_string())
        );
    }
}
