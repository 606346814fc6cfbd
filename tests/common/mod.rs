#![allow(dead_code)]

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use bgplg::models::{
    Community, Meta, Neighbor, NeighborStatus, NeighborsResponse, NeighborsStatusResponse, Route,
    RoutesResponse, Source, SourceConfig, SourceResult, Status, StatusResponse,
};

pub fn init() {
    let _ = env_logger::builder()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .is_test(true)
        .try_init();
}

/// A route server with fixed contents that can be told to fail or
/// to answer slowly
#[derive(Default)]
pub struct FakeSource {
    neighbors: Vec<Arc<Neighbor>>,
    imported: Vec<Arc<Route>>,
    filtered: Vec<Arc<Route>>,
    delay: Duration,
    ttl_ms: i64,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl FakeSource {
    pub fn new() -> Self {
        Self {
            ttl_ms: 60_000,
            ..Default::default()
        }
    }

    pub fn with_neighbor(mut self, id: &str, asn: u32, description: &str) -> Self {
        let mut neighbor = Neighbor::new(id, "192.0.2.1", asn);
        neighbor.state = "Established".to_string();
        neighbor.description = description.to_string();
        self.neighbors.push(Arc::new(neighbor));
        self
    }

    pub fn with_imported(mut self, id: &str, network: &str, neighbor_id: &str) -> Self {
        self.imported.push(route(id, network, neighbor_id, &[]));
        self
    }

    pub fn with_filtered(mut self, id: &str, network: &str, neighbor_id: &str) -> Self {
        self.filtered.push(route(id, network, neighbor_id, &[]));
        self
    }

    pub fn with_route(mut self, route: Arc<Route>) -> Self {
        self.imported.push(route);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(self) -> Self {
        self.set_failing(true);
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn answer(&self) -> SourceResult<Meta> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err("connection refused".into());
        }
        Ok(Meta::new(
            "fake",
            Utc::now() + chrono::Duration::milliseconds(self.ttl_ms),
        ))
    }

    fn neighbor_routes(&self, routes: &[Arc<Route>], neighbor_id: &str) -> Vec<Arc<Route>> {
        routes
            .iter()
            .filter(|r| &*r.neighbor_id == neighbor_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Source for FakeSource {
    async fn status(&self) -> SourceResult<StatusResponse> {
        let meta = self.answer().await?;
        Ok(StatusResponse {
            meta,
            status: Status {
                server_time: Utc::now(),
                last_reboot: None,
                last_reconfig: None,
                message: "ok".to_string(),
                router_id: "192.0.2.254".to_string(),
                version: "fake".to_string(),
                backend: "fake".to_string(),
            },
        })
    }

    async fn neighbors(&self) -> SourceResult<NeighborsResponse> {
        let meta = self.answer().await?;
        Ok(NeighborsResponse {
            meta,
            neighbors: self.neighbors.clone(),
        })
    }

    async fn neighbors_status(&self) -> SourceResult<NeighborsStatusResponse> {
        let meta = self.answer().await?;
        Ok(NeighborsStatusResponse {
            meta,
            neighbors: self
                .neighbors
                .iter()
                .map(|n| NeighborStatus {
                    id: n.id.clone(),
                    state: n.state.clone(),
                    uptime: n.uptime,
                })
                .collect(),
        })
    }

    async fn routes(&self, neighbor_id: &str) -> SourceResult<RoutesResponse> {
        let mut response = RoutesResponse::new(self.answer().await?);
        response.imported = self.neighbor_routes(&self.imported, neighbor_id);
        response.filtered = self.neighbor_routes(&self.filtered, neighbor_id);
        Ok(response)
    }

    async fn routes_received(&self, neighbor_id: &str) -> SourceResult<RoutesResponse> {
        let mut response = RoutesResponse::new(self.answer().await?);
        response.imported = self.neighbor_routes(&self.imported, neighbor_id);
        Ok(response)
    }

    async fn routes_filtered(&self, neighbor_id: &str) -> SourceResult<RoutesResponse> {
        let mut response = RoutesResponse::new(self.answer().await?);
        response.filtered = self.neighbor_routes(&self.filtered, neighbor_id);
        Ok(response)
    }

    async fn routes_not_exported(&self, _neighbor_id: &str) -> SourceResult<RoutesResponse> {
        Ok(RoutesResponse::new(self.answer().await?))
    }

    async fn all_routes(&self) -> SourceResult<RoutesResponse> {
        let mut response = RoutesResponse::new(self.answer().await?);
        response.imported = self.imported.clone();
        response.filtered = self.filtered.clone();
        Ok(response)
    }

    fn expire_caches(&self) -> usize {
        0
    }
}

pub fn route(id: &str, network: &str, neighbor_id: &str, communities: &[&[u32]]) -> Arc<Route> {
    let mut route = Route::new(id, network, neighbor_id);
    route.bgp.communities = communities.iter().map(|c| Community::new(c)).collect();
    Arc::new(route)
}

pub fn source_config(id: &str, instance: Arc<dyn Source>) -> SourceConfig {
    SourceConfig::new(id, &format!("Route Server {}", id), instance)
}
