use std::sync::Arc;

use async_trait::async_trait;
use log::trace;

use super::{NeighborsCache, ResponseCache, RoutesCache};
use crate::config::CacheConfig;
use crate::models::{
    CacheableResponse, NeighborsResponse, NeighborsStatusResponse, RoutesResponse, Source,
    SourceResult, StatusResponse,
};

const NEIGHBORS_KEY: &str = "neighbors";

fn from_cache<R: CacheableResponse + Clone>(cache: &ResponseCache<R>, key: &str) -> Option<R> {
    cache.get(key).map(|cached| {
        let mut response = (*cached).clone();
        response.meta_mut().result_from_cache = true;
        response
    })
}

/// Wraps a source adapter and answers repeated neighbor and
/// per-neighbor route queries from its response caches.
/// Status and full route dumps always hit the adapter.
pub struct CachedSource<S: ?Sized> {
    inner: Arc<S>,
    neighbors: NeighborsCache,
    routes: RoutesCache,
    routes_received: RoutesCache,
    routes_filtered: RoutesCache,
    routes_not_exported: RoutesCache,
}

impl<S: Source + ?Sized> CachedSource<S> {
    pub fn new(inner: Arc<S>, config: &CacheConfig) -> Self {
        let routes_cache = || RoutesCache::new(config.max_size, config.disabled);
        Self {
            inner,
            // A single key, the bound does not matter
            neighbors: NeighborsCache::new(1, config.disabled),
            routes: routes_cache(),
            routes_received: routes_cache(),
            routes_filtered: routes_cache(),
            routes_not_exported: routes_cache(),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn cached_routes<'a, F, Fut>(
        cache: &RoutesCache,
        neighbor_id: &'a str,
        fetch: F,
    ) -> SourceResult<RoutesResponse>
    where
        F: FnOnce(&'a str) -> Fut,
        Fut: std::future::Future<Output = SourceResult<RoutesResponse>>,
    {
        if let Some(response) = from_cache(cache, neighbor_id) {
            trace!("Routes of {} served from cache", neighbor_id);
            return Ok(response);
        }
        let response = fetch(neighbor_id).await?;
        cache.set(neighbor_id, response.clone());
        Ok(response)
    }
}

#[async_trait]
impl<S: Source + ?Sized> Source for CachedSource<S> {
    async fn status(&self) -> SourceResult<StatusResponse> {
        self.inner.status().await
    }

    async fn neighbors(&self) -> SourceResult<NeighborsResponse> {
        if let Some(response) = from_cache(&self.neighbors, NEIGHBORS_KEY) {
            return Ok(response);
        }
        let response = self.inner.neighbors().await?;
        self.neighbors.set(NEIGHBORS_KEY, response.clone());
        Ok(response)
    }

    async fn neighbors_status(&self) -> SourceResult<NeighborsStatusResponse> {
        self.inner.neighbors_status().await
    }

    async fn routes(&self, neighbor_id: &str) -> SourceResult<RoutesResponse> {
        Self::cached_routes(&self.routes, neighbor_id, |id| self.inner.routes(id)).await
    }

    async fn routes_received(&self, neighbor_id: &str) -> SourceResult<RoutesResponse> {
        Self::cached_routes(&self.routes_received, neighbor_id, |id| {
            self.inner.routes_received(id)
        })
        .await
    }

    async fn routes_filtered(&self, neighbor_id: &str) -> SourceResult<RoutesResponse> {
        Self::cached_routes(&self.routes_filtered, neighbor_id, |id| {
            self.inner.routes_filtered(id)
        })
        .await
    }

    async fn routes_not_exported(&self, neighbor_id: &str) -> SourceResult<RoutesResponse> {
        Self::cached_routes(&self.routes_not_exported, neighbor_id, |id| {
            self.inner.routes_not_exported(id)
        })
        .await
    }

    async fn all_routes(&self) -> SourceResult<RoutesResponse> {
        self.inner.all_routes().await
    }

    fn expire_caches(&self) -> usize {
        self.neighbors.expire()
            + self.routes.expire()
            + self.routes_received.expire()
            + self.routes_filtered.expire()
            + self.routes_not_exported.expire()
            + self.inner.expire_caches()
    }
}
