use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::RoutesBackend;
use crate::error::StoreError;
use crate::models::{LookupRoute, RouteState};

#[derive(Default)]
struct RoutesSnapshot {
    filtered: Vec<LookupRoute>,
    imported: Vec<LookupRoute>,
}

impl RoutesSnapshot {
    fn find<P>(&self, predicate: P) -> Vec<LookupRoute>
    where
        P: Fn(&LookupRoute) -> bool,
    {
        self.filtered
            .iter()
            .chain(self.imported.iter())
            .filter(|r| predicate(*r))
            .cloned()
            .collect()
    }
}

/// Keeps every snapshot in memory; swapped wholesale on refresh
#[derive(Default)]
pub struct MemoryBackend {
    snapshots: RwLock<HashMap<String, Arc<RoutesSnapshot>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self, source_id: &str) -> Option<Arc<RoutesSnapshot>> {
        self.snapshots.read().get(source_id).cloned()
    }

    // Sorted by source id
    fn all_snapshots(&self) -> Vec<Arc<RoutesSnapshot>> {
        let snapshots = self.snapshots.read();
        let mut ids: Vec<&String> = snapshots.keys().collect();
        ids.sort();
        ids.into_iter().map(|id| Arc::clone(&snapshots[id])).collect()
    }
}

fn prefix_matcher(prefix: &str) -> impl Fn(&LookupRoute) -> bool {
    let prefix = prefix.to_lowercase();
    move |r: &LookupRoute| r.route.network_starts_with(&prefix)
}

fn neighbors_matcher(neighbor_ids: &[String]) -> impl Fn(&LookupRoute) -> bool {
    let ids: HashSet<String> = neighbor_ids.iter().cloned().collect();
    move |r: &LookupRoute| ids.contains(&*r.route.neighbor_id)
}

#[async_trait]
impl RoutesBackend for MemoryBackend {
    async fn set_routes(&self, source_id: &str, routes: Vec<LookupRoute>) -> Result<(), StoreError> {
        let mut snapshot = RoutesSnapshot::default();
        for route in routes {
            match route.state {
                RouteState::Filtered => snapshot.filtered.push(route),
                RouteState::Imported => snapshot.imported.push(route),
                RouteState::NotExported => (),
            }
        }
        self.snapshots
            .write()
            .insert(source_id.to_string(), Arc::new(snapshot));
        Ok(())
    }

    async fn find_by_prefix_at(
        &self,
        source_id: &str,
        prefix: &str,
    ) -> Result<Vec<LookupRoute>, StoreError> {
        Ok(self
            .snapshot(source_id)
            .map(|s| s.find(prefix_matcher(prefix)))
            .unwrap_or_default())
    }

    async fn find_by_neighbors_at(
        &self,
        source_id: &str,
        neighbor_ids: &[String],
    ) -> Result<Vec<LookupRoute>, StoreError> {
        Ok(self
            .snapshot(source_id)
            .map(|s| s.find(neighbors_matcher(neighbor_ids)))
            .unwrap_or_default())
    }

    async fn find_by_prefix(&self, prefix: &str) -> Result<Vec<LookupRoute>, StoreError> {
        let matcher = prefix_matcher(prefix);
        Ok(self
            .all_snapshots()
            .iter()
            .flat_map(|s| s.find(&matcher))
            .collect())
    }

    async fn find_by_neighbors(&self, neighbor_ids: &[String]) -> Result<Vec<LookupRoute>, StoreError> {
        let matcher = neighbors_matcher(neighbor_ids);
        Ok(self
            .all_snapshots()
            .iter()
            .flat_map(|s| s.find(&matcher))
            .collect())
    }

    async fn count_routes_at(&self, source_id: &str) -> Result<(usize, usize), StoreError> {
        Ok(self
            .snapshot(source_id)
            .map_or((0, 0), |s| (s.imported.len(), s.filtered.len())))
    }
}
