use std::error::Error;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use super::{NeighborsResponse, NeighborsStatusResponse, RoutesResponse, StatusResponse};

pub type SourceError = Box<dyn Error + Send + Sync>;
pub type SourceResult<T> = Result<T, SourceError>;

/// What the stores need from a routing daemon adapter
#[async_trait]
pub trait Source: Send + Sync {
    async fn status(&self) -> SourceResult<StatusResponse>;

    async fn neighbors(&self) -> SourceResult<NeighborsResponse>;

    async fn neighbors_status(&self) -> SourceResult<NeighborsStatusResponse>;

    async fn routes(&self, neighbor_id: &str) -> SourceResult<RoutesResponse>;

    async fn routes_received(&self, neighbor_id: &str) -> SourceResult<RoutesResponse>;

    async fn routes_filtered(&self, neighbor_id: &str) -> SourceResult<RoutesResponse>;

    async fn routes_not_exported(&self, neighbor_id: &str) -> SourceResult<RoutesResponse>;

    /// Imported and filtered routes of every neighbor
    async fn all_routes(&self) -> SourceResult<RoutesResponse>;

    /// Drop expired cached responses, returns the number removed
    fn expire_caches(&self) -> usize;
}

/// A configured route server
#[derive(Serialize, Clone)]
pub struct SourceConfig {
    pub id: String,
    pub name: String,
    pub group: String,
    pub order: i32,
    pub blackholes: Vec<String>,
    #[serde(skip)]
    pub instance: Arc<dyn Source>,
}

impl SourceConfig {
    pub fn new(id: &str, name: &str, instance: Arc<dyn Source>) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            group: String::new(),
            order: 0,
            blackholes: Vec::new(),
            instance,
        }
    }

    pub fn from_settings(settings: &crate::config::SourceSettings, instance: Arc<dyn Source>) -> Self {
        Self {
            id: settings.id.clone(),
            name: settings.name.clone(),
            group: settings.group.clone(),
            order: settings.order,
            blackholes: settings.blackholes.clone(),
            instance,
        }
    }
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("group", &self.group)
            .field("order", &self.order)
            .field("blackholes", &self.blackholes)
            .finish()
    }
}

impl fmt::Display for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<Source id={} name={}>", self.id, self.name)
    }
}
