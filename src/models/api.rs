use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{Neighbor, NeighborStatus, Route};

/// Metadata of every source response
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Meta {
    pub version: String,
    pub result_from_cache: bool,
    /// The response may be served from a cache until then
    pub ttl: DateTime<Utc>,
}

impl Meta {
    pub fn new(version: &str, ttl: DateTime<Utc>) -> Self {
        Self {
            version: version.to_string(),
            result_from_cache: false,
            ttl,
        }
    }
}

/// A response that carries its own time to live
pub trait CacheableResponse {
    fn meta(&self) -> &Meta;
    fn meta_mut(&mut self) -> &mut Meta;

    /// Time left until the response expires; negative when expired
    fn cache_ttl(&self) -> Duration {
        self.meta().ttl.signed_duration_since(Utc::now())
    }
}

macro_rules! cacheable {
    ($($response:ty),*) => {
        $(
            impl CacheableResponse for $response {
                fn meta(&self) -> &Meta {
                    &self.meta
                }
                fn meta_mut(&mut self) -> &mut Meta {
                    &mut self.meta
                }
            }
        )*
    };
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Status {
    pub server_time: DateTime<Utc>,
    pub last_reboot: Option<DateTime<Utc>>,
    pub last_reconfig: Option<DateTime<Utc>>,
    pub message: String,
    pub router_id: String,
    pub version: String,
    pub backend: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StatusResponse {
    pub meta: Meta,
    pub status: Status,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NeighborsResponse {
    pub meta: Meta,
    pub neighbors: Vec<Arc<Neighbor>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NeighborsStatusResponse {
    pub meta: Meta,
    pub neighbors: Vec<NeighborStatus>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RoutesResponse {
    pub meta: Meta,
    pub imported: Vec<Arc<Route>>,
    pub filtered: Vec<Arc<Route>>,
    pub not_exported: Vec<Arc<Route>>,
}

impl RoutesResponse {
    pub fn new(meta: Meta) -> Self {
        Self {
            meta,
            imported: Vec::new(),
            filtered: Vec::new(),
            not_exported: Vec::new(),
        }
    }
}

cacheable!(
    StatusResponse,
    NeighborsResponse,
    NeighborsStatusResponse,
    RoutesResponse
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_ttl() {
        let fresh = RoutesResponse::new(Meta::new("2.0", Utc::now() + Duration::seconds(60)));
        assert!(fresh.cache_ttl() > Duration::zero());

        let stale = RoutesResponse::new(Meta::new("2.0", Utc::now() - Duration::seconds(1)));
        assert!(stale.cache_ttl() < Duration::zero());
    }
}
