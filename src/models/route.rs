use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::community::{Community, ExtCommunity, BLACKHOLE_COMMUNITY};
use super::{Neighbor, SourceConfig};
use crate::error::StoreError;
use crate::pools::Pools;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BgpInfo {
    pub origin: Arc<str>,
    pub as_path: Arc<[u32]>,
    pub next_hop: Arc<str>,
    pub communities: Arc<[Community]>,
    pub large_communities: Arc<[Community]>,
    pub ext_communities: Arc<[ExtCommunity]>,
    pub local_pref: u32,
    pub med: u32,
}

impl Default for BgpInfo {
    fn default() -> Self {
        Self {
            origin: Arc::from(""),
            as_path: Arc::from(Vec::new()),
            next_hop: Arc::from(""),
            communities: Arc::from(Vec::new()),
            large_communities: Arc::from(Vec::new()),
            ext_communities: Arc::from(Vec::new()),
            local_pref: 0,
            med: 0,
        }
    }
}

impl BgpInfo {
    pub fn has_community(&self, community: &Community) -> bool {
        self.communities.iter().any(|c| c.matches(community))
    }

    pub fn has_large_community(&self, community: &Community) -> bool {
        self.large_communities.iter().any(|c| c.matches(community))
    }

    pub fn has_ext_community(&self, community: &ExtCommunity) -> bool {
        self.ext_communities.iter().any(|c| c.matches(community))
    }
}

/// A prefix as announced by a neighbor
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Route {
    pub id: String,
    pub network: Arc<str>,
    pub interface: Arc<str>,
    pub gateway: Arc<str>,
    pub metric: u32,
    pub bgp: BgpInfo,
    pub age: Duration,
    #[serde(rename = "type")]
    pub route_type: Arc<[String]>,
    pub primary: bool,
    pub neighbor_id: Arc<str>,
    pub details: Option<serde_json::Value>,
}

impl Route {
    pub fn new(id: &str, network: &str, neighbor_id: &str) -> Self {
        Self {
            id: id.to_string(),
            network: Arc::from(network),
            interface: Arc::from(""),
            gateway: Arc::from(""),
            metric: 0,
            bgp: BgpInfo::default(),
            age: Duration::from_secs(0),
            route_type: Arc::from(Vec::new()),
            primary: false,
            neighbor_id: Arc::from(neighbor_id),
            details: None,
        }
    }

    /// Replace every attribute value by its pooled instance
    pub fn dedup(self, pools: &Pools) -> Self {
        let bgp = BgpInfo {
            origin: pools.origins.acquire(&self.bgp.origin),
            as_path: pools.as_paths.acquire(&self.bgp.as_path),
            next_hop: pools.next_hops.acquire(&self.bgp.next_hop),
            communities: pools.communities.acquire(&self.bgp.communities),
            large_communities: pools.large_communities.acquire(&self.bgp.large_communities),
            ext_communities: pools.ext_communities.acquire(&self.bgp.ext_communities),
            local_pref: self.bgp.local_pref,
            med: self.bgp.med,
        };
        Self {
            network: pools.networks.acquire(&self.network),
            interface: pools.interfaces.acquire(&self.interface),
            gateway: pools.gateways.acquire(&self.gateway),
            route_type: pools.route_types.acquire(&self.route_type),
            neighbor_id: pools.neighbor_ids.acquire(&self.neighbor_id),
            bgp,
            ..self
        }
    }

    /// Case-insensitive match of the network against a prefix
    /// that is already lowercase
    pub fn network_starts_with(&self, prefix: &str) -> bool {
        self.network.to_lowercase().starts_with(prefix)
    }
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RouteState {
    Imported,
    Filtered,
    #[serde(rename = "noexport")]
    NotExported,
}

impl fmt::Display for RouteState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let word = match self {
            RouteState::Imported => "imported",
            RouteState::Filtered => "filtered",
            RouteState::NotExported => "noexport",
        };
        write!(f, "{}", word)
    }
}

impl FromStr for RouteState {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "imported" => Ok(RouteState::Imported),
            "filtered" => Ok(RouteState::Filtered),
            "noexport" => Ok(RouteState::NotExported),
            _ => Err(StoreError::Backend(format!("Unknown route state '{}'", s))),
        }
    }
}

/// A route with its classification, as stored by a routes backend.
///
/// `neighbor` and `source` are only attached when answering a query,
/// so the stored snapshot holds nothing but the shared route.
#[derive(Serialize, Debug, Clone)]
pub struct LookupRoute {
    pub route: Arc<Route>,
    pub state: RouteState,
    pub source_id: Arc<str>,
    pub neighbor: Option<Arc<Neighbor>>,
    #[serde(rename = "routeserver")]
    pub source: Option<Arc<SourceConfig>>,
}

impl LookupRoute {
    pub fn new<S: Into<Arc<str>>>(route: Arc<Route>, state: RouteState, source_id: S) -> Self {
        Self {
            route,
            state,
            source_id: source_id.into(),
            neighbor: None,
            source: None,
        }
    }

    pub fn with_neighbor(self, neighbor: Option<Arc<Neighbor>>) -> Self {
        Self { neighbor, ..self }
    }

    pub fn with_source(self, source: Arc<SourceConfig>) -> Self {
        Self {
            source: Some(source),
            ..self
        }
    }

    /// Next hop is a blackhole of the source, or the route
    /// carries the BLACKHOLE community
    pub fn is_blackhole(&self) -> bool {
        let blackhole = Community::new(&BLACKHOLE_COMMUNITY);
        if self.route.bgp.has_community(&blackhole) {
            return true;
        }
        match &self.source {
            Some(source) => source
                .blackholes
                .iter()
                .any(|addr| addr.as_str() == &*self.route.bgp.next_hop),
            None => false,
        }
    }
}
