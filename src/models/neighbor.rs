use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pools::Pools;

/// A BGP session of a route server
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub id: String,
    pub address: Arc<str>,
    pub asn: u32,
    pub state: String,
    pub description: String,
    pub uptime: Duration,
    pub routes_received: u64,
    pub routes_filtered: u64,
    pub routes_exported: u64,
    pub routes_preferred: u64,
    pub routes_accepted: u64,
    pub last_error: String,
    #[serde(rename = "routeserver_id")]
    pub source_id: Arc<str>,
    pub details: Option<serde_json::Value>,
}

impl Neighbor {
    pub fn new(id: &str, address: &str, asn: u32) -> Self {
        Self {
            id: id.to_string(),
            address: Arc::from(address),
            asn,
            state: String::new(),
            description: String::new(),
            uptime: Duration::from_secs(0),
            routes_received: 0,
            routes_filtered: 0,
            routes_exported: 0,
            routes_preferred: 0,
            routes_accepted: 0,
            last_error: String::new(),
            source_id: Arc::from(""),
            details: None,
        }
    }

    /// Pool the address, lowercase the state and tag the owning source
    pub fn normalize(self, source_id: &str, pools: &Pools) -> Self {
        Self {
            address: pools.addresses.acquire(&self.address),
            state: normalize_state(&self.state),
            source_id: pools.source_ids.acquire(source_id),
            ..self
        }
    }

    pub fn is_up(&self) -> bool {
        matches!(self.state.as_str(), "up" | "established")
    }

    /// Apply a live session status on top of this neighbor
    pub fn with_status(&self, status: &NeighborStatus) -> Self {
        Self {
            state: normalize_state(&status.state),
            uptime: status.uptime,
            ..self.clone()
        }
    }
}

/// Daemons report states as "Established", "UP", "down", ...
pub fn normalize_state(state: &str) -> String {
    state.trim().to_lowercase()
}

/// Session state of a neighbor, refreshed independently of
/// (and more often than) the full neighbor list
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NeighborStatus {
    pub id: String,
    pub state: String,
    pub uptime: Duration,
}
