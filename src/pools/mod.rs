//! Structural sharing of BGP attribute values.
//!
//! Millions of routes repeat a small set of AS paths, community
//! lists and strings. Every route passes through these pools before
//! it is stored, so equal values share one allocation.
mod communities;
mod int_list;
mod string;
mod tree;

pub use communities::{CommunitiesPool, ExtCommunitiesPool};
pub use int_list::{IntListPool, StringListPool};
pub use string::StringPool;
pub use tree::Handle;

use log::debug;
use once_cell::sync::Lazy;

static POOLS: Lazy<Pools> = Lazy::new(Pools::new);

/// Process-wide pools, living for the lifetime of the process
pub fn global() -> &'static Pools {
    &POOLS
}

#[derive(Debug, Default)]
pub struct Pools {
    pub source_ids: StringPool,
    pub neighbor_ids: StringPool,
    pub addresses: StringPool,
    pub networks: StringPool,
    pub interfaces: StringPool,
    pub gateways: StringPool,
    pub origins: StringPool,
    pub next_hops: StringPool,
    pub as_paths: IntListPool,
    pub communities: CommunitiesPool,
    pub large_communities: CommunitiesPool,
    pub ext_communities: ExtCommunitiesPool,
    pub route_types: StringListPool,
}

impl Pools {
    pub fn new() -> Self {
        Self::default()
    }

    fn string_pools(&self) -> [(&'static str, &StringPool); 8] {
        [
            ("source_ids", &self.source_ids),
            ("neighbor_ids", &self.neighbor_ids),
            ("addresses", &self.addresses),
            ("networks", &self.networks),
            ("interfaces", &self.interfaces),
            ("gateways", &self.gateways),
            ("origins", &self.origins),
            ("next_hops", &self.next_hops),
        ]
    }

    /// Run a garbage collection on every string pool
    pub fn garbage_collect(&self) -> usize {
        self.string_pools()
            .iter()
            .map(|(name, pool)| {
                let released = pool.garbage_collect();
                if released > 0 {
                    debug!("Pool {}: released {} values", name, released);
                }
                released
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_global_pools_shared() {
        let a = global().as_paths.acquire(&[64500, 64501, 64502]);
        let b = global().as_paths.acquire(&[64500, 64501, 64502]);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_pools_garbage_collect() {
        let pools = Pools::new();
        pools.networks.acquire("10.0.0.0/8");
        pools.gateways.acquire("192.0.2.1");
        assert_eq!(pools.garbage_collect(), 0);
        assert_eq!(pools.garbage_collect(), 2);
    }
}
