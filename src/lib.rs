//! Live data plane of a BGP looking glass: refreshes neighbors and
//! routes of many route servers in the background and answers
//! prefix and neighbor lookups across all of them.
pub mod cache;
pub mod config;
mod error;
pub mod models;
pub mod pools;
pub mod search;
pub mod store;

pub use config::StoreConfig;
pub use error::StoreError;
pub use store::{NeighborsStore, RoutesStore, SourcesStore, Stores};
