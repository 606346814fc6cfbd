pub(crate) mod cached_source;
mod response;

pub use cached_source::CachedSource;
pub use response::{NeighborsCache, ResponseCache, RoutesCache};
