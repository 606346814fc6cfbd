mod api;
mod community;
mod neighbor;
mod route;
mod source;

pub use api::{
    CacheableResponse, Meta, NeighborsResponse, NeighborsStatusResponse, RoutesResponse, Status,
    StatusResponse,
};
pub use community::{
    unique, Community, CommunityMap, CommunityNode, ExtCommunity, BLACKHOLE_COMMUNITY,
};
pub use neighbor::{normalize_state, Neighbor, NeighborStatus};
pub use route::{BgpInfo, LookupRoute, Route, RouteState};
pub use source::{Source, SourceConfig, SourceError, SourceResult};
