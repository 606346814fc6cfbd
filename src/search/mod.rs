mod filters;
mod neighbor_filter;

pub use filters::{
    FilterGroupKey, FilterValue, Filterable, SearchFilter, SearchFilterGroup, SearchFilters,
};
pub use neighbor_filter::{NeighborFilter, NeighborQuery};
