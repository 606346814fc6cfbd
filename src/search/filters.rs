use std::collections::HashMap;
use std::convert::TryFrom;
use std::fmt;

use serde::Serialize;

use crate::error::StoreError;
use crate::models::{unique, Community, CommunityMap, ExtCommunity, LookupRoute, Route};

/// What a filter value is tested against
pub trait Filterable {
    fn match_source_id(&self, source_id: &str) -> bool;
    fn match_asn(&self, asn: u32) -> bool;
    fn match_community(&self, community: &Community) -> bool;
    fn match_ext_community(&self, community: &ExtCommunity) -> bool;
    fn match_large_community(&self, community: &Community) -> bool;
}

impl Filterable for LookupRoute {
    fn match_source_id(&self, source_id: &str) -> bool {
        &*self.source_id == source_id
    }

    fn match_asn(&self, asn: u32) -> bool {
        self.neighbor.as_ref().map_or(false, |n| n.asn == asn)
    }

    fn match_community(&self, community: &Community) -> bool {
        self.route.bgp.has_community(community)
    }

    fn match_ext_community(&self, community: &ExtCommunity) -> bool {
        self.route.bgp.has_ext_community(community)
    }

    fn match_large_community(&self, community: &Community) -> bool {
        self.route.bgp.has_large_community(community)
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum FilterValue {
    Source(String),
    Asn(u32),
    Community(Community),
    ExtCommunity(ExtCommunity),
    LargeCommunity(Community),
}

impl FilterValue {
    pub fn matches<F: Filterable>(&self, route: &F) -> bool {
        match self {
            FilterValue::Source(id) => route.match_source_id(id),
            FilterValue::Asn(asn) => route.match_asn(*asn),
            FilterValue::Community(c) => route.match_community(c),
            FilterValue::ExtCommunity(c) => route.match_ext_community(c),
            FilterValue::LargeCommunity(c) => route.match_large_community(c),
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FilterValue::Source(id) => write!(f, "{}", id),
            FilterValue::Asn(asn) => write!(f, "{}", asn),
            FilterValue::Community(c) | FilterValue::LargeCommunity(c) => write!(f, "{}", c),
            FilterValue::ExtCommunity(c) => write!(f, "{}", c),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SearchFilter {
    pub name: String,
    pub value: FilterValue,
    /// Routes of the result set carrying this value
    pub cardinality: usize,
}

impl SearchFilter {
    pub fn new(name: &str, value: FilterValue) -> Self {
        Self {
            name: name.to_string(),
            value,
            cardinality: 1,
        }
    }

    /// A filter requested by the caller; no route is counted yet
    pub fn applied(name: &str, value: FilterValue) -> Self {
        Self {
            name: name.to_string(),
            value,
            cardinality: 0,
        }
    }
}

#[derive(Serialize, Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FilterGroupKey {
    Sources,
    Asns,
    Communities,
    ExtCommunities,
    LargeCommunities,
}

impl FilterGroupKey {
    pub const ALL: [FilterGroupKey; 5] = [
        FilterGroupKey::Sources,
        FilterGroupKey::Asns,
        FilterGroupKey::Communities,
        FilterGroupKey::ExtCommunities,
        FilterGroupKey::LargeCommunities,
    ];

    pub fn as_str(&self) -> &'static str {
        use FilterGroupKey::*;
        match self {
            Sources => "sources",
            Asns => "asns",
            Communities => "communities",
            ExtCommunities => "ext_communities",
            LargeCommunities => "large_communities",
        }
    }

    fn parse_value(&self, value: &str) -> Result<FilterValue, StoreError> {
        use FilterGroupKey::*;
        let value = value.trim();
        match self {
            Sources => Ok(FilterValue::Source(value.to_string())),
            Asns => value
                .parse::<u32>()
                .map(FilterValue::Asn)
                .map_err(|err| StoreError::InvalidFilter(format!("{} '{}'", err, value))),
            Communities => Community::parse(value, 2).map(FilterValue::Community),
            ExtCommunities => ExtCommunity::try_from(value).map(FilterValue::ExtCommunity),
            LargeCommunities => Community::parse(value, 3).map(FilterValue::LargeCommunity),
        }
    }
}

impl fmt::Display for FilterGroupKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Filters of one kind, unique by value and kept in insertion order
#[derive(Serialize, Debug, Clone)]
pub struct SearchFilterGroup {
    key: FilterGroupKey,
    filters: Vec<SearchFilter>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl SearchFilterGroup {
    pub fn new(key: FilterGroupKey) -> Self {
        Self {
            key,
            filters: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn key(&self) -> FilterGroupKey {
        self.key
    }

    pub fn filters(&self) -> &[SearchFilter] {
        &self.filters
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Append a filter, or count one more occurrence of its value
    pub fn add_filter(&mut self, filter: SearchFilter) {
        let key = filter.value.to_string();
        match self.index.get(&key) {
            Some(&i) => self.filters[i].cardinality += 1,
            None => {
                self.index.insert(key, self.filters.len());
                self.filters.push(filter);
            }
        }
    }

    pub fn find_filter(&self, value: &FilterValue) -> Option<&SearchFilter> {
        self.index
            .get(&value.to_string())
            .map(|&i| &self.filters[i])
    }

    pub fn contains(&self, value: &FilterValue) -> bool {
        self.index.contains_key(&value.to_string())
    }

    /// Any filter matches; an empty group matches everything
    pub fn match_any<F: Filterable>(&self, route: &F) -> bool {
        self.filters.is_empty() || self.filters.iter().any(|f| f.value.matches(route))
    }

    /// Every filter matches
    pub fn match_all<F: Filterable>(&self, route: &F) -> bool {
        self.filters.iter().all(|f| f.value.matches(route))
    }

    fn filters_mut(&mut self) -> impl Iterator<Item = &mut SearchFilter> {
        self.filters.iter_mut()
    }
}

/// The five filter groups, always in the same order
#[derive(Serialize, Debug, Clone)]
#[serde(transparent)]
pub struct SearchFilters(Vec<SearchFilterGroup>);

impl SearchFilters {
    pub fn new() -> Self {
        SearchFilters(
            FilterGroupKey::ALL
                .iter()
                .map(|key| SearchFilterGroup::new(*key))
                .collect(),
        )
    }

    pub fn groups(&self) -> &[SearchFilterGroup] {
        &self.0
    }

    pub fn group(&self, key: FilterGroupKey) -> &SearchFilterGroup {
        &self.0[key as usize]
    }

    pub fn group_mut(&mut self, key: FilterGroupKey) -> &mut SearchFilterGroup {
        &mut self.0[key as usize]
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(SearchFilterGroup::is_empty)
    }

    /// Parse applied filters from query parameters, e.g.
    /// `("asns", "2342,23")` or `("large_communities", "9999:666:1")`.
    /// Unknown keys are ignored.
    pub fn from_query<'a, I>(params: I) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut filters = SearchFilters::new();
        for (name, values) in params {
            let key = match FilterGroupKey::ALL.iter().find(|k| k.as_str() == name) {
                Some(key) => *key,
                None => continue,
            };
            for value in values.split(',').filter(|v| !v.trim().is_empty()) {
                let value = key.parse_value(value)?;
                let group = filters.group_mut(key);
                if group.contains(&value) {
                    continue;
                }
                let name = value.to_string();
                group.add_filter(SearchFilter::applied(&name, value));
            }
        }
        Ok(filters)
    }

    /// Collect the communities of a bare route
    pub fn update_from_route(&mut self, route: &Route) {
        for c in unique(&route.bgp.communities) {
            self.group_mut(FilterGroupKey::Communities)
                .add_filter(SearchFilter::new(&c.to_string(), FilterValue::Community(c.clone())));
        }
        for c in unique(&route.bgp.ext_communities) {
            self.group_mut(FilterGroupKey::ExtCommunities).add_filter(SearchFilter::new(
                &c.to_string(),
                FilterValue::ExtCommunity(c.clone()),
            ));
        }
        for c in unique(&route.bgp.large_communities) {
            self.group_mut(FilterGroupKey::LargeCommunities).add_filter(SearchFilter::new(
                &c.to_string(),
                FilterValue::LargeCommunity(c.clone()),
            ));
        }
    }

    /// Collect source, neighbor ASN and communities of a lookup result
    pub fn update_from_lookup_route(&mut self, route: &LookupRoute) {
        let source_name = route
            .source
            .as_ref()
            .map_or_else(|| route.source_id.to_string(), |s| s.name.clone());
        self.group_mut(FilterGroupKey::Sources).add_filter(SearchFilter::new(
            &source_name,
            FilterValue::Source(route.source_id.to_string()),
        ));

        if let Some(neighbor) = &route.neighbor {
            self.group_mut(FilterGroupKey::Asns).add_filter(SearchFilter::new(
                &neighbor.description,
                FilterValue::Asn(neighbor.asn),
            ));
        }

        self.update_from_route(&route.route);
    }

    /// Filters of `self` that are not in `other`
    pub fn sub(&self, other: &SearchFilters) -> SearchFilters {
        let mut result = SearchFilters::new();
        for (mine, theirs) in self.0.iter().zip(other.0.iter()) {
            let group = result.group_mut(mine.key());
            for filter in mine.filters() {
                if !theirs.contains(&filter.value) {
                    group.add_filter(filter.clone());
                }
            }
        }
        result
    }

    /// Take name and cardinality of matching filters from `other`
    pub fn merge_properties(&mut self, other: &SearchFilters) {
        for (mine, theirs) in self.0.iter_mut().zip(other.0.iter()) {
            for filter in mine.filters_mut() {
                if let Some(source) = theirs.find_filter(&filter.value) {
                    filter.name = source.name.clone();
                    filter.cardinality = source.cardinality;
                }
            }
        }
    }

    /// Sources and ASNs match when any filter does; every
    /// community filter of every community kind must match.
    pub fn match_route<F: Filterable>(&self, route: &F) -> bool {
        use FilterGroupKey::*;
        self.group(Sources).match_any(route)
            && self.group(Asns).match_any(route)
            && self.group(Communities).match_all(route)
            && self.group(ExtCommunities).match_all(route)
            && self.group(LargeCommunities).match_all(route)
    }

    /// Name community filters by their configured label
    pub fn apply_community_labels(&mut self, labels: &CommunityMap) {
        if labels.is_empty() {
            return;
        }
        for key in &[
            FilterGroupKey::Communities,
            FilterGroupKey::ExtCommunities,
            FilterGroupKey::LargeCommunities,
        ] {
            for filter in self.group_mut(*key).filters_mut() {
                if let Some(label) = labels.lookup(&filter.value.to_string()) {
                    filter.name = label.to_string();
                }
            }
        }
    }
}

impl Default for SearchFilters {
    fn default() -> Self {
        Self::new()
    }
}
