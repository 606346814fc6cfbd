use std::collections::HashMap;
use std::convert::TryFrom;
use std::fmt;
use std::sync::Arc;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Well-known BLACKHOLE community (RFC 7999)
pub const BLACKHOLE_COMMUNITY: [u32; 2] = [65535, 666];

/// A standard (asn:value) or large (asn:value:value) community.
///
/// Both kinds share a representation; the number of parts tells
/// them apart, so comparisons always check arity first.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Community(pub Arc<[u32]>);

impl Community {
    pub fn new(parts: &[u32]) -> Self {
        Community(Arc::from(parts))
    }

    pub fn parts(&self) -> &[u32] {
        &self.0
    }

    pub fn is_large(&self) -> bool {
        self.0.len() == 3
    }

    /// Same arity and same parts
    pub fn matches(&self, other: &Community) -> bool {
        self.0.len() == other.0.len() && self.0.iter().zip(other.0.iter()).all(|(a, b)| a == b)
    }

    /// Parse "asn:value" (standard) or "asn:value:value" (large)
    pub fn parse(value: &str, arity: usize) -> Result<Self, StoreError> {
        let parts = value
            .trim()
            .split(':')
            .map(|chunk| chunk.trim().parse::<u32>())
            .collect::<Result<Vec<u32>, _>>()
            .map_err(|err| StoreError::InvalidFilter(format!("{} '{}'", err, value)))?;
        if parts.len() != arity {
            return Err(StoreError::InvalidFilter(format!(
                "Expected {} parts in community '{}'",
                arity, value
            )));
        }
        Ok(Community::new(&parts))
    }
}

impl fmt::Display for Community {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.iter().join(":"))
    }
}

impl TryFrom<&str> for Community {
    type Error = StoreError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let arity = value.split(':').count();
        match arity {
            2 | 3 => Community::parse(value, arity),
            _ => Err(StoreError::InvalidFilter(format!(
                "Invalid community '{}'",
                value
            ))),
        }
    }
}

/// An extended community, e.g. ("rt", "65000", "100")
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExtCommunity(pub Arc<[String]>);

impl ExtCommunity {
    pub fn new<S: AsRef<str>>(parts: &[S]) -> Self {
        ExtCommunity(parts.iter().map(|p| p.as_ref().to_string()).collect())
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }

    pub fn matches(&self, other: &ExtCommunity) -> bool {
        self.0.len() == other.0.len() && self.0.iter().zip(other.0.iter()).all(|(a, b)| a == b)
    }
}

impl fmt::Display for ExtCommunity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.iter().join(":"))
    }
}

impl TryFrom<&str> for ExtCommunity {
    type Error = StoreError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let parts: Vec<&str> = value.trim().split(':').map(str::trim).collect();
        if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
            return Err(StoreError::InvalidFilter(format!(
                "Invalid extended community '{}'",
                value
            )));
        }
        Ok(ExtCommunity::new(&parts))
    }
}

/// Unique communities of a list, keeping first-seen order
pub fn unique<T: Clone + Eq + std::hash::Hash>(communities: &[T]) -> Vec<&T> {
    communities.iter().unique().collect()
}

/// A node in the community label tree: either a label for the
/// full community, or the next level keyed by community part.
#[derive(Debug, Clone, PartialEq)]
pub enum CommunityNode {
    Label(String),
    SubTree(HashMap<String, CommunityNode>),
}

/// Maps communities to human readable labels, e.g.
///   "65535:666"   -> "Blackhole"
///   "9033:65666:*" -> "Do not announce to any peer"
/// A `*` part matches any value when no exact part is present.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommunityMap(HashMap<String, CommunityNode>);

const WILDCARD: &str = "*";

impl CommunityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn set(&mut self, community: &str, label: &str) {
        let parts: Vec<&str> = community.trim().split(':').map(str::trim).collect();
        let (last, path) = match parts.split_last() {
            Some(split) => split,
            None => return,
        };
        let mut level = &mut self.0;
        for part in path {
            let node = level
                .entry(part.to_string())
                .or_insert_with(|| CommunityNode::SubTree(HashMap::new()));
            // A label on the way down is replaced by a deeper level
            if let CommunityNode::Label(_) = node {
                *node = CommunityNode::SubTree(HashMap::new());
            }
            level = match node {
                CommunityNode::SubTree(next) => next,
                CommunityNode::Label(_) => return,
            };
        }
        level.insert(last.to_string(), CommunityNode::Label(label.to_string()));
    }

    pub fn lookup(&self, community: &str) -> Option<&str> {
        let parts: Vec<&str> = community.split(':').collect();
        let mut level = &self.0;
        for (i, part) in parts.iter().enumerate() {
            let node = match level.get(*part) {
                Some(node) => node,
                None => level.get(WILDCARD)?,
            };
            let is_last = i == parts.len() - 1;
            match (node, is_last) {
                (CommunityNode::Label(label), true) => return Some(label),
                (CommunityNode::SubTree(next), false) => level = next,
                _ => return None,
            }
        }
        None
    }

    pub fn lookup_community(&self, community: &Community) -> Option<&str> {
        self.lookup(&community.to_string())
    }
}

impl<K: AsRef<str>, V: AsRef<str>> std::iter::FromIterator<(K, V)> for CommunityMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = CommunityMap::new();
        for (community, label) in iter {
            map.set(community.as_ref(), label.as_ref());
        }
        map
    }
}
