use std::sync::Arc;

use parking_lot::Mutex;

use super::tree::{Handle, ListTree};
use crate::models::{Community, ExtCommunity};

#[derive(Debug)]
struct CommunitiesTrees {
    // Single communities, keyed by their parts
    communities: ListTree<u32, Community>,
    // Lists of communities, keyed by the handles of their members
    lists: ListTree<Handle, Arc<[Community]>>,
}

/// Deduplicates community lists. Every member is deduplicated on
/// its own first; the list is then keyed by the member handles.
#[derive(Debug)]
pub struct CommunitiesPool {
    trees: Mutex<CommunitiesTrees>,
    empty: Arc<[Community]>,
}

impl CommunitiesPool {
    pub fn new() -> Self {
        Self {
            trees: Mutex::new(CommunitiesTrees {
                communities: ListTree::new(),
                lists: ListTree::new(),
            }),
            empty: Arc::from(Vec::new()),
        }
    }

    pub fn acquire(&self, communities: &[Community]) -> Arc<[Community]> {
        if communities.is_empty() {
            return self.empty.clone();
        }
        let mut trees = self.trees.lock();
        let (handles, canonical): (Vec<Handle>, Vec<Community>) = communities
            .iter()
            .map(|c| trees.communities.acquire(c.parts(), || c.clone()))
            .unzip();
        trees.lists.acquire(&handles, || Arc::from(canonical)).1
    }

    pub fn acquire_community(&self, community: &Community) -> Community {
        self.trees
            .lock()
            .communities
            .acquire(community.parts(), || community.clone())
            .1
    }

    /// Number of distinct lists
    pub fn len(&self) -> usize {
        self.trees.lock().lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CommunitiesPool {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct ExtCommunitiesTrees {
    communities: ListTree<String, ExtCommunity>,
    lists: ListTree<Handle, Arc<[ExtCommunity]>>,
}

/// Deduplicates extended community lists
#[derive(Debug)]
pub struct ExtCommunitiesPool {
    trees: Mutex<ExtCommunitiesTrees>,
    empty: Arc<[ExtCommunity]>,
}

impl ExtCommunitiesPool {
    pub fn new() -> Self {
        Self {
            trees: Mutex::new(ExtCommunitiesTrees {
                communities: ListTree::new(),
                lists: ListTree::new(),
            }),
            empty: Arc::from(Vec::new()),
        }
    }

    pub fn acquire(&self, communities: &[ExtCommunity]) -> Arc<[ExtCommunity]> {
        if communities.is_empty() {
            return self.empty.clone();
        }
        let mut trees = self.trees.lock();
        let (handles, canonical): (Vec<Handle>, Vec<ExtCommunity>) = communities
            .iter()
            .map(|c| trees.communities.acquire(c.parts(), || c.clone()))
            .unzip();
        trees.lists.acquire(&handles, || Arc::from(canonical)).1
    }

    pub fn len(&self) -> usize {
        self.trees.lock().lists.len()
    }
}

impl Default for ExtCommunitiesPool {
    fn default() -> Self {
        Self::new()
    }
}
