use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use log::trace;
use parking_lot::Mutex;

use crate::models::{CacheableResponse, NeighborsResponse, RoutesResponse};

pub type NeighborsCache = ResponseCache<NeighborsResponse>;
pub type RoutesCache = ResponseCache<RoutesResponse>;

#[derive(Debug)]
struct CacheEntries<R> {
    responses: HashMap<String, Arc<R>>,
    // key -> logical time of the last set or get
    access_times: HashMap<String, u64>,
    clock: u64,
}

impl<R> CacheEntries<R> {
    fn touch(&mut self, key: &str) {
        self.clock += 1;
        self.access_times.insert(key.to_string(), self.clock);
    }

    fn remove(&mut self, key: &str) {
        self.responses.remove(key);
        self.access_times.remove(key);
    }

    fn least_recently_used(&self) -> Option<String> {
        self.access_times
            .iter()
            .min_by_key(|(_, time)| **time)
            .map(|(key, _)| key.clone())
    }
}

/// Short lived responses by key. A response is valid for as long as
/// its own TTL says; the cache does not track expiry itself.
#[derive(Debug)]
pub struct ResponseCache<R> {
    entries: Mutex<CacheEntries<R>>,
    disabled: bool,
    // 0 for no bound
    max_size: usize,
}

impl<R: CacheableResponse> ResponseCache<R> {
    pub fn new(max_size: usize, disabled: bool) -> Self {
        Self {
            entries: Mutex::new(CacheEntries {
                responses: HashMap::new(),
                access_times: HashMap::new(),
                clock: 0,
            }),
            disabled,
            max_size,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn get(&self, key: &str) -> Option<Arc<R>> {
        if self.disabled {
            return None;
        }
        let mut entries = self.entries.lock();
        let response = entries.responses.get(key)?.clone();
        if response.cache_ttl() < Duration::zero() {
            return None;
        }
        entries.touch(key);
        Some(response)
    }

    pub fn set(&self, key: &str, response: R) {
        if self.disabled {
            return;
        }
        let mut entries = self.entries.lock();
        if self.max_size > 0
            && !entries.responses.contains_key(key)
            && entries.responses.len() >= self.max_size
        {
            if let Some(oldest) = entries.least_recently_used() {
                trace!("Cache full, evicting {}", oldest);
                entries.remove(&oldest);
            }
        }
        entries.responses.insert(key.to_string(), Arc::new(response));
        entries.touch(key);
    }

    /// Remove every expired response, returns the number removed
    pub fn expire(&self) -> usize {
        let mut entries = self.entries.lock();
        let expired: Vec<String> = entries
            .responses
            .iter()
            .filter(|(_, response)| response.cache_ttl() < Duration::zero())
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.remove(key);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
