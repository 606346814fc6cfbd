use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{trace, warn};
use parking_lot::Mutex;
use serde::Serialize;

use crate::config::RefreshConfig;
use crate::error::StoreError;
use crate::models::{Source, SourceConfig};

#[derive(Serialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum State {
    Init,
    Ready,
    Updating,
    Error,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use State::*;
        let word = match self {
            Init => "init",
            Ready => "ready",
            Updating => "updating",
            Error => "error",
        };
        write!(f, "{}", word)
    }
}

/// Refresh bookkeeping of one source
#[derive(Serialize, Debug, Clone)]
pub struct SourceStatus {
    pub state: State,
    pub last_refresh: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Time of the last failed refresh; `last_refresh` keeps the last good one
    pub last_error_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    refreshed_at: Option<Instant>,
}

impl SourceStatus {
    fn new() -> Self {
        Self {
            state: State::Init,
            last_refresh: None,
            last_error: None,
            last_error_at: None,
            refreshed_at: None,
        }
    }

    fn is_due(&self, interval: Duration) -> bool {
        match self.state {
            State::Updating => false,
            State::Init | State::Error => true,
            State::Ready => self
                .refreshed_at
                .map_or(true, |at| at.elapsed() >= interval),
        }
    }
}

/// Decides which sources may refresh and tracks how that went.
///
/// Every store keeps its own SourcesStore, so neighbors and routes
/// of a source are scheduled independently.
pub struct SourcesStore {
    // Sorted by (order, id)
    sources: Vec<Arc<SourceConfig>>,
    status: Mutex<HashMap<String, SourceStatus>>,
    refresh_interval: Duration,
    // 0 for no limit
    refresh_parallelism: usize,
}

impl SourcesStore {
    pub fn new(sources: Vec<Arc<SourceConfig>>, config: &RefreshConfig) -> Self {
        let mut sources = sources;
        sources.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
        let status = sources
            .iter()
            .map(|s| (s.id.clone(), SourceStatus::new()))
            .collect();
        Self {
            sources,
            status: Mutex::new(status),
            refresh_interval: config.interval,
            refresh_parallelism: config.parallelism,
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    pub fn get_sources(&self) -> &[Arc<SourceConfig>] {
        &self.sources
    }

    pub fn get_source_ids(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.id.clone()).collect()
    }

    pub fn get_source(&self, source_id: &str) -> Result<Arc<SourceConfig>, StoreError> {
        self.sources
            .iter()
            .find(|s| s.id == source_id)
            .cloned()
            .ok_or_else(|| StoreError::SourceNotFound(source_id.to_string()))
    }

    pub fn get_instance(&self, source_id: &str) -> Result<Arc<dyn Source>, StoreError> {
        self.get_source(source_id).map(|s| Arc::clone(&s.instance))
    }

    pub fn get_status(&self, source_id: &str) -> Result<SourceStatus, StoreError> {
        self.status
            .lock()
            .get(source_id)
            .cloned()
            .ok_or_else(|| StoreError::SourceNotFound(source_id.to_string()))
    }

    /// A source is initialized once a refresh has succeeded
    pub fn is_initialized(&self, source_id: &str) -> Result<bool, StoreError> {
        self.get_status(source_id)
            .map(|status| status.last_refresh.is_some())
    }

    /// When the source will be due again; now when it never refreshed
    pub fn next_refresh(&self, source_id: &str) -> Result<DateTime<Utc>, StoreError> {
        let status = self.get_status(source_id)?;
        let next = match (status.state, status.last_refresh) {
            (State::Ready, Some(last)) | (State::Updating, Some(last)) => {
                chrono::Duration::from_std(self.refresh_interval)
                    .map_or(last, |interval| last + interval)
            }
            _ => Utc::now(),
        };
        Ok(next)
    }

    /// Sources that are due and not updating, limited so that no
    /// more than `refresh_parallelism` refreshes are in flight.
    pub fn get_source_ids_for_refresh(&self) -> Vec<String> {
        let status = self.status.lock();
        let in_flight = status
            .values()
            .filter(|s| s.state == State::Updating)
            .count();
        let slots = match self.refresh_parallelism {
            0 => usize::MAX,
            limit => limit.saturating_sub(in_flight),
        };
        self.sources
            .iter()
            .filter(|s| {
                status
                    .get(&s.id)
                    .map_or(false, |st| st.is_due(self.refresh_interval))
            })
            .take(slots)
            .map(|s| s.id.clone())
            .collect()
    }

    /// Mark the source as updating, fails when it already is
    pub fn lock_source(&self, source_id: &str) -> Result<(), StoreError> {
        let mut status = self.status.lock();
        let entry = status
            .get_mut(source_id)
            .ok_or_else(|| StoreError::SourceNotFound(source_id.to_string()))?;
        if entry.state == State::Updating {
            return Err(StoreError::SourceBusy(source_id.to_string()));
        }
        trace!("Locked {} for refresh", source_id);
        entry.state = State::Updating;
        Ok(())
    }

    pub fn refresh_success(&self, source_id: &str) {
        let mut status = self.status.lock();
        match status.get_mut(source_id) {
            Some(entry) => {
                entry.state = State::Ready;
                entry.last_refresh = Some(Utc::now());
                entry.refreshed_at = Some(Instant::now());
                entry.last_error = None;
                entry.last_error_at = None;
            }
            None => warn!("Refresh success for unknown source {}", source_id),
        }
    }

    /// Keeps the last successful refresh, the source is due again
    /// on the next pass
    pub fn refresh_error(&self, source_id: &str, err: &StoreError) {
        let mut status = self.status.lock();
        match status.get_mut(source_id) {
            Some(entry) => {
                entry.state = State::Error;
                entry.last_error = Some(err.to_string());
                entry.last_error_at = Some(Utc::now());
            }
            None => warn!("Refresh error for unknown source {}: {}", source_id, err),
        }
    }
}
