use std::sync::Arc;

use log::{debug, info};
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::config::HousekeepingConfig;
use crate::models::SourceConfig;
use crate::pools;

/// What one housekeeping run released
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HousekeepingStats {
    pub expired_responses: usize,
    pub released_values: usize,
}

/// Expire cached responses of every source and drop pooled values
/// that were not used since the last run
pub fn housekeeping(sources: &[Arc<SourceConfig>], force_release_memory: bool) -> HousekeepingStats {
    let expired_responses = sources
        .iter()
        .map(|source| {
            let expired = source.instance.expire_caches();
            debug!("Expired {} cached responses of {}", expired, source.id);
            expired
        })
        .sum();
    let released_values = pools::global().garbage_collect();
    if force_release_memory {
        release_memory();
    }
    HousekeepingStats {
        expired_responses,
        released_values,
    }
}

pub fn start_housekeeping(sources: Vec<Arc<SourceConfig>>, config: HousekeepingConfig) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            sleep(config.interval).await;
            let stats = housekeeping(&sources, config.force_release_memory);
            info!(
                "Housekeeping: expired {} responses, released {} pooled values",
                stats.expired_responses, stats.released_values
            );
        }
    })
}

/// Hand freed heap pages back to the OS
#[cfg(all(target_os = "linux", target_env = "gnu"))]
fn release_memory() {
    // Safe to call at any time, only trims the glibc heap
    unsafe {
        libc::malloc_trim(0);
    }
}

#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
fn release_memory() {
    debug!("Releasing memory is not supported on this platform");
}
