use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;

use serde::{self, Deserialize, Deserializer};

struct Defaults {}

impl Defaults {
    fn refresh_interval() -> u64 {
        300
    }

    fn refresh_parallelism() -> usize {
        5
    }

    fn refresh_check_interval_ms() -> u64 {
        1000
    }

    fn fetch_timeout() -> u64 {
        60
    }

    fn routes_cache_max_size() -> usize {
        1024
    }

    fn housekeeping_interval() -> u64 {
        300
    }
}

/// Config (toml) representation of a route server
#[derive(Clone, Debug, Deserialize)]
pub(super) struct SourceSpec {
    pub(super) id: String,
    // Defaults to the ID
    pub(super) name: Option<String>,
    #[serde(default)]
    pub(super) group: String,
    // Sources are listed by ascending order, then ID
    #[serde(default)]
    pub(super) order: i32,
    // Next hops that mark a route as blackholed
    #[serde(default = "Vec::new")]
    pub(super) blackholes: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct StoreConfigSpec {
    // Refresh a source's neighbors when they are older than this (seconds)
    #[serde(default = "Defaults::refresh_interval")]
    pub(super) neighbors_store_refresh_interval: u64,
    // Max. neighbor refreshes running at once (0 = no limit)
    #[serde(default = "Defaults::refresh_parallelism")]
    pub(super) neighbors_store_refresh_parallelism: usize,
    // Overlay the live session state when neighbors are requested
    #[serde(default)]
    pub(super) enable_neighbors_status_refresh: bool,

    #[serde(default = "Defaults::refresh_interval")]
    pub(super) routes_store_refresh_interval: u64,
    #[serde(default = "Defaults::refresh_parallelism")]
    pub(super) routes_store_refresh_parallelism: usize,

    // How often the refresh loops look for due sources (ms, at least 100)
    #[serde(default = "Defaults::refresh_check_interval_ms")]
    pub(super) refresh_check_interval_ms: u64,
    // Upper bound for every call to a source (seconds)
    #[serde(default = "Defaults::fetch_timeout")]
    pub(super) fetch_timeout: u64,

    #[serde(default = "Defaults::routes_cache_max_size")]
    pub(super) routes_cache_max_size: usize,
    #[serde(default)]
    pub(super) cache_disabled: bool,

    #[serde(default = "Defaults::housekeeping_interval")]
    pub(super) housekeeping_interval: u64,
    #[serde(default)]
    pub(super) housekeeping_force_release_memory: bool,

    #[serde(default)]
    pub(super) backend: BackendKind,
    pub(super) sqlite_path: Option<String>,

    // Community -> label, e.g. "65535:666" = "Blackhole"
    #[serde(default)]
    pub(super) bgp_communities: HashMap<String, String>,

    #[serde(default = "Vec::new")]
    pub(super) sources: Vec<SourceSpec>,
}

impl StoreConfigSpec {
    pub(super) fn from_str(contents: &str) -> io::Result<Self> {
        toml::from_str(contents).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
    }

    pub(super) fn from_file(path: &str) -> io::Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_str(&contents)
    }

    pub(super) fn default_spec() -> Self {
        Self {
            neighbors_store_refresh_interval: Defaults::refresh_interval(),
            neighbors_store_refresh_parallelism: Defaults::refresh_parallelism(),
            enable_neighbors_status_refresh: false,
            routes_store_refresh_interval: Defaults::refresh_interval(),
            routes_store_refresh_parallelism: Defaults::refresh_parallelism(),
            refresh_check_interval_ms: Defaults::refresh_check_interval_ms(),
            fetch_timeout: Defaults::fetch_timeout(),
            routes_cache_max_size: Defaults::routes_cache_max_size(),
            cache_disabled: false,
            housekeeping_interval: Defaults::housekeeping_interval(),
            housekeeping_force_release_memory: false,
            backend: BackendKind::default(),
            sqlite_path: None,
            bgp_communities: HashMap::new(),
            sources: Vec::new(),
        }
    }
}

/// Where the routes store keeps its snapshots
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Memory,
    Sqlite,
}

impl Default for BackendKind {
    fn default() -> Self {
        BackendKind::Memory
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use BackendKind::*;
        let display = match self {
            Memory => "memory",
            Sqlite => "sqlite",
        };
        write!(f, "{}", display)
    }
}

impl<'de> Deserialize<'de> for BackendKind {
    fn deserialize<D>(deserializer: D) -> Result<BackendKind, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.to_lowercase().as_str() {
            "memory" => Ok(BackendKind::Memory),
            "sqlite" => Ok(BackendKind::Sqlite),
            _ => Err(serde::de::Error::custom(format!(
                "Unsupported backend: '{}'",
                s
            ))),
        }
    }
}
