mod file;

pub use file::BackendKind;

use std::io::Result;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::models::CommunityMap;

// Lower bounds of the background loop periods
const MIN_REFRESH_CHECK_INTERVAL: Duration = Duration::from_millis(100);
const MIN_HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(1);

/// Parse a TOML config file and return a StoreConfig
pub fn from_file(path: &str) -> Result<StoreConfig> {
    let spec = file::StoreConfigSpec::from_file(path)?;
    Ok(StoreConfig::from_spec(spec))
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefreshConfig {
    /// A source is due when its last refresh is older than this
    pub interval: Duration,
    /// Refreshes running at once, 0 for no limit
    pub parallelism: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    pub disabled: bool,
    pub max_size: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HousekeepingConfig {
    pub interval: Duration,
    pub force_release_memory: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BackendConfig {
    Memory,
    Sqlite(PathBuf),
}

/// Route server metadata; the adapter instance is bound separately
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSettings {
    pub id: String,
    pub name: String,
    pub group: String,
    pub order: i32,
    pub blackholes: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub neighbors: RefreshConfig,
    pub routes: RefreshConfig,
    pub enable_neighbors_status_refresh: bool,
    pub refresh_check_interval: Duration,
    pub fetch_timeout: Duration,
    pub cache: CacheConfig,
    pub housekeeping: HousekeepingConfig,
    pub backend: BackendConfig,
    pub bgp_communities: CommunityMap,
    pub sources: Vec<SourceSettings>,
}

impl StoreConfig {
    fn from_spec(spec: file::StoreConfigSpec) -> Self {
        let backend = match (spec.backend, spec.sqlite_path) {
            (BackendKind::Sqlite, Some(path)) => BackendConfig::Sqlite(PathBuf::from(path)),
            (BackendKind::Sqlite, None) => BackendConfig::Sqlite(PathBuf::from("routes.sqlite3")),
            (BackendKind::Memory, _) => BackendConfig::Memory,
        };
        let sources = spec
            .sources
            .into_iter()
            .map(|s| SourceSettings {
                name: s.name.unwrap_or_else(|| s.id.clone()),
                id: s.id,
                group: s.group,
                order: s.order,
                blackholes: s.blackholes,
            })
            .collect();

        Self {
            neighbors: RefreshConfig {
                interval: Duration::from_secs(spec.neighbors_store_refresh_interval),
                parallelism: spec.neighbors_store_refresh_parallelism,
            },
            routes: RefreshConfig {
                interval: Duration::from_secs(spec.routes_store_refresh_interval),
                parallelism: spec.routes_store_refresh_parallelism,
            },
            enable_neighbors_status_refresh: spec.enable_neighbors_status_refresh,
            refresh_check_interval: Duration::from_millis(spec.refresh_check_interval_ms)
                .max(MIN_REFRESH_CHECK_INTERVAL),
            fetch_timeout: Duration::from_secs(spec.fetch_timeout),
            cache: CacheConfig {
                disabled: spec.cache_disabled,
                max_size: spec.routes_cache_max_size,
            },
            housekeeping: HousekeepingConfig {
                interval: Duration::from_secs(spec.housekeeping_interval)
                    .max(MIN_HOUSEKEEPING_INTERVAL),
                force_release_memory: spec.housekeeping_force_release_memory,
            },
            backend,
            bgp_communities: spec.bgp_communities.iter().collect(),
            sources,
        }
    }

    pub fn get_source_settings(&self, id: &str) -> Option<&SourceSettings> {
        self.sources.iter().find(|s| s.id == id)
    }
}

impl FromStr for StoreConfig {
    type Err = std::io::Error;

    fn from_str(contents: &str) -> Result<Self> {
        file::StoreConfigSpec::from_str(contents).map(StoreConfig::from_spec)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        // Every key has a default
        Self::from_spec(file::StoreConfigSpec::default_spec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.neighbors.interval, Duration::from_secs(300));
        assert_eq!(config.routes.parallelism, 5);
        assert_eq!(config.refresh_check_interval, Duration::from_secs(1));
        assert_eq!(config.fetch_timeout, Duration::from_secs(60));
        assert_eq!(config.cache.max_size, 1024);
        assert_eq!(config.backend, BackendConfig::Memory);
        assert!(config.sources.is_empty());
    }

    #[test]
    fn test_loop_intervals_clamped() {
        let config: StoreConfig = "refresh_check_interval_ms = 0\nhousekeeping_interval = 0"
            .parse()
            .unwrap();
        assert_eq!(config.refresh_check_interval, Duration::from_millis(100));
        assert_eq!(config.housekeeping.interval, Duration::from_secs(1));

        let config: StoreConfig = "refresh_check_interval_ms = 250".parse().unwrap();
        assert_eq!(config.refresh_check_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_config_from_str() {
        let config: StoreConfig = r#"
            backend = "sqlite"
            housekeeping_force_release_memory = true

            [bgp_communities]
            "65535:666" = "Blackhole"
            "9033:65666:*" = "Do not announce"

            [[sources]]
            id = "rs1"
            "#
        .parse()
        .unwrap();
        assert_eq!(
            config.backend,
            BackendConfig::Sqlite(PathBuf::from("routes.sqlite3"))
        );
        assert!(config.housekeeping.force_release_memory);
        assert_eq!(config.bgp_communities.lookup("9033:65666:1"), Some("Do not announce"));
        let rs1 = config.get_source_settings("rs1").unwrap();
        assert_eq!(rs1.name, "rs1");
        assert!(config.get_source_settings("rs2").is_none());
    }
}
