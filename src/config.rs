use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::constants;

/// Environment variable consulted for the provider API key when the config
/// file leaves it empty.
pub const API_KEY_ENV: &str = "BAZAAR_PLACES_API_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub places: PlacesConfig,

    pub cache: CacheConfig,

    pub search: SearchConfig,

    pub session: SessionConfig,

    pub pricing: PricingConfig,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_level: String,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    /// Capacity of the session event bus (default: 100)
    pub event_bus_buffer_size: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            worker_threads: 2,
            event_bus_buffer_size: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacesConfig {
    pub base_url: String,

    /// Provider API key. Falls back to `BAZAAR_PLACES_API_KEY` when empty.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub api_key: String,

    pub language: String,

    /// Provider `types` filter, e.g. `address` or `(cities)`.
    pub result_type: Option<String>,

    /// Half-width of the location bias box around a reference location.
    pub search_radius_km: f64,

    /// Send `strictbounds` whenever a reference location is known. Restricts
    /// results to the bias box instead of merely preferring it.
    pub strict_bounds: bool,

    /// Request timeout in seconds (default: 10)
    pub request_timeout_seconds: u64,
}

impl Default for PlacesConfig {
    fn default() -> Self {
        Self {
            base_url: constants::places::DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            language: "en".to_string(),
            result_type: Some("address".to_string()),
            search_radius_km: constants::places::SEARCH_RADIUS_KM,
            strict_bounds: true,
            request_timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Suggestion lifetime in seconds (default: 24h)
    pub ttl_seconds: u64,

    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: constants::cache::TTL_HOURS * 60 * 60,
            max_entries: constants::cache::MAX_ENTRIES,
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Trimmed input shorter than this never reaches the network.
    pub min_query_len: usize,

    /// Quiet period after the last keystroke before a search fires.
    pub debounce_ms: u64,

    /// Minimum spacing between two dispatched searches.
    pub throttle_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            min_query_len: 3,
            debounce_ms: 800,
            throttle_ms: 1000,
        }
    }
}

impl SearchConfig {
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    #[must_use]
    pub const fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle time after which a session no longer bundles (default: 5 min)
    pub timeout_seconds: u64,

    /// How often the sweeper looks for idle sessions (default: 60s)
    pub sweep_interval_seconds: u64,

    /// Cron expression for the sweeper. Overrides the interval when set.
    pub sweep_cron: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 5 * 60,
            sweep_interval_seconds: 60,
            sweep_cron: None,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds.max(1))
    }
}

/// Estimated provider prices used for session cost reporting (USD per call).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    pub autocomplete_per_call: f64,

    pub details_per_call: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            autocomplete_per_call: 0.00283,
            details_per_call: 0.017,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,

    /// Emit logs as JSON lines instead of the human-readable format.
    pub json_logs: bool,

    pub loki_enabled: bool,

    pub loki_url: String,

    pub loki_labels: std::collections::HashMap<String, String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        let mut labels = std::collections::HashMap::new();
        labels.insert("app".to_string(), "bazaar-places".to_string());

        Self {
            metrics_enabled: true,
            json_logs: false,
            loki_enabled: false,
            loki_url: "http://localhost:3100".to_string(),
            loki_labels: labels,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::load_from_path(path).map(Self::with_env_overrides);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default().with_env_overrides())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if self.places.api_key.is_empty()
            && let Ok(key) = std::env::var(API_KEY_ENV)
        {
            self.places.api_key = key;
        }
        self
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![];

        paths.push(PathBuf::from("config.toml"));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("bazaar-places").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".bazaar-places").join("config.toml"));
        }

        paths
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_config_path();
        if path.exists() {
            Ok(false)
        } else {
            let config = Self::default();
            config.save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.places.base_url.is_empty() {
            anyhow::bail!("Places base URL cannot be empty");
        }

        if self.cache.max_entries == 0 {
            anyhow::bail!("Cache must hold at least one entry");
        }

        if self.search.min_query_len == 0 {
            anyhow::bail!("Minimum query length must be at least 1");
        }

        if self.session.timeout_seconds == 0 {
            anyhow::bail!("Session timeout must be > 0");
        }

        if self.session.sweep_interval_seconds == 0 && self.session.sweep_cron.is_none() {
            anyhow::bail!("Sweep interval must be > 0 or cron expression must be set");
        }

        if self.pricing.autocomplete_per_call < 0.0 || self.pricing.details_per_call < 0.0 {
            anyhow::bail!("Prices cannot be negative");
        }

        if self.places.search_radius_km.is_nan() || self.places.search_radius_km <= 0.0 {
            anyhow::bail!("Search radius must be a positive number of kilometres");
        }

        Ok(())
    }
}
