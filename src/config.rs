//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` (or the path in `RADAR_CONFIG`) and deserializes into
//! strongly-typed structs. Algorithm parameters live next to the code that
//! uses them (`FeatureConfig`, `ScoringConfig`, `TrackerConfig`,
//! `HealthPolicy`) and are embedded here with serde defaults. Secrets (API
//! keys) are referenced by env-var name and resolved at runtime.
//!
//! Every structural problem (weights, thresholds, universe, priority lists)
//! is rejected by [`AppConfig::validate`] before the scanner starts.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;

use crate::data::manager::HealthPolicy;
use crate::engine::session::SessionConfig;
use crate::engine::tracker::TrackerConfig;
use crate::strategy::features::FeatureConfig;
use crate::strategy::scoring::ScoringConfig;
use crate::types::RadarError;

/// Default config location when `RADAR_CONFIG` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Adapter names that may appear in a priority list.
pub const KNOWN_PROVIDERS: &[&str] = &["yahoo", "finnhub", "mock"];

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub scanner: ScannerConfig,
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScannerConfig {
    pub name: String,
    pub scan_interval_secs: u64,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Intraday (5m) bars requested per symbol per cycle.
    #[serde(default = "default_intraday_bars")]
    pub intraday_bars: usize,
    /// Daily bars requested per symbol per cycle.
    #[serde(default = "default_daily_bars")]
    pub daily_bars: usize,
    /// Admission filter on last session turnover (close × volume).
    #[serde(default = "default_min_daily_turnover")]
    pub min_daily_turnover: f64,
    pub universe: Vec<String>,
    /// Symbols never scanned even when listed in the universe.
    #[serde(default)]
    pub blacklist: Vec<String>,
    #[serde(default)]
    pub session: SessionConfig,
}

impl ScannerConfig {
    /// Universe minus the blacklist, in configured order.
    pub fn active_universe(&self) -> Vec<String> {
        self.universe
            .iter()
            .filter(|s| !self.blacklist.contains(s))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProvidersConfig {
    pub intraday_priority: Vec<String>,
    pub daily_priority: Vec<String>,
    #[serde(default = "default_order_book_depth")]
    pub order_book_depth: usize,
    #[serde(default = "default_prints_window_minutes")]
    pub prints_window_minutes: u32,
    #[serde(default)]
    pub health: HealthPolicy,
    pub yahoo: Option<YahooConfig>,
    pub finnhub: Option<FinnhubConfig>,
    pub mock: Option<MockConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct YahooConfig {
    pub enabled: bool,
    /// Exchange suffix appended to every symbol (e.g. `.IS`).
    #[serde(default)]
    pub symbol_suffix: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FinnhubConfig {
    pub enabled: bool,
    pub api_key_env: String,
    #[serde(default)]
    pub symbol_suffix: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MockConfig {
    pub enabled: bool,
    #[serde(default)]
    pub seed: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub state_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_file: crate::storage::DEFAULT_STATE_FILE.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self { enabled: false, port: 8080 }
    }
}

fn default_max_concurrency() -> usize {
    4
}

fn default_intraday_bars() -> usize {
    120
}

fn default_daily_bars() -> usize {
    60
}

fn default_min_daily_turnover() -> f64 {
    1_000_000.0
}

fn default_order_book_depth() -> usize {
    5
}

fn default_prints_window_minutes() -> u32 {
    30
}

impl AppConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config = Self::parse(&contents)
            .with_context(|| format!("Invalid config file: {path}"))?;
        Ok(config)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(contents).context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Path of the config file: `RADAR_CONFIG` or `config.toml`.
    pub fn path_from_env() -> String {
        std::env::var("RADAR_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// Reject configurations the scanner cannot run with.
    pub fn validate(&self) -> Result<(), RadarError> {
        let scanner = &self.scanner;
        if scanner.universe.is_empty() {
            return Err(RadarError::Config("universe is empty".into()));
        }
        let mut seen = HashSet::new();
        for symbol in &scanner.universe {
            if symbol.trim().is_empty() {
                return Err(RadarError::Config("universe contains a blank symbol".into()));
            }
            if !seen.insert(symbol.as_str()) {
                return Err(RadarError::Config(format!("duplicate universe symbol: {symbol}")));
            }
        }
        if scanner.active_universe().is_empty() {
            return Err(RadarError::Config("every universe symbol is blacklisted".into()));
        }
        if scanner.scan_interval_secs == 0 {
            return Err(RadarError::Config("scan_interval_secs must be > 0".into()));
        }
        if scanner.max_concurrency == 0 {
            return Err(RadarError::Config("max_concurrency must be > 0".into()));
        }
        if scanner.intraday_bars == 0 || scanner.daily_bars == 0 {
            return Err(RadarError::Config("bar counts must be > 0".into()));
        }

        self.validate_priority("intraday_priority", &self.providers.intraday_priority)?;
        self.validate_priority("daily_priority", &self.providers.daily_priority)?;
        self.providers.health.validate()?;

        scanner.session.validate()?;

        self.features.validate()?;
        self.scoring.validate()?;
        self.tracker.validate()?;
        Ok(())
    }

    fn validate_priority(&self, list_name: &str, list: &[String]) -> Result<(), RadarError> {
        if list.is_empty() {
            return Err(RadarError::Config(format!("{list_name} is empty")));
        }
        let mut seen = HashSet::new();
        for name in list {
            if !KNOWN_PROVIDERS.contains(&name.as_str()) {
                return Err(RadarError::Config(format!(
                    "{list_name}: unknown provider '{name}'"
                )));
            }
            if !seen.insert(name.as_str()) {
                return Err(RadarError::Config(format!(
                    "{list_name}: duplicate provider '{name}'"
                )));
            }
            if !self.provider_enabled(name) {
                return Err(RadarError::Config(format!(
                    "{list_name}: provider '{name}' is not enabled"
                )));
            }
        }
        Ok(())
    }

    /// Whether the named adapter has an enabled config section.
    pub fn provider_enabled(&self, name: &str) -> bool {
        match name {
            "yahoo" => self.providers.yahoo.as_ref().is_some_and(|c| c.enabled),
            "finnhub" => self.providers.finnhub.as_ref().is_some_and(|c| c.enabled),
            "mock" => self.providers.mock.as_ref().is_some_and(|c| c.enabled),
            _ => false,
        }
    }
}
