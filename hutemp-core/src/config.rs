use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::PathBuf, time::Duration};
use tracing::warn;

use crate::{
    model::{Location, ModelWeights},
    nearest::{load_locations, reference_cities},
    provider::SourceId,
};

/// Base URLs of the upstream feeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub forecast_url: String,
    pub ensemble_url: String,
    pub archive_url: String,
    pub stations_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            forecast_url: "https://api.open-meteo.com/v1/forecast".to_string(),
            ensemble_url: "https://ensemble-api.open-meteo.com/v1/ensemble".to_string(),
            archive_url: "https://archive-api.open-meteo.com/v1/archive".to_string(),
            stations_url: "https://odp.met.hu/weather/weather_reports/synoptic/hungary/daily/csv/"
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Flat per-request timeout.
    pub timeout_secs: u64,
    /// Locations per batched request.
    pub chunk_size: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 30, chunk_size: 50 }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Optional default source id: "forecast", "ensemble" or "stations".
    pub default_source: Option<String>,

    /// Deterministic Open-Meteo models combined by the weighted policy.
    pub models: Vec<String>,

    /// Open-Meteo models whose members are scanned by the ensemble policy.
    pub ensemble_models: Vec<String>,

    /// JSON list of locations; the built-in reference cities are used when unset.
    pub locations_file: Option<PathBuf>,

    /// City whose stations get their own extremes in station reports.
    pub focus_city: String,

    /// Example TOML:
    /// [weights]
    /// ecmwf_ifs025 = 0.5
    /// icon_seamless = 0.3
    pub weights: BTreeMap<String, f64>,

    pub http: HttpConfig,
    pub endpoints: Endpoints,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_source: None,
            models: vec![
                "ecmwf_ifs025".to_string(),
                "icon_seamless".to_string(),
                "gfs_seamless".to_string(),
            ],
            ensemble_models: vec!["icon_seamless".to_string(), "gfs_seamless".to_string()],
            locations_file: None,
            focus_city: "Budapest".to_string(),
            weights: BTreeMap::from([
                ("ecmwf_ifs025".to_string(), 0.45),
                ("icon_seamless".to_string(), 0.35),
                ("gfs_seamless".to_string(), 0.20),
            ]),
            http: HttpConfig::default(),
            endpoints: Endpoints::default(),
        }
    }
}

impl Config {
    /// Return the default source as a strongly-typed SourceId, `forecast` when unset.
    pub fn default_source_id(&self) -> Result<SourceId> {
        match self.default_source.as_deref() {
            Some(s) => SourceId::try_from(s),
            None => Ok(SourceId::Forecast),
        }
    }

    pub fn set_default_source(&mut self, id: SourceId) {
        self.default_source = Some(id.as_str().to_string());
    }

    /// Default weights restricted to `models`, normalised. A requested model without a
    /// configured weight gets the mean of the configured ones, or all share equally when
    /// none of them has one.
    pub fn weights_for(&self, models: &[String]) -> Result<ModelWeights> {
        let configured: Vec<f64> = models.iter().filter_map(|m| self.weights.get(m).copied()).collect();

        let weights = if configured.is_empty() {
            ModelWeights::uniform(models.iter().cloned())
        } else {
            let mean = configured.iter().sum::<f64>() / configured.len() as f64;
            let unweighted: Vec<&str> = models
                .iter()
                .filter(|m| !self.weights.contains_key(*m))
                .map(String::as_str)
                .collect();
            if !unweighted.is_empty() {
                warn!(models = ?unweighted, weight = mean, "no configured weight, using the mean");
            }

            ModelWeights::normalized(
                models
                    .iter()
                    .map(|m| (m.clone(), self.weights.get(m).copied().unwrap_or(mean))),
            )
        };

        weights.with_context(|| format!("Invalid model weights for {}", models.join(", ")))
    }

    /// Locations to query: the configured file, or the built-in reference cities.
    pub fn locations(&self) -> Result<Vec<Location>> {
        match &self.locations_file {
            Some(path) => load_locations(path),
            None => Ok(reference_cities()),
        }
    }

    /// Load config from disk, or return the defaults if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        if !path.exists() {
            // First run: no config file, use defaults.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(&path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "hutemp", "hutemp")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }
}
