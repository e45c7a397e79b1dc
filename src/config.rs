use crate::error::{FResult, FallDetectionError};
use crate::types::Coordinates;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Tuning for the fall heuristic
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Delta between consecutive samples above which a fall is suspected
    pub threshold: f64,
    /// Minimum spacing between two triggers
    pub cooldown_ms: i64,
    pub sample_rate_hz: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold: 7.0,
            cooldown_ms: 10_000,
            sample_rate_hz: 10,
        }
    }
}

impl DetectorConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(1000 / self.sample_rate_hz.max(1) as u64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// File holding the bearer token issued at login
    pub token_file: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api".to_string(),
            timeout_secs: 60,
            token_file: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    /// Report these coordinates instead of querying the platform
    pub fixed: Option<Coordinates>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub detector: DetectorConfig,
    pub api: ApiConfig,
    pub location: LocationConfig,
}

impl Config {
    /// Load a JSON config file. Missing sections fall back to defaults.
    pub fn load(path: &Path) -> FResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            FallDetectionError::StorageError(format!("{}: {}", path.display(), e))
        })?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> FResult<()> {
        if !(self.detector.threshold > 0.0) {
            return Err(FallDetectionError::InvalidParameters(format!(
                "threshold must be positive, got {}",
                self.detector.threshold
            )));
        }
        if self.detector.sample_rate_hz == 0 || self.detector.sample_rate_hz > 1000 {
            return Err(FallDetectionError::InvalidParameters(format!(
                "sample_rate_hz must be in 1..=1000, got {}",
                self.detector.sample_rate_hz
            )));
        }
        if self.detector.cooldown_ms < 0 {
            return Err(FallDetectionError::InvalidParameters(
                "cooldown_ms must not be negative".to_string(),
            ));
        }
        if self.api.base_url.trim().is_empty() {
            return Err(FallDetectionError::InvalidParameters(
                "api.base_url is empty".to_string(),
            ));
        }
        Ok(())
    }
}
