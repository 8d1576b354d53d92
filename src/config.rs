/*
 * Configuration Module
 *
 * AppConfig groups the settings for both pipelines, the optional RNG seed
 * and the optional diagnostics read-back interval. It is read from a JSON
 * file named by the FLOCK_CONFIG environment variable; every field is
 * optional and falls back to its default.
 *
 * Example:
 *   { "flock": { "population": 4096, "cohesion_weight": 1.2 },
 *     "hands": { "count": 2 },
 *     "seed": 7, "diagnostics_interval": 120 }
 */

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::params::{FlockParameters, HandParameters};

pub const CONFIG_ENV_VAR: &str = "FLOCK_CONFIG";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub flock: FlockParameters,
    pub hands: HandParameters,
    pub seed: Option<u64>,
    // Read the flock back every N frames for the velocity probe
    pub diagnostics_interval: Option<u64>,
}

impl AppConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    // Defaults when the variable is unset or the file can't be used
    pub fn from_env() -> Self {
        let Ok(path) = std::env::var(CONFIG_ENV_VAR) else {
            return Self::default();
        };

        match Self::from_path(&path) {
            Ok(config) => {
                tracing::info!(path = %path, "loaded configuration");
                config
            }
            Err(err) => {
                tracing::warn!(path = %path, error = %err, "could not load configuration, using defaults");
                Self::default()
            }
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
