//! Runtime configuration for pipes and ports.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::instrument;

/// Environment variable overriding [Config::delivery_capacity].
pub const DELIVERY_CAPACITY_ENV: &str = "STREAMWEAVE_PACKET_DELIVERY_CAPACITY";

/// Tunables shared by read-sides and the ports that create them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Size of each read-side's hand-off channel. Values beyond it wait in the
  /// read-side's internal buffer, so this never bounds what writers may send.
  pub delivery_capacity: usize,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      delivery_capacity: 1,
    }
  }
}

impl Config {
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.delivery_capacity == 0 {
      return Err(ConfigError::ZeroCapacity);
    }
    Ok(())
  }

  /// Parses a JSON document; missing fields take their defaults.
  pub fn from_json(source: &str) -> Result<Self, ConfigError> {
    let config: Config = serde_json::from_str(source)?;
    config.validate()?;
    Ok(config)
  }

  #[instrument(level = "trace")]
  pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
    let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    Self::from_json(&source)
  }

  /// Defaults overridden by the process environment.
  pub fn from_env() -> Result<Self, ConfigError> {
    Self::default().with_env_lookup(|key| std::env::var(key).ok())
  }

  /// Applies overrides from `lookup` (an environment-like key lookup).
  pub fn with_env_lookup(
    mut self,
    lookup: impl Fn(&str) -> Option<String>,
  ) -> Result<Self, ConfigError> {
    if let Some(raw) = lookup(DELIVERY_CAPACITY_ENV) {
      self.delivery_capacity = raw
        .trim()
        .parse()
        .map_err(|e: std::num::ParseIntError| ConfigError::InvalidValue {
          key: DELIVERY_CAPACITY_ENV.to_string(),
          value: raw.clone(),
          reason: e.to_string(),
        })?;
    }
    self.validate()?;
    Ok(self)
  }
}
