//! Error types for the fallible surfaces of the crate.
//!
//! Packet transport, read-groups, the tracer and the dependency graph report
//! "no effect" through `bool`/`Option` results instead of errors.

use std::path::PathBuf;

/// Failure loading or validating a [crate::Config].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("invalid value {value:?} for {key}: {reason}")]
  InvalidValue {
    key: String,
    value: String,
    reason: String,
  },

  #[error("delivery_capacity must be at least 1")]
  ZeroCapacity,

  #[error("failed to read config file {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid config JSON: {0}")]
  Json(#[from] serde_json::Error),
}
