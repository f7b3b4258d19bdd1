//! Operator configuration
//!
//! The layered `config.yaml` document is parsed into [`model::GlobalConfig`],
//! resolved per kind and per profile into [`BootConfig`]s, and published as an
//! immutable [`ResolvedContext`] behind a [`ConfigHandle`].

pub mod model;
pub mod resolver;
pub mod context;
#[cfg(test)]
mod resolver_test;

pub use context::{ConfigHandle, ResolvedContext};
pub use model::AppSpec;
pub use resolver::BootConfig;

use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

/// Key of the configuration document inside the operator ConfigMap
pub const CONFIG_KEY: &str = "config.yaml";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The document is not valid YAML/JSON for the config schema
    #[error("Decoding config.yaml error: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// The profile annotation names a built-in kind
    #[error("Boot using profile, but profile [{0}] is not allow.")]
    ProfileNotAllowed(String),

    /// The profile annotation names an unknown profile
    #[error("Boot using profile, but profile [{0}] config is empty")]
    ProfileMissing(String),

    /// The start-up config file could not be read
    #[error("Can not read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Loads the start-up configuration file. A missing file yields built-in
/// defaults.
pub fn load_file(path: &str, env: &str) -> Result<ResolvedContext, ConfigError> {
    if !Path::new(path).exists() {
        warn!("Config file {} not found, using built-in defaults", path);
        return Ok(ResolvedContext::empty(env));
    }
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_string(),
        source,
    })?;
    info!("Loaded config file {}", path);
    ResolvedContext::from_document(&content, env)
}
