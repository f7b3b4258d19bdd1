//! Controller-specific error types.
//!
//! This module defines error types specific to the Boot operator that are not
//! covered by upstream library errors.

use boot_client::ClientError;
use kube::Error as KubeError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur in the Boot operator.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Cluster client error
    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    /// Operator configuration document error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Invalid process configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// Webhook or metrics listener failed
    #[error("Server error: {0}")]
    Server(#[from] std::io::Error),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl ControllerError {
    /// True when the failure is expected to clear on its own (conflicts,
    /// throttling, unavailable API server).
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            ControllerError::Client(e) => e.is_retryable(),
            _ => false,
        }
    }
}
