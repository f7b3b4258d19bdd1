//! Cluster client errors

use thiserror::Error;

/// Errors returned by [`crate::BootClientTrait`] calls
#[derive(Debug, Error)]
pub enum ClientError {
    /// Object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Optimistic-concurrency conflict (stale resourceVersion)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Create of an object that already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Any other Kubernetes API or transport error
    #[error("Kubernetes error: {0}")]
    Kube(kube::Error),

    /// Transient server-side failure (throttling, timeout, unavailable)
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Object received from the API server does not decode as expected
    #[error("Invalid object: {0}")]
    InvalidObject(String),
}

impl ClientError {
    /// True for NotFound.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }

    /// True for errors that resolve themselves on a later attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Conflict(_) | ClientError::AlreadyExists(_) | ClientError::Unavailable(_)
        )
    }
}

impl From<kube::Error> for ClientError {
    fn from(err: kube::Error) -> Self {
        if let kube::Error::Api(ae) = &err {
            match ae.code {
                404 => return ClientError::NotFound(ae.message.clone()),
                409 if ae.reason == "AlreadyExists" => {
                    return ClientError::AlreadyExists(ae.message.clone());
                }
                409 => return ClientError::Conflict(ae.message.clone()),
                429 | 500 | 503 | 504 => return ClientError::Unavailable(ae.message.clone()),
                _ => {}
            }
        }
        ClientError::Kube(err)
    }
}

impl From<crds::BootDecodeError> for ClientError {
    fn from(err: crds::BootDecodeError) -> Self {
        ClientError::InvalidObject(err.to_string())
    }
}
