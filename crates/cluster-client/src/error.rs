//! Cluster transport errors

use thiserror::Error;

/// Errors that can occur when talking to the cluster API
///
/// The taxonomy mirrors how the reconciler reacts: `Conflict` and
/// `Unavailable` are retryable, `Forbidden` needs operator intervention,
/// `NotFound` is usually an expected branch rather than a failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClusterError {
    /// Optimistic-concurrency clash on a write
    #[error("conflict: {0}")]
    Conflict(String),

    /// Object not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Authorization failure
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Throttling or apiserver unavailability
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Any other cluster API failure
    #[error("cluster API error: {0}")]
    Api(String),

    /// Object or patch (de)serialization failed
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ClusterError {
    /// Whether a retry of the same operation can be expected to succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, ClusterError::Conflict(_) | ClusterError::Unavailable(_))
    }

    /// Classify a kube client error into the transport taxonomy.
    ///
    /// HTTP-level responses are mapped by status code; anything that never
    /// reached the apiserver (connect failure, timeout) is `Unavailable`,
    /// since the transport treats timeouts as retryable.
    #[must_use]
    pub fn from_kube(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ae) => match ae.code {
                404 => ClusterError::NotFound(ae.message),
                409 => ClusterError::Conflict(ae.message),
                401 | 403 => ClusterError::Forbidden(ae.message),
                408 | 429 | 500..=504 => ClusterError::Unavailable(ae.message),
                _ => ClusterError::Api(format!("{} ({})", ae.message, ae.code)),
            },
            other => ClusterError::Unavailable(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for ClusterError {
    fn from(err: serde_json::Error) -> Self {
        ClusterError::Serialization(err.to_string())
    }
}
