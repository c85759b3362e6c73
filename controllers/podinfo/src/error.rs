//! Controller-specific error types.
//!
//! This module defines error types specific to the podinfo controller
//! that are not covered by upstream library errors.

use cluster_client::ClusterError;
use crds::ValidationError;
use kube::Error as KubeError;
use thiserror::Error;

/// Errors that can occur in the podinfo controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Cluster transport error while converging a child
    #[error("cluster error: {0}")]
    #[allow(dead_code)] // Reserved for future use
    Cluster(#[from] ClusterError),

    /// Desired-state document rejected
    #[error("invalid spec: {0}")]
    Validation(#[from] ValidationError),

    /// One or more children failed with a retryable error
    #[error("reconciliation incomplete: {0}")]
    Retryable(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

impl ControllerError {
    /// Whether the dispatch layer should requeue the parent and retry.
    ///
    /// Validation and authorization failures are permanent: they sit in the
    /// parent status until the spec (or cluster policy) changes.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            ControllerError::Retryable(_) | ControllerError::Kube(_) => true,
            ControllerError::Cluster(e) => e.is_transient(),
            ControllerError::Validation(_)
            | ControllerError::InvalidConfig(_)
            | ControllerError::Watch(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_are_permanent() {
        let err = ControllerError::Validation(ValidationError::NegativeReplicaCount(-2));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_transient_cluster_errors_are_retryable() {
        let err = ControllerError::Cluster(ClusterError::Conflict("rv mismatch".to_string()));
        assert!(err.is_retryable());
        let err = ControllerError::Cluster(ClusterError::Forbidden("rbac".to_string()));
        assert!(!err.is_retryable());
    }
}
