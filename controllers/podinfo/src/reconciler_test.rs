//! Unit tests for reconciler bookkeeping
//!
//! The full pipeline (build → converge → status) is covered by the
//! convergence tests; these cover the per-identity guard and the
//! pass-outcome classification.

#[cfg(test)]
mod tests {
    use crate::convergence::{ChildOutcome, ChildResult};
    use crate::error::ControllerError;
    use crate::reconciler::{InFlight, classify_results};
    use cluster_client::ClusterError;
    use crds::ChildRole;

    fn result(role: ChildRole, outcome: ChildOutcome) -> ChildResult {
        ChildResult {
            role,
            name: "myapp-podinfo".to_string(),
            outcome,
            ready: None,
            desired_replicas: None,
        }
    }

    #[test]
    fn test_in_flight_claim_is_exclusive_per_identity() {
        let in_flight = InFlight::default();

        let claim = in_flight.try_claim("default/myapp");
        assert!(claim.is_some());
        // Same identity cannot be claimed twice
        assert!(in_flight.try_claim("default/myapp").is_none());
        // Other identities are unaffected
        assert!(in_flight.try_claim("default/other").is_some());
    }

    #[test]
    fn test_in_flight_claim_released_on_drop() {
        let in_flight = InFlight::default();

        {
            let _claim = in_flight.try_claim("default/myapp");
            assert!(in_flight.try_claim("default/myapp").is_none());
        }

        assert!(in_flight.try_claim("default/myapp").is_some());
    }

    #[test]
    fn test_clean_pass_classifies_ok() {
        let results = vec![
            result(ChildRole::PrimaryDeployment, ChildOutcome::Created),
            result(ChildRole::PrimaryService, ChildOutcome::Unchanged),
        ];
        assert!(classify_results("default/myapp", &results).is_ok());
    }

    #[test]
    fn test_transient_child_failure_classifies_retryable() {
        let results = vec![
            result(ChildRole::PrimaryDeployment, ChildOutcome::Created),
            result(
                ChildRole::CacheService,
                ChildOutcome::Failed(ClusterError::Unavailable("throttled".to_string())),
            ),
        ];
        let err = classify_results("default/myapp", &results)
            .expect_err("transient failure must be retryable");
        assert!(matches!(err, ControllerError::Retryable(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_permanent_child_failure_does_not_request_retry() {
        // Forbidden sits in status until RBAC changes; retrying cannot help
        let results = vec![result(
            ChildRole::CacheDeployment,
            ChildOutcome::Failed(ClusterError::Forbidden("rbac".to_string())),
        )];
        assert!(classify_results("default/myapp", &results).is_ok());
    }
}
