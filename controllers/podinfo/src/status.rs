//! Status reporter
//!
//! Aggregates per-child convergence results into the parent's status
//! subresource. Status writes go through a merge patch on the status
//! subresource only, so they never race with spec writes from a user,
//! and a failed status write never aborts the reconciliation that
//! produced it.

use crate::convergence::{ChildOutcome, ChildResult};
use crds::{ChildStatus, MyAppResource, MyAppResourceStatus};
use kube::Api;
use kube::api::{Patch, PatchParams};
use tracing::{debug, error};

/// Aggregate child results into a status payload.
///
/// Deleted children are omitted (they no longer exist); failed children
/// surface their reason in the message. `generation` is echoed back as
/// `lastReconciledGeneration` so consumers can tell which spec revision
/// the status describes.
#[must_use]
pub fn build_status(results: &[ChildResult], generation: Option<i64>) -> MyAppResourceStatus {
    let child_statuses: Vec<ChildStatus> = results
        .iter()
        .filter(|r| r.outcome != ChildOutcome::Deleted)
        .map(|r| ChildStatus {
            role: r.role,
            name: r.name.clone(),
            ready: r.ready,
            desired_replicas: r.desired_replicas,
        })
        .collect();

    let failures: Vec<String> = results
        .iter()
        .filter_map(|r| r.error().map(|e| format!("{} failed: {e}", r.role)))
        .collect();

    let message = if failures.is_empty() {
        format!("all {} children converged", child_statuses.len())
    } else {
        failures.join("; ")
    };

    MyAppResourceStatus {
        child_statuses,
        message: Some(message),
        last_reconciled_generation: generation,
    }
}

/// Status payload for a spec the controller refuses to act on.
#[must_use]
pub fn build_rejected_status(reason: &str, generation: Option<i64>) -> MyAppResourceStatus {
    MyAppResourceStatus {
        child_statuses: Vec::new(),
        message: Some(format!("spec rejected: {reason}")),
        last_reconciled_generation: generation,
    }
}

/// Patch the parent's status subresource.
///
/// Failures are logged and swallowed: the next pass rewrites the status
/// from scratch anyway, and a status hiccup must not fail a reconciliation
/// whose children already converged.
pub async fn publish_status(api: &Api<MyAppResource>, name: &str, status: &MyAppResourceStatus) {
    let status_patch = serde_json::json!({ "status": status });
    let pp = PatchParams::default();
    match api
        .patch_status(name, &pp, &Patch::Merge(&status_patch))
        .await
    {
        Ok(_) => debug!("updated MyAppResource {} status", name),
        Err(e) => error!("failed to update MyAppResource {} status: {}", name, e),
    }
}
