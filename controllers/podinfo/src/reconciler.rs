//! Reconciliation orchestration for MyAppResource.
//!
//! One pass: validate the spec, build the desired child set, converge the
//! cluster, report status. The reconciler also owns the per-identity
//! bookkeeping: an in-flight set guaranteeing at most one pass per parent
//! at a time, and a requeue backoff per parent that grows across failed
//! passes and resets on success.

use crate::builder::{ParentRef, build_children};
use crate::backoff::FibonacciBackoff;
use crate::convergence::{ChildResult, converge};
use crate::error::ControllerError;
use crate::status::{build_rejected_status, build_status, publish_status};
use cluster_client::ClusterClientTrait;
use crds::MyAppResource;
use kube::Api;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Reconciles MyAppResource parents into their child sets.
pub struct Reconciler {
    cluster: Box<dyn ClusterClientTrait>,
    my_app_api: Api<MyAppResource>,
    in_flight: InFlight,
    /// Requeue delay tracking per parent (namespace/name -> backoff)
    backoff_states: Arc<Mutex<HashMap<String, FibonacciBackoff>>>,
}

impl Reconciler {
    /// Creates a new reconciler instance.
    pub fn new(
        cluster: impl ClusterClientTrait + 'static,
        my_app_api: Api<MyAppResource>,
    ) -> Self {
        Self {
            cluster: Box::new(cluster),
            my_app_api,
            in_flight: InFlight::default(),
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Reconciles one MyAppResource.
    ///
    /// Validation failures are surfaced in status and returned as a
    /// permanent error; the dispatch layer does not retry them until the
    /// spec changes. Transient child failures return a retryable error so
    /// the dispatch layer requeues the parent.
    pub async fn reconcile_my_app(&self, app: &MyAppResource) -> Result<(), ControllerError> {
        let name = app
            .metadata
            .name
            .as_ref()
            .ok_or_else(|| ControllerError::InvalidConfig("MyAppResource missing name".to_string()))?;
        let namespace = app.metadata.namespace.as_deref().unwrap_or("default");
        let parent = ParentRef::new(namespace, name.clone(), app.metadata.uid.clone());
        let key = parent.key();

        let Some(_claim) = self.in_flight.try_claim(&key) else {
            // A pass for this parent is running; the watcher redelivers.
            debug!("MyAppResource {} already reconciling, skipping", key);
            return Ok(());
        };

        info!("Reconciling MyAppResource {}", key);
        let generation = app.metadata.generation;

        if let Err(e) = app.spec.validate() {
            warn!("MyAppResource {} spec rejected: {}", key, e);
            let status = build_rejected_status(&e.to_string(), generation);
            publish_status(&self.my_app_api, name, &status).await;
            return Err(ControllerError::Validation(e));
        }

        let desired = build_children(&parent, &app.spec);
        let results = converge(self.cluster.as_ref(), &parent, &desired).await;

        let status = build_status(&results, generation);
        publish_status(&self.my_app_api, name, &status).await;

        classify_results(&key, &results)?;
        self.reset_backoff(&key);
        Ok(())
    }

    /// Releases per-identity state for a deleted parent.
    ///
    /// No child deletes are issued here: every child carries an owner
    /// reference, so cascade deletion is the cluster's job.
    pub fn handle_deletion(&self, namespace: &str, name: &str) {
        let key = format!("{namespace}/{name}");
        info!("MyAppResource {} deleted, releasing state", key);
        if let Ok(mut states) = self.backoff_states.lock() {
            states.remove(&key);
        }
    }

    /// Next requeue delay for a parent whose pass failed.
    pub fn next_backoff(&self, key: &str) -> Duration {
        match self.backoff_states.lock() {
            Ok(mut states) => states
                .entry(key.to_string())
                .or_insert_with(FibonacciBackoff::default)
                .next_delay(),
            Err(e) => {
                warn!("failed to lock backoff states: {}, using default delay", e);
                Duration::from_secs(crate::backoff::DEFAULT_MIN_SECS)
            }
        }
    }

    /// Reset a parent's requeue delay after a successful pass.
    fn reset_backoff(&self, key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            if let Some(state) = states.get_mut(key) {
                state.reset();
            }
        }
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler").finish_non_exhaustive()
    }
}

/// Decide the pass outcome from the per-child results.
///
/// Transient failures (conflict, throttling, unavailability) make the pass
/// retryable. Permanent failures stay in the status until an operator or a
/// spec change resolves them; retrying would not help.
pub(crate) fn classify_results(key: &str, results: &[ChildResult]) -> Result<(), ControllerError> {
    let transient: Vec<String> = results
        .iter()
        .filter_map(|r| {
            r.error()
                .filter(|e| e.is_transient())
                .map(|e| format!("{} ({e})", r.role))
        })
        .collect();

    if transient.is_empty() {
        Ok(())
    } else {
        Err(ControllerError::Retryable(format!(
            "{key}: {}",
            transient.join(", ")
        )))
    }
}

/// Set of parents with a reconciliation pass in flight.
///
/// `try_claim` returns a guard that releases the identity on drop, so a
/// panic or early return can never wedge a parent.
#[derive(Debug, Clone, Default)]
pub(crate) struct InFlight {
    keys: Arc<Mutex<HashSet<String>>>,
}

impl InFlight {
    /// Claim an identity; `None` if a pass already holds it.
    pub(crate) fn try_claim(&self, key: &str) -> Option<InFlightClaim> {
        let mut keys = self.keys.lock().ok()?;
        if keys.insert(key.to_string()) {
            Some(InFlightClaim {
                keys: Arc::clone(&self.keys),
                key: key.to_string(),
            })
        } else {
            None
        }
    }
}

/// Guard for one claimed parent identity.
#[derive(Debug)]
pub(crate) struct InFlightClaim {
    keys: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl Drop for InFlightClaim {
    fn drop(&mut self) {
        if let Ok(mut keys) = self.keys.lock() {
            keys.remove(&self.key);
        }
    }
}
