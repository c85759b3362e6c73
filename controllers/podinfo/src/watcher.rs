//! Kubernetes resource watcher.
//!
//! Drives the event loop for MyAppResource: applied objects (creates and
//! updates) and the initial resync after a restart trigger reconciliation,
//! deletions release per-identity state. A failed retryable pass is
//! requeued on a background task with the reconciler's per-parent backoff
//! delay, standing in for the dispatch substrate's retry policy.

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crds::MyAppResource;
use futures::TryStreamExt;
use kube::Api;
use kube_runtime::watcher;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Watches MyAppResource objects for changes.
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    my_app_api: Api<MyAppResource>,
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(reconciler: Arc<Reconciler>, my_app_api: Api<MyAppResource>) -> Self {
        Self {
            reconciler,
            my_app_api,
        }
    }

    /// Starts watching MyAppResource objects.
    pub async fn watch_my_apps(&self) -> Result<(), ControllerError> {
        info!("Starting MyAppResource watcher");

        let mut stream = Box::pin(watcher(self.my_app_api.clone(), watcher::Config::default()));

        while let Some(event) = stream
            .try_next()
            .await
            .map_err(|e| ControllerError::Watch(format!("Watcher stream error: {e}")))?
        {
            match event {
                watcher::Event::Apply(app) => {
                    let name = app.metadata.name.as_deref().unwrap_or("<unknown>");
                    info!("MyAppResource applied: {}", name);
                    self.reconcile_or_requeue(app).await;
                }
                watcher::Event::Delete(app) => {
                    let name = app.metadata.name.as_deref().unwrap_or("<unknown>");
                    let namespace = app.metadata.namespace.as_deref().unwrap_or("default");
                    self.reconciler.handle_deletion(namespace, name);
                }
                watcher::Event::Init => {
                    info!("MyAppResource watcher initialized");
                }
                watcher::Event::InitApply(app) => {
                    // Resume: existing parents are re-derived from scratch on restart
                    let name = app.metadata.name.as_deref().unwrap_or("<unknown>");
                    debug!("MyAppResource resume: {}", name);
                    self.reconcile_or_requeue(app).await;
                }
                watcher::Event::InitDone => {
                    info!("MyAppResource watcher initialization complete");
                }
            }
        }

        Ok(())
    }

    async fn reconcile_or_requeue(&self, app: MyAppResource) {
        let name = app.metadata.name.clone().unwrap_or_default();
        let namespace = app
            .metadata
            .namespace
            .clone()
            .unwrap_or_else(|| "default".to_string());

        match self.reconciler.reconcile_my_app(&app).await {
            Ok(()) => {}
            Err(e) if e.is_retryable() => {
                error!("Failed to reconcile MyAppResource {}/{}: {}, requeueing", namespace, name, e);
                spawn_requeue(
                    Arc::clone(&self.reconciler),
                    self.my_app_api.clone(),
                    namespace,
                    name,
                );
            }
            Err(e) => {
                // Permanent: surfaced in status, nothing a retry would fix
                error!("Failed to reconcile MyAppResource {}/{}: {}", namespace, name, e);
            }
        }
    }
}

/// Retry a failed parent on a background task until it converges, fails
/// permanently, or disappears. Each attempt waits out the parent's current
/// backoff delay first.
fn spawn_requeue(
    reconciler: Arc<Reconciler>,
    api: Api<MyAppResource>,
    namespace: String,
    name: String,
) {
    tokio::spawn(async move {
        let key = format!("{namespace}/{name}");
        loop {
            let delay = reconciler.next_backoff(&key);
            debug!("requeueing MyAppResource {} in {:?}", key, delay);
            tokio::time::sleep(delay).await;

            // Always reconcile against the latest spec, not the failed event's
            let latest = match api.get_opt(&name).await {
                Ok(Some(app)) => app,
                Ok(None) => {
                    debug!("MyAppResource {} gone, dropping requeue", key);
                    reconciler.handle_deletion(&namespace, &name);
                    break;
                }
                Err(e) => {
                    warn!("failed to fetch MyAppResource {} for requeue: {}", key, e);
                    continue;
                }
            };

            match reconciler.reconcile_my_app(&latest).await {
                Ok(()) => break,
                Err(e) if e.is_retryable() => {
                    warn!("requeued reconciliation of {} failed again: {}", key, e);
                }
                Err(e) => {
                    error!("requeued reconciliation of {} failed permanently: {}", key, e);
                    break;
                }
            }
        }
    });
}
