//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires the cluster
//! client, reconciler, and watcher together for the podinfo controller.

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::watcher::Watcher;
use cluster_client::ClusterClient;
use crds::MyAppResource;
use kube::{Api, Client};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Main controller for MyAppResource management.
#[derive(Debug)]
pub struct Controller {
    my_app_watcher: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(namespace: Option<String>) -> Result<Self, ControllerError> {
        info!("Initializing podinfo controller");

        // Create Kubernetes client
        let kube_client = Client::try_default().await.map_err(ControllerError::Kube)?;

        // Child resources and the parent CR live in the watch namespace
        let ns = namespace.as_deref().unwrap_or("default");
        let my_app_api: Api<MyAppResource> = Api::namespaced(kube_client.clone(), ns);

        // Create cluster transport and reconciler
        let cluster = ClusterClient::new(kube_client);
        let reconciler = Arc::new(Reconciler::new(cluster, my_app_api.clone()));

        let watcher_instance = Watcher::new(reconciler, my_app_api);

        // Start watcher in a background task
        let my_app_watcher = tokio::spawn(async move { watcher_instance.watch_my_apps().await });

        Ok(Self { my_app_watcher })
    }

    /// Runs the controller until shutdown.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("podinfo controller running");

        // Wait for the watcher to exit (it should run forever)
        tokio::select! {
            result = &mut self.my_app_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("MyAppResource watcher panicked: {e}")))?
                    .map_err(|e| ControllerError::Watch(format!("MyAppResource watcher error: {e}")))?;
            }
        }

        Ok(())
    }
}
