//! podinfo controller
//!
//! Converges `MyAppResource` custom resources into their child workloads:
//! a podinfo Deployment+Service pair, plus a redis Deployment+Service pair
//! when the cache is enabled. Children carry owner references, so deleting
//! a parent cascades through cluster-native garbage collection.

mod backoff;
mod builder;
mod controller;
mod convergence;
mod error;
mod reconciler;
mod status;
mod watcher;

mod builder_test;
mod reconciler_test;
mod test_utils;

use crate::error::ControllerError;
use controller::Controller;
use std::env;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt::init();

    info!("Starting podinfo controller");

    // Load configuration from environment variables
    let namespace = env::var("WATCH_NAMESPACE").ok();

    info!("Configuration:");
    info!("  Namespace: {}", namespace.as_deref().unwrap_or("default"));

    // Initialize and run controller
    let controller = Controller::new(namespace).await?;
    controller.run().await?;

    Ok(())
}
