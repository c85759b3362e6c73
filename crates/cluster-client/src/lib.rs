//! Cluster API transport
//!
//! A thin, typed client over the Kubernetes API for the child resource
//! kinds the podinfo operator manages (Deployments and Services).
//! Everything is namespaced get/create/patch/delete primitives; watch and
//! list plumbing lives with the controller's event source, not here.
//!
//! # Example
//!
//! ```no_run
//! use cluster_client::{ClusterClient, ClusterClientTrait};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let kube_client = kube::Client::try_default().await?;
//! let cluster = ClusterClient::new(kube_client);
//!
//! // Look up a child by its deterministic name
//! if cluster.get_deployment("default", "myapp-podinfo").await?.is_none() {
//!     // absent: the convergence engine would create it here
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Typed primitives**: `Option`-returning gets, merge patches, deletes
//! - **Classified errors**: `Conflict`/`NotFound`/`Forbidden`/`Unavailable`
//! - **`test-util`**: in-memory [`MockClusterClient`] that records writes

pub mod client;
pub mod error;
#[path = "trait.rs"]
pub mod cluster_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::ClusterClient;
pub use cluster_trait::ClusterClientTrait;
pub use error::ClusterError;
#[cfg(feature = "test-util")]
pub use mock::MockClusterClient;
