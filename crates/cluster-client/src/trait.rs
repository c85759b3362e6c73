//! ClusterClient trait for mocking
//!
//! This trait abstracts the cluster transport to enable mocking in unit
//! tests. The concrete kube-backed client implements it, and tests use the
//! in-memory mock implementation.

use crate::error::ClusterError;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;

/// Namespaced get/create/patch/delete primitives for the child kinds the
/// operator manages.
///
/// All async methods must be `Send` to work with Tokio's work-stealing
/// runtime. Gets return `None` for absent objects so callers can branch
/// without matching on error variants; `NotFound` on a delete is still an
/// error, since callers decide whether an already-gone object matters.
#[async_trait::async_trait]
pub trait ClusterClientTrait: Send + Sync {
    /// Fetch a Deployment by name, `None` if absent.
    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Deployment>, ClusterError>;

    /// Create a Deployment in its namespace.
    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<Deployment, ClusterError>;

    /// Merge-patch a Deployment with a partial JSON document.
    async fn patch_deployment(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<Deployment, ClusterError>;

    /// Delete a Deployment by name.
    async fn delete_deployment(&self, namespace: &str, name: &str) -> Result<(), ClusterError>;

    /// Fetch a Service by name, `None` if absent.
    async fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Service>, ClusterError>;

    /// Create a Service in its namespace.
    async fn create_service(
        &self,
        namespace: &str,
        service: &Service,
    ) -> Result<Service, ClusterError>;

    /// Merge-patch a Service with a partial JSON document.
    async fn patch_service(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<Service, ClusterError>;

    /// Delete a Service by name.
    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), ClusterError>;
}
