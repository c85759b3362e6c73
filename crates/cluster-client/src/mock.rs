//! Mock cluster client for unit testing
//!
//! Stores Deployments and Services in memory, applies real JSON merge-patch
//! semantics, and records every write it performs so tests can assert that
//! an idempotent pass issued zero writes.
//!
//! Failures are injected per operation key (e.g.
//! `"create service default/myapp-redis"`); an injected failure fires once
//! and is then cleared.

use crate::cluster_trait::ClusterClientTrait;
use crate::error::ClusterError;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type Key = (String, String);

/// In-memory mock of the cluster transport
#[derive(Clone, Default)]
pub struct MockClusterClient {
    pub(crate) deployments: Arc<Mutex<HashMap<Key, Deployment>>>,
    pub(crate) services: Arc<Mutex<HashMap<Key, Service>>>,
    // Operation key -> error to return (one-shot)
    pub(crate) failures: Arc<Mutex<HashMap<String, ClusterError>>>,
    // Every create/patch/delete issued, in order
    pub(crate) writes: Arc<Mutex<Vec<String>>>,
}

impl MockClusterClient {
    /// Create an empty mock cluster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a Deployment into the mock store (for test setup).
    pub fn add_deployment(&self, namespace: &str, deployment: Deployment) {
        let name = deployment.metadata.name.clone().unwrap_or_default();
        self.deployments
            .lock()
            .expect("mock store lock poisoned")
            .insert((namespace.to_string(), name), deployment);
    }

    /// Seed a Service into the mock store (for test setup).
    pub fn add_service(&self, namespace: &str, service: Service) {
        let name = service.metadata.name.clone().unwrap_or_default();
        self.services
            .lock()
            .expect("mock store lock poisoned")
            .insert((namespace.to_string(), name), service);
    }

    /// Inject a one-shot failure for an operation key, e.g.
    /// `"create service default/myapp-redis"`.
    pub fn fail_on(&self, op: impl Into<String>, error: ClusterError) {
        self.failures
            .lock()
            .expect("mock store lock poisoned")
            .insert(op.into(), error);
    }

    /// Drain and return the write log (creates, patches, deletes in order).
    pub fn take_writes(&self) -> Vec<String> {
        std::mem::take(&mut *self.writes.lock().expect("mock store lock poisoned"))
    }

    /// Set ready/replica counts on a stored Deployment's status.
    pub fn set_deployment_ready(&self, namespace: &str, name: &str, ready: i32, replicas: i32) {
        if let Some(dep) = self
            .deployments
            .lock()
            .expect("mock store lock poisoned")
            .get_mut(&(namespace.to_string(), name.to_string()))
        {
            let status = dep.status.get_or_insert_with(Default::default);
            status.ready_replicas = Some(ready);
            status.replicas = Some(replicas);
        }
    }

    /// Names of all stored Deployments in a namespace.
    #[must_use]
    pub fn deployment_names(&self, namespace: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .deployments
            .lock()
            .expect("mock store lock poisoned")
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Names of all stored Services in a namespace.
    #[must_use]
    pub fn service_names(&self, namespace: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .services
            .lock()
            .expect("mock store lock poisoned")
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        names
    }

    fn check_failure(&self, op: &str) -> Result<(), ClusterError> {
        if let Some(err) = self
            .failures
            .lock()
            .expect("mock store lock poisoned")
            .remove(op)
        {
            return Err(err);
        }
        Ok(())
    }

    fn record_write(&self, op: String) {
        self.writes.lock().expect("mock store lock poisoned").push(op);
    }
}

impl std::fmt::Debug for MockClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockClusterClient").finish_non_exhaustive()
    }
}

/// RFC 7386 merge patch: objects merge recursively, `null` removes a key,
/// everything else (including arrays) replaces wholesale.
fn merge_json(target: &mut serde_json::Value, patch: &serde_json::Value) {
    match (target, patch) {
        (serde_json::Value::Object(target_map), serde_json::Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                if value.is_null() {
                    target_map.remove(key);
                } else {
                    merge_json(
                        target_map.entry(key.clone()).or_insert(serde_json::Value::Null),
                        value,
                    );
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

#[async_trait::async_trait]
impl ClusterClientTrait for MockClusterClient {
    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Deployment>, ClusterError> {
        self.check_failure(&format!("get deployment {namespace}/{name}"))?;
        Ok(self
            .deployments
            .lock()
            .expect("mock store lock poisoned")
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<Deployment, ClusterError> {
        let name = deployment.metadata.name.clone().unwrap_or_default();
        let op = format!("create deployment {namespace}/{name}");
        self.check_failure(&op)?;
        let key = (namespace.to_string(), name.clone());
        let mut store = self.deployments.lock().expect("mock store lock poisoned");
        if store.contains_key(&key) {
            return Err(ClusterError::Conflict(format!(
                "deployment {namespace}/{name} already exists"
            )));
        }
        store.insert(key, deployment.clone());
        drop(store);
        self.record_write(op);
        Ok(deployment.clone())
    }

    async fn patch_deployment(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<Deployment, ClusterError> {
        let op = format!("patch deployment {namespace}/{name}");
        self.check_failure(&op)?;
        let key = (namespace.to_string(), name.to_string());
        let mut store = self.deployments.lock().expect("mock store lock poisoned");
        let existing = store
            .get(&key)
            .ok_or_else(|| ClusterError::NotFound(format!("deployment {namespace}/{name}")))?;
        let mut value = serde_json::to_value(existing)?;
        merge_json(&mut value, patch);
        let patched: Deployment = serde_json::from_value(value)?;
        store.insert(key, patched.clone());
        drop(store);
        self.record_write(op);
        Ok(patched)
    }

    async fn delete_deployment(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        let op = format!("delete deployment {namespace}/{name}");
        self.check_failure(&op)?;
        let removed = self
            .deployments
            .lock()
            .expect("mock store lock poisoned")
            .remove(&(namespace.to_string(), name.to_string()));
        if removed.is_none() {
            return Err(ClusterError::NotFound(format!("deployment {namespace}/{name}")));
        }
        self.record_write(op);
        Ok(())
    }

    async fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Service>, ClusterError> {
        self.check_failure(&format!("get service {namespace}/{name}"))?;
        Ok(self
            .services
            .lock()
            .expect("mock store lock poisoned")
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn create_service(
        &self,
        namespace: &str,
        service: &Service,
    ) -> Result<Service, ClusterError> {
        let name = service.metadata.name.clone().unwrap_or_default();
        let op = format!("create service {namespace}/{name}");
        self.check_failure(&op)?;
        let key = (namespace.to_string(), name.clone());
        let mut store = self.services.lock().expect("mock store lock poisoned");
        if store.contains_key(&key) {
            return Err(ClusterError::Conflict(format!(
                "service {namespace}/{name} already exists"
            )));
        }
        store.insert(key, service.clone());
        drop(store);
        self.record_write(op);
        Ok(service.clone())
    }

    async fn patch_service(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<Service, ClusterError> {
        let op = format!("patch service {namespace}/{name}");
        self.check_failure(&op)?;
        let key = (namespace.to_string(), name.to_string());
        let mut store = self.services.lock().expect("mock store lock poisoned");
        let existing = store
            .get(&key)
            .ok_or_else(|| ClusterError::NotFound(format!("service {namespace}/{name}")))?;
        let mut value = serde_json::to_value(existing)?;
        merge_json(&mut value, patch);
        let patched: Service = serde_json::from_value(value)?;
        store.insert(key, patched.clone());
        drop(store);
        self.record_write(op);
        Ok(patched)
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        let op = format!("delete service {namespace}/{name}");
        self.check_failure(&op)?;
        let removed = self
            .services
            .lock()
            .expect("mock store lock poisoned")
            .remove(&(namespace.to_string(), name.to_string()));
        if removed.is_none() {
            return Err(ClusterError::NotFound(format!("service {namespace}/{name}")));
        }
        self.record_write(op);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_json_merges_objects_and_replaces_scalars() {
        let mut target = serde_json::json!({
            "spec": {"replicas": 1, "paused": false}
        });
        merge_json(&mut target, &serde_json::json!({"spec": {"replicas": 3}}));
        assert_eq!(target["spec"]["replicas"], 3);
        assert_eq!(target["spec"]["paused"], false);
    }

    #[test]
    fn test_merge_json_null_removes_and_arrays_replace() {
        let mut target = serde_json::json!({
            "a": [1, 2, 3],
            "b": "keep",
            "c": "drop"
        });
        merge_json(&mut target, &serde_json::json!({"a": [9], "c": null}));
        assert_eq!(target["a"], serde_json::json!([9]));
        assert_eq!(target["b"], "keep");
        assert!(target.get("c").is_none());
    }

    #[tokio::test]
    async fn test_create_then_create_conflicts() {
        let mock = MockClusterClient::new();
        let dep = Deployment {
            metadata: k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
                name: Some("web".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        mock.create_deployment("default", &dep).await.expect("first create");
        let err = mock.create_deployment("default", &dep).await;
        assert!(matches!(err, Err(ClusterError::Conflict(_))));
        assert_eq!(mock.take_writes(), vec!["create deployment default/web"]);
    }

    #[tokio::test]
    async fn test_injected_failure_fires_once() {
        let mock = MockClusterClient::new();
        mock.fail_on(
            "delete service default/web",
            ClusterError::Unavailable("throttled".to_string()),
        );
        let err = mock.delete_service("default", "web").await;
        assert!(matches!(err, Err(ClusterError::Unavailable(_))));
        // Second attempt hits the store instead of the injection
        let err = mock.delete_service("default", "web").await;
        assert!(matches!(err, Err(ClusterError::NotFound(_))));
    }
}
