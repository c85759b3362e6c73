//! Convergence engine
//!
//! Drives observed cluster state toward a desired child set with minimal
//! writes. Each child is looked up by its deterministic name, then created,
//! merge-patched with only the drifted field groups, or left alone. Roles
//! missing from the desired set are deleted explicitly.
//!
//! A failure on one child never aborts the pass: it is recorded in that
//! child's result and the remaining children are still processed. Every
//! step is idempotent and re-derivable from the parent spec, so a retried
//! pass is always safe.

use crate::builder::{ALL_ROLES, DesiredChild, DesiredResource, ParentRef, child_name};
use cluster_client::{ClusterClientTrait, ClusterError};
use crds::ChildRole;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// What happened to one child during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildOutcome {
    /// Child was absent and has been created
    Created,
    /// Child existed and drifted; a minimal patch was applied
    Patched,
    /// Child matched the desired state; no write issued
    Unchanged,
    /// Child's role left the desired set; object deleted
    Deleted,
    /// The child's API operation failed
    Failed(ClusterError),
}

/// Per-child reconciliation result.
#[derive(Debug, Clone)]
pub struct ChildResult {
    /// Logical role of the child
    pub role: ChildRole,
    /// Child object name
    pub name: String,
    /// What the engine did
    pub outcome: ChildOutcome,
    /// Observed ready pod count (Deployments only)
    pub ready: Option<i32>,
    /// Desired replica count (Deployments only)
    pub desired_replicas: Option<i32>,
}

impl ChildResult {
    fn plain(role: ChildRole, name: String, outcome: ChildOutcome) -> Self {
        Self {
            role,
            name,
            outcome,
            ready: None,
            desired_replicas: None,
        }
    }

    fn from_deployment(role: ChildRole, name: String, outcome: ChildOutcome, dep: &Deployment) -> Self {
        Self {
            role,
            name,
            outcome,
            ready: dep.status.as_ref().and_then(|s| s.ready_replicas),
            desired_replicas: dep.spec.as_ref().and_then(|s| s.replicas),
        }
    }

    /// The failure recorded for this child, if any.
    #[must_use]
    pub fn error(&self) -> Option<&ClusterError> {
        match &self.outcome {
            ChildOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Converge the cluster toward `desired` for one parent.
///
/// Desired children are processed in builder order (Deployment before
/// Service per component), then roles absent from `desired` are deleted.
/// Returns one result per processed child; a role that is both undesired
/// and already absent produces no entry.
pub async fn converge(
    cluster: &dyn ClusterClientTrait,
    parent: &ParentRef,
    desired: &[DesiredChild],
) -> Vec<ChildResult> {
    let ns = &parent.namespace;
    let mut results = Vec::with_capacity(desired.len());

    for child in desired {
        let result = match &child.resource {
            DesiredResource::Deployment(dep) => {
                converge_deployment(cluster, ns, child.role, &child.name, dep).await
            }
            DesiredResource::Service(svc) => {
                converge_service(cluster, ns, child.role, &child.name, svc).await
            }
        };
        if let ChildOutcome::Failed(e) = &result.outcome {
            warn!("child {} {}/{} failed: {}", result.role, ns, result.name, e);
        }
        results.push(result);
    }

    let desired_roles: Vec<ChildRole> = desired.iter().map(|c| c.role).collect();
    for role in ALL_ROLES {
        if desired_roles.contains(&role) {
            continue;
        }
        if let Some(result) = remove_absent_role(cluster, parent, role).await {
            results.push(result);
        }
    }

    results
}

async fn converge_deployment(
    cluster: &dyn ClusterClientTrait,
    ns: &str,
    role: ChildRole,
    name: &str,
    desired: &Deployment,
) -> ChildResult {
    let observed = match cluster.get_deployment(ns, name).await {
        Ok(o) => o,
        Err(e) => return ChildResult::plain(role, name.to_string(), ChildOutcome::Failed(e)),
    };

    match observed {
        None => match cluster.create_deployment(ns, desired).await {
            Ok(created) => {
                info!("created Deployment {}/{}", ns, name);
                ChildResult::from_deployment(role, name.to_string(), ChildOutcome::Created, &created)
            }
            Err(e) => ChildResult::plain(role, name.to_string(), ChildOutcome::Failed(e)),
        },
        Some(observed) => match deployment_patch(desired, &observed) {
            Ok(None) => {
                debug!("Deployment {}/{} already converged", ns, name);
                ChildResult::from_deployment(role, name.to_string(), ChildOutcome::Unchanged, &observed)
            }
            Ok(Some(patch)) => match cluster.patch_deployment(ns, name, &patch).await {
                Ok(patched) => {
                    info!("patched Deployment {}/{}", ns, name);
                    ChildResult::from_deployment(role, name.to_string(), ChildOutcome::Patched, &patched)
                }
                Err(e) => ChildResult::plain(role, name.to_string(), ChildOutcome::Failed(e)),
            },
            Err(e) => ChildResult::plain(role, name.to_string(), ChildOutcome::Failed(e)),
        },
    }
}

async fn converge_service(
    cluster: &dyn ClusterClientTrait,
    ns: &str,
    role: ChildRole,
    name: &str,
    desired: &Service,
) -> ChildResult {
    let observed = match cluster.get_service(ns, name).await {
        Ok(o) => o,
        Err(e) => return ChildResult::plain(role, name.to_string(), ChildOutcome::Failed(e)),
    };

    match observed {
        None => match cluster.create_service(ns, desired).await {
            Ok(_) => {
                info!("created Service {}/{}", ns, name);
                ChildResult::plain(role, name.to_string(), ChildOutcome::Created)
            }
            Err(e) => ChildResult::plain(role, name.to_string(), ChildOutcome::Failed(e)),
        },
        Some(observed) => match service_patch(desired, &observed) {
            Ok(None) => {
                debug!("Service {}/{} already converged", ns, name);
                ChildResult::plain(role, name.to_string(), ChildOutcome::Unchanged)
            }
            Ok(Some(patch)) => match cluster.patch_service(ns, name, &patch).await {
                Ok(_) => {
                    info!("patched Service {}/{}", ns, name);
                    ChildResult::plain(role, name.to_string(), ChildOutcome::Patched)
                }
                Err(e) => ChildResult::plain(role, name.to_string(), ChildOutcome::Failed(e)),
            },
            Err(e) => ChildResult::plain(role, name.to_string(), ChildOutcome::Failed(e)),
        },
    }
}

/// Delete the object of a role that left the desired set, if it exists.
async fn remove_absent_role(
    cluster: &dyn ClusterClientTrait,
    parent: &ParentRef,
    role: ChildRole,
) -> Option<ChildResult> {
    let ns = &parent.namespace;
    let name = child_name(&parent.name, role);

    let exists = if role.is_deployment() {
        cluster.get_deployment(ns, &name).await.map(|o| o.is_some())
    } else {
        cluster.get_service(ns, &name).await.map(|o| o.is_some())
    };

    match exists {
        Ok(false) => None,
        Ok(true) => {
            let deleted = if role.is_deployment() {
                cluster.delete_deployment(ns, &name).await
            } else {
                cluster.delete_service(ns, &name).await
            };
            match deleted {
                Ok(()) => {
                    info!("deleted {} {}/{} (role no longer desired)", role, ns, name);
                    Some(ChildResult::plain(role, name, ChildOutcome::Deleted))
                }
                // Lost a race with garbage collection; the object is gone either way
                Err(ClusterError::NotFound(_)) => None,
                Err(e) => Some(ChildResult::plain(role, name, ChildOutcome::Failed(e))),
            }
        }
        Err(e) => Some(ChildResult::plain(role, name, ChildOutcome::Failed(e))),
    }
}

/// Minimal merge patch for a drifted Deployment, `None` when converged.
///
/// The diff covers the managed field set only: replica count, and the pod
/// template's image/env/resources/labels plus the selector. Fields other
/// controllers write (annotations, scale subresource actors touching
/// untracked fields) are never included, so they are never clobbered.
fn deployment_patch(
    desired: &Deployment,
    observed: &Deployment,
) -> Result<Option<serde_json::Value>, ClusterError> {
    let desired_spec = desired.spec.as_ref();
    let observed_spec = observed.spec.as_ref();

    let mut spec_patch = serde_json::Map::new();

    let desired_replicas = desired_spec.and_then(|s| s.replicas);
    let observed_replicas = observed_spec.and_then(|s| s.replicas);
    if desired_replicas != observed_replicas {
        spec_patch.insert("replicas".to_string(), json!(desired_replicas));
    }

    let desired_selector = desired_spec.map(|s| &s.selector);
    let observed_selector = observed_spec.map(|s| &s.selector);
    if desired_selector != observed_selector {
        spec_patch.insert("selector".to_string(), serde_json::to_value(desired_selector)?);
    }

    if let (Some(d), Some(o)) = (desired_spec, observed_spec) {
        if pod_template_drifted(d, o) {
            // Containers are a list: merge patch replaces them wholesale,
            // so the whole template goes in once any tracked field drifts.
            spec_patch.insert("template".to_string(), serde_json::to_value(&d.template)?);
        }
    }

    if spec_patch.is_empty() {
        Ok(None)
    } else {
        Ok(Some(json!({ "spec": spec_patch })))
    }
}

fn pod_template_drifted(desired: &k8s_openapi::api::apps::v1::DeploymentSpec, observed: &k8s_openapi::api::apps::v1::DeploymentSpec) -> bool {
    let desired_labels = desired.template.metadata.as_ref().and_then(|m| m.labels.as_ref());
    let observed_labels = observed.template.metadata.as_ref().and_then(|m| m.labels.as_ref());
    if !labels_covered(desired_labels, observed_labels) {
        return true;
    }

    let desired_containers = desired.template.spec.as_ref().map(|s| s.containers.as_slice());
    let observed_containers = observed.template.spec.as_ref().map(|s| s.containers.as_slice());
    let (Some(desired_containers), Some(observed_containers)) =
        (desired_containers, observed_containers)
    else {
        return true;
    };

    for want in desired_containers {
        let Some(have) = observed_containers.iter().find(|c| c.name == want.name) else {
            return true;
        };
        if want.image != have.image || want.env != have.env || want.resources != have.resources {
            return true;
        }
    }
    false
}

/// Every desired label present with the same value; extra observed labels
/// (added by admission webhooks or other controllers) are not drift.
fn labels_covered(
    desired: Option<&BTreeMap<String, String>>,
    observed: Option<&BTreeMap<String, String>>,
) -> bool {
    match desired {
        None => true,
        Some(desired) => {
            let Some(observed) = observed else {
                return desired.is_empty();
            };
            desired
                .iter()
                .all(|(k, v)| observed.get(k).is_some_and(|have| have == v))
        }
    }
}

/// Minimal merge patch for a drifted Service, `None` when converged.
fn service_patch(
    desired: &Service,
    observed: &Service,
) -> Result<Option<serde_json::Value>, ClusterError> {
    let desired_spec = desired.spec.as_ref();
    let observed_spec = observed.spec.as_ref();

    let mut spec_patch = serde_json::Map::new();

    let desired_selector = desired_spec.and_then(|s| s.selector.as_ref());
    let observed_selector = observed_spec.and_then(|s| s.selector.as_ref());
    if desired_selector != observed_selector {
        spec_patch.insert("selector".to_string(), serde_json::to_value(desired_selector)?);
    }

    let desired_ports = desired_spec.and_then(|s| s.ports.as_ref());
    let observed_ports = observed_spec.and_then(|s| s.ports.as_ref());
    if !ports_covered(desired_ports, observed_ports) {
        spec_patch.insert("ports".to_string(), serde_json::to_value(desired_ports)?);
    }

    if spec_patch.is_empty() {
        Ok(None)
    } else {
        Ok(Some(json!({ "spec": spec_patch })))
    }
}

/// Port comparison over the fields the builder sets; the apiserver fills in
/// nodePort and defaulted protocol on observed objects.
fn ports_covered(
    desired: Option<&Vec<k8s_openapi::api::core::v1::ServicePort>>,
    observed: Option<&Vec<k8s_openapi::api::core::v1::ServicePort>>,
) -> bool {
    let desired = desired.map(Vec::as_slice).unwrap_or_default();
    let observed = observed.map(Vec::as_slice).unwrap_or_default();
    if desired.len() != observed.len() {
        return false;
    }
    desired.iter().zip(observed).all(|(want, have)| {
        want.name == have.name
            && want.port == have.port
            && want.protocol == have.protocol
            && want.target_port == have.target_port
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{ParentRef, build_children};
    use crate::test_utils::create_test_spec;

    fn primary_deployment(parent: &ParentRef, spec: &crds::MyAppResourceSpec) -> Deployment {
        build_children(parent, spec)
            .into_iter()
            .filter(|c| c.role == ChildRole::PrimaryDeployment)
            .find_map(|c| match c.resource {
                DesiredResource::Deployment(d) => Some(d),
                DesiredResource::Service(_) => None,
            })
            .expect("builder always emits the primary deployment")
    }

    #[test]
    fn test_identical_deployments_produce_no_patch() {
        let parent = ParentRef::new("default", "myapp", Some("uid-1".to_string()));
        let spec = create_test_spec(2, true);
        let desired = primary_deployment(&parent, &spec);
        let observed = desired.clone();

        let patch = deployment_patch(&desired, &observed).expect("diff never fails here");
        assert_eq!(patch, None);
    }

    #[test]
    fn test_replica_drift_patches_replicas_only() {
        let parent = ParentRef::new("default", "myapp", Some("uid-1".to_string()));
        let spec = create_test_spec(2, true);
        let desired = primary_deployment(&parent, &spec);
        let mut observed = desired.clone();
        if let Some(s) = observed.spec.as_mut() {
            s.replicas = Some(5);
        }

        let patch = deployment_patch(&desired, &observed)
            .expect("diff never fails here")
            .expect("replica drift must produce a patch");
        assert_eq!(patch, json!({"spec": {"replicas": 2}}));
    }

    #[test]
    fn test_env_drift_patches_template() {
        let parent = ParentRef::new("default", "myapp", Some("uid-1".to_string()));
        let mut changed = create_test_spec(2, true);
        changed.ui = Some(crds::UiSpec {
            color: Some("#ff0000".to_string()),
            message: None,
        });
        let desired = primary_deployment(&parent, &changed);
        let observed = primary_deployment(&parent, &create_test_spec(2, true));

        let patch = deployment_patch(&desired, &observed)
            .expect("diff never fails here")
            .expect("env drift must produce a patch");
        let spec_patch = patch["spec"].as_object().expect("spec patch object");
        assert!(spec_patch.contains_key("template"));
        assert!(!spec_patch.contains_key("replicas"), "replicas did not drift");
    }

    #[test]
    fn test_extra_observed_labels_are_not_drift() {
        let parent = ParentRef::new("default", "myapp", Some("uid-1".to_string()));
        let spec = create_test_spec(2, true);
        let desired = primary_deployment(&parent, &spec);
        let mut observed = desired.clone();
        if let Some(meta) = observed
            .spec
            .as_mut()
            .and_then(|s| s.template.metadata.as_mut())
        {
            meta.labels
                .get_or_insert_with(Default::default)
                .insert("injected-by-webhook".to_string(), "true".to_string());
        }

        let patch = deployment_patch(&desired, &observed).expect("diff never fails here");
        assert_eq!(patch, None);
    }

    #[test]
    fn test_service_node_port_is_not_drift() {
        let parent = ParentRef::new("default", "myapp", Some("uid-1".to_string()));
        let spec = create_test_spec(1, false);
        let desired = build_children(&parent, &spec)
            .into_iter()
            .find_map(|c| match c.resource {
                DesiredResource::Service(s) => Some(s),
                DesiredResource::Deployment(_) => None,
            })
            .expect("builder always emits the primary service");
        let mut observed = desired.clone();
        if let Some(ports) = observed.spec.as_mut().and_then(|s| s.ports.as_mut()) {
            for p in ports {
                p.node_port = Some(30123);
            }
        }

        let patch = service_patch(&desired, &observed).expect("diff never fails here");
        assert_eq!(patch, None);
    }
}
