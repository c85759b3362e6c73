//! MyAppResource CRD
//!
//! Declares a podinfo application: a primary web component plus an
//! optional redis cache component. The controller converges this spec
//! into child Deployments and Services.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "my.api.group",
    version = "v1alpha1",
    kind = "MyAppResource",
    namespaced,
    status = "MyAppResourceStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct MyAppResourceSpec {
    /// Desired number of primary replicas
    pub replica_count: i32,

    /// Primary container image
    pub image: ImageSpec,

    /// Resource requests/limits for the primary container
    pub resources: ResourcesSpec,

    /// UI parameters, rendered into environment variables
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui: Option<UiSpec>,

    /// Cache component toggle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis: Option<CacheSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageSpec {
    /// Container image repository
    pub repository: String,

    /// Container image tag
    pub tag: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourcesSpec {
    /// Memory limit for the primary container (e.g. "64Mi")
    pub memory_limit: String,

    /// CPU request for the primary container (e.g. "100m")
    pub cpu_request: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UiSpec {
    /// UI background color
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    /// UI greeting message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct CacheSpec {
    /// Whether the redis cache component should exist
    #[serde(default)]
    pub enabled: bool,
}

impl MyAppResourceSpec {
    /// Whether the cache component is requested.
    #[must_use]
    pub fn cache_enabled(&self) -> bool {
        self.redis.as_ref().is_some_and(|r| r.enabled)
    }

    /// Semantic validation beyond what the CRD schema enforces.
    ///
    /// The schema already rejects structurally malformed documents; this
    /// catches values that are well-formed but unusable (negative replica
    /// counts, blank image or resource fields).
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.replica_count < 0 {
            return Err(ValidationError::NegativeReplicaCount(self.replica_count));
        }
        if self.image.repository.trim().is_empty() {
            return Err(ValidationError::MissingImageField("repository"));
        }
        if self.image.tag.trim().is_empty() {
            return Err(ValidationError::MissingImageField("tag"));
        }
        if self.resources.memory_limit.trim().is_empty() {
            return Err(ValidationError::MissingResourceField("memoryLimit"));
        }
        if self.resources.cpu_request.trim().is_empty() {
            return Err(ValidationError::MissingResourceField("cpuRequest"));
        }
        Ok(())
    }
}

/// Rejection reasons for a desired-state document.
///
/// Validation failures are permanent: the controller surfaces them in the
/// parent status and does not retry until the spec changes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Replica count below zero
    #[error("spec.replicaCount must be >= 0, got {0}")]
    NegativeReplicaCount(i32),

    /// Required image field blank or absent
    #[error("spec.image.{0} must not be empty")]
    MissingImageField(&'static str),

    /// Required resource field blank or absent
    #[error("spec.resources.{0} must not be empty")]
    MissingResourceField(&'static str),

    /// Enabled cache spec violates a cache constraint
    #[error("spec.redis: {0}")]
    Cache(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct MyAppResourceStatus {
    /// Per-child observed state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub child_statuses: Vec<ChildStatus>,

    /// Short human-readable summary of the last reconciliation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Parent generation the controller last converged
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reconciled_generation: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChildStatus {
    /// Logical role of the child
    pub role: ChildRole,

    /// Child object name in the parent's namespace
    pub name: String,

    /// Ready pod count, when observable (Deployments only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready: Option<i32>,

    /// Desired replica count, when applicable (Deployments only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_replicas: Option<i32>,
}

/// Logical role of a child resource relative to its parent.
///
/// Serializes as kebab-case ("primary-deployment", "cache-service", etc.)
/// to match the CRD validation schema.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ChildRole {
    /// Deployment running the primary podinfo component
    PrimaryDeployment,

    /// Service exposing the primary podinfo component
    PrimaryService,

    /// Deployment running the redis cache component
    CacheDeployment,

    /// Service exposing the redis cache component
    CacheService,
}

impl ChildRole {
    /// Wire-format name of the role.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ChildRole::PrimaryDeployment => "primary-deployment",
            ChildRole::PrimaryService => "primary-service",
            ChildRole::CacheDeployment => "cache-deployment",
            ChildRole::CacheService => "cache-service",
        }
    }

    /// Whether the role denotes a Deployment.
    #[must_use]
    pub fn is_deployment(self) -> bool {
        matches!(self, ChildRole::PrimaryDeployment | ChildRole::CacheDeployment)
    }
}

impl std::fmt::Display for ChildRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_spec() -> MyAppResourceSpec {
        MyAppResourceSpec {
            replica_count: 2,
            image: ImageSpec {
                repository: "ghcr.io/stefanprodan/podinfo".to_string(),
                tag: "latest".to_string(),
            },
            resources: ResourcesSpec {
                memory_limit: "64Mi".to_string(),
                cpu_request: "100m".to_string(),
            },
            ui: None,
            redis: None,
        }
    }

    #[test]
    fn test_valid_spec_passes_validation() {
        assert_eq!(valid_spec().validate(), Ok(()));
    }

    #[test]
    fn test_negative_replica_count_rejected() {
        let mut spec = valid_spec();
        spec.replica_count = -1;
        assert_eq!(spec.validate(), Err(ValidationError::NegativeReplicaCount(-1)));
    }

    #[test]
    fn test_blank_image_fields_rejected() {
        let mut spec = valid_spec();
        spec.image.repository = String::new();
        assert_eq!(spec.validate(), Err(ValidationError::MissingImageField("repository")));

        let mut spec = valid_spec();
        spec.image.tag = "  ".to_string();
        assert_eq!(spec.validate(), Err(ValidationError::MissingImageField("tag")));
    }

    #[test]
    fn test_blank_resource_fields_rejected() {
        let mut spec = valid_spec();
        spec.resources.cpu_request = String::new();
        assert_eq!(spec.validate(), Err(ValidationError::MissingResourceField("cpuRequest")));
    }

    #[test]
    fn test_spec_parses_camel_case_document() {
        let doc = serde_json::json!({
            "replicaCount": 2,
            "image": {"repository": "ghcr.io/stefanprodan/podinfo", "tag": "latest"},
            "resources": {"memoryLimit": "64Mi", "cpuRequest": "100m"},
            "ui": {"color": "#34577c", "message": "some string"},
            "redis": {"enabled": true}
        });
        let spec: MyAppResourceSpec =
            serde_json::from_value(doc).expect("camelCase document should parse");
        assert_eq!(spec.replica_count, 2);
        assert_eq!(spec.ui.as_ref().and_then(|u| u.color.as_deref()), Some("#34577c"));
        assert!(spec.cache_enabled());
        assert_eq!(spec.validate(), Ok(()));
    }

    #[test]
    fn test_cache_disabled_when_block_absent_or_false() {
        let spec = valid_spec();
        assert!(!spec.cache_enabled());

        let mut spec = valid_spec();
        spec.redis = Some(CacheSpec { enabled: false });
        assert!(!spec.cache_enabled());
    }

    #[test]
    fn test_child_role_serializes_kebab_case() {
        let role = serde_json::to_value(ChildRole::PrimaryDeployment).expect("serialize role");
        assert_eq!(role, serde_json::json!("primary-deployment"));
        assert_eq!(ChildRole::CacheService.as_str(), "cache-service");
    }

    #[test]
    fn test_status_serializes_camel_case() {
        let status = MyAppResourceStatus {
            child_statuses: vec![ChildStatus {
                role: ChildRole::PrimaryDeployment,
                name: "myapp-podinfo".to_string(),
                ready: Some(2),
                desired_replicas: Some(2),
            }],
            message: Some("all 2 children converged".to_string()),
            last_reconciled_generation: Some(1),
        };
        let value = serde_json::to_value(&status).expect("serialize status");
        assert_eq!(value["childStatuses"][0]["role"], "primary-deployment");
        assert_eq!(value["childStatuses"][0]["desiredReplicas"], 2);
        assert_eq!(value["lastReconciledGeneration"], 1);
    }
}
