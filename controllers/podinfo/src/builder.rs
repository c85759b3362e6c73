//! Child resource builder
//!
//! Pure translation from a validated `MyAppResourceSpec` to the desired
//! child Deployments and Services. No cluster access happens here; the
//! convergence engine compares and applies whatever this module produces.
//!
//! The builder is deterministic: identical inputs yield byte-identical
//! descriptors, which is what makes the convergence diff meaningful.

use crds::{ChildRole, MyAppResourceSpec};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, PodSpec, PodTemplateSpec, ResourceRequirements, Service,
    ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;

/// Port served by the podinfo container
pub const PODINFO_PORT: i32 = 9898;
/// Port served by the redis container
pub const REDIS_PORT: i32 = 6379;

const REDIS_IMAGE: &str = "redis:7.0.12";
const MANAGED_BY: &str = "podinfo-operator";
const PARENT_API_VERSION: &str = "my.api.group/v1alpha1";
const PARENT_KIND: &str = "MyAppResource";

/// Identity of the parent a child set belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentRef {
    /// Namespace the parent (and all children) live in
    pub namespace: String,
    /// Parent object name
    pub name: String,
    /// Parent UID, when known; owner references require it
    pub uid: Option<String>,
}

impl ParentRef {
    /// Convenience constructor.
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        uid: Option<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            uid,
        }
    }

    /// `namespace/name` key used for logs and per-identity bookkeeping.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// A desired child and the role it fills for its parent.
#[derive(Debug, Clone)]
pub struct DesiredChild {
    /// Logical role
    pub role: ChildRole,
    /// Deterministic object name
    pub name: String,
    /// Fully-specified desired object
    pub resource: DesiredResource,
}

/// Typed desired child object.
#[derive(Debug, Clone)]
pub enum DesiredResource {
    /// A child Deployment
    Deployment(Deployment),
    /// A child Service
    Service(Service),
}

/// Deterministic child name for a parent + role.
///
/// The Deployment and Service of a component share the name, so a role's
/// object can always be located by name alone, without a label search.
#[must_use]
pub fn child_name(parent_name: &str, role: ChildRole) -> String {
    format!("{}-{}", parent_name, component(role))
}

fn component(role: ChildRole) -> &'static str {
    match role {
        ChildRole::PrimaryDeployment | ChildRole::PrimaryService => "podinfo",
        ChildRole::CacheDeployment | ChildRole::CacheService => "redis",
    }
}

/// All roles the builder can emit, cache roles last.
pub const ALL_ROLES: [ChildRole; 4] = [
    ChildRole::PrimaryDeployment,
    ChildRole::PrimaryService,
    ChildRole::CacheDeployment,
    ChildRole::CacheService,
];

/// Build the desired child set for a parent spec.
///
/// Always the primary Deployment+Service pair; the cache pair iff
/// `redis.enabled`. Deployments precede Services per component so a
/// Service's selector labels exist by the time it is first created.
#[must_use]
pub fn build_children(parent: &ParentRef, spec: &MyAppResourceSpec) -> Vec<DesiredChild> {
    let mut children = vec![
        DesiredChild {
            role: ChildRole::PrimaryDeployment,
            name: child_name(&parent.name, ChildRole::PrimaryDeployment),
            resource: DesiredResource::Deployment(primary_deployment(parent, spec)),
        },
        DesiredChild {
            role: ChildRole::PrimaryService,
            name: child_name(&parent.name, ChildRole::PrimaryService),
            resource: DesiredResource::Service(service_for(
                parent,
                ChildRole::PrimaryService,
                PODINFO_PORT,
            )),
        },
    ];

    if spec.cache_enabled() {
        children.push(DesiredChild {
            role: ChildRole::CacheDeployment,
            name: child_name(&parent.name, ChildRole::CacheDeployment),
            resource: DesiredResource::Deployment(cache_deployment(parent)),
        });
        children.push(DesiredChild {
            role: ChildRole::CacheService,
            name: child_name(&parent.name, ChildRole::CacheService),
            resource: DesiredResource::Service(service_for(
                parent,
                ChildRole::CacheService,
                REDIS_PORT,
            )),
        });
    }

    children
}

/// Selector labels for a child: they encode the parent identity and the
/// component, so the same labels always address the same child set.
fn selector_labels(parent: &ParentRef, role: ChildRole) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(
        "app.kubernetes.io/name".to_string(),
        child_name(&parent.name, role),
    );
    labels.insert("app.kubernetes.io/instance".to_string(), parent.name.clone());
    labels.insert(
        "app.kubernetes.io/component".to_string(),
        component(role).to_string(),
    );
    labels
}

fn metadata_labels(parent: &ParentRef, role: ChildRole) -> BTreeMap<String, String> {
    let mut labels = selector_labels(parent, role);
    labels.insert("app.kubernetes.io/managed-by".to_string(), MANAGED_BY.to_string());
    labels
}

fn owner_refs(parent: &ParentRef) -> Option<Vec<OwnerReference>> {
    parent.uid.as_ref().map(|uid| {
        vec![OwnerReference {
            api_version: PARENT_API_VERSION.to_string(),
            kind: PARENT_KIND.to_string(),
            name: parent.name.clone(),
            uid: uid.clone(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }]
    })
}

fn child_metadata(parent: &ParentRef, role: ChildRole) -> ObjectMeta {
    ObjectMeta {
        name: Some(child_name(&parent.name, role)),
        namespace: Some(parent.namespace.clone()),
        labels: Some(metadata_labels(parent, role)),
        owner_references: owner_refs(parent),
        ..Default::default()
    }
}

/// Environment for the primary container: the cache server address plus
/// fixed-name variables derived from the UI block.
fn primary_env(parent: &ParentRef, spec: &MyAppResourceSpec) -> Vec<EnvVar> {
    let cache_host = child_name(&parent.name, ChildRole::CacheService);
    let mut env = vec![EnvVar {
        name: "PODINFO_CACHE_SERVER".to_string(),
        value: Some(format!("tcp://{cache_host}:{REDIS_PORT}")),
        ..Default::default()
    }];
    if let Some(ui) = &spec.ui {
        if let Some(color) = &ui.color {
            env.push(EnvVar {
                name: "PODINFO_UI_COLOR".to_string(),
                value: Some(color.clone()),
                ..Default::default()
            });
        }
        if let Some(message) = &ui.message {
            env.push(EnvVar {
                name: "PODINFO_UI_MESSAGE".to_string(),
                value: Some(message.clone()),
                ..Default::default()
            });
        }
    }
    env
}

fn primary_deployment(parent: &ParentRef, spec: &MyAppResourceSpec) -> Deployment {
    let resources = ResourceRequirements {
        requests: Some(BTreeMap::from([(
            "cpu".to_string(),
            Quantity(spec.resources.cpu_request.clone()),
        )])),
        limits: Some(BTreeMap::from([(
            "memory".to_string(),
            Quantity(spec.resources.memory_limit.clone()),
        )])),
        ..Default::default()
    };
    deployment_for(
        parent,
        ChildRole::PrimaryDeployment,
        format!("{}:{}", spec.image.repository, spec.image.tag),
        spec.replica_count,
        resources,
        primary_env(parent, spec),
        PODINFO_PORT,
    )
}

fn cache_deployment(parent: &ParentRef) -> Deployment {
    let resources = ResourceRequirements {
        requests: Some(BTreeMap::from([
            ("cpu".to_string(), Quantity("100m".to_string())),
            ("memory".to_string(), Quantity("32Mi".to_string())),
        ])),
        limits: Some(BTreeMap::from([
            ("cpu".to_string(), Quantity("1000m".to_string())),
            ("memory".to_string(), Quantity("128Mi".to_string())),
        ])),
        ..Default::default()
    };
    deployment_for(
        parent,
        ChildRole::CacheDeployment,
        REDIS_IMAGE.to_string(),
        1,
        resources,
        Vec::new(),
        REDIS_PORT,
    )
}

fn deployment_for(
    parent: &ParentRef,
    role: ChildRole,
    image: String,
    replicas: i32,
    resources: ResourceRequirements,
    env: Vec<EnvVar>,
    port: i32,
) -> Deployment {
    let labels = selector_labels(parent, role);
    let container = Container {
        name: component(role).to_string(),
        image: Some(image),
        ports: Some(vec![ContainerPort {
            container_port: port,
            ..Default::default()
        }]),
        env: if env.is_empty() { None } else { Some(env) },
        resources: Some(resources),
        ..Default::default()
    };

    Deployment {
        metadata: child_metadata(parent, role),
        spec: Some(DeploymentSpec {
            replicas: Some(replicas),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn service_for(parent: &ParentRef, role: ChildRole, port: i32) -> Service {
    Service {
        metadata: child_metadata(parent, role),
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(selector_labels(parent, role)),
            ports: Some(vec![ServicePort {
                name: Some(component(role).to_string()),
                protocol: Some("TCP".to_string()),
                port,
                target_port: Some(IntOrString::Int(port)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
