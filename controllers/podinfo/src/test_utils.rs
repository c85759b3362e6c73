//! Test utilities for unit testing the reconciliation pipeline
//!
//! This module provides helpers for creating test data and setting up
//! test scenarios.

#[cfg(test)]
use crate::builder::ParentRef;
#[cfg(test)]
use crds::{CacheSpec, ImageSpec, MyAppResourceSpec, ResourcesSpec, UiSpec};

/// Helper to create a valid test spec
#[cfg(test)]
pub fn create_test_spec(replica_count: i32, cache_enabled: bool) -> MyAppResourceSpec {
    MyAppResourceSpec {
        replica_count,
        image: ImageSpec {
            repository: "ghcr.io/stefanprodan/podinfo".to_string(),
            tag: "latest".to_string(),
        },
        resources: ResourcesSpec {
            memory_limit: "64Mi".to_string(),
            cpu_request: "100m".to_string(),
        },
        ui: Some(UiSpec {
            color: Some("#34577c".to_string()),
            message: Some("some string".to_string()),
        }),
        redis: Some(CacheSpec {
            enabled: cache_enabled,
        }),
    }
}

/// Helper to create the ParentRef a test CR maps to
#[cfg(test)]
pub fn create_test_parent(name: &str, namespace: &str) -> ParentRef {
    ParentRef::new(namespace, name, Some(format!("uid-{name}")))
}
