//! podinfo-operator CRD definitions
//!
//! Kubernetes Custom Resource Definitions for the podinfo operator.

pub mod my_app;

pub use my_app::*;
