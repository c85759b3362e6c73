//! Prints the MyAppResource CRD manifest as YAML.
//!
//! Usage: `cargo run --bin crdgen > deploy/crds/myappresource.yaml`

use kube::CustomResourceExt;

fn main() -> Result<(), serde_yaml::Error> {
    print!("{}", serde_yaml::to_string(&crds::MyAppResource::crd())?);
    Ok(())
}
