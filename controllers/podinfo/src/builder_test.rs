//! Unit tests for the child resource builder

#[cfg(test)]
mod tests {
    use crate::builder::{
        DesiredResource, PODINFO_PORT, REDIS_PORT, build_children, child_name,
    };
    use crate::test_utils::{create_test_parent, create_test_spec};
    use crds::ChildRole;

    #[test]
    fn test_build_is_deterministic() {
        let parent = create_test_parent("myapp", "default");
        let spec = create_test_spec(2, true);

        let first: Vec<serde_json::Value> = build_children(&parent, &spec)
            .iter()
            .map(|c| match &c.resource {
                DesiredResource::Deployment(d) => serde_json::to_value(d).expect("serialize"),
                DesiredResource::Service(s) => serde_json::to_value(s).expect("serialize"),
            })
            .collect();
        let second: Vec<serde_json::Value> = build_children(&parent, &spec)
            .iter()
            .map(|c| match &c.resource {
                DesiredResource::Deployment(d) => serde_json::to_value(d).expect("serialize"),
                DesiredResource::Service(s) => serde_json::to_value(s).expect("serialize"),
            })
            .collect();

        assert_eq!(first, second);
    }

    #[test]
    fn test_cache_enabled_yields_four_children_in_order() {
        let parent = create_test_parent("myapp", "default");
        let children = build_children(&parent, &create_test_spec(2, true));

        let roles: Vec<ChildRole> = children.iter().map(|c| c.role).collect();
        assert_eq!(
            roles,
            vec![
                ChildRole::PrimaryDeployment,
                ChildRole::PrimaryService,
                ChildRole::CacheDeployment,
                ChildRole::CacheService,
            ]
        );
    }

    #[test]
    fn test_cache_disabled_yields_primary_pair_only() {
        let parent = create_test_parent("myapp", "default");
        let children = build_children(&parent, &create_test_spec(2, false));

        let roles: Vec<ChildRole> = children.iter().map(|c| c.role).collect();
        assert_eq!(roles, vec![ChildRole::PrimaryDeployment, ChildRole::PrimaryService]);
    }

    #[test]
    fn test_child_names_derive_from_parent_and_role() {
        assert_eq!(child_name("myapp", ChildRole::PrimaryDeployment), "myapp-podinfo");
        assert_eq!(child_name("myapp", ChildRole::PrimaryService), "myapp-podinfo");
        assert_eq!(child_name("myapp", ChildRole::CacheDeployment), "myapp-redis");
        assert_eq!(child_name("other", ChildRole::CacheService), "other-redis");
    }

    #[test]
    fn test_primary_deployment_reflects_spec() {
        let parent = create_test_parent("myapp", "default");
        let spec = create_test_spec(2, true);
        let children = build_children(&parent, &spec);

        let DesiredResource::Deployment(dep) = &children[0].resource else {
            panic!("first child must be the primary deployment");
        };
        let dep_spec = dep.spec.as_ref().expect("deployment spec");
        assert_eq!(dep_spec.replicas, Some(2));

        let container = &dep_spec.template.spec.as_ref().expect("pod spec").containers[0];
        assert_eq!(container.name, "podinfo");
        assert_eq!(container.image.as_deref(), Some("ghcr.io/stefanprodan/podinfo:latest"));
        assert_eq!(
            container.ports.as_ref().expect("ports")[0].container_port,
            PODINFO_PORT
        );

        let resources = container.resources.as_ref().expect("resources");
        let requests = resources.requests.as_ref().expect("requests");
        let limits = resources.limits.as_ref().expect("limits");
        assert_eq!(requests["cpu"].0, "100m");
        assert_eq!(limits["memory"].0, "64Mi");
    }

    #[test]
    fn test_primary_env_derives_from_ui_block() {
        let parent = create_test_parent("myapp", "default");
        let children = build_children(&parent, &create_test_spec(2, true));

        let DesiredResource::Deployment(dep) = &children[0].resource else {
            panic!("first child must be the primary deployment");
        };
        let env = dep.spec.as_ref().expect("deployment spec").template.spec.as_ref()
            .expect("pod spec").containers[0]
            .env
            .as_ref()
            .expect("primary env");

        let lookup = |name: &str| {
            env.iter()
                .find(|v| v.name == name)
                .and_then(|v| v.value.as_deref())
        };
        assert_eq!(lookup("PODINFO_UI_COLOR"), Some("#34577c"));
        assert_eq!(lookup("PODINFO_UI_MESSAGE"), Some("some string"));
        assert_eq!(
            lookup("PODINFO_CACHE_SERVER"),
            Some(&*format!("tcp://myapp-redis:{REDIS_PORT}"))
        );
    }

    #[test]
    fn test_cache_deployment_uses_fixed_defaults() {
        let parent = create_test_parent("myapp", "default");
        let children = build_children(&parent, &create_test_spec(2, true));

        let DesiredResource::Deployment(dep) = &children[2].resource else {
            panic!("third child must be the cache deployment");
        };
        let dep_spec = dep.spec.as_ref().expect("deployment spec");
        assert_eq!(dep_spec.replicas, Some(1));

        let container = &dep_spec.template.spec.as_ref().expect("pod spec").containers[0];
        assert_eq!(container.image.as_deref(), Some("redis:7.0.12"));
        assert_eq!(
            container.ports.as_ref().expect("ports")[0].container_port,
            REDIS_PORT
        );
        let resources = container.resources.as_ref().expect("resources");
        assert_eq!(resources.requests.as_ref().expect("requests")["memory"].0, "32Mi");
        assert_eq!(resources.limits.as_ref().expect("limits")["cpu"].0, "1000m");
    }

    #[test]
    fn test_every_child_carries_owner_reference() {
        let parent = create_test_parent("myapp", "default");
        let children = build_children(&parent, &create_test_spec(2, true));
        assert_eq!(children.len(), 4);

        for child in &children {
            let metadata = match &child.resource {
                DesiredResource::Deployment(d) => &d.metadata,
                DesiredResource::Service(s) => &s.metadata,
            };
            let refs = metadata
                .owner_references
                .as_ref()
                .unwrap_or_else(|| panic!("{} missing owner references", child.name));
            assert_eq!(refs.len(), 1);
            assert_eq!(refs[0].kind, "MyAppResource");
            assert_eq!(refs[0].name, "myapp");
            assert_eq!(refs[0].uid, "uid-myapp");
            assert_eq!(refs[0].controller, Some(true));
        }
    }

    #[test]
    fn test_service_selector_matches_deployment_labels() {
        let parent = create_test_parent("myapp", "default");
        let children = build_children(&parent, &create_test_spec(2, true));

        let DesiredResource::Deployment(dep) = &children[0].resource else {
            panic!("first child must be the primary deployment");
        };
        let DesiredResource::Service(svc) = &children[1].resource else {
            panic!("second child must be the primary service");
        };

        let pod_labels = dep.spec.as_ref().expect("deployment spec").template.metadata.as_ref()
            .expect("template metadata")
            .labels
            .as_ref()
            .expect("template labels");
        let selector = svc.spec.as_ref().expect("service spec").selector.as_ref()
            .expect("service selector");
        assert_eq!(selector, pod_labels);
        assert_eq!(selector["app.kubernetes.io/instance"], "myapp");
    }
}
