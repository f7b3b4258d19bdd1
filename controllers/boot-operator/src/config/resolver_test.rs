//! Unit tests for configuration resolution

#[cfg(test)]
mod tests {
    use crate::config::{ConfigError, ConfigHandle, ResolvedContext};
    use crate::keys::ANNOTATION_PROFILE;
    use crds::{Boot, BootKind, BootSpec, EnvVar};

    const LAYERED: &str = r#"
java:
  settings:
    registry: hub.local
  oEnvs:
    app:
      test:
        port: 8082
        replicas: 2
        health: /health2
        subDomain: 2exp.logan.local
        env:
          - name: SPRING_ZIPKIN_ENABLED2
            value: "true"
        nodeSelector:
          logan/env: test
        resources:
          limits: {cpu: 2, memory: 2Gi}
          requests: {cpu: 500m, memory: 1Gi}
        settings:
          registry: test.hub.local
    agent:
      test:
        env:
          - name: AGENT_ENV
            value: "${ENV}"
  app:
    env:
      - name: APP_NAME
        value: "${APP}"
    podSpec:
      initContainers:
        - name: init
          image: "${REGISTRY}/init:1"
  sideCarContainers:
    - name: agent
      image: "${REGISTRY}/agent:1.0"
      env:
        - name: AGENT_MODE
          value: sidecar
  sidecarServices:
    - name: agent
      port: 9100
php:
  app:
    port: 9000
big-memory:
  app:
    replicas: 4
    resources:
      limits: {memory: 8Gi}
"#;

    fn boot_with_profile(profile: Option<&str>) -> Boot {
        let mut boot = Boot::new(BootKind::Java, "orders", "shop", BootSpec::default());
        if let Some(p) = profile {
            boot.annotations_mut()
                .insert(ANNOTATION_PROFILE.to_string(), p.to_string());
        }
        boot
    }

    #[test]
    fn test_empty_config_is_valid() {
        for content in ["", "   \n", "---\n"] {
            let ctx = ResolvedContext::from_document(content, "test").unwrap();
            for kind in BootKind::ALL {
                let cfg = ctx.kind_config(kind);
                assert_eq!(cfg.app.port, 8080);
                assert_eq!(cfg.app.replicas, 1);
                assert_eq!(cfg.app.health, "/health");
                assert!(cfg.sidecar_containers.is_empty());
            }
            assert_eq!(ctx.profiles().count(), 0);
        }
    }

    #[test]
    fn test_environment_override_applies_to_matching_env_only() {
        let ctx = ResolvedContext::from_document(LAYERED, "test").unwrap();
        let java = ctx.kind_config(BootKind::Java);
        assert_eq!(java.app.port, 8082);
        assert_eq!(java.app.replicas, 2);
        assert_eq!(java.app.health, "/health2");
        assert_eq!(java.app.sub_domain, "2exp.logan.local");
        assert_eq!(java.app.node_selector.get("logan/env").map(String::as_str), Some("test"));
        assert_eq!(java.app.resources.limits.get("cpu").map(String::as_str), Some("2"));
        assert_eq!(
            java.app.env,
            vec![
                EnvVar::new("APP_NAME", "${APP}"),
                EnvVar::new("SPRING_ZIPKIN_ENABLED2", "true"),
            ]
        );

        let prod = ResolvedContext::from_document(LAYERED, "prod").unwrap();
        let java = prod.kind_config(BootKind::Java);
        assert_eq!(java.app.port, 8080);
        assert_eq!(java.app.replicas, 1);
        assert_eq!(java.app.env, vec![EnvVar::new("APP_NAME", "${APP}")]);
    }

    #[test]
    fn test_registry_precedence_and_image_macros() {
        let test = ResolvedContext::from_document(LAYERED, "test").unwrap();
        let java = test.kind_config(BootKind::Java);
        assert_eq!(java.app.settings().registry, "test.hub.local");
        assert_eq!(
            java.sidecar_containers[0].image.as_deref(),
            Some("test.hub.local/agent:1.0")
        );
        let init_image = java.app.pod_spec.as_ref().unwrap()["initContainers"][0]["image"].clone();
        assert_eq!(init_image, "test.hub.local/init:1");

        let prod = ResolvedContext::from_document(LAYERED, "prod").unwrap();
        assert_eq!(prod.kind_config(BootKind::Java).app.settings().registry, "hub.local");
    }

    #[test]
    fn test_sidecar_env_is_override_merged() {
        let ctx = ResolvedContext::from_document(LAYERED, "test").unwrap();
        let java = ctx.kind_config(BootKind::Java);
        let env = java.sidecar_containers[0].env.clone().unwrap_or_default();
        let names: Vec<_> = env.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["AGENT_MODE", "AGENT_ENV"]);
        assert_eq!(java.sidecar_services[0].port, 9100);
    }

    #[test]
    fn test_kind_without_entry_gets_defaults() {
        let ctx = ResolvedContext::from_document(LAYERED, "test").unwrap();
        assert_eq!(ctx.kind_config(BootKind::Php).app.port, 9000);
        assert_eq!(ctx.kind_config(BootKind::Web).app.port, 8080);
    }

    #[test]
    fn test_scalar_defaults_keep_configured_values() {
        let doc = "java:\n  app:\n    port: -1\n    health: /ping\n    replicas: 3\n";
        let ctx = ResolvedContext::from_document(doc, "test").unwrap();
        let java = ctx.kind_config(BootKind::Java);
        assert_eq!(java.app.port, 8080);
        assert_eq!(java.app.health, "/ping");
        assert_eq!(java.app.replicas, 3);
    }

    #[test]
    fn test_profile_selection() {
        let ctx = ResolvedContext::from_document(LAYERED, "test").unwrap();
        assert_eq!(ctx.profiles().collect::<Vec<_>>(), vec!["big-memory"]);

        let boot = boot_with_profile(Some("big-memory"));
        let cfg = ctx.profile_config(&boot).unwrap().unwrap();
        assert_eq!(cfg.app.replicas, 4);
        assert_eq!(cfg.app.port, 8080);
        assert_eq!(ctx.boot_config(&boot).app.replicas, 4);

        assert!(ctx.profile_config(&boot_with_profile(None)).unwrap().is_none());
    }

    #[test]
    fn test_profile_errors_fall_back_to_kind_config() {
        let ctx = ResolvedContext::from_document(LAYERED, "test").unwrap();

        let builtin = boot_with_profile(Some("php"));
        let err = ctx.profile_config(&builtin).unwrap_err();
        assert!(matches!(err, ConfigError::ProfileNotAllowed(_)));
        assert_eq!(err.to_string(), "Boot using profile, but profile [php] is not allow.");

        let missing = boot_with_profile(Some("nope"));
        assert!(matches!(
            ctx.profile_config(&missing),
            Err(ConfigError::ProfileMissing(_))
        ));

        assert_eq!(ctx.boot_config(&missing).app.port, 8082);
    }

    #[test]
    fn test_parse_error() {
        let result = ResolvedContext::from_document("java: [not, a, map]", "test");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_reload_swaps_and_keeps_previous_on_error() {
        let handle = ConfigHandle::new(ResolvedContext::empty("test"));
        let before = handle.current();
        assert_eq!(before.kind_config(BootKind::Php).app.port, 8080);

        handle.reload(LAYERED).unwrap();
        let after = handle.current();
        assert_eq!(after.kind_config(BootKind::Php).app.port, 9000);
        // snapshots taken earlier are unaffected
        assert_eq!(before.kind_config(BootKind::Php).app.port, 8080);

        assert!(handle.reload("php: {app: {port: nope}}").is_err());
        assert_eq!(handle.current().kind_config(BootKind::Php).app.port, 9000);
        assert_eq!(handle.current().env(), "test");
    }
}
