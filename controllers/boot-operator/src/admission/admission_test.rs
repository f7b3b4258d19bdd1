//! Unit tests for the admission webhooks

#[cfg(test)]
mod tests {
    use crate::admission::boot_mutation::mutation_patch;
    use crate::admission::boot_validation::{
        EnvDifference, check_env_keys, check_pvcs, is_dns1123_label,
    };
    use crate::admission::{AdmissionRequest, AdmissionReview, AdmissionState, boot_mutation, config_validation, router};
    use crate::config::{ConfigHandle, ResolvedContext};
    use crate::keys::{ANNOTATION_BOOT_ENVS, ANNOTATION_LAST_UPDATE, LABEL_SHARED};
    use crate::test_utils::*;
    use crate::workload::pod_labels;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use boot_client::MockBootClient;
    use chrono::{TimeZone, Utc};
    use crds::{Boot, BootKind, EnvVar, PvcMount};
    use kube::core::admission::Operation;
    use serde_json::{Value, json};
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use tower::ServiceExt;

    const NS: &str = "shop";

    fn review_json(operation: &str, kind: &str, name: &str, namespace: &str, object: Option<Value>) -> Value {
        json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "req-1",
                "kind": {"group": "app.logancloud.com", "version": "v1", "kind": kind},
                "resource": {"group": "app.logancloud.com", "version": "v1", "resource": format!("{}s", kind.to_lowercase())},
                "name": name,
                "namespace": namespace,
                "operation": operation,
                "userInfo": {},
                "object": object,
                "oldObject": null,
                "dryRun": false
            }
        })
    }

    fn request(operation: &str, kind: &str, name: &str, namespace: &str, object: Option<Value>) -> AdmissionRequest {
        let review: AdmissionReview =
            serde_json::from_value(review_json(operation, kind, name, namespace, object)).unwrap();
        review.try_into().unwrap()
    }

    fn boot_request(operation: &str, boot: &Boot) -> AdmissionRequest {
        request(
            operation,
            boot.kind.api_kind(),
            boot.name(),
            boot.namespace(),
            Some(boot.to_object().unwrap()),
        )
    }

    fn state(client: &MockBootClient, env: &str) -> AdmissionState {
        let settings = test_settings(env);
        let context = ResolvedContext::from_document(TEST_CONFIG, &settings.env).unwrap();
        AdmissionState::new(Arc::new(client.clone()), ConfigHandle::new(context), Arc::new(settings))
    }

    fn context() -> ResolvedContext {
        ResolvedContext::from_document(TEST_CONFIG, "test").unwrap()
    }

    async fn post(state: AdmissionState, uri: &str, body: Vec<u8>) -> Value {
        let response = router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn message(review: &Value) -> &str {
        review["response"]["status"]["message"].as_str().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_create_with_name_taken_by_other_kind_is_denied() {
        let client = MockBootClient::new();
        client.add_boot(test_boot(BootKind::Php, "orders", NS));
        let boot = test_boot(BootKind::Java, "orders", NS);
        let body = review_json("CREATE", "JavaBoot", "orders", NS, Some(boot.to_object().unwrap()));

        let review = post(state(&client, "test"), "/validate-boot", serde_json::to_vec(&body).unwrap()).await;

        assert_eq!(review["response"]["uid"], "req-1");
        assert_eq!(review["response"]["allowed"], false);
        assert_eq!(message(&review), "Boot's name shop/orders exists in type PhpBoot");
    }

    #[tokio::test]
    async fn test_create_with_free_name_is_allowed() {
        let client = MockBootClient::new();
        let boot = test_boot(BootKind::Java, "orders", NS);
        let body = review_json("CREATE", "JavaBoot", "orders", NS, Some(boot.to_object().unwrap()));

        let review = post(state(&client, "test"), "/validate-boot", serde_json::to_vec(&body).unwrap()).await;

        assert_eq!(review["response"]["allowed"], true);
    }

    #[tokio::test]
    async fn test_update_does_not_check_names() {
        let client = MockBootClient::new();
        let boot = client.add_boot(test_boot(BootKind::Java, "orders", NS));
        let body = review_json("UPDATE", "JavaBoot", "orders", NS, Some(boot.to_object().unwrap()));

        let review = post(state(&client, "test"), "/validate-boot", serde_json::to_vec(&body).unwrap()).await;

        assert_eq!(review["response"]["allowed"], true);
    }

    #[tokio::test]
    async fn test_garbage_body_is_rejected() {
        let client = MockBootClient::new();
        let review = post(state(&client, "test"), "/validate-boot", b"not json".to_vec()).await;
        assert_eq!(review["response"]["allowed"], false);
    }

    #[tokio::test]
    async fn test_ignored_namespace_is_allowed() {
        let client = MockBootClient::new();
        client.add_boot(test_boot(BootKind::Php, "orders", NS));
        let boot = test_boot(BootKind::Java, "orders", NS);

        let rsp = crate::admission::boot_validation::review(&state(&client, "dev"), &boot_request("CREATE", &boot)).await;

        assert!(rsp.allowed);
    }

    #[test]
    fn test_create_env_must_match_resolved_setting() {
        let mut boot = test_boot(BootKind::Java, "orders", NS);
        boot.spec.env = vec![EnvVar::new("APP_NAME", "billing")];
        let err = check_env_keys(&context(), &boot, &Operation::Create).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Boot's added Env [APP_NAME=billing] not allowed with settings [APP_NAME=orders]"
        );

        boot.spec.env = vec![EnvVar::new("APP_NAME", "orders"), EnvVar::new("EXTRA", "1")];
        assert!(check_env_keys(&context(), &boot, &Operation::Create).is_ok());
    }

    fn with_snapshot(env: &[EnvVar]) -> Boot {
        let mut boot = test_boot(BootKind::Java, "orders", NS);
        boot.annotations_mut()
            .insert(ANNOTATION_BOOT_ENVS.to_string(), serde_json::to_string(env).unwrap());
        boot
    }

    #[test]
    fn test_update_env_protection() {
        let snapshot = vec![EnvVar::new("APP_NAME", "orders"), EnvVar::new("EXTRA", "1")];

        let mut deleted = with_snapshot(&snapshot);
        deleted.spec.env = vec![EnvVar::new("EXTRA", "1")];
        let err = check_env_keys(&context(), &deleted, &Operation::Update).unwrap_err();
        assert!(err.to_string().starts_with("Boot's deleted Env [APP_NAME=orders]"));

        let mut edited = with_snapshot(&snapshot);
        edited.spec.env = vec![EnvVar::new("APP_NAME", "other"), EnvVar::new("EXTRA", "1")];
        let err = check_env_keys(&context(), &edited, &Operation::Update).unwrap_err();
        assert!(err.to_string().starts_with("Boot's edit Env [APP_NAME=other]"));

        let mut user_edit = with_snapshot(&snapshot);
        user_edit.spec.env = vec![EnvVar::new("APP_NAME", "orders"), EnvVar::new("EXTRA", "2")];
        assert!(check_env_keys(&context(), &user_edit, &Operation::Update).is_ok());
    }

    #[test]
    fn test_update_re_adding_setting_with_other_value_is_denied() {
        let mut boot = with_snapshot(&[EnvVar::new("EXTRA", "1")]);
        boot.spec.env = vec![EnvVar::new("EXTRA", "1"), EnvVar::new("APP_NAME", "other")];
        let err = check_env_keys(&context(), &boot, &Operation::Update).unwrap_err();
        assert!(err.to_string().starts_with("Boot's added Env [APP_NAME=other]"));
    }

    #[test]
    fn test_update_without_snapshot_skips_env_protection() {
        let mut boot = test_boot(BootKind::Java, "orders", NS);
        boot.spec.env = vec![EnvVar::new("APP_NAME", "other")];
        assert!(check_env_keys(&context(), &boot, &Operation::Update).is_ok());
    }

    #[test]
    fn test_corrupt_snapshot_is_an_error() {
        let mut boot = test_boot(BootKind::Java, "orders", NS);
        boot.annotations_mut()
            .insert(ANNOTATION_BOOT_ENVS.to_string(), "{not json".to_string());
        let err = check_env_keys(&context(), &boot, &Operation::Update).unwrap_err();
        assert!(err.to_string().contains("annotation env decode error"));
    }

    #[test]
    fn test_env_difference() {
        let old = vec![EnvVar::new("A", "1"), EnvVar::new("B", "2"), EnvVar::new("C", "3")];
        let new = vec![EnvVar::new("A", "1"), EnvVar::new("B", "20"), EnvVar::new("D", "4")];
        let diff = EnvDifference::between(&old, &new);
        assert_eq!(diff.deleted, vec![&old[2]]);
        assert_eq!(diff.modified, vec![&new[1]]);
        assert_eq!(diff.added, vec![&new[2]]);
    }

    #[test]
    fn test_dns1123_label() {
        assert!(is_dns1123_label("orders-data"));
        assert!(is_dns1123_label("123-abc"));
        assert!(!is_dns1123_label("Orders"));
        assert!(!is_dns1123_label("-data"));
        assert!(!is_dns1123_label("data-"));
        assert!(!is_dns1123_label("data_1"));
    }

    fn mounting(name: &str, read_only: bool, mount_path: &str) -> Boot {
        let mut boot = test_boot(BootKind::Java, "orders", NS);
        boot.spec.pvc = vec![PvcMount {
            name: name.to_string(),
            read_only,
            mount_path: mount_path.to_string(),
        }];
        boot
    }

    #[tokio::test]
    async fn test_pvc_checks() {
        let client = MockBootClient::new();
        let owned = mounting("orders-data", false, "/data");
        client.add_pvc(test_pvc(NS, "orders-data", pod_labels(&owned)));
        client.add_pvc(test_pvc(
            NS,
            "team-data",
            BTreeMap::from([(LABEL_SHARED.to_string(), "true".to_string())]),
        ));
        client.add_pvc(test_pvc(
            NS,
            "other-data",
            BTreeMap::from([("team".to_string(), "other".to_string())]),
        ));
        let ctx = context();

        assert!(check_pvcs(&client, &ctx, &owned).await.is_ok());
        // macros resolve before lookup
        assert!(check_pvcs(&client, &ctx, &mounting("${APP}-data", false, "/data")).await.is_ok());
        assert!(check_pvcs(&client, &ctx, &mounting("team-data", true, "/shared")).await.is_ok());

        let cases = [
            (mounting("team-data", false, "/shared"), "the pvc team-data is a shared pvc, should be readOnly"),
            (
                mounting("other-data", false, "/data"),
                "the pvc other-data's label don't match the boot orders. the pvc other-data also is not a shared pvc.",
            ),
            (mounting("missing", false, "/data"), "the pvc missing don't exist in namespace shop."),
            (mounting("orders-data", false, "c:/data"), "the pvc MountPath must be not empty and not contain ':'"),
            (mounting("", false, "/data"), "the pvc name  must be not empty and no more than 63 characters"),
        ];
        for (boot, expected) in cases {
            let err = check_pvcs(&client, &ctx, &boot).await.unwrap_err();
            assert_eq!(err.to_string(), expected);
        }

        let err = check_pvcs(&client, &ctx, &mounting("Data_1", false, "/data")).await.unwrap_err();
        assert!(err.to_string().starts_with("the pvc Data_1 is a DNS-1123 label"));
    }

    fn apply(boot: &Boot, patch: &json_patch::Patch) -> Boot {
        let mut doc = boot.to_object().unwrap();
        json_patch::patch(&mut doc, patch).unwrap();
        Boot::from_object(&doc).unwrap()
    }

    #[test]
    fn test_mutation_defaults_boot_when_enabled() {
        let mut boot = test_boot(BootKind::Java, "orders", NS);
        boot.spec.replicas = None;
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();

        let patch = mutation_patch(&boot, &context(), &Operation::Create, true, now).unwrap();
        let mutated = apply(&boot, &patch);

        assert_eq!(mutated.spec.replicas, Some(1));
        assert_eq!(mutated.spec.health.as_deref(), Some("/health"));
        assert_eq!(mutated.spec.env, vec![EnvVar::new("APP_NAME", "orders")]);
        assert_eq!(mutated.annotation(ANNOTATION_LAST_UPDATE), None);
    }

    #[test]
    fn test_mutation_stamps_updates_only() {
        let boot = test_boot(BootKind::Java, "orders", NS);
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();

        let patch = mutation_patch(&boot, &context(), &Operation::Create, false, now).unwrap();
        assert!(patch.0.is_empty());

        let patch = mutation_patch(&boot, &context(), &Operation::Update, false, now).unwrap();
        let mutated = apply(&boot, &patch);
        assert_eq!(mutated.annotation(ANNOTATION_LAST_UPDATE), Some("2024-05-01T08:30:00Z"));
        assert_eq!(mutated.spec, boot.spec);
    }

    #[test]
    fn test_mutation_review_carries_patch() {
        let client = MockBootClient::new();
        let boot = test_boot(BootKind::Java, "orders", NS);

        let rsp = boot_mutation::review(&state(&client, "test"), &boot_request("UPDATE", &boot));

        assert!(rsp.allowed);
        assert!(rsp.patch.is_some());
    }

    fn configmap(name: &str, namespace: &str, data: Option<&str>) -> Value {
        let mut object = json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": name, "namespace": namespace},
        });
        if let Some(text) = data {
            object["data"] = json!({ "config.yaml": text });
        }
        object
    }

    fn config_request(operation: &str, name: &str, object: Option<Value>) -> AdmissionRequest {
        request(operation, "ConfigMap", name, "logan", object)
    }

    #[test]
    fn test_config_validation() {
        let settings = test_settings("test");
        let name = settings.configmap_name.clone();
        let denied = |req: AdmissionRequest| {
            let rsp = config_validation::review(&settings, &req);
            assert!(!rsp.allowed);
            rsp.result.message
        };

        assert_eq!(denied(config_request("DELETE", &name, None)), "can not delete operator's configmap");
        assert_eq!(
            denied(config_request("UPDATE", &name, Some(configmap(&name, "logan", None)))),
            "Can not find config.yaml in the configmap"
        );
        assert_eq!(
            denied(config_request("UPDATE", &name, Some(configmap(&name, "logan", Some("  \n"))))),
            "config.yaml in the configmap can not blank"
        );
        assert!(
            denied(config_request("UPDATE", &name, Some(configmap(&name, "logan", Some("java: [1, 2")))))
                .starts_with("Decoding config.yaml error")
        );

        let valid = config_validation::review(
            &settings,
            &config_request("UPDATE", &name, Some(configmap(&name, "logan", Some(TEST_CONFIG)))),
        );
        assert!(valid.allowed);

        let other = config_validation::review(&settings, &config_request("DELETE", "unrelated", None));
        assert!(other.allowed);
    }
}
