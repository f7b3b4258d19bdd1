//! Test utilities for unit testing reconcilers and admission handlers
//!
//! This module provides helpers for creating test data and setting up test scenarios.

#[cfg(test)]
use crate::config::{ConfigHandle, ResolvedContext};
#[cfg(test)]
use crate::metrics::PrometheusMetrics;
#[cfg(test)]
use crate::reconciler::{Reconciler, TickOutcome};
#[cfg(test)]
use crate::settings::OperatorSettings;
#[cfg(test)]
use boot_client::MockBootClient;
#[cfg(test)]
use crds::{Boot, BootKind, BootSpec};
#[cfg(test)]
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};
#[cfg(test)]
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
#[cfg(test)]
use std::collections::BTreeMap;
#[cfg(test)]
use std::sync::Arc;

/// Operator config used by most tests: a registry, one env entry and one
/// sidecar Service for java.
#[cfg(test)]
pub const TEST_CONFIG: &str = r#"
java:
  settings:
    registry: hub.local
  app:
    env:
      - name: APP_NAME
        value: "${APP}"
  sidecarServices:
    - name: agent
      port: 9100
"#;

/// Settings with defaults except the operator environment.
#[cfg(test)]
pub fn test_settings(env: &str) -> OperatorSettings {
    let env = env.to_string();
    OperatorSettings::from_lookup(move |key| (key == "LOGAN_ENV").then(|| env.clone()))
        .expect("default settings are valid")
}

/// Boot with image `app:1.0`, one replica and port 8080.
#[cfg(test)]
pub fn test_boot(kind: BootKind, name: &str, namespace: &str) -> Boot {
    Boot::new(
        kind,
        name,
        namespace,
        BootSpec {
            image: "app".to_string(),
            version: "1.0".to_string(),
            replicas: Some(1),
            port: 8080,
            ..Default::default()
        },
    )
}

/// Reconciler over `client` with `config` resolved for `env`.
#[cfg(test)]
pub fn test_reconciler(
    client: &MockBootClient,
    config: &str,
    settings: OperatorSettings,
) -> (Reconciler, Arc<PrometheusMetrics>) {
    let context = ResolvedContext::from_document(config, &settings.env).expect("test config parses");
    let metrics = Arc::new(PrometheusMetrics::new().expect("metrics register"));
    let reconciler = Reconciler::new(
        client.clone(),
        ConfigHandle::new(context),
        Arc::new(settings),
        metrics.clone(),
    );
    (reconciler, metrics)
}

/// Runs ticks until one ends with `Done`; returns the number of ticks.
#[cfg(test)]
pub async fn converge(reconciler: &Reconciler, boot: &Boot) -> usize {
    for tick in 1..=10 {
        let outcome = reconciler
            .reconcile_boot(boot.kind, boot.namespace(), boot.name())
            .await
            .expect("tick succeeds");
        if outcome == TickOutcome::Done {
            return tick;
        }
    }
    panic!("{} did not converge in 10 ticks", boot.key());
}

#[cfg(test)]
pub fn test_pod(namespace: &str, name: &str, labels: BTreeMap<String, String>) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        ..Default::default()
    }
}

#[cfg(test)]
pub fn test_pvc(namespace: &str, name: &str, labels: BTreeMap<String, String>) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        ..Default::default()
    }
}
