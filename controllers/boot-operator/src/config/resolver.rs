//! Layered configuration resolution.
//!
//! For every built-in kind and every profile: scalar defaults, the `oEnvs`
//! override for the `app` scope, settings precedence, `${REGISTRY}` in init
//! container and sidecar images, and sidecar env overrides.

use super::ConfigError;
use super::model::{APP_SCOPE, AppSpec, GlobalConfig, OperatorConfig, SidecarService};
use crate::merge::{MergeMode, merge_keep_existing, merge_named, merge_override};
use crate::template::decode_image;
use k8s_openapi::api::core::v1::Container;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

pub const DEFAULT_PORT: i32 = 8080;
pub const DEFAULT_REPLICAS: i32 = 1;
pub const DEFAULT_HEALTH: &str = "/health";

/// Resolved configuration for one kind or profile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BootConfig {
    pub app: AppSpec,
    pub sidecar_containers: Vec<Container>,
    pub sidecar_services: Vec<SidecarService>,
}

/// Parses a YAML or JSON document. Blank documents are valid and empty.
pub fn parse_document(content: &str) -> Result<GlobalConfig, ConfigError> {
    if content.trim().is_empty() {
        return Ok(GlobalConfig::new());
    }
    let raw: Option<BTreeMap<String, Option<OperatorConfig>>> = serde_yaml::from_str(content)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(key, cfg)| (key, cfg.unwrap_or_default()))
        .collect())
}

/// Operator-level scalars applied under the entry's own values.
fn scalar_defaults() -> AppSpec {
    AppSpec {
        port: DEFAULT_PORT,
        replicas: DEFAULT_REPLICAS,
        health: DEFAULT_HEALTH.to_string(),
        ..AppSpec::default()
    }
}

/// Resolves one kind or profile entry for operator environment `env`.
#[must_use]
pub fn resolve_entry(key: &str, mut operator: OperatorConfig, env: &str) -> BootConfig {
    let mut app = operator.app.take().unwrap_or_default();

    // negative scalars count as unset
    app.port = app.port.max(0);
    app.replicas = app.replicas.max(0);
    let _ = merge_keep_existing(&mut app, &scalar_defaults()).log_failure("defaults", key);

    let env_override = operator
        .o_envs
        .get(APP_SCOPE)
        .and_then(|by_env| by_env.get(env))
        .cloned()
        .unwrap_or_default();
    let _ = merge_override(&mut app, &env_override).log_failure("oEnvs.app", key);

    // Environment settings beat operator settings, which beat the app layer.
    let mut settings = app.settings();
    if let Some(mut operator_settings) = operator.settings.take() {
        if let Some(env_settings) = &env_override.settings {
            if !env_settings.registry.is_empty() {
                operator_settings.registry.clone_from(&env_settings.registry);
            }
            if env_settings.app_health_port > 0 {
                operator_settings.app_health_port = env_settings.app_health_port;
            }
        }
        if !operator_settings.registry.is_empty() {
            settings.registry = operator_settings.registry;
        }
        if operator_settings.app_health_port > 0 {
            settings.app_health_port = operator_settings.app_health_port;
        }
        if operator_settings.prometheus_scrape.is_some() {
            settings.prometheus_scrape = operator_settings.prometheus_scrape;
        }
    }
    app.settings = Some(settings);
    let registry = app.settings().registry;

    if let Some(Value::Array(init_containers)) = app
        .pod_spec
        .as_mut()
        .and_then(|pod| pod.get_mut("initContainers"))
    {
        for container in init_containers {
            if let Some(image) = container.get("image").and_then(Value::as_str) {
                let decoded = decode_image(image, &registry);
                container["image"] = Value::String(decoded);
            }
        }
    }

    let mut sidecar_containers = operator.sidecar_containers.take().unwrap_or_default();
    for container in &mut sidecar_containers {
        if let Some(image) = container.image.as_deref() {
            container.image = Some(decode_image(image, &registry));
        }
        let overrides = operator
            .o_envs
            .get(&container.name)
            .and_then(|by_env| by_env.get(env))
            .map(|spec| spec.env.clone())
            .unwrap_or_default();
        if !overrides.is_empty() {
            let envs = container.env.get_or_insert_with(Vec::new);
            let _ = merge_named(envs, &overrides, MergeMode::Override)
                .log_failure("oEnvs.sidecar", key);
        }
    }

    debug!("Resolved config for {}: port={}, replicas={}, registry={}", key, app.port, app.replicas, registry);

    BootConfig {
        app,
        sidecar_containers,
        sidecar_services: operator.sidecar_services.take().unwrap_or_default(),
    }
}
