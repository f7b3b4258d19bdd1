//! Configuration document shape.
//!
//! ```yaml
//! java:
//!   settings: {registry: hub.local, appHealthPort: 8081}
//!   oEnvs:
//!     app:
//!       test: {port: 8082, env: [{name: A, value: b}]}
//!   app: {port: 8080, health: /health, env: [...], resources: {...}}
//!   sideCarContainers: [{name: agent, image: "${REGISTRY}/agent:1"}]
//!   sidecarServices: [{name: agent, port: 9100}]
//! my-profile:
//!   app: {...}
//! ```

use crds::{BootResources, EnvVar};
use k8s_openapi::api::core::v1::Container;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Scope of the `oEnvs` layer that applies to the app container
pub const APP_SCOPE: &str = "app";

/// The whole document: kind-or-profile key to operator config.
pub type GlobalConfig = BTreeMap<String, OperatorConfig>;

/// Configuration of one kind or profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<SettingsConfig>,

    /// scope (`app`, a sidecar or init container name) -> environment -> override
    #[serde(default, rename = "oEnvs", skip_serializing_if = "BTreeMap::is_empty")]
    pub o_envs: BTreeMap<String, BTreeMap<String, AppSpec>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<AppSpec>,

    #[serde(default, rename = "sideCarContainers", skip_serializing_if = "Option::is_none")]
    pub sidecar_containers: Option<Vec<Container>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sidecar_services: Option<Vec<SidecarService>>,
}

/// Registry and probe settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub registry: String,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub app_health_port: i32,

    /// Default for a Boot's `prometheus` field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prometheus_scrape: Option<bool>,
}

/// App layer: defaults for the Boot spec plus pod and container overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub r#type: String,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub port: i32,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub replicas: i32,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub health: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,

    #[serde(
        default,
        deserialize_with = "deserialize_resources",
        skip_serializing_if = "BootResources::is_empty"
    )]
    pub resources: BootResources,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sub_domain: String,

    /// Partial pod spec override-merged into the generated pod spec
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_spec: Option<serde_json::Value>,

    /// Partial container override-merged into the app container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<SettingsConfig>,
}

impl AppSpec {
    /// Effective settings (empty when unset).
    #[must_use]
    pub fn settings(&self) -> SettingsConfig {
        self.settings.clone().unwrap_or_default()
    }

    /// Volume mounts declared by the container override.
    #[must_use]
    pub fn container_volume_mounts(&self) -> Vec<k8s_openapi::api::core::v1::VolumeMount> {
        self.container
            .as_ref()
            .and_then(|c| c.get("volumeMounts"))
            .and_then(|mounts| serde_json::from_value(mounts.clone()).ok())
            .unwrap_or_default()
    }
}

/// A Service exposing a sidecar port.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidecarService {
    pub name: String,
    pub port: i32,
}

#[allow(clippy::trivially_copy_pass_by_ref, reason = "serde skip_serializing_if signature")]
fn is_zero(v: &i32) -> bool {
    *v == 0
}

/// Quantities in YAML are often written bare (`cpu: 2`); accept numbers too.
#[derive(Deserialize)]
#[serde(untagged)]
enum QuantityValue {
    Text(String),
    Int(i64),
    Float(f64),
}

impl QuantityValue {
    fn into_string(self) -> String {
        match self {
            QuantityValue::Text(s) => s,
            QuantityValue::Int(i) => i.to_string(),
            QuantityValue::Float(f) => f.to_string(),
        }
    }
}

fn deserialize_resources<'de, D>(deserializer: D) -> Result<BootResources, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize, Default)]
    struct Raw {
        #[serde(default)]
        limits: Option<BTreeMap<String, QuantityValue>>,
        #[serde(default)]
        requests: Option<BTreeMap<String, QuantityValue>>,
    }

    let raw = Option::<Raw>::deserialize(deserializer)?.unwrap_or_default();
    let convert = |m: Option<BTreeMap<String, QuantityValue>>| {
        m.unwrap_or_default()
            .into_iter()
            .map(|(k, v)| (k, v.into_string()))
            .collect()
    };
    Ok(BootResources {
        limits: convert(raw.limits),
        requests: convert(raw.requests),
    })
}
