//! Shared Boot spec and status
//!
//! Every Boot kind (java, php, python, nodejs, web) carries exactly this spec.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Desired state of a Boot application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BootSpec {
    /// Image name without registry and tag
    #[serde(default)]
    pub image: String,

    /// Image tag
    #[serde(default)]
    pub version: String,

    /// Desired replica count; `None` means "not set yet"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Ordered environment of the app container. Names are unique.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,

    /// Application port
    #[serde(default, skip_serializing_if = "is_zero")]
    pub port: i32,

    /// Reserved
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sub_domain: String,

    /// Health check path; `Some("")` disables probes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<String>,

    /// Readiness path (falls back to `health`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness: Option<String>,

    /// "true" / "false": whether Services carry Prometheus scrape annotations
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub prometheus: String,

    /// Resource requests and limits
    #[serde(default, skip_serializing_if = "BootResources::is_empty")]
    pub resources: BootResources,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,

    /// `None` or `ClientIP`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub session_affinity: String,

    /// "true" asks for an extra NodePort Service (dev environment only)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub node_port: String,

    /// Persistent volume claims mounted into the app container
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pvc: Vec<PvcMount>,
}

#[allow(clippy::trivially_copy_pass_by_ref, reason = "serde skip_serializing_if signature")]
fn is_zero(v: &i32) -> bool {
    *v == 0
}

/// One environment entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EnvVar {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

impl EnvVar {
    /// Builds an entry from a name and a value.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Resource limits and requests, keyed by resource name (`cpu`, `memory`, ...).
///
/// Values are Kubernetes quantity strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BootResources {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, String>,
}

impl BootResources {
    /// True when neither limits nor requests are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.limits.is_empty() && self.requests.is_empty()
    }
}

/// A claim mounted into the app container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PvcMount {
    /// Claim name, may contain `${APP}` / `${ENV}` macros
    pub name: String,
    #[serde(default)]
    pub read_only: bool,
    pub mount_path: String,
}

/// Observed state written back by the operator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BootStatus {
    /// Managed workload type (always "deploy")
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub r#type: String,

    /// Name of the managed Deployment
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub deploy: String,

    /// Comma separated names of the managed Services
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub services: String,
}
