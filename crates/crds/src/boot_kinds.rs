//! Boot kind CRDs
//!
//! The five application kinds share [`BootSpec`] and [`BootStatus`]; each kind
//! is its own resource so the API server keeps them in separate collections.

use crate::boot_spec::{BootSpec, BootStatus};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Spec of `JavaBoot` (java boot applications)
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "app.logancloud.com",
    version = "v1",
    kind = "JavaBoot",
    namespaced,
    status = "BootStatus"
)]
pub struct JavaBootSpec {
    #[serde(flatten)]
    pub boot: BootSpec,
}

/// Spec of `PhpBoot` (php boot applications)
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "app.logancloud.com",
    version = "v1",
    kind = "PhpBoot",
    namespaced,
    status = "BootStatus"
)]
pub struct PhpBootSpec {
    #[serde(flatten)]
    pub boot: BootSpec,
}

/// Spec of `PythonBoot` (python boot applications)
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "app.logancloud.com",
    version = "v1",
    kind = "PythonBoot",
    namespaced,
    status = "BootStatus"
)]
pub struct PythonBootSpec {
    #[serde(flatten)]
    pub boot: BootSpec,
}

/// Spec of `NodeJSBoot` (nodejs boot applications)
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "app.logancloud.com",
    version = "v1",
    kind = "NodeJSBoot",
    namespaced,
    status = "BootStatus"
)]
pub struct NodeJSBootSpec {
    #[serde(flatten)]
    pub boot: BootSpec,
}

/// Spec of `WebBoot` (static web applications)
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "app.logancloud.com",
    version = "v1",
    kind = "WebBoot",
    namespaced,
    status = "BootStatus"
)]
pub struct WebBootSpec {
    #[serde(flatten)]
    pub boot: BootSpec,
}
