//! BootRevision CRD
//!
//! Immutable snapshot of a Boot's spec. Identity, hash, phase, diff and retry
//! state travel in annotations; `bootName`/`bootType` labels link it back to
//! its Boot.

use crate::boot_spec::{BootSpec, BootStatus};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "app.logancloud.com",
    version = "v1",
    kind = "BootRevision",
    namespaced,
    status = "BootStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct BootRevisionSpec {
    /// Snapshot of the Boot spec (replicas forced to 0, business env removed)
    #[serde(flatten)]
    pub boot: BootSpec,

    /// Kind key of the owning Boot (`java`, `php`, ...)
    #[serde(default)]
    pub boot_type: String,

    /// Application key of the owning Boot (`javaBoot`, ...)
    #[serde(default)]
    pub app_key: String,
}
