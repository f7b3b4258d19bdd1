//! Kind-tagged Boot
//!
//! All reconcile, defaulting and admission logic works on [`Boot`]. The five
//! concrete resources only appear at the API boundary, through
//! [`BootResource`] and the JSON/dynamic-object adapters below.

use crate::boot_kinds::{
    JavaBoot, JavaBootSpec, NodeJSBoot, NodeJSBootSpec, PhpBoot, PhpBootSpec, PythonBoot,
    PythonBootSpec, WebBoot, WebBootSpec,
};
use crate::boot_spec::{BootSpec, BootStatus};
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::core::{ApiResource, DynamicObject, TypeMeta};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// API group shared by every Boot kind and `BootRevision`
pub const BOOT_GROUP: &str = "app.logancloud.com";

/// `apiVersion` of every Boot kind and `BootRevision`
pub const BOOT_API_VERSION: &str = "app.logancloud.com/v1";

/// The five application kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BootKind {
    #[default]
    Java,
    Php,
    Python,
    #[serde(rename = "nodejs")]
    NodeJs,
    Web,
}

impl BootKind {
    /// Every kind, in configuration order.
    pub const ALL: [BootKind; 5] = [
        BootKind::Java,
        BootKind::Php,
        BootKind::Python,
        BootKind::NodeJs,
        BootKind::Web,
    ];

    /// Configuration key and `bootType` label value (`java`, `php`, ...)
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            BootKind::Java => "java",
            BootKind::Php => "php",
            BootKind::Python => "python",
            BootKind::NodeJs => "nodejs",
            BootKind::Web => "web",
        }
    }

    /// Application key (`javaBoot`, `phpBoot`, ...)
    #[must_use]
    pub fn app_key(self) -> &'static str {
        match self {
            BootKind::Java => "javaBoot",
            BootKind::Php => "phpBoot",
            BootKind::Python => "pythonBoot",
            BootKind::NodeJs => "nodejsBoot",
            BootKind::Web => "webBoot",
        }
    }

    /// Resource kind name on the API server
    #[must_use]
    pub fn api_kind(self) -> &'static str {
        match self {
            BootKind::Java => "JavaBoot",
            BootKind::Php => "PhpBoot",
            BootKind::Python => "PythonBoot",
            BootKind::NodeJs => "NodeJSBoot",
            BootKind::Web => "WebBoot",
        }
    }

    /// Parses a configuration key. Profile names are not kinds.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.key() == key)
    }

    /// Parses a resource kind name, ignoring case.
    #[must_use]
    pub fn from_api_kind(kind: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.api_kind().eq_ignore_ascii_case(kind))
    }

    /// Dynamic API descriptor for this kind's resource.
    #[must_use]
    pub fn api_resource(self) -> ApiResource {
        match self {
            BootKind::Java => ApiResource::erase::<JavaBoot>(&()),
            BootKind::Php => ApiResource::erase::<PhpBoot>(&()),
            BootKind::Python => ApiResource::erase::<PythonBoot>(&()),
            BootKind::NodeJs => ApiResource::erase::<NodeJSBoot>(&()),
            BootKind::Web => ApiResource::erase::<WebBoot>(&()),
        }
    }
}

impl fmt::Display for BootKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Failure to decode a Boot object received from the API server or a webhook.
#[derive(Debug, Error)]
pub enum BootDecodeError {
    /// `kind` is missing or not one of the five Boot kinds
    #[error("unknown boot kind: {0}")]
    UnknownKind(String),

    /// Malformed metadata, spec or status
    #[error("invalid boot object: {0}")]
    Json(#[from] serde_json::Error),
}

/// Generic Boot: identity, kind, spec, status and the annotation side channel
/// carried in `metadata`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Boot {
    pub kind: BootKind,
    pub metadata: ObjectMeta,
    pub spec: BootSpec,
    pub status: Option<BootStatus>,
}

impl Boot {
    /// Creates a Boot with a bare name/namespace identity.
    pub fn new(kind: BootKind, name: &str, namespace: &str, spec: BootSpec) -> Self {
        Self {
            kind,
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            spec,
            status: None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        self.metadata.namespace.as_deref().unwrap_or_default()
    }

    /// `kind namespace/name`, used as the log and work-queue key.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{} {}/{}", self.kind, self.namespace(), self.name())
    }

    /// Reads one annotation.
    #[must_use]
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(key))
            .map(String::as_str)
    }

    /// Annotation map, created on first use.
    pub fn annotations_mut(&mut self) -> &mut BTreeMap<String, String> {
        self.metadata.annotations.get_or_insert_with(BTreeMap::new)
    }

    /// Controller owner reference pointing at this Boot.
    #[must_use]
    pub fn owner_reference(&self) -> OwnerReference {
        OwnerReference {
            api_version: BOOT_API_VERSION.to_string(),
            kind: self.kind.api_kind().to_string(),
            name: self.name().to_string(),
            uid: self.metadata.uid.clone().unwrap_or_default(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }

    /// Object reference used as the subject of Events.
    #[must_use]
    pub fn object_reference(&self) -> ObjectReference {
        ObjectReference {
            api_version: Some(BOOT_API_VERSION.to_string()),
            kind: Some(self.kind.api_kind().to_string()),
            name: self.metadata.name.clone(),
            namespace: self.metadata.namespace.clone(),
            uid: self.metadata.uid.clone(),
            resource_version: self.metadata.resource_version.clone(),
            ..Default::default()
        }
    }

    /// Decodes a full object (`apiVersion`, `kind`, `metadata`, `spec`, `status`).
    ///
    /// # Errors
    ///
    /// Fails when `kind` is not a Boot kind or a section does not match the schema.
    pub fn from_object(value: &serde_json::Value) -> Result<Self, BootDecodeError> {
        let kind_name = value
            .get("kind")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();
        let kind = BootKind::from_api_kind(kind_name)
            .ok_or_else(|| BootDecodeError::UnknownKind(kind_name.to_string()))?;
        Self::from_object_of_kind(kind, value)
    }

    /// Decodes an object whose kind is already known (the `kind` field is ignored).
    ///
    /// # Errors
    ///
    /// Fails when a section does not match the schema.
    pub fn from_object_of_kind(
        kind: BootKind,
        value: &serde_json::Value,
    ) -> Result<Self, BootDecodeError> {
        let metadata = match value.get("metadata") {
            Some(meta) => serde_json::from_value(meta.clone())?,
            None => ObjectMeta::default(),
        };
        let spec = match value.get("spec") {
            Some(spec) if !spec.is_null() => serde_json::from_value(spec.clone())?,
            _ => BootSpec::default(),
        };
        let status = match value.get("status") {
            Some(status) if !status.is_null() => Some(serde_json::from_value(status.clone())?),
            _ => None,
        };
        Ok(Self {
            kind,
            metadata,
            spec,
            status,
        })
    }

    /// Encodes into the wire shape of this Boot's kind.
    ///
    /// # Errors
    ///
    /// Fails only if serde cannot represent the metadata.
    pub fn to_object(&self) -> Result<serde_json::Value, serde_json::Error> {
        let mut object = serde_json::json!({
            "apiVersion": BOOT_API_VERSION,
            "kind": self.kind.api_kind(),
            "metadata": serde_json::to_value(&self.metadata)?,
            "spec": serde_json::to_value(&self.spec)?,
        });
        if let Some(status) = &self.status {
            object["status"] = serde_json::to_value(status)?;
        }
        Ok(object)
    }

    /// Decodes a dynamic object fetched through this kind's [`ApiResource`].
    ///
    /// # Errors
    ///
    /// Fails when the spec or status does not match the schema.
    pub fn from_dynamic(kind: BootKind, obj: &DynamicObject) -> Result<Self, BootDecodeError> {
        let mut boot = Self::from_object_of_kind(kind, &obj.data)?;
        boot.metadata = obj.metadata.clone();
        Ok(boot)
    }

    /// Encodes into a dynamic object for writes.
    ///
    /// # Errors
    ///
    /// Fails only if serde cannot represent the spec.
    pub fn to_dynamic(&self) -> Result<DynamicObject, serde_json::Error> {
        let mut data = serde_json::json!({ "spec": serde_json::to_value(&self.spec)? });
        if let Some(status) = &self.status {
            data["status"] = serde_json::to_value(status)?;
        }
        Ok(DynamicObject {
            types: Some(TypeMeta {
                api_version: BOOT_API_VERSION.to_string(),
                kind: self.kind.api_kind().to_string(),
            }),
            metadata: self.metadata.clone(),
            data,
        })
    }
}

/// Conversion between a concrete Boot kind resource and the generic [`Boot`].
pub trait BootResource: Sized {
    /// Kind tag of this resource
    const KIND: BootKind;

    /// Erases the concrete kind.
    fn into_boot(self) -> Boot;

    /// Rebuilds the concrete resource. The caller guarantees `boot.kind == Self::KIND`.
    fn from_boot(boot: Boot) -> Self;
}

macro_rules! impl_boot_resource {
    ($resource:ident, $spec:ident, $kind:expr) => {
        impl BootResource for $resource {
            const KIND: BootKind = $kind;

            fn into_boot(self) -> Boot {
                Boot {
                    kind: Self::KIND,
                    metadata: self.metadata,
                    spec: self.spec.boot,
                    status: self.status,
                }
            }

            fn from_boot(boot: Boot) -> Self {
                Self {
                    metadata: boot.metadata,
                    spec: $spec { boot: boot.spec },
                    status: boot.status,
                }
            }
        }
    };
}

impl_boot_resource!(JavaBoot, JavaBootSpec, BootKind::Java);
impl_boot_resource!(PhpBoot, PhpBootSpec, BootKind::Php);
impl_boot_resource!(PythonBoot, PythonBootSpec, BootKind::Python);
impl_boot_resource!(NodeJSBoot, NodeJSBootSpec, BootKind::NodeJs);
impl_boot_resource!(WebBoot, WebBootSpec, BootKind::Web);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_lookup() {
        assert_eq!(BootKind::from_key("nodejs"), Some(BootKind::NodeJs));
        assert_eq!(BootKind::from_key("javaBoot"), None);
        assert_eq!(BootKind::from_api_kind("nodejsboot"), Some(BootKind::NodeJs));
        assert_eq!(BootKind::from_api_kind("Deployment"), None);
        assert_eq!(BootKind::Web.api_resource().plural, "webboots");
    }

    #[test]
    fn test_from_object_decodes_kind_and_spec() {
        let raw = serde_json::json!({
            "apiVersion": BOOT_API_VERSION,
            "kind": "PhpBoot",
            "metadata": {"name": "shop", "namespace": "team-a", "annotations": {"x": "y"}},
            "spec": {"image": "shop", "version": "2.0", "port": 9000},
        });
        let boot = Boot::from_object(&raw).unwrap();
        assert_eq!(boot.kind, BootKind::Php);
        assert_eq!(boot.name(), "shop");
        assert_eq!(boot.annotation("x"), Some("y"));
        assert_eq!(boot.spec.port, 9000);
        assert_eq!(boot.to_object().unwrap(), raw);
    }

    #[test]
    fn test_from_object_rejects_unknown_kind() {
        let raw = serde_json::json!({"kind": "Deployment", "metadata": {"name": "x"}});
        assert!(matches!(
            Boot::from_object(&raw),
            Err(BootDecodeError::UnknownKind(k)) if k == "Deployment"
        ));
    }

    #[test]
    fn test_concrete_resource_roundtrip() {
        let mut boot = Boot::new(BootKind::Java, "api", "team-a", BootSpec::default());
        boot.spec.image = "api".to_string();
        let java = JavaBoot::from_boot(boot.clone());
        assert_eq!(java.spec.boot.image, "api");
        assert_eq!(java.into_boot(), boot);
    }

    #[test]
    fn test_owner_reference_is_controller() {
        let mut boot = Boot::new(BootKind::Web, "site", "ns", BootSpec::default());
        boot.metadata.uid = Some("uid-1".to_string());
        let owner = boot.owner_reference();
        assert_eq!(owner.kind, "WebBoot");
        assert_eq!(owner.uid, "uid-1");
        assert_eq!(owner.controller, Some(true));
    }
}
