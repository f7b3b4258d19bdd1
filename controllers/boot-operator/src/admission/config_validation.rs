//! Validation of the operator ConfigMap.

use super::{AdmissionRequest, AdmissionResponse};
use crate::config::resolver::parse_document;
use crate::config::CONFIG_KEY;
use crate::settings::OperatorSettings;
use anyhow::{Context, Result, bail, ensure};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::core::admission::Operation;
use tracing::info;

/// Answers one ConfigMap validation request. ConfigMaps other than the
/// operator's own are always allowed.
pub fn review(settings: &OperatorSettings, req: &AdmissionRequest) -> AdmissionResponse {
    let rsp = AdmissionResponse::from(req);
    let targeted = req.name == settings.configmap_name
        && req.namespace.as_deref() == Some(settings.operator_namespace.as_str());
    if !targeted {
        return rsp;
    }

    match validate(req) {
        Ok(()) => rsp,
        Err(error) => {
            info!(name = %req.name, operation = ?req.operation, "Denying ConfigMap: {:#}", error);
            rsp.deny(format!("{error:#}"))
        }
    }
}

fn validate(req: &AdmissionRequest) -> Result<()> {
    if req.operation == Operation::Delete {
        bail!("can not delete operator's configmap");
    }
    let object = req
        .object
        .as_ref()
        .context("Can not decoding configmap")?;
    let configmap: ConfigMap = serde_json::to_value(object)
        .and_then(serde_json::from_value)
        .context("Decoding request error")?;
    validate_data(&configmap)
}

/// Checks the `config.yaml` entry of the operator ConfigMap.
pub fn validate_data(configmap: &ConfigMap) -> Result<()> {
    let Some(text) = configmap.data.as_ref().and_then(|d| d.get(CONFIG_KEY)) else {
        bail!("Can not find config.yaml in the configmap");
    };
    ensure!(!text.trim().is_empty(), "config.yaml in the configmap can not blank");
    parse_document(text)?;
    Ok(())
}
