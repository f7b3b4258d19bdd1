//! Admission webhooks
//!
//! Three endpoints share one axum router:
//! - `/validate-boot`: name uniqueness, env protection and claim checks
//! - `/mutate-boot`: optional defaulting plus the last-update stamp
//! - `/validate-config`: guards the operator ConfigMap
//!
//! Every handler answers with an `AdmissionReview`. Decode and internal
//! failures deny the request.

pub mod boot_mutation;
pub mod boot_validation;
pub mod config_validation;

#[cfg(test)]
mod admission_test;

use crate::config::ConfigHandle;
use crate::settings::OperatorSettings;
use anyhow::{Context, Result, anyhow};
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::routing::post;
use axum::Json;
use boot_client::BootClientTrait;
use crds::{Boot, BootKind};
use kube::core::DynamicObject;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

pub type AdmissionReview = kube::core::admission::AdmissionReview<DynamicObject>;
pub type AdmissionRequest = kube::core::admission::AdmissionRequest<DynamicObject>;
pub type AdmissionResponse = kube::core::admission::AdmissionResponse;

/// Shared state of the webhook handlers.
#[derive(Clone)]
pub struct AdmissionState {
    pub client: Arc<dyn BootClientTrait>,
    pub config: ConfigHandle,
    pub settings: Arc<OperatorSettings>,
}

impl AdmissionState {
    pub fn new(
        client: Arc<dyn BootClientTrait>,
        config: ConfigHandle,
        settings: Arc<OperatorSettings>,
    ) -> Self {
        Self {
            client,
            config,
            settings,
        }
    }
}

/// Webhook router.
pub fn router(state: AdmissionState) -> Router {
    Router::new()
        .route("/validate-boot", post(validate_boot))
        .route("/mutate-boot", post(mutate_boot))
        .route("/validate-config", post(validate_config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Parses a review body into its request. On failure the returned review is
/// the answer to send back.
fn parse_request(body: &[u8]) -> Result<AdmissionRequest, AdmissionReview> {
    let review: AdmissionReview = match serde_json::from_slice(body) {
        Ok(review) => review,
        Err(error) => {
            warn!(%error, "Failed to parse admission review");
            return Err(AdmissionResponse::invalid(error).into_review());
        }
    };
    match review.try_into() {
        Ok(req) => Ok(req),
        Err(error) => {
            warn!(%error, "Invalid admission request");
            Err(AdmissionResponse::invalid(error).into_review())
        }
    }
}

async fn validate_boot(State(state): State<AdmissionState>, body: Bytes) -> Json<AdmissionReview> {
    let req = match parse_request(&body) {
        Ok(req) => req,
        Err(review) => return Json(review),
    };
    debug!(uid = %req.uid, name = %req.name, "Validating Boot");
    Json(boot_validation::review(&state, &req).await.into_review())
}

async fn mutate_boot(State(state): State<AdmissionState>, body: Bytes) -> Json<AdmissionReview> {
    let req = match parse_request(&body) {
        Ok(req) => req,
        Err(review) => return Json(review),
    };
    debug!(uid = %req.uid, name = %req.name, "Mutating Boot");
    Json(boot_mutation::review(&state, &req).into_review())
}

async fn validate_config(State(state): State<AdmissionState>, body: Bytes) -> Json<AdmissionReview> {
    let req = match parse_request(&body) {
        Ok(req) => req,
        Err(review) => return Json(review),
    };
    debug!(uid = %req.uid, name = %req.name, "Validating ConfigMap");
    Json(config_validation::review(&state.settings, &req).into_review())
}

/// Decodes the Boot under review from the request's object.
pub(crate) fn decode_boot(req: &AdmissionRequest) -> Result<Boot> {
    let kind = BootKind::from_api_kind(&req.kind.kind)
        .ok_or_else(|| anyhow!("Can not recognize the boot type {}", req.kind.kind))?;
    let object = req
        .object
        .as_ref()
        .ok_or_else(|| anyhow!("Admission request for {} has no object", req.name))?;
    let mut boot = Boot::from_dynamic(kind, object).context("Decoding request error")?;
    if boot.metadata.namespace.is_none() {
        boot.metadata.namespace.clone_from(&req.namespace);
    }
    Ok(boot)
}
