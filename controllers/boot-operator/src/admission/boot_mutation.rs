//! Boot mutation: defaulting at admission time and the last-update stamp.

use super::{AdmissionRequest, AdmissionResponse, AdmissionState, decode_boot};
use crate::config::ResolvedContext;
use crate::defaulter::{default_boot, set_annotation};
use crate::keys::ANNOTATION_LAST_UPDATE;
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use crds::Boot;
use kube::core::admission::Operation;
use tracing::{debug, warn};

/// Answers one mutation request with a JSON patch.
pub fn review(state: &AdmissionState, req: &AdmissionRequest) -> AdmissionResponse {
    let rsp = AdmissionResponse::from(req);
    let ctx = state.config.current();
    if req.namespace.as_deref().is_some_and(|ns| ctx.ignores_namespace(ns))
        || !matches!(req.operation, Operation::Create | Operation::Update)
    {
        return rsp;
    }

    let patch = decode_boot(req).and_then(|boot| {
        mutation_patch(&boot, &ctx, &req.operation, state.settings.mutation_defaulter, Utc::now())
    });
    let patch = match patch {
        Ok(patch) => patch,
        Err(error) => {
            warn!(name = %req.name, "Mutating Boot failed: {:#}", error);
            return rsp.deny(format!("{error:#}"));
        }
    };
    debug!(name = %req.name, ops = patch.0.len(), "Boot patch");

    match rsp.clone().with_patch(patch) {
        Ok(rsp) => rsp,
        Err(error) => {
            warn!(name = %req.name, %error, "Encoding Boot patch failed");
            rsp.deny(error)
        }
    }
}

/// Applies admission-time changes to a copy of `boot` and returns the patch
/// from the original.
///
/// # Errors
///
/// Fails only if the Boot cannot be encoded as JSON.
pub fn mutation_patch(
    boot: &Boot,
    ctx: &ResolvedContext,
    operation: &Operation,
    defaulter: bool,
    now: DateTime<Utc>,
) -> Result<json_patch::Patch> {
    let mut mutated = boot.clone();
    if defaulter {
        let cfg = ctx.boot_config(boot);
        let outcome = default_boot(&mut mutated, &cfg, ctx.env());
        debug!("{}: admission defaulting {:?}", boot.key(), outcome);
    }
    if *operation == Operation::Update {
        set_annotation(
            mutated.annotations_mut(),
            ANNOTATION_LAST_UPDATE,
            &now.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
    }

    let original = boot.to_object().context("Encoding Boot")?;
    let current = mutated.to_object().context("Encoding mutated Boot")?;
    Ok(json_patch::diff(&original, &current))
}
