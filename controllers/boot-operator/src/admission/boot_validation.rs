//! Boot validation: name uniqueness, env protection and claim checks.

use super::{AdmissionRequest, AdmissionResponse, AdmissionState, decode_boot};
use crate::config::ResolvedContext;
use crate::keys::{ANNOTATION_BOOT_ENVS, LABEL_SHARED};
use crate::template::Macros;
use crate::workload::pod_labels;
use anyhow::{Context, Result, bail, ensure};
use boot_client::BootClientTrait;
use crds::{Boot, BootKind, EnvVar, PvcMount};
use kube::core::admission::Operation;
use tracing::{debug, info};

const DNS1123_LABEL_MAX: usize = 63;

/// Answers one validation request.
pub async fn review(state: &AdmissionState, req: &AdmissionRequest) -> AdmissionResponse {
    let rsp = AdmissionResponse::from(req);
    let ctx = state.config.current();
    if req.namespace.as_deref().is_some_and(|ns| ctx.ignores_namespace(ns)) {
        return rsp;
    }

    match validate(state.client.as_ref(), &ctx, req).await {
        Ok(()) => {
            debug!(name = %req.name, operation = ?req.operation, "Boot valid");
            rsp
        }
        Err(error) => {
            info!(name = %req.name, operation = ?req.operation, "Denying Boot: {:#}", error);
            rsp.deny(format!("{error:#}"))
        }
    }
}

async fn validate(client: &dyn BootClientTrait, ctx: &ResolvedContext, req: &AdmissionRequest) -> Result<()> {
    if !matches!(req.operation, Operation::Create | Operation::Update) {
        return Ok(());
    }
    let boot = decode_boot(req)?;

    if req.operation == Operation::Create {
        check_name_unique(client, &boot).await?;
    }
    check_env_keys(ctx, &boot, &req.operation)?;
    check_pvcs(client, ctx, &boot).await
}

/// Rejects a name already taken by a Boot of any kind in the namespace.
pub async fn check_name_unique(client: &dyn BootClientTrait, boot: &Boot) -> Result<()> {
    for kind in BootKind::ALL {
        match client.get_boot(kind, boot.namespace(), boot.name()).await {
            Ok(_) => bail!(
                "Boot's name {}/{} exists in type {}",
                boot.namespace(),
                boot.name(),
                kind.api_kind()
            ),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e).context(format!("Checking Boot name in type {}", kind.api_kind())),
        }
    }
    Ok(())
}

/// Env protection: envs defined by the kind's global config may not be
/// changed away from their resolved value.
pub fn check_env_keys(ctx: &ResolvedContext, boot: &Boot, operation: &Operation) -> Result<()> {
    let cfg = ctx.boot_config(boot);
    if cfg.app.env.is_empty() {
        return Ok(());
    }
    let macros = Macros::for_boot(boot, ctx.env());
    let settings: Vec<EnvVar> = cfg
        .app
        .env
        .iter()
        .map(|e| EnvVar::new(e.name.clone(), macros.decode(&e.value).0))
        .collect();

    match operation {
        Operation::Create => {
            for setting in &settings {
                if let Some(env) = boot.spec.env.iter().find(|e| e.name == setting.name) {
                    ensure!(
                        env.value == setting.value,
                        "Boot's added Env [{}={}] not allowed with settings [{}={}]",
                        env.name,
                        env.value,
                        setting.name,
                        setting.value
                    );
                }
            }
            Ok(())
        }
        Operation::Update => check_env_update(&settings, boot),
        _ => Ok(()),
    }
}

fn check_env_update(settings: &[EnvVar], boot: &Boot) -> Result<()> {
    let Some(raw) = boot.annotation(ANNOTATION_BOOT_ENVS).filter(|s| !s.is_empty()) else {
        // the controller has not written a snapshot yet
        debug!("{}: no env snapshot, env protection skipped", boot.key());
        return Ok(());
    };
    let snapshot: Vec<EnvVar> =
        serde_json::from_str(raw).context("Boot's annotation env decode error")?;
    let diff = EnvDifference::between(&snapshot, &boot.spec.env);
    debug!(
        "{}: env diff deleted={:?} added={:?} modified={:?}",
        boot.key(),
        diff.deleted,
        diff.added,
        diff.modified
    );

    for setting in settings {
        if let Some(env) = diff.deleted.iter().find(|e| e.name == setting.name) {
            bail!(
                "Boot's deleted Env [{}={}] not allowed with settings [{}={}]",
                env.name,
                env.value,
                setting.name,
                setting.value
            );
        }
        for (verb, changed) in [("added", &diff.added), ("edit", &diff.modified)] {
            if let Some(env) = changed.iter().find(|e| e.name == setting.name) {
                ensure!(
                    env.value == setting.value,
                    "Boot's {} Env [{}={}] not allowed with settings [{}={}]",
                    verb,
                    env.name,
                    env.value,
                    setting.name,
                    setting.value
                );
            }
        }
    }
    Ok(())
}

/// Three-way env difference between a snapshot and the incoming list.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct EnvDifference<'a> {
    /// Names in the snapshot but not in the incoming list (snapshot values)
    pub deleted: Vec<&'a EnvVar>,
    /// Names only in the incoming list
    pub added: Vec<&'a EnvVar>,
    /// Names in both with a different value (incoming values)
    pub modified: Vec<&'a EnvVar>,
}

impl<'a> EnvDifference<'a> {
    #[must_use]
    pub fn between(old: &'a [EnvVar], new: &'a [EnvVar]) -> Self {
        let mut diff = Self::default();
        for before in old {
            match new.iter().find(|e| e.name == before.name) {
                None => diff.deleted.push(before),
                Some(after) if after.value != before.value => diff.modified.push(after),
                Some(_) => {}
            }
        }
        diff.added = new
            .iter()
            .filter(|e| !old.iter().any(|before| before.name == e.name))
            .collect();
        diff
    }
}

/// Lower case alphanumerics and '-', starting and ending alphanumeric.
#[must_use]
pub fn is_dns1123_label(name: &str) -> bool {
    let alnum = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
    name.chars().all(|c| alnum(c) || c == '-')
        && name.chars().next().is_some_and(alnum)
        && name.chars().last().is_some_and(alnum)
}

/// Shape checks of one mount; returns the decoded claim name.
pub fn validate_pvc_mount(macros: &Macros<'_>, pvc: &PvcMount) -> Result<String> {
    let name = macros.decode(&pvc.name).0;
    ensure!(
        !name.is_empty() && name.len() <= DNS1123_LABEL_MAX,
        "the pvc name {} must be not empty and no more than 63 characters",
        name
    );
    ensure!(
        is_dns1123_label(&name),
        "the pvc {} is a DNS-1123 label. a DNS-1123 label must consist of lower case alphanumeric \
         characters or '-', and must start and end with an alphanumeric character \
         (e.g. 'my-name', or '123-abc')",
        name
    );
    ensure!(
        !pvc.mount_path.is_empty() && !pvc.mount_path.contains(':'),
        "the pvc MountPath must be not empty and not contain ':'"
    );
    Ok(name)
}

/// Every mounted claim must exist and be shared (read-only) or owned by the Boot.
pub async fn check_pvcs(client: &dyn BootClientTrait, ctx: &ResolvedContext, boot: &Boot) -> Result<()> {
    let macros = Macros::for_boot(boot, ctx.env());
    let owner_labels = pod_labels(boot);

    for pvc in &boot.spec.pvc {
        let name = validate_pvc_mount(&macros, pvc)?;
        let claim = match client.get_pvc(boot.namespace(), &name).await {
            Ok(claim) => claim,
            Err(e) if e.is_not_found() => {
                bail!("the pvc {} don't exist in namespace {}.", name, boot.namespace())
            }
            Err(e) => return Err(e).context(format!("Getting pvc {name}")),
        };
        let labels = claim.metadata.labels.unwrap_or_default();

        if labels.get(LABEL_SHARED).map(String::as_str) == Some("true") {
            ensure!(pvc.read_only, "the pvc {} is a shared pvc, should be readOnly", name);
            continue;
        }
        ensure!(
            labels == owner_labels,
            "the pvc {}'s label don't match the boot {}. the pvc {} also is not a shared pvc.",
            name,
            boot.name(),
            name
        );
    }
    Ok(())
}
