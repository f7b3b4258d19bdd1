//! Defaulting engine.
//!
//! Fills unset Boot fields from the resolved config and keeps the env and PVC
//! snapshot annotations current. Running it twice on its own output changes
//! nothing.

use crate::config::{AppSpec, BootConfig};
use crate::keys::{
    ANNOTATION_BOOT_DEPLOY_PVCS, ANNOTATION_BOOT_ENVS, ANNOTATION_BOOT_IMAGES,
    ANNOTATION_BOOT_PVCS, ANNOTATION_ENV, ENV_GENERATED,
};
use crate::merge::{MergeMode, merge_named};
use crate::quantity;
use crate::template::Macros;
use crate::workload::{app_image, pvc_volume_mounts};
use crds::{Boot, BootSpec, EnvVar, PvcMount};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::{info, warn};

const CPU: &str = "cpu";
const MEMORY: &str = "memory";

/// What a defaulting pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DefaultOutcome {
    /// The spec was modified
    pub spec_changed: bool,
    /// Only bookkeeping annotations were modified
    pub annotations_changed: bool,
}

impl DefaultOutcome {
    /// True when the Boot must be written back.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.spec_changed || self.annotations_changed
    }
}

/// State of the env snapshot relative to the current spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvState {
    /// No snapshot yet: first defaulting
    Fresh,
    /// Snapshot matches the spec env and the image is unchanged
    Stable,
    /// The spec env or the image moved since the snapshot
    Drifted,
}

/// Classifies the env snapshot of `boot` for `image`.
///
/// # Errors
///
/// Fails when the snapshot annotation is not a JSON env list.
pub fn env_state(boot: &Boot, image: &str) -> Result<EnvState, serde_json::Error> {
    let Some(raw) = boot.annotation(ANNOTATION_BOOT_ENVS).filter(|s| !s.is_empty()) else {
        return Ok(EnvState::Fresh);
    };
    let snapshot: Vec<EnvVar> = serde_json::from_str(raw)?;
    let image_unchanged = boot.annotation(ANNOTATION_BOOT_IMAGES) == Some(image);
    if snapshot == boot.spec.env && image_unchanged {
        Ok(EnvState::Stable)
    } else {
        Ok(EnvState::Drifted)
    }
}

/// Runs every defaulting step on `boot`.
pub fn default_boot(boot: &mut Boot, cfg: &BootConfig, env: &str) -> DefaultOutcome {
    let key = boot.key();
    let app = &cfg.app;

    let scalars_changed = default_scalars(&mut boot.spec, app, &key);
    let env_outcome = default_env(boot, app, env);
    let pvc_changed = default_pvc(boot, app, env);

    DefaultOutcome {
        spec_changed: scalars_changed || env_outcome.spec_changed,
        annotations_changed: env_outcome.annotations_changed || pvc_changed,
    }
}

/// Scalar, resource and node selector defaults.
pub fn default_scalars(spec: &mut BootSpec, app: &AppSpec, key: &str) -> bool {
    let mut changed = false;

    if spec.port <= 0 && app.port > 0 {
        info!("Defaulting {} port: {} -> {}", key, spec.port, app.port);
        spec.port = app.port;
        changed = true;
    }

    if spec.replicas.is_none_or(|r| r < 0) {
        let replicas = if app.replicas <= 0 { 1 } else { app.replicas };
        info!("Defaulting {} replicas: {:?} -> {}", key, spec.replicas, replicas);
        spec.replicas = Some(replicas);
        changed = true;
    }

    if spec.health.is_none() && !app.health.is_empty() {
        info!("Defaulting {} health: {}", key, app.health);
        spec.health = Some(app.health.clone());
        changed = true;
    }

    if spec.prometheus.is_empty() {
        if let Some(scrape) = app.settings().prometheus_scrape {
            spec.prometheus = scrape.to_string();
            changed = true;
        }
    }

    changed |= default_resource_list(&mut spec.resources.limits, &app.resources.limits, key, "limits");
    changed |= default_resource_list(&mut spec.resources.requests, &app.resources.requests, key, "requests");
    changed |= clamp_request(spec, CPU, key);
    changed |= clamp_request(spec, MEMORY, key);

    if spec.sub_domain.is_empty() && !app.sub_domain.is_empty() {
        spec.sub_domain.clone_from(&app.sub_domain);
        changed = true;
    }

    if spec.node_selector.is_empty() {
        if !app.node_selector.is_empty() {
            info!("Defaulting {} nodeSelector: {:?}", key, app.node_selector);
            spec.node_selector.clone_from(&app.node_selector);
            changed = true;
        }
    } else {
        // operator keys win over the Boot's values
        let mut merged = false;
        for (k, v) in &app.node_selector {
            if spec.node_selector.get(k) != Some(v) {
                spec.node_selector.insert(k.clone(), v.clone());
                merged = true;
            }
        }
        if merged {
            info!("Defaulting {} nodeSelector to {:?}", key, spec.node_selector);
            changed = true;
        }
    }

    changed
}

fn default_resource_list(
    spec: &mut BTreeMap<String, String>,
    config: &BTreeMap<String, String>,
    key: &str,
    what: &str,
) -> bool {
    if config.is_empty() {
        return false;
    }
    if spec.is_empty() {
        info!("Defaulting {} resources.{}: {:?}", key, what, config);
        spec.clone_from(config);
        return true;
    }

    let mut changed = false;
    for resource in [MEMORY, CPU] {
        if quantity::is_zero(spec.get(resource)) {
            if let Some(value) = config.get(resource).filter(|v| !quantity::is_zero(Some(v))) {
                info!("Defaulting {} resources.{}.{}: {}", key, what, resource, value);
                spec.insert(resource.to_string(), value.clone());
                changed = true;
            }
        }
    }
    changed
}

fn clamp_request(spec: &mut BootSpec, resource: &str, key: &str) -> bool {
    let Some(limit) = spec.resources.limits.get(resource).cloned() else {
        return false;
    };
    if quantity::is_zero(Some(&limit)) {
        return false;
    }
    match spec.resources.requests.get(resource) {
        Some(request) if quantity::compare(request, &limit) == Ordering::Greater => {
            info!("Clamping {} requests.{}: {} -> {}", key, resource, request, limit);
            spec.resources.requests.insert(resource.to_string(), limit);
            true
        }
        _ => false,
    }
}

/// Env defaulting driven by [`EnvState`].
pub fn default_env(boot: &mut Boot, app: &AppSpec, env: &str) -> DefaultOutcome {
    let key = boot.key();
    let image = app_image(boot, app);

    let state = match env_state(boot, &image) {
        Ok(state) => state,
        Err(e) => {
            warn!("Decoding env snapshot of {} failed, skipping env defaulting: {}", key, e);
            return DefaultOutcome::default();
        }
    };
    if state == EnvState::Stable {
        return DefaultOutcome::default();
    }

    let name = boot.name().to_string();
    let macros = Macros {
        app: &name,
        env,
        port: boot.spec.port,
    };

    let mut annotations_changed = false;
    {
        let annotations = boot.annotations_mut();
        annotations_changed |= set_annotation(annotations, ANNOTATION_ENV, ENV_GENERATED);
        annotations_changed |= set_annotation(annotations, ANNOTATION_BOOT_IMAGES, &image);
    }

    let before = boot.spec.env.clone();
    let mut config_env = app.env.clone();
    macros.decode_envs(&mut config_env);
    let _ = merge_named(&mut boot.spec.env, &config_env, MergeMode::Override).log_failure("env", &key);
    macros.decode_envs(&mut boot.spec.env);
    let spec_changed = boot.spec.env != before;

    info!("Env defaulting for {} ({:?}): spec changed = {}", key, state, spec_changed);

    match serde_json::to_string(&boot.spec.env) {
        Ok(snapshot) => {
            annotations_changed |= set_annotation(boot.annotations_mut(), ANNOTATION_BOOT_ENVS, &snapshot);
        }
        Err(e) => warn!("Encoding env snapshot of {} failed: {}", key, e),
    }

    DefaultOutcome {
        spec_changed,
        annotations_changed,
    }
}

/// PVC snapshot annotations. Returns whether an annotation changed.
pub fn default_pvc(boot: &mut Boot, app: &AppSpec, env: &str) -> bool {
    let key = boot.key();
    if let Some(raw) = boot.annotation(ANNOTATION_BOOT_PVCS).filter(|s| !s.is_empty()) {
        match serde_json::from_str::<Vec<PvcMount>>(raw) {
            Ok(previous) if previous == boot.spec.pvc => return false,
            Ok(_) => {}
            Err(e) => {
                warn!("Decoding pvc snapshot of {} failed: {}", key, e);
                return false;
            }
        }
    }

    let pvcs = if boot.spec.pvc.is_empty() {
        String::new()
    } else {
        serde_json::to_string(&boot.spec.pvc).unwrap_or_default()
    };

    let mut mounts = app.container_volume_mounts();
    mounts.extend(pvc_volume_mounts(&boot.spec.pvc));
    let deploy_pvcs = if mounts.is_empty() {
        String::new()
    } else {
        Macros::for_boot(boot, env).decode_volume_mounts(&mut mounts);
        serde_json::to_string(&mounts).unwrap_or_default()
    };

    let annotations = boot.annotations_mut();
    let a = set_annotation(annotations, ANNOTATION_BOOT_PVCS, &pvcs);
    let b = set_annotation(annotations, ANNOTATION_BOOT_DEPLOY_PVCS, &deploy_pvcs);
    a || b
}

/// Sets one annotation; returns whether the value changed.
pub fn set_annotation(annotations: &mut BTreeMap<String, String>, key: &str, value: &str) -> bool {
    if annotations.get(key).map(String::as_str) == Some(value) {
        return false;
    }
    annotations.insert(key.to_string(), value.to_string());
    true
}
