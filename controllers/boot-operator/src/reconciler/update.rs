//! Diff-and-update of the Deployment and the primary Service.
//!
//! Deployment drift is either a reboot (the whole spec is rebuilt, pods roll)
//! or an in-place patch (replicas, owner reference). Services are only ever
//! patched.

use super::{Reconciler, TickOutcome};
use crate::config::BootConfig;
use crate::error::ControllerError;
use crate::events;
use crate::keys::{LABEL_SHARED, PROMETHEUS_PATH, PROMETHEUS_PORT, PROMETHEUS_SCHEME, PROMETHEUS_SCRAPE, reason};
use crate::metrics::{stage, sub_stage};
use crate::quantity;
use crate::workload::{APP_CONTAINER, SESSION_AFFINITY_NONE, WorkloadBuilder, pod_labels};
use boot_client::ClientError;
use crds::Boot;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Container, PodSpec, Probe, Service};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::BTreeMap;
use tracing::{debug, info};

const PROMETHEUS_KEYS: [&str; 4] = [PROMETHEUS_PATH, PROMETHEUS_PORT, PROMETHEUS_SCHEME, PROMETHEUS_SCRAPE];

/// Differences between a live Deployment and the desired one.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeploymentDrift {
    /// Fields whose change requires a rebuilt pod template
    pub reboot: Vec<&'static str>,
    /// Replica count differs
    pub replicas: bool,
    /// Owner reference missing
    pub owner: bool,
    /// Volume mounts (by name) that differ
    pub changed_mounts: Vec<String>,
}

impl DeploymentDrift {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reboot.is_empty() && !self.replicas && !self.owner && self.changed_mounts.is_empty()
    }
}

fn pod_spec(deployment: &Deployment) -> Option<&PodSpec> {
    deployment.spec.as_ref()?.template.spec.as_ref()
}

fn app_container(deployment: &Deployment) -> Option<&Container> {
    let containers = &pod_spec(deployment)?.containers;
    containers
        .iter()
        .find(|c| c.name == APP_CONTAINER)
        .or_else(|| containers.first())
}

fn env_pairs(container: &Container) -> Vec<(&str, &str)> {
    container
        .env
        .iter()
        .flatten()
        .map(|e| (e.name.as_str(), e.value.as_deref().unwrap_or_default()))
        .collect()
}

fn port_pairs(container: &Container) -> Vec<(Option<&str>, i32)> {
    container
        .ports
        .iter()
        .flatten()
        .map(|p| (p.name.as_deref(), p.container_port))
        .collect()
}

fn quantities(list: Option<&BTreeMap<String, Quantity>>) -> BTreeMap<String, String> {
    list.map(|l| l.iter().map(|(k, v)| (k.clone(), v.0.clone())).collect())
        .unwrap_or_default()
}

fn resources_equal(live: &Container, desired: &Container) -> bool {
    let limits = |c: &Container| quantities(c.resources.as_ref().and_then(|r| r.limits.as_ref()));
    let requests = |c: &Container| quantities(c.resources.as_ref().and_then(|r| r.requests.as_ref()));
    quantity::lists_equal(&limits(live), &limits(desired))
        && quantity::lists_equal(&requests(live), &requests(desired))
}

fn probe_path(probe: Option<&Probe>) -> Option<&str> {
    probe?.http_get.as_ref()?.path.as_deref()
}

fn mounts(container: &Container) -> BTreeMap<&str, (&str, bool)> {
    container
        .volume_mounts
        .iter()
        .flatten()
        .map(|m| (m.name.as_str(), (m.mount_path.as_str(), m.read_only.unwrap_or(false))))
        .collect()
}

/// Compares the fields the operator manages.
#[must_use]
pub fn deployment_drift(live: &Deployment, desired: &Deployment) -> DeploymentDrift {
    let mut drift = DeploymentDrift {
        replicas: live.spec.as_ref().and_then(|s| s.replicas)
            != desired.spec.as_ref().and_then(|s| s.replicas),
        owner: live
            .metadata
            .owner_references
            .as_ref()
            .is_none_or(Vec::is_empty),
        ..Default::default()
    };

    let (Some(live_app), Some(desired_app)) = (app_container(live), app_container(desired)) else {
        drift.reboot.push("container");
        return drift;
    };

    if live_app.image != desired_app.image {
        drift.reboot.push("image");
    }
    if env_pairs(live_app) != env_pairs(desired_app) {
        drift.reboot.push("env");
    }
    if port_pairs(live_app) != port_pairs(desired_app) {
        drift.reboot.push("ports");
    }
    if !resources_equal(live_app, desired_app) {
        drift.reboot.push("resources");
    }
    if probe_path(live_app.liveness_probe.as_ref()) != probe_path(desired_app.liveness_probe.as_ref())
        || probe_path(live_app.readiness_probe.as_ref())
            != probe_path(desired_app.readiness_probe.as_ref())
    {
        drift.reboot.push("health");
    }
    let selector = |d: &Deployment| {
        pod_spec(d)
            .and_then(|p| p.node_selector.clone())
            .unwrap_or_default()
    };
    if selector(live) != selector(desired) {
        drift.reboot.push("nodeSelector");
    }
    if live_app.command.clone().unwrap_or_default() != desired_app.command.clone().unwrap_or_default() {
        drift.reboot.push("command");
    }

    let (live_mounts, desired_mounts) = (mounts(live_app), mounts(desired_app));
    let mut changed: Vec<String> = live_mounts
        .iter()
        .filter(|&(name, m)| desired_mounts.get(name) != Some(m))
        .map(|(name, _)| (*name).to_string())
        .collect();
    changed.extend(
        desired_mounts
            .keys()
            .filter(|name| !live_mounts.contains_key(*name))
            .map(|name| (*name).to_string()),
    );
    drift.changed_mounts = changed;

    drift
}

/// Patches the operator-managed fields of a Service; returns whether anything
/// changed.
pub fn patch_service(live: &mut Service, desired: &Service) -> bool {
    let mut changed = false;

    if live.metadata.owner_references.as_ref().is_none_or(Vec::is_empty) {
        live.metadata.owner_references.clone_from(&desired.metadata.owner_references);
        changed = true;
    }

    let desired_spec = desired.spec.clone().unwrap_or_default();
    let spec = live.spec.get_or_insert_with(Default::default);

    if let Some(desired_port) = desired_spec.ports.as_ref().and_then(|p| p.first()) {
        let ports = spec.ports.get_or_insert_with(Vec::new);
        if let Some(port) = ports.first_mut() {
            if port.port != desired_port.port
                || port.target_port != desired_port.target_port
                || port.name != desired_port.name
            {
                port.port = desired_port.port;
                port.target_port.clone_from(&desired_port.target_port);
                port.name.clone_from(&desired_port.name);
                changed = true;
            }
        } else {
            ports.push(desired_port.clone());
            changed = true;
        }
    }

    let normalize = |a: Option<&str>| match a {
        None | Some("") => SESSION_AFFINITY_NONE.to_string(),
        Some(a) => a.to_string(),
    };
    let desired_affinity = normalize(desired_spec.session_affinity.as_deref());
    if normalize(spec.session_affinity.as_deref()) != desired_affinity {
        spec.session_affinity = Some(desired_affinity);
        changed = true;
    }

    // scrape annotations are present exactly when scraping is allowed
    let wanted = desired.metadata.annotations.clone().unwrap_or_default();
    let annotations = live.metadata.annotations.get_or_insert_with(BTreeMap::new);
    for key in PROMETHEUS_KEYS {
        match wanted.get(key) {
            Some(value) if annotations.get(key) != Some(value) => {
                annotations.insert(key.to_string(), value.clone());
                changed = true;
            }
            None if annotations.remove(key).is_some() => changed = true,
            _ => {}
        }
    }

    changed
}

impl Reconciler {
    /// Brings the live Deployment and primary Service in line with the Boot.
    pub(crate) async fn reconcile_update(
        &self,
        boot: &Boot,
        cfg: &BootConfig,
        env: &str,
    ) -> Result<TickOutcome, ControllerError> {
        let builder = WorkloadBuilder::new(boot, cfg, env);
        let client = self.client.as_ref();
        let (namespace, name) = (boot.namespace(), boot.name());

        let deployment = match client.get_deployment(namespace, name).await {
            Ok(deployment) => deployment,
            Err(e) if e.is_not_found() => return Ok(TickOutcome::Requeue),
            Err(e) => {
                self.record_error(boot, stage::UPDATE, sub_stage::GET_DEPLOYMENT);
                events::record(
                    client,
                    boot,
                    reason::FAILED_GET_DEPLOYMENT,
                    &format!("Failed to get Deployment {name}"),
                    Some(&e),
                )
                .await;
                return self.client_failure(boot, e);
            }
        };
        let deployment_updated = match self.update_deployment(boot, &builder, deployment).await {
            Ok(updated) => updated,
            Err(e) => return self.client_failure(boot, e),
        };

        let service = match client.get_service(namespace, name).await {
            Ok(service) => service,
            Err(e) if e.is_not_found() => return Ok(TickOutcome::Requeue),
            Err(e) => {
                self.record_error(boot, stage::UPDATE, sub_stage::GET_SERVICE);
                events::record(
                    client,
                    boot,
                    reason::FAILED_GET_SERVICE,
                    &format!("Failed to get Service {name}"),
                    Some(&e),
                )
                .await;
                return self.client_failure(boot, e);
            }
        };
        let service_updated = match self
            .update_service(boot, service, &builder.primary_service(), sub_stage::UPDATE_SERVICE)
            .await
        {
            Ok(updated) => updated,
            Err(e) => return self.client_failure(boot, e),
        };

        Ok(TickOutcome::from_requeue(deployment_updated || service_updated))
    }

    /// Classifies drift and writes the Deployment when needed.
    async fn update_deployment(
        &self,
        boot: &Boot,
        builder: &WorkloadBuilder<'_>,
        live: Deployment,
    ) -> Result<bool, ClientError> {
        let desired = builder.deployment();
        let drift = deployment_drift(&live, &desired);
        if drift.is_empty() {
            return Ok(false);
        }

        let mut reboot = drift.reboot.clone();
        if !drift.changed_mounts.is_empty() && self.mounts_need_reboot(boot, &drift.changed_mounts).await {
            reboot.push("volumeMounts");
        }
        if reboot.is_empty() && !drift.replicas && !drift.owner {
            debug!("{}: mount drift on foreign claims ignored: {:?}", boot.key(), drift.changed_mounts);
            return Ok(false);
        }

        let mut updated = live;
        let message = if reboot.is_empty() {
            if drift.replicas {
                if let Some(spec) = updated.spec.as_mut() {
                    spec.replicas = boot.spec.replicas;
                }
            }
            format!("Updated Deployment {} (replicas: {}, owner: {})", boot.name(), drift.replicas, drift.owner)
        } else {
            updated.spec = desired.spec.clone();
            format!("Updated Deployment {}, reboot on {}", boot.name(), reboot.join(", "))
        };
        if drift.owner {
            updated.metadata.owner_references.clone_from(&desired.metadata.owner_references);
        }

        let client = self.client.as_ref();
        match client.replace_deployment(&updated).await {
            Ok(_) => {
                info!("{}: {}", boot.key(), message);
                events::record(client, boot, reason::UPDATED_DEPLOYMENT, &message, None).await;
                Ok(true)
            }
            Err(e) => {
                self.record_error(boot, stage::UPDATE, sub_stage::UPDATE_DEPLOYMENT);
                events::record(
                    client,
                    boot,
                    reason::FAILED_UPDATE_DEPLOYMENT,
                    &format!("Failed to update Deployment {}", boot.name()),
                    Some(&e),
                )
                .await;
                Err(e)
            }
        }
    }

    /// A mount change reboots only when it is backed by a shared claim or a
    /// claim owned by this Boot.
    async fn mounts_need_reboot(&self, boot: &Boot, names: &[String]) -> bool {
        let owner_labels = pod_labels(boot);
        for name in names {
            match self.client.get_pvc(boot.namespace(), name).await {
                Ok(pvc) => {
                    let labels = pvc.metadata.labels.unwrap_or_default();
                    if labels.get(LABEL_SHARED).map(String::as_str) == Some("true") || labels == owner_labels {
                        return true;
                    }
                }
                Err(e) => debug!("{}: claim {} not usable: {}", boot.key(), name, e),
            }
        }
        false
    }

    /// Patches one Service towards `desired` and writes it when it changed.
    pub(crate) async fn update_service(
        &self,
        boot: &Boot,
        mut live: Service,
        desired: &Service,
        metric_sub_stage: &str,
    ) -> Result<bool, ClientError> {
        if !patch_service(&mut live, desired) {
            return Ok(false);
        }
        let name = live.metadata.name.clone().unwrap_or_default();
        let client = self.client.as_ref();
        match client.replace_service(&live).await {
            Ok(_) => {
                info!("{}: updated Service {}", boot.key(), name);
                events::record(client, boot, reason::UPDATED_SERVICE, &format!("Updated Service {name}"), None)
                    .await;
                Ok(true)
            }
            Err(e) => {
                self.record_error(boot, stage::UPDATE, metric_sub_stage);
                events::record(
                    client,
                    boot,
                    reason::FAILED_UPDATE_SERVICE,
                    &format!("Failed to update Service {name}"),
                    Some(&e),
                )
                .await;
                Err(e)
            }
        }
    }
}
