//! Status and annotation refresh, plus the latest revision's phase.

use super::{Reconciler, TickOutcome};
use crate::defaulter::set_annotation;
use crate::error::ControllerError;
use crate::events;
use crate::keys::{
    ANNOTATION_AVAILABLE, ANNOTATION_DEPLOY, ANNOTATION_DESIRED, ANNOTATION_REVISION,
    ANNOTATION_SERVICES, ANNOTATION_TYPE, WORKLOAD_TYPE_DEPLOY, reason,
};
use crate::metrics::{stage, sub_stage};
use crate::revision::{self, RevisionPhase};
use crate::workload::{pod_labels, service_labels};
use crds::{Boot, BootStatus};
use tracing::{info, warn};

/// Observed counts used by the meta step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observed {
    /// Pods matching the Boot's pod labels
    pub running: i32,
    /// Desired replicas from the spec
    pub desired: i32,
    /// Available replicas reported by the Deployment
    pub available: i32,
}

impl Observed {
    /// Phase of the latest revision for these counts.
    #[must_use]
    pub fn revision_phase(&self) -> RevisionPhase {
        if self.running == self.desired && self.desired == self.available {
            RevisionPhase::Active
        } else {
            RevisionPhase::Running
        }
    }
}

impl Reconciler {
    /// Refreshes meta annotations, status and revision phase. Ends the tick.
    pub(crate) async fn reconcile_meta(
        &self,
        boot: &Boot,
        env: &str,
    ) -> Result<TickOutcome, ControllerError> {
        let client = self.client.as_ref();
        let (namespace, name) = (boot.namespace(), boot.name());

        let deployment = match client.get_deployment(namespace, name).await {
            Ok(deployment) => deployment,
            Err(e) => {
                self.record_error(boot, stage::UPDATE_BOOT_META, sub_stage::GET_DEPLOYMENT);
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
        let services = match client.list_services(namespace, &service_labels(boot, env)).await {
            Ok(services) => services,
            Err(e) => {
                self.record_error(boot, stage::UPDATE_BOOT_META, sub_stage::LIST_SERVICE);
                return self.client_failure(boot, e);
            }
        };
        let pods = match client.list_pods(namespace, &pod_labels(boot)).await {
            Ok(pods) => pods,
            Err(e) => {
                self.record_error(boot, stage::UPDATE_BOOT_META, sub_stage::LIST_PODS);
                return self.client_failure(boot, e);
            }
        };

        let observed = Observed {
            running: i32::try_from(pods.len()).unwrap_or(i32::MAX),
            desired: boot.spec.replicas.unwrap_or_default(),
            available: deployment
                .status
                .as_ref()
                .and_then(|s| s.available_replicas)
                .unwrap_or_default(),
        };

        let latest_revision = self.refresh_revision_phase(boot, observed).await;

        let mut service_names: Vec<&str> = services
            .iter()
            .filter_map(|s| s.metadata.name.as_deref())
            .collect();
        service_names.sort_unstable();
        let service_names = service_names.join(",");

        let mut updated = boot.clone();
        let mut changed = false;
        {
            let annotations = updated.annotations_mut();
            changed |= set_annotation(annotations, ANNOTATION_DEPLOY, name);
            changed |= set_annotation(annotations, ANNOTATION_TYPE, WORKLOAD_TYPE_DEPLOY);
            changed |= set_annotation(annotations, ANNOTATION_SERVICES, &service_names);
            changed |= set_annotation(annotations, ANNOTATION_AVAILABLE, &observed.running.to_string());
            changed |= set_annotation(annotations, ANNOTATION_DESIRED, &observed.desired.to_string());
            if let Some(id) = latest_revision {
                changed |= set_annotation(annotations, ANNOTATION_REVISION, &id.to_string());
            }
        }

        if changed {
            updated = match client.replace_boot(&updated).await {
                Ok(stored) => {
                    info!("{}: updated meta ({} of {} running)", boot.key(), observed.running, observed.desired);
                    events::record(client, boot, reason::UPDATED_BOOT_META, "Updated Boot meta", None).await;
                    stored
                }
                Err(e) => {
                    self.record_error(boot, stage::UPDATE_BOOT_META, sub_stage::UPDATE_BOOT_META);
                    events::record(
                        client,
                        boot,
                        reason::FAILED_UPDATE_BOOT_META,
                        "Failed to update Boot meta",
                        Some(&e),
                    )
                    .await;
                    return self.client_failure(boot, e);
                }
            };
        }

        let status = BootStatus {
            r#type: WORKLOAD_TYPE_DEPLOY.to_string(),
            deploy: name.to_string(),
            services: service_names,
        };
        if updated.status.as_ref() != Some(&status) {
            if let Err(e) = client.patch_boot_status(&updated, &status).await {
                self.record_error(boot, stage::UPDATE_BOOT_META, sub_stage::UPDATE_BOOT_META);
                events::record(
                    client,
                    boot,
                    reason::FAILED_UPDATE_BOOT_META,
                    "Failed to update Boot status",
                    Some(&e),
                )
                .await;
                return self.client_failure(boot, e);
            }
        }

        Ok(TickOutcome::Done)
    }

    /// Moves the latest revision between Running and Active. Returns its id.
    async fn refresh_revision_phase(&self, boot: &Boot, observed: Observed) -> Option<u64> {
        let revisions = match self.client.list_revisions(boot.namespace(), &pod_labels(boot)).await {
            Ok(revisions) => revisions,
            Err(e) => {
                warn!("{}: listing revisions failed: {}", boot.key(), e);
                return None;
            }
        };
        let mut latest = revision::latest(&revisions)?.clone();
        let id = revision::revision_id(&latest);

        if revision::set_phase(&mut latest, observed.revision_phase()) {
            if let Err(e) = self.client.replace_revision(&latest).await {
                warn!("{}: updating revision phase failed: {}", boot.key(), e);
                events::record(
                    self.client.as_ref(),
                    boot,
                    reason::FAILED_UPDATE_BOOT_META,
                    "Failed to update revision phase",
                    Some(&e),
                )
                .await;
            }
        }
        id
    }
}
