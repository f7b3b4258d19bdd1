//! Revision recording and the revision owner controller.

use super::{Reconciler, TickOutcome};
use crate::error::ControllerError;
use crate::keys::{ANNOTATION_REVISION_RETRY, LABEL_BOOT_NAME, LABEL_BOOT_TYPE};
use crate::revision::{self, MAX_ORPHAN_RETRIES};
use crate::workload::pod_labels;
use boot_client::ClientError;
use crds::{Boot, BootKind, BootSpec};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

impl Reconciler {
    /// Records a revision for the Boot's current spec. Failures are logged and
    /// do not stop the tick.
    pub(crate) async fn record_revision(&self, boot: &Boot) {
        if let Err(e) = self.try_record_revision(boot).await {
            warn!("{}: recording revision failed: {}", boot.key(), e);
        }
    }

    async fn try_record_revision(&self, boot: &Boot) -> Result<(), ClientError> {
        let namespace = boot.namespace();
        let existing = self.client.list_revisions(namespace, &pod_labels(boot)).await?;
        let Some(plan) = revision::plan(
            boot,
            &existing,
            &self.settings.biz_envs,
            self.settings.max_history,
        )?
        else {
            return Ok(());
        };

        if let Some(previous) = &plan.supersede {
            self.client.replace_revision(previous).await?;
        }
        let created = self.client.create_revision(&plan.create).await?;
        info!(
            "{}: recorded revision {}",
            boot.key(),
            created.metadata.name.as_deref().unwrap_or_default()
        );

        for name in &plan.prune {
            match self.client.delete_revision(namespace, name).await {
                Ok(()) => debug!("{}: pruned revision {}", boot.key(), name),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Deletes every revision of a deleted Boot.
    pub(crate) async fn delete_revisions(&self, kind: BootKind, namespace: &str, name: &str) {
        let labels = pod_labels(&Boot::new(kind, name, namespace, BootSpec::default()));
        let revisions = match self.client.list_revisions(namespace, &labels).await {
            Ok(revisions) => revisions,
            Err(e) => {
                warn!("Listing revisions of {} {}/{} failed: {}", kind, namespace, name, e);
                return;
            }
        };
        for rev in revisions {
            let rev_name = rev.metadata.name.unwrap_or_default();
            match self.client.delete_revision(namespace, &rev_name).await {
                Ok(()) => debug!("Deleted revision {}/{}", namespace, rev_name),
                Err(e) if e.is_not_found() => {}
                Err(e) => warn!("Deleting revision {}/{} failed: {}", namespace, rev_name, e),
            }
        }
    }

    /// Owner controller tick for one BootRevision: adopts it when its Boot
    /// exists, otherwise counts retries and deletes it past the limit.
    pub async fn reconcile_revision(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<TickOutcome, ControllerError> {
        let mut rev = match self.client.get_revision(namespace, name).await {
            Ok(rev) => rev,
            Err(e) if e.is_not_found() => return Ok(TickOutcome::Done),
            Err(e) => return Err(e.into()),
        };
        if rev.metadata.owner_references.as_ref().is_some_and(|o| !o.is_empty()) {
            return Ok(TickOutcome::Done);
        }

        let labels = rev.metadata.labels.clone().unwrap_or_default();
        let owner = labels
            .get(LABEL_BOOT_TYPE)
            .and_then(|t| BootKind::from_key(t))
            .zip(labels.get(LABEL_BOOT_NAME));

        let boot = match owner {
            Some((kind, boot_name)) => match self.client.get_boot(kind, namespace, boot_name).await {
                Ok(boot) => Some(boot),
                Err(e) if e.is_not_found() => None,
                Err(e) if e.is_retryable() => return Ok(TickOutcome::Requeue),
                Err(e) => return Err(e.into()),
            },
            None => None,
        };

        if let Some(boot) = boot {
            rev.metadata.owner_references = Some(vec![boot.owner_reference()]);
            return match self.client.replace_revision(&rev).await {
                Ok(_) => {
                    info!("Revision {}/{} adopted by {}", namespace, name, boot.key());
                    Ok(TickOutcome::Done)
                }
                Err(e) if e.is_retryable() => Ok(TickOutcome::Requeue),
                Err(e) => Err(e.into()),
            };
        }

        let retry = revision::retry_count(&rev);
        if retry > MAX_ORPHAN_RETRIES {
            info!("Revision {}/{} has no Boot after {} attempts, deleting", namespace, name, retry);
            return match self.client.delete_revision(namespace, name).await {
                Ok(()) => Ok(TickOutcome::Done),
                Err(e) if e.is_not_found() => Ok(TickOutcome::Done),
                Err(e) => Err(e.into()),
            };
        }

        rev.metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(ANNOTATION_REVISION_RETRY.to_string(), (retry + 1).to_string());
        match self.client.replace_revision(&rev).await {
            Ok(_) => {
                debug!("Revision {}/{} owner not found, retry {}", namespace, name, retry + 1);
                Ok(TickOutcome::Requeue)
            }
            Err(e) if e.is_retryable() => Ok(TickOutcome::Requeue),
            Err(e) => Err(e.into()),
        }
    }
}
