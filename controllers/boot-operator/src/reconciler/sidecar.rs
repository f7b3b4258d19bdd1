//! Secondary Service set: sidecar Services and the dev NodePort Service.

use super::{Reconciler, TickOutcome};
use crate::config::BootConfig;
use crate::error::ControllerError;
use crate::events;
use crate::keys::reason;
use crate::metrics::{stage, sub_stage};
use crate::workload::{WorkloadBuilder, service_labels};
use crds::Boot;
use k8s_openapi::api::core::v1::Service;
use std::collections::BTreeMap;
use tracing::info;

fn service_name(service: &Service) -> &str {
    service.metadata.name.as_deref().unwrap_or_default()
}

impl Reconciler {
    /// Deletes unwanted, patches drifted and creates missing secondary Services.
    pub(crate) async fn reconcile_sidecar_services(
        &self,
        boot: &Boot,
        cfg: &BootConfig,
        env: &str,
    ) -> Result<TickOutcome, ControllerError> {
        let client = self.client.as_ref();
        let namespace = boot.namespace();

        let live = match client.list_services(namespace, &service_labels(boot, env)).await {
            Ok(services) => services,
            Err(e) => {
                self.record_error(boot, stage::UPDATE, sub_stage::LIST_SERVICE);
                events::record(client, boot, reason::FAILED_GET_SERVICE, "Failed to list Services", Some(&e))
                    .await;
                return self.client_failure(boot, e);
            }
        };
        let mut live: BTreeMap<String, Service> = live
            .into_iter()
            .filter(|s| service_name(s) != boot.name())
            .map(|s| (service_name(&s).to_string(), s))
            .collect();

        let desired = WorkloadBuilder::new(boot, cfg, env).secondary_services();
        let mut changed = false;

        let unwanted: Vec<String> = live
            .keys()
            .filter(|name| !desired.iter().any(|d| service_name(d) == name.as_str()))
            .cloned()
            .collect();
        for name in unwanted {
            live.remove(&name);
            match client.delete_service(namespace, &name).await {
                Ok(()) => {
                    info!("{}: deleted Service {}", boot.key(), name);
                    events::record(client, boot, reason::DELETED_SERVICE, &format!("Deleted Service {name}"), None)
                        .await;
                    changed = true;
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    self.record_error(boot, stage::UPDATE, sub_stage::DELETE_OTHER_SERVICE);
                    events::record(
                        client,
                        boot,
                        reason::FAILED_DELETE_SERVICE,
                        &format!("Failed to delete Service {name}"),
                        Some(&e),
                    )
                    .await;
                    return self.client_failure(boot, e);
                }
            }
        }

        for service in &desired {
            let name = service_name(service);
            if let Some(existing) = live.remove(name) {
                match self
                    .update_service(boot, existing, service, sub_stage::UPDATE_OTHER_SERVICE)
                    .await
                {
                    Ok(updated) => changed |= updated,
                    Err(e) => return self.client_failure(boot, e),
                }
                continue;
            }

            match client.create_service(service).await {
                Ok(_) => {
                    info!("{}: created Service {}", boot.key(), name);
                    events::record(client, boot, reason::CREATED_SERVICE, &format!("Created Service {name}"), None)
                        .await;
                    changed = true;
                }
                Err(e) => {
                    self.record_error(boot, stage::UPDATE, sub_stage::CREATE_OTHER_SERVICE);
                    events::record(
                        client,
                        boot,
                        reason::FAILED_CREATE_SERVICE,
                        &format!("Failed to create Service {name}"),
                        Some(&e),
                    )
                    .await;
                    return self.client_failure(boot, e);
                }
            }
        }

        Ok(TickOutcome::from_requeue(changed))
    }
}
