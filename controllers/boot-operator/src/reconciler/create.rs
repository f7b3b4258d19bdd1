//! Create-if-missing for the Deployment and the primary Service.

use super::{Reconciler, TickOutcome};
use crate::config::BootConfig;
use crate::error::ControllerError;
use crate::events;
use crate::keys::reason;
use crate::metrics::{stage, sub_stage};
use crate::workload::WorkloadBuilder;
use crds::Boot;
use tracing::info;

impl Reconciler {
    /// Creates the Deployment and the primary Service when missing. Any
    /// creation requeues.
    pub(crate) async fn reconcile_create(
        &self,
        boot: &Boot,
        cfg: &BootConfig,
        env: &str,
    ) -> Result<TickOutcome, ControllerError> {
        let builder = WorkloadBuilder::new(boot, cfg, env);
        let client = self.client.as_ref();
        let (namespace, name) = (boot.namespace(), boot.name());
        let mut created = false;

        match client.get_deployment(namespace, name).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                let deployment = builder.deployment();
                match client.create_deployment(&deployment).await {
                    Ok(_) => {
                        info!("{}: created Deployment {}/{}", boot.key(), namespace, name);
                        events::record(
                            client,
                            boot,
                            reason::CREATED_DEPLOYMENT,
                            &format!("Created Deployment {name}"),
                            None,
                        )
                        .await;
                        created = true;
                    }
                    Err(e) => {
                        self.record_error(boot, stage::CREATE, sub_stage::CREATE_DEPLOYMENT);
                        events::record(
                            client,
                            boot,
                            reason::FAILED_CREATE_DEPLOYMENT,
                            &format!("Failed to create Deployment {name}"),
                            Some(&e),
                        )
                        .await;
                        return self.client_failure(boot, e);
                    }
                }
            }
            Err(e) => {
                self.record_error(boot, stage::CREATE, sub_stage::GET_DEPLOYMENT);
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
        }

        match client.get_service(namespace, name).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                let service = builder.primary_service();
                match client.create_service(&service).await {
                    Ok(_) => {
                        info!("{}: created Service {}/{}", boot.key(), namespace, name);
                        events::record(
                            client,
                            boot,
                            reason::CREATED_SERVICE,
                            &format!("Created Service {name}"),
                            None,
                        )
                        .await;
                        created = true;
                    }
                    Err(e) => {
                        self.record_error(boot, stage::CREATE, sub_stage::CREATE_SERVICE);
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
            Err(e) => {
                self.record_error(boot, stage::CREATE, sub_stage::GET_SERVICE);
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
        }

        Ok(TickOutcome::from_requeue(created))
    }
}
