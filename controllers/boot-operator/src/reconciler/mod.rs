//! Reconciliation of Boots.
//!
//! One tick runs the steps below in order; any step may end the tick early
//! with [`TickOutcome::Requeue`]:
//! - namespace gate and fetch
//! - defaulting (persisted, then requeue)
//! - revision recording
//! - `create`: Deployment and primary Service
//! - `update`: reboot / in-place patch of the Deployment, primary Service patch
//! - `sidecar`: secondary Service set
//! - `meta`: annotations, status and revision phase
//!
//! Revisions have their own owner controller in `revision`.

pub mod create;
pub mod update;
pub mod sidecar;
pub mod meta;
pub mod revision;


use crate::backoff::FibonacciBackoff;
use crate::config::ConfigHandle;
use crate::defaulter::default_boot;
use crate::error::ControllerError;
use crate::events;
use crate::keys::reason;
use crate::metrics::{ReconcileMetrics, stage, sub_stage};
use crate::settings::OperatorSettings;
use boot_client::{BootClientTrait, ClientError};
use crds::{Boot, BootKind};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How a tick ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Converged for now; wait for the next change
    Done,
    /// Run again shortly
    Requeue,
}

impl TickOutcome {
    /// `Requeue` when `requeue` is set.
    #[must_use]
    pub fn from_requeue(requeue: bool) -> Self {
        if requeue { TickOutcome::Requeue } else { TickOutcome::Done }
    }
}

/// Backoff state for a resource
#[derive(Debug, Clone)]
struct BackoffState {
    backoff: FibonacciBackoff,
    error_count: u32,
}

impl BackoffState {
    fn new() -> Self {
        Self {
            backoff: FibonacciBackoff::new(1, 300), // 1 second min, 5 minutes max
            error_count: 0,
        }
    }

    fn increment_error(&mut self) {
        self.error_count += 1;
    }

    fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

/// Reconciles Boots and BootRevisions.
pub struct Reconciler {
    pub(crate) client: Arc<dyn BootClientTrait>,
    pub(crate) config: ConfigHandle,
    pub(crate) settings: Arc<OperatorSettings>,
    pub(crate) metrics: Arc<dyn ReconcileMetrics>,
    /// Error count tracking per object key -> BackoffState
    backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl Reconciler {
    pub fn new(
        client: impl BootClientTrait + 'static,
        config: ConfigHandle,
        settings: Arc<OperatorSettings>,
        metrics: Arc<dyn ReconcileMetrics>,
    ) -> Self {
        Self {
            client: Arc::new(client),
            config,
            settings,
            metrics,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Current configuration handle (shared with admission and the config watcher).
    #[must_use]
    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    /// Delay before retrying a failed object; grows along a Fibonacci sequence.
    pub fn next_backoff(&self, key: &str) -> Duration {
        let mut states = self.backoff_states.lock().unwrap_or_else(PoisonError::into_inner);
        let state = states.entry(key.to_string()).or_insert_with(BackoffState::new);
        state.increment_error();
        let delay = state.backoff.next_backoff();
        debug!("Backoff for {} after {} errors: {:?}", key, state.error_count, delay);
        delay
    }

    /// Clears the backoff of an object after a successful tick.
    pub fn reset_backoff(&self, key: &str) {
        let mut states = self.backoff_states.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(state) = states.get_mut(key) {
            state.reset();
        }
    }

    /// One reconcile tick for the Boot `kind namespace/name`.
    pub async fn reconcile_boot(
        &self,
        kind: BootKind,
        namespace: &str,
        name: &str,
    ) -> Result<TickOutcome, ControllerError> {
        let started = Instant::now();
        let result = self.tick(kind, namespace, name).await;
        self.metrics
            .observe_duration(kind, started.elapsed().as_secs_f64());

        let key = format!("{kind} {namespace}/{name}");
        match &result {
            Ok(outcome) => debug!("Reconciled {}: {:?}", key, outcome),
            Err(e) => warn!("Reconcile of {} failed: {}", key, e),
        }
        result
    }

    async fn tick(
        &self,
        kind: BootKind,
        namespace: &str,
        name: &str,
    ) -> Result<TickOutcome, ControllerError> {
        let ctx = self.config.current();
        if ctx.ignores_namespace(namespace) {
            debug!("Skipping {} {}/{}: namespace ignored in env {}", kind, namespace, name, ctx.env());
            return Ok(TickOutcome::Done);
        }

        let mut boot = match self.client.get_boot(kind, namespace, name).await {
            Ok(boot) => boot,
            Err(e) if e.is_not_found() => {
                info!("{} {}/{} not found, removing its revisions", kind, namespace, name);
                self.delete_revisions(kind, namespace, name).await;
                return Ok(TickOutcome::Done);
            }
            Err(e) => {
                self.metrics.record_error(
                    kind,
                    stage::GET_BOOT,
                    sub_stage::NONE,
                    &format!("{namespace}/{name}"),
                );
                return Err(e.into());
            }
        };

        let cfg = ctx.boot_config(&boot);
        let env = ctx.env();

        if default_boot(&mut boot, &cfg, env).changed() {
            return match self.client.replace_boot(&boot).await {
                Ok(_) => {
                    info!("Defaulted {}", boot.key());
                    events::record(
                        self.client.as_ref(),
                        &boot,
                        reason::UPDATED_BOOT_DEFAULTERS,
                        "Updated Boot defaulters",
                        None,
                    )
                    .await;
                    Ok(TickOutcome::Requeue)
                }
                Err(e) => {
                    self.record_error(&boot, stage::UPDATE_BOOT_DEFAULTERS, sub_stage::NONE);
                    events::record(
                        self.client.as_ref(),
                        &boot,
                        reason::FAILED_UPDATE_BOOT_DEFAULTERS,
                        "Failed to update Boot defaulters",
                        Some(&e),
                    )
                    .await;
                    self.client_failure(&boot, e)
                }
            };
        }

        self.record_revision(&boot).await;

        if self.reconcile_create(&boot, &cfg, env).await? == TickOutcome::Requeue {
            debug!("{}: requeue after create", boot.key());
            return Ok(TickOutcome::Requeue);
        }
        if self.reconcile_update(&boot, &cfg, env).await? == TickOutcome::Requeue {
            debug!("{}: requeue after update", boot.key());
            return Ok(TickOutcome::Requeue);
        }
        if self.reconcile_sidecar_services(&boot, &cfg, env).await? == TickOutcome::Requeue {
            debug!("{}: requeue after sidecar services", boot.key());
            return Ok(TickOutcome::Requeue);
        }
        self.reconcile_meta(&boot, env).await
    }

    /// Counts a failed call of `boot`'s tick.
    pub(crate) fn record_error(&self, boot: &Boot, stage: &str, sub_stage: &str) {
        self.metrics.record_error(
            boot.kind,
            stage,
            sub_stage,
            &format!("{}/{}", boot.namespace(), boot.name()),
        );
    }

    /// Retryable client errors end the tick with a requeue; others fail it.
    pub(crate) fn client_failure(
        &self,
        boot: &Boot,
        err: ClientError,
    ) -> Result<TickOutcome, ControllerError> {
        if err.is_retryable() {
            info!("{}: retrying after {}", boot.key(), err);
            Ok(TickOutcome::Requeue)
        } else {
            Err(ControllerError::Client(err))
        }
    }
}
