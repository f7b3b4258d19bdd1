//! Kubernetes resource watchers.
//!
//! Boot kinds and BootRevisions run through a generic `watch_resource()`
//! helper on top of `kube_runtime::Controller`. Each Boot kind controller also
//! owns the Deployments and Services it creates, so drift on those objects
//! triggers a tick of the parent Boot.
//!
//! The operator ConfigMap is followed with a plain watcher stream. A
//! successful reload requeues every Boot.

use crate::config::CONFIG_KEY;
use crate::error::ControllerError;
use crate::reconciler::{Reconciler, TickOutcome};
use crate::settings::OperatorSettings;
use crds::{BootKind, BootRevision};
use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use k8s_openapi::NamespaceResourceScope;
use kube::api::DynamicObject;
use kube::{Api, Client, Resource, ResourceExt};
use kube_runtime::controller::{Action, Config as ControllerConfig};
use kube_runtime::{Controller, WatchStreamExt, watcher};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Events for one object arriving within this window collapse into one tick.
const DEBOUNCE: Duration = Duration::from_secs(1);

/// Delay of a `Requeue` tick outcome.
const REQUEUE_AFTER: Duration = Duration::from_secs(1);

pub type ReconcileFuture = Pin<Box<dyn Future<Output = Result<Action, ControllerError>> + Send>>;

/// Maximum concurrent reconciles per controller: twice the CPU count.
fn concurrency() -> u16 {
    let cpus = std::thread::available_parallelism().map_or(1, |n| n.get());
    u16::try_from(cpus * 2).unwrap_or(u16::MAX)
}

fn to_action(outcome: TickOutcome) -> Action {
    match outcome {
        TickOutcome::Requeue => Action::requeue(REQUEUE_AFTER),
        TickOutcome::Done => Action::await_change(),
    }
}

/// Backoff key of an object, `"{resource} {namespace}/{name}"`.
fn object_key<K: Resource>(resource_name: &str, obj: &K) -> String {
    format!(
        "{} {}/{}",
        resource_name,
        obj.namespace().unwrap_or_default(),
        obj.name_any()
    )
}

/// Drives `controller` until its stream ends.
///
/// Failed ticks are retried after a per-object Fibonacci backoff that resets
/// on the first successful tick.
async fn watch_resource<K, F>(
    controller: Controller<K>,
    reconciler: Arc<Reconciler>,
    reconcile_fn: F,
    resource_name: &'static str,
) -> Result<(), ControllerError>
where
    K: Resource + Clone + Send + Sync + Debug + DeserializeOwned + 'static,
    K::DynamicType: Eq + Hash + Clone + Debug + Unpin,
    F: Fn(Arc<Reconciler>, Arc<K>) -> ReconcileFuture + Send + Sync + Clone + 'static,
{
    info!("Starting {} watcher", resource_name);

    let error_policy = move |obj: Arc<K>, error: &ControllerError, ctx: Arc<Reconciler>| {
        let key = object_key(resource_name, obj.as_ref());
        let delay = ctx.next_backoff(&key);
        if error.is_retryable() {
            warn!("Retrying {} in {:?}: {}", key, delay, error);
        } else {
            error!("Reconciliation error for {}, retrying in {:?}: {}", key, delay, error);
        }
        Action::requeue(delay)
    };

    let reconcile = move |obj: Arc<K>, ctx: Arc<Reconciler>| {
        let reconcile_fn = reconcile_fn.clone();
        async move {
            let key = object_key(resource_name, obj.as_ref());
            debug!("Reconciling {}", key);
            let action = reconcile_fn(ctx.clone(), obj).await?;
            ctx.reset_backoff(&key);
            Ok::<_, ControllerError>(action)
        }
    };

    let controller_config = ControllerConfig::default()
        .debounce(DEBOUNCE)
        .concurrency(concurrency());

    controller
        .with_config(controller_config)
        .run(reconcile, error_policy, reconciler)
        .for_each(|res| async move {
            match res {
                Ok((obj, _)) => debug!("Reconciled {} {}", resource_name, obj),
                Err(e) => debug!("{} controller event error: {}", resource_name, e),
            }
        })
        .await;

    info!("{} watcher stopped", resource_name);
    Ok(())
}

/// Watchers of the operator's resources.
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    client: Client,
    settings: Arc<OperatorSettings>,
}

impl Watcher {
    pub fn new(reconciler: Arc<Reconciler>, client: Client, settings: Arc<OperatorSettings>) -> Self {
        Self {
            reconciler,
            client,
            settings,
        }
    }

    /// Api over the watched namespace, or every namespace.
    fn api<K>(&self) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        match &self.settings.watch_namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }

    /// Watches one Boot kind and the Deployments and Services it owns.
    /// Every message on `reload` requeues all Boots of the kind.
    pub async fn watch_boots(
        &self,
        kind: BootKind,
        reload: UnboundedReceiver<()>,
    ) -> Result<(), ControllerError> {
        let ar = kind.api_resource();
        let boots: Api<DynamicObject> = match &self.settings.watch_namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
            None => Api::all_with(self.client.clone(), &ar),
        };

        let controller = Controller::new_with(boots, watcher::Config::default(), ar)
            .owns(self.api::<Deployment>(), watcher::Config::default())
            .owns(self.api::<Service>(), watcher::Config::default())
            .reconcile_all_on(reload);

        watch_resource(
            controller,
            self.reconciler.clone(),
            move |reconciler, obj: Arc<DynamicObject>| {
                Box::pin(async move {
                    let namespace = obj.namespace().unwrap_or_default();
                    let outcome = reconciler
                        .reconcile_boot(kind, &namespace, &obj.name_any())
                        .await?;
                    Ok(to_action(outcome))
                })
            },
            kind.key(),
        )
        .await
    }

    /// Watches BootRevisions.
    pub async fn watch_revisions(&self) -> Result<(), ControllerError> {
        let controller = Controller::new(self.api::<BootRevision>(), watcher::Config::default());

        watch_resource(
            controller,
            self.reconciler.clone(),
            |reconciler, obj: Arc<BootRevision>| {
                Box::pin(async move {
                    let namespace = obj.namespace().unwrap_or_default();
                    let outcome = reconciler
                        .reconcile_revision(&namespace, &obj.name_any())
                        .await?;
                    Ok(to_action(outcome))
                })
            },
            "bootrevision",
        )
        .await
    }

    /// Follows the operator ConfigMap and reloads the configuration on every
    /// change. A document that fails to parse keeps the previous configuration.
    pub async fn watch_config(&self, triggers: Vec<UnboundedSender<()>>) -> Result<(), ControllerError> {
        let name = self.settings.configmap_name.clone();
        info!(
            "Starting ConfigMap watcher for {}/{}",
            self.settings.operator_namespace, name
        );

        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &self.settings.operator_namespace);
        let config = watcher::Config::default().fields(&format!("metadata.name={name}"));
        let mut stream = watcher(api, config).default_backoff().boxed();

        while let Some(event) = stream.next().await {
            match event {
                Ok(watcher::Event::Apply(cm) | watcher::Event::InitApply(cm)) => {
                    self.reload_config(&cm, &triggers);
                }
                Ok(watcher::Event::Delete(_)) => {
                    warn!("ConfigMap {} deleted, keeping the current configuration", name);
                }
                Ok(watcher::Event::Init) => debug!("ConfigMap watcher sync started"),
                Ok(watcher::Event::InitDone) => debug!("ConfigMap watcher sync done"),
                Err(e) => warn!("ConfigMap watcher error: {}", e),
            }
        }

        Err(ControllerError::Watch(format!("ConfigMap {name} watch stream ended")))
    }

    fn reload_config(&self, cm: &ConfigMap, triggers: &[UnboundedSender<()>]) {
        let Some(text) = cm.data.as_ref().and_then(|data| data.get(CONFIG_KEY)) else {
            warn!("ConfigMap {} has no {}, keeping the current configuration", cm.name_any(), CONFIG_KEY);
            return;
        };
        if let Err(e) = self.reconciler.config().reload(text) {
            error!("Reloading configuration from {} failed, keeping the previous one: {}", cm.name_any(), e);
            return;
        }
        for trigger in triggers {
            if trigger.unbounded_send(()).is_err() {
                debug!("Boot watcher gone, skipping requeue");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_actions() {
        assert_eq!(to_action(TickOutcome::Requeue), Action::requeue(REQUEUE_AFTER));
        assert_eq!(to_action(TickOutcome::Done), Action::await_change());
    }

    #[test]
    fn test_concurrency_scales_with_cpus() {
        assert!(concurrency() >= 2);
        assert_eq!(concurrency() % 2, 0);
    }

    #[test]
    fn test_object_key_matches_reconciler_key() {
        let mut rev = BootRevision::new("orders-v1", Default::default());
        rev.metadata.namespace = Some("shop".to_string());
        assert_eq!(object_key("bootrevision", &rev), "bootrevision shop/orders-v1");
    }
}
