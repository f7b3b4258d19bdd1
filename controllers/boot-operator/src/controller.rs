//! Main controller logic.
//!
//! Builds the cluster client, the shared configuration and the reconciler,
//! then runs one watcher per Boot kind, the BootRevision and ConfigMap
//! watchers, and the webhook and metrics servers as background tasks.

use crate::admission::{self, AdmissionState};
use crate::config::{ConfigHandle, ResolvedContext};
use crate::error::ControllerError;
use crate::metrics::{self, PrometheusMetrics};
use crate::reconciler::Reconciler;
use crate::settings::OperatorSettings;
use crate::watcher::Watcher;
use axum::Router;
use boot_client::KubeBootClient;
use crds::BootKind;
use futures::channel::mpsc;
use futures::future::select_all;
use kube::Client;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info};

/// Field manager and event source of the operator
const CONTROLLER_NAME: &str = "boot-operator";

type TaskHandle = JoinHandle<Result<(), ControllerError>>;

/// Main controller that orchestrates all watchers and servers.
pub struct Controller {
    /// One watcher per Boot kind, in `BootKind::ALL` order
    boot_watchers: Vec<TaskHandle>,
    revision_watcher: TaskHandle,
    config_watcher: TaskHandle,
    webhook_server: TaskHandle,
    metrics_server: TaskHandle,
}

impl Controller {
    /// Connects to the cluster and starts every background task.
    pub async fn new(settings: Arc<OperatorSettings>, context: ResolvedContext) -> Result<Self, ControllerError> {
        let kube_client = Client::try_default().await?;
        let boot_client = KubeBootClient::new(kube_client.clone(), CONTROLLER_NAME);
        let metrics = Arc::new(PrometheusMetrics::new()?);
        let config = ConfigHandle::new(context);

        let reconciler = Arc::new(Reconciler::new(
            boot_client.clone(),
            config.clone(),
            settings.clone(),
            metrics.clone(),
        ));
        let watcher_instance = Arc::new(Watcher::new(reconciler, kube_client, settings.clone()));

        let mut triggers = Vec::with_capacity(BootKind::ALL.len());
        let mut boot_watchers = Vec::with_capacity(BootKind::ALL.len());
        for kind in BootKind::ALL {
            let (tx, rx) = mpsc::unbounded();
            triggers.push(tx);
            let watcher = watcher_instance.clone();
            boot_watchers.push(tokio::spawn(async move { watcher.watch_boots(kind, rx).await }));
        }

        let revision_watcher = {
            let watcher = watcher_instance.clone();
            tokio::spawn(async move { watcher.watch_revisions().await })
        };

        let config_watcher = {
            let watcher = watcher_instance.clone();
            tokio::spawn(async move { watcher.watch_config(triggers).await })
        };

        let webhook_server = {
            let state = AdmissionState::new(Arc::new(boot_client), config, settings.clone());
            tokio::spawn(serve(settings.webhook_addr, admission::router(state), "Webhook server"))
        };

        let metrics_server = tokio::spawn(serve(settings.metrics_addr, metrics::router(metrics), "Metrics server"));

        Ok(Self {
            boot_watchers,
            revision_watcher,
            config_watcher,
            webhook_server,
            metrics_server,
        })
    }

    /// Runs until a task stops or a shutdown signal arrives.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Boot operator running");

        let result = tokio::select! {
            (result, index, _) = select_all(self.boot_watchers.iter_mut()) => {
                let kind = BootKind::ALL.get(index).map_or("Boot", |k| k.api_kind());
                joined(result, &format!("{kind} watcher"))
            }
            result = &mut self.revision_watcher => joined(result, "BootRevision watcher"),
            result = &mut self.config_watcher => joined(result, "ConfigMap watcher"),
            result = &mut self.webhook_server => joined(result, "Webhook server"),
            result = &mut self.metrics_server => joined(result, "Metrics server"),
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                Ok(())
            }
        };

        if let Err(e) = &result {
            error!("Boot operator stopping: {}", e);
        }
        result
    }
}

fn joined(result: Result<Result<(), ControllerError>, JoinError>, task: &str) -> Result<(), ControllerError> {
    result
        .map_err(|e| ControllerError::Watch(format!("{task} panicked: {e}")))?
        .map_err(|e| ControllerError::Watch(format!("{task} failed: {e}")))?;
    info!("{} exited", task);
    Ok(())
}

async fn serve(addr: SocketAddr, app: Router, name: &'static str) -> Result<(), ControllerError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("{} listening on {}", name, addr);
    axum::serve(listener, app).await?;
    Ok(())
}
