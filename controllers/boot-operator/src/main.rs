//! Boot Operator
//!
//! Converges JavaBoot, PhpBoot, PythonBoot, NodeJSBoot and WebBoot resources
//! into Deployments and Services:
//! - merges the layered `config.yaml` defaults into every Boot
//! - records each spec generation as a BootRevision
//! - guards Boots and the operator ConfigMap through admission webhooks
//! - exports reconcile errors and durations as Prometheus metrics

mod admission;
mod backoff;
mod config;
mod controller;
mod defaulter;
mod error;
mod events;
mod keys;
mod line_diff;
mod merge;
mod metrics;
mod quantity;
mod reconciler;
mod revision;
mod settings;
mod template;
mod watcher;
mod workload;

#[cfg(test)]
mod merge_test;
#[cfg(test)]
mod test_utils;

use crate::error::ControllerError;
use crate::settings::OperatorSettings;
use controller::Controller;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("rustls crypto provider already installed");
    }

    info!("Starting Boot Operator");

    let settings = OperatorSettings::from_env()?;

    info!("Configuration:");
    info!("  Env: {}", settings.env);
    info!("  ConfigMap: {}/{}", settings.operator_namespace, settings.configmap_name);
    info!("  Config file: {}", settings.config_file);
    info!("  Mutation defaulter: {}", settings.mutation_defaulter);
    info!("  Max history: {}", settings.max_history);
    info!("  Namespace: {}", settings.watch_namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Webhook address: {}", settings.webhook_addr);
    info!("  Metrics address: {}", settings.metrics_addr);

    let context = config::load_file(&settings.config_file, &settings.env)?;

    let controller = Controller::new(Arc::new(settings), context).await?;
    controller.run().await?;

    Ok(())
}
