//! Reconcile metrics.
//!
//! The reconciler reports through [`ReconcileMetrics`]; [`PrometheusMetrics`]
//! keeps them in a registry served as text on `/metrics`.

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use crds::BootKind;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;
use tracing::error;

/// Reconcile stages
pub mod stage {
    pub const GET_BOOT: &str = "reconcile_get_boot";
    pub const UPDATE_BOOT_DEFAULTERS: &str = "reconcile_update_boot_defaulters";
    pub const CREATE: &str = "reconcile_create";
    pub const UPDATE: &str = "reconcile_update";
    pub const UPDATE_BOOT_META: &str = "reconcile_update_boot_meta";
}

/// API calls inside a stage
pub mod sub_stage {
    pub const NONE: &str = "";
    pub const CREATE_DEPLOYMENT: &str = "create_deployment";
    pub const GET_DEPLOYMENT: &str = "get_deployment";
    pub const UPDATE_DEPLOYMENT: &str = "update_deployment";
    pub const CREATE_SERVICE: &str = "create_service";
    pub const GET_SERVICE: &str = "get_service";
    pub const LIST_SERVICE: &str = "list_service";
    pub const UPDATE_SERVICE: &str = "update_service";
    pub const CREATE_OTHER_SERVICE: &str = "create_other_service";
    pub const UPDATE_OTHER_SERVICE: &str = "update_other_service";
    pub const DELETE_OTHER_SERVICE: &str = "delete_other_service";
    pub const LIST_PODS: &str = "list_pods";
    pub const UPDATE_BOOT_META: &str = "update_boot_meta";
}

/// Sink for reconcile measurements.
pub trait ReconcileMetrics: Send + Sync {
    /// Duration of one reconcile tick.
    fn observe_duration(&self, kind: BootKind, seconds: f64);

    /// One failed API call.
    fn record_error(&self, kind: BootKind, stage: &str, sub_stage: &str, boot: &str);
}

/// Prometheus-backed [`ReconcileMetrics`].
#[derive(Clone)]
pub struct PrometheusMetrics {
    registry: Registry,
    reconcile_time: HistogramVec,
    reconcile_errors: IntCounterVec,
}

impl PrometheusMetrics {
    /// Creates the collectors and registers them in a fresh registry.
    ///
    /// # Errors
    ///
    /// Fails when a collector descriptor is invalid.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let reconcile_time = HistogramVec::new(
            HistogramOpts::new(
                "logan_controller_runtime_reconcile_time_seconds",
                "Length of time per reconciliation per kind",
            ),
            &["kind"],
        )?;
        let reconcile_errors = IntCounterVec::new(
            Opts::new(
                "logan_controller_runtime_reconcile_errors_total",
                "Total number of reconciliation errors per kind, stage and boot",
            ),
            &["kind", "stage", "sub_stage", "boot"],
        )?;
        registry.register(Box::new(reconcile_time.clone()))?;
        registry.register(Box::new(reconcile_errors.clone()))?;
        Ok(Self {
            registry,
            reconcile_time,
            reconcile_errors,
        })
    }

    /// Text exposition of every registered metric.
    ///
    /// # Errors
    ///
    /// Fails when encoding fails.
    pub fn render(&self) -> Result<Vec<u8>, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buf)?;
        Ok(buf)
    }

    #[cfg(test)]
    pub fn error_count(&self, kind: BootKind, stage: &str, sub_stage: &str, boot: &str) -> u64 {
        self.reconcile_errors
            .with_label_values(&[kind.key(), stage, sub_stage, boot])
            .get()
    }
}

impl ReconcileMetrics for PrometheusMetrics {
    fn observe_duration(&self, kind: BootKind, seconds: f64) {
        self.reconcile_time
            .with_label_values(&[kind.key()])
            .observe(seconds);
    }

    fn record_error(&self, kind: BootKind, stage: &str, sub_stage: &str, boot: &str) {
        self.reconcile_errors
            .with_label_values(&[kind.key(), stage, sub_stage, boot])
            .inc();
    }
}

async fn metrics_handler(State(metrics): State<Arc<PrometheusMetrics>>) -> Response {
    match metrics.render() {
        Ok(buf) => ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], buf).into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// `/metrics` router.
pub fn router(metrics: Arc<PrometheusMetrics>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[test]
    fn test_errors_are_counted_per_label_set() {
        let metrics = PrometheusMetrics::new().unwrap();
        metrics.record_error(BootKind::Java, stage::CREATE, sub_stage::CREATE_DEPLOYMENT, "shop/orders");
        metrics.record_error(BootKind::Java, stage::CREATE, sub_stage::CREATE_DEPLOYMENT, "shop/orders");
        assert_eq!(
            metrics.error_count(BootKind::Java, stage::CREATE, sub_stage::CREATE_DEPLOYMENT, "shop/orders"),
            2
        );
        assert_eq!(
            metrics.error_count(BootKind::Php, stage::CREATE, sub_stage::CREATE_DEPLOYMENT, "shop/orders"),
            0
        );
    }

    #[tokio::test]
    async fn test_metrics_endpoint_serves_text() {
        let metrics = Arc::new(PrometheusMetrics::new().unwrap());
        metrics.observe_duration(BootKind::Web, 0.25);

        let response = router(metrics)
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("logan_controller_runtime_reconcile_time_seconds"));
    }
}
