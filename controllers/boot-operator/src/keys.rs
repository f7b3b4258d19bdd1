//! Annotation, label and event-reason keys.
//!
//! Annotation keys and values are read by other tooling, so they never change.

/// Env-generated marker; value is [`ENV_GENERATED`] once defaulting has merged
/// the configured env into the spec.
pub const ANNOTATION_ENV: &str = "app.logancloud.com/env";
/// Value of [`ANNOTATION_ENV`] after env defaulting
pub const ENV_GENERATED: &str = "generated";
/// JSON array snapshot of the last effective env list
pub const ANNOTATION_BOOT_ENVS: &str = "app.logancloud.com/boot-envs";
/// JSON array snapshot of `spec.pvc`
pub const ANNOTATION_BOOT_PVCS: &str = "app.logancloud.com/boot-pvcs";
/// JSON array of the volume mounts the Deployment should carry
pub const ANNOTATION_BOOT_DEPLOY_PVCS: &str = "app.logancloud.com/boot-deploy-pvcs";
/// Image (`registry/image:version`) the env snapshot was computed for
pub const ANNOTATION_BOOT_IMAGES: &str = "app.logancloud.com/boot-images";
/// Copied onto the pod template; changing it restarts the pods
pub const ANNOTATION_RESTARTED_AT: &str = "app.logancloud.com/restartedAt";
/// Name of the managed Deployment
pub const ANNOTATION_DEPLOY: &str = "app.logancloud.com/deploy";
/// Comma separated names of the managed Services
pub const ANNOTATION_SERVICES: &str = "app.logancloud.com/services";
/// Managed workload type
pub const ANNOTATION_TYPE: &str = "app.logancloud.com/type";
/// Value of [`ANNOTATION_TYPE`]
pub const WORKLOAD_TYPE_DEPLOY: &str = "deploy";
/// Observed replica count
pub const ANNOTATION_AVAILABLE: &str = "app.logancloud.com/status.available";
/// Desired replica count
pub const ANNOTATION_DESIRED: &str = "app.logancloud.com/status.desired";
/// RFC 3339 time of the last accepted update
pub const ANNOTATION_LAST_UPDATE: &str = "app.logancloud.com/status.lastUpdateTimeStamp";
/// Profile selector
pub const ANNOTATION_PROFILE: &str = "logan/profile";

// Revision annotations
pub const ANNOTATION_REVISION: &str = "app.logancloud.com/revision";
pub const ANNOTATION_REVISION_HASH: &str = "app.logancloud.com/hash";
pub const ANNOTATION_REVISION_PHASE: &str = "app.logancloud.com/phase";
pub const ANNOTATION_REVISION_DIFF: &str = "app.logancloud.com/diff";
pub const ANNOTATION_REVISION_RETRY: &str = "app.logancloud.com/retry";

// Labels
pub const LABEL_APP: &str = "app";
pub const LABEL_APP_VALUE: &str = "havok";
pub const LABEL_DEPLOY_TYPE: &str = "havok/type";
pub const LABEL_BOOT_NAME: &str = "bootName";
pub const LABEL_BOOT_TYPE: &str = "bootType";
pub const LABEL_ENV: &str = "logan/env";
/// `shared=true` marks a claim any Boot may mount read-only
pub const LABEL_SHARED: &str = "shared";

// Prometheus service annotations
pub const PROMETHEUS_PATH: &str = "prometheus.io/path";
pub const PROMETHEUS_PORT: &str = "prometheus.io/port";
pub const PROMETHEUS_SCHEME: &str = "prometheus.io/scheme";
pub const PROMETHEUS_SCRAPE: &str = "prometheus.io/scrape";

/// Event reasons posted on Boots
pub mod reason {
    pub const CREATED_DEPLOYMENT: &str = "CreatedDeployment";
    pub const FAILED_CREATE_DEPLOYMENT: &str = "FailedCreateDeployment";
    pub const UPDATED_DEPLOYMENT: &str = "UpdatedDeployment";
    pub const FAILED_UPDATE_DEPLOYMENT: &str = "FailedUpdateDeployment";
    pub const FAILED_GET_DEPLOYMENT: &str = "FailedGetDeployment";
    pub const CREATED_SERVICE: &str = "CreatedService";
    pub const FAILED_CREATE_SERVICE: &str = "FailedCreateService";
    pub const UPDATED_SERVICE: &str = "UpdatedService";
    pub const FAILED_UPDATE_SERVICE: &str = "FailedUpdateService";
    pub const DELETED_SERVICE: &str = "DeletedService";
    pub const FAILED_DELETE_SERVICE: &str = "FailedDeleteService";
    pub const FAILED_GET_SERVICE: &str = "FailedGetService";
    pub const UPDATED_BOOT_DEFAULTERS: &str = "UpdatedBootDefaulters";
    pub const FAILED_UPDATE_BOOT_DEFAULTERS: &str = "FailedUpdateBootDefaulters";
    pub const UPDATED_BOOT_META: &str = "UpdatedBootMeta";
    pub const FAILED_UPDATE_BOOT_META: &str = "FailedUpdateBootMeta";
}
