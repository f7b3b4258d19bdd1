//! BootClient trait for mocking
//!
//! This trait abstracts the cluster API so reconcile and admission logic can be
//! unit tested. The concrete `KubeBootClient` implements it, and tests use
//! `MockBootClient`.

use crate::error::ClientError;
use crate::models::BootEvent;
use crds::{Boot, BootKind, BootRevision, BootStatus};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod, Service};
use std::collections::BTreeMap;

/// Trait for cluster API operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
/// Writes carry the object's `resourceVersion`; a stale one yields
/// [`ClientError::Conflict`].
#[async_trait::async_trait]
pub trait BootClientTrait: Send + Sync {
    // Boot operations
    async fn get_boot(&self, kind: BootKind, namespace: &str, name: &str) -> Result<Boot, ClientError>;
    async fn replace_boot(&self, boot: &Boot) -> Result<Boot, ClientError>;
    async fn patch_boot_status(&self, boot: &Boot, status: &BootStatus) -> Result<(), ClientError>;

    // Workload operations
    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, ClientError>;
    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment, ClientError>;
    async fn replace_deployment(&self, deployment: &Deployment) -> Result<Deployment, ClientError>;
    async fn get_service(&self, namespace: &str, name: &str) -> Result<Service, ClientError>;
    async fn list_services(&self, namespace: &str, labels: &BTreeMap<String, String>) -> Result<Vec<Service>, ClientError>;
    async fn create_service(&self, service: &Service) -> Result<Service, ClientError>;
    async fn replace_service(&self, service: &Service) -> Result<Service, ClientError>;
    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), ClientError>;
    async fn list_pods(&self, namespace: &str, labels: &BTreeMap<String, String>) -> Result<Vec<Pod>, ClientError>;
    async fn get_pvc(&self, namespace: &str, name: &str) -> Result<PersistentVolumeClaim, ClientError>;

    // Revision operations
    async fn get_revision(&self, namespace: &str, name: &str) -> Result<BootRevision, ClientError>;
    async fn list_revisions(&self, namespace: &str, labels: &BTreeMap<String, String>) -> Result<Vec<BootRevision>, ClientError>;
    async fn create_revision(&self, revision: &BootRevision) -> Result<BootRevision, ClientError>;
    async fn replace_revision(&self, revision: &BootRevision) -> Result<BootRevision, ClientError>;
    async fn delete_revision(&self, namespace: &str, name: &str) -> Result<(), ClientError>;

    // Events
    async fn publish_event(&self, boot: &Boot, event: &BootEvent) -> Result<(), ClientError>;
}
