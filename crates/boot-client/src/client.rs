//! Kubernetes-backed implementation of [`BootClientTrait`]

use crate::boot_trait::BootClientTrait;
use crate::error::ClientError;
use crate::models::{BootEvent, EventSeverity, label_selector};
use crds::{Boot, BootKind, BootRevision, BootStatus};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod, Service};
use kube::api::{DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::core::DynamicObject;
use kube::{Api, Client, Resource, ResourceExt};
use kube_runtime::events::{Event, EventType, Recorder, Reporter};
use std::collections::BTreeMap;
use tracing::debug;

/// Cluster client backed by a `kube::Client`
#[derive(Clone)]
pub struct KubeBootClient {
    client: Client,
    recorder: Recorder,
}

impl std::fmt::Debug for KubeBootClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeBootClient").finish_non_exhaustive()
    }
}

impl KubeBootClient {
    /// Wraps a client; Events are reported as `controller`.
    pub fn new(client: Client, controller: &str) -> Self {
        let reporter = Reporter {
            controller: controller.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        let recorder = Recorder::new(client.clone(), reporter);
        Self { client, recorder }
    }

    /// The underlying client, for watchers.
    #[must_use]
    pub fn client(&self) -> Client {
        self.client.clone()
    }

    fn boot_api(&self, kind: BootKind, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &kind.api_resource())
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn namespace_of<K: Resource>(obj: &K) -> Result<String, ClientError> {
    obj.meta()
        .namespace
        .clone()
        .ok_or_else(|| ClientError::InvalidObject(format!("{} has no namespace", obj.name_any())))
}

fn selector_params(labels: &BTreeMap<String, String>) -> ListParams {
    ListParams::default().labels(&label_selector(labels))
}

#[async_trait::async_trait]
impl BootClientTrait for KubeBootClient {
    async fn get_boot(&self, kind: BootKind, namespace: &str, name: &str) -> Result<Boot, ClientError> {
        let obj = self.boot_api(kind, namespace).get(name).await?;
        Ok(Boot::from_dynamic(kind, &obj)?)
    }

    async fn replace_boot(&self, boot: &Boot) -> Result<Boot, ClientError> {
        debug!("Replacing {}", boot.key());
        let obj = boot.to_dynamic()?;
        let stored = self
            .boot_api(boot.kind, boot.namespace())
            .replace(boot.name(), &PostParams::default(), &obj)
            .await?;
        Ok(Boot::from_dynamic(boot.kind, &stored)?)
    }

    async fn patch_boot_status(&self, boot: &Boot, status: &BootStatus) -> Result<(), ClientError> {
        let patch = serde_json::json!({ "status": status });
        self.boot_api(boot.kind, boot.namespace())
            .patch_status(boot.name(), &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, ClientError> {
        Ok(self.api::<Deployment>(namespace).get(name).await?)
    }

    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment, ClientError> {
        let ns = namespace_of(deployment)?;
        Ok(self.api::<Deployment>(&ns).create(&PostParams::default(), deployment).await?)
    }

    async fn replace_deployment(&self, deployment: &Deployment) -> Result<Deployment, ClientError> {
        let ns = namespace_of(deployment)?;
        Ok(self
            .api::<Deployment>(&ns)
            .replace(&deployment.name_any(), &PostParams::default(), deployment)
            .await?)
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Service, ClientError> {
        Ok(self.api::<Service>(namespace).get(name).await?)
    }

    async fn list_services(&self, namespace: &str, labels: &BTreeMap<String, String>) -> Result<Vec<Service>, ClientError> {
        let list = self.api::<Service>(namespace).list(&selector_params(labels)).await?;
        Ok(list.items)
    }

    async fn create_service(&self, service: &Service) -> Result<Service, ClientError> {
        let ns = namespace_of(service)?;
        Ok(self.api::<Service>(&ns).create(&PostParams::default(), service).await?)
    }

    async fn replace_service(&self, service: &Service) -> Result<Service, ClientError> {
        let ns = namespace_of(service)?;
        Ok(self
            .api::<Service>(&ns)
            .replace(&service.name_any(), &PostParams::default(), service)
            .await?)
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), ClientError> {
        self.api::<Service>(namespace).delete(name, &DeleteParams::default()).await?;
        Ok(())
    }

    async fn list_pods(&self, namespace: &str, labels: &BTreeMap<String, String>) -> Result<Vec<Pod>, ClientError> {
        let list = self.api::<Pod>(namespace).list(&selector_params(labels)).await?;
        Ok(list.items)
    }

    async fn get_pvc(&self, namespace: &str, name: &str) -> Result<PersistentVolumeClaim, ClientError> {
        Ok(self.api::<PersistentVolumeClaim>(namespace).get(name).await?)
    }

    async fn get_revision(&self, namespace: &str, name: &str) -> Result<BootRevision, ClientError> {
        Ok(self.api::<BootRevision>(namespace).get(name).await?)
    }

    async fn list_revisions(&self, namespace: &str, labels: &BTreeMap<String, String>) -> Result<Vec<BootRevision>, ClientError> {
        let list = self.api::<BootRevision>(namespace).list(&selector_params(labels)).await?;
        Ok(list.items)
    }

    async fn create_revision(&self, revision: &BootRevision) -> Result<BootRevision, ClientError> {
        let ns = namespace_of(revision)?;
        Ok(self.api::<BootRevision>(&ns).create(&PostParams::default(), revision).await?)
    }

    async fn replace_revision(&self, revision: &BootRevision) -> Result<BootRevision, ClientError> {
        let ns = namespace_of(revision)?;
        Ok(self
            .api::<BootRevision>(&ns)
            .replace(&revision.name_any(), &PostParams::default(), revision)
            .await?)
    }

    async fn delete_revision(&self, namespace: &str, name: &str) -> Result<(), ClientError> {
        self.api::<BootRevision>(namespace).delete(name, &DeleteParams::default()).await?;
        Ok(())
    }

    async fn publish_event(&self, boot: &Boot, event: &BootEvent) -> Result<(), ClientError> {
        let type_ = match event.severity {
            EventSeverity::Normal => EventType::Normal,
            EventSeverity::Warning => EventType::Warning,
        };
        self.recorder
            .publish(
                &Event {
                    type_,
                    reason: event.reason.clone(),
                    note: Some(event.note.clone()),
                    action: event.action.clone(),
                    secondary: None,
                },
                &boot.object_reference(),
            )
            .await?;
        Ok(())
    }
}
