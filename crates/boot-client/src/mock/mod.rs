//! Mock BootClient for unit testing
//!
//! This module provides an in-memory implementation of `BootClientTrait` that
//! can be used in unit tests without a running cluster.
//!
//! Every write bumps a global resource version and is appended to a write log,
//! so tests can assert "no writes" for idempotence. Replacing an object with a
//! stale `resourceVersion` fails with `ClientError::Conflict`.
//!
//! The mock is organized into domain-specific modules:
//! - `boots.rs` - Boot objects of every kind
//! - `workloads.rs` - Deployments, Services, Pods, claims
//! - `revisions.rs` - BootRevisions

mod boots;
mod revisions;
mod workloads;

use crate::boot_trait::BootClientTrait;
use crate::error::ClientError;
use crate::models::BootEvent;
use crds::{Boot, BootKind, BootRevision, BootStatus};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentStatus};
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// `(namespace, name)`
pub(crate) type ObjectKey = (String, String);

/// Failure returned by the next call of a given method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    NotFound,
    Conflict,
    Unavailable,
}

impl InjectedFailure {
    fn into_error(self, method: &str) -> ClientError {
        match self {
            InjectedFailure::NotFound => ClientError::NotFound(format!("injected by {method}")),
            InjectedFailure::Conflict => ClientError::Conflict(format!("injected by {method}")),
            InjectedFailure::Unavailable => ClientError::Unavailable(format!("injected by {method}")),
        }
    }
}

/// Mock cluster client for testing
#[derive(Clone, Default)]
pub struct MockBootClient {
    pub(crate) boots: Arc<Mutex<HashMap<(BootKind, String, String), Boot>>>,
    pub(crate) deployments: Arc<Mutex<HashMap<ObjectKey, Deployment>>>,
    pub(crate) services: Arc<Mutex<HashMap<ObjectKey, Service>>>,
    pub(crate) pods: Arc<Mutex<HashMap<ObjectKey, Pod>>>,
    pub(crate) pvcs: Arc<Mutex<HashMap<ObjectKey, PersistentVolumeClaim>>>,
    pub(crate) revisions: Arc<Mutex<HashMap<ObjectKey, BootRevision>>>,
    pub(crate) events: Arc<Mutex<Vec<BootEvent>>>,
    pub(crate) writes: Arc<Mutex<Vec<String>>>,
    pub(crate) failures: Arc<Mutex<HashMap<&'static str, InjectedFailure>>>,
    // Counter for resource versions and uids
    pub(crate) next_version: Arc<Mutex<u64>>,
}

impl std::fmt::Debug for MockBootClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockBootClient")
            .field("writes", &lock(&self.writes).len())
            .finish_non_exhaustive()
    }
}

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn key_of(meta: &ObjectMeta) -> ObjectKey {
    (
        meta.namespace.clone().unwrap_or_default(),
        meta.name.clone().unwrap_or_default(),
    )
}

impl MockBootClient {
    /// Create a new, empty mock client
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a Boot to the mock store (for test setup)
    pub fn add_boot(&self, boot: Boot) -> Boot {
        let mut boot = boot;
        self.stamp(&mut boot.metadata);
        lock(&self.boots).insert(
            (boot.kind, boot.namespace().to_string(), boot.name().to_string()),
            boot.clone(),
        );
        boot
    }

    /// Add a Deployment to the mock store (for test setup)
    pub fn add_deployment(&self, deployment: Deployment) {
        let mut deployment = deployment;
        self.stamp(&mut deployment.metadata);
        lock(&self.deployments).insert(key_of(&deployment.metadata), deployment);
    }

    /// Add a Service to the mock store (for test setup)
    pub fn add_service(&self, service: Service) {
        let mut service = service;
        self.stamp(&mut service.metadata);
        lock(&self.services).insert(key_of(&service.metadata), service);
    }

    /// Add a Pod to the mock store (for test setup)
    pub fn add_pod(&self, pod: Pod) {
        lock(&self.pods).insert(key_of(&pod.metadata), pod);
    }

    /// Add a claim to the mock store (for test setup)
    pub fn add_pvc(&self, pvc: PersistentVolumeClaim) {
        lock(&self.pvcs).insert(key_of(&pvc.metadata), pvc);
    }

    /// Add a revision to the mock store (for test setup)
    pub fn add_revision(&self, revision: BootRevision) {
        let mut revision = revision;
        self.stamp(&mut revision.metadata);
        lock(&self.revisions).insert(key_of(&revision.metadata), revision);
    }

    /// Simulate the Deployment controller reporting replica counts.
    pub fn set_deployment_status(&self, namespace: &str, name: &str, replicas: i32, available: i32) {
        if let Some(dep) = lock(&self.deployments).get_mut(&(namespace.to_string(), name.to_string())) {
            dep.status = Some(DeploymentStatus {
                replicas: Some(replicas),
                available_replicas: Some(available),
                ready_replicas: Some(available),
                ..Default::default()
            });
        }
    }

    /// Simulate a manual edit that bypasses the operator (no write logged).
    pub fn edit_deployment(&self, namespace: &str, name: &str, edit: impl FnOnce(&mut Deployment)) {
        let mut store = lock(&self.deployments);
        if let Some(dep) = store.get_mut(&(namespace.to_string(), name.to_string())) {
            edit(dep);
            let version = self.bump();
            dep.metadata.resource_version = Some(version.to_string());
        }
    }

    /// Simulate a manual edit of a Boot (no write logged).
    pub fn edit_boot(&self, kind: BootKind, namespace: &str, name: &str, edit: impl FnOnce(&mut Boot)) {
        let mut store = lock(&self.boots);
        if let Some(boot) = store.get_mut(&(kind, namespace.to_string(), name.to_string())) {
            edit(boot);
            let version = self.bump();
            boot.metadata.resource_version = Some(version.to_string());
        }
    }

    /// Make the next call of `method` fail.
    pub fn fail_next(&self, method: &'static str, failure: InjectedFailure) {
        lock(&self.failures).insert(method, failure);
    }

    pub fn boot(&self, kind: BootKind, namespace: &str, name: &str) -> Option<Boot> {
        lock(&self.boots)
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn deployment(&self, namespace: &str, name: &str) -> Option<Deployment> {
        lock(&self.deployments)
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn service(&self, namespace: &str, name: &str) -> Option<Service> {
        lock(&self.services)
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Names of every Service in a namespace, sorted
    pub fn service_names(&self, namespace: &str) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.services)
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Every revision in a namespace, sorted by name
    pub fn revisions(&self, namespace: &str) -> Vec<BootRevision> {
        let mut revisions: Vec<BootRevision> = lock(&self.revisions)
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, r)| r.clone())
            .collect();
        revisions.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        revisions
    }

    /// Events published so far
    pub fn events(&self) -> Vec<BootEvent> {
        lock(&self.events).clone()
    }

    /// Write log (`"create deployment ns/name"`, ...)
    pub fn writes(&self) -> Vec<String> {
        lock(&self.writes).clone()
    }

    pub fn clear_writes(&self) {
        lock(&self.writes).clear();
    }

    pub(crate) fn bump(&self) -> u64 {
        let mut version = lock(&self.next_version);
        *version += 1;
        *version
    }

    /// Assign a fresh resource version (and a uid on first store)
    pub(crate) fn stamp(&self, meta: &mut ObjectMeta) {
        let version = self.bump();
        meta.resource_version = Some(version.to_string());
        if meta.uid.is_none() {
            meta.uid = Some(format!("uid-{version}"));
        }
    }

    pub(crate) fn record_write(&self, op: &str, what: &str, key: &ObjectKey) {
        lock(&self.writes).push(format!("{op} {what} {}/{}", key.0, key.1));
    }

    pub(crate) fn take_failure(&self, method: &'static str) -> Result<(), ClientError> {
        match lock(&self.failures).remove(method) {
            Some(failure) => Err(failure.into_error(method)),
            None => Ok(()),
        }
    }

    pub(crate) fn create_in<K>(
        &self,
        store: &Mutex<HashMap<ObjectKey, K>>,
        obj: &K,
        what: &str,
    ) -> Result<K, ClientError>
    where
        K: Resource + Clone,
    {
        let key = key_of(obj.meta());
        let mut store = lock(store);
        if store.contains_key(&key) {
            return Err(ClientError::AlreadyExists(format!("{what} {}/{}", key.0, key.1)));
        }
        let mut stored = obj.clone();
        stored.meta_mut().uid = None;
        self.stamp(stored.meta_mut());
        store.insert(key.clone(), stored.clone());
        self.record_write("create", what, &key);
        Ok(stored)
    }

    pub(crate) fn replace_in<K>(
        &self,
        store: &Mutex<HashMap<ObjectKey, K>>,
        obj: &K,
        what: &str,
    ) -> Result<K, ClientError>
    where
        K: Resource + Clone,
    {
        let key = key_of(obj.meta());
        let mut store = lock(store);
        let existing = store
            .get(&key)
            .ok_or_else(|| ClientError::NotFound(format!("{what} {}/{}", key.0, key.1)))?;
        let current = existing.meta().resource_version.clone();
        if obj.meta().resource_version.is_some() && obj.meta().resource_version != current {
            return Err(ClientError::Conflict(format!("{what} {}/{}", key.0, key.1)));
        }
        let uid = existing.meta().uid.clone();
        let mut stored = obj.clone();
        stored.meta_mut().uid = uid;
        self.stamp(stored.meta_mut());
        store.insert(key.clone(), stored.clone());
        self.record_write("replace", what, &key);
        Ok(stored)
    }

    pub(crate) fn delete_in<K>(
        &self,
        store: &Mutex<HashMap<ObjectKey, K>>,
        namespace: &str,
        name: &str,
        what: &str,
    ) -> Result<(), ClientError> {
        let key = (namespace.to_string(), name.to_string());
        if lock(store).remove(&key).is_none() {
            return Err(ClientError::NotFound(format!("{what} {namespace}/{name}")));
        }
        self.record_write("delete", what, &key);
        Ok(())
    }
}

pub(crate) fn matching<K, F>(
    store: &Mutex<HashMap<ObjectKey, K>>,
    namespace: &str,
    labels: &BTreeMap<String, String>,
    labels_of: F,
) -> Vec<K>
where
    K: Clone,
    F: Fn(&K) -> Option<&BTreeMap<String, String>>,
{
    let mut items: Vec<(ObjectKey, K)> = lock(store)
        .iter()
        .filter(|((ns, _), obj)| ns == namespace && crate::models::labels_match(labels_of(obj), labels))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    items.sort_by(|a, b| a.0.cmp(&b.0));
    items.into_iter().map(|(_, v)| v).collect()
}

#[async_trait::async_trait]
impl BootClientTrait for MockBootClient {
    async fn get_boot(&self, kind: BootKind, namespace: &str, name: &str) -> Result<Boot, ClientError> {
        boots::get_boot(self, kind, namespace, name).await
    }

    async fn replace_boot(&self, boot: &Boot) -> Result<Boot, ClientError> {
        boots::replace_boot(self, boot).await
    }

    async fn patch_boot_status(&self, boot: &Boot, status: &BootStatus) -> Result<(), ClientError> {
        boots::patch_boot_status(self, boot, status).await
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, ClientError> {
        workloads::get_deployment(self, namespace, name).await
    }

    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment, ClientError> {
        self.take_failure("create_deployment")?;
        self.create_in(&self.deployments, deployment, "deployment")
    }

    async fn replace_deployment(&self, deployment: &Deployment) -> Result<Deployment, ClientError> {
        self.take_failure("replace_deployment")?;
        self.replace_in(&self.deployments, deployment, "deployment")
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Service, ClientError> {
        workloads::get_service(self, namespace, name).await
    }

    async fn list_services(&self, namespace: &str, labels: &BTreeMap<String, String>) -> Result<Vec<Service>, ClientError> {
        workloads::list_services(self, namespace, labels).await
    }

    async fn create_service(&self, service: &Service) -> Result<Service, ClientError> {
        self.take_failure("create_service")?;
        self.create_in(&self.services, service, "service")
    }

    async fn replace_service(&self, service: &Service) -> Result<Service, ClientError> {
        self.take_failure("replace_service")?;
        self.replace_in(&self.services, service, "service")
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), ClientError> {
        self.take_failure("delete_service")?;
        self.delete_in(&self.services, namespace, name, "service")
    }

    async fn list_pods(&self, namespace: &str, labels: &BTreeMap<String, String>) -> Result<Vec<Pod>, ClientError> {
        workloads::list_pods(self, namespace, labels).await
    }

    async fn get_pvc(&self, namespace: &str, name: &str) -> Result<PersistentVolumeClaim, ClientError> {
        workloads::get_pvc(self, namespace, name).await
    }

    async fn get_revision(&self, namespace: &str, name: &str) -> Result<BootRevision, ClientError> {
        revisions::get_revision(self, namespace, name).await
    }

    async fn list_revisions(&self, namespace: &str, labels: &BTreeMap<String, String>) -> Result<Vec<BootRevision>, ClientError> {
        revisions::list_revisions(self, namespace, labels).await
    }

    async fn create_revision(&self, revision: &BootRevision) -> Result<BootRevision, ClientError> {
        self.take_failure("create_revision")?;
        self.create_in(&self.revisions, revision, "revision")
    }

    async fn replace_revision(&self, revision: &BootRevision) -> Result<BootRevision, ClientError> {
        self.take_failure("replace_revision")?;
        self.replace_in(&self.revisions, revision, "revision")
    }

    async fn delete_revision(&self, namespace: &str, name: &str) -> Result<(), ClientError> {
        self.take_failure("delete_revision")?;
        self.delete_in(&self.revisions, namespace, name, "revision")
    }

    async fn publish_event(&self, _boot: &Boot, event: &BootEvent) -> Result<(), ClientError> {
        lock(&self.events).push(event.clone());
        Ok(())
    }
}
