//! Workload operations for MockBootClient
//!
//! Handles Deployments, Services, Pods and claims. Writes go through the
//! generic helpers in `mod.rs`.

use super::{lock, matching, MockBootClient};
use crate::error::ClientError;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod, Service};
use std::collections::BTreeMap;

pub async fn get_deployment(
    client: &MockBootClient,
    namespace: &str,
    name: &str,
) -> Result<Deployment, ClientError> {
    client.take_failure("get_deployment")?;
    client
        .deployment(namespace, name)
        .ok_or_else(|| ClientError::NotFound(format!("deployment {namespace}/{name}")))
}

pub async fn get_service(
    client: &MockBootClient,
    namespace: &str,
    name: &str,
) -> Result<Service, ClientError> {
    client.take_failure("get_service")?;
    client
        .service(namespace, name)
        .ok_or_else(|| ClientError::NotFound(format!("service {namespace}/{name}")))
}

pub async fn list_services(
    client: &MockBootClient,
    namespace: &str,
    labels: &BTreeMap<String, String>,
) -> Result<Vec<Service>, ClientError> {
    client.take_failure("list_services")?;
    Ok(matching(&client.services, namespace, labels, |s: &Service| {
        s.metadata.labels.as_ref()
    }))
}

pub async fn list_pods(
    client: &MockBootClient,
    namespace: &str,
    labels: &BTreeMap<String, String>,
) -> Result<Vec<Pod>, ClientError> {
    client.take_failure("list_pods")?;
    Ok(matching(&client.pods, namespace, labels, |p: &Pod| {
        p.metadata.labels.as_ref()
    }))
}

pub async fn get_pvc(
    client: &MockBootClient,
    namespace: &str,
    name: &str,
) -> Result<PersistentVolumeClaim, ClientError> {
    client.take_failure("get_pvc")?;
    lock(&client.pvcs)
        .get(&(namespace.to_string(), name.to_string()))
        .cloned()
        .ok_or_else(|| ClientError::NotFound(format!("persistentvolumeclaim {namespace}/{name}")))
}
