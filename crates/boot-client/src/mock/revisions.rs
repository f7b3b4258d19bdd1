//! BootRevision operations for MockBootClient

use super::{lock, matching, MockBootClient};
use crate::error::ClientError;
use crds::BootRevision;
use std::collections::BTreeMap;

pub async fn get_revision(
    client: &MockBootClient,
    namespace: &str,
    name: &str,
) -> Result<BootRevision, ClientError> {
    client.take_failure("get_revision")?;
    lock(&client.revisions)
        .get(&(namespace.to_string(), name.to_string()))
        .cloned()
        .ok_or_else(|| ClientError::NotFound(format!("bootrevision {namespace}/{name}")))
}

pub async fn list_revisions(
    client: &MockBootClient,
    namespace: &str,
    labels: &BTreeMap<String, String>,
) -> Result<Vec<BootRevision>, ClientError> {
    client.take_failure("list_revisions")?;
    Ok(matching(&client.revisions, namespace, labels, |r: &BootRevision| {
        r.metadata.labels.as_ref()
    }))
}
