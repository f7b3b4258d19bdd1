//! Boot operations for MockBootClient
//!
//! Boots are stored by `(kind, namespace, name)` so two kinds may share a name.

use super::{lock, MockBootClient};
use crate::error::ClientError;
use crds::{Boot, BootKind, BootStatus};

pub async fn get_boot(
    client: &MockBootClient,
    kind: BootKind,
    namespace: &str,
    name: &str,
) -> Result<Boot, ClientError> {
    client.take_failure("get_boot")?;
    client
        .boot(kind, namespace, name)
        .ok_or_else(|| ClientError::NotFound(format!("{kind} {namespace}/{name}")))
}

pub async fn replace_boot(client: &MockBootClient, boot: &Boot) -> Result<Boot, ClientError> {
    client.take_failure("replace_boot")?;
    let key = (boot.kind, boot.namespace().to_string(), boot.name().to_string());
    let mut store = lock(&client.boots);
    let existing = store
        .get(&key)
        .ok_or_else(|| ClientError::NotFound(boot.key()))?;
    if boot.metadata.resource_version.is_some()
        && boot.metadata.resource_version != existing.metadata.resource_version
    {
        return Err(ClientError::Conflict(boot.key()));
    }
    let mut stored = boot.clone();
    // Status is a subresource; a plain replace never changes it.
    stored.status.clone_from(&existing.status);
    stored.metadata.uid.clone_from(&existing.metadata.uid);
    client.stamp(&mut stored.metadata);
    store.insert(key, stored.clone());
    client.record_write("replace", &format!("boot/{}", boot.kind), &(key_pair(boot)));
    Ok(stored)
}

pub async fn patch_boot_status(
    client: &MockBootClient,
    boot: &Boot,
    status: &BootStatus,
) -> Result<(), ClientError> {
    client.take_failure("patch_boot_status")?;
    let key = (boot.kind, boot.namespace().to_string(), boot.name().to_string());
    let mut store = lock(&client.boots);
    let existing = store
        .get_mut(&key)
        .ok_or_else(|| ClientError::NotFound(boot.key()))?;
    existing.status = Some(status.clone());
    client.stamp(&mut existing.metadata);
    client.record_write("patch", &format!("boot-status/{}", boot.kind), &key_pair(boot));
    Ok(())
}

fn key_pair(boot: &Boot) -> (String, String) {
    (boot.namespace().to_string(), boot.name().to_string())
}
