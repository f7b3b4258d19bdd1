//! Boot operator cluster client
//!
//! Every API call the Boot operator makes goes through [`BootClientTrait`]:
//! Boots of the five kinds, their Deployment, Services, Pods, claims,
//! revisions, and Events.
//!
//! [`KubeBootClient`] talks to the API server. With the `test-util` feature,
//! [`MockBootClient`] keeps everything in memory and enforces resource-version
//! conflicts the way the API server does.

pub mod client;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod boot_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::KubeBootClient;
pub use error::ClientError;
pub use models::*;
pub use boot_trait::BootClientTrait;
#[cfg(feature = "test-util")]
pub use mock::{InjectedFailure, MockBootClient};
