//! Boot CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the Boot application operator:
//! five application kinds sharing one spec shape, plus `BootRevision`.
//!
//! Controllers never work on the concrete kinds directly. They decode into the
//! kind-tagged [`Boot`] at the API boundary and encode back on write.

pub mod boot_spec;
pub mod boot_kinds;
pub mod boot;
pub mod boot_revision;

pub use boot_spec::*;
pub use boot_kinds::*;
pub use boot::*;
pub use boot_revision::*;
