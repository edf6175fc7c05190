//! Secret store implementations
//!
//! This module provides the abstraction over the external store that owns the
//! Secret resources, plus the Kubernetes API implementation used in-cluster.

mod kubernetes;
mod secret_store;

#[cfg(test)]
pub(crate) mod memory;

pub use kubernetes::KubeSecretStore;
pub use secret_store::{SecretStore, StoreError};

/// Type alias for a shared store trait object
pub type Store = std::sync::Arc<dyn SecretStore>;
