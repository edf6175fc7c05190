use k8s_openapi::api::core::v1::Secret;
use std::time::Duration;
use thiserror::Error;

/// Failures reported by a secret store.
///
/// A missing secret is not an error: `get_secret` returns `Ok(None)`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The resource changed between our read and our write
    #[error("secret {namespace}/{name} was modified concurrently (resourceVersion conflict)")]
    Conflict { namespace: String, name: String },

    #[error("{operation} did not complete within {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("{operation} failed: {message}")]
    Api {
        operation: &'static str,
        message: String,
    },
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Trait for stores holding Kubernetes-style Secret resources
#[async_trait::async_trait]
pub trait SecretStore: Send + Sync {
    /// Whether the namespace exists
    async fn namespace_exists(&self, namespace: &str) -> Result<bool, StoreError>;

    /// Fetch a secret, `None` when it does not exist
    async fn get_secret(&self, namespace: &str, name: &str)
        -> Result<Option<Secret>, StoreError>;

    /// Create a new secret
    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret, StoreError>;

    /// Replace an existing secret.
    ///
    /// The secret's `metadata.resourceVersion` must be the one that was read;
    /// a stale version fails with [`StoreError::Conflict`].
    async fn replace_secret(
        &self,
        namespace: &str,
        name: &str,
        secret: &Secret,
    ) -> Result<Secret, StoreError>;

    /// Get the store type name for display purposes
    fn store_type(&self) -> &'static str;
}
