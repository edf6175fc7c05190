use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::{Namespace, Secret};
use kube::api::{Api, PostParams};
use kube::Client;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use super::secret_store::{SecretStore, StoreError};

/// Secret store backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeSecretStore {
    client: Client,
    timeout: Duration,
}

impl KubeSecretStore {
    /// Create a store from an existing client, bounding every call by `timeout`
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Create a store from the pod's service-account credentials
    pub fn in_cluster(timeout: Duration) -> Result<Self> {
        let config = kube::Config::incluster()
            .context("Failed to load in-cluster Kubernetes configuration")?;
        let client =
            Client::try_from(config).context("Failed to create Kubernetes client")?;

        Ok(Self::new(client, timeout))
    }

    fn secrets(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }

    /// Run one API call under the configured timeout
    async fn call<T, F>(&self, operation: &'static str, request: F) -> Result<T, StoreError>
    where
        F: Future<Output = kube::Result<T>>,
    {
        match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(StoreError::Api {
                operation,
                message: e.to_string(),
            }),
            Err(_) => Err(StoreError::Timeout {
                operation,
                timeout: self.timeout,
            }),
        }
    }
}

#[async_trait::async_trait]
impl SecretStore for KubeSecretStore {
    async fn namespace_exists(&self, namespace: &str) -> Result<bool, StoreError> {
        debug!(namespace = %namespace, "Looking up namespace");
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let found = self
            .call("namespace lookup", namespaces.get_opt(namespace))
            .await?;
        Ok(found.is_some())
    }

    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Secret>, StoreError> {
        debug!(namespace = %namespace, secret = %name, "Reading secret");
        let api = self.secrets(namespace);
        self.call("secret read", api.get_opt(name)).await
    }

    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret, StoreError> {
        debug!(namespace = %namespace, "Creating secret");
        let api = self.secrets(namespace);
        let params = PostParams::default();
        self.call("secret create", api.create(&params, secret)).await
    }

    async fn replace_secret(
        &self,
        namespace: &str,
        name: &str,
        secret: &Secret,
    ) -> Result<Secret, StoreError> {
        debug!(namespace = %namespace, secret = %name, "Replacing secret");
        let api = self.secrets(namespace);
        let params = PostParams::default();

        let result = tokio::time::timeout(self.timeout, api.replace(name, &params, secret)).await;
        match result {
            Ok(Ok(updated)) => Ok(updated),
            // The API server rejects a stale metadata.resourceVersion with 409
            Ok(Err(kube::Error::Api(api_err))) if api_err.code == 409 => {
                Err(StoreError::Conflict {
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                })
            }
            Ok(Err(e)) => Err(StoreError::Api {
                operation: "secret update",
                message: e.to_string(),
            }),
            Err(_) => Err(StoreError::Timeout {
                operation: "secret update",
                timeout: self.timeout,
            }),
        }
    }

    fn store_type(&self) -> &'static str {
        "Kubernetes"
    }
}
