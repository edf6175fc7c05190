//! In-memory secret store for tests
//!
//! Mimics the API server semantics the rotator relies on: namespaces must
//! exist, creates fail on duplicates, and replaces are checked against the
//! stored resourceVersion.

use k8s_openapi::api::core::v1::Secret;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use super::secret_store::{SecretStore, StoreError};

#[derive(Default)]
struct State {
    namespaces: HashSet<String>,
    secrets: HashMap<(String, String), Secret>,
    next_version: u64,
    fail_writes: bool,
    concurrent_writer: bool,
    calls: usize,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn with_namespaces(namespaces: &[&str]) -> Self {
        let store = Self::default();
        {
            let mut state = store.state.lock().unwrap();
            state.namespaces = namespaces.iter().map(|ns| ns.to_string()).collect();
        }
        store
    }

    /// Store a secret as if someone else had created it
    pub fn insert(&self, namespace: &str, mut secret: Secret) {
        let mut state = self.state.lock().unwrap();
        state.next_version += 1;
        secret.metadata.namespace = Some(namespace.to_string());
        secret.metadata.resource_version = Some(state.next_version.to_string());
        let name = secret.metadata.name.clone().unwrap_or_default();
        state.secrets.insert((namespace.to_string(), name), secret);
    }

    pub fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        let state = self.state.lock().unwrap();
        state
            .secrets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn secret_count(&self) -> usize {
        self.state.lock().unwrap().secrets.len()
    }

    /// Total number of store calls made so far
    pub fn calls(&self) -> usize {
        self.state.lock().unwrap().calls
    }

    /// Make every create and replace fail
    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().unwrap().fail_writes = fail;
    }

    /// Have another writer update the secret between every read and replace
    pub fn concurrent_writer(&self, enabled: bool) {
        self.state.lock().unwrap().concurrent_writer = enabled;
    }

    /// Simulate a concurrent writer bumping the resourceVersion
    pub fn touch(&self, namespace: &str, name: &str) {
        let mut state = self.state.lock().unwrap();
        state.next_version += 1;
        let version = state.next_version.to_string();
        if let Some(secret) = state
            .secrets
            .get_mut(&(namespace.to_string(), name.to_string()))
        {
            secret.metadata.resource_version = Some(version);
        }
    }
}

#[async_trait::async_trait]
impl SecretStore for MemoryStore {
    async fn namespace_exists(&self, namespace: &str) -> Result<bool, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        Ok(state.namespaces.contains(namespace))
    }

    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Secret>, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        Ok(state
            .secrets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        if state.fail_writes {
            return Err(StoreError::Api {
                operation: "secret create",
                message: "injected failure".to_string(),
            });
        }

        let name = secret.metadata.name.clone().unwrap_or_default();
        let id = (namespace.to_string(), name);
        if state.secrets.contains_key(&id) {
            return Err(StoreError::Api {
                operation: "secret create",
                message: "already exists".to_string(),
            });
        }

        state.next_version += 1;
        let mut stored = secret.clone();
        stored.metadata.namespace = Some(namespace.to_string());
        stored.metadata.resource_version = Some(state.next_version.to_string());
        state.secrets.insert(id, stored.clone());
        Ok(stored)
    }

    async fn replace_secret(
        &self,
        namespace: &str,
        name: &str,
        secret: &Secret,
    ) -> Result<Secret, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        if state.fail_writes {
            return Err(StoreError::Api {
                operation: "secret update",
                message: "injected failure".to_string(),
            });
        }

        let id = (namespace.to_string(), name.to_string());
        if state.concurrent_writer {
            state.next_version += 1;
            let version = state.next_version.to_string();
            if let Some(current) = state.secrets.get_mut(&id) {
                current.metadata.resource_version = Some(version);
            }
        }
        let current_version = match state.secrets.get(&id) {
            Some(current) => current.metadata.resource_version.clone(),
            None => {
                return Err(StoreError::Api {
                    operation: "secret update",
                    message: "not found".to_string(),
                })
            }
        };
        if secret.metadata.resource_version != current_version {
            return Err(StoreError::Conflict {
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
        }

        state.next_version += 1;
        let mut stored = secret.clone();
        stored.metadata.resource_version = Some(state.next_version.to_string());
        state.secrets.insert(id, stored.clone());
        Ok(stored)
    }

    fn store_type(&self) -> &'static str {
        "in-memory"
    }
}
