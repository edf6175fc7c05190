use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::backends::{Store, StoreError};
use crate::descriptor::SecretTarget;
use crate::status::RotationStats;

/// Annotation recording when the rotator last wrote the secret
pub const ROTATED_AT_ANNOTATION: &str = "secret-rotator/last-rotated";

const SECRET_TYPE_OPAQUE: &str = "Opaque";

/// Default number of raw characters drawn before encoding
pub const DEFAULT_SECRET_LENGTH: usize = 40;

/// Generate a random secret value.
///
/// Draws `length` characters uniformly from a 68-symbol alphabet and returns
/// their unpadded URL-safe base64 encoding, so the result is
/// `ceil(4 * length / 3)` characters long.
pub fn generate_secret(length: usize) -> String {
    const CHARSET: &[u8] =
        b"0123456789!@#$%^ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    let raw: Vec<u8> = (0..length)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())])
        .collect();
    URL_SAFE_NO_PAD.encode(raw)
}

/// Result of rotating one target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationOutcome {
    /// The secret did not exist and was created
    Created,
    /// The existing secret was rewritten
    Updated,
    /// The namespace is missing or could not be looked up
    Skipped,
    /// Reading or writing the secret failed
    Failed,
}

impl RotationOutcome {
    pub fn is_rotation(&self) -> bool {
        matches!(self, RotationOutcome::Created | RotationOutcome::Updated)
    }
}

/// Per-outcome counts for one pass over all targets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl PassSummary {
    fn record(&mut self, outcome: RotationOutcome) {
        match outcome {
            RotationOutcome::Created => self.created += 1,
            RotationOutcome::Updated => self.updated += 1,
            RotationOutcome::Skipped => self.skipped += 1,
            RotationOutcome::Failed => self.failed += 1,
        }
    }

    pub fn rotations(&self) -> usize {
        self.created + self.updated
    }
}

/// Rotates secret keys against a store and counts successful writes
pub struct RotationEngine {
    store: Store,
    stats: Arc<RotationStats>,
    secret_length: usize,
}

impl RotationEngine {
    pub fn new(store: Store, stats: Arc<RotationStats>, secret_length: usize) -> Self {
        Self {
            store,
            stats,
            secret_length,
        }
    }

    pub fn stats(&self) -> &Arc<RotationStats> {
        &self.stats
    }

    /// Rotate every target once, in order
    pub async fn run_pass(&self, targets: &[SecretTarget]) -> PassSummary {
        let mut summary = PassSummary::default();
        for target in targets {
            summary.record(self.rotate(target).await);
        }

        info!(
            created = summary.created,
            updated = summary.updated,
            skipped = summary.skipped,
            failed = summary.failed,
            total = self.stats.rotation_count(),
            "Rotation pass complete ({})",
            self.store.store_type()
        );
        summary
    }

    /// Rotate a single target.
    ///
    /// Failures are logged and reported as an outcome, never propagated.
    pub async fn rotate(&self, target: &SecretTarget) -> RotationOutcome {
        match self.store.namespace_exists(&target.namespace).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(
                    namespace = %target.namespace,
                    secret = %target.name,
                    "Namespace does not exist, skipping secret"
                );
                return RotationOutcome::Skipped;
            }
            Err(e) => {
                error!(
                    namespace = %target.namespace,
                    secret = %target.name,
                    error = %e,
                    "Failed to look up namespace, skipping secret"
                );
                return RotationOutcome::Skipped;
            }
        }

        let outcome = match self.write_rotation(target).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_conflict() => {
                warn!(
                    namespace = %target.namespace,
                    secret = %target.name,
                    key = %target.key,
                    "Secret changed since it was read, leaving it for the next pass"
                );
                RotationOutcome::Failed
            }
            Err(e) => {
                error!(
                    namespace = %target.namespace,
                    secret = %target.name,
                    key = %target.key,
                    error = %e,
                    "Failed to rotate secret"
                );
                RotationOutcome::Failed
            }
        };

        if outcome.is_rotation() {
            let total = self.stats.record_rotation();
            info!(
                namespace = %target.namespace,
                secret = %target.name,
                key = %target.key,
                outcome = ?outcome,
                total,
                "Rotated secret"
            );
        }
        outcome
    }

    async fn write_rotation(&self, target: &SecretTarget) -> Result<RotationOutcome, StoreError> {
        let new_value = generate_secret(self.secret_length);

        match self.store.get_secret(&target.namespace, &target.name).await? {
            None => {
                info!(
                    namespace = %target.namespace,
                    secret = %target.name,
                    "Secret doesn't exist, creating it"
                );
                let secret = new_secret(target, &new_value);
                self.store.create_secret(&target.namespace, &secret).await?;
                Ok(RotationOutcome::Created)
            }
            Some(mut secret) => {
                apply_rotation(&mut secret, target, &new_value);
                // metadata.resourceVersion from the read travels with the write
                self.store
                    .replace_secret(&target.namespace, &target.name, &secret)
                    .await?;
                Ok(RotationOutcome::Updated)
            }
        }
    }
}

/// Build a brand-new opaque secret holding `value` at the target key.
///
/// With retention enabled the same value is also written to `<key>_PREV`.
fn new_secret(target: &SecretTarget, value: &str) -> Secret {
    let mut data = BTreeMap::new();
    data.insert(target.key.clone(), ByteString(value.as_bytes().to_vec()));
    if target.retains_previous() {
        data.insert(target.previous_key(), ByteString(value.as_bytes().to_vec()));
    }

    let mut annotations = BTreeMap::new();
    annotations.insert(ROTATED_AT_ANNOTATION.to_string(), rotation_timestamp());

    Secret {
        metadata: ObjectMeta {
            name: Some(target.name.clone()),
            namespace: Some(target.namespace.clone()),
            annotations: Some(annotations),
            ..Default::default()
        },
        data: Some(data),
        type_: Some(SECRET_TYPE_OPAQUE.to_string()),
        ..Default::default()
    }
}

/// Write `value` into an existing secret, retaining the outgoing value if asked
fn apply_rotation(secret: &mut Secret, target: &SecretTarget, value: &str) {
    let data = secret.data.get_or_insert_with(BTreeMap::new);
    if target.retains_previous() {
        if let Some(current) = data.get(&target.key).cloned() {
            data.insert(target.previous_key(), current);
        }
    }
    data.insert(target.key.clone(), ByteString(value.as_bytes().to_vec()));

    secret
        .metadata
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(ROTATED_AT_ANNOTATION.to_string(), rotation_timestamp());
}

fn rotation_timestamp() -> String {
    Utc::now().to_rfc2822()
}
