//! Kubernetes Secret Rotator Library
//!
//! Periodically regenerates keys inside Kubernetes Secrets, optionally keeping
//! the previous value under `<key>_PREV`, and reports the number of rotations
//! over HTTP.

pub mod backends;
pub mod cli;
pub mod config;
pub mod descriptor;
pub mod rotation;
pub mod scheduler;
pub mod status;

pub use backends::{KubeSecretStore, SecretStore, Store, StoreError};
pub use config::{Config, Settings};
pub use descriptor::{parse_secret_spec, ConfigError, RetentionStrategy, SecretTarget};
pub use rotation::{generate_secret, PassSummary, RotationEngine, RotationOutcome};
pub use scheduler::Scheduler;
pub use status::RotationStats;
