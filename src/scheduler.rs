//! Fixed-interval rotation loop
//!
//! Runs one pass over every target, sleeps for the configured interval and
//! repeats until the shutdown token is cancelled. Passes never overlap and
//! an overrunning pass is not caught up.

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::descriptor::SecretTarget;
use crate::rotation::RotationEngine;

pub struct Scheduler {
    engine: RotationEngine,
    targets: Vec<SecretTarget>,
    interval: Duration,
}

impl Scheduler {
    pub fn new(engine: RotationEngine, targets: Vec<SecretTarget>, interval: Duration) -> Self {
        Self {
            engine,
            targets,
            interval,
        }
    }

    /// Build a scheduler whose interval is given in whole minutes
    pub fn every_minutes(engine: RotationEngine, targets: Vec<SecretTarget>, minutes: u64) -> Self {
        Self::new(engine, targets, Duration::from_secs(minutes.saturating_mul(60)))
    }

    pub fn engine(&self) -> &RotationEngine {
        &self.engine
    }

    /// Loop until `shutdown` is cancelled, returning the number of passes run.
    ///
    /// Cancellation interrupts the sleep between passes; a pass in progress
    /// always runs to completion.
    pub async fn run(&self, shutdown: CancellationToken) -> u64 {
        let mut passes = 0;
        loop {
            passes += 1;
            info!(pass = passes, targets = self.targets.len(), "Starting rotation pass");
            self.engine.run_pass(&self.targets).await;

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(passes, "Rotation loop stopped");
                    return passes;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::MemoryStore;
    use crate::backends::Store;
    use crate::descriptor::RetentionStrategy;
    use crate::status::RotationStats;
    use std::sync::Arc;

    fn scheduler(store: &Arc<MemoryStore>, targets: Vec<SecretTarget>) -> Scheduler {
        let engine = RotationEngine::new(
            Arc::clone(store) as Store,
            Arc::new(RotationStats::new()),
            16,
        );
        Scheduler::every_minutes(engine, targets, 1)
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_a_pass_per_interval() {
        let store = Arc::new(MemoryStore::with_namespaces(&["prod"]));
        let scheduler = Arc::new(scheduler(
            &store,
            vec![SecretTarget::new("db", "prod", "password", RetentionStrategy::None)],
        ));
        let shutdown = CancellationToken::new();

        let handle = {
            let scheduler = Arc::clone(&scheduler);
            let shutdown = shutdown.clone();
            tokio::spawn(async move { scheduler.run(shutdown).await })
        };

        // First pass runs immediately, then one more per minute
        tokio::time::sleep(Duration::from_secs(150)).await;
        shutdown.cancel();

        let passes = handle.await.unwrap();
        assert_eq!(passes, 3);
        assert_eq!(scheduler.engine().stats().rotation_count(), 3);
        assert_eq!(store.secret_count(), 1);
    }

    #[test]
    fn test_interval_in_minutes_saturates() {
        let store = Arc::new(MemoryStore::default());
        assert_eq!(scheduler(&store, vec![]).interval, Duration::from_secs(60));

        let engine = RotationEngine::new(
            Arc::clone(&store) as Store,
            Arc::new(RotationStats::new()),
            16,
        );
        let scheduler = Scheduler::every_minutes(engine, vec![], u64::MAX);
        assert_eq!(scheduler.interval, Duration::from_secs(u64::MAX));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_runs_single_pass() {
        let store = Arc::new(MemoryStore::with_namespaces(&["prod"]));
        let scheduler = scheduler(
            &store,
            vec![
                SecretTarget::new("a", "prod", "k", RetentionStrategy::None),
                SecretTarget::new("b", "ghost-ns", "k", RetentionStrategy::None),
            ],
        );
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        assert_eq!(scheduler.run(shutdown).await, 1);
        assert_eq!(scheduler.engine().stats().rotation_count(), 1);
        assert!(store.secret("prod", "a").is_some());
    }
}
