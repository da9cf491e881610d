//! Background expiry sweep.
//!
//! Runs [`Lifecycle::expiry_sweep`] on a fixed interval until the shutdown
//! channel flips to `true` or its sender is dropped. A sweep in progress is
//! never interrupted; shutdown is observed between sweeps.

use std::{sync::Arc, time::Duration};

use oneshare_core::Environment;
use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, error, info};

use crate::{
    lifecycle::Lifecycle,
    storage::{BlobStore, DocumentRepository},
};

/// Spawn the sweeper on the current runtime.
///
/// The first sweep runs one `interval` after spawning.
pub fn spawn_sweeper<E, R, B>(
    engine: Arc<Lifecycle<E, R, B>>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    E: Environment,
    R: DocumentRepository,
    B: BlobStore,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        info!(interval_secs = interval.as_secs(), "expiry sweeper started");

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {},
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                },
            }

            let engine = Arc::clone(&engine);
            match tokio::task::spawn_blocking(move || engine.expiry_sweep()).await {
                Ok(Ok(report)) => debug!(?report, "sweep complete"),
                Ok(Err(e)) => error!(error = %e, "sweep failed"),
                Err(e) => error!(error = %e, "sweep task panicked"),
            }
        }

        info!("expiry sweeper stopped");
    })
}
