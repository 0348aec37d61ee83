//! Background autosave task.
//!
//! Wakes every period and flushes the store if it is dirty. The flush takes
//! the document lock, so it is serialized with mutations and can never run
//! twice at once. Shutdown order is fixed: cancel the task, wait for any
//! in-flight flush, then one final forced flush under the lock.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, StoreError};
use crate::store::DocumentStore;

/// Running autosave task
#[derive(Debug)]
pub struct AutosaveHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
    store: Arc<DocumentStore>,
}

/// Start the autosave loop on the current tokio runtime
pub fn spawn_autosave(store: Arc<DocumentStore>, period: Duration) -> AutosaveHandle {
    let token = CancellationToken::new();
    let task = tokio::spawn(run(Arc::clone(&store), period, token.clone()));
    tracing::debug!(period_ms = period.as_millis() as u64, "autosave started");
    AutosaveHandle { token, task, store }
}

impl AutosaveHandle {
    /// True once [`shutdown`](Self::shutdown) has been requested
    pub fn is_stopping(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Stop the loop, then perform the final forced flush
    pub async fn shutdown(self) -> Result<()> {
        self.token.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "autosave task ended abnormally");
        }

        let store = self.store;
        tokio::task::spawn_blocking(move || store.force_save())
            .await
            .map_err(|e| StoreError::Io(io::Error::other(e.to_string())))?
    }
}

async fn run(store: Arc<DocumentStore>, period: Duration, token: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick fires immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let store = Arc::clone(&store);
                match tokio::task::spawn_blocking(move || store.try_save()).await {
                    Ok(Ok(true)) => tracing::debug!("autosaved"),
                    Ok(Ok(false)) => {}
                    Ok(Err(e)) => tracing::warn!(error = %e, "autosave failed"),
                    Err(e) => tracing::warn!(error = %e, "autosave flush panicked"),
                }
            }
        }
    }

    tracing::debug!("autosave stopped");
}
