// src/autosave.rs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::{AutosaveTransientError, StoreError};
use crate::models::session::SessionSnapshot;
use crate::store::SnapshotStore;

/// Pushes whatever the session looks like *now* to the backend.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn push(&self) -> Result<(), AutosaveTransientError>;
}

/// Two-tier persistence: a synchronous local write on every mutation, and a
/// periodic coalescing push to the backend.
pub struct AutosavePersistor {
    store: SnapshotStore,
    in_flight: Arc<AtomicBool>,
    remote: Mutex<Option<JoinHandle<()>>>,
}

impl AutosavePersistor {
    pub fn new(store: SnapshotStore) -> Self {
        Self {
            store,
            in_flight: Arc::new(AtomicBool::new(false)),
            remote: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Writes the full snapshot before returning.
    pub fn record_local(&self, snapshot: &SessionSnapshot) -> Result<(), StoreError> {
        self.store.save(snapshot).inspect_err(|e| {
            tracing::error!(exam_id = snapshot.exam_id, error = %e, "Local snapshot write failed");
        })
    }

    pub fn clear_local(&self, exam_id: i64) {
        if let Err(e) = self.store.clear(exam_id) {
            tracing::warn!(exam_id, error = %e, "Failed to remove local snapshot");
        }
    }

    /// Starts pushing every `interval`, first push one interval from now.
    /// A tick that finds the previous push still in flight is skipped.
    pub fn start_remote_loop(&self, interval: Duration, sink: Arc<dyn ProgressSink>) {
        self.stop_remote_loop();

        let in_flight = Arc::clone(&self.in_flight);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                if in_flight.swap(true, Ordering::AcqRel) {
                    tracing::debug!("Previous autosave still in flight, skipping tick");
                    continue;
                }

                let sink = Arc::clone(&sink);
                let guard = InFlightGuard(Arc::clone(&in_flight));
                tokio::spawn(async move {
                    let _guard = guard;
                    if let Err(e) = sink.push().await {
                        tracing::warn!(error = %e, "Autosave failed, will retry on next tick");
                    }
                });
            }
        });

        *self.remote.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    /// Idempotent. A push already in flight is left to finish.
    pub fn stop_remote_loop(&self) {
        if let Some(handle) = self.remote.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }
    }

    pub fn is_remote_loop_running(&self) -> bool {
        self.remote
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

impl Drop for AutosavePersistor {
    fn drop(&mut self) {
        self.stop_remote_loop();
    }
}

/// Clears the in-flight flag when the push task ends, even by panic.
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
