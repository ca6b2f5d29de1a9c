// src/security/mod.rs

//! Integrity signal collection during an exam.
//!
//! This subsystem is purely observational. It records and reports tab
//! switches, fullscreen exits, clipboard use, context menus and idle periods,
//! but it cannot prevent any of them: a candidate can still copy, paste or
//! leave the page. Anyone relying on these events for compliance must treat
//! them as evidence for later review, not as enforcement.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::clock::Clock;
use crate::error::{EventSourceError, SecurityReportError};
use crate::events::{EnvironmentSignal, EventSource};
use crate::models::security_event::SecurityEvent;

pub mod classifier;

pub use classifier::SignalClassifier;

/// Receives every classified event. Failures are logged and dropped.
#[async_trait]
pub trait SecurityReporter: Send + Sync {
    async fn report(&self, event: &SecurityEvent) -> Result<(), SecurityReportError>;
}

#[derive(Debug, Default)]
struct MonitorShared {
    events: Vec<SecurityEvent>,
    idle: bool,
    fullscreen_prompt: bool,
}

pub struct SecurityMonitor {
    clock: Arc<dyn Clock>,
    idle_timeout: Duration,
    require_fullscreen: bool,
    shared: Arc<Mutex<MonitorShared>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SecurityMonitor {
    pub fn new(clock: Arc<dyn Clock>, idle_timeout: Duration, require_fullscreen: bool) -> Self {
        Self {
            clock,
            idle_timeout,
            require_fullscreen,
            shared: Arc::new(Mutex::new(MonitorShared::default())),
            handle: Mutex::new(None),
        }
    }

    /// Subscribes to `source` and starts classifying. Calling it again while
    /// running is a no-op, so signals are never delivered twice.
    pub fn start(
        &self,
        exam_id: i64,
        source: &dyn EventSource,
        reporter: Arc<dyn SecurityReporter>,
    ) -> Result<(), EventSourceError> {
        let mut handle_slot = self.handle.lock().unwrap_or_else(|e| e.into_inner());
        if handle_slot.as_ref().is_some_and(|h| !h.is_finished()) {
            tracing::debug!(exam_id, "Security monitor already registered");
            return Ok(());
        }

        let mut subscription = source.subscribe()?;

        {
            let mut shared = self.shared.lock().unwrap_or_else(|e| e.into_inner());
            *shared = MonitorShared {
                fullscreen_prompt: self.require_fullscreen,
                ..MonitorShared::default()
            };
        }

        let clock = Arc::clone(&self.clock);
        let shared = Arc::clone(&self.shared);
        let idle_timeout = self.idle_timeout;
        let require_fullscreen = self.require_fullscreen;

        let handle = tokio::spawn(async move {
            let mut classifier = SignalClassifier::new(require_fullscreen);
            let idle_timer = tokio::time::sleep(idle_timeout);
            tokio::pin!(idle_timer);

            loop {
                let event = tokio::select! {
                    signal = subscription.next() => {
                        let Some(signal) = signal else {
                            break;
                        };
                        if matches!(signal, EnvironmentSignal::Interaction(_)) {
                            idle_timer.as_mut().reset(Instant::now() + idle_timeout);
                        }
                        classifier.classify(signal, clock.now())
                    }
                    () = &mut idle_timer, if !classifier.is_idle() => {
                        classifier.on_idle_elapsed(clock.now(), idle_timeout)
                    }
                };

                {
                    let mut shared = shared.lock().unwrap_or_else(|e| e.into_inner());
                    shared.idle = classifier.is_idle();
                    shared.fullscreen_prompt = classifier.fullscreen_prompt_pending();
                    if let Some(event) = &event {
                        shared.events.push(event.clone());
                    }
                }

                if let Some(event) = event {
                    tracing::info!(exam_id, event = event.event_type().as_str(), "Security event");
                    let reporter = Arc::clone(&reporter);
                    tokio::spawn(async move {
                        if let Err(e) = reporter.report(&event).await {
                            tracing::warn!(
                                exam_id,
                                event = event.event_type().as_str(),
                                error = %e,
                                "Dropping undeliverable security event"
                            );
                        }
                    });
                }
            }
        });

        *handle_slot = Some(handle);
        tracing::info!(exam_id, "Security monitor started");
        Ok(())
    }

    /// Idempotent. Dropping the task releases the event source registration.
    pub fn stop(&self) {
        if let Some(handle) = self.handle.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// All events observed since the last `start`, oldest first.
    pub fn events(&self) -> Vec<SecurityEvent> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner()).events.clone()
    }

    pub fn is_idle(&self) -> bool {
        self.shared.lock().unwrap_or_else(|e| e.into_inner()).idle
    }

    pub fn fullscreen_prompt_pending(&self) -> bool {
        self.shared
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .fullscreen_prompt
    }
}

impl Drop for SecurityMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
