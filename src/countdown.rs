// src/countdown.rs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::clock::Clock;

/// Whole seconds left until `end`, rounded up and floored at zero.
pub fn remaining_seconds(end: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let millis = (end - now).num_milliseconds();
    if millis <= 0 {
        0
    } else {
        (millis as u64).div_ceil(1000)
    }
}

/// Fixed-interval countdown towards an absolute end time.
///
/// Each tick recomputes the remaining time from `end - now`, so a suspended
/// or delayed timer never skews it. `on_expire` runs at most once per
/// `start`; ticks after expiry do nothing.
pub struct Countdown {
    clock: Arc<dyn Clock>,
    tick_interval: Duration,
    end: Mutex<Option<DateTime<Utc>>>,
    expired: Mutex<Arc<AtomicBool>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Countdown {
    pub fn new(clock: Arc<dyn Clock>, tick_interval: Duration) -> Self {
        Self {
            clock,
            tick_interval,
            end: Mutex::new(None),
            expired: Mutex::new(Arc::new(AtomicBool::new(false))),
            handle: Mutex::new(None),
        }
    }

    /// Starts ticking. A countdown that is already running is stopped first.
    /// The first tick fires immediately.
    pub fn start<T, E>(&self, end: DateTime<Utc>, mut on_tick: T, on_expire: E)
    where
        T: FnMut(u64) + Send + 'static,
        E: FnOnce() + Send + 'static,
    {
        self.stop();
        *self.end.lock().unwrap_or_else(|e| e.into_inner()) = Some(end);

        let expired = Arc::new(AtomicBool::new(false));
        *self.expired.lock().unwrap_or_else(|e| e.into_inner()) = Arc::clone(&expired);

        let clock = Arc::clone(&self.clock);
        let period = self.tick_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut on_expire = Some(on_expire);

            loop {
                ticker.tick().await;
                if expired.load(Ordering::Acquire) {
                    continue;
                }

                let remaining = remaining_seconds(end, clock.now());
                on_tick(remaining);

                if remaining == 0 && !expired.swap(true, Ordering::AcqRel) {
                    tracing::info!(%end, "Countdown expired");
                    if let Some(fire) = on_expire.take() {
                        fire();
                    }
                }
            }
        });

        *self.handle.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    /// Idempotent.
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

    pub fn has_expired(&self) -> bool {
        self.expired
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .load(Ordering::Acquire)
    }

    /// Remaining seconds right now, or `None` before the first `start`.
    pub fn remaining(&self) -> Option<u64> {
        let end = *self.end.lock().unwrap_or_else(|e| e.into_inner());
        end.map(|end| remaining_seconds(end, self.clock.now()))
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.stop();
    }
}
