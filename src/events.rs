// src/events.rs

//! Environment signals (visibility, fullscreen, clipboard, interaction) and a
//! single-registration source for them.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::error::EventSourceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionKind {
    Pointer,
    Keyboard,
    Touch,
    Scroll,
}

/// A raw transition reported by the host environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentSignal {
    VisibilityChanged { hidden: bool },
    FocusChanged { focused: bool },
    FullscreenChanged { active: bool },
    Copy,
    Paste,
    ContextMenu,
    Interaction(InteractionKind),
}

pub trait EventSource: Send + Sync {
    /// Registers the single listener. Fails while another subscription is alive.
    fn subscribe(&self) -> Result<Subscription, EventSourceError>;
}

type Slot = Arc<Mutex<Option<mpsc::UnboundedSender<EnvironmentSignal>>>>;

/// The one live registration on an event source. Dropping it unregisters.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<EnvironmentSignal>,
    slot: Slot,
}

impl Subscription {
    pub async fn next(&mut self) -> Option<EnvironmentSignal> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        *slot = None;
    }
}

/// In-process [`EventSource`] fed through [`SignalEmitter`] handles.
#[derive(Default)]
pub struct ChannelEventSource {
    slot: Slot,
}

impl ChannelEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emitter(&self) -> SignalEmitter {
        SignalEmitter {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl EventSource for ChannelEventSource {
    fn subscribe(&self) -> Result<Subscription, EventSourceError> {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if slot.as_ref().is_some_and(|tx| !tx.is_closed()) {
            return Err(EventSourceError::AlreadySubscribed);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        *slot = Some(tx);
        Ok(Subscription {
            rx,
            slot: Arc::clone(&self.slot),
        })
    }
}

/// Cloneable handle the host uses to push signals.
#[derive(Clone)]
pub struct SignalEmitter {
    slot: Slot,
}

impl SignalEmitter {
    /// Returns false when nobody is listening; the signal is dropped.
    pub fn emit(&self, signal: EnvironmentSignal) -> bool {
        let slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        match slot.as_ref() {
            Some(tx) => tx.send(signal).is_ok(),
            None => false,
        }
    }
}
