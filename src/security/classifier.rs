// src/security/classifier.rs

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::events::{EnvironmentSignal, InteractionKind};
use crate::models::security_event::{SecurityEvent, SecurityEventType};

/// Turns raw environment signals into security events.
///
/// Stateful transitions (visibility, focus, fullscreen, idle) are
/// edge-triggered: repeating the current state produces nothing.
#[derive(Debug)]
pub struct SignalClassifier {
    hidden: bool,
    focused: bool,
    fullscreen: Option<bool>,
    idle: bool,
    require_fullscreen: bool,
    fullscreen_prompt: bool,
}

impl SignalClassifier {
    pub fn new(require_fullscreen: bool) -> Self {
        Self {
            hidden: false,
            focused: true,
            fullscreen: None,
            idle: false,
            require_fullscreen,
            fullscreen_prompt: require_fullscreen,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.idle
    }

    /// Raised at start (when fullscreen is required) and on every exit edge;
    /// cleared once fullscreen is entered.
    pub fn fullscreen_prompt_pending(&self) -> bool {
        self.fullscreen_prompt
    }

    pub fn classify(&mut self, signal: EnvironmentSignal, now: DateTime<Utc>) -> Option<SecurityEvent> {
        match signal {
            EnvironmentSignal::VisibilityChanged { hidden: true } if !self.hidden => {
                self.hidden = true;
                Some(SecurityEvent::new(SecurityEventType::TabSwitch, now).with_detail("visibility", "hidden"))
            }
            EnvironmentSignal::VisibilityChanged { hidden: false } if self.hidden => {
                self.hidden = false;
                None
            }
            EnvironmentSignal::VisibilityChanged { .. } => None,

            EnvironmentSignal::FocusChanged { focused: false } => {
                self.focused = false;
                None
            }
            EnvironmentSignal::FocusChanged { focused: true } if !self.focused => {
                self.focused = true;
                Some(SecurityEvent::new(SecurityEventType::Focus, now).with_detail("state", "regained"))
            }
            EnvironmentSignal::FocusChanged { .. } => None,

            EnvironmentSignal::FullscreenChanged { active: true } => {
                self.fullscreen = Some(true);
                self.fullscreen_prompt = false;
                None
            }
            EnvironmentSignal::FullscreenChanged { active: false } => {
                let was = self.fullscreen.replace(false);
                if was == Some(false) {
                    return None;
                }
                self.fullscreen_prompt = self.require_fullscreen;
                match was {
                    Some(true) => Some(SecurityEvent::new(SecurityEventType::FullscreenExit, now)),
                    _ => None,
                }
            }

            EnvironmentSignal::Copy => Some(SecurityEvent::new(SecurityEventType::CopyAttempt, now)),
            EnvironmentSignal::Paste => Some(SecurityEvent::new(SecurityEventType::PasteAttempt, now)),
            EnvironmentSignal::ContextMenu => {
                Some(SecurityEvent::new(SecurityEventType::RightClick, now))
            }

            EnvironmentSignal::Interaction(kind) if self.idle => {
                self.idle = false;
                Some(SecurityEvent::new(SecurityEventType::Active, now).with_detail("via", interaction_name(kind)))
            }
            EnvironmentSignal::Interaction(_) => None,
        }
    }

    /// Called when the idle timer runs out without an interaction.
    pub fn on_idle_elapsed(&mut self, now: DateTime<Utc>, idle_for: Duration) -> Option<SecurityEvent> {
        if self.idle {
            return None;
        }
        self.idle = true;
        Some(SecurityEvent::new(SecurityEventType::Idle, now).with_detail("idle_seconds", idle_for.as_secs()))
    }
}

fn interaction_name(kind: InteractionKind) -> &'static str {
    match kind {
        InteractionKind::Pointer => "pointer",
        InteractionKind::Keyboard => "keyboard",
        InteractionKind::Touch => "touch",
        InteractionKind::Scroll => "scroll",
    }
}
