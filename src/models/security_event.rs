// src/models/security_event.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventType {
    TabSwitch,
    Focus,
    FullscreenExit,
    CopyAttempt,
    PasteAttempt,
    RightClick,
    Idle,
    Active,
}

impl SecurityEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEventType::TabSwitch => "tab_switch",
            SecurityEventType::Focus => "focus",
            SecurityEventType::FullscreenExit => "fullscreen_exit",
            SecurityEventType::CopyAttempt => "copy_attempt",
            SecurityEventType::PasteAttempt => "paste_attempt",
            SecurityEventType::RightClick => "right_click",
            SecurityEventType::Idle => "idle",
            SecurityEventType::Active => "active",
        }
    }
}

/// One observed integrity signal. Immutable once created: fields are private
/// and there are no setters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    event_type: SecurityEventType,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    details: Map<String, Value>,
}

impl SecurityEvent {
    pub fn new(event_type: SecurityEventType, timestamp: DateTime<Utc>) -> Self {
        Self {
            event_type,
            timestamp,
            details: Map::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn event_type(&self) -> SecurityEventType {
        self.event_type
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn details(&self) -> &Map<String, Value> {
        &self.details
    }
}
