// src/lib.rs

pub mod autosave;
pub mod backend;
pub mod clock;
pub mod config;
pub mod countdown;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod resume;
pub mod security;
pub mod session;
pub mod store;
pub mod submission;

// Re-export specific items for convenience
pub use session::{SessionManager, SessionNotice};
