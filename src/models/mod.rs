// src/models/mod.rs

pub mod exam;
pub mod question;
pub mod security_event;
pub mod session;
