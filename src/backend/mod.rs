// src/backend/mod.rs

use async_trait::async_trait;

use crate::error::BackendError;
use crate::models::exam::{
    SaveProgressRequest, SaveProgressResponse, StartSessionResponse, SubmitResult,
    SubmitSessionRequest, TrackActivityRequest,
};

pub mod http;

pub use http::HttpBackend;

/// The four exam endpoints the session consumes.
#[async_trait]
pub trait ExamBackend: Send + Sync {
    /// Starts (or continues) an attempt and returns the authoritative clock anchor.
    async fn start_session(&self, exam_id: i64) -> Result<StartSessionResponse, BackendError>;

    async fn save_progress(
        &self,
        req: &SaveProgressRequest,
    ) -> Result<SaveProgressResponse, BackendError>;

    /// Terminal. Must be called at most once per session.
    async fn submit_session(&self, req: &SubmitSessionRequest)
    -> Result<SubmitResult, BackendError>;

    async fn track_activity(&self, req: &TrackActivityRequest) -> Result<(), BackendError>;
}
