// src/backend/http.rs

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use url::Url;

use crate::backend::ExamBackend;
use crate::error::BackendError;
use crate::models::exam::{
    SaveProgressRequest, SaveProgressResponse, StartSessionResponse, SubmitResult,
    SubmitSessionRequest, TrackActivityRequest,
};

/// [`ExamBackend`] over the JSON HTTP API.
///
/// Routes (relative to the base URL):
/// * `POST /api/exams/{id}/session`
/// * `PUT  /api/exams/{id}/session/progress`
/// * `POST /api/exams/{id}/session/submit`
/// * `POST /api/exams/{id}/session/activity`
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpBackend {
    pub fn new(base_url: Url, token: Option<String>, timeout: Duration) -> Result<Self, BackendError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    fn endpoint(&self, exam_id: i64, suffix: &str) -> Result<Url, BackendError> {
        let path = format!("api/exams/{}/session{}", exam_id, suffix);
        // `join` would drop the last base segment without a trailing slash.
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        base.join(&path)
            .map_err(|e| BackendError::Transport(format!("invalid endpoint {}: {}", path, e)))
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response, BackendError> {
        let response = self.authorize(req).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        // Error bodies look like {"error": "..."}.
        let message = match response.json::<serde_json::Value>().await {
            Ok(body) => body["error"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| status.to_string()),
            Err(_) => status.to_string(),
        };
        Err(BackendError::Http {
            status: status.as_u16(),
            message,
        })
    }

    async fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, BackendError> {
        let response = self.send(req).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ExamBackend for HttpBackend {
    async fn start_session(&self, exam_id: i64) -> Result<StartSessionResponse, BackendError> {
        let url = self.endpoint(exam_id, "")?;
        self.send_json(self.client.post(url)).await
    }

    async fn save_progress(
        &self,
        req: &SaveProgressRequest,
    ) -> Result<SaveProgressResponse, BackendError> {
        let url = self.endpoint(req.exam_id, "/progress")?;
        self.send_json(self.client.put(url).json(req)).await
    }

    async fn submit_session(
        &self,
        req: &SubmitSessionRequest,
    ) -> Result<SubmitResult, BackendError> {
        let url = self.endpoint(req.exam_id, "/submit")?;
        self.send_json(self.client.post(url).json(req)).await
    }

    async fn track_activity(&self, req: &TrackActivityRequest) -> Result<(), BackendError> {
        let url = self.endpoint(req.exam_id, "/activity")?;
        self.send(self.client.post(url).json(req)).await?;
        Ok(())
    }
}
