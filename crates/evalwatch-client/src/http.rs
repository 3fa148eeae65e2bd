//! HTTP client for the evaluation API.

use std::time::Duration;

use async_trait::async_trait;
use evalwatch_core::{
    ComplianceReport, DocumentUpload, EvaluationJob, EvaluationService, FeedbackRecord,
    FeedbackUpsert, JobTicket, ServiceError,
};
use reqwest::multipart::{Form, Part};
use reqwest::{Response, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum HttpError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unexpected response shape: {0}")]
    Shape(String),
    #[error("invalid base URL {0:?}")]
    BaseUrl(String),
}

impl From<HttpError> for ServiceError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Server { status, body } => ServiceError::Server { status, body },
            HttpError::Http(e) if e.is_decode() => ServiceError::Malformed(e.to_string()),
            HttpError::Http(e) => ServiceError::Transport(e.to_string()),
            HttpError::Json(e) => ServiceError::Malformed(e.to_string()),
            HttpError::Shape(msg) => ServiceError::Malformed(msg),
            HttpError::BaseUrl(url) => ServiceError::Transport(format!("invalid base URL {url:?}")),
        }
    }
}

/// Connection settings for [`HttpEvaluationService`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL like `http://localhost:8000` (trailing slash optional).
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// FastAPI-style error body: `{"detail": "..."}`.
#[derive(Deserialize)]
struct ErrorBody {
    detail: String,
}

/// HTTP binding of [`EvaluationService`] for the evaluation API.
#[derive(Debug, Clone)]
pub struct HttpEvaluationService {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpEvaluationService {
    pub fn new(config: ClientConfig) -> Result<Self, HttpError> {
        let base_url = Url::parse(config.base_url.trim_end_matches('/'))
            .map_err(|_| HttpError::BaseUrl(config.base_url.clone()))?;
        if base_url.cannot_be_a_base() {
            return Err(HttpError::BaseUrl(config.base_url));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { client, base_url })
    }

    /// Build `{base}/api/{segments...}`, percent-encoding each segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, HttpError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| HttpError::BaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push("api")
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, HttpError> {
        let resp = self.client.get(url).send().await?;
        decode(resp).await
    }

    async fn submit(
        &self,
        upload: &DocumentUpload,
        framework_id: &str,
    ) -> Result<JobTicket, HttpError> {
        let url = self.endpoint(&["upload"])?;
        let part = Part::bytes(upload.content.clone())
            .file_name(upload.file_name.clone())
            .mime_str(content_type(upload))?;
        let form = Form::new()
            .part("file", part)
            .text("framework_id", framework_id.to_string());

        info!(url = %url, file = %upload.file_name, framework_id, "submitting document");
        let resp = self.client.post(url).multipart(form).send().await?;
        let ticket: JobTicket = decode(resp).await?;
        info!(evaluation_id = %ticket.evaluation_id, "evaluation accepted");
        Ok(ticket)
    }

    async fn feedback_list(&self, evaluation_id: &str) -> Result<Vec<FeedbackRecord>, HttpError> {
        let url = self.endpoint(&["evaluations", evaluation_id, "feedback"])?;
        let value: serde_json::Value = self.get_json(url).await?;
        if !value.is_array() {
            return Err(HttpError::Shape(format!(
                "expected a list of feedback records, got {}",
                json_kind(&value)
            )));
        }
        let records: Vec<FeedbackRecord> = serde_json::from_value(value)?;
        debug!(evaluation_id, count = records.len(), "loaded feedback");
        Ok(records)
    }

    async fn feedback_upsert(
        &self,
        evaluation_id: &str,
        requirement_id: &str,
        feedback: &FeedbackUpsert,
    ) -> Result<(), HttpError> {
        let url = self.endpoint(&["evaluations", evaluation_id, "feedback", requirement_id])?;
        debug!(evaluation_id, requirement_id, "upserting feedback");
        let resp = self.client.put(url).json(feedback).send().await?;
        check_status(resp).await?;
        Ok(())
    }
}

#[async_trait]
impl EvaluationService for HttpEvaluationService {
    async fn submit_job(
        &self,
        upload: &DocumentUpload,
        framework_id: &str,
    ) -> Result<JobTicket, ServiceError> {
        Ok(self.submit(upload, framework_id).await?)
    }

    async fn list_evaluations(&self) -> Result<Vec<EvaluationJob>, ServiceError> {
        let url = self.endpoint(&["evaluations"])?;
        Ok(self.get_json(url).await?)
    }

    async fn get_job_status(&self, evaluation_id: &str) -> Result<EvaluationJob, ServiceError> {
        let url = self.endpoint(&["evaluations", evaluation_id])?;
        debug!(evaluation_id, "querying job status");
        Ok(self.get_json(url).await?)
    }

    async fn get_compliance_report(
        &self,
        evaluation_id: &str,
    ) -> Result<ComplianceReport, ServiceError> {
        let url = self.endpoint(&["evaluations", evaluation_id, "report"])?;
        let report: ComplianceReport = self.get_json(url).await?;
        info!(
            evaluation_id,
            requirements = report.requirements.len(),
            "fetched compliance report"
        );
        Ok(report)
    }

    async fn list_feedback(
        &self,
        evaluation_id: &str,
    ) -> Result<Vec<FeedbackRecord>, ServiceError> {
        Ok(self.feedback_list(evaluation_id).await?)
    }

    async fn upsert_feedback(
        &self,
        evaluation_id: &str,
        requirement_id: &str,
        feedback: &FeedbackUpsert,
    ) -> Result<(), ServiceError> {
        Ok(self
            .feedback_upsert(evaluation_id, requirement_id, feedback)
            .await?)
    }
}

/// Turn a non-2xx response into [`HttpError::Server`], preferring the `detail` message.
async fn check_status(resp: Response) -> Result<Response, HttpError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let raw = resp.text().await.unwrap_or_default();
    let body = serde_json::from_str::<ErrorBody>(&raw)
        .map(|e| e.detail)
        .unwrap_or(raw);
    Err(HttpError::Server {
        status: status.as_u16(),
        body,
    })
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, HttpError> {
    let resp = check_status(resp).await?;
    let bytes = resp.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn content_type(upload: &DocumentUpload) -> &'static str {
    match upload.extension().as_deref() {
        Some("pdf") => "application/pdf",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => "application/octet-stream",
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "a list",
        serde_json::Value::Object(_) => "an object",
    }
}
