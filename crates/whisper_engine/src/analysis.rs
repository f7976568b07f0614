use std::time::Duration;

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use whisper_core::ObservedMessage;
use whisper_logging::{agent_debug, agent_trace};

use crate::{AnalysisError, FailureKind};

/// Body of `POST {endpoint}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub conversation_id: String,
    pub context_window: Vec<ObservedMessage>,
    pub correlation_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    pub correlation_id: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

/// The opaque language-model backend.
#[async_trait::async_trait]
pub trait AnalysisService: Send + Sync {
    async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResponse, AnalysisError>;
}

#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    pub endpoint: String,
    pub connect_timeout: Duration,
    /// Per attempt; the overall request bound is enforced by the trigger engine.
    pub request_timeout: Duration,
    pub max_bytes: u64,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8787/analyze".to_string(),
            connect_timeout: Duration::from_secs(3),
            request_timeout: Duration::from_secs(8),
            max_bytes: 256 * 1024,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReqwestAnalysisClient {
    settings: AnalysisSettings,
    client: reqwest::Client,
}

impl ReqwestAnalysisClient {
    pub fn new(settings: AnalysisSettings) -> Result<Self, AnalysisError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| AnalysisError::new(FailureKind::Network, err.to_string()))?;
        Ok(Self { settings, client })
    }

    pub fn endpoint(&self) -> &str {
        &self.settings.endpoint
    }
}

#[async_trait::async_trait]
impl AnalysisService for ReqwestAnalysisClient {
    async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResponse, AnalysisError> {
        let body = serde_json::to_vec(&request)
            .map_err(|err| AnalysisError::new(FailureKind::InvalidResponse, err.to_string()))?;
        agent_debug!(
            "POST {} ({} messages, {})",
            self.settings.endpoint,
            request.context_window.len(),
            request.correlation_id
        );

        let response = self
            .client
            .post(&self.settings.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(AnalysisError::new(
                FailureKind::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }
        if let Some(content_len) = response.content_length() {
            if content_len > self.settings.max_bytes {
                return Err(AnalysisError::new(
                    FailureKind::InvalidResponse,
                    format!("response too large ({content_len} bytes)"),
                ));
            }
        }

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            if bytes.len() as u64 + chunk.len() as u64 > self.settings.max_bytes {
                return Err(AnalysisError::new(
                    FailureKind::InvalidResponse,
                    "response too large",
                ));
            }
            bytes.extend_from_slice(&chunk);
        }
        agent_trace!("analysis response {} bytes", bytes.len());

        let parsed: AnalysisResponse = serde_json::from_slice(&bytes)
            .map_err(|err| AnalysisError::new(FailureKind::InvalidResponse, err.to_string()))?;
        if parsed.correlation_id != request.correlation_id {
            return Err(AnalysisError::new(
                FailureKind::CorrelationMismatch,
                format!(
                    "expected {}, got {}",
                    request.correlation_id, parsed.correlation_id
                ),
            ));
        }
        Ok(parsed)
    }
}

fn map_reqwest_error(err: reqwest::Error) -> AnalysisError {
    if err.is_timeout() {
        return AnalysisError::new(FailureKind::Timeout, err.to_string());
    }
    AnalysisError::new(FailureKind::Network, err.to_string())
}
