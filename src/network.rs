use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::timeout;

use crate::config::Config;
use crate::emotion::EmotionVector;

/// Anything that can turn a page URL into emotion scores.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, url: &str) -> Result<EmotionVector, ClassifyError>;
}

/// HTTP client for the emotion classifier service
#[derive(Debug, Clone)]
pub struct ClassifierClient {
    client: reqwest::Client,
    endpoint: String,
    timeout_duration: Duration,
    max_response_size: usize,
}

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    url: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    emotions: Option<EmotionVector>,
    #[serde(default)]
    classification: Option<Classification>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Classification {
    status: Option<String>,
}

impl ClassifierClient {
    /// Create a client for the service at `base_url` (the `/analyze` path is appended)
    pub fn new(base_url: &str, user_agent: &str, timeout_secs: u64) -> Result<Self, ClassifyError> {
        Self::with_response_limit(base_url, user_agent, timeout_secs, Config::MAX_RESPONSE_SIZE)
    }

    /// Create a client with a custom response size limit
    pub fn with_response_limit(
        base_url: &str,
        user_agent: &str,
        timeout_secs: u64,
        max_response_size: usize,
    ) -> Result<Self, ClassifyError> {
        if timeout_secs == 0 {
            return Err(ClassifyError::Client("timeout must be at least 1 second".to_string()));
        }
        let base = url::Url::parse(base_url)
            .map_err(|e| ClassifyError::Client(format!("invalid classifier URL {}: {}", base_url, e)))?;
        let endpoint = format!("{}/analyze", base.as_str().trim_end_matches('/'));

        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(Config::CONNECT_TIMEOUT_SECS.min(timeout_secs)))
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| ClassifyError::Client(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            timeout_duration: Duration::from_secs(timeout_secs),
            max_response_size,
        })
    }

    /// Full URL requests are posted to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn analyze(&self, url: &str) -> Result<EmotionVector, ClassifyError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&AnalyzeRequest { url })
            .send()
            .await
            .map_err(Self::classify_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClassifyError::Status(status.as_u16()));
        }

        if let Some(length) = response.content_length() {
            if length as usize > self.max_response_size {
                return Err(ClassifyError::ResponseTooLarge(
                    length as usize,
                    self.max_response_size,
                ));
            }
        }

        let body = response
            .text()
            .await
            .map_err(|e| ClassifyError::Body(e.to_string()))?;

        if body.len() > self.max_response_size {
            return Err(ClassifyError::ResponseTooLarge(body.len(), self.max_response_size));
        }

        let parsed: AnalyzeResponse =
            serde_json::from_str(&body).map_err(|e| ClassifyError::Parse(e.to_string()))?;

        if let Some(status) = parsed.classification.and_then(|c| c.status) {
            tracing::debug!(url, %status, "Classifier status");
        }

        match parsed.emotions {
            Some(emotions) => Ok(emotions),
            None => Err(ClassifyError::Parse(match parsed.error {
                Some(message) => format!("classifier reported an error: {}", message),
                None => "response has no emotions object".to_string(),
            })),
        }
    }

    /// Classify reqwest errors into our ClassifyError types
    fn classify_error(error: reqwest::Error) -> ClassifyError {
        if error.is_timeout() {
            return ClassifyError::Timeout;
        }

        if error.is_connect() {
            let error_msg = format!("{:?}", error).to_lowercase();
            if error_msg.contains("connection refused") || error_msg.contains("connectionrefused") {
                return ClassifyError::ConnectionRefused;
            }
        }

        ClassifyError::Network(error.to_string())
    }
}

#[async_trait]
impl Classifier for ClassifierClient {
    async fn classify(&self, url: &str) -> Result<EmotionVector, ClassifyError> {
        // Bound the whole exchange, body included.
        timeout(self.timeout_duration, self.analyze(url))
            .await
            .map_err(|_| ClassifyError::Timeout)?
    }
}

/// Errors that can occur while talking to the classifier
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("Classifier client setup failed: {0}")]
    Client(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Connection refused - classifier not accepting connections")]
    ConnectionRefused,

    #[error("Request timeout")]
    Timeout,

    #[error("Classifier returned HTTP {0}")]
    Status(u16),

    #[error("Failed to read response body: {0}")]
    Body(String),

    #[error("Response too large: {0} bytes (max: {1} bytes)")]
    ResponseTooLarge(usize, usize),

    #[error("Malformed classifier response: {0}")]
    Parse(String),
}
