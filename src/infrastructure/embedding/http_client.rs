use std::time::Duration;

use async_trait::async_trait;

use crate::domain::DomainError;

/// Trait for HTTP client operations (for mocking)
#[async_trait]
pub trait HttpClientTrait: Send + Sync + std::fmt::Debug {
    async fn post_json(
        &self,
        url: &str,
        headers: Vec<(&str, &str)>,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, DomainError>;
}

/// Real HTTP client using reqwest
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Client whose requests fail once `timeout` elapses
    pub fn with_timeout(timeout: Duration) -> Result<Self, DomainError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                DomainError::configuration(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self { client })
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

fn send_error(e: reqwest::Error) -> DomainError {
    if e.is_timeout() {
        DomainError::provider("http", format!("Request timed out: {}", e))
    } else {
        DomainError::provider("http", format!("Request failed: {}", e))
    }
}

/// Turn a non-2xx response into a provider error carrying the body
async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, DomainError> {
    let status = response.status();

    if status.is_success() {
        return Ok(response);
    }

    let error_body = response.text().await.unwrap_or_default();

    Err(DomainError::provider(
        "http",
        format!("HTTP {}: {}", status, error_body),
    ))
}

#[async_trait]
impl HttpClientTrait for HttpClient {
    async fn post_json(
        &self,
        url: &str,
        headers: Vec<(&str, &str)>,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, DomainError> {
        let request = headers
            .into_iter()
            .fold(self.client.post(url), |request, (key, value)| request.header(key, value));

        let response = request.json(body).send().await.map_err(send_error)?;

        ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|e| DomainError::provider("http", format!("Invalid JSON body: {}", e)))
    }
}
