//! Collector Module
//!
//! Submits finalized report documents to the collector endpoint. One POST per
//! report: the pipeline's reliability contract is at-most-once, so there are
//! no retries here — a failed publish drops the message like any other stage
//! failure.

use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::time::Duration;

#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Submits one serialized report document.
    async fn publish(&self, document: String) -> Result<()>;
}

#[derive(Debug)]
pub struct HttpPublisher {
    client: Client,
    url: Url,
}

impl HttpPublisher {
    /// Creates a publisher for the given collector URL. URL or client
    /// construction failures are startup failures, handled by the caller.
    pub fn new(url: impl AsRef<str>, timeout: Duration) -> anyhow::Result<Self> {
        use anyhow::Context;
        let url = Url::parse(url.as_ref()).context("Invalid collector URL")?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl ReportSink for HttpPublisher {
    async fn publish(&self, document: String) -> Result<()> {
        let response = self
            .client
            .post(self.url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(document)
            .send()
            .await
            .map_err(|e| PipelineError::PublishFailed(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());
            Err(PipelineError::PublishFailed(format!(
                "HTTP {} - {}",
                status, body
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_publish_success() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("content-type", "application/json"))
            .and(body_string(r#"{"records": []}"#))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let publisher =
            HttpPublisher::new(mock_server.uri(), Duration::from_secs(5)).unwrap();
        assert!(publisher.publish(r#"{"records": []}"#.to_string()).await.is_ok());
    }

    #[tokio::test]
    async fn test_publish_non_success_status_fails_without_retry() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1) // exactly one attempt
            .mount(&mock_server)
            .await;

        let publisher =
            HttpPublisher::new(mock_server.uri(), Duration::from_secs(5)).unwrap();
        let err = publisher.publish("{}".to_string()).await.unwrap_err();
        assert!(matches!(err, PipelineError::PublishFailed(_)));
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_publish_timeout_fails() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&mock_server)
            .await;

        let publisher =
            HttpPublisher::new(mock_server.uri(), Duration::from_millis(200)).unwrap();
        let err = publisher.publish("{}".to_string()).await.unwrap_err();
        assert!(matches!(err, PipelineError::PublishFailed(_)));
    }

    #[test]
    fn test_invalid_url_is_a_startup_failure() {
        let result = HttpPublisher::new("not a url", Duration::from_secs(5));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Invalid collector URL"));
    }
}
