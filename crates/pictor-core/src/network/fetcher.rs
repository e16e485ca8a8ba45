//! Byte fetching for network locators.
//!
//! The cache store depends only on [`ByteFetcher`]; [`HttpFetcher`] is the
//! reqwest-backed implementation hosts normally plug in.

use crate::config::NetworkConfig;
use crate::{PictorError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Retrieves the raw bytes a locator points at.
///
/// Implementations own their timeout and retry policy and must eventually
/// return either bytes or a [`PictorError::FetchFailed`].
#[async_trait]
pub trait ByteFetcher: Send + Sync {
    async fn fetch(&self, locator: &str) -> Result<Bytes>;
}

/// HTTP(S) fetcher built on reqwest.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpFetcher {
    /// Create a fetcher with the default request timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(NetworkConfig::REQUEST_TIMEOUT)
    }

    /// Create a fetcher with a custom request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(NetworkConfig::CONNECT_TIMEOUT.min(timeout))
            .user_agent(NetworkConfig::USER_AGENT)
            .build()
            .map_err(|e| PictorError::Config {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl ByteFetcher for HttpFetcher {
    async fn fetch(&self, locator: &str) -> Result<Bytes> {
        debug!("GET {}", locator);

        let response = self.client.get(locator).send().await.map_err(|e| {
            let message = if e.is_timeout() {
                format!("request timed out after {:?}", self.timeout)
            } else {
                e.to_string()
            };
            PictorError::fetch_failed(locator, message, e.status().map(|s| s.as_u16()))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PictorError::fetch_failed(
                locator,
                format!("HTTP {}", status),
                Some(status.as_u16()),
            ));
        }

        let body = response.bytes().await.map_err(|e| {
            PictorError::fetch_failed(locator, format!("failed to read body: {}", e), None)
        })?;

        debug!("GET {} -> {} bytes", locator, body.len());
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_success() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/img/logo.png"))
            .and(header("user-agent", NetworkConfig::USER_AGENT))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x89, b'P', b'N', b'G']))
            .mount(&mock_server)
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let body = fetcher
            .fetch(&format!("{}/img/logo.png", mock_server.uri()))
            .await
            .unwrap();

        assert_eq!(body.as_ref(), &[0x89, b'P', b'N', b'G']);
    }

    #[tokio::test]
    async fn test_fetch_non_success_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let locator = format!("{}/missing.png", mock_server.uri());
        let err = fetcher.fetch(&locator).await.unwrap_err();

        match err {
            PictorError::FetchFailed {
                locator: failed,
                status,
                ..
            } => {
                assert_eq!(failed, locator);
                assert_eq!(status, Some(404));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&mock_server)
            .await;

        let fetcher = HttpFetcher::with_timeout(Duration::from_millis(50)).unwrap();
        let err = fetcher
            .fetch(&format!("{}/slow.png", mock_server.uri()))
            .await
            .unwrap_err();

        assert!(matches!(err, PictorError::FetchFailed { status: None, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_fetch_invalid_url() {
        let fetcher = HttpFetcher::new().unwrap();
        let err = fetcher.fetch("not a url").await.unwrap_err();
        assert!(matches!(err, PictorError::FetchFailed { .. }));
    }
}
