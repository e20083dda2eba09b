//! HTTP client abstraction for testability

use std::time::Duration;

use futures::future::BoxFuture;
use tracing::trace;

use crate::error::LocationError;

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// User-Agent sent with every request.
const USER_AGENT: &str = concat!("geofix/", env!("CARGO_PKG_VERSION"));

/// Status line and body of an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Create a response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns true for a 200 response.
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// Trait for asynchronous HTTP client operations.
///
/// This abstraction allows for dependency injection and easier testing
/// by enabling mock HTTP clients in tests. Unlike a typical client, a
/// non-success status is *not* an error here: the caller decides what a
/// status means and receives the body either way.
pub trait HttpClient: Send + Sync {
    /// Performs an HTTP GET request.
    ///
    /// # Arguments
    ///
    /// * `url` - The URL to request
    ///
    /// # Returns
    ///
    /// The status and body, or a [`LocationError::Network`] if the request
    /// could not be completed at all.
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<HttpResponse, LocationError>>;
}

/// Real HTTP client implementation using reqwest.
#[derive(Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Creates a new ReqwestClient with default configuration.
    pub fn new() -> Result<Self, LocationError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Creates a new ReqwestClient with custom timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, LocationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| LocationError::Network {
                status: None,
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<HttpResponse, LocationError>> {
        Box::pin(async move {
            let response =
                self.client
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| LocationError::Network {
                        status: None,
                        message: format!("Request failed: {}", e),
                    })?;

            let status = response.status().as_u16();
            let body = response
                .bytes()
                .await
                .map_err(|e| LocationError::Network {
                    status: Some(status),
                    message: format!("Failed to read response: {}", e),
                })?;

            trace!(status, bytes = body.len(), "HTTP GET complete");
            Ok(HttpResponse::new(status, body.to_vec()))
        })
    }
}
