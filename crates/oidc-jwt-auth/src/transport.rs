//! HTTP transport for identity provider calls
//!
//! Discovery and JWKS fetches go through [`HttpTransport`] so the key provider
//! never depends on a concrete client. [`ReqwestTransport`] is the production
//! implementation; tests plug in an in-process double.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::config::JwtAuthConfig;
use crate::error::{ConfigError, TransportError};

/// Fetches raw response bodies from the identity provider
#[async_trait]
pub trait HttpTransport: Send + Sync + Debug {
    /// GET `url` and return the body of a successful response
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the request fails, times out, answers
    /// with a non-success status, or exceeds the size cap.
    async fn get(&self, url: &Url) -> Result<Vec<u8>, TransportError>;
}

/// [`HttpTransport`] backed by `reqwest`
///
/// - Per-request timeout
/// - Redirects are not followed
/// - Response bodies are capped
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    max_response_size: usize,
}

impl ReqwestTransport {
    /// Create a transport with an explicit timeout and size cap
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::HttpClient`] if the TLS backend cannot be
    /// initialised.
    pub fn new(timeout: Duration, max_response_size: usize) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("oidc-jwt-auth/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            max_response_size,
        })
    }

    /// Create a transport from the `idp_request_timeout_ms` and
    /// `max_response_bytes` settings
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::HttpClient`] if the TLS backend cannot be
    /// initialised.
    pub fn from_config(config: &JwtAuthConfig) -> Result<Self, ConfigError> {
        Self::new(config.request_timeout(), config.max_response_size())
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &Url) -> Result<Vec<u8>, TransportError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TransportError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        if let Some(content_length) = response.content_length()
            && content_length > self.max_response_size as u64
        {
            return Err(TransportError::ResponseTooLarge {
                size: content_length,
                limit: self.max_response_size,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Request(format!("Failed to read response: {e}")))?;

        if body.len() > self.max_response_size {
            return Err(TransportError::ResponseTooLarge {
                size: body.len() as u64,
                limit: self.max_response_size,
            });
        }

        Ok(body.to_vec())
    }
}
