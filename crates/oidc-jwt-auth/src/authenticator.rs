//! Request authentication
//!
//! [`JwtAuthenticator`] is the entry point: it locates the token in an HTTP
//! request, verifies it, and turns its claims into [`AuthCredentials`].
//!
//! Outcomes:
//!
//! - `Ok(Some(credentials))` - the token is valid
//! - `Ok(None)` - no token, or the token was rejected for any reason
//! - `Err(AuthenticatorError::BackendFailure)` - no key source is configured
//!
//! Rejection reasons are logged at `debug` and never returned, so callers
//! cannot tell an unknown key from a bad signature or a missing claim.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, warn};

use crate::auth_metrics;
use crate::claims::ClaimsExtractor;
use crate::config::JwtAuthConfig;
use crate::credentials::AuthCredentials;
use crate::error::{AuthenticatorError, ConfigError, RejectReason};
use crate::jwt::{KeyProvider, TokenVerifier};
use crate::transport::{HttpTransport, ReqwestTransport};

/// Bearer token authenticator
///
/// # Example
///
/// ```rust,no_run
/// use oidc_jwt_auth::{JwtAuthConfig, JwtAuthenticator};
/// use serde_json::json;
///
/// # async fn example(request: http::Request<()>) -> Result<(), Box<dyn std::error::Error>> {
/// let config = JwtAuthConfig::from_settings(json!({
///     "openid_connect_url": "https://idp.example.com/.well-known/openid-configuration",
///     "required_issuer": "https://idp.example.com",
///     "roles_key": "roles",
/// }))?;
/// let authenticator = JwtAuthenticator::new(config)?;
///
/// match authenticator.extract_credentials(&request).await? {
///     Some(credentials) => println!("authenticated {}", credentials.username()),
///     None => println!("WWW-Authenticate: {}", authenticator.challenge()),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct JwtAuthenticator {
    config: JwtAuthConfig,
    /// `None` when no key source is configured
    pipeline: Option<Pipeline>,
}

#[derive(Debug)]
struct Pipeline {
    verifier: TokenVerifier,
    extractor: ClaimsExtractor,
}

impl JwtAuthenticator {
    /// Create an authenticator that talks to the identity provider over `reqwest`
    ///
    /// A missing key source is accepted here and reported on every call.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the settings are invalid or the HTTP client
    /// cannot be created.
    pub fn new(config: JwtAuthConfig) -> Result<Self, ConfigError> {
        let transport = ReqwestTransport::from_config(&config)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Create an authenticator over a custom transport
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the settings are invalid.
    pub fn with_transport(
        config: JwtAuthConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let pipeline = match config.key_source()? {
            Some(source) => {
                debug!(key_source = ?source, "JWT authenticator configured");
                let keys = Arc::new(KeyProvider::new(source, transport, &config));
                Some(Pipeline {
                    verifier: TokenVerifier::new(keys, &config),
                    extractor: ClaimsExtractor::new(&config),
                })
            }
            None => {
                warn!("Neither jwks_uri nor openid_connect_url is configured; every authentication will fail");
                None
            }
        };

        Ok(Self { config, pipeline })
    }

    /// Authenticate an HTTP request
    ///
    /// The token is read from the configured header (`Bearer ` prefix
    /// optional) or, when that is missing, empty or carries `Basic`
    /// credentials, from the configured query parameter.
    ///
    /// # Errors
    ///
    /// Returns [`AuthenticatorError::BackendFailure`] if no key source is
    /// configured, whether or not the request carries a token.
    pub async fn extract_credentials<B>(
        &self,
        request: &http::Request<B>,
    ) -> Result<Option<AuthCredentials>, AuthenticatorError> {
        let pipeline = self.pipeline()?;

        let Some(token) = self.token_from(request) else {
            debug!("No JWT found in request");
            auth_metrics::record_auth_attempt("no_token");
            return Ok(None);
        };

        Ok(self.run(pipeline, &token, None).await)
    }

    /// Authenticate a bare token
    ///
    /// # Errors
    ///
    /// Returns [`AuthenticatorError::BackendFailure`] if no key source is
    /// configured.
    pub async fn authenticate_token(
        &self,
        token: &str,
    ) -> Result<Option<AuthCredentials>, AuthenticatorError> {
        let pipeline = self.pipeline()?;
        Ok(self.run(pipeline, token, None).await)
    }

    /// Authenticate a bare token with `now` (seconds since the epoch) as the
    /// time snapshot for `exp` and `nbf`
    ///
    /// # Errors
    ///
    /// Returns [`AuthenticatorError::BackendFailure`] if no key source is
    /// configured.
    pub async fn authenticate_token_at(
        &self,
        token: &str,
        now: i64,
    ) -> Result<Option<AuthCredentials>, AuthenticatorError> {
        let pipeline = self.pipeline()?;
        Ok(self.run(pipeline, token, Some(now)).await)
    }

    /// `WWW-Authenticate` value asking the client to authenticate
    pub fn challenge(&self) -> String {
        format!("Bearer realm=\"{}\"", self.config.challenge_realm)
    }

    /// Settings this authenticator was built from
    pub fn config(&self) -> &JwtAuthConfig {
        &self.config
    }

    fn pipeline(&self) -> Result<&Pipeline, AuthenticatorError> {
        self.pipeline.as_ref().ok_or_else(|| {
            error!("JWT authentication failed: no jwks_uri or openid_connect_url configured");
            auth_metrics::record_auth_attempt("backend_failure");
            AuthenticatorError::BackendFailure
        })
    }

    async fn run(&self, pipeline: &Pipeline, token: &str, now: Option<i64>) -> Option<AuthCredentials> {
        let started = Instant::now();
        let outcome = Self::authenticate(pipeline, token, now).await;
        auth_metrics::record_verification_duration(started.elapsed().as_secs_f64());

        match outcome {
            Ok(Some(credentials)) => {
                debug!(
                    username = %credentials.username(),
                    role_count = credentials.backend_roles().len(),
                    "JWT authentication succeeded"
                );
                auth_metrics::record_auth_attempt("success");
                Some(credentials)
            }
            Ok(None) => {
                debug!("JWT authentication rejected: empty subject");
                auth_metrics::record_auth_attempt("empty_subject");
                None
            }
            Err(reason) => {
                debug!(reason = reason.kind(), error = %reason, "JWT authentication rejected");
                auth_metrics::record_auth_attempt(reason.kind());
                None
            }
        }
    }

    async fn authenticate(
        pipeline: &Pipeline,
        token: &str,
        now: Option<i64>,
    ) -> Result<Option<AuthCredentials>, RejectReason> {
        let claims = match now {
            Some(now) => pipeline.verifier.verify_at(token, now).await?,
            None => pipeline.verifier.verify(token).await?,
        };
        let extracted = pipeline.extractor.extract(&claims)?;
        Ok(extracted.into_credentials())
    }

    fn token_from<B>(&self, request: &http::Request<B>) -> Option<String> {
        let from_header = request
            .headers()
            .get(self.config.jwt_header.as_str())
            .and_then(|value| value.to_str().ok())
            .filter(|value| !is_basic_auth(value))
            .map(strip_bearer)
            .filter(|token| !token.is_empty());

        if let Some(token) = from_header {
            return Some(token.to_string());
        }

        let parameter = self.config.jwt_url_parameter.as_deref()?;
        let query = request.uri().query()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(name, _)| name == parameter)
            .map(|(_, value)| value.trim().to_string())
            .filter(|token| !token.is_empty())
    }
}

/// `Basic` credentials share the `Authorization` header but are never a JWT
fn is_basic_auth(value: &str) -> bool {
    value
        .trim_start()
        .get(..6)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("basic "))
}

/// Drop an optional, case-insensitive `Bearer ` prefix
fn strip_bearer(value: &str) -> &str {
    let value = value.trim();
    match value.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("bearer ") => value[7..].trim(),
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use async_trait::async_trait;
    use url::Url;

    #[derive(Debug)]
    struct Unreachable;

    #[async_trait]
    impl HttpTransport for Unreachable {
        async fn get(&self, _url: &Url) -> Result<Vec<u8>, TransportError> {
            Err(TransportError::Request("unreachable".to_string()))
        }
    }

    fn authenticator(config: JwtAuthConfig) -> JwtAuthenticator {
        JwtAuthenticator::with_transport(config, Arc::new(Unreachable)).unwrap()
    }

    fn with_jwks(config: JwtAuthConfig) -> JwtAuthConfig {
        JwtAuthConfig {
            jwks_uri: Some("https://idp.example.com/jwks".to_string()),
            ..config
        }
    }

    #[test]
    fn test_strip_bearer() {
        assert_eq!(strip_bearer("Bearer abc"), "abc");
        assert_eq!(strip_bearer("bearer abc"), "abc");
        assert_eq!(strip_bearer("BEARER   abc "), "abc");
        assert_eq!(strip_bearer("abc"), "abc");
        assert_eq!(strip_bearer("Bearer"), "Bearer");
        assert_eq!(strip_bearer("Bearerabc"), "Bearerabc");
        assert_eq!(strip_bearer("Beärer abc"), "Beärer abc");
    }

    #[test]
    fn test_token_from_header() {
        let authenticator = authenticator(with_jwks(JwtAuthConfig::default()));
        let request = http::Request::builder()
            .header("Authorization", "Bearer a.b.c")
            .body(())
            .unwrap();

        assert_eq!(authenticator.token_from(&request).as_deref(), Some("a.b.c"));
    }

    #[test]
    fn test_token_from_custom_header_without_prefix() {
        let authenticator = authenticator(with_jwks(JwtAuthConfig {
            jwt_header: "X-Auth-Token".to_string(),
            ..JwtAuthConfig::default()
        }));
        let request = http::Request::builder()
            .header("x-auth-token", "a.b.c")
            .header("Authorization", "Bearer other")
            .body(())
            .unwrap();

        assert_eq!(authenticator.token_from(&request).as_deref(), Some("a.b.c"));
    }

    #[test]
    fn test_token_from_query_parameter() {
        let authenticator = authenticator(with_jwks(JwtAuthConfig {
            jwt_url_parameter: Some("token".to_string()),
            ..JwtAuthConfig::default()
        }));

        let query_only = http::Request::builder()
            .uri("/_search?pretty=true&token=a.b.c")
            .body(())
            .unwrap();
        assert_eq!(authenticator.token_from(&query_only).as_deref(), Some("a.b.c"));

        let empty_header = http::Request::builder()
            .uri("/_search?token=q.q.q")
            .header("Authorization", "Bearer ")
            .body(())
            .unwrap();
        assert_eq!(authenticator.token_from(&empty_header).as_deref(), Some("q.q.q"));

        let header_wins = http::Request::builder()
            .uri("/_search?token=q.q.q")
            .header("Authorization", "h.h.h")
            .body(())
            .unwrap();
        assert_eq!(authenticator.token_from(&header_wins).as_deref(), Some("h.h.h"));
    }

    #[test]
    fn test_basic_credentials_are_not_a_token() {
        let with_parameter = authenticator(with_jwks(JwtAuthConfig {
            jwt_url_parameter: Some("token".to_string()),
            ..JwtAuthConfig::default()
        }));
        let request = http::Request::builder()
            .uri("/_search?token=q.q.q")
            .header("Authorization", "Basic YWRtaW46YWRtaW4=")
            .body(())
            .unwrap();
        assert_eq!(with_parameter.token_from(&request).as_deref(), Some("q.q.q"));

        let without_parameter = authenticator(with_jwks(JwtAuthConfig::default()));
        let request = http::Request::builder()
            .header("Authorization", "basic YWRtaW46YWRtaW4=")
            .body(())
            .unwrap();
        assert!(without_parameter.token_from(&request).is_none());

        assert!(is_basic_auth("Basic abc"));
        assert!(!is_basic_auth("Bearer abc"));
        assert!(!is_basic_auth("Basicabc"));
    }

    #[test]
    fn test_query_parameter_ignored_when_not_configured() {
        let authenticator = authenticator(with_jwks(JwtAuthConfig::default()));
        let request = http::Request::builder()
            .uri("/_search?token=a.b.c")
            .body(())
            .unwrap();

        assert!(authenticator.token_from(&request).is_none());
    }

    #[tokio::test]
    async fn test_missing_key_source_fails_every_call() {
        let authenticator = authenticator(JwtAuthConfig::default());
        let without_token = http::Request::builder().body(()).unwrap();
        let with_token = http::Request::builder()
            .header("Authorization", "Bearer a.b.c")
            .body(())
            .unwrap();

        for request in [&without_token, &with_token] {
            assert_eq!(
                authenticator.extract_credentials(request).await.unwrap_err(),
                AuthenticatorError::BackendFailure
            );
        }
        assert_eq!(
            authenticator.authenticate_token("a.b.c").await.unwrap_err().to_string(),
            "Authentication backend failed"
        );
    }

    #[tokio::test]
    async fn test_no_token_is_absent() {
        let authenticator = authenticator(with_jwks(JwtAuthConfig::default()));
        let request = http::Request::builder().body(()).unwrap();

        assert_eq!(authenticator.extract_credentials(&request).await, Ok(None));
    }

    #[tokio::test]
    async fn test_unreachable_idp_is_absent() {
        let authenticator = authenticator(with_jwks(JwtAuthConfig::default()));
        let token = "eyJhbGciOiJIUzI1NiIsImtpZCI6ImtpZC0xIn0.eyJzdWIiOiJ4In0.c2ln";

        assert_eq!(authenticator.authenticate_token(token).await, Ok(None));
    }

    #[test]
    fn test_challenge() {
        let authenticator = authenticator(JwtAuthConfig::default());
        assert_eq!(authenticator.challenge(), r#"Bearer realm="OpenSearch Security""#);
    }
}
