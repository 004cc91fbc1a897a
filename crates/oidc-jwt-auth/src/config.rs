//! Authenticator Configuration
//!
//! [`JwtAuthConfig`] mirrors the flat option names operators put in their
//! security settings, so it deserializes straight from a settings document:
//!
//! ```rust
//! use oidc_jwt_auth::JwtAuthConfig;
//! use serde_json::json;
//!
//! let config = JwtAuthConfig::from_settings(json!({
//!     "openid_connect_url": "https://idp.example.com/.well-known/openid-configuration",
//!     "required_issuer": "https://idp.example.com",
//!     "required_audience": "search,dashboards",
//!     "roles_key": ["realm_access", "roles"],
//!     "jwt_clock_skew_tolerance_seconds": "30",
//! }))?;
//!
//! assert_eq!(config.audiences().len(), 2);
//! # Ok::<(), oidc_jwt_auth::ConfigError>(())
//! ```

use std::collections::BTreeSet;
use std::time::Duration;

use serde::de::{Deserializer, Error as _};
use serde::Deserialize;
use url::{Host, Url};

use crate::error::ConfigError;

/// Default header carrying the token
pub const DEFAULT_JWT_HEADER: &str = "Authorization";

/// Default realm of the `WWW-Authenticate` challenge
pub const DEFAULT_CHALLENGE_REALM: &str = "OpenSearch Security";

/// Raw authenticator settings
///
/// Every field is optional in the settings document; missing fields take the
/// defaults documented on each field. Use [`JwtAuthConfig::validate`] (done
/// by [`JwtAuthenticator::new`](crate::JwtAuthenticator::new)) to reject bad
/// values before serving requests.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JwtAuthConfig {
    /// OIDC discovery endpoint; source of issuer and `jwks_uri`
    pub openid_connect_url: Option<String>,

    /// Direct JWKS endpoint; takes precedence over discovery
    pub jwks_uri: Option<String>,

    /// Exact match required for the `iss` claim
    pub required_issuer: Option<String>,

    /// Comma-separated audiences; the token `aud` must contain at least one
    pub required_audience: Option<String>,

    /// Claim name or nested path holding backend roles
    pub roles_key: Option<ClaimPath>,

    /// Claim name or nested path holding the username (default: `sub`)
    pub subject_key: Option<ClaimPath>,

    /// Tolerance applied to `exp` and `nbf` (default: 0)
    #[serde(deserialize_with = "non_negative")]
    pub jwt_clock_skew_tolerance_seconds: u64,

    /// Header carrying the token (default: `Authorization`)
    pub jwt_header: String,

    /// Query parameter consulted when the header is missing or empty
    pub jwt_url_parameter: Option<String>,

    /// Timeout for each discovery or JWKS request (default: 5000)
    #[serde(deserialize_with = "non_negative")]
    pub idp_request_timeout_ms: u64,

    /// How long a request waits on another request's key refresh (default:
    /// 10000). Must cover a discovery fetch plus a JWKS fetch, so at least
    /// twice `idp_request_timeout_ms`.
    #[serde(deserialize_with = "non_negative")]
    pub idp_queued_thread_timeout_ms: u64,

    /// Window for refresh rate limiting (default: 10000)
    #[serde(deserialize_with = "non_negative")]
    pub refresh_rate_limit_time_window_ms: u64,

    /// Maximum JWKS refreshes per window (default: 10)
    #[serde(deserialize_with = "non_negative")]
    pub refresh_rate_limit_count: u64,

    /// Cap on discovery/JWKS response bodies (default: 256 KiB)
    #[serde(deserialize_with = "non_negative")]
    pub max_response_bytes: u64,

    /// Realm announced in the `WWW-Authenticate` challenge
    pub challenge_realm: String,
}

impl Default for JwtAuthConfig {
    fn default() -> Self {
        Self {
            openid_connect_url: None,
            jwks_uri: None,
            required_issuer: None,
            required_audience: None,
            roles_key: None,
            subject_key: None,
            jwt_clock_skew_tolerance_seconds: 0,
            jwt_header: DEFAULT_JWT_HEADER.to_string(),
            jwt_url_parameter: None,
            idp_request_timeout_ms: 5_000,
            idp_queued_thread_timeout_ms: 10_000,
            refresh_rate_limit_time_window_ms: 10_000,
            refresh_rate_limit_count: 10,
            max_response_bytes: 256 * 1024,
            challenge_realm: DEFAULT_CHALLENGE_REALM.to_string(),
        }
    }
}

/// Where verification keys come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    /// Fetch the JWKS directly from this endpoint
    Jwks(Url),
    /// Resolve the JWKS endpoint through this OIDC discovery document
    Discovery(Url),
}

impl JwtAuthConfig {
    /// Deserialize settings from a JSON document
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Settings`] for unknown options or values of the
    /// wrong type, and any error [`validate`](Self::validate) reports.
    pub fn from_settings(settings: serde_json::Value) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_value(settings).map_err(|e| ConfigError::Settings(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every option that can be checked without network access
    ///
    /// A missing key source is not an error here; the authenticator reports
    /// it on every call instead.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for unparseable or non-compliant URLs, zero
    /// timeouts, limits or size caps, a queue timeout shorter than a full
    /// refresh, or an empty `jwt_header`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.key_source()?;

        for (option, value) in [
            ("idp_request_timeout_ms", self.idp_request_timeout_ms),
            ("idp_queued_thread_timeout_ms", self.idp_queued_thread_timeout_ms),
            ("refresh_rate_limit_time_window_ms", self.refresh_rate_limit_time_window_ms),
            ("refresh_rate_limit_count", self.refresh_rate_limit_count),
            ("max_response_bytes", self.max_response_bytes),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidNumber {
                    option,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        // A refresh is at most a discovery fetch plus a JWKS fetch.
        if self.idp_queued_thread_timeout_ms < self.idp_request_timeout_ms.saturating_mul(2) {
            return Err(ConfigError::InvalidNumber {
                option: "idp_queued_thread_timeout_ms",
                reason: format!(
                    "must be at least twice idp_request_timeout_ms ({})",
                    self.idp_request_timeout_ms
                ),
            });
        }

        if self.jwt_header.trim().is_empty() {
            return Err(ConfigError::Settings("jwt_header must not be empty".to_string()));
        }

        Ok(())
    }

    /// Resolve the configured key source
    ///
    /// `jwks_uri` wins over `openid_connect_url` when both are set. `None`
    /// means no key source is configured.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidUrl`] if the selected URL does not parse
    /// or violates the endpoint policy.
    pub fn key_source(&self) -> Result<Option<KeySource>, ConfigError> {
        if let Some(raw) = non_blank(self.jwks_uri.as_deref()) {
            return endpoint_url("jwks_uri", raw).map(|url| Some(KeySource::Jwks(url)));
        }
        if let Some(raw) = non_blank(self.openid_connect_url.as_deref()) {
            return endpoint_url("openid_connect_url", raw).map(|url| Some(KeySource::Discovery(url)));
        }
        Ok(None)
    }

    /// Required audiences, split on commas
    pub fn audiences(&self) -> BTreeSet<String> {
        self.required_audience
            .as_deref()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|aud| !aud.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Required issuer, if any
    pub fn issuer(&self) -> Option<&str> {
        non_blank(self.required_issuer.as_deref())
    }

    /// Clock skew tolerance in seconds
    pub fn clock_skew(&self) -> u64 {
        self.jwt_clock_skew_tolerance_seconds
    }

    /// Per-request timeout for identity provider calls
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.idp_request_timeout_ms)
    }

    /// Wait budget for a queued key refresh
    pub fn queued_timeout(&self) -> Duration {
        Duration::from_millis(self.idp_queued_thread_timeout_ms)
    }

    /// Refresh rate limiting window
    pub fn refresh_window(&self) -> Duration {
        Duration::from_millis(self.refresh_rate_limit_time_window_ms)
    }

    /// Response size cap in bytes
    pub fn max_response_size(&self) -> usize {
        usize::try_from(self.max_response_bytes).unwrap_or(usize::MAX)
    }
}

/// Path to a claim value, possibly nested inside JSON objects
///
/// Deserializes from either a single claim name (`"roles"`) or a list of
/// names walked from the top-level claim set (`["realm_access", "roles"]`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "ClaimPathRepr")]
pub struct ClaimPath(Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum ClaimPathRepr {
    Single(String),
    Nested(Vec<String>),
}

impl TryFrom<ClaimPathRepr> for ClaimPath {
    type Error = ConfigError;

    fn try_from(repr: ClaimPathRepr) -> Result<Self, Self::Error> {
        match repr {
            ClaimPathRepr::Single(name) => Self::new([name.as_str()]),
            ClaimPathRepr::Nested(names) => Self::new(names.iter().map(String::as_str)),
        }
    }
}

impl ClaimPath {
    /// Build a path from its segments
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidClaimPath`] if there are no segments or
    /// any segment is empty.
    pub fn new<'a, I>(segments: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let segments: Vec<String> = segments.into_iter().map(str::to_string).collect();
        if segments.is_empty() {
            return Err(ConfigError::InvalidClaimPath {
                option: "claim path",
                reason: "at least one segment is required".to_string(),
            });
        }
        if segments.iter().any(|s| s.is_empty()) {
            return Err(ConfigError::InvalidClaimPath {
                option: "claim path",
                reason: "segments must not be empty".to_string(),
            });
        }
        Ok(Self(segments))
    }

    /// Path of a single top-level claim
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidClaimPath`] if `name` is empty.
    pub fn single(name: &str) -> Result<Self, ConfigError> {
        Self::new([name])
    }

    /// Path of the standard `sub` claim
    pub fn sub() -> Self {
        Self(vec!["sub".to_string()])
    }

    /// All segments, outermost first
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// The top-level claim this path starts at
    pub fn head(&self) -> &str {
        // Constructors guarantee at least one segment.
        self.0.first().map(String::as_str).unwrap_or_default()
    }
}

impl std::fmt::Display for ClaimPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

/// Parse an identity provider URL and apply the endpoint policy
pub(crate) fn endpoint_url(option: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidUrl {
        option,
        reason: e.to_string(),
    })?;
    check_endpoint_policy(&url).map_err(|reason| ConfigError::InvalidUrl { option, reason })?;
    Ok(url)
}

/// HTTPS everywhere; plain HTTP only towards loopback hosts
pub(crate) fn check_endpoint_policy(url: &Url) -> Result<(), String> {
    match url.scheme() {
        "https" => Ok(()),
        "http" if is_loopback(url) => Ok(()),
        "http" => Err("endpoint must use HTTPS (HTTP only allowed for loopback hosts)".to_string()),
        other => Err(format!("unsupported scheme: {other}")),
    }
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Accept `10` as well as `"10"`; settings stores usually carry strings
fn non_negative<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(n) => u64::try_from(n)
            .map_err(|_| D::Error::custom(format!("expected a non-negative integer, got {n}"))),
        Raw::Text(text) => text.trim().parse::<u64>().map_err(|e| {
            D::Error::custom(format!("expected a non-negative integer, got {text:?}: {e}"))
        }),
    }
}
