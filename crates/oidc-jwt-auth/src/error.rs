//! Error taxonomy
//!
//! Two failure classes leave this crate:
//!
//! - [`AuthenticatorError`] - fatal, raised to the caller. Only produced when no
//!   key source is configured at all, which no token can ever fix.
//! - Everything else - absorbed into an absent result. [`RejectReason`] records
//!   why a token was turned away for logging, but callers of
//!   [`JwtAuthenticator`](crate::JwtAuthenticator) only ever see `Ok(None)`.

use thiserror::Error;

/// Message carried by [`AuthenticatorError::BackendFailure`].
pub const BACKEND_FAILURE_MESSAGE: &str = "Authentication backend failed";

/// Fatal authenticator errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthenticatorError {
    /// Neither `jwks_uri` nor `openid_connect_url` is configured
    #[error("{}", BACKEND_FAILURE_MESSAGE)]
    BackendFailure,
}

/// Invalid option values found while building the authenticator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A URL option did not parse
    #[error("Invalid URL for {option}: {reason}")]
    InvalidUrl {
        /// Option name
        option: &'static str,
        /// Parser or policy message
        reason: String,
    },

    /// A claim path was empty or contained an empty segment
    #[error("Invalid claim path for {option}: {reason}")]
    InvalidClaimPath {
        /// Option name
        option: &'static str,
        /// What was wrong with it
        reason: String,
    },

    /// A numeric option was not a non-negative integer
    #[error("Invalid value for {option}: {reason}")]
    InvalidNumber {
        /// Option name
        option: &'static str,
        /// What was wrong with it
        reason: String,
    },

    /// The settings document could not be deserialized
    #[error("Invalid settings: {0}")]
    Settings(String),

    /// The HTTP client could not be created
    #[error("Failed to create HTTP client: {0}")]
    HttpClient(String),
}

/// Failures talking to the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Request could not be sent or timed out
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// Endpoint answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Status {
        /// Status code returned
        status: u16,
        /// Endpoint that was called
        url: String,
    },

    /// Body exceeded the configured size cap
    #[error("Response size limit exceeded: {size} bytes (max: {limit} bytes)")]
    ResponseTooLarge {
        /// Bytes received (or announced)
        size: u64,
        /// Configured cap
        limit: usize,
    },
}

/// Discovery document could not be obtained
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    /// Endpoint unreachable or answered badly
    #[error("Discovery endpoint unreachable: {0}")]
    Transport(#[from] TransportError),

    /// Body was not a JSON object of the expected shape
    #[error("Invalid discovery document: {0}")]
    InvalidJson(String),

    /// A required field was missing or empty
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// `jwks_uri` did not parse or violates the URL policy
    #[error("Invalid jwks_uri: {0}")]
    InvalidJwksUri(String),
}

/// Key resolution failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyProviderError {
    /// No key for this id, even after one refresh
    #[error("Key not found")]
    KeyNotFound,

    /// JWKS URI could not be discovered
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// JWKS endpoint unreachable or answered badly
    #[error("JWKS fetch failed: {0}")]
    Transport(TransportError),

    /// JWKS body was not a usable key set
    #[error("Invalid JWKS: {0}")]
    InvalidJwks(String),

    /// Too many refreshes inside the configured window
    #[error("JWKS refresh rate limit exceeded")]
    RateLimited,

    /// Gave up waiting for another request's refresh
    #[error("Timed out waiting for in-flight JWKS refresh")]
    QueueTimeout,
}

/// Why a token was not turned into credentials
///
/// Never returned to callers of the authenticator; they see `Ok(None)`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    /// Token is not a well-formed compact JWS or uses an unsupported algorithm
    #[error("Malformed token: {0}")]
    Malformed(String),

    /// Discovery failed while resolving the key
    #[error("Key resolution failed: {0}")]
    Discovery(DiscoveryError),

    /// No key could be resolved for the token
    #[error("Key resolution failed: {0}")]
    KeyNotFound(KeyProviderError),

    /// Signature mismatch or algorithm confusion
    #[error("Signature invalid: {0}")]
    SignatureInvalid(String),

    /// Issuer, audience, or timing check failed
    #[error("Claim invalid: {0}")]
    ClaimInvalid(String),

    /// Configured subject or roles path could not be resolved
    #[error("Claim path missing: {0}")]
    ClaimPathMissing(String),
}

impl From<KeyProviderError> for RejectReason {
    fn from(err: KeyProviderError) -> Self {
        match err {
            KeyProviderError::Discovery(inner) => Self::Discovery(inner),
            other => Self::KeyNotFound(other),
        }
    }
}

impl RejectReason {
    /// Short stable label, used for log fields and metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed",
            Self::Discovery(_) => "discovery",
            Self::KeyNotFound(_) => "key_not_found",
            Self::SignatureInvalid(_) => "signature_invalid",
            Self::ClaimInvalid(_) => "claim_invalid",
            Self::ClaimPathMissing(_) => "claim_path_missing",
        }
    }
}
