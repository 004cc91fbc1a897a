//! # OIDC JWT Auth - Bearer Token Authentication
//!
//! Authenticates HTTP requests carrying a JSON Web Token issued by an
//! OpenID Connect identity provider, and turns the token into an identity
//! (username, backend roles, attributes) for an authorization layer.
//!
//! ## Design Principles
//!
//! - **Nothing trusted until verified**: claims are only readable through
//!   [`VerifiedClaims`], which only the verifier produces
//! - **One failure signal**: every rejected token is `Ok(None)`; only a
//!   missing key source is an error
//! - **Injectable key cache**: the [`KeyProvider`] is an owned object with
//!   single-flight refresh, not a process-wide singleton
//!
//! ## Architecture
//!
//! - [`config`] - Settings (`JwtAuthConfig`, `ClaimPath`, `KeySource`)
//! - [`transport`] - HTTP seam for identity provider calls
//! - [`discovery`] - OIDC discovery documents
//! - [`jwt`] - JWKS key provider and token verifier
//! - [`claims`] - Subject, roles and attribute extraction
//! - [`credentials`] - The `AuthCredentials` identity
//! - [`authenticator`] - Request in, credentials out
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use oidc_jwt_auth::{JwtAuthConfig, JwtAuthenticator};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let authenticator = JwtAuthenticator::new(JwtAuthConfig::from_settings(json!({
//!     "jwks_uri": "https://idp.example.com/protocol/openid-connect/certs",
//!     "required_issuer": "https://idp.example.com",
//!     "required_audience": "search",
//!     "roles_key": ["realm_access", "roles"],
//! }))?)?;
//!
//! let request = http::Request::builder()
//!     .header("Authorization", "Bearer eyJhbGciOi...")
//!     .body(())?;
//!
//! if let Some(credentials) = authenticator.extract_credentials(&request).await? {
//!     println!("{} has roles {:?}", credentials.username(), credentials.backend_roles());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `metrics` - Record authentication metrics with the `metrics` crate
//!
//! ## Standards
//!
//! - **RFC 7515** - JSON Web Signature (JWS)
//! - **RFC 7517** - JSON Web Key (JWK)
//! - **RFC 7519** - JSON Web Token (JWT)
//! - **OpenID Connect Discovery 1.0**

// Submodules
pub mod auth_metrics;
pub mod authenticator;
pub mod claims;
pub mod config;
pub mod credentials;
pub mod discovery;
pub mod error;
pub mod jwt;
pub mod transport;

#[doc(inline)]
pub use auth_metrics::init_auth_metrics;

#[doc(inline)]
pub use authenticator::JwtAuthenticator;

#[doc(inline)]
pub use claims::{ClaimsExtractor, ExtractedClaims};

#[doc(inline)]
pub use config::{ClaimPath, JwtAuthConfig, KeySource};

#[doc(inline)]
pub use credentials::{AuthCredentials, AuthCredentialsBuilder};

#[doc(inline)]
pub use discovery::{DiscoveryDocument, DiscoveryResolver};

#[doc(inline)]
pub use error::{
    AuthenticatorError, ConfigError, DiscoveryError, KeyProviderError, RejectReason,
    TransportError,
};

#[doc(inline)]
pub use jwt::{KeyProvider, SigningKey, TokenVerifier, VerifiedClaims};

#[doc(inline)]
pub use transport::{HttpTransport, ReqwestTransport};
