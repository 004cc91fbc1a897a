//! JWT infrastructure
//!
//! ```text
//! ┌───────────────────────┐     ┌───────────────────────┐
//! │    TokenVerifier      │────▶│     KeyProvider       │
//! │  parse / verify sig / │     │  KeySet snapshot      │
//! │  exp, nbf, iss, aud   │     │  single-flight refresh│
//! └───────────────────────┘     └───────────┬───────────┘
//!                                           │ jwks_uri
//!                               ┌───────────▼───────────┐
//!                               │  DiscoveryResolver    │
//!                               └───────────────────────┘
//! ```
//!
//! Signature checks use the `jsonwebtoken` crate; timing, issuer and audience
//! checks are done here so they share one "now" snapshot and exact-match
//! semantics.
//!
//! # Modules
//!
//! - `jwks` - JWK parsing, key sets and the caching key provider
//! - `validator` - token parsing and verification

pub mod jwks;
pub mod validator;

// Re-export commonly used types
pub use jwks::{Jwk, KeyFamily, KeyProvider, KeySet, SigningKey};
pub use validator::{RawToken, TokenVerifier, VerifiedClaims};
