//! # OpenID Connect Discovery
//!
//! Resolves an OIDC discovery endpoint (usually
//! `https://idp/.well-known/openid-configuration`) into the two fields the
//! authenticator needs: the provider's `issuer` and its `jwks_uri`.
//!
//! ## Caching
//!
//! A document is fetched at most once per discovery URL. It stays cached for
//! the lifetime of the resolver unless [`DiscoveryResolver::invalidate`] is
//! called, which the key provider does before re-fetching keys after a
//! key-id miss (the provider may have moved its JWKS endpoint).
//!
//! ## Validation
//!
//! - `issuer` and `jwks_uri` are required and must be non-empty
//! - `jwks_uri` must be HTTPS (HTTP only towards loopback hosts)
//! - Every other field of the document is ignored

mod resolver;
mod types;

pub use resolver::DiscoveryResolver;
pub use types::DiscoveryDocument;
