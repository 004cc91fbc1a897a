//! Discovery document types

use serde::Deserialize;
use url::Url;

use crate::config::check_endpoint_policy;
use crate::error::DiscoveryError;

/// The subset of an OpenID Provider Configuration used for key resolution
///
/// Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryDocument {
    issuer: String,
    jwks_uri: Url,
}

/// Wire shape; every other field is ignored
#[derive(Debug, Deserialize)]
struct RawDiscoveryDocument {
    #[serde(default)]
    issuer: Option<String>,
    #[serde(default)]
    jwks_uri: Option<String>,
}

impl DiscoveryDocument {
    /// Parse and validate a discovery document body
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError`] if the body is not a JSON object, a
    /// required field is missing or empty, or `jwks_uri` is not an
    /// acceptable endpoint.
    pub fn from_slice(body: &[u8]) -> Result<Self, DiscoveryError> {
        let raw: RawDiscoveryDocument =
            serde_json::from_slice(body).map_err(|e| DiscoveryError::InvalidJson(e.to_string()))?;

        let issuer = raw
            .issuer
            .filter(|issuer| !issuer.trim().is_empty())
            .ok_or(DiscoveryError::MissingField("issuer"))?;

        let jwks_uri = raw
            .jwks_uri
            .filter(|uri| !uri.trim().is_empty())
            .ok_or(DiscoveryError::MissingField("jwks_uri"))?;

        let jwks_uri =
            Url::parse(jwks_uri.trim()).map_err(|e| DiscoveryError::InvalidJwksUri(e.to_string()))?;
        check_endpoint_policy(&jwks_uri).map_err(DiscoveryError::InvalidJwksUri)?;

        Ok(Self { issuer, jwks_uri })
    }

    /// Issuer advertised by the provider
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// JWKS endpoint advertised by the provider
    pub fn jwks_uri(&self) -> &Url {
        &self.jwks_uri
    }
}
