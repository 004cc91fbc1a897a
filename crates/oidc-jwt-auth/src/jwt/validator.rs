//! JWT verification
//!
//! A token moves through `parsed -> key resolved -> signature valid -> claims
//! valid`; any step can reject it. Only the last step produces
//! [`VerifiedClaims`], which cannot be built anywhere else in the crate's
//! public API.
//!
//! Claim checks run against a single "now" snapshot:
//!
//! - `exp >= now - skew` and `nbf <= now + skew`, each only when present
//! - `iss` must equal the configured issuer exactly
//! - `aud` (string or list) must share a value with the configured audiences
//!
//! # Algorithm confusion
//!
//! The header `alg` must belong to the resolved key's family, and must equal
//! the key's own `alg` when the JWK declares one. A token can therefore never
//! make an RSA public key act as an HMAC secret.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Header, Validation, decode, decode_header};
use serde_json::{Map, Value};
use tracing::debug;

use super::jwks::KeyProvider;
use crate::config::JwtAuthConfig;
use crate::error::RejectReason;

/// A compact JWS whose header has been parsed but nothing has been trusted yet
#[derive(Debug)]
pub struct RawToken<'a> {
    compact: &'a str,
    header: Header,
}

impl<'a> RawToken<'a> {
    /// Split `compact` into its three segments and decode the header
    ///
    /// # Errors
    ///
    /// Returns [`RejectReason::Malformed`] if the token does not have three
    /// non-empty segments or the header is not valid JSON naming a supported
    /// algorithm (`none` is not one).
    pub fn parse(compact: &'a str) -> Result<Self, RejectReason> {
        let segments: Vec<&str> = compact.split('.').collect();
        if segments.len() != 3 || segments.iter().any(|s| s.is_empty()) {
            return Err(RejectReason::Malformed(
                "expected three non-empty segments".to_string(),
            ));
        }

        let header = decode_header(compact)
            .map_err(|e| RejectReason::Malformed(format!("invalid header: {e}")))?;

        Ok(Self { compact, header })
    }

    /// Declared signing algorithm
    pub fn algorithm(&self) -> Algorithm {
        self.header.alg
    }

    /// Declared key-id, verbatim
    pub fn key_id(&self) -> Option<&str> {
        self.header.kid.as_deref()
    }
}

/// Claims of a token whose signature and timing checks passed
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedClaims(Map<String, Value>);

impl VerifiedClaims {
    pub(crate) fn new(claims: Map<String, Value>) -> Self {
        Self(claims)
    }

    /// Top-level claim by name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// All claims
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// Verifies tokens against keys from a [`KeyProvider`]
#[derive(Debug)]
pub struct TokenVerifier {
    keys: Arc<KeyProvider>,
    issuer: Option<String>,
    audiences: BTreeSet<String>,
    skew: i64,
}

impl TokenVerifier {
    /// Create a verifier using the issuer, audience and skew settings of `config`
    pub fn new(keys: Arc<KeyProvider>, config: &JwtAuthConfig) -> Self {
        Self {
            keys,
            issuer: config.issuer().map(str::to_string),
            audiences: config.audiences(),
            skew: i64::try_from(config.clock_skew()).unwrap_or(i64::MAX),
        }
    }

    /// Verify `token` against the current time
    ///
    /// # Errors
    ///
    /// Returns the [`RejectReason`] of the first failed step.
    pub async fn verify(&self, token: &str) -> Result<VerifiedClaims, RejectReason> {
        self.verify_at(token, Utc::now().timestamp()).await
    }

    /// Verify `token` with `now` (seconds since the epoch) as the time snapshot
    ///
    /// # Errors
    ///
    /// Returns the [`RejectReason`] of the first failed step.
    pub async fn verify_at(&self, token: &str, now: i64) -> Result<VerifiedClaims, RejectReason> {
        let raw = RawToken::parse(token)?;
        let alg = raw.algorithm();

        let key = self.keys.get_key(raw.key_id()).await?;

        if !key.accepts(alg) {
            return Err(RejectReason::SignatureInvalid(format!(
                "algorithm {alg:?} not allowed for {:?} key",
                key.family()
            )));
        }

        let mut validation = Validation::new(alg);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let claims = decode::<Map<String, Value>>(raw.compact, key.decoding_key(), &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    RejectReason::SignatureInvalid(e.to_string())
                }
                _ => RejectReason::Malformed(e.to_string()),
            })?
            .claims;

        self.check_claims(&claims, now)?;

        debug!(key_id = ?raw.key_id(), algorithm = ?alg, "JWT verified");
        Ok(VerifiedClaims::new(claims))
    }

    fn check_claims(&self, claims: &Map<String, Value>, now: i64) -> Result<(), RejectReason> {
        if let Some(exp) = numeric_date(claims, "exp")?
            && exp < now.saturating_sub(self.skew)
        {
            return Err(RejectReason::ClaimInvalid("token expired".to_string()));
        }

        if let Some(nbf) = numeric_date(claims, "nbf")?
            && nbf > now.saturating_add(self.skew)
        {
            return Err(RejectReason::ClaimInvalid("token not yet valid".to_string()));
        }

        if let Some(required) = &self.issuer {
            match claims.get("iss").and_then(Value::as_str) {
                Some(iss) if iss == required => {}
                Some(_) => return Err(RejectReason::ClaimInvalid("issuer mismatch".to_string())),
                None => return Err(RejectReason::ClaimInvalid("missing iss".to_string())),
            }
        }

        if !self.audiences.is_empty() {
            let matched = match claims.get("aud") {
                Some(Value::String(aud)) => self.audiences.contains(aud),
                Some(Value::Array(auds)) => auds
                    .iter()
                    .filter_map(Value::as_str)
                    .any(|aud| self.audiences.contains(aud)),
                Some(_) => false,
                None => return Err(RejectReason::ClaimInvalid("missing aud".to_string())),
            };
            if !matched {
                return Err(RejectReason::ClaimInvalid("audience mismatch".to_string()));
            }
        }

        Ok(())
    }
}

/// `exp`/`nbf` as whole seconds; fractional values are truncated
fn numeric_date(claims: &Map<String, Value>, name: &str) -> Result<Option<i64>, RejectReason> {
    match claims.get(name) {
        None => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .map(Some)
            .ok_or_else(|| RejectReason::ClaimInvalid(format!("{name} out of range"))),
        Some(_) => Err(RejectReason::ClaimInvalid(format!("{name} is not a number"))),
    }
}
