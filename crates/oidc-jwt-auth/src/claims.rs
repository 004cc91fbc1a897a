//! Claims extraction
//!
//! Turns [`VerifiedClaims`] into the pieces of an identity:
//!
//! - the subject, at `subject_key` (default `sub`)
//! - backend roles, at `roles_key` (none when unset)
//! - every other top-level claim as an `attr.jwt.<name>` attribute; for a
//!   nested path only the consumed leaf is removed, siblings stay
//!
//! Claim paths walk nested objects from the top-level claim set. A path that
//! cannot be walked to the end fails the whole extraction.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};
use tracing::warn;

use crate::config::{ClaimPath, JwtAuthConfig};
use crate::credentials::{AuthCredentials, JWT_ATTRIBUTE_PREFIX};
use crate::error::RejectReason;
use crate::jwt::VerifiedClaims;

/// Identity parts read from a verified claim set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedClaims {
    /// Resolved subject
    pub subject: String,
    /// Resolved backend roles
    pub roles: BTreeSet<String>,
    /// Remaining claims, keyed `attr.jwt.<claim>`
    pub attributes: BTreeMap<String, String>,
}

impl ExtractedClaims {
    /// Assemble credentials; `None` if the subject is empty
    pub fn into_credentials(self) -> Option<AuthCredentials> {
        let mut builder = AuthCredentials::builder()
            .username(self.subject)
            .backend_roles(self.roles);
        for (name, value) in self.attributes {
            builder = builder.attribute(name, value);
        }
        builder.build()
    }
}

/// Reads subject, roles and attributes along the configured claim paths
#[derive(Debug, Clone)]
pub struct ClaimsExtractor {
    subject_key: ClaimPath,
    roles_key: Option<ClaimPath>,
}

impl ClaimsExtractor {
    /// Create an extractor from `subject_key` and `roles_key`
    pub fn new(config: &JwtAuthConfig) -> Self {
        Self::with_paths(
            config.subject_key.clone().unwrap_or_else(ClaimPath::sub),
            config.roles_key.clone(),
        )
    }

    /// Create an extractor from explicit paths
    pub fn with_paths(subject_key: ClaimPath, roles_key: Option<ClaimPath>) -> Self {
        Self {
            subject_key,
            roles_key,
        }
    }

    /// Extract subject, roles and attributes
    ///
    /// # Errors
    ///
    /// - [`RejectReason::ClaimPathMissing`] if the subject path, or a
    ///   configured roles path, does not resolve
    /// - [`RejectReason::ClaimInvalid`] if a resolved value has an unusable type
    pub fn extract(&self, claims: &VerifiedClaims) -> Result<ExtractedClaims, RejectReason> {
        let subject = self.subject(claims)?;

        let roles = match &self.roles_key {
            Some(path) => roles_from(path, resolve(claims, path)?)?,
            None => BTreeSet::new(),
        };

        let mut remaining = claims.as_map().clone();
        remove_path(&mut remaining, self.subject_key.segments());
        if let Some(path) = &self.roles_key {
            remove_path(&mut remaining, path.segments());
        }
        let attributes = remaining
            .iter()
            .map(|(name, value)| (format!("{JWT_ATTRIBUTE_PREFIX}{name}"), attribute_value(value)))
            .collect();

        Ok(ExtractedClaims {
            subject,
            roles,
            attributes,
        })
    }

    fn subject(&self, claims: &VerifiedClaims) -> Result<String, RejectReason> {
        match resolve(claims, &self.subject_key)? {
            Value::String(subject) => Ok(subject.clone()),
            value @ (Value::Number(_) | Value::Bool(_)) => {
                warn!(
                    subject_key = %self.subject_key,
                    "Subject claim is not a string, using its JSON form"
                );
                Ok(value.to_string())
            }
            _ => Err(RejectReason::ClaimInvalid(format!(
                "subject at {} is not a scalar",
                self.subject_key
            ))),
        }
    }
}

/// Walk `path` from the top-level claims to its leaf
fn resolve<'a>(claims: &'a VerifiedClaims, path: &ClaimPath) -> Result<&'a Value, RejectReason> {
    let missing = || RejectReason::ClaimPathMissing(path.to_string());

    let (head, rest) = path.segments().split_first().ok_or_else(missing)?;
    let mut current = claims.get(head).ok_or_else(missing)?;
    for segment in rest {
        current = current
            .as_object()
            .and_then(|object| object.get(segment))
            .ok_or_else(missing)?;
    }
    Ok(current)
}

/// Remove the leaf at `path`, dropping objects the removal leaves empty
fn remove_path(object: &mut Map<String, Value>, path: &[String]) {
    match path {
        [] => {}
        [leaf] => {
            object.remove(leaf);
        }
        [head, rest @ ..] => {
            if let Some(Value::Object(child)) = object.get_mut(head) {
                remove_path(child, rest);
                if child.is_empty() {
                    object.remove(head);
                }
            }
        }
    }
}

fn roles_from(path: &ClaimPath, value: &Value) -> Result<BTreeSet<String>, RejectReason> {
    let invalid = || RejectReason::ClaimInvalid(format!("roles at {path} are not strings"));

    let roles: Vec<String> = match value {
        Value::Array(items) => items
            .iter()
            .map(|item| role_from(path, item).ok_or_else(invalid))
            .collect::<Result<_, _>>()?,
        single => vec![role_from(path, single).ok_or_else(invalid)?],
    };

    Ok(roles
        .into_iter()
        .map(|role| role.trim().to_string())
        .filter(|role| !role.is_empty())
        .collect())
}

fn role_from(path: &ClaimPath, value: &Value) -> Option<String> {
    match value {
        Value::String(role) => Some(role.clone()),
        Value::Number(_) | Value::Bool(_) => {
            warn!(roles_key = %path, "Role is not a string, using its JSON form");
            Some(value.to_string())
        }
        _ => None,
    }
}

/// Strings verbatim, everything else as compact JSON
fn attribute_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
