//! Authenticated identity
//!
//! [`AuthCredentials`] is the only thing the authenticator hands to the
//! authorization layer: a username, a set of backend roles, and the
//! remaining token claims as string attributes. It is immutable once built.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

/// Prefix of every attribute taken from token claims
pub const JWT_ATTRIBUTE_PREFIX: &str = "attr.jwt.";

/// Identity established from a verified token
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthCredentials {
    username: String,
    backend_roles: BTreeSet<String>,
    attributes: BTreeMap<String, String>,
}

impl AuthCredentials {
    /// Start building credentials
    pub fn builder() -> AuthCredentialsBuilder {
        AuthCredentialsBuilder::default()
    }

    /// Username (the resolved subject claim)
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Backend roles
    pub fn backend_roles(&self) -> &BTreeSet<String> {
        &self.backend_roles
    }

    /// Attributes, keyed `attr.jwt.<claim>`
    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    /// Single attribute
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Builder for [`AuthCredentials`]
///
/// # Example
///
/// ```rust
/// use oidc_jwt_auth::AuthCredentials;
///
/// let credentials = AuthCredentials::builder()
///     .username("mccoy")
///     .backend_role("a")
///     .backend_role("b")
///     .build()
///     .expect("username is set");
///
/// assert_eq!(credentials.backend_roles().len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct AuthCredentialsBuilder {
    username: Option<String>,
    backend_roles: BTreeSet<String>,
    attributes: BTreeMap<String, String>,
}

impl AuthCredentialsBuilder {
    /// Set the username
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Add a single backend role
    pub fn backend_role(mut self, role: impl Into<String>) -> Self {
        self.backend_roles.insert(role.into());
        self
    }

    /// Add backend roles
    pub fn backend_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.backend_roles.extend(roles.into_iter().map(Into::into));
        self
    }

    /// Add an attribute under its full name
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Build the credentials
    ///
    /// Returns `None` unless a non-empty username was set; there is no
    /// anonymous or partial identity.
    pub fn build(self) -> Option<AuthCredentials> {
        let username = self.username.filter(|name| !name.is_empty())?;

        Some(AuthCredentials {
            username,
            backend_roles: self.backend_roles,
            attributes: self.attributes,
        })
    }
}
