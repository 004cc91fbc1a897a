//! # Discovery Resolver
//!
//! Fetches and caches discovery documents, one per discovery URL.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info, warn};
use url::Url;

use super::types::DiscoveryDocument;
use crate::error::DiscoveryError;
use crate::transport::HttpTransport;

/// Discovery document resolver
///
/// Documents are cached without expiry; [`invalidate`](Self::invalidate)
/// forces the next [`resolve`](Self::resolve) for that URL back to the network.
#[derive(Debug)]
pub struct DiscoveryResolver {
    /// HTTP transport
    transport: Arc<dyn HttpTransport>,

    /// Discovery URL -> document
    cache: DashMap<String, Arc<DiscoveryDocument>>,
}

impl DiscoveryResolver {
    /// Create a resolver on top of `transport`
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            cache: DashMap::new(),
        }
    }

    /// Resolve `discovery_url` into its document
    ///
    /// Returns the cached document when there is one.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError`] if the endpoint is unreachable or the
    /// document is malformed. Failures are not cached.
    pub async fn resolve(&self, discovery_url: &Url) -> Result<Arc<DiscoveryDocument>, DiscoveryError> {
        if let Some(cached) = self.cache.get(discovery_url.as_str()) {
            debug!(discovery_url = %discovery_url, "Using cached discovery document");
            return Ok(Arc::clone(&cached));
        }

        info!(discovery_url = %discovery_url, "Fetching OIDC discovery document");

        let body = self.transport.get(discovery_url).await.map_err(|e| {
            warn!(discovery_url = %discovery_url, error = %e, "Failed to fetch discovery document");
            DiscoveryError::Transport(e)
        })?;

        let document = DiscoveryDocument::from_slice(&body).map_err(|e| {
            warn!(discovery_url = %discovery_url, error = %e, "Invalid discovery document");
            e
        })?;

        info!(
            discovery_url = %discovery_url,
            issuer = %document.issuer(),
            jwks_uri = %document.jwks_uri(),
            "Resolved OIDC discovery document"
        );

        let document = Arc::new(document);
        self.cache
            .insert(discovery_url.to_string(), Arc::clone(&document));

        Ok(document)
    }

    /// Drop the cached document for `discovery_url`
    pub fn invalidate(&self, discovery_url: &Url) {
        if self.cache.remove(discovery_url.as_str()).is_some() {
            debug!(discovery_url = %discovery_url, "Discovery document invalidated");
        }
    }

    /// Cached document for `discovery_url`, without fetching
    pub fn cached(&self, discovery_url: &Url) -> Option<Arc<DiscoveryDocument>> {
        self.cache
            .get(discovery_url.as_str())
            .map(|entry| Arc::clone(&entry))
    }
}
