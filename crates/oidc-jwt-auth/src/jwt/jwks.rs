//! JWKS (JSON Web Key Set) fetching and caching
//!
//! [`KeyProvider`] owns the verification keys of one identity provider. Keys
//! are indexed by key-id and replaced wholesale whenever the set is
//! re-fetched; a [`SigningKey`] is never mutated once published.
//!
//! # Refresh on miss
//!
//! A lookup that misses the current [`KeySet`] triggers exactly one JWKS
//! re-fetch and one retry of the lookup. Refreshes are single-flight:
//!
//! - Every refresh bumps a generation counter after publishing its outcome
//! - A request remembers the generation it looked up against
//! - The first request to miss takes the refresh gate and fetches
//! - Requests queued on the gate see a newer generation once they get in and
//!   reuse the outcome of the fetch they waited on, success or failure
//!
//! The gate is the only lock held across a network call. Lookups read an
//! `Arc` snapshot of the key set and never wait for a fetch.
//!
//! # Security Considerations
//!
//! - Key-ids come from attacker-controlled token headers. They are compared
//!   byte-for-byte against the JWKS `kid` values, never decoded or escaped
//! - Refreshes are rate limited per window so unknown key-ids cannot turn
//!   into a request flood against the identity provider
//! - Waiting for someone else's refresh is bounded by a queue timeout
//! - Encryption keys (`use: enc`) are never used to verify signatures

use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, DecodingKey};
use parking_lot::RwLock;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::auth_metrics;
use crate::config::{JwtAuthConfig, KeySource};
use crate::discovery::DiscoveryResolver;
use crate::error::KeyProviderError;
use crate::transport::HttpTransport;

/// Key type family, as implied by a JWK `kty` or a JWS `alg`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyFamily {
    /// `oct` keys, HS* algorithms
    Hmac,
    /// `RSA` keys, RS* and PS* algorithms
    Rsa,
    /// `EC` keys, ES* algorithms
    Ec,
    /// `OKP` keys, EdDSA
    Ed,
}

impl KeyFamily {
    /// Family an algorithm belongs to
    pub fn of(alg: Algorithm) -> Self {
        match alg {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Self::Hmac,
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => Self::Rsa,
            Algorithm::ES256 | Algorithm::ES384 => Self::Ec,
            Algorithm::EdDSA => Self::Ed,
        }
    }

    fn from_kty(kty: &str) -> Option<Self> {
        match kty {
            "oct" => Some(Self::Hmac),
            "RSA" => Some(Self::Rsa),
            "EC" => Some(Self::Ec),
            "OKP" => Some(Self::Ed),
            _ => None,
        }
    }
}

/// JSON Web Key, as published in a JWKS document
///
/// Only the members needed to build a verification key are read.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type (`RSA`, `EC`, `OKP`, `oct`)
    pub kty: String,

    /// Key ID
    #[serde(default)]
    pub kid: Option<String>,

    /// Intended use (`sig` or `enc`)
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    /// Algorithm this key is restricted to
    #[serde(default)]
    pub alg: Option<String>,

    /// RSA modulus (base64url)
    #[serde(default)]
    pub n: Option<String>,

    /// RSA exponent (base64url)
    #[serde(default)]
    pub e: Option<String>,

    /// Curve name (`P-256`, `P-384`, `Ed25519`)
    #[serde(default)]
    pub crv: Option<String>,

    /// EC / OKP x coordinate (base64url)
    #[serde(default)]
    pub x: Option<String>,

    /// EC y coordinate (base64url)
    #[serde(default)]
    pub y: Option<String>,

    /// Symmetric key value (base64url)
    #[serde(default)]
    pub k: Option<String>,
}

impl Jwk {
    /// Build the verification key this JWK describes
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if the key is meant for
    /// encryption, has an unknown type or algorithm, or carries missing or
    /// invalid parameters.
    pub fn to_signing_key(&self) -> Result<SigningKey, String> {
        if self.key_use.as_deref() == Some("enc") {
            return Err("encryption key".to_string());
        }

        let family = KeyFamily::from_kty(&self.kty)
            .ok_or_else(|| format!("unsupported key type {:?}", self.kty))?;

        let alg = self
            .alg
            .as_deref()
            .map(|alg| {
                Algorithm::from_str(alg).map_err(|_| format!("unsupported algorithm {alg:?}"))
            })
            .transpose()?;

        if let Some(alg) = alg
            && KeyFamily::of(alg) != family
        {
            return Err(format!("algorithm {alg:?} does not fit key type {:?}", self.kty));
        }

        let key = match family {
            KeyFamily::Rsa => {
                let n = require(self.n.as_deref(), "n")?;
                let e = require(self.e.as_deref(), "e")?;
                DecodingKey::from_rsa_components(n, e).map_err(|e| e.to_string())?
            }
            KeyFamily::Ec => {
                let x = require(self.x.as_deref(), "x")?;
                let y = require(self.y.as_deref(), "y")?;
                DecodingKey::from_ec_components(x, y).map_err(|e| e.to_string())?
            }
            KeyFamily::Ed => {
                let x = require(self.x.as_deref(), "x")?;
                DecodingKey::from_ed_components(x).map_err(|e| e.to_string())?
            }
            KeyFamily::Hmac => {
                let k = require(self.k.as_deref(), "k")?;
                let secret = URL_SAFE_NO_PAD
                    .decode(k.trim_end_matches('='))
                    .map_err(|e| format!("invalid k: {e}"))?;
                if secret.is_empty() {
                    return Err("empty k".to_string());
                }
                DecodingKey::from_secret(&secret)
            }
        };

        Ok(SigningKey {
            kid: self.kid.clone(),
            family,
            alg,
            key,
        })
    }
}

fn require<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str, String> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| format!("missing parameter {name}"))
}

/// A verification key ready for use
pub struct SigningKey {
    kid: Option<String>,
    family: KeyFamily,
    alg: Option<Algorithm>,
    key: DecodingKey,
}

impl SigningKey {
    /// Key ID, if the JWK carried one
    pub fn kid(&self) -> Option<&str> {
        self.kid.as_deref()
    }

    /// Key type family
    pub fn family(&self) -> KeyFamily {
        self.family
    }

    /// Algorithm the JWK pinned, if any
    pub fn algorithm(&self) -> Option<Algorithm> {
        self.alg
    }

    /// Whether a token signed with `alg` may be verified with this key
    pub fn accepts(&self, alg: Algorithm) -> bool {
        KeyFamily::of(alg) == self.family && self.alg.is_none_or(|pinned| pinned == alg)
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }
}

// Key material stays out of Debug output.
impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("family", &self.family)
            .field("alg", &self.alg)
            .finish_non_exhaustive()
    }
}

/// Immutable set of verification keys
#[derive(Debug, Default)]
pub struct KeySet {
    by_kid: HashMap<String, Arc<SigningKey>>,
    without_kid: Vec<Arc<SigningKey>>,
}

#[derive(Deserialize)]
struct RawJwkSet {
    keys: Vec<serde_json::Value>,
}

impl KeySet {
    /// Parse a JWKS document
    ///
    /// Unusable entries are skipped with a warning. When two entries share a
    /// key-id the first one wins.
    ///
    /// # Errors
    ///
    /// Returns [`KeyProviderError::InvalidJwks`] if the body is not a JWKS
    /// object or no usable signing key remains.
    pub fn from_slice(body: &[u8]) -> Result<Self, KeyProviderError> {
        let raw: RawJwkSet = serde_json::from_slice(body)
            .map_err(|e| KeyProviderError::InvalidJwks(e.to_string()))?;

        let mut set = Self::default();
        for (index, value) in raw.keys.into_iter().enumerate() {
            let parsed = serde_json::from_value::<Jwk>(value)
                .map_err(|e| e.to_string())
                .and_then(|jwk| jwk.to_signing_key());

            match parsed {
                Ok(key) => set.insert(key),
                Err(reason) => warn!(index, reason = %reason, "Skipping unusable JWK"),
            }
        }

        if set.is_empty() {
            return Err(KeyProviderError::InvalidJwks(
                "no usable signing keys".to_string(),
            ));
        }
        Ok(set)
    }

    fn insert(&mut self, key: SigningKey) {
        let key = Arc::new(key);
        match key.kid.clone() {
            Some(kid) => {
                if self.by_kid.contains_key(&kid) {
                    warn!(key_id = ?kid, "Duplicate key id in JWKS, keeping first");
                } else {
                    self.by_kid.insert(kid, key);
                }
            }
            None => self.without_kid.push(key),
        }
    }

    /// Look up a key
    ///
    /// With a key-id this is an exact match. Without one, the key is only
    /// found when the set holds exactly one key.
    pub fn find(&self, kid: Option<&str>) -> Option<Arc<SigningKey>> {
        match kid {
            Some(kid) => self.by_kid.get(kid).cloned(),
            None if self.len() == 1 => self
                .by_kid
                .values()
                .chain(self.without_kid.iter())
                .next()
                .cloned(),
            None => None,
        }
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.by_kid.len() + self.without_kid.len()
    }

    /// Whether the set holds no keys
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Refresh coordination state, guarded by the refresh gate
struct RefreshState {
    /// Generation of the last completed refresh
    generation: u64,
    /// Outcome of that refresh, shared with requests that queued behind it
    outcome: Option<Result<Arc<KeySet>, KeyProviderError>>,
    /// Start times of recent refreshes, for rate limiting
    recent: VecDeque<Instant>,
}

/// Caching, single-flight provider of verification keys
///
/// # Example
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use oidc_jwt_auth::{JwtAuthConfig, KeyProvider, KeySource, ReqwestTransport};
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = JwtAuthConfig::default();
/// let source = KeySource::Jwks("https://idp.example.com/jwks".parse()?);
/// let transport = Arc::new(ReqwestTransport::from_config(&config)?);
///
/// let provider = KeyProvider::new(source, transport, &config);
/// let key = provider.get_key(Some("kid-1")).await?;
/// # Ok(())
/// # }
/// ```
pub struct KeyProvider {
    /// Where keys come from
    source: KeySource,
    /// HTTP transport for JWKS fetches
    transport: Arc<dyn HttpTransport>,
    /// Discovery cache, used for [`KeySource::Discovery`]
    discovery: DiscoveryResolver,
    /// Current key set snapshot
    keys: RwLock<Arc<KeySet>>,
    /// Mirrors `RefreshState::generation` for lock-free reads
    generation: AtomicU64,
    /// Single-flight gate
    gate: Mutex<RefreshState>,
    /// How long to wait for the gate
    queued_timeout: Duration,
    /// Rate limiting window
    refresh_window: Duration,
    /// Refreshes allowed per window
    refresh_limit: usize,
}

impl std::fmt::Debug for KeyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyProvider")
            .field("source", &self.source)
            .field("generation", &self.generation.load(Ordering::Acquire))
            .field("key_count", &self.keys.read().len())
            .finish_non_exhaustive()
    }
}

impl KeyProvider {
    /// Create a provider; nothing is fetched until the first lookup
    pub fn new(source: KeySource, transport: Arc<dyn HttpTransport>, config: &JwtAuthConfig) -> Self {
        Self {
            source,
            discovery: DiscoveryResolver::new(Arc::clone(&transport)),
            transport,
            keys: RwLock::new(Arc::new(KeySet::default())),
            generation: AtomicU64::new(0),
            gate: Mutex::new(RefreshState {
                generation: 0,
                outcome: None,
                recent: VecDeque::new(),
            }),
            queued_timeout: config.queued_timeout(),
            refresh_window: config.refresh_window(),
            refresh_limit: usize::try_from(config.refresh_rate_limit_count).unwrap_or(usize::MAX),
        }
    }

    /// Resolve the key for `kid`
    ///
    /// Served from the current key set when possible; otherwise the set is
    /// refreshed once (single-flight) and the lookup retried.
    ///
    /// # Errors
    ///
    /// - [`KeyProviderError::KeyNotFound`] if the key is absent after the refresh
    /// - [`KeyProviderError::Discovery`], [`KeyProviderError::Transport`] or
    ///   [`KeyProviderError::InvalidJwks`] if the refresh failed
    /// - [`KeyProviderError::RateLimited`] or [`KeyProviderError::QueueTimeout`]
    ///   if no refresh could be performed
    pub async fn get_key(&self, kid: Option<&str>) -> Result<Arc<SigningKey>, KeyProviderError> {
        let observed = self.generation.load(Ordering::Acquire);
        if let Some(key) = self.current().find(kid) {
            return Ok(key);
        }

        debug!(key_id = ?kid, "Key not in cached JWKS, refreshing");

        let keys = self.refresh(observed).await?;
        keys.find(kid).ok_or_else(|| {
            debug!(key_id = ?kid, key_count = keys.len(), "Key not found after JWKS refresh");
            KeyProviderError::KeyNotFound
        })
    }

    /// Snapshot of the current key set
    pub fn current(&self) -> Arc<KeySet> {
        Arc::clone(&self.keys.read())
    }

    /// Number of completed refreshes
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Refresh unless someone already did since `observed`
    async fn refresh(&self, observed: u64) -> Result<Arc<KeySet>, KeyProviderError> {
        let mut state = tokio::time::timeout(self.queued_timeout, self.gate.lock())
            .await
            .map_err(|_| {
                warn!(
                    timeout_ms = self.queued_timeout.as_millis() as u64,
                    "Timed out waiting for in-flight JWKS refresh"
                );
                KeyProviderError::QueueTimeout
            })?;

        if state.generation != observed
            && let Some(outcome) = &state.outcome
        {
            debug!(generation = state.generation, "Reusing outcome of concurrent JWKS refresh");
            return outcome.clone();
        }

        let now = Instant::now();
        while state
            .recent
            .front()
            .is_some_and(|started| now.duration_since(*started) >= self.refresh_window)
        {
            state.recent.pop_front();
        }
        if state.recent.len() >= self.refresh_limit {
            warn!(
                limit = self.refresh_limit,
                window_ms = self.refresh_window.as_millis() as u64,
                "JWKS refresh rate limit exceeded"
            );
            auth_metrics::record_key_refresh("rate_limited");
            return Err(KeyProviderError::RateLimited);
        }
        state.recent.push_back(now);

        let outcome = self.fetch(state.generation > 0).await.map(Arc::new);
        match &outcome {
            Ok(keys) => {
                *self.keys.write() = Arc::clone(keys);
                auth_metrics::record_key_refresh("success");
            }
            Err(e) => {
                warn!(error = %e, "JWKS refresh failed");
                auth_metrics::record_key_refresh("failure");
            }
        }

        state.generation += 1;
        state.outcome = Some(outcome.clone());
        self.generation.store(state.generation, Ordering::Release);

        outcome
    }

    /// Fetch and parse the key set; called with the gate held
    async fn fetch(&self, rediscover: bool) -> Result<KeySet, KeyProviderError> {
        let jwks_uri = self.jwks_uri(rediscover).await?;

        info!(jwks_uri = %jwks_uri, "Fetching JWKS");

        let body = self
            .transport
            .get(&jwks_uri)
            .await
            .map_err(KeyProviderError::Transport)?;
        let keys = KeySet::from_slice(&body)?;

        info!(jwks_uri = %jwks_uri, key_count = keys.len(), "JWKS fetched successfully");
        Ok(keys)
    }

    async fn jwks_uri(&self, rediscover: bool) -> Result<Url, KeyProviderError> {
        match &self.source {
            KeySource::Jwks(url) => Ok(url.clone()),
            KeySource::Discovery(discovery_url) => {
                // The provider may have moved its JWKS since the last refresh.
                if rediscover {
                    self.discovery.invalidate(discovery_url);
                }
                let document = self.discovery.resolve(discovery_url).await?;
                Ok(document.jwks_uri().clone())
            }
        }
    }
}
