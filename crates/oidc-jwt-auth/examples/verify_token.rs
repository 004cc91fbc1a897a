//! Authenticate a single bearer token from the command line
//!
//! Loads authenticator settings from a JSON file and prints the resulting
//! identity, or the challenge a client would receive.
//!
//! ```text
//! RUST_LOG=oidc_jwt_auth=debug \
//!     cargo run --example verify_token -- settings.json eyJhbGciOi...
//! ```
//!
//! Example `settings.json`:
//!
//! ```json
//! {
//!   "openid_connect_url": "https://idp.example.com/.well-known/openid-configuration",
//!   "required_audience": "search",
//!   "roles_key": ["realm_access", "roles"]
//! }
//! ```

use anyhow::{Context, Result};
use oidc_jwt_auth::{JwtAuthConfig, JwtAuthenticator};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(settings_path), Some(token)) = (args.next(), args.next()) else {
        anyhow::bail!("usage: verify_token <settings.json> <token>");
    };

    let raw = std::fs::read_to_string(&settings_path)
        .with_context(|| format!("reading {settings_path}"))?;
    let settings: serde_json::Value = serde_json::from_str(&raw).context("parsing settings")?;
    let config = JwtAuthConfig::from_settings(settings)?;
    let authenticator = JwtAuthenticator::new(config)?;

    let request = http::Request::builder()
        .header(authenticator.config().jwt_header.as_str(), format!("Bearer {token}"))
        .body(())?;

    match authenticator.extract_credentials(&request).await? {
        Some(credentials) => println!("{}", serde_json::to_string_pretty(&credentials)?),
        None => println!("401 Unauthorized\nWWW-Authenticate: {}", authenticator.challenge()),
    }

    Ok(())
}
