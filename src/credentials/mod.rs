//! Token signing and verification collaborators.
//!
//! Key management and the cryptography itself live outside the engine.
//! The `jwt` authenticator consumes a [`Verifier`] and the `id_token`
//! mutator consumes a [`Signer`]; embedders provide implementations that
//! resolve keys from a JWKS URL.

use async_trait::async_trait;
use serde_json::{Map, Value};
use url::Url;

use crate::pipeline::error::DecisionResult;

/// Issues signed tokens with a key from a key set.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Signs `claims` with a key of the key set at `jwks_url`.
    async fn sign(&self, jwks_url: &Url, claims: &Map<String, Value>) -> DecisionResult<String>;
}

/// Key material and algorithms acceptable for one verification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationContext {
    /// Accepted `alg` values; empty means the verifier's default set.
    pub algorithms: Vec<String>,
    /// Key sets to resolve the token's `kid` against.
    pub key_urls: Vec<Url>,
}

/// Verifies signed tokens and returns their claims.
#[async_trait]
pub trait Verifier: Send + Sync {
    /// Returns the claims of `token` once its signature and time-based
    /// claims are valid. Failures are `Unauthorized`.
    async fn verify(
        &self,
        token: &str,
        context: &ValidationContext,
    ) -> DecisionResult<Map<String, Value>>;
}

/// Seconds since the Unix epoch, for `exp`/`iat` style claims.
pub fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
