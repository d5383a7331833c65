// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWKS (JSON Web Key Set) fetching and caching.
//!
//! ## Behavior
//!
//! - Keys are cached per issuer, addressed by `kid`, for the lifetime of the
//!   cache. A record is replaced only by a newer fetch returning the same
//!   `kid`, or dropped by [`JwksCache::clear`].
//! - A miss (or a forced refresh) triggers at most one outstanding fetch per
//!   issuer. Concurrent callers await the same shared future; different
//!   issuers fetch independently.
//! - All keys in the fetched set are cached, not only the requested one.
//! - Readers never wait on the network: the key map is only write-locked to
//!   commit a completed fetch.
//! - A failed or timed-out fetch fails every waiter with
//!   [`JwksError::Fetch`]; the next call starts a new fetch.
//!
//! ## Usage
//!
//! Production code shares [`JwksCache::global`]. Tests build their own
//! instance around an in-process [`Fetch`].

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use jsonwebtoken::jwk::{AlgorithmParameters, EllipticCurve, Jwk, KeyAlgorithm, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tracing::instrument;

use super::error::JwksError;
use super::fetch::{Fetch, FetchRequest, ReqwestFetch};

/// Default upper bound on a single JWKS fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Where an issuer publishes its keys.
#[derive(Clone, PartialEq, Eq)]
pub struct JwksSource {
    /// Cache partition and coalescing key
    pub issuer: String,
    pub jwks_url: String,
    /// Sent as `Authorization: Bearer <api_key>`
    pub api_key: String,
}

impl JwksSource {
    /// Source for an API base URL; keys are served from `<api_url>/v1/jwks`.
    pub fn from_api(api_url: &str, api_key: impl Into<String>) -> Self {
        let issuer = api_url.trim_end_matches('/').to_string();
        Self {
            jwks_url: format!("{issuer}/v1/jwks"),
            issuer,
            api_key: api_key.into(),
        }
    }
}

impl fmt::Debug for JwksSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwksSource")
            .field("issuer", &self.issuer)
            .field("jwks_url", &self.jwks_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// A verification key from an issuer's JWKS.
#[derive(Clone)]
pub struct KeyRecord {
    pub kid: String,
    pub issuer: String,
    /// Algorithm the JWK declares via `alg`, if any
    pub algorithm: Option<Algorithm>,
    pub key: DecodingKey,
    pub fetched_at: DateTime<Utc>,
}

impl fmt::Debug for KeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRecord")
            .field("kid", &self.kid)
            .field("issuer", &self.issuer)
            .field("algorithm", &self.algorithm)
            .field("fetched_at", &self.fetched_at)
            .finish_non_exhaustive()
    }
}

impl KeyRecord {
    /// Convert a JWK into a cacheable record.
    ///
    /// Returns a short description of why the key was rejected on failure;
    /// rejected keys are skipped rather than failing the whole set.
    pub fn from_jwk(jwk: &Jwk, issuer: &str, fetched_at: DateTime<Utc>) -> Result<Self, String> {
        let kid = jwk
            .common
            .key_id
            .clone()
            .ok_or_else(|| "missing kid".to_string())?;

        if matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)) {
            return Err(format!("key {kid} is an encryption key"));
        }

        let algorithm = match jwk.common.key_algorithm {
            Some(alg) => Some(
                declared_algorithm(alg)
                    .ok_or_else(|| format!("key {kid} declares unsupported algorithm {alg:?}"))?,
            ),
            None => None,
        };

        let key = match &jwk.algorithm {
            AlgorithmParameters::RSA(rsa) => DecodingKey::from_rsa_components(&rsa.n, &rsa.e)
                .map_err(|e| format!("failed to create RSA key {kid}: {e}"))?,
            AlgorithmParameters::EllipticCurve(ec) => {
                if !matches!(ec.curve, EllipticCurve::P256 | EllipticCurve::P384) {
                    return Err(format!("key {kid} uses unsupported curve {:?}", ec.curve));
                }
                DecodingKey::from_ec_components(&ec.x, &ec.y)
                    .map_err(|e| format!("failed to create EC key {kid}: {e}"))?
            }
            AlgorithmParameters::OctetKeyPair(okp) => {
                if okp.curve != EllipticCurve::Ed25519 {
                    return Err(format!("key {kid} uses unsupported curve {:?}", okp.curve));
                }
                DecodingKey::from_ed_components(&okp.x)
                    .map_err(|e| format!("failed to create Ed25519 key {kid}: {e}"))?
            }
            _ => return Err(format!("key {kid} has an unsupported key type")),
        };

        Ok(Self {
            kid,
            issuer: issuer.to_string(),
            algorithm,
            key,
            fetched_at,
        })
    }
}

fn declared_algorithm(alg: KeyAlgorithm) -> Option<Algorithm> {
    match alg {
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        _ => None,
    }
}

/// JWKS response body. Keys are parsed one by one so a single unknown key
/// type does not invalidate the set.
#[derive(Debug, Deserialize)]
struct JwksBody {
    keys: Vec<serde_json::Value>,
}

type KeyMap = HashMap<String, HashMap<String, Arc<KeyRecord>>>;
type FetchedKeys = Arc<Vec<Arc<KeyRecord>>>;
type SharedFetch = Shared<BoxFuture<'static, Result<FetchedKeys, JwksError>>>;

struct InFlight {
    id: u64,
    fetch: SharedFetch,
}

static GLOBAL_CACHE: OnceLock<Arc<JwksCache>> = OnceLock::new();

/// Process-wide JWKS cache with per-issuer fetch coalescing.
pub struct JwksCache {
    keys: Arc<RwLock<KeyMap>>,
    in_flight: Mutex<HashMap<String, InFlight>>,
    next_fetch_id: AtomicU64,
    fetch: Arc<dyn Fetch>,
    fetch_timeout: Duration,
}

impl JwksCache {
    /// Create an empty cache around a fetch capability.
    pub fn new(fetch: Arc<dyn Fetch>) -> Self {
        Self {
            keys: Arc::new(RwLock::new(HashMap::new())),
            in_flight: Mutex::new(HashMap::new()),
            next_fetch_id: AtomicU64::new(0),
            fetch,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Create with a custom fetch timeout.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Shared instance backed by [`ReqwestFetch`]. Starts empty.
    pub fn global() -> Arc<JwksCache> {
        Self::global_with_timeout(DEFAULT_FETCH_TIMEOUT)
    }

    /// Shared instance; `timeout` only applies if this call initialises it.
    pub fn global_with_timeout(timeout: Duration) -> Arc<JwksCache> {
        Arc::clone(GLOBAL_CACHE.get_or_init(|| {
            Arc::new(
                JwksCache::new(Arc::new(ReqwestFetch::with_timeout(timeout)))
                    .with_fetch_timeout(timeout),
            )
        }))
    }

    /// Get the key for `kid`, fetching the issuer's JWKS on a miss or when
    /// `force_refresh` is set.
    ///
    /// # Errors
    ///
    /// - [`JwksError::Fetch`] if the JWKS cannot be fetched.
    /// - [`JwksError::KeyNotFound`] if `kid` is absent from a fresh fetch.
    #[instrument(skip(self, source), fields(issuer = %source.issuer))]
    pub async fn get_key(
        &self,
        kid: &str,
        source: &JwksSource,
        force_refresh: bool,
    ) -> Result<Arc<KeyRecord>, JwksError> {
        if !force_refresh {
            if let Some(record) = self.cached(&source.issuer, kid).await {
                tracing::debug!(target: "auth.jwks", kid = %kid, "JWKS cache hit");
                return Ok(record);
            }
        }

        let fetched = self.fetch_coalesced(source).await?;
        if let Some(record) = fetched.iter().find(|record| record.kid == kid) {
            return Ok(Arc::clone(record));
        }

        tracing::warn!(target: "auth.jwks", kid = %kid, "Key not found in JWKS after refresh");
        Err(JwksError::KeyNotFound {
            kid: kid.to_string(),
            available: fetched
                .iter()
                .map(|record| record.kid.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        })
    }

    /// Look up a cached key without touching the network.
    pub async fn cached(&self, issuer: &str, kid: &str) -> Option<Arc<KeyRecord>> {
        let keys = self.keys.read().await;
        keys.get(issuer).and_then(|by_kid| by_kid.get(kid)).cloned()
    }

    /// Check if any key is cached for the issuer.
    pub async fn is_cached(&self, issuer: &str) -> bool {
        let keys = self.keys.read().await;
        keys.get(issuer).is_some_and(|by_kid| !by_kid.is_empty())
    }

    /// Drop every cached key. In-flight fetches still commit when they finish.
    pub async fn clear(&self) {
        let mut keys = self.keys.write().await;
        keys.clear();
    }

    async fn fetch_coalesced(&self, source: &JwksSource) -> Result<FetchedKeys, JwksError> {
        let (id, fetch) = {
            let mut in_flight = self.in_flight.lock().await;
            match in_flight.get(&source.issuer) {
                // A finished slot is never joined: its result may be a failure.
                Some(entry) if entry.fetch.peek().is_none() => (entry.id, entry.fetch.clone()),
                _ => {
                    let id = self.next_fetch_id.fetch_add(1, Ordering::Relaxed);
                    let fetch = fetch_and_commit(
                        Arc::clone(&self.fetch),
                        Arc::clone(&self.keys),
                        source.clone(),
                        self.fetch_timeout,
                    )
                    .boxed()
                    .shared();
                    in_flight.insert(
                        source.issuer.clone(),
                        InFlight {
                            id,
                            fetch: fetch.clone(),
                        },
                    );
                    (id, fetch)
                }
            }
        };

        let result = fetch.await;

        let mut in_flight = self.in_flight.lock().await;
        if in_flight
            .get(&source.issuer)
            .is_some_and(|entry| entry.id == id)
        {
            in_flight.remove(&source.issuer);
        }
        result
    }
}

/// Fetch the issuer's JWKS and merge it into the key map.
async fn fetch_and_commit(
    fetch: Arc<dyn Fetch>,
    keys: Arc<RwLock<KeyMap>>,
    source: JwksSource,
    timeout: Duration,
) -> Result<FetchedKeys, JwksError> {
    tracing::debug!(target: "auth.jwks", url = %source.jwks_url, "Fetching JWKS");

    let fetch_error = |detail: String| JwksError::Fetch {
        url: source.jwks_url.clone(),
        detail,
    };

    let request = FetchRequest::get(&source.jwks_url)
        .header("Authorization", format!("Bearer {}", source.api_key));

    let response = match tokio::time::timeout(timeout, fetch.fetch(request)).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            tracing::error!(target: "auth.jwks", error = %e, "Failed to fetch JWKS");
            return Err(fetch_error(e.to_string()));
        }
        Err(_) => {
            tracing::error!(target: "auth.jwks", timeout = ?timeout, "JWKS fetch timed out");
            return Err(fetch_error(format!("request timed out after {timeout:?}")));
        }
    };

    if !response.status.is_success() {
        tracing::error!(
            target: "auth.jwks",
            status = %response.status,
            "JWKS endpoint returned error"
        );
        return Err(fetch_error(format!(
            "HTTP {} from JWKS endpoint",
            response.status
        )));
    }

    let body: JwksBody = serde_json::from_slice(&response.body).map_err(|e| {
        tracing::error!(target: "auth.jwks", error = %e, "Failed to parse JWKS response");
        fetch_error(format!("invalid JWKS body: {e}"))
    })?;

    let fetched_at = Utc::now();
    let records: Vec<Arc<KeyRecord>> = body
        .keys
        .into_iter()
        .filter_map(|value| {
            let parsed = serde_json::from_value::<Jwk>(value)
                .map_err(|e| format!("unparseable JWK: {e}"))
                .and_then(|jwk| KeyRecord::from_jwk(&jwk, &source.issuer, fetched_at));
            match parsed {
                Ok(record) => Some(Arc::new(record)),
                Err(reason) => {
                    tracing::warn!(target: "auth.jwks", reason = %reason, "Skipping JWK");
                    None
                }
            }
        })
        .collect();

    {
        let mut keys = keys.write().await;
        let by_kid = keys.entry(source.issuer.clone()).or_default();
        for record in &records {
            by_kid.insert(record.kid.clone(), Arc::clone(record));
        }
    }

    tracing::info!(
        target: "auth.jwks",
        issuer = %source.issuer,
        key_count = records.len(),
        "JWKS cache refreshed"
    );

    Ok(Arc::new(records))
}
