// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session JWT verification.
//!
//! Checks run in a fixed order and stop at the first failure:
//!
//! 1. Structure: size limit, three base64url segments, JSON object header
//!    and payload
//! 2. Algorithm and key ID from the header
//! 3. Key resolution through the [`JwksCache`] (or a configured PEM key)
//! 4. Signature over `header.payload`
//! 5. Claims: `sub`, `sid`, `exp`, `nbf`, `iat` (with clock skew), `azp`

use std::sync::Arc;
use std::time::Duration;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::instrument;

use super::claims::{numeric_date_value, VerifiedClaims};
use super::error::{TokenCarrier, TokenError, TokenVerificationErrorReason as Reason};
use super::jwks::{JwksCache, JwksSource};

/// Default clock skew tolerance, applied to `exp`, `nbf` and `iat` alike.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(5);

/// Upper bound on a compact token, checked before any decoding.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

const INVALID_FORM: &str =
    "Invalid JWT form. A JWT consists of three parts separated by dots.";

const SUPPORTED_ALGORITHMS: [(&str, Algorithm); 6] = [
    ("RS256", Algorithm::RS256),
    ("RS384", Algorithm::RS384),
    ("RS512", Algorithm::RS512),
    ("ES256", Algorithm::ES256),
    ("ES384", Algorithm::ES384),
    ("EdDSA", Algorithm::EdDSA),
];

/// base64url, padding optional on decode.
const BASE64URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Per-request verification parameters.
#[derive(Debug, Clone)]
pub struct VerifyTokenOptions {
    /// JWKS location and credential
    pub source: JwksSource,
    /// PEM public key; when set the JWKS is never consulted
    pub jwt_key: Option<String>,
    /// Allowed `azp` values; empty disables the check
    pub authorized_parties: Vec<String>,
    pub clock_skew: Duration,
    /// Refetch the JWKS even on a cache hit
    pub skip_jwks_cache: bool,
    /// Where the token came from; echoed in error messages
    pub carrier: TokenCarrier,
}

impl VerifyTokenOptions {
    pub fn new(source: JwksSource, carrier: TokenCarrier) -> Self {
        Self {
            source,
            jwt_key: None,
            authorized_parties: Vec::new(),
            clock_skew: DEFAULT_CLOCK_SKEW,
            skip_jwks_cache: false,
            carrier,
        }
    }
}

#[derive(Debug, Deserialize)]
struct JwtHeader {
    alg: String,
    #[serde(default)]
    kid: Option<String>,
    #[serde(default)]
    typ: Option<String>,
}

struct DecodedJwt<'a> {
    header: JwtHeader,
    payload: Map<String, Value>,
    signing_input: &'a str,
    signature: &'a str,
}

/// Verifies session tokens against keys from a [`JwksCache`].
#[derive(Clone)]
pub struct TokenVerifier {
    cache: Arc<JwksCache>,
    clock: Arc<dyn Clock>,
}

impl TokenVerifier {
    pub fn new(cache: Arc<JwksCache>) -> Self {
        Self {
            cache,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock, e.g. to pin time in tests.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn cache(&self) -> &Arc<JwksCache> {
        &self.cache
    }

    /// Verify a compact JWT and return its claims.
    ///
    /// # Errors
    ///
    /// [`TokenError::Invalid`] for malformed tokens, otherwise
    /// [`TokenError::Verification`] tagged with the failing check.
    #[instrument(skip_all, fields(carrier = %options.carrier))]
    pub async fn verify(
        &self,
        token: &str,
        options: &VerifyTokenOptions,
    ) -> Result<VerifiedClaims, TokenError> {
        let carrier = options.carrier;
        let decoded = decode_jwt(token, carrier)?;

        let algorithm = supported_algorithm(&decoded.header.alg).ok_or_else(|| {
            TokenError::verification(
                Reason::TokenInvalidAlgorithm,
                format!(
                    "Invalid JWT algorithm \"{}\". Supported: {}.",
                    decoded.header.alg,
                    SUPPORTED_ALGORITHMS
                        .iter()
                        .map(|(name, _)| *name)
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
                carrier,
            )
        })?;

        let key = self.resolve_key(&decoded.header, algorithm, options).await?;

        match jsonwebtoken::crypto::verify(
            decoded.signature,
            decoded.signing_input.as_bytes(),
            &key,
            algorithm,
        ) {
            Ok(true) => {}
            Ok(false) => return Err(signature_failed(carrier)),
            Err(e) => {
                tracing::debug!(target: "auth.verify", error = %e, "Signature check errored");
                return Err(signature_failed(carrier));
            }
        }

        validate_claims(&decoded.payload, self.clock.now().timestamp(), options)?;

        Ok(VerifiedClaims::new(decoded.payload))
    }

    async fn resolve_key(
        &self,
        header: &JwtHeader,
        algorithm: Algorithm,
        options: &VerifyTokenOptions,
    ) -> Result<DecodingKey, TokenError> {
        let carrier = options.carrier;

        if let Some(pem) = &options.jwt_key {
            return local_key(pem, algorithm).map_err(|e| {
                TokenError::verification(
                    Reason::JwkFailedToLoad,
                    format!("Failed to load the configured JWT public key: {e}"),
                    carrier,
                )
            });
        }

        let kid = header.kid.as_deref().ok_or_else(|| {
            TokenError::invalid(
                "Invalid JWT form. The header does not contain a key ID (kid).",
                carrier,
            )
        })?;

        let record = self
            .cache
            .get_key(kid, &options.source, options.skip_jwks_cache)
            .await
            .map_err(|e| TokenError::from_jwks(e, carrier))?;

        if let Some(declared) = record.algorithm {
            if declared != algorithm {
                return Err(TokenError::verification(
                    Reason::TokenInvalidAlgorithm,
                    format!(
                        "Invalid JWT algorithm \"{}\". Signing key {} is declared for {declared:?}.",
                        header.alg, record.kid
                    ),
                    carrier,
                ));
            }
        }

        Ok(record.key.clone())
    }
}

fn supported_algorithm(name: &str) -> Option<Algorithm> {
    SUPPORTED_ALGORITHMS
        .iter()
        .find(|(supported, _)| *supported == name)
        .map(|(_, algorithm)| *algorithm)
}

fn local_key(pem: &str, algorithm: Algorithm) -> jsonwebtoken::errors::Result<DecodingKey> {
    match algorithm {
        Algorithm::ES256 | Algorithm::ES384 => DecodingKey::from_ec_pem(pem.as_bytes()),
        Algorithm::EdDSA => DecodingKey::from_ed_pem(pem.as_bytes()),
        _ => DecodingKey::from_rsa_pem(pem.as_bytes()),
    }
}

fn signature_failed(carrier: TokenCarrier) -> TokenError {
    TokenError::verification(
        Reason::TokenVerificationFailed,
        "JWT signature is invalid: signature verification failed.",
        carrier,
    )
}

/// Split and decode a compact JWT without trusting any of it.
fn decode_jwt(token: &str, carrier: TokenCarrier) -> Result<DecodedJwt<'_>, TokenError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        return Err(TokenError::invalid(
            format!("Invalid JWT form. The token exceeds {MAX_JWT_SIZE_BYTES} bytes."),
            carrier,
        ));
    }

    let segments: Vec<&str> = token.split('.').collect();
    let [header_b64, payload_b64, signature] = segments[..] else {
        return Err(TokenError::invalid(INVALID_FORM, carrier));
    };

    let header = decode_segment(header_b64, "header", carrier)?;
    let payload = decode_segment(payload_b64, "payload", carrier)?;
    if BASE64URL.decode(signature).is_err() {
        return Err(TokenError::invalid(
            "Invalid JWT form. The signature segment is not valid base64url.",
            carrier,
        ));
    }

    let header: JwtHeader = serde_json::from_value(Value::Object(header)).map_err(|_| {
        TokenError::invalid(
            "Invalid JWT form. The header does not declare an algorithm (alg).",
            carrier,
        )
    })?;

    if let Some(typ) = header.typ.as_deref() {
        if typ != "JWT" {
            return Err(TokenError::invalid(
                format!("Invalid JWT type \"{typ}\". Expected \"JWT\"."),
                carrier,
            ));
        }
    }

    let signing_input_len = header_b64.len() + 1 + payload_b64.len();
    Ok(DecodedJwt {
        header,
        payload,
        signing_input: &token[..signing_input_len],
        signature,
    })
}

fn decode_segment(
    segment: &str,
    name: &str,
    carrier: TokenCarrier,
) -> Result<Map<String, Value>, TokenError> {
    let bytes = BASE64URL.decode(segment).map_err(|_| {
        TokenError::invalid(
            format!("Invalid JWT form. The {name} segment is not valid base64url."),
            carrier,
        )
    })?;
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(TokenError::invalid(
            format!("Invalid JWT form. The {name} segment is not a JSON object."),
            carrier,
        )),
    }
}

fn validate_claims(
    payload: &Map<String, Value>,
    now: i64,
    options: &VerifyTokenOptions,
) -> Result<(), TokenError> {
    let carrier = options.carrier;
    let skew = i64::try_from(options.clock_skew.as_secs()).unwrap_or(i64::MAX);

    if !matches!(payload.get("sub"), Some(Value::String(_))) {
        return Err(TokenError::verification(
            Reason::TokenVerificationFailed,
            "Subject claim (sub) is required and must be a string.",
            carrier,
        ));
    }

    if !matches!(payload.get("sid"), Some(Value::String(_))) {
        return Err(TokenError::verification(
            Reason::TokenVerificationFailed,
            "Session ID claim (sid) is required and must be a string.",
            carrier,
        ));
    }

    if let Some(exp) = numeric_date(payload, "exp", "expiry date", carrier)? {
        if exp < now.saturating_sub(skew) {
            return Err(TokenError::verification(
                Reason::TokenExpired,
                format!(
                    "JWT is expired. Expiry date: {}, Current date: {}.",
                    http_date(exp),
                    http_date(now)
                ),
                carrier,
            ));
        }
    }

    if let Some(nbf) = numeric_date(payload, "nbf", "not before", carrier)? {
        if nbf > now.saturating_add(skew) {
            return Err(TokenError::verification(
                Reason::TokenNotActiveYet,
                format!(
                    "JWT cannot be used prior to not-before date claim (nbf). Not-before date: {}; Current date: {}.",
                    http_date(nbf),
                    http_date(now)
                ),
                carrier,
            ));
        }
    }

    if let Some(iat) = numeric_date(payload, "iat", "issued at", carrier)? {
        if iat > now.saturating_add(skew) {
            return Err(TokenError::verification(
                Reason::TokenIatInTheFuture,
                format!(
                    "JWT issued at date claim (iat) is in the future. Issued at date: {}; Current date: {}.",
                    http_date(iat),
                    http_date(now)
                ),
                carrier,
            ));
        }
    }

    // Only an absent or null azp skips the allow-list
    if !options.authorized_parties.is_empty() {
        let azp = payload.get("azp").filter(|value| !value.is_null());
        if let Some(azp) = azp {
            let allowed = azp
                .as_str()
                .is_some_and(|azp| options.authorized_parties.iter().any(|party| party == azp));
            if !allowed {
                let shown = match azp {
                    Value::String(azp) => azp.clone(),
                    other => other.to_string(),
                };
                return Err(TokenError::verification(
                    Reason::TokenVerificationFailed,
                    format!(
                        "Invalid JWT Authorized party claim (azp) \"{shown}\". Expected \"{}\".",
                        options.authorized_parties.join(",")
                    ),
                    carrier,
                ));
            }
        }
    }

    Ok(())
}

/// Read a NumericDate claim. Absent is fine; anything but a number is not.
fn numeric_date(
    payload: &Map<String, Value>,
    claim: &str,
    label: &str,
    carrier: TokenCarrier,
) -> Result<Option<i64>, TokenError> {
    let Some(value) = payload.get(claim) else {
        return Ok(None);
    };
    numeric_date_value(value)
        .map(Some)
        .ok_or_else(|| {
            TokenError::verification(
                Reason::TokenVerificationFailed,
                format!("Invalid JWT {label} claim ({claim}) {value}. Expected number."),
                carrier,
            )
        })
}

/// RFC 7231 date, e.g. `Tue, 25 Oct 2022 21:50:50 GMT`.
fn http_date(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|date| date.format("%a, %d %b %Y %H:%M:%S GMT").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}
