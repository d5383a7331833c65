// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Test fixtures: deterministic Ed25519 signing keys, token minting and an
//! in-process fetch double.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use ring::signature::{Ed25519KeyPair, KeyPair};
use serde_json::{json, Value};

use super::fetch::{Fetch, FetchError, FetchRequest, FetchResponse};
use super::verify::Clock;

/// Issued-at of the reference session token; tests pin the clock here.
pub(crate) const MOCK_IAT: i64 = 1_666_648_250;
pub(crate) const MOCK_AZP: &str = "https://accounts.inspired.puma-74.lcl.dev";
pub(crate) const MOCK_SID: &str = "sess_2GbDB4enNdCa5vS1zpC3Xzg9tK9";
pub(crate) const MOCK_SUB: &str = "user_2GIpXOEpVyJw51rkZn9Kmnc6Sxr";
pub(crate) const MOCK_KID: &str = "ins_2GIoQhbUpy0hX7B2cVkuTMinXoD";

/// Session claims shaped like a hosted-auth session token.
pub(crate) fn mock_claims() -> Value {
    json!({
        "azp": MOCK_AZP,
        "exp": MOCK_IAT + 60,
        "iat": MOCK_IAT,
        "iss": "https://clerk.inspired.puma-74.lcl.dev",
        "nbf": MOCK_IAT - 10,
        "sid": MOCK_SID,
        "sub": MOCK_SUB,
    })
}

/// Ed25519 signing key published as an OKP JWK.
pub(crate) struct TestKey {
    pub kid: String,
    pair: Ed25519KeyPair,
}

impl TestKey {
    /// Key whose seed is derived from the kid, so the same kid always yields
    /// the same key.
    pub fn generate(kid: &str) -> Self {
        let seed = kid.bytes().fold(0u8, |acc, b| acc.wrapping_mul(31).wrapping_add(b));
        Self::from_seed(kid, seed)
    }

    /// Key with an explicit seed, e.g. an impostor reusing a trusted kid.
    pub fn from_seed(kid: &str, seed: u8) -> Self {
        let mut seed_bytes = [0u8; 32];
        seed_bytes[0] = seed;
        for (i, byte) in seed_bytes.iter_mut().enumerate().skip(1) {
            *byte = seed.wrapping_mul(i as u8).wrapping_add(i as u8);
        }
        let pair = Ed25519KeyPair::from_seed_unchecked(&seed_bytes).unwrap();
        Self {
            kid: kid.to_string(),
            pair,
        }
    }

    pub fn public_x(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.pair.public_key().as_ref())
    }

    pub fn jwk(&self) -> Value {
        json!({
            "kty": "OKP",
            "crv": "Ed25519",
            "kid": self.kid,
            "alg": "EdDSA",
            "use": "sig",
            "x": self.public_x(),
        })
    }

    pub fn sign(&self, claims: &Value) -> String {
        self.sign_with_header(
            &json!({ "alg": "EdDSA", "kid": self.kid, "typ": "JWT" }),
            claims,
        )
    }

    pub fn sign_with_header(&self, header: &Value, claims: &Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(header).unwrap());
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap());
        let signature = self.pair.sign(format!("{header}.{payload}").as_bytes());
        format!("{header}.{payload}.{}", URL_SAFE_NO_PAD.encode(signature.as_ref()))
    }
}

pub(crate) fn jwks_body(keys: &[&TestKey]) -> Vec<u8> {
    let keys: Vec<Value> = keys.iter().map(|key| key.jwk()).collect();
    serde_json::to_vec(&json!({ "keys": keys })).unwrap()
}

#[derive(Clone)]
enum Reply {
    Respond(StatusCode, Vec<u8>),
    Fail,
}

struct MockState {
    reply: Reply,
    delay: Duration,
    last_authorization: Option<String>,
}

/// Scripted [`Fetch`] that counts calls.
pub(crate) struct MockFetch {
    state: Mutex<MockState>,
    calls: AtomicUsize,
}

impl MockFetch {
    fn with_reply(reply: Reply) -> Self {
        Self {
            state: Mutex::new(MockState {
                reply,
                delay: Duration::ZERO,
                last_authorization: None,
            }),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn ok(body: Vec<u8>) -> Self {
        Self::with_reply(Reply::Respond(StatusCode::OK, body))
    }

    pub fn status(status: StatusCode) -> Self {
        Self::with_reply(Reply::Respond(status, Vec::new()))
    }

    pub fn failing() -> Self {
        Self::with_reply(Reply::Fail)
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        self.set_delay(delay);
        self
    }

    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = delay;
    }

    pub fn respond_with(&self, status: StatusCode, body: Vec<u8>) {
        self.state.lock().unwrap().reply = Reply::Respond(status, body);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_authorization(&self) -> Option<String> {
        self.state.lock().unwrap().last_authorization.clone()
    }
}

#[async_trait]
impl Fetch for MockFetch {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (reply, delay) = {
            let mut state = self.state.lock().unwrap();
            state.last_authorization = request
                .headers
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case("authorization"))
                .map(|(_, value)| value.clone());
            (state.reply.clone(), state.delay)
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match reply {
            Reply::Respond(status, body) => Ok(FetchResponse { status, body }),
            Reply::Fail => Err(FetchError::Transport("connection refused".to_string())),
        }
    }
}

/// Clock pinned to a fixed instant.
pub(crate) struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    pub fn at(timestamp: i64) -> Self {
        Self(DateTime::from_timestamp(timestamp, 0).unwrap())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
