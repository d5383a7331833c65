// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Request classification.
//!
//! Decides, from request metadata alone, whether a token should be verified
//! or whether the request can be answered immediately as signed out or
//! handshake. No I/O happens here.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use super::error::TokenCarrier;
use super::outcome::AuthReason;

/// Instance environment of the authentication backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    /// Derive the environment from the API key prefix. Live keys are
    /// production; everything else is treated as development.
    pub fn from_api_key(api_key: &str) -> Self {
        if api_key.starts_with("sk_live_") || api_key.starts_with("live_") {
            Environment::Production
        } else {
            Environment::Development
        }
    }

    pub fn is_development_or_staging(&self) -> bool {
        matches!(self, Environment::Development | Environment::Staging)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!("unknown environment: {other}")),
        }
    }
}

/// Flat request record the resolver works from.
///
/// Built by the HTTP adapter (see [`crate::auth::extractor`]); every field is
/// optional because any of them may be missing from a real request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthRequest {
    /// Token from the authorization carrier
    pub header_token: Option<String>,
    /// Token from the `__session` cookie
    pub cookie_token: Option<String>,
    /// Value of the `__client_uat` cookie
    pub client_uat: Option<String>,
    pub host: Option<String>,
    pub forwarded_host: Option<String>,
    pub user_agent: Option<String>,
    pub origin: Option<String>,
    pub referrer: Option<String>,
    pub environment: Environment,
    /// Bypass the JWKS cache for this request
    pub force_refresh_jwks: bool,
}

impl AuthRequest {
    fn header_token(&self) -> Option<&str> {
        non_empty(self.header_token.as_deref())
    }

    fn cookie_token(&self) -> Option<&str> {
        non_empty(self.cookie_token.as_deref())
    }

    fn client_uat(&self) -> Option<&str> {
        non_empty(self.client_uat.as_deref())
    }

    /// Host the request was addressed to, preferring the forwarded host set
    /// by a proxy.
    fn effective_host(&self) -> Option<&str> {
        non_empty(self.forwarded_host.as_deref()).or_else(|| non_empty(self.host.as_deref()))
    }

    fn is_browser(&self) -> bool {
        self.user_agent
            .as_deref()
            .is_some_and(|ua| ua.starts_with("Mozilla/"))
    }

    /// Whether the `Origin` header names a different origin than the host.
    pub fn is_cross_origin(&self) -> bool {
        match non_empty(self.origin.as_deref()) {
            Some(origin) => is_cross_origin(origin, self.effective_host()),
            None => false,
        }
    }

    /// Whether the request was referred by a page on a different origin.
    pub fn is_cross_origin_referrer(&self) -> bool {
        match non_empty(self.referrer.as_deref()) {
            Some(referrer) => is_cross_origin(referrer, self.effective_host()),
            None => false,
        }
    }
}

/// Where classification routes a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Verify `token`, attributing failures to `carrier`
    Verify { token: String, carrier: TokenCarrier },
    Handshake(AuthReason),
    SignedOut(AuthReason),
}

/// Classify a request. First matching rule wins:
///
/// 1. header token: verify it
/// 2. session cookie: verify it
/// 3. development or staging only:
///    non-browser client is signed out; missing client UAT or a cross-origin
///    referrer requires a handshake
/// 4. cross-origin without a header token is signed out
/// 5. client UAT of `0` is signed out
/// 6. client UAT without a session cookie requires a handshake
/// 7. otherwise signed out, no evidence of a session
pub fn classify(request: &AuthRequest) -> Decision {
    if let Some(token) = request.header_token() {
        return Decision::Verify {
            token: token.to_string(),
            carrier: TokenCarrier::Header,
        };
    }

    if let Some(token) = request.cookie_token() {
        return Decision::Verify {
            token: token.to_string(),
            carrier: TokenCarrier::Cookie,
        };
    }

    if request.environment.is_development_or_staging() {
        if !request.is_browser() {
            return Decision::SignedOut(AuthReason::HeaderMissingNonBrowser);
        }
        if request.client_uat().is_none() {
            return Decision::Handshake(AuthReason::UatMissing);
        }
        if request.is_cross_origin_referrer() {
            return Decision::Handshake(AuthReason::CrossOriginReferrer);
        }
    }

    if request.is_cross_origin() {
        return Decision::SignedOut(AuthReason::HeaderMissingCors);
    }

    match request.client_uat() {
        Some("0") => Decision::SignedOut(AuthReason::StandardSignedOut),
        Some(_) => Decision::Handshake(AuthReason::CookieMissing),
        None => Decision::SignedOut(AuthReason::CookieAndUatMissing),
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Compare the authority (`host[:port]`) of `url` against `host`.
///
/// An unparsable URL or a missing host counts as cross-origin.
fn is_cross_origin(url: &str, host: Option<&str>) -> bool {
    let Some(host) = host else {
        return true;
    };
    let Ok(parsed) = Url::parse(url) else {
        return true;
    };
    let Some(url_host) = parsed.host_str() else {
        return true;
    };

    let authority = match parsed.port() {
        Some(port) => format!("{url_host}:{port}"),
        None => url_host.to_string(),
    };
    !authority.eq_ignore_ascii_case(host.trim())
}
