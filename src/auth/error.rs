// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.
//!
//! Display strings of [`TokenError`] are matched verbatim by consumers:
//! every message ends with `(reason=<reason>, carrier=<carrier>)`.

use std::fmt;

use serde::Serialize;

/// Transport a session token arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenCarrier {
    /// `Authorization: Bearer` (or the development session header)
    Header,
    /// `__session` cookie
    Cookie,
}

impl TokenCarrier {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenCarrier::Header => "header",
            TokenCarrier::Cookie => "cookie",
        }
    }
}

impl fmt::Display for TokenCarrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason discriminator attached to every token verification failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenVerificationErrorReason {
    /// Malformed compact serialization or header
    TokenInvalid,
    /// `exp` is in the past (beyond clock skew)
    TokenExpired,
    /// `nbf` is in the future (beyond clock skew)
    TokenNotActiveYet,
    /// `iat` is in the future (beyond clock skew)
    TokenIatInTheFuture,
    /// Header algorithm is not supported or disagrees with the JWK
    TokenInvalidAlgorithm,
    /// Signature or claim mismatch
    TokenVerificationFailed,
    /// JWKS endpoint unreachable or returned an error
    JwkRemoteFailedToLoad,
    /// Configured local PEM key could not be loaded
    JwkFailedToLoad,
    /// No key in the JWKS matches the token's `kid`
    JwkKidMismatch,
}

impl TokenVerificationErrorReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TokenInvalid => "token-invalid",
            Self::TokenExpired => "token-expired",
            Self::TokenNotActiveYet => "token-not-active-yet",
            Self::TokenIatInTheFuture => "token-iat-in-the-future",
            Self::TokenInvalidAlgorithm => "token-invalid-algorithm",
            Self::TokenVerificationFailed => "token-verification-failed",
            Self::JwkRemoteFailedToLoad => "jwk-remote-failed-to-load",
            Self::JwkFailedToLoad => "jwk-failed-to-load",
            Self::JwkKidMismatch => "jwk-kid-mismatch",
        }
    }
}

impl fmt::Display for TokenVerificationErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JWKS cache failures.
///
/// `Clone` because a single fetch result is shared by every caller
/// waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JwksError {
    /// Network failure, timeout, non-success status or unparseable body.
    /// Transient: the next request re-attempts the fetch.
    #[error("Failed to load JWKS from {url}: {detail}")]
    Fetch { url: String, detail: String },

    /// The requested `kid` is absent after a fresh fetch. Points at key
    /// rotation or a token minted by a different instance.
    #[error(
        "Unable to find a signing key in JWKS that matches kid=\"{kid}\". Available kids: [{available}]"
    )]
    KeyNotFound { kid: String, available: String },
}

/// Token verification error.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// Structurally invalid token; never retried.
    #[error("{message} (reason=token-invalid, carrier={carrier})")]
    Invalid {
        message: String,
        carrier: TokenCarrier,
    },

    /// Signature, key resolution or claim failure.
    #[error("{message} (reason={reason}, carrier={carrier})")]
    Verification {
        reason: TokenVerificationErrorReason,
        message: String,
        carrier: TokenCarrier,
        #[source]
        source: Option<JwksError>,
    },
}

impl TokenError {
    pub(crate) fn invalid(message: impl Into<String>, carrier: TokenCarrier) -> Self {
        TokenError::Invalid {
            message: message.into(),
            carrier,
        }
    }

    pub(crate) fn verification(
        reason: TokenVerificationErrorReason,
        message: impl Into<String>,
        carrier: TokenCarrier,
    ) -> Self {
        TokenError::Verification {
            reason,
            message: message.into(),
            carrier,
            source: None,
        }
    }

    pub(crate) fn from_jwks(err: JwksError, carrier: TokenCarrier) -> Self {
        let reason = match err {
            JwksError::Fetch { .. } => TokenVerificationErrorReason::JwkRemoteFailedToLoad,
            JwksError::KeyNotFound { .. } => TokenVerificationErrorReason::JwkKidMismatch,
        };
        TokenError::Verification {
            reason,
            message: err.to_string(),
            carrier,
            source: Some(err),
        }
    }

    /// Get the reason discriminator.
    pub fn reason(&self) -> TokenVerificationErrorReason {
        match self {
            TokenError::Invalid { .. } => TokenVerificationErrorReason::TokenInvalid,
            TokenError::Verification { reason, .. } => *reason,
        }
    }

    pub fn carrier(&self) -> TokenCarrier {
        match self {
            TokenError::Invalid { carrier, .. } | TokenError::Verification { carrier, .. } => {
                *carrier
            }
        }
    }

    /// Message without the reason/carrier suffix.
    pub fn message(&self) -> &str {
        match self {
            TokenError::Invalid { message, .. } | TokenError::Verification { message, .. } => {
                message
            }
        }
    }
}
