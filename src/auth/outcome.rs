// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Resolved authentication state of a request.

use std::fmt;

use serde::Serialize;

use super::claims::{Session, VerifiedClaims};

/// Reason code attached to signed-out and handshake outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthReason {
    /// Neither a session cookie nor a client UAT is present
    CookieAndUatMissing,
    /// Client UAT claims a session but the session cookie is missing
    CookieMissing,
    /// Session cookie was issued before the latest client UAT
    CookieOutdated,
    /// Development instance without an established client UAT
    UatMissing,
    /// Development request arriving from a different origin's page
    CrossOriginReferrer,
    /// Cross-origin request without an authorization header
    HeaderMissingCors,
    /// Development request from a non-browser client without a header token
    HeaderMissingNonBrowser,
    /// Client UAT of `0`: the user explicitly signed out
    StandardSignedOut,
    /// The presented token failed verification
    TokenVerificationError,
}

impl AuthReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthReason::CookieAndUatMissing => "cookie-and-uat-missing",
            AuthReason::CookieMissing => "cookie-missing",
            AuthReason::CookieOutdated => "cookie-outdated",
            AuthReason::UatMissing => "uat-missing",
            AuthReason::CrossOriginReferrer => "cross-origin-referrer",
            AuthReason::HeaderMissingCors => "header-missing-cors",
            AuthReason::HeaderMissingNonBrowser => "header-missing-non-browser",
            AuthReason::StandardSignedOut => "standard-signed-out",
            AuthReason::TokenVerificationError => "token-verification-error",
        }
    }

    /// Human-readable description used when no more specific message exists.
    pub fn description(&self) -> &'static str {
        match self {
            AuthReason::CookieAndUatMissing => "No session cookie or client UAT found.",
            AuthReason::CookieMissing => {
                "Client UAT indicates an active session but the session cookie is missing."
            }
            AuthReason::CookieOutdated => {
                "Session cookie was issued before the latest client activity."
            }
            AuthReason::UatMissing => "Client UAT is missing; trust has not been established.",
            AuthReason::CrossOriginReferrer => "Request was referred by a different origin.",
            AuthReason::HeaderMissingCors => {
                "Cross-origin request is missing the Authorization header."
            }
            AuthReason::HeaderMissingNonBrowser => {
                "Non-browser request is missing the Authorization header."
            }
            AuthReason::StandardSignedOut => "User is signed out.",
            AuthReason::TokenVerificationError => "Session token failed verification.",
        }
    }
}

impl fmt::Display for AuthReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verified session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedInState {
    pub session: Session,
    pub session_claims: VerifiedClaims,
}

impl SignedInState {
    pub fn from_claims(claims: VerifiedClaims) -> Self {
        Self {
            session: Session::from_claims(&claims),
            session_claims: claims,
        }
    }
}

/// No session; carries why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignedOutState {
    pub reason: AuthReason,
    pub message: String,
}

/// The client must complete a handshake before a verdict is possible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandshakeState {
    pub reason: AuthReason,
    pub message: String,
}

/// Authentication state of a request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum AuthOutcome {
    SignedIn(SignedInState),
    SignedOut(SignedOutState),
    Handshake(HandshakeState),
}

impl AuthOutcome {
    pub fn signed_out(reason: AuthReason) -> Self {
        Self::signed_out_with_message(reason, reason.description())
    }

    pub fn signed_out_with_message(reason: AuthReason, message: impl Into<String>) -> Self {
        AuthOutcome::SignedOut(SignedOutState {
            reason,
            message: message.into(),
        })
    }

    pub fn handshake(reason: AuthReason) -> Self {
        AuthOutcome::Handshake(HandshakeState {
            reason,
            message: reason.description().to_string(),
        })
    }

    pub fn status(&self) -> &'static str {
        match self {
            AuthOutcome::SignedIn(_) => "signed-in",
            AuthOutcome::SignedOut(_) => "signed-out",
            AuthOutcome::Handshake(_) => "handshake",
        }
    }

    /// Reason code for non-signed-in outcomes.
    pub fn reason(&self) -> Option<AuthReason> {
        match self {
            AuthOutcome::SignedIn(_) => None,
            AuthOutcome::SignedOut(state) => Some(state.reason),
            AuthOutcome::Handshake(state) => Some(state.reason),
        }
    }

    pub fn is_signed_in(&self) -> bool {
        matches!(self, AuthOutcome::SignedIn(_))
    }

    pub fn into_signed_in(self) -> Option<SignedInState> {
        match self {
            AuthOutcome::SignedIn(state) => Some(state),
            AuthOutcome::SignedOut(_) | AuthOutcome::Handshake(_) => None,
        }
    }
}
