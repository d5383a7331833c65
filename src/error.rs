// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP responses for requests that are not signed in.

use axum::{
    http::{header::LOCATION, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use url::Url;

use crate::auth::outcome::{AuthOutcome, AuthReason, HandshakeState, SignedInState, SignedOutState};

pub const AUTH_STATUS_HEADER: HeaderName = HeaderName::from_static("x-auth-status");
pub const AUTH_REASON_HEADER: HeaderName = HeaderName::from_static("x-auth-reason");

/// Rejection for a request that resolved to signed-out or handshake.
#[derive(Debug)]
pub enum AuthRejection {
    SignedOut(SignedOutState),
    /// `location` is the handshake URL with the original request attached
    Handshake {
        state: HandshakeState,
        location: Option<String>,
    },
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    error_code: &'static str,
}

impl AuthRejection {
    /// Split an outcome into the signed-in state or a rejection.
    ///
    /// `redirect_url` is attached to `handshake_url` so the client can
    /// return after the handshake.
    pub fn check(
        outcome: AuthOutcome,
        handshake_url: Option<&str>,
        redirect_url: &str,
    ) -> Result<SignedInState, AuthRejection> {
        match outcome {
            AuthOutcome::SignedIn(state) => Ok(state),
            AuthOutcome::SignedOut(state) => Err(AuthRejection::SignedOut(state)),
            AuthOutcome::Handshake(state) => Err(AuthRejection::Handshake {
                location: handshake_url.and_then(|url| handshake_location(url, redirect_url)),
                state,
            }),
        }
    }

    pub fn reason(&self) -> AuthReason {
        match self {
            AuthRejection::SignedOut(state) => state.reason,
            AuthRejection::Handshake { state, .. } => state.reason,
        }
    }

    fn status_label(&self) -> &'static str {
        match self {
            AuthRejection::SignedOut(_) => "signed-out",
            AuthRejection::Handshake { .. } => "handshake",
        }
    }
}

fn handshake_location(handshake_url: &str, redirect_url: &str) -> Option<String> {
    match Url::parse(handshake_url) {
        Ok(mut url) => {
            url.query_pairs_mut().append_pair("redirect_url", redirect_url);
            Some(url.into())
        }
        Err(e) => {
            tracing::warn!(error = %e, "Invalid handshake URL, answering with 401");
            None
        }
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let status_label = self.status_label();
        let reason = self.reason();

        let mut response = match self {
            AuthRejection::Handshake {
                location: Some(location),
                ..
            } => match HeaderValue::from_str(&location) {
                Ok(location) => {
                    (StatusCode::TEMPORARY_REDIRECT, [(LOCATION, location)]).into_response()
                }
                Err(_) => unauthorized(reason.description().to_string(), reason),
            },
            AuthRejection::Handshake { state, .. } => unauthorized(state.message, reason),
            AuthRejection::SignedOut(state) => unauthorized(state.message, reason),
        };

        let headers = response.headers_mut();
        headers.insert(AUTH_STATUS_HEADER, HeaderValue::from_static(status_label));
        headers.insert(AUTH_REASON_HEADER, HeaderValue::from_static(reason.as_str()));
        response
    }
}

fn unauthorized(message: String, reason: AuthReason) -> Response {
    let body = Json(ErrorBody {
        error: message,
        error_code: reason.as_str(),
    });
    (StatusCode::UNAUTHORIZED, body).into_response()
}
