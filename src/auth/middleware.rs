// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication middleware for Axum.
//!
//! Resolves the auth state once per request and stores the [`AuthOutcome`]
//! in the request extensions, where the extractors in `extractor.rs` pick
//! it up.
//!
//! ```rust,ignore
//! let app = Router::new()
//!     .route("/v1/me", get(me))
//!     .layer(axum::middleware::from_fn_with_state(state.clone(), auth_middleware))
//!     .with_state(state);
//! ```

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::extractor::{request_url, resolve_parts};
use super::outcome::AuthOutcome;
use crate::error::AuthRejection;
use crate::state::AppState;

async fn resolve_request(state: &AppState, request: Request) -> (AuthOutcome, Request) {
    let (mut parts, body) = request.into_parts();
    let outcome = resolve_parts(&mut parts, state).await;
    (outcome, Request::from_parts(parts, body))
}

/// Resolve and attach the outcome; never rejects.
pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let (_, request) = resolve_request(&state, request).await;
    next.run(request).await
}

/// Resolve and reject anything that is not signed in.
pub async fn require_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let (outcome, request) = resolve_request(&state, request).await;
    let redirect_url = request_url(request.headers(), request.uri());

    match AuthRejection::check(outcome, state.config().handshake_url.as_deref(), &redirect_url) {
        Ok(_) => next.run(request).await,
        Err(rejection) => {
            tracing::debug!(
                target: "auth.extractor",
                reason = %rejection.reason(),
                path = %request.uri().path(),
                "Rejected unauthenticated request"
            );
            rejection.into_response()
        }
    }
}
