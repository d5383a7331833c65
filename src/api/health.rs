// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, Json};
use serde::Serialize;

use crate::state::AppState;

/// Health check response with individual component status.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall status, always "ok" while the process serves requests.
    pub status: &'static str,
    pub checks: HealthChecks,
}

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    pub service: &'static str,
    /// `local-key` with a PEM key configured, otherwise whether the JWKS
    /// cache holds keys for the issuer (`cached`) or loads them on first
    /// use (`empty`).
    pub jwks: &'static str,
    pub environment: String,
}

async fn check_jwks(state: &AppState) -> &'static str {
    let config = state.config();
    if config.jwt_key.is_some() {
        return "local-key";
    }
    let issuer = config.jwks_source().issuer;
    if state.resolver.verifier().cache().is_cached(&issuer).await {
        "cached"
    } else {
        "empty"
    }
}

/// Health check endpoint handler.
///
/// Never fetches keys; a cold cache is not a failure.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        checks: HealthChecks {
            service: "ok",
            jwks: check_jwks(&state).await,
            environment: state.config().environment.to_string(),
        },
    })
}
