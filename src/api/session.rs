// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::Json;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::auth::{Auth, AuthOutcome, RequestAuth, Session};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub session: Session,
    pub session_claims: Map<String, Value>,
}

/// Identity of the signed-in caller. Rejects everything else.
pub async fn me(Auth(state): Auth) -> Json<MeResponse> {
    Json(MeResponse {
        session: state.session,
        session_claims: state.session_claims.into_map(),
    })
}

/// Resolved auth state of the request, whatever it is.
pub async fn auth_state(RequestAuth(outcome): RequestAuth) -> Json<AuthOutcome> {
    Json(outcome)
}
