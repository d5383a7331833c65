// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Verified session claims and the session identity derived from them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// NumericDate as seconds; fractional values are floored.
pub(crate) fn numeric_date_value(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|seconds| seconds.floor() as i64))
}

/// Full claim set of a session token that passed verification.
///
/// Only [`crate::auth::verify::TokenVerifier`] constructs this outside
/// tests, so holding one implies signature and claim checks succeeded.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct VerifiedClaims(Map<String, Value>);

impl VerifiedClaims {
    pub(crate) fn new(claims: Map<String, Value>) -> Self {
        Self(claims)
    }

    /// Get a claim by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    /// Subject (user ID)
    pub fn sub(&self) -> Option<&str> {
        self.get_str("sub")
    }

    /// Session ID
    pub fn sid(&self) -> Option<&str> {
        self.get_str("sid")
    }

    /// Active organization ID
    pub fn org_id(&self) -> Option<&str> {
        self.get_str("org_id")
    }

    /// Role in the active organization
    pub fn org_role(&self) -> Option<&str> {
        self.get_str("org_role")
    }

    /// Authorized party
    pub fn azp(&self) -> Option<&str> {
        self.get_str("azp")
    }

    /// Issued at timestamp
    pub fn iat(&self) -> Option<i64> {
        self.0.get("iat").and_then(numeric_date_value)
    }

    /// Expiration timestamp
    pub fn exp(&self) -> Option<i64> {
        self.0.get("exp").and_then(numeric_date_value)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

/// Session identity of a signed-in request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Session ID (`sid`)
    pub id: String,

    /// Canonical user ID (`sub`)
    pub user_id: String,

    /// Active organization (`org_id`)
    pub org_id: Option<String>,

    /// Role in the active organization (`org_role`)
    pub org_role: Option<String>,
}

impl Session {
    /// Create from verified claims.
    ///
    /// `sub` and `sid` are guaranteed by verification.
    pub fn from_claims(claims: &VerifiedClaims) -> Self {
        Self {
            id: claims.sid().unwrap_or_default().to_string(),
            user_id: claims.sub().unwrap_or_default().to_string(),
            org_id: claims.org_id().map(str::to_string),
            org_role: claims.org_role().map(str::to_string),
        }
    }
}
