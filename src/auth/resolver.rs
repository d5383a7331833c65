// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Auth state resolution: classify, verify, then fold into an [`AuthOutcome`].

use std::sync::Arc;

use tracing::instrument;

use super::classify::{classify, AuthRequest, Decision};
use super::error::TokenCarrier;
use super::jwks::JwksCache;
use super::outcome::{AuthOutcome, AuthReason, SignedInState};
use super::verify::{Clock, TokenVerifier, VerifyTokenOptions};
use crate::config::ResolverConfig;

/// Resolves the authentication state of requests.
///
/// Cheap to clone; clones share the JWKS cache.
#[derive(Clone)]
pub struct AuthStateResolver {
    config: Arc<ResolverConfig>,
    verifier: TokenVerifier,
}

impl AuthStateResolver {
    /// Resolver backed by the process-wide JWKS cache.
    pub fn new(config: ResolverConfig) -> Self {
        let cache = JwksCache::global_with_timeout(config.jwks_timeout);
        Self::with_cache(config, cache)
    }

    pub fn with_cache(config: ResolverConfig, cache: Arc<JwksCache>) -> Self {
        Self {
            config: Arc::new(config),
            verifier: TokenVerifier::new(cache),
        }
    }

    /// Replace the verifier clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.verifier = self.verifier.with_clock(clock);
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    /// Resolve a request. Never fails: every verification error becomes a
    /// signed-out outcome with reason `token-verification-error`.
    #[instrument(skip_all, fields(environment = %request.environment))]
    pub async fn resolve(&self, request: &AuthRequest) -> AuthOutcome {
        let outcome = match classify(request) {
            Decision::Verify { token, carrier } => {
                self.verify_and_build(&token, carrier, request).await
            }
            Decision::Handshake(reason) => AuthOutcome::handshake(reason),
            Decision::SignedOut(reason) => AuthOutcome::signed_out(reason),
        };

        match &outcome {
            AuthOutcome::SignedIn(state) => tracing::debug!(
                target: "auth.resolver",
                user_id = %state.session.user_id,
                session_id = %state.session.id,
                "Request signed in"
            ),
            AuthOutcome::SignedOut(state) => tracing::debug!(
                target: "auth.resolver",
                reason = %state.reason,
                "Request signed out"
            ),
            AuthOutcome::Handshake(state) => tracing::debug!(
                target: "auth.resolver",
                reason = %state.reason,
                "Request requires handshake"
            ),
        }

        outcome
    }

    fn verify_options(&self, carrier: TokenCarrier, request: &AuthRequest) -> VerifyTokenOptions {
        VerifyTokenOptions {
            source: self.config.jwks_source(),
            jwt_key: self.config.jwt_key.clone(),
            authorized_parties: self.config.authorized_parties.clone(),
            clock_skew: self.config.clock_skew,
            skip_jwks_cache: request.force_refresh_jwks,
            carrier,
        }
    }

    async fn verify_and_build(
        &self,
        token: &str,
        carrier: TokenCarrier,
        request: &AuthRequest,
    ) -> AuthOutcome {
        let options = self.verify_options(carrier, request);
        let claims = match self.verifier.verify(token, &options).await {
            Ok(claims) => claims,
            Err(err) => {
                tracing::debug!(
                    target: "auth.resolver",
                    reason = %err.reason(),
                    carrier = %err.carrier(),
                    "Token verification failed"
                );
                return AuthOutcome::signed_out_with_message(
                    AuthReason::TokenVerificationError,
                    err.to_string(),
                );
            }
        };

        // A cookie may outlive a sign-out or sign-in that happened elsewhere
        if carrier == TokenCarrier::Cookie {
            if let Some(client_uat) = request.client_uat.as_deref().map(str::trim) {
                if client_uat == "0" {
                    return AuthOutcome::signed_out(AuthReason::StandardSignedOut);
                }
                if let (Ok(uat), Some(iat)) = (client_uat.parse::<i64>(), claims.iat()) {
                    if iat < uat {
                        return AuthOutcome::handshake(AuthReason::CookieOutdated);
                    }
                }
            }
        }

        AuthOutcome::SignedIn(SignedInState::from_claims(claims))
    }
}
