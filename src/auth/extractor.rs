// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for the resolved auth state.
//!
//! Use the `Auth` extractor in handlers to require a signed-in session:
//!
//! ```rust,ignore
//! async fn my_handler(Auth(state): Auth) -> impl IntoResponse {
//!     // state.session.user_id is the authenticated user
//! }
//! ```
//!
//! Every extractor reuses an outcome already stored in the request
//! extensions (by [`super::middleware::auth_middleware`] or an earlier
//! extractor) and otherwise resolves the request itself.

use std::convert::Infallible;

use axum::{
    extract::FromRequestParts,
    http::{
        header::{AUTHORIZATION, COOKIE, HOST, ORIGIN, REFERER, USER_AGENT},
        request::Parts,
        HeaderMap, Uri,
    },
};

use super::classify::{AuthRequest, Environment};
use super::outcome::{AuthOutcome, SignedInState};
use crate::error::AuthRejection;
use crate::state::AppState;

/// Development-instance header carrying the session token.
pub const DEV_SESSION_HEADER: &str = "x-dev-session-token";
pub const SESSION_COOKIE: &str = "__session";
pub const CLIENT_UAT_COOKIE: &str = "__client_uat";

const FORWARDED_HOST: &str = "x-forwarded-host";
const FORWARDED_PROTO: &str = "x-forwarded-proto";

impl AuthRequest {
    /// Build the request record from HTTP request parts.
    ///
    /// HTTP/2 requests carry the host in the `:authority` pseudo-header, which
    /// ends up in the URI rather than in `Host`.
    pub fn from_parts(parts: &Parts, environment: Environment) -> Self {
        let mut request = Self::from_headers(&parts.headers, environment);
        if request.host.is_none() {
            request.host = parts.uri.authority().map(|authority| authority.to_string());
        }
        request
    }

    /// Build the request record from HTTP headers.
    ///
    /// Development and staging instances also accept the session token in
    /// [`DEV_SESSION_HEADER`], which takes precedence over `Authorization`.
    pub fn from_headers(headers: &HeaderMap, environment: Environment) -> Self {
        let dev_token = environment
            .is_development_or_staging()
            .then(|| header_str(headers, DEV_SESSION_HEADER))
            .flatten();
        let header_token = dev_token.or_else(|| bearer_token(headers));

        Self {
            header_token,
            cookie_token: cookie(headers, SESSION_COOKIE),
            client_uat: cookie(headers, CLIENT_UAT_COOKIE),
            host: header_str(headers, HOST.as_str()),
            forwarded_host: header_str(headers, FORWARDED_HOST),
            user_agent: header_str(headers, USER_AGENT.as_str()),
            origin: header_str(headers, ORIGIN.as_str()),
            referrer: header_str(headers, REFERER.as_str()),
            environment,
            force_refresh_jwks: false,
        }
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = header_str(headers, AUTHORIZATION.as_str())?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// First value of cookie `name` across all `Cookie` headers.
fn cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// URL the client requested, as seen through any proxy.
pub(crate) fn request_url(headers: &HeaderMap, uri: &Uri) -> String {
    let proto = header_str(headers, FORWARDED_PROTO).unwrap_or_else(|| "http".to_string());
    let host = header_str(headers, FORWARDED_HOST)
        .or_else(|| header_str(headers, HOST.as_str()))
        .or_else(|| uri.authority().map(|authority| authority.to_string()))
        .unwrap_or_else(|| "localhost".to_string());
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    format!("{proto}://{host}{path}")
}

/// Outcome for the request, resolved at most once and cached in the
/// extensions.
pub(crate) async fn resolve_parts(parts: &mut Parts, state: &AppState) -> AuthOutcome {
    if let Some(outcome) = parts.extensions.get::<AuthOutcome>() {
        return outcome.clone();
    }

    let request = AuthRequest::from_parts(parts, state.config().environment);
    let outcome = state.resolver.resolve(&request).await;
    tracing::debug!(
        target: "auth.extractor",
        status = outcome.status(),
        path = %parts.uri.path(),
        "Resolved auth state"
    );
    parts.extensions.insert(outcome.clone());
    outcome
}

/// Resolved [`AuthOutcome`], whatever it is.
pub struct RequestAuth(pub AuthOutcome);

impl FromRequestParts<AppState> for RequestAuth {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(RequestAuth(resolve_parts(parts, state).await))
    }
}

/// Extractor for signed-in requests.
///
/// Rejects signed-out requests with 401 and handshake requests with a
/// redirect to the configured handshake URL.
///
/// # Example
///
/// ```rust,ignore
/// async fn me(Auth(state): Auth) -> Json<Session> {
///     Json(state.session)
/// }
/// ```
pub struct Auth(pub SignedInState);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let outcome = resolve_parts(parts, state).await;
        let signed_in = AuthRejection::check(
            outcome,
            state.config().handshake_url.as_deref(),
            &request_url(&parts.headers, &parts.uri),
        )?;
        Ok(Auth(signed_in))
    }
}

/// Optional authentication extractor.
///
/// Returns `None` unless the request is signed in, instead of rejecting.
pub struct OptionalAuth(pub Option<SignedInState>);

impl FromRequestParts<AppState> for OptionalAuth {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let outcome = resolve_parts(parts, state).await;
        Ok(OptionalAuth(outcome.into_signed_in()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::auth::jwks::JwksCache;
    use crate::auth::outcome::AuthReason;
    use crate::auth::test_support::{
        jwks_body, mock_claims, FixedClock, MockFetch, TestKey, MOCK_IAT, MOCK_KID, MOCK_SUB,
    };
    use crate::auth::AuthStateResolver;
    use crate::config::ResolverConfig;
    use axum::http::Request;

    fn create_test_state(environment: Environment) -> (AppState, TestKey, Arc<MockFetch>) {
        let key = TestKey::generate(MOCK_KID);
        let fetch = Arc::new(MockFetch::ok(jwks_body(&[&key])));
        let config = ResolverConfig::new("sk_test_abc")
            .with_api_url("https://api.clerk.test")
            .with_environment(environment);
        let resolver = AuthStateResolver::with_cache(config, Arc::new(JwksCache::new(fetch.clone())))
            .with_clock(Arc::new(FixedClock::at(MOCK_IAT)));
        (AppState::new(resolver), key, fetch)
    }

    fn request_parts(builder: axum::http::request::Builder) -> Parts {
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn from_parts_reads_headers_and_cookies() {
        let parts = request_parts(
            Request::builder()
                .uri("/v1/me")
                .header("Authorization", "Bearer header.jwt.token")
                .header("Cookie", "theme=dark; __session=cookie.jwt.token")
                .header("Cookie", "__client_uat=1666648250")
                .header("Host", "example.com")
                .header("X-Forwarded-Host", "app.example.com")
                .header("Origin", "https://app.example.com")
                .header("Referer", "https://app.example.com/home")
                .header("User-Agent", "Mozilla/5.0"),
        );

        let request = AuthRequest::from_parts(&parts, Environment::Production);
        assert_eq!(request.header_token.as_deref(), Some("header.jwt.token"));
        assert_eq!(request.cookie_token.as_deref(), Some("cookie.jwt.token"));
        assert_eq!(request.client_uat.as_deref(), Some("1666648250"));
        assert_eq!(request.host.as_deref(), Some("example.com"));
        assert_eq!(request.forwarded_host.as_deref(), Some("app.example.com"));
        assert_eq!(request.origin.as_deref(), Some("https://app.example.com"));
        assert_eq!(request.referrer.as_deref(), Some("https://app.example.com/home"));
        assert_eq!(request.user_agent.as_deref(), Some("Mozilla/5.0"));
        assert_eq!(request.environment, Environment::Production);
    }

    #[test]
    fn http2_authority_stands_in_for_missing_host() {
        let parts = request_parts(
            Request::builder()
                .uri("https://app.example.com/v1/me")
                .header("Origin", "https://app.example.com"),
        );

        let request = AuthRequest::from_parts(&parts, Environment::Production);
        assert_eq!(request.host.as_deref(), Some("app.example.com"));
        assert!(!request.is_cross_origin());
        assert_eq!(request_url(&parts.headers, &parts.uri), "http://app.example.com/v1/me");
    }

    #[test]
    fn host_header_wins_over_uri_authority() {
        let parts = request_parts(
            Request::builder()
                .uri("https://internal:8443/")
                .header("Host", "example.com"),
        );

        let request = AuthRequest::from_parts(&parts, Environment::Production);
        assert_eq!(request.host.as_deref(), Some("example.com"));
    }

    #[tokio::test]
    async fn same_origin_http2_request_is_not_treated_as_cors() {
        let (state, _, _) = create_test_state(Environment::Production);
        let mut parts = request_parts(
            Request::builder()
                .uri("https://app.example.com/test")
                .header("Origin", "https://app.example.com")
                .header("Cookie", "__client_uat=1666648250"),
        );

        let RequestAuth(outcome) = RequestAuth::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(outcome, AuthOutcome::handshake(AuthReason::CookieMissing));
    }

    #[test]
    fn dev_header_only_counts_outside_production() {
        let builder = || {
            Request::builder()
                .uri("/")
                .header(DEV_SESSION_HEADER, "dev.jwt.token")
                .header("Authorization", "Bearer header.jwt.token")
        };

        let request = AuthRequest::from_parts(&request_parts(builder()), Environment::Development);
        assert_eq!(request.header_token.as_deref(), Some("dev.jwt.token"));

        let request = AuthRequest::from_parts(&request_parts(builder()), Environment::Production);
        assert_eq!(request.header_token.as_deref(), Some("header.jwt.token"));
    }

    #[test]
    fn non_bearer_authorization_is_ignored() {
        let parts = request_parts(
            Request::builder()
                .uri("/")
                .header("Authorization", "Basic dXNlcjpwYXNz"),
        );
        let request = AuthRequest::from_parts(&parts, Environment::Production);
        assert!(request.header_token.is_none());
    }

    #[tokio::test]
    async fn auth_extractor_succeeds_with_valid_token() {
        let (state, key, _) = create_test_state(Environment::Production);
        let token = key.sign(&mock_claims());
        let mut parts = request_parts(
            Request::builder()
                .uri("/test")
                .header("Authorization", format!("Bearer {token}")),
        );

        let Auth(signed_in) = Auth::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(signed_in.session.user_id, MOCK_SUB);
    }

    #[tokio::test]
    async fn auth_extractor_rejects_signed_out() {
        let (state, _, _) = create_test_state(Environment::Production);
        let mut parts = request_parts(Request::builder().uri("/test").header("Host", "example.com"));

        let result = Auth::from_request_parts(&mut parts, &state).await;
        assert!(matches!(
            result,
            Err(AuthRejection::SignedOut(ref s)) if s.reason == AuthReason::CookieAndUatMissing
        ));
    }

    #[tokio::test]
    async fn auth_extractor_prefers_extensions() {
        let (state, key, fetch) = create_test_state(Environment::Production);
        let mut parts = request_parts(Request::builder().uri("/test"));
        let outcome = state
            .resolver
            .resolve(&AuthRequest {
                header_token: Some(key.sign(&mock_claims())),
                environment: Environment::Production,
                ..AuthRequest::default()
            })
            .await;
        parts.extensions.insert(outcome);

        let Auth(signed_in) = Auth::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(signed_in.session.user_id, MOCK_SUB);
        assert_eq!(fetch.calls(), 1);
    }

    #[tokio::test]
    async fn outcome_is_resolved_once_per_request() {
        let (state, key, fetch) = create_test_state(Environment::Production);
        let token = key.sign(&mock_claims());
        let mut parts = request_parts(
            Request::builder()
                .uri("/test")
                .header("Authorization", format!("Bearer {token}")),
        );

        let RequestAuth(first) = RequestAuth::from_request_parts(&mut parts, &state).await.unwrap();
        state.resolver.verifier().cache().clear().await;
        let OptionalAuth(second) = OptionalAuth::from_request_parts(&mut parts, &state).await.unwrap();

        assert!(first.is_signed_in());
        assert!(second.is_some());
        assert_eq!(fetch.calls(), 1);
    }

    #[tokio::test]
    async fn optional_auth_returns_none_when_not_signed_in() {
        let (state, _, _) = create_test_state(Environment::Development);
        let mut parts = request_parts(
            Request::builder()
                .uri("/test")
                .header("User-Agent", "Mozilla/5.0"),
        );

        let OptionalAuth(signed_in) = OptionalAuth::from_request_parts(&mut parts, &state)
            .await
            .unwrap();
        assert!(signed_in.is_none());
        assert_eq!(
            parts.extensions.get::<AuthOutcome>().and_then(AuthOutcome::reason),
            Some(AuthReason::UatMissing)
        );
    }

    #[test]
    fn request_url_uses_forwarded_values() {
        let parts = request_parts(
            Request::builder()
                .uri("/v1/me?x=1")
                .header("Host", "internal:8080")
                .header("X-Forwarded-Host", "app.example.com")
                .header("X-Forwarded-Proto", "https"),
        );
        assert_eq!(request_url(&parts.headers, &parts.uri), "https://app.example.com/v1/me?x=1");
    }
}
