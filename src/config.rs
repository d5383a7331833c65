// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variable names, defaults and the [`ResolverConfig`] loaded
//! from them at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `AUTH_SECRET_KEY` | API key; bearer credential for the JWKS endpoint | Required |
//! | `AUTH_API_URL` | API base URL, keys at `<url>/v1/jwks` | `https://api.clerk.com` |
//! | `AUTH_JWT_KEY` | PEM public key for networkless verification | Optional |
//! | `AUTH_AUTHORIZED_PARTIES` | Comma-separated `azp` allow-list | Optional |
//! | `AUTH_CLOCK_SKEW_SECS` | Clock-skew tolerance for time claims | `5` |
//! | `AUTH_ENVIRONMENT` | `development`, `staging` or `production` | From key prefix |
//! | `AUTH_HANDSHAKE_URL` | Redirect target for handshake responses | Optional |
//! | `AUTH_JWKS_TIMEOUT_SECS` | JWKS fetch timeout | `10` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::time::Duration;

use crate::auth::classify::Environment;
use crate::auth::jwks::{JwksSource, DEFAULT_FETCH_TIMEOUT};
use crate::auth::verify::DEFAULT_CLOCK_SKEW;

pub const SECRET_KEY_ENV: &str = "AUTH_SECRET_KEY";
pub const API_URL_ENV: &str = "AUTH_API_URL";
pub const JWT_KEY_ENV: &str = "AUTH_JWT_KEY";
pub const AUTHORIZED_PARTIES_ENV: &str = "AUTH_AUTHORIZED_PARTIES";
pub const CLOCK_SKEW_ENV: &str = "AUTH_CLOCK_SKEW_SECS";
pub const ENVIRONMENT_ENV: &str = "AUTH_ENVIRONMENT";
pub const HANDSHAKE_URL_ENV: &str = "AUTH_HANDSHAKE_URL";
pub const JWKS_TIMEOUT_ENV: &str = "AUTH_JWKS_TIMEOUT_SECS";

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_API_URL: &str = "https://api.clerk.com";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration missing: {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Static configuration of the auth state resolver.
#[derive(Clone)]
pub struct ResolverConfig {
    /// Secret API key
    pub api_key: String,
    /// API base URL; also the issuer key of the JWKS cache
    pub api_url: String,
    /// PEM public key; bypasses the JWKS when set
    pub jwt_key: Option<String>,
    /// Allowed `azp` values; empty accepts any
    pub authorized_parties: Vec<String>,
    pub clock_skew: Duration,
    pub environment: Environment,
    /// Where handshake responses redirect the client
    pub handshake_url: Option<String>,
    pub jwks_timeout: Duration,
}

impl std::fmt::Debug for ResolverConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverConfig")
            .field("api_key", &"[REDACTED]")
            .field("api_url", &self.api_url)
            .field("jwt_key", &self.jwt_key.as_ref().map(|_| "[PEM]"))
            .field("authorized_parties", &self.authorized_parties)
            .field("clock_skew", &self.clock_skew)
            .field("environment", &self.environment)
            .field("handshake_url", &self.handshake_url)
            .field("jwks_timeout", &self.jwks_timeout)
            .finish()
    }
}

impl ResolverConfig {
    /// Configuration with defaults; the environment follows the key prefix.
    pub fn new(api_key: impl Into<String>) -> Self {
        let api_key = api_key.into();
        Self {
            environment: Environment::from_api_key(&api_key),
            api_key,
            api_url: DEFAULT_API_URL.to_string(),
            jwt_key: None,
            authorized_parties: Vec::new(),
            clock_skew: DEFAULT_CLOCK_SKEW,
            handshake_url: None,
            jwks_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_authorized_parties<I, S>(mut self, parties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authorized_parties = parties.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_jwt_key(mut self, pem: impl Into<String>) -> Self {
        self.jwt_key = Some(pem.into());
        self
    }

    pub fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = skew;
        self
    }

    pub fn with_handshake_url(mut self, url: impl Into<String>) -> Self {
        self.handshake_url = Some(url.into());
        self
    }

    /// JWKS location derived from the API URL and key.
    pub fn jwks_source(&self) -> JwksSource {
        JwksSource::from_api(&self.api_url, self.api_key.clone())
    }

    /// Load from the process environment.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Missing`] without `AUTH_SECRET_KEY`,
    /// [`ConfigError::Invalid`] for unparseable values.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_key = var(SECRET_KEY_ENV).ok_or(ConfigError::Missing(SECRET_KEY_ENV))?;
        let mut config = Self::new(api_key);

        if let Some(api_url) = var(API_URL_ENV) {
            url::Url::parse(&api_url).map_err(|e| ConfigError::Invalid {
                name: API_URL_ENV,
                reason: e.to_string(),
            })?;
            config.api_url = api_url;
        }

        // PEM keys are commonly passed with escaped newlines
        config.jwt_key = var(JWT_KEY_ENV).map(|pem| pem.replace("\\n", "\n"));

        if let Some(parties) = var(AUTHORIZED_PARTIES_ENV) {
            config.authorized_parties = parties
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(skew) = var(CLOCK_SKEW_ENV) {
            config.clock_skew = parse_secs(CLOCK_SKEW_ENV, &skew)?;
        }

        if let Some(environment) = var(ENVIRONMENT_ENV) {
            config.environment = environment
                .parse()
                .map_err(|reason| ConfigError::Invalid {
                    name: ENVIRONMENT_ENV,
                    reason,
                })?;
        }

        config.handshake_url = var(HANDSHAKE_URL_ENV);

        if let Some(timeout) = var(JWKS_TIMEOUT_ENV) {
            config.jwks_timeout = parse_secs(JWKS_TIMEOUT_ENV, &timeout)?;
        }

        Ok(config)
    }
}

fn parse_secs(name: &'static str, value: &str) -> Result<Duration, ConfigError> {
    value
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn secret_key_is_required() {
        let err = ResolverConfig::from_lookup(lookup(&[])).unwrap_err();
        assert_eq!(err, ConfigError::Missing(SECRET_KEY_ENV));

        let err = ResolverConfig::from_lookup(lookup(&[(SECRET_KEY_ENV, "   ")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing(SECRET_KEY_ENV));
    }

    #[test]
    fn defaults_apply() {
        let config = ResolverConfig::from_lookup(lookup(&[(SECRET_KEY_ENV, "sk_test_x")])).unwrap();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.clock_skew, Duration::from_secs(5));
        assert_eq!(config.jwks_timeout, Duration::from_secs(10));
        assert_eq!(config.environment, Environment::Development);
        assert!(config.authorized_parties.is_empty());
        assert!(config.jwt_key.is_none());
        assert!(config.handshake_url.is_none());
    }

    #[test]
    fn live_key_means_production() {
        let config = ResolverConfig::from_lookup(lookup(&[(SECRET_KEY_ENV, "sk_live_x")])).unwrap();
        assert_eq!(config.environment, Environment::Production);

        let config = ResolverConfig::from_lookup(lookup(&[
            (SECRET_KEY_ENV, "sk_live_x"),
            (ENVIRONMENT_ENV, "staging"),
        ]))
        .unwrap();
        assert_eq!(config.environment, Environment::Staging);
    }

    #[test]
    fn parses_overrides() {
        let config = ResolverConfig::from_lookup(lookup(&[
            (SECRET_KEY_ENV, "sk_test_x"),
            (API_URL_ENV, "https://api.clerk.test/"),
            (AUTHORIZED_PARTIES_ENV, "https://a.example, https://b.example,"),
            (CLOCK_SKEW_ENV, "30"),
            (JWKS_TIMEOUT_ENV, "2"),
            (HANDSHAKE_URL_ENV, "https://accounts.example/v1/client/handshake"),
            (JWT_KEY_ENV, "-----BEGIN PUBLIC KEY-----\\nAAAA\\n-----END PUBLIC KEY-----"),
        ]))
        .unwrap();

        assert_eq!(
            config.authorized_parties,
            vec!["https://a.example", "https://b.example"]
        );
        assert_eq!(config.clock_skew, Duration::from_secs(30));
        assert_eq!(config.jwks_timeout, Duration::from_secs(2));
        assert_eq!(
            config.jwt_key.as_deref(),
            Some("-----BEGIN PUBLIC KEY-----\nAAAA\n-----END PUBLIC KEY-----")
        );
        assert_eq!(config.jwks_source().jwks_url, "https://api.clerk.test/v1/jwks");
    }

    #[test]
    fn rejects_invalid_values() {
        let err = ResolverConfig::from_lookup(lookup(&[
            (SECRET_KEY_ENV, "sk_test_x"),
            (CLOCK_SKEW_ENV, "five"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: CLOCK_SKEW_ENV, .. }));

        let err = ResolverConfig::from_lookup(lookup(&[
            (SECRET_KEY_ENV, "sk_test_x"),
            (ENVIRONMENT_ENV, "qa"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: ENVIRONMENT_ENV, .. }));

        let err = ResolverConfig::from_lookup(lookup(&[
            (SECRET_KEY_ENV, "sk_test_x"),
            (API_URL_ENV, "not a url"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: API_URL_ENV, .. }));
    }

    #[test]
    fn debug_redacts_secret() {
        let config = ResolverConfig::new("sk_test_supersecret");
        assert!(!format!("{config:?}").contains("supersecret"));
    }
}
