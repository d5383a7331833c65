// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Resolves the authentication state of an incoming request from a session
//! token carried in a header or a cookie.
//!
//! ## Auth Flow
//!
//! 1. The HTTP adapter turns request headers and cookies into an
//!    [`AuthRequest`]
//! 2. [`classify`] decides whether a token must be verified
//! 3. [`TokenVerifier`] checks the token against keys from the [`JwksCache`]
//! 4. [`AuthStateResolver`] folds the result into an [`AuthOutcome`]:
//!    - `signed-in` with the session identity and full claims
//!    - `signed-out` with a reason code and message
//!    - `handshake` when the client must establish trust first
//!
//! ## Security
//!
//! - Keys are fetched with the secret API key and cached per issuer
//! - Concurrent cache misses for one issuer share a single fetch
//! - Time claims are checked with a configurable clock skew (5 seconds by
//!   default)
//! - Tokens are never logged

pub mod claims;
pub mod classify;
pub mod error;
pub mod extractor;
pub mod fetch;
pub mod jwks;
pub mod middleware;
pub mod outcome;
pub mod resolver;
pub mod verify;

#[cfg(test)]
pub(crate) mod test_support;

pub use claims::{Session, VerifiedClaims};
pub use classify::{classify, AuthRequest, Decision, Environment};
pub use error::{JwksError, TokenCarrier, TokenError, TokenVerificationErrorReason};
pub use extractor::{Auth, OptionalAuth, RequestAuth};
pub use fetch::{Fetch, FetchError, FetchRequest, FetchResponse, ReqwestFetch};
pub use jwks::{JwksCache, JwksSource, KeyRecord};
pub use outcome::{AuthOutcome, AuthReason};
pub use resolver::AuthStateResolver;
pub use verify::{Clock, SystemClock, TokenVerifier, VerifyTokenOptions};
