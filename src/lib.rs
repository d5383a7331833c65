// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Auth State Resolver - request authentication for session tokens
//!
//! Decides whether an incoming HTTP request is signed in, signed out, or
//! must complete a handshake first, by verifying session JWTs against the
//! issuer's published keys.
//!
//! ## Modules
//!
//! - `auth` - JWKS cache, token verification, classification and resolution
//! - `api` - HTTP handlers of the demo server (Axum)
//! - `config` - Environment-driven configuration
//! - `error` - HTTP rejections for requests that are not signed in

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod state;
