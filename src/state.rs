// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use crate::auth::AuthStateResolver;
use crate::config::ResolverConfig;

#[derive(Clone)]
pub struct AppState {
    pub resolver: AuthStateResolver,
}

impl AppState {
    pub fn new(resolver: AuthStateResolver) -> Self {
        Self { resolver }
    }

    pub fn config(&self) -> &ResolverConfig {
        self.resolver.config()
    }
}
