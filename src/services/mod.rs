//! Business logic services

pub mod auth;
pub mod catalog;
pub mod lending;
pub mod seed;

use std::sync::Arc;

use crate::{
    auth::{AuthenticationGate, TokenCodec},
    config::AppConfig,
    error::AppResult,
    repository::Stores,
};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub gate: AuthenticationGate,
    pub auth: auth::AuthService,
    pub catalog: catalog::CatalogService,
    pub lending: lending::LendingService,
}

impl Services {
    /// Wire every service onto the given stores.
    ///
    /// Fails when the signing key is unusable, so a misconfigured server
    /// never starts accepting requests.
    pub fn new(stores: Stores, config: &AppConfig) -> AppResult<Self> {
        let tokens = Arc::new(TokenCodec::new(&config.auth.jwt_secret)?);
        let store_timeout = config.lending.store_timeout();

        Ok(Self {
            gate: AuthenticationGate::new(tokens.clone(), stores.directory.clone(), store_timeout),
            auth: auth::AuthService::new(stores.users.clone(), tokens, &config.auth, store_timeout),
            catalog: catalog::CatalogService::new(
                stores.catalog.clone(),
                stores.books.clone(),
                stores.users.clone(),
                store_timeout,
            ),
            lending: lending::LendingService::new(stores.catalog, stores.directory, &config.lending),
        })
    }
}
