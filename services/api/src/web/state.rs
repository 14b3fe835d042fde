//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::auth::{AuthService, PasswordHasher, TokenBlacklist, TokenService};
use crate::config::Config;
use crate::error::ApiError;
use flashcard_lms_core::access::AccessResolver;
use flashcard_lms_core::ports::DatabaseService;
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub config: Arc<Config>,
    pub auth: Arc<AuthService>,
    pub tokens: Arc<TokenService>,
}

impl AppState {
    /// Wires the token service, password hasher and auth service around a store.
    pub fn new(config: Arc<Config>, db: Arc<dyn DatabaseService>) -> Result<Self, ApiError> {
        let blacklist = Arc::new(TokenBlacklist::new());
        let tokens = Arc::new(TokenService::from_config(&config, blacklist));
        let passwords = PasswordHasher::from_config(&config)?;
        let auth = Arc::new(AuthService::new(db.clone(), tokens.clone(), passwords)?);

        Ok(Self {
            db,
            config,
            auth,
            tokens,
        })
    }

    pub fn access(&self) -> AccessResolver<'_> {
        AccessResolver::new(self.db.as_ref())
    }
}
