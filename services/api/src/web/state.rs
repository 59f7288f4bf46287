//! services/api/src/web/state.rs
//!
//! Defines the application state shared by every handler.

use crate::config::Config;
use std::sync::Arc;
use warga_core::accounts::AccountService;
use warga_core::activities::ActivityBoard;
use warga_core::dues::DuesEngine;
use warga_core::ports::{DatabaseService, IdentityProvider, ObjectStorage};
use warga_core::requests::ServiceDesk;
use warga_core::AuthorizationGate;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub identity: Arc<dyn IdentityProvider>,
    pub storage: Arc<dyn ObjectStorage>,
    pub config: Arc<Config>,
    pub gate: AuthorizationGate,
    pub accounts: AccountService,
    pub dues: DuesEngine,
    pub desk: ServiceDesk,
    pub activities: ActivityBoard,
}

impl AppState {
    /// Wires the portal services onto one set of backend adapters.
    pub fn new(
        db: Arc<dyn DatabaseService>,
        identity: Arc<dyn IdentityProvider>,
        storage: Arc<dyn ObjectStorage>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            gate: AuthorizationGate::new(db.clone()),
            accounts: AccountService::new(
                identity.clone(),
                db.clone(),
                config.profile_write_attempts,
            ),
            dues: DuesEngine::new(db.clone(), storage.clone()),
            desk: ServiceDesk::new(db.clone(), storage.clone()),
            activities: ActivityBoard::new(db.clone(), storage.clone()),
            db,
            identity,
            storage,
            config,
        }
    }
}
