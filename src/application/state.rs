use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::services::audit::AuditService;
use crate::services::breach::BreachOracle;
use crate::services::cache::CacheService;
use crate::services::outbox::OutboxNotifier;

/// Database connection type alias
pub type DbConn = DatabaseConnection;

/// Application state containing all shared resources
#[derive(Clone)]
pub struct AppState {
    pub db: DbConn,
    pub cache: CacheService,
    pub audit: AuditService,
    pub breach: Arc<BreachOracle>,
    pub outbox: OutboxNotifier,
}

impl AppState {
    pub fn new(
        db: DbConn,
        cache: CacheService,
        audit: AuditService,
        breach: Arc<BreachOracle>,
        outbox: OutboxNotifier,
    ) -> Self {
        Self {
            db,
            cache,
            audit,
            breach,
            outbox,
        }
    }
}
