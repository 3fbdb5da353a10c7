pub mod audit;
pub mod breach;
pub mod cache;
pub mod outbox;
pub mod security;
pub mod tenants;
pub mod tokens;

pub use audit::AuditService;
pub use breach::{BreachCheck, BreachOracle};
pub use cache::CacheService;
pub use outbox::{OutboxNotifier, OutboxWorker};
pub use security::{
    create_access_token, decode_access_token, hash_password, verify_and_rehash, verify_password,
    verify_totp,
};
