pub mod audit_log;
pub mod comment;
pub mod outbox_event;
pub mod refresh_token;
pub mod task;
pub mod tenant;
pub mod user;

use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::authorization::Role;

/// JSON-backed string set column (permissions, tags). Stored as JSON so the
/// schema works on both Postgres and the SQLite test backend.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct StringSet(pub Vec<String>);

/// JSON-backed uuid set column (watchers).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct UuidSet(pub Vec<Uuid>);

/// JSON-backed role set column.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct RoleSet(pub Vec<Role>);

#[allow(unused_imports)]
pub mod prelude {
    pub use super::audit_log::{self, Entity as AuditLog};
    pub use super::comment::{self, Entity as Comment};
    pub use super::outbox_event::{self, Entity as OutboxEvent};
    pub use super::refresh_token::{self, Entity as RefreshToken};
    pub use super::task::{self, Entity as Task};
    pub use super::tenant::{self, Entity as Tenant};
    pub use super::user::{self, Entity as User};
    pub use super::{RoleSet, StringSet, UuidSet};
}
