pub mod m20260115_000001_create_tenants;
pub mod m20260115_000002_create_users;
pub mod m20260115_000003_create_refresh_tokens;
pub mod m20260115_000004_create_tasks;
pub mod m20260115_000005_create_comments;
pub mod m20260115_000006_create_audit_logs;
pub mod m20260115_000007_create_outbox_events;

use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260115_000001_create_tenants::Migration),
            Box::new(m20260115_000002_create_users::Migration),
            Box::new(m20260115_000003_create_refresh_tokens::Migration),
            Box::new(m20260115_000004_create_tasks::Migration),
            Box::new(m20260115_000005_create_comments::Migration),
            Box::new(m20260115_000006_create_audit_logs::Migration),
            Box::new(m20260115_000007_create_outbox_events::Migration),
        ]
    }
}
