//! Migration: Create audit_logs table

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AuditLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AuditLogs::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AuditLogs::TenantId).uuid().not_null())
                    .col(ColumnDef::new(AuditLogs::ActorUserId).uuid().null())
                    .col(ColumnDef::new(AuditLogs::Action).string_len(100).not_null())
                    .col(
                        ColumnDef::new(AuditLogs::TargetType)
                            .string_len(100)
                            .not_null(),
                    )
                    .col(ColumnDef::new(AuditLogs::TargetId).string().null())
                    .col(ColumnDef::new(AuditLogs::Changes).json().not_null())
                    .col(ColumnDef::new(AuditLogs::CorrelationId).string().null())
                    .col(
                        ColumnDef::new(AuditLogs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_audit_logs_tenant_created")
                    .table(AuditLogs::Table)
                    .col(AuditLogs::TenantId)
                    .col(AuditLogs::CreatedAt)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AuditLogs::Table).if_exists().to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum AuditLogs {
    Table,
    Id,
    #[iden = "tenant_id"]
    TenantId,
    #[iden = "actor_user_id"]
    ActorUserId,
    Action,
    #[iden = "target_type"]
    TargetType,
    #[iden = "target_id"]
    TargetId,
    Changes,
    #[iden = "correlation_id"]
    CorrelationId,
    #[iden = "created_at"]
    CreatedAt,
}
