//! Migration: Create tasks table

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Tasks::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Tasks::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Tasks::TenantId).uuid().not_null())
                    .col(ColumnDef::new(Tasks::ProjectId).uuid().not_null())
                    .col(ColumnDef::new(Tasks::DepartmentId).uuid().null())
                    .col(ColumnDef::new(Tasks::Title).string_len(500).not_null())
                    .col(ColumnDef::new(Tasks::Description).text().null())
                    .col(
                        ColumnDef::new(Tasks::Status)
                            .string_len(20)
                            .not_null()
                            .default("TODO"),
                    )
                    .col(
                        ColumnDef::new(Tasks::Priority)
                            .string_len(20)
                            .not_null()
                            .default("MEDIUM"),
                    )
                    .col(ColumnDef::new(Tasks::AssignedToUserId).uuid().null())
                    .col(ColumnDef::new(Tasks::CreatedByUserId).uuid().not_null())
                    .col(ColumnDef::new(Tasks::Watchers).json().not_null())
                    .col(ColumnDef::new(Tasks::Tags).json().not_null())
                    .col(
                        ColumnDef::new(Tasks::DueDate)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Tasks::EstimatedHours).double().null())
                    .col(ColumnDef::new(Tasks::ActualHours).double().null())
                    .col(ColumnDef::new(Tasks::BlockedReason).text().null())
                    .col(
                        ColumnDef::new(Tasks::Version)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(Tasks::IsDeleted)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Tasks::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Tasks::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_tasks_tenant_id")
                    .table(Tasks::Table)
                    .col(Tasks::TenantId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_tasks_tenant_project")
                    .table(Tasks::Table)
                    .col(Tasks::TenantId)
                    .col(Tasks::ProjectId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_tasks_tenant_assignee")
                    .table(Tasks::Table)
                    .col(Tasks::TenantId)
                    .col(Tasks::AssignedToUserId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Tasks::Table).if_exists().to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Tasks {
    Table,
    Id,
    #[iden = "tenant_id"]
    TenantId,
    #[iden = "project_id"]
    ProjectId,
    #[iden = "department_id"]
    DepartmentId,
    Title,
    Description,
    Status,
    Priority,
    #[iden = "assigned_to_user_id"]
    AssignedToUserId,
    #[iden = "created_by_user_id"]
    CreatedByUserId,
    Watchers,
    Tags,
    #[iden = "due_date"]
    DueDate,
    #[iden = "estimated_hours"]
    EstimatedHours,
    #[iden = "actual_hours"]
    ActualHours,
    #[iden = "blocked_reason"]
    BlockedReason,
    Version,
    #[iden = "is_deleted"]
    IsDeleted,
    #[iden = "created_at"]
    CreatedAt,
    #[iden = "updated_at"]
    UpdatedAt,
}
