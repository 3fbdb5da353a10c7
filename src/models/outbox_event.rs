use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "published")]
    Published,
    /// Retries exhausted; row parked for operator attention.
    #[sea_orm(string_value = "dead")]
    Dead,
}

/// Outbox row, written in the same transaction as the aggregate mutation.
/// The auto-incremented primary key doubles as the monotonic dispatch
/// sequence; `event_id` is the subscriber-facing idempotency key.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "outbox_events")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub event_id: Uuid,
    pub event_type: String,
    pub aggregate_id: Uuid,
    pub tenant_id: Uuid,
    pub payload: Json,
    pub version: i32,
    pub occurred_at: DateTimeUtc,
    pub status: OutboxStatus,
    pub attempts: i32,
    pub next_attempt_at: Option<DateTimeUtc>,
    pub last_error: Option<String>,
    pub published_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
