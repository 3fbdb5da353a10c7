//! Transactional event outbox.
//!
//! Command handlers record events in memory; the mediator flushes them into
//! `outbox_events` inside the same transaction as the aggregate mutation,
//! so an event is observable if and only if its transaction committed. A
//! background worker then dispatches rows to in-process subscribers,
//! preserving per-aggregate order.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, QuerySelect, Set,
};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{watch, Notify};

use crate::application::config::CONFIG;
use crate::application::error::Result;
use crate::domain::events::{self, DomainEvent};
use crate::models::audit_log::{AuditAction, TargetType};
use crate::models::outbox_event::{self, OutboxStatus};
use crate::services::cache::CacheService;

/// Retry schedule: 1s, 2s, 4s, ... capped at 60s, ten attempts total.
const MAX_ATTEMPTS: i32 = 10;
const BACKOFF_BASE_SECS: i64 = 1;
const BACKOFF_CAP_SECS: i64 = 60;

/// Rows examined per poll cycle.
const POLL_BATCH: u64 = 100;

pub fn backoff_delay(attempts: i32) -> Duration {
    let exp = (attempts - 1).clamp(0, 30) as u32;
    let secs = BACKOFF_BASE_SECS
        .saturating_mul(1i64 << exp)
        .min(BACKOFF_CAP_SECS);
    Duration::seconds(secs)
}

/// Write events into the outbox. Called by the mediator inside the command
/// transaction.
pub async fn flush<C: ConnectionTrait>(db: &C, events: &[DomainEvent]) -> Result<()> {
    for event in events {
        outbox_event::ActiveModel {
            event_id: Set(event.id),
            event_type: Set(event.event_type.clone()),
            aggregate_id: Set(event.aggregate_id),
            tenant_id: Set(event.tenant_id),
            payload: Set(event.payload.clone()),
            version: Set(event.version),
            occurred_at: Set(event.occurred_at),
            status: Set(OutboxStatus::Pending),
            attempts: Set(0),
            next_attempt_at: Set(Some(event.occurred_at)),
            last_error: Set(None),
            published_at: Set(None),
            ..Default::default()
        }
        .insert(db)
        .await?;
    }
    Ok(())
}

/// An in-process event consumer. Implementations must be idempotent keyed
/// on `event.id`: the worker may re-deliver after a partial failure.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    fn name(&self) -> &'static str;
    async fn handle(&self, event: &DomainEvent) -> std::result::Result<(), String>;
}

/// Handle used by the mediator to nudge the worker after a commit instead
/// of waiting for the next poll tick.
#[derive(Clone, Default)]
pub struct OutboxNotifier(Arc<Notify>);

impl OutboxNotifier {
    pub fn wake(&self) {
        self.0.notify_one();
    }
}

pub struct OutboxWorker {
    db: DatabaseConnection,
    subscribers: Vec<Arc<dyn EventSubscriber>>,
    notifier: OutboxNotifier,
    shutdown: watch::Receiver<bool>,
}

impl OutboxWorker {
    pub fn new(
        db: DatabaseConnection,
        subscribers: Vec<Arc<dyn EventSubscriber>>,
        notifier: OutboxNotifier,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            db,
            subscribers,
            notifier,
            shutdown,
        }
    }

    /// Poll loop. Runs until the shutdown signal fires, then drains once
    /// more so committed events are not stranded.
    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(std::time::Duration::from_millis(
            CONFIG.outbox.poll_interval_ms,
        ));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = self.notifier.0.notified() => {}
                _ = self.shutdown.changed() => {
                    tracing::info!("outbox worker draining before shutdown");
                    let grace =
                        std::time::Duration::from_secs(CONFIG.outbox.shutdown_grace_secs);
                    if tokio::time::timeout(grace, self.process_due()).await.is_err() {
                        tracing::warn!("outbox drain exceeded grace period; exiting");
                    }
                    return;
                }
            }

            self.process_due().await;
        }
    }

    /// Dispatch every due row. Within one aggregate only the oldest
    /// unpublished row is eligible, so a backing-off failure blocks its
    /// successors instead of reordering them.
    pub async fn process_due(&self) {
        let pending = match outbox_event::Entity::find()
            .filter(outbox_event::Column::Status.eq(OutboxStatus::Pending))
            .order_by_asc(outbox_event::Column::Id)
            .limit(POLL_BATCH)
            .all(&self.db)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(error = %e, "outbox poll failed");
                return;
            }
        };

        let now = Utc::now();
        let mut blocked_aggregates: HashSet<uuid::Uuid> = HashSet::new();

        for row in pending {
            if blocked_aggregates.contains(&row.aggregate_id) {
                continue;
            }
            blocked_aggregates.insert(row.aggregate_id);

            if row.next_attempt_at.is_some_and(|at| at > now) {
                continue;
            }

            self.dispatch_row(row).await;
        }
    }

    async fn dispatch_row(&self, row: outbox_event::Model) {
        let event = DomainEvent {
            id: row.event_id,
            event_type: row.event_type.clone(),
            aggregate_id: row.aggregate_id,
            tenant_id: row.tenant_id,
            payload: row.payload.clone(),
            version: row.version,
            occurred_at: row.occurred_at,
        };

        let mut failure: Option<String> = None;
        for subscriber in &self.subscribers {
            if let Err(e) = subscriber.handle(&event).await {
                tracing::warn!(
                    subscriber = subscriber.name(),
                    event_id = %event.id,
                    event_type = %event.event_type,
                    error = %e,
                    "event subscriber failed"
                );
                failure = Some(format!("{}: {e}", subscriber.name()));
                break;
            }
        }

        let attempts = row.attempts + 1;
        let mut active = row.into_active_model();
        active.attempts = Set(attempts);

        match failure {
            None => {
                active.status = Set(OutboxStatus::Published);
                active.published_at = Set(Some(Utc::now()));
                active.next_attempt_at = Set(None);
                active.last_error = Set(None);
            }
            Some(error) if attempts >= MAX_ATTEMPTS => {
                tracing::error!(
                    monotonic_counter.outbox_dead_letter = 1,
                    attempts,
                    error = %error,
                    "outbox row moved to dead-letter state"
                );
                active.status = Set(OutboxStatus::Dead);
                active.next_attempt_at = Set(None);
                active.last_error = Set(Some(error));
            }
            Some(error) => {
                active.next_attempt_at = Set(Some(Utc::now() + backoff_delay(attempts)));
                active.last_error = Set(Some(error));
            }
        }

        if let Err(e) = active.update(&self.db).await {
            tracing::warn!(error = %e, "failed to update outbox row");
        }
    }
}

// ==========================================================================
// In-process subscribers
// ==========================================================================

/// Drops cached task listings for a tenant whenever one of its tasks
/// changes. Deleting keys is naturally idempotent.
pub struct CacheInvalidationSubscriber {
    cache: CacheService,
}

impl CacheInvalidationSubscriber {
    pub fn new(cache: CacheService) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl EventSubscriber for CacheInvalidationSubscriber {
    fn name(&self) -> &'static str {
        "cache_invalidation"
    }

    async fn handle(&self, event: &DomainEvent) -> std::result::Result<(), String> {
        match event.event_type.as_str() {
            events::TASK_CREATED
            | events::TASK_UPDATED
            | events::TASK_ASSIGNED
            | events::TASK_STATUS_CHANGED
            | events::TASK_DELETED
            | events::TASK_COMMENT_ADDED => {
                let prefix = CacheService::tenant_key(event.tenant_id, "tasks:");
                self.cache.delete_by_pattern(&prefix).await;
            }
            events::TENANT_SETTINGS_UPDATED => {
                let prefix = format!("tenant:{}:", event.tenant_id);
                self.cache.delete_by_pattern(&prefix).await;
            }
            _ => {}
        }
        Ok(())
    }
}

/// Projects domain events into the audit trail. Idempotent because the
/// audit row reuses the event id as its primary key: re-delivery hits the
/// unique constraint and is treated as already done.
pub struct AuditSubscriber {
    db: DatabaseConnection,
}

impl AuditSubscriber {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn map_event(event_type: &str) -> Option<(AuditAction, TargetType)> {
        match event_type {
            events::USER_REGISTERED => Some((AuditAction::UserRegistered, TargetType::User)),
            events::USER_LOGGED_IN => Some((AuditAction::Login, TargetType::User)),
            events::PASSWORD_CHANGED => Some((AuditAction::PasswordChanged, TargetType::User)),
            events::MFA_ENABLED => Some((AuditAction::MfaEnabled, TargetType::User)),
            events::TENANT_CREATED => Some((AuditAction::TenantCreated, TargetType::Tenant)),
            events::TENANT_SETTINGS_UPDATED => {
                Some((AuditAction::TenantSettingsUpdated, TargetType::Tenant))
            }
            events::TASK_CREATED => Some((AuditAction::TaskCreated, TargetType::Task)),
            events::TASK_UPDATED => Some((AuditAction::TaskUpdated, TargetType::Task)),
            events::TASK_ASSIGNED => Some((AuditAction::TaskAssigned, TargetType::Task)),
            events::TASK_STATUS_CHANGED => {
                Some((AuditAction::TaskStatusChanged, TargetType::Task))
            }
            events::TASK_DELETED => Some((AuditAction::TaskDeleted, TargetType::Task)),
            events::TASK_COMMENT_ADDED => {
                Some((AuditAction::TaskCommentAdded, TargetType::Task))
            }
            events::SECURITY_ALERT => Some((
                AuditAction::TokenReplayDetected,
                TargetType::RefreshTokenFamily,
            )),
            _ => None,
        }
    }
}

#[async_trait]
impl EventSubscriber for AuditSubscriber {
    fn name(&self) -> &'static str {
        "audit_log"
    }

    async fn handle(&self, event: &DomainEvent) -> std::result::Result<(), String> {
        let Some((action, target_type)) = Self::map_event(&event.event_type) else {
            return Ok(());
        };

        let already_recorded = crate::models::audit_log::Entity::find_by_id(event.id)
            .one(&self.db)
            .await
            .map_err(|e| e.to_string())?
            .is_some();
        if already_recorded {
            return Ok(());
        }

        crate::models::audit_log::ActiveModel {
            id: Set(event.id),
            tenant_id: Set(event.tenant_id),
            actor_user_id: Set(event
                .payload
                .get("actor_user_id")
                .and_then(|v| v.as_str())
                .and_then(|s| uuid::Uuid::parse_str(s).ok())),
            action: Set(action.to_string()),
            target_type: Set(target_type.to_string()),
            target_id: Set(Some(event.aggregate_id.to_string())),
            changes: Set(event.payload.clone()),
            correlation_id: Set(None),
            created_at: Set(Utc::now()),
        }
        .insert(&self.db)
        .await
        .map_err(|e| e.to_string())?;

        Ok(())
    }
}
