//! Command/query dispatch.
//!
//! Every state change goes through [`Mediator::dispatch`]: validate, role
//! gate, permission gate, open a transaction, run the handler, flush
//! recorded events into the outbox, commit. A failure at any stage rolls
//! the whole transaction back, so no partial write or event survives.
//! Queries skip the transaction and the outbox.
//!
//! Routing is static: each command type implements its own `execute`, which
//! is the compile-time equivalent of a one-handler-per-message registry.

use async_trait::async_trait;
use sea_orm::{DatabaseTransaction, TransactionTrait};

use crate::application::error::Result;
use crate::application::state::AppState;
use crate::context::RequestContext;
use crate::domain::authorization::{self, Role};
use crate::domain::events::DomainEvent;
use crate::services::outbox;

/// Transaction handle plus the events recorded during one command.
pub struct UnitOfWork<'a> {
    tx: &'a DatabaseTransaction,
    pub state: &'a AppState,
    events: Vec<DomainEvent>,
}

impl<'a> UnitOfWork<'a> {
    /// The command's transaction. Every repository call inside a handler
    /// goes through this connection.
    pub fn conn(&self) -> &'a DatabaseTransaction {
        self.tx
    }

    /// Record an event for the transactional outbox flush.
    pub fn record(&mut self, event: DomainEvent) {
        self.events.push(event);
    }
}

#[async_trait]
pub trait Command: Send + Sized {
    type Output: Send;

    const NAME: &'static str;

    /// Role gate: caller must hold one of these (empty = no gate).
    fn required_roles(&self) -> &'static [Role] {
        &[]
    }

    /// Permission gate.
    fn required_permission(&self) -> Option<&'static str> {
        None
    }

    /// Schema/policy validation, before any database work.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    async fn execute(self, ctx: &RequestContext, uow: &mut UnitOfWork<'_>)
        -> Result<Self::Output>;
}

#[async_trait]
pub trait Query: Send + Sized {
    type Output: Send;

    const NAME: &'static str;

    fn required_roles(&self) -> &'static [Role] {
        &[]
    }

    fn required_permission(&self) -> Option<&'static str> {
        None
    }

    async fn fetch(self, ctx: &RequestContext, state: &AppState) -> Result<Self::Output>;
}

#[derive(Clone)]
pub struct Mediator {
    state: AppState,
}

impl Mediator {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Run a command through the fixed pipeline.
    pub async fn dispatch<C: Command>(
        &self,
        ctx: &RequestContext,
        command: C,
    ) -> Result<C::Output> {
        command.validate()?;
        authorization::require_any_role(&ctx.roles, command.required_roles())?;
        if let Some(permission) = command.required_permission() {
            authorization::require_permission(&ctx.permissions, permission)?;
        }

        tracing::debug!(command = C::NAME, tenant_id = %ctx.tenant_id, "dispatching command");

        let tx = self.state.db.begin().await?;
        let mut uow = UnitOfWork {
            tx: &tx,
            state: &self.state,
            events: Vec::new(),
        };

        match command.execute(ctx, &mut uow).await {
            Ok(output) => {
                let events = uow.events;
                outbox::flush(&tx, &events).await?;
                tx.commit().await?;
                if !events.is_empty() {
                    self.state.outbox.wake();
                }
                tracing::debug!(command = C::NAME, "command completed");
                Ok(output)
            }
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            }
        }
    }

    /// Run a query: same gates, no transaction, no outbox.
    pub async fn query<Q: Query>(&self, ctx: &RequestContext, query: Q) -> Result<Q::Output> {
        authorization::require_any_role(&ctx.roles, query.required_roles())?;
        if let Some(permission) = query.required_permission() {
            authorization::require_permission(&ctx.permissions, permission)?;
        }

        tracing::debug!(query = Q::NAME, tenant_id = %ctx.tenant_id, "dispatching query");
        query.fetch(ctx, &self.state).await
    }
}
