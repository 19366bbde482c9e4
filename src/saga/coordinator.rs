// Copyright 2025 Cowboy AI, LLC.

//! Saga coordinator
//!
//! The coordinator never blocks waiting for a participant. It persists the
//! saga, dispatches the current step and returns; the participant's status
//! event re-enters through [`SagaCoordinator::step_status`], which applies
//! the status, persists again and dispatches whatever comes next.
//!
//! When a step fails every completed step before it is reversed, latest
//! first, and the saga ends `failed`. Steps after the failure stay
//! `pending`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::model::{Action, ActionPayload, Inverse, Saga, SagaError, SagaStatus, Step, StepStatus};
use super::store::SagaStore;
use crate::errors::DomainResult;
use crate::message::topics::COMMAND_TOPIC_SAGA;
use crate::message::{uuid_key, Emitter, Envelope};
use crate::tenant::Context;

/// Attempts at a read-modify-write before a version conflict is surfaced
const MAX_WRITE_ATTEMPTS: usize = 3;

/// One action sent to a participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SagaCommand {
    /// Saga
    pub transaction_id: Uuid,
    /// Step being executed or reversed
    pub step_id: String,
    /// What to do
    pub payload: ActionPayload,
    /// Reverses a completed step
    pub compensating: bool,
}

impl SagaCommand {
    fn forward(saga: &Saga, step: &Step) -> Self {
        Self {
            transaction_id: saga.transaction_id,
            step_id: step.id.clone(),
            payload: step.payload.clone(),
            compensating: false,
        }
    }

    fn compensation(saga: &Saga, step: &Step, payload: ActionPayload) -> Self {
        Self {
            transaction_id: saga.transaction_id,
            step_id: step.id.clone(),
            payload,
            compensating: true,
        }
    }
}

/// Body of a step command on the bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SagaCommandBody {
    /// Saga
    pub transaction_id: Uuid,
    /// Step
    pub step_id: String,
    /// Action tag
    pub action: Action,
    /// Action payload
    pub payload: serde_json::Value,
    /// Reverses a completed step
    #[serde(default)]
    pub compensating: bool,
}

impl From<&SagaCommand> for SagaCommandBody {
    fn from(command: &SagaCommand) -> Self {
        Self {
            transaction_id: command.transaction_id,
            step_id: command.step_id.clone(),
            action: command.payload.action(),
            payload: command.payload.to_value(),
            compensating: command.compensating,
        }
    }
}

/// Sends step commands to the participant services
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    /// Deliver `command`
    async fn dispatch(&self, ctx: &Context, command: SagaCommand) -> DomainResult<()>;
}

/// [`ActionDispatcher`] staging commands on the saga command topic
///
/// Commands are keyed by transaction id so every command of a saga lands
/// on one partition in order.
pub struct CommandDispatcher {
    emitter: Emitter,
}

impl CommandDispatcher {
    /// Dispatcher publishing through `emitter`
    pub fn new(emitter: Emitter) -> Self {
        Self { emitter }
    }
}

#[async_trait]
impl ActionDispatcher for CommandDispatcher {
    async fn dispatch(&self, ctx: &Context, command: SagaCommand) -> DomainResult<()> {
        let tenant = ctx.tenant();
        self.emitter
            .emit(ctx, |buf| async move {
                buf.put_envelope(
                    COMMAND_TOPIC_SAGA,
                    tenant,
                    Envelope::new(
                        command.transaction_id,
                        tenant,
                        uuid_key(&command.transaction_id),
                        command.payload.action().as_str(),
                        SagaCommandBody::from(&command),
                    ),
                );
                Ok(())
            })
            .await
    }
}

/// Drives sagas forward and compensates failures
#[derive(Clone)]
pub struct SagaCoordinator {
    store: Arc<dyn SagaStore>,
    dispatcher: Arc<dyn ActionDispatcher>,
}

impl SagaCoordinator {
    /// Coordinator persisting to `store` and dispatching through `dispatcher`
    pub fn new(store: Arc<dyn SagaStore>, dispatcher: Arc<dyn ActionDispatcher>) -> Self {
        Self { store, dispatcher }
    }

    /// Backing store
    pub fn store(&self) -> &Arc<dyn SagaStore> {
        &self.store
    }

    /// Persist a new saga and dispatch its first step
    pub async fn start(&self, ctx: &Context, saga: Saga) -> DomainResult<Saga> {
        ctx.check()?;
        if saga.steps.is_empty() {
            return Err(SagaError::NoSteps.into());
        }
        let saga = self.store.insert(ctx.tenant(), &saga).await?;
        info!(
            tenant_id = %ctx.tenant().id,
            transaction_id = %saga.transaction_id,
            saga_type = %saga.saga_type,
            initiated_by = %saga.initiated_by,
            steps = saga.steps.len(),
            "Saga started"
        );
        self.drive(ctx, saga).await
    }

    /// Saga by transaction id
    pub async fn get(&self, ctx: &Context, transaction_id: Uuid) -> DomainResult<Saga> {
        self.store.get(ctx.tenant(), transaction_id).await
    }

    /// Apply a participant's status report for one step
    ///
    /// Reports are idempotent: repeating a status is a no-op and reports
    /// for a finished or compensating saga are ignored.
    pub async fn step_status(
        &self,
        ctx: &Context,
        transaction_id: Uuid,
        step_id: &str,
        status: StepStatus,
    ) -> DomainResult<Saga> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            ctx.check()?;
            let mut saga = self.store.get(ctx.tenant(), transaction_id).await?;
            if saga.status != SagaStatus::Active {
                debug!(
                    transaction_id = %transaction_id,
                    step_id,
                    saga_status = %saga.status,
                    "Ignoring step status for settled saga"
                );
                return Ok(saga);
            }
            let was_current = saga.current_step().is_some_and(|s| s.id == step_id);
            if !saga.set_step_status(step_id, status, Utc::now())? {
                debug!(transaction_id = %transaction_id, step_id, %status, "Duplicate step status");
                return Ok(saga);
            }
            match self.store.update(ctx.tenant(), &saga).await {
                Ok(saved) => {
                    info!(
                        tenant_id = %ctx.tenant().id,
                        transaction_id = %transaction_id,
                        step_id,
                        %status,
                        "Saga step reported"
                    );
                    if status == StepStatus::Completed && !was_current {
                        return Ok(saved);
                    }
                    return self.drive(ctx, saved).await;
                }
                Err(err) if err.is_concurrency_error() && attempt < MAX_WRITE_ATTEMPTS => {
                    debug!(
                        transaction_id = %transaction_id,
                        attempt,
                        "Saga changed underneath, retrying"
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Resume every unfinished saga of the context's tenant
    ///
    /// Active sagas get their current step dispatched again; failing ones
    /// are compensated. Returns how many sagas were resumed.
    pub async fn recover(&self, ctx: &Context) -> DomainResult<usize> {
        let mut resumed = 0;
        for saga in self.store.unfinished(ctx.tenant()).await? {
            let transaction_id = saga.transaction_id;
            match self.drive(ctx, saga).await {
                Ok(_) => resumed += 1,
                Err(err) => warn!(
                    tenant_id = %ctx.tenant().id,
                    transaction_id = %transaction_id,
                    category = %err.category(),
                    error = %err,
                    "Saga recovery failed"
                ),
            }
        }
        Ok(resumed)
    }

    /// Fail and compensate active sagas created at or before `now - timeout`
    pub async fn expire(
        &self,
        ctx: &Context,
        now: DateTime<Utc>,
        timeout: chrono::Duration,
    ) -> DomainResult<Vec<Saga>> {
        let mut expired = Vec::new();
        for mut saga in self.store.unfinished(ctx.tenant()).await? {
            if saga.status != SagaStatus::Active || saga.created_at + timeout > now {
                continue;
            }
            if let Some(step_id) = saga.current_step().map(|s| s.id.clone()) {
                saga.set_step_status(&step_id, StepStatus::Failed, now)?;
            }
            let saga = match self.store.update(ctx.tenant(), &saga).await {
                Ok(saga) => saga,
                Err(err) if err.is_concurrency_error() => {
                    debug!(
                        transaction_id = %saga.transaction_id,
                        "Saga moved while expiring, skipping"
                    );
                    continue;
                }
                Err(err) => return Err(err),
            };
            warn!(
                tenant_id = %ctx.tenant().id,
                transaction_id = %saga.transaction_id,
                "Saga timed out"
            );
            expired.push(self.drive(ctx, saga).await?);
        }
        Ok(expired)
    }

    async fn drive(&self, ctx: &Context, saga: Saga) -> DomainResult<Saga> {
        if saga.status.is_terminal() {
            return Ok(saga);
        }
        if saga.failing() {
            return self.compensate(ctx, saga).await;
        }
        match saga.current_step() {
            Some(step) => {
                ctx.check()?;
                let command = SagaCommand::forward(&saga, step);
                debug!(
                    transaction_id = %saga.transaction_id,
                    step_id = %step.id,
                    action = %step.action(),
                    "Dispatching saga step"
                );
                self.dispatcher.dispatch(ctx, command).await?;
                Ok(saga)
            }
            None => {
                let completed = Saga {
                    status: SagaStatus::Completed,
                    ..saga
                };
                let completed = self.store.update(ctx.tenant(), &completed).await?;
                info!(
                    tenant_id = %ctx.tenant().id,
                    transaction_id = %completed.transaction_id,
                    "Saga completed"
                );
                Ok(completed)
            }
        }
    }

    async fn compensate(&self, ctx: &Context, mut saga: Saga) -> DomainResult<Saga> {
        if saga.status == SagaStatus::Active {
            saga.status = SagaStatus::Compensating;
            saga = self.store.update(ctx.tenant(), &saga).await?;
        }
        warn!(
            tenant_id = %ctx.tenant().id,
            transaction_id = %saga.transaction_id,
            failed_step = ?saga.failed_step_index(),
            "Saga failing, compensating"
        );

        let plan: Vec<Step> = saga.compensation_plan().into_iter().cloned().collect();
        for step in &plan {
            let payload = match step.payload.inverse() {
                Inverse::Dispatch(payload) => payload,
                Inverse::Skip(reason) => {
                    warn!(
                        transaction_id = %saga.transaction_id,
                        step_id = %step.id,
                        action = %step.action(),
                        reason,
                        "Step has no inverse, skipping"
                    );
                    continue;
                }
            };
            let command = SagaCommand::compensation(&saga, step, payload);
            if let Err(err) = self.dispatcher.dispatch(ctx, command).await {
                error!(
                    tenant_id = %ctx.tenant().id,
                    transaction_id = %saga.transaction_id,
                    step_id = %step.id,
                    category = %err.category(),
                    error = %err,
                    "Compensation failed, saga left failed"
                );
                break;
            }
        }

        saga.status = SagaStatus::Failed;
        let saga = self.store.update(ctx.tenant(), &saga).await?;
        info!(
            tenant_id = %ctx.tenant().id,
            transaction_id = %saga.transaction_id,
            "Saga failed"
        );
        Ok(saga)
    }
}
