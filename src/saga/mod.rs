// Copyright 2025 Cowboy AI, LLC.

//! Saga coordination
//!
//! Inventory transactions, quest rewards and trades span several services.
//! A [`Saga`] lists their actions as ordered steps; the
//! [`SagaCoordinator`] dispatches one step at a time and advances on the
//! participants' status events, compensating completed steps when one
//! fails. Sagas that never settle are failed by the
//! [`SagaTimeoutSweeper`].

pub mod coordinator;
pub mod model;
pub mod store;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

pub use coordinator::{
    ActionDispatcher, CommandDispatcher, SagaCommand, SagaCommandBody, SagaCoordinator,
};
pub use model::{
    Action, ActionPayload, Inverse, Saga, SagaBuilder, SagaError, SagaStatus, SagaType, Step,
    StepStatus,
};
pub use store::{InMemorySagaStore, PgSagaStore, SagaStore};

use crate::errors::{DomainError, DomainResult};
use crate::message::{Envelope, Handler};
use crate::sweeper::{Sweeper, TenantSource};
use crate::tenant::Context;

/// Sagas still active after this long are failed
pub const DEFAULT_SAGA_TIMEOUT_SECS: u64 = 300;

/// Body of a participant's step status event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SagaStatusBody {
    /// Saga
    pub transaction_id: Uuid,
    /// Step reported on
    pub step_id: String,
    /// New status
    pub status: StepStatus,
}

/// Feeds step status events into the coordinator
pub struct SagaStatusHandler {
    coordinator: SagaCoordinator,
}

impl SagaStatusHandler {
    /// Handler advancing sagas through `coordinator`
    pub fn new(coordinator: SagaCoordinator) -> Self {
        Self { coordinator }
    }
}

#[async_trait]
impl Handler for SagaStatusHandler {
    async fn handle(
        &self,
        ctx: &Context,
        envelope: &Envelope<serde_json::Value>,
    ) -> DomainResult<()> {
        let body: SagaStatusBody = envelope.decode_body()?;
        self.coordinator
            .step_status(ctx, body.transaction_id, &body.step_id, body.status)
            .await
            .map(|_| ())
    }
}

/// Fails and compensates sagas that outlive the timeout
pub struct SagaTimeoutSweeper {
    coordinator: SagaCoordinator,
    tenants: Arc<dyn TenantSource>,
    timeout: chrono::Duration,
    interval: Duration,
}

impl SagaTimeoutSweeper {
    /// Sweeper failing sagas older than `timeout`, every `interval`
    pub fn new(
        coordinator: SagaCoordinator,
        tenants: Arc<dyn TenantSource>,
        timeout: Duration,
        interval: Duration,
    ) -> DomainResult<Self> {
        let timeout = chrono::Duration::from_std(timeout)
            .map_err(|e| DomainError::ConfigurationError(format!("saga timeout: {e}")))?;
        Ok(Self {
            coordinator,
            tenants,
            timeout,
            interval,
        })
    }
}

#[async_trait]
impl Sweeper for SagaTimeoutSweeper {
    fn name(&self) -> &'static str {
        "saga-timeout"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run(&self, now: DateTime<Utc>) -> DomainResult<usize> {
        let mut swept = 0;
        for tenant in self.tenants.tenants() {
            let ctx = Context::with_timeout(tenant, self.interval);
            match self.coordinator.expire(&ctx, now, self.timeout).await {
                Ok(expired) => swept += expired.len(),
                Err(err) => warn!(
                    tenant_id = %ctx.tenant().id,
                    category = %err.category(),
                    error = %err,
                    "Saga timeout sweep failed for tenant"
                ),
            }
        }
        Ok(swept)
    }
}

#[cfg(test)]
mod tests {
    use super::model::fixtures::quest_reward;
    use super::*;
    use crate::message::{Emitter, InMemoryPublisher};
    use crate::tenant::test_support;
    use serde_json::json;

    fn coordinator() -> SagaCoordinator {
        let emitter = Emitter::new(Arc::new(InMemoryPublisher::new()));
        SagaCoordinator::new(
            Arc::new(InMemorySagaStore::new()),
            Arc::new(CommandDispatcher::new(emitter)),
        )
    }

    #[tokio::test]
    async fn test_status_events_advance_saga() {
        let coordinator = coordinator();
        let handler = SagaStatusHandler::new(coordinator.clone());
        let ctx = test_support::context();
        let tx = coordinator.start(&ctx, quest_reward()).await.unwrap().transaction_id;

        for step in ["experience", "mesos", "asset"] {
            let body = json!({"transactionId": tx, "stepId": step, "status": "completed"});
            let envelope = Envelope::new(tx, ctx.tenant(), tx.to_string(), "STATUS", body);
            handler.handle(&ctx, &envelope).await.unwrap();
        }
        assert_eq!(coordinator.get(&ctx, tx).await.unwrap().status, SagaStatus::Completed);
    }

    #[tokio::test]
    async fn test_sweeper_fails_stale_sagas() {
        let coordinator = coordinator();
        let ctx = test_support::context();
        let tx = coordinator.start(&ctx, quest_reward()).await.unwrap().transaction_id;
        let sweeper = SagaTimeoutSweeper::new(
            coordinator.clone(),
            Arc::new(vec![ctx.tenant().clone()]),
            Duration::from_secs(DEFAULT_SAGA_TIMEOUT_SECS),
            Duration::from_secs(1),
        )
        .unwrap();

        assert_eq!(sweeper.run(Utc::now()).await.unwrap(), 0);
        let later = Utc::now() + chrono::Duration::seconds(DEFAULT_SAGA_TIMEOUT_SECS as i64 + 1);
        assert_eq!(sweeper.run(later).await.unwrap(), 1);
        assert_eq!(coordinator.get(&ctx, tx).await.unwrap().status, SagaStatus::Failed);
    }
}
