// Copyright 2025 Cowboy AI, LLC.

//! Expression service
//!
//! Tracks the facial expression each character is showing. Entries are
//! short lived: the [`ExpressionExpirySweeper`] pops them once their TTL
//! has passed and announces the reversion. Entries whose reversion could
//! not be published go back into the registry for the next sweep.

pub mod model;
pub mod processor;
pub mod registry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

pub use model::{Expression, ExpressionBuilder};
pub use processor::{ExpressionBody, ExpressionProcessor, EXPRESSION_CHANGED, EXPRESSION_EXPIRED};
pub use registry::{ExpressionRegistry, DEFAULT_EXPRESSION_TTL_SECS};

use crate::errors::DomainResult;
use crate::sweeper::Sweeper;
use crate::tenant::Context;

/// Pops expired expressions and emits an expiry event for each
///
/// Returns the number of reversions published.
pub struct ExpressionExpirySweeper {
    processor: ExpressionProcessor,
    interval: Duration,
}

impl ExpressionExpirySweeper {
    /// Sweeper over `processor` running every `interval`
    pub fn new(processor: ExpressionProcessor, interval: Duration) -> Self {
        Self { processor, interval }
    }
}

#[async_trait]
impl Sweeper for ExpressionExpirySweeper {
    fn name(&self) -> &'static str {
        "expression-expiry"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    // The registry clock decides expiry, so `now` is not consulted.
    async fn run(&self, _now: DateTime<Utc>) -> DomainResult<usize> {
        let registry = self.processor.registry();
        let mut by_tenant: IndexMap<Uuid, Vec<Expression>> = IndexMap::new();
        for model in registry.pop_expired() {
            by_tenant.entry(model.tenant().id).or_default().push(model);
        }

        let mut announced = 0;
        for (_, models) in by_tenant {
            let Some(tenant) = models.first().map(|m| m.tenant().clone()) else {
                continue;
            };
            let ctx = Context::with_timeout(tenant, self.interval);
            let staged = &models;
            let result = self
                .processor
                .emitter()
                .emit(&ctx, |buf| async move {
                    let transaction_id = Uuid::new_v4();
                    for model in staged {
                        processor::stage_expression(
                            &buf,
                            model.tenant(),
                            transaction_id,
                            EXPRESSION_EXPIRED,
                            model,
                            0,
                        );
                    }
                    Ok(())
                })
                .await;
            match result {
                Ok(()) => announced += models.len(),
                Err(err) => {
                    warn!(
                        tenant_id = %ctx.tenant().id,
                        category = %err.category(),
                        error = %err,
                        pending = models.len(),
                        "Failed to announce expired expressions"
                    );
                    for model in models {
                        registry.restore(model);
                    }
                }
            }
        }
        Ok(announced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;
    use crate::message::topics::EVENT_TOPIC_EXPRESSION;
    use crate::message::{Emitter, InMemoryPublisher};
    use crate::tenant::test_support;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_sweep_emits_reversion_per_character() {
        let publisher = InMemoryPublisher::new();
        let registry = Arc::new(ExpressionRegistry::default());
        let emitter = Emitter::new(Arc::new(publisher.clone()));
        let processor = ExpressionProcessor::new(registry.clone(), emitter);
        let now = Utc::now();
        registry.set_clock(Arc::new(move || now));

        let t1 = test_support::context();
        let t2 = test_support::context();
        processor.change(&t1, Uuid::new_v4(), 1, Field::new(0, 1, 100), 4).await.unwrap();
        processor.change(&t2, Uuid::new_v4(), 2, Field::new(0, 1, 100), 6).await.unwrap();
        publisher.clear();

        registry.set_clock(Arc::new(move || now + chrono::Duration::seconds(10)));
        let sweeper = ExpressionExpirySweeper::new(processor, Duration::from_secs(1));
        assert_eq!(sweeper.run(Utc::now()).await.unwrap(), 2);

        let events = publisher.envelopes::<ExpressionBody>(EVENT_TOPIC_EXPRESSION).unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.kind == EXPRESSION_EXPIRED && e.body.expression == 0));
        assert_eq!(sweeper.run(Utc::now()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unpublished_reversions_are_retried() {
        let publisher = InMemoryPublisher::new();
        let registry = Arc::new(ExpressionRegistry::default());
        let emitter = Emitter::new(Arc::new(publisher.clone()));
        let processor = ExpressionProcessor::new(registry.clone(), emitter);
        let now = Utc::now();
        registry.set_clock(Arc::new(move || now));

        let ctx = test_support::context();
        processor.change(&ctx, Uuid::new_v4(), 1, Field::new(0, 1, 100), 4).await.unwrap();
        processor.change(&ctx, Uuid::new_v4(), 2, Field::new(0, 1, 100), 7).await.unwrap();
        publisher.clear();
        publisher.fail_after(0);

        registry.set_clock(Arc::new(move || now + chrono::Duration::seconds(10)));
        let sweeper = ExpressionExpirySweeper::new(processor, Duration::from_secs(1));
        assert_eq!(sweeper.run(Utc::now()).await.unwrap(), 0);
        assert_eq!(publisher.count(), 0);
        assert_eq!(registry.len(ctx.tenant()), 2);

        publisher.recover();
        assert_eq!(sweeper.run(Utc::now()).await.unwrap(), 2);
        let events = publisher.envelopes::<ExpressionBody>(EVENT_TOPIC_EXPRESSION).unwrap();
        let mut characters: Vec<u32> = events.iter().map(|e| e.body.character_id).collect();
        characters.sort_unstable();
        assert_eq!(characters, vec![1, 2]);
        assert!(registry.is_empty(ctx.tenant()));
    }
}
