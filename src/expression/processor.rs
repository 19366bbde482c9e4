// Copyright 2025 Cowboy AI, LLC.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::model::Expression;
use super::registry::ExpressionRegistry;
use crate::errors::DomainResult;
use crate::field::{CharacterId, Field};
use crate::message::topics::EVENT_TOPIC_EXPRESSION;
use crate::message::{create_key, Emitter, Envelope, MessageBuffer};
use crate::tenant::{Context, Tenant};

/// A character changed expression
pub const EXPRESSION_CHANGED: &str = "EXPRESSION";
/// A character's expression lapsed back to the default
pub const EXPRESSION_EXPIRED: &str = "EXPRESSION_EXPIRED";

/// Body of an expression event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionBody {
    /// Character
    pub character_id: CharacterId,
    /// Where the character is
    #[serde(flatten)]
    pub field: Field,
    /// Expression id, 0 once expired
    pub expression: u32,
}

pub(crate) fn stage_expression(
    buffer: &MessageBuffer,
    tenant: &Tenant,
    transaction_id: Uuid,
    kind: &str,
    model: &Expression,
    expression: u32,
) {
    buffer.put_envelope(
        EVENT_TOPIC_EXPRESSION,
        tenant,
        Envelope::new(
            transaction_id,
            tenant,
            create_key(u64::from(model.character_id())),
            kind,
            ExpressionBody {
                character_id: model.character_id(),
                field: model.field(),
                expression,
            },
        ),
    );
}

/// Expression service operations
#[derive(Clone)]
pub struct ExpressionProcessor {
    registry: Arc<ExpressionRegistry>,
    emitter: Emitter,
}

impl ExpressionProcessor {
    /// Processor over `registry`
    pub fn new(registry: Arc<ExpressionRegistry>, emitter: Emitter) -> Self {
        Self { registry, emitter }
    }

    /// Show `expression` on a character until the registry TTL lapses
    pub async fn change(
        &self,
        ctx: &Context,
        transaction_id: Uuid,
        character_id: CharacterId,
        field: Field,
        expression: u32,
    ) -> DomainResult<Expression> {
        let tenant = ctx.tenant();
        self.emitter
            .emit_with_result(ctx, |buf| async move {
                let model = self.registry.add(tenant, character_id, field, expression)?;
                stage_expression(
                    &buf,
                    tenant,
                    transaction_id,
                    EXPRESSION_CHANGED,
                    &model,
                    expression,
                );
                debug!(tenant_id = %tenant.id, character_id, expression, "Expression changed");
                Ok(model)
            })
            .await
    }

    /// Drop a character's expression without announcing it
    pub fn clear(&self, ctx: &Context, character_id: CharacterId) -> Option<Expression> {
        self.registry.clear(ctx.tenant(), character_id)
    }

    /// Current expression of a character
    pub fn get(&self, ctx: &Context, character_id: CharacterId) -> Option<Expression> {
        self.registry.get(ctx.tenant(), character_id)
    }

    /// Registry this processor writes to
    pub fn registry(&self) -> &Arc<ExpressionRegistry> {
        &self.registry
    }

    /// Emitter used for events
    pub fn emitter(&self) -> &Emitter {
        &self.emitter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::InMemoryPublisher;
    use crate::tenant::test_support;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_change_replaces_and_emits() {
        let publisher = InMemoryPublisher::new();
        let processor = ExpressionProcessor::new(
            Arc::new(ExpressionRegistry::default()),
            Emitter::new(Arc::new(publisher.clone())),
        );
        let ctx = test_support::context();
        let field = Field::new(0, 1, 100000000);

        processor.change(&ctx, Uuid::new_v4(), 1000, field, 5).await.unwrap();
        processor.change(&ctx, Uuid::new_v4(), 1000, field, 10).await.unwrap();

        assert_eq!(processor.get(&ctx, 1000).unwrap().expression(), 10);
        assert_eq!(processor.registry().len(ctx.tenant()), 1);

        let events = publisher.envelopes::<ExpressionBody>(EVENT_TOPIC_EXPRESSION).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].key, "1000");
        assert_eq!(
            events[1].body,
            ExpressionBody {
                character_id: 1000,
                field,
                expression: 10
            }
        );
    }

    #[tokio::test]
    async fn test_clear_is_silent() {
        let publisher = InMemoryPublisher::new();
        let processor = ExpressionProcessor::new(
            Arc::new(ExpressionRegistry::default()),
            Emitter::new(Arc::new(publisher.clone())),
        );
        let ctx = test_support::context();
        processor
            .change(&ctx, Uuid::new_v4(), 7, Field::new(0, 0, 1), 3)
            .await
            .unwrap();
        publisher.clear();

        assert!(processor.clear(&ctx, 7).is_some());
        assert!(processor.clear(&ctx, 7).is_none());
        assert_eq!(publisher.count(), 0);
    }
}
