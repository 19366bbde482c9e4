// Copyright 2025 Cowboy AI, LLC.

//! Buffer-then-commit emission
//!
//! [`Emitter::emit`] hands a fresh [`MessageBuffer`] to an operation. If the
//! operation fails the buffer is discarded and nothing reaches the bus. If
//! it succeeds every staged record is realized and published, topic by
//! topic, in staging order. A publish failure after a successful operation
//! surfaces as [`DomainError::TransientBus`]: the local mutation already
//! happened and must not be rolled back.

use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use super::buffer::MessageBuffer;
use super::publisher::Publisher;
use crate::errors::{DomainError, DomainResult};
use crate::tenant::Context;

/// Runs operations against a buffer and publishes on success
#[derive(Clone)]
pub struct Emitter {
    publisher: Arc<dyn Publisher>,
}

impl Emitter {
    /// Emitter publishing through `publisher`
    pub fn new(publisher: Arc<dyn Publisher>) -> Self {
        Self { publisher }
    }

    /// The publisher records go to
    pub fn publisher(&self) -> &Arc<dyn Publisher> {
        &self.publisher
    }

    /// Run `operation` and publish what it staged
    pub async fn emit<F, Fut>(&self, ctx: &Context, operation: F) -> DomainResult<()>
    where
        F: FnOnce(MessageBuffer) -> Fut,
        Fut: Future<Output = DomainResult<()>>,
    {
        self.emit_with_result(ctx, operation).await
    }

    /// Run `operation`, publish what it staged, and return its value
    pub async fn emit_with_result<T, F, Fut>(&self, ctx: &Context, operation: F) -> DomainResult<T>
    where
        F: FnOnce(MessageBuffer) -> Fut,
        Fut: Future<Output = DomainResult<T>>,
    {
        ctx.check()?;
        let buffer = MessageBuffer::new();
        let value = match operation(buffer.clone()).await {
            Ok(value) => value,
            Err(err) => {
                debug!(
                    tenant_id = %ctx.tenant().id,
                    staged = buffer.len(),
                    category = %err.category(),
                    "Operation failed, discarding staged records"
                );
                buffer.discard();
                return Err(err);
            }
        };
        self.flush(ctx, &buffer).await?;
        Ok(value)
    }

    /// Realize and publish everything staged in `buffer`
    ///
    /// Returns the number of records published.
    pub async fn flush(&self, ctx: &Context, buffer: &MessageBuffer) -> DomainResult<usize> {
        let staged = buffer.get_all()?;
        let mut published = 0;
        for (topic, messages) in staged {
            if messages.is_empty() {
                continue;
            }
            ctx.check()?;
            let count = messages.len();
            if let Err(err) = self.publisher.publish(&topic, messages).await {
                warn!(
                    tenant_id = %ctx.tenant().id,
                    topic = %topic,
                    published,
                    error = %err,
                    "Publish failed after commit"
                );
                return Err(match err {
                    DomainError::TransientBus(_) => err,
                    other => DomainError::TransientBus(other.to_string()),
                });
            }
            published += count;
        }
        debug!(tenant_id = %ctx.tenant().id, published, "Flushed staged records");
        Ok(published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::envelope::{create_key, Envelope};
    use crate::message::publisher::InMemoryPublisher;
    use crate::tenant::test_support;
    use serde_json::json;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_error_publishes_nothing() {
        let publisher = InMemoryPublisher::new();
        let emitter = Emitter::new(Arc::new(publisher.clone()));
        let ctx = test_support::context();
        let tenant = ctx.tenant().clone();

        let result = emitter
            .emit(&ctx, |buf| async move {
                buf.put_envelope(
                    "topic",
                    &tenant,
                    Envelope::new(Uuid::nil(), &tenant, create_key(1), "X", json!({})),
                );
                Err(DomainError::validation("rejected"))
            })
            .await;

        assert!(result.unwrap_err().is_validation_error());
        assert_eq!(publisher.count(), 0);
    }

    #[tokio::test]
    async fn test_success_publishes_in_declared_order() {
        let publisher = InMemoryPublisher::new();
        let emitter = Emitter::new(Arc::new(publisher.clone()));
        let ctx = test_support::context();
        let tenant = ctx.tenant().clone();

        let value = emitter
            .emit_with_result(&ctx, |buf| async move {
                for (topic, id) in [("one", 1u64), ("two", 2), ("one", 3)] {
                    buf.put_envelope(
                        topic,
                        &tenant,
                        Envelope::new(Uuid::nil(), &tenant, create_key(id), "X", json!({})),
                    );
                }
                Ok(7)
            })
            .await
            .unwrap();

        assert_eq!(value, 7);
        let order: Vec<_> = publisher
            .published()
            .into_iter()
            .map(|(t, m)| format!("{t}:{}", m.key))
            .collect();
        assert_eq!(order, vec!["one:1", "one:3", "two:2"]);
    }

    #[tokio::test]
    async fn test_publish_failure_is_transient_bus() {
        let publisher = InMemoryPublisher::new();
        publisher.fail_after(0);
        let emitter = Emitter::new(Arc::new(publisher.clone()));
        let ctx = test_support::context();
        let tenant = ctx.tenant().clone();

        let err = emitter
            .emit(&ctx, |buf| async move {
                buf.put_envelope(
                    "t",
                    &tenant,
                    Envelope::new(Uuid::nil(), &tenant, "1", "X", json!({})),
                );
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::TransientBus(_)));
    }
}
