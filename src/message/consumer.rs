// Copyright 2025 Cowboy AI, LLC.

//! Consumer side of the bus
//!
//! Handlers are registered per `(topic, group)` with a [`ConsumerManager`].
//! A transport driver hands each incoming record to
//! [`ConsumerManager::dispatch`], which rebuilds the tenant context from the
//! record headers and fans the envelope out to every handler of the topic.
//! Delivery is at-least-once, so handlers must tolerate duplicates.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::envelope::{Envelope, Message};
use crate::errors::{DomainError, DomainResult};
use crate::tenant::Context;

/// Reacts to one decoded envelope
#[async_trait]
pub trait Handler: Send + Sync {
    /// Handle `envelope` for the tenant in `ctx`
    async fn handle(
        &self,
        ctx: &Context,
        envelope: &Envelope<serde_json::Value>,
    ) -> DomainResult<()>;
}

#[derive(Clone)]
struct Registration {
    id: String,
    group: String,
    handler: Arc<dyn Handler>,
}

/// Handler registry and dispatcher
#[derive(Clone, Default)]
pub struct ConsumerManager {
    handlers: Arc<RwLock<HashMap<String, Vec<Registration>>>>,
}

impl ConsumerManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `topic` under consumer `group`
    ///
    /// Returns the handler id used by [`ConsumerManager::unsubscribe`].
    pub fn subscribe(
        &self,
        topic: impl Into<String>,
        group: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) -> String {
        let id = Uuid::new_v4().to_string();
        let topic = topic.into();
        let group = group.into();
        debug!(topic = %topic, group = %group, handler_id = %id, "Registering handler");
        self.handlers
            .write()
            .entry(topic)
            .or_default()
            .push(Registration {
                id: id.clone(),
                group,
                handler,
            });
        id
    }

    /// Remove a handler, failing if it is unknown
    pub fn unsubscribe(&self, topic: &str, handler_id: &str) -> DomainResult<()> {
        let mut handlers = self.handlers.write();
        let registrations = handlers
            .get_mut(topic)
            .ok_or_else(|| DomainError::not_found("topic", topic))?;
        let before = registrations.len();
        registrations.retain(|r| r.id != handler_id);
        if registrations.len() == before {
            return Err(DomainError::not_found("handler", handler_id));
        }
        Ok(())
    }

    /// Topics with at least one handler
    pub fn topics(&self) -> Vec<String> {
        self.handlers
            .read()
            .iter()
            .filter(|(_, r)| !r.is_empty())
            .map(|(t, _)| t.clone())
            .collect()
    }

    /// Consumer groups registered for `topic`
    pub fn groups(&self, topic: &str) -> Vec<String> {
        let mut groups: Vec<String> = self
            .handlers
            .read()
            .get(topic)
            .map(|r| r.iter().map(|r| r.group.clone()).collect())
            .unwrap_or_default();
        groups.sort();
        groups.dedup();
        groups
    }

    /// Deliver one record to every handler of `topic`
    ///
    /// Handler failures are logged and isolated from one another. Returns
    /// the number of handlers that completed successfully. A record whose
    /// headers or payload cannot be decoded is rejected as a whole.
    pub async fn dispatch(&self, topic: &str, message: &Message) -> DomainResult<usize> {
        let registrations: Vec<Registration> = self
            .handlers
            .read()
            .get(topic)
            .cloned()
            .unwrap_or_default();
        if registrations.is_empty() {
            return Ok(0);
        }

        let tenant = message.tenant()?;
        let envelope: Envelope<serde_json::Value> = message.decode()?;
        if envelope.tenant_id != tenant.id {
            return Err(DomainError::validation(format!(
                "envelope tenant {} does not match header tenant {}",
                envelope.tenant_id, tenant.id
            )));
        }
        let ctx = Context::new(tenant);

        let mut handled = 0;
        for registration in registrations {
            match registration.handler.handle(&ctx, &envelope).await {
                Ok(()) => handled += 1,
                Err(err) => warn!(
                    topic = %topic,
                    group = %registration.group,
                    tenant_id = %envelope.tenant_id,
                    transaction_id = %envelope.transaction_id,
                    kind = %envelope.kind,
                    category = %err.category(),
                    error = %err,
                    "Handler failed"
                ),
            }
        }
        Ok(handled)
    }
}
