// Copyright 2025 Cowboy AI, LLC.

//! Producer side of the bus
//!
//! The core only knows [`Publisher`]. [`InMemoryPublisher`] records what it
//! is given and backs tests and the single-process mode of the binary; the
//! NATS implementation lives in `infrastructure`.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use std::sync::Arc;

use super::envelope::{Envelope, Message};
use crate::errors::{DomainError, DomainResult};

/// Publishes realized records to a topic
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish `messages` to `topic` in order
    async fn publish(&self, topic: &str, messages: Vec<Message>) -> DomainResult<()>;
}

/// Recording publisher for tests and single-process runs
#[derive(Clone, Default)]
pub struct InMemoryPublisher {
    published: Arc<RwLock<Vec<(String, Message)>>>,
    fail_after: Arc<RwLock<Option<usize>>>,
}

impl InMemoryPublisher {
    /// Create an empty publisher
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every publish once `count` records have been accepted
    pub fn fail_after(&self, count: usize) {
        *self.fail_after.write() = Some(count);
    }

    /// Accept publishes again after [`InMemoryPublisher::fail_after`]
    pub fn recover(&self) {
        *self.fail_after.write() = None;
    }

    /// Every published record in publish order
    pub fn published(&self) -> Vec<(String, Message)> {
        self.published.read().clone()
    }

    /// Records published to `topic` in order
    pub fn messages(&self, topic: &str) -> Vec<Message> {
        self.published
            .read()
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Decoded envelopes published to `topic`
    pub fn envelopes<B: DeserializeOwned>(&self, topic: &str) -> DomainResult<Vec<Envelope<B>>> {
        self.messages(topic).iter().map(Message::decode).collect()
    }

    /// Total number of published records
    pub fn count(&self) -> usize {
        self.published.read().len()
    }

    /// Forget every recorded publish
    pub fn clear(&self) {
        self.published.write().clear();
    }
}

#[async_trait]
impl Publisher for InMemoryPublisher {
    async fn publish(&self, topic: &str, messages: Vec<Message>) -> DomainResult<()> {
        let limit = *self.fail_after.read();
        let mut published = self.published.write();
        for message in messages {
            if limit.is_some_and(|limit| published.len() >= limit) {
                return Err(DomainError::TransientBus(format!(
                    "publisher refused record for topic {topic}"
                )));
            }
            published.push((topic.to_string(), message));
        }
        Ok(())
    }
}
