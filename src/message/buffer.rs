// Copyright 2025 Cowboy AI, LLC.

//! Per-operation staging area for outbound records
//!
//! A [`MessageBuffer`] maps topic to an ordered list of deferred providers.
//! Topics keep the order in which they were first staged, and each topic
//! keeps the order of its providers. Nothing is realized until
//! [`MessageBuffer::get_all`] runs, which the emitter does only after the
//! operation that filled the buffer has succeeded.

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

use super::envelope::{Envelope, Message};
use crate::errors::DomainResult;
use crate::tenant::Tenant;

/// Deferred computation yielding the records for one staged entry
pub type MessageProvider = Box<dyn FnOnce() -> DomainResult<Vec<Message>> + Send>;

/// Provider for a single envelope, serialized on realization
pub fn envelope_provider<B>(tenant: &Tenant, envelope: Envelope<B>) -> MessageProvider
where
    B: Serialize + Send + 'static,
{
    let tenant = tenant.clone();
    Box::new(move || Ok(vec![envelope.to_message(&tenant)?]))
}

/// Shared handle to a staging area
///
/// Cloning the handle shares the same underlying buffer.
#[derive(Clone, Default)]
pub struct MessageBuffer {
    staged: Arc<Mutex<IndexMap<String, Vec<MessageProvider>>>>,
}

impl MessageBuffer {
    /// Create an empty staging area
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provider to `topic`
    pub fn put(&self, topic: impl Into<String>, provider: MessageProvider) {
        self.staged
            .lock()
            .entry(topic.into())
            .or_default()
            .push(provider);
    }

    /// Append an envelope to `topic`
    pub fn put_envelope<B>(&self, topic: impl Into<String>, tenant: &Tenant, envelope: Envelope<B>)
    where
        B: Serialize + Send + 'static,
    {
        self.put(topic, envelope_provider(tenant, envelope));
    }

    /// Append an already realized record to `topic`
    pub fn put_message(&self, topic: impl Into<String>, message: Message) {
        self.put(topic, Box::new(move || Ok(vec![message])));
    }

    /// Number of staged providers across all topics
    pub fn len(&self) -> usize {
        self.staged.lock().values().map(Vec::len).sum()
    }

    /// Whether nothing has been staged
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Topics in staging order
    pub fn topics(&self) -> Vec<String> {
        self.staged.lock().keys().cloned().collect()
    }

    /// Throw away everything staged so far
    pub fn discard(&self) {
        self.staged.lock().clear();
    }

    /// Realize every provider, draining the buffer
    ///
    /// Topics come back in staging order with their records in the order
    /// their providers were put. A failing provider aborts realization and
    /// the whole drained content is dropped.
    pub fn get_all(&self) -> DomainResult<IndexMap<String, Vec<Message>>> {
        let staged = std::mem::take(&mut *self.staged.lock());
        let mut realized = IndexMap::with_capacity(staged.len());
        for (topic, providers) in staged {
            let mut messages = Vec::with_capacity(providers.len());
            for provider in providers {
                messages.extend(provider()?);
            }
            realized.insert(topic, messages);
        }
        Ok(realized)
    }
}

impl std::fmt::Debug for MessageBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let staged = self.staged.lock();
        f.debug_map()
            .entries(staged.iter().map(|(k, v)| (k, v.len())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DomainError;
    use crate::message::envelope::create_key;
    use crate::tenant::test_support;
    use serde_json::json;
    use uuid::Uuid;

    fn envelope(tenant: &Tenant, id: u64) -> Envelope<serde_json::Value> {
        Envelope::new(Uuid::nil(), tenant, create_key(id), "TEST", json!({ "id": id }))
    }

    #[test]
    fn test_topics_keep_first_put_order() {
        let tenant = test_support::tenant();
        let buffer = MessageBuffer::new();
        buffer.put_envelope("b", &tenant, envelope(&tenant, 1));
        buffer.put_envelope("a", &tenant, envelope(&tenant, 2));
        buffer.put_envelope("b", &tenant, envelope(&tenant, 3));

        assert_eq!(buffer.topics(), vec!["b".to_string(), "a".to_string()]);
        assert_eq!(buffer.len(), 3);

        let all = buffer.get_all().unwrap();
        let keys: Vec<_> = all["b"].iter().map(|m| m.key.clone()).collect();
        assert_eq!(keys, vec!["1", "3"]);
        assert_eq!(all["a"][0].key, "2");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_providers_are_deferred() {
        let tenant = test_support::tenant();
        let buffer = MessageBuffer::new();
        let called = Arc::new(Mutex::new(false));
        let flag = called.clone();
        buffer.put(
            "t",
            Box::new(move || {
                *flag.lock() = true;
                Ok(vec![envelope(&tenant, 1).to_message(&tenant)?])
            }),
        );

        assert!(!*called.lock());
        buffer.get_all().unwrap();
        assert!(*called.lock());
    }

    #[test]
    fn test_failing_provider_aborts_realization() {
        let buffer = MessageBuffer::new();
        buffer.put("t", Box::new(|| Err(DomainError::validation("bad body"))));
        assert!(buffer.get_all().is_err());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_clones_share_state() {
        let tenant = test_support::tenant();
        let buffer = MessageBuffer::new();
        let handle = buffer.clone();
        handle.put_envelope("t", &tenant, envelope(&tenant, 9));
        assert_eq!(buffer.len(), 1);
        buffer.discard();
        assert!(handle.is_empty());
    }
}
