// Copyright 2025 Cowboy AI, LLC.

//! Message substrate: envelopes, buffers, emission and consumption
//!
//! Business logic stages records on a [`MessageBuffer`]; the [`Emitter`]
//! publishes them only after the operation succeeded. Incoming records are
//! routed to [`Handler`]s through a [`ConsumerManager`].

pub mod buffer;
pub mod consumer;
pub mod emitter;
pub mod envelope;
pub mod publisher;
pub mod topics;

pub use buffer::{envelope_provider, MessageBuffer, MessageProvider};
pub use consumer::{ConsumerManager, Handler};
pub use emitter::Emitter;
pub use envelope::{create_key, uuid_key, Envelope, Message};
pub use publisher::{InMemoryPublisher, Publisher};
pub use topics::Topics;
