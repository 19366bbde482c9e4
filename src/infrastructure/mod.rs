// Copyright 2025 Cowboy AI, LLC.

//! Infrastructure adapters
//!
//! The NATS transport behind the message substrate lives here; the
//! Postgres stores sit next to their domain modules.

pub mod nats;

pub use nats::{connect, spawn_consumers, NatsConfig, NatsError, NatsPublisher, KEY_HEADER};
