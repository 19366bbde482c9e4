// Copyright 2025 Cowboy AI, LLC.

//! # Realm Substrate
//!
//! Shared substrate for a partitioned game back end. Every piece of state is
//! scoped by a [`Tenant`]; every state change is announced on a message bus
//! only after the change itself succeeded.
//!
//! - **Tenancy**: [`Tenant`] and the per-call [`Context`] carrying its deadline
//! - **Registries**: [`TenantRegistry`], the in-memory tenant-scoped map behind
//!   expressions, invites, portal blocks and map occupancy
//! - **Messages**: envelopes, the staging [`message::MessageBuffer`] and the
//!   [`Emitter`] that publishes only after its closure succeeds
//! - **Persistence**: [`persistence::TenantTable`] for memory and `sqlx`
//!   stores for Postgres, with retry on transient failures
//! - **Services**: bans, expressions, invites, portals, maps, sagas, account
//!   storage and NPC conversations
//! - **Edges**: the NATS transport, the JSON:API REST surface and periodic
//!   [`sweeper::Sweeper`]s
//!
//! ## Design Principles
//!
//! 1. **Isolation**: no query, registry lookup or event key crosses tenants
//! 2. **Emit after commit**: events are staged and published once the
//!    operation has succeeded, in staging order per topic
//! 3. **Idempotent by key**: natural keys make duplicate delivery harmless
//! 4. **Typed failures**: every error carries a category that decides
//!    retries and HTTP status

#![warn(missing_docs)]

pub mod ban;
pub mod config;
pub mod conversation;
pub mod errors;
pub mod expression;
pub mod field;
pub mod infrastructure;
pub mod invite;
pub mod logging;
pub mod map;
pub mod message;
pub mod persistence;
pub mod portal;
pub mod provider;
pub mod registries;
pub mod registry;
pub mod rest;
pub mod saga;
pub mod storage;
pub mod sweeper;
pub mod tenant;

pub use errors::{DomainError, DomainResult, ErrorCategory};
pub use field::{AccountId, ChannelId, CharacterId, Field, MapId, WorldId};
pub use message::{Emitter, Envelope, Message};
pub use provider::Provider;
pub use registries::Registries;
pub use registry::TenantRegistry;
pub use sweeper::{spawn_sweeper, Sweeper, TenantSource};
pub use tenant::{Context, Tenant};
