// Copyright 2025 Cowboy AI, LLC.

//! # Persistence Layer
//!
//! Multi-tenant storage primitives shared by the services:
//!
//! - **TenantTable**: in-memory table with soft deletion, used by tests and
//!   by the server when no database is configured
//! - **Postgres**: pool setup and schema for the `sqlx` backed stores
//! - **RetryPolicy**: bounded backoff for transient store failures

pub mod postgres;
pub mod retry;
pub mod table;

pub use retry::RetryPolicy;
pub use table::{Row, TenantTable};
