// Copyright 2025 Cowboy AI, LLC.

//! Shared helpers for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use uuid::Uuid;

use realm_substrate::message::{Emitter, InMemoryPublisher};
use realm_substrate::{Context, Tenant};

/// A fresh tenant on the GMS 83.1 client
pub fn tenant() -> Tenant {
    Tenant::new(Uuid::new_v4(), "GMS", 83, 1).expect("valid tenant")
}

/// Context for a fresh tenant, without a deadline
pub fn context() -> Context {
    Context::new(tenant())
}

/// Emitter over a recording publisher, and the publisher itself
pub fn emitter() -> (Emitter, InMemoryPublisher) {
    let publisher = InMemoryPublisher::new();
    (Emitter::new(Arc::new(publisher.clone())), publisher)
}
