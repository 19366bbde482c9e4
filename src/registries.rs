// Copyright 2025 Cowboy AI, LLC.

//! Process-wide registry instances
//!
//! Processors receive their registry by injection. Only the server binary
//! reaches for [`Registries::global`]; tests build their own instances.

use chrono::Duration;
use std::sync::{Arc, OnceLock};

use crate::expression::{ExpressionRegistry, DEFAULT_EXPRESSION_TTL_SECS};
use crate::invite::InviteRegistry;
use crate::map::OccupancyRegistry;
use crate::portal::PortalBlockRegistry;

static GLOBAL: OnceLock<Registries> = OnceLock::new();

/// The in-memory registries of one process
#[derive(Clone)]
pub struct Registries {
    /// Active expressions
    pub expressions: Arc<ExpressionRegistry>,
    /// Pending invites
    pub invites: Arc<InviteRegistry>,
    /// Blocked portals
    pub portals: Arc<PortalBlockRegistry>,
    /// Map occupancy
    pub occupancy: Arc<OccupancyRegistry>,
}

impl Registries {
    /// Fresh registries; expressions live for `expression_ttl`
    pub fn new(expression_ttl: Duration) -> Self {
        Self {
            expressions: Arc::new(ExpressionRegistry::new(expression_ttl)),
            invites: Arc::new(InviteRegistry::new()),
            portals: Arc::new(PortalBlockRegistry::new()),
            occupancy: Arc::new(OccupancyRegistry::new()),
        }
    }

    /// Initialise the process-wide instance
    ///
    /// The first caller decides the expression TTL; later calls return the
    /// existing instance unchanged.
    pub fn init(expression_ttl: Duration) -> &'static Registries {
        GLOBAL.get_or_init(|| Registries::new(expression_ttl))
    }

    /// The process-wide instance, created with defaults on first use
    pub fn global() -> &'static Registries {
        GLOBAL.get_or_init(Registries::default)
    }

    /// Empty every registry
    #[cfg(any(test, feature = "test-utils"))]
    pub fn reset(&self) {
        self.expressions.reset();
        self.invites.reset();
        self.portals.reset();
        self.occupancy.reset();
    }
}

impl Default for Registries {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_EXPRESSION_TTL_SECS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;
    use crate::tenant::test_support;

    #[test]
    fn test_global_is_shared() {
        let a = Registries::global();
        let b = Registries::global();
        assert!(Arc::ptr_eq(&a.invites, &b.invites));
        assert!(std::ptr::eq(Registries::init(Duration::seconds(60)), a));
    }

    #[test]
    fn test_reset_empties_registries() {
        let registries = Registries::default();
        let tenant = test_support::tenant();
        registries
            .expressions
            .add(&tenant, 7, Field::new(0, 1, 100000000), 3)
            .unwrap();
        assert_eq!(registries.expressions.len(&tenant), 1);

        registries.reset();
        assert!(registries.expressions.is_empty(&tenant));
    }
}
