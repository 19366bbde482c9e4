// Copyright 2025 Cowboy AI, LLC.

//! Current expression per character
//!
//! One entry per `(tenant, character)`; a second change replaces the
//! first. Entries expire `ttl` after they were set.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

use super::model::{Expression, ExpressionBuilder};
use crate::errors::DomainResult;
use crate::field::{CharacterId, Field};
use crate::registry::{system_clock, Clock, TenantRegistry};
use crate::tenant::Tenant;

/// Default lifetime of an expression, in seconds
pub const DEFAULT_EXPRESSION_TTL_SECS: i64 = 5;

/// Tenant-scoped expression cache
pub struct ExpressionRegistry {
    entries: TenantRegistry<CharacterId, Expression>,
    ttl: Duration,
    clock: RwLock<Clock>,
}

impl Default for ExpressionRegistry {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_EXPRESSION_TTL_SECS))
    }
}

impl ExpressionRegistry {
    /// Registry whose entries live for `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: TenantRegistry::new("expression"),
            ttl,
            clock: RwLock::new(system_clock()),
        }
    }

    /// Configured lifetime
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Replace the clock
    pub fn set_clock(&self, clock: Clock) {
        *self.clock.write() = clock;
    }

    /// Current time per the registry clock
    pub fn now(&self) -> DateTime<Utc> {
        let clock = self.clock.read().clone();
        clock()
    }

    /// Set or replace the expression of a character
    pub fn add(
        &self,
        tenant: &Tenant,
        character_id: CharacterId,
        field: Field,
        expression: u32,
    ) -> DomainResult<Expression> {
        let model = ExpressionBuilder::new(tenant.clone())
            .character_id(character_id)
            .location(field)
            .expression(expression)
            .expiration(self.now() + self.ttl)
            .build()?;
        Ok(self.entries.put(tenant, character_id, model))
    }

    /// Current expression of a character
    pub fn get(&self, tenant: &Tenant, character_id: CharacterId) -> Option<Expression> {
        self.entries.get(tenant, &character_id)
    }

    /// Remove a character's expression; absent is not an error
    pub fn clear(&self, tenant: &Tenant, character_id: CharacterId) -> Option<Expression> {
        self.entries.remove(tenant, &character_id).ok()
    }

    /// Remove and return every expression past its expiration
    pub fn pop_expired(&self) -> Vec<Expression> {
        self.entries
            .pop_expired(self.now())
            .into_iter()
            .map(|(_, e)| e)
            .collect()
    }

    /// Put back an expression whose expiry was not announced, unless the
    /// character has set a newer one since
    pub fn restore(&self, model: Expression) {
        let tenant = model.tenant().clone();
        self.entries.put_if_absent(&tenant, model.character_id(), model);
    }

    /// Number of live entries for `tenant`
    pub fn len(&self, tenant: &Tenant) -> usize {
        self.entries.len(tenant)
    }

    /// Whether `tenant` has no entries
    pub fn is_empty(&self, tenant: &Tenant) -> bool {
        self.entries.is_empty(tenant)
    }

    /// Drop everything
    pub fn reset(&self) {
        self.entries.clear();
        *self.clock.write() = system_clock();
    }
}
