// Copyright 2025 Cowboy AI, LLC.

//! Ban service
//!
//! Bans match a client by address (exact or CIDR range), hardware id or
//! account. [`BanProcessor::check_ban`] decides admission with strict
//! priority IP > HWID > account. Temporary bans are soft deleted by the
//! [`BanExpirySweeper`] once they lapse.

pub mod cidr;
pub mod history;
pub mod model;
pub mod processor;
pub mod store;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub use cidr::ip_matches_cidr;
pub use history::{
    HistoryProcessor, HistoryStore, InMemoryHistoryStore, LoginAttempt, LoginRecord, PgHistoryStore,
};
pub use model::{Ban, BanBuilder, BanType};
pub use processor::{BanProcessor, BanStatusBody};
pub use store::{BanStore, InMemoryBanStore, PgBanStore};

use crate::errors::DomainResult;
use crate::sweeper::{Sweeper, TenantSource};
use crate::tenant::Context;

/// Soft deletes lapsed temporary bans for every known tenant
pub struct BanExpirySweeper {
    processor: BanProcessor,
    tenants: Arc<dyn TenantSource>,
    interval: Duration,
}

impl BanExpirySweeper {
    /// Sweeper over `processor` visiting `tenants` every `interval`
    pub fn new(
        processor: BanProcessor,
        tenants: Arc<dyn TenantSource>,
        interval: Duration,
    ) -> Self {
        Self {
            processor,
            tenants,
            interval,
        }
    }
}

#[async_trait]
impl Sweeper for BanExpirySweeper {
    fn name(&self) -> &'static str {
        "ban-expiry"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run(&self, now: DateTime<Utc>) -> DomainResult<usize> {
        let mut swept = 0;
        for tenant in self.tenants.tenants() {
            let ctx = Context::with_timeout(tenant, self.interval);
            match self.processor.expire(&ctx, now).await {
                Ok(expired) => swept += expired.len(),
                Err(err) => warn!(
                    tenant_id = %ctx.tenant().id,
                    category = %err.category(),
                    error = %err,
                    "Ban expiry failed for tenant"
                ),
            }
        }
        Ok(swept)
    }
}
