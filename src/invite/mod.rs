// Copyright 2025 Cowboy AI, LLC.

//! Invite service
//!
//! Buddy, party, guild, messenger, family and trade invitations. At most
//! one invite exists per `(target, type, reference)` in a tenant; a repeat
//! create hands back the existing one without a second event.

pub mod model;
pub mod processor;
pub mod registry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::warn;

pub use model::{
    Invite, InviteBuilder, InviteId, INVITE_TYPE_BUDDY, INVITE_TYPE_FAMILY, INVITE_TYPE_GUILD,
    INVITE_TYPE_MESSENGER, INVITE_TYPE_PARTY, INVITE_TYPE_TRADE,
};
pub use processor::{
    InviteProcessor, InviteStatusBody, INVITE_STATUS_ACCEPTED, INVITE_STATUS_CREATED,
    INVITE_STATUS_REJECTED, REJECT_REASON_TIMEOUT,
};
pub use registry::{InviteRegistry, INVITE_ID_START};

use crate::errors::{DomainError, DomainResult};
use crate::sweeper::Sweeper;
use crate::tenant::Context;

/// Rejects invites that were not answered within the timeout
pub struct InviteTimeoutSweeper {
    processor: InviteProcessor,
    timeout: chrono::Duration,
    interval: Duration,
}

impl InviteTimeoutSweeper {
    /// Sweeper rejecting invites older than `timeout`, every `interval`
    pub fn new(
        processor: InviteProcessor,
        timeout: Duration,
        interval: Duration,
    ) -> DomainResult<Self> {
        let timeout = chrono::Duration::from_std(timeout)
            .map_err(|e| DomainError::ConfigurationError(format!("invite timeout: {e}")))?;
        Ok(Self {
            processor,
            timeout,
            interval,
        })
    }
}

#[async_trait]
impl Sweeper for InviteTimeoutSweeper {
    fn name(&self) -> &'static str {
        "invite-timeout"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run(&self, _now: DateTime<Utc>) -> DomainResult<usize> {
        let mut swept = 0;
        for tenant in self.processor.registry().tenants() {
            let ctx = Context::with_timeout(tenant, self.interval);
            match self.processor.expire(&ctx, self.timeout).await {
                Ok(expired) => swept += expired.len(),
                Err(err) => warn!(
                    tenant_id = %ctx.tenant().id,
                    category = %err.category(),
                    error = %err,
                    "Invite timeout sweep failed for tenant"
                ),
            }
        }
        Ok(swept)
    }
}
