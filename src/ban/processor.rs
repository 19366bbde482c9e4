// Copyright 2025 Cowboy AI, LLC.

//! Ban administration and the admission check

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::cidr::ip_matches_cidr;
use super::model::{Ban, BanBuilder, BanType};
use super::store::BanStore;
use crate::errors::DomainResult;
use crate::field::AccountId;
use crate::message::topics::EVENT_TOPIC_BAN_STATUS;
use crate::message::{create_key, Emitter, Envelope, MessageBuffer};
use crate::tenant::{Context, Tenant};

/// Ban status event type
pub const BAN_STATUS_CREATED: &str = "CREATED";
/// Ban status event type
pub const BAN_STATUS_DELETED: &str = "DELETED";
/// Ban status event type
pub const BAN_STATUS_EXPIRED: &str = "EXPIRED";

/// Body of a ban status event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BanStatusBody {
    /// Ban id
    pub ban_id: u32,
    /// Ban type
    pub ban_type: BanType,
    /// Banned value
    pub value: String,
}

fn stage_status(
    buffer: &MessageBuffer,
    tenant: &Tenant,
    transaction_id: Uuid,
    kind: &str,
    ban: &Ban,
) {
    buffer.put_envelope(
        EVENT_TOPIC_BAN_STATUS,
        tenant,
        Envelope::new(
            transaction_id,
            tenant,
            create_key(u64::from(ban.id())),
            kind,
            BanStatusBody {
                ban_id: ban.id(),
                ban_type: ban.ban_type(),
                value: ban.value().to_string(),
            },
        ),
    );
}

/// Ban service operations
#[derive(Clone)]
pub struct BanProcessor {
    store: Arc<dyn BanStore>,
    emitter: Emitter,
}

impl BanProcessor {
    /// Processor over `store`, publishing through `emitter`
    pub fn new(store: Arc<dyn BanStore>, emitter: Emitter) -> Self {
        Self { store, emitter }
    }

    /// Issue a ban
    pub async fn create(&self, ctx: &Context, ban: BanBuilder) -> DomainResult<Ban> {
        let tenant = ctx.tenant();
        let ban = self
            .emitter
            .emit_with_result(ctx, |buf| async move {
                let ban = self.store.insert(tenant, ban).await?;
                stage_status(&buf, tenant, Uuid::new_v4(), BAN_STATUS_CREATED, &ban);
                Ok(ban)
            })
            .await?;
        info!(
            tenant_id = %tenant.id,
            ban_id = ban.id(),
            ban_type = %ban.ban_type(),
            permanent = ban.permanent(),
            "Ban created"
        );
        Ok(ban)
    }

    /// Ban by id
    pub async fn get(&self, ctx: &Context, id: u32) -> DomainResult<Ban> {
        ctx.run(self.store.get(ctx.tenant(), id)).await
    }

    /// Every ban of the tenant, optionally of one type
    pub async fn list(&self, ctx: &Context, ban_type: Option<BanType>) -> DomainResult<Vec<Ban>> {
        ctx.run(self.store.list(ctx.tenant(), ban_type)).await
    }

    /// Lift a ban
    pub async fn delete(&self, ctx: &Context, id: u32) -> DomainResult<Ban> {
        let tenant = ctx.tenant();
        let ban = self
            .emitter
            .emit_with_result(ctx, |buf| async move {
                let ban = self.store.delete(tenant, id).await?;
                stage_status(&buf, tenant, Uuid::new_v4(), BAN_STATUS_DELETED, &ban);
                Ok(ban)
            })
            .await?;
        info!(tenant_id = %tenant.id, ban_id = id, "Ban deleted");
        Ok(ban)
    }

    /// Find the ban that blocks this login, if any
    ///
    /// Address bans win over hardware bans, which win over account bans.
    /// An exact address match is tried before range bans. Stored ranges
    /// that do not parse never match.
    pub async fn check_ban(
        &self,
        ctx: &Context,
        ip: &str,
        hwid: &str,
        account_id: AccountId,
    ) -> DomainResult<Option<Ban>> {
        self.check_ban_at(ctx, ip, hwid, account_id, Utc::now()).await
    }

    /// [`BanProcessor::check_ban`] against an explicit clock
    pub async fn check_ban_at(
        &self,
        ctx: &Context,
        ip: &str,
        hwid: &str,
        account_id: AccountId,
        now: DateTime<Utc>,
    ) -> DomainResult<Option<Ban>> {
        let tenant = ctx.tenant();

        if !ip.is_empty() {
            ctx.check()?;
            let exact = self
                .store
                .active_by_value(tenant, BanType::Ip, ip, now)
                .await?;
            if let Some(ban) = exact.into_iter().next() {
                return Ok(Some(ban));
            }
            ctx.check()?;
            let ranged = self
                .store
                .active_by_type(tenant, BanType::Ip, now)
                .await?
                .into_iter()
                .filter(|b| b.value().contains('/'))
                .find(|b| ip_matches_cidr(ip, b.value()));
            if ranged.is_some() {
                return Ok(ranged);
            }
        }

        if !hwid.is_empty() {
            ctx.check()?;
            let found = self
                .store
                .active_by_value(tenant, BanType::Hwid, hwid, now)
                .await?;
            if let Some(ban) = found.into_iter().next() {
                return Ok(Some(ban));
            }
        }

        if account_id > 0 {
            ctx.check()?;
            let found = self
                .store
                .active_by_value(tenant, BanType::Account, &account_id.to_string(), now)
                .await?;
            if let Some(ban) = found.into_iter().next() {
                return Ok(Some(ban));
            }
        }

        debug!(tenant_id = %tenant.id, account_id, "No ban matched");
        Ok(None)
    }

    /// Soft delete expired temporary bans and announce them
    pub async fn expire(&self, ctx: &Context, now: DateTime<Utc>) -> DomainResult<Vec<Ban>> {
        let tenant = ctx.tenant();
        let expired = self
            .emitter
            .emit_with_result(ctx, |buf| async move {
                let expired = self.store.delete_expired(tenant, now).await?;
                let transaction_id = Uuid::new_v4();
                for ban in &expired {
                    stage_status(&buf, tenant, transaction_id, BAN_STATUS_EXPIRED, ban);
                }
                Ok(expired)
            })
            .await?;
        if !expired.is_empty() {
            info!(tenant_id = %tenant.id, count = expired.len(), "Expired bans removed");
        }
        Ok(expired)
    }
}
