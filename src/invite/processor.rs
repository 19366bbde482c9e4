// Copyright 2025 Cowboy AI, LLC.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::model::Invite;
use super::registry::InviteRegistry;
use crate::errors::DomainResult;
use crate::field::{CharacterId, WorldId};
use crate::message::topics::EVENT_TOPIC_INVITE_STATUS;
use crate::message::{create_key, Emitter, Envelope, MessageBuffer};
use crate::tenant::{Context, Tenant};

/// An invite was issued
pub const INVITE_STATUS_CREATED: &str = "CREATED";
/// The target accepted an invite
pub const INVITE_STATUS_ACCEPTED: &str = "ACCEPTED";
/// The target rejected an invite, or it timed out
pub const INVITE_STATUS_REJECTED: &str = "REJECTED";

/// Rejection reason for invites that aged out
pub const REJECT_REASON_TIMEOUT: &str = "TIMEOUT";

/// Body of an invite status event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteStatusBody {
    /// Invite id
    pub invite_id: u32,
    /// Invite type
    pub invite_type: String,
    /// Party id, guild id, ...
    pub reference_id: u32,
    /// Sender
    pub originator_id: CharacterId,
    /// Recipient
    pub target_id: CharacterId,
    /// World
    pub world_id: WorldId,
    /// Why the invite was rejected, when not by the target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub(crate) fn stage_status(
    buffer: &MessageBuffer,
    tenant: &Tenant,
    transaction_id: Uuid,
    kind: &str,
    invite: &Invite,
    reason: Option<&str>,
) {
    buffer.put_envelope(
        EVENT_TOPIC_INVITE_STATUS,
        tenant,
        Envelope::new(
            transaction_id,
            tenant,
            create_key(u64::from(invite.reference_id())),
            kind,
            InviteStatusBody {
                invite_id: invite.id(),
                invite_type: invite.invite_type().to_string(),
                reference_id: invite.reference_id(),
                originator_id: invite.originator_id(),
                target_id: invite.target_id(),
                world_id: invite.world_id(),
                reason: reason.map(str::to_string),
            },
        ),
    );
}

/// Invite service operations
#[derive(Clone)]
pub struct InviteProcessor {
    registry: Arc<InviteRegistry>,
    emitter: Emitter,
}

impl InviteProcessor {
    /// Processor over `registry`
    pub fn new(registry: Arc<InviteRegistry>, emitter: Emitter) -> Self {
        Self { registry, emitter }
    }

    /// Registry this processor writes to
    pub fn registry(&self) -> &Arc<InviteRegistry> {
        &self.registry
    }

    /// Emitter used for status events
    pub fn emitter(&self) -> &Emitter {
        &self.emitter
    }

    /// Issue an invite; a duplicate returns the existing invite silently
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        ctx: &Context,
        transaction_id: Uuid,
        reference_id: u32,
        world_id: WorldId,
        invite_type: &str,
        originator_id: CharacterId,
        target_id: CharacterId,
    ) -> DomainResult<Invite> {
        let tenant = ctx.tenant();
        self.emitter
            .emit_with_result(ctx, |buf| async move {
                let (invite, created) = self.registry.create(
                    tenant,
                    originator_id,
                    world_id,
                    target_id,
                    invite_type,
                    reference_id,
                )?;
                if created {
                    stage_status(
                        &buf,
                        tenant,
                        transaction_id,
                        INVITE_STATUS_CREATED,
                        &invite,
                        None,
                    );
                    info!(
                        tenant_id = %tenant.id,
                        invite_id = invite.id(),
                        invite_type,
                        originator_id,
                        target_id,
                        "Invite created"
                    );
                } else {
                    debug!(
                        tenant_id = %tenant.id,
                        invite_id = invite.id(),
                        "Duplicate invite ignored"
                    );
                }
                Ok(invite)
            })
            .await
    }

    /// Accept the invite of `invite_type` sent to `actor_id` by `originator_id`
    pub async fn accept(
        &self,
        ctx: &Context,
        transaction_id: Uuid,
        actor_id: CharacterId,
        invite_type: &str,
        originator_id: CharacterId,
    ) -> DomainResult<Invite> {
        self.resolve(
            ctx,
            transaction_id,
            actor_id,
            invite_type,
            originator_id,
            INVITE_STATUS_ACCEPTED,
        )
        .await
    }

    /// Reject the invite of `invite_type` sent to `actor_id` by `originator_id`
    pub async fn reject(
        &self,
        ctx: &Context,
        transaction_id: Uuid,
        actor_id: CharacterId,
        invite_type: &str,
        originator_id: CharacterId,
    ) -> DomainResult<Invite> {
        self.resolve(
            ctx,
            transaction_id,
            actor_id,
            invite_type,
            originator_id,
            INVITE_STATUS_REJECTED,
        )
        .await
    }

    async fn resolve(
        &self,
        ctx: &Context,
        transaction_id: Uuid,
        actor_id: CharacterId,
        invite_type: &str,
        originator_id: CharacterId,
        status: &'static str,
    ) -> DomainResult<Invite> {
        let tenant = ctx.tenant();
        self.emitter
            .emit_with_result(ctx, |buf| async move {
                let invite = self.registry.delete(tenant, actor_id, invite_type, originator_id)?;
                stage_status(&buf, tenant, transaction_id, status, &invite, None);
                info!(tenant_id = %tenant.id, invite_id = invite.id(), status, "Invite resolved");
                Ok(invite)
            })
            .await
    }

    /// Invites addressed to `character_id`
    pub fn get_for_character(&self, ctx: &Context, character_id: CharacterId) -> Vec<Invite> {
        self.registry.get_for_character(ctx.tenant(), character_id)
    }

    /// Invite to `actor_id` of `invite_type` sent by `originator_id`
    pub fn get_by_originator(
        &self,
        ctx: &Context,
        actor_id: CharacterId,
        invite_type: &str,
        originator_id: CharacterId,
    ) -> DomainResult<Invite> {
        self.registry
            .get_by_originator(ctx.tenant(), actor_id, invite_type, originator_id)
    }

    /// Invite to `actor_id` of `invite_type` for `reference_id`
    pub fn get_by_reference(
        &self,
        ctx: &Context,
        actor_id: CharacterId,
        invite_type: &str,
        reference_id: u32,
    ) -> DomainResult<Invite> {
        self.registry
            .get_by_reference(ctx.tenant(), actor_id, invite_type, reference_id)
    }

    /// Drop every invite a deleted character sent or received
    pub fn delete_for_character(&self, ctx: &Context, character_id: CharacterId) -> Vec<Invite> {
        let removed = self.registry.delete_for_character(ctx.tenant(), character_id);
        debug!(
            tenant_id = %ctx.tenant().id,
            character_id,
            removed = removed.len(),
            "Invites removed for character"
        );
        removed
    }

    /// Remove invites of the context tenant older than `timeout` and
    /// announce them as rejected
    pub async fn expire(
        &self,
        ctx: &Context,
        timeout: chrono::Duration,
    ) -> DomainResult<Vec<Invite>> {
        let tenant = ctx.tenant();
        self.emitter
            .emit_with_result(ctx, |buf| async move {
                let transaction_id = Uuid::new_v4();
                let mut expired = Vec::new();
                for candidate in self.registry.get_expired(tenant, timeout) {
                    // Accepted or rejected since the scan.
                    let Ok(invite) = self.registry.remove(tenant, candidate.id()) else {
                        continue;
                    };
                    stage_status(
                        &buf,
                        tenant,
                        transaction_id,
                        INVITE_STATUS_REJECTED,
                        &invite,
                        Some(REJECT_REASON_TIMEOUT),
                    );
                    expired.push(invite);
                }
                if !expired.is_empty() {
                    info!(tenant_id = %tenant.id, expired = expired.len(), "Invites timed out");
                }
                Ok(expired)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::InMemoryPublisher;
    use crate::tenant::test_support;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn processor() -> (InviteProcessor, InMemoryPublisher) {
        let publisher = InMemoryPublisher::new();
        let processor = InviteProcessor::new(
            Arc::new(InviteRegistry::new()),
            Emitter::new(Arc::new(publisher.clone())),
        );
        (processor, publisher)
    }

    #[tokio::test]
    async fn test_create_emits_once_for_duplicates() {
        let (processor, publisher) = processor();
        let ctx = test_support::context();

        let first = processor
            .create(&ctx, Uuid::new_v4(), 5001, 1, "BUDDY", 1001, 2001)
            .await
            .unwrap();
        let second = processor
            .create(&ctx, Uuid::new_v4(), 5001, 1, "BUDDY", 1001, 2001)
            .await
            .unwrap();

        assert_eq!(first.id(), second.id());
        let events = publisher.envelopes::<InviteStatusBody>(EVENT_TOPIC_INVITE_STATUS).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, INVITE_STATUS_CREATED);
        assert_eq!(events[0].key, "5001");
        assert_eq!(events[0].body.target_id, 2001);
    }

    #[tokio::test]
    async fn test_accept_removes_and_emits() {
        let (processor, publisher) = processor();
        let ctx = test_support::context();
        let created = processor
            .create(&ctx, Uuid::new_v4(), 5001, 1, "PARTY", 1001, 2001)
            .await
            .unwrap();

        let accepted = processor.accept(&ctx, Uuid::new_v4(), 2001, "PARTY", 1001).await.unwrap();
        assert_eq!(accepted.id(), created.id());
        assert!(processor.get_by_reference(&ctx, 2001, "PARTY", 5001).unwrap_err().is_not_found());

        let kinds: Vec<_> = publisher
            .envelopes::<InviteStatusBody>(EVENT_TOPIC_INVITE_STATUS)
            .unwrap()
            .into_iter()
            .map(|e| e.kind)
            .collect();
        assert_eq!(kinds, vec![INVITE_STATUS_CREATED, INVITE_STATUS_ACCEPTED]);
    }

    #[tokio::test]
    async fn test_reject_unknown_is_not_found_and_silent() {
        let (processor, publisher) = processor();
        let ctx = test_support::context();
        let err = processor.reject(&ctx, Uuid::new_v4(), 2001, "GUILD", 1001).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(publisher.count(), 0);
    }

    #[tokio::test]
    async fn test_expire_rejects_with_timeout_reason() {
        let (processor, publisher) = processor();
        let ctx = test_support::context();
        let start = Utc::now();
        processor.registry().set_clock(Arc::new(move || start));
        processor.create(&ctx, Uuid::new_v4(), 1, 1, "TRADE", 1001, 2001).await.unwrap();
        publisher.clear();

        processor
            .registry()
            .set_clock(Arc::new(move || start + chrono::Duration::seconds(200)));
        let expired = processor.expire(&ctx, chrono::Duration::seconds(180)).await.unwrap();

        assert_eq!(expired.len(), 1);
        assert!(processor.get_for_character(&ctx, 2001).is_empty());
        let events = publisher.envelopes::<InviteStatusBody>(EVENT_TOPIC_INVITE_STATUS).unwrap();
        assert_eq!(events[0].kind, INVITE_STATUS_REJECTED);
        assert_eq!(events[0].body.reason.as_deref(), Some(REJECT_REASON_TIMEOUT));
    }
}
