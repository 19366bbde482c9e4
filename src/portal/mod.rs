// Copyright 2025 Cowboy AI, LLC.

//! Portal service
//!
//! Keeps per-character portal blocks and decides what happens when a
//! character steps into a portal. A blocked or dead-end portal releases the
//! client with `ENABLE_ACTIONS`; a portal with a destination asks the
//! character service to change map.

pub mod registry;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

pub use registry::{PortalBlock, PortalBlockRegistry};

use crate::errors::DomainResult;
use crate::field::{CharacterId, Field, MapId};
use crate::message::topics::COMMAND_TOPIC_PORTAL;
use crate::message::{create_key, Emitter, Envelope, MessageBuffer};
use crate::tenant::{Context, Tenant};

/// Release a client waiting on a portal response
pub const PORTAL_COMMAND_ENABLE_ACTIONS: &str = "ENABLE_ACTIONS";
/// Move a character through a portal
pub const PORTAL_COMMAND_CHANGE_MAP: &str = "CHANGE_MAP";

/// Body of a portal command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalCommandBody {
    /// Character using the portal
    pub character_id: CharacterId,
    /// Where the character is
    #[serde(flatten)]
    pub field: Field,
    /// Destination map, for map changes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_map_id: Option<MapId>,
    /// Destination portal, for map changes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_portal_id: Option<u32>,
}

/// Where a portal leads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortalTarget {
    /// Destination map
    pub map_id: MapId,
    /// Destination portal
    pub portal_id: u32,
}

/// What entering a portal did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortalOutcome {
    /// The character is blocked from this portal
    Blocked,
    /// The portal leads nowhere; the client was released
    Released,
    /// A map change was requested
    Warped(PortalTarget),
}

fn stage_command(
    buffer: &MessageBuffer,
    tenant: &Tenant,
    transaction_id: Uuid,
    kind: &str,
    body: PortalCommandBody,
) {
    buffer.put_envelope(
        COMMAND_TOPIC_PORTAL,
        tenant,
        Envelope::new(transaction_id, tenant, create_key(u64::from(body.character_id)), kind, body),
    );
}

/// Portal service operations
#[derive(Clone)]
pub struct PortalProcessor {
    blocks: Arc<PortalBlockRegistry>,
    emitter: Emitter,
}

impl PortalProcessor {
    /// Processor over `blocks`
    pub fn new(blocks: Arc<PortalBlockRegistry>, emitter: Emitter) -> Self {
        Self { blocks, emitter }
    }

    /// Block registry
    pub fn blocks(&self) -> &Arc<PortalBlockRegistry> {
        &self.blocks
    }

    /// Block a portal for a character
    pub fn block(
        &self,
        ctx: &Context,
        character_id: CharacterId,
        map_id: MapId,
        portal_id: u32,
    ) -> PortalBlock {
        let block = PortalBlock {
            character_id,
            map_id,
            portal_id,
        };
        debug!(tenant_id = %ctx.tenant().id, %block, "Portal blocked");
        self.blocks.block(ctx.tenant(), block)
    }

    /// Lift a block; returns whether one existed
    pub fn unblock(
        &self,
        ctx: &Context,
        character_id: CharacterId,
        map_id: MapId,
        portal_id: u32,
    ) -> bool {
        self.blocks.unblock(
            ctx.tenant(),
            PortalBlock {
                character_id,
                map_id,
                portal_id,
            },
        )
    }

    /// Whether the portal is blocked for the character
    pub fn is_blocked(
        &self,
        ctx: &Context,
        character_id: CharacterId,
        map_id: MapId,
        portal_id: u32,
    ) -> bool {
        self.blocks.is_blocked(
            ctx.tenant(),
            &PortalBlock {
                character_id,
                map_id,
                portal_id,
            },
        )
    }

    /// Blocks held against a character
    pub fn blocked_for(&self, ctx: &Context, character_id: CharacterId) -> Vec<PortalBlock> {
        self.blocks.blocked_for(ctx.tenant(), character_id)
    }

    /// Drop every block of a character, e.g. on logout
    pub fn clear_character(&self, ctx: &Context, character_id: CharacterId) -> usize {
        let cleared = self.blocks.clear_character(ctx.tenant(), character_id);
        debug!(tenant_id = %ctx.tenant().id, character_id, cleared, "Portal blocks cleared");
        cleared
    }

    /// Step `character_id` into `portal_id` of `field`
    pub async fn enter(
        &self,
        ctx: &Context,
        transaction_id: Uuid,
        field: Field,
        character_id: CharacterId,
        portal_id: u32,
        target: Option<PortalTarget>,
    ) -> DomainResult<PortalOutcome> {
        let tenant = ctx.tenant();
        self.emitter
            .emit_with_result(ctx, |buf| async move {
                let blocked = self.blocks.is_blocked(
                    tenant,
                    &PortalBlock {
                        character_id,
                        map_id: field.map_id,
                        portal_id,
                    },
                );
                let outcome = match target {
                    _ if blocked => PortalOutcome::Blocked,
                    Some(target) => PortalOutcome::Warped(target),
                    None => PortalOutcome::Released,
                };
                let body = PortalCommandBody {
                    character_id,
                    field,
                    target_map_id: None,
                    target_portal_id: None,
                };
                match outcome {
                    PortalOutcome::Warped(target) => stage_command(
                        &buf,
                        tenant,
                        transaction_id,
                        PORTAL_COMMAND_CHANGE_MAP,
                        PortalCommandBody {
                            target_map_id: Some(target.map_id),
                            target_portal_id: Some(target.portal_id),
                            ..body
                        },
                    ),
                    PortalOutcome::Blocked | PortalOutcome::Released => stage_command(
                        &buf,
                        tenant,
                        transaction_id,
                        PORTAL_COMMAND_ENABLE_ACTIONS,
                        body,
                    ),
                }
                debug!(tenant_id = %tenant.id, character_id, portal_id, ?outcome, "Portal entered");
                Ok(outcome)
            })
            .await
    }
}
