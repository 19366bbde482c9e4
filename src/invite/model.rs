// Copyright 2025 Cowboy AI, LLC.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::errors::{DomainError, DomainResult};
use crate::field::{CharacterId, WorldId};
use crate::tenant::Tenant;

/// Invite id, monotonic per tenant
pub type InviteId = u32;

/// Buddy list request
pub const INVITE_TYPE_BUDDY: &str = "BUDDY";
/// Party invitation
pub const INVITE_TYPE_PARTY: &str = "PARTY";
/// Guild invitation
pub const INVITE_TYPE_GUILD: &str = "GUILD";
/// Messenger room invitation
pub const INVITE_TYPE_MESSENGER: &str = "MESSENGER";
/// Family invitation
pub const INVITE_TYPE_FAMILY: &str = "FAMILY";
/// Trade window invitation
pub const INVITE_TYPE_TRADE: &str = "TRADE";

/// An outstanding invitation from one character to another
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Invite {
    #[serde(skip)]
    tenant: Tenant,
    id: InviteId,
    #[serde(rename = "type")]
    invite_type: String,
    reference_id: u32,
    originator_id: CharacterId,
    target_id: CharacterId,
    world_id: WorldId,
    age: DateTime<Utc>,
}

impl Invite {
    /// Owning tenant
    pub fn tenant(&self) -> &Tenant {
        &self.tenant
    }

    /// Invite id
    pub fn id(&self) -> InviteId {
        self.id
    }

    /// Invite type, e.g. "PARTY"
    pub fn invite_type(&self) -> &str {
        &self.invite_type
    }

    /// What the invite is for: party id, guild id, ...
    pub fn reference_id(&self) -> u32 {
        self.reference_id
    }

    /// Character who sent the invite
    pub fn originator_id(&self) -> CharacterId {
        self.originator_id
    }

    /// Character who received the invite
    pub fn target_id(&self) -> CharacterId {
        self.target_id
    }

    /// World the invite was issued in
    pub fn world_id(&self) -> WorldId {
        self.world_id
    }

    /// When the invite was issued
    pub fn age(&self) -> DateTime<Utc> {
        self.age
    }

    /// Whether the invite is older than `timeout` at `now`
    pub fn expired(&self, timeout: Duration, now: DateTime<Utc>) -> bool {
        self.age + timeout <= now
    }
}

/// Builder for [`Invite`]
#[derive(Debug, Clone)]
pub struct InviteBuilder {
    tenant: Tenant,
    id: InviteId,
    invite_type: String,
    reference_id: u32,
    originator_id: CharacterId,
    target_id: CharacterId,
    world_id: WorldId,
    age: Option<DateTime<Utc>>,
}

impl InviteBuilder {
    /// Start an invite for `tenant`
    pub fn new(tenant: Tenant) -> Self {
        Self {
            tenant,
            id: 0,
            invite_type: String::new(),
            reference_id: 0,
            originator_id: 0,
            target_id: 0,
            world_id: 0,
            age: None,
        }
    }

    /// Id assigned by the registry
    pub fn id(mut self, id: InviteId) -> Self {
        self.id = id;
        self
    }

    /// Invite type
    pub fn invite_type(mut self, invite_type: impl Into<String>) -> Self {
        self.invite_type = invite_type.into();
        self
    }

    /// Reference id
    pub fn reference_id(mut self, reference_id: u32) -> Self {
        self.reference_id = reference_id;
        self
    }

    /// Sender
    pub fn originator_id(mut self, originator_id: CharacterId) -> Self {
        self.originator_id = originator_id;
        self
    }

    /// Recipient
    pub fn target_id(mut self, target_id: CharacterId) -> Self {
        self.target_id = target_id;
        self
    }

    /// World
    pub fn world_id(mut self, world_id: WorldId) -> Self {
        self.world_id = world_id;
        self
    }

    /// Issue time
    pub fn age(mut self, age: DateTime<Utc>) -> Self {
        self.age = Some(age);
        self
    }

    /// Validate and build
    pub fn build(self) -> DomainResult<Invite> {
        if self.id == 0 {
            return Err(DomainError::validation("invite id is required"));
        }
        if self.invite_type.trim().is_empty() {
            return Err(DomainError::validation("invite type is required"));
        }
        if self.originator_id == 0 {
            return Err(DomainError::validation("originator id is required"));
        }
        if self.target_id == 0 {
            return Err(DomainError::validation("target id is required"));
        }
        Ok(Invite {
            tenant: self.tenant,
            id: self.id,
            invite_type: self.invite_type,
            reference_id: self.reference_id,
            originator_id: self.originator_id,
            target_id: self.target_id,
            world_id: self.world_id,
            age: self.age.unwrap_or_else(Utc::now),
        })
    }
}
