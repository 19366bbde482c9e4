// Copyright 2025 Cowboy AI, LLC.

//! Outstanding invites with lookup indices
//!
//! Invites are stored by id. Three secondary indices resolve the lookups
//! the service needs: `(target, type)`, target and originator. Every
//! mutation holds the tenant's index slot for its whole duration, which
//! makes the `(target, type, reference)` dedup check and the insert one
//! step per tenant.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use super::model::{Invite, InviteBuilder, InviteId};
use crate::errors::{DomainError, DomainResult};
use crate::field::{CharacterId, WorldId};
use crate::registry::{system_clock, Clock, TenantRegistry};
use crate::tenant::Tenant;

/// First id handed out per tenant
pub const INVITE_ID_START: u32 = 1_000_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum IndexKey {
    TargetType(CharacterId, String),
    Target(CharacterId),
    Originator(CharacterId),
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKey::TargetType(target, kind) => write!(f, "{target}:{kind}"),
            IndexKey::Target(target) => write!(f, "target:{target}"),
            IndexKey::Originator(originator) => write!(f, "originator:{originator}"),
        }
    }
}

type Index = HashMap<IndexKey, BTreeSet<InviteId>>;

fn index_add(index: &mut Index, key: IndexKey, id: InviteId) {
    index.entry(key).or_default().insert(id);
}

fn index_remove(index: &mut Index, key: &IndexKey, id: InviteId) {
    if let Some(ids) = index.get_mut(key) {
        ids.remove(&id);
        if ids.is_empty() {
            index.remove(key);
        }
    }
}

fn index_lookup(index: &Index, key: &IndexKey) -> Vec<InviteId> {
    index
        .get(key)
        .map(|ids| ids.iter().copied().collect())
        .unwrap_or_default()
}

fn invite_not_found(
    actor_id: CharacterId,
    invite_type: &str,
    other: impl fmt::Display,
) -> DomainError {
    DomainError::not_found("invite", format!("{actor_id}:{invite_type}:{other}"))
}

/// Tenant-scoped invite store
pub struct InviteRegistry {
    invites: TenantRegistry<InviteId, Invite>,
    index: TenantRegistry<IndexKey, BTreeSet<InviteId>>,
    clock: RwLock<Clock>,
}

impl Default for InviteRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InviteRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            invites: TenantRegistry::with_id_start("invite", INVITE_ID_START),
            index: TenantRegistry::new("invite index"),
            clock: RwLock::new(system_clock()),
        }
    }

    /// Replace the clock used to stamp and age invites
    pub fn set_clock(&self, clock: Clock) {
        *self.clock.write() = clock;
    }

    /// Current time per the registry clock
    pub fn now(&self) -> DateTime<Utc> {
        let clock = self.clock.read().clone();
        clock()
    }

    /// Create an invite, or return the existing one for the same
    /// `(target, type, reference)`
    ///
    /// The flag is `true` when a new invite was stored.
    pub fn create(
        &self,
        tenant: &Tenant,
        originator_id: CharacterId,
        world_id: WorldId,
        target_id: CharacterId,
        invite_type: &str,
        reference_id: u32,
    ) -> DomainResult<(Invite, bool)> {
        let slot = self.index.get_or_create(tenant);
        let mut index = slot.write();

        let bucket = IndexKey::TargetType(target_id, invite_type.to_string());
        for id in index_lookup(&index, &bucket) {
            if let Some(existing) = self.invites.get(tenant, &id) {
                if existing.reference_id() == reference_id {
                    return Ok((existing, false));
                }
            }
        }

        let invite = InviteBuilder::new(tenant.clone())
            .id(self.invites.next_id(tenant))
            .invite_type(invite_type)
            .reference_id(reference_id)
            .originator_id(originator_id)
            .target_id(target_id)
            .world_id(world_id)
            .age(self.now())
            .build()?;

        let id = invite.id();
        self.invites.put(tenant, id, invite.clone());
        index_add(&mut index, bucket, id);
        index_add(&mut index, IndexKey::Target(target_id), id);
        index_add(&mut index, IndexKey::Originator(originator_id), id);
        Ok((invite, true))
    }

    fn find_in_bucket<F>(
        &self,
        tenant: &Tenant,
        actor_id: CharacterId,
        invite_type: &str,
        matches: F,
    ) -> Option<Invite>
    where
        F: Fn(&Invite) -> bool,
    {
        let slot = self.index.slot(tenant)?;
        let index = slot.read();
        index_lookup(&index, &IndexKey::TargetType(actor_id, invite_type.to_string()))
            .into_iter()
            .filter_map(|id| self.invites.get(tenant, &id))
            .find(|invite| matches(invite))
    }

    /// Invite of `invite_type` to `actor_id` sent by `originator_id`
    pub fn get_by_originator(
        &self,
        tenant: &Tenant,
        actor_id: CharacterId,
        invite_type: &str,
        originator_id: CharacterId,
    ) -> DomainResult<Invite> {
        self.find_in_bucket(tenant, actor_id, invite_type, |i| i.originator_id() == originator_id)
            .ok_or_else(|| invite_not_found(actor_id, invite_type, originator_id))
    }

    /// Invite of `invite_type` to `actor_id` for `reference_id`
    pub fn get_by_reference(
        &self,
        tenant: &Tenant,
        actor_id: CharacterId,
        invite_type: &str,
        reference_id: u32,
    ) -> DomainResult<Invite> {
        self.find_in_bucket(tenant, actor_id, invite_type, |i| i.reference_id() == reference_id)
            .ok_or_else(|| invite_not_found(actor_id, invite_type, reference_id))
    }

    /// Every invite addressed to `character_id`
    pub fn get_for_character(&self, tenant: &Tenant, character_id: CharacterId) -> Vec<Invite> {
        let Some(slot) = self.index.slot(tenant) else {
            return Vec::new();
        };
        let index = slot.read();
        index_lookup(&index, &IndexKey::Target(character_id))
            .into_iter()
            .filter_map(|id| self.invites.get(tenant, &id))
            .collect()
    }

    /// Remove the invite of `invite_type` to `actor_id` sent by `originator_id`
    pub fn delete(
        &self,
        tenant: &Tenant,
        actor_id: CharacterId,
        invite_type: &str,
        originator_id: CharacterId,
    ) -> DomainResult<Invite> {
        let slot = self.index.get_or_create(tenant);
        let mut index = slot.write();
        let found = index_lookup(&index, &IndexKey::TargetType(actor_id, invite_type.to_string()))
            .into_iter()
            .filter_map(|id| self.invites.get(tenant, &id))
            .find(|i| i.originator_id() == originator_id)
            .ok_or_else(|| invite_not_found(actor_id, invite_type, originator_id))?;
        self.remove_indexed(tenant, &mut index, &found);
        Ok(found)
    }

    /// Remove every invite the character sent or received
    pub fn delete_for_character(&self, tenant: &Tenant, character_id: CharacterId) -> Vec<Invite> {
        let slot = self.index.get_or_create(tenant);
        let mut index = slot.write();

        let mut ids = index_lookup(&index, &IndexKey::Target(character_id));
        ids.extend(index_lookup(&index, &IndexKey::Originator(character_id)));

        let mut seen = HashSet::new();
        let mut removed = Vec::new();
        for id in ids {
            if !seen.insert(id) {
                continue;
            }
            if let Some(invite) = self.invites.get(tenant, &id) {
                self.remove_indexed(tenant, &mut index, &invite);
                removed.push(invite);
            }
        }
        removed
    }

    /// Remove a specific invite by id
    pub fn remove(&self, tenant: &Tenant, id: InviteId) -> DomainResult<Invite> {
        let slot = self.index.get_or_create(tenant);
        let mut index = slot.write();
        let invite = self
            .invites
            .get(tenant, &id)
            .ok_or_else(|| DomainError::not_found("invite", id))?;
        self.remove_indexed(tenant, &mut index, &invite);
        Ok(invite)
    }

    /// Invites of `tenant` older than `timeout`
    pub fn get_expired(&self, tenant: &Tenant, timeout: Duration) -> Vec<Invite> {
        let now = self.now();
        self.invites
            .for_tenant(tenant)
            .into_iter()
            .filter(|i| i.expired(timeout, now))
            .collect()
    }

    /// Tenants that have ever held an invite
    pub fn tenants(&self) -> Vec<Tenant> {
        self.invites.tenants()
    }

    /// Number of invites held for `tenant`
    pub fn len(&self, tenant: &Tenant) -> usize {
        self.invites.len(tenant)
    }

    /// Whether `tenant` holds no invites
    pub fn is_empty(&self, tenant: &Tenant) -> bool {
        self.invites.is_empty(tenant)
    }

    /// Drop everything
    pub fn reset(&self) {
        self.invites.clear();
        self.index.clear();
        *self.clock.write() = system_clock();
    }

    fn remove_indexed(&self, tenant: &Tenant, index: &mut Index, invite: &Invite) {
        let id = invite.id();
        // Absent means a concurrent path already removed it.
        let _ = self.invites.remove(tenant, &id);
        index_remove(
            index,
            &IndexKey::TargetType(invite.target_id(), invite.invite_type().to_string()),
            id,
        );
        index_remove(index, &IndexKey::Target(invite.target_id()), id);
        index_remove(index, &IndexKey::Originator(invite.originator_id()), id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenant::test_support;
    use std::sync::Arc;

    #[test]
    fn test_create_assigns_ids_from_start() {
        let registry = InviteRegistry::new();
        let tenant = test_support::tenant();
        let (first, created) = registry.create(&tenant, 1001, 1, 2001, "BUDDY", 5001).unwrap();
        let (second, _) = registry.create(&tenant, 1002, 1, 2002, "BUDDY", 5002).unwrap();
        assert!(created);
        assert_eq!(first.id(), INVITE_ID_START);
        assert_eq!(second.id(), INVITE_ID_START + 1);
    }

    #[test]
    fn test_duplicate_create_returns_existing() {
        let registry = InviteRegistry::new();
        let tenant = test_support::tenant();
        let (first, _) = registry.create(&tenant, 1001, 1, 2001, "PARTY", 5001).unwrap();
        let (again, created) = registry.create(&tenant, 1001, 1, 2001, "PARTY", 5001).unwrap();

        assert!(!created);
        assert_eq!(first.id(), again.id());
        assert_eq!(registry.len(&tenant), 1);
    }

    #[test]
    fn test_same_target_type_different_reference_is_new() {
        let registry = InviteRegistry::new();
        let tenant = test_support::tenant();
        registry.create(&tenant, 1001, 1, 2001, "PARTY", 5001).unwrap();
        let (_, created) = registry.create(&tenant, 1002, 1, 2001, "PARTY", 5002).unwrap();
        assert!(created);
        assert_eq!(registry.get_for_character(&tenant, 2001).len(), 2);
    }

    #[test]
    fn test_lookups() {
        let registry = InviteRegistry::new();
        let tenant = test_support::tenant();
        registry.create(&tenant, 1001, 1, 2001, "GUILD", 7).unwrap();

        let by_originator = registry.get_by_originator(&tenant, 2001, "GUILD", 1001).unwrap();
        assert_eq!(by_originator.reference_id(), 7);
        let by_reference = registry.get_by_reference(&tenant, 2001, "GUILD", 7).unwrap();
        assert_eq!(by_reference.originator_id(), 1001);
        assert!(registry.get_by_reference(&tenant, 2001, "GUILD", 8).unwrap_err().is_not_found());
        assert!(registry
            .get_by_originator(&tenant, 2001, "PARTY", 1001)
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_delete_clears_indices() {
        let registry = InviteRegistry::new();
        let tenant = test_support::tenant();
        registry.create(&tenant, 1001, 1, 2001, "TRADE", 0).unwrap();
        registry.delete(&tenant, 2001, "TRADE", 1001).unwrap();

        assert!(registry.get_for_character(&tenant, 2001).is_empty());
        assert!(registry.delete(&tenant, 2001, "TRADE", 1001).unwrap_err().is_not_found());
        let (_, created) = registry.create(&tenant, 1001, 1, 2001, "TRADE", 0).unwrap();
        assert!(created);
    }

    #[test]
    fn test_delete_for_character_covers_both_roles() {
        let registry = InviteRegistry::new();
        let tenant = test_support::tenant();
        registry.create(&tenant, 1001, 1, 2001, "BUDDY", 1).unwrap();
        registry.create(&tenant, 2001, 1, 3001, "BUDDY", 2).unwrap();
        registry.create(&tenant, 4001, 1, 5001, "BUDDY", 3).unwrap();

        let removed = registry.delete_for_character(&tenant, 2001);
        assert_eq!(removed.len(), 2);
        assert_eq!(registry.len(&tenant), 1);
        assert!(registry.delete_for_character(&tenant, 2001).is_empty());
    }

    #[test]
    fn test_delete_for_character_self_invite_counted_once() {
        let registry = InviteRegistry::new();
        let tenant = test_support::tenant();
        registry.create(&tenant, 2001, 1, 2001, "MESSENGER", 1).unwrap();
        assert_eq!(registry.delete_for_character(&tenant, 2001).len(), 1);
    }

    #[test]
    fn test_get_expired_uses_clock() {
        let registry = InviteRegistry::new();
        let tenant = test_support::tenant();
        let start = Utc::now();
        registry.set_clock(Arc::new(move || start));
        registry.create(&tenant, 1001, 1, 2001, "PARTY", 1).unwrap();

        let timeout = Duration::seconds(180);
        assert!(registry.get_expired(&tenant, timeout).is_empty());
        registry.set_clock(Arc::new(move || start + Duration::seconds(181)));
        assert_eq!(registry.get_expired(&tenant, timeout).len(), 1);
    }

    #[test]
    fn test_tenants_are_isolated() {
        let registry = InviteRegistry::new();
        let t1 = test_support::tenant();
        let t2 = test_support::tenant();
        registry.create(&t1, 1001, 1, 2001, "BUDDY", 1).unwrap();
        registry.create(&t2, 1001, 1, 2001, "BUDDY", 1).unwrap();

        let for_t1 = registry.get_for_character(&t1, 2001);
        let for_t2 = registry.get_for_character(&t2, 2001);
        assert_eq!(for_t1.len(), 1);
        assert_eq!(for_t2.len(), 1);
        assert_eq!(for_t1[0].tenant(), &t1);
        assert_eq!(for_t2[0].tenant(), &t2);
    }
}
