// Copyright 2025 Cowboy AI, LLC.

//! Tenant-scoped in-memory registry
//!
//! A [`TenantRegistry`] is a map of maps: tenant → (key → value). A single
//! outer lock guards the structure of the tenant map and the per-tenant id
//! counters. It is held only long enough to find or insert a tenant's
//! slot. Each slot has its own read-write lock guarding the payload, so a
//! busy tenant never blocks lookups for another one.
//!
//! [`TenantRegistry::pop_expired`] snapshots the slots under the outer read
//! lock and then visits them one at a time under each slot's write lock.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::{DomainError, DomainResult};
use crate::tenant::Tenant;

/// Injectable source of "now" for registries that stamp expirations
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// The wall clock
pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// Values that may carry their own expiration
pub trait Expiring {
    /// Instant after which the value is stale; `None` never expires
    fn expires_at(&self) -> Option<DateTime<Utc>>;
}

/// Payload map of one tenant together with its lock
pub type TenantSlot<K, V> = Arc<RwLock<HashMap<K, V>>>;

struct TenantEntry<K, V> {
    tenant: Tenant,
    slot: TenantSlot<K, V>,
    next_id: u32,
}

/// In-memory cache keyed by `(tenant, key)`
pub struct TenantRegistry<K, V> {
    name: &'static str,
    id_start: u32,
    tenants: RwLock<HashMap<Uuid, TenantEntry<K, V>>>,
}

impl<K, V> TenantRegistry<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Display,
    V: Clone,
{
    /// Empty registry; `name` labels not-found errors
    pub fn new(name: &'static str) -> Self {
        Self::with_id_start(name, 1)
    }

    /// Empty registry whose per-tenant id counter begins at `id_start`
    pub fn with_id_start(name: &'static str, id_start: u32) -> Self {
        Self {
            name,
            id_start,
            tenants: RwLock::new(HashMap::new()),
        }
    }

    /// The slot for `tenant`, creating it atomically if needed
    pub fn get_or_create(&self, tenant: &Tenant) -> TenantSlot<K, V> {
        if let Some(entry) = self.tenants.read().get(&tenant.id) {
            return entry.slot.clone();
        }
        let mut tenants = self.tenants.write();
        tenants
            .entry(tenant.id)
            .or_insert_with(|| TenantEntry {
                tenant: tenant.clone(),
                slot: Arc::new(RwLock::new(HashMap::new())),
                next_id: self.id_start,
            })
            .slot
            .clone()
    }

    /// The slot for `tenant` if it has been created
    pub fn slot(&self, tenant: &Tenant) -> Option<TenantSlot<K, V>> {
        self.tenants.read().get(&tenant.id).map(|e| e.slot.clone())
    }

    fn read_slot<R>(&self, tenant: &Tenant, f: impl FnOnce(&HashMap<K, V>) -> R) -> Option<R> {
        let slot = self.slot(tenant)?;
        let entries = slot.read();
        Some(f(&entries))
    }

    /// Insert or replace; returns the stored value
    pub fn put(&self, tenant: &Tenant, key: K, value: V) -> V {
        let slot = self.get_or_create(tenant);
        slot.write().insert(key, value.clone());
        value
    }

    /// Insert unless an entry exists; returns whichever value is stored
    pub fn put_if_absent(&self, tenant: &Tenant, key: K, value: V) -> V {
        let slot = self.get_or_create(tenant);
        let mut entries = slot.write();
        entries.entry(key).or_insert(value).clone()
    }

    /// Look up a value; an unknown tenant is simply "not found"
    pub fn get(&self, tenant: &Tenant, key: &K) -> Option<V> {
        self.read_slot(tenant, |entries| entries.get(key).cloned())
            .flatten()
    }

    /// Whether a value exists
    pub fn contains(&self, tenant: &Tenant, key: &K) -> bool {
        self.read_slot(tenant, |entries| entries.contains_key(key))
            .unwrap_or(false)
    }

    /// Remove a value, failing when absent
    pub fn remove(&self, tenant: &Tenant, key: &K) -> DomainResult<V> {
        let removed = match self.slot(tenant) {
            Some(slot) => {
                let mut entries = slot.write();
                entries.remove(key)
            }
            None => None,
        };
        removed.ok_or_else(|| DomainError::not_found(self.name, key))
    }

    /// Remove every value of `tenant` matching `predicate`
    pub fn remove_where<F>(&self, tenant: &Tenant, predicate: F) -> Vec<V>
    where
        F: Fn(&K, &V) -> bool,
    {
        let Some(slot) = self.slot(tenant) else {
            return Vec::new();
        };
        let mut entries = slot.write();
        let keys: Vec<K> = entries
            .iter()
            .filter(|(k, v)| predicate(k, v))
            .map(|(k, _)| k.clone())
            .collect();
        keys.iter().filter_map(|k| entries.remove(k)).collect()
    }

    /// Apply `update` to an existing value and return the result
    pub fn update<F>(&self, tenant: &Tenant, key: &K, update: F) -> DomainResult<V>
    where
        F: FnOnce(&mut V),
    {
        let slot = self
            .slot(tenant)
            .ok_or_else(|| DomainError::not_found(self.name, key))?;
        let mut entries = slot.write();
        let value = entries
            .get_mut(key)
            .ok_or_else(|| DomainError::not_found(self.name, key))?;
        update(value);
        Ok(value.clone())
    }

    /// Apply a fallible `update` to an existing value; the value is left
    /// untouched when it fails
    pub fn try_update<F>(&self, tenant: &Tenant, key: &K, update: F) -> DomainResult<V>
    where
        F: FnOnce(&mut V) -> DomainResult<()>,
    {
        let slot = self
            .slot(tenant)
            .ok_or_else(|| DomainError::not_found(self.name, key))?;
        let mut entries = slot.write();
        let value = entries
            .get_mut(key)
            .ok_or_else(|| DomainError::not_found(self.name, key))?;
        let mut updated = value.clone();
        update(&mut updated)?;
        *value = updated.clone();
        Ok(updated)
    }

    /// Snapshot of every value of `tenant`
    pub fn for_tenant(&self, tenant: &Tenant) -> Vec<V> {
        self.read_slot(tenant, |entries| entries.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of values held for `tenant`
    pub fn len(&self, tenant: &Tenant) -> usize {
        self.read_slot(tenant, HashMap::len).unwrap_or(0)
    }

    /// Whether `tenant` holds nothing
    pub fn is_empty(&self, tenant: &Tenant) -> bool {
        self.len(tenant) == 0
    }

    /// Every tenant that has touched this registry
    pub fn tenants(&self) -> Vec<Tenant> {
        self.tenants
            .read()
            .values()
            .map(|e| e.tenant.clone())
            .collect()
    }

    /// Next id from the tenant's monotonic counter
    pub fn next_id(&self, tenant: &Tenant) -> u32 {
        let mut tenants = self.tenants.write();
        let entry = tenants.entry(tenant.id).or_insert_with(|| TenantEntry {
            tenant: tenant.clone(),
            slot: Arc::new(RwLock::new(HashMap::new())),
            next_id: self.id_start,
        });
        let id = entry.next_id;
        entry.next_id = entry.next_id.wrapping_add(1);
        id
    }

    /// Drop every tenant and counter
    pub fn clear(&self) {
        self.tenants.write().clear();
    }
}

impl<K, V> TenantRegistry<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Display,
    V: Clone + Expiring,
{
    /// Remove and return every value whose expiration is at or before `now`
    pub fn pop_expired(&self, now: DateTime<Utc>) -> Vec<(Tenant, V)> {
        let slots: Vec<(Tenant, TenantSlot<K, V>)> = self
            .tenants
            .read()
            .values()
            .map(|e| (e.tenant.clone(), e.slot.clone()))
            .collect();

        let mut expired = Vec::new();
        for (tenant, slot) in slots {
            let mut entries = slot.write();
            let keys: Vec<K> = entries
                .iter()
                .filter(|(_, v)| v.expires_at().is_some_and(|at| at <= now))
                .map(|(k, _)| k.clone())
                .collect();
            for key in keys {
                if let Some(value) = entries.remove(&key) {
                    expired.push((tenant.clone(), value));
                }
            }
        }
        expired
    }
}

impl<K, V> std::fmt::Debug for TenantRegistry<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantRegistry")
            .field("name", &self.name)
            .field("tenants", &self.tenants.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenant::test_support;
    use chrono::Duration;
    use proptest::prelude::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Entry {
        value: u32,
        expires_at: Option<DateTime<Utc>>,
    }

    impl Expiring for Entry {
        fn expires_at(&self) -> Option<DateTime<Utc>> {
            self.expires_at
        }
    }

    fn entry(value: u32, expires_at: Option<DateTime<Utc>>) -> Entry {
        Entry { value, expires_at }
    }

    #[test]
    fn test_get_unknown_tenant_does_not_create() {
        let registry: TenantRegistry<u32, Entry> = TenantRegistry::new("entry");
        let tenant = test_support::tenant();
        assert!(registry.get(&tenant, &1).is_none());
        assert!(registry.tenants().is_empty());
    }

    #[test]
    fn test_put_replaces() {
        let registry = TenantRegistry::new("entry");
        let tenant = test_support::tenant();
        registry.put(&tenant, 1u32, entry(1, None));
        registry.put(&tenant, 1u32, entry(2, None));
        assert_eq!(registry.len(&tenant), 1);
        assert_eq!(registry.get(&tenant, &1).unwrap().value, 2);
    }

    #[test]
    fn test_put_if_absent_returns_existing() {
        let registry = TenantRegistry::new("entry");
        let tenant = test_support::tenant();
        let first = registry.put_if_absent(&tenant, 1u32, entry(1, None));
        let second = registry.put_if_absent(&tenant, 1u32, entry(2, None));
        assert_eq!(first, second);
        assert_eq!(second.value, 1);
    }

    #[test]
    fn test_remove_absent_is_not_found() {
        let registry: TenantRegistry<u32, Entry> = TenantRegistry::new("entry");
        let tenant = test_support::tenant();
        let err = registry.remove(&tenant, &7).unwrap_err();
        assert_eq!(err.to_string(), "Entity not found: entry with id 7");
    }

    #[test]
    fn test_failed_try_update_leaves_value() {
        let registry = TenantRegistry::new("entry");
        let tenant = test_support::tenant();
        registry.put(&tenant, 1u32, entry(1, None));

        let err = registry
            .try_update(&tenant, &1, |e| {
                e.value = 99;
                Err(DomainError::conflict("rejected"))
            })
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict { .. }));
        assert_eq!(registry.get(&tenant, &1).unwrap().value, 1);

        let updated = registry
            .try_update(&tenant, &1, |e| {
                e.value += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(updated.value, 2);
    }

    #[test]
    fn test_tenant_isolation() {
        let registry = TenantRegistry::new("entry");
        let t1 = test_support::tenant();
        let t2 = test_support::tenant();
        registry.put(&t1, 1u32, entry(1, None));
        assert!(registry.get(&t2, &1).is_none());
        assert_eq!(registry.for_tenant(&t1).len(), 1);
        assert!(registry.for_tenant(&t2).is_empty());
    }

    #[test]
    fn test_next_id_is_per_tenant_and_monotonic() {
        let registry: TenantRegistry<u32, Entry> =
            TenantRegistry::with_id_start("entry", 1_000_000_000);
        let t1 = test_support::tenant();
        let t2 = test_support::tenant();
        assert_eq!(registry.next_id(&t1), 1_000_000_000);
        assert_eq!(registry.next_id(&t1), 1_000_000_001);
        assert_eq!(registry.next_id(&t2), 1_000_000_000);
    }

    #[test]
    fn test_pop_expired() {
        let registry = TenantRegistry::new("entry");
        let tenant = test_support::tenant();
        let now = Utc::now();
        registry.put(&tenant, 1u32, entry(1, Some(now - Duration::seconds(1))));
        registry.put(&tenant, 2u32, entry(2, Some(now)));
        registry.put(&tenant, 3u32, entry(3, Some(now + Duration::seconds(5))));
        registry.put(&tenant, 4u32, entry(4, None));

        let mut expired: Vec<u32> = registry
            .pop_expired(now)
            .into_iter()
            .map(|(_, e)| e.value)
            .collect();
        expired.sort();
        assert_eq!(expired, vec![1, 2]);
        assert_eq!(registry.len(&tenant), 2);
    }

    #[test]
    fn test_concurrent_puts_across_tenants() {
        let registry = Arc::new(TenantRegistry::new("entry"));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    let tenant = test_support::tenant();
                    for i in 0..100u32 {
                        registry.put(&tenant, i, entry(i, None));
                    }
                    registry.len(&tenant)
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 100);
        }
        assert_eq!(registry.tenants().len(), 8);
    }

    proptest! {
        #[test]
        fn pop_expired_is_idempotent(offsets in proptest::collection::vec(-100i64..100, 0..32)) {
            let registry = TenantRegistry::new("entry");
            let tenant = test_support::tenant();
            let now = Utc::now();
            for (i, offset) in offsets.iter().enumerate() {
                let expires_at = now + Duration::seconds(*offset);
                registry.put(&tenant, i as u32, entry(i as u32, Some(expires_at)));
            }
            let expected = offsets.iter().filter(|o| **o <= 0).count();
            prop_assert_eq!(registry.pop_expired(now).len(), expected);
            prop_assert!(registry.pop_expired(now).is_empty());
        }
    }
}
