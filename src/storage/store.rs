// Copyright 2025 Cowboy AI, LLC.

//! Storage records and their assets
//!
//! One storage exists per `(tenant, world, account)`. It is created on
//! first access with the default capacity and no mesos.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::asset::{merge_stacks, Asset, AssetBuilder};
use crate::errors::{DomainError, DomainResult};
use crate::field::{AccountId, WorldId};
use crate::persistence::TenantTable;
use crate::registry::TenantRegistry;
use crate::tenant::Tenant;

/// Slots a new storage starts with
pub const DEFAULT_CAPACITY: u32 = 4;

/// Natural key of a storage within a tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StorageKey {
    /// World
    pub world_id: WorldId,
    /// Account
    pub account_id: AccountId,
}

impl StorageKey {
    /// Key for `account_id` in `world_id`
    pub fn new(world_id: WorldId, account_id: AccountId) -> Self {
        Self { world_id, account_id }
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.world_id, self.account_id)
    }
}

/// Account storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Storage {
    /// Storage id
    pub id: Uuid,
    /// World
    pub world_id: WorldId,
    /// Account
    pub account_id: AccountId,
    /// Number of assets it can hold
    pub capacity: u32,
    /// Stored mesos
    pub mesos: u32,
}

impl Storage {
    fn new(key: StorageKey) -> Self {
        Self {
            id: Uuid::new_v4(),
            world_id: key.world_id,
            account_id: key.account_id,
            capacity: DEFAULT_CAPACITY,
            mesos: 0,
        }
    }

    /// Natural key
    pub fn key(&self) -> StorageKey {
        StorageKey::new(self.world_id, self.account_id)
    }
}

/// How to change stored mesos
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "amount", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MesosUpdate {
    /// Overwrite
    Set(u32),
    /// Add
    Add(u32),
    /// Subtract; fails when the storage holds less
    Subtract(u32),
}

impl MesosUpdate {
    /// Mesos after applying the change to `current`
    pub fn apply(self, current: u32) -> DomainResult<u32> {
        match self {
            MesosUpdate::Set(amount) => Ok(amount),
            MesosUpdate::Add(amount) => current
                .checked_add(amount)
                .ok_or_else(|| DomainError::validation("stored mesos would overflow")),
            MesosUpdate::Subtract(amount) => current.checked_sub(amount).ok_or_else(|| {
                DomainError::conflict(format!("cannot take {amount} mesos from {current}"))
            }),
        }
    }
}

/// What left storage in a withdrawal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Withdrawal {
    /// The asset as taken, its quantity being the amount withdrawn
    pub asset: Asset,
    /// Quantity left behind; 0 once the asset is gone
    pub remaining: u32,
}

/// Tenant-scoped storage persistence
///
/// Every mutation checks and writes in one step, so concurrent commands
/// against the same storage cannot lose updates.
#[async_trait]
pub trait StorageStore: Send + Sync {
    /// The storage for `key`, created when missing
    async fn get_or_create(&self, tenant: &Tenant, key: StorageKey) -> DomainResult<Storage>;

    /// The storage for `key` if it exists
    async fn find(&self, tenant: &Tenant, key: StorageKey) -> DomainResult<Option<Storage>>;

    /// Apply `update` to the mesos of an existing storage, returning the
    /// previous amount and the updated storage
    async fn adjust_mesos(
        &self,
        tenant: &Tenant,
        key: StorageKey,
        update: MesosUpdate,
    ) -> DomainResult<(u32, Storage)>;

    /// Store a new asset, failing with a conflict when `storage` is full
    async fn insert_asset(
        &self,
        tenant: &Tenant,
        storage: &Storage,
        asset: AssetBuilder,
    ) -> DomainResult<Asset>;

    /// Every asset of `storage_id`, in id order
    async fn assets(&self, tenant: &Tenant, storage_id: Uuid) -> DomainResult<Vec<Asset>>;

    /// Asset by id
    async fn asset(&self, tenant: &Tenant, id: u32) -> DomainResult<Asset>;

    /// Take `quantity` of an asset held by `storage_id`
    ///
    /// `quantity` only applies to assets carrying one. Anything else, or a
    /// quantity covering the whole stack, removes the asset. Asking for more
    /// than the stack holds is a conflict.
    async fn take_asset(
        &self,
        tenant: &Tenant,
        storage_id: Uuid,
        id: u32,
        quantity: Option<u32>,
    ) -> DomainResult<Withdrawal>;

    /// Merge the stacks of `storage_id` up to `slot_max` each, returning the
    /// assets that remain
    async fn arrange(
        &self,
        tenant: &Tenant,
        storage_id: Uuid,
        slot_max: u32,
    ) -> DomainResult<Vec<Asset>>;
}

/// [`StorageStore`] over a registry of storages and a table of assets
pub struct InMemoryStorageStore {
    storages: TenantRegistry<StorageKey, Storage>,
    assets: TenantTable<Asset>,
    // Serializes asset mutations that read before they write
    writes: Mutex<()>,
}

impl Default for InMemoryStorageStore {
    fn default() -> Self {
        Self {
            storages: TenantRegistry::new("storage"),
            assets: TenantTable::new("asset"),
            writes: Mutex::new(()),
        }
    }
}

impl InMemoryStorageStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn held(&self, tenant: &Tenant, storage_id: Uuid) -> Vec<Asset> {
        self.assets
            .find(tenant, |a| a.storage_id == storage_id)
            .into_iter()
            .map(|r| r.entity)
            .collect()
    }
}

#[async_trait]
impl StorageStore for InMemoryStorageStore {
    async fn get_or_create(&self, tenant: &Tenant, key: StorageKey) -> DomainResult<Storage> {
        Ok(self.storages.put_if_absent(tenant, key, Storage::new(key)))
    }

    async fn find(&self, tenant: &Tenant, key: StorageKey) -> DomainResult<Option<Storage>> {
        Ok(self.storages.get(tenant, &key))
    }

    async fn adjust_mesos(
        &self,
        tenant: &Tenant,
        key: StorageKey,
        update: MesosUpdate,
    ) -> DomainResult<(u32, Storage)> {
        let mut previous = 0;
        let storage = self.storages.try_update(tenant, &key, |s| {
            previous = s.mesos;
            s.mesos = update.apply(s.mesos)?;
            Ok(())
        })?;
        Ok((previous, storage))
    }

    async fn insert_asset(
        &self,
        tenant: &Tenant,
        storage: &Storage,
        asset: AssetBuilder,
    ) -> DomainResult<Asset> {
        let _writes = self.writes.lock();
        let held = self.held(tenant, storage.id).len();
        if held as u32 >= storage.capacity {
            return Err(DomainError::conflict(format!(
                "storage {} is full ({held}/{})",
                storage.id, storage.capacity
            )));
        }
        Ok(self
            .assets
            .insert(tenant, |id| asset.build(id, storage.id))?
            .entity)
    }

    async fn assets(&self, tenant: &Tenant, storage_id: Uuid) -> DomainResult<Vec<Asset>> {
        Ok(self.held(tenant, storage_id))
    }

    async fn asset(&self, tenant: &Tenant, id: u32) -> DomainResult<Asset> {
        Ok(self.assets.get(tenant, id)?.entity)
    }

    async fn take_asset(
        &self,
        tenant: &Tenant,
        storage_id: Uuid,
        id: u32,
        quantity: Option<u32>,
    ) -> DomainResult<Withdrawal> {
        let _writes = self.writes.lock();
        let asset = self.assets.get(tenant, id)?.entity;
        if asset.storage_id != storage_id {
            return Err(DomainError::not_found(self.assets.name(), id));
        }
        let held = asset.quantity();
        match quantity.filter(|_| asset.has_quantity()) {
            Some(asked) if asked > held => Err(DomainError::conflict(format!(
                "asset {id} holds {held}, cannot withdraw {asked}"
            ))),
            Some(taken) if taken < held => {
                let remaining = held - taken;
                let mut asset = self
                    .assets
                    .update(tenant, id, |a| {
                        a.set_quantity(remaining);
                        Ok(())
                    })?
                    .entity;
                asset.set_quantity(taken);
                Ok(Withdrawal { asset, remaining })
            }
            _ => {
                let asset = self.assets.soft_delete(tenant, id)?.entity;
                Ok(Withdrawal { asset, remaining: 0 })
            }
        }
    }

    async fn arrange(
        &self,
        tenant: &Tenant,
        storage_id: Uuid,
        slot_max: u32,
    ) -> DomainResult<Vec<Asset>> {
        let _writes = self.writes.lock();
        let plan = merge_stacks(&self.held(tenant, storage_id), slot_max);
        for (id, quantity) in plan.updates {
            self.assets.update(tenant, id, |a| {
                a.set_quantity(quantity);
                Ok(())
            })?;
        }
        for id in plan.removed {
            self.assets.soft_delete(tenant, id)?;
        }
        Ok(self.held(tenant, storage_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::asset::{ReferenceData, StackableData};
    use crate::tenant::test_support;
    use std::sync::Arc;

    fn potions(quantity: u32) -> AssetBuilder {
        AssetBuilder::new(2000000).reference_data(ReferenceData::Consumable(StackableData {
            quantity,
            ..Default::default()
        }))
    }

    #[tokio::test]
    async fn test_storage_is_created_once_with_defaults() {
        let store = InMemoryStorageStore::new();
        let tenant = test_support::tenant();
        let key = StorageKey::new(0, 7);

        assert!(store.find(&tenant, key).await.unwrap().is_none());
        let first = store.get_or_create(&tenant, key).await.unwrap();
        let second = store.get_or_create(&tenant, key).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.capacity, DEFAULT_CAPACITY);
        assert_eq!(first.mesos, 0);

        let other = store.get_or_create(&tenant, StorageKey::new(1, 7)).await.unwrap();
        assert_ne!(other.id, first.id);
    }

    #[tokio::test]
    async fn test_assets_are_scoped_to_storage_and_tenant() {
        let store = InMemoryStorageStore::new();
        let t1 = test_support::tenant();
        let t2 = test_support::tenant();
        let storage = store.get_or_create(&t1, StorageKey::new(0, 1)).await.unwrap();
        let asset = store.insert_asset(&t1, &storage, potions(10)).await.unwrap();

        assert_eq!(store.assets(&t1, storage.id).await.unwrap().len(), 1);
        assert!(store.assets(&t1, Uuid::new_v4()).await.unwrap().is_empty());
        assert!(store.asset(&t2, asset.id).await.unwrap_err().is_not_found());
        assert!(store
            .take_asset(&t1, Uuid::new_v4(), asset.id, None)
            .await
            .unwrap_err()
            .is_not_found());

        let taken = store.take_asset(&t1, storage.id, asset.id, Some(6)).await.unwrap();
        assert_eq!(taken.asset.quantity(), 6);
        assert_eq!(taken.remaining, 4);
        assert_eq!(store.asset(&t1, asset.id).await.unwrap().quantity(), 4);

        let err = store.take_asset(&t1, storage.id, asset.id, Some(5)).await.unwrap_err();
        assert!(matches!(err, DomainError::Conflict { .. }));
        let rest = store.take_asset(&t1, storage.id, asset.id, Some(4)).await.unwrap();
        assert_eq!(rest.remaining, 0);
        assert!(store.asset(&t1, asset.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_equipment_is_taken_whole() {
        let store = InMemoryStorageStore::new();
        let tenant = test_support::tenant();
        let storage = store.get_or_create(&tenant, StorageKey::new(0, 1)).await.unwrap();
        let asset = store
            .insert_asset(&tenant, &storage, AssetBuilder::new(1302000))
            .await
            .unwrap();

        let taken = store.take_asset(&tenant, storage.id, asset.id, Some(2)).await.unwrap();
        assert_eq!(taken.remaining, 0);
        assert!(store.assets(&tenant, storage.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_full_storage_rejects_inserts() {
        let store = InMemoryStorageStore::new();
        let tenant = test_support::tenant();
        let storage = store.get_or_create(&tenant, StorageKey::new(0, 1)).await.unwrap();
        for _ in 0..DEFAULT_CAPACITY {
            store.insert_asset(&tenant, &storage, potions(1)).await.unwrap();
        }
        let err = store.insert_asset(&tenant, &storage, potions(1)).await.unwrap_err();
        assert!(matches!(err, DomainError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_mesos_adjustments_are_not_lost() {
        let store = Arc::new(InMemoryStorageStore::new());
        let tenant = test_support::tenant();
        let key = StorageKey::new(0, 1);
        store.get_or_create(&tenant, key).await.unwrap();

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                let tenant = tenant.clone();
                tokio::spawn(async move {
                    store.adjust_mesos(&tenant, key, MesosUpdate::Add(100)).await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(store.find(&tenant, key).await.unwrap().unwrap().mesos, 1600);

        let (previous, storage) = store
            .adjust_mesos(&tenant, key, MesosUpdate::Subtract(600))
            .await
            .unwrap();
        assert_eq!((previous, storage.mesos), (1600, 1000));
        let err = store
            .adjust_mesos(&tenant, key, MesosUpdate::Subtract(1001))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict { .. }));
        assert_eq!(store.find(&tenant, key).await.unwrap().unwrap().mesos, 1000);
    }

    #[tokio::test]
    async fn test_arrange_merges_stacks() {
        let store = InMemoryStorageStore::new();
        let tenant = test_support::tenant();
        let storage = store.get_or_create(&tenant, StorageKey::new(0, 1)).await.unwrap();
        let first = store.insert_asset(&tenant, &storage, potions(80)).await.unwrap();
        store.insert_asset(&tenant, &storage, potions(15)).await.unwrap();
        store.insert_asset(&tenant, &storage, potions(30)).await.unwrap();

        let assets = store.arrange(&tenant, storage.id, 100).await.unwrap();
        let stacks: Vec<(u32, u32)> = assets.iter().map(|a| (a.id, a.quantity())).collect();
        assert_eq!(stacks, vec![(first.id, 100), (first.id + 1, 25)]);
    }
}
