// Copyright 2025 Cowboy AI, LLC.

//! Storage operations
//!
//! Assets are presented with slots computed at read time: decorated, then
//! ordered by inventory type and template. Mutations publish asset status
//! events keyed by asset id; mesos changes are keyed by account.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::asset::{assign_slots, Asset, AssetBuilder};
use super::decorator::DecoratorPipeline;
use super::asset::DEFAULT_SLOT_MAX;
use super::store::{MesosUpdate, Storage, StorageKey, StorageStore};
use crate::errors::{DomainError, DomainResult};
use crate::field::{AccountId, WorldId};
use crate::message::topics::EVENT_TOPIC_ASSET_STATUS;
use crate::message::{create_key, Emitter, Envelope};
use crate::provider::Provider;
use crate::tenant::Context;

/// Asset status event type
pub const ASSET_STATUS_DEPOSITED: &str = "DEPOSITED";
/// Asset status event type
pub const ASSET_STATUS_WITHDRAWN: &str = "WITHDRAWN";
/// Asset status event type
pub const ASSET_STATUS_QUANTITY_UPDATED: &str = "QUANTITY_UPDATED";
/// Asset status event type
pub const ASSET_STATUS_MESOS_UPDATED: &str = "MESOS_UPDATED";
/// Asset status event type
pub const ASSET_STATUS_ARRANGED: &str = "ARRANGED";
/// Asset status event type
pub const ASSET_STATUS_ERROR: &str = "ERROR";

/// Error code for a deposit into a full storage
pub const STORAGE_ERROR_FULL: &str = "STORAGE_FULL";
/// Error code for a withdrawal of more mesos than stored
pub const STORAGE_ERROR_NOT_ENOUGH_MESOS: &str = "NOT_ENOUGH_MESOS";
/// Error code for any other failed command
pub const STORAGE_ERROR_GENERIC: &str = "GENERIC";

/// Body of a deposit, withdrawal or quantity event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetStatusBody {
    /// Owning storage
    pub storage_id: Uuid,
    /// Account
    pub account_id: AccountId,
    /// Asset
    pub asset_id: u32,
    /// Item template
    pub template_id: u32,
    /// Stack size after the change, 0 once the asset is gone
    pub quantity: u32,
}

/// Body of a mesos event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MesosStatusBody {
    /// Owning storage
    pub storage_id: Uuid,
    /// Account
    pub account_id: AccountId,
    /// Mesos before
    pub previous: u32,
    /// Mesos after
    pub mesos: u32,
}

/// Body of an arranged event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrangedBody {
    /// Owning storage
    pub storage_id: Uuid,
    /// Account
    pub account_id: AccountId,
    /// Assets left after merging
    pub assets: u32,
}

/// Body of an error event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageErrorBody {
    /// World
    pub world_id: WorldId,
    /// Account
    pub account_id: AccountId,
    /// Machine readable reason
    pub error_code: String,
    /// Human readable reason
    pub message: String,
}

/// Storage service operations
#[derive(Clone)]
pub struct StorageProcessor {
    store: Arc<dyn StorageStore>,
    decorators: DecoratorPipeline,
    emitter: Emitter,
}

impl StorageProcessor {
    /// Processor over `store`, decorating reads with `decorators`
    pub fn new(
        store: Arc<dyn StorageStore>,
        decorators: DecoratorPipeline,
        emitter: Emitter,
    ) -> Self {
        Self {
            store,
            decorators,
            emitter,
        }
    }

    /// The account's storage, created on first access
    pub async fn get_or_create(
        &self,
        ctx: &Context,
        world_id: WorldId,
        account_id: AccountId,
    ) -> DomainResult<Storage> {
        ctx.run(self.store.get_or_create(ctx.tenant(), StorageKey::new(world_id, account_id)))
            .await
    }

    /// Put an asset into storage
    pub async fn deposit(
        &self,
        ctx: &Context,
        world_id: WorldId,
        account_id: AccountId,
        asset: AssetBuilder,
    ) -> DomainResult<Asset> {
        let tenant = ctx.tenant();
        let storage = self.get_or_create(ctx, world_id, account_id).await?;
        let asset = self
            .emitter
            .emit_with_result(ctx, |buf| async move {
                let asset = self.store.insert_asset(tenant, &storage, asset).await?;
                buf.put_envelope(
                    EVENT_TOPIC_ASSET_STATUS,
                    tenant,
                    Envelope::new(
                        Uuid::new_v4(),
                        tenant,
                        create_key(u64::from(asset.id)),
                        ASSET_STATUS_DEPOSITED,
                        asset_body(&storage, &asset, asset.quantity()),
                    ),
                );
                Ok(asset)
            })
            .await?;
        info!(
            tenant_id = %tenant.id,
            account_id,
            asset_id = asset.id,
            template_id = asset.template_id,
            "Asset deposited"
        );
        Ok(asset)
    }

    /// Take an asset, or part of a stack, out of storage
    ///
    /// `quantity` only applies to assets carrying one; anything else, or a
    /// quantity covering the whole stack, removes the asset. Returns the
    /// asset as it left storage.
    pub async fn withdraw(
        &self,
        ctx: &Context,
        world_id: WorldId,
        account_id: AccountId,
        asset_id: u32,
        quantity: Option<u32>,
    ) -> DomainResult<Asset> {
        if quantity == Some(0) {
            return Err(DomainError::validation("withdraw quantity must be positive"));
        }
        let tenant = ctx.tenant();
        let storage = self.get_or_create(ctx, world_id, account_id).await?;
        let withdrawn = self
            .emitter
            .emit_with_result(ctx, |buf| async move {
                let taken = self.store.take_asset(tenant, storage.id, asset_id, quantity).await?;
                let kind = if taken.remaining == 0 {
                    ASSET_STATUS_WITHDRAWN
                } else {
                    ASSET_STATUS_QUANTITY_UPDATED
                };
                let mut withdrawn = taken.asset;
                withdrawn.slot = 0;
                buf.put_envelope(
                    EVENT_TOPIC_ASSET_STATUS,
                    tenant,
                    Envelope::new(
                        Uuid::new_v4(),
                        tenant,
                        create_key(u64::from(asset_id)),
                        kind,
                        asset_body(&storage, &withdrawn, taken.remaining),
                    ),
                );
                Ok(withdrawn)
            })
            .await?;
        info!(
            tenant_id = %tenant.id,
            account_id,
            asset_id,
            quantity = withdrawn.quantity(),
            "Asset withdrawn"
        );
        Ok(withdrawn)
    }

    /// Change the stored mesos
    pub async fn update_mesos(
        &self,
        ctx: &Context,
        world_id: WorldId,
        account_id: AccountId,
        update: MesosUpdate,
    ) -> DomainResult<Storage> {
        let tenant = ctx.tenant();
        let key = StorageKey::new(world_id, account_id);
        self.get_or_create(ctx, world_id, account_id).await?;
        let updated = self
            .emitter
            .emit_with_result(ctx, |buf| async move {
                let (previous, updated) = self.store.adjust_mesos(tenant, key, update).await?;
                buf.put_envelope(
                    EVENT_TOPIC_ASSET_STATUS,
                    tenant,
                    Envelope::new(
                        Uuid::new_v4(),
                        tenant,
                        create_key(u64::from(account_id)),
                        ASSET_STATUS_MESOS_UPDATED,
                        MesosStatusBody {
                            storage_id: updated.id,
                            account_id,
                            previous,
                            mesos: updated.mesos,
                        },
                    ),
                );
                Ok(updated)
            })
            .await?;
        debug!(tenant_id = %tenant.id, account_id, mesos = updated.mesos, "Storage mesos updated");
        Ok(updated)
    }

    /// Undo a deposit by removing the asset it created
    pub async fn deposit_rollback(
        &self,
        ctx: &Context,
        world_id: WorldId,
        account_id: AccountId,
        asset_id: u32,
    ) -> DomainResult<Asset> {
        let removed = self.withdraw(ctx, world_id, account_id, asset_id, None).await?;
        info!(tenant_id = %ctx.tenant().id, account_id, asset_id, "Deposit rolled back");
        Ok(removed)
    }

    /// Merge partial stacks of the same item and report the result
    pub async fn arrange(
        &self,
        ctx: &Context,
        world_id: WorldId,
        account_id: AccountId,
    ) -> DomainResult<Vec<Asset>> {
        let tenant = ctx.tenant();
        let storage = self.get_or_create(ctx, world_id, account_id).await?;
        self.emitter
            .emit(ctx, |buf| async move {
                let assets = self.store.arrange(tenant, storage.id, DEFAULT_SLOT_MAX).await?;
                buf.put_envelope(
                    EVENT_TOPIC_ASSET_STATUS,
                    tenant,
                    Envelope::new(
                        Uuid::new_v4(),
                        tenant,
                        create_key(u64::from(account_id)),
                        ASSET_STATUS_ARRANGED,
                        ArrangedBody {
                            storage_id: storage.id,
                            account_id,
                            assets: assets.len() as u32,
                        },
                    ),
                );
                Ok(())
            })
            .await?;
        debug!(tenant_id = %tenant.id, account_id, "Storage arranged");
        self.assets(ctx, world_id, account_id).await
    }

    /// Tell the requester a storage command failed
    pub async fn report_error(
        &self,
        ctx: &Context,
        transaction_id: Uuid,
        world_id: WorldId,
        account_id: AccountId,
        error_code: &str,
        err: &DomainError,
    ) -> DomainResult<()> {
        warn!(
            tenant_id = %ctx.tenant().id,
            account_id,
            error_code,
            error = %err,
            "Storage command failed"
        );
        let tenant = ctx.tenant();
        let body = StorageErrorBody {
            world_id,
            account_id,
            error_code: error_code.to_string(),
            message: err.to_string(),
        };
        self.emitter
            .emit(ctx, |buf| async move {
                buf.put_envelope(
                    EVENT_TOPIC_ASSET_STATUS,
                    tenant,
                    Envelope::new(
                        transaction_id,
                        tenant,
                        create_key(u64::from(account_id)),
                        ASSET_STATUS_ERROR,
                        body,
                    ),
                );
                Ok(())
            })
            .await
    }

    /// Every asset of the account's storage, decorated and slotted
    pub async fn assets(
        &self,
        ctx: &Context,
        world_id: WorldId,
        account_id: AccountId,
    ) -> DomainResult<Vec<Asset>> {
        let tenant = ctx.tenant();
        let Some(storage) = ctx
            .run(self.store.find(tenant, StorageKey::new(world_id, account_id)))
            .await?
        else {
            return Ok(Vec::new());
        };
        let assets = ctx.run(self.store.assets(tenant, storage.id)).await?;
        let mut assets = self.decorators.decorate(tenant, assets).await;
        assign_slots(&mut assets);
        Ok(assets)
    }

    /// One asset of the account's storage, with the slot it is shown in
    pub async fn asset(
        &self,
        ctx: &Context,
        world_id: WorldId,
        account_id: AccountId,
        asset_id: u32,
    ) -> DomainResult<Asset> {
        Provider::new(self.assets(ctx, world_id, account_id))
            .and_then(move |assets| {
                assets
                    .into_iter()
                    .find(|a| a.id == asset_id)
                    .ok_or_else(|| DomainError::not_found("asset", asset_id))
            })
            .await
    }
}

fn asset_body(storage: &Storage, asset: &Asset, quantity: u32) -> AssetStatusBody {
    AssetStatusBody {
        storage_id: storage.id,
        account_id: storage.account_id,
        asset_id: asset.id,
        template_id: asset.template_id,
        quantity,
    }
}
