// Copyright 2025 Cowboy AI, LLC.

//! Account storage
//!
//! Each account has one storage per world holding a few assets and some
//! mesos. Assets reference variant data owned by other services; reads
//! attach it through the [`DecoratorPipeline`] and number the assets into
//! display slots.

pub mod asset;
pub mod decorator;
pub mod processor;
pub mod store;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use asset::{
    assign_slots, merge_stacks, Asset, AssetBuilder, CashData, EquipableData, InventoryType,
    MergePlan, PetData, ReferenceData, ReferenceType, StackableData, DEFAULT_SLOT_MAX,
};
pub use decorator::{Decorator, DecoratorPipeline, TableDecorator};
pub use processor::{
    ArrangedBody, AssetStatusBody, MesosStatusBody, StorageErrorBody, StorageProcessor,
    STORAGE_ERROR_FULL, STORAGE_ERROR_GENERIC, STORAGE_ERROR_NOT_ENOUGH_MESOS,
};
pub use store::{
    InMemoryStorageStore, MesosUpdate, Storage, StorageKey, StorageStore, Withdrawal,
    DEFAULT_CAPACITY,
};

use crate::errors::{DomainError, DomainResult};
use crate::field::{AccountId, WorldId};
use crate::message::{Envelope, Handler};
use crate::tenant::Context;

/// Storage command type
pub const STORAGE_COMMAND_DEPOSIT: &str = "DEPOSIT";
/// Storage command type
pub const STORAGE_COMMAND_WITHDRAW: &str = "WITHDRAW";
/// Storage command type
pub const STORAGE_COMMAND_UPDATE_MESOS: &str = "UPDATE_MESOS";
/// Storage command type
pub const STORAGE_COMMAND_DEPOSIT_ROLLBACK: &str = "DEPOSIT_ROLLBACK";
/// Storage command type
pub const STORAGE_COMMAND_ARRANGE: &str = "ARRANGE";

/// Body of a deposit command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositBody {
    /// World
    pub world_id: WorldId,
    /// Account
    pub account_id: AccountId,
    /// Item template
    pub template_id: u32,
    /// Id in the owning service
    #[serde(default)]
    pub reference_id: u32,
    /// Cash serial for cash equipment
    #[serde(default)]
    pub cash_id: Option<i64>,
    /// Pet id for pets
    #[serde(default)]
    pub pet_id: Option<u32>,
    /// Variant data known up front
    #[serde(default)]
    pub reference_data: Option<ReferenceData>,
}

impl DepositBody {
    fn builder(self) -> AssetBuilder {
        let mut builder = AssetBuilder::new(self.template_id).reference_id(self.reference_id);
        if let Some(cash_id) = self.cash_id {
            builder = builder.cash_id(cash_id);
        }
        if let Some(pet_id) = self.pet_id {
            builder = builder.pet_id(pet_id);
        }
        if let Some(data) = self.reference_data {
            builder = builder.reference_data(data);
        }
        builder
    }
}

/// Body of a withdraw command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawBody {
    /// World
    pub world_id: WorldId,
    /// Account
    pub account_id: AccountId,
    /// Asset
    pub asset_id: u32,
    /// Part of a stack to take; the whole asset when absent
    #[serde(default)]
    pub quantity: Option<u32>,
}

/// Body of a mesos command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMesosBody {
    /// World
    pub world_id: WorldId,
    /// Account
    pub account_id: AccountId,
    /// Change to apply
    pub update: MesosUpdate,
}

/// Body of a deposit rollback command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositRollbackBody {
    /// World
    pub world_id: WorldId,
    /// Account
    pub account_id: AccountId,
    /// Asset the deposit created
    pub asset_id: u32,
}

/// Body of an arrange command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrangeBody {
    /// World
    pub world_id: WorldId,
    /// Account
    pub account_id: AccountId,
}

/// Applies storage commands from the bus
///
/// A command that decodes but then fails is answered with an error status
/// event before the failure is returned to the consumer.
pub struct StorageCommandHandler {
    processor: StorageProcessor,
}

impl StorageCommandHandler {
    /// Handler driving `processor`
    pub fn new(processor: StorageProcessor) -> Self {
        Self { processor }
    }
}

impl StorageCommandHandler {
    async fn answer(
        &self,
        ctx: &Context,
        envelope: &Envelope<serde_json::Value>,
        (world_id, account_id): (WorldId, AccountId),
        conflict_code: &str,
        result: DomainResult<()>,
    ) -> DomainResult<()> {
        let Err(err) = result else {
            return Ok(());
        };
        let code = match &err {
            DomainError::Conflict { .. } => conflict_code,
            _ => STORAGE_ERROR_GENERIC,
        };
        let reported = self
            .processor
            .report_error(ctx, envelope.transaction_id, world_id, account_id, code, &err)
            .await;
        if let Err(report_err) = reported {
            tracing::error!(
                tenant_id = %ctx.tenant().id,
                account_id,
                error = %report_err,
                "Failed to publish storage error"
            );
        }
        Err(err)
    }
}

#[async_trait]
impl Handler for StorageCommandHandler {
    async fn handle(
        &self,
        ctx: &Context,
        envelope: &Envelope<serde_json::Value>,
    ) -> DomainResult<()> {
        match envelope.kind.as_str() {
            STORAGE_COMMAND_DEPOSIT => {
                let body: DepositBody = envelope.decode_body()?;
                let account = (body.world_id, body.account_id);
                let result = self
                    .processor
                    .deposit(ctx, account.0, account.1, body.builder())
                    .await
                    .map(|_| ());
                self.answer(ctx, envelope, account, STORAGE_ERROR_FULL, result).await
            }
            STORAGE_COMMAND_WITHDRAW => {
                let body: WithdrawBody = envelope.decode_body()?;
                let account = (body.world_id, body.account_id);
                let result = self
                    .processor
                    .withdraw(ctx, account.0, account.1, body.asset_id, body.quantity)
                    .await
                    .map(|_| ());
                self.answer(ctx, envelope, account, STORAGE_ERROR_GENERIC, result).await
            }
            STORAGE_COMMAND_UPDATE_MESOS => {
                let body: UpdateMesosBody = envelope.decode_body()?;
                let account = (body.world_id, body.account_id);
                let result = self
                    .processor
                    .update_mesos(ctx, account.0, account.1, body.update)
                    .await
                    .map(|_| ());
                self.answer(ctx, envelope, account, STORAGE_ERROR_NOT_ENOUGH_MESOS, result)
                    .await
            }
            STORAGE_COMMAND_DEPOSIT_ROLLBACK => {
                let body: DepositRollbackBody = envelope.decode_body()?;
                let account = (body.world_id, body.account_id);
                let result = self
                    .processor
                    .deposit_rollback(ctx, account.0, account.1, body.asset_id)
                    .await
                    .map(|_| ());
                self.answer(ctx, envelope, account, STORAGE_ERROR_GENERIC, result).await
            }
            STORAGE_COMMAND_ARRANGE => {
                let body: ArrangeBody = envelope.decode_body()?;
                let account = (body.world_id, body.account_id);
                let result = self
                    .processor
                    .arrange(ctx, account.0, account.1)
                    .await
                    .map(|_| ());
                self.answer(ctx, envelope, account, STORAGE_ERROR_GENERIC, result).await
            }
            other => Err(DomainError::validation(format!("unknown storage command {other}"))),
        }
    }
}
