// Copyright 2025 Cowboy AI, LLC.

//! Saga records, steps and the closed action set
//!
//! A step's action is a tag and its payload is the variant chosen by that
//! tag. On the wire a step is `{stepId, status, action, payload, createdAt,
//! updatedAt}`; decoding rejects any action outside [`Action`] and any
//! payload that does not fit its action.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::errors::DomainError;
use crate::field::{AccountId, ChannelId, CharacterId, Field, WorldId};

/// Errors raised while building or advancing a saga
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SagaError {
    /// A required builder field was not supplied
    #[error("{0} is required")]
    MissingField(&'static str),

    /// A saga needs at least one step
    #[error("saga must have at least one step")]
    NoSteps,

    /// Two steps share an id
    #[error("duplicate step id {0}")]
    DuplicateStep(String),

    /// Action tag outside the closed set
    #[error("unknown action {0}")]
    UnknownAction(String),

    /// Saga type outside the closed set
    #[error("unknown saga type {0}")]
    UnknownSagaType(String),

    /// Lifecycle status outside the closed set
    #[error("unknown saga status {0}")]
    UnknownStatus(String),

    /// Payload does not match its action
    #[error("invalid payload for {action}: {reason}")]
    InvalidPayload {
        /// Action tag
        action: Action,
        /// Decoder message
        reason: String,
    },

    /// No step with this id
    #[error("step {0} not found")]
    StepNotFound(String),

    /// A status change that would move a step backwards
    #[error("step {step} cannot move from {from} to {to}")]
    IllegalTransition {
        /// Step id
        step: String,
        /// Current status
        from: StepStatus,
        /// Requested status
        to: StepStatus,
    },

    /// Another writer persisted the saga first
    #[error("saga {transaction_id} is at version {actual}, expected {expected}")]
    StaleVersion {
        /// Saga
        transaction_id: Uuid,
        /// Version the writer read
        expected: u64,
        /// Version found in the store
        actual: u64,
    },
}

impl From<SagaError> for DomainError {
    fn from(err: SagaError) -> Self {
        match err {
            SagaError::StepNotFound(step) => DomainError::not_found("saga step", step),
            SagaError::IllegalTransition { from, to, .. } => DomainError::InvalidStateTransition {
                from: from.to_string(),
                to: to.to_string(),
            },
            SagaError::StaleVersion { expected, actual, .. } => {
                DomainError::ConcurrencyConflict { expected, actual }
            }
            other => DomainError::ValidationError(other.to_string()),
        }
    }
}

/// Workflow families the coordinator runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaType {
    /// Multi-item inventory change
    InventoryTransaction,
    /// Rewards granted on quest completion
    QuestReward,
    /// Two-party trade
    TradeTransaction,
}

impl SagaType {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaType::InventoryTransaction => "inventory_transaction",
            SagaType::QuestReward => "quest_reward",
            SagaType::TradeTransaction => "trade_transaction",
        }
    }
}

impl fmt::Display for SagaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SagaType {
    type Err = SagaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inventory_transaction" => Ok(SagaType::InventoryTransaction),
            "quest_reward" => Ok(SagaType::QuestReward),
            "trade_transaction" => Ok(SagaType::TradeTransaction),
            "" => Err(SagaError::MissingField("sagaType")),
            other => Err(SagaError::UnknownSagaType(other.to_string())),
        }
    }
}

/// The closed set of step actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Create an item in the character's inventory
    AwardAsset,
    /// Grant experience
    AwardExperience,
    /// Grant levels
    AwardLevel,
    /// Grant or deduct mesos
    AwardMesos,
    /// Grant or deduct cash shop currency
    AwardCurrency,
    /// Move the character to a random portal of a field
    WarpToRandomPortal,
    /// Move the character to a specific portal
    WarpToPortal,
    /// Remove items from the character's inventory
    DestroyAsset,
    /// Change the character's job
    ChangeJob,
    /// Teach a skill
    CreateSkill,
    /// Change a skill's levels
    UpdateSkill,
    /// Apply a consumable's effects
    ApplyConsumableEffect,
}

impl Action {
    /// Every action, in declaration order
    pub const ALL: [Action; 12] = [
        Action::AwardAsset,
        Action::AwardExperience,
        Action::AwardLevel,
        Action::AwardMesos,
        Action::AwardCurrency,
        Action::WarpToRandomPortal,
        Action::WarpToPortal,
        Action::DestroyAsset,
        Action::ChangeJob,
        Action::CreateSkill,
        Action::UpdateSkill,
        Action::ApplyConsumableEffect,
    ];

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::AwardAsset => "award_asset",
            Action::AwardExperience => "award_experience",
            Action::AwardLevel => "award_level",
            Action::AwardMesos => "award_mesos",
            Action::AwardCurrency => "award_currency",
            Action::WarpToRandomPortal => "warp_to_random_portal",
            Action::WarpToPortal => "warp_to_portal",
            Action::DestroyAsset => "destroy_asset",
            Action::ChangeJob => "change_job",
            Action::CreateSkill => "create_skill",
            Action::UpdateSkill => "update_skill",
            Action::ApplyConsumableEffect => "apply_consumable_effect",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = SagaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(SagaError::MissingField("action"));
        }
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| SagaError::UnknownAction(s.to_string()))
    }
}

/// Status of one step
///
/// Transitions only go forward: `pending → completed` or
/// `pending → failed`. Re-applying the current status is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Not yet reported
    Pending,
    /// The participant applied the action
    Completed,
    /// The participant rejected the action
    Failed,
}

impl StepStatus {
    /// Whether a step in this status may be set to `next`
    pub fn can_become(self, next: StepStatus) -> bool {
        self == next || self == StepStatus::Pending
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StepStatus::Pending => "pending",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
        })
    }
}

/// Lifecycle of a whole saga
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaStatus {
    /// Steps are being dispatched
    Active,
    /// A step failed and earlier steps are being reversed
    Compensating,
    /// Every step completed
    Completed,
    /// A step failed; compensation has run
    Failed,
}

impl SagaStatus {
    /// No further transitions
    pub fn is_terminal(self) -> bool {
        matches!(self, SagaStatus::Completed | SagaStatus::Failed)
    }

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStatus::Active => "active",
            SagaStatus::Compensating => "compensating",
            SagaStatus::Completed => "completed",
            SagaStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SagaStatus {
    type Err = SagaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SagaStatus::Active),
            "compensating" => Ok(SagaStatus::Compensating),
            "completed" => Ok(SagaStatus::Completed),
            "failed" => Ok(SagaStatus::Failed),
            other => Err(SagaError::UnknownStatus(other.to_string())),
        }
    }
}

/// Item granted by [`Action::AwardAsset`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPayload {
    /// Item template
    pub template_id: u32,
    /// Stack size
    pub quantity: u32,
    /// Lifetime in days, 0 for permanent
    #[serde(default)]
    pub period: u32,
    /// Absolute expiry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
}

/// Payload of [`Action::AwardAsset`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardAssetPayload {
    /// Recipient
    pub character_id: CharacterId,
    /// Item to create
    pub item: ItemPayload,
}

/// One slice of awarded experience
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperienceDistribution {
    /// Source label, e.g. `WHITE` or `QUEST`
    pub experience_type: String,
    /// Amount; negative on compensation
    pub amount: i64,
    /// Source specific attribute
    #[serde(default)]
    pub attr1: u32,
}

/// Payload of [`Action::AwardExperience`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardExperiencePayload {
    /// Recipient
    pub character_id: CharacterId,
    /// World
    pub world_id: WorldId,
    /// Channel
    pub channel_id: ChannelId,
    /// Experience slices
    pub distributions: Vec<ExperienceDistribution>,
}

/// Payload of [`Action::AwardLevel`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardLevelPayload {
    /// Recipient
    pub character_id: CharacterId,
    /// World
    pub world_id: WorldId,
    /// Channel
    pub channel_id: ChannelId,
    /// Levels to add; negative on compensation
    pub amount: i16,
    /// Level before the award; compensation never goes below it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_level: Option<u8>,
}

/// Payload of [`Action::AwardMesos`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardMesosPayload {
    /// Recipient
    pub character_id: CharacterId,
    /// World
    pub world_id: WorldId,
    /// Channel
    pub channel_id: ChannelId,
    /// Who pays
    #[serde(default)]
    pub actor_id: u32,
    /// `SYSTEM`, `NPC` or `CHARACTER`
    #[serde(default)]
    pub actor_type: String,
    /// Signed amount
    pub amount: i32,
}

/// Payload of [`Action::AwardCurrency`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardCurrencyPayload {
    /// Recipient
    pub character_id: CharacterId,
    /// Wallet owner
    pub account_id: AccountId,
    /// 1 credit, 2 points, 3 prepaid
    pub currency_type: u32,
    /// Signed amount
    pub amount: i32,
}

/// Payload of [`Action::WarpToRandomPortal`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarpToRandomPortalPayload {
    /// Character to move
    pub character_id: CharacterId,
    /// Destination
    #[serde(flatten)]
    pub field: Field,
}

/// Payload of [`Action::WarpToPortal`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarpToPortalPayload {
    /// Character to move
    pub character_id: CharacterId,
    /// Destination
    #[serde(flatten)]
    pub field: Field,
    /// Destination portal
    pub portal_id: u32,
    /// Portal name, resolved to an id by the receiver
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portal_name: Option<String>,
}

/// Payload of [`Action::DestroyAsset`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestroyAssetPayload {
    /// Owner
    pub character_id: CharacterId,
    /// Item template
    pub template_id: u32,
    /// Count to remove; ignored when `remove_all`
    pub quantity: u32,
    /// Remove every instance
    #[serde(default)]
    pub remove_all: bool,
}

/// Payload of [`Action::ChangeJob`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeJobPayload {
    /// Character
    pub character_id: CharacterId,
    /// World
    pub world_id: WorldId,
    /// Channel
    pub channel_id: ChannelId,
    /// New job
    pub job_id: u16,
    /// Job before the change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_job_id: Option<u16>,
}

/// Levels of a skill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillLevels {
    /// Current level
    pub level: u8,
    /// Maximum trainable level
    pub master_level: u8,
    /// Absolute expiry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
}

/// Payload of [`Action::CreateSkill`] and [`Action::UpdateSkill`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillPayload {
    /// Character
    pub character_id: CharacterId,
    /// Skill
    pub skill_id: u32,
    /// Levels after the action
    #[serde(flatten)]
    pub levels: SkillLevels,
    /// Levels before the action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<SkillLevels>,
}

/// Payload of [`Action::ApplyConsumableEffect`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyConsumableEffectPayload {
    /// Character
    pub character_id: CharacterId,
    /// World
    pub world_id: WorldId,
    /// Channel
    pub channel_id: ChannelId,
    /// Consumable whose effects apply
    pub item_id: u32,
}

/// A step's action together with its payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionPayload {
    /// See [`Action::AwardAsset`]
    AwardAsset(AwardAssetPayload),
    /// See [`Action::AwardExperience`]
    AwardExperience(AwardExperiencePayload),
    /// See [`Action::AwardLevel`]
    AwardLevel(AwardLevelPayload),
    /// See [`Action::AwardMesos`]
    AwardMesos(AwardMesosPayload),
    /// See [`Action::AwardCurrency`]
    AwardCurrency(AwardCurrencyPayload),
    /// See [`Action::WarpToRandomPortal`]
    WarpToRandomPortal(WarpToRandomPortalPayload),
    /// See [`Action::WarpToPortal`]
    WarpToPortal(WarpToPortalPayload),
    /// See [`Action::DestroyAsset`]
    DestroyAsset(DestroyAssetPayload),
    /// See [`Action::ChangeJob`]
    ChangeJob(ChangeJobPayload),
    /// See [`Action::CreateSkill`]
    CreateSkill(SkillPayload),
    /// See [`Action::UpdateSkill`]
    UpdateSkill(SkillPayload),
    /// See [`Action::ApplyConsumableEffect`]
    ApplyConsumableEffect(ApplyConsumableEffectPayload),
}

/// What undoing a completed step takes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inverse {
    /// Dispatch this action
    Dispatch(ActionPayload),
    /// Nothing can be undone; the reason is logged
    Skip(&'static str),
}

impl ActionPayload {
    /// The action tag
    pub fn action(&self) -> Action {
        match self {
            ActionPayload::AwardAsset(_) => Action::AwardAsset,
            ActionPayload::AwardExperience(_) => Action::AwardExperience,
            ActionPayload::AwardLevel(_) => Action::AwardLevel,
            ActionPayload::AwardMesos(_) => Action::AwardMesos,
            ActionPayload::AwardCurrency(_) => Action::AwardCurrency,
            ActionPayload::WarpToRandomPortal(_) => Action::WarpToRandomPortal,
            ActionPayload::WarpToPortal(_) => Action::WarpToPortal,
            ActionPayload::DestroyAsset(_) => Action::DestroyAsset,
            ActionPayload::ChangeJob(_) => Action::ChangeJob,
            ActionPayload::CreateSkill(_) => Action::CreateSkill,
            ActionPayload::UpdateSkill(_) => Action::UpdateSkill,
            ActionPayload::ApplyConsumableEffect(_) => Action::ApplyConsumableEffect,
        }
    }

    /// Decode the payload chosen by `action`
    pub fn from_parts(action: Action, payload: serde_json::Value) -> Result<Self, SagaError> {
        fn decode<T: serde::de::DeserializeOwned>(
            action: Action,
            payload: serde_json::Value,
        ) -> Result<T, SagaError> {
            serde_json::from_value(payload).map_err(|err| SagaError::InvalidPayload {
                action,
                reason: err.to_string(),
            })
        }

        Ok(match action {
            Action::AwardAsset => ActionPayload::AwardAsset(decode(action, payload)?),
            Action::AwardExperience => ActionPayload::AwardExperience(decode(action, payload)?),
            Action::AwardLevel => ActionPayload::AwardLevel(decode(action, payload)?),
            Action::AwardMesos => ActionPayload::AwardMesos(decode(action, payload)?),
            Action::AwardCurrency => ActionPayload::AwardCurrency(decode(action, payload)?),
            Action::WarpToRandomPortal => {
                ActionPayload::WarpToRandomPortal(decode(action, payload)?)
            }
            Action::WarpToPortal => ActionPayload::WarpToPortal(decode(action, payload)?),
            Action::DestroyAsset => ActionPayload::DestroyAsset(decode(action, payload)?),
            Action::ChangeJob => ActionPayload::ChangeJob(decode(action, payload)?),
            Action::CreateSkill => ActionPayload::CreateSkill(decode(action, payload)?),
            Action::UpdateSkill => ActionPayload::UpdateSkill(decode(action, payload)?),
            Action::ApplyConsumableEffect => {
                ActionPayload::ApplyConsumableEffect(decode(action, payload)?)
            }
        })
    }

    /// The payload alone as JSON
    pub fn to_value(&self) -> serde_json::Value {
        let value = match self {
            ActionPayload::AwardAsset(p) => serde_json::to_value(p),
            ActionPayload::AwardExperience(p) => serde_json::to_value(p),
            ActionPayload::AwardLevel(p) => serde_json::to_value(p),
            ActionPayload::AwardMesos(p) => serde_json::to_value(p),
            ActionPayload::AwardCurrency(p) => serde_json::to_value(p),
            ActionPayload::WarpToRandomPortal(p) => serde_json::to_value(p),
            ActionPayload::WarpToPortal(p) => serde_json::to_value(p),
            ActionPayload::DestroyAsset(p) => serde_json::to_value(p),
            ActionPayload::ChangeJob(p) => serde_json::to_value(p),
            ActionPayload::CreateSkill(p) | ActionPayload::UpdateSkill(p) => {
                serde_json::to_value(p)
            }
            ActionPayload::ApplyConsumableEffect(p) => serde_json::to_value(p),
        };
        // Plain structs of numbers, strings and timestamps always serialize.
        value.unwrap_or(serde_json::Value::Null)
    }

    /// The action that reverses this one
    pub fn inverse(&self) -> Inverse {
        match self {
            ActionPayload::AwardAsset(p) => {
                Inverse::Dispatch(ActionPayload::DestroyAsset(DestroyAssetPayload {
                    character_id: p.character_id,
                    template_id: p.item.template_id,
                    quantity: p.item.quantity,
                    remove_all: false,
                }))
            }
            ActionPayload::DestroyAsset(p) if p.remove_all => {
                Inverse::Skip("destroyed quantity unknown")
            }
            ActionPayload::DestroyAsset(p) => {
                Inverse::Dispatch(ActionPayload::AwardAsset(AwardAssetPayload {
                    character_id: p.character_id,
                    item: ItemPayload {
                        template_id: p.template_id,
                        quantity: p.quantity,
                        period: 0,
                        expiration: None,
                    },
                }))
            }
            ActionPayload::AwardExperience(p) => {
                let mut inverse = p.clone();
                for d in &mut inverse.distributions {
                    d.amount = -d.amount;
                }
                Inverse::Dispatch(ActionPayload::AwardExperience(inverse))
            }
            ActionPayload::AwardMesos(p) => {
                Inverse::Dispatch(ActionPayload::AwardMesos(AwardMesosPayload {
                    amount: p.amount.saturating_neg(),
                    ..p.clone()
                }))
            }
            ActionPayload::AwardCurrency(p) => {
                Inverse::Dispatch(ActionPayload::AwardCurrency(AwardCurrencyPayload {
                    amount: p.amount.saturating_neg(),
                    ..p.clone()
                }))
            }
            ActionPayload::AwardLevel(p) => match p.previous_level {
                Some(_) => Inverse::Dispatch(ActionPayload::AwardLevel(AwardLevelPayload {
                    amount: p.amount.saturating_neg(),
                    ..p.clone()
                })),
                None => Inverse::Skip("previous level unknown"),
            },
            ActionPayload::ChangeJob(p) => match p.previous_job_id {
                Some(previous) => Inverse::Dispatch(ActionPayload::ChangeJob(ChangeJobPayload {
                    job_id: previous,
                    previous_job_id: Some(p.job_id),
                    ..p.clone()
                })),
                None => Inverse::Skip("previous job unknown"),
            },
            ActionPayload::CreateSkill(p) | ActionPayload::UpdateSkill(p) => match p.previous {
                Some(previous) => Inverse::Dispatch(ActionPayload::UpdateSkill(SkillPayload {
                    character_id: p.character_id,
                    skill_id: p.skill_id,
                    levels: previous,
                    previous: Some(p.levels),
                })),
                None => Inverse::Skip("previous skill levels unknown"),
            },
            ActionPayload::WarpToRandomPortal(_) | ActionPayload::WarpToPortal(_) => {
                Inverse::Skip("warps are not reversed")
            }
            ActionPayload::ApplyConsumableEffect(_) => {
                Inverse::Skip("consumable effects are not reversed")
            }
        }
    }
}

/// One ordered unit of work in a saga
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StepRecord", into = "StepRecord")]
pub struct Step {
    /// Unique within the saga
    pub id: String,
    /// Progress
    pub status: StepStatus,
    /// What to do
    pub payload: ActionPayload,
    /// When the step was built
    pub created_at: DateTime<Utc>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
}

impl Step {
    /// A pending step
    pub fn new(id: impl Into<String>, payload: ActionPayload, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            status: StepStatus::Pending,
            payload,
            created_at: now,
            updated_at: now,
        }
    }

    /// The step's action tag
    pub fn action(&self) -> Action {
        self.payload.action()
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StepRecord {
    step_id: String,
    status: StepStatus,
    action: String,
    payload: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<StepRecord> for Step {
    type Error = SagaError;

    fn try_from(record: StepRecord) -> Result<Self, Self::Error> {
        let action = Action::from_str(&record.action)?;
        Ok(Step {
            id: record.step_id,
            status: record.status,
            payload: ActionPayload::from_parts(action, record.payload)?,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}

impl From<Step> for StepRecord {
    fn from(step: Step) -> Self {
        StepRecord {
            action: step.action().as_str().to_string(),
            payload: step.payload.to_value(),
            step_id: step.id,
            status: step.status,
            created_at: step.created_at,
            updated_at: step.updated_at,
        }
    }
}

/// A multi-step cross-service workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Saga {
    /// Identity and bus partition key
    pub transaction_id: Uuid,
    /// Workflow family
    pub saga_type: SagaType,
    /// Human readable origin
    pub initiated_by: String,
    /// Lifecycle
    pub status: SagaStatus,
    /// Ordered steps
    pub steps: Vec<Step>,
    /// Optimistic concurrency version; 0 until first stored
    #[serde(default)]
    pub version: u64,
    /// When the saga was built
    pub created_at: DateTime<Utc>,
    /// Last persisted change
    pub updated_at: DateTime<Utc>,
}

impl Saga {
    /// Start building a saga
    pub fn builder() -> SagaBuilder {
        SagaBuilder::default()
    }

    /// Whether any step has failed
    pub fn failing(&self) -> bool {
        self.steps.iter().any(|s| s.status == StepStatus::Failed)
    }

    /// First pending step, `None` once every step has reported
    pub fn current_step(&self) -> Option<&Step> {
        self.steps.iter().find(|s| s.status == StepStatus::Pending)
    }

    /// Index of the last completed step
    pub fn furthest_completed_index(&self) -> Option<usize> {
        self.steps.iter().rposition(|s| s.status == StepStatus::Completed)
    }

    /// Index of the first pending step
    pub fn earliest_pending_index(&self) -> Option<usize> {
        self.steps.iter().position(|s| s.status == StepStatus::Pending)
    }

    /// Index of the first failed step
    pub fn failed_step_index(&self) -> Option<usize> {
        self.steps.iter().position(|s| s.status == StepStatus::Failed)
    }

    /// Every step completed
    pub fn all_completed(&self) -> bool {
        self.steps.iter().all(|s| s.status == StepStatus::Completed)
    }

    /// Step by id
    pub fn step(&self, step_id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    /// Set a step's status; returns `false` when it already had it
    pub fn set_step_status(
        &mut self,
        step_id: &str,
        status: StepStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, SagaError> {
        let step = self
            .steps
            .iter_mut()
            .find(|s| s.id == step_id)
            .ok_or_else(|| SagaError::StepNotFound(step_id.to_string()))?;
        if step.status == status {
            return Ok(false);
        }
        if !step.status.can_become(status) {
            return Err(SagaError::IllegalTransition {
                step: step_id.to_string(),
                from: step.status,
                to: status,
            });
        }
        step.status = status;
        step.updated_at = now;
        self.updated_at = now;
        Ok(true)
    }

    /// Completed steps before the first failure, latest first
    pub fn compensation_plan(&self) -> Vec<&Step> {
        let Some(failed) = self.failed_step_index() else {
            return Vec::new();
        };
        self.steps[..failed]
            .iter()
            .rev()
            .filter(|s| s.status == StepStatus::Completed)
            .collect()
    }
}

/// Validating builder for [`Saga`]
#[derive(Debug, Default)]
pub struct SagaBuilder {
    transaction_id: Option<Uuid>,
    saga_type: Option<SagaType>,
    initiated_by: String,
    steps: Vec<(String, ActionPayload)>,
    now: Option<DateTime<Utc>>,
}

impl SagaBuilder {
    /// Use a caller supplied transaction id instead of a fresh one
    pub fn transaction_id(mut self, transaction_id: Uuid) -> Self {
        self.transaction_id = Some(transaction_id);
        self
    }

    /// Workflow family
    pub fn saga_type(mut self, saga_type: SagaType) -> Self {
        self.saga_type = Some(saga_type);
        self
    }

    /// Origin label
    pub fn initiated_by(mut self, initiated_by: impl Into<String>) -> Self {
        self.initiated_by = initiated_by.into();
        self
    }

    /// Append a step
    pub fn step(mut self, step_id: impl Into<String>, payload: ActionPayload) -> Self {
        self.steps.push((step_id.into(), payload));
        self
    }

    /// Creation time, defaults to now
    pub fn created_at(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    /// Validate and build an active saga
    pub fn build(self) -> Result<Saga, SagaError> {
        let saga_type = self.saga_type.ok_or(SagaError::MissingField("sagaType"))?;
        if self.initiated_by.trim().is_empty() {
            return Err(SagaError::MissingField("initiatedBy"));
        }
        if self.steps.is_empty() {
            return Err(SagaError::NoSteps);
        }
        let now = self.now.unwrap_or_else(Utc::now);
        let mut seen = HashSet::new();
        let mut steps = Vec::with_capacity(self.steps.len());
        for (id, payload) in self.steps {
            if id.trim().is_empty() {
                return Err(SagaError::MissingField("stepId"));
            }
            if !seen.insert(id.clone()) {
                return Err(SagaError::DuplicateStep(id));
            }
            steps.push(Step::new(id, payload, now));
        }
        Ok(Saga {
            transaction_id: self.transaction_id.unwrap_or_else(Uuid::new_v4),
            saga_type,
            initiated_by: self.initiated_by,
            status: SagaStatus::Active,
            steps,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    // `pretty_assertions::assert_eq` omitted: conflicts with the `assert_eq!` emitted by `test_case` (E0659).
    use serde_json::json;
    use test_case::test_case;

    #[test]
    fn test_builder_validation() {
        assert_eq!(
            Saga::builder().initiated_by("x").step("a", award_mesos(1)).build().unwrap_err(),
            SagaError::MissingField("sagaType")
        );
        assert_eq!(
            Saga::builder()
                .saga_type(SagaType::QuestReward)
                .initiated_by("  ")
                .step("a", award_mesos(1))
                .build()
                .unwrap_err(),
            SagaError::MissingField("initiatedBy")
        );
        assert_eq!(
            Saga::builder()
                .saga_type(SagaType::QuestReward)
                .initiated_by("x")
                .build()
                .unwrap_err(),
            SagaError::NoSteps
        );
        assert_eq!(
            Saga::builder()
                .saga_type(SagaType::QuestReward)
                .initiated_by("x")
                .step("a", award_mesos(1))
                .step("a", award_mesos(2))
                .build()
                .unwrap_err(),
            SagaError::DuplicateStep("a".to_string())
        );
    }

    #[test]
    fn test_predicates() {
        let mut saga = quest_reward();
        let now = Utc::now();
        assert!(!saga.failing());
        assert_eq!(saga.current_step().map(|s| s.id.as_str()), Some("experience"));
        assert_eq!(saga.furthest_completed_index(), None);
        assert_eq!(saga.earliest_pending_index(), Some(0));

        saga.set_step_status("experience", StepStatus::Completed, now).unwrap();
        saga.set_step_status("mesos", StepStatus::Completed, now).unwrap();
        assert_eq!(saga.furthest_completed_index(), Some(1));
        assert_eq!(saga.earliest_pending_index(), Some(2));

        saga.set_step_status("asset", StepStatus::Failed, now).unwrap();
        assert!(saga.failing());
        assert!(saga.current_step().is_none());
        let plan: Vec<_> = saga.compensation_plan().iter().map(|s| s.id.clone()).collect();
        assert_eq!(plan, vec!["mesos", "experience"]);
    }

    #[test_case(StepStatus::Pending, StepStatus::Completed => true)]
    #[test_case(StepStatus::Pending, StepStatus::Failed => true)]
    #[test_case(StepStatus::Completed, StepStatus::Completed => true)]
    #[test_case(StepStatus::Completed, StepStatus::Pending => false)]
    #[test_case(StepStatus::Completed, StepStatus::Failed => false)]
    #[test_case(StepStatus::Failed, StepStatus::Completed => false)]
    fn test_status_is_monotonic(from: StepStatus, to: StepStatus) -> bool {
        from.can_become(to)
    }

    #[test]
    fn test_duplicate_status_is_noop_and_regression_is_rejected() {
        let mut saga = quest_reward();
        let now = Utc::now();
        assert!(saga.set_step_status("experience", StepStatus::Completed, now).unwrap());
        assert!(!saga.set_step_status("experience", StepStatus::Completed, now).unwrap());
        assert!(matches!(
            saga.set_step_status("experience", StepStatus::Failed, now),
            Err(SagaError::IllegalTransition { .. })
        ));
        assert_eq!(
            saga.set_step_status("nope", StepStatus::Failed, now),
            Err(SagaError::StepNotFound("nope".to_string()))
        );
    }

    #[test]
    fn test_inverse_table() {
        assert_eq!(award_mesos(1000).inverse(), Inverse::Dispatch(award_mesos(-1000)));
        assert_eq!(award_experience(500).inverse(), Inverse::Dispatch(award_experience(-500)));
        assert_eq!(
            award_asset(2000000, 5).inverse(),
            Inverse::Dispatch(ActionPayload::DestroyAsset(DestroyAssetPayload {
                character_id: 1,
                template_id: 2000000,
                quantity: 5,
                remove_all: false,
            }))
        );

        let warp = ActionPayload::WarpToRandomPortal(WarpToRandomPortalPayload {
            character_id: 1,
            field: Field::new(0, 1, 100000000),
        });
        assert!(matches!(warp.inverse(), Inverse::Skip(_)));

        let job = ChangeJobPayload {
            character_id: 1,
            world_id: 0,
            channel_id: 1,
            job_id: 100,
            previous_job_id: None,
        };
        assert!(matches!(ActionPayload::ChangeJob(job.clone()).inverse(), Inverse::Skip(_)));
        let job = ChangeJobPayload {
            previous_job_id: Some(0),
            ..job
        };
        match ActionPayload::ChangeJob(job).inverse() {
            Inverse::Dispatch(ActionPayload::ChangeJob(p)) => {
                assert_eq!((p.job_id, p.previous_job_id), (0, Some(100)))
            }
            other => panic!("unexpected inverse {other:?}"),
        }
    }

    #[test]
    fn test_step_wire_format() {
        let saga = quest_reward();
        let value = serde_json::to_value(&saga.steps[1]).unwrap();
        assert_eq!(value["stepId"], json!("mesos"));
        assert_eq!(value["action"], json!("award_mesos"));
        assert_eq!(value["payload"]["amount"], json!(1000));
        assert_eq!(value["status"], json!("pending"));

        let decoded: Saga = serde_json::from_value(serde_json::to_value(&saga).unwrap()).unwrap();
        assert_eq!(decoded, saga);
    }

    #[test]
    fn test_unknown_action_is_rejected() {
        let step = json!({
            "stepId": "x",
            "status": "pending",
            "action": "summon_dragon",
            "payload": {},
            "createdAt": "2025-01-01T00:00:00Z",
            "updatedAt": "2025-01-01T00:00:00Z"
        });
        let err = serde_json::from_value::<Step>(step).unwrap_err();
        assert!(err.to_string().contains("unknown action summon_dragon"));
    }

    #[test]
    fn test_mismatched_payload_is_rejected() {
        let err =
            ActionPayload::from_parts(Action::AwardMesos, json!({"templateId": 1})).unwrap_err();
        assert!(matches!(err, SagaError::InvalidPayload { action: Action::AwardMesos, .. }));
    }

    #[test]
    fn test_saga_error_maps_to_domain_category() {
        use crate::errors::ErrorCategory;
        let stale: DomainError = SagaError::StaleVersion {
            transaction_id: Uuid::nil(),
            expected: 1,
            actual: 2,
        }
        .into();
        assert_eq!(stale.category(), ErrorCategory::Conflict);
        let missing: DomainError = SagaError::NoSteps.into();
        assert_eq!(missing.category(), ErrorCategory::Validation);
    }
}
