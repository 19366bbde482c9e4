// Copyright 2025 Cowboy AI, LLC.

//! Stored assets and their reference data
//!
//! An asset row names an item template and a reference into whichever
//! service owns the item's variant data. The [`ReferenceType`] follows from
//! the template's inventory type plus the presence of a cash or pet id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::errors::{DomainError, DomainResult};

/// Inventory tab an item template belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum InventoryType {
    /// Wearable equipment
    Equip = 1,
    /// Consumables
    Use = 2,
    /// Chairs and other setup items
    Setup = 3,
    /// Quest and crafting items
    Etc = 4,
    /// Cash shop items
    Cash = 5,
}

impl InventoryType {
    /// Inventory type of `template_id`, which is encoded in its millions digit
    pub fn from_template(template_id: u32) -> Option<Self> {
        u8::try_from(template_id / 1_000_000)
            .ok()
            .and_then(|t| Self::try_from(t).ok())
    }

    /// Whether items of this type stack
    pub fn is_stackable(self) -> bool {
        matches!(self, InventoryType::Use | InventoryType::Setup | InventoryType::Etc)
    }
}

impl From<InventoryType> for u8 {
    fn from(value: InventoryType) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for InventoryType {
    type Error = DomainError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(InventoryType::Equip),
            2 => Ok(InventoryType::Use),
            3 => Ok(InventoryType::Setup),
            4 => Ok(InventoryType::Etc),
            5 => Ok(InventoryType::Cash),
            other => Err(DomainError::validation(format!("unknown inventory type {other}"))),
        }
    }
}

/// Which variant data an asset references
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReferenceType {
    /// Equipment with stats
    Equipable,
    /// Equipment bought in the cash shop
    CashEquipable,
    /// Stack of consumables
    Consumable,
    /// Stack of setup items
    Setup,
    /// Stack of etc items
    Etc,
    /// Cash item stack
    Cash,
    /// Pet
    Pet,
}

impl ReferenceType {
    /// Reference type for a template, given the optional cash and pet ids
    pub fn select(
        template_id: u32,
        cash_id: Option<i64>,
        pet_id: Option<u32>,
    ) -> DomainResult<Self> {
        let inventory_type = InventoryType::from_template(template_id)
            .ok_or_else(|| {
                DomainError::validation(format!("template {template_id} has no inventory type"))
            })?;
        Ok(match inventory_type {
            InventoryType::Equip if cash_id.is_some_and(|id| id != 0) => {
                ReferenceType::CashEquipable
            }
            InventoryType::Equip => ReferenceType::Equipable,
            InventoryType::Use => ReferenceType::Consumable,
            InventoryType::Setup => ReferenceType::Setup,
            InventoryType::Etc => ReferenceType::Etc,
            InventoryType::Cash if pet_id.is_some_and(|id| id != 0) => ReferenceType::Pet,
            InventoryType::Cash => ReferenceType::Cash,
        })
    }

    /// Variants whose data is a plain stack
    pub fn is_stackable(self) -> bool {
        matches!(self, ReferenceType::Consumable | ReferenceType::Setup | ReferenceType::Etc)
    }
}

impl fmt::Display for ReferenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReferenceType::Equipable => "equipable",
            ReferenceType::CashEquipable => "cashEquipable",
            ReferenceType::Consumable => "consumable",
            ReferenceType::Setup => "setup",
            ReferenceType::Etc => "etc",
            ReferenceType::Cash => "cash",
            ReferenceType::Pet => "pet",
        };
        f.write_str(name)
    }
}

/// Equipment statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EquipableData {
    /// Strength bonus
    pub strength: u16,
    /// Dexterity bonus
    pub dexterity: u16,
    /// Intelligence bonus
    pub intelligence: u16,
    /// Luck bonus
    pub luck: u16,
    /// HP bonus
    pub hp: u16,
    /// MP bonus
    pub mp: u16,
    /// Weapon attack
    pub weapon_attack: u16,
    /// Magic attack
    pub magic_attack: u16,
    /// Weapon defense
    pub weapon_defense: u16,
    /// Magic defense
    pub magic_defense: u16,
    /// Accuracy
    pub accuracy: u16,
    /// Avoidability
    pub avoidability: u16,
    /// Hands
    pub hands: u16,
    /// Speed
    pub speed: u16,
    /// Jump
    pub jump: u16,
    /// Remaining upgrade slots
    pub slots: u16,
    /// Item level
    pub level: u8,
    /// Item experience
    pub experience: u32,
    /// Vicious hammers used
    pub hammers_applied: u32,
}

/// Stackable item data
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackableData {
    /// Stack size
    pub quantity: u32,
    /// Character the stack is bound to, 0 when unbound
    #[serde(default)]
    pub owner_id: u32,
    /// Lock, karma and trade flags
    #[serde(default)]
    pub flag: u16,
}

/// Cash shop purchase data
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashData {
    /// Cash serial number
    pub cash_id: i64,
    /// Stack size
    #[serde(default = "one")]
    pub quantity: u32,
    /// Commodity bought
    #[serde(default)]
    pub commodity_id: u32,
    /// Account that paid
    #[serde(default)]
    pub purchase_by: u32,
}

fn one() -> u32 {
    1
}

/// Pet state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PetData {
    /// Pet id in the pet service
    pub pet_id: u32,
    /// Name
    pub name: String,
    /// Level
    pub level: u8,
    /// Closeness
    pub closeness: u16,
    /// Fullness
    pub fullness: u8,
}

/// Variant payload attached by the decorator pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "referenceType", rename_all = "camelCase")]
pub enum ReferenceData {
    /// Equipment stats
    Equipable(EquipableData),
    /// Cash equipment
    CashEquipable(CashData),
    /// Consumable stack
    Consumable(StackableData),
    /// Setup stack
    Setup(StackableData),
    /// Etc stack
    Etc(StackableData),
    /// Cash item
    Cash(CashData),
    /// Pet
    Pet(PetData),
}

impl ReferenceData {
    /// Variant tag
    pub fn reference_type(&self) -> ReferenceType {
        match self {
            ReferenceData::Equipable(_) => ReferenceType::Equipable,
            ReferenceData::CashEquipable(_) => ReferenceType::CashEquipable,
            ReferenceData::Consumable(_) => ReferenceType::Consumable,
            ReferenceData::Setup(_) => ReferenceType::Setup,
            ReferenceData::Etc(_) => ReferenceType::Etc,
            ReferenceData::Cash(_) => ReferenceType::Cash,
            ReferenceData::Pet(_) => ReferenceType::Pet,
        }
    }

    fn quantity(&self) -> Option<u32> {
        match self {
            ReferenceData::Consumable(s) | ReferenceData::Setup(s) | ReferenceData::Etc(s) => {
                Some(s.quantity)
            }
            ReferenceData::Cash(c) => Some(c.quantity),
            _ => None,
        }
    }
}

/// An item held in account storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    /// Asset id
    pub id: u32,
    /// Owning storage
    pub storage_id: Uuid,
    /// Display slot, assigned at read time
    pub slot: i16,
    /// Item template
    pub template_id: u32,
    /// Expiry, `None` for permanent items
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
    /// Id within the service owning the variant data
    pub reference_id: u32,
    /// Variant tag
    pub reference_type: ReferenceType,
    /// Variant data, once decorated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_data: Option<ReferenceData>,
}

impl Asset {
    /// Inventory tab, derived from the template
    pub fn inventory_type(&self) -> Option<InventoryType> {
        InventoryType::from_template(self.template_id)
    }

    /// Whether the asset is a plain stack
    pub fn is_stackable(&self) -> bool {
        self.reference_type.is_stackable()
    }

    /// Whether the asset carries a quantity
    pub fn has_quantity(&self) -> bool {
        self.is_stackable() || self.reference_type == ReferenceType::Cash
    }

    /// Stack size; 1 for anything without a quantity
    pub fn quantity(&self) -> u32 {
        if !self.has_quantity() {
            return 1;
        }
        self.reference_data
            .as_ref()
            .and_then(ReferenceData::quantity)
            .unwrap_or(1)
    }

    /// Replace the stack size of a stackable asset
    pub(crate) fn set_quantity(&mut self, quantity: u32) {
        match self.reference_data.as_mut() {
            Some(
                ReferenceData::Consumable(s) | ReferenceData::Setup(s) | ReferenceData::Etc(s),
            ) => s.quantity = quantity,
            Some(ReferenceData::Cash(c)) => c.quantity = quantity,
            _ => {}
        }
    }
}

/// Order assets by `(inventory type, template id)` and number them from 0
/// within each inventory type
pub fn assign_slots(assets: &mut [Asset]) {
    assets.sort_by_key(|a| (a.inventory_type(), a.template_id, a.id));
    let mut current = None;
    let mut next = 0i16;
    for asset in assets.iter_mut() {
        let inventory_type = asset.inventory_type();
        if current != Some(inventory_type) {
            current = Some(inventory_type);
            next = 0;
        }
        asset.slot = next;
        next = next.saturating_add(1);
    }
}

/// Largest stack arranging builds
pub const DEFAULT_SLOT_MAX: u32 = 100;

/// Stars and bullets, which refill instead of stacking
fn is_rechargeable(template_id: u32) -> bool {
    matches!(template_id / 10_000, 207 | 233)
}

/// Result of merging the stacks of one storage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergePlan {
    /// Surviving stacks and their new quantity
    pub updates: Vec<(u32, u32)>,
    /// Stacks emptied by the merge
    pub removed: Vec<u32>,
}

/// Plan merging stackable assets of the same template, owner and flag
///
/// Quantities are refilled up to `slot_max` into the oldest assets of each
/// group and the remaining assets are emptied. Rechargeable items and
/// anything without a plain stack are left alone.
pub fn merge_stacks(assets: &[Asset], slot_max: u32) -> MergePlan {
    let slot_max = slot_max.max(1);
    let mut groups: BTreeMap<(u32, u32, u16), Vec<(u32, u32)>> = BTreeMap::new();
    for asset in assets {
        let stack = match &asset.reference_data {
            Some(
                ReferenceData::Consumable(s) | ReferenceData::Setup(s) | ReferenceData::Etc(s),
            ) => s,
            _ => continue,
        };
        if is_rechargeable(asset.template_id) {
            continue;
        }
        groups
            .entry((asset.template_id, stack.owner_id, stack.flag))
            .or_default()
            .push((asset.id, stack.quantity));
    }

    let mut plan = MergePlan::default();
    for mut group in groups.into_values().filter(|g| g.len() > 1) {
        group.sort_unstable();
        let mut remaining: u64 = group.iter().map(|(_, q)| u64::from(*q)).sum();
        for (id, quantity) in group {
            if remaining == 0 {
                plan.removed.push(id);
                continue;
            }
            let refill = remaining.min(u64::from(slot_max)) as u32;
            remaining -= u64::from(refill);
            if refill != quantity {
                plan.updates.push((id, refill));
            }
        }
    }
    plan
}

/// Builder for a new asset; picks the reference type from the template
#[derive(Debug, Clone, Default)]
pub struct AssetBuilder {
    template_id: u32,
    expiration: Option<DateTime<Utc>>,
    reference_id: u32,
    cash_id: Option<i64>,
    pet_id: Option<u32>,
    reference_data: Option<ReferenceData>,
}

impl AssetBuilder {
    /// Asset of `template_id`
    pub fn new(template_id: u32) -> Self {
        Self {
            template_id,
            ..Self::default()
        }
    }

    /// Expiry
    pub fn expiration(mut self, expiration: Option<DateTime<Utc>>) -> Self {
        self.expiration = expiration;
        self
    }

    /// Reference into the owning service
    pub fn reference_id(mut self, reference_id: u32) -> Self {
        self.reference_id = reference_id;
        self
    }

    /// Cash serial, marks equipment as cash equipment
    pub fn cash_id(mut self, cash_id: i64) -> Self {
        self.cash_id = Some(cash_id);
        self
    }

    /// Pet id, marks a cash item as a pet
    pub fn pet_id(mut self, pet_id: u32) -> Self {
        self.pet_id = Some(pet_id);
        self
    }

    /// Variant data known at creation, typically a stack
    pub fn reference_data(mut self, data: ReferenceData) -> Self {
        self.reference_data = Some(data);
        self
    }

    /// Reference type this builder resolves to
    pub fn reference_type(&self) -> DomainResult<ReferenceType> {
        ReferenceType::select(self.template_id, self.cash_id, self.pet_id)
    }

    /// Template
    pub fn template_id(&self) -> u32 {
        self.template_id
    }

    /// Validate and build with the given ids
    pub fn build(self, id: u32, storage_id: Uuid) -> DomainResult<Asset> {
        let reference_type = self.reference_type()?;
        if let Some(data) = &self.reference_data {
            if data.reference_type() != reference_type {
                return Err(DomainError::validation(format!(
                    "{} data supplied for a {reference_type} asset",
                    data.reference_type()
                )));
            }
        }
        let reference_data = match self.reference_data {
            None if reference_type.is_stackable() => {
                return Err(DomainError::validation("stackable asset needs a quantity"))
            }
            other => other,
        };
        Ok(Asset {
            id,
            storage_id,
            slot: 0,
            template_id: self.template_id,
            expiration: self.expiration,
            reference_id: self.reference_id,
            reference_type,
            reference_data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    // `pretty_assertions::assert_eq` omitted: conflicts with the `assert_eq!` emitted by `test_case` (E0659).
    use test_case::test_case;

    #[test_case(1302000, None, None => ReferenceType::Equipable ; "equip")]
    #[test_case(1702000, Some(77), None => ReferenceType::CashEquipable ; "cash equip")]
    #[test_case(1302000, Some(0), None => ReferenceType::Equipable ; "zero cash id")]
    #[test_case(2000000, None, None => ReferenceType::Consumable ; "use")]
    #[test_case(3010000, None, None => ReferenceType::Setup ; "setup")]
    #[test_case(4000000, None, None => ReferenceType::Etc ; "etc")]
    #[test_case(5000000, None, Some(9) => ReferenceType::Pet ; "pet")]
    #[test_case(5211000, None, None => ReferenceType::Cash ; "cash")]
    fn test_reference_type_selection(
        template: u32,
        cash: Option<i64>,
        pet: Option<u32>,
    ) -> ReferenceType {
        ReferenceType::select(template, cash, pet).unwrap()
    }

    #[test]
    fn test_unknown_inventory_type_is_rejected() {
        assert!(ReferenceType::select(9000000, None, None).is_err());
        assert_eq!(InventoryType::from_template(999), None);
    }

    fn stack(id: u32, template_id: u32, quantity: u32) -> Asset {
        let stack = StackableData {
            quantity,
            ..Default::default()
        };
        let data = match InventoryType::from_template(template_id) {
            Some(InventoryType::Setup) => ReferenceData::Setup(stack),
            Some(InventoryType::Etc) => ReferenceData::Etc(stack),
            _ => ReferenceData::Consumable(stack),
        };
        AssetBuilder::new(template_id)
            .reference_data(data)
            .build(id, Uuid::nil())
            .unwrap()
    }

    #[test]
    fn test_slots_are_ordered_per_inventory_type() {
        let equip = AssetBuilder::new(1302000).build(5, Uuid::nil()).unwrap();
        let mut assets = vec![
            stack(1, 4000001, 1),
            stack(2, 2000002, 3),
            equip,
            stack(3, 2000001, 1),
            stack(4, 4000000, 1),
        ];
        assign_slots(&mut assets);
        let order: Vec<_> = assets.iter().map(|a| (a.id, a.slot)).collect();
        assert_eq!(order, vec![(5, 0), (3, 0), (2, 1), (4, 0), (1, 1)]);
    }

    #[test]
    fn test_quantity() {
        assert_eq!(stack(1, 2000000, 40).quantity(), 40);
        assert_eq!(AssetBuilder::new(1302000).build(1, Uuid::nil()).unwrap().quantity(), 1);
    }

    #[test]
    fn test_builder_checks_data_variant() {
        let err = AssetBuilder::new(1302000)
            .reference_data(ReferenceData::Etc(StackableData::default()))
            .build(1, Uuid::nil())
            .unwrap_err();
        assert!(err.is_validation_error());
        assert!(AssetBuilder::new(2000000).build(1, Uuid::nil()).is_err());
    }

    #[test]
    fn test_reference_data_is_tagged() {
        let data = ReferenceData::Consumable(StackableData {
            quantity: 5,
            owner_id: 0,
            flag: 0,
        });
        let value = serde_json::to_value(&data).unwrap();
        assert_eq!(value["referenceType"], "consumable");
        assert_eq!(value["quantity"], 5);
    }

    #[test]
    fn test_merge_refills_oldest_stacks() {
        let mut bound = stack(4, 2000000, 5);
        if let Some(ReferenceData::Consumable(s)) = bound.reference_data.as_mut() {
            s.owner_id = 9;
        }
        let assets = vec![
            stack(3, 2000000, 70),
            stack(1, 2000000, 60),
            stack(2, 2000000, 30),
            bound,
            stack(5, 2070000, 10),
            stack(6, 2070000, 10),
            stack(7, 4000000, 1),
        ];

        let plan = merge_stacks(&assets, DEFAULT_SLOT_MAX);
        assert_eq!(plan.updates, vec![(1, 100), (2, 60)]);
        assert_eq!(plan.removed, vec![3]);
    }

    #[test]
    fn test_merge_leaves_single_stacks_alone() {
        let assets = vec![stack(1, 2000000, 120), stack(2, 4000000, 3)];
        assert_eq!(merge_stacks(&assets, DEFAULT_SLOT_MAX), MergePlan::default());
    }
}
