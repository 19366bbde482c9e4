// Copyright 2025 Cowboy AI, LLC.

//! Per-tenant configuration
//!
//! Tenants are provisioned outside this service. The server keeps the
//! latest snapshot of each one in a [`TenantConfigStore`]; a refresh
//! replaces a tenant's snapshot wholesale.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;
use uuid::Uuid;

use crate::errors::{DomainError, DomainResult};
use crate::field::WorldId;
use crate::sweeper::TenantSource;
use crate::tenant::Tenant;

/// Kinds of rate multiplier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RateType {
    /// Experience from monsters
    Exp,
    /// Mesos dropped
    Meso,
    /// Item drop chance
    ItemDrop,
    /// Experience from quests
    QuestExp,
}

fn unit_rate() -> f64 {
    1.0
}

/// Rate multipliers of a world
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rates {
    /// Experience multiplier
    #[serde(default = "unit_rate")]
    pub exp: f64,
    /// Meso multiplier
    #[serde(default = "unit_rate")]
    pub meso: f64,
    /// Drop multiplier
    #[serde(default = "unit_rate", alias = "drop")]
    pub item_drop: f64,
    /// Quest experience multiplier
    #[serde(default = "unit_rate")]
    pub quest_exp: f64,
}

impl Default for Rates {
    fn default() -> Self {
        Self {
            exp: 1.0,
            meso: 1.0,
            item_drop: 1.0,
            quest_exp: 1.0,
        }
    }
}

impl Rates {
    /// Multiplier for `rate_type`
    pub fn get(&self, rate_type: RateType) -> f64 {
        match rate_type {
            RateType::Exp => self.exp,
            RateType::Meso => self.meso,
            RateType::ItemDrop => self.item_drop,
            RateType::QuestExp => self.quest_exp,
        }
    }
}

/// Metadata of one world
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WorldConfig {
    /// World id
    pub id: WorldId,
    /// Display name
    pub name: String,
    /// Event flag shown in the world list
    pub flag: String,
    /// Scrolling server message
    pub server_message: String,
    /// Event message
    pub event_message: String,
    /// Recommendation text; empty means not recommended
    pub recommendation_message: String,
    /// Rate multipliers
    pub rates: Rates,
}

impl WorldConfig {
    /// Whether the world is listed as recommended
    pub fn recommended(&self) -> bool {
        !self.recommendation_message.is_empty()
    }
}

/// Configuration of one tenant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantConfig {
    /// Tenant id
    pub id: Uuid,
    /// Service region
    pub region: String,
    /// Client major version
    pub major: u16,
    /// Client minor version
    pub minor: u16,
    /// Worlds of the tenant
    #[serde(default, alias = "world")]
    pub worlds: Vec<WorldConfig>,
}

impl TenantConfig {
    /// The tenant this configuration describes
    pub fn tenant(&self) -> DomainResult<Tenant> {
        Tenant::new(self.id, self.region.clone(), self.major, self.minor)
    }
}

/// Current configuration snapshot per tenant
#[derive(Debug, Default)]
pub struct TenantConfigStore {
    configs: RwLock<BTreeMap<Uuid, TenantConfig>>,
}

impl TenantConfigStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with `configs`
    pub fn from_configs(configs: Vec<TenantConfig>) -> DomainResult<Self> {
        let store = Self::new();
        for config in configs {
            store.replace(config)?;
        }
        Ok(store)
    }

    /// Snapshot for `tenant_id`
    pub fn get(&self, tenant_id: Uuid) -> DomainResult<TenantConfig> {
        self.configs
            .read()
            .get(&tenant_id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("tenant configuration", tenant_id))
    }

    /// Install a new snapshot, replacing any previous one
    pub fn replace(&self, config: TenantConfig) -> DomainResult<()> {
        let tenant = config.tenant()?;
        info!(
            tenant_id = %tenant.id,
            worlds = config.worlds.len(),
            "Tenant configuration replaced"
        );
        self.configs.write().insert(tenant.id, config);
        Ok(())
    }

    /// Configuration of one world
    pub fn world(&self, tenant: &Tenant, world_id: WorldId) -> DomainResult<WorldConfig> {
        self.get(tenant.id)?
            .worlds
            .into_iter()
            .find(|w| w.id == world_id)
            .ok_or_else(|| DomainError::not_found("world", format!("{}:{world_id}", tenant.id)))
    }

    /// Rate multipliers of a world; unknown worlds run at 1.0
    pub fn rates(&self, tenant: &Tenant, world_id: WorldId) -> Rates {
        self.world(tenant, world_id).map(|w| w.rates).unwrap_or_default()
    }
}

impl TenantSource for TenantConfigStore {
    fn tenants(&self) -> Vec<Tenant> {
        self.configs
            .read()
            .values()
            .filter_map(|c| c.tenant().ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn config(id: Uuid) -> TenantConfig {
        serde_json::from_value(json!({
            "id": id,
            "region": "GMS",
            "major": 83,
            "minor": 1,
            "worlds": [
                {"id": 0, "name": "Scania", "flag": "EVENT", "rates": {"exp": 2.0}},
                {"id": 1, "name": "Bera", "recommendationMessage": "Join us!"}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_rates_default_to_one() {
        let id = Uuid::new_v4();
        let store = TenantConfigStore::from_configs(vec![config(id)]).unwrap();
        let tenant = store.get(id).unwrap().tenant().unwrap();

        let scania = store.rates(&tenant, 0);
        assert_eq!(scania.get(RateType::Exp), 2.0);
        assert_eq!(scania.get(RateType::Meso), 1.0);
        assert_eq!(scania.get(RateType::QuestExp), 1.0);
        assert_eq!(store.rates(&tenant, 7), Rates::default());
    }

    #[test]
    fn test_world_lookup() {
        let id = Uuid::new_v4();
        let store = TenantConfigStore::from_configs(vec![config(id)]).unwrap();
        let tenant = store.get(id).unwrap().tenant().unwrap();

        assert!(store.world(&tenant, 1).unwrap().recommended());
        assert!(!store.world(&tenant, 0).unwrap().recommended());
        assert!(store.world(&tenant, 5).unwrap_err().is_not_found());
    }

    #[test]
    fn test_replace_refreshes_snapshot() {
        let id = Uuid::new_v4();
        let store = TenantConfigStore::new();
        assert!(store.get(id).unwrap_err().is_not_found());

        store.replace(config(id)).unwrap();
        let mut refreshed = config(id);
        refreshed.worlds.truncate(1);
        store.replace(refreshed).unwrap();

        assert_eq!(store.get(id).unwrap().worlds.len(), 1);
        assert_eq!(store.tenants().len(), 1);
    }

    #[test]
    fn test_replace_rejects_nil_tenant() {
        let store = TenantConfigStore::new();
        assert!(store.replace(config(Uuid::nil())).is_err());
        assert!(store.tenants().is_empty());
    }
}
