// Copyright 2025 Cowboy AI, LLC.

//! Who is in which map instance
//!
//! Only the transition engine mutates occupancy, so `enter` and `exit` are
//! crate-private. Everything else reads.

use std::collections::BTreeSet;

use crate::field::{ChannelId, CharacterId, Field, MapId, WorldId};
use crate::registry::TenantRegistry;
use crate::tenant::Tenant;

/// Tenant-scoped `field -> characters` map
pub struct OccupancyRegistry {
    fields: TenantRegistry<Field, BTreeSet<CharacterId>>,
}

impl Default for OccupancyRegistry {
    fn default() -> Self {
        Self {
            fields: TenantRegistry::new("map occupancy"),
        }
    }
}

impl OccupancyRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a character to a field; `false` if it was already there
    pub(crate) fn enter(&self, tenant: &Tenant, field: Field, character_id: CharacterId) -> bool {
        let slot = self.fields.get_or_create(tenant);
        let mut fields = slot.write();
        fields.entry(field).or_default().insert(character_id)
    }

    /// Remove a character from a field; `false` if it was not there
    pub(crate) fn exit(&self, tenant: &Tenant, field: Field, character_id: CharacterId) -> bool {
        let Some(slot) = self.fields.slot(tenant) else {
            return false;
        };
        let mut fields = slot.write();
        let Some(characters) = fields.get_mut(&field) else {
            return false;
        };
        let removed = characters.remove(&character_id);
        if characters.is_empty() {
            fields.remove(&field);
        }
        removed
    }

    /// Characters in one map instance, ascending
    pub fn characters_in_map(&self, tenant: &Tenant, field: Field) -> Vec<CharacterId> {
        self.fields
            .get(tenant, &field)
            .map(|c| c.into_iter().collect())
            .unwrap_or_default()
    }

    /// Characters in every instance of a map, ascending and de-duplicated
    pub fn characters_in_map_all_instances(
        &self,
        tenant: &Tenant,
        world_id: WorldId,
        channel_id: ChannelId,
        map_id: MapId,
    ) -> Vec<CharacterId> {
        let Some(slot) = self.fields.slot(tenant) else {
            return Vec::new();
        };
        let fields = slot.read();
        fields
            .iter()
            .filter(|(f, _)| {
                f.world_id == world_id && f.channel_id == channel_id && f.map_id == map_id
            })
            .flat_map(|(_, characters)| characters.iter().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Fields with at least one character, sorted
    pub fn maps_with_characters(&self, tenant: &Tenant) -> Vec<Field> {
        let Some(slot) = self.fields.slot(tenant) else {
            return Vec::new();
        };
        let mut fields: Vec<Field> = slot.read().keys().copied().collect();
        fields.sort();
        fields
    }

    /// Drop everything
    pub fn reset(&self) {
        self.fields.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenant::test_support;
    use uuid::Uuid;

    #[test]
    fn test_enter_exit() {
        let registry = OccupancyRegistry::new();
        let tenant = test_support::tenant();
        let field = Field::new(0, 1, 100000000);

        assert!(registry.enter(&tenant, field, 2));
        assert!(registry.enter(&tenant, field, 1));
        assert!(!registry.enter(&tenant, field, 1));
        assert_eq!(registry.characters_in_map(&tenant, field), vec![1, 2]);

        assert!(registry.exit(&tenant, field, 1));
        assert!(!registry.exit(&tenant, field, 1));
        assert_eq!(registry.characters_in_map(&tenant, field), vec![2]);
    }

    #[test]
    fn test_empty_field_is_dropped() {
        let registry = OccupancyRegistry::new();
        let tenant = test_support::tenant();
        let field = Field::new(0, 1, 100);
        registry.enter(&tenant, field, 1);
        registry.exit(&tenant, field, 1);
        assert!(registry.maps_with_characters(&tenant).is_empty());
    }

    #[test]
    fn test_instances_are_separate_but_can_be_merged() {
        let registry = OccupancyRegistry::new();
        let tenant = test_support::tenant();
        let base = Field::new(0, 1, 100);
        let instanced = base.with_instance(Uuid::new_v4());
        registry.enter(&tenant, base, 1);
        registry.enter(&tenant, instanced, 2);
        registry.enter(&tenant, instanced, 1);

        assert_eq!(registry.characters_in_map(&tenant, base), vec![1]);
        assert_eq!(registry.characters_in_map(&tenant, instanced), vec![1, 2]);
        assert_eq!(registry.characters_in_map_all_instances(&tenant, 0, 1, 100), vec![1, 2]);
        assert!(registry.characters_in_map_all_instances(&tenant, 0, 2, 100).is_empty());
    }

    #[test]
    fn test_tenant_isolation() {
        let registry = OccupancyRegistry::new();
        let t1 = test_support::tenant();
        let t2 = test_support::tenant();
        let field = Field::new(0, 1, 100);
        registry.enter(&t1, field, 1);
        assert!(registry.characters_in_map(&t2, field).is_empty());
        assert!(!registry.exit(&t2, field, 1));
    }
}
