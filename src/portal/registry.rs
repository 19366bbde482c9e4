// Copyright 2025 Cowboy AI, LLC.

use serde::Serialize;
use std::fmt;

use crate::field::{CharacterId, MapId};
use crate::registry::TenantRegistry;
use crate::tenant::Tenant;

/// A portal a character may not use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalBlock {
    /// Blocked character
    pub character_id: CharacterId,
    /// Map holding the portal
    pub map_id: MapId,
    /// Portal id within the map
    pub portal_id: u32,
}

impl fmt::Display for PortalBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.character_id, self.map_id, self.portal_id)
    }
}

/// Tenant-scoped set of portal blocks
pub struct PortalBlockRegistry {
    blocks: TenantRegistry<PortalBlock, PortalBlock>,
}

impl Default for PortalBlockRegistry {
    fn default() -> Self {
        Self {
            blocks: TenantRegistry::new("portal block"),
        }
    }
}

impl PortalBlockRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Block a portal; blocking twice is a no-op
    pub fn block(&self, tenant: &Tenant, block: PortalBlock) -> PortalBlock {
        self.blocks.put_if_absent(tenant, block, block)
    }

    /// Lift a block; returns whether one existed
    pub fn unblock(&self, tenant: &Tenant, block: PortalBlock) -> bool {
        self.blocks.remove(tenant, &block).is_ok()
    }

    /// Whether the portal is blocked for the character
    pub fn is_blocked(&self, tenant: &Tenant, block: &PortalBlock) -> bool {
        self.blocks.contains(tenant, block)
    }

    /// Every block held against `character_id`, sorted
    pub fn blocked_for(&self, tenant: &Tenant, character_id: CharacterId) -> Vec<PortalBlock> {
        let mut blocks: Vec<_> = self
            .blocks
            .for_tenant(tenant)
            .into_iter()
            .filter(|b| b.character_id == character_id)
            .collect();
        blocks.sort();
        blocks
    }

    /// Drop every block of `character_id`
    pub fn clear_character(&self, tenant: &Tenant, character_id: CharacterId) -> usize {
        self.blocks
            .remove_where(tenant, |_, b| b.character_id == character_id)
            .len()
    }

    /// Drop everything
    pub fn reset(&self) {
        self.blocks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenant::test_support;

    fn block(character_id: CharacterId, portal_id: u32) -> PortalBlock {
        PortalBlock {
            character_id,
            map_id: 100000000,
            portal_id,
        }
    }

    #[test]
    fn test_block_unblock() {
        let registry = PortalBlockRegistry::new();
        let tenant = test_support::tenant();
        registry.block(&tenant, block(1, 3));
        registry.block(&tenant, block(1, 3));

        assert!(registry.is_blocked(&tenant, &block(1, 3)));
        assert!(!registry.is_blocked(&tenant, &block(2, 3)));
        assert!(registry.unblock(&tenant, block(1, 3)));
        assert!(!registry.unblock(&tenant, block(1, 3)));
    }

    #[test]
    fn test_clear_character_only_touches_that_character() {
        let registry = PortalBlockRegistry::new();
        let tenant = test_support::tenant();
        registry.block(&tenant, block(1, 1));
        registry.block(&tenant, block(1, 2));
        registry.block(&tenant, block(2, 1));

        assert_eq!(registry.blocked_for(&tenant, 1), vec![block(1, 1), block(1, 2)]);
        assert_eq!(registry.clear_character(&tenant, 1), 2);
        assert!(registry.blocked_for(&tenant, 1).is_empty());
        assert_eq!(registry.blocked_for(&tenant, 2).len(), 1);
    }

    #[test]
    fn test_blocks_are_per_tenant() {
        let registry = PortalBlockRegistry::new();
        let t1 = test_support::tenant();
        let t2 = test_support::tenant();
        registry.block(&t1, block(1, 1));
        assert!(!registry.is_blocked(&t2, &block(1, 1)));
    }
}
