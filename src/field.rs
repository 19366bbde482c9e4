// Copyright 2025 Cowboy AI, LLC.

//! Identifier types for worlds, channels, maps and the fields built from them

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// World id
pub type WorldId = u8;
/// Channel id within a world
pub type ChannelId = u8;
/// Map id
pub type MapId = u32;
/// Character id
pub type CharacterId = u32;
/// Account id
pub type AccountId = u32;

/// A map instance at runtime: `(world, channel, map, instance)`
///
/// The base (non-instanced) copy of a map uses the nil uuid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    /// World id
    pub world_id: WorldId,
    /// Channel id
    pub channel_id: ChannelId,
    /// Map id
    pub map_id: MapId,
    /// Instance id, nil for the base instance
    pub instance: Uuid,
}

impl Field {
    /// Field on the base instance of a map
    pub fn new(world_id: WorldId, channel_id: ChannelId, map_id: MapId) -> Self {
        Self {
            world_id,
            channel_id,
            map_id,
            instance: Uuid::nil(),
        }
    }

    /// Same field on another instance
    pub fn with_instance(mut self, instance: Uuid) -> Self {
        self.instance = instance;
        self
    }

    /// Same field on another channel
    pub fn with_channel(mut self, channel_id: ChannelId) -> Self {
        self.channel_id = channel_id;
        self
    }

    /// Whether this is the non-instanced copy of the map
    pub fn is_base_instance(&self) -> bool {
        self.instance.is_nil()
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.world_id, self.channel_id, self.map_id, self.instance
        )
    }
}
