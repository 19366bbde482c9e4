// Copyright 2025 Cowboy AI, LLC.

//! Character status consumer driving the transition engine

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::processor::MapProcessor;
use crate::errors::DomainResult;
use crate::field::{ChannelId, CharacterId, Field, MapId, WorldId};
use crate::message::{Envelope, Handler};
use crate::portal::PortalProcessor;
use crate::tenant::Context;

/// Character logged in
pub const CHARACTER_STATUS_LOGIN: &str = "LOGIN";
/// Character logged out
pub const CHARACTER_STATUS_LOGOUT: &str = "LOGOUT";
/// Character changed map
pub const CHARACTER_STATUS_MAP_CHANGED: &str = "MAP_CHANGED";
/// Character changed channel
pub const CHARACTER_STATUS_CHANNEL_CHANGED: &str = "CHANNEL_CHANGED";
/// Character was deleted
pub const CHARACTER_STATUS_DELETED: &str = "DELETED";

/// Body of login and logout events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterPresenceBody {
    /// Character
    pub character_id: CharacterId,
    /// World
    pub world_id: WorldId,
    /// Channel
    pub channel_id: ChannelId,
    /// Map
    pub map_id: MapId,
    /// Instance, nil for the base map
    #[serde(default)]
    pub instance: Uuid,
}

impl CharacterPresenceBody {
    fn field(&self) -> Field {
        Field::new(self.world_id, self.channel_id, self.map_id).with_instance(self.instance)
    }
}

/// Body of a map change event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapChangedBody {
    /// Character
    pub character_id: CharacterId,
    /// World
    pub world_id: WorldId,
    /// Channel
    pub channel_id: ChannelId,
    /// Map left
    pub old_map_id: MapId,
    /// Instance left
    #[serde(default)]
    pub old_instance: Uuid,
    /// Map entered
    pub target_map_id: MapId,
    /// Instance entered
    #[serde(default)]
    pub target_instance: Uuid,
}

/// Body of a channel change event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelChangedBody {
    /// Character
    pub character_id: CharacterId,
    /// World
    pub world_id: WorldId,
    /// Channel entered
    pub channel_id: ChannelId,
    /// Channel left
    pub old_channel_id: ChannelId,
    /// Map
    pub map_id: MapId,
    /// Instance
    #[serde(default)]
    pub instance: Uuid,
}

/// Body of a character deletion event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterDeletedBody {
    /// Character
    pub character_id: CharacterId,
}

/// Applies character status events to maps and portal blocks
pub struct CharacterStatusHandler {
    maps: MapProcessor,
    portals: PortalProcessor,
}

impl CharacterStatusHandler {
    /// Handler over the map and portal services
    pub fn new(maps: MapProcessor, portals: PortalProcessor) -> Self {
        Self { maps, portals }
    }
}

#[async_trait]
impl Handler for CharacterStatusHandler {
    async fn handle(
        &self,
        ctx: &Context,
        envelope: &Envelope<serde_json::Value>,
    ) -> DomainResult<()> {
        let tx = envelope.transaction_id;
        match envelope.kind.as_str() {
            CHARACTER_STATUS_LOGIN => {
                let body: CharacterPresenceBody = envelope.decode_body()?;
                self.maps.enter(ctx, tx, body.field(), body.character_id).await
            }
            CHARACTER_STATUS_LOGOUT => {
                let body: CharacterPresenceBody = envelope.decode_body()?;
                self.maps.exit(ctx, tx, body.field(), body.character_id).await?;
                self.portals.clear_character(ctx, body.character_id);
                Ok(())
            }
            CHARACTER_STATUS_MAP_CHANGED => {
                let body: MapChangedBody = envelope.decode_body()?;
                let old_field = Field::new(body.world_id, body.channel_id, body.old_map_id)
                    .with_instance(body.old_instance);
                let new_field = Field::new(body.world_id, body.channel_id, body.target_map_id)
                    .with_instance(body.target_instance);
                self.maps
                    .map_transition(ctx, tx, new_field, old_field, body.character_id)
                    .await
            }
            CHARACTER_STATUS_CHANNEL_CHANGED => {
                let body: ChannelChangedBody = envelope.decode_body()?;
                let new_field = Field::new(body.world_id, body.channel_id, body.map_id)
                    .with_instance(body.instance);
                self.maps
                    .channel_transition(ctx, tx, new_field, body.old_channel_id, body.character_id)
                    .await
            }
            CHARACTER_STATUS_DELETED => {
                let body: CharacterDeletedBody = envelope.decode_body()?;
                self.maps.delete_visits(ctx, body.character_id).await.map(|_| ())
            }
            other => {
                debug!(kind = other, "Ignoring character status event");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::occupancy::OccupancyRegistry;
    use crate::map::script::{CommandSpawner, StaticMapScripts};
    use crate::map::visit::{InMemoryVisitStore, VisitStore};
    use crate::message::topics::EVENT_TOPIC_MAP_STATUS;
    use crate::message::{Emitter, InMemoryPublisher};
    use crate::portal::PortalBlockRegistry;
    use crate::tenant::test_support;
    use serde_json::json;
    use std::sync::Arc;

    struct Fixture {
        handler: CharacterStatusHandler,
        maps: MapProcessor,
        portals: PortalProcessor,
        visits: Arc<InMemoryVisitStore>,
        publisher: InMemoryPublisher,
    }

    fn fixture() -> Fixture {
        let publisher = InMemoryPublisher::new();
        let emitter = Emitter::new(Arc::new(publisher.clone()));
        let visits = Arc::new(InMemoryVisitStore::new());
        let maps = MapProcessor::new(
            Arc::new(OccupancyRegistry::new()),
            visits.clone(),
            Arc::new(StaticMapScripts::new()),
            Arc::new(CommandSpawner::new(emitter.clone())),
            emitter.clone(),
        );
        let portals = PortalProcessor::new(Arc::new(PortalBlockRegistry::new()), emitter);
        Fixture {
            handler: CharacterStatusHandler::new(maps.clone(), portals.clone()),
            maps,
            portals,
            visits,
            publisher,
        }
    }

    fn envelope(ctx: &Context, kind: &str, body: serde_json::Value) -> Envelope<serde_json::Value> {
        Envelope::new(Uuid::new_v4(), ctx.tenant(), "1", kind, body)
    }

    #[tokio::test]
    async fn test_login_then_logout() {
        let f = fixture();
        let ctx = test_support::context();
        let field = Field::new(0, 1, 100000000);
        f.portals.block(&ctx, 1, 100000000, 2);

        let body = json!({"characterId": 1, "worldId": 0, "channelId": 1, "mapId": 100000000});
        f.handler
            .handle(&ctx, &envelope(&ctx, CHARACTER_STATUS_LOGIN, body.clone()))
            .await
            .unwrap();
        assert_eq!(f.maps.characters_in_map(&ctx, field), vec![1]);

        f.handler.handle(&ctx, &envelope(&ctx, CHARACTER_STATUS_LOGOUT, body)).await.unwrap();
        assert!(f.maps.characters_in_map(&ctx, field).is_empty());
        assert!(f.portals.blocked_for(&ctx, 1).is_empty());
        assert_eq!(f.publisher.messages(EVENT_TOPIC_MAP_STATUS).len(), 2);
    }

    #[tokio::test]
    async fn test_map_changed() {
        let f = fixture();
        let ctx = test_support::context();
        let body = json!({
            "characterId": 5, "worldId": 0, "channelId": 1,
            "oldMapId": 100, "targetMapId": 200
        });
        f.handler.handle(&ctx, &envelope(&ctx, CHARACTER_STATUS_MAP_CHANGED, body)).await.unwrap();
        assert_eq!(f.maps.characters_in_map(&ctx, Field::new(0, 1, 200)), vec![5]);
    }

    #[tokio::test]
    async fn test_channel_changed() {
        let f = fixture();
        let ctx = test_support::context();
        let body = json!({
            "characterId": 5, "worldId": 0, "channelId": 3, "oldChannelId": 1, "mapId": 100
        });
        f.handler
            .handle(&ctx, &envelope(&ctx, CHARACTER_STATUS_CHANNEL_CHANGED, body))
            .await
            .unwrap();
        assert_eq!(f.maps.characters_in_map(&ctx, Field::new(0, 3, 100)), vec![5]);
    }

    #[tokio::test]
    async fn test_deleted_clears_visits() {
        let f = fixture();
        let ctx = test_support::context();
        f.visits.record_if_absent(ctx.tenant(), 9, 100).await.unwrap();

        let body = json!({"characterId": 9});
        f.handler.handle(&ctx, &envelope(&ctx, CHARACTER_STATUS_DELETED, body)).await.unwrap();
        assert!(!f.visits.has_visited(ctx.tenant(), 9, 100).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_kind_is_ignored_and_bad_body_fails() {
        let f = fixture();
        let ctx = test_support::context();
        f.handler.handle(&ctx, &envelope(&ctx, "LEVEL_CHANGED", json!({}))).await.unwrap();
        let err = f
            .handler
            .handle(&ctx, &envelope(&ctx, CHARACTER_STATUS_LOGIN, json!({"characterId": "x"})))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::errors::DomainError::SerializationError(_)));
    }
}
