// Copyright 2025 Cowboy AI, LLC.

//! Map transition engine
//!
//! Every transition runs as one emission. [`MapProcessor::map_transition`]
//! stages the exit before the enter on the same buffer, so consumers keyed
//! on the character always see `CHARACTER_EXIT` for the old field before
//! `CHARACTER_ENTER` for the new one.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::occupancy::OccupancyRegistry;
use super::script::{MapScripts, Spawner};
use super::visit::VisitStore;
use crate::errors::DomainResult;
use crate::field::{ChannelId, CharacterId, Field, MapId, WorldId};
use crate::message::topics::{COMMAND_TOPIC_MAP_ACTIONS, EVENT_TOPIC_MAP_STATUS};
use crate::message::{create_key, Emitter, Envelope, MessageBuffer};
use crate::tenant::{Context, Tenant};

/// A character entered a field
pub const MAP_STATUS_CHARACTER_ENTER: &str = "CHARACTER_ENTER";
/// A character left a field
pub const MAP_STATUS_CHARACTER_EXIT: &str = "CHARACTER_EXIT";

/// Run the first-visit script of a map
pub const MAP_ACTION_ON_FIRST_USER_ENTER: &str = "ON_FIRST_USER_ENTER";
/// Run the every-visit script of a map
pub const MAP_ACTION_ON_USER_ENTER: &str = "ON_USER_ENTER";

/// Body of a map status event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapStatusBody {
    /// Character that moved
    pub character_id: CharacterId,
    /// Field entered or left
    #[serde(flatten)]
    pub field: Field,
}

/// Body of a map script command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapActionBody {
    /// Character the script runs for
    pub character_id: CharacterId,
    /// Field the script runs in
    #[serde(flatten)]
    pub field: Field,
    /// Script name
    pub script_name: String,
}

/// Map service operations
#[derive(Clone)]
pub struct MapProcessor {
    occupancy: Arc<OccupancyRegistry>,
    visits: Arc<dyn VisitStore>,
    scripts: Arc<dyn MapScripts>,
    spawner: Arc<dyn Spawner>,
    emitter: Emitter,
}

impl MapProcessor {
    /// Engine over its collaborators
    pub fn new(
        occupancy: Arc<OccupancyRegistry>,
        visits: Arc<dyn VisitStore>,
        scripts: Arc<dyn MapScripts>,
        spawner: Arc<dyn Spawner>,
        emitter: Emitter,
    ) -> Self {
        Self {
            occupancy,
            visits,
            scripts,
            spawner,
            emitter,
        }
    }

    /// Occupancy registry
    pub fn occupancy(&self) -> &Arc<OccupancyRegistry> {
        &self.occupancy
    }

    /// First-visit store
    pub fn visits(&self) -> &Arc<dyn VisitStore> {
        &self.visits
    }

    /// Put a character into a field
    pub async fn enter(
        &self,
        ctx: &Context,
        transaction_id: Uuid,
        field: Field,
        character_id: CharacterId,
    ) -> DomainResult<()> {
        let tenant = ctx.tenant();
        self.emitter
            .emit(ctx, |buf| async move {
                self.stage_enter(&buf, tenant, transaction_id, field, character_id).await;
                Ok(())
            })
            .await
    }

    /// Take a character out of a field
    pub async fn exit(
        &self,
        ctx: &Context,
        transaction_id: Uuid,
        field: Field,
        character_id: CharacterId,
    ) -> DomainResult<()> {
        let tenant = ctx.tenant();
        self.emitter
            .emit(ctx, |buf| async move {
                self.stage_exit(&buf, tenant, transaction_id, field, character_id);
                Ok(())
            })
            .await
    }

    /// Move a character from `old_field` to `new_field`
    pub async fn map_transition(
        &self,
        ctx: &Context,
        transaction_id: Uuid,
        new_field: Field,
        old_field: Field,
        character_id: CharacterId,
    ) -> DomainResult<()> {
        let tenant = ctx.tenant();
        self.emitter
            .emit(ctx, |buf| async move {
                self.stage_exit(&buf, tenant, transaction_id, old_field, character_id);
                self.stage_enter(&buf, tenant, transaction_id, new_field, character_id)
                    .await;
                Ok(())
            })
            .await
    }

    /// Move a character to the same map on another channel
    pub async fn channel_transition(
        &self,
        ctx: &Context,
        transaction_id: Uuid,
        new_field: Field,
        old_channel_id: ChannelId,
        character_id: CharacterId,
    ) -> DomainResult<()> {
        let old_field = new_field.with_channel(old_channel_id);
        self.map_transition(ctx, transaction_id, new_field, old_field, character_id)
            .await
    }

    /// Characters in one map instance
    pub fn characters_in_map(&self, ctx: &Context, field: Field) -> Vec<CharacterId> {
        self.occupancy.characters_in_map(ctx.tenant(), field)
    }

    /// Characters in every instance of a map
    pub fn characters_in_map_all_instances(
        &self,
        ctx: &Context,
        world_id: WorldId,
        channel_id: ChannelId,
        map_id: MapId,
    ) -> Vec<CharacterId> {
        self.occupancy
            .characters_in_map_all_instances(ctx.tenant(), world_id, channel_id, map_id)
    }

    /// Forget a deleted character's first-visit marks
    pub async fn delete_visits(
        &self,
        ctx: &Context,
        character_id: CharacterId,
    ) -> DomainResult<u64> {
        let tenant = ctx.tenant();
        let removed = ctx.run(self.visits.delete_for_character(tenant, character_id)).await?;
        debug!(tenant_id = %tenant.id, character_id, removed, "Visit marks deleted");
        Ok(removed)
    }

    async fn stage_enter(
        &self,
        buf: &MessageBuffer,
        tenant: &Tenant,
        transaction_id: Uuid,
        field: Field,
        character_id: CharacterId,
    ) {
        self.occupancy.enter(tenant, field, character_id);

        match self.visits.record_if_absent(tenant, character_id, field.map_id).await {
            Ok(true) => {
                if let Some(script) = self.scripts.on_first_user_enter(field.map_id) {
                    stage_action(
                        buf,
                        tenant,
                        transaction_id,
                        MAP_ACTION_ON_FIRST_USER_ENTER,
                        field,
                        character_id,
                        script,
                    );
                }
            }
            Ok(false) => {}
            Err(err) => warn!(
                tenant_id = %tenant.id,
                character_id,
                map_id = field.map_id,
                category = %err.category(),
                error = %err,
                "Unable to record first visit"
            ),
        }

        if let Some(script) = self.scripts.on_user_enter(field.map_id) {
            stage_action(
                buf,
                tenant,
                transaction_id,
                MAP_ACTION_ON_USER_ENTER,
                field,
                character_id,
                script,
            );
        }

        let spawner = self.spawner.clone();
        let owner = tenant.clone();
        tokio::spawn(async move {
            if let Err(err) = spawner.spawn(&owner, field).await {
                warn!(tenant_id = %owner.id, %field, error = %err, "Spawn request failed");
            }
        });

        stage_status(buf, tenant, transaction_id, MAP_STATUS_CHARACTER_ENTER, field, character_id);
        debug!(
            tenant_id = %tenant.id,
            %transaction_id,
            character_id,
            %field,
            "Character entered map"
        );
    }

    fn stage_exit(
        &self,
        buf: &MessageBuffer,
        tenant: &Tenant,
        transaction_id: Uuid,
        field: Field,
        character_id: CharacterId,
    ) {
        if !self.occupancy.exit(tenant, field, character_id) {
            debug!(tenant_id = %tenant.id, character_id, %field, "Exit for character not in map");
        }
        stage_status(buf, tenant, transaction_id, MAP_STATUS_CHARACTER_EXIT, field, character_id);
        debug!(
            tenant_id = %tenant.id,
            %transaction_id,
            character_id,
            %field,
            "Character exited map"
        );
    }
}

fn stage_status(
    buf: &MessageBuffer,
    tenant: &Tenant,
    transaction_id: Uuid,
    kind: &str,
    field: Field,
    character_id: CharacterId,
) {
    buf.put_envelope(
        EVENT_TOPIC_MAP_STATUS,
        tenant,
        Envelope::new(
            transaction_id,
            tenant,
            create_key(u64::from(character_id)),
            kind,
            MapStatusBody { character_id, field },
        ),
    );
}

fn stage_action(
    buf: &MessageBuffer,
    tenant: &Tenant,
    transaction_id: Uuid,
    kind: &str,
    field: Field,
    character_id: CharacterId,
    script_name: String,
) {
    buf.put_envelope(
        COMMAND_TOPIC_MAP_ACTIONS,
        tenant,
        Envelope::new(
            transaction_id,
            tenant,
            create_key(u64::from(character_id)),
            kind,
            MapActionBody {
                character_id,
                field,
                script_name,
            },
        ),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DomainError;
    use crate::map::script::{MockMapScripts, MockSpawner};
    use crate::map::visit::{InMemoryVisitStore, MockVisitStore};
    use crate::message::InMemoryPublisher;
    use crate::tenant::test_support;
    use pretty_assertions::assert_eq;

    fn quiet_spawner() -> Arc<dyn Spawner> {
        let mut spawner = MockSpawner::new();
        spawner.expect_spawn().returning(|_, _| Ok(()));
        Arc::new(spawner)
    }

    fn no_scripts() -> Arc<dyn MapScripts> {
        let mut scripts = MockMapScripts::new();
        scripts.expect_on_first_user_enter().returning(|_| None);
        scripts.expect_on_user_enter().returning(|_| None);
        Arc::new(scripts)
    }

    fn processor(
        visits: Arc<dyn VisitStore>,
        scripts: Arc<dyn MapScripts>,
    ) -> (MapProcessor, InMemoryPublisher) {
        let publisher = InMemoryPublisher::new();
        let processor = MapProcessor::new(
            Arc::new(OccupancyRegistry::new()),
            visits,
            scripts,
            quiet_spawner(),
            Emitter::new(Arc::new(publisher.clone())),
        );
        (processor, publisher)
    }

    #[tokio::test]
    async fn test_enter_emits_status_and_tracks_occupancy() {
        let (processor, publisher) = processor(Arc::new(InMemoryVisitStore::new()), no_scripts());
        let ctx = test_support::context();
        let field = Field::new(1, 2, 100000000).with_instance(Uuid::new_v4());
        let tx = Uuid::new_v4();

        processor.enter(&ctx, tx, field, 12345).await.unwrap();

        assert_eq!(processor.characters_in_map(&ctx, field), vec![12345]);
        let events = publisher.envelopes::<MapStatusBody>(EVENT_TOPIC_MAP_STATUS).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].transaction_id, tx);
        assert_eq!(events[0].kind, MAP_STATUS_CHARACTER_ENTER);
        assert_eq!(
            events[0].body,
            MapStatusBody {
                character_id: 12345,
                field
            }
        );
    }

    #[tokio::test]
    async fn test_map_transition_orders_exit_before_enter() {
        let (processor, publisher) = processor(Arc::new(InMemoryVisitStore::new()), no_scripts());
        let ctx = test_support::context();
        let old_field = Field::new(0, 1, 100000000);
        let new_field = Field::new(0, 1, 200000000);
        processor.enter(&ctx, Uuid::new_v4(), old_field, 12345).await.unwrap();
        publisher.clear();

        processor
            .map_transition(&ctx, Uuid::new_v4(), new_field, old_field, 12345)
            .await
            .unwrap();

        let events: Vec<_> = publisher
            .envelopes::<MapStatusBody>(EVENT_TOPIC_MAP_STATUS)
            .unwrap()
            .into_iter()
            .map(|e| (e.kind, e.body.field))
            .collect();
        assert_eq!(
            events,
            vec![
                (MAP_STATUS_CHARACTER_EXIT.to_string(), old_field),
                (MAP_STATUS_CHARACTER_ENTER.to_string(), new_field)
            ]
        );
        assert!(processor.characters_in_map(&ctx, old_field).is_empty());
        assert_eq!(processor.characters_in_map(&ctx, new_field), vec![12345]);
    }

    #[tokio::test]
    async fn test_channel_transition_uses_old_channel() {
        let (processor, publisher) = processor(Arc::new(InMemoryVisitStore::new()), no_scripts());
        let ctx = test_support::context();
        let new_field = Field::new(0, 2, 100000000);
        processor
            .enter(&ctx, Uuid::new_v4(), new_field.with_channel(1), 7)
            .await
            .unwrap();
        publisher.clear();

        processor.channel_transition(&ctx, Uuid::new_v4(), new_field, 1, 7).await.unwrap();

        let events = publisher.envelopes::<MapStatusBody>(EVENT_TOPIC_MAP_STATUS).unwrap();
        assert_eq!(events[0].body.field.channel_id, 1);
        assert_eq!(events[1].body.field.channel_id, 2);
        assert_eq!(
            processor.characters_in_map_all_instances(&ctx, 0, 1, 100000000),
            Vec::<u32>::new()
        );
        assert_eq!(processor.characters_in_map_all_instances(&ctx, 0, 2, 100000000), vec![7]);
    }

    #[tokio::test]
    async fn test_first_visit_script_only_once() {
        let mut scripts = MockMapScripts::new();
        scripts
            .expect_on_first_user_enter()
            .returning(|_| Some("intro".to_string()));
        scripts
            .expect_on_user_enter()
            .returning(|_| Some("weather".to_string()));
        let (processor, publisher) =
            processor(Arc::new(InMemoryVisitStore::new()), Arc::new(scripts));
        let ctx = test_support::context();
        let field = Field::new(0, 1, 100);

        processor.enter(&ctx, Uuid::new_v4(), field, 1).await.unwrap();
        processor.exit(&ctx, Uuid::new_v4(), field, 1).await.unwrap();
        processor.enter(&ctx, Uuid::new_v4(), field, 1).await.unwrap();

        let actions: Vec<_> = publisher
            .envelopes::<MapActionBody>(COMMAND_TOPIC_MAP_ACTIONS)
            .unwrap()
            .into_iter()
            .map(|e| (e.kind, e.body.script_name))
            .collect();
        assert_eq!(
            actions,
            vec![
                (MAP_ACTION_ON_FIRST_USER_ENTER.to_string(), "intro".to_string()),
                (MAP_ACTION_ON_USER_ENTER.to_string(), "weather".to_string()),
                (MAP_ACTION_ON_USER_ENTER.to_string(), "weather".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_visit_failure_does_not_block_enter() {
        let mut visits = MockVisitStore::new();
        visits
            .expect_record_if_absent()
            .returning(|_, _, _| Err(DomainError::TransientStorage("down".into())));
        let (processor, publisher) = processor(Arc::new(visits), no_scripts());
        let ctx = test_support::context();
        let field = Field::new(0, 1, 100);

        processor.enter(&ctx, Uuid::new_v4(), field, 1).await.unwrap();

        assert_eq!(processor.characters_in_map(&ctx, field), vec![1]);
        assert_eq!(publisher.messages(EVENT_TOPIC_MAP_STATUS).len(), 1);
        assert!(publisher.messages(COMMAND_TOPIC_MAP_ACTIONS).is_empty());
    }

    #[tokio::test]
    async fn test_enter_schedules_spawn() {
        let mut spawner = MockSpawner::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        spawner.expect_spawn().times(1).returning(move |_, field| {
            let _ = tx.send(field);
            Ok(())
        });
        let publisher = InMemoryPublisher::new();
        let processor = MapProcessor::new(
            Arc::new(OccupancyRegistry::new()),
            Arc::new(InMemoryVisitStore::new()),
            no_scripts(),
            Arc::new(spawner),
            Emitter::new(Arc::new(publisher)),
        );
        let ctx = test_support::context();
        let field = Field::new(0, 1, 100);

        processor.enter(&ctx, Uuid::new_v4(), field, 1).await.unwrap();
        assert_eq!(rx.recv().await, Some(field));
    }
}
