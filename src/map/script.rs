// Copyright 2025 Cowboy AI, LLC.

//! Collaborators of the transition engine: map scripts and spawning

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::errors::DomainResult;
use crate::field::{Field, MapId};
use crate::message::topics::COMMAND_TOPIC_SPAWN;
use crate::message::{Emitter, Envelope};
use crate::tenant::{Context, Tenant};

/// Spawn the monsters of a field
pub const SPAWN_COMMAND_MONSTERS: &str = "SPAWN_MONSTERS";
/// Spawn the reactors of a field
pub const SPAWN_COMMAND_REACTORS: &str = "SPAWN_REACTORS";

/// Script names attached to maps
#[cfg_attr(test, mockall::automock)]
pub trait MapScripts: Send + Sync {
    /// Script run the first time a character ever enters `map_id`
    fn on_first_user_enter(&self, map_id: MapId) -> Option<String>;

    /// Script run every time a character enters `map_id`
    fn on_user_enter(&self, map_id: MapId) -> Option<String>;
}

/// Script table loaded from map data
#[derive(Debug, Clone, Default)]
pub struct StaticMapScripts {
    first_user_enter: HashMap<MapId, String>,
    user_enter: HashMap<MapId, String>,
}

impl StaticMapScripts {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a first-enter script
    pub fn with_first_user_enter(mut self, map_id: MapId, script: impl Into<String>) -> Self {
        self.first_user_enter.insert(map_id, script.into());
        self
    }

    /// Register an every-enter script
    pub fn with_user_enter(mut self, map_id: MapId, script: impl Into<String>) -> Self {
        self.user_enter.insert(map_id, script.into());
        self
    }
}

impl MapScripts for StaticMapScripts {
    fn on_first_user_enter(&self, map_id: MapId) -> Option<String> {
        self.first_user_enter.get(&map_id).cloned()
    }

    fn on_user_enter(&self, map_id: MapId) -> Option<String> {
        self.user_enter.get(&map_id).cloned()
    }
}

/// Receives best-effort spawn requests for a field
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Spawner: Send + Sync {
    /// Populate `field` for `tenant`
    async fn spawn(&self, tenant: &Tenant, field: Field) -> DomainResult<()>;
}

/// Body of a spawn command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnBody {
    /// Field to populate
    #[serde(flatten)]
    pub field: Field,
}

/// [`Spawner`] that asks the monster and reactor services over the bus
///
/// Each request is its own emission and never shares a buffer with the
/// transition that caused it.
pub struct CommandSpawner {
    emitter: Emitter,
}

impl CommandSpawner {
    /// Spawner publishing through `emitter`
    pub fn new(emitter: Emitter) -> Self {
        Self { emitter }
    }
}

#[async_trait]
impl Spawner for CommandSpawner {
    async fn spawn(&self, tenant: &Tenant, field: Field) -> DomainResult<()> {
        let ctx = Context::new(tenant.clone());
        self.emitter
            .emit(&ctx, |buf| async move {
                let transaction_id = Uuid::new_v4();
                for kind in [SPAWN_COMMAND_MONSTERS, SPAWN_COMMAND_REACTORS] {
                    buf.put_envelope(
                        COMMAND_TOPIC_SPAWN,
                        tenant,
                        Envelope::new(
                            transaction_id,
                            tenant,
                            crate::message::create_key(u64::from(field.map_id)),
                            kind,
                            SpawnBody { field },
                        ),
                    );
                }
                Ok(())
            })
            .await
    }
}
