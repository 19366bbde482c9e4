// Copyright 2025 Cowboy AI, LLC.

//! HTTP surface
//!
//! Every route speaks JSON:API and requires the tenant headers. Handlers
//! only translate between documents and processor calls; failures leave
//! through [`jsonapi::ApiError`], which picks the status from the error
//! category.

pub mod ban;
pub mod context;
pub mod conversation;
pub mod jsonapi;
pub mod map;
pub mod storage;

use axum::routing::get;
use axum::Router;

pub use context::{TenantContext, REQUEST_TIMEOUT};
pub use jsonapi::{
    status_for, ApiError, ApiResult, Document, ErrorDocument, ErrorObject, NewResource, Resource,
};

use crate::ban::{BanProcessor, HistoryProcessor};
use crate::conversation::ConversationProcessor;
use crate::map::MapProcessor;
use crate::storage::StorageProcessor;

/// Processors reachable from the routes
#[derive(Clone)]
pub struct AppState {
    /// Ban administration and admission checks
    pub bans: BanProcessor,
    /// Login history
    pub history: HistoryProcessor,
    /// Map occupancy queries
    pub maps: MapProcessor,
    /// Account storage
    pub storage: StorageProcessor,
    /// NPC conversations
    pub conversations: ConversationProcessor,
}

/// Router over every route group
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .merge(ban::routes())
        .merge(map::routes())
        .merge(storage::routes())
        .merge(conversation::routes())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

#[cfg(test)]
pub(crate) fn test_state() -> (AppState, crate::message::InMemoryPublisher) {
    use crate::ban::{InMemoryBanStore, InMemoryHistoryStore};
    use crate::conversation::InMemoryConversationStore;
    use crate::map::{CommandSpawner, InMemoryVisitStore, OccupancyRegistry, StaticMapScripts};
    use crate::message::{Emitter, InMemoryPublisher};
    use crate::storage::{DecoratorPipeline, InMemoryStorageStore};
    use std::sync::Arc;

    let publisher = InMemoryPublisher::new();
    let emitter = Emitter::new(Arc::new(publisher.clone()));
    let state = AppState {
        bans: BanProcessor::new(Arc::new(InMemoryBanStore::new()), emitter.clone()),
        history: HistoryProcessor::new(Arc::new(InMemoryHistoryStore::new())),
        maps: MapProcessor::new(
            Arc::new(OccupancyRegistry::new()),
            Arc::new(InMemoryVisitStore::new()),
            Arc::new(StaticMapScripts::new()),
            Arc::new(CommandSpawner::new(emitter.clone())),
            emitter.clone(),
        ),
        storage: StorageProcessor::new(
            Arc::new(InMemoryStorageStore::new()),
            DecoratorPipeline::new(),
            emitter,
        ),
        conversations: ConversationProcessor::new(Arc::new(InMemoryConversationStore::new())),
    };
    (state, publisher)
}
