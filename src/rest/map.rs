// Copyright 2025 Cowboy AI, LLC.

//! Map occupancy routes

use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use uuid::Uuid;

use super::context::TenantContext;
use super::jsonapi::{collection, ApiResult, Document, Resource};
use super::AppState;
use crate::field::{ChannelId, CharacterId, Field, MapId, WorldId};

const CHARACTER_RESOURCE: &str = "characters";

/// A character present in a map
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterAttributes {
    /// Character id
    pub character_id: CharacterId,
}

pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/worlds/:world_id/channels/:channel_id/maps/:map_id/characters",
            get(characters_in_map_all_instances),
        )
        .route(
            "/worlds/:world_id/channels/:channel_id/maps/:map_id/instances/:instance/characters",
            get(characters_in_instance),
        )
}

fn characters(ids: Vec<CharacterId>) -> Json<Document<Vec<Resource<CharacterAttributes>>>> {
    collection(
        CHARACTER_RESOURCE,
        ids.into_iter()
            .map(|character_id| CharacterAttributes { character_id }),
        |c| c.character_id.to_string(),
    )
}

async fn characters_in_map_all_instances(
    State(state): State<AppState>,
    TenantContext(ctx): TenantContext,
    path: Result<Path<(WorldId, ChannelId, MapId)>, PathRejection>,
) -> ApiResult<Json<Document<Vec<Resource<CharacterAttributes>>>>> {
    let Path((world_id, channel_id, map_id)) = path?;
    Ok(characters(
        state
            .maps
            .characters_in_map_all_instances(&ctx, world_id, channel_id, map_id),
    ))
}

async fn characters_in_instance(
    State(state): State<AppState>,
    TenantContext(ctx): TenantContext,
    path: Result<Path<(WorldId, ChannelId, MapId, Uuid)>, PathRejection>,
) -> ApiResult<Json<Document<Vec<Resource<CharacterAttributes>>>>> {
    let Path((world_id, channel_id, map_id, instance)) = path?;
    let field = Field::new(world_id, channel_id, map_id).with_instance(instance);
    Ok(characters(state.maps.characters_in_map(&ctx, field)))
}
