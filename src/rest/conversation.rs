// Copyright 2025 Cowboy AI, LLC.

//! NPC conversation routes

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};

use super::context::TenantContext;
use super::jsonapi::{collection, single, ApiResult, Document, NewResource, Resource};
use super::AppState;
use crate::conversation::{Conversation, SeedResult, ValidationResult};

const CONVERSATION_RESOURCE: &str = "conversations";
const VALIDATION_RESOURCE: &str = "validations";
const SEED_RESOURCE: &str = "seed-results";

type ConversationDocument = Json<Document<Resource<Conversation>>>;
type ConversationBody = Result<Json<Document<NewResource<Conversation>>>, JsonRejection>;

pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/npcs/conversations",
            get(list_conversations).post(create_conversation),
        )
        .route("/npcs/conversations/validate", post(validate_conversation))
        .route("/npcs/conversations/seed", post(seed_conversations))
        .route(
            "/npcs/conversations/:id",
            get(get_conversation)
                .patch(update_conversation)
                .delete(delete_conversation),
        )
        .route("/npcs/:npc_id/conversations", get(conversations_by_npc))
}

fn one(conversation: Conversation) -> ConversationDocument {
    single(CONVERSATION_RESOURCE, conversation.id, conversation)
}

async fn list_conversations(
    State(state): State<AppState>,
    TenantContext(ctx): TenantContext,
) -> ApiResult<Json<Document<Vec<Resource<Conversation>>>>> {
    let conversations = state.conversations.list(&ctx).await?;
    Ok(collection(CONVERSATION_RESOURCE, conversations, |c| c.id.to_string()))
}

async fn conversations_by_npc(
    State(state): State<AppState>,
    TenantContext(ctx): TenantContext,
    npc_id: Result<Path<u32>, PathRejection>,
) -> ApiResult<Json<Document<Vec<Resource<Conversation>>>>> {
    let Path(npc_id) = npc_id?;
    let conversations = state.conversations.by_npc(&ctx, npc_id).await?;
    Ok(collection(CONVERSATION_RESOURCE, conversations, |c| c.id.to_string()))
}

async fn get_conversation(
    State(state): State<AppState>,
    TenantContext(ctx): TenantContext,
    id: Result<Path<u32>, PathRejection>,
) -> ApiResult<ConversationDocument> {
    let Path(id) = id?;
    Ok(one(state.conversations.get(&ctx, id).await?))
}

async fn create_conversation(
    State(state): State<AppState>,
    TenantContext(ctx): TenantContext,
    body: ConversationBody,
) -> ApiResult<(StatusCode, ConversationDocument)> {
    let Json(doc) = body?;
    let created = state.conversations.create(&ctx, doc.data.attributes).await?;
    Ok((StatusCode::CREATED, one(created)))
}

async fn update_conversation(
    State(state): State<AppState>,
    TenantContext(ctx): TenantContext,
    id: Result<Path<u32>, PathRejection>,
    body: ConversationBody,
) -> ApiResult<ConversationDocument> {
    let (Path(id), Json(doc)) = (id?, body?);
    Ok(one(state.conversations.update(&ctx, id, doc.data.attributes).await?))
}

async fn delete_conversation(
    State(state): State<AppState>,
    TenantContext(ctx): TenantContext,
    id: Result<Path<u32>, PathRejection>,
) -> ApiResult<StatusCode> {
    let Path(id) = id?;
    state.conversations.delete(&ctx, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Validation needs no tenant data, but the headers are still required.
async fn validate_conversation(
    State(state): State<AppState>,
    TenantContext(_ctx): TenantContext,
    body: ConversationBody,
) -> ApiResult<Json<Document<Resource<ValidationResult>>>> {
    let Json(doc) = body?;
    let conversation = doc.data.attributes;
    let result = state.conversations.validate(&conversation);
    Ok(single(VALIDATION_RESOURCE, conversation.npc_id, result))
}

async fn seed_conversations(
    State(state): State<AppState>,
    TenantContext(ctx): TenantContext,
    body: Result<Json<Document<Vec<NewResource<Conversation>>>>, JsonRejection>,
) -> ApiResult<Json<Document<Resource<SeedResult>>>> {
    let Json(doc) = body?;
    let conversations = doc.data.into_iter().map(|r| r.attributes).collect();
    let result = state.conversations.seed(&ctx, conversations).await?;
    Ok(single(SEED_RESOURCE, ctx.tenant().id, result))
}
