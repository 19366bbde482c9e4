// Copyright 2025 Cowboy AI, LLC.

//! Account storage routes

use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use super::context::TenantContext;
use super::jsonapi::{collection, single, ApiResult, Document, Resource};
use super::AppState;
use crate::field::{AccountId, WorldId};
use crate::storage::{Asset, Storage};

const STORAGE_RESOURCE: &str = "storages";
const ASSET_RESOURCE: &str = "assets";

/// World selector shared by the storage routes
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldQuery {
    /// World of the storage
    pub world_id: WorldId,
}

pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .route("/storage/accounts/:account_id", get(get_storage))
        .route("/storage/accounts/:account_id/assets", get(list_assets))
        .route("/storage/accounts/:account_id/assets/:asset_id", get(get_asset))
}

async fn get_storage(
    State(state): State<AppState>,
    TenantContext(ctx): TenantContext,
    account_id: Result<Path<AccountId>, PathRejection>,
    query: Result<Query<WorldQuery>, QueryRejection>,
) -> ApiResult<Json<Document<Resource<Storage>>>> {
    let (Path(account_id), Query(query)) = (account_id?, query?);
    let storage = state.storage.get_or_create(&ctx, query.world_id, account_id).await?;
    Ok(single(STORAGE_RESOURCE, storage.id, storage))
}

async fn list_assets(
    State(state): State<AppState>,
    TenantContext(ctx): TenantContext,
    account_id: Result<Path<AccountId>, PathRejection>,
    query: Result<Query<WorldQuery>, QueryRejection>,
) -> ApiResult<Json<Document<Vec<Resource<Asset>>>>> {
    let (Path(account_id), Query(query)) = (account_id?, query?);
    let assets = state.storage.assets(&ctx, query.world_id, account_id).await?;
    Ok(collection(ASSET_RESOURCE, assets, |a| a.id.to_string()))
}

async fn get_asset(
    State(state): State<AppState>,
    TenantContext(ctx): TenantContext,
    path: Result<Path<(AccountId, u32)>, PathRejection>,
    query: Result<Query<WorldQuery>, QueryRejection>,
) -> ApiResult<Json<Document<Resource<Asset>>>> {
    let (Path((account_id, asset_id)), Query(query)) = (path?, query?);
    let asset = state
        .storage
        .asset(&ctx, query.world_id, account_id, asset_id)
        .await?;
    Ok(single(ASSET_RESOURCE, asset.id, asset))
}

#[cfg(test)]
mod tests {
    use super::super::test_state;
    use super::*;
    use crate::storage::AssetBuilder;
    use crate::tenant::test_support;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    #[tokio::test]
    async fn test_assets_are_slotted() {
        let (state, _) = test_state();
        let ctx = test_support::context();
        for template in [2000001, 1302000, 2000000] {
            state
                .storage
                .deposit(&ctx, 0, 11, AssetBuilder::new(template))
                .await
                .unwrap();
        }

        let Json(doc) = list_assets(
            State(state.clone()),
            TenantContext(ctx.clone()),
            Ok(Path(11)),
            Ok(Query(WorldQuery { world_id: 0 })),
        )
        .await
        .unwrap();
        let slots: Vec<(u32, i16)> = doc
            .data
            .iter()
            .map(|r| (r.attributes.template_id, r.attributes.slot))
            .collect();
        assert_eq!(slots, vec![(1302000, 0), (2000000, 0), (2000001, 1)]);

        let asset_id = doc.data[2].attributes.id;
        let Json(one) = get_asset(
            State(state),
            TenantContext(ctx),
            Ok(Path((11, asset_id))),
            Ok(Query(WorldQuery { world_id: 0 })),
        )
        .await
        .unwrap();
        assert_eq!(one.data.attributes.slot, 1);
    }

    #[tokio::test]
    async fn test_unknown_asset_is_not_found() {
        let (state, _) = test_state();
        let err = get_asset(
            State(state),
            TenantContext(test_support::context()),
            Ok(Path((11, 99))),
            Ok(Query(WorldQuery { world_id: 0 })),
        )
        .await
        .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_storage_created_on_first_access() {
        let (state, _) = test_state();
        let Json(doc) = get_storage(
            State(state),
            TenantContext(test_support::context()),
            Ok(Path(11)),
            Ok(Query(WorldQuery { world_id: 1 })),
        )
        .await
        .unwrap();
        assert_eq!(doc.data.kind, "storages");
        assert_eq!(doc.data.attributes.capacity, 4);
        assert_eq!(doc.data.attributes.mesos, 0);
    }
}
