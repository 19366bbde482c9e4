// Copyright 2025 Cowboy AI, LLC.

//! Ban and login history routes

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::context::TenantContext;
use super::jsonapi::{collection, single, ApiResult, Document, NewResource, Resource};
use super::AppState;
use crate::ban::{Ban, BanBuilder, BanType, LoginAttempt, LoginRecord};
use crate::errors::DomainError;
use crate::field::AccountId;

const BAN_RESOURCE: &str = "bans";
const LOGIN_HISTORY_RESOURCE: &str = "login-history";

/// Attributes accepted by `POST /bans`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BanAttributes {
    /// 0 address, 1 hardware id, 2 account
    pub ban_type: BanType,
    /// What the ban matches
    pub value: String,
    /// Free-text reason
    #[serde(default)]
    pub reason: String,
    /// Client-facing reason code
    #[serde(default)]
    pub reason_code: u8,
    /// Never expires
    #[serde(default)]
    pub permanent: bool,
    /// Expiration of a temporary ban
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Issuing administrator
    #[serde(default)]
    pub issued_by: String,
}

impl BanAttributes {
    fn builder(self) -> BanBuilder {
        BanBuilder::new(self.ban_type, self.value)
            .reason(self.reason)
            .reason_code(self.reason_code)
            .permanent(self.permanent)
            .expires_at(self.expires_at)
            .issued_by(self.issued_by)
    }
}

/// `GET /bans` filter
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Ban type as its integer code
    #[serde(rename = "type")]
    pub ban_type: Option<u8>,
}

/// `GET /bans/check` parameters
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckQuery {
    /// Client address
    #[serde(default)]
    pub ip: String,
    /// Client hardware id
    #[serde(default)]
    pub hwid: String,
    /// Account id
    #[serde(default)]
    pub account_id: AccountId,
}

/// `GET /history` filter; at most one criterion applies
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    /// Attempts of one account
    pub account_id: Option<AccountId>,
    /// Attempts from one address
    pub ip: Option<String>,
    /// Attempts from one hardware id
    pub hwid: Option<String>,
}

/// Attributes accepted by `POST /history`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginAttemptAttributes {
    /// Account that attempted the login
    pub account_id: AccountId,
    /// Account name as typed
    pub account_name: String,
    /// Client address
    #[serde(default)]
    pub ip_address: String,
    /// Client hardware id
    #[serde(default)]
    pub hwid: String,
    /// Whether the login succeeded
    pub success: bool,
    /// Why the login failed
    #[serde(default)]
    pub failure_reason: String,
}

pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .route("/bans", get(list_bans).post(create_ban))
        .route("/bans/check", get(check_ban))
        .route("/bans/:id", get(get_ban).delete(delete_ban))
        .route("/history", get(list_history).post(record_login))
}

async fn create_ban(
    State(state): State<AppState>,
    TenantContext(ctx): TenantContext,
    body: Result<Json<Document<NewResource<BanAttributes>>>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Document<Resource<Ban>>>)> {
    let Json(doc) = body?;
    let ban = state.bans.create(&ctx, doc.data.attributes.builder()).await?;
    Ok((StatusCode::CREATED, single(BAN_RESOURCE, ban.id(), ban)))
}

async fn list_bans(
    State(state): State<AppState>,
    TenantContext(ctx): TenantContext,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<Json<Document<Vec<Resource<Ban>>>>> {
    let Query(query) = query?;
    let ban_type = query.ban_type.map(BanType::try_from).transpose()?;
    let bans = state.bans.list(&ctx, ban_type).await?;
    Ok(collection(BAN_RESOURCE, bans, |b| b.id().to_string()))
}

async fn get_ban(
    State(state): State<AppState>,
    TenantContext(ctx): TenantContext,
    id: Result<Path<u32>, PathRejection>,
) -> ApiResult<Json<Document<Resource<Ban>>>> {
    let Path(id) = id?;
    let ban = state.bans.get(&ctx, id).await?;
    Ok(single(BAN_RESOURCE, ban.id(), ban))
}

async fn delete_ban(
    State(state): State<AppState>,
    TenantContext(ctx): TenantContext,
    id: Result<Path<u32>, PathRejection>,
) -> ApiResult<StatusCode> {
    let Path(id) = id?;
    state.bans.delete(&ctx, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn check_ban(
    State(state): State<AppState>,
    TenantContext(ctx): TenantContext,
    query: Result<Query<CheckQuery>, QueryRejection>,
) -> ApiResult<Json<Document<Option<Resource<Ban>>>>> {
    let Query(query) = query?;
    if query.ip.is_empty() && query.hwid.is_empty() && query.account_id == 0 {
        return Err(DomainError::validation("one of ip, hwid or accountId is required").into());
    }
    let ban = state
        .bans
        .check_ban(&ctx, &query.ip, &query.hwid, query.account_id)
        .await?;
    Ok(Json(Document::new(
        ban.map(|b| Resource::new(BAN_RESOURCE, b.id(), b)),
    )))
}

async fn list_history(
    State(state): State<AppState>,
    TenantContext(ctx): TenantContext,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> ApiResult<Json<Document<Vec<Resource<LoginRecord>>>>> {
    let Query(query) = query?;
    let tenant = ctx.tenant();
    let records = match (query.account_id, query.ip, query.hwid) {
        (Some(account_id), None, None) => state.history.by_account(tenant, account_id).await?,
        (None, Some(ip), None) => state.history.by_ip(tenant, &ip).await?,
        (None, None, Some(hwid)) => state.history.by_hwid(tenant, &hwid).await?,
        (None, None, None) => state.history.by_tenant(tenant).await?,
        _ => return Err(DomainError::validation("filter by one of accountId, ip or hwid").into()),
    };
    Ok(collection(LOGIN_HISTORY_RESOURCE, records, |r| r.id.to_string()))
}

async fn record_login(
    State(state): State<AppState>,
    TenantContext(ctx): TenantContext,
    body: Result<Json<Document<NewResource<LoginAttemptAttributes>>>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Document<Resource<LoginRecord>>>)> {
    let Json(doc) = body?;
    let a = doc.data.attributes;
    let record = state
        .history
        .record(
            ctx.tenant(),
            LoginAttempt {
                account_id: a.account_id,
                account_name: a.account_name,
                ip_address: a.ip_address,
                hwid: a.hwid,
                success: a.success,
                failure_reason: a.failure_reason,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, single(LOGIN_HISTORY_RESOURCE, record.id, record)))
}
