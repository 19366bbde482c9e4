// Copyright 2025 Cowboy AI, LLC.

//! Ban storage
//!
//! Every query takes the tenant and excludes soft-deleted rows. "Active"
//! is evaluated by the store against the supplied `now`: permanent, or
//! expiring strictly later.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row as _};

use super::model::{Ban, BanBuilder, BanType};
use crate::errors::{DomainError, DomainResult};
use crate::persistence::{RetryPolicy, TenantTable};
use crate::tenant::Tenant;

/// Tenant-scoped ban persistence
#[async_trait]
pub trait BanStore: Send + Sync {
    /// Insert a validated ban; the store assigns the id
    async fn insert(&self, tenant: &Tenant, ban: BanBuilder) -> DomainResult<Ban>;

    /// Ban by id
    async fn get(&self, tenant: &Tenant, id: u32) -> DomainResult<Ban>;

    /// Every ban of the tenant, optionally of one type
    async fn list(&self, tenant: &Tenant, ban_type: Option<BanType>) -> DomainResult<Vec<Ban>>;

    /// Active bans of `ban_type` with exactly `value`
    async fn active_by_value(
        &self,
        tenant: &Tenant,
        ban_type: BanType,
        value: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<Vec<Ban>>;

    /// Every active ban of `ban_type`
    async fn active_by_type(
        &self,
        tenant: &Tenant,
        ban_type: BanType,
        now: DateTime<Utc>,
    ) -> DomainResult<Vec<Ban>>;

    /// Soft delete by id
    async fn delete(&self, tenant: &Tenant, id: u32) -> DomainResult<Ban>;

    /// Soft delete every temporary ban expiring at or before `now`
    async fn delete_expired(&self, tenant: &Tenant, now: DateTime<Utc>) -> DomainResult<Vec<Ban>>;
}

/// [`BanStore`] over a [`TenantTable`]
pub struct InMemoryBanStore {
    table: TenantTable<Ban>,
}

impl Default for InMemoryBanStore {
    fn default() -> Self {
        Self {
            table: TenantTable::new("ban"),
        }
    }
}

impl InMemoryBanStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn select<P>(&self, tenant: &Tenant, predicate: P) -> Vec<Ban>
    where
        P: Fn(&Ban) -> bool,
    {
        self.table
            .find(tenant, predicate)
            .into_iter()
            .map(|r| r.entity)
            .collect()
    }
}

#[async_trait]
impl BanStore for InMemoryBanStore {
    async fn insert(&self, tenant: &Tenant, ban: BanBuilder) -> DomainResult<Ban> {
        ban.validate()?;
        let row = self.table.insert(tenant, |id| ban.id(id).build())?;
        Ok(row.entity)
    }

    async fn get(&self, tenant: &Tenant, id: u32) -> DomainResult<Ban> {
        Ok(self.table.get(tenant, id)?.entity)
    }

    async fn list(&self, tenant: &Tenant, ban_type: Option<BanType>) -> DomainResult<Vec<Ban>> {
        Ok(self.select(tenant, |b| ban_type.map_or(true, |t| b.ban_type() == t)))
    }

    async fn active_by_value(
        &self,
        tenant: &Tenant,
        ban_type: BanType,
        value: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<Vec<Ban>> {
        Ok(self.select(tenant, |b| {
            b.ban_type() == ban_type && b.value() == value && b.is_active(now)
        }))
    }

    async fn active_by_type(
        &self,
        tenant: &Tenant,
        ban_type: BanType,
        now: DateTime<Utc>,
    ) -> DomainResult<Vec<Ban>> {
        Ok(self.select(tenant, |b| b.ban_type() == ban_type && b.is_active(now)))
    }

    async fn delete(&self, tenant: &Tenant, id: u32) -> DomainResult<Ban> {
        Ok(self.table.soft_delete(tenant, id)?.entity)
    }

    async fn delete_expired(&self, tenant: &Tenant, now: DateTime<Utc>) -> DomainResult<Vec<Ban>> {
        Ok(self
            .table
            .soft_delete_where(tenant, |b| !b.permanent() && !b.is_active(now))
            .into_iter()
            .map(|r| r.entity)
            .collect())
    }
}

const BAN_COLUMNS: &str = "id, ban_type, value, reason, reason_code, permanent, expires_at, \
                           issued_by, created_at, updated_at";

/// [`BanStore`] backed by the `bans` table
#[derive(Clone)]
pub struct PgBanStore {
    pool: PgPool,
    retry: RetryPolicy,
}

impl PgBanStore {
    /// Store over `pool` with the default retry policy
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            retry: RetryPolicy::default(),
        }
    }

    fn from_row(row: &PgRow) -> DomainResult<Ban> {
        let ban_type: i16 = row.try_get("ban_type")?;
        let reason_code: i16 = row.try_get("reason_code")?;
        let id: i32 = row.try_get("id")?;
        let ban_type = u8::try_from(ban_type)
            .map_err(|_| DomainError::SerializationError(format!("ban type {ban_type}")))
            .and_then(BanType::try_from)?;
        BanBuilder::new(ban_type, row.try_get::<String, _>("value")?)
            .id(id as u32)
            .reason(row.try_get::<String, _>("reason")?)
            .reason_code(reason_code.clamp(0, u8::MAX as i16) as u8)
            .permanent(row.try_get("permanent")?)
            .expires_at(row.try_get("expires_at")?)
            .issued_by(row.try_get::<String, _>("issued_by")?)
            .created_at(row.try_get("created_at")?)
            .updated_at(row.try_get("updated_at")?)
            .build()
    }

    async fn fetch(
        &self,
        operation: &str,
        sql: &str,
        tenant: &Tenant,
        bind: Binds<'_>,
    ) -> DomainResult<Vec<Ban>> {
        let rows = self
            .retry
            .run(operation, || async move {
                let mut query = sqlx::query(sql).bind(tenant.id);
                if let Some(ban_type) = bind.ban_type {
                    query = query.bind(i16::from(u8::from(ban_type)));
                }
                if let Some(value) = bind.value {
                    query = query.bind(value);
                }
                if let Some(now) = bind.now {
                    query = query.bind(now);
                }
                if let Some(id) = bind.id {
                    query = query.bind(id as i32);
                }
                Ok(query.fetch_all(&self.pool).await?)
            })
            .await?;
        rows.iter().map(Self::from_row).collect()
    }
}

#[derive(Default, Clone, Copy)]
struct Binds<'a> {
    ban_type: Option<BanType>,
    value: Option<&'a str>,
    now: Option<DateTime<Utc>>,
    id: Option<u32>,
}

#[async_trait]
impl BanStore for PgBanStore {
    async fn insert(&self, tenant: &Tenant, ban: BanBuilder) -> DomainResult<Ban> {
        let ban_type = ban.validate()?;
        let draft = ban.id(0).build()?;
        let sql = format!(
            "INSERT INTO bans \
             (tenant_id, ban_type, value, reason, reason_code, permanent, expires_at, issued_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {BAN_COLUMNS}"
        );
        let (sql, draft) = (sql.as_str(), &draft);
        let row = self
            .retry
            .run("ban.insert", || async move {
                Ok(sqlx::query(sql)
                    .bind(tenant.id)
                    .bind(i16::from(u8::from(ban_type)))
                    .bind(draft.value())
                    .bind(draft.reason())
                    .bind(i16::from(draft.reason_code()))
                    .bind(draft.permanent())
                    .bind(draft.expires_at())
                    .bind(draft.issued_by())
                    .fetch_one(&self.pool)
                    .await?)
            })
            .await?;
        Self::from_row(&row)
    }

    async fn get(&self, tenant: &Tenant, id: u32) -> DomainResult<Ban> {
        let sql = format!(
            "SELECT {BAN_COLUMNS} FROM bans WHERE tenant_id = $1 AND deleted_at IS NULL AND id = $2"
        );
        let binds = Binds {
            id: Some(id),
            ..Binds::default()
        };
        self.fetch("ban.get", &sql, tenant, binds)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DomainError::not_found("ban", id))
    }

    async fn list(&self, tenant: &Tenant, ban_type: Option<BanType>) -> DomainResult<Vec<Ban>> {
        let sql = match ban_type {
            Some(_) => format!(
                "SELECT {BAN_COLUMNS} FROM bans \
                 WHERE tenant_id = $1 AND deleted_at IS NULL AND ban_type = $2 ORDER BY id"
            ),
            None => format!(
                "SELECT {BAN_COLUMNS} FROM bans \
                 WHERE tenant_id = $1 AND deleted_at IS NULL ORDER BY id"
            ),
        };
        let binds = Binds {
            ban_type,
            ..Binds::default()
        };
        self.fetch("ban.list", &sql, tenant, binds).await
    }

    async fn active_by_value(
        &self,
        tenant: &Tenant,
        ban_type: BanType,
        value: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<Vec<Ban>> {
        let sql = format!(
            "SELECT {BAN_COLUMNS} FROM bans WHERE tenant_id = $1 AND deleted_at IS NULL \
             AND ban_type = $2 AND value = $3 AND (permanent OR expires_at > $4) ORDER BY id"
        );
        let binds = Binds {
            ban_type: Some(ban_type),
            value: Some(value),
            now: Some(now),
            id: None,
        };
        self.fetch("ban.active_by_value", &sql, tenant, binds).await
    }

    async fn active_by_type(
        &self,
        tenant: &Tenant,
        ban_type: BanType,
        now: DateTime<Utc>,
    ) -> DomainResult<Vec<Ban>> {
        let sql = format!(
            "SELECT {BAN_COLUMNS} FROM bans WHERE tenant_id = $1 AND deleted_at IS NULL \
             AND ban_type = $2 AND (permanent OR expires_at > $3) ORDER BY id"
        );
        let binds = Binds {
            ban_type: Some(ban_type),
            now: Some(now),
            ..Binds::default()
        };
        self.fetch("ban.active_by_type", &sql, tenant, binds).await
    }

    async fn delete(&self, tenant: &Tenant, id: u32) -> DomainResult<Ban> {
        let sql = format!(
            "UPDATE bans SET deleted_at = NOW(), updated_at = NOW() \
             WHERE tenant_id = $1 AND deleted_at IS NULL AND id = $2 RETURNING {BAN_COLUMNS}"
        );
        let binds = Binds {
            id: Some(id),
            ..Binds::default()
        };
        self.fetch("ban.delete", &sql, tenant, binds)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DomainError::not_found("ban", id))
    }

    async fn delete_expired(&self, tenant: &Tenant, now: DateTime<Utc>) -> DomainResult<Vec<Ban>> {
        let sql = format!(
            "UPDATE bans SET deleted_at = NOW(), updated_at = NOW() \
             WHERE tenant_id = $1 AND deleted_at IS NULL AND NOT permanent AND expires_at <= $2 \
             RETURNING {BAN_COLUMNS}"
        );
        let binds = Binds {
            now: Some(now),
            ..Binds::default()
        };
        self.fetch("ban.delete_expired", &sql, tenant, binds).await
    }
}
