// Copyright 2025 Cowboy AI, LLC.

//! First-visit marks per `(character, map)`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sqlx::PgPool;

use crate::errors::DomainResult;
use crate::field::{CharacterId, MapId};
use crate::persistence::{RetryPolicy, TenantTable};
use crate::tenant::Tenant;

/// A character's first arrival in a map
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Visit {
    /// Visitor
    pub character_id: CharacterId,
    /// Map visited
    pub map_id: MapId,
    /// First arrival
    pub first_visited_at: DateTime<Utc>,
}

/// Durable first-visit marks
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VisitStore: Send + Sync {
    /// Record a visit; `true` when this is the first one
    async fn record_if_absent(
        &self,
        tenant: &Tenant,
        character_id: CharacterId,
        map_id: MapId,
    ) -> DomainResult<bool>;

    /// Whether the character has been to the map
    async fn has_visited(
        &self,
        tenant: &Tenant,
        character_id: CharacterId,
        map_id: MapId,
    ) -> DomainResult<bool>;

    /// Forget every visit of a character; returns how many were removed
    async fn delete_for_character(
        &self,
        tenant: &Tenant,
        character_id: CharacterId,
    ) -> DomainResult<u64>;
}

/// [`VisitStore`] over a [`TenantTable`]
pub struct InMemoryVisitStore {
    table: TenantTable<Visit>,
    write: Mutex<()>,
}

impl Default for InMemoryVisitStore {
    fn default() -> Self {
        Self {
            table: TenantTable::new("visit"),
            write: Mutex::new(()),
        }
    }
}

impl InMemoryVisitStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VisitStore for InMemoryVisitStore {
    async fn record_if_absent(
        &self,
        tenant: &Tenant,
        character_id: CharacterId,
        map_id: MapId,
    ) -> DomainResult<bool> {
        let _guard = self.write.lock();
        let seen = !self
            .table
            .find(tenant, |v| v.character_id == character_id && v.map_id == map_id)
            .is_empty();
        if seen {
            return Ok(false);
        }
        self.table.insert(tenant, |_| {
            Ok(Visit {
                character_id,
                map_id,
                first_visited_at: Utc::now(),
            })
        })?;
        Ok(true)
    }

    async fn has_visited(
        &self,
        tenant: &Tenant,
        character_id: CharacterId,
        map_id: MapId,
    ) -> DomainResult<bool> {
        Ok(!self
            .table
            .find(tenant, |v| v.character_id == character_id && v.map_id == map_id)
            .is_empty())
    }

    async fn delete_for_character(
        &self,
        tenant: &Tenant,
        character_id: CharacterId,
    ) -> DomainResult<u64> {
        let _guard = self.write.lock();
        Ok(self.table.purge_where(tenant, |v| v.character_id == character_id) as u64)
    }
}

/// [`VisitStore`] over the `map_visits` table
pub struct PgVisitStore {
    pool: PgPool,
    retry: RetryPolicy,
}

impl PgVisitStore {
    /// Store over `pool`
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            retry: RetryPolicy::default(),
        }
    }
}

#[async_trait]
impl VisitStore for PgVisitStore {
    async fn record_if_absent(
        &self,
        tenant: &Tenant,
        character_id: CharacterId,
        map_id: MapId,
    ) -> DomainResult<bool> {
        let result = self
            .retry
            .run("visit.record", || async move {
                Ok(sqlx::query(
                    "INSERT INTO map_visits (tenant_id, character_id, map_id) VALUES ($1, $2, $3) \
                     ON CONFLICT (tenant_id, character_id, map_id) DO NOTHING",
                )
                .bind(tenant.id)
                .bind(character_id as i32)
                .bind(map_id as i32)
                .execute(&self.pool)
                .await?)
            })
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn has_visited(
        &self,
        tenant: &Tenant,
        character_id: CharacterId,
        map_id: MapId,
    ) -> DomainResult<bool> {
        let row = self
            .retry
            .run("visit.has_visited", || async move {
                Ok(sqlx::query(
                    "SELECT 1 FROM map_visits \
                     WHERE tenant_id = $1 AND character_id = $2 AND map_id = $3",
                )
                .bind(tenant.id)
                .bind(character_id as i32)
                .bind(map_id as i32)
                .fetch_optional(&self.pool)
                .await?)
            })
            .await?;
        Ok(row.is_some())
    }

    async fn delete_for_character(
        &self,
        tenant: &Tenant,
        character_id: CharacterId,
    ) -> DomainResult<u64> {
        let result = self
            .retry
            .run("visit.delete_for_character", || async move {
                Ok(sqlx::query("DELETE FROM map_visits WHERE tenant_id = $1 AND character_id = $2")
                    .bind(tenant.id)
                    .bind(character_id as i32)
                    .execute(&self.pool)
                    .await?)
            })
            .await?;
        Ok(result.rows_affected())
    }
}
