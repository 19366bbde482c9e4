// Copyright 2025 Cowboy AI, LLC.

//! Versioned saga persistence
//!
//! Every write carries the version the writer read. The store bumps it on
//! success and rejects the write with [`SagaError::StaleVersion`] when
//! someone else got there first.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row as _};
use std::str::FromStr;
use uuid::Uuid;

use super::model::{Saga, SagaError, SagaStatus, SagaType, Step};
use crate::errors::{DomainError, DomainResult};
use crate::persistence::RetryPolicy;
use crate::registry::TenantRegistry;
use crate::tenant::Tenant;

/// Tenant-scoped saga persistence with optimistic concurrency
#[async_trait]
pub trait SagaStore: Send + Sync {
    /// Store a new saga at version 1
    async fn insert(&self, tenant: &Tenant, saga: &Saga) -> DomainResult<Saga>;

    /// Saga by transaction id
    async fn get(&self, tenant: &Tenant, transaction_id: Uuid) -> DomainResult<Saga>;

    /// Replace a saga read at `saga.version`; returns it at the next version
    async fn update(&self, tenant: &Tenant, saga: &Saga) -> DomainResult<Saga>;

    /// Sagas still active or compensating
    async fn unfinished(&self, tenant: &Tenant) -> DomainResult<Vec<Saga>>;
}

/// [`SagaStore`] over a [`TenantRegistry`]
pub struct InMemorySagaStore {
    sagas: TenantRegistry<Uuid, Saga>,
}

impl Default for InMemorySagaStore {
    fn default() -> Self {
        Self {
            sagas: TenantRegistry::new("saga"),
        }
    }
}

impl InMemorySagaStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SagaStore for InMemorySagaStore {
    async fn insert(&self, tenant: &Tenant, saga: &Saga) -> DomainResult<Saga> {
        let slot = self.sagas.get_or_create(tenant);
        let mut entries = slot.write();
        if entries.contains_key(&saga.transaction_id) {
            return Err(DomainError::conflict(format!(
                "saga {} already exists",
                saga.transaction_id
            )));
        }
        let stored = Saga {
            version: 1,
            ..saga.clone()
        };
        entries.insert(saga.transaction_id, stored.clone());
        Ok(stored)
    }

    async fn get(&self, tenant: &Tenant, transaction_id: Uuid) -> DomainResult<Saga> {
        self.sagas
            .get(tenant, &transaction_id)
            .ok_or_else(|| DomainError::not_found("saga", transaction_id))
    }

    async fn update(&self, tenant: &Tenant, saga: &Saga) -> DomainResult<Saga> {
        let slot = self
            .sagas
            .slot(tenant)
            .ok_or_else(|| DomainError::not_found("saga", saga.transaction_id))?;
        let mut entries = slot.write();
        let current = entries
            .get_mut(&saga.transaction_id)
            .ok_or_else(|| DomainError::not_found("saga", saga.transaction_id))?;
        if current.version != saga.version {
            return Err(SagaError::StaleVersion {
                transaction_id: saga.transaction_id,
                expected: saga.version,
                actual: current.version,
            }
            .into());
        }
        *current = Saga {
            version: saga.version + 1,
            updated_at: Utc::now(),
            ..saga.clone()
        };
        Ok(current.clone())
    }

    async fn unfinished(&self, tenant: &Tenant) -> DomainResult<Vec<Saga>> {
        let mut sagas: Vec<Saga> = self
            .sagas
            .for_tenant(tenant)
            .into_iter()
            .filter(|s| !s.status.is_terminal())
            .collect();
        sagas.sort_by_key(|s| s.created_at);
        Ok(sagas)
    }
}

const SAGA_COLUMNS: &str =
    "transaction_id, saga_type, initiated_by, status, steps, version, created_at, updated_at";

/// [`SagaStore`] over the `sagas` table
#[derive(Clone)]
pub struct PgSagaStore {
    pool: PgPool,
    retry: RetryPolicy,
}

impl PgSagaStore {
    /// Store over `pool` with the default retry policy
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            retry: RetryPolicy::default(),
        }
    }

    fn from_row(row: &PgRow) -> DomainResult<Saga> {
        let saga_type: String = row.try_get("saga_type")?;
        let status: String = row.try_get("status")?;
        let version: i64 = row.try_get("version")?;
        let Json(steps): Json<Vec<Step>> = row.try_get("steps")?;
        Ok(Saga {
            transaction_id: row.try_get("transaction_id")?,
            saga_type: SagaType::from_str(&saga_type)?,
            initiated_by: row.try_get("initiated_by")?,
            status: SagaStatus::from_str(&status)?,
            steps,
            version: version.max(0) as u64,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl SagaStore for PgSagaStore {
    async fn insert(&self, tenant: &Tenant, saga: &Saga) -> DomainResult<Saga> {
        let sql = format!(
            "INSERT INTO sagas (tenant_id, transaction_id, saga_type, initiated_by, status, steps, \
             version, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, 1, $7, $7) RETURNING {SAGA_COLUMNS}"
        );
        let sql = sql.as_str();
        let row = self
            .retry
            .run("saga.insert", || async move {
                Ok(sqlx::query(sql)
                    .bind(tenant.id)
                    .bind(saga.transaction_id)
                    .bind(saga.saga_type.as_str())
                    .bind(saga.initiated_by.as_str())
                    .bind(saga.status.as_str())
                    .bind(Json(&saga.steps))
                    .bind(saga.created_at)
                    .fetch_one(&self.pool)
                    .await?)
            })
            .await?;
        Self::from_row(&row)
    }

    async fn get(&self, tenant: &Tenant, transaction_id: Uuid) -> DomainResult<Saga> {
        let sql = format!(
            "SELECT {SAGA_COLUMNS} FROM sagas WHERE tenant_id = $1 AND transaction_id = $2"
        );
        let sql = sql.as_str();
        let row = self
            .retry
            .run("saga.get", || async move {
                Ok(sqlx::query(sql)
                    .bind(tenant.id)
                    .bind(transaction_id)
                    .fetch_optional(&self.pool)
                    .await?)
            })
            .await?;
        row.as_ref()
            .map(Self::from_row)
            .unwrap_or_else(|| Err(DomainError::not_found("saga", transaction_id)))
    }

    async fn update(&self, tenant: &Tenant, saga: &Saga) -> DomainResult<Saga> {
        let sql = format!(
            "UPDATE sagas SET status = $3, steps = $4, version = version + 1, updated_at = NOW() \
             WHERE tenant_id = $1 AND transaction_id = $2 AND version = $5 RETURNING {SAGA_COLUMNS}"
        );
        let sql = sql.as_str();
        let row = self
            .retry
            .run("saga.update", || async move {
                Ok(sqlx::query(sql)
                    .bind(tenant.id)
                    .bind(saga.transaction_id)
                    .bind(saga.status.as_str())
                    .bind(Json(&saga.steps))
                    .bind(saga.version as i64)
                    .fetch_optional(&self.pool)
                    .await?)
            })
            .await?;
        match row {
            Some(row) => Self::from_row(&row),
            None => {
                let current = self.get(tenant, saga.transaction_id).await?;
                Err(SagaError::StaleVersion {
                    transaction_id: saga.transaction_id,
                    expected: saga.version,
                    actual: current.version,
                }
                .into())
            }
        }
    }

    async fn unfinished(&self, tenant: &Tenant) -> DomainResult<Vec<Saga>> {
        let sql = format!(
            "SELECT {SAGA_COLUMNS} FROM sagas \
             WHERE tenant_id = $1 AND status IN ('active', 'compensating') \
             ORDER BY created_at"
        );
        let sql = sql.as_str();
        let rows = self
            .retry
            .run("saga.unfinished", || async move {
                Ok(sqlx::query(sql).bind(tenant.id).fetch_all(&self.pool).await?)
            })
            .await?;
        rows.iter().map(Self::from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::model::fixtures::quest_reward;
    use super::*;
    use crate::saga::model::StepStatus;
    use crate::tenant::test_support;

    #[tokio::test]
    async fn test_insert_get_and_duplicate() {
        let store = InMemorySagaStore::new();
        let tenant = test_support::tenant();
        let saga = quest_reward();

        let stored = store.insert(&tenant, &saga).await.unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(store.get(&tenant, saga.transaction_id).await.unwrap(), stored);

        let err = store.insert(&tenant, &saga).await.unwrap_err();
        assert!(matches!(err, DomainError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_stale_write_is_rejected() {
        let store = InMemorySagaStore::new();
        let tenant = test_support::tenant();
        let stored = store.insert(&tenant, &quest_reward()).await.unwrap();

        let mut first = stored.clone();
        first
            .set_step_status("experience", StepStatus::Completed, Utc::now())
            .unwrap();
        let first = store.update(&tenant, &first).await.unwrap();
        assert_eq!(first.version, 2);

        let mut second = stored;
        second
            .set_step_status("experience", StepStatus::Failed, Utc::now())
            .unwrap();
        let err = store.update(&tenant, &second).await.unwrap_err();
        assert!(err.is_concurrency_error());
        assert_eq!(
            store.get(&tenant, first.transaction_id).await.unwrap().steps[0].status,
            StepStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_tenant_isolation_and_unfinished() {
        let store = InMemorySagaStore::new();
        let t1 = test_support::tenant();
        let t2 = test_support::tenant();
        let saga = store.insert(&t1, &quest_reward()).await.unwrap();

        assert!(store.get(&t2, saga.transaction_id).await.unwrap_err().is_not_found());
        assert!(store.update(&t2, &saga).await.unwrap_err().is_not_found());
        assert_eq!(store.unfinished(&t1).await.unwrap().len(), 1);

        let done = Saga {
            status: SagaStatus::Completed,
            ..saga
        };
        store.update(&t1, &done).await.unwrap();
        assert!(store.unfinished(&t1).await.unwrap().is_empty());
    }
}
