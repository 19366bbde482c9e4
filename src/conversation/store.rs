// Copyright 2025 Cowboy AI, LLC.

//! Conversation persistence
//!
//! The graph is stored as one JSON document next to the NPC id.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row as _};

use super::model::{Conversation, ConversationData};
use crate::errors::{DomainError, DomainResult};
use crate::persistence::{RetryPolicy, TenantTable};
use crate::tenant::Tenant;

/// Tenant-scoped conversation persistence
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Store a new conversation; the store assigns the id
    async fn insert(
        &self,
        tenant: &Tenant,
        conversation: Conversation,
    ) -> DomainResult<Conversation>;

    /// Conversation by id
    async fn get(&self, tenant: &Tenant, id: u32) -> DomainResult<Conversation>;

    /// Every conversation, optionally for one NPC
    async fn list(&self, tenant: &Tenant, npc_id: Option<u32>) -> DomainResult<Vec<Conversation>>;

    /// Replace the NPC and graph of a conversation
    async fn update(
        &self,
        tenant: &Tenant,
        id: u32,
        conversation: Conversation,
    ) -> DomainResult<Conversation>;

    /// Remove a conversation
    async fn delete(&self, tenant: &Tenant, id: u32) -> DomainResult<()>;

    /// Remove every conversation of the tenant; returns how many went
    async fn delete_all(&self, tenant: &Tenant) -> DomainResult<usize>;
}

/// [`ConversationStore`] over a [`TenantTable`]
pub struct InMemoryConversationStore {
    table: TenantTable<Conversation>,
}

impl Default for InMemoryConversationStore {
    fn default() -> Self {
        Self {
            table: TenantTable::new("conversation"),
        }
    }
}

impl InMemoryConversationStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn insert(
        &self,
        tenant: &Tenant,
        conversation: Conversation,
    ) -> DomainResult<Conversation> {
        Ok(self
            .table
            .insert(tenant, |id| Ok(Conversation { id, ..conversation }))?
            .entity)
    }

    async fn get(&self, tenant: &Tenant, id: u32) -> DomainResult<Conversation> {
        Ok(self.table.get(tenant, id)?.entity)
    }

    async fn list(&self, tenant: &Tenant, npc_id: Option<u32>) -> DomainResult<Vec<Conversation>> {
        Ok(self
            .table
            .find(tenant, |c| npc_id.map_or(true, |n| c.npc_id == n))
            .into_iter()
            .map(|r| r.entity)
            .collect())
    }

    async fn update(
        &self,
        tenant: &Tenant,
        id: u32,
        conversation: Conversation,
    ) -> DomainResult<Conversation> {
        Ok(self
            .table
            .update(tenant, id, |c| {
                *c = Conversation { id, ..conversation };
                Ok(())
            })?
            .entity)
    }

    async fn delete(&self, tenant: &Tenant, id: u32) -> DomainResult<()> {
        self.table.soft_delete(tenant, id).map(|_| ())
    }

    async fn delete_all(&self, tenant: &Tenant) -> DomainResult<usize> {
        Ok(self.table.soft_delete_where(tenant, |_| true).len())
    }
}

const CONVERSATION_COLUMNS: &str = "id, npc_id, data";

/// [`ConversationStore`] over the `conversations` table
#[derive(Clone)]
pub struct PgConversationStore {
    pool: PgPool,
    retry: RetryPolicy,
}

impl PgConversationStore {
    /// Store over `pool` with the default retry policy
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            retry: RetryPolicy::default(),
        }
    }

    fn from_row(row: &PgRow) -> DomainResult<Conversation> {
        let id: i32 = row.try_get("id")?;
        let npc_id: i32 = row.try_get("npc_id")?;
        let Json(data): Json<ConversationData> = row.try_get("data")?;
        Ok(Conversation {
            id: id as u32,
            npc_id: npc_id as u32,
            data,
        })
    }
}

#[async_trait]
impl ConversationStore for PgConversationStore {
    async fn insert(
        &self,
        tenant: &Tenant,
        conversation: Conversation,
    ) -> DomainResult<Conversation> {
        let sql = format!(
            "INSERT INTO conversations (tenant_id, npc_id, data) VALUES ($1, $2, $3) \
             RETURNING {CONVERSATION_COLUMNS}"
        );
        let (sql, conversation) = (sql.as_str(), &conversation);
        let row = self
            .retry
            .run("conversation.insert", || async move {
                Ok(sqlx::query(sql)
                    .bind(tenant.id)
                    .bind(conversation.npc_id as i32)
                    .bind(Json(&conversation.data))
                    .fetch_one(&self.pool)
                    .await?)
            })
            .await?;
        Self::from_row(&row)
    }

    async fn get(&self, tenant: &Tenant, id: u32) -> DomainResult<Conversation> {
        let sql = format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations \
             WHERE tenant_id = $1 AND deleted_at IS NULL AND id = $2"
        );
        let sql = sql.as_str();
        let row = self
            .retry
            .run("conversation.get", || async move {
                Ok(sqlx::query(sql)
                    .bind(tenant.id)
                    .bind(id as i32)
                    .fetch_optional(&self.pool)
                    .await?)
            })
            .await?;
        row.as_ref()
            .map(Self::from_row)
            .unwrap_or_else(|| Err(DomainError::not_found("conversation", id)))
    }

    async fn list(&self, tenant: &Tenant, npc_id: Option<u32>) -> DomainResult<Vec<Conversation>> {
        let sql = match npc_id {
            Some(_) => format!(
                "SELECT {CONVERSATION_COLUMNS} FROM conversations \
                 WHERE tenant_id = $1 AND deleted_at IS NULL AND npc_id = $2 ORDER BY id"
            ),
            None => format!(
                "SELECT {CONVERSATION_COLUMNS} FROM conversations \
                 WHERE tenant_id = $1 AND deleted_at IS NULL ORDER BY id"
            ),
        };
        let sql = sql.as_str();
        let rows = self
            .retry
            .run("conversation.list", || async move {
                let mut query = sqlx::query(sql).bind(tenant.id);
                if let Some(npc_id) = npc_id {
                    query = query.bind(npc_id as i32);
                }
                Ok(query.fetch_all(&self.pool).await?)
            })
            .await?;
        rows.iter().map(Self::from_row).collect()
    }

    async fn update(
        &self,
        tenant: &Tenant,
        id: u32,
        conversation: Conversation,
    ) -> DomainResult<Conversation> {
        let sql = format!(
            "UPDATE conversations SET npc_id = $3, data = $4, updated_at = NOW() \
             WHERE tenant_id = $1 AND deleted_at IS NULL AND id = $2 \
             RETURNING {CONVERSATION_COLUMNS}"
        );
        let (sql, conversation) = (sql.as_str(), &conversation);
        let row = self
            .retry
            .run("conversation.update", || async move {
                Ok(sqlx::query(sql)
                    .bind(tenant.id)
                    .bind(id as i32)
                    .bind(conversation.npc_id as i32)
                    .bind(Json(&conversation.data))
                    .fetch_optional(&self.pool)
                    .await?)
            })
            .await?;
        row.as_ref()
            .map(Self::from_row)
            .unwrap_or_else(|| Err(DomainError::not_found("conversation", id)))
    }

    async fn delete(&self, tenant: &Tenant, id: u32) -> DomainResult<()> {
        let affected = self
            .retry
            .run("conversation.delete", || async move {
                Ok(sqlx::query(
                    "UPDATE conversations SET deleted_at = NOW(), updated_at = NOW() \
                     WHERE tenant_id = $1 AND deleted_at IS NULL AND id = $2",
                )
                .bind(tenant.id)
                .bind(id as i32)
                .execute(&self.pool)
                .await?
                .rows_affected())
            })
            .await?;
        if affected == 0 {
            return Err(DomainError::not_found("conversation", id));
        }
        Ok(())
    }

    async fn delete_all(&self, tenant: &Tenant) -> DomainResult<usize> {
        let affected = self
            .retry
            .run("conversation.delete_all", || async move {
                Ok(sqlx::query(
                    "UPDATE conversations SET deleted_at = NOW(), updated_at = NOW() \
                     WHERE tenant_id = $1 AND deleted_at IS NULL",
                )
                .bind(tenant.id)
                .execute(&self.pool)
                .await?
                .rows_affected())
            })
            .await?;
        Ok(affected as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::super::model::fixtures::shopkeeper;
    use super::*;
    use crate::tenant::test_support;

    #[tokio::test]
    async fn test_crud() {
        let store = InMemoryConversationStore::new();
        let tenant = test_support::tenant();

        let stored = store.insert(&tenant, shopkeeper(9001)).await.unwrap();
        assert!(stored.id > 0);
        assert_eq!(store.get(&tenant, stored.id).await.unwrap(), stored);

        let moved = store
            .update(&tenant, stored.id, shopkeeper(9002))
            .await
            .unwrap();
        assert_eq!(moved.id, stored.id);
        assert_eq!(store.list(&tenant, Some(9002)).await.unwrap().len(), 1);
        assert!(store.list(&tenant, Some(9001)).await.unwrap().is_empty());

        store.delete(&tenant, stored.id).await.unwrap();
        assert!(store.get(&tenant, stored.id).await.unwrap_err().is_not_found());
        assert!(store.delete(&tenant, stored.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_delete_all_is_tenant_scoped() {
        let store = InMemoryConversationStore::new();
        let t1 = test_support::tenant();
        let t2 = test_support::tenant();
        store.insert(&t1, shopkeeper(1)).await.unwrap();
        store.insert(&t1, shopkeeper(2)).await.unwrap();
        store.insert(&t2, shopkeeper(3)).await.unwrap();

        assert_eq!(store.delete_all(&t1).await.unwrap(), 2);
        assert!(store.list(&t1, None).await.unwrap().is_empty());
        assert_eq!(store.list(&t2, None).await.unwrap().len(), 1);
    }
}
