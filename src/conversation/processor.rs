// Copyright 2025 Cowboy AI, LLC.

//! Conversation administration
//!
//! Writes are validated first; a conversation with any structural issue is
//! rejected with every issue listed in the error.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::model::Conversation;
use super::store::ConversationStore;
use super::validator::{validate, ValidationResult};
use crate::errors::{DomainError, DomainResult};
use crate::tenant::Context;

/// Counts reported by a seed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedResult {
    /// Conversations removed first
    pub deleted_count: usize,
    /// Conversations stored
    pub created_count: usize,
    /// Conversations rejected
    pub failed_count: usize,
    /// One line per rejection
    #[serde(default)]
    pub errors: Vec<String>,
}

fn rejection(result: &ValidationResult) -> DomainError {
    let issues: Vec<String> = result
        .errors
        .iter()
        .map(|e| match e.state_id.as_str() {
            "" => format!("{}: {}", e.field, e.message),
            state => format!("{state}.{}: {}", e.field, e.message),
        })
        .collect();
    DomainError::validation(format!("invalid conversation: {}", issues.join("; ")))
}

/// NPC conversation service operations
#[derive(Clone)]
pub struct ConversationProcessor {
    store: Arc<dyn ConversationStore>,
}

impl ConversationProcessor {
    /// Processor over `store`
    pub fn new(store: Arc<dyn ConversationStore>) -> Self {
        Self { store }
    }

    /// Check a conversation without storing it
    pub fn validate(&self, conversation: &Conversation) -> ValidationResult {
        validate(conversation)
    }

    /// Store a new conversation
    pub async fn create(
        &self,
        ctx: &Context,
        conversation: Conversation,
    ) -> DomainResult<Conversation> {
        let result = validate(&conversation);
        if !result.valid {
            return Err(rejection(&result));
        }
        let created = ctx.run(self.store.insert(ctx.tenant(), conversation)).await?;
        info!(
            tenant_id = %ctx.tenant().id,
            conversation_id = created.id,
            npc_id = created.npc_id,
            "Conversation created"
        );
        Ok(created)
    }

    /// Conversation by id
    pub async fn get(&self, ctx: &Context, id: u32) -> DomainResult<Conversation> {
        ctx.run(self.store.get(ctx.tenant(), id)).await
    }

    /// Every conversation of the tenant
    pub async fn list(&self, ctx: &Context) -> DomainResult<Vec<Conversation>> {
        ctx.run(self.store.list(ctx.tenant(), None)).await
    }

    /// Conversations of one NPC
    pub async fn by_npc(&self, ctx: &Context, npc_id: u32) -> DomainResult<Vec<Conversation>> {
        ctx.run(self.store.list(ctx.tenant(), Some(npc_id))).await
    }

    /// Replace a conversation
    pub async fn update(
        &self,
        ctx: &Context,
        id: u32,
        conversation: Conversation,
    ) -> DomainResult<Conversation> {
        let result = validate(&conversation);
        if !result.valid {
            return Err(rejection(&result));
        }
        let updated = ctx.run(self.store.update(ctx.tenant(), id, conversation)).await?;
        debug!(tenant_id = %ctx.tenant().id, conversation_id = id, "Conversation updated");
        Ok(updated)
    }

    /// Remove a conversation
    pub async fn delete(&self, ctx: &Context, id: u32) -> DomainResult<()> {
        ctx.run(self.store.delete(ctx.tenant(), id)).await?;
        info!(tenant_id = %ctx.tenant().id, conversation_id = id, "Conversation deleted");
        Ok(())
    }

    /// Replace every conversation of the tenant with `conversations`
    ///
    /// Invalid entries are counted and skipped; the rest are stored.
    pub async fn seed(
        &self,
        ctx: &Context,
        conversations: Vec<Conversation>,
    ) -> DomainResult<SeedResult> {
        self.seed_with_errors(ctx, conversations, Vec::new()).await
    }

    /// Seed from every `*.json` file in `dir`, one conversation per file
    pub async fn seed_from_dir(&self, ctx: &Context, dir: &Path) -> DomainResult<SeedResult> {
        let (conversations, errors) = load_dir(dir).await?;
        self.seed_with_errors(ctx, conversations, errors).await
    }

    async fn seed_with_errors(
        &self,
        ctx: &Context,
        conversations: Vec<Conversation>,
        load_errors: Vec<String>,
    ) -> DomainResult<SeedResult> {
        let tenant = ctx.tenant();
        let mut result = SeedResult {
            failed_count: load_errors.len(),
            errors: load_errors,
            ..SeedResult::default()
        };
        result.deleted_count = ctx.run(self.store.delete_all(tenant)).await?;

        for conversation in conversations {
            let npc_id = conversation.npc_id;
            match self.create(ctx, conversation).await {
                Ok(_) => result.created_count += 1,
                Err(err) if err.is_validation_error() => {
                    result.failed_count += 1;
                    result.errors.push(format!("npc_{npc_id}: {err}"));
                }
                Err(err) => return Err(err),
            }
        }
        info!(
            tenant_id = %tenant.id,
            deleted = result.deleted_count,
            created = result.created_count,
            failed = result.failed_count,
            "Conversation seed complete"
        );
        Ok(result)
    }
}

async fn load_dir(dir: &Path) -> DomainResult<(Vec<Conversation>, Vec<String>)> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| DomainError::ConfigurationError(format!("{}: {e}", dir.display())))?;
    let mut paths = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| DomainError::ConfigurationError(format!("{}: {e}", dir.display())))?
    {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut conversations = Vec::new();
    let mut errors = Vec::new();
    for path in paths {
        let parsed = tokio::fs::read(&path)
            .await
            .map_err(|e| e.to_string())
            .and_then(|bytes| {
                serde_json::from_slice::<Conversation>(&bytes).map_err(|e| e.to_string())
            });
        match parsed {
            Ok(conversation) => conversations.push(conversation),
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "Skipping unreadable conversation file"
                );
                errors.push(format!("{}: {err}", path.display()));
            }
        }
    }
    Ok((conversations, errors))
}

#[cfg(test)]
mod tests {
    use super::super::model::fixtures::{dialogue, shopkeeper};
    use super::super::store::InMemoryConversationStore;
    use super::*;
    use crate::tenant::test_support;

    fn processor() -> ConversationProcessor {
        ConversationProcessor::new(Arc::new(InMemoryConversationStore::new()))
    }

    fn broken(npc_id: u32) -> Conversation {
        Conversation::new(npc_id, "a", vec![dialogue("a", "Hi", "missing")])
    }

    #[tokio::test]
    async fn test_invalid_conversation_is_rejected() {
        let processor = processor();
        let ctx = test_support::context();

        let err = processor.create(&ctx, broken(1)).await.unwrap_err();
        assert!(err.is_validation_error());
        assert!(err.to_string().contains("'missing' does not exist"));
        assert!(processor.list(&ctx).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_seed_replaces_everything() {
        let processor = processor();
        let ctx = test_support::context();
        processor.create(&ctx, shopkeeper(1)).await.unwrap();
        processor.create(&ctx, shopkeeper(2)).await.unwrap();

        let result = processor
            .seed(&ctx, vec![shopkeeper(3), broken(4), shopkeeper(5)])
            .await
            .unwrap();
        assert_eq!(result.deleted_count, 2);
        assert_eq!(result.created_count, 2);
        assert_eq!(result.failed_count, 1);
        assert!(result.errors[0].starts_with("npc_4:"));

        let npcs: Vec<u32> = processor.list(&ctx).await.unwrap().iter().map(|c| c.npc_id).collect();
        assert_eq!(npcs, vec![3, 5]);
        assert_eq!(processor.by_npc(&ctx, 5).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_seed_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("npc_9001.json"),
            serde_json::to_vec(&shopkeeper(9001)).unwrap(),
        )
        .unwrap();
        std::fs::write(dir.path().join("npc_9002.json"), b"{not json").unwrap();
        std::fs::write(dir.path().join("README.md"), b"ignored").unwrap();

        let processor = processor();
        let ctx = test_support::context();
        let result = processor.seed_from_dir(&ctx, dir.path()).await.unwrap();
        assert_eq!(result.created_count, 1);
        assert_eq!(result.failed_count, 1);
        assert!(result.errors[0].contains("npc_9002.json"));
    }
}
