// Copyright 2025 Cowboy AI, LLC.

//! NPC conversation definitions
//!
//! Conversations are authored as state graphs and checked by the
//! [`validate`] pass before they are stored.

pub mod model;
pub mod processor;
pub mod store;
pub mod validator;

pub use model::{
    AskNumber, Choice, Condition, Conversation, ConversationData, Dialogue, DialogueType,
    GenericAction, ListSelection, Operation, Outcome, State, StateKind,
};
pub use processor::{ConversationProcessor, SeedResult};
pub use store::{ConversationStore, InMemoryConversationStore, PgConversationStore};
pub use validator::{validate, ValidationIssue, ValidationResult};
