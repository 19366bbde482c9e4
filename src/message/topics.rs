// Copyright 2025 Cowboy AI, LLC.

//! Logical topic names and their configured subjects
//!
//! Code refers to topics by logical name (`EVENT_TOPIC_MAP_STATUS`). The
//! concrete subject is resolved through [`Topics`], which starts from
//! defaults and is overridden by configuration and environment.

use std::collections::HashMap;

/// Portal commands
pub const COMMAND_TOPIC_PORTAL: &str = "COMMAND_TOPIC_PORTAL";
/// Map occupancy status events
pub const EVENT_TOPIC_MAP_STATUS: &str = "EVENT_TOPIC_MAP_STATUS";
/// Asset status events
pub const EVENT_TOPIC_ASSET_STATUS: &str = "EVENT_TOPIC_ASSET_STATUS";
/// Expression events
pub const EVENT_TOPIC_EXPRESSION: &str = "EVENT_TOPIC_EXPRESSION";
/// Invite status events
pub const EVENT_TOPIC_INVITE_STATUS: &str = "EVENT_TOPIC_INVITE_STATUS";
/// Ban status events
pub const EVENT_TOPIC_BAN_STATUS: &str = "EVENT_TOPIC_BAN_STATUS";
/// Saga step commands
pub const COMMAND_TOPIC_SAGA: &str = "COMMAND_TOPIC_SAGA";
/// Saga step status events
pub const EVENT_TOPIC_SAGA_STATUS: &str = "EVENT_TOPIC_SAGA_STATUS";
/// Map script actions
pub const COMMAND_TOPIC_MAP_ACTIONS: &str = "COMMAND_TOPIC_MAP_ACTIONS";
/// Monster and reactor spawn commands
pub const COMMAND_TOPIC_SPAWN: &str = "COMMAND_TOPIC_SPAWN";
/// Character status events consumed by the map engine
pub const EVENT_TOPIC_CHARACTER_STATUS: &str = "EVENT_TOPIC_CHARACTER_STATUS";
/// Account storage commands
pub const COMMAND_TOPIC_STORAGE: &str = "COMMAND_TOPIC_STORAGE";

/// Every logical topic the crate knows about
pub const ALL_TOPICS: [&str; 12] = [
    COMMAND_TOPIC_PORTAL,
    EVENT_TOPIC_MAP_STATUS,
    EVENT_TOPIC_ASSET_STATUS,
    EVENT_TOPIC_EXPRESSION,
    EVENT_TOPIC_INVITE_STATUS,
    EVENT_TOPIC_BAN_STATUS,
    COMMAND_TOPIC_SAGA,
    EVENT_TOPIC_SAGA_STATUS,
    COMMAND_TOPIC_MAP_ACTIONS,
    COMMAND_TOPIC_SPAWN,
    EVENT_TOPIC_CHARACTER_STATUS,
    COMMAND_TOPIC_STORAGE,
];

/// Default subject for a logical topic: lower case, dotted
///
/// `EVENT_TOPIC_MAP_STATUS` becomes `event.topic.map.status`.
pub fn default_subject(logical: &str) -> String {
    logical.to_ascii_lowercase().replace('_', ".")
}

/// Logical topic → subject resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    subjects: HashMap<String, String>,
}

impl Default for Topics {
    fn default() -> Self {
        Self {
            subjects: ALL_TOPICS
                .iter()
                .map(|t| (t.to_string(), default_subject(t)))
                .collect(),
        }
    }
}

impl Topics {
    /// Defaults with `overrides` applied
    pub fn with_overrides(overrides: &HashMap<String, String>) -> Self {
        let mut topics = Self::default();
        for (logical, subject) in overrides {
            topics.set(logical, subject);
        }
        topics
    }

    /// Override using environment variables named after the logical topics
    pub fn apply_env(&mut self) {
        for logical in ALL_TOPICS {
            if let Ok(subject) = std::env::var(logical) {
                if !subject.trim().is_empty() {
                    self.set(logical, subject.trim());
                }
            }
        }
    }

    /// Point `logical` at `subject`
    pub fn set(&mut self, logical: &str, subject: &str) {
        self.subjects
            .insert(logical.to_string(), subject.to_string());
    }

    /// Subject for `logical`, falling back to the default mapping
    pub fn subject(&self, logical: &str) -> String {
        self.subjects
            .get(logical)
            .cloned()
            .unwrap_or_else(|| default_subject(logical))
    }

    /// Reverse lookup from subject to logical name
    pub fn logical(&self, subject: &str) -> Option<&str> {
        self.subjects
            .iter()
            .find(|(_, s)| s.as_str() == subject)
            .map(|(l, _)| l.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_subjects() {
        let topics = Topics::default();
        assert_eq!(topics.subject(EVENT_TOPIC_MAP_STATUS), "event.topic.map.status");
        assert_eq!(topics.logical("command.topic.saga"), Some(COMMAND_TOPIC_SAGA));
    }

    #[test]
    fn test_overrides() {
        let overrides =
            HashMap::from([(EVENT_TOPIC_MAP_STATUS.to_string(), "maps.status".to_string())]);
        let topics = Topics::with_overrides(&overrides);
        assert_eq!(topics.subject(EVENT_TOPIC_MAP_STATUS), "maps.status");
        assert_eq!(topics.subject(COMMAND_TOPIC_PORTAL), "command.topic.portal");
    }
}
