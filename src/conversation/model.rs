// Copyright 2025 Cowboy AI, LLC.

//! NPC conversation graphs
//!
//! A conversation is a set of named states. Each state points at the
//! states that may follow it; an empty `nextState` ends the conversation.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How a dialogue is presented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DialogueType {
    /// Single OK button
    SendOk,
    /// Yes and no buttons
    SendYesNo,
    /// Next button
    SendNext,
    /// Previous button
    SendPrev,
    /// Previous and next buttons
    SendNextPrev,
    /// Free text with inline selections
    SendSimple,
}

impl DialogueType {
    /// Number of choices the client renders, exit included
    pub fn required_choices(self) -> Option<usize> {
        match self {
            DialogueType::SendOk | DialogueType::SendNext | DialogueType::SendPrev => Some(2),
            DialogueType::SendYesNo | DialogueType::SendNextPrev => Some(3),
            DialogueType::SendSimple => None,
        }
    }
}

/// One selectable answer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Choice {
    /// Label
    pub text: String,
    /// State that follows, empty to end the conversation
    #[serde(default)]
    pub next_state: String,
    /// Values written into the conversation context when chosen
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, String>,
}

impl Choice {
    /// Choice labelled `text` leading to `next_state`
    pub fn new(text: impl Into<String>, next_state: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            next_state: next_state.into(),
            context: HashMap::new(),
        }
    }
}

/// NPC speech with buttons
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dialogue {
    /// Presentation
    pub dialogue_type: DialogueType,
    /// Text
    pub text: String,
    /// Speaker override
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub speaker: String,
    /// Buttons
    #[serde(default)]
    pub choices: Vec<Choice>,
}

/// Side effect run by a generic action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    /// Operation name, such as `award_item`
    pub operation_type: String,
    /// Operation parameters
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub params: HashMap<String, String>,
}

/// Predicate guarding an outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// What is tested, such as `item` or `meso`
    #[serde(rename = "type")]
    pub condition_type: String,
    /// Comparison
    pub operator: String,
    /// Operand
    pub value: String,
    /// Subject of the test, such as an item id
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reference_id: String,
}

/// Branch taken after a generic action when every condition holds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    /// Guards; none means always
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// State that follows
    #[serde(default)]
    pub next_state: String,
}

/// Server-side operations followed by a conditional branch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenericAction {
    /// Operations, in order
    #[serde(default)]
    pub operations: Vec<Operation>,
    /// Branches, first match wins
    #[serde(default)]
    pub outcomes: Vec<Outcome>,
}

/// Menu of choices
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSelection {
    /// Heading
    pub title: String,
    /// Entries
    #[serde(default)]
    pub choices: Vec<Choice>,
}

/// Numeric prompt
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskNumber {
    /// Prompt
    pub text: String,
    /// Pre-filled value
    #[serde(default)]
    pub default_value: u32,
    /// Lower bound
    #[serde(default)]
    pub min_value: u32,
    /// Upper bound
    #[serde(default)]
    pub max_value: u32,
    /// Context key the answer is stored under
    #[serde(default)]
    pub context_key: String,
    /// State that follows
    #[serde(default)]
    pub next_state: String,
}

/// State variant with its payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stateType", rename_all = "camelCase")]
pub enum StateKind {
    /// NPC speech
    Dialogue {
        /// Payload
        dialogue: Dialogue,
    },
    /// Operations and branches
    GenericAction {
        /// Payload
        #[serde(rename = "genericAction")]
        generic_action: GenericAction,
    },
    /// Menu
    ListSelection {
        /// Payload
        #[serde(rename = "listSelection")]
        list_selection: ListSelection,
    },
    /// Numeric prompt
    AskNumber {
        /// Payload
        #[serde(rename = "askNumber")]
        ask_number: AskNumber,
    },
}

/// One node of the graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    /// Unique within the conversation
    pub id: String,
    /// Variant
    #[serde(flatten)]
    pub kind: StateKind,
}

impl State {
    /// Wire name of the variant
    pub fn type_name(&self) -> &'static str {
        match self.kind {
            StateKind::Dialogue { .. } => "dialogue",
            StateKind::GenericAction { .. } => "genericAction",
            StateKind::ListSelection { .. } => "listSelection",
            StateKind::AskNumber { .. } => "askNumber",
        }
    }

    /// Every successor reference, empty strings included
    pub fn next_states(&self) -> Vec<&str> {
        match &self.kind {
            StateKind::Dialogue { dialogue } => {
                dialogue.choices.iter().map(|c| c.next_state.as_str()).collect()
            }
            StateKind::GenericAction { generic_action } => generic_action
                .outcomes
                .iter()
                .map(|o| o.next_state.as_str())
                .collect(),
            StateKind::ListSelection { list_selection } => list_selection
                .choices
                .iter()
                .map(|c| c.next_state.as_str())
                .collect(),
            StateKind::AskNumber { ask_number } => vec![ask_number.next_state.as_str()],
        }
    }
}

/// Graph body, as stored
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationData {
    /// Entry state
    #[serde(default)]
    pub start_state: String,
    /// Nodes
    #[serde(default)]
    pub states: Vec<State>,
}

/// A stored conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Row id
    #[serde(default)]
    pub id: u32,
    /// NPC the conversation belongs to
    pub npc_id: u32,
    /// Graph
    #[serde(flatten)]
    pub data: ConversationData,
}

impl Conversation {
    /// Conversation for `npc_id` entering at `start_state`
    pub fn new(npc_id: u32, start_state: impl Into<String>, states: Vec<State>) -> Self {
        Self {
            id: 0,
            npc_id,
            data: ConversationData {
                start_state: start_state.into(),
                states,
            },
        }
    }

    /// Entry state id
    pub fn start_state(&self) -> &str {
        &self.data.start_state
    }

    /// Nodes
    pub fn states(&self) -> &[State] {
        &self.data.states
    }

    /// State by id
    pub fn state(&self, id: &str) -> Option<&State> {
        self.data.states.iter().find(|s| s.id == id)
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_format() {
        let conversation = shopkeeper(9001);
        let value = serde_json::to_value(&conversation).unwrap();
        assert_eq!(value["npcId"], 9001);
        assert_eq!(value["startState"], "greeting");
        assert_eq!(value["states"][0]["stateType"], "listSelection");
        assert_eq!(value["states"][0]["listSelection"]["choices"][0]["nextState"], "shop");
        assert_eq!(value["states"][1]["dialogue"]["dialogueType"], "sendNext");

        let back: Conversation = serde_json::from_value(value).unwrap();
        assert_eq!(back, conversation);
    }

    #[test]
    fn test_generic_action_parses() {
        let state: State = serde_json::from_value(json!({
            "id": "check",
            "stateType": "genericAction",
            "genericAction": {
                "operations": [{"operationType": "award_exp", "params": {"amount": "5000"}}],
                "outcomes": [
                    {
                        "conditions": [
                            {
                                "type": "item",
                                "operator": ">=",
                                "value": "3",
                                "referenceId": "4000313"
                            }
                        ],
                        "nextState": "done"
                    },
                    {"nextState": "missing"}
                ]
            }
        }))
        .unwrap();
        assert_eq!(state.type_name(), "genericAction");
        assert_eq!(state.next_states(), vec!["done", "missing"]);
    }

    #[test]
    fn test_unknown_state_type_is_rejected() {
        let result: Result<State, _> =
            serde_json::from_value(json!({"id": "x", "stateType": "askStyle"}));
        assert!(result.is_err());
    }
}
