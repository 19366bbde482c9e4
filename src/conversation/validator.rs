// Copyright 2025 Cowboy AI, LLC.

//! Structural checks on conversation graphs
//!
//! Validation never stops at the first problem; every issue found is
//! reported so an editor can show them all at once.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::model::{Choice, Conversation, State, StateKind};

/// One problem found in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    /// State the problem belongs to, empty for conversation-level problems
    pub state_id: String,
    /// Offending field path
    pub field: String,
    /// Machine readable kind: `required`, `duplicate`, `invalid`,
    /// `invalid_count`, `invalid_reference`, `unreachable`, `infinite_loop`
    pub error_type: String,
    /// Human readable message
    pub message: String,
}

/// Outcome of validating a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Whether no issue was found
    pub valid: bool,
    /// Issues, in discovery order
    pub errors: Vec<ValidationIssue>,
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }
}

impl ValidationResult {
    fn add(
        &mut self,
        state_id: &str,
        field: impl Into<String>,
        error_type: &str,
        message: impl Into<String>,
    ) {
        self.valid = false;
        self.errors.push(ValidationIssue {
            state_id: state_id.to_string(),
            field: field.into(),
            error_type: error_type.to_string(),
            message: message.into(),
        });
    }

    /// Issues of one kind
    pub fn of_type<'a>(
        &'a self,
        error_type: &'a str,
    ) -> impl Iterator<Item = &'a ValidationIssue> + 'a {
        self.errors.iter().filter(move |e| e.error_type == error_type)
    }
}

/// Validate `conversation`
pub fn validate(conversation: &Conversation) -> ValidationResult {
    let mut result = ValidationResult::default();
    let start = conversation.start_state();

    if conversation.npc_id == 0 {
        result.add("", "npcId", "required", "NPC id is required");
    }
    if start.is_empty() {
        result.add("", "startState", "required", "Start state is required");
    }
    if conversation.states().is_empty() {
        result.add("", "states", "required", "At least one state is required");
        return result;
    }

    let mut ids: HashSet<&str> = HashSet::new();
    for state in conversation.states() {
        if state.id.is_empty() {
            result.add("", "id", "required", "State id is required");
        } else if !ids.insert(state.id.as_str()) {
            result.add(&state.id, "id", "duplicate", format!("Duplicate state id: {}", state.id));
        }
    }
    if !start.is_empty() && !ids.contains(start) {
        result.add(
            "",
            "startState",
            "invalid_reference",
            format!("Start state '{start}' does not exist"),
        );
    }

    for state in conversation.states() {
        validate_state(state, &ids, &mut result);
    }

    let graph: HashMap<&str, Vec<&str>> = conversation
        .states()
        .iter()
        .map(|s| (s.id.as_str(), s.next_states()))
        .collect();

    let reachable = reachable_from(start, &graph);
    let mut unreachable: Vec<&str> = ids
        .iter()
        .copied()
        .filter(|id| *id != start && !reachable.contains(id))
        .collect();
    unreachable.sort_unstable();
    for id in unreachable {
        result.add(id, "reachability", "unreachable", format!("State '{id}' is unreachable"));
    }

    if let Some(cycle) = closed_cycle(start, &graph) {
        let entry = cycle.first().copied().unwrap_or_default();
        result.add(
            entry,
            "circular_reference",
            "infinite_loop",
            format!("Infinite loop detected: {}", cycle.join(" -> ")),
        );
    }
    result
}

fn check_reference(
    state_id: &str,
    field: String,
    next: &str,
    ids: &HashSet<&str>,
    result: &mut ValidationResult,
) {
    if !next.is_empty() && !ids.contains(next) {
        result.add(
            state_id,
            field,
            "invalid_reference",
            format!("Next state '{next}' does not exist"),
        );
    }
}

fn check_choices(
    state_id: &str,
    prefix: &str,
    choices: &[Choice],
    ids: &HashSet<&str>,
    result: &mut ValidationResult,
) {
    if choices.is_empty() {
        result.add(
            state_id,
            format!("{prefix}.choices"),
            "required",
            "At least one choice is required",
        );
    }
    for (i, choice) in choices.iter().enumerate() {
        if choice.text.is_empty() {
            result.add(
                state_id,
                format!("{prefix}.choices[{i}].text"),
                "required",
                "Choice text is required",
            );
        }
        check_reference(
            state_id,
            format!("{prefix}.choices[{i}].nextState"),
            &choice.next_state,
            ids,
            result,
        );
    }
}

fn validate_state(state: &State, ids: &HashSet<&str>, result: &mut ValidationResult) {
    let id = state.id.as_str();
    match &state.kind {
        StateKind::Dialogue { dialogue } => {
            if dialogue.text.is_empty() {
                result.add(id, "dialogue.text", "required", "Dialogue text is required");
            }
            if let Some(required) = dialogue.dialogue_type.required_choices() {
                if !dialogue.choices.is_empty() && dialogue.choices.len() != required {
                    result.add(
                        id,
                        "dialogue.choices",
                        "invalid_count",
                        format!("{:?} requires exactly {required} choices", dialogue.dialogue_type),
                    );
                }
            }
            check_choices(id, "dialogue", &dialogue.choices, ids, result);
        }
        StateKind::GenericAction { generic_action } => {
            if generic_action.operations.is_empty() && generic_action.outcomes.is_empty() {
                result.add(
                    id,
                    "genericAction",
                    "required",
                    "At least one operation or outcome is required",
                );
            }
            for (i, op) in generic_action.operations.iter().enumerate() {
                if op.operation_type.is_empty() {
                    result.add(
                        id,
                        format!("genericAction.operations[{i}].operationType"),
                        "required",
                        "Operation type is required",
                    );
                }
            }
            for (i, outcome) in generic_action.outcomes.iter().enumerate() {
                let field = format!("genericAction.outcomes[{i}].nextState");
                if outcome.next_state.is_empty() {
                    result.add(id, field, "required", "Next state is required for an outcome");
                } else {
                    check_reference(id, field, &outcome.next_state, ids, result);
                }
                for (j, condition) in outcome.conditions.iter().enumerate() {
                    let prefix = format!("genericAction.outcomes[{i}].conditions[{j}]");
                    for (name, value) in [
                        ("type", &condition.condition_type),
                        ("operator", &condition.operator),
                        ("value", &condition.value),
                    ] {
                        if value.is_empty() {
                            result.add(
                                id,
                                format!("{prefix}.{name}"),
                                "required",
                                format!("Condition {name} is required"),
                            );
                        }
                    }
                }
            }
        }
        StateKind::ListSelection { list_selection } => {
            if list_selection.title.is_empty() {
                result.add(
                    id,
                    "listSelection.title",
                    "required",
                    "List selection title is required",
                );
            }
            check_choices(id, "listSelection", &list_selection.choices, ids, result);
        }
        StateKind::AskNumber { ask_number } => {
            if ask_number.text.is_empty() {
                result.add(id, "askNumber.text", "required", "Ask number text is required");
            }
            if ask_number.max_value == 0 {
                result.add(
                    id,
                    "askNumber.maxValue",
                    "required",
                    "Max value must be greater than 0",
                );
            }
            if ask_number.min_value > ask_number.default_value {
                result.add(
                    id,
                    "askNumber.defaultValue",
                    "invalid",
                    "Default value must be >= min value",
                );
            }
            if ask_number.default_value > ask_number.max_value {
                result.add(
                    id,
                    "askNumber.defaultValue",
                    "invalid",
                    "Default value must be <= max value",
                );
            }
            check_reference(
                id,
                "askNumber.nextState".to_string(),
                &ask_number.next_state,
                ids,
                result,
            );
        }
    }
}

fn reachable_from<'a>(start: &'a str, graph: &HashMap<&'a str, Vec<&'a str>>) -> HashSet<&'a str> {
    let mut seen = HashSet::new();
    let mut stack = vec![start];
    while let Some(id) = stack.pop() {
        if id.is_empty() || !seen.insert(id) {
            continue;
        }
        if let Some(next) = graph.get(id) {
            stack.extend(next.iter().copied());
        }
    }
    seen
}

/// First cycle reachable from `start` that no state on it can leave
fn closed_cycle<'a>(
    start: &'a str,
    graph: &HashMap<&'a str, Vec<&'a str>>,
) -> Option<Vec<&'a str>> {
    fn walk<'a>(
        id: &'a str,
        graph: &HashMap<&'a str, Vec<&'a str>>,
        visited: &mut HashSet<&'a str>,
        path: &mut Vec<&'a str>,
    ) -> Option<Vec<&'a str>> {
        visited.insert(id);
        path.push(id);
        for &next in graph.get(id).map(Vec::as_slice).unwrap_or_default() {
            if next.is_empty() {
                continue;
            }
            if let Some(pos) = path.iter().position(|s| *s == next) {
                let mut cycle = path[pos..].to_vec();
                let members: HashSet<&str> = cycle.iter().copied().collect();
                let escapes = cycle.iter().any(|s| {
                    graph
                        .get(s)
                        .is_some_and(|n| n.iter().any(|t| t.is_empty() || !members.contains(t)))
                });
                if !escapes {
                    cycle.push(next);
                    return Some(cycle);
                }
            } else if !visited.contains(next) {
                if let Some(cycle) = walk(next, graph, visited, path) {
                    return Some(cycle);
                }
            }
        }
        path.pop();
        None
    }

    if start.is_empty() || !graph.contains_key(start) {
        return None;
    }
    walk(start, graph, &mut HashSet::new(), &mut Vec::new())
}

#[cfg(test)]
mod tests {
    use super::super::model::fixtures::{dialogue, menu, shopkeeper};
    use super::super::model::AskNumber;
    use super::*;

    #[test]
    fn test_well_formed_conversation_is_valid() {
        let result = validate(&shopkeeper(9001));
        assert!(result.valid, "{:?}", result.errors);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_missing_basics() {
        let result = validate(&Conversation::new(0, "", vec![]));
        assert!(!result.valid);
        let fields: Vec<&str> = result.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["npcId", "startState", "states"]);
    }

    #[test]
    fn test_duplicate_and_dangling_references() {
        let conversation = Conversation::new(
            1,
            "a",
            vec![
                menu("a", &[("Go", "b"), ("Lost", "nowhere")]),
                dialogue("b", "Hi", ""),
                dialogue("b", "Again", ""),
            ],
        );
        let result = validate(&conversation);
        assert_eq!(result.of_type("duplicate").count(), 1);
        let dangling: Vec<_> = result.of_type("invalid_reference").collect();
        assert_eq!(dangling.len(), 1);
        assert_eq!(dangling[0].field, "listSelection.choices[1].nextState");
    }

    #[test]
    fn test_unreachable_state() {
        let conversation = Conversation::new(
            1,
            "a",
            vec![dialogue("a", "Hi", ""), dialogue("orphan", "Nobody gets here", "")],
        );
        let result = validate(&conversation);
        let unreachable: Vec<_> = result
            .of_type("unreachable")
            .map(|e| e.state_id.as_str())
            .collect();
        assert_eq!(unreachable, vec!["orphan"]);
    }

    #[test]
    fn test_cycle_without_exit_is_reported() {
        let ask = |id: &str, next: &str| State {
            id: id.to_string(),
            kind: StateKind::AskNumber {
                ask_number: AskNumber {
                    text: "How many?".to_string(),
                    max_value: 10,
                    next_state: next.to_string(),
                    ..Default::default()
                },
            },
        };
        let closed = Conversation::new(1, "a", vec![ask("a", "b"), ask("b", "a")]);
        let result = validate(&closed);
        let loops: Vec<_> = result.of_type("infinite_loop").collect();
        assert_eq!(loops.len(), 1);
        assert_eq!(loops[0].message, "Infinite loop detected: a -> b -> a");

        let open = Conversation::new(
            1,
            "a",
            vec![menu("a", &[("Again", "b"), ("Bye", "")]), ask("b", "a")],
        );
        assert_eq!(validate(&open).of_type("infinite_loop").count(), 0);
    }

    #[test]
    fn test_ask_number_bounds() {
        let state = State {
            id: "a".to_string(),
            kind: StateKind::AskNumber {
                ask_number: AskNumber {
                    text: "How many?".to_string(),
                    default_value: 20,
                    min_value: 1,
                    max_value: 10,
                    context_key: "amount".to_string(),
                    next_state: String::new(),
                },
            },
        };
        let result = validate(&Conversation::new(1, "a", vec![state]));
        assert_eq!(result.of_type("invalid").count(), 1);
    }

    #[test]
    fn test_dialogue_choice_count() {
        let mut state = dialogue("a", "Hi", "");
        if let StateKind::Dialogue { dialogue } = &mut state.kind {
            dialogue.choices.pop();
        }
        let result = validate(&Conversation::new(1, "a", vec![state]));
        assert_eq!(result.of_type("invalid_count").count(), 1);
    }
}
