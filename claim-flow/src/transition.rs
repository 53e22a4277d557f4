//! Which actions a stage currently offers, and where each one leads.
//!
//! All matching actions are offered at once, in declared order; there is no
//! first-match routing.

use serde_json::Value;

use crate::model::{Action, Condition, Configuration, Stage, StageValues};

/// Where an action leads once taken
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Move to the named stage
    Advance(String),
    /// End of flow
    Terminal,
    /// Target names a stage that no longer exists; handled as terminal
    Dangling(String),
}

impl Transition {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Transition::Advance(_))
    }

    pub fn next_stage(&self) -> Option<&str> {
        match self {
            Transition::Advance(stage) => Some(stage),
            _ => None,
        }
    }
}

/// True when the condition's field currently holds the expected value.
pub fn condition_met(condition: &Condition, values: &StageValues) -> bool {
    match values.get(&condition.field_name) {
        Some(Value::String(s)) => *s == condition.expected_value,
        Some(Value::Bool(b)) => b.to_string() == condition.expected_value,
        Some(Value::Number(n)) => n.to_string() == condition.expected_value,
        _ => false,
    }
}

pub fn is_available(action: &Action, values: &StageValues) -> bool {
    action
        .condition
        .as_ref()
        .is_none_or(|condition| condition_met(condition, values))
}

pub fn available_actions<'a>(stage: &'a Stage, values: &StageValues) -> Vec<&'a Action> {
    stage
        .actions
        .iter()
        .filter(|action| is_available(action, values))
        .collect()
}

/// The configured target, verbatim. Blank counts as terminal.
pub fn resolve_target(action: &Action) -> Option<&str> {
    action
        .target_stage
        .as_deref()
        .filter(|target| !target.trim().is_empty())
}

pub fn resolve_transition(config: &Configuration, action: &Action) -> Transition {
    match resolve_target(action) {
        None => Transition::Terminal,
        Some(target) if config.has_stage(target) => Transition::Advance(target.to_string()),
        Some(target) => Transition::Dangling(target.to_string()),
    }
}
