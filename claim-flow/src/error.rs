use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for claim-flow operations
pub type Result<T> = std::result::Result<T, ClaimFlowError>;

/// Operations guarded against duplicate in-flight calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Save,
    Submit,
    Search,
    Publish,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Save => "save",
            Operation::Submit => "submit",
            Operation::Search => "search",
            Operation::Publish => "publish",
        };
        f.write_str(name)
    }
}

/// Per-field validation messages, keyed by field or document name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, String>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, message: impl Into<String>) {
        self.0.insert(name.into(), message.into());
    }

    /// Records `"{name} is required"`.
    pub fn required(&mut self, name: &str) {
        self.insert(name, format!("{} is required", name));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Adds entries from `other` that are not already present.
    pub fn merge(&mut self, other: ValidationErrors) {
        for (name, message) in other.0 {
            self.0.entry(name).or_insert(message);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<&str> = self.0.values().map(String::as_str).collect();
        f.write_str(&messages.join("; "))
    }
}

#[derive(Error, Debug)]
pub enum ClaimFlowError {
    /// Claim values failed validation for the stage being submitted
    #[error("{0}")]
    Validation(ValidationErrors),

    #[error("stage '{0}' already exists")]
    DuplicateStage(String),

    #[error("cannot remove '{0}': a configuration needs at least one stage")]
    LastStage(String),

    #[error("invalid stage name: {0}")]
    InvalidStageName(String),

    #[error("stage not found: {0}")]
    StageNotFound(String),

    #[error("field '{field}' not found in stage '{stage}'")]
    FieldNotFound { stage: String, field: String },

    #[error("invalid field: {0}")]
    InvalidField(String),

    #[error("field '{field}' is referenced by action '{action}' in stage '{stage}'")]
    FieldInUse {
        stage: String,
        field: String,
        action: String,
    },

    #[error("invalid document requirement: {0}")]
    InvalidDocument(String),

    #[error("invalid upload for '{document}': {reason}")]
    InvalidUpload { document: String, reason: String },

    #[error("invalid action: {0}")]
    InvalidAction(String),

    #[error("index {index} out of range for {list} in stage '{stage}'")]
    IndexOutOfRange {
        stage: String,
        list: &'static str,
        index: usize,
    },

    #[error("configuration has no stages")]
    EmptyConfiguration,

    #[error("stage '{0}' is read-only")]
    StageReadOnly(String),

    #[error("stage '{0}' has not been reached yet")]
    StageLocked(String),

    #[error("action '{action}' is not available in stage '{stage}'")]
    ActionUnavailable { stage: String, action: String },

    #[error("a {0} operation is already in progress")]
    OperationPending(Operation),

    #[error("a hand-off is already pending for {0}")]
    HandoffPending(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ClaimFlowError {
    /// Local, user-correctable errors that never abort a session.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ClaimFlowError::Validation(_)
                | ClaimFlowError::DuplicateStage(_)
                | ClaimFlowError::LastStage(_)
                | ClaimFlowError::InvalidStageName(_)
                | ClaimFlowError::InvalidField(_)
                | ClaimFlowError::FieldInUse { .. }
                | ClaimFlowError::InvalidDocument(_)
                | ClaimFlowError::InvalidUpload { .. }
                | ClaimFlowError::InvalidAction(_)
                | ClaimFlowError::EmptyConfiguration
                | ClaimFlowError::ActionUnavailable { .. }
        )
    }

    /// Field-level messages when this is a claim validation failure.
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            ClaimFlowError::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}
