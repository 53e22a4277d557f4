//! Workflow configuration and claim records.
//!
//! Stage identity is its name: actions point at stages by name and claims key
//! their per-stage values by name. Everything here is plain data with serde
//! derives; the wire format is camelCase JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::error::Result;

/// Values entered for one stage, keyed by field name.
pub type StageValues = BTreeMap<String, Value>;

/// Values for every stage of a claim, keyed by stage name.
pub type StageData = BTreeMap<String, StageValues>;

/// Uploads for one stage, keyed by document name.
pub type StageUploads = BTreeMap<String, DocumentUpload>;

/// Input type tag of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FieldType {
    Text,
    Number,
    Date,
    Textarea,
    Dropdown,
    Radio,
    Checkbox,
}

impl FieldType {
    pub const ALL: [FieldType; 7] = [
        FieldType::Text,
        FieldType::Number,
        FieldType::Date,
        FieldType::Textarea,
        FieldType::Dropdown,
        FieldType::Radio,
        FieldType::Checkbox,
    ];

    /// Canonical lower-case tag
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Number => "number",
            FieldType::Date => "date",
            FieldType::Textarea => "textarea",
            FieldType::Dropdown => "dropdown",
            FieldType::Radio => "radio",
            FieldType::Checkbox => "checkbox",
        }
    }

    /// Dropdown and radio fields choose from a fixed option list.
    pub fn requires_options(&self) -> bool {
        matches!(self, FieldType::Dropdown | FieldType::Radio)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let tag = s.trim().to_lowercase();
        FieldType::ALL
            .into_iter()
            .find(|t| t.as_str() == tag)
            .ok_or_else(|| format!("unknown field type '{}'", s))
    }
}

impl TryFrom<String> for FieldType {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FieldType> for String {
    fn from(value: FieldType) -> Self {
        value.as_str().to_string()
    }
}

/// A single input of a stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub mandatory: bool,
    /// Display-only hint; only the mandatory flag is enforced.
    #[serde(default)]
    pub validation_hint: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            mandatory: false,
            validation_hint: String::new(),
            options: Vec::new(),
        }
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.validation_hint = hint.into();
        self
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }
}

/// An upload a stage asks for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRequirement {
    pub name: String,
    #[serde(default)]
    pub mandatory: bool,
    pub allowed_formats: BTreeSet<String>,
    #[serde(rename = "maxSizeMB")]
    pub max_size_mb: f64,
}

impl DocumentRequirement {
    pub fn new<I, S>(name: impl Into<String>, allowed_formats: I, max_size_mb: f64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            mandatory: false,
            allowed_formats: allowed_formats.into_iter().map(Into::into).collect(),
            max_size_mb,
        }
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    pub fn allows_format(&self, format: &str) -> bool {
        self.allowed_formats.contains(&normalize_format(format))
    }

    pub fn max_size_bytes(&self) -> u64 {
        (self.max_size_mb * 1024.0 * 1024.0) as u64
    }
}

/// Lower-case format tag without a leading dot (`".PDF"` -> `"pdf"`).
pub fn normalize_format(format: &str) -> String {
    format.trim().trim_start_matches('.').to_lowercase()
}

/// A file attached to a claim for one document requirement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentUpload {
    pub file_name: String,
    pub format: String,
    pub size_bytes: u64,
}

impl DocumentUpload {
    pub fn new(file_name: impl Into<String>, size_bytes: u64) -> Self {
        let file_name = file_name.into();
        let format = file_name
            .rsplit_once('.')
            .map(|(_, ext)| normalize_format(ext))
            .unwrap_or_default();
        Self {
            file_name,
            format,
            size_bytes,
        }
    }
}

/// Gate on an action: the named field must currently hold `expected_value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub field_name: String,
    pub expected_value: String,
}

/// A user-triggered transition out of a stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub label: String,
    /// Machine key of the action, distinct from its label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option: Option<String>,
    /// `None` ends the flow.
    #[serde(default)]
    pub target_stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
}

impl Action {
    /// Action that leads to `target`.
    pub fn new(label: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            option: None,
            target_stage: Some(target.into()),
            condition: None,
        }
    }

    /// Action that ends the flow.
    pub fn terminal(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            option: None,
            target_stage: None,
            condition: None,
        }
    }

    pub fn when(
        mut self,
        field_name: impl Into<String>,
        expected_value: impl Into<String>,
    ) -> Self {
        self.condition = Some(Condition {
            field_name: field_name.into(),
            expected_value: expected_value.into(),
        });
        self
    }

    pub fn with_option(mut self, option: impl Into<String>) -> Self {
        self.option = Some(option.into());
        self
    }
}

/// One step of a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default)]
    pub documents: Vec<DocumentRequirement>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Stage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            documents: Vec::new(),
            actions: Vec::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn document(&self, name: &str) -> Option<&DocumentRequirement> {
        self.documents.iter().find(|d| d.name == name)
    }

    pub fn action(&self, label: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.label == label)
    }
}

/// Broken reference found in a configuration. Reported, never raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityWarning {
    DanglingTarget {
        stage: String,
        action: String,
        target: String,
    },
    MissingConditionField {
        stage: String,
        action: String,
        field: String,
    },
}

impl fmt::Display for IntegrityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityWarning::DanglingTarget {
                stage,
                action,
                target,
            } => write!(
                f,
                "action '{}' in stage '{}' targets missing stage '{}'",
                action, stage, target
            ),
            IntegrityWarning::MissingConditionField {
                stage,
                action,
                field,
            } => write!(
                f,
                "action '{}' in stage '{}' is conditioned on missing field '{}'",
                action, stage, field
            ),
        }
    }
}

/// Full workflow definition for one claim category and service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub category: String,
    pub service: String,
    pub stages: Vec<Stage>,
}

impl Configuration {
    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn stage_mut(&mut self, name: &str) -> Option<&mut Stage> {
        self.stages.iter_mut().find(|s| s.name == name)
    }

    pub fn stage_index(&self, name: &str) -> Option<usize> {
        self.stages.iter().position(|s| s.name == name)
    }

    pub fn has_stage(&self, name: &str) -> bool {
        self.stage_index(name).is_some()
    }

    pub fn first_stage(&self) -> Option<&Stage> {
        self.stages.first()
    }

    pub fn stage_names(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().map(|s| s.name.as_str())
    }

    /// Lists targets and condition fields that no longer resolve.
    pub fn integrity_warnings(&self) -> Vec<IntegrityWarning> {
        let mut warnings = Vec::new();
        for stage in &self.stages {
            for action in &stage.actions {
                if let Some(target) = action.target_stage.as_deref() {
                    if !target.trim().is_empty() && !self.has_stage(target) {
                        warnings.push(IntegrityWarning::DanglingTarget {
                            stage: stage.name.clone(),
                            action: action.label.clone(),
                            target: target.to_string(),
                        });
                    }
                }
                if let Some(condition) = &action.condition {
                    if stage.field(&condition.field_name).is_none() {
                        warnings.push(IntegrityWarning::MissingConditionField {
                            stage: stage.name.clone(),
                            action: action.label.clone(),
                            field: condition.field_name.clone(),
                        });
                    }
                }
            }
        }
        warnings
    }

    pub fn from_yaml(source: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(source)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn from_json(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Processing status of a claim. `Completed` is the authoritative done flag.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ClaimStatus {
    #[default]
    New,
    InProgress,
    Completed,
    Other(String),
}

impl From<String> for ClaimStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "New" => ClaimStatus::New,
            "InProgress" | "In Progress" => ClaimStatus::InProgress,
            "Completed" => ClaimStatus::Completed,
            _ => ClaimStatus::Other(value),
        }
    }
}

impl From<ClaimStatus> for String {
    fn from(value: ClaimStatus) -> Self {
        match value {
            ClaimStatus::New => "New".to_string(),
            ClaimStatus::InProgress => "InProgress".to_string(),
            ClaimStatus::Completed => "Completed".to_string(),
            ClaimStatus::Other(s) => s,
        }
    }
}

/// A claim being processed against a configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    pub id: String,
    /// Category of the configuration this claim runs against.
    pub claim_type: String,
    #[serde(default)]
    pub customer_name: String,
    #[serde(default)]
    pub device_info: String,
    #[serde(default)]
    pub created_date: String,
    #[serde(default)]
    pub contact: String,
    pub current_stage: String,
    #[serde(default)]
    pub status: ClaimStatus,
    #[serde(default)]
    pub stage_data: StageData,
    #[serde(default)]
    pub stage_documents: BTreeMap<String, StageUploads>,
}

impl Claim {
    pub fn new(
        id: impl Into<String>,
        claim_type: impl Into<String>,
        current_stage: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            claim_type: claim_type.into(),
            customer_name: String::new(),
            device_info: String::new(),
            created_date: String::new(),
            contact: String::new(),
            current_stage: current_stage.into(),
            status: ClaimStatus::New,
            stage_data: StageData::new(),
            stage_documents: BTreeMap::new(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == ClaimStatus::Completed
    }

    pub fn values(&self, stage: &str) -> Option<&StageValues> {
        self.stage_data.get(stage)
    }

    pub fn value(&self, stage: &str, field: &str) -> Option<&Value> {
        self.stage_data.get(stage).and_then(|v| v.get(field))
    }

    pub fn uploads(&self, stage: &str) -> Option<&StageUploads> {
        self.stage_documents.get(stage)
    }
}
