use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    error::{ClaimFlowError, Result},
    handoff::Handoff,
    model::{
        Action, Configuration, DocumentRequirement, Field, Stage, StageData, normalize_format,
    },
    transition,
};

/// Name given to the first stage when the caller supplies none
pub const FIRST_STAGE_NAME: &str = "Claim Submission";

/// Builder for assembling a configuration before it is published.
///
/// Every mutating method validates first and only then edits, so a failed call
/// leaves the configuration as it was.
#[derive(Debug, Clone)]
pub struct ConfigurationBuilder {
    config: Configuration,
    form_values: StageData,
}

impl ConfigurationBuilder {
    pub fn new(category: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            config: Configuration {
                category: category.into(),
                service: service.into(),
                stages: Vec::new(),
            },
            form_values: StageData::new(),
        }
    }

    /// Open an existing configuration for editing. Its stages are checked again by
    /// [`Self::serialize`].
    pub fn from_configuration(config: Configuration) -> Self {
        Self {
            config,
            form_values: StageData::new(),
        }
    }

    /// Consume a hand-off payload carrying a configuration to edit.
    pub fn from_handoff(handoff: Handoff) -> Option<Self> {
        match handoff {
            Handoff::EditConfiguration(config) => Some(Self::from_configuration(config)),
            _ => None,
        }
    }

    pub fn category(&self) -> &str {
        &self.config.category
    }

    pub fn service(&self) -> &str {
        &self.config.service
    }

    pub fn stages(&self) -> &[Stage] {
        &self.config.stages
    }

    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.config.stage(name)
    }

    fn stage_mut(&mut self, name: &str) -> Result<&mut Stage> {
        self.config
            .stage_mut(name)
            .ok_or_else(|| ClaimFlowError::StageNotFound(name.to_string()))
    }

    fn require_stage(&self, name: &str) -> Result<&Stage> {
        self.config
            .stage(name)
            .ok_or_else(|| ClaimFlowError::StageNotFound(name.to_string()))
    }

    fn default_stage_name(&self) -> String {
        if self.config.stages.is_empty() {
            return FIRST_STAGE_NAME.to_string();
        }
        let mut n = self.config.stages.len() + 1;
        loop {
            let candidate = format!("New Stage {}", n);
            if !self.config.has_stage(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Append a stage. Blank names fall back to the default naming.
    pub fn add_stage(&mut self, name: Option<&str>) -> Result<&Stage> {
        let name = match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => {
                if self.config.has_stage(name) {
                    return Err(ClaimFlowError::DuplicateStage(name.to_string()));
                }
                name.to_string()
            }
            None => self.default_stage_name(),
        };

        debug!(stage = %name, "adding stage");
        self.config.stages.push(Stage::new(name));
        let index = self.config.stages.len() - 1;
        Ok(&self.config.stages[index])
    }

    /// Add the stage named on the naming screen. The payload must be meant for
    /// this builder's category.
    pub fn add_stage_from_handoff(&mut self, handoff: Handoff) -> Result<&Stage> {
        match handoff {
            Handoff::NameNewStage { category, name } if category == self.config.category => {
                self.add_stage(Some(&name))
            }
            Handoff::NameNewStage { category, name } => Err(ClaimFlowError::InvalidStageName(
                format!(
                    "'{}' was named for category '{}', not '{}'",
                    name, category, self.config.category
                ),
            )),
            other => Err(ClaimFlowError::InvalidStageName(format!(
                "{} hand-off carries no stage name",
                other.key()
            ))),
        }
    }

    /// Rename a stage and rewrite every reference to the old name.
    pub fn rename_stage(&mut self, old: &str, new: &str) -> Result<()> {
        let new = new.trim();
        if new.is_empty() {
            return Err(ClaimFlowError::InvalidStageName(
                "stage name cannot be blank".to_string(),
            ));
        }
        let index = self
            .config
            .stage_index(old)
            .ok_or_else(|| ClaimFlowError::StageNotFound(old.to_string()))?;
        if old == new {
            return Ok(());
        }
        if self.config.has_stage(new) {
            return Err(ClaimFlowError::DuplicateStage(new.to_string()));
        }

        self.config.stages[index].name = new.to_string();
        if let Some(values) = self.form_values.remove(old) {
            self.form_values.insert(new.to_string(), values);
        }
        for action in self
            .config
            .stages
            .iter_mut()
            .flat_map(|stage| stage.actions.iter_mut())
        {
            if action.target_stage.as_deref() == Some(old) {
                action.target_stage = Some(new.to_string());
            }
        }

        debug!(from = %old, to = %new, "renamed stage");
        Ok(())
    }

    /// Remove a stage; actions that led to it become terminal.
    pub fn remove_stage(&mut self, name: &str) -> Result<()> {
        let index = self
            .config
            .stage_index(name)
            .ok_or_else(|| ClaimFlowError::StageNotFound(name.to_string()))?;
        if self.config.stages.len() == 1 {
            return Err(ClaimFlowError::LastStage(name.to_string()));
        }

        self.config.stages.remove(index);
        self.form_values.remove(name);
        for action in self
            .config
            .stages
            .iter_mut()
            .flat_map(|stage| stage.actions.iter_mut())
        {
            if action.target_stage.as_deref() == Some(name) {
                action.target_stage = None;
            }
        }

        debug!(stage = %name, "removed stage");
        Ok(())
    }

    pub fn add_field(&mut self, stage: &str, field: Field) -> Result<()> {
        let field = checked_field(field)?;
        let target = self.stage_mut(stage)?;
        ensure_new_field(target, &field.name)?;
        target.fields.push(field);
        Ok(())
    }

    /// Remove a field. Fields that gate an action cannot be removed.
    pub fn remove_field(&mut self, stage: &str, index: usize) -> Result<Field> {
        let target = self.require_stage(stage)?;
        let field = target
            .fields
            .get(index)
            .ok_or_else(|| ClaimFlowError::IndexOutOfRange {
                stage: stage.to_string(),
                list: "fields",
                index,
            })?;
        if let Some(action) = target.actions.iter().find(|a| {
            a.condition
                .as_ref()
                .is_some_and(|c| c.field_name == field.name)
        }) {
            return Err(ClaimFlowError::FieldInUse {
                stage: stage.to_string(),
                field: field.name.clone(),
                action: action.label.clone(),
            });
        }

        let removed = self.stage_mut(stage)?.fields.remove(index);
        if let Some(values) = self.form_values.get_mut(stage) {
            values.remove(&removed.name);
        }
        Ok(removed)
    }

    pub fn add_document(&mut self, stage: &str, document: DocumentRequirement) -> Result<()> {
        let document = checked_document(document)?;
        let target = self.stage_mut(stage)?;
        ensure_new_document(target, &document.name)?;
        target.documents.push(document);
        Ok(())
    }

    pub fn remove_document(&mut self, stage: &str, index: usize) -> Result<DocumentRequirement> {
        let target = self.stage_mut(stage)?;
        if index >= target.documents.len() {
            return Err(ClaimFlowError::IndexOutOfRange {
                stage: stage.to_string(),
                list: "documents",
                index,
            });
        }
        Ok(target.documents.remove(index))
    }

    /// Add an action. Conditions may only test an enumerable field of the same stage.
    pub fn add_action(&mut self, stage: &str, action: Action) -> Result<()> {
        let mut action = checked_action(action)?;
        action.target_stage = transition::resolve_target(&action).map(|t| t.trim().to_string());
        if let Some(target) = action.target_stage.as_deref() {
            if !self.config.has_stage(target) {
                return Err(ClaimFlowError::InvalidAction(format!(
                    "action '{}' targets unknown stage '{}'",
                    action.label, target
                )));
            }
        }

        check_condition(self.require_stage(stage)?, &action)?;
        self.stage_mut(stage)?.actions.push(action);
        Ok(())
    }

    pub fn remove_action(&mut self, stage: &str, index: usize) -> Result<Action> {
        let target = self.stage_mut(stage)?;
        if index >= target.actions.len() {
            return Err(ClaimFlowError::IndexOutOfRange {
                stage: stage.to_string(),
                list: "actions",
                index,
            });
        }
        Ok(target.actions.remove(index))
    }

    /// Set an operator preview value used by [`Self::preview_actions`].
    pub fn set_preview_value(&mut self, stage: &str, field: &str, value: Value) -> Result<()> {
        let owner = self.require_stage(stage)?;
        if owner.field(field).is_none() {
            return Err(ClaimFlowError::FieldNotFound {
                stage: stage.to_string(),
                field: field.to_string(),
            });
        }
        self.form_values
            .entry(stage.to_string())
            .or_default()
            .insert(field.to_string(), value);
        Ok(())
    }

    pub fn preview_values(&self) -> &StageData {
        &self.form_values
    }

    /// Actions the stage would offer for the current preview values.
    pub fn preview_actions(&self, stage: &str) -> Result<Vec<&Action>> {
        let owner = self.require_stage(stage)?;
        let empty = Default::default();
        let values = self.form_values.get(stage).unwrap_or(&empty);
        Ok(transition::available_actions(owner, values))
    }

    /// Produce the persisted shape of the configuration.
    ///
    /// Stages loaded through [`Self::from_configuration`] never went through the
    /// add methods, so every stage is checked again here.
    pub fn serialize(&self) -> Result<Configuration> {
        if self.config.stages.is_empty() {
            return Err(ClaimFlowError::EmptyConfiguration);
        }

        let mut stages: Vec<Stage> = Vec::with_capacity(self.config.stages.len());
        for stage in &self.config.stages {
            let stage = checked_stage(stage.clone())?;
            if stages.iter().any(|s| s.name == stage.name) {
                return Err(ClaimFlowError::DuplicateStage(stage.name));
            }
            stages.push(stage);
        }

        let names: Vec<String> = stages.iter().map(|s| s.name.clone()).collect();
        for stage in &mut stages {
            for action in &mut stage.actions {
                let target = transition::resolve_target(action).map(|t| t.trim().to_string());
                let dangling = target
                    .as_deref()
                    .filter(|t| !names.iter().any(|n| n == t));
                if let Some(missing) = dangling {
                    warn!(
                        stage = %stage.name,
                        action = %action.label,
                        target = %missing,
                        "dropping dangling action target"
                    );
                    action.target_stage = None;
                } else {
                    action.target_stage = target;
                }
            }
        }

        Ok(Configuration {
            category: self.config.category.trim().to_string(),
            service: self.config.service.trim().to_string(),
            stages,
        })
    }
}

/// Trim the name and enforce that options are present exactly when the type takes them.
fn checked_field(mut field: Field) -> Result<Field> {
    field.name = field.name.trim().to_string();
    if field.name.is_empty() {
        return Err(ClaimFlowError::InvalidField(
            "field name cannot be blank".to_string(),
        ));
    }
    if field.field_type.requires_options() {
        field.options = field
            .options
            .iter()
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();
        if field.options.is_empty() {
            return Err(ClaimFlowError::InvalidField(format!(
                "{} field '{}' needs at least one option",
                field.field_type, field.name
            )));
        }
    } else {
        field.options.clear();
    }
    Ok(field)
}

fn ensure_new_field(stage: &Stage, name: &str) -> Result<()> {
    if stage.field(name).is_some() {
        return Err(ClaimFlowError::InvalidField(format!(
            "field '{}' already exists in stage '{}'",
            name, stage.name
        )));
    }
    Ok(())
}

fn checked_document(mut document: DocumentRequirement) -> Result<DocumentRequirement> {
    document.name = document.name.trim().to_string();
    if document.name.is_empty() {
        return Err(ClaimFlowError::InvalidDocument(
            "document name cannot be blank".to_string(),
        ));
    }
    document.allowed_formats = document
        .allowed_formats
        .iter()
        .map(|f| normalize_format(f))
        .filter(|f| !f.is_empty())
        .collect();
    if document.allowed_formats.is_empty() {
        return Err(ClaimFlowError::InvalidDocument(format!(
            "document '{}' needs at least one allowed format",
            document.name
        )));
    }
    if !(document.max_size_mb > 0.0) {
        return Err(ClaimFlowError::InvalidDocument(format!(
            "document '{}' needs a positive size limit",
            document.name
        )));
    }
    Ok(document)
}

fn ensure_new_document(stage: &Stage, name: &str) -> Result<()> {
    if stage.document(name).is_some() {
        return Err(ClaimFlowError::InvalidDocument(format!(
            "document '{}' already exists in stage '{}'",
            name, stage.name
        )));
    }
    Ok(())
}

fn checked_action(mut action: Action) -> Result<Action> {
    action.label = action.label.trim().to_string();
    if action.label.is_empty() {
        return Err(ClaimFlowError::InvalidAction(
            "action label cannot be blank".to_string(),
        ));
    }
    action.option = action
        .option
        .as_deref()
        .map(|o| o.trim().to_lowercase())
        .filter(|o| !o.is_empty());
    Ok(action)
}

/// A condition must test a dropdown or radio field of `stage` against one of its options.
fn check_condition(stage: &Stage, action: &Action) -> Result<()> {
    let Some(condition) = &action.condition else {
        return Ok(());
    };
    let field = stage.field(&condition.field_name).ok_or_else(|| {
        ClaimFlowError::InvalidAction(format!(
            "condition field '{}' is not in stage '{}'",
            condition.field_name, stage.name
        ))
    })?;
    if !field.field_type.requires_options() || field.options.is_empty() {
        return Err(ClaimFlowError::InvalidAction(format!(
            "condition field '{}' must be a dropdown or radio with options",
            field.name
        )));
    }
    if !field.options.contains(&condition.expected_value) {
        return Err(ClaimFlowError::InvalidAction(format!(
            "'{}' is not an option of '{}'",
            condition.expected_value, field.name
        )));
    }
    Ok(())
}

/// Re-run the add checks over a stage that arrived from outside the builder.
fn checked_stage(mut stage: Stage) -> Result<Stage> {
    stage.name = stage.name.trim().to_string();
    if stage.name.is_empty() {
        return Err(ClaimFlowError::InvalidStageName(
            "stage name cannot be blank".to_string(),
        ));
    }

    for field in std::mem::take(&mut stage.fields) {
        let field = checked_field(field)?;
        ensure_new_field(&stage, &field.name)?;
        stage.fields.push(field);
    }
    for document in std::mem::take(&mut stage.documents) {
        let document = checked_document(document)?;
        ensure_new_document(&stage, &document.name)?;
        stage.documents.push(document);
    }
    for action in std::mem::take(&mut stage.actions) {
        let action = checked_action(action)?;
        check_condition(&stage, &action)?;
        stage.actions.push(action);
    }
    Ok(stage)
}
