use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::{
    error::{ClaimFlowError, Result, ValidationErrors},
    field_kind::{FieldKindRegistry, Widget},
    model::{Action, Claim, Configuration, DocumentUpload, Stage},
    runtime, transition,
};

/// How a stage looks from the claim's current position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StageState {
    Completed,
    Current,
    Locked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageProgress {
    pub stage: String,
    pub state: StageState,
}

/// An action the user may take now, with where it leads (`None` ends the flow)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionChoice {
    pub label: String,
    pub option: Option<String>,
    pub leads_to: Option<String>,
}

/// A claim together with the configuration it runs against, as held by one screen.
///
/// Validation errors live here only; they are feedback, never persisted.
#[derive(Clone)]
pub struct ClaimSession {
    claim: Claim,
    config: Configuration,
    registry: Arc<FieldKindRegistry>,
    errors: ValidationErrors,
}

impl fmt::Debug for ClaimSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClaimSession")
            .field("claim", &self.claim)
            .field("category", &self.config.category)
            .field("errors", &self.errors)
            .finish()
    }
}

impl ClaimSession {
    pub fn new(claim: Claim, config: Configuration) -> Self {
        Self::with_registry(claim, config, Arc::new(FieldKindRegistry::standard()))
    }

    pub fn with_registry(
        claim: Claim,
        config: Configuration,
        registry: Arc<FieldKindRegistry>,
    ) -> Self {
        Self {
            claim,
            config,
            registry,
            errors: ValidationErrors::new(),
        }
    }

    pub fn claim(&self) -> &Claim {
        &self.claim
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    pub fn current_stage(&self) -> Option<&Stage> {
        self.config.stage(&self.claim.current_stage)
    }

    pub fn current_stage_index(&self) -> usize {
        runtime::current_stage_index(&self.claim, &self.config)
    }

    pub fn is_stage_completed(&self, stage: &str) -> bool {
        runtime::is_stage_completed(&self.claim, &self.config, stage)
    }

    pub fn can_navigate_to(&self, stage: &str) -> bool {
        runtime::can_navigate_to(&self.claim, &self.config, stage)
    }

    /// Only the current stage of an unfinished claim accepts edits.
    fn editable_stage(&self, stage: &str) -> Result<&Stage> {
        let owner = self
            .config
            .stage(stage)
            .ok_or_else(|| ClaimFlowError::StageNotFound(stage.to_string()))?;
        if self.is_stage_completed(stage) {
            return Err(ClaimFlowError::StageReadOnly(stage.to_string()));
        }
        if stage != self.claim.current_stage {
            return Err(ClaimFlowError::StageLocked(stage.to_string()));
        }
        Ok(owner)
    }

    /// Set one field of one stage and clear that field's recorded error.
    pub fn update_field(&mut self, stage: &str, field: &str, value: Value) -> Result<()> {
        let owner = self.editable_stage(stage)?;
        if owner.field(field).is_none() {
            return Err(ClaimFlowError::FieldNotFound {
                stage: stage.to_string(),
                field: field.to_string(),
            });
        }

        self.claim
            .stage_data
            .entry(stage.to_string())
            .or_default()
            .insert(field.to_string(), value);
        self.errors.remove(field);
        debug!(claim_id = %self.claim.id, stage = %stage, field = %field, "field updated");
        Ok(())
    }

    /// Attach an upload to a document requirement of the current stage.
    pub fn attach_document(
        &mut self,
        stage: &str,
        document: &str,
        upload: DocumentUpload,
    ) -> Result<()> {
        let owner = self.editable_stage(stage)?;
        let requirement = owner.document(document).ok_or_else(|| ClaimFlowError::InvalidUpload {
            document: document.to_string(),
            reason: format!("stage '{}' does not ask for it", stage),
        })?;
        if !requirement.allows_format(&upload.format) {
            return Err(ClaimFlowError::InvalidUpload {
                document: document.to_string(),
                reason: format!(
                    "format '{}' is not one of: {}",
                    upload.format,
                    requirement
                        .allowed_formats
                        .iter()
                        .cloned()
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            });
        }
        if upload.size_bytes > requirement.max_size_bytes() {
            return Err(ClaimFlowError::InvalidUpload {
                document: document.to_string(),
                reason: format!("larger than {} MB", requirement.max_size_mb),
            });
        }

        self.claim
            .stage_documents
            .entry(stage.to_string())
            .or_default()
            .insert(document.to_string(), upload);
        self.errors.remove(document);
        Ok(())
    }

    /// Errors the current stage would fail submission with.
    pub fn check(&self) -> ValidationErrors {
        runtime::validate_stage(
            &self.registry,
            &self.config,
            &self.claim.current_stage,
            &self.claim,
        )
    }

    /// Validate the current stage, recording the errors on the session.
    pub fn validate(&mut self) -> Result<()> {
        self.errors = self.check();
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ClaimFlowError::Validation(self.errors.clone()))
        }
    }

    /// Actions of the current stage offered by its current values.
    pub fn available_actions(&self) -> Vec<&Action> {
        match self.current_stage() {
            Some(stage) if !self.claim.is_completed() => {
                let empty = Default::default();
                let values = self.claim.values(&stage.name).unwrap_or(&empty);
                transition::available_actions(stage, values)
            }
            _ => Vec::new(),
        }
    }

    pub fn action_choices(&self) -> Vec<ActionChoice> {
        self.available_actions()
            .into_iter()
            .map(|action| ActionChoice {
                label: action.label.clone(),
                option: action.option.clone(),
                leads_to: runtime::checked_target(&self.config, action),
            })
            .collect()
    }

    /// Render a reachable stage. Completed stages render read-only.
    pub fn widgets(&self, stage: &str) -> Result<Vec<Widget>> {
        let owner = self
            .config
            .stage(stage)
            .ok_or_else(|| ClaimFlowError::StageNotFound(stage.to_string()))?;
        if !self.can_navigate_to(stage) {
            return Err(ClaimFlowError::StageLocked(stage.to_string()));
        }

        let read_only = self.is_stage_completed(stage);
        Ok(owner
            .fields
            .iter()
            .map(|field| {
                self.registry
                    .widget(field, self.claim.value(stage, &field.name), read_only)
            })
            .collect())
    }

    pub fn overview(&self) -> Vec<StageProgress> {
        self.config
            .stages
            .iter()
            .map(|stage| {
                let state = if self.is_stage_completed(&stage.name) {
                    StageState::Completed
                } else if stage.name == self.claim.current_stage {
                    StageState::Current
                } else {
                    StageState::Locked
                };
                StageProgress {
                    stage: stage.name.clone(),
                    state,
                }
            })
            .collect()
    }

    /// Replace the local claim with the store's record and drop stale errors.
    pub(crate) fn adopt(&mut self, claim: Claim) {
        self.claim = claim;
        self.errors.clear();
    }

    pub fn into_claim(self) -> Claim {
        self.claim
    }
}
