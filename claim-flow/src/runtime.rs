//! WorkflowRuntime – loads a claim with its configuration, validates the active
//! stage and hands saves and submissions to the store.
//!
//! The store decides where a submitted claim goes next. The runtime never
//! advances `current_stage` itself; it adopts whatever claim the store returns,
//! so the local view cannot drift from the store's record.
//!
//! Each remote operation (save, submit, search) holds a pending guard for its
//! duration. A second call of the same kind while one is in flight fails with
//! [`ClaimFlowError::OperationPending`] and the guard is released on every exit
//! path, success or error.

use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

use crate::{
    error::{ClaimFlowError, Operation, Result, ValidationErrors},
    field_kind::FieldKindRegistry,
    model::{Action, Claim, Configuration, StageUploads, StageValues},
    session::ClaimSession,
    store::{ClaimStore, NO_ACTION, Submission},
    transition::{self, Transition},
};

/// Index of the claim's current stage; a stage missing from the configuration counts as 0.
pub fn current_stage_index(claim: &Claim, config: &Configuration) -> usize {
    match config.stage_index(&claim.current_stage) {
        Some(index) => index,
        None => {
            debug!(
                claim_id = %claim.id,
                stage = %claim.current_stage,
                "current stage not in configuration, using first stage"
            );
            0
        }
    }
}

pub fn is_stage_completed(claim: &Claim, config: &Configuration, stage: &str) -> bool {
    if claim.is_completed() {
        return true;
    }
    config
        .stage_index(stage)
        .is_some_and(|index| index < current_stage_index(claim, config))
}

/// Completed stages and the current one are viewable; later stages are not.
pub fn can_navigate_to(claim: &Claim, config: &Configuration, stage: &str) -> bool {
    is_stage_completed(claim, config, stage) || stage == claim.current_stage
}

/// Absent, `null` and `""` all count as not filled in.
pub fn is_missing(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

pub fn validate_mandatory(
    config: &Configuration,
    stage: &str,
    values: &StageValues,
) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    let Some(stage) = config.stage(stage) else {
        return errors;
    };
    for field in stage.fields.iter().filter(|f| f.mandatory) {
        if is_missing(values.get(&field.name)) {
            errors.required(&field.name);
        }
    }
    errors
}

pub fn validate_documents(
    config: &Configuration,
    stage: &str,
    uploads: &StageUploads,
) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    let Some(stage) = config.stage(stage) else {
        return errors;
    };
    for document in stage.documents.iter().filter(|d| d.mandatory) {
        if !uploads.contains_key(&document.name) {
            errors.required(&document.name);
        }
    }
    errors
}

/// Mandatory fields, then mandatory documents, then per-type checks of filled values.
pub fn validate_stage(
    registry: &FieldKindRegistry,
    config: &Configuration,
    stage: &str,
    claim: &Claim,
) -> ValidationErrors {
    let values = claim.values(stage).cloned().unwrap_or_default();
    let uploads = claim.uploads(stage).cloned().unwrap_or_default();

    let mut errors = validate_mandatory(config, stage, &values);
    errors.merge(validate_documents(config, stage, &uploads));

    if let Some(stage) = config.stage(stage) {
        for field in &stage.fields {
            let value = values.get(&field.name);
            if is_missing(value) {
                continue;
            }
            if let Some(message) = value.and_then(|v| registry.check_value(field, v)) {
                if !errors.contains(&field.name) {
                    errors.insert(field.name.clone(), message);
                }
            }
        }
    }
    errors
}

/// Reject a second in-flight call of the same operation.
#[derive(Debug, Default)]
pub(crate) struct PendingFlag(AtomicBool);

pub(crate) struct PendingGuard<'a>(&'a AtomicBool);

impl PendingFlag {
    pub(crate) fn begin(&self, operation: Operation) -> Result<PendingGuard<'_>> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ClaimFlowError::OperationPending(operation))?;
        Ok(PendingGuard(&self.0))
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Where a successful submission left the claim
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Advanced { to: String },
    Completed,
}

pub struct WorkflowRuntime {
    store: Arc<dyn ClaimStore>,
    registry: Arc<FieldKindRegistry>,
    saving: PendingFlag,
    submitting: PendingFlag,
    searching: PendingFlag,
}

impl WorkflowRuntime {
    pub fn new(store: Arc<dyn ClaimStore>) -> Self {
        Self::with_registry(store, Arc::new(FieldKindRegistry::standard()))
    }

    pub fn with_registry(store: Arc<dyn ClaimStore>, registry: Arc<FieldKindRegistry>) -> Self {
        Self {
            store,
            registry,
            saving: PendingFlag::default(),
            submitting: PendingFlag::default(),
            searching: PendingFlag::default(),
        }
    }

    pub fn registry(&self) -> &Arc<FieldKindRegistry> {
        &self.registry
    }

    pub fn is_pending(&self, operation: Operation) -> bool {
        match operation {
            Operation::Save => self.saving.is_pending(),
            Operation::Submit => self.submitting.is_pending(),
            Operation::Search => self.searching.is_pending(),
            Operation::Publish => false,
        }
    }

    /// Fetch a claim and the configuration it runs against.
    pub async fn open_claim(&self, reference: &str) -> Result<ClaimSession> {
        let _guard = self.searching.begin(Operation::Search)?;

        let claim = self.store.fetch_claim(reference).await?;
        let config = self.store.fetch_configuration(&claim.claim_type).await?;
        for warning in config.integrity_warnings() {
            warn!(category = %config.category, "{}", warning);
        }

        info!(
            claim_id = %claim.id,
            stage = %claim.current_stage,
            status = ?claim.status,
            "opened claim"
        );
        Ok(ClaimSession::with_registry(
            claim,
            config,
            self.registry.clone(),
        ))
    }

    /// Persist the claim as-is; the current stage does not move.
    pub async fn save_draft(&self, session: &ClaimSession) -> Result<()> {
        let _guard = self.saving.begin(Operation::Save)?;
        let claim = session.claim();

        self.store.save_claim(claim).await?;
        info!(claim_id = %claim.id, stage = %claim.current_stage, "saved draft");
        Ok(())
    }

    /// Validate the current stage and hand the claim to the store.
    ///
    /// Validation failures are recorded on the session and no store call is made.
    /// A stage that declares actions is submitted through one of its available
    /// actions; without a label that must be the only one on offer.
    /// On success the session adopts the claim the store returns.
    pub async fn submit(
        &self,
        session: &mut ClaimSession,
        action: Option<&str>,
    ) -> Result<SubmitOutcome> {
        let _guard = self.submitting.begin(Operation::Submit)?;

        let stage = session.claim().current_stage.clone();
        if session.claim().is_completed() {
            return Err(ClaimFlowError::StageReadOnly(stage));
        }
        session.validate()?;

        let action = chosen_action(session, action)?;

        let submission = Submission {
            claim: session.claim().clone(),
            stage: stage.clone(),
            action,
        };
        info!(
            claim_id = %submission.claim.id,
            stage = %stage,
            action = ?submission.action,
            "submitting claim"
        );
        let updated = self.store.submit_claim(&submission).await?;

        let outcome = if updated.is_completed() {
            SubmitOutcome::Completed
        } else {
            if !session.config().has_stage(&updated.current_stage) {
                warn!(
                    claim_id = %updated.id,
                    stage = %updated.current_stage,
                    "store moved claim to a stage missing from the configuration"
                );
            }
            SubmitOutcome::Advanced {
                to: updated.current_stage.clone(),
            }
        };
        session.adopt(updated);

        info!(claim_id = %session.claim().id, outcome = ?outcome, "claim submitted");
        Ok(outcome)
    }
}

/// Label of the action a submission runs. Without a label the stage's only
/// available action is taken; a stage that declares no actions needs none.
fn chosen_action(session: &ClaimSession, label: Option<&str>) -> Result<Option<String>> {
    let stage = &session.claim().current_stage;
    let offered = session.available_actions();

    match label {
        Some(label) if offered.iter().any(|a| a.label == label) => Ok(Some(label.to_string())),
        Some(label) => Err(ClaimFlowError::ActionUnavailable {
            stage: stage.clone(),
            action: label.to_string(),
        }),
        None => {
            let declares_actions = session
                .current_stage()
                .is_some_and(|s| !s.actions.is_empty());
            if !declares_actions {
                return Ok(None);
            }
            match offered.as_slice() {
                [only] => Ok(Some(only.label.clone())),
                _ => {
                    debug!(
                        stage = %stage,
                        available = offered.len(),
                        "no single action to submit with"
                    );
                    Err(ClaimFlowError::ActionUnavailable {
                        stage: stage.clone(),
                        action: NO_ACTION.to_string(),
                    })
                }
            }
        }
    }
}

/// Next stage an action leads to. A dangling target is logged and treated as terminal.
pub fn checked_target(config: &Configuration, action: &Action) -> Option<String> {
    match transition::resolve_transition(config, action) {
        Transition::Advance(stage) => Some(stage),
        Transition::Terminal => None,
        Transition::Dangling(target) => {
            warn!(
                action = %action.label,
                target = %target,
                "action target no longer exists, treating as terminal"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DocumentRequirement, DocumentUpload, Field, FieldType, Stage};
    use serde_json::json;

    fn config() -> Configuration {
        let mut verification = Stage::new("Verification");
        verification
            .fields
            .push(Field::new("Incident Date", FieldType::Date).mandatory());
        verification
            .fields
            .push(Field::new("Notes", FieldType::Textarea));
        verification
            .documents
            .push(DocumentRequirement::new("Receipt", ["pdf"], 1.0).mandatory());
        Configuration {
            category: "mobile".into(),
            service: "screen-repair".into(),
            stages: vec![
                verification,
                Stage::new("Claim Assessment"),
                Stage::new("IC Decision"),
            ],
        }
    }

    #[test]
    fn test_stage_completion_follows_current_index() {
        let config = config();
        let claim = Claim::new("CLM-1", "mobile", "Claim Assessment");

        assert_eq!(current_stage_index(&claim, &config), 1);
        assert!(is_stage_completed(&claim, &config, "Verification"));
        assert!(!is_stage_completed(&claim, &config, "Claim Assessment"));
        assert!(!is_stage_completed(&claim, &config, "IC Decision"));

        assert!(can_navigate_to(&claim, &config, "Verification"));
        assert!(can_navigate_to(&claim, &config, "Claim Assessment"));
        assert!(!can_navigate_to(&claim, &config, "IC Decision"));
    }

    #[test]
    fn test_completed_claim_completes_every_stage() {
        let config = config();
        let mut claim = Claim::new("CLM-1", "mobile", "IC Decision");
        claim.status = crate::model::ClaimStatus::Completed;
        for stage in config.stage_names() {
            assert!(is_stage_completed(&claim, &config, stage));
        }
    }

    #[test]
    fn test_unknown_current_stage_falls_back_to_first() {
        let config = config();
        let claim = Claim::new("CLM-1", "mobile", "Renamed Away");
        assert_eq!(current_stage_index(&claim, &config), 0);
        assert!(!is_stage_completed(&claim, &config, "Verification"));
    }

    #[test]
    fn test_validate_mandatory() {
        let config = config();
        let mut values = StageValues::new();
        let errors = validate_mandatory(&config, "Verification", &values);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.get("Incident Date"), Some("Incident Date is required"));

        values.insert("Incident Date".into(), json!(""));
        assert!(!validate_mandatory(&config, "Verification", &values).is_empty());
        values.insert("Incident Date".into(), Value::Null);
        assert!(!validate_mandatory(&config, "Verification", &values).is_empty());

        values.insert("Incident Date".into(), json!("2024-01-01"));
        assert!(validate_mandatory(&config, "Verification", &values).is_empty());
        assert!(validate_mandatory(&config, "Nowhere", &values).is_empty());
    }

    #[test]
    fn test_validate_stage_checks_documents_and_types() {
        let config = config();
        let registry = FieldKindRegistry::standard();
        let mut claim = Claim::new("CLM-1", "mobile", "Verification");

        let errors = validate_stage(&registry, &config, "Verification", &claim);
        assert_eq!(errors.get("Incident Date"), Some("Incident Date is required"));
        assert_eq!(errors.get("Receipt"), Some("Receipt is required"));

        claim.stage_data.insert(
            "Verification".into(),
            [("Incident Date".to_string(), json!("yesterday"))].into(),
        );
        claim.stage_documents.insert(
            "Verification".into(),
            [("Receipt".to_string(), DocumentUpload::new("receipt.pdf", 100))].into(),
        );
        let errors = validate_stage(&registry, &config, "Verification", &claim);
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors.get("Incident Date"),
            Some("Incident Date must be a date (YYYY-MM-DD)")
        );
    }

    #[test]
    fn test_pending_guard_releases_on_drop() {
        let flag = PendingFlag::default();
        {
            let _guard = flag.begin(Operation::Submit).unwrap();
            assert!(flag.is_pending());
            assert!(matches!(
                flag.begin(Operation::Submit),
                Err(ClaimFlowError::OperationPending(Operation::Submit))
            ));
        }
        assert!(!flag.is_pending());
        assert!(flag.begin(Operation::Submit).is_ok());
    }
}
