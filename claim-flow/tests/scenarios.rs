//! End-to-end claim workflows against recording and failing stores

use async_trait::async_trait;
use claim_flow::{
    Action, Claim, ClaimFlowError, ClaimSession, ClaimStatus, ClaimStore, Configuration,
    ConfigurationBuilder, Field, FieldType, InMemoryClaimStore, Operation, Result, Stage,
    SubmitOutcome, Submission, WorkflowRuntime, available_actions, runtime,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

/// Delegates to the in-memory store and records submissions.
#[derive(Default)]
struct RecordingStore {
    inner: InMemoryClaimStore,
    submissions: Mutex<Vec<Submission>>,
    saves: AtomicUsize,
}

impl RecordingStore {
    fn submit_count(&self) -> usize {
        self.submissions.lock().unwrap().len()
    }
}

#[async_trait]
impl ClaimStore for RecordingStore {
    async fn fetch_claim(&self, reference: &str) -> Result<Claim> {
        self.inner.fetch_claim(reference).await
    }

    async fn fetch_configuration(&self, category: &str) -> Result<Configuration> {
        self.inner.fetch_configuration(category).await
    }

    async fn list_configurations(&self) -> Result<Vec<Configuration>> {
        self.inner.list_configurations().await
    }

    async fn save_claim(&self, claim: &Claim) -> Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save_claim(claim).await
    }

    async fn submit_claim(&self, submission: &Submission) -> Result<Claim> {
        self.submissions.lock().unwrap().push(submission.clone());
        self.inner.submit_claim(submission).await
    }

    async fn save_configuration(&self, config: &Configuration) -> Result<()> {
        self.inner.save_configuration(config).await
    }
}

/// Fails every write after reads succeed.
struct FailingStore {
    inner: InMemoryClaimStore,
}

#[async_trait]
impl ClaimStore for FailingStore {
    async fn fetch_claim(&self, reference: &str) -> Result<Claim> {
        self.inner.fetch_claim(reference).await
    }

    async fn fetch_configuration(&self, category: &str) -> Result<Configuration> {
        self.inner.fetch_configuration(category).await
    }

    async fn list_configurations(&self) -> Result<Vec<Configuration>> {
        self.inner.list_configurations().await
    }

    async fn save_claim(&self, _claim: &Claim) -> Result<()> {
        Err(ClaimFlowError::Store("connection reset".into()))
    }

    async fn submit_claim(&self, _submission: &Submission) -> Result<Claim> {
        Err(ClaimFlowError::Store("connection reset".into()))
    }

    async fn save_configuration(&self, _config: &Configuration) -> Result<()> {
        Err(ClaimFlowError::Store("connection reset".into()))
    }
}

/// Holds submissions until a permit is released.
struct GatedStore {
    inner: InMemoryClaimStore,
    gate: Semaphore,
}

#[async_trait]
impl ClaimStore for GatedStore {
    async fn fetch_claim(&self, reference: &str) -> Result<Claim> {
        self.inner.fetch_claim(reference).await
    }

    async fn fetch_configuration(&self, category: &str) -> Result<Configuration> {
        self.inner.fetch_configuration(category).await
    }

    async fn list_configurations(&self) -> Result<Vec<Configuration>> {
        self.inner.list_configurations().await
    }

    async fn save_claim(&self, claim: &Claim) -> Result<()> {
        self.inner.save_claim(claim).await
    }

    async fn submit_claim(&self, submission: &Submission) -> Result<Claim> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| ClaimFlowError::Store(e.to_string()))?;
        self.inner.submit_claim(submission).await
    }

    async fn save_configuration(&self, config: &Configuration) -> Result<()> {
        self.inner.save_configuration(config).await
    }
}

fn verification_config() -> Configuration {
    let mut builder = ConfigurationBuilder::new("mobile", "screen-repair");
    builder.add_stage(Some("Verification")).unwrap();
    builder.add_stage(Some("Claim Assessment")).unwrap();
    builder
        .add_field(
            "Verification",
            Field::new("Incident Date", FieldType::Date).mandatory(),
        )
        .unwrap();
    builder
        .add_action("Verification", Action::new("Send to assessment", "Claim Assessment"))
        .unwrap();
    builder.serialize().unwrap()
}

fn decision_config() -> Configuration {
    let mut builder = ConfigurationBuilder::new("mobile", "screen-repair");
    builder.add_stage(Some("IC Decision")).unwrap();
    builder
        .add_field(
            "IC Decision",
            Field::new("Insurance Decision", FieldType::Dropdown)
                .mandatory()
                .with_options(["Approved", "BER"]),
        )
        .unwrap();
    builder
        .add_action(
            "IC Decision",
            Action::terminal("Approved").when("Insurance Decision", "Approved"),
        )
        .unwrap();
    builder
        .add_action(
            "IC Decision",
            Action::terminal("BER").when("Insurance Decision", "BER"),
        )
        .unwrap();
    builder.serialize().unwrap()
}

fn routed_config() -> Configuration {
    let mut builder = ConfigurationBuilder::new("mobile", "screen-repair");
    for stage in ["Verification", "Claim Assessment", "IC Decision", "Repair"] {
        builder.add_stage(Some(stage)).unwrap();
    }
    builder
        .add_action("Verification", Action::new("Fast track", "IC Decision"))
        .unwrap();
    builder
        .add_field(
            "IC Decision",
            Field::new("Insurance Decision", FieldType::Radio).with_options(["Approved", "BER"]),
        )
        .unwrap();
    builder
        .add_action(
            "IC Decision",
            Action::new("Repair", "Repair").when("Insurance Decision", "Approved"),
        )
        .unwrap();
    builder
        .add_action(
            "IC Decision",
            Action::terminal("Write off").when("Insurance Decision", "BER"),
        )
        .unwrap();
    builder.serialize().unwrap()
}

fn recording(config: Configuration, claim: Claim) -> Arc<RecordingStore> {
    let store = RecordingStore::default();
    store.inner.insert_configuration(config);
    store.inner.insert_claim(claim);
    Arc::new(store)
}

#[tokio::test]
async fn submit_blocks_on_missing_mandatory_field_then_advances() {
    let store = recording(
        verification_config(),
        Claim::new("CLM-1", "mobile", "Verification"),
    );
    let runtime = WorkflowRuntime::new(store.clone());
    let mut session = runtime.open_claim("CLM-1").await.unwrap();

    let err = runtime.submit(&mut session, None).await.unwrap_err();
    let errors = err.validation_errors().expect("validation failure");
    assert_eq!(errors.get("Incident Date"), Some("Incident Date is required"));
    assert_eq!(err.to_string(), "Incident Date is required");
    assert_eq!(store.submit_count(), 0);
    assert_eq!(session.errors(), errors);

    session
        .update_field("Verification", "Incident Date", json!("2024-01-01"))
        .unwrap();
    assert!(session.errors().is_empty());

    let outcome = runtime.submit(&mut session, None).await.unwrap();
    assert_eq!(
        outcome,
        SubmitOutcome::Advanced {
            to: "Claim Assessment".into()
        }
    );

    let submissions = store.submissions.lock().unwrap().clone();
    assert_eq!(submissions.len(), 1);
    assert_eq!(
        submissions[0].claim.value("Verification", "Incident Date"),
        Some(&json!("2024-01-01"))
    );
    assert_eq!(session.claim().current_stage, "Claim Assessment");
    assert!(session.is_stage_completed("Verification"));
}

#[tokio::test]
async fn conditional_terminal_action_completes_claim() {
    let store = recording(
        decision_config(),
        Claim::new("CLM-2", "mobile", "IC Decision"),
    );
    let runtime = WorkflowRuntime::new(store.clone());
    let mut session = runtime.open_claim("CLM-2").await.unwrap();
    assert!(session.available_actions().is_empty());

    session
        .update_field("IC Decision", "Insurance Decision", json!("Approved"))
        .unwrap();
    let labels: Vec<&str> = session
        .available_actions()
        .iter()
        .map(|a| a.label.as_str())
        .collect();
    assert_eq!(labels, vec!["Approved"]);

    let unavailable = runtime.submit(&mut session, Some("BER")).await.unwrap_err();
    assert!(matches!(unavailable, ClaimFlowError::ActionUnavailable { .. }));
    assert_eq!(store.submit_count(), 0);

    let outcome = runtime.submit(&mut session, Some("Approved")).await.unwrap();
    assert_eq!(outcome, SubmitOutcome::Completed);
    assert_eq!(session.claim().status, ClaimStatus::Completed);
    assert!(session.available_actions().is_empty());

    let edit = session.update_field("IC Decision", "Insurance Decision", json!("BER"));
    assert!(matches!(edit, Err(ClaimFlowError::StageReadOnly(_))));
    let again = runtime.submit(&mut session, None).await;
    assert!(matches!(again, Err(ClaimFlowError::StageReadOnly(_))));
}

#[test]
fn removing_stages_never_empties_a_configuration() {
    let mut builder = ConfigurationBuilder::from_configuration(verification_config());
    builder.add_stage(None).unwrap();
    builder.add_stage(None).unwrap();

    loop {
        let first = builder.stages()[0].name.clone();
        match builder.remove_stage(&first) {
            Ok(()) => continue,
            Err(err) => {
                assert!(matches!(err, ClaimFlowError::LastStage(_)));
                break;
            }
        }
    }
    assert_eq!(builder.stages().len(), 1);
}

#[test]
fn completion_tracks_position_for_every_stage() {
    let config = Configuration {
        category: "mobile".into(),
        service: "screen-repair".into(),
        stages: ["Intake", "Verification", "Claim Assessment", "IC Decision", "Repair"]
            .into_iter()
            .map(Stage::new)
            .collect(),
    };

    for (current_index, current) in config.stages.iter().enumerate() {
        let claim = Claim::new("CLM-3", "mobile", current.name.clone());
        for (index, stage) in config.stages.iter().enumerate() {
            assert_eq!(
                runtime::is_stage_completed(&claim, &config, &stage.name),
                index < current_index,
                "stage {} with current {}",
                stage.name,
                current.name
            );
            assert_eq!(
                runtime::can_navigate_to(&claim, &config, &stage.name),
                index <= current_index
            );
        }
    }
}

#[test]
fn action_availability_follows_condition_value() {
    let config = decision_config();
    let stage = config.stage("IC Decision").unwrap();
    let mut values = claim_flow::StageValues::new();

    values.insert("Insurance Decision".into(), json!("BER"));
    let labels: Vec<&str> = available_actions(stage, &values)
        .iter()
        .map(|a| a.label.as_str())
        .collect();
    assert_eq!(labels, vec!["BER"]);

    values.insert("Insurance Decision".into(), json!("Approved"));
    let labels: Vec<&str> = available_actions(stage, &values)
        .iter()
        .map(|a| a.label.as_str())
        .collect();
    assert_eq!(labels, vec!["Approved"]);

    let mut unconditional = stage.clone();
    unconditional.actions[1].condition = None;
    assert_eq!(available_actions(&unconditional, &values).len(), 2);
}

#[tokio::test]
async fn store_failure_leaves_session_untouched() {
    let store = Arc::new(FailingStore {
        inner: InMemoryClaimStore::new(),
    });
    store.inner.insert_configuration(verification_config());
    store
        .inner
        .insert_claim(Claim::new("CLM-4", "mobile", "Verification"));
    let runtime = WorkflowRuntime::new(store.clone());
    let mut session = runtime.open_claim("CLM-4").await.unwrap();
    session
        .update_field("Verification", "Incident Date", json!("2024-01-01"))
        .unwrap();
    let before = session.claim().clone();

    let err = runtime.submit(&mut session, None).await.unwrap_err();
    assert!(matches!(err, ClaimFlowError::Store(_)));
    assert!(!err.is_validation());
    assert_eq!(session.claim(), &before);

    let err = runtime.save_draft(&session).await.unwrap_err();
    assert!(matches!(err, ClaimFlowError::Store(_)));
    assert!(!runtime.is_pending(Operation::Save));
    assert!(!runtime.is_pending(Operation::Submit));
}

#[tokio::test]
async fn save_draft_keeps_current_stage() {
    let store = recording(
        verification_config(),
        Claim::new("CLM-5", "mobile", "Verification"),
    );
    let runtime = WorkflowRuntime::new(store.clone());
    let mut session = runtime.open_claim("CLM-5").await.unwrap();
    session
        .update_field("Verification", "Incident Date", json!("2024-02-02"))
        .unwrap();

    runtime.save_draft(&session).await.unwrap();

    let saved = store.inner.claim("CLM-5").unwrap();
    assert_eq!(saved.current_stage, "Verification");
    assert_eq!(saved.status, ClaimStatus::New);
    assert_eq!(saved.value("Verification", "Incident Date"), Some(&json!("2024-02-02")));
    assert_eq!(store.saves.load(Ordering::SeqCst), 1);
    assert_eq!(store.submit_count(), 0);
}

#[tokio::test]
async fn unknown_claim_is_not_found() {
    let runtime = WorkflowRuntime::new(Arc::new(InMemoryClaimStore::new()));
    let err = runtime.open_claim("CLM-404").await.unwrap_err();
    assert!(matches!(err, ClaimFlowError::NotFound(_)));
}

#[tokio::test]
async fn second_submit_while_one_is_in_flight_is_rejected() {
    let store = Arc::new(GatedStore {
        inner: InMemoryClaimStore::new(),
        gate: Semaphore::new(0),
    });
    store.inner.insert_configuration(verification_config());
    for id in ["CLM-6", "CLM-7"] {
        let mut claim = Claim::new(id, "mobile", "Verification");
        claim.stage_data.insert(
            "Verification".into(),
            [("Incident Date".to_string(), json!("2024-01-01"))].into(),
        );
        store.inner.insert_claim(claim);
    }

    let runtime = Arc::new(WorkflowRuntime::new(store.clone()));
    let first: ClaimSession = runtime.open_claim("CLM-6").await.unwrap();
    let mut second = runtime.open_claim("CLM-7").await.unwrap();

    let in_flight = {
        let runtime = runtime.clone();
        tokio::spawn(async move {
            let mut session = first;
            runtime.submit(&mut session, None).await
        })
    };
    while !runtime.is_pending(Operation::Submit) {
        tokio::task::yield_now().await;
    }

    let rejected = runtime.submit(&mut second, None).await.unwrap_err();
    assert!(matches!(
        rejected,
        ClaimFlowError::OperationPending(Operation::Submit)
    ));
    assert_eq!(second.claim().current_stage, "Verification");

    store.gate.add_permits(1);
    let outcome = in_flight.await.unwrap().unwrap();
    assert_eq!(
        outcome,
        SubmitOutcome::Advanced {
            to: "Claim Assessment".into()
        }
    );
    assert!(!runtime.is_pending(Operation::Submit));

    store.gate.add_permits(1);
    runtime.submit(&mut second, None).await.unwrap();
}

#[tokio::test]
async fn unlabelled_submit_routes_through_the_stage_actions() {
    let store = recording(
        routed_config(),
        Claim::new("CLM-8", "mobile", "Verification"),
    );
    let runtime = WorkflowRuntime::new(store.clone());
    let mut session = runtime.open_claim("CLM-8").await.unwrap();

    let outcome = runtime.submit(&mut session, None).await.unwrap();
    assert_eq!(
        outcome,
        SubmitOutcome::Advanced {
            to: "IC Decision".into()
        }
    );
    assert_eq!(
        store.submissions.lock().unwrap()[0].action.as_deref(),
        Some("Fast track")
    );

    // both actions are conditional and neither condition holds yet
    let err = runtime.submit(&mut session, None).await.unwrap_err();
    assert!(matches!(err, ClaimFlowError::ActionUnavailable { .. }));
    assert_eq!(store.submit_count(), 1);
    assert_eq!(session.claim().current_stage, "IC Decision");

    session
        .update_field("IC Decision", "Insurance Decision", json!("Approved"))
        .unwrap();
    let outcome = runtime.submit(&mut session, None).await.unwrap();
    assert_eq!(outcome, SubmitOutcome::Advanced { to: "Repair".into() });

    // a stage without actions advances in order; the last one completes
    let outcome = runtime.submit(&mut session, None).await.unwrap();
    assert_eq!(outcome, SubmitOutcome::Completed);
    assert_eq!(store.submit_count(), 3);
}

#[tokio::test]
async fn store_rejects_unlabelled_submit_of_a_routed_stage() {
    let store = InMemoryClaimStore::new();
    store.insert_configuration(routed_config());
    let claim = Claim::new("CLM-9", "mobile", "IC Decision");

    let err = store
        .submit_claim(&Submission {
            claim,
            stage: "IC Decision".into(),
            action: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ClaimFlowError::ActionUnavailable { .. }));
    assert_eq!(
        store.claim("CLM-9"),
        None,
        "a rejected submission is not stored"
    );
}
