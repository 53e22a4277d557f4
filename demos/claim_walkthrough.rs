use anyhow::{Context, bail};
use claim_flow::{
    ClaimFlowError, ClaimSession, Configuration, ConfigurationCatalog, DocumentUpload,
    InMemoryClaimStore, WorkflowRuntime,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const PHONE_REPAIR: &str = include_str!("phone_repair.yaml");

fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "claim_walkthrough=debug,claim_flow=debug".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_level(true),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }
}

fn print_overview(session: &ClaimSession) {
    for progress in session.overview() {
        info!(stage = %progress.stage, state = ?progress.state, "stage");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let store = Arc::new(InMemoryClaimStore::new());
    let catalog = ConfigurationCatalog::new(store.clone());
    let runtime = WorkflowRuntime::new(store.clone());

    // Publish the phone repair workflow through the builder
    let config = Configuration::from_yaml(PHONE_REPAIR).context("parsing phone_repair.yaml")?;
    let builder = claim_flow::ConfigurationBuilder::from_configuration(config);
    let published = catalog.publish(&builder).await?;
    info!(stages = ?published.stage_names().collect::<Vec<_>>(), "workflow ready");

    let claim = store.create_claim(&published.category, "Dana Reyes")?;
    let mut session = runtime.open_claim(&claim.id).await?;

    // Claim Submission
    session.update_field("Claim Submission", "Device Model", json!("Pixel 8"))?;
    session.update_field(
        "Claim Submission",
        "Damage Description",
        json!("Cracked screen after a drop"),
    )?;
    session.attach_document(
        "Claim Submission",
        "Purchase Receipt",
        DocumentUpload::new("receipt.PDF", 120_000),
    )?;
    runtime.submit(&mut session, Some("Send to verification")).await?;

    // Verification: the incident date is mandatory
    match runtime.submit(&mut session, None).await {
        Err(ClaimFlowError::Validation(errors)) => {
            for (field, message) in errors.iter() {
                warn!(field = %field, "{}", message);
            }
        }
        other => bail!("expected a validation failure, got {:?}", other),
    }
    session.update_field("Verification", "Incident Date", json!("2024-01-01"))?;
    let outcome = runtime.submit(&mut session, None).await?;
    info!(outcome = ?outcome, "verification submitted");

    // Claim Assessment
    session.update_field("Claim Assessment", "Assessor Notes", json!("Screen only"))?;
    runtime.submit(&mut session, Some("Refer to IC")).await?;

    // IC Decision: only the action matching the decision is offered
    session.update_field("IC Decision", "Insurance Decision", json!("Approved"))?;
    for choice in session.action_choices() {
        info!(
            label = %choice.label,
            option = ?choice.option,
            leads_to = ?choice.leads_to,
            "available action"
        );
    }
    let outcome = runtime.submit(&mut session, Some("Approve")).await?;
    info!(outcome = ?outcome, status = ?session.claim().status, "decision submitted");

    print_overview(&session);
    Ok(())
}
