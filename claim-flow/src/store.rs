use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::{ClaimFlowError, Result},
    model::{Claim, ClaimStatus, Configuration},
    transition::{self, Transition},
};

/// Placeholder action name reported when a stage with actions is submitted without one.
pub const NO_ACTION: &str = "(none)";

/// Claim handed to the store for submission, with the action that triggered it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub claim: Claim,
    /// Stage being submitted
    pub stage: String,
    /// Label of the chosen action, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

/// Backend that persists claims and configurations.
///
/// The store is the only authority for where a claim goes after submission.
#[async_trait]
pub trait ClaimStore: Send + Sync {
    async fn fetch_claim(&self, reference: &str) -> Result<Claim>;
    async fn fetch_configuration(&self, category: &str) -> Result<Configuration>;
    async fn list_configurations(&self) -> Result<Vec<Configuration>>;
    async fn save_claim(&self, claim: &Claim) -> Result<()>;
    async fn submit_claim(&self, submission: &Submission) -> Result<Claim>;
    async fn save_configuration(&self, config: &Configuration) -> Result<()>;
}

/// In-memory implementation of ClaimStore
#[derive(Clone, Default)]
pub struct InMemoryClaimStore {
    claims: Arc<DashMap<String, Claim>>,
    configurations: Arc<DashMap<String, Configuration>>,
}

impl InMemoryClaimStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_claim(&self, claim: Claim) {
        self.claims.insert(claim.id.clone(), claim);
    }

    pub fn insert_configuration(&self, config: Configuration) {
        self.configurations.insert(config.category.clone(), config);
    }

    /// Open a new claim at the first stage of the configuration for `claim_type`.
    pub fn create_claim(&self, claim_type: &str, customer_name: &str) -> Result<Claim> {
        let first_stage = self
            .configurations
            .get(claim_type)
            .ok_or_else(|| ClaimFlowError::NotFound(format!("configuration '{}'", claim_type)))?
            .first_stage()
            .map(|s| s.name.clone())
            .ok_or(ClaimFlowError::EmptyConfiguration)?;

        let mut claim = Claim::new(
            format!("CLM-{}", Uuid::new_v4().simple()),
            claim_type,
            first_stage,
        );
        claim.customer_name = customer_name.to_string();
        claim.created_date = chrono::Utc::now().to_rfc3339();
        self.insert_claim(claim.clone());

        info!(claim_id = %claim.id, claim_type = %claim_type, "created claim");
        Ok(claim)
    }

    pub fn claim(&self, id: &str) -> Option<Claim> {
        self.claims.get(id).map(|entry| entry.clone())
    }

    /// Decide where the claim goes: the chosen action's target. Only a stage without
    /// actions falls through to the next stage in order.
    fn advance(config: &Configuration, submission: &Submission) -> Result<Transition> {
        let stage = config
            .stage(&submission.stage)
            .ok_or_else(|| ClaimFlowError::StageNotFound(submission.stage.clone()))?;

        if let Some(label) = submission.action.as_deref() {
            let action = stage.action(label).ok_or_else(|| ClaimFlowError::ActionUnavailable {
                stage: stage.name.clone(),
                action: label.to_string(),
            })?;
            let values = submission
                .claim
                .values(&stage.name)
                .cloned()
                .unwrap_or_default();
            if !transition::is_available(action, &values) {
                return Err(ClaimFlowError::ActionUnavailable {
                    stage: stage.name.clone(),
                    action: label.to_string(),
                });
            }
            return Ok(transition::resolve_transition(config, action));
        }

        if !stage.actions.is_empty() {
            return Err(ClaimFlowError::ActionUnavailable {
                stage: stage.name.clone(),
                action: NO_ACTION.to_string(),
            });
        }

        let next = config
            .stage_index(&stage.name)
            .and_then(|index| config.stages.get(index + 1));
        Ok(match next {
            Some(next) => Transition::Advance(next.name.clone()),
            None => Transition::Terminal,
        })
    }
}

#[async_trait]
impl ClaimStore for InMemoryClaimStore {
    async fn fetch_claim(&self, reference: &str) -> Result<Claim> {
        self.claim(reference)
            .ok_or_else(|| ClaimFlowError::NotFound(format!("claim '{}'", reference)))
    }

    async fn fetch_configuration(&self, category: &str) -> Result<Configuration> {
        self.configurations
            .get(category)
            .map(|entry| entry.clone())
            .ok_or_else(|| ClaimFlowError::NotFound(format!("configuration '{}'", category)))
    }

    async fn list_configurations(&self) -> Result<Vec<Configuration>> {
        let mut configs: Vec<Configuration> = self
            .configurations
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        configs.sort_by(|a, b| a.category.cmp(&b.category));
        Ok(configs)
    }

    async fn save_claim(&self, claim: &Claim) -> Result<()> {
        self.insert_claim(claim.clone());
        Ok(())
    }

    async fn submit_claim(&self, submission: &Submission) -> Result<Claim> {
        let config = self.fetch_configuration(&submission.claim.claim_type).await?;
        let transition = Self::advance(&config, submission)?;

        let mut claim = submission.claim.clone();
        match &transition {
            Transition::Advance(next) => {
                claim.current_stage = next.clone();
                claim.status = ClaimStatus::InProgress;
            }
            Transition::Terminal => claim.status = ClaimStatus::Completed,
            Transition::Dangling(target) => {
                warn!(
                    claim_id = %claim.id,
                    target = %target,
                    "action targets a missing stage, completing claim"
                );
                claim.status = ClaimStatus::Completed;
            }
        }

        self.insert_claim(claim.clone());
        info!(
            claim_id = %claim.id,
            stage = %claim.current_stage,
            status = ?claim.status,
            "claim submitted"
        );
        Ok(claim)
    }

    async fn save_configuration(&self, config: &Configuration) -> Result<()> {
        self.insert_configuration(config.clone());
        Ok(())
    }
}
