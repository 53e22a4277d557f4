//! ClaimStore backed by the remote claims API.
//!
//! | Operation | Request |
//! |---|---|
//! | fetch claim | `GET /claims/{reference}` |
//! | fetch configuration | `GET /configurations/{category}` |
//! | list configurations | `GET /configurations` |
//! | save draft | `PUT /claims/{id}` |
//! | submit | `POST /claims/{id}/submit` |
//! | save configuration | `POST /configurations` |
//!
//! A 404 maps to [`ClaimFlowError::NotFound`]; any other failure is a
//! [`ClaimFlowError::Store`] error.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error};

use crate::{
    config::StoreSettings,
    error::{ClaimFlowError, Result},
    model::{Claim, Configuration},
    store::{ClaimStore, Submission},
};

pub struct HttpClaimStore {
    client: Client,
    base_url: Url,
}

impl HttpClaimStore {
    pub fn new(settings: &StoreSettings) -> Result<Self> {
        let base_url = Url::parse(&settings.base_url).map_err(|e| {
            ClaimFlowError::Config(format!("invalid API URL '{}': {}", settings.base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ClaimFlowError::Config(format!(
                "API URL '{}' cannot carry paths",
                settings.base_url
            )));
        }
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| ClaimFlowError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, base_url })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(&StoreSettings::from_env()?)
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        let response = request.send().await.map_err(|e| {
            error!(error = %e, "request for {} failed", what);
            ClaimFlowError::Store(format!("{}: {}", what, e))
        })?;

        let status = response.status();
        debug!(status = %status, "{} responded", what);
        if status == StatusCode::NOT_FOUND {
            return Err(ClaimFlowError::NotFound(what.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "{} rejected", what);
            return Err(ClaimFlowError::Store(format!("{} returned {}", what, status)));
        }
        Ok(response)
    }

    async fn read_json<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
        response
            .json::<T>()
            .await
            .map_err(|e| ClaimFlowError::Store(format!("unreadable {} response: {}", what, e)))
    }
}

/// The store must say where the claim is now; a reply without it is not adopted.
fn submitted_claim(body: Value) -> Result<Claim> {
    let has_stage = body
        .get("currentStage")
        .and_then(Value::as_str)
        .is_some_and(|stage| !stage.trim().is_empty());
    if !has_stage {
        return Err(ClaimFlowError::Store(
            "submit response is missing currentStage".to_string(),
        ));
    }
    serde_json::from_value(body)
        .map_err(|e| ClaimFlowError::Store(format!("unreadable submit response: {}", e)))
}

#[async_trait]
impl ClaimStore for HttpClaimStore {
    async fn fetch_claim(&self, reference: &str) -> Result<Claim> {
        let what = format!("claim '{}'", reference);
        let url = self.endpoint(&["claims", reference]);
        let response = self.send(self.client.get(url), &what).await?;
        Self::read_json(response, &what).await
    }

    async fn fetch_configuration(&self, category: &str) -> Result<Configuration> {
        let what = format!("configuration '{}'", category);
        let url = self.endpoint(&["configurations", category]);
        let response = self.send(self.client.get(url), &what).await?;
        Self::read_json(response, &what).await
    }

    async fn list_configurations(&self) -> Result<Vec<Configuration>> {
        let url = self.endpoint(&["configurations"]);
        let response = self.send(self.client.get(url), "configurations").await?;
        Self::read_json(response, "configurations").await
    }

    async fn save_claim(&self, claim: &Claim) -> Result<()> {
        let what = format!("claim '{}'", claim.id);
        let url = self.endpoint(&["claims", &claim.id]);
        self.send(self.client.put(url).json(claim), &what).await?;
        Ok(())
    }

    async fn submit_claim(&self, submission: &Submission) -> Result<Claim> {
        let what = format!("claim '{}'", submission.claim.id);
        let url = self.endpoint(&["claims", &submission.claim.id, "submit"]);
        let response = self
            .send(self.client.post(url).json(submission), &what)
            .await?;
        let body: Value = Self::read_json(response, &what).await?;
        submitted_claim(body)
    }

    async fn save_configuration(&self, config: &Configuration) -> Result<()> {
        let what = format!("configuration '{}'", config.category);
        let url = self.endpoint(&["configurations"]);
        self.send(self.client.post(url).json(config), &what).await?;
        Ok(())
    }
}
