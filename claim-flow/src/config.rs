use std::time::Duration;

use crate::error::{ClaimFlowError, Result};

/// Base URL of the claims API
pub const API_URL_ENV: &str = "CLAIM_FLOW_API_URL";
/// Request timeout in seconds
pub const TIMEOUT_ENV: &str = "CLAIM_FLOW_TIMEOUT_SECS";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for the remote claims API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    pub base_url: String,
    pub timeout: Duration,
}

impl StoreSettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Read `CLAIM_FLOW_API_URL` and `CLAIM_FLOW_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let base_url = lookup(API_URL_ENV)
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .ok_or_else(|| ClaimFlowError::Config(format!("{} not set", API_URL_ENV)))?;

        let timeout = match lookup(TIMEOUT_ENV) {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| {
                    ClaimFlowError::Config(format!(
                        "{} must be whole seconds, got '{}'",
                        TIMEOUT_ENV, raw
                    ))
                })?,
            None => DEFAULT_TIMEOUT,
        };

        Ok(Self { base_url, timeout })
    }
}
