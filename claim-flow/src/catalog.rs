use std::sync::Arc;
use tracing::info;

use crate::{
    builder::ConfigurationBuilder,
    error::{Operation, Result},
    handoff::Handoff,
    model::Configuration,
    runtime::PendingFlag,
    store::ClaimStore,
};

/// Loads configurations for editing and publishes finished ones.
pub struct ConfigurationCatalog {
    store: Arc<dyn ClaimStore>,
    publishing: PendingFlag,
    searching: PendingFlag,
}

impl ConfigurationCatalog {
    pub fn new(store: Arc<dyn ClaimStore>) -> Self {
        Self {
            store,
            publishing: PendingFlag::default(),
            searching: PendingFlag::default(),
        }
    }

    pub async fn list(&self) -> Result<Vec<Configuration>> {
        let _guard = self.searching.begin(Operation::Search)?;
        self.store.list_configurations().await
    }

    /// Fetch a configuration as a hand-off payload for the builder screen.
    pub async fn edit_handoff(&self, category: &str) -> Result<Handoff> {
        let _guard = self.searching.begin(Operation::Search)?;
        let config = self.store.fetch_configuration(category).await?;
        Ok(Handoff::EditConfiguration(config))
    }

    pub async fn open_for_editing(&self, category: &str) -> Result<ConfigurationBuilder> {
        let _guard = self.searching.begin(Operation::Search)?;
        let config = self.store.fetch_configuration(category).await?;
        Ok(ConfigurationBuilder::from_configuration(config))
    }

    /// Serialize the builder and save the result. Nothing is sent if serialization fails.
    pub async fn publish(&self, builder: &ConfigurationBuilder) -> Result<Configuration> {
        let _guard = self.publishing.begin(Operation::Publish)?;
        let config = builder.serialize()?;

        self.store.save_configuration(&config).await?;
        info!(
            category = %config.category,
            service = %config.service,
            stages = config.stages.len(),
            "published configuration"
        );
        Ok(config)
    }
}
