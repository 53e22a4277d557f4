use dashmap::{DashMap, mapref::entry::Entry};
use std::fmt;
use std::sync::Arc;

use crate::{
    error::{ClaimFlowError, Result},
    model::Configuration,
};

/// One-shot payload passed from one screen to the next
#[derive(Debug, Clone, PartialEq)]
pub enum Handoff {
    /// Open this configuration in the builder
    EditConfiguration(Configuration),
    /// Create a stage with this name in the configuration for `category`
    NameNewStage { category: String, name: String },
}

impl Handoff {
    pub fn key(&self) -> HandoffKey {
        match self {
            Handoff::EditConfiguration(_) => HandoffKey::EditConfiguration,
            Handoff::NameNewStage { .. } => HandoffKey::NameNewStage,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandoffKey {
    EditConfiguration,
    NameNewStage,
}

impl fmt::Display for HandoffKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandoffKey::EditConfiguration => f.write_str("edit-configuration"),
            HandoffKey::NameNewStage => f.write_str("name-new-stage"),
        }
    }
}

/// Write-once, read-once slots for hand-offs, at most one pending per key.
#[derive(Clone, Debug, Default)]
pub struct HandoffSlots {
    slots: Arc<DashMap<HandoffKey, Handoff>>,
}

impl HandoffSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a payload. Fails if one is already waiting under the same key.
    pub fn put(&self, handoff: Handoff) -> Result<()> {
        match self.slots.entry(handoff.key()) {
            Entry::Occupied(entry) => Err(ClaimFlowError::HandoffPending(entry.key().to_string())),
            Entry::Vacant(entry) => {
                entry.insert(handoff);
                Ok(())
            }
        }
    }

    /// Consume the pending payload for `key`, leaving the slot empty.
    pub fn take(&self, key: HandoffKey) -> Option<Handoff> {
        self.slots.remove(&key).map(|(_, handoff)| handoff)
    }

    pub fn is_pending(&self, key: HandoffKey) -> bool {
        self.slots.contains_key(&key)
    }

    pub fn clear(&self) {
        self.slots.clear();
    }
}
