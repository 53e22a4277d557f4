pub mod builder;
pub mod catalog;
pub mod config;
pub mod error;
pub mod field_kind;
pub mod handoff;
#[cfg(feature = "http")]
pub mod http;
pub mod model;
pub mod runtime;
pub mod session;
pub mod store;
pub mod transition;

// Re-export commonly used types
pub use builder::ConfigurationBuilder;
pub use catalog::ConfigurationCatalog;
pub use config::StoreSettings;
pub use error::{ClaimFlowError, Operation, Result, ValidationErrors};
pub use field_kind::{FieldKind, FieldKindRegistry, Widget, WidgetInput};
pub use handoff::{Handoff, HandoffKey, HandoffSlots};
#[cfg(feature = "http")]
pub use http::HttpClaimStore;
pub use model::{
    Action, Claim, ClaimStatus, Condition, Configuration, DocumentRequirement, DocumentUpload,
    Field, FieldType, IntegrityWarning, Stage, StageData, StageValues,
};
pub use runtime::{SubmitOutcome, WorkflowRuntime};
pub use session::{ActionChoice, ClaimSession, StageProgress, StageState};
pub use store::{ClaimStore, InMemoryClaimStore, Submission};
pub use transition::{Transition, available_actions, resolve_target, resolve_transition};
