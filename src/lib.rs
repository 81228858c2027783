// lib.rs - Main library file that exports all modules
pub mod error;
pub mod events;
pub mod handlers;
pub mod middleware;
pub mod selector;
pub mod workflow;

use std::sync::Arc;

pub use error::EngineError;
pub use events::{ProgressBus, ProgressEvent, SharedProgressBus};
pub use selector::{AssetSelector, Beat};
pub use workflow::{
    PhaseRegistry, SharedWorkflowEngine, SharedWorkflowManager, WorkflowConfig, WorkflowEngine,
    WorkflowManager, WorkflowType,
};

/// Shared application state handed to every handler.
pub struct AppState {
    pub bus: SharedProgressBus,
    pub engine: SharedWorkflowEngine,
    pub manager: SharedWorkflowManager,
}

pub type SharedAppState = Arc<AppState>;
