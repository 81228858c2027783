// src/workflow/handler.rs
//! The phase-dispatch contract between the engine and phase bodies.
//!
//! A phase body is any `PhaseHandler`: it receives a read-only snapshot of
//! the execution so far and returns its result plus cost, or an error
//! string. Concrete bodies (search, crawl, LLM calls, generation services)
//! live behind this trait; the engine never knows what a phase does.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::workflow::types::{ArtifactSet, PhaseOutput, WorkflowConfig};

/// Read-only view handed to a phase body at dispatch time. `outputs` holds
/// every already-terminated phase's result keyed by phase name, so a later
/// phase can read an earlier phase's output (the script writer reads the
/// crawler's article text).
#[derive(Debug, Clone)]
pub struct PhaseContext {
    pub workflow_id: String,
    pub phase_name: String,
    pub config: WorkflowConfig,
    pub outputs: HashMap<String, serde_json::Value>,
    pub artifacts: ArtifactSet,
}

impl PhaseContext {
    /// Output of an upstream phase, if it completed.
    pub fn output_of(&self, phase_name: &str) -> Option<&serde_json::Value> {
        self.outputs.get(phase_name)
    }
}

#[async_trait]
pub trait PhaseHandler: Send + Sync {
    async fn execute(&self, ctx: &PhaseContext) -> Result<PhaseOutput, String>;
}

/// Handler table supplied to the engine at construction, one entry per phase
/// name. Phases without a handler fail at dispatch with a descriptive error
/// rather than hanging the graph.
#[derive(Clone, Default)]
pub struct PhaseHandlers {
    handlers: HashMap<String, Arc<dyn PhaseHandler>>,
}

impl PhaseHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, phase_name: impl Into<String>, handler: Arc<dyn PhaseHandler>) {
        self.handlers.insert(phase_name.into(), handler);
    }

    pub fn with(mut self, phase_name: &str, handler: Arc<dyn PhaseHandler>) -> Self {
        self.register(phase_name, handler);
        self
    }

    pub fn get(&self, phase_name: &str) -> Option<Arc<dyn PhaseHandler>> {
        self.handlers.get(phase_name).cloned()
    }
}

impl std::fmt::Debug for PhaseHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.handlers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        f.debug_struct("PhaseHandlers").field("phases", &names).finish()
    }
}
