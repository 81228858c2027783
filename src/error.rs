// src/error.rs
use thiserror::Error;

/// Errors raised synchronously by the engine and registry.
///
/// Configuration problems (unknown workflow type, bad phase graph) surface
/// here at create/registry-load time and never during execution. Phase-level
/// failures are not errors at this level: they are recorded on the phase and
/// the run continues.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Workflow {0} not found")]
    NotFound(String),
}

impl EngineError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        EngineError::Configuration(msg.into())
    }
}
