// src/events/mod.rs
//! Progress events emitted by the workflow engine and fanned out by the bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod bus;

pub use bus::{ProgressBus, SharedProgressBus, SubscriberId};

/// Kind of progress event. Serialized as snake_case strings on the wire
/// ("workflow_started", "phase_completed", ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    WorkflowStarted,
    WorkflowCompleted,
    WorkflowFailed,
    WorkflowCancelled,
    PhaseStarted,
    PhaseCompleted,
    PhaseFailed,
    ProgressUpdate,
    CostUpdate,
    LogMessage,
}

/// A single progress event. Append-only: never mutated after emission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub kind: EventKind,
    pub workflow_id: String,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_percentage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_delta: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProgressEvent {
    fn new(kind: EventKind, workflow_id: &str, data: serde_json::Value) -> Self {
        Self {
            kind,
            workflow_id: workflow_id.to_string(),
            timestamp: Utc::now(),
            data,
            phase_name: None,
            progress_percentage: None,
            cost_delta: None,
            message: None,
        }
    }

    pub fn workflow_started(workflow_id: &str, config: serde_json::Value, topic: &str) -> Self {
        let mut event = Self::new(EventKind::WorkflowStarted, workflow_id, config);
        event.message = Some(format!("Started workflow: {}", topic));
        event
    }

    pub fn workflow_completed(workflow_id: &str, result: serde_json::Value) -> Self {
        let mut event = Self::new(EventKind::WorkflowCompleted, workflow_id, result);
        event.progress_percentage = Some(100.0);
        event.message = Some("Workflow completed successfully".to_string());
        event
    }

    /// Terminal failure event. `data` carries the full list of phase-level
    /// errors accumulated during the run, not just the first one.
    pub fn workflow_failed(workflow_id: &str, error: &str, data: serde_json::Value) -> Self {
        let mut event = Self::new(EventKind::WorkflowFailed, workflow_id, data);
        event.message = Some(format!("Workflow failed: {}", error));
        event
    }

    pub fn workflow_cancelled(workflow_id: &str) -> Self {
        let mut event = Self::new(EventKind::WorkflowCancelled, workflow_id, serde_json::json!({}));
        event.message = Some("Workflow cancelled by user".to_string());
        event
    }

    pub fn phase_started(
        workflow_id: &str,
        phase_name: &str,
        current_phase: usize,
        total_phases: usize,
    ) -> Self {
        let progress = if total_phases > 0 {
            (current_phase as f64 / total_phases as f64) * 100.0
        } else {
            0.0
        };
        let mut event = Self::new(
            EventKind::PhaseStarted,
            workflow_id,
            serde_json::json!({ "current_phase": current_phase, "total_phases": total_phases }),
        );
        event.phase_name = Some(phase_name.to_string());
        event.progress_percentage = Some(progress);
        event.message = Some(format!("Started phase: {}", phase_name));
        event
    }

    pub fn phase_completed(
        workflow_id: &str,
        phase_name: &str,
        completed_phases: usize,
        total_phases: usize,
        cost: f64,
        result: serde_json::Value,
    ) -> Self {
        let progress = if total_phases > 0 {
            (completed_phases as f64 / total_phases as f64) * 100.0
        } else {
            0.0
        };
        let mut event = Self::new(EventKind::PhaseCompleted, workflow_id, result);
        event.phase_name = Some(phase_name.to_string());
        event.progress_percentage = Some(progress);
        event.cost_delta = Some(cost);
        event.message = Some(format!("Completed phase: {}", phase_name));
        event
    }

    pub fn phase_failed(workflow_id: &str, phase_name: &str, error: &str) -> Self {
        let mut event = Self::new(
            EventKind::PhaseFailed,
            workflow_id,
            serde_json::json!({ "error": error }),
        );
        event.phase_name = Some(phase_name.to_string());
        event.message = Some(format!("Phase {} failed: {}", phase_name, error));
        event
    }

    pub fn cost_update(workflow_id: &str, cost_delta: f64, total_cost: f64) -> Self {
        let mut event = Self::new(
            EventKind::CostUpdate,
            workflow_id,
            serde_json::json!({ "total_cost": total_cost }),
        );
        event.cost_delta = Some(cost_delta);
        event.message = Some(format!(
            "Cost update: +${:.3} (total: ${:.3})",
            cost_delta, total_cost
        ));
        event
    }

    pub fn log_message(workflow_id: &str, level: &str, message: &str) -> Self {
        let mut event = Self::new(
            EventKind::LogMessage,
            workflow_id,
            serde_json::json!({ "level": level }),
        );
        event.message = Some(message.to_string());
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_wire_format() {
        let event = ProgressEvent::phase_started("wf-1", "search", 0, 4);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "phase_started");
        assert_eq!(json["phase_name"], "search");
        assert_eq!(json["progress_percentage"], 0.0);
        // absent optionals are omitted from the wire record
        assert!(json.get("cost_delta").is_none());
    }

    #[test]
    fn test_completion_event_carries_full_progress() {
        let event = ProgressEvent::workflow_completed("wf-1", serde_json::json!({"ok": true}));
        assert_eq!(event.progress_percentage, Some(100.0));
        assert_eq!(event.kind, EventKind::WorkflowCompleted);
    }

    #[test]
    fn test_cost_update_message() {
        let event = ProgressEvent::cost_update("wf-1", 0.05, 0.25);
        assert_eq!(event.cost_delta, Some(0.05));
        assert_eq!(event.data["total_cost"], 0.25);
    }
}
