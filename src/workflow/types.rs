// src/workflow/types.rs
//! Workflow state model: config, phases, and the execution aggregate.
//!
//! The execution is exclusively owned and mutated by the engine's scheduler
//! loop while active; after reaching a terminal status it moves to a
//! read-only history store and is never touched again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowType {
    FullPipeline,
    QuickGenerate,
    SearchAndScript,
    ArticleToScript,
}

impl WorkflowType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowType::FullPipeline => "full_pipeline",
            WorkflowType::QuickGenerate => "quick_generate",
            WorkflowType::SearchAndScript => "search_and_script",
            WorkflowType::ArticleToScript => "article_to_script",
        }
    }

    pub fn parse(value: &str) -> Result<Self, EngineError> {
        match value {
            "full_pipeline" => Ok(WorkflowType::FullPipeline),
            "quick_generate" => Ok(WorkflowType::QuickGenerate),
            "search_and_script" => Ok(WorkflowType::SearchAndScript),
            "article_to_script" => Ok(WorkflowType::ArticleToScript),
            other => Err(EngineError::configuration(format!(
                "Unknown workflow type: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Pending,
    Starting,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl PhaseStatus {
    /// Completed or Failed. A terminated dependency unblocks its downstream
    /// phases regardless of which way it terminated.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PhaseStatus::Completed | PhaseStatus::Failed)
    }
}

/// Immutable workflow configuration supplied at creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub topic: String,
    pub workflow_type: WorkflowType,
    pub platforms: Vec<String>,
    pub style: String,
    pub tone: String,
    pub max_cost_usd: f64,
    pub timeout_minutes: u64,
}

impl WorkflowConfig {
    pub fn new(topic: impl Into<String>, workflow_type: WorkflowType) -> Self {
        Self {
            topic: topic.into(),
            workflow_type,
            platforms: vec!["all".to_string()],
            style: "educational".to_string(),
            tone: "casual".to_string(),
            max_cost_usd: 10.0,
            timeout_minutes: 30,
        }
    }

    pub fn with_platforms(mut self, platforms: Vec<String>) -> Self {
        if !platforms.is_empty() {
            self.platforms = platforms;
        }
        self
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = style.into();
        self
    }

    pub fn with_timeout_minutes(mut self, minutes: u64) -> Self {
        self.timeout_minutes = minutes;
        self
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if !(self.max_cost_usd > 0.0) {
            return Err(EngineError::configuration(format!(
                "max_cost_usd must be positive, got {}",
                self.max_cost_usd
            )));
        }
        Ok(())
    }
}

/// One phase-level failure record. Appended to the execution, never
/// overwritten; the terminal failure summary carries all of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseFailure {
    pub phase: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// List-valued contributions merged into the execution aggregate.
///
/// Parallel phases both appending to the same field must end up with the
/// union of both contributions, so merging is concatenation, never
/// assignment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtifactSet {
    pub image_files: Vec<String>,
    pub voice_files: Vec<String>,
    pub broll_files: Vec<String>,
    pub notes: Vec<String>,
}

impl ArtifactSet {
    pub fn extend(&mut self, other: ArtifactSet) {
        self.image_files.extend(other.image_files);
        self.voice_files.extend(other.voice_files);
        self.broll_files.extend(other.broll_files);
        self.notes.extend(other.notes);
    }

    pub fn is_empty(&self) -> bool {
        self.image_files.is_empty()
            && self.voice_files.is_empty()
            && self.broll_files.is_empty()
            && self.notes.is_empty()
    }
}

/// Result payload returned by a phase handler.
#[derive(Debug, Clone, Default)]
pub struct PhaseOutput {
    /// Opaque per-phase result, stored under the phase name.
    pub data: serde_json::Value,
    pub cost_usd: f64,
    /// Reducer-merged contributions to the execution aggregate.
    pub artifacts: ArtifactSet,
}

impl PhaseOutput {
    pub fn new(data: serde_json::Value, cost_usd: f64) -> Self {
        Self {
            data,
            cost_usd,
            artifacts: ArtifactSet::default(),
        }
    }

    pub fn with_artifacts(mut self, artifacts: ArtifactSet) -> Self {
        self.artifacts = artifacts;
        self
    }
}

/// Mutable per-execution phase tracking. Terminates in Completed or Failed,
/// never reopened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowPhase {
    pub name: String,
    pub status: PhaseStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cost_usd: f64,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl WorkflowPhase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: PhaseStatus::Pending,
            started_at: None,
            completed_at: None,
            cost_usd: 0.0,
            result: None,
            error: None,
        }
    }
}

/// The execution aggregate root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: String,
    pub config: WorkflowConfig,
    pub status: WorkflowStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub phases: Vec<WorkflowPhase>,
    pub total_cost_usd: f64,
    /// Reducer-merged list-valued fields contributed by phases.
    pub artifacts: ArtifactSet,
    /// Terminated phase outputs keyed by phase name, readable by later phases.
    pub outputs: HashMap<String, serde_json::Value>,
    pub errors: Vec<PhaseFailure>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl WorkflowExecution {
    pub fn new(id: String, config: WorkflowConfig, phase_names: &[&str]) -> Self {
        Self {
            id,
            config,
            status: WorkflowStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            phases: phase_names.iter().map(|name| WorkflowPhase::new(*name)).collect(),
            total_cost_usd: 0.0,
            artifacts: ArtifactSet::default(),
            outputs: HashMap::new(),
            errors: Vec::new(),
            result: None,
            error: None,
        }
    }

    pub fn phase(&self, name: &str) -> Option<&WorkflowPhase> {
        self.phases.iter().find(|p| p.name == name)
    }

    fn phase_mut(&mut self, name: &str) -> Option<&mut WorkflowPhase> {
        self.phases.iter_mut().find(|p| p.name == name)
    }

    pub fn mark_phase_running(&mut self, name: &str) {
        if let Some(phase) = self.phase_mut(name) {
            phase.status = PhaseStatus::Running;
            phase.started_at = Some(Utc::now());
        }
    }

    /// Fold a successful phase result into the aggregate: store the opaque
    /// payload, concatenate artifact lists, recompute the cost total.
    pub fn mark_phase_completed(&mut self, name: &str, output: PhaseOutput) {
        if let Some(phase) = self.phase_mut(name) {
            phase.status = PhaseStatus::Completed;
            phase.completed_at = Some(Utc::now());
            phase.cost_usd = output.cost_usd;
            phase.result = Some(output.data.clone());
        }
        self.outputs.insert(name.to_string(), output.data);
        self.artifacts.extend(output.artifacts);
        self.recompute_total_cost();
    }

    pub fn mark_phase_failed(&mut self, name: &str, error: String) {
        if let Some(phase) = self.phase_mut(name) {
            phase.status = PhaseStatus::Failed;
            phase.completed_at = Some(Utc::now());
            phase.error = Some(error.clone());
        }
        self.errors.push(PhaseFailure {
            phase: name.to_string(),
            message: error,
            timestamp: Utc::now(),
        });
    }

    /// total_cost_usd is always the sum over Completed phases.
    fn recompute_total_cost(&mut self) {
        self.total_cost_usd = self
            .phases
            .iter()
            .filter(|p| p.status == PhaseStatus::Completed)
            .map(|p| p.cost_usd)
            .sum();
    }

    pub fn completed_count(&self) -> usize {
        self.phases
            .iter()
            .filter(|p| p.status == PhaseStatus::Completed)
            .count()
    }

    pub fn terminated_count(&self) -> usize {
        self.phases.iter().filter(|p| p.status.is_terminal()).count()
    }

    pub fn all_phases_terminated(&self) -> bool {
        self.terminated_count() == self.phases.len()
    }

    pub fn running_phase_names(&self) -> Vec<String> {
        self.phases
            .iter()
            .filter(|p| p.status == PhaseStatus::Running)
            .map(|p| p.name.clone())
            .collect()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled
        )
    }

    /// Merged final payload for the terminal event and status queries.
    pub fn build_result(&self) -> serde_json::Value {
        let execution_seconds = match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => (end - start).num_milliseconds() as f64 / 1000.0,
            _ => 0.0,
        };
        serde_json::json!({
            "workflow_type": self.config.workflow_type.as_str(),
            "topic": self.config.topic,
            "platforms": self.config.platforms,
            "phases_completed": self.completed_count(),
            "total_phases": self.phases.len(),
            "total_cost": self.total_cost_usd,
            "execution_time_seconds": execution_seconds,
            "artifacts": self.artifacts,
            "outputs": self.outputs,
            "errors": self.errors,
        })
    }

    /// Point-in-time snapshot for status queries. Cheap to build, never
    /// blocks on in-flight phases.
    pub fn snapshot(&self) -> ExecutionStatus {
        ExecutionStatus {
            workflow_id: self.id.clone(),
            status: self.status,
            topic: self.config.topic.clone(),
            workflow_type: self.config.workflow_type,
            current_phases: self.running_phase_names(),
            phases_completed: self.completed_count(),
            total_phases: self.phases.len(),
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            total_cost: self.total_cost_usd,
            platforms: self.config.platforms.clone(),
            style: self.config.style.clone(),
            error: self.error.clone(),
        }
    }
}

/// Read-only execution snapshot returned by status queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionStatus {
    pub workflow_id: String,
    pub status: WorkflowStatus,
    pub topic: String,
    pub workflow_type: WorkflowType,
    pub current_phases: Vec<String>,
    pub phases_completed: usize,
    pub total_phases: usize,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_cost: f64,
    pub platforms: Vec<String>,
    pub style: String,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn execution() -> WorkflowExecution {
        let config = WorkflowConfig::new("AI trends", WorkflowType::QuickGenerate);
        WorkflowExecution::new("wf-1".to_string(), config, &["search", "generate_script"])
    }

    #[test]
    fn test_config_rejects_non_positive_budget() {
        let mut config = WorkflowConfig::new("topic", WorkflowType::FullPipeline);
        config.max_cost_usd = 0.0;
        assert!(config.validate().is_err());
        config.max_cost_usd = -1.0;
        assert!(config.validate().is_err());
        config.max_cost_usd = 0.01;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_total_cost_is_sum_of_completed_phases() {
        let mut execution = execution();
        execution.mark_phase_completed("search", PhaseOutput::new(serde_json::json!({}), 0.02));
        assert!((execution.total_cost_usd - 0.02).abs() < f64::EPSILON);

        execution.mark_phase_completed(
            "generate_script",
            PhaseOutput::new(serde_json::json!({}), 0.08),
        );
        let independent_sum: f64 = execution
            .phases
            .iter()
            .filter(|p| p.status == PhaseStatus::Completed)
            .map(|p| p.cost_usd)
            .sum();
        assert!((execution.total_cost_usd - independent_sum).abs() < f64::EPSILON);
        assert!((execution.total_cost_usd - 0.10).abs() < 1e-9);
    }

    #[test]
    fn test_failed_phase_does_not_count_toward_cost() {
        let mut execution = execution();
        execution.mark_phase_completed("search", PhaseOutput::new(serde_json::json!({}), 0.02));
        execution.mark_phase_failed("generate_script", "llm unavailable".to_string());
        assert!((execution.total_cost_usd - 0.02).abs() < f64::EPSILON);
        assert_eq!(execution.errors.len(), 1);
        assert_eq!(execution.errors[0].phase, "generate_script");
    }

    #[test]
    fn test_artifact_merge_concatenates_in_completion_order() {
        let mut execution = execution();
        let images = ArtifactSet {
            image_files: vec!["scene_1.png".to_string()],
            ..Default::default()
        };
        let voices = ArtifactSet {
            voice_files: vec!["narration.mp3".to_string()],
            notes: vec!["voice done".to_string()],
            ..Default::default()
        };
        execution.mark_phase_completed(
            "search",
            PhaseOutput::new(serde_json::json!({}), 0.0).with_artifacts(images),
        );
        execution.mark_phase_completed(
            "generate_script",
            PhaseOutput::new(serde_json::json!({}), 0.0).with_artifacts(voices),
        );
        assert_eq!(execution.artifacts.image_files, vec!["scene_1.png"]);
        assert_eq!(execution.artifacts.voice_files, vec!["narration.mp3"]);
        assert_eq!(execution.artifacts.notes, vec!["voice done"]);
    }

    #[test]
    fn test_snapshot_reflects_running_phases() {
        let mut execution = execution();
        execution.mark_phase_running("search");
        let snapshot = execution.snapshot();
        assert_eq!(snapshot.current_phases, vec!["search"]);
        assert_eq!(snapshot.phases_completed, 0);
        assert_eq!(snapshot.total_phases, 2);
    }
}
