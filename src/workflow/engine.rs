// src/workflow/engine.rs
//! The workflow engine: drives one execution from Pending to a terminal
//! status by walking its phase graph in topological order with maximum
//! parallelism.
//!
//! Scheduling loop: find every Pending phase whose dependencies have all
//! terminated, dispatch them concurrently, wait for at least one to finish,
//! re-evaluate. All merges into the execution aggregate happen in this loop
//! (single-writer discipline); phase tasks report back over a channel and
//! never touch the execution directly.

use futures::FutureExt;
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::EngineError;
use crate::events::{ProgressEvent, SharedProgressBus};
use crate::workflow::handler::{PhaseContext, PhaseHandlers};
use crate::workflow::registry::PhaseRegistry;
use crate::workflow::types::{
    ExecutionStatus, PhaseOutput, PhaseStatus, WorkflowConfig, WorkflowExecution, WorkflowStatus,
};

/// Completed executions kept in memory for status/listing.
const HISTORY_LIMIT: usize = 10;

#[derive(Clone)]
struct ActiveExecution {
    execution: Arc<RwLock<WorkflowExecution>>,
    cancel: CancellationToken,
}

/// Active and recently-completed workflow listing.
#[derive(Debug, Clone, serde::Serialize)]
pub struct WorkflowList {
    pub active_workflows: Vec<ExecutionStatus>,
    pub recent_completed: Vec<ExecutionStatus>,
    pub total_active: usize,
    pub total_completed: usize,
}

pub struct WorkflowEngine {
    registry: Arc<PhaseRegistry>,
    bus: SharedProgressBus,
    handlers: PhaseHandlers,
    active: RwLock<HashMap<String, ActiveExecution>>,
    history: RwLock<VecDeque<WorkflowExecution>>,
    completed_total: RwLock<usize>,
}

pub type SharedWorkflowEngine = Arc<WorkflowEngine>;

impl WorkflowEngine {
    pub fn new(
        registry: Arc<PhaseRegistry>,
        bus: SharedProgressBus,
        handlers: PhaseHandlers,
    ) -> Self {
        Self {
            registry,
            bus,
            handlers,
            active: RwLock::new(HashMap::new()),
            history: RwLock::new(VecDeque::new()),
            completed_total: RwLock::new(0),
        }
    }

    /// Allocate an execution with every phase Pending per the registry graph.
    /// Fails only on configuration problems, never on anything transient.
    pub async fn create(&self, config: WorkflowConfig) -> Result<String, EngineError> {
        config.validate()?;
        let phase_names = self.registry.phase_names(config.workflow_type);
        let workflow_id = Uuid::new_v4().to_string();

        let execution = WorkflowExecution::new(workflow_id.clone(), config, &phase_names);
        self.active.write().await.insert(
            workflow_id.clone(),
            ActiveExecution {
                execution: Arc::new(RwLock::new(execution)),
                cancel: CancellationToken::new(),
            },
        );

        tracing::info!("🎬 Created workflow execution: {}", workflow_id);
        Ok(workflow_id)
    }

    /// Run an execution to a terminal status. Long-running; callers that
    /// need fire-and-forget semantics spawn this on the runtime.
    pub async fn execute(&self, workflow_id: &str) -> Result<ExecutionStatus, EngineError> {
        let entry = self
            .active
            .read()
            .await
            .get(workflow_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(workflow_id.to_string()))?;

        let config = {
            let mut execution = entry.execution.write().await;
            if execution.status != WorkflowStatus::Pending {
                return Err(EngineError::configuration(format!(
                    "Workflow {} already started",
                    workflow_id
                )));
            }
            execution.status = WorkflowStatus::Starting;
            execution.started_at = Some(chrono::Utc::now());
            execution.config.clone()
        };

        self.bus
            .publish(ProgressEvent::workflow_started(
                workflow_id,
                serde_json::json!({
                    "topic": config.topic,
                    "workflow_type": config.workflow_type.as_str(),
                    "platforms": config.platforms,
                    "style": config.style,
                }),
                &config.topic,
            ))
            .await;

        entry.execution.write().await.status = WorkflowStatus::Running;

        self.run_scheduler(workflow_id, &entry, &config).await;
        let snapshot = self.finalize(workflow_id, &entry).await;

        Ok(snapshot)
    }

    async fn run_scheduler(
        &self,
        workflow_id: &str,
        entry: &ActiveExecution,
        config: &WorkflowConfig,
    ) {
        let specs = self.registry.phases_for(config.workflow_type);
        let total_phases = specs.len();
        let deadline = std::time::Duration::from_secs(config.timeout_minutes * 60);

        let (tx, mut rx) = mpsc::unbounded_channel::<(String, Result<PhaseOutput, String>)>();
        let mut in_flight = 0usize;
        let mut dispatch_index = 0usize;

        loop {
            // Cancellation is cooperative: no new dispatch, but phases
            // already running drain to completion below.
            if !entry.cancel.is_cancelled() {
                let eligible: Vec<&str> = {
                    let execution = entry.execution.read().await;
                    specs
                        .iter()
                        .filter(|spec| {
                            execution
                                .phase(spec.name)
                                .map(|p| p.status == PhaseStatus::Pending)
                                .unwrap_or(false)
                                && spec.depends_on.iter().all(|dep| {
                                    execution
                                        .phase(dep)
                                        .map(|p| p.status.is_terminal())
                                        .unwrap_or(false)
                                })
                        })
                        .map(|spec| spec.name)
                        .collect()
                };

                for name in eligible {
                    entry.execution.write().await.mark_phase_running(name);
                    self.bus
                        .publish(ProgressEvent::phase_started(
                            workflow_id,
                            name,
                            dispatch_index,
                            total_phases,
                        ))
                        .await;
                    dispatch_index += 1;

                    let ctx = {
                        let execution = entry.execution.read().await;
                        PhaseContext {
                            workflow_id: workflow_id.to_string(),
                            phase_name: name.to_string(),
                            config: execution.config.clone(),
                            outputs: execution.outputs.clone(),
                            artifacts: execution.artifacts.clone(),
                        }
                    };
                    let handler = self.handlers.get(name);
                    let task_tx = tx.clone();
                    let phase_name = name.to_string();
                    let timeout_minutes = config.timeout_minutes;

                    tokio::spawn(async move {
                        let result = match handler {
                            Some(handler) => {
                                let outcome =
                                    AssertUnwindSafe(timeout(deadline, handler.execute(&ctx)))
                                        .catch_unwind()
                                        .await;
                                match outcome {
                                    Ok(Ok(Ok(output))) => Ok(output),
                                    Ok(Ok(Err(e))) => Err(e),
                                    Ok(Err(_elapsed)) => Err(format!(
                                        "Phase '{}' timed out after {} minutes",
                                        phase_name, timeout_minutes
                                    )),
                                    Err(_panic) => {
                                        Err(format!("Phase '{}' panicked", phase_name))
                                    }
                                }
                            }
                            None => Err(format!(
                                "No handler registered for phase '{}'",
                                phase_name
                            )),
                        };
                        let _ = task_tx.send((phase_name, result));
                    });
                    in_flight += 1;
                }
            }

            if in_flight == 0 {
                break;
            }

            let Some((name, result)) = rx.recv().await else {
                break;
            };
            in_flight -= 1;
            self.merge_phase_result(workflow_id, entry, &name, result, total_phases)
                .await;
        }
    }

    /// Fold one phase outcome into the aggregate and emit the matching
    /// events. Only ever called from the scheduler loop.
    async fn merge_phase_result(
        &self,
        workflow_id: &str,
        entry: &ActiveExecution,
        phase_name: &str,
        result: Result<PhaseOutput, String>,
        total_phases: usize,
    ) {
        match result {
            Ok(output) => {
                let cost = output.cost_usd;
                let data = output.data.clone();
                let (terminated, total_cost) = {
                    let mut execution = entry.execution.write().await;
                    execution.mark_phase_completed(phase_name, output);
                    (execution.terminated_count(), execution.total_cost_usd)
                };
                self.bus
                    .publish(ProgressEvent::phase_completed(
                        workflow_id,
                        phase_name,
                        terminated,
                        total_phases,
                        cost,
                        data,
                    ))
                    .await;
                self.bus
                    .publish(ProgressEvent::cost_update(workflow_id, cost, total_cost))
                    .await;
            }
            Err(error) => {
                tracing::error!(
                    "❌ Phase '{}' failed in workflow {}: {}",
                    phase_name,
                    workflow_id,
                    error
                );
                entry
                    .execution
                    .write()
                    .await
                    .mark_phase_failed(phase_name, error.clone());
                self.bus
                    .publish(ProgressEvent::phase_failed(workflow_id, phase_name, &error))
                    .await;
            }
        }
    }

    /// Settle the terminal status, emit the terminal event, and move the
    /// execution into the read-only history store.
    async fn finalize(&self, workflow_id: &str, entry: &ActiveExecution) -> ExecutionStatus {
        let (snapshot, terminal_event) = {
            let mut execution = entry.execution.write().await;
            execution.completed_at = Some(chrono::Utc::now());

            let event = if entry.cancel.is_cancelled() {
                execution.status = WorkflowStatus::Cancelled;
                ProgressEvent::workflow_cancelled(workflow_id)
            } else if !execution.all_phases_terminated() {
                // A validated DAG always drains; reaching this means the
                // scheduler itself went wrong. Observable, not silent.
                execution.status = WorkflowStatus::Failed;
                execution.error = Some("Scheduler stalled before all phases terminated".to_string());
                ProgressEvent::workflow_failed(
                    workflow_id,
                    execution.error.as_deref().unwrap_or_default(),
                    serde_json::json!({ "errors": execution.errors }),
                )
            } else if execution.completed_count() == 0 {
                let summary = execution
                    .errors
                    .iter()
                    .map(|e| format!("{}: {}", e.phase, e.message))
                    .collect::<Vec<_>>()
                    .join("; ");
                execution.status = WorkflowStatus::Failed;
                execution.error = Some(summary.clone());
                execution.result = Some(execution.build_result());
                ProgressEvent::workflow_failed(
                    workflow_id,
                    &summary,
                    serde_json::json!({ "errors": execution.errors }),
                )
            } else {
                // Best-effort pipeline: individual phase failures ride along
                // in the result rather than failing the whole run.
                execution.status = WorkflowStatus::Completed;
                let result = execution.build_result();
                execution.result = Some(result.clone());
                ProgressEvent::workflow_completed(workflow_id, result)
            };
            (execution.snapshot(), event)
        };

        self.bus.publish(terminal_event).await;

        // Terminal executions move to the read-only history store.
        let finished = {
            let mut active = self.active.write().await;
            active.remove(workflow_id)
        };
        if let Some(finished) = finished {
            let execution = finished.execution.read().await.clone();
            let mut history = self.history.write().await;
            history.push_back(execution);
            while history.len() > HISTORY_LIMIT {
                history.pop_front();
            }
            *self.completed_total.write().await += 1;
        }

        tracing::info!(
            "🏁 Workflow {} finished: {:?} (cost ${:.3})",
            workflow_id,
            snapshot.status,
            snapshot.total_cost
        );
        snapshot
    }

    /// Request cancellation. Returns false unless the execution is currently
    /// Starting or Running and not already cancelled. Running phases finish;
    /// nothing new is scheduled.
    pub async fn cancel(&self, workflow_id: &str) -> bool {
        let entry = match self.active.read().await.get(workflow_id).cloned() {
            Some(entry) => entry,
            None => return false,
        };
        if entry.cancel.is_cancelled() {
            return false;
        }
        let status = entry.execution.read().await.status;
        if !matches!(status, WorkflowStatus::Starting | WorkflowStatus::Running) {
            return false;
        }
        entry.cancel.cancel();
        tracing::info!("🛑 Cancellation requested for workflow {}", workflow_id);
        true
    }

    /// Point-in-time status. Never blocks on in-flight phases.
    pub async fn status_of(&self, workflow_id: &str) -> Option<ExecutionStatus> {
        if let Some(entry) = self.active.read().await.get(workflow_id).cloned() {
            return Some(entry.execution.read().await.snapshot());
        }
        self.history
            .read()
            .await
            .iter()
            .find(|e| e.id == workflow_id)
            .map(|e| e.snapshot())
    }

    /// Full execution record (active or historical). Used by tests and the
    /// API layer for detail views.
    pub async fn execution_of(&self, workflow_id: &str) -> Option<WorkflowExecution> {
        if let Some(entry) = self.active.read().await.get(workflow_id).cloned() {
            return Some(entry.execution.read().await.clone());
        }
        self.history
            .read()
            .await
            .iter()
            .find(|e| e.id == workflow_id)
            .cloned()
    }

    pub async fn list(&self) -> WorkflowList {
        let active: Vec<ExecutionStatus> = {
            let entries = self.active.read().await;
            let mut snapshots = Vec::with_capacity(entries.len());
            for entry in entries.values() {
                snapshots.push(entry.execution.read().await.snapshot());
            }
            snapshots
        };
        let recent_completed: Vec<ExecutionStatus> = self
            .history
            .read()
            .await
            .iter()
            .map(|e| e.snapshot())
            .collect();
        let total_completed = *self.completed_total.read().await;

        WorkflowList {
            total_active: active.len(),
            total_completed,
            active_workflows: active,
            recent_completed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::bus::EventSink;
    use crate::events::{EventKind, ProgressBus};
    use crate::workflow::handler::PhaseHandler;
    use crate::workflow::pipeline::simulated_handlers;
    use crate::workflow::types::{ArtifactSet, WorkflowType};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::time::{sleep, Duration};

    /// Appends one note artifact after a configurable delay.
    struct NotesPhase {
        delay_ms: u64,
        note: &'static str,
    }

    #[async_trait]
    impl PhaseHandler for NotesPhase {
        async fn execute(&self, _ctx: &PhaseContext) -> Result<PhaseOutput, String> {
            sleep(Duration::from_millis(self.delay_ms)).await;
            let artifacts = ArtifactSet {
                notes: vec![self.note.to_string()],
                ..Default::default()
            };
            Ok(PhaseOutput::new(serde_json::json!({ "note": self.note }), 0.03)
                .with_artifacts(artifacts))
        }
    }

    struct FailingPhase;

    #[async_trait]
    impl PhaseHandler for FailingPhase {
        async fn execute(&self, _ctx: &PhaseContext) -> Result<PhaseOutput, String> {
            sleep(Duration::from_millis(5)).await;
            Err("generation service unavailable".to_string())
        }
    }

    struct SleepyPhase {
        delay_ms: u64,
    }

    #[async_trait]
    impl PhaseHandler for SleepyPhase {
        async fn execute(&self, _ctx: &PhaseContext) -> Result<PhaseOutput, String> {
            sleep(Duration::from_millis(self.delay_ms)).await;
            Ok(PhaseOutput::new(serde_json::json!({}), 0.01))
        }
    }

    fn engine_with(handlers: PhaseHandlers) -> (Arc<WorkflowEngine>, Arc<ProgressBus>) {
        let registry = Arc::new(PhaseRegistry::new().unwrap());
        let bus = Arc::new(ProgressBus::new());
        let engine = Arc::new(WorkflowEngine::new(registry, bus.clone(), handlers));
        (engine, bus)
    }

    fn collector() -> (EventSink, Arc<Mutex<Vec<ProgressEvent>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let sink: EventSink = Arc::new(move |event: &ProgressEvent| {
            seen_clone.lock().unwrap().push(event.clone());
            Ok(())
        });
        (sink, seen)
    }

    fn count_kind(events: &[ProgressEvent], kind: EventKind) -> usize {
        events.iter().filter(|e| e.kind == kind).count()
    }

    #[tokio::test]
    async fn test_full_pipeline_runs_to_completion() {
        let (engine, bus) = engine_with(simulated_handlers());
        let config = WorkflowConfig::new("rust async runtimes", WorkflowType::FullPipeline);
        let workflow_id = engine.create(config).await.unwrap();

        let (sink, seen) = collector();
        bus.subscribe(&workflow_id, sink).await;

        let status = engine.execute(&workflow_id).await.unwrap();
        assert_eq!(status.status, WorkflowStatus::Completed);
        assert_eq!(status.phases_completed, 12);

        let execution = engine.execution_of(&workflow_id).await.unwrap();
        // cost invariant: the running total always equals an independent sum
        let independent: f64 = execution
            .phases
            .iter()
            .filter(|p| p.status == PhaseStatus::Completed)
            .map(|p| p.cost_usd)
            .sum();
        assert!((execution.total_cost_usd - independent).abs() < 1e-9);

        // parallel generation phases all contributed artifacts
        assert!(!execution.artifacts.image_files.is_empty());
        assert!(!execution.artifacts.voice_files.is_empty());
        assert!(!execution.artifacts.broll_files.is_empty());

        let events = seen.lock().unwrap();
        assert_eq!(events[0].kind, EventKind::WorkflowStarted);
        assert_eq!(events[events.len() - 1].kind, EventKind::WorkflowCompleted);
        assert_eq!(count_kind(&events, EventKind::PhaseStarted), 12);
        assert_eq!(count_kind(&events, EventKind::PhaseCompleted), 12);
        assert_eq!(count_kind(&events, EventKind::CostUpdate), 12);
    }

    #[tokio::test]
    async fn test_reducer_merge_is_order_independent() {
        // Same parallel pair, opposite completion orders: merged notes must
        // contain both contributions either way.
        let mut merged = Vec::new();
        for (prompt_delay, voice_delay) in [(5u64, 60u64), (60, 5)] {
            let handlers = simulated_handlers()
                .with(
                    "prompt_generation",
                    Arc::new(NotesPhase {
                        delay_ms: prompt_delay,
                        note: "prompt contribution",
                    }),
                )
                .with(
                    "voice_generation",
                    Arc::new(NotesPhase {
                        delay_ms: voice_delay,
                        note: "voice contribution",
                    }),
                );
            let (engine, _bus) = engine_with(handlers);
            let config = WorkflowConfig::new("merge order", WorkflowType::FullPipeline);
            let workflow_id = engine.create(config).await.unwrap();
            engine.execute(&workflow_id).await.unwrap();

            let execution = engine.execution_of(&workflow_id).await.unwrap();
            let mut notes = execution.artifacts.notes.clone();
            notes.sort();
            merged.push(notes);
        }
        assert_eq!(merged[0], merged[1]);
        assert_eq!(
            merged[0],
            vec!["prompt contribution".to_string(), "voice contribution".to_string()]
        );
    }

    #[tokio::test]
    async fn test_failed_phase_does_not_block_siblings_or_barrier() {
        let handlers = simulated_handlers().with("voice_generation", Arc::new(FailingPhase));
        let (engine, bus) = engine_with(handlers);
        let config = WorkflowConfig::new("partial failure", WorkflowType::FullPipeline);
        let workflow_id = engine.create(config).await.unwrap();

        let (sink, seen) = collector();
        bus.subscribe(&workflow_id, sink).await;

        let status = engine.execute(&workflow_id).await.unwrap();
        // best-effort: the rest of the pipeline still lands
        assert_eq!(status.status, WorkflowStatus::Completed);

        let execution = engine.execution_of(&workflow_id).await.unwrap();
        assert_eq!(
            execution.phase("voice_generation").unwrap().status,
            PhaseStatus::Failed
        );
        // the barrier proceeded on terminated (not succeeded) predecessors
        assert_eq!(
            execution.phase("asset_gathering").unwrap().status,
            PhaseStatus::Completed
        );
        assert_eq!(execution.phase("finalize").unwrap().status, PhaseStatus::Completed);
        assert_eq!(execution.errors.len(), 1);
        assert!(!execution.artifacts.image_files.is_empty());
        assert!(execution.artifacts.voice_files.is_empty());

        let events = seen.lock().unwrap();
        assert_eq!(count_kind(&events, EventKind::PhaseFailed), 1);
        assert_eq!(count_kind(&events, EventKind::WorkflowCompleted), 1);
    }

    #[tokio::test]
    async fn test_all_phases_failing_fails_the_workflow() {
        let handlers = PhaseHandlers::new()
            .with("search", Arc::new(FailingPhase))
            .with("generate_script", Arc::new(FailingPhase));
        let (engine, bus) = engine_with(handlers);
        let config = WorkflowConfig::new("doomed", WorkflowType::QuickGenerate);
        let workflow_id = engine.create(config).await.unwrap();

        let (sink, seen) = collector();
        bus.subscribe(&workflow_id, sink).await;

        let status = engine.execute(&workflow_id).await.unwrap();
        assert_eq!(status.status, WorkflowStatus::Failed);

        let execution = engine.execution_of(&workflow_id).await.unwrap();
        assert_eq!(execution.errors.len(), 2);

        // the terminal event carries every accumulated phase error
        let events = seen.lock().unwrap();
        let failed = events
            .iter()
            .find(|e| e.kind == EventKind::WorkflowFailed)
            .unwrap();
        assert_eq!(failed.data["errors"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_handler_fails_phase_not_scheduler() {
        // only search has a handler; generate_script must fail descriptively
        let handlers = PhaseHandlers::new().with("search", Arc::new(SleepyPhase { delay_ms: 5 }));
        let (engine, _bus) = engine_with(handlers);
        let config = WorkflowConfig::new("half wired", WorkflowType::QuickGenerate);
        let workflow_id = engine.create(config).await.unwrap();

        let status = engine.execute(&workflow_id).await.unwrap();
        assert_eq!(status.status, WorkflowStatus::Completed);

        let execution = engine.execution_of(&workflow_id).await.unwrap();
        let script = execution.phase("generate_script").unwrap();
        assert_eq!(script.status, PhaseStatus::Failed);
        assert!(script.error.as_deref().unwrap().contains("No handler registered"));
    }

    #[tokio::test]
    async fn test_cancel_stops_new_dispatch_and_fires_once() {
        let handlers = PhaseHandlers::new()
            .with("search", Arc::new(SleepyPhase { delay_ms: 150 }))
            .with("generate_script", Arc::new(SleepyPhase { delay_ms: 5 }));
        let (engine, bus) = engine_with(handlers);
        let config = WorkflowConfig::new("cancel me", WorkflowType::QuickGenerate);
        let workflow_id = engine.create(config).await.unwrap();

        let (sink, seen) = collector();
        bus.subscribe(&workflow_id, sink).await;

        let runner = {
            let engine = engine.clone();
            let workflow_id = workflow_id.clone();
            tokio::spawn(async move { engine.execute(&workflow_id).await })
        };

        // let the search phase get in flight, then cancel
        sleep(Duration::from_millis(40)).await;
        assert!(engine.cancel(&workflow_id).await);
        assert!(!engine.cancel(&workflow_id).await);

        let status = runner.await.unwrap().unwrap();
        assert_eq!(status.status, WorkflowStatus::Cancelled);

        let execution = engine.execution_of(&workflow_id).await.unwrap();
        // the in-flight phase was allowed to finish; nothing new started
        assert_eq!(execution.phase("search").unwrap().status, PhaseStatus::Completed);
        assert_eq!(
            execution.phase("generate_script").unwrap().status,
            PhaseStatus::Pending
        );

        let events = seen.lock().unwrap();
        assert_eq!(count_kind(&events, EventKind::WorkflowCancelled), 1);
        assert_eq!(count_kind(&events, EventKind::PhaseStarted), 1);

        // terminal executions cannot be cancelled again
        assert!(!engine.cancel(&workflow_id).await);
    }

    #[tokio::test]
    async fn test_cancel_unknown_or_pending_returns_false() {
        let (engine, _bus) = engine_with(simulated_handlers());
        assert!(!engine.cancel("no-such-id").await);

        let config = WorkflowConfig::new("never started", WorkflowType::QuickGenerate);
        let workflow_id = engine.create(config).await.unwrap();
        assert!(!engine.cancel(&workflow_id).await);
    }

    #[tokio::test]
    async fn test_phase_deadline_marks_timeout_failure() {
        let handlers = PhaseHandlers::new()
            .with("search", Arc::new(SleepyPhase { delay_ms: 50 }))
            .with("generate_script", Arc::new(SleepyPhase { delay_ms: 50 }));
        let (engine, _bus) = engine_with(handlers);
        let config = WorkflowConfig::new("too slow", WorkflowType::QuickGenerate)
            .with_timeout_minutes(0);
        let workflow_id = engine.create(config).await.unwrap();

        let status = engine.execute(&workflow_id).await.unwrap();
        assert_eq!(status.status, WorkflowStatus::Failed);

        let execution = engine.execution_of(&workflow_id).await.unwrap();
        for phase in &execution.phases {
            assert_eq!(phase.status, PhaseStatus::Failed);
            assert!(phase.error.as_deref().unwrap().contains("timed out"));
        }
    }

    #[tokio::test]
    async fn test_create_rejects_non_positive_budget() {
        let (engine, _bus) = engine_with(simulated_handlers());
        let mut config = WorkflowConfig::new("free lunch", WorkflowType::QuickGenerate);
        config.max_cost_usd = 0.0;
        assert!(matches!(
            engine.create(config).await,
            Err(EngineError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_status_survives_move_to_history() {
        let (engine, _bus) = engine_with(simulated_handlers());
        let config = WorkflowConfig::new("historical", WorkflowType::QuickGenerate);
        let workflow_id = engine.create(config).await.unwrap();
        engine.execute(&workflow_id).await.unwrap();

        let status = engine.status_of(&workflow_id).await.unwrap();
        assert_eq!(status.status, WorkflowStatus::Completed);
        assert!(engine.status_of("no-such-id").await.is_none());

        // executing a second time is a configuration error, not a rerun
        assert!(engine.execute(&workflow_id).await.is_err());
    }
}
