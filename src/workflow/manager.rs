// src/workflow/manager.rs
//! External-facing workflow operations: trigger, status, list, cancel.
//!
//! A thin facade over the engine. The one piece of state it owns is the
//! supervisor table of spawned execution tasks, so a crashed background
//! scheduler is observable instead of silently vanishing.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::error::EngineError;
use crate::workflow::engine::{SharedWorkflowEngine, WorkflowList};
use crate::workflow::types::{ExecutionStatus, WorkflowConfig, WorkflowType};

/// A background execution task that did not exit cleanly.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TaskCrash {
    pub workflow_id: String,
    pub error: String,
}

pub struct WorkflowManager {
    engine: SharedWorkflowEngine,
    tasks: RwLock<HashMap<String, JoinHandle<()>>>,
}

pub type SharedWorkflowManager = Arc<WorkflowManager>;

impl WorkflowManager {
    pub fn new(engine: SharedWorkflowEngine) -> Self {
        Self {
            engine,
            tasks: RwLock::new(HashMap::new()),
        }
    }

    /// Create a workflow and start executing it in the background. Returns
    /// the execution id immediately; progress flows through the event bus.
    pub async fn trigger(
        &self,
        topic: &str,
        workflow_type: &str,
        platforms: Vec<String>,
        style: Option<String>,
    ) -> Result<String, EngineError> {
        let workflow_type = WorkflowType::parse(workflow_type)?;
        let mut config = WorkflowConfig::new(topic, workflow_type).with_platforms(platforms);
        if let Some(style) = style {
            config = config.with_style(style);
        }
        self.trigger_with_config(config).await
    }

    pub async fn trigger_with_config(&self, config: WorkflowConfig) -> Result<String, EngineError> {
        let workflow_id = self.engine.create(config).await?;

        let engine = self.engine.clone();
        let task_id = workflow_id.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = engine.execute(&task_id).await {
                tracing::error!("Workflow {} execution error: {}", task_id, e);
            }
        });
        self.tasks.write().await.insert(workflow_id.clone(), handle);

        tracing::info!("🚀 Triggered workflow {}", workflow_id);
        Ok(workflow_id)
    }

    pub async fn status_of(&self, workflow_id: &str) -> Option<ExecutionStatus> {
        self.engine.status_of(workflow_id).await
    }

    pub async fn list(&self) -> WorkflowList {
        self.engine.list().await
    }

    pub async fn cancel(&self, workflow_id: &str) -> bool {
        self.engine.cancel(workflow_id).await
    }

    /// Sweep finished execution tasks out of the supervisor table and report
    /// any that crashed (panicked or were aborted) instead of exiting
    /// cleanly.
    pub async fn reap_finished(&self) -> Vec<TaskCrash> {
        let finished: Vec<String> = {
            let tasks = self.tasks.read().await;
            tasks
                .iter()
                .filter(|(_, handle)| handle.is_finished())
                .map(|(id, _)| id.clone())
                .collect()
        };

        let mut crashes = Vec::new();
        for workflow_id in finished {
            let handle = self.tasks.write().await.remove(&workflow_id);
            if let Some(handle) = handle {
                if let Err(e) = handle.await {
                    tracing::error!("Workflow task {} crashed: {}", workflow_id, e);
                    crashes.push(TaskCrash {
                        workflow_id,
                        error: e.to_string(),
                    });
                }
            }
        }
        crashes
    }

    /// Number of execution tasks still tracked by the supervisor.
    pub async fn supervised_count(&self) -> usize {
        self.tasks.read().await.len()
    }
}
