// src/events/bus.rs
//! In-process progress event bus.
//!
//! Decouples the workflow engine (producer) from observers (WebSocket
//! connections, logs). Keeps a bounded per-workflow event history so late
//! subscribers can catch up, and isolates subscriber failures so one broken
//! sink never starves the rest.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::ProgressEvent;

/// Max buffered events per workflow. Oldest evicted first.
const MAX_HISTORY_PER_WORKFLOW: usize = 100;

/// Number of buffered events replayed to a new workflow-scoped subscriber.
const REPLAY_ON_SUBSCRIBE: usize = 10;

/// Handle returned by subscribe, used to unsubscribe.
pub type SubscriberId = u64;

/// Subscriber callback. A sink returning Err is logged and skipped for that
/// event; it keeps receiving subsequent events until unsubscribed.
pub type EventSink = Arc<dyn Fn(&ProgressEvent) -> Result<(), String> + Send + Sync>;

pub struct ProgressBus {
    /// workflow_id -> subscribers for that workflow
    subscribers: RwLock<HashMap<String, Vec<(SubscriberId, EventSink)>>>,
    /// subscribers that receive events for all workflows (no replay)
    global_subscribers: RwLock<Vec<(SubscriberId, EventSink)>>,
    /// workflow_id -> bounded event history
    history: RwLock<HashMap<String, VecDeque<ProgressEvent>>>,
    next_id: AtomicU64,
}

pub type SharedProgressBus = Arc<ProgressBus>;

impl ProgressBus {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            global_subscribers: RwLock::new(Vec::new()),
            history: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Subscribe to progress updates for a specific workflow.
    /// The last 10 buffered events are replayed to the new sink immediately.
    pub async fn subscribe(&self, workflow_id: &str, sink: EventSink) -> SubscriberId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        {
            let mut subscribers = self.subscribers.write().await;
            subscribers
                .entry(workflow_id.to_string())
                .or_default()
                .push((id, sink.clone()));
        }

        // Replay recent history so a mid-flight observer catches up
        let replay: Vec<ProgressEvent> = {
            let history = self.history.read().await;
            history
                .get(workflow_id)
                .map(|events| {
                    events
                        .iter()
                        .rev()
                        .take(REPLAY_ON_SUBSCRIBE)
                        .cloned()
                        .collect::<Vec<_>>()
                        .into_iter()
                        .rev()
                        .collect()
                })
                .unwrap_or_default()
        };

        for event in &replay {
            Self::deliver(&sink, event);
        }

        tracing::debug!(
            "📡 Subscriber {} registered for workflow {} ({} events replayed)",
            id,
            workflow_id,
            replay.len()
        );

        id
    }

    /// Subscribe to progress updates for all workflows. No history replay:
    /// global subscribers only see events from this moment forward.
    pub async fn subscribe_global(&self, sink: EventSink) -> SubscriberId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.global_subscribers.write().await.push((id, sink));
        tracing::debug!("📡 Global subscriber {} registered", id);
        id
    }

    /// Remove a workflow-scoped subscriber. Unknown ids are a no-op.
    pub async fn unsubscribe(&self, workflow_id: &str, subscriber_id: SubscriberId) {
        let mut subscribers = self.subscribers.write().await;
        if let Some(sinks) = subscribers.get_mut(workflow_id) {
            sinks.retain(|(id, _)| *id != subscriber_id);
            if sinks.is_empty() {
                subscribers.remove(workflow_id);
            }
        }
    }

    /// Remove a global subscriber. Unknown ids are a no-op.
    pub async fn unsubscribe_global(&self, subscriber_id: SubscriberId) {
        self.global_subscribers
            .write()
            .await
            .retain(|(id, _)| *id != subscriber_id);
    }

    /// Publish an event: buffer it, then fan out to every workflow-scoped
    /// and global subscriber. A failing sink is logged and skipped; it never
    /// prevents delivery to the others or crashes the publisher.
    pub async fn publish(&self, event: ProgressEvent) {
        {
            let mut history = self.history.write().await;
            let buffer = history.entry(event.workflow_id.clone()).or_default();
            buffer.push_back(event.clone());
            while buffer.len() > MAX_HISTORY_PER_WORKFLOW {
                buffer.pop_front();
            }
        }

        // Clone sinks out of the tables so no lock is held while callbacks run
        let mut sinks: Vec<EventSink> = Vec::new();
        {
            let subscribers = self.subscribers.read().await;
            if let Some(scoped) = subscribers.get(&event.workflow_id) {
                sinks.extend(scoped.iter().map(|(_, sink)| sink.clone()));
            }
        }
        {
            let global = self.global_subscribers.read().await;
            sinks.extend(global.iter().map(|(_, sink)| sink.clone()));
        }

        for sink in &sinks {
            Self::deliver(sink, &event);
        }

        tracing::debug!(
            "Event: {:?} for workflow {} ({} subscribers)",
            event.kind,
            event.workflow_id,
            sinks.len()
        );
    }

    /// Most recent `limit` buffered events in chronological order.
    /// Unknown workflows yield an empty list, not an error.
    pub async fn history_of(&self, workflow_id: &str, limit: usize) -> Vec<ProgressEvent> {
        let history = self.history.read().await;
        history
            .get(workflow_id)
            .map(|events| {
                let skip = events.len().saturating_sub(limit);
                events.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default()
    }

    /// Workflow ids that currently have at least one subscriber.
    pub async fn subscribed_workflows(&self) -> Vec<String> {
        self.subscribers.read().await.keys().cloned().collect()
    }

    fn deliver(sink: &EventSink, event: &ProgressEvent) {
        if let Err(e) = sink(event) {
            tracing::warn!(
                "Progress sink error for workflow {} ({:?}): {}",
                event.workflow_id,
                event.kind,
                e
            );
        }
    }
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new()
    }
}
