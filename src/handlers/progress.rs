// src/handlers/progress.rs
//! WebSocket progress streaming.
//!
//! Two subscription topics: `/ws/workflows` streams every workflow's events
//! from the moment of connection; `/ws/workflows/:id` streams one workflow,
//! starting with its buffered history. Each connection registers one bus
//! sink scoped to its topic and unregisters it on disconnect, so many
//! observers can watch the same workflow mid-flight without interfering.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension, Path,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::events::bus::EventSink;
use crate::events::{ProgressEvent, SubscriberId};
use crate::AppState;

enum Topic {
    AllWorkflows(SubscriberId),
    Workflow(String, SubscriberId),
}

pub fn progress_routes() -> Router {
    Router::new()
        .route("/ws/workflows", get(all_workflows_handler))
        .route("/ws/workflows/:workflow_id", get(workflow_handler))
}

async fn all_workflows_handler(
    ws: WebSocketUpgrade,
    Extension(state): Extension<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| stream_events(socket, state, None))
}

async fn workflow_handler(
    ws: WebSocketUpgrade,
    Path(workflow_id): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| stream_events(socket, state, Some(workflow_id)))
}

async fn stream_events(stream: WebSocket, state: Arc<AppState>, workflow_id: Option<String>) {
    let (mut sender, mut receiver) = stream.split();

    // Bridge the bus to this connection: the sink pushes into an unbounded
    // channel, the select loop below pumps the channel into the socket. For
    // a single-workflow topic, subscribing replays buffered history into the
    // channel first, so the client sees history before live events.
    let (tx, mut rx) = mpsc::unbounded_channel::<ProgressEvent>();
    let sink: EventSink = Arc::new(move |event: &ProgressEvent| {
        tx.send(event.clone())
            .map_err(|_| "connection channel closed".to_string())
    });

    let topic = match workflow_id {
        Some(id) => {
            let subscriber = state.bus.subscribe(&id, sink).await;
            tracing::info!("🔌 Progress stream opened for workflow {}", id);
            Topic::Workflow(id, subscriber)
        }
        None => {
            let subscriber = state.bus.subscribe_global(sink).await;
            tracing::info!("🔌 Progress stream opened for all workflows");
            Topic::AllWorkflows(subscriber)
        }
    };

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                let payload = match serde_json::to_string(&event) {
                    Ok(payload) => payload,
                    Err(e) => {
                        tracing::warn!("Failed to serialize progress event: {}", e);
                        continue;
                    }
                };
                if sender.send(Message::Text(payload)).await.is_err() {
                    break;
                }
            }
            message = receiver.next() => {
                match message {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // clients only listen on this stream; ignore the rest
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    match topic {
        Topic::Workflow(id, subscriber) => {
            state.bus.unsubscribe(&id, subscriber).await;
            tracing::info!("🔌 Progress stream closed for workflow {}", id);
        }
        Topic::AllWorkflows(subscriber) => {
            state.bus.unsubscribe_global(subscriber).await;
            tracing::info!("🔌 Progress stream closed for all workflows");
        }
    }
}
