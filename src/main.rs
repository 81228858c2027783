use axum::{Extension, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use reel_pipeline::workflow::pipeline::simulated_handlers;
use reel_pipeline::{
    AppState, PhaseRegistry, ProgressBus, WorkflowEngine, WorkflowManager,
};

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize production-grade logging
    init_logging().expect("Failed to initialize logging");

    // Phase graphs are validated here, at startup; a bad graph must never
    // surface as a runtime failure for an end user.
    let registry = Arc::new(PhaseRegistry::new().expect("Built-in phase graphs failed validation"));

    let bus = Arc::new(ProgressBus::new());
    let engine = Arc::new(WorkflowEngine::new(
        registry.clone(),
        bus.clone(),
        simulated_handlers(),
    ));
    let manager = Arc::new(WorkflowManager::new(engine.clone()));

    // Create the shared state
    let shared_state = Arc::new(AppState {
        bus,
        engine,
        manager,
    });

    // Supervisor sweep: surface crashed background execution tasks instead
    // of letting them vanish silently
    {
        let supervisor_state = shared_state.clone();
        tokio::spawn(async move {
            loop {
                let crashes = supervisor_state.manager.reap_finished().await;
                for crash in crashes {
                    tracing::error!(
                        "💥 Background execution task for workflow {} crashed: {}",
                        crash.workflow_id,
                        crash.error
                    );
                }
                tokio::time::sleep(tokio::time::Duration::from_secs(30)).await;
            }
        });
    }

    // Build our application with all routes and shared state
    let app = Router::new()
        .merge(reel_pipeline::handlers::workflows::workflow_routes())
        .merge(reel_pipeline::handlers::progress::progress_routes())
        .route("/api/status", axum::routing::get(api_status))
        .layer(axum::middleware::from_fn(
            reel_pipeline::middleware::logging::request_logging_middleware,
        ))
        .layer(CorsLayer::permissive())
        .layer(Extension(shared_state.clone()));

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .expect("Failed to bind server port");
    tracing::info!("listening on {}", listener.local_addr().unwrap());
    axum::serve(listener, app).await.expect("Server error");
}

// API Status endpoint
async fn api_status(
    Extension(state): Extension<Arc<AppState>>,
) -> axum::response::Json<serde_json::Value> {
    use serde_json::json;

    let listing = state.manager.list().await;
    let watched = state.bus.subscribed_workflows().await;

    axum::response::Json(json!({
        "status": "operational",
        "version": env!("CARGO_PKG_VERSION"),
        "workflows": {
            "active": listing.total_active,
            "completed": listing.total_completed,
            "supervised_tasks": state.manager.supervised_count().await,
        },
        "subscriptions": {
            "watched_workflows": watched.len(),
        },
        "endpoints": {
            "status": "/api/status",
            "workflows": "/api/workflows",
            "progress_stream": "/ws/workflows",
            "workflow_stream": "/ws/workflows/{workflow_id}",
        }
    }))
}

// Production-grade logging configuration
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, fmt, Layer};

    // Get log level from environment or default to INFO for production
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            "debug,reel_pipeline=trace,hyper=info,tower=info".to_string()
        } else {
            "info,reel_pipeline=info,hyper=warn,tower=warn".to_string()
        }
    });

    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log_level))?;

    // JSON logging for production (easier for log aggregation)
    let fmt_layer = if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("🎬 Reel Pipeline starting up...");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Build mode: {}",
        if cfg!(debug_assertions) {
            "development"
        } else {
            "production"
        }
    );
    tracing::info!("Log level: {}", log_level);

    Ok(())
}
