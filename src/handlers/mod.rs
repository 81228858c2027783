// src/handlers/mod.rs
pub mod progress; // 📡 WebSocket progress streaming
pub mod workflows; // Workflow trigger/status/list/cancel endpoints
