//! Barline - real-time bar pipeline with derived charts, overlays and breakout signals

pub mod api;
pub mod config;
pub mod error;
pub mod services;
pub mod sources;
pub mod types;
pub mod websocket;

use config::Config;
use services::{ChartPublisher, RunnerHandle};
use std::sync::Arc;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pipeline: RunnerHandle,
    pub publisher: ChartPublisher,
}

// Re-export commonly used types
pub use error::{AppError, Result};
pub use types::*;
