use crate::AppState;
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    symbol: String,
    resolution: &'static str,
    /// Connected chart clients.
    chart_clients: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let settings = state.pipeline.settings.borrow();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        symbol: settings.symbol.clone(),
        resolution: settings.resolution.label,
        chart_clients: state.publisher.receiver_count(),
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/health", get(health))
}
