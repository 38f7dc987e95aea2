use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::PipelineSettings;
use crate::error::{AppError, Result};
use crate::services::pipeline::PipelineCommand;
use crate::types::{ChartUpdate, ClientMessage, Resolution};
use crate::AppState;

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let client_id = Uuid::new_v4();
    info!("Chart client connected: {}", client_id);

    // Direct replies and broadcast updates share one outgoing queue
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    let mut updates = state.publisher.subscribe();
    let broadcast_tx = tx.clone();
    let broadcast_task = tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(update) => {
                    if let Ok(json) = serde_json::to_string(&update) {
                        if broadcast_tx.send(json).is_err() {
                            break;
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Chart client {} lagged, skipped {} updates", client_id, skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                debug!("Received message from {}: {}", client_id, text);
                if let Err(e) = handle_message(&state, &text).await {
                    send_error(&tx, &e.to_string());
                }
            }
            Ok(Message::Close(_)) => {
                info!("Chart client disconnecting: {}", client_id);
                break;
            }
            Err(e) => {
                error!("WebSocket error for {}: {}", client_id, e);
                break;
            }
            _ => {}
        }
    }

    send_task.abort();
    broadcast_task.abort();
    info!("Chart client disconnected: {}", client_id);
}

async fn handle_message(state: &AppState, text: &str) -> Result<()> {
    let msg: ClientMessage = serde_json::from_str(text)
        .map_err(|e| AppError::BadRequest(format!("Invalid message: {}", e)))?;

    let settings = {
        let current = state.pipeline.settings.borrow();
        requested_settings(&current, msg)?
    };

    state
        .pipeline
        .commands
        .send(PipelineCommand::Switch(settings))
        .await
        .map_err(|_| AppError::Internal("Pipeline task is not running".to_string()))
}

/// Settings a client message asks the pipeline to switch to.
fn requested_settings(current: &PipelineSettings, msg: ClientMessage) -> Result<PipelineSettings> {
    match msg {
        ClientMessage::SwitchResolution { resolution } => {
            let resolution = Resolution::parse(&resolution)?;
            Ok(current.with_resolution(resolution))
        }
        ClientMessage::SetChartType { chart_type } => Ok(current.with_chart_type(chart_type)),
    }
}

fn send_error(tx: &mpsc::UnboundedSender<String>, error: &str) {
    let msg = ChartUpdate::Error {
        error: error.to_string(),
    };
    if let Ok(json) = serde_json::to_string(&msg) {
        let _ = tx.send(json);
    }
}
