//! Real-time bar feed over WebSocket.

use crate::services::pipeline::PipelineCommand;
use crate::types::{FeedRequest, InboundEvent};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Decode a feed frame into bar events.
///
/// A frame may hold one event or an array of them. Control frames and
/// anything without prices are skipped.
pub fn parse_frame(text: &str) -> Vec<InboundEvent> {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            debug!("Unparseable feed frame: {}", e);
            return Vec::new();
        }
    };

    let items = match value {
        Value::Array(items) => items,
        other => vec![other],
    };

    items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<InboundEvent>(item).ok())
        .filter(|event| event.close.is_some() || event.open.is_some())
        .collect()
}

/// Streams the subscribed instrument into the pipeline task.
pub struct FeedClient {
    url: String,
    subscription: watch::Receiver<FeedRequest>,
    commands: mpsc::Sender<PipelineCommand>,
}

impl FeedClient {
    pub fn new(
        url: impl Into<String>,
        subscription: watch::Receiver<FeedRequest>,
        commands: mpsc::Sender<PipelineCommand>,
    ) -> Self {
        Self {
            url: url.into(),
            subscription,
            commands,
        }
    }

    /// Connect and keep reconnecting until the pipeline goes away.
    pub async fn connect(mut self) -> anyhow::Result<()> {
        loop {
            match self.run_connection().await {
                Ok(()) => warn!("Feed WebSocket disconnected, reconnecting..."),
                Err(e) => error!("Feed WebSocket error: {}, reconnecting...", e),
            }
            if self.commands.is_closed() {
                info!("Pipeline closed, stopping feed");
                return Ok(());
            }
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    }

    async fn run_connection(&mut self) -> anyhow::Result<()> {
        info!("Connecting to feed {}", self.url);
        let (ws_stream, _) = connect_async(self.url.as_str()).await?;
        let (mut write, mut read) = ws_stream.split();

        let request = self.subscription.borrow_and_update().clone();
        write.send(Message::Text(serde_json::to_string(&request)?)).await?;
        info!("Subscribed to feed: {:?}", request);

        let subscription = &mut self.subscription;
        let commands = &self.commands;

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            for event in parse_frame(&text) {
                                if commands.send(PipelineCommand::Event(event)).await.is_err() {
                                    return Ok(());
                                }
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = write.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(_))) => {
                            info!("Feed WebSocket closed");
                            break;
                        }
                        Some(Err(e)) => {
                            error!("Feed WebSocket read error: {}", e);
                            break;
                        }
                        None => break,
                        _ => {}
                    }
                }
                changed = subscription.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                    let request = subscription.borrow_and_update().clone();
                    info!("Resubscribing feed: {:?}", request);
                    write.send(Message::Text(serde_json::to_string(&request)?)).await?;
                }
                _ = tokio::time::sleep(PING_INTERVAL) => {
                    let _ = write.send(Message::Ping(vec![])).await;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_event() {
        let events = parse_frame(
            r#"{"symbol":"MNQ","resolution":"1","timestamp":1755623700000,"open":1,"high":2,"low":0.5,"close":1.5}"#,
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].symbol.as_deref(), Some("MNQ"));
    }

    #[test]
    fn test_parse_batch_skips_control_frames() {
        let events = parse_frame(
            r#"[{"type":"subscribed"},{"t":1755623700,"open":1,"high":1,"low":1,"close":1},"noise"]"#,
        );
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_parse_garbage() {
        assert!(parse_frame("not json").is_empty());
        assert!(parse_frame(r#"{"type":"heartbeat"}"#).is_empty());
    }

    #[tokio::test]
    async fn test_connect_stops_when_pipeline_is_gone() {
        let (_sub_tx, sub_rx) = watch::channel(FeedRequest::Subscribe {
            symbol: "MNQ".into(),
            resolution: "1".into(),
        });
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        // Nothing listens here; the failed connect is followed by the closed check
        let client = FeedClient::new("ws://127.0.0.1:9/feed", sub_rx, tx);
        let result = tokio::time::timeout(Duration::from_secs(10), client.connect()).await;
        assert!(matches!(result, Ok(Ok(()))));
    }
}
