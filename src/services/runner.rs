//! The task that owns the pipeline.
//!
//! Feed events, backfill results, switches and status requests all arrive as
//! `PipelineCommand`s on one channel, so the pipeline is only ever touched
//! from here.

use crate::config::PipelineSettings;
use crate::services::pipeline::{Pipeline, PipelineCommand};
use crate::sources::HistoryClient;
use crate::types::FeedRequest;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// How often a coalesced redraw is checked for.
const FLUSH_INTERVAL: Duration = Duration::from_millis(250);
const COMMAND_BUFFER: usize = 4096;

/// Channels for talking to a running pipeline.
#[derive(Clone)]
pub struct RunnerHandle {
    pub commands: mpsc::Sender<PipelineCommand>,
    /// What the upstream feed should be subscribed to.
    pub subscription: watch::Receiver<FeedRequest>,
    /// Settings of the current pipeline state.
    pub settings: watch::Receiver<PipelineSettings>,
}

fn feed_request(settings: &PipelineSettings) -> FeedRequest {
    FeedRequest::Subscribe {
        symbol: settings.symbol.clone(),
        resolution: settings.resolution.label.to_string(),
    }
}

pub struct PipelineRunner {
    pipeline: Pipeline,
    commands: mpsc::Receiver<PipelineCommand>,
    backfills: mpsc::WeakSender<PipelineCommand>,
    history: Option<Arc<HistoryClient>>,
    subscription: watch::Sender<FeedRequest>,
    settings: watch::Sender<PipelineSettings>,
}

impl PipelineRunner {
    /// The runner stops once every `RunnerHandle` is dropped.
    pub fn new(pipeline: Pipeline, history: Option<Arc<HistoryClient>>) -> (Self, RunnerHandle) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let current = pipeline.settings().clone();
        let (subscription_tx, subscription_rx) = watch::channel(feed_request(&current));
        let (settings_tx, settings_rx) = watch::channel(current);

        let runner = Self {
            pipeline,
            commands: rx,
            backfills: tx.downgrade(),
            history,
            subscription: subscription_tx,
            settings: settings_tx,
        };
        let handle = RunnerHandle {
            commands: tx,
            subscription: subscription_rx,
            settings: settings_rx,
        };
        (runner, handle)
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        self.request_backfill(self.pipeline.generation());

        let mut flush = tokio::time::interval(FLUSH_INTERVAL);
        flush.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        Some(command) => self.handle(command),
                        None => {
                            info!("All pipeline handles dropped, stopping runner");
                            break;
                        }
                    }
                }
                _ = flush.tick() => {
                    self.pipeline.flush_redraw(Instant::now());
                }
            }
        }
    }

    fn handle(&mut self, command: PipelineCommand) {
        match command {
            PipelineCommand::Event(event) => {
                // Rejections are logged by the pipeline
                let _ = self.pipeline.handle_event(&event, Instant::now());
            }
            PipelineCommand::Backfill { generation, records } => {
                let loaded = self.pipeline.load_backfill(generation, &records);
                debug!("Backfill for generation {} loaded {} bars", generation, loaded);
            }
            PipelineCommand::Switch(settings) => {
                let generation = self.pipeline.switch(settings.clone());
                self.subscription.send_replace(feed_request(&settings));
                self.settings.send_replace(settings);
                self.request_backfill(generation);
            }
            PipelineCommand::Snapshot(reply) => {
                let _ = reply.send(self.pipeline.snapshot());
            }
        }
    }

    /// Fetch history for `generation` off the pipeline task.
    ///
    /// A failed fetch still completes the backfill, with no records, so the
    /// pipeline goes live on the feed alone.
    fn request_backfill(&mut self, generation: u64) {
        let Some(history) = self.history.clone() else {
            self.pipeline.load_backfill(generation, &[]);
            return;
        };

        let settings = self.pipeline.settings();
        let request = HistoryClient::request_for(&settings.symbol, settings.resolution, chrono::Utc::now());
        let backfills = self.backfills.clone();

        tokio::spawn(async move {
            let records = match history.fetch(&request).await {
                Ok(records) => records,
                Err(e) => {
                    warn!("Backfill for {} @ {} failed: {}", request.symbol, request.resolution, e);
                    Vec::new()
                }
            };
            if let Some(tx) = backfills.upgrade() {
                let _ = tx.send(PipelineCommand::Backfill { generation, records }).await;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::notifier::RecordingNotifier;
    use crate::services::publisher::ChartPublisher;
    use crate::types::{InboundEvent, PipelineMode, Resolution};
    use serde_json::json;
    use tokio::sync::oneshot;

    const BASE: i64 = 1_755_623_700;

    fn runner() -> (PipelineRunner, RunnerHandle) {
        let settings = PipelineSettings::new("MNQ", Resolution::default_minute());
        let pipeline = Pipeline::new(settings, ChartPublisher::new(64), Arc::new(RecordingNotifier::new()));
        PipelineRunner::new(pipeline, None)
    }

    fn event(time: i64, close: f64) -> InboundEvent {
        InboundEvent {
            symbol: Some("MNQ".into()),
            timestamp: Some(json!(time)),
            open: Some(json!(close)),
            high: Some(json!(close + 1.0)),
            low: Some(json!(close - 1.0)),
            close: Some(json!(close)),
            ..Default::default()
        }
    }

    async fn snapshot(handle: &RunnerHandle) -> crate::services::pipeline::PipelineSnapshot {
        let (tx, rx) = oneshot::channel();
        handle.commands.send(PipelineCommand::Snapshot(tx)).await.unwrap();
        rx.await.unwrap()
    }

    #[tokio::test]
    async fn test_runner_goes_live_without_history() {
        let (runner, handle) = runner();
        let task = runner.spawn();

        handle.commands.send(PipelineCommand::Event(event(BASE, 100.0))).await.unwrap();
        handle.commands.send(PipelineCommand::Event(event(BASE + 60, 101.0))).await.unwrap();

        let snap = snapshot(&handle).await;
        assert_eq!(snap.mode, PipelineMode::Live);
        assert_eq!(snap.bar_count, 2);
        assert_eq!(snap.generation, 1);

        drop(handle);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_switch_updates_subscription_and_settings() {
        let (runner, handle) = runner();
        let task = runner.spawn();
        let mut subscription = handle.subscription.clone();

        let current = handle.settings.borrow().clone();
        let next = current.with_resolution(Resolution::parse("5").unwrap());
        handle.commands.send(PipelineCommand::Switch(next)).await.unwrap();

        subscription.changed().await.unwrap();
        assert_eq!(
            *subscription.borrow(),
            FeedRequest::Subscribe { symbol: "MNQ".into(), resolution: "5".into() }
        );

        let snap = snapshot(&handle).await;
        assert_eq!(snap.resolution, "5");
        assert_eq!(snap.generation, 2);
        assert_eq!(snap.mode, PipelineMode::Live);
        assert_eq!(snap.bar_count, 0);
        assert_eq!(handle.settings.borrow().resolution.label, "5");

        drop(subscription);
        drop(handle);
        task.await.unwrap();
    }
}
