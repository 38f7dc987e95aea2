//! Fan-out of chart updates to connected renderers.

use crate::types::ChartUpdate;
use tokio::sync::broadcast;
use tracing::trace;

/// Broadcast channel of chart updates.
#[derive(Clone)]
pub struct ChartPublisher {
    tx: broadcast::Sender<ChartUpdate>,
}

impl Default for ChartPublisher {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl ChartPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to chart updates.
    pub fn subscribe(&self) -> broadcast::Receiver<ChartUpdate> {
        self.tx.subscribe()
    }

    /// Send an update to every subscriber. Having none is not an error.
    pub fn publish(&self, update: ChartUpdate) {
        if self.tx.send(update).is_err() {
            trace!("No chart subscribers");
        }
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PipelineMode;

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let publisher = ChartPublisher::new(8);
        let mut rx = publisher.subscribe();
        publisher.publish(ChartUpdate::ModeChanged { mode: PipelineMode::Live, generation: 3 });
        match rx.recv().await.unwrap() {
            ChartUpdate::ModeChanged { mode, generation } => {
                assert_eq!(mode, PipelineMode::Live);
                assert_eq!(generation, 3);
            }
            other => panic!("unexpected update {:?}", other),
        }
    }

    #[test]
    fn test_publish_without_subscribers() {
        let publisher = ChartPublisher::default();
        publisher.publish(ChartUpdate::Error { error: "nobody listening".into() });
        assert_eq!(publisher.receiver_count(), 0);
    }
}
