pub mod aggregator;
pub mod debounce;
pub mod detector;
pub mod indicators;
pub mod notifier;
pub mod pipeline;
pub mod publisher;
pub mod reconcile;
pub mod runner;
pub mod timestamp;
pub mod transform;

pub use aggregator::{AggregateUpdate, BarAggregator, PriceEvent};
pub use debounce::RedrawDebouncer;
pub use detector::{ChannelLevels, SignalDetector, SignalLatch};
pub use indicators::{Indicator, OverlaySet};
pub use notifier::{Notifier, RecordingNotifier, WebhookNotifier};
pub use pipeline::{Pipeline, PipelineCommand, PipelineSnapshot, PipelineState};
pub use publisher::ChartPublisher;
pub use reconcile::{Reconciled, ReconciliationController};
pub use runner::{PipelineRunner, RunnerHandle};
pub use transform::{DerivedSeries, DerivedUpdate};
