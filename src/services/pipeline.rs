//! Per-subscription pipeline: inbound events in, bars, overlays and signals out.
//!
//! All per-resolution state lives in one `PipelineState`. A resolution or
//! chart type switch replaces it wholesale; nothing is reset field by field.

use crate::config::PipelineSettings;
use crate::error::{AppError, Result};
use crate::services::aggregator::{BarAggregator, PriceEvent, TickAccumulatorState};
use crate::services::debounce::RedrawDebouncer;
use crate::services::detector::{SignalDetector, SignalLatch};
use crate::services::indicators::OverlaySet;
use crate::services::notifier::Notifier;
use crate::services::publisher::ChartPublisher;
use crate::services::reconcile::{sanitize_history, Reconciled, ReconciliationController};
use crate::services::transform::{BrickState, DerivedSeries};
use crate::types::{
    Bar, ChartSnapshot, ChartType, ChartUpdate, HistoryRecord, InboundEvent, PipelineMode,
    ResolutionKind, ResolutionSpec, Signal, SignalNotification,
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Live events held back while a backfill is outstanding.
pub const MAX_PENDING_EVENTS: usize = 10_000;
/// Signals kept for redraws and the status view.
pub const MAX_KEPT_SIGNALS: usize = 500;

/// Work for the pipeline task.
#[derive(Debug)]
pub enum PipelineCommand {
    /// One real-time event from the feed.
    Event(InboundEvent),
    /// Backfill result for the given generation.
    Backfill {
        generation: u64,
        records: Vec<HistoryRecord>,
    },
    /// Rebuild on new settings.
    Switch(PipelineSettings),
    /// Status request.
    Snapshot(oneshot::Sender<PipelineSnapshot>),
}

/// Serializable status of a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSnapshot {
    pub symbol: String,
    pub resolution: String,
    pub chart_type: ChartType,
    pub mode: PipelineMode,
    pub generation: u64,
    pub bar_count: usize,
    pub smoothed_count: usize,
    pub brick_count: usize,
    pub brick_size: Option<f64>,
    pub brick_state: Option<BrickState>,
    pub last_bar: Option<Bar>,
    pub latch: SignalLatch,
    pub overlays: Vec<String>,
    pub signals: Vec<Signal>,
    pub pending_events: usize,
}

/// Everything owned by one (instrument, resolution) subscription.
pub struct PipelineState {
    settings: PipelineSettings,
    spec: ResolutionSpec,
    mode: PipelineMode,
    generation: u64,
    aggregator: BarAggregator,
    canonical: ReconciliationController,
    derived: DerivedSeries,
    overlays: OverlaySet,
    detector: SignalDetector,
    signals: Vec<Signal>,
    pending: VecDeque<InboundEvent>,
}

impl PipelineState {
    pub fn new(settings: PipelineSettings, generation: u64) -> Self {
        let spec = ResolutionSpec::from_resolution(settings.resolution);
        Self {
            aggregator: BarAggregator::new(&spec, settings.tick_idle_gap_secs),
            canonical: ReconciliationController::new(settings.max_bars),
            derived: DerivedSeries::new(settings.brick_size, settings.max_bars),
            overlays: OverlaySet::new(&settings.overlays),
            detector: SignalDetector::new(),
            signals: Vec::new(),
            pending: VecDeque::new(),
            mode: PipelineMode::Backfilling,
            spec,
            generation,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn mode(&self) -> PipelineMode {
        self.mode
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn spec(&self) -> ResolutionSpec {
        self.spec
    }

    pub fn canonical(&self) -> &[Bar] {
        self.canonical.bars()
    }

    /// The series overlays and signals are evaluated on.
    pub fn active_series(&self) -> &[Bar] {
        self.derived.series(self.settings.chart_type, self.canonical.bars())
    }

    pub fn signals(&self) -> &[Signal] {
        &self.signals
    }

    /// Accumulator of the open tick bar, if any.
    pub fn tick_state(&self) -> Option<&TickAccumulatorState> {
        match &self.aggregator {
            BarAggregator::Tick(agg) => agg.state(),
            BarAggregator::Time(_) => None,
        }
    }

    fn buffer(&mut self, event: InboundEvent) {
        if self.pending.len() >= MAX_PENDING_EVENTS {
            warn!("Backfill pending too long, dropping oldest buffered event");
            self.pending.pop_front();
        }
        self.pending.push_back(event);
    }

    fn keep_signal(&mut self, signal: Signal) {
        self.signals.push(signal);
        if self.signals.len() > MAX_KEPT_SIGNALS {
            let excess = self.signals.len() - MAX_KEPT_SIGNALS;
            self.signals.drain(..excess);
        }
    }

    /// Reject events meant for another subscription.
    fn check_subscription(&self, event: &InboundEvent) -> Result<()> {
        if let Some(symbol) = event.symbol.as_deref() {
            if !symbol.eq_ignore_ascii_case(&self.settings.symbol) {
                return Err(AppError::InvalidEvent(format!(
                    "symbol {} does not match {}",
                    symbol, self.settings.symbol
                )));
            }
        }
        if let Some(resolution) = event.resolution.as_deref() {
            if !resolution.eq_ignore_ascii_case(self.settings.resolution.label) {
                return Err(AppError::InvalidEvent(format!(
                    "resolution {} does not match {}",
                    resolution, self.settings.resolution.label
                )));
            }
        }
        Ok(())
    }
}

/// The single owner of pipeline state and its outbound collaborators.
pub struct Pipeline {
    state: PipelineState,
    publisher: ChartPublisher,
    notifier: Arc<dyn Notifier>,
    debouncer: RedrawDebouncer,
    next_generation: u64,
}

impl Pipeline {
    pub fn new(settings: PipelineSettings, publisher: ChartPublisher, notifier: Arc<dyn Notifier>) -> Self {
        let debouncer = RedrawDebouncer::new(settings.redraw_debounce);
        info!(
            "Pipeline {} @ {} ({}) waiting for backfill",
            settings.symbol,
            settings.resolution.label,
            settings.chart_type.as_str()
        );
        Self {
            state: PipelineState::new(settings, 1),
            publisher,
            notifier,
            debouncer,
            next_generation: 2,
        }
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn mode(&self) -> PipelineMode {
        self.state.mode
    }

    pub fn generation(&self) -> u64 {
        self.state.generation
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.state.settings
    }

    /// Replace all per-resolution state. Returns the new generation.
    ///
    /// Backfills still in flight for earlier generations are discarded on arrival.
    pub fn switch(&mut self, settings: PipelineSettings) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;

        info!(
            "Switching to {} @ {} ({}), generation {}",
            settings.symbol,
            settings.resolution.label,
            settings.chart_type.as_str(),
            generation
        );

        self.debouncer = RedrawDebouncer::new(settings.redraw_debounce);
        self.state = PipelineState::new(settings, generation);
        self.publisher.publish(ChartUpdate::ModeChanged {
            mode: PipelineMode::Backfilling,
            generation,
        });
        generation
    }

    /// Merge the historical backfill and go live.
    ///
    /// Signals found in history are kept for display but never dispatched.
    /// Events that arrived while backfilling are then processed in order.
    /// Returns the number of historical bars accepted.
    pub fn load_backfill(&mut self, generation: u64, records: &[HistoryRecord]) -> usize {
        if generation != self.state.generation {
            debug!(
                "Discarding backfill for generation {} (current {})",
                generation, self.state.generation
            );
            return 0;
        }
        if self.state.mode == PipelineMode::Live {
            debug!("Ignoring second backfill for generation {}", generation);
            return 0;
        }

        let bars = sanitize_history(records, self.state.spec.kind == ResolutionKind::TickCount);
        self.state.canonical.load_history(bars);
        let state = &mut self.state;
        state.aggregator.seed(state.canonical.last());
        state.derived.rebuild(state.canonical.bars());

        let series = state.derived.series(state.settings.chart_type, state.canonical.bars());
        state.overlays.refresh(series);
        let history_signals = match state.overlays.result_for(state.settings.signal_overlay) {
            Some(channel) => state.detector.replay(series, channel),
            None => Vec::new(),
        };
        let loaded = state.canonical.len();
        let replayed = history_signals.len();
        for signal in history_signals {
            state.keep_signal(signal);
        }

        state.mode = PipelineMode::Live;
        info!(
            "Backfill merged: {} bars, {} historical signals, now live (generation {})",
            loaded, replayed, generation
        );
        self.publisher.publish(ChartUpdate::ModeChanged {
            mode: PipelineMode::Live,
            generation,
        });

        let pending = std::mem::take(&mut self.state.pending);
        if !pending.is_empty() {
            debug!("Replaying {} events buffered during backfill", pending.len());
        }
        for event in &pending {
            if let Err(e) = self.process(event, Instant::now()) {
                debug!("Buffered event dropped: {}", e);
            }
        }

        self.redraw();
        self.debouncer.record_run(Instant::now());
        loaded
    }

    /// Run one inbound event through the whole pipeline.
    ///
    /// Rejected events leave every piece of state untouched. While
    /// backfilling, events are buffered and nothing is returned.
    pub fn handle_event(&mut self, event: &InboundEvent, now: Instant) -> Result<Vec<Signal>> {
        if let Err(e) = self.state.check_subscription(event) {
            debug!("Dropping event: {}", e);
            return Err(e);
        }
        if self.state.mode == PipelineMode::Backfilling {
            self.state.buffer(event.clone());
            return Ok(Vec::new());
        }
        self.process(event, now).map_err(|e| {
            warn!("Dropping event: {}", e);
            e
        })
    }

    fn process(&mut self, event: &InboundEvent, now: Instant) -> Result<Vec<Signal>> {
        let price = PriceEvent::from_inbound(event)?;

        // Validate against the canonical series before touching the aggregator
        let mut aggregator = self.state.aggregator.clone();
        let update = aggregator.apply(&price)?;
        let reconciled = self.state.canonical.apply(update.bar)?;
        self.state.aggregator = aggregator;

        if let Some(closed) = update.closed {
            debug!("Bar {} closed at {}", closed.time, closed.close);
        }
        if reconciled == Reconciled::Unchanged {
            debug!("Redundant update for bar {}", update.bar.time);
            return Ok(Vec::new());
        }

        let state = &mut self.state;
        let derived = state.derived.update(state.canonical.bars(), reconciled);

        self.publisher.publish(ChartUpdate::BarUpdate {
            series: ChartType::Candles,
            bar: update.bar,
        });
        if let Some(bar) = derived.smoothed {
            self.publisher.publish(ChartUpdate::BarUpdate {
                series: ChartType::HeikinAshi,
                bar,
            });
        }
        for brick in &derived.bricks {
            self.publisher.publish(ChartUpdate::BarUpdate {
                series: ChartType::Renko,
                bar: *brick,
            });
        }

        let chart_type = state.settings.chart_type;
        // Bricks never change in place; nothing to evaluate without new ones
        let evaluate = chart_type != ChartType::Renko || !derived.bricks.is_empty();
        let mut signals = Vec::new();

        if evaluate {
            let series = state.derived.series(chart_type, state.canonical.bars());
            for point in state.overlays.refresh(series) {
                self.publisher.publish(ChartUpdate::OverlayUpdate { point });
            }

            let first = match chart_type {
                ChartType::Renko => series.len().saturating_sub(derived.bricks.len()),
                _ => series.len().saturating_sub(1),
            };
            if let Some(channel) = state.overlays.result_for(state.settings.signal_overlay) {
                for index in first.max(1)..series.len() {
                    if let Some(signal) = state.detector.evaluate_at(series, channel, index) {
                        signals.push(signal);
                    }
                }
            }
        }

        for signal in &signals {
            self.dispatch(signal.clone());
        }

        if update.is_new || update.closed.is_some() {
            self.request_redraw(now);
        }

        Ok(signals)
    }

    /// Publish a live signal and hand it to the notifier.
    fn dispatch(&mut self, signal: Signal) {
        if self.state.mode == PipelineMode::Live {
            let notification =
                SignalNotification::from_signal(&signal, &self.state.settings.symbol, &self.state.settings.strategy_id);
            self.notifier.notify(notification);
        }
        self.publisher.publish(ChartUpdate::Signal {
            signal: signal.clone(),
            live: self.state.mode == PipelineMode::Live,
        });
        self.state.keep_signal(signal);
    }

    /// Ask for a full redraw; runs now unless one ran within the debounce interval.
    pub fn request_redraw(&mut self, now: Instant) -> bool {
        if self.debouncer.request(now) {
            self.redraw();
            true
        } else {
            false
        }
    }

    /// Run a coalesced redraw once the debounce interval has passed.
    pub fn flush_redraw(&mut self, now: Instant) -> bool {
        if self.debouncer.flush(now) {
            self.redraw();
            true
        } else {
            false
        }
    }

    /// Recompute overlays over the full active series and publish a snapshot.
    fn redraw(&mut self) {
        let state = &mut self.state;
        let series = state.derived.series(state.settings.chart_type, state.canonical.bars());
        state.overlays.refresh(series);
        let data = self.chart_snapshot();
        debug!("Redraw with {} bars", data.bars.len());
        self.publisher.publish(ChartUpdate::Snapshot { data });
    }

    /// Full series view for renderers.
    pub fn chart_snapshot(&self) -> ChartSnapshot {
        let state = &self.state;
        ChartSnapshot {
            symbol: state.settings.symbol.clone(),
            resolution: state.settings.resolution.label.to_string(),
            chart_type: state.settings.chart_type,
            mode: state.mode,
            bars: state.active_series().to_vec(),
            overlays: state.overlays.named(),
            signals: state.signals.clone(),
        }
    }

    /// Status view for the API.
    pub fn snapshot(&self) -> PipelineSnapshot {
        let state = &self.state;
        PipelineSnapshot {
            symbol: state.settings.symbol.clone(),
            resolution: state.settings.resolution.label.to_string(),
            chart_type: state.settings.chart_type,
            mode: state.mode,
            generation: state.generation,
            bar_count: state.canonical.len(),
            smoothed_count: state.derived.smoothed().bars().len(),
            brick_count: state.derived.bricks().bricks().len(),
            brick_size: state.derived.bricks().brick_size(),
            brick_state: state.derived.bricks().state().copied(),
            last_bar: state.canonical.last().copied(),
            latch: state.detector.latch(),
            overlays: state.overlays.specs().iter().map(|s| s.id()).collect(),
            signals: state.signals.clone(),
            pending_events: state.pending.len(),
        }
    }
}
