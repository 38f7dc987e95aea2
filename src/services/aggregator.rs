//! Bar aggregation from raw price events.
//!
//! Two strategies: time buckets (seconds through months) and tick-count
//! accumulation. Both expose the current, possibly still-open bar after every
//! event and report a closed bar only when a period boundary is crossed.

use crate::error::{AppError, Result};
use crate::services::timestamp;
use crate::types::{as_number, Bar, InboundEvent, ResolutionKind, ResolutionSpec};
use serde_json::Value;
use tracing::debug;

/// Seconds without a tick after which a tick bar is closed and a new one started.
pub const DEFAULT_TICK_IDLE_GAP_SECS: i64 = 30;

/// Buckets at least this long are stamped by upstream, not by the epoch grid.
const SESSION_BUCKET_SECS: i64 = 86_400;

/// Volume carried by an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventVolume {
    /// Whole-bar volume reported by upstream; replaces what we have.
    Bar(u64),
    /// Volume of this update only; accumulated.
    Increment(u64),
}

impl EventVolume {
    fn amount(&self) -> u64 {
        match self {
            EventVolume::Bar(v) | EventVolume::Increment(v) => *v,
        }
    }
}

/// A validated, normalized price event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceEvent {
    /// Epoch seconds.
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: EventVolume,
    pub is_closed: bool,
}

fn price_field(name: &str, value: &Option<Value>) -> Result<f64> {
    as_number(value.as_ref())
        .filter(|v| v.is_finite())
        .ok_or_else(|| AppError::InvalidEvent(format!("missing or non-numeric {}", name)))
}

fn volume_field(value: &Option<Value>) -> Option<u64> {
    as_number(value.as_ref())
        .filter(|v| v.is_finite())
        .map(|v| v.max(0.0).round() as u64)
}

impl PriceEvent {
    /// Validate an upstream event and normalize its timestamp.
    pub fn from_inbound(event: &InboundEvent) -> Result<Self> {
        let raw_time = as_number(event.timestamp.as_ref())
            .ok_or_else(|| AppError::InvalidTimestamp("missing or non-numeric timestamp".into()))?;
        let time = timestamp::normalize(raw_time)?;

        let open = price_field("open", &event.open)?;
        let high = price_field("high", &event.high)?;
        let low = price_field("low", &event.low)?;
        let close = price_field("close", &event.close)?;

        if high < open.max(close) || low > open.min(close) {
            return Err(AppError::InvalidEvent(format!(
                "inconsistent OHLC o={} h={} l={} c={}",
                open, high, low, close
            )));
        }

        let volume = match (volume_field(&event.volume), volume_field(&event.tick_volume)) {
            (Some(v), _) => EventVolume::Bar(v),
            (None, Some(v)) => EventVolume::Increment(v),
            (None, None) => EventVolume::Increment(0),
        };

        Ok(Self {
            time,
            open,
            high,
            low,
            close,
            volume,
            is_closed: event.is_closed,
        })
    }
}

/// Result of feeding one event to the aggregator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregateUpdate {
    /// The current bar after the event.
    pub bar: Bar,
    /// `bar` started a new period.
    pub is_new: bool,
    /// The previous period's bar, when this event crossed a boundary.
    pub closed: Option<Bar>,
}

/// Running state of the tick bar being accumulated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickAccumulatorState {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    /// Synthetic bar time.
    pub time: i64,
    pub ticks_seen: u32,
    /// Wall-clock time of the most recent tick.
    pub last_tick_time: i64,
}

impl TickAccumulatorState {
    fn start(time: i64, event: &PriceEvent) -> Self {
        Self {
            open: event.open,
            high: event.high,
            low: event.low,
            close: event.close,
            volume: event.volume.amount(),
            time,
            ticks_seen: 1,
            last_tick_time: event.time,
        }
    }

    fn update(&mut self, event: &PriceEvent) {
        self.high = self.high.max(event.high);
        self.low = self.low.min(event.low);
        self.close = event.close;
        self.volume = self.volume.saturating_add(event.volume.amount());
        self.ticks_seen += 1;
        self.last_tick_time = event.time;
    }

    pub fn to_bar(&self) -> Bar {
        Bar {
            time: self.time,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        }
    }
}

/// Wall-clock bucketing.
#[derive(Debug, Clone)]
pub struct TimeBucketAggregator {
    bucket_seconds: i64,
    current: Option<Bar>,
    /// The current bar has already been reported as closed.
    current_closed: bool,
}

impl TimeBucketAggregator {
    pub fn new(bucket_seconds: i64) -> Self {
        Self {
            bucket_seconds: bucket_seconds.max(1),
            current: None,
            current_closed: false,
        }
    }

    /// Intraday buckets floor onto the epoch grid. Daily and longer bars open
    /// on session, week or calendar-month boundaries, so the event's own time
    /// is already the bar time.
    fn bucket_time(&self, time: i64) -> i64 {
        if self.bucket_seconds >= SESSION_BUCKET_SECS {
            time
        } else {
            time / self.bucket_seconds * self.bucket_seconds
        }
    }

    fn apply(&mut self, event: &PriceEvent) -> Result<AggregateUpdate> {
        let bar_time = self.bucket_time(event.time);

        if let Some(current) = self.current.as_mut() {
            if bar_time < current.time {
                return Err(AppError::StaleBar {
                    time: bar_time,
                    last: current.time,
                });
            }

            if bar_time == current.time {
                current.high = current.high.max(event.high);
                current.low = current.low.min(event.low);
                current.close = event.close;
                match event.volume {
                    EventVolume::Bar(v) => current.volume = v,
                    EventVolume::Increment(v) => current.volume = current.volume.saturating_add(v),
                }

                let bar = *current;
                let closed = if event.is_closed && !self.current_closed {
                    self.current_closed = true;
                    debug!("Bar {} closed by upstream", bar.time);
                    Some(bar)
                } else {
                    None
                };

                return Ok(AggregateUpdate {
                    bar,
                    is_new: false,
                    closed,
                });
            }
        }

        let previous = self.current.take().filter(|_| !self.current_closed);
        let bar = Bar {
            time: bar_time,
            open: event.open,
            high: event.high,
            low: event.low,
            close: event.close,
            volume: event.volume.amount(),
        };
        self.current = Some(bar);
        self.current_closed = event.is_closed;

        Ok(AggregateUpdate {
            bar,
            is_new: true,
            closed: previous,
        })
    }
}

/// N-tick accumulation.
#[derive(Debug, Clone)]
pub struct TickBarAggregator {
    threshold: u32,
    idle_gap: i64,
    acc: Option<TickAccumulatorState>,
    last_bar_time: Option<i64>,
}

impl TickBarAggregator {
    pub fn new(threshold: u32, idle_gap: i64) -> Self {
        Self {
            threshold: threshold.max(1),
            idle_gap,
            acc: None,
            last_bar_time: None,
        }
    }

    pub fn state(&self) -> Option<&TickAccumulatorState> {
        self.acc.as_ref()
    }

    fn apply(&mut self, event: &PriceEvent) -> Result<AggregateUpdate> {
        let start_new = match &self.acc {
            None => true,
            Some(acc) => {
                if event.time < acc.last_tick_time {
                    return Err(AppError::StaleBar {
                        time: event.time,
                        last: acc.last_tick_time,
                    });
                }
                acc.ticks_seen >= self.threshold || event.time - acc.last_tick_time > self.idle_gap
            }
        };

        if !start_new {
            if let Some(acc) = self.acc.as_mut() {
                acc.update(event);
                return Ok(AggregateUpdate {
                    bar: acc.to_bar(),
                    is_new: false,
                    closed: None,
                });
            }
        }

        let closed = self.acc.take().map(|acc| acc.to_bar());
        let time = match self.last_bar_time {
            Some(last) => last + 1,
            None => event.time,
        };
        let acc = TickAccumulatorState::start(time, event);
        self.last_bar_time = Some(time);
        self.acc = Some(acc);

        Ok(AggregateUpdate {
            bar: acc.to_bar(),
            is_new: true,
            closed,
        })
    }
}

/// Aggregation strategy for one resolution.
#[derive(Debug, Clone)]
pub enum BarAggregator {
    Time(TimeBucketAggregator),
    Tick(TickBarAggregator),
}

impl BarAggregator {
    pub fn new(spec: &ResolutionSpec, idle_gap: i64) -> Self {
        match spec.kind {
            ResolutionKind::Time => Self::Time(TimeBucketAggregator::new(spec.units_per_bar as i64)),
            ResolutionKind::TickCount => Self::Tick(TickBarAggregator::new(spec.units_per_bar, idle_gap)),
        }
    }

    /// Continue from the last historical bar.
    ///
    /// Time buckets keep merging into it; tick bars number new bars after it.
    pub fn seed(&mut self, last: Option<&Bar>) {
        match self {
            Self::Time(agg) => {
                agg.current = last.copied();
                agg.current_closed = false;
            }
            Self::Tick(agg) => {
                agg.acc = None;
                agg.last_bar_time = last.map(|b| b.time);
            }
        }
    }

    pub fn apply(&mut self, event: &PriceEvent) -> Result<AggregateUpdate> {
        match self {
            Self::Time(agg) => agg.apply(event),
            Self::Tick(agg) => agg.apply(event),
        }
    }

    /// The current, possibly still-open bar.
    pub fn current(&self) -> Option<Bar> {
        match self {
            Self::Time(agg) => agg.current,
            Self::Tick(agg) => agg.acc.map(|acc| acc.to_bar()),
        }
    }
}
