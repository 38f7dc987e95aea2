use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};

/// OHLCV bar. `time` is epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Bar {
    /// Check the OHLC invariant: finite prices, `high >= max(open, close)`,
    /// `low <= min(open, close)` and a positive time.
    pub fn is_valid(&self) -> bool {
        self.time > 0
            && self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite()
            && self.high >= self.open.max(self.close)
            && self.low <= self.open.min(self.close)
    }

    /// Close above open.
    pub fn is_green(&self) -> bool {
        self.close > self.open
    }

    /// Close below open.
    pub fn is_red(&self) -> bool {
        self.close < self.open
    }
}

/// How a resolution delimits its bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionKind {
    /// Wall-clock buckets (seconds, minutes, days...).
    Time,
    /// A fixed number of raw ticks per bar.
    TickCount,
}

/// Entry in the static resolution catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    /// Label used by the upstream feed and the history endpoint.
    pub label: &'static str,
    /// Default number of bars requested on backfill.
    pub countback: u32,
    pub display_name: &'static str,
    pub kind: ResolutionKind,
    /// Bucket length in seconds for time resolutions, nominal tick count for tick resolutions.
    pub units: u32,
}

const MINUTE: u32 = 60;
const HOUR: u32 = 60 * MINUTE;
const DAY: u32 = 24 * HOUR;

/// Every resolution the pipeline can be subscribed to.
pub const RESOLUTION_CATALOG: &[Resolution] = &[
    // Tick resolutions
    Resolution { label: "100T", countback: 500, display_name: "100 Ticks", kind: ResolutionKind::TickCount, units: 100 },
    Resolution { label: "500T", countback: 500, display_name: "500 Ticks", kind: ResolutionKind::TickCount, units: 500 },
    Resolution { label: "1000T", countback: 500, display_name: "1000 Ticks", kind: ResolutionKind::TickCount, units: 1000 },
    Resolution { label: "5000T", countback: 500, display_name: "5000 Ticks", kind: ResolutionKind::TickCount, units: 5000 },
    // Second resolutions
    Resolution { label: "1S", countback: 600, display_name: "1 Second", kind: ResolutionKind::Time, units: 1 },
    Resolution { label: "5S", countback: 600, display_name: "5 Seconds", kind: ResolutionKind::Time, units: 5 },
    Resolution { label: "10S", countback: 600, display_name: "10 Seconds", kind: ResolutionKind::Time, units: 10 },
    Resolution { label: "15S", countback: 600, display_name: "15 Seconds", kind: ResolutionKind::Time, units: 15 },
    Resolution { label: "30S", countback: 600, display_name: "30 Seconds", kind: ResolutionKind::Time, units: 30 },
    // Minute resolutions
    Resolution { label: "1", countback: 500, display_name: "1 Minute", kind: ResolutionKind::Time, units: MINUTE },
    Resolution { label: "3", countback: 500, display_name: "3 Minutes", kind: ResolutionKind::Time, units: 3 * MINUTE },
    Resolution { label: "5", countback: 500, display_name: "5 Minutes", kind: ResolutionKind::Time, units: 5 * MINUTE },
    Resolution { label: "15", countback: 400, display_name: "15 Minutes", kind: ResolutionKind::Time, units: 15 * MINUTE },
    Resolution { label: "30", countback: 300, display_name: "30 Minutes", kind: ResolutionKind::Time, units: 30 * MINUTE },
    Resolution { label: "60", countback: 300, display_name: "1 Hour", kind: ResolutionKind::Time, units: HOUR },
    // Day and above
    Resolution { label: "1D", countback: 365, display_name: "1 Day", kind: ResolutionKind::Time, units: DAY },
    Resolution { label: "1W", countback: 260, display_name: "1 Week", kind: ResolutionKind::Time, units: 7 * DAY },
    Resolution { label: "1M", countback: 120, display_name: "1 Month", kind: ResolutionKind::Time, units: 30 * DAY },
];

impl Resolution {
    /// The one-minute entry, used when no usable resolution is configured.
    pub fn default_minute() -> &'static Resolution {
        &RESOLUTION_CATALOG[9]
    }

    /// Look up a catalog entry by label.
    pub fn parse(label: &str) -> Result<&'static Resolution> {
        let label = label.trim();
        RESOLUTION_CATALOG
            .iter()
            .find(|r| r.label.eq_ignore_ascii_case(label))
            .ok_or_else(|| AppError::UnknownResolution(label.to_string()))
    }

    pub fn is_tick(&self) -> bool {
        self.kind == ResolutionKind::TickCount
    }

    /// Bucket length in seconds, `None` for tick resolutions.
    pub fn bucket_seconds(&self) -> Option<i64> {
        match self.kind {
            ResolutionKind::Time => Some(self.units as i64),
            ResolutionKind::TickCount => None,
        }
    }

    /// Build the immutable subscription spec for this resolution.
    pub fn spec(&self) -> ResolutionSpec {
        let units_per_bar = match self.kind {
            ResolutionKind::Time => self.units,
            ResolutionKind::TickCount => tick_threshold(self.units),
        };
        ResolutionSpec {
            kind: self.kind,
            units_per_bar,
            lookback: self.countback,
        }
    }
}

/// Raw ticks accumulated into one rendered bar for a nominal tick label.
pub fn tick_threshold(label_value: u32) -> u32 {
    match label_value {
        100 => 5,
        500 => 15,
        1000 => 25,
        5000 => 50,
        other => (other / 20).clamp(5, 50),
    }
}

/// Immutable per-subscription resolution parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionSpec {
    pub kind: ResolutionKind,
    /// Seconds per bucket for time resolutions, raw ticks per bar for tick resolutions.
    pub units_per_bar: u32,
    pub lookback: u32,
}

impl ResolutionSpec {
    pub fn from_resolution(resolution: &Resolution) -> Self {
        resolution.spec()
    }
}

/// Which series overlays and signals are evaluated on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChartType {
    #[default]
    Candles,
    HeikinAshi,
    Renko,
}

impl ChartType {
    /// Parse from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "candles" | "candle" | "canonical" => Some(Self::Candles),
            "heikin_ashi" | "heikinashi" | "ha" | "smoothed" => Some(Self::HeikinAshi),
            "renko" | "bricks" | "brick" => Some(Self::Renko),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Candles => "candles",
            Self::HeikinAshi => "heikin_ashi",
            Self::Renko => "renko",
        }
    }
}

/// Whether the pipeline is still replaying history or processing the live stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PipelineMode {
    /// Signals are visual-only; nothing is dispatched.
    #[default]
    Backfilling,
    Live,
}
