use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Overlay types the indicator engine knows how to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    Sma,
    Ema,
    Rsi,
    /// Moving average +/- a standard deviation multiple.
    Bollinger,
    /// Rolling highest high / lowest low.
    Donchian,
    Atr,
}

impl IndicatorKind {
    pub const ALL: [IndicatorKind; 6] = [
        IndicatorKind::Sma,
        IndicatorKind::Ema,
        IndicatorKind::Rsi,
        IndicatorKind::Bollinger,
        IndicatorKind::Donchian,
        IndicatorKind::Atr,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sma => "sma",
            Self::Ema => "ema",
            Self::Rsi => "rsi",
            Self::Bollinger => "bollinger",
            Self::Donchian => "donchian",
            Self::Atr => "atr",
        }
    }

    /// Period used when a spec omits one.
    pub fn default_period(&self) -> usize {
        match self {
            Self::Sma | Self::Bollinger | Self::Donchian => 20,
            Self::Ema => 12,
            Self::Rsi | Self::Atr => 14,
        }
    }

    /// Whether the overlay is a two-band channel usable by the breakout detector.
    pub fn is_channel(&self) -> bool {
        matches!(self, Self::Bollinger | Self::Donchian)
    }
}

impl FromStr for IndicatorKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sma" => Ok(Self::Sma),
            "ema" => Ok(Self::Ema),
            "rsi" => Ok(Self::Rsi),
            "bollinger" | "bb" | "bbands" => Ok(Self::Bollinger),
            "donchian" | "dc" | "channel" => Ok(Self::Donchian),
            "atr" => Ok(Self::Atr),
            other => Err(AppError::UnknownIndicator(other.to_string())),
        }
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One configured overlay: `kind:period`, e.g. `donchian:20`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OverlaySpec {
    pub kind: IndicatorKind,
    pub period: usize,
}

impl OverlaySpec {
    pub fn new(kind: IndicatorKind, period: usize) -> Self {
        Self { kind, period }
    }

    /// Stable identifier used in published updates.
    pub fn id(&self) -> String {
        format!("{}:{}", self.kind, self.period)
    }
}

impl FromStr for OverlaySpec {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(2, ':');
        let kind: IndicatorKind = parts.next().unwrap_or_default().parse()?;
        let period = match parts.next() {
            Some(p) => p
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|p| *p > 0)
                .ok_or_else(|| AppError::BadRequest(format!("invalid overlay period in '{}'", s)))?,
            None => kind.default_period(),
        };
        Ok(Self { kind, period })
    }
}

/// Overlay values, aligned 1:1 with the tail of the series they were computed over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum OverlayResult {
    SingleLine {
        values: Vec<f64>,
    },
    Band {
        upper: Vec<f64>,
        middle: Vec<f64>,
        lower: Vec<f64>,
    },
}

/// A single overlay point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OverlayValue {
    Line { value: f64 },
    Band { upper: f64, middle: f64, lower: f64 },
}

impl OverlayResult {
    pub fn len(&self) -> usize {
        match self {
            Self::SingleLine { values } => values.len(),
            Self::Band { middle, .. } => middle.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at position `i` of this result (not of the series).
    fn value(&self, i: usize) -> Option<OverlayValue> {
        match self {
            Self::SingleLine { values } => values.get(i).map(|v| OverlayValue::Line { value: *v }),
            Self::Band { upper, middle, lower } => Some(OverlayValue::Band {
                upper: *upper.get(i)?,
                middle: *middle.get(i)?,
                lower: *lower.get(i)?,
            }),
        }
    }

    /// Value aligned with `series[series_index]` for a series of `series_len` bars.
    pub fn at(&self, series_index: usize, series_len: usize) -> Option<OverlayValue> {
        let offset = series_len.checked_sub(self.len())?;
        let i = series_index.checked_sub(offset)?;
        self.value(i)
    }

    /// Most recent point.
    pub fn last(&self) -> Option<OverlayValue> {
        self.len().checked_sub(1).and_then(|i| self.value(i))
    }
}

/// Latest point of one overlay, as republished on incremental updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayPoint {
    pub id: String,
    pub time: i64,
    pub value: OverlayValue,
}

/// Direction of an emitted signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    Buy,
    Sell,
}

impl SignalType {
    /// Action string sent to the webhook.
    pub fn action(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

/// A detected trading signal. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    pub time: i64,
    #[serde(rename = "type")]
    pub signal_type: SignalType,
    pub price: f64,
    pub reason: String,
}

/// Outbound notification for a live signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalNotification {
    pub action: String,
    pub symbol: String,
    pub strategy_id: String,
}

impl SignalNotification {
    pub fn from_signal(signal: &Signal, symbol: &str, strategy_id: &str) -> Self {
        Self {
            action: signal.signal_type.action().to_string(),
            symbol: symbol.to_string(),
            strategy_id: strategy_id.to_string(),
        }
    }

    /// Merge into a strategy payload template, overwriting `action`, `symbol` and `strategyId`.
    pub fn into_payload(self, template: Option<&serde_json::Value>) -> serde_json::Value {
        let mut body = match template {
            Some(serde_json::Value::Object(map)) => map.clone(),
            _ => serde_json::Map::new(),
        };
        body.insert("action".into(), self.action.into());
        body.insert("symbol".into(), self.symbol.into());
        body.insert("strategyId".into(), self.strategy_id.into());
        serde_json::Value::Object(body)
    }
}
