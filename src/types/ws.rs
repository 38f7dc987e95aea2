use super::{Bar, ChartType, OverlayPoint, OverlayResult, PipelineMode, Signal};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Read a JSON number, or a string holding one.
pub fn as_number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Real-time bar event from the upstream feed.
///
/// Every field is optional on the wire; missing or non-numeric values are
/// rejected when the event is validated, not when it is parsed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEvent {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub resolution: Option<String>,
    /// Epoch timestamp of unknown unit (s, ms, us or ns).
    #[serde(default, alias = "time", alias = "t")]
    pub timestamp: Option<Value>,
    #[serde(default)]
    pub open: Option<Value>,
    #[serde(default)]
    pub high: Option<Value>,
    #[serde(default)]
    pub low: Option<Value>,
    #[serde(default)]
    pub close: Option<Value>,
    /// Bar-level volume; authoritative for the bar it belongs to.
    #[serde(default)]
    pub volume: Option<Value>,
    /// Per-update volume increment.
    #[serde(default)]
    pub tick_volume: Option<Value>,
    #[serde(default)]
    pub is_closed: bool,
}

/// Backfill query parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRequest {
    pub symbol: String,
    pub resolution: String,
    pub countback: u32,
    pub from_epoch: i64,
    pub to_epoch: i64,
}

/// Backfill record; `t` is epoch milliseconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryRecord {
    #[serde(default)]
    pub t: Option<Value>,
    #[serde(default)]
    pub o: Option<Value>,
    #[serde(default)]
    pub h: Option<Value>,
    #[serde(default)]
    pub l: Option<Value>,
    #[serde(default)]
    pub c: Option<Value>,
    #[serde(default)]
    pub v: Option<Value>,
    #[serde(default)]
    pub tv: Option<Value>,
}

/// Subscribe frame sent to the upstream feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedRequest {
    Subscribe { symbol: String, resolution: String },
}

/// Incoming WebSocket message from a chart client.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    SwitchResolution { resolution: String },
    SetChartType { chart_type: ChartType },
}

/// Overlay result with its identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedOverlay {
    pub id: String,
    pub result: OverlayResult,
}

/// Full redraw payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSnapshot {
    pub symbol: String,
    pub resolution: String,
    pub chart_type: ChartType,
    pub mode: PipelineMode,
    pub bars: Vec<Bar>,
    pub overlays: Vec<NamedOverlay>,
    /// Signals detected so far, history included.
    pub signals: Vec<Signal>,
}

/// Outgoing update for chart clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChartUpdate {
    Snapshot {
        data: ChartSnapshot,
    },
    BarUpdate {
        series: ChartType,
        bar: Bar,
    },
    OverlayUpdate {
        point: OverlayPoint,
    },
    Signal {
        signal: Signal,
        live: bool,
    },
    ModeChanged {
        mode: PipelineMode,
        generation: u64,
    },
    Error {
        error: String,
    },
}
