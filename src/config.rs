use crate::services::aggregator::DEFAULT_TICK_IDLE_GAP_SECS;
use crate::services::reconcile::MAX_SERIES_BARS;
use crate::types::{ChartType, IndicatorKind, OverlaySpec, Resolution};
use std::env;
use std::time::Duration;
use tracing::warn;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Instrument the pipeline follows.
    pub symbol: String,
    /// Resolution label from the catalog.
    pub resolution: String,
    /// Series the overlays and the detector run on.
    pub chart_type: ChartType,
    /// Fixed brick size; derived from ATR when unset.
    pub brick_size: Option<f64>,
    /// Active overlays.
    pub overlays: Vec<OverlaySpec>,
    /// Channel overlay evaluated by the signal detector.
    pub signal_overlay: IndicatorKind,
    /// Upstream real-time feed (ws:// or wss://).
    pub feed_ws_url: Option<String>,
    /// Historical backfill endpoint.
    pub history_url: Option<String>,
    /// Signal webhook.
    pub webhook_url: Option<String>,
    /// Strategy identifier sent with every signal.
    pub strategy_id: String,
    /// JSON object merged into every webhook body.
    pub webhook_template: Option<serde_json::Value>,
    /// Seconds without a tick before a tick bar is closed early.
    pub tick_idle_gap_secs: i64,
    /// Minimum interval between full redraws (ms).
    pub redraw_debounce_ms: u64,
    /// Webhook request timeout (ms).
    pub notifier_timeout_ms: u64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let resolution = env::var("RESOLUTION").unwrap_or_else(|_| "1".to_string());
        let resolution = match Resolution::parse(&resolution) {
            Ok(r) => r.label.to_string(),
            Err(e) => {
                warn!("{}, falling back to 1 minute", e);
                Resolution::default_minute().label.to_string()
            }
        };

        let chart_type = env::var("CHART_TYPE")
            .ok()
            .and_then(|v| {
                let parsed = ChartType::from_str(&v);
                if parsed.is_none() {
                    warn!("Unknown chart type '{}', using candles", v);
                }
                parsed
            })
            .unwrap_or_default();

        let signal_overlay = env::var("SIGNAL_OVERLAY")
            .ok()
            .and_then(|v| match v.parse::<IndicatorKind>() {
                Ok(kind) if kind.is_channel() => Some(kind),
                Ok(kind) => {
                    warn!("{} is not a channel overlay, using donchian", kind);
                    None
                }
                Err(e) => {
                    warn!("{}, using donchian", e);
                    None
                }
            })
            .unwrap_or(IndicatorKind::Donchian);

        Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3001),
            symbol: env::var("SYMBOL").unwrap_or_else(|_| "MNQ".to_string()),
            resolution,
            chart_type,
            brick_size: env::var("BRICK_SIZE")
                .ok()
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|v| v.is_finite() && *v > 0.0),
            overlays: parse_overlays(&env::var("OVERLAYS").unwrap_or_else(|_| "donchian:20".to_string())),
            signal_overlay,
            feed_ws_url: env::var("FEED_WS_URL").ok(),
            history_url: env::var("HISTORY_URL").ok(),
            webhook_url: env::var("WEBHOOK_URL").ok(),
            strategy_id: env::var("STRATEGY_ID").unwrap_or_else(|_| uuid::Uuid::new_v4().to_string()),
            webhook_template: env::var("WEBHOOK_TEMPLATE").ok().and_then(|v| {
                match serde_json::from_str::<serde_json::Value>(&v) {
                    Ok(value) if value.is_object() => Some(value),
                    _ => {
                        warn!("WEBHOOK_TEMPLATE is not a JSON object, ignoring");
                        None
                    }
                }
            }),
            tick_idle_gap_secs: parse_idle_gap(env::var("TICK_IDLE_GAP_SECS").ok().as_deref()),
            redraw_debounce_ms: env::var("REDRAW_DEBOUNCE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(500),
            notifier_timeout_ms: env::var("NOTIFIER_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5000),
        }
    }

    /// Everything needed to build a pipeline.
    pub fn pipeline_settings(&self) -> PipelineSettings {
        let resolution = Resolution::parse(&self.resolution).unwrap_or_else(|_| Resolution::default_minute());
        PipelineSettings {
            symbol: self.symbol.clone(),
            resolution,
            chart_type: self.chart_type,
            overlays: self.overlays.clone(),
            signal_overlay: self.signal_overlay,
            brick_size: self.brick_size,
            tick_idle_gap_secs: self.tick_idle_gap_secs,
            redraw_debounce: Duration::from_millis(self.redraw_debounce_ms),
            strategy_id: self.strategy_id.clone(),
            max_bars: MAX_SERIES_BARS,
        }
        .with_signal_overlay()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Tick idle gap in seconds. Missing, malformed and non-positive values use the default.
fn parse_idle_gap(value: Option<&str>) -> i64 {
    value
        .and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_TICK_IDLE_GAP_SECS)
}

/// Parse a comma list of `kind[:period]`. Unknown or malformed entries are skipped.
pub fn parse_overlays(list: &str) -> Vec<OverlaySpec> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse::<OverlaySpec>() {
            Ok(spec) => Some(spec),
            Err(e) => {
                warn!("Skipping overlay '{}': {}", s, e);
                None
            }
        })
        .collect()
}

/// Inputs of one pipeline instance.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub symbol: String,
    pub resolution: &'static Resolution,
    pub chart_type: ChartType,
    pub overlays: Vec<OverlaySpec>,
    pub signal_overlay: IndicatorKind,
    pub brick_size: Option<f64>,
    pub tick_idle_gap_secs: i64,
    pub redraw_debounce: Duration,
    pub strategy_id: String,
    pub max_bars: usize,
}

impl PipelineSettings {
    pub fn new(symbol: impl Into<String>, resolution: &'static Resolution) -> Self {
        Self {
            symbol: symbol.into(),
            resolution,
            chart_type: ChartType::Candles,
            overlays: vec![OverlaySpec::new(IndicatorKind::Donchian, 20)],
            signal_overlay: IndicatorKind::Donchian,
            brick_size: None,
            tick_idle_gap_secs: DEFAULT_TICK_IDLE_GAP_SECS,
            redraw_debounce: Duration::from_millis(500),
            strategy_id: "default".to_string(),
            max_bars: MAX_SERIES_BARS,
        }
    }

    /// Same settings on another resolution.
    pub fn with_resolution(&self, resolution: &'static Resolution) -> Self {
        Self {
            resolution,
            ..self.clone()
        }
    }

    /// Same settings drawn as another chart type.
    pub fn with_chart_type(&self, chart_type: ChartType) -> Self {
        Self {
            chart_type,
            ..self.clone()
        }
    }

    /// Make sure the detector's channel overlay is among the active overlays.
    pub fn with_signal_overlay(mut self) -> Self {
        if !self.overlays.iter().any(|o| o.kind == self.signal_overlay) {
            let kind = self.signal_overlay;
            self.overlays.push(OverlaySpec::new(kind, kind.default_period()));
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            host: "0.0.0.0".to_string(),
            port: 3001,
            symbol: "MNQ".to_string(),
            resolution: "500T".to_string(),
            chart_type: ChartType::Renko,
            brick_size: Some(5.0),
            overlays: vec![OverlaySpec::new(IndicatorKind::Sma, 10)],
            signal_overlay: IndicatorKind::Donchian,
            feed_ws_url: None,
            history_url: None,
            webhook_url: None,
            strategy_id: "strategy-1".to_string(),
            webhook_template: None,
            tick_idle_gap_secs: 30,
            redraw_debounce_ms: 500,
            notifier_timeout_ms: 5000,
        }
    }

    #[test]
    fn test_parse_overlays() {
        let specs = parse_overlays("donchian:20, sma , vwap:5, ema:0,bb:30");
        assert_eq!(
            specs,
            vec![
                OverlaySpec::new(IndicatorKind::Donchian, 20),
                OverlaySpec::new(IndicatorKind::Sma, 20),
                OverlaySpec::new(IndicatorKind::Bollinger, 30),
            ]
        );
        assert!(parse_overlays("").is_empty());
    }

    #[test]
    fn test_parse_idle_gap() {
        assert_eq!(parse_idle_gap(Some("45")), 45);
        assert_eq!(parse_idle_gap(Some("-5")), DEFAULT_TICK_IDLE_GAP_SECS);
        assert_eq!(parse_idle_gap(Some("0")), DEFAULT_TICK_IDLE_GAP_SECS);
        assert_eq!(parse_idle_gap(Some("soon")), DEFAULT_TICK_IDLE_GAP_SECS);
        assert_eq!(parse_idle_gap(None), DEFAULT_TICK_IDLE_GAP_SECS);
    }

    #[test]
    fn test_pipeline_settings_from_config() {
        let settings = config().pipeline_settings();
        assert_eq!(settings.resolution.label, "500T");
        assert_eq!(settings.chart_type, ChartType::Renko);
        assert_eq!(settings.brick_size, Some(5.0));
        assert_eq!(settings.redraw_debounce, Duration::from_millis(500));
        // Signal channel added next to the configured overlays
        assert_eq!(
            settings.overlays,
            vec![
                OverlaySpec::new(IndicatorKind::Sma, 10),
                OverlaySpec::new(IndicatorKind::Donchian, 20),
            ]
        );
    }

    #[test]
    fn test_unknown_resolution_falls_back() {
        let mut config = config();
        config.resolution = "7T".to_string();
        assert_eq!(config.pipeline_settings().resolution.label, "1");
    }

    #[test]
    fn test_settings_variants() {
        let base = PipelineSettings::new("MNQ", Resolution::default_minute());
        let tick = base.with_resolution(Resolution::parse("100T").unwrap());
        assert_eq!(tick.resolution.label, "100T");
        assert_eq!(tick.symbol, "MNQ");
        let ha = tick.with_chart_type(ChartType::HeikinAshi);
        assert_eq!(ha.chart_type, ChartType::HeikinAshi);
        assert_eq!(ha.resolution.label, "100T");
    }
}
