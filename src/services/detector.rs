//! Channel-breakout reversal detector with per-episode latching.

use crate::types::{Bar, OverlayResult, OverlayValue, Signal, SignalType};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Arm flags for the two channel boundaries.
///
/// A flag arms when a signal fires for its boundary and clears once the
/// previous bar no longer touches that boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalLatch {
    pub lower_armed: bool,
    pub upper_armed: bool,
}

/// Upper and lower channel values aligned with one bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelLevels {
    pub upper: f64,
    pub lower: f64,
}

impl ChannelLevels {
    pub fn from_value(value: OverlayValue) -> Option<Self> {
        match value {
            OverlayValue::Band { upper, lower, .. } => Some(Self { upper, lower }),
            OverlayValue::Line { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SignalDetector {
    latch: SignalLatch,
    last_emitted: Option<(i64, SignalType)>,
}

impl SignalDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate the rule for `current` given the bar before it.
    ///
    /// - previous low at or below the lower channel, green current bar, lower not armed: Buy
    /// - previous high at or above the upper channel, red current bar, upper not armed: Sell
    ///
    /// The same (time, type) pair is never emitted twice, so repeated
    /// updates to an open bar cannot re-fire.
    pub fn evaluate(&mut self, previous: &Bar, current: &Bar, levels: ChannelLevels) -> Option<Signal> {
        let mut signal = None;

        if previous.low <= levels.lower {
            if current.is_green() && !self.latch.lower_armed {
                self.latch.lower_armed = true;
                signal = self.emit(current, SignalType::Buy, format!(
                    "Reversal after touch of lower channel {:.2}",
                    levels.lower
                ));
            }
        } else {
            self.latch.lower_armed = false;
        }

        if previous.high >= levels.upper {
            if current.is_red() && !self.latch.upper_armed {
                self.latch.upper_armed = true;
                let sell = self.emit(current, SignalType::Sell, format!(
                    "Reversal after touch of upper channel {:.2}",
                    levels.upper
                ));
                signal = signal.or(sell);
            }
        } else {
            self.latch.upper_armed = false;
        }

        signal
    }

    fn emit(&mut self, bar: &Bar, signal_type: SignalType, reason: String) -> Option<Signal> {
        if self.last_emitted == Some((bar.time, signal_type)) {
            return None;
        }
        self.last_emitted = Some((bar.time, signal_type));
        info!("{} signal at {} price {}", signal_type.action(), bar.time, bar.close);
        Some(Signal {
            time: bar.time,
            signal_type,
            price: bar.close,
            reason,
        })
    }

    /// Evaluate `series[index]` against the channel value aligned with it.
    pub fn evaluate_at(&mut self, series: &[Bar], channel: &OverlayResult, index: usize) -> Option<Signal> {
        if index == 0 || index >= series.len() {
            return None;
        }
        let levels = channel
            .at(index, series.len())
            .and_then(ChannelLevels::from_value)?;
        self.evaluate(&series[index - 1], &series[index], levels)
    }

    /// Walk a whole series from its start, collecting every signal.
    pub fn replay(&mut self, series: &[Bar], channel: &OverlayResult) -> Vec<Signal> {
        (1..series.len())
            .filter_map(|i| self.evaluate_at(series, channel, i))
            .collect()
    }

    pub fn latch(&self) -> SignalLatch {
        self.latch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(time: i64, open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar { time, open, high, low, close, volume: 1 }
    }

    const LEVELS: ChannelLevels = ChannelLevels { upper: 110.0, lower: 90.0 };

    #[test]
    fn test_buy_after_lower_touch() {
        let mut d = SignalDetector::new();
        let prev = bar(1, 92.0, 93.0, 89.0, 90.5);
        let cur = bar(2, 91.0, 95.0, 90.5, 94.0);
        let signal = d.evaluate(&prev, &cur, LEVELS).unwrap();
        assert_eq!(signal.signal_type, SignalType::Buy);
        assert_eq!(signal.price, 94.0);
        assert!(d.latch().lower_armed);
    }

    #[test]
    fn test_sell_after_upper_touch() {
        let mut d = SignalDetector::new();
        let prev = bar(1, 108.0, 111.0, 107.0, 109.0);
        let cur = bar(2, 109.0, 109.5, 104.0, 105.0);
        let signal = d.evaluate(&prev, &cur, LEVELS).unwrap();
        assert_eq!(signal.signal_type, SignalType::Sell);
        assert!(d.latch().upper_armed);
    }

    #[test]
    fn test_red_bar_after_lower_touch_is_ignored() {
        let mut d = SignalDetector::new();
        let prev = bar(1, 92.0, 93.0, 89.0, 90.5);
        let cur = bar(2, 94.0, 95.0, 90.5, 91.0);
        assert!(d.evaluate(&prev, &cur, LEVELS).is_none());
        assert!(!d.latch().lower_armed);
    }

    #[test]
    fn test_sustained_touch_fires_once() {
        let mut d = SignalDetector::new();
        let touching = |t| bar(t, 91.0, 95.0, 88.0, 94.0);
        let mut signals = Vec::new();
        for t in 1..10 {
            if let Some(s) = d.evaluate(&touching(t), &touching(t + 1), LEVELS) {
                signals.push(s);
            }
        }
        assert_eq!(signals.len(), 1);

        // Moving away clears the latch, the next touch fires again
        let away = bar(20, 100.0, 101.0, 99.0, 100.5);
        assert!(d.evaluate(&away, &touching(21), LEVELS).is_none());
        assert!(!d.latch().lower_armed);
        assert!(d.evaluate(&touching(21), &touching(22), LEVELS).is_some());
    }

    #[test]
    fn test_open_bar_updates_do_not_refire() {
        let mut d = SignalDetector::new();
        let prev = bar(1, 92.0, 93.0, 89.0, 90.5);
        let cur = bar(2, 91.0, 95.0, 90.5, 94.0);
        assert!(d.evaluate(&prev, &cur, LEVELS).is_some());

        // Channel drifts away then back while bar 2 is still open
        let away = ChannelLevels { upper: 110.0, lower: 80.0 };
        assert!(d.evaluate(&prev, &cur, away).is_none());
        assert!(d.evaluate(&prev, &cur, LEVELS).is_none());
    }

    #[test]
    fn test_replay_uses_aligned_channel() {
        let series = vec![
            bar(1, 100.0, 101.0, 99.0, 100.0),
            bar(2, 99.0, 99.5, 89.0, 90.0),
            bar(3, 90.0, 96.0, 89.5, 95.0),
        ];
        // Channel only covers the last two bars
        let channel = OverlayResult::Band {
            upper: vec![105.0, 105.0],
            middle: vec![97.0, 97.0],
            lower: vec![89.0, 89.0],
        };
        let mut d = SignalDetector::new();
        let signals = d.replay(&series, &channel);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].time, 3);
        assert_eq!(signals[0].signal_type, SignalType::Buy);
    }

    #[test]
    fn test_line_overlay_is_not_a_channel() {
        let mut d = SignalDetector::new();
        let series = vec![bar(1, 1.0, 1.0, 1.0, 1.0), bar(2, 1.0, 2.0, 1.0, 2.0)];
        let line = OverlayResult::SingleLine { values: vec![1.0, 1.0] };
        assert!(d.evaluate_at(&series, &line, 1).is_none());
    }
}
