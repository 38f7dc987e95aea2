//! Average True Range (ATR).

use super::{require_bars, Indicator};
use crate::error::Result;
use crate::types::{Bar, IndicatorKind, OverlayResult};

/// True range: max(High-Low, |High-PrevClose|, |Low-PrevClose|).
/// Without a previous bar it is just High-Low.
pub fn true_range(current: &Bar, previous: Option<&Bar>) -> f64 {
    let hl = current.high - current.low;
    match previous {
        Some(prev) => {
            let hc = (current.high - prev.close).abs();
            let lc = (current.low - prev.close).abs();
            hl.max(hc).max(lc)
        }
        None => hl,
    }
}

/// Simple average of the trailing `period` true ranges.
///
/// `None` when fewer than `period` bars exist.
pub fn average_true_range(bars: &[Bar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period {
        return None;
    }
    let start = bars.len() - period;
    let sum: f64 = (start..bars.len())
        .map(|i| true_range(&bars[i], i.checked_sub(1).map(|p| &bars[p])))
        .sum();
    Some(sum / period as f64)
}

/// ATR overlay using Wilder's smoothing.
pub struct Atr {
    period: usize,
}

impl Default for Atr {
    fn default() -> Self {
        Self { period: 14 }
    }
}

impl Atr {
    pub fn new(period: usize) -> Self {
        Self { period }
    }
}

impl Indicator for Atr {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Atr
    }

    fn period(&self) -> usize {
        self.period
    }

    fn min_periods(&self) -> usize {
        self.period + 1
    }

    fn compute(&self, bars: &[Bar]) -> Result<OverlayResult> {
        require_bars(self, bars)?;

        let true_ranges: Vec<f64> = (1..bars.len())
            .map(|i| true_range(&bars[i], Some(&bars[i - 1])))
            .collect();

        let mut atr = true_ranges.iter().take(self.period).sum::<f64>() / self.period as f64;
        let mut values = Vec::with_capacity(true_ranges.len() - self.period + 1);
        values.push(atr);

        for tr in true_ranges.iter().skip(self.period) {
            atr = (atr * (self.period - 1) as f64 + tr) / self.period as f64;
            values.push(atr);
        }

        Ok(OverlayResult::SingleLine { values })
    }
}
