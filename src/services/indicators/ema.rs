//! Exponential Moving Average (EMA) indicator.

use super::{require_bars, Indicator};
use crate::error::Result;
use crate::types::{Bar, IndicatorKind, OverlayResult};

/// EMA (Exponential Moving Average) of closes.
///
/// Like SMA but gives more weight to recent prices. Seeded with the SMA of
/// the first `period` closes.
pub struct Ema {
    period: usize,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        Self { period }
    }
}

impl Indicator for Ema {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Ema
    }

    fn period(&self) -> usize {
        self.period
    }

    fn min_periods(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[Bar]) -> Result<OverlayResult> {
        require_bars(self, bars)?;

        let multiplier = 2.0 / (self.period as f64 + 1.0);

        // First EMA is SMA
        let mut ema = bars.iter().take(self.period).map(|b| b.close).sum::<f64>() / self.period as f64;
        let mut values = Vec::with_capacity(bars.len() - self.period + 1);
        values.push(ema);

        for bar in bars.iter().skip(self.period) {
            ema = (bar.close - ema) * multiplier + ema;
            values.push(ema);
        }

        Ok(OverlayResult::SingleLine { values })
    }
}
