//! Bollinger Bands indicator.

use super::sma::Sma;
use super::{require_bars, Indicator};
use crate::error::Result;
use crate::types::{Bar, IndicatorKind, OverlayResult};

/// Bollinger Bands indicator.
///
/// Consists of:
/// - Middle band: SMA(period)
/// - Upper band: SMA + multiplier * StdDev
/// - Lower band: SMA - multiplier * StdDev
pub struct BollingerBands {
    period: usize,
    std_dev_multiplier: f64,
}

impl Default for BollingerBands {
    fn default() -> Self {
        Self {
            period: 20,
            std_dev_multiplier: 2.0,
        }
    }
}

impl BollingerBands {
    pub fn new(period: usize, std_dev_multiplier: f64) -> Self {
        Self {
            period,
            std_dev_multiplier,
        }
    }

    /// Population standard deviation.
    fn std_dev(values: &[f64], mean: f64) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        let variance: f64 = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
        variance.sqrt()
    }
}

impl Indicator for BollingerBands {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Bollinger
    }

    fn period(&self) -> usize {
        self.period
    }

    fn min_periods(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[Bar]) -> Result<OverlayResult> {
        require_bars(self, bars)?;

        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let middle = Sma::rolling_mean(&closes, self.period);
        let mut upper = Vec::with_capacity(middle.len());
        let mut lower = Vec::with_capacity(middle.len());

        for (i, mean) in middle.iter().enumerate() {
            let width = Self::std_dev(&closes[i..i + self.period], *mean) * self.std_dev_multiplier;
            upper.push(mean + width);
            lower.push(mean - width);
        }

        Ok(OverlayResult::Band { upper, middle, lower })
    }
}
