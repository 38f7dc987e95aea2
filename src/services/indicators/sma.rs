//! Simple Moving Average (SMA) indicator.

use super::{require_bars, Indicator};
use crate::error::Result;
use crate::types::{Bar, IndicatorKind, OverlayResult};

/// SMA (Simple Moving Average) of closes.
pub struct Sma {
    period: usize,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        Self { period }
    }

    /// Rolling mean of `values`, one output per full window.
    pub(crate) fn rolling_mean(values: &[f64], period: usize) -> Vec<f64> {
        if period == 0 || values.len() < period {
            return Vec::new();
        }
        let mut out = Vec::with_capacity(values.len() - period + 1);
        let mut sum: f64 = values.iter().take(period).sum();
        out.push(sum / period as f64);
        for i in period..values.len() {
            sum += values[i] - values[i - period];
            out.push(sum / period as f64);
        }
        out
    }
}

impl Indicator for Sma {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Sma
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
        Ok(OverlayResult::SingleLine {
            values: Self::rolling_mean(&closes, self.period),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::indicators::tests::uptrend;

    #[test]
    fn test_rolling_mean() {
        let values = Sma::rolling_mean(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert_eq!(values, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_sma_alignment() {
        let bars = uptrend(25);
        let result = Sma::new(20).compute(&bars).unwrap();
        assert_eq!(result.len(), 6);
        // Last window covers closes 107.5..136.0
        let expected = bars[5..].iter().map(|b| b.close).sum::<f64>() / 20.0;
        match result {
            OverlayResult::SingleLine { values } => {
                assert!((values[5] - expected).abs() < 1e-9);
            }
            _ => panic!("expected a single line"),
        }
    }

    #[test]
    fn test_sma_insufficient_data() {
        assert!(Sma::new(20).compute(&uptrend(19)).is_err());
    }
}
