//! Relative Strength Index (RSI) indicator.

use super::{require_bars, Indicator};
use crate::error::Result;
use crate::types::{Bar, IndicatorKind, OverlayResult};

/// RSI (Relative Strength Index) indicator.
///
/// Measures momentum by comparing the magnitude of recent gains to recent losses.
/// Values range from 0-100:
/// - Below 30: Oversold
/// - Above 70: Overbought
pub struct Rsi {
    period: usize,
}

impl Default for Rsi {
    fn default() -> Self {
        Self { period: 14 }
    }
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        Self { period }
    }

    fn rsi(avg_gain: f64, avg_loss: f64) -> f64 {
        if avg_loss == 0.0 {
            return 100.0;
        }
        let rs = avg_gain / avg_loss;
        100.0 - (100.0 / (1.0 + rs))
    }
}

impl Indicator for Rsi {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Rsi
    }

    fn period(&self) -> usize {
        self.period
    }

    fn min_periods(&self) -> usize {
        self.period + 1
    }

    fn compute(&self, bars: &[Bar]) -> Result<OverlayResult> {
        require_bars(self, bars)?;

        let mut gains = Vec::with_capacity(bars.len() - 1);
        let mut losses = Vec::with_capacity(bars.len() - 1);

        for i in 1..bars.len() {
            let change = bars[i].close - bars[i - 1].close;
            if change > 0.0 {
                gains.push(change);
                losses.push(0.0);
            } else {
                gains.push(0.0);
                losses.push(-change);
            }
        }

        // Calculate initial averages
        let mut avg_gain: f64 = gains.iter().take(self.period).sum::<f64>() / self.period as f64;
        let mut avg_loss: f64 = losses.iter().take(self.period).sum::<f64>() / self.period as f64;

        let mut values = Vec::with_capacity(gains.len() - self.period + 1);
        values.push(Self::rsi(avg_gain, avg_loss));

        // Use smoothed averages for remaining data
        for i in self.period..gains.len() {
            avg_gain = (avg_gain * (self.period - 1) as f64 + gains[i]) / self.period as f64;
            avg_loss = (avg_loss * (self.period - 1) as f64 + losses[i]) / self.period as f64;
            values.push(Self::rsi(avg_gain, avg_loss));
        }

        Ok(OverlayResult::SingleLine { values })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::indicators::tests::uptrend;

    #[test]
    fn test_rsi_only_gains() {
        let result = Rsi::default().compute(&uptrend(30)).unwrap();
        assert_eq!(result.len(), 16);
        assert!(matches!(result, OverlayResult::SingleLine { values } if values.iter().all(|v| *v == 100.0)));
    }

    #[test]
    fn test_rsi_only_losses() {
        let mut bars = uptrend(20);
        bars.reverse();
        for (i, b) in bars.iter_mut().enumerate() {
            b.time = i as i64 + 1;
        }
        let result = Rsi::default().compute(&bars).unwrap();
        assert!(matches!(result, OverlayResult::SingleLine { values } if values.iter().all(|v| *v == 0.0)));
    }

    #[test]
    fn test_rsi_bounded() {
        let bars: Vec<Bar> = (0..40)
            .map(|i| {
                let close = 100.0 + ((i as f64) * 0.8).sin() * 4.0;
                Bar { time: i + 1, open: close, high: close + 1.0, low: close - 1.0, close, volume: 1 }
            })
            .collect();
        let result = Rsi::new(7).compute(&bars).unwrap();
        assert!(matches!(result, OverlayResult::SingleLine { values } if values.iter().all(|v| (0.0..=100.0).contains(v))));
    }
}
