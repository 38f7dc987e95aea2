//! Donchian channel: rolling highest high and lowest low.

use super::{require_bars, Indicator};
use crate::error::Result;
use crate::types::{Bar, IndicatorKind, OverlayResult};

/// Breakout reference levels over the last `period` bars, current bar included.
///
/// - Upper: highest high
/// - Lower: lowest low
/// - Middle: (upper + lower) / 2
pub struct DonchianChannel {
    period: usize,
}

impl Default for DonchianChannel {
    fn default() -> Self {
        Self { period: 20 }
    }
}

impl DonchianChannel {
    pub fn new(period: usize) -> Self {
        Self { period }
    }
}

impl Indicator for DonchianChannel {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Donchian
    }

    fn period(&self) -> usize {
        self.period
    }

    fn min_periods(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[Bar]) -> Result<OverlayResult> {
        require_bars(self, bars)?;

        let len = bars.len() - self.period + 1;
        let mut upper = Vec::with_capacity(len);
        let mut middle = Vec::with_capacity(len);
        let mut lower = Vec::with_capacity(len);

        for window in bars.windows(self.period) {
            let high = window.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
            let low = window.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
            upper.push(high);
            lower.push(low);
            middle.push((high + low) / 2.0);
        }

        Ok(OverlayResult::Band { upper, middle, lower })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(time: i64, high: f64, low: f64) -> Bar {
        let mid = (high + low) / 2.0;
        Bar { time, open: mid, high, low, close: mid, volume: 0 }
    }

    #[test]
    fn test_rolling_extremes() {
        let bars = vec![bar(1, 10.0, 5.0), bar(2, 12.0, 7.0), bar(3, 11.0, 4.0), bar(4, 9.0, 8.0)];
        let result = DonchianChannel::new(3).compute(&bars).unwrap();
        assert_eq!(
            result,
            OverlayResult::Band {
                upper: vec![12.0, 12.0],
                middle: vec![8.0, 8.0],
                lower: vec![4.0, 4.0],
            }
        );
    }

    #[test]
    fn test_alignment_with_series_tail() {
        let bars: Vec<Bar> = (1..=25).map(|t| bar(t, 100.0 + t as f64, 90.0 + t as f64)).collect();
        let result = DonchianChannel::default().compute(&bars).unwrap();
        assert_eq!(result.len(), 6);
        assert!(result.at(18, bars.len()).is_none());
        assert!(result.at(19, bars.len()).is_some());
    }
}
