//! Heikin-Ashi style smoothed candles.
//!
//! - Close = (Open + High + Low + Close) / 4
//! - Open = (previous smoothed Open + previous smoothed Close) / 2, or (Open + Close) / 2 for the first bar
//! - High = max(High, smoothed Open, smoothed Close)
//! - Low = min(Low, smoothed Open, smoothed Close)
//!
//! Each output depends on the whole history before it, so a window can only
//! be recomputed by replaying from the first bar.

use crate::services::reconcile::{Reconciled, MAX_SERIES_BARS};
use crate::types::Bar;
use std::collections::VecDeque;

/// Smooth one canonical bar against the previous smoothed bar.
pub fn smooth_bar(current: &Bar, previous: Option<&Bar>) -> Bar {
    let close = (current.open + current.high + current.low + current.close) / 4.0;
    let open = match previous {
        Some(p) => (p.open + p.close) / 2.0,
        None => (current.open + current.close) / 2.0,
    };

    Bar {
        time: current.time,
        open,
        high: current.high.max(open).max(close),
        low: current.low.min(open).min(close),
        close,
        volume: current.volume,
    }
}

/// Smooth a whole series from its first bar.
pub fn smooth_series(bars: &[Bar]) -> Vec<Bar> {
    let mut out: Vec<Bar> = Vec::with_capacity(bars.len());
    for bar in bars {
        let smoothed = smooth_bar(bar, out.last());
        out.push(smoothed);
    }
    out
}

/// Incrementally maintained smoothed series, 1:1 with the canonical series.
#[derive(Debug, Clone)]
pub struct SmoothedSeries {
    /// Kept contiguous so `bars` can hand out a slice.
    bars: VecDeque<Bar>,
    max_bars: usize,
}

impl Default for SmoothedSeries {
    fn default() -> Self {
        Self {
            bars: VecDeque::new(),
            max_bars: MAX_SERIES_BARS,
        }
    }
}

impl SmoothedSeries {
    pub fn with_capacity_limit(max_bars: usize) -> Self {
        Self {
            bars: VecDeque::new(),
            max_bars: max_bars.max(1),
        }
    }

    /// Replay the full canonical series.
    pub fn rebuild(&mut self, canonical: &[Bar]) {
        self.bars = VecDeque::from(smooth_series(canonical));
    }

    /// Follow one reconciled canonical update. Returns the new or revised smoothed bar.
    ///
    /// An in-progress bar is re-smoothed against the bar before it, so
    /// repeated updates to the open bar never compound.
    pub fn update(&mut self, latest: &Bar, reconciled: Reconciled) -> Option<Bar> {
        match reconciled {
            Reconciled::Unchanged => None,
            Reconciled::Updated if !self.bars.is_empty() => {
                self.bars.pop_back();
                let smoothed = smooth_bar(latest, self.bars.back());
                self.bars.push_back(smoothed);
                Some(smoothed)
            }
            Reconciled::Updated | Reconciled::Appended => {
                let smoothed = smooth_bar(latest, self.bars.back());
                self.bars.push_back(smoothed);
                if self.bars.len() > self.max_bars {
                    self.bars.pop_front();
                }
                self.bars.make_contiguous();
                Some(smoothed)
            }
        }
    }

    pub fn bars(&self) -> &[Bar] {
        self.bars.as_slices().0
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.back()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(time: i64, open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar { time, open, high, low, close, volume: 1 }
    }

    #[test]
    fn test_first_bar() {
        let s = smooth_bar(&bar(1, 100.0, 105.0, 98.0, 103.0), None);
        assert_eq!(s.open, 101.5);
        assert_eq!(s.close, 101.5);
        assert_eq!(s.high, 105.0);
        assert_eq!(s.low, 98.0);
    }

    #[test]
    fn test_recurrence_uses_previous_smoothed_bar() {
        let bars = vec![bar(1, 100.0, 105.0, 98.0, 103.0), bar(2, 103.0, 110.0, 102.0, 108.0)];
        let out = smooth_series(&bars);
        assert_eq!(out[1].open, (101.5 + 101.5) / 2.0);
        assert_eq!(out[1].close, (103.0 + 110.0 + 102.0 + 108.0) / 4.0);
        assert_eq!(out[1].high, 110.0);
        assert_eq!(out[1].low, 101.5);
    }

    #[test]
    fn test_partial_updates_match_full_replay() {
        let first = bar(1, 100.0, 105.0, 98.0, 103.0);
        let mut series = SmoothedSeries::default();
        series.update(&first, Reconciled::Appended);

        let mut open_bar = bar(2, 103.0, 104.0, 102.0, 103.5);
        series.update(&open_bar, Reconciled::Appended);
        open_bar.high = 109.0;
        open_bar.close = 108.0;
        series.update(&open_bar, Reconciled::Updated);
        open_bar.low = 99.0;
        open_bar.close = 100.0;
        series.update(&open_bar, Reconciled::Updated);

        let replayed = smooth_series(&[first, open_bar]);
        assert_eq!(series.bars(), replayed.as_slice());
    }

    #[test]
    fn test_unchanged_is_ignored() {
        let mut series = SmoothedSeries::default();
        let b = bar(1, 100.0, 105.0, 98.0, 103.0);
        series.update(&b, Reconciled::Appended);
        assert!(series.update(&b, Reconciled::Unchanged).is_none());
        assert_eq!(series.bars().len(), 1);
    }

    #[test]
    fn test_smoothed_bars_are_valid() {
        let bars: Vec<Bar> = (0..50)
            .map(|i| {
                let base = 100.0 + (i as f64 * 0.7).sin() * 5.0;
                bar(i + 1, base, base + 2.0, base - 2.0, base + 1.0)
            })
            .collect();
        assert!(smooth_series(&bars).iter().all(|b| b.is_valid()));
    }

    #[test]
    fn test_capped_series_matches_canonical_tail() {
        let canonical: Vec<Bar> = (0..300)
            .map(|i| {
                let base = 100.0 + (i as f64 * 0.3).cos() * 4.0;
                bar(i + 1, base, base + 1.5, base - 1.5, base + 0.5)
            })
            .collect();
        let mut series = SmoothedSeries::with_capacity_limit(40);
        for b in &canonical {
            series.update(b, Reconciled::Appended);
        }
        let replayed = smooth_series(&canonical);
        assert_eq!(series.bars().len(), 40);
        assert_eq!(series.bars(), &replayed[260..]);
        assert_eq!(series.last(), replayed.last());
    }
}
