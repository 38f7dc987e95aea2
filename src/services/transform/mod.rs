//! Alternate views of the canonical bar series.

pub mod heikin_ashi;
pub mod renko;

pub use heikin_ashi::{smooth_bar, smooth_series, SmoothedSeries};
pub use renko::{BrickDirection, BrickSeries, BrickState, WalkOrigin};

use crate::services::reconcile::Reconciled;
use crate::types::{Bar, ChartType};

/// Derived bars produced by one canonical update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivedUpdate {
    pub smoothed: Option<Bar>,
    pub bricks: Vec<Bar>,
}

/// Smoothed and brick series kept in step with the canonical series.
#[derive(Debug, Clone)]
pub struct DerivedSeries {
    smoothed: SmoothedSeries,
    bricks: BrickSeries,
}

impl DerivedSeries {
    pub fn new(brick_size: Option<f64>, max_bars: usize) -> Self {
        Self {
            smoothed: SmoothedSeries::with_capacity_limit(max_bars),
            bricks: BrickSeries::new(brick_size, max_bars),
        }
    }

    /// Full replay of both transforms.
    pub fn rebuild(&mut self, canonical: &[Bar]) {
        self.smoothed.rebuild(canonical);
        self.bricks.rebuild(canonical);
    }

    /// Follow the last canonical bar after a reconciliation step.
    pub fn update(&mut self, canonical: &[Bar], reconciled: Reconciled) -> DerivedUpdate {
        let Some(latest) = canonical.last() else {
            return DerivedUpdate::default();
        };
        if reconciled == Reconciled::Unchanged {
            return DerivedUpdate::default();
        }
        DerivedUpdate {
            smoothed: self.smoothed.update(latest, reconciled),
            bricks: self.bricks.update(latest, canonical),
        }
    }

    /// The series a chart type is drawn from.
    pub fn series<'a>(&'a self, chart_type: ChartType, canonical: &'a [Bar]) -> &'a [Bar] {
        match chart_type {
            ChartType::Candles => canonical,
            ChartType::HeikinAshi => self.smoothed.bars(),
            ChartType::Renko => self.bricks.bricks(),
        }
    }

    pub fn smoothed(&self) -> &SmoothedSeries {
        &self.smoothed
    }

    pub fn bricks(&self) -> &BrickSeries {
        &self.bricks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(time: i64, close: f64) -> Bar {
        Bar { time, open: close - 1.0, high: close + 1.0, low: close - 2.0, close, volume: 3 }
    }

    #[test]
    fn test_update_tracks_all_series() {
        let mut derived = DerivedSeries::new(Some(5.0), 100);
        let mut canonical = vec![bar(1, 100.0)];
        derived.rebuild(&canonical);

        canonical.push(bar(2, 111.0));
        let update = derived.update(&canonical, Reconciled::Appended);
        assert!(update.smoothed.is_some());
        assert_eq!(update.bricks.len(), 2);
        assert_eq!(derived.series(ChartType::Candles, &canonical).len(), 2);
        assert_eq!(derived.series(ChartType::HeikinAshi, &canonical).len(), 2);
        assert_eq!(derived.series(ChartType::Renko, &canonical).len(), 2);
    }

    #[test]
    fn test_unchanged_produces_nothing() {
        let mut derived = DerivedSeries::new(Some(5.0), 100);
        let canonical = vec![bar(1, 100.0)];
        derived.rebuild(&canonical);
        assert_eq!(derived.update(&canonical, Reconciled::Unchanged), DerivedUpdate::default());
    }
}
