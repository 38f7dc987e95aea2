//! Merges the one-shot historical backfill with the live bar stream.

use crate::error::{AppError, Result};
use crate::services::timestamp;
use crate::types::{as_number, Bar, HistoryRecord};
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Upper bound on bars kept per series.
pub const MAX_SERIES_BARS: usize = 5000;

/// What `apply` did with a bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// A newer bar was added to the end of the series.
    Appended,
    /// The last bar's watermarks or close changed.
    Updated,
    /// Redundant delivery; nothing changed.
    Unchanged,
}

fn record_to_bar(record: &HistoryRecord) -> Option<Bar> {
    let raw_time = as_number(record.t.as_ref())?;
    let time = timestamp::normalize(raw_time).ok()?;
    let volume = as_number(record.v.as_ref())
        .or_else(|| as_number(record.tv.as_ref()))
        .filter(|v| v.is_finite())
        .map(|v| v.max(0.0).round() as u64)
        .unwrap_or(0);

    let bar = Bar {
        time,
        open: as_number(record.o.as_ref())?,
        high: as_number(record.h.as_ref())?,
        low: as_number(record.l.as_ref())?,
        close: as_number(record.c.as_ref())?,
        volume,
    };
    bar.is_valid().then_some(bar)
}

/// Bump every non-increasing successor time to `prev + 1`.
pub fn repair_tick_times(bars: &mut [Bar]) {
    for i in 1..bars.len() {
        let prev = bars[i - 1].time;
        if bars[i].time <= prev {
            bars[i].time = prev + 1;
        }
    }
}

/// Turn raw backfill records into an ascending, de-duplicated series of valid bars.
///
/// Tick resolutions get their colliding times repaired; time resolutions keep
/// the last record delivered for a given bar time.
pub fn sanitize_history(records: &[HistoryRecord], is_tick: bool) -> Vec<Bar> {
    let mut bars: Vec<Bar> = records.iter().filter_map(record_to_bar).collect();
    let dropped = records.len() - bars.len();
    if dropped > 0 {
        warn!("Dropped {} invalid backfill records", dropped);
    }

    bars.sort_by_key(|b| b.time);

    if is_tick {
        repair_tick_times(&mut bars);
        return bars;
    }

    let mut deduped: Vec<Bar> = Vec::with_capacity(bars.len());
    for bar in bars {
        match deduped.last_mut() {
            Some(last) if last.time == bar.time => *last = bar,
            _ => deduped.push(bar),
        }
    }
    deduped
}

/// Owner of the canonical bar buffer shared by backfill and live updates.
#[derive(Debug, Clone)]
pub struct ReconciliationController {
    /// Kept contiguous so `bars` can hand out a slice.
    bars: VecDeque<Bar>,
    max_bars: usize,
}

impl Default for ReconciliationController {
    fn default() -> Self {
        Self::new(MAX_SERIES_BARS)
    }
}

impl ReconciliationController {
    pub fn new(max_bars: usize) -> Self {
        Self {
            bars: VecDeque::new(),
            max_bars: max_bars.max(1),
        }
    }

    /// Replace the buffer with sanitized history.
    pub fn load_history(&mut self, mut bars: Vec<Bar>) {
        if bars.len() > self.max_bars {
            bars.drain(..bars.len() - self.max_bars);
        }
        debug!("Loaded {} historical bars", bars.len());
        self.bars = VecDeque::from(bars);
    }

    /// Merge into the last bar or append.
    ///
    /// Stale and invalid bars are rejected and leave the buffer untouched.
    /// Re-applying an unchanged bar is a no-op.
    pub fn apply(&mut self, bar: Bar) -> Result<Reconciled> {
        if !bar.is_valid() {
            return Err(AppError::InvalidEvent(format!("invalid bar at {}", bar.time)));
        }

        let Some(last) = self.bars.back_mut() else {
            self.bars.push_back(bar);
            return Ok(Reconciled::Appended);
        };

        if bar.time < last.time {
            return Err(AppError::StaleBar {
                time: bar.time,
                last: last.time,
            });
        }

        if bar.time == last.time {
            let merged = Bar {
                time: last.time,
                open: last.open,
                high: last.high.max(bar.high),
                low: last.low.min(bar.low),
                close: bar.close,
                volume: bar.volume,
            };
            if merged == *last {
                return Ok(Reconciled::Unchanged);
            }
            *last = merged;
            return Ok(Reconciled::Updated);
        }

        self.bars.push_back(bar);
        if self.bars.len() > self.max_bars {
            self.bars.pop_front();
        }
        self.bars.make_contiguous();
        Ok(Reconciled::Appended)
    }

    pub fn bars(&self) -> &[Bar] {
        self.bars.as_slices().0
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.back()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bar(time: i64, open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar { time, open, high, low, close, volume: 10 }
    }

    fn record(t: i64, o: f64, h: f64, l: f64, c: f64) -> HistoryRecord {
        HistoryRecord {
            t: Some(json!(t)),
            o: Some(json!(o)),
            h: Some(json!(h)),
            l: Some(json!(l)),
            c: Some(json!(c)),
            v: Some(json!(5)),
            tv: None,
        }
    }

    #[test]
    fn test_repair_tick_times() {
        let mut bars = vec![
            bar(100, 1.0, 1.0, 1.0, 1.0),
            bar(100, 1.0, 1.0, 1.0, 1.0),
            bar(101, 1.0, 1.0, 1.0, 1.0),
        ];
        repair_tick_times(&mut bars);
        let times: Vec<i64> = bars.iter().map(|b| b.time).collect();
        assert_eq!(times, vec![100, 101, 102]);
    }

    #[test]
    fn test_sanitize_sorts_and_filters() {
        let base = 1_755_623_700_000_i64;
        let mut bad = record(base + 60_000, 1.0, 2.0, 0.5, 1.5);
        bad.c = Some(json!("oops"));
        let records = vec![
            record(base + 120_000, 3.0, 4.0, 2.0, 3.5),
            record(base, 1.0, 2.0, 0.5, 1.5),
            bad,
            // high below close
            record(base + 180_000, 1.0, 1.2, 0.5, 1.5),
        ];
        let bars = sanitize_history(&records, false);
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].time, base / 1000);
        assert_eq!(bars[1].time, base / 1000 + 120);
    }

    #[test]
    fn test_sanitize_time_resolution_keeps_last_duplicate() {
        let base = 1_755_623_700_000_i64;
        let records = vec![record(base, 1.0, 2.0, 0.5, 1.5), record(base, 1.0, 3.0, 0.5, 2.5)];
        let bars = sanitize_history(&records, false);
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].close, 2.5);
    }

    #[test]
    fn test_sanitize_tick_resolution_repairs_duplicates() {
        let base = 1_755_623_700_000_i64;
        let records = vec![
            record(base, 1.0, 2.0, 0.5, 1.5),
            record(base, 1.5, 2.0, 1.0, 1.8),
            record(base + 1_000, 1.8, 2.0, 1.0, 1.9),
        ];
        let bars = sanitize_history(&records, true);
        let secs = base / 1000;
        let times: Vec<i64> = bars.iter().map(|b| b.time).collect();
        assert_eq!(times, vec![secs, secs + 1, secs + 2]);
    }

    #[test]
    fn test_apply_merges_and_appends() {
        let mut rc = ReconciliationController::default();
        rc.load_history(vec![bar(60, 100.0, 105.0, 98.0, 103.0)]);

        assert_eq!(rc.apply(bar(60, 101.0, 106.0, 99.0, 104.0)).unwrap(), Reconciled::Updated);
        let last = *rc.last().unwrap();
        assert_eq!(last.open, 100.0);
        assert_eq!(last.high, 106.0);
        assert_eq!(last.low, 98.0);
        assert_eq!(last.close, 104.0);

        assert_eq!(rc.apply(bar(120, 104.0, 105.0, 103.0, 104.5)).unwrap(), Reconciled::Appended);
        assert_eq!(rc.len(), 2);
    }

    #[test]
    fn test_apply_is_idempotent() {
        let mut rc = ReconciliationController::default();
        let b = bar(60, 100.0, 105.0, 98.0, 103.0);
        rc.apply(b).unwrap();
        assert_eq!(rc.apply(b).unwrap(), Reconciled::Unchanged);
        assert_eq!(rc.apply(b).unwrap(), Reconciled::Unchanged);
        assert_eq!(*rc.last().unwrap(), b);
    }

    #[test]
    fn test_apply_rejects_stale_and_invalid() {
        let mut rc = ReconciliationController::default();
        rc.apply(bar(120, 100.0, 105.0, 98.0, 103.0)).unwrap();
        assert!(matches!(
            rc.apply(bar(60, 100.0, 105.0, 98.0, 103.0)),
            Err(AppError::StaleBar { time: 60, last: 120 })
        ));
        assert!(rc.apply(bar(180, 100.0, 99.0, 98.0, 103.0)).is_err());
        assert_eq!(rc.len(), 1);
    }

    #[test]
    fn test_buffer_is_capped() {
        let mut rc = ReconciliationController::new(3);
        for i in 1..=5 {
            rc.apply(bar(i * 60, 1.0, 1.0, 1.0, 1.0)).unwrap();
        }
        assert_eq!(rc.len(), 3);
        assert_eq!(rc.bars()[0].time, 180);
    }

    #[test]
    fn test_capped_buffer_stays_a_full_slice() {
        let mut rc = ReconciliationController::new(50);
        rc.load_history((1..=50).map(|i| bar(i * 60, 1.0, 1.0, 1.0, 1.0)).collect());
        for i in 51..=400 {
            rc.apply(bar(i * 60, 1.0, 1.0, 1.0, 1.0)).unwrap();
            let bars = rc.bars();
            assert_eq!(bars.len(), 50);
            assert_eq!(bars[49].time, i * 60);
            assert!(bars.windows(2).all(|w| w[0].time < w[1].time));
        }
        assert_eq!(rc.last().map(|b| b.time), Some(400 * 60));
    }
}
