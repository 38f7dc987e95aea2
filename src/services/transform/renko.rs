//! Fixed-height brick (Renko) series.
//!
//! A brick is emitted each time price travels one brick size beyond the last
//! boundary. A single update may emit zero, one or many bricks.

use crate::error::{AppError, Result};
use crate::services::indicators::atr::average_true_range;
use crate::types::Bar;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Bars used to derive the brick size.
pub const ATR_PERIOD: usize = 14;
/// ATR assumed when too little history exists.
pub const ATR_FALLBACK: f64 = 50.0;
/// Brick size used when the derived one is not a usable number.
pub const DEFAULT_BRICK_SIZE: f64 = 10.0;
/// Smallest brick that survives rounding to two decimals.
const MIN_PRICE_STEP: f64 = 0.01;

/// Round to two decimal places.
pub fn round_price(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Brick size derived from the canonical series: `round(ATR(14) * 0.5)`, at least 1.
pub fn derive_brick_size(bars: &[Bar]) -> f64 {
    let atr = average_true_range(bars, ATR_PERIOD).unwrap_or(ATR_FALLBACK);
    let size = (atr * 0.5).round();
    if !size.is_finite() {
        return DEFAULT_BRICK_SIZE;
    }
    size.max(1.0)
}

/// Use the configured size when it is usable, otherwise derive one.
pub fn resolve_brick_size(configured: Option<f64>, bars: &[Bar]) -> f64 {
    match configured.map(round_price) {
        Some(size) if size.is_finite() && size >= MIN_PRICE_STEP => size,
        Some(size) => {
            warn!("Ignoring unusable brick size {}, deriving from ATR", size);
            derive_brick_size(bars)
        }
        None => derive_brick_size(bars),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrickDirection {
    Up,
    Down,
}

/// Frontier of the brick series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrickState {
    pub last_boundary_high: f64,
    pub last_boundary_low: f64,
    pub direction: BrickDirection,
    pub last_emitted_time: i64,
}

impl BrickState {
    /// Both boundaries at `price`, nothing emitted yet.
    pub fn from_price(price: f64) -> Self {
        let boundary = round_price(price);
        Self {
            last_boundary_high: boundary,
            last_boundary_low: boundary,
            direction: BrickDirection::Up,
            last_emitted_time: 0,
        }
    }
}

/// Where a conversion starts walking from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WalkOrigin {
    /// Seed both boundaries from the first bar's close.
    Replay,
    /// Carry on from a persisted frontier.
    Continue(BrickState),
}

fn brick_is_consistent(brick: &Bar, direction: BrickDirection) -> bool {
    brick.high >= brick.low
        && match direction {
            BrickDirection::Up => brick.close > brick.open,
            BrickDirection::Down => brick.close < brick.open,
        }
}

/// Walk `state` towards `price`, returning the bricks crossed on the way.
///
/// Up bricks are walked first, then down bricks. Each brick gets a strictly
/// increasing time starting at `max(last_emitted_time + 1, base_time)`.
/// On error the state is left untouched.
pub fn walk(
    state: &mut BrickState,
    price: f64,
    base_time: i64,
    volume: u64,
    brick_size: f64,
) -> Result<Vec<Bar>> {
    if !brick_size.is_finite() || brick_size < MIN_PRICE_STEP {
        return Err(AppError::BrickWalk(format!("invalid brick size {}", brick_size)));
    }
    if !price.is_finite() {
        return Err(AppError::BrickWalk(format!("non-finite price {}", price)));
    }

    let mut bricks = Vec::new();
    let mut next_time = (state.last_emitted_time + 1).max(base_time);

    while price >= state.last_boundary_high + brick_size {
        let open = state.last_boundary_high;
        let close = round_price(open + brick_size);
        let brick = Bar {
            time: next_time,
            open,
            high: close,
            low: open,
            close,
            volume,
        };
        if !brick_is_consistent(&brick, BrickDirection::Up) {
            warn!("Discarding inconsistent up brick at {}", open);
            break;
        }
        bricks.push(brick);
        state.last_boundary_low = open;
        state.last_boundary_high = close;
        state.direction = BrickDirection::Up;
        state.last_emitted_time = next_time;
        next_time += 1;
    }

    while price <= state.last_boundary_low - brick_size {
        let open = state.last_boundary_low;
        let close = round_price(open - brick_size);
        let brick = Bar {
            time: next_time,
            open,
            high: open,
            low: close,
            close,
            volume,
        };
        if !brick_is_consistent(&brick, BrickDirection::Down) {
            warn!("Discarding inconsistent down brick at {}", open);
            break;
        }
        bricks.push(brick);
        state.last_boundary_high = open;
        state.last_boundary_low = close;
        state.direction = BrickDirection::Down;
        state.last_emitted_time = next_time;
        next_time += 1;
    }

    Ok(bricks)
}

/// Convert a bar series into bricks, walking each close in turn.
///
/// Returns the bricks and the frontier after the last bar, `None` when the
/// series is empty and there is nothing to continue from.
pub fn convert(bars: &[Bar], origin: WalkOrigin, brick_size: f64) -> (Vec<Bar>, Option<BrickState>) {
    let mut state = match origin {
        WalkOrigin::Continue(state) => state,
        WalkOrigin::Replay => match bars.first() {
            Some(first) => BrickState::from_price(first.close),
            None => return (Vec::new(), None),
        },
    };

    let mut bricks = Vec::new();
    for bar in bars {
        match walk(&mut state, bar.close, bar.time, bar.volume, brick_size) {
            Ok(mut emitted) => bricks.append(&mut emitted),
            Err(e) => {
                warn!("Brick conversion stopped: {}", e);
                break;
            }
        }
    }
    (bricks, Some(state))
}

/// Brick series maintained alongside the canonical series.
#[derive(Debug, Clone)]
pub struct BrickSeries {
    configured_size: Option<f64>,
    brick_size: Option<f64>,
    state: Option<BrickState>,
    bricks: Vec<Bar>,
    max_bars: usize,
}

impl BrickSeries {
    pub fn new(configured_size: Option<f64>, max_bars: usize) -> Self {
        Self {
            configured_size,
            brick_size: None,
            state: None,
            bricks: Vec::new(),
            max_bars: max_bars.max(1),
        }
    }

    /// Derive the brick size and replay the full canonical series.
    pub fn rebuild(&mut self, canonical: &[Bar]) {
        let size = resolve_brick_size(self.configured_size, canonical);
        let (mut bricks, state) = convert(canonical, WalkOrigin::Replay, size);
        if bricks.len() > self.max_bars {
            bricks.drain(..bricks.len() - self.max_bars);
        }
        debug!("Rebuilt {} bricks with size {}", bricks.len(), size);
        self.brick_size = Some(size);
        self.state = state;
        self.bricks = bricks;
    }

    /// Continue the walk with the latest canonical close. Returns the new bricks.
    pub fn update(&mut self, latest: &Bar, canonical: &[Bar]) -> Vec<Bar> {
        let size = match self.brick_size {
            Some(size) => size,
            None => {
                let size = resolve_brick_size(self.configured_size, canonical);
                self.brick_size = Some(size);
                size
            }
        };

        let Some(state) = self.state.as_mut() else {
            self.state = Some(BrickState::from_price(latest.close));
            return Vec::new();
        };

        match walk(state, latest.close, latest.time, latest.volume, size) {
            Ok(emitted) => {
                self.bricks.extend_from_slice(&emitted);
                if self.bricks.len() > self.max_bars {
                    let excess = self.bricks.len() - self.max_bars;
                    self.bricks.drain(..excess);
                }
                emitted
            }
            Err(e) => {
                warn!("No bricks emitted: {}", e);
                Vec::new()
            }
        }
    }

    pub fn bricks(&self) -> &[Bar] {
        &self.bricks
    }

    pub fn state(&self) -> Option<&BrickState> {
        self.state.as_ref()
    }

    pub fn brick_size(&self) -> Option<f64> {
        self.brick_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close_bar(time: i64, close: f64) -> Bar {
        Bar { time, open: close, high: close, low: close, close, volume: 1 }
    }

    #[test]
    fn test_walk_emits_multiple_up_bricks() {
        let mut state = BrickState {
            last_boundary_high: 100.0,
            last_boundary_low: 90.0,
            direction: BrickDirection::Up,
            last_emitted_time: 0,
        };
        let bricks = walk(&mut state, 125.0, 1_000, 1, 10.0).unwrap();
        assert_eq!(bricks.len(), 2);
        assert_eq!((bricks[0].open, bricks[0].close), (100.0, 110.0));
        assert_eq!((bricks[1].open, bricks[1].close), (110.0, 120.0));
        assert_eq!(bricks[0].time, 1_000);
        assert_eq!(bricks[1].time, 1_001);
        assert_eq!(state.last_boundary_high, 120.0);
        assert_eq!(state.last_boundary_low, 110.0);
        assert_eq!(state.last_emitted_time, 1_001);
    }

    #[test]
    fn test_walk_down_and_reversal() {
        let mut state = BrickState::from_price(100.0);
        let down = walk(&mut state, 79.0, 10, 0, 10.0).unwrap();
        assert_eq!(down.len(), 2);
        assert!(down.iter().all(|b| b.close < b.open));
        assert_eq!(state.direction, BrickDirection::Down);
        assert_eq!((state.last_boundary_high, state.last_boundary_low), (90.0, 80.0));

        // Reversal needs a full brick above the high boundary
        assert!(walk(&mut state, 99.0, 11, 0, 10.0).unwrap().is_empty());
        let up = walk(&mut state, 100.0, 11, 0, 10.0).unwrap();
        assert_eq!(up.len(), 1);
        assert_eq!((up[0].open, up[0].close), (90.0, 100.0));
    }

    #[test]
    fn test_walk_times_strictly_increase_within_same_second() {
        let mut state = BrickState::from_price(100.0);
        let a = walk(&mut state, 120.0, 50, 0, 10.0).unwrap();
        let b = walk(&mut state, 140.0, 50, 0, 10.0).unwrap();
        let times: Vec<i64> = a.iter().chain(b.iter()).map(|b| b.time).collect();
        assert_eq!(times, vec![50, 51, 52, 53]);
    }

    #[test]
    fn test_walk_rejects_bad_input() {
        let mut state = BrickState::from_price(100.0);
        let before = state;
        assert!(walk(&mut state, 200.0, 1, 0, 0.0).is_err());
        assert!(walk(&mut state, 200.0, 1, 0, f64::NAN).is_err());
        assert!(walk(&mut state, f64::INFINITY, 1, 0, 10.0).is_err());
        assert_eq!(state, before);
    }

    #[test]
    fn test_replay_matches_incremental() {
        let bars: Vec<Bar> = [100.0, 104.0, 112.0, 131.0, 118.0, 95.0, 97.0, 121.0]
            .iter()
            .enumerate()
            .map(|(i, c)| close_bar(i as i64 + 1, *c))
            .collect();

        let (replayed, replay_state) = convert(&bars, WalkOrigin::Replay, 10.0);

        let mut series = BrickSeries::new(Some(10.0), 5000);
        for (i, bar) in bars.iter().enumerate() {
            series.update(bar, &bars[..=i]);
        }
        assert_eq!(series.bricks(), replayed.as_slice());
        assert_eq!(series.state(), replay_state.as_ref());
    }

    #[test]
    fn test_brick_span_is_exact() {
        let bars: Vec<Bar> = (0..40)
            .map(|i| close_bar(i + 1, 100.0 + ((i as f64) * 0.9).sin() * 60.0))
            .collect();
        let (bricks, _) = convert(&bars, WalkOrigin::Replay, 5.0);
        assert!(!bricks.is_empty());
        for b in &bricks {
            assert!(((b.close - b.open).abs() - 5.0).abs() < 1e-9);
            assert!(b.is_valid());
        }
        for w in bricks.windows(2) {
            assert!(w[1].time > w[0].time);
        }
    }

    #[test]
    fn test_derive_brick_size() {
        // Too little history: ATR falls back to 50
        assert_eq!(derive_brick_size(&[close_bar(1, 100.0)]), 25.0);
        // Flat bars: ATR 0, floored to 1
        let flat: Vec<Bar> = (1..=20).map(|i| close_bar(i, 100.0)).collect();
        assert_eq!(derive_brick_size(&flat), 1.0);
    }

    #[test]
    fn test_resolve_brick_size_prefers_configured() {
        assert_eq!(resolve_brick_size(Some(7.5), &[]), 7.5);
        assert_eq!(resolve_brick_size(Some(-3.0), &[]), 25.0);
        assert_eq!(resolve_brick_size(None, &[]), 25.0);
    }

    #[test]
    fn test_first_update_only_seeds_state() {
        let mut series = BrickSeries::new(Some(10.0), 5000);
        let bar = close_bar(1, 100.0);
        assert!(series.update(&bar, &[bar]).is_empty());
        assert_eq!(series.state().unwrap().last_boundary_high, 100.0);
    }
}
