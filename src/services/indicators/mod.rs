//! Technical overlay implementations.
//!
//! Every overlay is a pure function of the series it is given. Results are
//! recomputed in full on each update and aligned with the series tail.

pub mod atr;
pub mod bollinger;
pub mod donchian;
pub mod ema;
pub mod rsi;
pub mod sma;

pub use atr::Atr;
pub use bollinger::BollingerBands;
pub use donchian::DonchianChannel;
pub use ema::Ema;
pub use rsi::Rsi;
pub use sma::Sma;

use crate::error::{AppError, Result};
use crate::types::{Bar, IndicatorKind, NamedOverlay, OverlayPoint, OverlayResult, OverlaySpec};
use tracing::{debug, warn};

/// Trait for implementing overlays.
pub trait Indicator: Send + Sync {
    /// Which overlay this is.
    fn kind(&self) -> IndicatorKind;

    /// Lookback period.
    fn period(&self) -> usize;

    /// Minimum number of bars required for calculation.
    fn min_periods(&self) -> usize;

    /// Calculate the overlay over a whole series.
    fn compute(&self, bars: &[Bar]) -> Result<OverlayResult>;
}

/// Reject a zero period or a series shorter than `min_periods`.
pub(crate) fn require_bars<I: Indicator + ?Sized>(indicator: &I, bars: &[Bar]) -> Result<()> {
    if indicator.period() == 0 {
        return Err(AppError::BadRequest(format!(
            "{} period must be positive",
            indicator.kind()
        )));
    }
    if bars.len() < indicator.min_periods() {
        return Err(AppError::InsufficientData {
            required: indicator.min_periods(),
            got: bars.len(),
        });
    }
    Ok(())
}

/// Build the overlay for a kind and period.
pub fn build(kind: IndicatorKind, period: usize) -> Box<dyn Indicator> {
    match kind {
        IndicatorKind::Sma => Box::new(Sma::new(period)),
        IndicatorKind::Ema => Box::new(Ema::new(period)),
        IndicatorKind::Rsi => Box::new(Rsi::new(period)),
        IndicatorKind::Bollinger => Box::new(BollingerBands::new(period, 2.0)),
        IndicatorKind::Donchian => Box::new(DonchianChannel::new(period)),
        IndicatorKind::Atr => Box::new(Atr::new(period)),
    }
}

/// Compute one overlay over `series`.
pub fn compute(kind: IndicatorKind, series: &[Bar], period: usize) -> Result<OverlayResult> {
    build(kind, period).compute(series)
}

struct OverlaySlot {
    spec: OverlaySpec,
    indicator: Box<dyn Indicator>,
    result: Option<OverlayResult>,
}

/// The active overlays of a pipeline and their latest results.
pub struct OverlaySet {
    slots: Vec<OverlaySlot>,
}

impl OverlaySet {
    pub fn new(specs: &[OverlaySpec]) -> Self {
        let slots = specs
            .iter()
            .map(|spec| OverlaySlot {
                spec: *spec,
                indicator: build(spec.kind, spec.period),
                result: None,
            })
            .collect();
        Self { slots }
    }

    /// Recompute every overlay over `series` and return the last point of each.
    ///
    /// A failing overlay loses its result but never blocks the others.
    pub fn refresh(&mut self, series: &[Bar]) -> Vec<OverlayPoint> {
        let Some(last_bar) = series.last() else {
            for slot in &mut self.slots {
                slot.result = None;
            }
            return Vec::new();
        };

        let mut points = Vec::with_capacity(self.slots.len());
        for slot in &mut self.slots {
            match slot.indicator.compute(series) {
                Ok(result) => {
                    if let Some(value) = result.last() {
                        points.push(OverlayPoint {
                            id: slot.spec.id(),
                            time: last_bar.time,
                            value,
                        });
                    }
                    slot.result = Some(result);
                }
                Err(AppError::InsufficientData { required, got }) => {
                    debug!("{} needs {} bars, have {}", slot.spec.id(), required, got);
                    slot.result = None;
                }
                Err(e) => {
                    warn!("Overlay {} failed: {}", slot.spec.id(), e);
                    slot.result = None;
                }
            }
        }
        points
    }

    /// Latest result of the first overlay of `kind`.
    pub fn result_for(&self, kind: IndicatorKind) -> Option<&OverlayResult> {
        self.slots
            .iter()
            .find(|slot| slot.spec.kind == kind)
            .and_then(|slot| slot.result.as_ref())
    }

    /// All overlays that currently have a result.
    pub fn named(&self) -> Vec<NamedOverlay> {
        self.slots
            .iter()
            .filter_map(|slot| {
                slot.result.as_ref().map(|result| NamedOverlay {
                    id: slot.spec.id(),
                    result: result.clone(),
                })
            })
            .collect()
    }

    pub fn specs(&self) -> Vec<OverlaySpec> {
        self.slots.iter().map(|slot| slot.spec).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Rising closes, each bar spanning 3.0 with a 1.5 step.
    pub fn uptrend(count: usize) -> Vec<Bar> {
        (0..count)
            .map(|i| {
                let close = 100.0 + i as f64 * 1.5;
                Bar {
                    time: 1_700_000_000 + i as i64 * 60,
                    open: close - 0.5,
                    high: close + 1.0,
                    low: close - 2.0,
                    close,
                    volume: 10,
                }
            })
            .collect()
    }

    #[test]
    fn test_compute_every_kind() {
        let bars = uptrend(60);
        for kind in IndicatorKind::ALL {
            let result = compute(kind, &bars, kind.default_period()).unwrap();
            assert!(!result.is_empty(), "{} produced nothing", kind);
            assert!(result.len() <= bars.len());
            assert_eq!(kind.is_channel(), matches!(result, OverlayResult::Band { .. }));
        }
    }

    #[test]
    fn test_zero_period_is_rejected() {
        let bars = uptrend(10);
        assert!(matches!(compute(IndicatorKind::Sma, &bars, 0), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_overlay_set_isolates_failures() {
        let specs = vec![
            OverlaySpec::new(IndicatorKind::Sma, 5),
            OverlaySpec::new(IndicatorKind::Donchian, 50),
            OverlaySpec::new(IndicatorKind::Ema, 3),
        ];
        let mut set = OverlaySet::new(&specs);
        let bars = uptrend(10);
        let points = set.refresh(&bars);

        let ids: Vec<String> = points.iter().map(|p| p.id.clone()).collect();
        assert_eq!(ids, vec!["sma:5".to_string(), "ema:3".to_string()]);
        assert!(points.iter().all(|p| p.time == bars[9].time));
        assert!(set.result_for(IndicatorKind::Donchian).is_none());
        assert_eq!(set.named().len(), 2);
    }

    #[test]
    fn test_overlay_set_empty_series() {
        let mut set = OverlaySet::new(&[OverlaySpec::new(IndicatorKind::Sma, 2)]);
        set.refresh(&uptrend(5));
        assert!(set.refresh(&[]).is_empty());
        assert!(set.named().is_empty());
    }
}
