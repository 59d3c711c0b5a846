use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::{Indicator, IndicatorSeries};
use crate::model::{Candle, IndicatorPoint};
use crate::params::{MAX_PERIOD, MIN_PERIOD};

/// %R value emitted when the window has no range; midpoint of [-100, 0],
/// mirroring the Stochastic flat-window policy.
pub const FLAT_WINDOW_R: f64 = -50.0;

/// Williams %R: the inverted position of the close within the rolling
/// high/low range, in [-100, 0].
pub struct WilliamsR {
    period: usize,
}

impl WilliamsR {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        if !(MIN_PERIOD..=MAX_PERIOD).contains(&period) {
            bail!(IndicatorError::InvalidParameter {
                name: format!("williams %r period {period} outside [{MIN_PERIOD},{MAX_PERIOD}]"),
            });
        }
        Ok(Self { period })
    }
}

impl Indicator for WilliamsR {
    fn name(&self) -> &str {
        "williams_r"
    }

    fn required_candles(&self) -> usize {
        self.period + 1
    }

    fn compute(&self, candles: &[Candle]) -> IndicatorSeries {
        if candles.len() < self.required_candles() {
            return IndicatorSeries::default();
        }

        let primary = candles
            .windows(self.period)
            .map(|w| {
                let last = w.last().unwrap();
                IndicatorPoint {
                    value: percent_r(w, last.close),
                    time: last.open_time,
                }
            })
            .collect();

        IndicatorSeries {
            primary,
            signal: None,
        }
    }
}

fn percent_r(window: &[Candle], close: f64) -> f64 {
    let highest = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let lowest = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    if highest == lowest {
        return FLAT_WINDOW_R;
    }
    (-100.0 * (highest - close) / (highest - lowest)).clamp(-100.0, 0.0)
}
