use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::{Indicator, IndicatorSeries};
use crate::model::{Candle, IndicatorPoint};
use crate::params::{MAX_PERIOD, MIN_PERIOD};

/// %K value emitted when the window has no range (highest high equals
/// lowest low). The midpoint keeps the function total without inventing a
/// previous value to carry forward.
pub const FLAT_WINDOW_K: f64 = 50.0;

/// Stochastic oscillator: fast %K over a rolling window plus a %D signal
/// line (simple moving average of %K).
pub struct Stochastic {
    period: usize,
    d_period: usize,
}

impl Stochastic {
    pub fn new(period: usize, d_period: usize) -> Result<Self, Report<IndicatorError>> {
        if !(MIN_PERIOD..=MAX_PERIOD).contains(&period) {
            bail!(IndicatorError::InvalidParameter {
                name: format!("stochastic period {period} outside [{MIN_PERIOD},{MAX_PERIOD}]"),
            });
        }
        if !(MIN_PERIOD..=MAX_PERIOD).contains(&d_period) {
            bail!(IndicatorError::InvalidParameter {
                name: format!("stochastic d_period {d_period} outside [{MIN_PERIOD},{MAX_PERIOD}]"),
            });
        }
        Ok(Self { period, d_period })
    }
}

impl Indicator for Stochastic {
    fn name(&self) -> &str {
        "stochastic"
    }

    fn required_candles(&self) -> usize {
        self.period + 1
    }

    fn compute(&self, candles: &[Candle]) -> IndicatorSeries {
        if candles.len() < self.required_candles() {
            return IndicatorSeries {
                primary: Vec::new(),
                signal: Some(Vec::new()),
            };
        }

        let primary: Vec<IndicatorPoint> = candles
            .windows(self.period)
            .map(|w| {
                let last = w.last().unwrap();
                IndicatorPoint {
                    value: percent_k(w, last.close),
                    time: last.open_time,
                }
            })
            .collect();

        // %D: SMA of %K, aligned to the last %K bar of each window
        let signal: Vec<IndicatorPoint> = if primary.len() >= self.d_period {
            primary
                .windows(self.d_period)
                .map(|w| IndicatorPoint {
                    value: w.iter().map(|p| p.value).sum::<f64>() / self.d_period as f64,
                    time: w.last().unwrap().time,
                })
                .collect()
        } else {
            Vec::new()
        };

        IndicatorSeries {
            primary,
            signal: Some(signal),
        }
    }
}

fn percent_k(window: &[Candle], close: f64) -> f64 {
    let highest = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let lowest = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    if highest == lowest {
        return FLAT_WINDOW_K;
    }
    (100.0 * (close - lowest) / (highest - lowest)).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::test_support::{candles_from_closes, candles_from_hlc};

    #[test]
    fn stochastic_insufficient_data_yields_empty_series() {
        let stoch = Stochastic::new(14, 3).unwrap();
        let candles = candles_from_closes(&[1.0; 14]);
        assert!(stoch.compute(&candles).is_empty());
    }

    #[test]
    fn stochastic_invalid_periods_rejected() {
        assert!(Stochastic::new(0, 3).is_err());
        assert!(Stochastic::new(14, 0).is_err());
        assert!(Stochastic::new(101, 3).is_err());
        assert!(Stochastic::new(14, 101).is_err());
    }

    #[test]
    fn stochastic_known_values() {
        let stoch = Stochastic::new(3, 3).unwrap();
        let candles = candles_from_hlc(&[
            (10.0, 8.0, 9.0),
            (11.0, 9.0, 10.0),
            (12.0, 10.0, 11.0),
            (12.0, 8.0, 10.0),
            (13.0, 11.0, 12.0),
        ]);
        let series = stoch.compute(&candles);
        let k: Vec<f64> = series.primary.iter().map(|p| p.value).collect();
        assert_eq!(k.len(), 3);
        assert!((k[0] - 75.0).abs() < 1e-9);
        assert!((k[1] - 50.0).abs() < 1e-9);
        assert!((k[2] - 80.0).abs() < 1e-9);

        let d = series.signal.unwrap();
        assert_eq!(d.len(), 1);
        assert!((d[0].value - (75.0 + 50.0 + 80.0) / 3.0).abs() < 1e-9);
        assert_eq!(d[0].time, series.primary[2].time);
    }

    #[test]
    fn stochastic_k_bounded() {
        let stoch = Stochastic::new(5, 3).unwrap();
        let bars: Vec<(f64, f64, f64)> = (0..30)
            .map(|i| {
                let base = 100.0 + ((i * 11) % 17) as f64;
                (base + 2.0, base - 2.0, base + ((i % 5) as f64 - 2.0))
            })
            .collect();
        let series = stoch.compute(&candles_from_hlc(&bars));
        for p in &series.primary {
            assert!((0.0..=100.0).contains(&p.value), "value {}", p.value);
            assert!(p.value.is_finite());
        }
    }

    #[test]
    fn stochastic_flat_window_emits_midpoint() {
        let stoch = Stochastic::new(3, 3).unwrap();
        let candles = candles_from_closes(&[10.0; 8]);
        let series = stoch.compute(&candles);
        assert!(!series.is_empty());
        for p in &series.primary {
            assert_eq!(p.value, FLAT_WINDOW_K);
            assert!(p.value.is_finite());
        }
        for p in series.signal.unwrap() {
            assert_eq!(p.value, FLAT_WINDOW_K);
        }
    }

    #[test]
    fn stochastic_signal_empty_when_too_few_k_values() {
        let stoch = Stochastic::new(3, 10).unwrap();
        let candles = candles_from_closes(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let series = stoch.compute(&candles);
        assert!(!series.primary.is_empty());
        assert!(series.signal.unwrap().is_empty());
    }
}
