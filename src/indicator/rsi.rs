use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::{Indicator, IndicatorSeries, close_prices};
use crate::model::{Candle, IndicatorPoint};
use crate::params::{MAX_PERIOD, MIN_PERIOD};

/// RSI (Relative Strength Index) using Wilder's smoothing method.
pub struct Rsi {
    period: usize,
}

impl Rsi {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        if !(MIN_PERIOD..=MAX_PERIOD).contains(&period) {
            bail!(IndicatorError::InvalidParameter {
                name: format!("rsi period {period} outside [{MIN_PERIOD},{MAX_PERIOD}]"),
            });
        }
        Ok(Self { period })
    }
}

impl Indicator for Rsi {
    fn name(&self) -> &str {
        "rsi"
    }

    fn required_candles(&self) -> usize {
        self.period + 1
    }

    fn compute(&self, candles: &[Candle]) -> IndicatorSeries {
        let prices = close_prices(candles);
        if prices.len() < self.required_candles() {
            return IndicatorSeries::default();
        }

        let deltas: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();

        // Seed using simple average of first `period` gains/losses
        let mut avg_gain: f64 = deltas[..self.period]
            .iter()
            .map(|&d| d.max(0.0))
            .sum::<f64>()
            / self.period as f64;
        let mut avg_loss: f64 = deltas[..self.period]
            .iter()
            .map(|&d| (-d).max(0.0))
            .sum::<f64>()
            / self.period as f64;

        let mut primary = vec![IndicatorPoint {
            value: rsi_value(avg_gain, avg_loss),
            time: candles[self.period].open_time,
        }];

        // Wilder smoothing for subsequent values
        for (i, &delta) in deltas.iter().enumerate().skip(self.period) {
            let gain = delta.max(0.0);
            let loss = (-delta).max(0.0);
            avg_gain = (avg_gain * (self.period - 1) as f64 + gain) / self.period as f64;
            avg_loss = (avg_loss * (self.period - 1) as f64 + loss) / self.period as f64;
            primary.push(IndicatorPoint {
                value: rsi_value(avg_gain, avg_loss),
                time: candles[i + 1].open_time,
            });
        }

        IndicatorSeries {
            primary,
            signal: None,
        }
    }
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    (100.0 - 100.0 / (1.0 + rs)).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::test_support::candles_from_closes;

    #[test]
    fn rsi_insufficient_data_yields_empty_series() {
        let rsi = Rsi::new(14).unwrap();
        let candles = candles_from_closes(&[1.0; 10]);
        assert!(rsi.compute(&candles).is_empty());
    }

    #[test]
    fn rsi_period_zero_invalid() {
        assert!(Rsi::new(0).is_err());
    }

    #[test]
    fn rsi_period_above_limit_invalid() {
        assert!(Rsi::new(101).is_err());
        assert!(Rsi::new(100).is_ok());
    }

    #[test]
    fn rsi_all_gains_returns_100_everywhere() {
        let rsi = Rsi::new(3).unwrap();
        let candles = candles_from_closes(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let series = rsi.compute(&candles);
        assert!(!series.is_empty());
        for p in &series.primary {
            assert_eq!(p.value, 100.0);
        }
    }

    #[test]
    fn rsi_all_losses_returns_0_everywhere() {
        let rsi = Rsi::new(3).unwrap();
        let candles = candles_from_closes(&[6.0, 5.0, 4.0, 3.0, 2.0, 1.0]);
        let series = rsi.compute(&candles);
        assert!(!series.is_empty());
        for p in &series.primary {
            assert!(p.value.abs() < 1e-9);
        }
    }

    #[test]
    fn rsi_bounded_for_mixed_series() {
        let rsi = Rsi::new(5).unwrap();
        let closes: Vec<f64> = (0..40)
            .map(|i| 100.0 + ((i * 7) % 13) as f64 - 6.0)
            .collect();
        let series = rsi.compute(&candles_from_closes(&closes));
        for p in &series.primary {
            assert!((0.0..=100.0).contains(&p.value), "value {}", p.value);
        }
    }

    #[test]
    fn rsi_output_length_and_alignment() {
        let rsi = Rsi::new(14).unwrap();
        let candles = candles_from_closes(&[100.0_f64; 20]);
        let series = rsi.compute(&candles);
        // 20 prices -> 19 deltas -> 1 seed + 5 subsequent = 6 values
        assert_eq!(series.primary.len(), 20 - 14);
        assert_eq!(series.primary[0].time, candles[14].open_time);
        assert_eq!(series.primary.last().unwrap().time, candles[19].open_time);
    }

    #[test]
    fn rsi_matches_hand_computed_wilder_reference() {
        // All deltas are +-1, so the smoothed gain+loss sum stays at 1 and
        // RSI_t = 100 * avg_gain_t, which makes the reference tractable by
        // hand: g_0 = 8/14, g_t = (13*g_{t-1} + gain_t)/14.
        let closes = [
            44.0, 45.0, 46.0, 45.0, 44.0, 45.0, 46.0, 47.0, 46.0, 45.0, 46.0, 47.0, 48.0, 47.0,
            46.0, 47.0, 48.0, 49.0, 48.0, 47.0,
        ];
        let expected = [
            57.142857142857146,
            60.20408163265306,
            63.04664723032069,
            65.68617242815492,
            60.99430296900099,
            56.63756704264378,
        ];
        let rsi = Rsi::new(14).unwrap();
        let series = rsi.compute(&candles_from_closes(&closes));
        assert_eq!(series.primary.len(), expected.len());
        for (p, want) in series.primary.iter().zip(expected) {
            assert!((p.value - want).abs() < 1e-6, "got {} want {want}", p.value);
        }
    }
}
