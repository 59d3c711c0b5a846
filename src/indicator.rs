pub mod rsi;
pub mod stochastic;
pub mod williams;

use error_stack::Report;

use crate::error::IndicatorError;
use crate::model::{Candle, IndicatorPoint};
use crate::params::IndicatorParams;

/// Output of one indicator computation.
///
/// `primary` is the series the cache, sorting and level checks run on
/// (RSI, %K, %R). `signal` is only populated by Stochastic (%D).
#[derive(Debug, Clone, Default)]
pub struct IndicatorSeries {
    pub primary: Vec<IndicatorPoint>,
    pub signal: Option<Vec<IndicatorPoint>>,
}

impl IndicatorSeries {
    pub fn is_empty(&self) -> bool {
        self.primary.is_empty()
    }
}

/// A technical analysis indicator operating on a slice of candles.
///
/// Candles must be in ascending chronological order (oldest first).
/// Computation is pure and total: fewer than `required_candles` inputs
/// yields an empty series, never an error or a panic.
pub trait Indicator: Send {
    /// Unique name of this indicator (e.g., "rsi").
    #[allow(dead_code)]
    fn name(&self) -> &str;

    /// Minimum number of candles required to produce at least one value.
    fn required_candles(&self) -> usize;

    fn compute(&self, candles: &[Candle]) -> IndicatorSeries;
}

/// Build the indicator described by `params`.
pub fn build_indicator(
    params: &IndicatorParams,
) -> Result<Box<dyn Indicator>, Report<IndicatorError>> {
    use crate::model::IndicatorKind;

    match params.kind {
        IndicatorKind::Rsi => rsi::Rsi::new(params.period).map(|i| Box::new(i) as Box<dyn Indicator>),
        IndicatorKind::Stochastic => {
            stochastic::Stochastic::new(params.period, params.d_period.unwrap_or(3))
                .map(|i| Box::new(i) as Box<dyn Indicator>)
        }
        IndicatorKind::WilliamsR => williams::WilliamsR::new(params.period)
            .map(|i| Box::new(i) as Box<dyn Indicator>),
    }
}

/// Compute the indicator series `params` describes over `candles`.
pub fn compute_series(
    params: &IndicatorParams,
    candles: &[Candle],
) -> Result<IndicatorSeries, Report<IndicatorError>> {
    Ok(build_indicator(params)?.compute(candles))
}

/// Extract close prices from a slice of candles.
pub fn close_prices(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{TimeZone, Utc};

    use crate::model::{Candle, TimeFrame};

    /// Build flat candles (high = low = close) from close prices.
    pub fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
        candles_from_hlc(&closes.iter().map(|&c| (c, c, c)).collect::<Vec<_>>())
    }

    /// Build candles from (high, low, close) triples, one minute apart.
    pub fn candles_from_hlc(bars: &[(f64, f64, f64)]) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        bars.iter()
            .enumerate()
            .map(|(i, &(high, low, close))| Candle {
                symbol: "TEST".into(),
                timeframe: TimeFrame::Min1,
                open_time: start + chrono::Duration::minutes(i as i64),
                open: close,
                high,
                low,
                close,
            })
            .collect()
    }
}
