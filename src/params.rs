use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::model::{IndicatorKind, TimeFrame};

pub const MIN_PERIOD: usize = 1;
pub const MAX_PERIOD: usize = 100;

/// The complete parameter set an indicator computation depends on.
///
/// Every field participates in the cache fingerprint: changing any of them
/// redefines the formula for every cached entry, so the engine invalidates
/// wholesale rather than per symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorParams {
    pub kind: IndicatorKind,
    pub period: usize,
    /// %D smoothing length; `Some` only for `Stochastic`.
    pub d_period: Option<usize>,
    pub lower_level: f64,
    pub upper_level: f64,
    pub timeframe: TimeFrame,
}

impl IndicatorParams {
    /// The conventional defaults for each indicator family.
    pub fn defaults(kind: IndicatorKind, timeframe: TimeFrame) -> Self {
        match kind {
            IndicatorKind::Rsi => Self {
                kind,
                period: 14,
                d_period: None,
                lower_level: 30.0,
                upper_level: 70.0,
                timeframe,
            },
            IndicatorKind::Stochastic => Self {
                kind,
                period: 14,
                d_period: Some(3),
                lower_level: 20.0,
                upper_level: 80.0,
                timeframe,
            },
            IndicatorKind::WilliamsR => Self {
                kind,
                period: 14,
                d_period: None,
                lower_level: -80.0,
                upper_level: -20.0,
                timeframe,
            },
        }
    }

    /// Inclusive level bounds for this indicator family.
    pub fn level_bounds(kind: IndicatorKind) -> (f64, f64) {
        match kind {
            IndicatorKind::WilliamsR => (-100.0, 0.0),
            _ => (0.0, 100.0),
        }
    }

    /// Validate ranges and invariants. Must pass before the params are
    /// committed to the settings coordinator.
    pub fn validate(&self) -> Result<(), Report<IndicatorError>> {
        if !(MIN_PERIOD..=MAX_PERIOD).contains(&self.period) {
            bail!(IndicatorError::InvalidParameter {
                name: format!("period {} outside [{MIN_PERIOD},{MAX_PERIOD}]", self.period),
            });
        }
        match (self.kind, self.d_period) {
            (IndicatorKind::Stochastic, Some(d)) if !(MIN_PERIOD..=MAX_PERIOD).contains(&d) => {
                bail!(IndicatorError::InvalidParameter {
                    name: format!("d_period {d} outside [{MIN_PERIOD},{MAX_PERIOD}]"),
                });
            }
            (IndicatorKind::Stochastic, None) => {
                bail!(IndicatorError::InvalidParameter {
                    name: "stochastic requires d_period".into(),
                });
            }
            (IndicatorKind::Rsi | IndicatorKind::WilliamsR, Some(_)) => {
                bail!(IndicatorError::InvalidParameter {
                    name: format!("{} does not take d_period", self.kind),
                });
            }
            _ => {}
        }

        let (lo, hi) = Self::level_bounds(self.kind);
        for (name, level) in [("lower_level", self.lower_level), ("upper_level", self.upper_level)] {
            if !(lo..=hi).contains(&level) {
                bail!(IndicatorError::InvalidParameter {
                    name: format!("{name} {level} outside [{lo},{hi}] for {}", self.kind),
                });
            }
        }
        if self.lower_level >= self.upper_level {
            bail!(IndicatorError::InvalidParameter {
                name: format!(
                    "lower_level {} must be below upper_level {}",
                    self.lower_level, self.upper_level
                ),
            });
        }
        Ok(())
    }
}

/// Parameter-generation tag carried by every dispatched fetch.
///
/// A completion whose fingerprint no longer matches the current settings is
/// discarded instead of committed, so stale results can never overwrite
/// fresher cache state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub u64);
