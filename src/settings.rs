use std::sync::Arc;

use error_stack::Report;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::model::{IndicatorKind, TimeFrame};
use crate::params::{Fingerprint, IndicatorParams, MAX_PERIOD, MIN_PERIOD};
use crate::store::ParameterStore;

const ACTIVE_INDICATOR_KEY: &str = "active_indicator";
const TIMEFRAME_KEY: &str = "timeframe";

fn key(kind: IndicatorKind, field: &str) -> String {
    format!("{}_{field}", kind.namespace())
}

struct State {
    params: IndicatorParams,
    fingerprint: u64,
}

/// Owner of the current indicator parameters and their fingerprint.
///
/// Every mutation bumps the fingerprint. Mutations hold the state lock for
/// their whole persist-then-load sequence, so a fetch dispatcher calling
/// [`current`](Self::current) can never observe a half-finished indicator
/// switch.
pub struct SettingsCoordinator {
    store: Arc<dyn ParameterStore>,
    state: Mutex<State>,
}

impl SettingsCoordinator {
    /// Load the active parameter set, seeded by `fallback` (normally the
    /// config file's indicator section) and overridden by whatever the
    /// store holds.
    pub async fn load(
        store: Arc<dyn ParameterStore>,
        fallback: IndicatorParams,
    ) -> Result<Self, Report<StoreError>> {
        let kind = store
            .get_string(ACTIVE_INDICATOR_KEY)
            .await?
            .and_then(|s| IndicatorKind::from_str(&s))
            .unwrap_or(fallback.kind);
        let timeframe = store
            .get_string(TIMEFRAME_KEY)
            .await?
            .and_then(|s| TimeFrame::from_str(&s))
            .unwrap_or(fallback.timeframe);

        let params = if kind == fallback.kind {
            load_for_kind(store.as_ref(), kind, timeframe, Some(fallback)).await?
        } else {
            load_for_kind(store.as_ref(), kind, timeframe, None).await?
        };

        info!(kind = %params.kind, period = params.period, timeframe = %params.timeframe, "settings loaded");
        Ok(Self {
            store,
            state: Mutex::new(State {
                params,
                fingerprint: 0,
            }),
        })
    }

    /// Snapshot the parameters and fingerprint active right now. Fetches
    /// carry this snapshot from dispatch to commit.
    pub async fn current(&self) -> (IndicatorParams, Fingerprint) {
        let state = self.state.lock().await;
        (state.params.clone(), Fingerprint(state.fingerprint))
    }

    /// Replace the active parameters (same indicator kind). Persists every
    /// field and bumps the fingerprint. Callers validate before committing.
    pub async fn update_params(
        &self,
        params: IndicatorParams,
    ) -> Result<Fingerprint, Report<StoreError>> {
        let mut state = self.state.lock().await;
        persist_params(self.store.as_ref(), &params).await?;
        self.store
            .set_string(ACTIVE_INDICATOR_KEY, params.kind.as_str())
            .await?;
        state.params = params;
        state.fingerprint += 1;
        Ok(Fingerprint(state.fingerprint))
    }

    /// Change the candle timeframe. Bumps the fingerprint: the formula
    /// changes for every cached entry.
    pub async fn set_timeframe(
        &self,
        timeframe: TimeFrame,
    ) -> Result<Fingerprint, Report<StoreError>> {
        let mut state = self.state.lock().await;
        self.store
            .set_string(TIMEFRAME_KEY, timeframe.as_str())
            .await?;
        state.params.timeframe = timeframe;
        state.fingerprint += 1;
        Ok(Fingerprint(state.fingerprint))
    }

    /// Switch the active indicator kind.
    ///
    /// Persist the outgoing kind's settings under its own namespace, then
    /// load the incoming kind's settings (defaults where absent or out of
    /// range), then bump the fingerprint. The lock is held throughout, so
    /// stale and fresh parameters can never mix in flight.
    pub async fn switch_indicator(
        &self,
        kind: IndicatorKind,
    ) -> Result<(IndicatorParams, Fingerprint), Report<StoreError>> {
        let mut state = self.state.lock().await;
        if state.params.kind == kind {
            return Ok((state.params.clone(), Fingerprint(state.fingerprint)));
        }

        persist_params(self.store.as_ref(), &state.params).await?;
        let params =
            load_for_kind(self.store.as_ref(), kind, state.params.timeframe, None).await?;
        self.store
            .set_string(ACTIVE_INDICATOR_KEY, kind.as_str())
            .await?;

        state.params = params.clone();
        state.fingerprint += 1;
        info!(kind = %kind, period = params.period, "indicator switched");
        Ok((params, Fingerprint(state.fingerprint)))
    }
}

async fn persist_params(
    store: &dyn ParameterStore,
    params: &IndicatorParams,
) -> Result<(), Report<StoreError>> {
    let kind = params.kind;
    store.set_i64(&key(kind, "period"), params.period as i64).await?;
    if let Some(d) = params.d_period {
        store.set_i64(&key(kind, "d_period"), d as i64).await?;
    }
    store
        .set_f64(&key(kind, "lower_level"), params.lower_level)
        .await?;
    store
        .set_f64(&key(kind, "upper_level"), params.upper_level)
        .await?;
    store
        .set_string(TIMEFRAME_KEY, params.timeframe.as_str())
        .await?;
    Ok(())
}

/// Assemble `kind`'s parameters from the store, field by field, starting
/// from `seed` (or the kind's defaults). Stored values that are absent or
/// out of range for `kind` are ignored; if the assembled set still fails
/// validation it is discarded wholesale in favor of the defaults.
async fn load_for_kind(
    store: &dyn ParameterStore,
    kind: IndicatorKind,
    timeframe: TimeFrame,
    seed: Option<IndicatorParams>,
) -> Result<IndicatorParams, Report<StoreError>> {
    let mut params = seed.unwrap_or_else(|| IndicatorParams::defaults(kind, timeframe));
    params.timeframe = timeframe;

    if let Some(period) = store.get_i64(&key(kind, "period")).await?
        && (MIN_PERIOD..=MAX_PERIOD).contains(&(period as usize))
    {
        params.period = period as usize;
    }
    if kind == IndicatorKind::Stochastic
        && let Some(d) = store.get_i64(&key(kind, "d_period")).await?
        && (MIN_PERIOD..=MAX_PERIOD).contains(&(d as usize))
    {
        params.d_period = Some(d as usize);
    }

    let (lo, hi) = IndicatorParams::level_bounds(kind);
    if let Some(level) = store.get_f64(&key(kind, "lower_level")).await?
        && (lo..=hi).contains(&level)
    {
        params.lower_level = level;
    }
    if let Some(level) = store.get_f64(&key(kind, "upper_level")).await?
        && (lo..=hi).contains(&level)
    {
        params.upper_level = level;
    }

    if params.validate().is_err() {
        debug!(kind = %kind, "stored settings invalid, using defaults");
        params = IndicatorParams::defaults(kind, timeframe);
    }
    Ok(params)
}
