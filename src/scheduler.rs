use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use error_stack::Report;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::cache::{SymbolCache, SymbolRecord};
use crate::error::QuoteError;
use crate::indicator::{IndicatorSeries, compute_series};
use crate::model::{Candle, TimeFrame};
use crate::params::{Fingerprint, IndicatorParams};
use crate::quote::CandleSource;
use crate::settings::SettingsCoordinator;
use crate::sort::SortEngine;

/// Extra candles requested past the warm-up so a full load fills the
/// display history.
const HISTORY_BUFFER: usize = 50;
/// Extra candles past the warm-up for value-only loads; enough for the
/// smoothing to settle for ordering purposes.
const VALUE_BUFFER: usize = 16;

/// Bounded fan-out for one load pass. The cap is backpressure protecting
/// the quote service, not a performance knob, so each pool also waits
/// `batch_delay` between batches independent of individual retries.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub concurrency: usize,
    pub batch_delay: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay after the `attempt`-th failure: base * 2^(attempt-1).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.pow(attempt.saturating_sub(1))
    }

    pub fn is_transient(report: &Report<QuoteError>) -> bool {
        report.current_context().is_transient()
    }
}

/// Translate a scroll position into the index range of visible items.
/// Decouples "load what is on screen" from any rendering framework.
pub fn compute_load_window(
    offset: usize,
    viewport: usize,
    item_size: usize,
    total: usize,
) -> Range<usize> {
    if item_size == 0 || total == 0 {
        return 0..0;
    }
    let start = (offset / item_size).min(total);
    let end = (offset + viewport).div_ceil(item_size).min(total);
    start..end
}

fn full_fetch_limit(period: usize, timeframe: TimeFrame) -> usize {
    (period + HISTORY_BUFFER).max(timeframe.fetch_floor())
}

fn value_fetch_limit(period: usize) -> usize {
    period + VALUE_BUFFER
}

/// Fetch + compute orchestration over the symbol lists.
///
/// Results commit independently as each symbol finishes; callers must
/// tolerate out-of-order, incremental arrival. Staleness is handled by the
/// fingerprint snapshot taken at dispatch and re-checked at commit.
pub struct BatchScheduler {
    source: Arc<dyn CandleSource>,
    cache: Arc<SymbolCache>,
    sort: Arc<SortEngine>,
    settings: Arc<SettingsCoordinator>,
    full_pool: PoolConfig,
    value_pool: PoolConfig,
    /// Global caps shared by every pass on the same pool, so concurrent
    /// sweeps cannot multiply the fan-out past the pool bound.
    full_slots: Semaphore,
    value_slots: Semaphore,
    retry: RetryPolicy,
}

impl BatchScheduler {
    pub fn new(
        source: Arc<dyn CandleSource>,
        cache: Arc<SymbolCache>,
        sort: Arc<SortEngine>,
        settings: Arc<SettingsCoordinator>,
        full_pool: PoolConfig,
        value_pool: PoolConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            source,
            cache,
            sort,
            settings,
            full_slots: Semaphore::new(full_pool.concurrency),
            value_slots: Semaphore::new(value_pool.concurrency),
            full_pool,
            value_pool,
            retry,
        }
    }

    /// Load full records for `symbols[range]`, skipping anything already
    /// loading or loaded under the current fingerprint.
    pub async fn load_range(&self, group: &str, symbols: &[String], range: Range<usize>) {
        let start = range.start.min(symbols.len());
        let end = range.end.min(symbols.len());
        if start >= end {
            return;
        }
        let (params, fingerprint) = self.settings.current().await;

        let to_load: Vec<&String> = symbols[start..end]
            .iter()
            .filter(|s| !self.cache.is_loading(s) && !self.cache.is_loaded_for(s, fingerprint))
            .collect();

        if to_load.is_empty() {
            return;
        }
        debug!(group, count = to_load.len(), "dispatching full loads");

        let mut chunks = to_load.chunks(self.full_pool.concurrency).peekable();
        while let Some(chunk) = chunks.next() {
            join_all(
                chunk
                    .iter()
                    .map(|symbol| self.load_full(group, symbol, &params, fingerprint)),
            )
            .await;
            if chunks.peek().is_some() {
                sleep(self.full_pool.batch_delay).await;
            }
        }
    }

    /// Refresh the sort snapshot for every symbol in the group. Runs on
    /// the value-only pool and never touches full-record load states.
    pub async fn refresh_values(&self, group: &str, symbols: &[String]) {
        let (params, fingerprint) = self.settings.current().await;
        debug!(group, count = symbols.len(), "dispatching value loads");

        let mut chunks = symbols.chunks(self.value_pool.concurrency).peekable();
        while let Some(chunk) = chunks.next() {
            join_all(
                chunk
                    .iter()
                    .map(|symbol| self.load_value(group, symbol, &params, fingerprint)),
            )
            .await;
            if chunks.peek().is_some() {
                sleep(self.value_pool.batch_delay).await;
            }
        }
    }

    async fn load_full(
        &self,
        group: &str,
        symbol: &str,
        params: &IndicatorParams,
        fingerprint: Fingerprint,
    ) {
        if !self.cache.mark_loading(symbol) {
            return;
        }
        let _slot = self.full_slots.acquire().await.expect("pool semaphore closed");

        let limit = full_fetch_limit(params.period, params.timeframe);
        let record = match self.fetch_with_retry(symbol, params.timeframe, limit).await {
            Ok(candles) => {
                let price = candles.last().map(|c| c.close);
                let series = self.compute(symbol, params, &candles);
                // Empty series (no candles, or fewer than period+1) is a
                // terminal "no data" outcome, not an error.
                SymbolRecord::from_series(series, price)
            }
            Err(e) => {
                warn!(symbol, error = ?e, "load failed, committing empty record (continuing)");
                SymbolRecord::no_data()
            }
        };

        self.commit_record(group, symbol, record, fingerprint).await;
    }

    async fn load_value(
        &self,
        group: &str,
        symbol: &str,
        params: &IndicatorParams,
        fingerprint: Fingerprint,
    ) {
        let _slot = self.value_slots.acquire().await.expect("pool semaphore closed");

        let limit = value_fetch_limit(params.period);
        match self.fetch_with_retry(symbol, params.timeframe, limit).await {
            Ok(candles) => {
                let series = self.compute(symbol, params, &candles);
                let Some(last) = series.primary.last() else {
                    debug!(symbol, "no value for sort snapshot");
                    return;
                };
                let (_, current) = self.settings.current().await;
                if current != fingerprint {
                    debug!(symbol, "parameters changed in flight, discarding value");
                    return;
                }
                self.sort.record_value(group, symbol, last.value);
            }
            Err(e) => {
                // Snapshot entry stays missing; the symbol sorts to the
                // worst end instead of blocking the pass.
                warn!(symbol, error = ?e, "value load failed (continuing)");
            }
        }
    }

    fn compute(&self, symbol: &str, params: &IndicatorParams, candles: &[Candle]) -> IndicatorSeries {
        match compute_series(params, candles) {
            Ok(series) => series,
            Err(e) => {
                warn!(symbol, error = ?e, "indicator computation failed");
                IndicatorSeries::default()
            }
        }
    }

    /// Commit under the dispatched fingerprint, unless the parameters have
    /// changed since dispatch, in which case the result is discarded so a
    /// stale computation can never overwrite fresher cache state.
    async fn commit_record(
        &self,
        group: &str,
        symbol: &str,
        record: SymbolRecord,
        fingerprint: Fingerprint,
    ) {
        let (_, current) = self.settings.current().await;
        if current != fingerprint {
            debug!(symbol, "parameters changed in flight, discarding record");
            self.cache.clear_loading(symbol);
            return;
        }
        if let Some(value) = record.current_value {
            self.sort.record_value(group, symbol, value);
        }
        self.cache.put(symbol, record, fingerprint);
    }

    async fn fetch_with_retry(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        limit: usize,
    ) -> Result<Vec<Candle>, Report<QuoteError>> {
        let mut attempt = 1;
        loop {
            let err = match self.source.fetch_candles(symbol, timeframe, limit).await {
                Ok(candles) => return Ok(candles),
                Err(e) => e,
            };
            if !RetryPolicy::is_transient(&err) {
                return Err(err);
            }

            let delay = self.retry.backoff(attempt);
            warn!(
                symbol,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "transient fetch failure"
            );
            sleep(delay).await;

            if attempt >= self.retry.max_attempts {
                return Err(err);
            }
            attempt += 1;
        }
    }
}
