use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::indicator::IndicatorSeries;
use crate::model::IndicatorPoint;
use crate::params::Fingerprint;

/// Display history kept per symbol; older points are dropped on commit.
pub const HISTORY_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Unloaded,
    Loading,
    Loaded,
}

/// The cached computation result for one symbol.
///
/// Replaced wholesale on every recompute, never partially mutated. A record
/// with no `current_value` is the explicit terminal "no data" state, so
/// consumers render deterministically instead of waiting forever.
#[derive(Debug, Clone, Default)]
pub struct SymbolRecord {
    pub current_value: Option<f64>,
    pub previous_value: Option<f64>,
    pub history: Vec<IndicatorPoint>,
    /// Stochastic %D line; `None` for single-line indicators.
    pub signal_history: Option<Vec<IndicatorPoint>>,
    pub price: Option<f64>,
}

impl SymbolRecord {
    /// Terminal record for a symbol that produced no computable data.
    pub fn no_data() -> Self {
        Self::default()
    }

    /// Build a record from a computed series, truncating display history
    /// to the last [`HISTORY_LIMIT`] points.
    pub fn from_series(series: IndicatorSeries, price: Option<f64>) -> Self {
        let current_value = series.primary.last().map(|p| p.value);
        let previous_value = series
            .primary
            .len()
            .checked_sub(2)
            .map(|i| series.primary[i].value);
        Self {
            current_value,
            previous_value,
            history: truncate(series.primary),
            signal_history: series.signal.map(truncate),
            price,
        }
    }

    pub fn has_data(&self) -> bool {
        self.current_value.is_some()
    }
}

fn truncate(mut points: Vec<IndicatorPoint>) -> Vec<IndicatorPoint> {
    if points.len() > HISTORY_LIMIT {
        points.drain(..points.len() - HISTORY_LIMIT);
    }
    points
}

#[derive(Default)]
struct Inner {
    records: HashMap<String, (SymbolRecord, Fingerprint)>,
    loading: HashSet<String>,
}

/// Per-symbol result store plus load-state tracking.
///
/// The maps behind the mutex are the engine's only shared mutable state;
/// scheduler tasks commit through here concurrently. The lock is never held
/// across an await.
#[derive(Default)]
pub struct SymbolCache {
    inner: Mutex<Inner>,
}

impl SymbolCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, symbol: &str) -> Option<SymbolRecord> {
        let inner = self.inner.lock().unwrap();
        inner.records.get(symbol).map(|(r, _)| r.clone())
    }

    /// Commit a record computed under `fingerprint`, clearing the loading
    /// mark. The caller has already verified the fingerprint is current.
    pub fn put(&self, symbol: &str, record: SymbolRecord, fingerprint: Fingerprint) {
        let mut inner = self.inner.lock().unwrap();
        inner.loading.remove(symbol);
        inner.records.insert(symbol.to_owned(), (record, fingerprint));
    }

    /// Full clear. The only invalidation exposed: a parameter change
    /// redefines the formula for every entry, so selective invalidation is
    /// never correct.
    pub fn invalidate_all(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.records.clear();
        inner.loading.clear();
    }

    /// Mark a symbol in flight. Returns `false` if it was already loading.
    /// Evicts any stale record so a symbol is never `Loading` and `Loaded`
    /// at once.
    pub fn mark_loading(&self, symbol: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if !inner.loading.insert(symbol.to_owned()) {
            return false;
        }
        inner.records.remove(symbol);
        true
    }

    /// Abandon an in-flight load without committing (stale fingerprint).
    pub fn clear_loading(&self, symbol: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.loading.remove(symbol);
    }

    pub fn state(&self, symbol: &str) -> LoadState {
        let inner = self.inner.lock().unwrap();
        if inner.loading.contains(symbol) {
            LoadState::Loading
        } else if inner.records.contains_key(symbol) {
            LoadState::Loaded
        } else {
            LoadState::Unloaded
        }
    }

    pub fn is_loading(&self, symbol: &str) -> bool {
        self.state(symbol) == LoadState::Loading
    }

    pub fn is_loaded_for(&self, symbol: &str, fingerprint: Fingerprint) -> bool {
        let inner = self.inner.lock().unwrap();
        inner
            .records
            .get(symbol)
            .is_some_and(|(_, fp)| *fp == fingerprint)
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn points(values: &[f64]) -> Vec<IndicatorPoint> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, &value)| IndicatorPoint {
                value,
                time: start + chrono::Duration::minutes(i as i64),
            })
            .collect()
    }

    #[test]
    fn record_from_series_picks_current_and_previous() {
        let series = IndicatorSeries {
            primary: points(&[10.0, 20.0, 30.0]),
            signal: None,
        };
        let record = SymbolRecord::from_series(series, Some(99.5));
        assert_eq!(record.current_value, Some(30.0));
        assert_eq!(record.previous_value, Some(20.0));
        assert_eq!(record.price, Some(99.5));
        assert!(record.has_data());
    }

    #[test]
    fn record_from_single_point_has_no_previous() {
        let series = IndicatorSeries {
            primary: points(&[42.0]),
            signal: None,
        };
        let record = SymbolRecord::from_series(series, None);
        assert_eq!(record.current_value, Some(42.0));
        assert_eq!(record.previous_value, None);
    }

    #[test]
    fn record_history_truncated_to_limit() {
        let values: Vec<f64> = (0..120).map(|i| i as f64).collect();
        let series = IndicatorSeries {
            primary: points(&values),
            signal: Some(points(&values)),
        };
        let record = SymbolRecord::from_series(series, None);
        assert_eq!(record.history.len(), HISTORY_LIMIT);
        assert_eq!(record.signal_history.as_ref().unwrap().len(), HISTORY_LIMIT);
        // Keeps the most recent points
        assert_eq!(record.history.last().unwrap().value, 119.0);
        assert_eq!(record.history[0].value, 70.0);
        // Current value survives truncation untouched
        assert_eq!(record.current_value, Some(119.0));
    }

    #[test]
    fn no_data_record_is_visible_but_empty() {
        let record = SymbolRecord::no_data();
        assert!(!record.has_data());
        assert!(record.history.is_empty());
    }

    #[test]
    fn load_state_transitions() {
        let cache = SymbolCache::new();
        let fp = Fingerprint(1);
        assert_eq!(cache.state("AAA"), LoadState::Unloaded);

        assert!(cache.mark_loading("AAA"));
        assert_eq!(cache.state("AAA"), LoadState::Loading);
        // Second mark is refused while in flight
        assert!(!cache.mark_loading("AAA"));

        cache.put("AAA", SymbolRecord::no_data(), fp);
        assert_eq!(cache.state("AAA"), LoadState::Loaded);
        assert!(!cache.is_loading("AAA"));
        assert!(cache.is_loaded_for("AAA", fp));
        assert!(!cache.is_loaded_for("AAA", Fingerprint(2)));
    }

    #[test]
    fn clear_loading_returns_to_unloaded() {
        let cache = SymbolCache::new();
        cache.mark_loading("AAA");
        cache.clear_loading("AAA");
        assert_eq!(cache.state("AAA"), LoadState::Unloaded);
    }

    #[test]
    fn mark_loading_evicts_stale_record() {
        let cache = SymbolCache::new();
        cache.put("AAA", SymbolRecord::no_data(), Fingerprint(1));
        assert!(cache.mark_loading("AAA"));
        // Never Loading and Loaded at once
        assert_eq!(cache.state("AAA"), LoadState::Loading);
        assert!(cache.get("AAA").is_none());
    }

    #[test]
    fn invalidate_all_clears_records_and_loading() {
        let cache = SymbolCache::new();
        cache.put("AAA", SymbolRecord::no_data(), Fingerprint(1));
        cache.mark_loading("BBB");
        cache.invalidate_all();
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.state("AAA"), LoadState::Unloaded);
        assert_eq!(cache.state("BBB"), LoadState::Unloaded);
    }
}
