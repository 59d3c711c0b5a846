use std::ops::Range;
use std::sync::Arc;

use error_stack::{Report, ResultExt};
use tokio::task::JoinHandle;
use tracing::info;

use crate::cache::{LoadState, SymbolCache, SymbolRecord};
use crate::error::EngineError;
use crate::model::{IndicatorKind, SymbolGroup, TimeFrame};
use crate::params::IndicatorParams;
use crate::quote::CandleSource;
use crate::scheduler::{BatchScheduler, PoolConfig, RetryPolicy, compute_load_window};
use crate::settings::SettingsCoordinator;
use crate::sort::{SortEngine, SortMode};

/// Coordination layer tying cache, scheduler, sort engine and settings
/// together behind one API. Callers render from the cache and tolerate
/// results arriving incrementally.
pub struct ScreenerEngine {
    scheduler: Arc<BatchScheduler>,
    cache: Arc<SymbolCache>,
    sort: Arc<SortEngine>,
    settings: Arc<SettingsCoordinator>,
    groups: Vec<SymbolGroup>,
}

impl ScreenerEngine {
    pub fn new(
        source: Arc<dyn CandleSource>,
        settings: Arc<SettingsCoordinator>,
        groups: Vec<SymbolGroup>,
        full_pool: PoolConfig,
        value_pool: PoolConfig,
        retry: RetryPolicy,
    ) -> Self {
        let cache = Arc::new(SymbolCache::new());
        let sort = Arc::new(SortEngine::new());
        let scheduler = Arc::new(BatchScheduler::new(
            source,
            Arc::clone(&cache),
            Arc::clone(&sort),
            Arc::clone(&settings),
            full_pool,
            value_pool,
            retry,
        ));
        Self {
            scheduler,
            cache,
            sort,
            settings,
            groups,
        }
    }

    pub fn groups(&self) -> &[SymbolGroup] {
        &self.groups
    }

    pub fn group(&self, name: &str) -> Option<&SymbolGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    fn group_or_err(&self, name: &str) -> Result<&SymbolGroup, Report<EngineError>> {
        self.group(name).ok_or_else(|| {
            Report::new(EngineError::UnknownGroup {
                name: name.to_owned(),
            })
        })
    }

    /// Seed the natural sort order, best rank first.
    pub fn set_reference_ranking(&self, symbols: &[String]) {
        self.sort.set_reference_ranking(symbols);
    }

    /// Load full records for the items a scrolled viewport exposes.
    /// Ranges address the displayed (sorted) order, not the raw list.
    #[allow(dead_code)]
    pub async fn load_visible(
        &self,
        group: &str,
        scroll_offset: usize,
        viewport_size: usize,
        item_size: usize,
    ) -> Result<(), Report<EngineError>> {
        let g = self.group_or_err(group)?;
        let window = compute_load_window(scroll_offset, viewport_size, item_size, g.symbols.len());
        let ordered = self.sort.order(group, &g.symbols);
        self.scheduler.load_range(group, &ordered, window).await;
        Ok(())
    }

    /// Load full records for an explicit index range of the group's
    /// displayed order.
    pub async fn load_range(
        &self,
        group: &str,
        range: Range<usize>,
    ) -> Result<(), Report<EngineError>> {
        let g = self.group_or_err(group)?;
        let ordered = self.sort.order(group, &g.symbols);
        self.scheduler.load_range(group, &ordered, range).await;
        Ok(())
    }

    /// Refresh the group's sort snapshot on the value-only pool.
    pub async fn refresh_group_values(&self, group: &str) -> Result<(), Report<EngineError>> {
        let g = self.group_or_err(group)?;
        self.scheduler.refresh_values(group, &g.symbols).await;
        Ok(())
    }

    /// Apply a configured sort mode at startup, before any loads run.
    /// Unlike [`set_sort_mode`](Self::set_sort_mode) this does not trigger
    /// a value pass; the first sweep covers it.
    pub fn configure_sort_mode(
        &self,
        group: &str,
        mode: SortMode,
    ) -> Result<(), Report<EngineError>> {
        self.group_or_err(group)?;
        self.sort.set_mode(group, mode);
        Ok(())
    }

    /// Change a group's sort mode and kick off a value-only pass over the
    /// whole group. The pass runs on its own task so it never blocks
    /// detail loads; the returned handle is awaitable but ignorable.
    #[allow(dead_code)]
    pub fn set_sort_mode(
        self: &Arc<Self>,
        group: &str,
        mode: SortMode,
    ) -> Result<JoinHandle<()>, Report<EngineError>> {
        let g = self.group_or_err(group)?;
        self.sort.set_mode(group, mode);

        let engine = Arc::clone(self);
        let name = group.to_owned();
        let symbols = g.symbols.clone();
        Ok(tokio::spawn(async move {
            engine.scheduler.refresh_values(&name, &symbols).await;
        }))
    }

    /// Switch the active indicator kind: persist-then-load in the settings
    /// coordinator, then invalidate every cached record and snapshot, then
    /// re-trigger value loads for all groups.
    pub async fn switch_indicator(
        self: &Arc<Self>,
        kind: IndicatorKind,
    ) -> Result<IndicatorParams, Report<EngineError>> {
        let (params, _) = self
            .settings
            .switch_indicator(kind)
            .await
            .change_context(EngineError::Settings)?;
        self.invalidate_and_reload();
        Ok(params)
    }

    /// Replace the active parameter set after validating it.
    pub async fn update_params(
        self: &Arc<Self>,
        params: IndicatorParams,
    ) -> Result<(), Report<EngineError>> {
        params.validate().change_context(EngineError::InvalidParams)?;
        self.settings
            .update_params(params)
            .await
            .change_context(EngineError::Settings)?;
        self.invalidate_and_reload();
        Ok(())
    }

    pub async fn set_timeframe(
        self: &Arc<Self>,
        timeframe: TimeFrame,
    ) -> Result<(), Report<EngineError>> {
        self.settings
            .set_timeframe(timeframe)
            .await
            .change_context(EngineError::Settings)?;
        self.invalidate_and_reload();
        Ok(())
    }

    /// Wholesale invalidation plus a fresh value pass per group. Runs
    /// after the settings transition has fully committed, so every new
    /// dispatch already carries the new fingerprint.
    fn invalidate_and_reload(self: &Arc<Self>) {
        self.cache.invalidate_all();
        self.sort.clear_values();
        info!(groups = self.groups.len(), "caches invalidated, reloading values");

        for group in &self.groups {
            let engine = Arc::clone(self);
            let name = group.name.clone();
            let symbols = group.symbols.clone();
            tokio::spawn(async move {
                engine.scheduler.refresh_values(&name, &symbols).await;
            });
        }
    }

    pub async fn current_params(&self) -> IndicatorParams {
        self.settings.current().await.0
    }

    /// The group's symbols in display order under its active sort mode.
    pub fn ordered(&self, group: &str) -> Result<Vec<String>, Report<EngineError>> {
        let g = self.group_or_err(group)?;
        Ok(self.sort.order(group, &g.symbols))
    }

    pub fn sort_mode(&self, group: &str) -> SortMode {
        self.sort.mode(group)
    }

    pub fn sort_value(&self, group: &str, symbol: &str) -> Option<f64> {
        self.sort.value(group, symbol)
    }

    pub fn record(&self, symbol: &str) -> Option<SymbolRecord> {
        self.cache.get(symbol)
    }

    pub fn load_state(&self, symbol: &str) -> LoadState {
        self.cache.state(symbol)
    }
}
