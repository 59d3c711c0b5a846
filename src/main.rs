mod cache;
mod config;
mod engine;
mod error;
mod indicator;
mod model;
mod params;
mod quote;
mod scheduler;
mod settings;
mod sort;
mod store;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use derive_more::{Display, Error};
use error_stack::{Report, ResultExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cache::LoadState;
use config::AppConfig;
use engine::ScreenerEngine;
use model::{IndicatorKind, TimeFrame};
use quote::CandleSource;
use quote::http::HttpQuoteClient;
use settings::SettingsCoordinator;
use sort::SortMode;
use store::{MemoryParameterStore, ParameterStore};
use store::sqlite::SqliteParameterStore;

/// Rows at the top of each group that get a full-history detail load.
const DETAIL_ROWS: usize = 5;

#[derive(Debug, Display, Error)]
pub enum AppError {
    #[display("configuration error")]
    Config,
    #[display("settings store error")]
    Store,
    #[display("invalid option: {name}")]
    Option { name: String },
    #[display("runtime error")]
    Runtime,
}

#[derive(Parser)]
#[command(name = "market-screener", about = "Watchlist indicator screener")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Run a single sweep and exit instead of polling
    #[arg(long)]
    once: bool,

    /// Switch the active indicator (rsi | stochastic | williams_r)
    #[arg(long)]
    indicator: Option<String>,

    /// Override the candle timeframe (1m | 5m | 15m | 1h | 4h | 1d)
    #[arg(long)]
    timeframe: Option<String>,

    /// Override the indicator period
    #[arg(long)]
    period: Option<usize>,

    /// Sort mode for every group (natural | ascending | descending)
    #[arg(long)]
    sort: Option<String>,
}

#[tokio::main]
async fn main() {
    if let Err(report) = run().await {
        eprintln!("{report:?}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Report<AppError>> {
    let cli = Cli::parse();
    let config = config::load(Path::new(&cli.config)).change_context(AppError::Config)?;

    init_tracing(&config);

    if config.groups.is_empty() {
        tracing::warn!("no groups configured; nothing to do");
        return Ok(());
    }

    // ── Settings store ────────────────────────────────────────────────────────
    let store: Arc<dyn ParameterStore> = if config.general.data_dir.is_empty() {
        warn!("no data_dir configured, settings will not persist");
        Arc::new(MemoryParameterStore::new())
    } else {
        let db_path = format!("{}/market-screener.db", config.general.data_dir);
        Arc::new(
            SqliteParameterStore::open(Path::new(&db_path))
                .await
                .change_context(AppError::Store)?,
        )
    };

    let settings = Arc::new(
        SettingsCoordinator::load(store, config.indicator.to_params())
            .await
            .change_context(AppError::Store)?,
    );

    // ── Quote source & engine ─────────────────────────────────────────────────
    let source: Arc<dyn CandleSource> = Arc::new(HttpQuoteClient::new(
        &config.quote.base_url,
        config.quote.requests_per_second,
    ));

    let groups = config.groups.iter().map(|g| g.to_group()).collect();
    let engine = Arc::new(ScreenerEngine::new(
        Arc::clone(&source),
        settings,
        groups,
        config.engine.full_pool(),
        config.engine.value_pool(),
        config.engine.retry_policy(),
    ));

    // Command-line overrides run before any fetch is dispatched, so every
    // load already carries the final parameter fingerprint.
    apply_overrides(&engine, &cli).await?;

    // ── Natural-order reference ranking ───────────────────────────────────────
    match source.fetch_popular_symbols().await {
        Ok(ranking) => {
            info!(count = ranking.len(), "reference ranking loaded");
            engine.set_reference_ranking(&ranking);
        }
        Err(e) => {
            warn!(error = ?e, "popular symbols unavailable, natural order falls back to list order");
        }
    }

    // ── Sweep loop ────────────────────────────────────────────────────────────
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("ctrl+c received, shutting down");
                cancel.cancel();
            }
        });
    }

    sweep(&engine).await;

    if cli.once {
        return Ok(());
    }

    let mut ticker =
        tokio::time::interval(Duration::from_secs(config.general.poll_interval_secs.max(1)));
    ticker.tick().await; // skip the immediate first tick; we just swept

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => sweep(&engine).await,
        }
    }

    info!("shutdown complete");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::new(&config.general.log_level);
    match config.general.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .init();
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}

async fn apply_overrides(engine: &Arc<ScreenerEngine>, cli: &Cli) -> Result<(), Report<AppError>> {
    if let Some(name) = &cli.indicator {
        let kind = IndicatorKind::from_str(name).ok_or_else(|| {
            Report::new(AppError::Option {
                name: format!("--indicator {name}"),
            })
        })?;
        engine
            .switch_indicator(kind)
            .await
            .change_context(AppError::Runtime)?;
    }

    if let Some(tf) = &cli.timeframe {
        let timeframe = TimeFrame::from_str(tf).ok_or_else(|| {
            Report::new(AppError::Option {
                name: format!("--timeframe {tf}"),
            })
        })?;
        engine
            .set_timeframe(timeframe)
            .await
            .change_context(AppError::Runtime)?;
    }

    if let Some(period) = cli.period {
        let mut params = engine.current_params().await;
        params.period = period;
        engine
            .update_params(params)
            .await
            .change_context(AppError::Runtime)?;
    }

    if let Some(mode) = &cli.sort {
        let mode = SortMode::from_str(mode).ok_or_else(|| {
            Report::new(AppError::Option {
                name: format!("--sort {mode}"),
            })
        })?;
        for group in engine.groups().to_vec() {
            engine
                .configure_sort_mode(&group.name, mode)
                .change_context(AppError::Runtime)?;
        }
    }

    Ok(())
}

/// Refresh every group's sort values, pull full records for the top rows,
/// then print the group in display order.
async fn sweep(engine: &Arc<ScreenerEngine>) {
    let params = engine.current_params().await;

    for group in engine.groups().to_vec() {
        if let Err(e) = engine.refresh_group_values(&group.name).await {
            warn!(group = %group.name, error = ?e, "value sweep failed (continuing)");
            continue;
        }

        let detail = DETAIL_ROWS.min(group.symbols.len());
        if let Err(e) = engine.load_range(&group.name, 0..detail).await {
            warn!(group = %group.name, error = ?e, "detail load failed (continuing)");
        }

        print_group(engine, &group.name, &params.kind.to_string());
    }
}

fn print_group(engine: &Arc<ScreenerEngine>, group: &str, indicator: &str) {
    let Ok(ordered) = engine.ordered(group) else {
        return;
    };

    println!();
    println!(
        "{group} [{indicator}, {} sort]",
        engine.sort_mode(group).as_str()
    );

    for symbol in ordered {
        let record = engine.record(&symbol);
        let value = record
            .as_ref()
            .and_then(|r| r.current_value)
            .or_else(|| engine.sort_value(group, &symbol));

        match value {
            Some(value) => {
                let previous = record
                    .as_ref()
                    .and_then(|r| r.previous_value)
                    .map(|p| format!("{p:.2}"))
                    .unwrap_or_else(|| "-".into());
                let price = record
                    .as_ref()
                    .and_then(|r| r.price)
                    .map(|p| format!("{p:.2}"))
                    .unwrap_or_else(|| "-".into());
                println!("  {symbol:<12} {value:>10.2}  prev {previous:>10}  price {price:>12}");
            }
            None => {
                let status = match engine.load_state(&symbol) {
                    LoadState::Loading => "loading",
                    _ => "no data",
                };
                println!("  {symbol:<12} {status:>10}");
            }
        }
    }
}
