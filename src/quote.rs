pub mod http;

use error_stack::Report;
use futures::future::BoxFuture;

use crate::error::QuoteError;
use crate::model::{Candle, SymbolInfo, TimeFrame};

/// Abstraction over the remote quote service.
///
/// Uses `BoxFuture` (from `futures` crate) instead of `async fn` in trait
/// to keep the trait object-safe (`dyn CandleSource`).
pub trait CandleSource: Send + Sync {
    /// Fetch up to `limit` historical candles, oldest first.
    fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<Candle>, Report<QuoteError>>>;

    /// Search symbols whose ticker or name matches `query`.
    #[allow(dead_code)]
    fn search_symbols(
        &self,
        query: &str,
    ) -> BoxFuture<'_, Result<Vec<SymbolInfo>, Report<QuoteError>>>;

    /// List the most-traded symbols, best rank first. Seeds the natural
    /// sort ordering.
    fn fetch_popular_symbols(&self) -> BoxFuture<'_, Result<Vec<String>, Report<QuoteError>>>;
}
