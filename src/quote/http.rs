use std::sync::Arc;

use chrono::{DateTime, Utc};
use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::QuoteError;
use crate::model::{Candle, SymbolInfo, TimeFrame};
use crate::quote::CandleSource;

const MAX_CANDLES_PER_REQUEST: usize = 500;
/// Client-side request cap, kept under the service's documented limit for
/// safety margin. The scheduler's pool bounds are a separate, coarser
/// backpressure layer on top of this.
const DEFAULT_REQUESTS_PER_SECOND: u32 = 8;

pub struct HttpQuoteClient {
    base_url: String,
    client: reqwest::Client,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

impl HttpQuoteClient {
    pub fn new(base_url: impl Into<String>, requests_per_second: Option<u32>) -> Self {
        let per_second = requests_per_second
            .and_then(std::num::NonZeroU32::new)
            .unwrap_or(nonzero!(DEFAULT_REQUESTS_PER_SECOND));
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
            rate_limiter: Arc::new(RateLimiter::direct(Quota::per_second(per_second))),
        }
    }

    /// Map an unsuccessful HTTP status onto the failure taxonomy the retry
    /// policy classifies on.
    fn classify_status(status: StatusCode, symbol: &str) -> QuoteError {
        if status == StatusCode::TOO_MANY_REQUESTS {
            QuoteError::RateLimited
        } else if status.is_server_error() {
            QuoteError::Server
        } else if status == StatusCode::NOT_FOUND {
            QuoteError::UnknownSymbol {
                symbol: symbol.to_owned(),
            }
        } else {
            QuoteError::Request
        }
    }
}

impl CandleSource for HttpQuoteClient {
    fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<Candle>, Report<QuoteError>>> {
        let symbol = symbol.to_owned();
        Box::pin(async move {
            // Wait for rate limiter before making the request
            self.rate_limiter.until_ready().await;

            let url = format!("{}/v1/candles", self.base_url);
            let fetch_limit = limit.min(MAX_CANDLES_PER_REQUEST);
            let limit_str = fetch_limit.to_string();
            let params = [
                ("symbol", symbol.as_str()),
                ("interval", timeframe.kline_interval()),
                ("limit", limit_str.as_str()),
            ];

            let response = self
                .client
                .get(&url)
                .query(&params)
                .send()
                .await
                .change_context(QuoteError::Request)?;

            let status = response.status();
            if !status.is_success() {
                return Err(Report::new(Self::classify_status(status, &symbol))
                    .attach(format!("HTTP status: {status}")));
            }

            let raw: Vec<QuoteCandleRow> = response
                .json()
                .await
                .change_context(QuoteError::ResponseParse)?;

            debug!(
                symbol = %symbol,
                timeframe = %timeframe,
                fetched = raw.len(),
                "candle fetch complete"
            );

            let mut candles: Vec<Candle> = raw
                .into_iter()
                .map(|row| row.into_candle(&symbol, timeframe))
                .collect::<Result<_, _>>()?;

            // The service returns newest-first; callers expect oldest-first.
            candles.sort_by_key(|c| c.open_time);
            Ok(candles)
        })
    }

    fn search_symbols(
        &self,
        query: &str,
    ) -> BoxFuture<'_, Result<Vec<SymbolInfo>, Report<QuoteError>>> {
        let query = query.to_owned();
        Box::pin(async move {
            self.rate_limiter.until_ready().await;

            let url = format!("{}/v1/symbols/search", self.base_url);
            let response = self
                .client
                .get(&url)
                .query(&[("query", query.as_str())])
                .send()
                .await
                .change_context(QuoteError::Request)?;

            let status = response.status();
            if !status.is_success() {
                return Err(Report::new(Self::classify_status(status, &query))
                    .attach(format!("HTTP status: {status}")));
            }

            let matches: Vec<SymbolInfo> = response
                .json()
                .await
                .change_context(QuoteError::ResponseParse)?;

            info!(query = %query, matches = matches.len(), "symbol search complete");
            Ok(matches)
        })
    }

    fn fetch_popular_symbols(&self) -> BoxFuture<'_, Result<Vec<String>, Report<QuoteError>>> {
        Box::pin(async move {
            self.rate_limiter.until_ready().await;

            let url = format!("{}/v1/symbols/popular", self.base_url);
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .change_context(QuoteError::Request)?;

            let status = response.status();
            if !status.is_success() {
                return Err(Report::new(Self::classify_status(status, ""))
                    .attach(format!("HTTP status: {status}")));
            }

            response
                .json()
                .await
                .change_context(QuoteError::ResponseParse)
        })
    }
}

// ── REST response types ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct QuoteCandleRow {
    open_time_ms: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
}

impl QuoteCandleRow {
    fn into_candle(
        self,
        symbol: &str,
        timeframe: TimeFrame,
    ) -> Result<Candle, Report<QuoteError>> {
        let open_time: DateTime<Utc> = DateTime::from_timestamp_millis(self.open_time_ms)
            .ok_or_else(|| {
                Report::new(QuoteError::ResponseParse)
                    .attach(format!("bad open_time_ms: {}", self.open_time_ms))
            })?;

        Ok(Candle {
            symbol: symbol.to_owned(),
            timeframe,
            open_time,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candle_row_parses_into_candle() {
        let raw = QuoteCandleRow {
            open_time_ms: 1_704_067_200_000,
            open: 50_000.0,
            high: 51_000.0,
            low: 49_000.0,
            close: 50_500.0,
        };
        let candle = raw.into_candle("BTCUSD", TimeFrame::Min15).unwrap();
        assert_eq!(candle.symbol, "BTCUSD");
        assert_eq!(candle.timeframe, TimeFrame::Min15);
        assert_eq!(candle.open, 50_000.0);
        assert_eq!(candle.close, 50_500.0);
        assert_eq!(candle.open_time.timestamp(), 1_704_067_200);
    }

    #[test]
    fn candle_row_rejects_bad_timestamp() {
        let raw = QuoteCandleRow {
            open_time_ms: i64::MAX,
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
        };
        assert!(raw.into_candle("BTCUSD", TimeFrame::Min1).is_err());
    }

    #[test]
    fn status_classification() {
        let err = HttpQuoteClient::classify_status(StatusCode::TOO_MANY_REQUESTS, "X");
        assert!(err.is_transient());
        let err = HttpQuoteClient::classify_status(StatusCode::INTERNAL_SERVER_ERROR, "X");
        assert!(err.is_transient());
        let err = HttpQuoteClient::classify_status(StatusCode::NOT_FOUND, "X");
        assert!(!err.is_transient());
    }

    /// Integration test: requires network access. Run with `cargo test -- --ignored`
    #[tokio::test]
    #[ignore]
    async fn integration_fetch_candles() {
        let client = HttpQuoteClient::new("https://quotes.example.com", None);
        let candles = client
            .fetch_candles("BTCUSD", TimeFrame::Min15, 10)
            .await
            .unwrap();
        assert!(candles.len() <= 10);
    }
}
