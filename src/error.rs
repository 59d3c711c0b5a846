use derive_more::{Display, Error};

#[derive(Debug, Display, Error)]
pub enum ConfigError {
    #[display("failed to read config file")]
    ReadFile,
    #[display("failed to parse config: {reason}")]
    Parse { reason: String },
    #[display("invalid config: {field}")]
    Validation { field: String },
}

#[derive(Debug, Display, Error)]
pub enum QuoteError {
    #[display("rate limit exceeded")]
    RateLimited,
    #[display("quote service returned a server error")]
    Server,
    #[display("failed to fetch from quote service")]
    Request,
    #[display("failed to parse quote service response")]
    ResponseParse,
    #[display("unknown symbol: {symbol}")]
    UnknownSymbol { symbol: String },
}

impl QuoteError {
    /// Whether a retry can reasonably be expected to succeed.
    ///
    /// Rate limiting, server errors and connection failures are transient;
    /// unknown symbols and malformed responses are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Server | Self::Request)
    }
}

#[derive(Debug, Display, Error)]
pub enum IndicatorError {
    #[display("invalid parameter: {name}")]
    InvalidParameter { name: String },
}

#[derive(Debug, Display, Error)]
pub enum EngineError {
    #[display("invalid indicator parameters")]
    InvalidParams,
    #[display("failed to persist settings")]
    Settings,
    #[display("unknown group: {name}")]
    UnknownGroup { name: String },
}

#[derive(Debug, Display, Error)]
pub enum StoreError {
    #[display("failed to open settings store")]
    Open,
    #[display("failed to read setting")]
    Read,
    #[display("failed to write setting")]
    Write,
}
