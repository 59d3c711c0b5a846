use std::path::Path;
use std::time::Duration;

use error_stack::{Report, ResultExt};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::model::{IndicatorKind, SymbolGroup, TimeFrame};
use crate::params::IndicatorParams;
use crate::scheduler::{PoolConfig, RetryPolicy};

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "text".into()
}

fn default_data_dir() -> String {
    "./data".into()
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_base_url() -> String {
    "https://quotes.example.com".into()
}

fn default_full_concurrency() -> usize {
    3
}

fn default_full_batch_delay_ms() -> u64 {
    500
}

fn default_value_concurrency() -> usize {
    5
}

fn default_value_batch_delay_ms() -> u64 {
    300
}

fn default_retry_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_indicator_kind() -> String {
    "rsi".into()
}

fn default_period() -> usize {
    14
}

fn default_timeframe() -> String {
    "15m".into()
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub general: GeneralConfig,
    #[serde(default)]
    pub quote: QuoteConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub indicator: IndicatorConfig,
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Accepted values: `"text"` | `"json"`
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct QuoteConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub requests_per_second: Option<u32>,
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            requests_per_second: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_full_concurrency")]
    pub full_concurrency: usize,
    #[serde(default = "default_full_batch_delay_ms")]
    pub full_batch_delay_ms: u64,
    #[serde(default = "default_value_concurrency")]
    pub value_concurrency: usize,
    #[serde(default = "default_value_batch_delay_ms")]
    pub value_batch_delay_ms: u64,
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            full_concurrency: default_full_concurrency(),
            full_batch_delay_ms: default_full_batch_delay_ms(),
            value_concurrency: default_value_concurrency(),
            value_batch_delay_ms: default_value_batch_delay_ms(),
            retry_max_attempts: default_retry_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

impl EngineConfig {
    pub fn full_pool(&self) -> PoolConfig {
        PoolConfig {
            concurrency: self.full_concurrency,
            batch_delay: Duration::from_millis(self.full_batch_delay_ms),
        }
    }

    pub fn value_pool(&self) -> PoolConfig {
        PoolConfig {
            concurrency: self.value_concurrency,
            batch_delay: Duration::from_millis(self.value_batch_delay_ms),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct IndicatorConfig {
    #[serde(default = "default_indicator_kind")]
    pub kind: String,
    #[serde(default = "default_period")]
    pub period: usize,
    pub d_period: Option<usize>,
    pub lower_level: Option<f64>,
    pub upper_level: Option<f64>,
    #[serde(default = "default_timeframe")]
    pub timeframe: String,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            kind: default_indicator_kind(),
            period: default_period(),
            d_period: None,
            lower_level: None,
            upper_level: None,
            timeframe: default_timeframe(),
        }
    }
}

impl IndicatorConfig {
    /// Assemble the initial parameter set, filling omitted fields from the
    /// kind's defaults. Assumes `validate()` has already passed.
    pub fn to_params(&self) -> IndicatorParams {
        let kind = IndicatorKind::from_str(&self.kind).unwrap_or(IndicatorKind::Rsi);
        let timeframe = TimeFrame::from_str(&self.timeframe).unwrap_or(TimeFrame::Min15);
        let defaults = IndicatorParams::defaults(kind, timeframe);
        IndicatorParams {
            kind,
            period: self.period,
            d_period: match kind {
                IndicatorKind::Stochastic => self.d_period.or(defaults.d_period),
                _ => None,
            },
            lower_level: self.lower_level.unwrap_or(defaults.lower_level),
            upper_level: self.upper_level.unwrap_or(defaults.upper_level),
            timeframe,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GroupConfig {
    pub name: String,
    pub symbols: Vec<String>,
}

impl GroupConfig {
    pub fn to_group(&self) -> SymbolGroup {
        SymbolGroup {
            name: self.name.clone(),
            symbols: self.symbols.clone(),
        }
    }
}

/// Load and validate an `AppConfig` from a TOML file at `path`.
pub fn load(path: &Path) -> Result<AppConfig, Report<ConfigError>> {
    let content = std::fs::read_to_string(path)
        .change_context(ConfigError::ReadFile)
        .attach_with(|| format!("path: {}", path.display()))?;

    let config: AppConfig = toml::from_str(&content).change_context(ConfigError::Parse {
        reason: "invalid TOML syntax or schema mismatch".into(),
    })?;

    validate(&config)?;

    Ok(config)
}

fn validate(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    validate_indicator(config)?;
    validate_engine(config)?;
    validate_groups(config)?;
    Ok(())
}

fn validate_indicator(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let indicator = &config.indicator;
    if IndicatorKind::from_str(&indicator.kind).is_none() {
        return Err(Report::new(ConfigError::Validation {
            field: format!("indicator.kind: unknown indicator \"{}\"", indicator.kind),
        }));
    }
    if TimeFrame::from_str(&indicator.timeframe).is_none() {
        return Err(Report::new(ConfigError::Validation {
            field: format!(
                "indicator.timeframe: unknown timeframe \"{}\"",
                indicator.timeframe
            ),
        }));
    }
    if let Err(e) = indicator.to_params().validate() {
        return Err(Report::new(ConfigError::Validation {
            field: format!("indicator: {e}"),
        }));
    }
    Ok(())
}

fn validate_engine(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let engine = &config.engine;
    for (name, value) in [
        ("engine.full_concurrency", engine.full_concurrency),
        ("engine.value_concurrency", engine.value_concurrency),
    ] {
        if value == 0 {
            return Err(Report::new(ConfigError::Validation {
                field: format!("{name} must be > 0"),
            }));
        }
    }
    if engine.retry_max_attempts == 0 {
        return Err(Report::new(ConfigError::Validation {
            field: "engine.retry_max_attempts must be > 0".into(),
        }));
    }
    Ok(())
}

fn validate_groups(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let mut seen = std::collections::HashSet::new();
    for group in &config.groups {
        if group.name.is_empty() {
            return Err(Report::new(ConfigError::Validation {
                field: "groups: empty name".into(),
            }));
        }
        if !seen.insert(group.name.as_str()) {
            return Err(Report::new(ConfigError::Validation {
                field: format!("groups: duplicate name \"{}\"", group.name),
            }));
        }
        if group.symbols.is_empty() {
            return Err(Report::new(ConfigError::Validation {
                field: format!("groups[\"{}\"]: no symbols", group.name),
            }));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> AppConfig {
        toml::from_str(toml).expect("parse failed")
    }

    #[test]
    fn valid_full_config_parses() {
        let toml = r#"
[general]
log_level = "debug"
log_format = "json"
data_dir = "/tmp/data"
poll_interval_secs = 30

[quote]
base_url = "https://quotes.internal"
requests_per_second = 4

[engine]
full_concurrency = 2
value_concurrency = 8

[indicator]
kind = "stochastic"
period = 9
d_period = 3
timeframe = "1h"

[[groups]]
name = "majors"
symbols = ["BTCUSD", "ETHUSD"]
"#;
        let config = parse(toml);
        validate(&config).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.quote.requests_per_second, Some(4));
        assert_eq!(config.engine.full_concurrency, 2);
        assert_eq!(config.groups.len(), 1);

        let params = config.indicator.to_params();
        assert_eq!(params.kind, IndicatorKind::Stochastic);
        assert_eq!(params.period, 9);
        assert_eq!(params.d_period, Some(3));
        assert_eq!(params.timeframe, TimeFrame::Hour1);
        // Levels filled from stochastic defaults
        assert_eq!(params.lower_level, 20.0);
        assert_eq!(params.upper_level, 80.0);
    }

    #[test]
    fn defaults_applied_when_fields_omitted() {
        let config = parse("[general]\n");
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, "text");
        assert_eq!(config.general.data_dir, "./data");
        assert_eq!(config.general.poll_interval_secs, 60);
        assert_eq!(config.engine.full_concurrency, 3);
        assert_eq!(config.engine.full_batch_delay_ms, 500);
        assert_eq!(config.engine.value_concurrency, 5);
        assert_eq!(config.engine.value_batch_delay_ms, 300);
        assert_eq!(config.engine.retry_max_attempts, 3);
        assert_eq!(config.engine.retry_base_delay_ms, 1000);
        assert_eq!(config.indicator.kind, "rsi");
        assert!(config.groups.is_empty());
        validate(&config).unwrap();
    }

    #[test]
    fn pool_and_retry_conversion() {
        let config = parse("[general]\n");
        assert_eq!(config.engine.full_pool().concurrency, 3);
        assert_eq!(
            config.engine.full_pool().batch_delay,
            Duration::from_millis(500)
        );
        assert_eq!(config.engine.value_pool().concurrency, 5);
        assert_eq!(
            config.engine.retry_policy().base_delay,
            Duration::from_millis(1000)
        );
    }

    #[test]
    fn unknown_indicator_kind_rejected() {
        let config = parse("[general]\n\n[indicator]\nkind = \"macd\"\n");
        assert!(validate(&config).is_err());
    }

    #[test]
    fn unknown_timeframe_rejected() {
        let config = parse("[general]\n\n[indicator]\ntimeframe = \"2m\"\n");
        assert!(validate(&config).is_err());
    }

    #[test]
    fn out_of_range_period_rejected() {
        let config = parse("[general]\n\n[indicator]\nperiod = 0\n");
        assert!(validate(&config).is_err());
        let config = parse("[general]\n\n[indicator]\nperiod = 101\n");
        assert!(validate(&config).is_err());
    }

    #[test]
    fn inverted_levels_rejected() {
        let config = parse(
            "[general]\n\n[indicator]\nlower_level = 70.0\nupper_level = 30.0\n",
        );
        assert!(validate(&config).is_err());
    }

    #[test]
    fn duplicate_group_names_rejected() {
        let toml = r#"
[general]

[[groups]]
name = "dup"
symbols = ["BTCUSD"]

[[groups]]
name = "dup"
symbols = ["ETHUSD"]
"#;
        assert!(validate(&parse(toml)).is_err());
    }

    #[test]
    fn empty_group_rejected() {
        let toml = r#"
[general]

[[groups]]
name = "empty"
symbols = []
"#;
        assert!(validate(&parse(toml)).is_err());
    }

    #[test]
    fn zero_concurrency_rejected() {
        let config = parse("[general]\n\n[engine]\nfull_concurrency = 0\n");
        assert!(validate(&config).is_err());
    }
}
