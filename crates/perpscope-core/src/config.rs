//! Runtime configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::error::ConfigError;
use crate::source_policy::SourcePolicy;
use crate::{HistoryInterval, HistoryWindow, SourceTag};

const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 60;
const DEFAULT_LOOKBACK_HOURS: u32 = 24;
const DEFAULT_COINALYZE_CALL_DELAY_MS: u64 = 1_500;

/// Thresholds shared by the aggregation engine and the trend classifier.
///
/// Funding values are decimal fractions per 8 hours.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AnalysisConfig {
    /// Funding values with `abs(value) >= bound` are discarded as corrupt.
    pub funding_sanity_bound: f64,
    pub trend_funding_threshold: f64,
    /// Open-interest change, in percent, between the first and last third of the series.
    pub oi_momentum_pct: f64,
    pub min_oi_buckets: usize,
    pub long_short_bullish: f64,
    pub long_short_bearish: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            funding_sanity_bound: 0.005,
            trend_funding_threshold: 0.0001,
            oi_momentum_pct: 5.0,
            min_oi_buckets: 6,
            long_short_bullish: 1.1,
            long_short_bearish: 0.9,
        }
    }
}

impl AnalysisConfig {
    pub fn is_plausible_funding(&self, value: f64) -> bool {
        value.is_finite() && value.abs() < self.funding_sanity_bound
    }
}

/// Process configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Required by the metrics aggregator; without it every call to that source fails.
    pub coinalyze_api_key: Option<String>,
    pub coingecko_api_key: Option<String>,
    pub coingecko_enabled: bool,
    pub hyperliquid_enabled: bool,
    pub refresh_interval: Duration,
    pub history: HistoryWindow,
    pub coinalyze_call_delay: Duration,
    pub analysis: AnalysisConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            coinalyze_api_key: None,
            coingecko_api_key: None,
            coingecko_enabled: true,
            hyperliquid_enabled: true,
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS),
            history: HistoryWindow::day(),
            coinalyze_call_delay: Duration::from_millis(DEFAULT_COINALYZE_CALL_DELAY_MS),
            analysis: AnalysisConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let vars = EnvVars { lookup };

        let refresh_secs = vars.parsed("REFRESH_INTERVAL_SECS", DEFAULT_REFRESH_INTERVAL_SECS)?;
        if refresh_secs == 0 {
            return Err(ConfigError::InvalidVar {
                name: "REFRESH_INTERVAL_SECS",
                value: refresh_secs.to_string(),
            });
        }

        let interval = match vars.get("HISTORY_INTERVAL") {
            Some(raw) => HistoryInterval::from_str(&raw)?,
            None => HistoryInterval::OneHour,
        };
        let lookback_hours = vars.parsed("HISTORY_LOOKBACK_HOURS", DEFAULT_LOOKBACK_HOURS)?;

        Ok(Self {
            coinalyze_api_key: vars.get("COINALYZE_API_KEY"),
            coingecko_api_key: vars.get("COINGECKO_API_KEY"),
            coingecko_enabled: vars.flag("COINGECKO_ENABLED", true)?,
            hyperliquid_enabled: vars.flag("HYPERLIQUID_ENABLED", true)?,
            refresh_interval: Duration::from_secs(refresh_secs),
            history: HistoryWindow::new(interval, lookback_hours)?,
            coinalyze_call_delay: Duration::from_millis(
                vars.parsed("COINALYZE_CALL_DELAY_MS", DEFAULT_COINALYZE_CALL_DELAY_MS)?,
            ),
            analysis: AnalysisConfig::default(),
        })
    }

    pub fn source_enabled(&self, source: SourceTag) -> bool {
        match source {
            SourceTag::Coinalyze => true,
            SourceTag::Hyperliquid => self.hyperliquid_enabled,
            SourceTag::Coingecko => self.coingecko_enabled,
        }
    }

    /// Request policy for `source`, with the configured aggregator call delay applied.
    pub fn source_policy(&self, source: SourceTag) -> SourcePolicy {
        match source {
            SourceTag::Coinalyze => {
                SourcePolicy::coinalyze_default().with_call_spacing(self.coinalyze_call_delay)
            }
            other => SourcePolicy::default_for(other),
        }
    }
}

struct EnvVars<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvVars<F> {
    /// Trimmed, non-empty value.
    fn get(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
    }

    fn parsed<T: FromStr>(&self, name: &'static str, default: T) -> Result<T, ConfigError> {
        match self.get(name) {
            Some(raw) => raw
                .parse()
                .map_err(|_| ConfigError::InvalidVar { name, value: raw }),
            None => Ok(default),
        }
    }

    fn flag(&self, name: &'static str, default: bool) -> Result<bool, ConfigError> {
        let Some(raw) = self.get(name) else {
            return Ok(default);
        };
        match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidVar { name, value: raw }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::ValidationError;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars = pairs
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect::<HashMap<_, _>>();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = config_from(&[]).expect("defaults are valid");
        assert_eq!(config, AppConfig::default());
        assert_eq!(
            config.source_policy(SourceTag::Coinalyze).min_call_spacing,
            Duration::from_millis(1_500)
        );
    }

    #[test]
    fn reads_keys_flags_and_window() {
        let config = config_from(&[
            ("COINALYZE_API_KEY", " abc "),
            ("COINGECKO_ENABLED", "false"),
            ("HISTORY_INTERVAL", "4hour"),
            ("HISTORY_LOOKBACK_HOURS", "120"),
            ("COINALYZE_CALL_DELAY_MS", "500"),
        ])
        .expect("valid config");

        assert_eq!(config.coinalyze_api_key.as_deref(), Some("abc"));
        assert!(!config.source_enabled(SourceTag::Coingecko));
        assert!(config.source_enabled(SourceTag::Hyperliquid));
        assert_eq!(config.history, HistoryWindow::five_days());
        assert_eq!(
            config.source_policy(SourceTag::Coinalyze).min_call_spacing,
            Duration::from_millis(500)
        );
    }

    #[test]
    fn rejects_invalid_values() {
        assert_eq!(
            config_from(&[("REFRESH_INTERVAL_SECS", "soon")]),
            Err(ConfigError::InvalidVar {
                name: "REFRESH_INTERVAL_SECS",
                value: String::from("soon"),
            })
        );
        assert!(matches!(
            config_from(&[("HYPERLIQUID_ENABLED", "maybe")]),
            Err(ConfigError::InvalidVar { name: "HYPERLIQUID_ENABLED", .. })
        ));
        assert_eq!(
            config_from(&[("HISTORY_INTERVAL", "15min")]),
            Err(ConfigError::Validation(ValidationError::InvalidInterval {
                value: String::from("15min"),
            }))
        );
    }

    #[test]
    fn sanity_filter_is_strict_at_the_bound() {
        let analysis = AnalysisConfig::default();
        assert!(analysis.is_plausible_funding(0.0049));
        assert!(analysis.is_plausible_funding(-0.0049));
        assert!(!analysis.is_plausible_funding(0.005));
        assert!(!analysis.is_plausible_funding(-0.005));
        assert!(!analysis.is_plausible_funding(f64::NAN));
    }
}
