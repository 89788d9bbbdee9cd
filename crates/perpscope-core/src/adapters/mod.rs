//! Upstream source adapters.
//!
//! | Adapter | Source | Endpoints |
//! |---------|--------|-----------|
//! | [`CoinalyzeAdapter`] | metrics aggregator | current, history (OI, funding, long/short) |
//! | [`HyperliquidAdapter`] | decentralized exchange | current, funding history |
//! | [`CoingeckoAdapter`] | secondary aggregator | current |

mod coingecko;
mod coinalyze;
mod hyperliquid;

pub use coingecko::CoingeckoAdapter;
pub use coinalyze::CoinalyzeAdapter;
pub use hyperliquid::HyperliquidAdapter;

use crate::Timestamp;

/// Epochs below this are treated as seconds, everything else as milliseconds.
const SECONDS_EPOCH_CEILING: i64 = 100_000_000_000;

/// Normalizes an upstream epoch reported in seconds or milliseconds.
pub(crate) fn normalize_epoch(raw: i64) -> Timestamp {
    if raw.abs() < SECONDS_EPOCH_CEILING {
        Timestamp::from_secs(raw)
    } else {
        Timestamp::from_millis(raw)
    }
}

/// `None` for missing or non-finite upstream numbers; they are never counted as zero.
pub(crate) fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|value| value.is_finite())
}

/// Parses decimal strings such as `"0.0000125"`.
pub(crate) fn parse_decimal(raw: Option<&str>) -> Option<f64> {
    finite(raw.and_then(|raw| raw.trim().parse::<f64>().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epochs_are_normalized_to_milliseconds() {
        assert_eq!(normalize_epoch(1_700_000_000).as_millis(), 1_700_000_000_000);
        assert_eq!(normalize_epoch(1_700_000_000_123).as_millis(), 1_700_000_000_123);
    }

    #[test]
    fn missing_and_non_finite_values_are_unavailable() {
        assert_eq!(finite(None), None);
        assert_eq!(finite(Some(f64::NAN)), None);
        assert_eq!(finite(Some(f64::INFINITY)), None);
        assert_eq!(parse_decimal(Some("0.0000125")), Some(0.0000125));
        assert_eq!(parse_decimal(Some("n/a")), None);
    }
}
