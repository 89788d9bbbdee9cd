use std::borrow::Cow;

/// Metrics-aggregator exchange codes and their display names.
const REGISTRY: [(&str, &str); 11] = [
    ("0", "BitMEX"),
    ("2", "Deribit"),
    ("3", "OKX"),
    ("4", "Huobi"),
    ("6", "Bybit"),
    ("7", "Phemex"),
    ("8", "dYdX"),
    ("A", "Binance"),
    ("B", "Bitget"),
    ("H", "Hyperliquid"),
    ("K", "Kraken"),
];

/// Exchange codes whose perpetuals are pulled from the metrics aggregator.
pub const SUPPORTED_EXCHANGE_CODES: [&str; 4] = ["A", "6", "3", "B"];

/// Immutable code-to-name mapping for the metrics aggregator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExchangeRegistry;

impl ExchangeRegistry {
    /// Display name for an exchange code; unknown codes are returned verbatim.
    pub fn display_name(self, code: &str) -> Cow<'static, str> {
        REGISTRY
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(code))
            .map(|(_, name)| Cow::Borrowed(*name))
            .unwrap_or_else(|| Cow::Owned(code.to_owned()))
    }

    pub fn is_supported(self, code: &str) -> bool {
        SUPPORTED_EXCHANGE_CODES
            .iter()
            .any(|supported| supported.eq_ignore_ascii_case(code))
    }
}

/// Comparison key for exchange names reported by different sources.
///
/// `"Binance (Futures)"`, `"binance"` and `"Binance Futures"` all map to `"binance"`.
pub fn exchange_key(name: &str) -> String {
    let head = name.split('(').next().unwrap_or(name);
    let lowered = head.trim().to_ascii_lowercase();
    let stripped = lowered
        .strip_suffix(" futures")
        .or_else(|| lowered.strip_suffix(" perpetual"))
        .unwrap_or(&lowered);
    stripped
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric())
        .collect()
}
