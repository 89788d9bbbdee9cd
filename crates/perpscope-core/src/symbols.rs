//! Instrument universe discovery.
//!
//! Runs once at startup against the metrics aggregator's market listing and
//! keeps at most one perpetual per (asset, exchange). A failed listing call
//! degrades to a fixed instrument list for the process lifetime.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::request_client::RequestClient;
use crate::{Asset, AssetMap, ExchangeRegistry, InstrumentId, SUPPORTED_EXCHANGE_CODES};

pub const MARKET_LISTING_PATH: &str = "/future-markets";

const FALLBACK_BTC: [&str; 4] = [
    "BTCUSDT_PERP.A",
    "BTCUSDT.6",
    "BTCUSDT_PERP.3",
    "BTCUSDT_PERP.B",
];
const FALLBACK_ETH: [&str; 4] = [
    "ETHUSDT_PERP.A",
    "ETHUSDT.6",
    "ETHUSDT_PERP.3",
    "ETHUSDT_PERP.B",
];

/// Resolved instruments per asset, ordered by the exchange allow-list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstrumentUniverse {
    pub instruments: AssetMap<Vec<InstrumentId>>,
}

impl InstrumentUniverse {
    pub fn new(btc: Vec<InstrumentId>, eth: Vec<InstrumentId>) -> Self {
        Self {
            instruments: AssetMap { btc, eth },
        }
    }

    /// Hardcoded universe covering every allow-listed exchange.
    pub fn fallback() -> Self {
        let parse = |symbols: &[&str]| {
            symbols
                .iter()
                .filter_map(|symbol| InstrumentId::parse(symbol).ok())
                .collect::<Vec<_>>()
        };
        Self::new(parse(&FALLBACK_BTC), parse(&FALLBACK_ETH))
    }

    pub fn for_asset(&self, asset: Asset) -> &[InstrumentId] {
        self.instruments.get(asset)
    }

    /// Comma-joined identifiers, the form the aggregator expects in `symbols=`.
    pub fn joined(&self, asset: Asset) -> String {
        self.for_asset(asset)
            .iter()
            .map(InstrumentId::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Asset owning `symbol`, if it is part of the universe.
    pub fn asset_of(&self, symbol: &str) -> Option<Asset> {
        Asset::ALL.into_iter().find(|asset| {
            self.for_asset(*asset)
                .iter()
                .any(|id| id.as_str().eq_ignore_ascii_case(symbol))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.btc.is_empty() && self.instruments.eth.is_empty()
    }
}

/// Universe plus how it was obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedUniverse {
    pub universe: InstrumentUniverse,
    pub fallback_used: bool,
    pub failure: Option<String>,
}

/// One row of the aggregator's market listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MarketListing {
    pub symbol: String,
    #[serde(default)]
    pub exchange: Option<String>,
    #[serde(default)]
    pub base_asset: Option<String>,
    #[serde(default)]
    pub quote_asset: Option<String>,
    #[serde(default)]
    pub is_perpetual: bool,
}

impl MarketListing {
    fn is_usdt_margined(&self, id: &InstrumentId) -> bool {
        self.quote_asset
            .as_deref()
            .is_some_and(|quote| quote.eq_ignore_ascii_case("USDT"))
            || id.is_usdt_perpetual()
    }
}

/// Picks at most one perpetual per allow-listed exchange for each asset.
///
/// A USDT-margined candidate replaces an earlier non-USDT one on the same
/// exchange; otherwise the first candidate encountered is kept.
pub fn select_instruments(listings: &[MarketListing], registry: ExchangeRegistry) -> InstrumentUniverse {
    let select = |asset: Asset| {
        let mut chosen: Vec<(String, InstrumentId, bool)> = Vec::new();

        for listing in listings {
            if !listing.is_perpetual {
                continue;
            }
            let base_matches = listing
                .base_asset
                .as_deref()
                .is_some_and(|base| base.eq_ignore_ascii_case(asset.as_str()));
            if !base_matches {
                continue;
            }
            let Ok(id) = InstrumentId::parse(&listing.symbol) else {
                continue;
            };
            let code = listing
                .exchange
                .as_deref()
                .unwrap_or_else(|| id.exchange_code())
                .to_ascii_uppercase();
            if !registry.is_supported(&code) {
                continue;
            }

            let usdt = listing.is_usdt_margined(&id);
            match chosen.iter_mut().find(|(existing, _, _)| *existing == code) {
                Some(slot) if !slot.2 && usdt => *slot = (code, id, usdt),
                Some(_) => {}
                None => chosen.push((code, id, usdt)),
            }
        }

        chosen.sort_by_key(|(code, _, _)| {
            SUPPORTED_EXCHANGE_CODES
                .iter()
                .position(|supported| supported.eq_ignore_ascii_case(code))
                .unwrap_or(usize::MAX)
        });
        chosen.into_iter().map(|(_, id, _)| id).collect::<Vec<_>>()
    };

    InstrumentUniverse::new(select(Asset::Btc), select(Asset::Eth))
}

/// Resolves the instrument universe from the aggregator's market listing.
pub struct SymbolResolver {
    client: RequestClient,
    registry: ExchangeRegistry,
}

impl SymbolResolver {
    pub fn new(client: RequestClient) -> Self {
        Self {
            client,
            registry: ExchangeRegistry,
        }
    }

    /// Never fails: listing errors fall back to [`InstrumentUniverse::fallback`].
    pub async fn resolve(&self) -> ResolvedUniverse {
        let failure = match self.client.get(MARKET_LISTING_PATH, &[]).await {
            Ok(body) => match parse_listings(body) {
                Ok(listings) => {
                    let universe = select_instruments(&listings, self.registry);
                    if !universe.is_empty() {
                        info!(
                            btc = %universe.joined(Asset::Btc),
                            eth = %universe.joined(Asset::Eth),
                            "resolved instrument universe"
                        );
                        return ResolvedUniverse {
                            universe,
                            fallback_used: false,
                            failure: None,
                        };
                    }
                    String::from("market listing contained no supported perpetuals")
                }
                Err(err) => err,
            },
            Err(err) => err.to_string(),
        };

        warn!(error = %failure, "symbol resolution failed, using fallback instrument list");
        ResolvedUniverse {
            universe: InstrumentUniverse::fallback(),
            fallback_used: true,
            failure: Some(failure),
        }
    }
}

fn parse_listings(body: Value) -> Result<Vec<MarketListing>, String> {
    serde_json::from_value(body).map_err(|err| format!("unexpected market listing shape: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(symbol: &str, exchange: &str, base: &str, quote: &str, perpetual: bool) -> MarketListing {
        MarketListing {
            symbol: symbol.to_owned(),
            exchange: Some(exchange.to_owned()),
            base_asset: Some(base.to_owned()),
            quote_asset: Some(quote.to_owned()),
            is_perpetual: perpetual,
        }
    }

    fn sample_listing() -> Vec<MarketListing> {
        vec![
            listing("BTCUSD_PERP.A", "A", "BTC", "USD", true),
            listing("BTCUSDT_PERP.A", "A", "BTC", "USDT", true),
            listing("BTCUSDC_PERP.A", "A", "BTC", "USDC", true),
            listing("BTCUSDT.6", "6", "BTC", "USDT", true),
            listing("BTCUSDT_240628.A", "A", "BTC", "USDT", false),
            listing("BTCUSDT_PERP.3", "3", "BTC", "USDT", true),
            listing("BTCUSD.3", "3", "BTC", "USD", true),
            listing("XBTUSD.0", "0", "BTC", "USD", true),
            listing("ETHUSDT_PERP.B", "B", "ETH", "USDT", true),
            listing("ETHUSDT_PERP.A", "A", "ETH", "USDT", true),
            listing("SOLUSDT_PERP.A", "A", "SOL", "USDT", true),
        ]
    }

    #[test]
    fn keeps_one_usdt_perpetual_per_supported_exchange() {
        let universe = select_instruments(&sample_listing(), ExchangeRegistry);

        assert_eq!(universe.joined(Asset::Btc), "BTCUSDT_PERP.A,BTCUSDT.6,BTCUSDT_PERP.3");
        assert_eq!(universe.joined(Asset::Eth), "ETHUSDT_PERP.A,ETHUSDT_PERP.B");
    }

    #[test]
    fn selection_is_deterministic() {
        let listings = sample_listing();
        let first = select_instruments(&listings, ExchangeRegistry);
        let second = select_instruments(&listings, ExchangeRegistry);
        assert_eq!(first, second);
    }

    #[test]
    fn first_candidate_wins_when_none_is_usdt() {
        let listings = vec![
            listing("BTCUSD_PERP.A", "A", "BTC", "USD", true),
            listing("BTCUSDC_PERP.A", "A", "BTC", "USDC", true),
        ];
        let universe = select_instruments(&listings, ExchangeRegistry);
        assert_eq!(universe.joined(Asset::Btc), "BTCUSD_PERP.A");
    }

    #[test]
    fn fallback_covers_every_supported_exchange() {
        let universe = InstrumentUniverse::fallback();
        for asset in Asset::ALL {
            let codes = universe
                .for_asset(asset)
                .iter()
                .map(|id| id.exchange_code().to_owned())
                .collect::<Vec<_>>();
            assert_eq!(codes, SUPPORTED_EXCHANGE_CODES.to_vec());
        }
        assert_eq!(universe.asset_of("ethusdt.6"), Some(Asset::Eth));
    }
}
