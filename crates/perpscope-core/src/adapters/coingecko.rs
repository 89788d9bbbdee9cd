use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::adapters::finite;
use crate::data_source::{
    CapabilitySet, CurrentBatch, CurrentRequest, DerivativesSource, HistoryBatch, HistoryRequest,
    SourceError, SourceFuture,
};
use crate::http_client::{HttpAuth, HttpClient};
use crate::request_client::RequestClient;
use crate::source_policy::SourcePolicy;
use crate::{Asset, Metric, MetricPoint, SourceTag, Timestamp};

pub const COINGECKO_BASE_URL: &str = "https://api.coingecko.com/api/v3";

const DERIVATIVES_PATH: &str = "/derivatives";
const DEMO_KEY_HEADER: &str = "x-cg-demo-api-key";
const PERPETUAL: &str = "perpetual";
const PERCENT: f64 = 100.0;

/// Secondary aggregator adapter.
///
/// One listing call across every tracked exchange, grouped by market name.
/// Current values only; there is no history endpoint.
#[derive(Clone)]
pub struct CoingeckoAdapter {
    client: RequestClient,
}

impl CoingeckoAdapter {
    pub fn new(http: Arc<dyn HttpClient>, api_key: Option<&str>, policy: SourcePolicy) -> Self {
        Self::with_base_url(http, api_key, policy, COINGECKO_BASE_URL)
    }

    pub fn with_base_url(
        http: Arc<dyn HttpClient>,
        api_key: Option<&str>,
        policy: SourcePolicy,
        base_url: &str,
    ) -> Self {
        let auth = api_key
            .map(|key| HttpAuth::header(DEMO_KEY_HEADER, key))
            .unwrap_or(HttpAuth::None);
        Self {
            client: RequestClient::new(policy, base_url, http, auth),
        }
    }
}

/// Per-(asset, market) accumulator.
#[derive(Debug, Default)]
struct MarketGroup {
    open_interest: Option<f64>,
    funding_sum: f64,
    funding_count: u32,
    volume_sum: f64,
    volume_count: u32,
}

impl MarketGroup {
    fn add(&mut self, row: &CoingeckoDerivative) {
        if let Some(open_interest) = finite(row.open_interest) {
            *self.open_interest.get_or_insert(0.0) += open_interest;
        }
        if let Some(funding) = finite(row.funding_rate) {
            self.funding_sum += funding;
            self.funding_count += 1;
        }
        if let Some(volume) = finite(row.volume_24h) {
            self.volume_sum += volume;
            self.volume_count += 1;
        }
    }

    fn funding_average(&self) -> Option<f64> {
        (self.funding_count > 0).then(|| self.funding_sum / f64::from(self.funding_count))
    }

    fn volume_average(&self) -> Option<f64> {
        (self.volume_count > 0).then(|| self.volume_sum / f64::from(self.volume_count))
    }
}

fn asset_for_symbol(symbol: &str) -> Option<Asset> {
    let symbol = symbol.to_ascii_uppercase();
    let mut matches = Asset::ALL
        .into_iter()
        .filter(|asset| symbol.contains(asset.as_str()));
    let asset = matches.next()?;
    // Cross pairs such as ETHBTC belong to neither asset.
    matches.next().is_none().then_some(asset)
}

/// `"Binance (Futures)"` is displayed as `"Binance"`.
fn market_display_name(market: &str) -> String {
    market
        .split('(')
        .next()
        .unwrap_or(market)
        .trim()
        .to_owned()
}

fn group_by_market(rows: &[CoingeckoDerivative], observed_at: Timestamp) -> Vec<MetricPoint> {
    let mut groups: BTreeMap<(Asset, String), MarketGroup> = BTreeMap::new();

    for row in rows {
        let perpetual = row
            .contract_type
            .as_deref()
            .is_some_and(|kind| kind.eq_ignore_ascii_case(PERPETUAL));
        if !perpetual {
            continue;
        }
        let Some(asset) = asset_for_symbol(&row.symbol) else {
            continue;
        };
        let market = market_display_name(&row.market);
        if market.is_empty() {
            continue;
        }
        groups.entry((asset, market)).or_default().add(row);
    }

    let mut points = Vec::new();
    for ((asset, exchange), group) in groups {
        debug!(
            asset = asset.as_str(),
            exchange = %exchange,
            volume_24h = group.volume_average().unwrap_or_default(),
            "grouped secondary aggregator market"
        );
        let point = |metric: Metric, value: f64| MetricPoint {
            source: SourceTag::Coingecko,
            asset,
            metric,
            exchange: exchange.clone(),
            instrument: format!("{}:{}", exchange, asset.as_str()),
            value,
            observed_at,
        };
        if let Some(open_interest) = group.open_interest {
            points.push(point(Metric::OpenInterest, open_interest));
        }
        if let Some(funding) = group.funding_average() {
            points.push(point(Metric::FundingRate, funding / PERCENT));
        }
    }
    points
}

impl DerivativesSource for CoingeckoAdapter {
    fn tag(&self) -> SourceTag {
        SourceTag::Coingecko
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::current_only()
    }

    fn current<'a>(&'a self, _req: CurrentRequest<'a>) -> SourceFuture<'a, CurrentBatch> {
        Box::pin(async move {
            let body = self.client.get(DERIVATIVES_PATH, &[]).await?;
            let rows: Vec<CoingeckoDerivative> = serde_json::from_value(body).map_err(|err| {
                SourceError::decode(format!("coingecko derivatives response: {err}"))
            })?;
            Ok(CurrentBatch {
                points: group_by_market(&rows, Timestamp::now()),
            })
        })
    }

    fn history<'a>(&'a self, _req: HistoryRequest<'a>) -> SourceFuture<'a, HistoryBatch> {
        Box::pin(async move { Err(SourceError::unsupported_endpoint(SourceTag::Coingecko, "history")) })
    }
}

#[derive(Debug, Clone, Deserialize)]
struct CoingeckoDerivative {
    market: String,
    symbol: String,
    #[serde(default)]
    contract_type: Option<String>,
    #[serde(default)]
    funding_rate: Option<f64>,
    #[serde(default)]
    open_interest: Option<f64>,
    #[serde(default)]
    volume_24h: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_source::SourceErrorKind;
    use crate::http_client::ScriptedHttpClient;
    use crate::symbols::InstrumentUniverse;
    use crate::HistoryWindow;

    const LISTING: &str = r#"[
        {"market":"Binance (Futures)","symbol":"BTCUSDT","contract_type":"perpetual","funding_rate":0.01,"open_interest":1000.0,"volume_24h":10.0},
        {"market":"Binance (Futures)","symbol":"BTCUSD_PERP","contract_type":"perpetual","funding_rate":0.03,"open_interest":500.0,"volume_24h":30.0},
        {"market":"Binance (Futures)","symbol":"BTCUSDT_240628","contract_type":"futures","funding_rate":0.5,"open_interest":9999.0},
        {"market":"Gate.io (Futures)","symbol":"ETH_USDT","contract_type":"perpetual","funding_rate":-0.02,"open_interest":null},
        {"market":"Kraken (Futures)","symbol":"ETHBTC","contract_type":"perpetual","funding_rate":0.01,"open_interest":1.0}
    ]"#;

    fn adapter(http: Arc<ScriptedHttpClient>, key: Option<&str>) -> CoingeckoAdapter {
        CoingeckoAdapter::with_base_url(
            http,
            key,
            SourcePolicy::immediate(SourceTag::Coingecko),
            "https://coingecko.test/api/v3",
        )
    }

    #[tokio::test]
    async fn groups_perpetuals_by_market() {
        let http = Arc::new(ScriptedHttpClient::new().route_json("/derivatives", LISTING));
        let universe = InstrumentUniverse::default();

        let batch = adapter(http.clone(), Some("demo-key"))
            .current(CurrentRequest { universe: &universe })
            .await
            .expect("current succeeds");

        let btc = batch
            .points
            .iter()
            .filter(|point| point.asset == Asset::Btc)
            .map(|point| (point.exchange.as_str(), point.metric, point.value))
            .collect::<Vec<_>>();
        assert_eq!(btc.len(), 2);
        assert_eq!(btc[0], ("Binance", Metric::OpenInterest, 1500.0));
        assert_eq!(btc[1].0, "Binance");
        assert!((btc[1].2 - 0.0002).abs() < 1e-12);

        let eth = batch
            .points
            .iter()
            .filter(|point| point.asset == Asset::Eth)
            .collect::<Vec<_>>();
        assert_eq!(eth.len(), 1);
        assert_eq!(eth[0].exchange, "Gate.io");
        assert_eq!(eth[0].metric, Metric::FundingRate);

        let request = &http.recorded_requests()[0];
        assert_eq!(
            request.headers.get(DEMO_KEY_HEADER).map(String::as_str),
            Some("demo-key")
        );
    }

    #[tokio::test]
    async fn history_is_unsupported() {
        let universe = InstrumentUniverse::default();
        let req = HistoryRequest {
            universe: &universe,
            window: HistoryWindow::day(),
            end: Timestamp::from_secs(1_700_000_000),
        };

        let error = adapter(Arc::new(ScriptedHttpClient::new()), None)
            .history(req)
            .await
            .expect_err("must be unsupported");
        assert_eq!(error.kind(), SourceErrorKind::UnsupportedEndpoint);
    }

    #[test]
    fn cross_pairs_match_no_asset() {
        assert_eq!(asset_for_symbol("btcusdt"), Some(Asset::Btc));
        assert_eq!(asset_for_symbol("ETHBTC"), None);
        assert_eq!(asset_for_symbol("SOLUSDT"), None);
    }
}
