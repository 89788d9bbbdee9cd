use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::adapters::{finite, normalize_epoch};
use crate::data_source::{
    CapabilitySet, CurrentBatch, CurrentRequest, DerivativesSource, HistoryBatch, HistoryRequest,
    SourceError, SourceFuture,
};
use crate::http_client::{HttpAuth, HttpClient};
use crate::request_client::RequestClient;
use crate::source_policy::SourcePolicy;
use crate::{
    Asset, ExchangeRegistry, HistoryMetric, HistoryPoint, HistoryValue, InstrumentId, Metric,
    MetricPoint, SourceTag, Timestamp,
};

pub const COINALYZE_BASE_URL: &str = "https://api.coinalyze.net/v1";

const OPEN_INTEREST_PATH: &str = "/open-interest";
const FUNDING_RATE_PATH: &str = "/funding-rate";
const OPEN_INTEREST_HISTORY_PATH: &str = "/open-interest-history";
const FUNDING_RATE_HISTORY_PATH: &str = "/funding-rate-history";
const LONG_SHORT_HISTORY_PATH: &str = "/long-short-ratio-history";

/// Funding is reported in percent per 8h.
const PERCENT: f64 = 100.0;

/// Metrics-aggregator adapter.
///
/// Issues one call per asset per metric with the resolved instruments joined
/// into `symbols`. Calls share one [`RequestClient`], so they are serialized
/// with the configured inter-call delay.
#[derive(Clone)]
pub struct CoinalyzeAdapter {
    client: RequestClient,
    registry: ExchangeRegistry,
}

impl CoinalyzeAdapter {
    pub fn new(http: Arc<dyn HttpClient>, api_key: Option<&str>, policy: SourcePolicy) -> Self {
        Self::with_base_url(http, api_key, policy, COINALYZE_BASE_URL)
    }

    pub fn with_base_url(
        http: Arc<dyn HttpClient>,
        api_key: Option<&str>,
        policy: SourcePolicy,
        base_url: &str,
    ) -> Self {
        let auth = api_key
            .map(|key| HttpAuth::header("api_key", key))
            .unwrap_or(HttpAuth::None);
        Self {
            client: RequestClient::new(policy, base_url, http, auth),
            registry: ExchangeRegistry,
        }
    }

    /// Shared client, also used by the symbol resolver so both respect one throttle.
    pub fn client(&self) -> &RequestClient {
        &self.client
    }

    async fn fetch_current(
        &self,
        asset: Asset,
        symbols: String,
        fallback_time: Timestamp,
    ) -> Result<Vec<MetricPoint>, SourceError> {
        let oi_params = [
            ("symbols", symbols.clone()),
            ("convert_to_usd", String::from("true")),
        ];
        let open_interest = self.client.get(OPEN_INTEREST_PATH, &oi_params).await?;
        let funding = self
            .client
            .get(FUNDING_RATE_PATH, &[("symbols", symbols)])
            .await?;

        let mut points = self.normalize_current(asset, Metric::OpenInterest, open_interest, fallback_time)?;
        points.extend(self.normalize_current(asset, Metric::FundingRate, funding, fallback_time)?);
        Ok(points)
    }

    async fn fetch_history(
        &self,
        asset: Asset,
        symbols: String,
        req: &HistoryRequest<'_>,
    ) -> Result<Vec<HistoryPoint>, SourceError> {
        let window = [
            ("symbols", symbols),
            ("interval", req.window.interval.as_str().to_owned()),
            ("from", req.start().as_secs().to_string()),
            ("to", req.end.as_secs().to_string()),
        ];
        let mut oi_params = window.to_vec();
        oi_params.push(("convert_to_usd", String::from("true")));

        let open_interest = self
            .client
            .get(OPEN_INTEREST_HISTORY_PATH, &oi_params)
            .await?;
        let funding = self.client.get(FUNDING_RATE_HISTORY_PATH, &window).await?;
        let long_short = self.client.get(LONG_SHORT_HISTORY_PATH, &window).await?;

        let mut points = self.normalize_history(asset, HistoryMetric::OpenInterest, open_interest)?;
        points.extend(self.normalize_history(asset, HistoryMetric::FundingRate, funding)?);
        points.extend(self.normalize_history(asset, HistoryMetric::LongShort, long_short)?);
        Ok(points)
    }

    fn exchange_for(&self, instrument: &InstrumentId) -> String {
        self.registry
            .display_name(instrument.exchange_code())
            .into_owned()
    }

    fn normalize_current(
        &self,
        asset: Asset,
        metric: Metric,
        body: Value,
        fallback_time: Timestamp,
    ) -> Result<Vec<MetricPoint>, SourceError> {
        let rows: Vec<CoinalyzeCurrentRow> = decode(body, metric_label(metric))?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let instrument = InstrumentId::parse(&row.symbol).ok()?;
                let value = finite(row.value)?;
                let value = match metric {
                    Metric::OpenInterest => value,
                    Metric::FundingRate => value / PERCENT,
                };
                Some(MetricPoint {
                    source: SourceTag::Coinalyze,
                    asset,
                    metric,
                    exchange: self.exchange_for(&instrument),
                    instrument: instrument.as_str().to_owned(),
                    value,
                    observed_at: row.update.map(normalize_epoch).unwrap_or(fallback_time),
                })
            })
            .collect())
    }

    fn normalize_history(
        &self,
        asset: Asset,
        metric: HistoryMetric,
        body: Value,
    ) -> Result<Vec<HistoryPoint>, SourceError> {
        let series: Vec<CoinalyzeHistorySeries> = decode(body, metric.as_str())?;
        let mut points = Vec::new();

        for entry in series {
            let Ok(instrument) = InstrumentId::parse(&entry.symbol) else {
                continue;
            };
            let exchange = self.exchange_for(&instrument);

            for bucket in entry.history {
                let Some(value) = bucket.value_for(metric) else {
                    continue;
                };
                points.push(HistoryPoint {
                    source: SourceTag::Coinalyze,
                    asset,
                    metric,
                    exchange: exchange.clone(),
                    instrument: instrument.as_str().to_owned(),
                    t: normalize_epoch(bucket.t),
                    value,
                });
            }
        }

        Ok(points)
    }
}

impl DerivativesSource for CoinalyzeAdapter {
    fn tag(&self) -> SourceTag {
        SourceTag::Coinalyze
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::full()
    }

    fn current<'a>(&'a self, req: CurrentRequest<'a>) -> SourceFuture<'a, CurrentBatch> {
        Box::pin(async move {
            let now = Timestamp::now();
            let mut points = Vec::new();
            for asset in Asset::ALL {
                if req.universe.for_asset(asset).is_empty() {
                    continue;
                }
                points.extend(
                    self.fetch_current(asset, req.universe.joined(asset), now)
                        .await?,
                );
            }
            Ok(CurrentBatch { points })
        })
    }

    fn history<'a>(&'a self, req: HistoryRequest<'a>) -> SourceFuture<'a, HistoryBatch> {
        Box::pin(async move {
            let mut points = Vec::new();
            for asset in Asset::ALL {
                if req.universe.for_asset(asset).is_empty() {
                    continue;
                }
                points.extend(
                    self.fetch_history(asset, req.universe.joined(asset), &req)
                        .await?,
                );
            }
            Ok(HistoryBatch { points })
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
struct CoinalyzeCurrentRow {
    symbol: String,
    #[serde(default)]
    value: Option<f64>,
    #[serde(default)]
    update: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
struct CoinalyzeHistorySeries {
    symbol: String,
    #[serde(default)]
    history: Vec<CoinalyzeBucket>,
}

#[derive(Debug, Clone, Deserialize)]
struct CoinalyzeBucket {
    t: i64,
    #[serde(default)]
    c: Option<f64>,
    #[serde(default)]
    r: Option<f64>,
    #[serde(default)]
    l: Option<f64>,
    #[serde(default)]
    s: Option<f64>,
}

impl CoinalyzeBucket {
    fn value_for(&self, metric: HistoryMetric) -> Option<HistoryValue> {
        match metric {
            HistoryMetric::OpenInterest => finite(self.c).map(|value| HistoryValue::Close { value }),
            HistoryMetric::FundingRate => finite(self.c).map(|value| HistoryValue::Close {
                value: value / PERCENT,
            }),
            HistoryMetric::LongShort => Some(HistoryValue::LongShort {
                ratio: finite(self.r)?,
                long: finite(self.l)?,
                short: finite(self.s)?,
            }),
        }
    }
}

fn metric_label(metric: Metric) -> &'static str {
    match metric {
        Metric::OpenInterest => "open_interest",
        Metric::FundingRate => "funding_rate",
    }
}

fn decode<T: serde::de::DeserializeOwned>(body: Value, label: &str) -> Result<T, SourceError> {
    serde_json::from_value(body)
        .map_err(|err| SourceError::decode(format!("coinalyze {label} response: {err}")))
}
