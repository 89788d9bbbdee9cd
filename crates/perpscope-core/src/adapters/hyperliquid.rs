use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::adapters::parse_decimal;
use crate::data_source::{
    CapabilitySet, CurrentBatch, CurrentRequest, DerivativesSource, HistoryBatch, HistoryRequest,
    SourceError, SourceFuture,
};
use crate::http_client::{HttpAuth, HttpClient};
use crate::request_client::RequestClient;
use crate::source_policy::SourcePolicy;
use crate::{
    Asset, ExchangeRegistry, HistoryMetric, HistoryPoint, HistoryValue, Metric, MetricPoint,
    SourceTag, Timestamp,
};

pub const HYPERLIQUID_BASE_URL: &str = "https://api.hyperliquid.xyz";

const INFO_PATH: &str = "/info";
const EXCHANGE_CODE: &str = "H";

/// Funding settles hourly; the internal unit is per 8 hours.
const HOURS_PER_FUNDING_PERIOD: f64 = 8.0;

/// Decentralized-exchange adapter.
///
/// One `metaAndAssetCtxs` call covers every listed asset. Funding history
/// comes from `fundingHistory`, one call per asset.
#[derive(Clone)]
pub struct HyperliquidAdapter {
    client: RequestClient,
    exchange: String,
}

impl HyperliquidAdapter {
    pub fn new(http: Arc<dyn HttpClient>, policy: SourcePolicy) -> Self {
        Self::with_base_url(http, policy, HYPERLIQUID_BASE_URL)
    }

    pub fn with_base_url(http: Arc<dyn HttpClient>, policy: SourcePolicy, base_url: &str) -> Self {
        Self {
            client: RequestClient::new(policy, base_url, http, HttpAuth::None),
            exchange: ExchangeRegistry.display_name(EXCHANGE_CODE).into_owned(),
        }
    }

    fn instrument(asset: Asset) -> String {
        format!("{}-PERP.{EXCHANGE_CODE}", asset.as_str())
    }

    fn normalize_contexts(&self, body: Value, observed_at: Timestamp) -> Result<Vec<MetricPoint>, SourceError> {
        let (meta, contexts): (HyperliquidMeta, Vec<HyperliquidAssetContext>) =
            serde_json::from_value(body).map_err(|err| {
                SourceError::decode(format!("hyperliquid metaAndAssetCtxs response: {err}"))
            })?;

        let mut points = Vec::new();
        for asset in Asset::ALL {
            // Contexts are aligned with the universe by index.
            let Some(context) = meta
                .universe
                .iter()
                .position(|entry| entry.name.eq_ignore_ascii_case(asset.as_str()))
                .and_then(|index| contexts.get(index))
            else {
                continue;
            };

            let point = |metric: Metric, value: f64| MetricPoint {
                source: SourceTag::Hyperliquid,
                asset,
                metric,
                exchange: self.exchange.clone(),
                instrument: Self::instrument(asset),
                value,
                observed_at,
            };

            let open_interest = parse_decimal(context.open_interest.as_deref())
                .zip(parse_decimal(context.mark_px.as_deref()))
                .map(|(contracts, mark)| contracts * mark);
            if let Some(value) = open_interest {
                points.push(point(Metric::OpenInterest, value));
            }
            if let Some(hourly) = parse_decimal(context.funding.as_deref()) {
                points.push(point(Metric::FundingRate, hourly * HOURS_PER_FUNDING_PERIOD));
            }
        }

        Ok(points)
    }

    fn bucket_funding(
        &self,
        asset: Asset,
        body: Value,
        req: &HistoryRequest<'_>,
    ) -> Result<Vec<HistoryPoint>, SourceError> {
        let rows: Vec<HyperliquidFundingRow> = serde_json::from_value(body).map_err(|err| {
            SourceError::decode(format!("hyperliquid fundingHistory response: {err}"))
        })?;

        let width = req.window.interval.width_ms();
        let mut buckets: BTreeMap<i64, (i64, f64)> = BTreeMap::new();
        for row in rows {
            let Some(hourly) = parse_decimal(row.funding_rate.as_deref()) else {
                continue;
            };
            let bucket = Timestamp::from_millis(row.time).floor_to(width).as_millis();
            let entry = buckets.entry(bucket).or_insert((row.time, hourly));
            if row.time >= entry.0 {
                *entry = (row.time, hourly);
            }
        }

        Ok(buckets
            .into_iter()
            .map(|(bucket, (_, hourly))| HistoryPoint {
                source: SourceTag::Hyperliquid,
                asset,
                metric: HistoryMetric::FundingRate,
                exchange: self.exchange.clone(),
                instrument: Self::instrument(asset),
                t: Timestamp::from_millis(bucket),
                value: HistoryValue::Close {
                    value: hourly * HOURS_PER_FUNDING_PERIOD,
                },
            })
            .collect())
    }
}

impl DerivativesSource for HyperliquidAdapter {
    fn tag(&self) -> SourceTag {
        SourceTag::Hyperliquid
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::full()
    }

    fn current<'a>(&'a self, _req: CurrentRequest<'a>) -> SourceFuture<'a, CurrentBatch> {
        Box::pin(async move {
            let body = self
                .client
                .post(INFO_PATH, &json!({ "type": "metaAndAssetCtxs" }))
                .await?;
            let points = self.normalize_contexts(body, Timestamp::now())?;
            Ok(CurrentBatch { points })
        })
    }

    fn history<'a>(&'a self, req: HistoryRequest<'a>) -> SourceFuture<'a, HistoryBatch> {
        Box::pin(async move {
            let mut points = Vec::new();
            for asset in Asset::ALL {
                let body = self
                    .client
                    .post(
                        INFO_PATH,
                        &json!({
                            "type": "fundingHistory",
                            "coin": asset.as_str(),
                            "startTime": req.start().as_millis(),
                            "endTime": req.end.as_millis(),
                        }),
                    )
                    .await?;
                points.extend(self.bucket_funding(asset, body, &req)?);
            }
            Ok(HistoryBatch { points })
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
struct HyperliquidMeta {
    #[serde(default)]
    universe: Vec<HyperliquidUniverseEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct HyperliquidUniverseEntry {
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct HyperliquidAssetContext {
    #[serde(default)]
    funding: Option<String>,
    #[serde(rename = "openInterest", default)]
    open_interest: Option<String>,
    #[serde(rename = "markPx", default)]
    mark_px: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct HyperliquidFundingRow {
    #[serde(rename = "fundingRate", default)]
    funding_rate: Option<String>,
    time: i64,
}
