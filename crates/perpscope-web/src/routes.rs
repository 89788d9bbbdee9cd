//! Dashboard API.
//!
//! | Route | Body |
//! |-------|------|
//! | `GET /api/open-interest/:coin` | `{coin, total, byExchange, timestamp}` |
//! | `GET /api/funding-rate/:coin` | `{coin, average, byExchange, timestamp}` |
//! | `GET /api/open-interest-history/:coin` | `{coin, history: [{t, value}], timestamp}` |
//! | `GET /api/funding-rate-history/:coin` | `{coin, history: [{t, value}], timestamp}` |
//! | `GET /api/long-short-history/:coin` | `{coin, history: [{t, ratio, long, short}], timestamp}` |
//! | `GET /api/trend/:coin` | `{coin, trend, confidence, signals, reasons, timestamp}` |
//! | `GET /api/debug` | internal state dump |
//! | `GET /health` | `{status, hasData, lastUpdate}` |
//!
//! Funding values leave the API in percent per 8 hours.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use perpscope_core::{
    Asset, AssetSnapshot, ExchangeValue, LongShortBucket, MarketSnapshot, SeriesPoint,
    TrendAssessment,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::state::AppState;

const PERCENT: f64 = 100.0;

pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/api/open-interest/:coin", get(open_interest))
        .route("/api/funding-rate/:coin", get(funding_rate))
        .route("/api/open-interest-history/:coin", get(open_interest_history))
        .route("/api/funding-rate-history/:coin", get(funding_rate_history))
        .route("/api/long-short-history/:coin", get(long_short_history))
        .route("/api/trend/:coin", get(trend))
        .route("/api/debug", get(debug))
        .route("/health", get(health))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OpenInterestBody {
    coin: Asset,
    total: f64,
    by_exchange: Vec<ExchangeValue>,
    timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FundingBody {
    coin: Asset,
    average: Option<f64>,
    by_exchange: Vec<ExchangeValue>,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct HistoryBody<T> {
    coin: Asset,
    history: Vec<T>,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct TrendBody {
    coin: Asset,
    #[serde(flatten)]
    assessment: TrendAssessment,
    timestamp: String,
}

/// Resolves the path coin and the snapshot entry for it.
async fn asset_view(
    state: &AppState,
    coin: &str,
) -> Result<(Asset, Arc<MarketSnapshot>), ApiError> {
    let asset = coin.parse::<Asset>()?;
    let snapshot = state.snapshot().await?;
    Ok((asset, snapshot))
}

fn asset_of(snapshot: &MarketSnapshot, asset: Asset) -> &AssetSnapshot {
    snapshot.assets.get(asset)
}

fn to_percent(rows: &[ExchangeValue]) -> Vec<ExchangeValue> {
    rows.iter()
        .map(|row| ExchangeValue {
            exchange: row.exchange.clone(),
            value: row.value * PERCENT,
        })
        .collect()
}

async fn open_interest(
    State(state): State<AppState>,
    Path(coin): Path<String>,
) -> Result<Json<OpenInterestBody>, ApiError> {
    let (asset, snapshot) = asset_view(&state, &coin).await?;
    let summary = &asset_of(&snapshot, asset).aggregates.open_interest;
    Ok(Json(OpenInterestBody {
        coin: asset,
        total: summary.total,
        by_exchange: summary.by_exchange.clone(),
        timestamp: snapshot.updated_at.format_rfc3339(),
    }))
}

async fn funding_rate(
    State(state): State<AppState>,
    Path(coin): Path<String>,
) -> Result<Json<FundingBody>, ApiError> {
    let (asset, snapshot) = asset_view(&state, &coin).await?;
    let summary = &asset_of(&snapshot, asset).aggregates.funding;
    Ok(Json(FundingBody {
        coin: asset,
        average: summary.average.map(|average| average * PERCENT),
        by_exchange: to_percent(&summary.by_exchange),
        timestamp: snapshot.updated_at.format_rfc3339(),
    }))
}

async fn open_interest_history(
    State(state): State<AppState>,
    Path(coin): Path<String>,
) -> Result<Json<HistoryBody<SeriesPoint>>, ApiError> {
    let (asset, snapshot) = asset_view(&state, &coin).await?;
    Ok(Json(HistoryBody {
        coin: asset,
        history: asset_of(&snapshot, asset).aggregates.open_interest_history.clone(),
        timestamp: snapshot.updated_at.format_rfc3339(),
    }))
}

async fn funding_rate_history(
    State(state): State<AppState>,
    Path(coin): Path<String>,
) -> Result<Json<HistoryBody<SeriesPoint>>, ApiError> {
    let (asset, snapshot) = asset_view(&state, &coin).await?;
    let history = asset_of(&snapshot, asset)
        .aggregates
        .funding_history
        .iter()
        .map(|point| SeriesPoint {
            t: point.t,
            value: point.value * PERCENT,
        })
        .collect();
    Ok(Json(HistoryBody {
        coin: asset,
        history,
        timestamp: snapshot.updated_at.format_rfc3339(),
    }))
}

async fn long_short_history(
    State(state): State<AppState>,
    Path(coin): Path<String>,
) -> Result<Json<HistoryBody<LongShortBucket>>, ApiError> {
    let (asset, snapshot) = asset_view(&state, &coin).await?;
    Ok(Json(HistoryBody {
        coin: asset,
        history: asset_of(&snapshot, asset).aggregates.long_short_history.clone(),
        timestamp: snapshot.updated_at.format_rfc3339(),
    }))
}

async fn trend(
    State(state): State<AppState>,
    Path(coin): Path<String>,
) -> Result<Json<TrendBody>, ApiError> {
    let (asset, snapshot) = asset_view(&state, &coin).await?;
    Ok(Json(TrendBody {
        coin: asset,
        assessment: asset_of(&snapshot, asset).trend.clone(),
        timestamp: snapshot.updated_at.format_rfc3339(),
    }))
}

/// Never 503s: reports whatever state exists, including before the first refresh.
async fn debug(State(state): State<AppState>) -> Json<Value> {
    let snapshot = state.store.latest().await;
    let universe = snapshot
        .as_ref()
        .map(|snapshot| &snapshot.universe)
        .unwrap_or_else(|| state.universe.as_ref());

    Json(json!({
        "symbols": {
            "btc": universe.universe.for_asset(Asset::Btc),
            "eth": universe.universe.for_asset(Asset::Eth),
        },
        "fallbackUsed": universe.fallback_used,
        "resolutionError": universe.failure,
        "lastUpdate": snapshot.as_ref().map(|snapshot| snapshot.updated_at.format_rfc3339()),
        "isRefreshing": state.store.is_refreshing(),
        "sources": snapshot.as_ref().map(|snapshot| &snapshot.diagnostics.sources),
        "droppedFundingValues": snapshot
            .as_ref()
            .map(|snapshot| snapshot.diagnostics.dropped_funding_values),
        "durationMs": snapshot.as_ref().map(|snapshot| snapshot.diagnostics.duration_ms),
        "rawSample": snapshot.as_ref().map(|snapshot| &snapshot.diagnostics.raw_sample),
    }))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let snapshot = state.store.latest().await;
    Json(json!({
        "status": "ok",
        "hasData": snapshot.is_some(),
        "lastUpdate": snapshot.map(|snapshot| snapshot.updated_at.format_rfc3339()),
    }))
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use perpscope_core::{
        AnalysisConfig, CoinalyzeAdapter, DerivativesSource, HistoryWindow, InstrumentId,
        InstrumentUniverse, RefreshPipeline, RefreshScheduler, ResolvedUniverse,
        ScriptedHttpClient, SnapshotStore, SourcePolicy, SourceTag,
    };
    use tower::ServiceExt;

    use super::*;

    fn universe() -> ResolvedUniverse {
        ResolvedUniverse {
            universe: InstrumentUniverse::new(
                vec![
                    InstrumentId::parse("BTCUSDT_PERP.A").expect("valid"),
                    InstrumentId::parse("BTCUSDT.6").expect("valid"),
                ],
                Vec::new(),
            ),
            fallback_used: false,
            failure: None,
        }
    }

    fn scripted_aggregator() -> Arc<ScriptedHttpClient> {
        Arc::new(
            ScriptedHttpClient::new()
                .route_json(
                    "/open-interest?",
                    r#"[{"symbol":"BTCUSDT_PERP.A","value":100,"update":1700000000000},
                        {"symbol":"BTCUSDT.6","value":50,"update":1700000000000}]"#,
                )
                .route_json(
                    "/funding-rate?",
                    r#"[{"symbol":"BTCUSDT_PERP.A","value":0.01,"update":1700000000000},
                        {"symbol":"BTCUSDT.6","value":0.03,"update":1700000000000}]"#,
                )
                .route_json("history", "[]"),
        )
    }

    async fn populated_state() -> AppState {
        let adapter = CoinalyzeAdapter::with_base_url(
            scripted_aggregator(),
            Some("key"),
            SourcePolicy::immediate(SourceTag::Coinalyze),
            "https://coinalyze.test/v1",
        );
        let sources: Vec<Arc<dyn DerivativesSource>> = vec![Arc::new(adapter)];
        let pipeline = RefreshPipeline::new(
            sources,
            universe(),
            HistoryWindow::day(),
            AnalysisConfig::default(),
        );
        let store = SnapshotStore::new();
        let scheduler = RefreshScheduler::new(
            Arc::new(pipeline),
            store.clone(),
            std::time::Duration::from_secs(60),
        );
        scheduler.try_refresh().await;
        AppState::new(store, universe())
    }

    async fn get_json(state: AppState, uri: &str) -> (StatusCode, Value) {
        let response = api_router()
            .with_state(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).expect("request"))
            .await
            .expect("router responds");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn open_interest_sums_exchanges_sorted_descending() {
        let (status, body) = get_json(populated_state().await, "/api/open-interest/BTC").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["coin"], "BTC");
        assert_eq!(body["total"], 150.0);
        assert_eq!(
            body["byExchange"],
            json!([
                { "exchange": "Binance", "value": 100.0 },
                { "exchange": "Bybit", "value": 50.0 }
            ])
        );
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn funding_is_reported_in_percent() {
        let (status, body) = get_json(populated_state().await, "/api/funding-rate/btc").await;

        assert_eq!(status, StatusCode::OK);
        let average = body["average"].as_f64().expect("average present");
        assert!((average - 0.02).abs() < 1e-9);
        assert_eq!(body["byExchange"][0]["exchange"], "Bybit");
    }

    #[tokio::test]
    async fn trend_and_history_routes_serve_the_snapshot() {
        let state = populated_state().await;

        let (status, body) = get_json(state.clone(), "/api/trend/BTC").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["trend"], "bullish");
        assert_eq!(body["confidence"], "low");
        assert_eq!(body["signals"], json!({ "bullish": 1, "bearish": 0 }));

        let (status, body) = get_json(state, "/api/long-short-history/BTC").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["history"], json!([]));
    }

    #[tokio::test]
    async fn invalid_coin_is_a_bad_request() {
        let (status, body) = get_json(populated_state().await, "/api/open-interest/DOGE").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap_or_default().contains("DOGE"));
    }

    #[tokio::test]
    async fn empty_store_reports_loading_but_stays_healthy() {
        let state = AppState::new(SnapshotStore::new(), universe());

        let (status, body) = get_json(state.clone(), "/api/trend/ETH").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "loading");

        let (status, body) = get_json(state.clone(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["hasData"], false);

        let (status, body) = get_json(state, "/api/debug").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["symbols"]["btc"], json!(["BTCUSDT_PERP.A", "BTCUSDT.6"]));
        assert_eq!(body["isRefreshing"], false);
    }
}
