use std::sync::Arc;

use perpscope_core::{
    CoingeckoAdapter, CoinalyzeAdapter, CurrentRequest, DerivativesSource, HistoryRequest,
    HistoryWindow, HttpResponse, HyperliquidAdapter, InstrumentUniverse, Metric,
    ScriptedHttpClient, SourceErrorKind, SourcePolicy, SourceTag, Timestamp,
};

const WINDOW_END_MS: i64 = 1_700_006_400_000;

fn healthy_upstreams() -> Arc<ScriptedHttpClient> {
    Arc::new(
        ScriptedHttpClient::new()
            .route_json(
                "/open-interest?",
                r#"[{"symbol":"BTCUSDT_PERP.A","value":1000,"update":1700000000000}]"#,
            )
            .route_json(
                "/funding-rate?",
                r#"[{"symbol":"BTCUSDT_PERP.A","value":0.01,"update":1700000000}]"#,
            )
            .route_json(
                "/open-interest-history",
                r#"[{"symbol":"BTCUSDT_PERP.A","history":[{"t":1700000000,"c":900}]}]"#,
            )
            .route_json(
                "/funding-rate-history",
                r#"[{"symbol":"BTCUSDT_PERP.A","history":[{"t":1700000000,"c":0.01}]}]"#,
            )
            .route_json(
                "/long-short-ratio-history",
                r#"[{"symbol":"BTCUSDT_PERP.A","history":[{"t":1700000000,"r":1.2,"l":54.5,"s":45.5}]}]"#,
            )
            .route_json(
                "metaAndAssetCtxs",
                r#"[{"universe":[{"name":"BTC"},{"name":"ETH"}]},
                    [{"funding":"0.0000125","openInterest":"10","markPx":"100"},
                     {"funding":"-0.00001","openInterest":"4","markPx":"50"}]]"#,
            )
            .route_json(
                "fundingHistory",
                r#"[{"coin":"BTC","fundingRate":"0.0000125","time":1700000000000}]"#,
            )
            .route_json(
                "/derivatives",
                r#"[{"market":"OKX (Futures)","symbol":"BTC-USDT-SWAP","contract_type":"perpetual","funding_rate":0.01,"open_interest":250}]"#,
            ),
    )
}

fn all_sources(http: Arc<ScriptedHttpClient>) -> Vec<Arc<dyn DerivativesSource>> {
    vec![
        Arc::new(CoinalyzeAdapter::with_base_url(
            http.clone(),
            Some("contract-key"),
            SourcePolicy::immediate(SourceTag::Coinalyze),
            "https://coinalyze.test/v1",
        )),
        Arc::new(HyperliquidAdapter::with_base_url(
            http.clone(),
            SourcePolicy::immediate(SourceTag::Hyperliquid),
            "https://hyperliquid.test",
        )),
        Arc::new(CoingeckoAdapter::with_base_url(
            http,
            None,
            SourcePolicy::immediate(SourceTag::Coingecko),
            "https://coingecko.test/api/v3",
        )),
    ]
}

fn history_request(universe: &InstrumentUniverse) -> HistoryRequest<'_> {
    HistoryRequest {
        universe,
        window: HistoryWindow::day(),
        end: Timestamp::from_millis(WINDOW_END_MS),
    }
}

#[tokio::test]
async fn sources_declare_expected_tags_and_capabilities() {
    let sources = all_sources(healthy_upstreams());
    let declared = sources
        .iter()
        .map(|source| {
            let caps = source.capabilities();
            (source.tag(), caps.current, caps.history)
        })
        .collect::<Vec<_>>();

    assert_eq!(
        declared,
        vec![
            (SourceTag::Coinalyze, true, true),
            (SourceTag::Hyperliquid, true, true),
            (SourceTag::Coingecko, true, false),
        ]
    );
}

#[tokio::test]
async fn current_points_are_tagged_and_normalized() {
    let universe = InstrumentUniverse::fallback();

    for source in all_sources(healthy_upstreams()) {
        let batch = source
            .current(CurrentRequest {
                universe: &universe,
            })
            .await
            .unwrap_or_else(|err| panic!("{} current failed: {err}", source.tag()));

        assert!(!batch.points.is_empty(), "{} returned no points", source.tag());
        for point in &batch.points {
            assert_eq!(point.source, source.tag());
            assert!(!point.exchange.is_empty());
            assert!(point.value.is_finite());
            assert!(
                point.observed_at.as_millis() > 1_000_000_000_000,
                "{} timestamp not in milliseconds",
                source.tag()
            );
            if point.metric == Metric::FundingRate {
                // Every fixture quotes 0.01 % per 8h or its hourly equivalent.
                assert!(point.value.abs() <= 0.0001 + 1e-12, "{point:?}");
            }
        }
    }
}

#[tokio::test]
async fn history_honors_capabilities() {
    let universe = InstrumentUniverse::fallback();

    for source in all_sources(healthy_upstreams()) {
        let result = source.history(history_request(&universe)).await;

        if source.capabilities().history {
            let batch = result.unwrap_or_else(|err| panic!("{} history failed: {err}", source.tag()));
            assert!(batch.points.iter().all(|point| point.source == source.tag()));
            assert!(batch
                .points
                .iter()
                .all(|point| point.t.as_millis() % 1_000 == 0 && point.t.as_millis() <= WINDOW_END_MS));
        } else {
            let err = result.expect_err("history is unsupported");
            assert_eq!(err.kind(), SourceErrorKind::UnsupportedEndpoint);
            assert_eq!(err.code(), "source.unsupported_endpoint");
        }
    }
}

#[tokio::test]
async fn upstream_failures_surface_as_retryable_source_errors() {
    let http = Arc::new(
        ScriptedHttpClient::new()
            .route("coinalyze.test", Ok(HttpResponse::new(502, "bad gateway")))
            .route("hyperliquid.test", Ok(HttpResponse::new(500, "node restarting")))
            .route("coingecko.test", Ok(HttpResponse::new(503, "unavailable"))),
    );
    let universe = InstrumentUniverse::fallback();

    for source in all_sources(http) {
        let err = source
            .current(CurrentRequest {
                universe: &universe,
            })
            .await
            .expect_err("upstream is down");

        assert_eq!(err.kind(), SourceErrorKind::Upstream, "{}", source.tag());
        assert_eq!(err.code(), "source.upstream");
        assert!(err.retryable());
        assert!(err.message().contains(source.tag().as_str()));
    }
}

#[tokio::test]
async fn malformed_payloads_surface_as_decode_errors() {
    let http = Arc::new(
        ScriptedHttpClient::new()
            .route_json("coinalyze.test", r#"{"unexpected":"object"}"#)
            .route_json("hyperliquid.test", r#"{"universe":[]}"#)
            .route_json("coingecko.test", r#""not a list""#),
    );
    let universe = InstrumentUniverse::fallback();

    for source in all_sources(http) {
        let err = source
            .current(CurrentRequest {
                universe: &universe,
            })
            .await
            .expect_err("payload is malformed");

        assert_eq!(err.kind(), SourceErrorKind::Decode, "{}", source.tag());
        assert!(!err.retryable());
    }
}
