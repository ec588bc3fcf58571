use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use balance_scanner::{
    spawn_scan, Aggregator, BalanceFetcher, BalanceRecord, FetchError, FetcherConfig, RecordSink,
    RetryPolicy, ScanOutcome,
};
use eyre::Result;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Canned balance API: per-address asset lists, with optional leading
/// failures to exercise the retry path.
#[derive(Clone, Default)]
struct MockApi {
    balances: Arc<HashMap<String, Vec<(String, f64)>>>,
    /// Number of 500s served before the first 200. `u32::MAX` fails forever.
    failures: Arc<HashMap<String, u32>>,
    attempts: Arc<Mutex<HashMap<String, u32>>>,
}

impl MockApi {
    fn attempts_for(&self, address: &str) -> u32 {
        self.attempts.lock().unwrap().get(address).copied().unwrap_or(0)
    }
}

async fn get_balance(
    State(api): State<MockApi>,
    Path(address): Path<String>,
) -> (StatusCode, Json<Value>) {
    let seen = {
        let mut attempts = api.attempts.lock().unwrap();
        let n = attempts.entry(address.clone()).or_insert(0);
        *n += 1;
        *n
    };

    let failures = api.failures.get(&address).copied().unwrap_or(0);
    if seen <= failures {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "upstream unavailable" })),
        );
    }

    let balance: Vec<Value> = api
        .balances
        .get(&address)
        .map(|assets| {
            assets
                .iter()
                .map(|(symbol, amount)| json!({ "asset_symbol": symbol, "amount": amount }))
                .collect()
        })
        .unwrap_or_default();

    (
        StatusCode::OK,
        Json(json!({ "address": address, "balance": balance })),
    )
}

async fn serve(api: MockApi) -> Result<String> {
    let app = Router::new()
        .route("/get_balance/{address}", get(get_balance))
        .with_state(api);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Ok(format!("http://{}/get_balance/", addr))
}

fn fast_fetcher(base_url: String, max_attempts: u32) -> Result<BalanceFetcher> {
    BalanceFetcher::new(FetcherConfig {
        base_url,
        retry: RetryPolicy {
            max_attempts,
            wait_min: Duration::from_millis(1),
            wait_max: Duration::from_millis(3),
        },
        ..FetcherConfig::default()
    })
}

fn balances(entries: &[(&str, &[(&str, f64)])]) -> Arc<HashMap<String, Vec<(String, f64)>>> {
    Arc::new(
        entries
            .iter()
            .map(|(address, assets)| {
                (
                    address.to_string(),
                    assets
                        .iter()
                        .map(|(symbol, amount)| (symbol.to_string(), *amount))
                        .collect(),
                )
            })
            .collect(),
    )
}

#[tokio::test]
async fn every_address_is_delivered_and_totals_sum() -> Result<()> {
    let api = MockApi {
        balances: balances(&[
            ("AdrA", &[("GAS", 5.0), ("NEO", 0.0)]),
            ("AdrB", &[("GAS", 3.0)]),
            ("AdrC", &[]),
        ]),
        ..MockApi::default()
    };
    let base_url = serve(api).await?;

    let fetcher = Arc::new(fast_fetcher(base_url, 10)?);
    let addresses = vec!["AdrA".to_string(), "AdrB".to_string(), "AdrC".to_string()];

    let output = tempfile::NamedTempFile::new()?;
    let sink = RecordSink::create(output.path())?;

    let mut outcomes = spawn_scan(fetcher, addresses.clone(), 4);
    let mut aggregator = Aggregator::new(Some(sink));
    while let Some(outcome) = outcomes.recv().await {
        aggregator.ingest(outcome)?;
    }

    let report = aggregator.finish()?;
    assert_eq!(report.processed, 3);
    assert_eq!(report.failed, 0);
    // NEO's amount was zero, so only GAS shows a positive sum.
    assert_eq!(report.totals.positive_sums(), vec![("GAS".to_string(), 8.0)]);

    // Sink fidelity: one parseable line per processed address.
    let content = std::fs::read_to_string(output.path())?;
    let records: Vec<BalanceRecord> = content
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(records.len(), 3);

    let written: HashSet<String> = records.iter().map(|r| r.address.clone()).collect();
    let expected: HashSet<String> = addresses.into_iter().collect();
    assert_eq!(written, expected);

    Ok(())
}

#[tokio::test]
async fn non_200_then_success_aggregates_once() -> Result<()> {
    let api = MockApi {
        balances: balances(&[("Flaky", &[("NEO", 7.0)])]),
        failures: Arc::new(HashMap::from([("Flaky".to_string(), 1)])),
        ..MockApi::default()
    };
    let base_url = serve(api.clone()).await?;

    let fetcher = Arc::new(fast_fetcher(base_url, 10)?);
    let mut outcomes = spawn_scan(fetcher, vec!["Flaky".to_string()], 1);

    let mut aggregator = Aggregator::new(None);
    while let Some(outcome) = outcomes.recv().await {
        aggregator.ingest(outcome)?;
    }

    let report = aggregator.finish()?;
    assert_eq!(report.processed, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.totals.positive_sums(), vec![("NEO".to_string(), 7.0)]);
    assert_eq!(api.attempts_for("Flaky"), 2);

    Ok(())
}

#[tokio::test]
async fn retry_ceiling_is_reported_without_aborting_the_rest() -> Result<()> {
    let api = MockApi {
        balances: balances(&[("Good", &[("GAS", 1.0)])]),
        failures: Arc::new(HashMap::from([("Dead".to_string(), u32::MAX)])),
        ..MockApi::default()
    };
    let base_url = serve(api.clone()).await?;

    let fetcher = Arc::new(fast_fetcher(base_url, 10)?);
    let mut outcomes = spawn_scan(fetcher, vec!["Dead".to_string(), "Good".to_string()], 2);

    let mut delivered: Vec<ScanOutcome> = Vec::new();
    while let Some(outcome) = outcomes.recv().await {
        delivered.push(outcome);
    }
    assert_eq!(delivered.len(), 2);

    let dead = delivered.iter().find(|o| o.address == "Dead").unwrap();
    match &dead.result {
        Err(FetchError::Exhausted { attempts, .. }) => assert_eq!(*attempts, 10),
        other => panic!("expected exhausted retries, got {:?}", other),
    }
    // Exactly the retry ceiling's worth of requests reached the API.
    assert_eq!(api.attempts_for("Dead"), 10);

    let mut aggregator = Aggregator::new(None);
    for outcome in delivered {
        aggregator.ingest(outcome)?;
    }

    let report = aggregator.finish()?;
    assert_eq!(report.processed, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.totals.positive_sums(), vec![("GAS".to_string(), 1.0)]);

    Ok(())
}

#[tokio::test]
async fn connection_errors_retry_until_the_ceiling() -> Result<()> {
    // Nothing listens here; every attempt is a connection failure.
    let fetcher = fast_fetcher("http://127.0.0.1:1/get_balance/".to_string(), 3)?;

    let result = fetcher.fetch("AdrA").await;
    match result {
        Err(FetchError::Exhausted { attempts, source }) => {
            assert_eq!(attempts, 3);
            assert!(matches!(*source, FetchError::Connection(_)));
        }
        other => panic!("expected exhausted retries, got {:?}", other),
    }

    Ok(())
}
