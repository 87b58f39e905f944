use std::io::Read;
use std::sync::mpsc;
use std::thread;

use anyhow::Result;
use osb_aggregator::{
    aggregate::{aggregate_nodes_from_store, aggregate_rounds_from_store},
    store::{IdFilter, OpenSearchStore, StoreConfig},
    AggregationError, StoreError,
};
use serde_json::{json, Value};
use tiny_http::{Response, Server};

/// Request as seen by the mock `_search` endpoint
struct Captured {
    url: String,
    body: Value,
    authorized: bool,
}

/// Serve one canned response per request, in order, then stop.
fn spawn_store(responses: Vec<(u16, Value)>) -> (StoreConfig, mpsc::Receiver<Captured>) {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr().to_ip().unwrap();
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        for (status, body) in responses {
            let Ok(mut request) = server.recv() else {
                return;
            };
            let mut raw = String::new();
            let _ = request.as_reader().read_to_string(&mut raw);
            let authorized = request
                .headers()
                .iter()
                .any(|h| h.field.equiv("Authorization"));
            let _ = tx.send(Captured {
                url: request.url().to_string(),
                body: serde_json::from_str(&raw).unwrap_or(Value::Null),
                authorized,
            });
            let response = Response::from_string(body.to_string()).with_status_code(status);
            let _ = request.respond(response);
        }
    });

    let config = StoreConfig {
        host: format!("http://{}", addr.ip()),
        port: addr.port(),
        username: Some("admin".to_string()),
        password: Some("admin".to_string()),
        ..StoreConfig::default()
    };
    (config, rx)
}

fn hit(name: &str, id: &str, value: Value) -> Value {
    json!({ "_source": { "name": name, "test-execution-id": id, "value": value } })
}

fn hits(hits: Vec<Value>) -> Value {
    json!({ "hits": { "total": { "value": hits.len() }, "hits": hits } })
}

fn percentiles(p50: f64) -> Value {
    json!({
        "50_0": p50, "90_0": p50 + 1.0, "99_0": p50 + 2.0,
        "99_9": p50 + 3.0, "99_99": p50 + 4.0, "100_0": p50 + 5.0
    })
}

/// Three hosts report throughput, two report latency, none report service time.
#[tokio::test]
async fn node_aggregation_against_mock_store() -> Result<()> {
    let (config, requests) = spawn_store(vec![(
        200,
        hits(vec![
            hit("throughput", "big5-10.0.0.1-2", json!({"min": 90.0, "mean": 100.0, "median": 95.0})),
            hit("throughput", "big5-10.0.0.2-2", json!({"min": 110.0, "mean": 120.0, "median": 115.0})),
            hit("throughput", "big5-10.0.0.3-2", json!({"min": 130.0, "mean": 140.0, "median": 135.0})),
            hit("latency", "big5-10.0.0.1-2", percentiles(10.0)),
            hit("latency", "big5-10.0.0.2-2", percentiles(14.0)),
            hit("error_rate", "big5-10.0.0.1-2", json!({"value": 0.0})),
        ]),
    )]);
    let store = OpenSearchStore::new(&config)?;

    let aggregation =
        aggregate_nodes_from_store(&store, "big5-*-2", &config.query_options()).await?;

    let throughput = aggregation.averaged.averaged_throughput.as_ref().unwrap();
    assert_eq!(throughput.buckets.mean.value, 120.0);
    assert!((throughput.buckets.mean.rsd.unwrap() - 100.0 / 6.0).abs() < 1e-9);

    let latency = aggregation.averaged.averaged_latency.as_ref().unwrap();
    assert_eq!(latency.buckets.p50.value, 12.0);
    assert_eq!(latency.buckets.p100.value, 17.0);
    assert!(aggregation.averaged.averaged_service_time.is_none());
    assert_eq!(aggregation.averaged.test_pattern, vec!["big5-*-2".to_string()]);
    assert_eq!(aggregation.per_node_throughput.len(), 3);

    let request = requests.recv()?;
    assert_eq!(request.url, "/benchmark-results-*/_search?size=10000");
    assert!(request.authorized);
    assert_eq!(
        request.body["query"]["bool"]["must"][1]["wildcard"]["test-execution-id"],
        "big5-*-2"
    );
    Ok(())
}

/// An id list issues one query per id and sorts the ids in the output.
#[tokio::test]
async fn round_aggregation_from_id_list() -> Result<()> {
    let (config, requests) = spawn_store(vec![
        (200, hits(vec![hit("service_time", "big5-2", percentiles(12.0))])),
        (200, hits(vec![hit("service_time", "big5-1", percentiles(10.0))])),
        (200, hits(vec![hit("service_time", "big5-3", percentiles(14.0))])),
    ]);
    let store = OpenSearchStore::new(&config)?;

    let ids = vec!["big5-2".to_string(), "big5-1".to_string(), "big5-3".to_string()];
    let filters = IdFilter::for_rounds(None, Some(ids.as_slice()))?;
    let result = aggregate_rounds_from_store(&store, &filters, &config.query_options()).await?;

    assert_eq!(result.test_pattern, vec!["big5-1", "big5-2", "big5-3"]);
    let service_time = result.averaged_service_time.unwrap();
    assert_eq!(service_time.buckets.p50.value, 12.0);
    assert!((service_time.buckets.p50.rsd.unwrap() - 100.0 / 6.0).abs() < 1e-9);
    assert_eq!(service_time.units, "ms");
    assert!(result.averaged_throughput.is_none());

    let urls: Vec<String> = requests.try_iter().map(|r| r.url).collect();
    assert_eq!(urls.len(), 3);
    Ok(())
}

#[tokio::test]
async fn store_failure_is_propagated() -> Result<()> {
    let (config, _requests) = spawn_store(vec![(500, json!({"error": "shard failure"}))]);
    let store = OpenSearchStore::new(&config)?;

    let err = aggregate_nodes_from_store(&store, "big5-10.0.0.1-1", &config.query_options())
        .await
        .unwrap_err();
    match err {
        AggregationError::Store(StoreError::Status { status, body }) => {
            assert_eq!(status, 500);
            assert!(body.contains("shard failure"));
        }
        other => panic!("unexpected error: {other}"),
    }
    Ok(())
}
