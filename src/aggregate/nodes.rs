//! Node-level aggregation: one logical test execution spread over several
//! load-generator hosts, averaged per bucket across hosts.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use tracing::{info, warn};

use super::{reduce_percentiles, reduce_throughput, Dispersion};
use crate::error::Result;
use crate::model::{MetricKind, MetricPayload, MetricRecord, PercentileSample, ThroughputSample};
use crate::results::AggregateResult;
use crate::store::{fetch_documents, IdFilter, MetricsStore, QueryOptions, SearchHit};

/// One host's contribution, keyed by its test-execution id
#[derive(Clone, Debug, PartialEq)]
pub struct NodeSample<S> {
    pub host: Ipv4Addr,
    pub operation: Option<String>,
    pub sample: S,
}

/// Per-host inputs and their average
#[derive(Clone, Debug, PartialEq)]
pub struct NodeAggregation {
    pub per_node_throughput: BTreeMap<String, NodeSample<ThroughputSample>>,
    pub per_node_service_time: BTreeMap<String, NodeSample<PercentileSample>>,
    pub per_node_latency: BTreeMap<String, NodeSample<PercentileSample>>,
    pub averaged: AggregateResult,
}

impl NodeAggregation {
    pub fn node_count(&self, kind: MetricKind) -> usize {
        match kind {
            MetricKind::Throughput => self.per_node_throughput.len(),
            MetricKind::ServiceTime => self.per_node_service_time.len(),
            MetricKind::Latency => self.per_node_latency.len(),
        }
    }
}

fn insert_node<S>(
    nodes: &mut BTreeMap<String, NodeSample<S>>,
    kind: MetricKind,
    id: String,
    node: NodeSample<S>,
) {
    if nodes.insert(id.clone(), node).is_some() {
        warn!("Duplicate {} document for '{}'; keeping the last one", kind, id);
    }
}

/// Average the documents of one test execution across its hosts.
///
/// Every document's test-execution id must embed the host address as
/// `-<a.b.c.d>-`; otherwise the pass fails with `NodeIdentifier`. A metric
/// kind reported by no host is left undefined in the averaged result.
pub fn aggregate_nodes(test_pattern: &str, documents: &[SearchHit]) -> Result<NodeAggregation> {
    let mut per_node_throughput = BTreeMap::new();
    let mut per_node_service_time = BTreeMap::new();
    let mut per_node_latency = BTreeMap::new();

    for document in documents {
        let Some(record) = MetricRecord::from_source(&document.source)? else {
            continue;
        };
        let host = record.host_identifier()?;
        let MetricRecord {
            kind,
            test_execution_id,
            operation,
            payload,
        } = record;

        match payload {
            MetricPayload::Throughput(sample) => insert_node(
                &mut per_node_throughput,
                kind,
                test_execution_id,
                NodeSample { host, operation, sample },
            ),
            MetricPayload::Percentiles(sample) => {
                let nodes = if kind == MetricKind::Latency {
                    &mut per_node_latency
                } else {
                    &mut per_node_service_time
                };
                insert_node(
                    nodes,
                    kind,
                    test_execution_id,
                    NodeSample { host, operation, sample },
                )
            }
        }
    }

    info!(
        "Throughput Metrics: {}, Service Time Metrics: {}, Latency Metrics: {}",
        per_node_throughput.len(),
        per_node_service_time.len(),
        per_node_latency.len()
    );

    let throughput: Vec<ThroughputSample> =
        per_node_throughput.values().map(|n| n.sample).collect();
    let service_time: Vec<PercentileSample> =
        per_node_service_time.values().map(|n| n.sample).collect();
    let latency: Vec<PercentileSample> = per_node_latency.values().map(|n| n.sample).collect();

    let averaged = AggregateResult {
        test_pattern: vec![test_pattern.to_string()],
        averaged_throughput: average_or_undefined(MetricKind::Throughput, &throughput, |s| {
            reduce_throughput(s, MetricKind::Throughput.default_units(), Dispersion::Optional)
        })?,
        averaged_service_time: average_or_undefined(MetricKind::ServiceTime, &service_time, |s| {
            reduce_percentiles(
                MetricKind::ServiceTime,
                s,
                MetricKind::ServiceTime.default_units(),
                Dispersion::Optional,
            )
        })?,
        averaged_latency: average_or_undefined(MetricKind::Latency, &latency, |s| {
            reduce_percentiles(
                MetricKind::Latency,
                s,
                MetricKind::Latency.default_units(),
                Dispersion::Optional,
            )
        })?,
    };

    Ok(NodeAggregation {
        per_node_throughput,
        per_node_service_time,
        per_node_latency,
        averaged,
    })
}

fn average_or_undefined<S, A>(
    kind: MetricKind,
    samples: &[S],
    reduce: impl FnOnce(&[S]) -> Result<A>,
) -> Result<Option<A>> {
    if samples.is_empty() {
        warn!("No host reported {}; leaving it undefined", kind);
        return Ok(None);
    }
    reduce(samples).map(Some)
}

/// Fetch the documents matching `test_execution_id` and aggregate them.
pub async fn aggregate_nodes_from_store(
    store: &dyn MetricsStore,
    test_execution_id: &str,
    options: &QueryOptions,
) -> Result<NodeAggregation> {
    let filter = IdFilter::for_id(Some(test_execution_id));
    let documents = fetch_documents(store, &[filter], options).await?;
    aggregate_nodes(test_execution_id, &documents)
}
