//! # Document Filter
//!
//! Splits a flat list of store hits into typed throughput, service-time and
//! latency samples and collects the set of test-execution ids seen. Documents
//! whose `name` is not one of the three kinds are dropped without error.

use std::collections::BTreeSet;

use tracing::debug;

use crate::error::Result;
use crate::model::{MetricKind, MetricPayload, MetricRecord, PercentileSample, ThroughputSample};
use crate::store::SearchHit;

/// Output of [`filter_documents`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilteredDocuments {
    /// Sorted, so callers iterate ids deterministically
    pub unique_ids: BTreeSet<String>,
    pub throughput: Vec<ThroughputSample>,
    pub service_time: Vec<PercentileSample>,
    pub latency: Vec<PercentileSample>,
}

impl FilteredDocuments {
    pub fn count(&self, kind: MetricKind) -> usize {
        match kind {
            MetricKind::Throughput => self.throughput.len(),
            MetricKind::ServiceTime => self.service_time.len(),
            MetricKind::Latency => self.latency.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        MetricKind::ALL.iter().all(|kind| self.count(*kind) == 0)
    }
}

/// Route every recognized document into its bucket.
///
/// Fails with `MissingBucket` when a recognized document lacks one of the
/// fields its kind requires.
pub fn filter_documents(documents: &[SearchHit]) -> Result<FilteredDocuments> {
    let mut filtered = FilteredDocuments::default();
    let mut dropped = 0usize;

    for document in documents {
        let Some(record) = MetricRecord::from_source(&document.source)? else {
            dropped += 1;
            continue;
        };

        match record.payload {
            MetricPayload::Throughput(sample) => filtered.throughput.push(sample),
            MetricPayload::Percentiles(sample) if record.kind == MetricKind::Latency => {
                filtered.latency.push(sample)
            }
            MetricPayload::Percentiles(sample) => filtered.service_time.push(sample),
        }
        filtered.unique_ids.insert(record.test_execution_id);
    }

    debug!(
        "Filtered {} documents: {} throughput, {} service time, {} latency, {} dropped",
        documents.len(),
        filtered.throughput.len(),
        filtered.service_time.len(),
        filtered.latency.len(),
        dropped
    );
    Ok(filtered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AggregationError;
    use crate::store::testing::hit;
    use serde_json::{json, Value};

    fn hits(values: Vec<Value>) -> Vec<SearchHit> {
        values
            .into_iter()
            .map(|v| serde_json::from_value(v).unwrap())
            .collect()
    }

    fn percentiles(base: f64) -> Value {
        json!({
            "50_0": base, "90_0": base + 1.0, "99_0": base + 2.0,
            "99_9": base + 3.0, "99_99": base + 4.0, "100_0": base + 5.0
        })
    }

    #[test]
    fn test_filter_routes_by_name() {
        let documents = hits(vec![
            hit("throughput", "run-2", json!({"min": 10.0, "mean": 12.0, "median": 11.0})),
            hit("service_time", "run-1", percentiles(3.0)),
            hit("latency", "run-1", percentiles(4.0)),
            hit("latency", "run-2", percentiles(5.0)),
            hit("error_rate", "run-3", json!({"value": 0.0})),
        ]);

        let filtered = filter_documents(&documents).unwrap();
        assert_eq!(filtered.throughput.len(), 1);
        assert_eq!(filtered.service_time.len(), 1);
        assert_eq!(filtered.latency.len(), 2);
        assert_eq!(filtered.throughput[0].mean, 12.0);
        assert_eq!(filtered.latency[1].p50, 5.0);

        let ids: Vec<&str> = filtered.unique_ids.iter().map(String::as_str).collect();
        assert_eq!(ids, vec!["run-1", "run-2"]);
    }

    #[test]
    fn test_filter_empty_input() {
        let filtered = filter_documents(&[]).unwrap();
        assert!(filtered.is_empty());
        assert!(filtered.unique_ids.is_empty());
    }

    #[test]
    fn test_filter_reports_missing_bucket() {
        let documents = hits(vec![hit("throughput", "run-1", json!({"min": 1.0, "mean": 2.0}))]);
        let err = filter_documents(&documents).unwrap_err();
        match err {
            AggregationError::MissingBucket { source_name, bucket } => {
                assert_eq!(bucket, "median");
                assert!(source_name.contains("run-1"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
