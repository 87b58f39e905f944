//! # Metrics Store Access
//!
//! The aggregator reads raw OpenSearch Benchmark documents from a metrics
//! store. This module defines the store abstraction (`MetricsStore`), the wire
//! shape of search responses, and the query construction rules that decide
//! which documents feed an aggregation pass.
//!
//! Queries are always restricted to the three recognized metric names. The
//! test-execution id is matched exactly, by wildcard, or not at all. Several
//! patterns are queried independently and their hits concatenated; overlapping
//! patterns are not deduplicated.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::{AggregationError, Result};
use crate::model::MetricKind;

pub mod opensearch;

pub use opensearch::{OpenSearchStore, StoreConfig};

/// Failures talking to the metrics store, propagated to the caller as-is
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("metrics store request failed: {0}")]
    Transport(String),

    #[error("metrics store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("cannot decode metrics store response: {0}")]
    Decode(String),
}

/// One search request against an index pattern
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub index: String,
    pub size: usize,
    pub body: Value,
}

/// Search response envelope (`hits.total`, `hits.hits`)
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    pub hits: Hits,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Hits {
    #[serde(default)]
    pub total: Option<TotalHits>,
    #[serde(default)]
    pub hits: Vec<SearchHit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TotalHits {
    pub value: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    #[serde(rename = "_source")]
    pub source: DocumentSource,
}

/// The fields of a benchmark-results document the aggregator reads
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentSource {
    pub name: String,
    #[serde(rename = "test-execution-id")]
    pub test_execution_id: String,
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(default)]
    pub value: Value,
}

/// Read access to a document store holding raw benchmark metrics.
///
/// Implementations are expected to be stateless per query so one instance can
/// be reused for every query of an aggregation pass.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, StoreError>;
}

/// Restriction applied to the `test-execution-id` field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdFilter {
    /// No identifier restriction
    Any,
    /// Term match on the full identifier
    Exact(String),
    /// Wildcard match, e.g. `8-clients-*`
    Wildcard(String),
}

impl IdFilter {
    /// Filter for a single identifier or identifier pattern.
    ///
    /// A value containing `*` is matched by wildcard, any other non-empty value
    /// exactly. No value means every document of the three kinds.
    pub fn for_id(id: Option<&str>) -> Self {
        match id {
            None => IdFilter::Any,
            Some(id) if id.is_empty() => IdFilter::Any,
            Some(id) if id.contains('*') => IdFilter::Wildcard(id.to_string()),
            Some(id) => IdFilter::Exact(id.to_string()),
        }
    }

    /// Filters for aggregating every round of one test configuration.
    ///
    /// Requires either a wildcard pattern or a non-empty list of identifiers;
    /// list entries are each matched by wildcard so they may carry their own `*`.
    pub fn for_rounds(pattern: Option<&str>, ids: Option<&[String]>) -> Result<Vec<Self>> {
        if let Some(pattern) = pattern {
            if pattern.contains('*') {
                return Ok(vec![IdFilter::Wildcard(pattern.to_string())]);
            }
            return Err(AggregationError::MalformedQueryInput(format!(
                "'{}' is not a wildcard pattern; use e.g. '{}*' to aggregate all rounds",
                pattern, pattern
            )));
        }

        match ids {
            Some(ids) if !ids.is_empty() => Ok(ids
                .iter()
                .map(|id| IdFilter::Wildcard(id.clone()))
                .collect()),
            _ => Err(AggregationError::MalformedQueryInput(
                "a test-execution-id pattern or a list of test-execution ids is required"
                    .to_string(),
            )),
        }
    }
}

impl std::fmt::Display for IdFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdFilter::Any => write!(f, "all test executions"),
            IdFilter::Exact(id) => write!(f, "'{}'", id),
            IdFilter::Wildcard(pattern) => write!(f, "'{}' (wildcard)", pattern),
        }
    }
}

/// Build the boolean query body for one identifier filter.
pub fn build_query(filter: &IdFilter) -> Value {
    let names: Vec<&str> = MetricKind::ALL
        .iter()
        .map(|kind| kind.document_name())
        .collect();
    let names_clause = json!({ "terms": { "name": names } });

    match filter {
        IdFilter::Any => json!({ "query": names_clause }),
        IdFilter::Exact(id) => json!({
            "query": {
                "bool": {
                    "must": [names_clause, { "term": { "test-execution-id": id } }]
                }
            }
        }),
        IdFilter::Wildcard(pattern) => json!({
            "query": {
                "bool": {
                    "must": [names_clause, { "wildcard": { "test-execution-id": pattern } }]
                }
            }
        }),
    }
}

/// Index selection and result cap shared by every query of a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    pub index_pattern: String,
    pub max_results: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            index_pattern: crate::defaults::INDEX_PATTERN.to_string(),
            max_results: crate::defaults::MAX_RESULTS,
        }
    }
}

/// Run one query per filter and concatenate the hits in filter order.
pub async fn fetch_documents(
    store: &dyn MetricsStore,
    filters: &[IdFilter],
    options: &QueryOptions,
) -> Result<Vec<SearchHit>> {
    let mut documents = Vec::new();

    for filter in filters {
        let request = SearchRequest {
            index: options.index_pattern.clone(),
            size: options.max_results,
            body: build_query(filter),
        };
        debug!("Querying {} for {}", request.index, filter);

        let response = store.search(&request).await?;
        let returned = response.hits.hits.len();
        if let Some(total) = &response.hits.total {
            if total.value > returned as u64 {
                warn!(
                    "{} matched {} documents but only {} were returned (max results {})",
                    filter, total.value, returned, options.max_results
                );
            }
        }
        info!("Number of documents returned for {}: {}", filter, returned);
        documents.extend(response.hits.hits);
    }

    if filters.len() > 1 {
        info!("Number of documents total: {}", documents.len());
    }
    Ok(documents)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Store returning canned responses in order and recording every request
    pub struct CannedStore {
        responses: Mutex<Vec<Value>>,
        pub requests: Mutex<Vec<SearchRequest>>,
    }

    impl CannedStore {
        pub fn new(responses: Vec<Value>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().rev().collect()),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl MetricsStore for CannedStore {
        async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, StoreError> {
            self.requests.lock().unwrap().push(request.clone());
            let body = self
                .responses
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| StoreError::Transport("no canned response left".to_string()))?;
            serde_json::from_value(body).map_err(|e| StoreError::Decode(e.to_string()))
        }
    }

    pub fn hit(name: &str, id: &str, value: Value) -> Value {
        json!({
            "_index": "benchmark-results-2024-01",
            "_source": {
                "name": name,
                "test-execution-id": id,
                "operation": "term",
                "value": value
            }
        })
    }

    pub fn response(hits: Vec<Value>) -> Value {
        json!({ "hits": { "total": { "value": hits.len(), "relation": "eq" }, "hits": hits } })
    }
}
