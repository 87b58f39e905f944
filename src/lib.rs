//! # OSB Aggregator Library
//!
//! Reduces OpenSearch Benchmark (OSB) throughput, service-time and latency
//! documents into stable per-bucket statistics, through three levels:
//!
//! - **Node level**: one test execution reported by several load-generator
//!   hosts is averaged across hosts
//! - **Round level**: repetitions of one test configuration are reduced to a
//!   mean and a relative standard deviation (RSD) per bucket
//! - **Cross pattern**: persisted round-level results in a folder are ordered
//!   by run number and reduced the same way
//!
//! ## Architecture Overview
//!
//! - `store`: query construction, the `MetricsStore` trait and the OpenSearch client
//! - `model`: typed metric records (throughput summary, percentile buckets)
//! - `filter`: routing of raw documents into per-kind samples
//! - `aggregate`: the three reduction levels
//! - `results`: the aggregate result and its persisted JSON form
//! - `report`: console tables
//! - `dispatch`: batched remote command dispatch to worker hosts
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use osb_aggregator::aggregate::aggregate_rounds_from_store;
//! use osb_aggregator::store::{IdFilter, OpenSearchStore, StoreConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = StoreConfig {
//!         host: "metrics.example.com".to_string(),
//!         username: Some("admin".to_string()),
//!         password: Some("secret".to_string()),
//!         ..StoreConfig::default()
//!     };
//!     let store = OpenSearchStore::new(&config)?;
//!
//!     let filters = IdFilter::for_rounds(Some("big5-8-clients-*"), None)?;
//!     let result = aggregate_rounds_from_store(&store, &filters, &config.query_options()).await?;
//!
//!     if let Some(latency) = &result.averaged_latency {
//!         println!("p99 latency: {} ms", latency.buckets.p99.value);
//!     }
//!     Ok(())
//! }
//! ```

/// Node, round and cross-pattern reductions
pub mod aggregate;

/// Command-line interface and configuration
///
/// Subcommands per aggregation level, store connection options (with
/// environment fallbacks) and their conversion into a `StoreConfig`.
pub mod cli;

/// Remote command dispatch in capped batches
pub mod dispatch;

pub mod error;
pub mod filter;
pub mod logging;
pub mod model;
pub mod report;

/// Aggregate results and the persisted result file format
pub mod results;

/// Metrics store access
///
/// The `MetricsStore` trait is the seam to the document store; the
/// `opensearch` submodule implements it over HTTP.
pub mod store;

pub mod utils;

pub use aggregate::{aggregate_cross_pattern, aggregate_nodes, aggregate_rounds, NodeAggregation};
pub use cli::Args;
pub use error::{AggregationError, Result};
pub use filter::{filter_documents, FilteredDocuments};
pub use model::{MetricKind, MetricRecord, Percentile, PercentileSample, ThroughputSample};
pub use results::{AggregateResult, AveragedPercentileMetric, AveragedThroughput, Stat};
pub use store::{MetricsStore, OpenSearchStore, StoreConfig, StoreError};

/// The current version of the aggregator
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    /// Index pattern OSB writes benchmark results to
    pub const INDEX_PATTERN: &str = "benchmark-results-*";

    /// Documents returned per query
    ///
    /// Matches the default `index.max_result_window` of OpenSearch; a larger
    /// size is rejected by the store.
    pub const MAX_RESULTS: usize = 10_000;

    /// Metrics store port (HTTPS)
    pub const STORE_PORT: u16 = 443;

    /// Per-request timeout against the metrics store
    pub const STORE_TIMEOUT: Duration = Duration::from_secs(30);

    /// Hosts per remote command, the command service's target limit
    pub const DISPATCH_BATCH_SIZE: usize = 50;

    pub const THROUGHPUT_UNITS: &str = "ops/s";
    pub const DURATION_UNITS: &str = "ms";

    /// Marks files that are already aggregates; skipped by cross-pattern discovery
    pub const AVG_MARKER: &str = "avg";

    /// Extension of persisted result files
    pub const RESULT_EXTENSION: &str = "json";

    /// Stem suffix of node-level output files, ignored when reading run numbers
    pub const NODE_OUTPUT_MARKER: &str = "-averaged";

    /// Suffix of node-level output files
    pub const NODE_OUTPUT_SUFFIX: &str = "-averaged.json";
}
