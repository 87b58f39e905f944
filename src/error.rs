//! Error taxonomy for the aggregation pipeline.
//!
//! Every variant is fatal to the current aggregation invocation. Nothing is
//! retried internally; the caller is expected to fix the input set and re-run.

use std::path::PathBuf;

use thiserror::Error;

use crate::dispatch::DispatchError;
use crate::store::StoreError;

/// Convenience alias used across the library.
pub type Result<T, E = AggregationError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum AggregationError {
    /// Round-level store queries need a wildcard pattern or an explicit id list.
    #[error("malformed query input: {0}")]
    MalformedQueryInput(String),

    /// The host IPv4 address could not be recovered from a test-execution id.
    #[error("no host IPv4 address found in test-execution-id '{test_execution_id}' (expected '-<a.b.c.d>-')")]
    NodeIdentifier { test_execution_id: String },

    /// Dispersion needs at least two samples per bucket.
    #[error("insufficient samples for {metric}: found {found}, need at least {required}")]
    InsufficientSamples {
        metric: String,
        found: usize,
        required: usize,
    },

    /// A round file name does not carry the mandatory `-<integer>` run suffix.
    #[error(
        "cannot order round file {}: name must end with '-<run number>' (e.g. test-execution-2.json)",
        file.display()
    )]
    UnorderableRounds { file: PathBuf },

    /// An expected throughput/percentile field or result section is absent.
    #[error("missing bucket '{bucket}' in {source_name}")]
    MissingBucket { source_name: String, bucket: String },

    /// A bucket holds a value that cannot be a valid measurement.
    #[error("invalid value {value} for bucket '{bucket}' in {source_name}")]
    InvalidBucketValue {
        source_name: String,
        bucket: String,
        value: f64,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl AggregationError {
    pub(crate) fn missing(source_name: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self::MissingBucket {
            source_name: source_name.into(),
            bucket: bucket.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_offending_input() {
        let err = AggregationError::NodeIdentifier {
            test_execution_id: "8-clients-2".to_string(),
        };
        assert!(err.to_string().contains("8-clients-2"));

        let err = AggregationError::UnorderableRounds {
            file: PathBuf::from("/tmp/results/test-execution.json"),
        };
        assert!(err.to_string().contains("test-execution.json"));

        let err = AggregationError::missing("round-3.json", "99_9");
        assert_eq!(err.to_string(), "missing bucket '99_9' in round-3.json");
    }
}
