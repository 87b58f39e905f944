//! # Metric Record Model
//!
//! Typed representation of the raw observations stored by OpenSearch Benchmark:
//! a throughput summary (`min`/`mean`/`median`) or a percentile summary for
//! service time and latency, tagged with the test-execution id that produced it.
//!
//! Bucket containers are fixed records (`Throughput<T>`, `Percentiles<T>`)
//! rather than open maps, so every level of the hierarchy carries exactly the
//! same buckets. Wire labels (`"50_0"`, `"99_9"`, ...) only appear at the
//! parsing and persistence boundaries.

use std::fmt;
use std::net::Ipv4Addr;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::error::{AggregationError, Result};
use crate::store::DocumentSource;

/// Host address embedded in a load-generator test-execution id, e.g.
/// `8-clients-10.0.3.17-round-2`.
static HOST_IP_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-(\d+\.\d+\.\d+\.\d+)-").expect("host ip pattern is valid"));

/// The three metric families the aggregator understands
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetricKind {
    Throughput,
    ServiceTime,
    Latency,
}

impl MetricKind {
    pub const ALL: [MetricKind; 3] = [
        MetricKind::Throughput,
        MetricKind::ServiceTime,
        MetricKind::Latency,
    ];

    /// Value of the `name` field in metrics-store documents
    pub fn document_name(self) -> &'static str {
        match self {
            MetricKind::Throughput => "throughput",
            MetricKind::ServiceTime => "service_time",
            MetricKind::Latency => "latency",
        }
    }

    pub fn from_document_name(name: &str) -> Option<Self> {
        MetricKind::ALL
            .into_iter()
            .find(|kind| kind.document_name() == name)
    }

    /// Top-level key of this kind's section in a persisted result file
    pub fn section_key(self) -> &'static str {
        match self {
            MetricKind::Throughput => "averaged-throughput",
            MetricKind::ServiceTime => "averaged-service-time",
            MetricKind::Latency => "averaged-latency",
        }
    }

    pub fn default_units(self) -> &'static str {
        match self {
            MetricKind::Throughput => crate::defaults::THROUGHPUT_UNITS,
            MetricKind::ServiceTime | MetricKind::Latency => crate::defaults::DURATION_UNITS,
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKind::Throughput => write!(f, "Throughput"),
            MetricKind::ServiceTime => write!(f, "Service Time"),
            MetricKind::Latency => write!(f, "Latency"),
        }
    }
}

/// Named buckets of a throughput summary
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ThroughputField {
    Min,
    Mean,
    Median,
}

impl ThroughputField {
    pub const ALL: [ThroughputField; 3] = [
        ThroughputField::Min,
        ThroughputField::Mean,
        ThroughputField::Median,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ThroughputField::Min => "min",
            ThroughputField::Mean => "mean",
            ThroughputField::Median => "median",
        }
    }
}

/// Percentile cut points reported for service time and latency
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Percentile {
    P50,
    P90,
    P99,
    P99_9,
    P99_99,
    P100,
}

impl Percentile {
    pub const ALL: [Percentile; 6] = [
        Percentile::P50,
        Percentile::P90,
        Percentile::P99,
        Percentile::P99_9,
        Percentile::P99_99,
        Percentile::P100,
    ];

    /// Key used by the metrics store and by persisted result files
    pub fn label(self) -> &'static str {
        match self {
            Percentile::P50 => "50_0",
            Percentile::P90 => "90_0",
            Percentile::P99 => "99_0",
            Percentile::P99_9 => "99_9",
            Percentile::P99_99 => "99_99",
            Percentile::P100 => "100_0",
        }
    }
}

impl fmt::Display for Percentile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Percentile::P50 => write!(f, "p50"),
            Percentile::P90 => write!(f, "p90"),
            Percentile::P99 => write!(f, "p99"),
            Percentile::P99_9 => write!(f, "p99.9"),
            Percentile::P99_99 => write!(f, "p99.99"),
            Percentile::P100 => write!(f, "p100"),
        }
    }
}

/// One value per throughput bucket
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Throughput<T> {
    pub min: T,
    pub mean: T,
    pub median: T,
}

impl<T> Throughput<T> {
    pub fn get(&self, field: ThroughputField) -> &T {
        match field {
            ThroughputField::Min => &self.min,
            ThroughputField::Mean => &self.mean,
            ThroughputField::Median => &self.median,
        }
    }

    /// Build every bucket from a fallible per-field constructor.
    pub fn try_from_fn<E>(mut f: impl FnMut(ThroughputField) -> Result<T, E>) -> Result<Self, E> {
        Ok(Self {
            min: f(ThroughputField::Min)?,
            mean: f(ThroughputField::Mean)?,
            median: f(ThroughputField::Median)?,
        })
    }

    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> Throughput<U> {
        Throughput {
            min: f(&self.min),
            mean: f(&self.mean),
            median: f(&self.median),
        }
    }
}

/// One value per percentile bucket
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Percentiles<T> {
    pub p50: T,
    pub p90: T,
    pub p99: T,
    pub p99_9: T,
    pub p99_99: T,
    pub p100: T,
}

impl<T> Percentiles<T> {
    pub fn get(&self, percentile: Percentile) -> &T {
        match percentile {
            Percentile::P50 => &self.p50,
            Percentile::P90 => &self.p90,
            Percentile::P99 => &self.p99,
            Percentile::P99_9 => &self.p99_9,
            Percentile::P99_99 => &self.p99_99,
            Percentile::P100 => &self.p100,
        }
    }

    /// Build every bucket from a fallible per-percentile constructor.
    pub fn try_from_fn<E>(mut f: impl FnMut(Percentile) -> Result<T, E>) -> Result<Self, E> {
        Ok(Self {
            p50: f(Percentile::P50)?,
            p90: f(Percentile::P90)?,
            p99: f(Percentile::P99)?,
            p99_9: f(Percentile::P99_9)?,
            p99_99: f(Percentile::P99_99)?,
            p100: f(Percentile::P100)?,
        })
    }

    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> Percentiles<U> {
        Percentiles {
            p50: f(&self.p50),
            p90: f(&self.p90),
            p99: f(&self.p99),
            p99_9: f(&self.p99_9),
            p99_99: f(&self.p99_99),
            p100: f(&self.p100),
        }
    }
}

/// Raw throughput summary (ops/s) as reported by one host
pub type ThroughputSample = Throughput<f64>;

/// Raw service-time or latency percentiles (ms) as reported by one host
pub type PercentileSample = Percentiles<f64>;

impl ThroughputSample {
    /// Parse the `value` object of a throughput document.
    ///
    /// All three buckets must be present, finite and non-negative.
    pub fn from_value(value: &Value, source_name: &str) -> Result<Self> {
        Throughput::try_from_fn(|field| {
            let v = numeric_bucket(value, field.label(), source_name)?;
            if v < 0.0 {
                return Err(AggregationError::InvalidBucketValue {
                    source_name: source_name.to_string(),
                    bucket: field.label().to_string(),
                    value: v,
                });
            }
            Ok(v)
        })
    }
}

impl PercentileSample {
    /// Parse the `value` object of a service-time or latency document.
    pub fn from_value(value: &Value, source_name: &str) -> Result<Self> {
        Percentiles::try_from_fn(|p| numeric_bucket(value, p.label(), source_name))
    }
}

fn numeric_bucket(value: &Value, label: &str, source_name: &str) -> Result<f64> {
    let v = value
        .get(label)
        .and_then(Value::as_f64)
        .ok_or_else(|| AggregationError::missing(source_name, label))?;
    if !v.is_finite() {
        return Err(AggregationError::InvalidBucketValue {
            source_name: source_name.to_string(),
            bucket: label.to_string(),
            value: v,
        });
    }
    Ok(v)
}

/// Typed payload of a metric record
#[derive(Clone, Debug, PartialEq)]
pub enum MetricPayload {
    Throughput(ThroughputSample),
    Percentiles(PercentileSample),
}

/// A single metric observation fetched from the metrics store
#[derive(Clone, Debug, PartialEq)]
pub struct MetricRecord {
    pub kind: MetricKind,
    pub test_execution_id: String,
    pub operation: Option<String>,
    pub payload: MetricPayload,
}

impl MetricRecord {
    /// Convert a store document into a record.
    ///
    /// Returns `Ok(None)` for documents whose `name` is not one of the three
    /// recognized kinds.
    pub fn from_source(source: &DocumentSource) -> Result<Option<Self>> {
        let Some(kind) = MetricKind::from_document_name(&source.name) else {
            return Ok(None);
        };

        let origin = format!("{} document of '{}'", source.name, source.test_execution_id);
        let payload = match kind {
            MetricKind::Throughput => {
                MetricPayload::Throughput(ThroughputSample::from_value(&source.value, &origin)?)
            }
            MetricKind::ServiceTime | MetricKind::Latency => {
                MetricPayload::Percentiles(PercentileSample::from_value(&source.value, &origin)?)
            }
        };

        Ok(Some(Self {
            kind,
            test_execution_id: source.test_execution_id.clone(),
            operation: source.operation.clone(),
            payload,
        }))
    }

    /// Host address of the load generator that produced this record.
    pub fn host_identifier(&self) -> Result<Ipv4Addr> {
        host_ip_from_id(&self.test_execution_id)
    }
}

/// Recover the host IPv4 address from a `...-<a.b.c.d>-...` test-execution id.
pub fn host_ip_from_id(test_execution_id: &str) -> Result<Ipv4Addr> {
    HOST_IP_PATTERN
        .captures(test_execution_id)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .ok_or_else(|| AggregationError::NodeIdentifier {
            test_execution_id: test_execution_id.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn source(name: &str, id: &str, value: Value) -> DocumentSource {
        DocumentSource {
            name: name.to_string(),
            test_execution_id: id.to_string(),
            operation: Some("term".to_string()),
            value,
        }
    }

    #[test]
    fn test_host_ip_from_id() {
        assert_eq!(
            host_ip_from_id("8-clients-10.0.3.17-2").unwrap(),
            Ipv4Addr::new(10, 0, 3, 17)
        );
        assert!(matches!(
            host_ip_from_id("8-clients-2"),
            Err(AggregationError::NodeIdentifier { .. })
        ));
        // the address must be delimited on both sides
        assert!(host_ip_from_id("8-clients-10.0.3.17").is_err());
        assert!(host_ip_from_id("run-999.1.1.1-a").is_err());
    }

    #[test]
    fn test_metric_kind_names() {
        for kind in MetricKind::ALL {
            assert_eq!(MetricKind::from_document_name(kind.document_name()), Some(kind));
        }
        assert_eq!(MetricKind::from_document_name("error_rate"), None);
        assert_eq!(MetricKind::ServiceTime.section_key(), "averaged-service-time");
    }

    #[test]
    fn test_percentile_sample_requires_every_label() {
        let value = json!({"50_0": 1.0, "90_0": 2.0, "99_0": 3.0, "99_9": 4.0, "99_99": 5.0});
        let err = PercentileSample::from_value(&value, "doc").unwrap_err();
        match err {
            AggregationError::MissingBucket { bucket, .. } => assert_eq!(bucket, "100_0"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_throughput_sample_rejects_negative_values() {
        let value = json!({"min": -1.0, "mean": 2.0, "median": 2.0, "unit": "ops/s"});
        assert!(matches!(
            ThroughputSample::from_value(&value, "doc"),
            Err(AggregationError::InvalidBucketValue { .. })
        ));
    }

    #[test]
    fn test_record_from_source() {
        let doc = source(
            "service_time",
            "8-clients-10.0.0.1-1",
            json!({"50_0": 1.5, "90_0": 2.0, "99_0": 3.0, "99_9": 4.0, "99_99": 5.0, "100_0": 6.0, "mean": 1.7}),
        );
        let record = MetricRecord::from_source(&doc).unwrap().unwrap();
        assert_eq!(record.kind, MetricKind::ServiceTime);
        assert_eq!(record.host_identifier().unwrap(), Ipv4Addr::new(10, 0, 0, 1));
        match record.payload {
            MetricPayload::Percentiles(p) => {
                assert_eq!(*p.get(Percentile::P50), 1.5);
                assert_eq!(p.p100, 6.0);
            }
            other => panic!("unexpected payload: {other:?}"),
        }

        let unknown = source("error_rate", "8-clients-10.0.0.1-1", json!({}));
        assert!(MetricRecord::from_source(&unknown).unwrap().is_none());
    }
}
