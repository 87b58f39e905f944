//! # Aggregate Result Model
//!
//! The output of every aggregation level, and the persisted JSON document that
//! links one level to the next:
//!
//! ```json
//! {
//!   "test-pattern": ["8-clients-1", "8-clients-2"],
//!   "averaged-throughput": { "min": 1.0, "min_rsd": 2.0, "mean": 1.0, ..., "units": "ops/s" },
//!   "averaged-service-time": { "50_0": 1.0, "50_0_rsd": 2.0, ..., "units": "ms" },
//!   "averaged-latency": { "50_0": 1.0, "50_0_rsd": 2.0, ..., "units": "ms" }
//! }
//! ```
//!
//! Reading goes through lenient wire structs and then a validating conversion,
//! so an absent section or bucket surfaces as `MissingBucket` naming the file
//! rather than as a generic parse error. `*_rsd` keys are optional.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use tracing::info;

use crate::error::{AggregationError, Result};
use crate::model::{MetricKind, Percentile, Percentiles, Throughput, ThroughputField};

/// Mean of one bucket and its relative standard deviation (percent)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Stat {
    pub value: f64,
    /// Undefined with fewer than two samples or a zero mean
    pub rsd: Option<f64>,
}

impl Stat {
    pub fn new(value: f64, rsd: Option<f64>) -> Self {
        Self { value, rsd }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AveragedThroughput {
    pub buckets: Throughput<Stat>,
    pub units: String,
}

/// Shared shape of averaged service time and averaged latency
#[derive(Clone, Debug, PartialEq)]
pub struct AveragedPercentileMetric {
    pub buckets: Percentiles<Stat>,
    pub units: String,
}

/// Result of one aggregation pass.
///
/// A section is `None` when no input contributed to that metric kind; callers
/// must check before use.
#[derive(Clone, Debug, PartialEq)]
pub struct AggregateResult {
    pub test_pattern: Vec<String>,
    pub averaged_throughput: Option<AveragedThroughput>,
    pub averaged_service_time: Option<AveragedPercentileMetric>,
    pub averaged_latency: Option<AveragedPercentileMetric>,
}

impl AggregateResult {
    pub fn percentile_section(&self, kind: MetricKind) -> Option<&AveragedPercentileMetric> {
        match kind {
            MetricKind::Throughput => None,
            MetricKind::ServiceTime => self.averaged_service_time.as_ref(),
            MetricKind::Latency => self.averaged_latency.as_ref(),
        }
    }

    pub fn has_section(&self, kind: MetricKind) -> bool {
        match kind {
            MetricKind::Throughput => self.averaged_throughput.is_some(),
            _ => self.percentile_section(kind).is_some(),
        }
    }

    /// Parse a persisted result, naming `source_name` in validation errors.
    pub fn from_json_str(json: &str, source_name: &str, path: &Path) -> Result<Self> {
        let wire: PersistedResult =
            serde_json::from_str(json).map_err(|source| AggregationError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        wire.into_result(source_name)
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&PersistedResult::from(self))
    }

    /// Load a persisted result file.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| AggregationError::io(path, e))?;
        let source_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::from_json_str(&json, &source_name, path)
    }

    /// Write this result as pretty-printed JSON.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = self.to_json_string().map_err(|source| AggregationError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, json).map_err(|e| AggregationError::io(path, e))?;
        info!("Results written to: {}", path.display());
        Ok(())
    }
}

/// Output file for a node-level pass: `<name>-averaged.json`.
///
/// A trailing wildcard (and the separator before it) is dropped, so
/// `8-clients-*` becomes `8-clients-averaged.json`.
pub fn node_output_path(output_name: &str) -> PathBuf {
    let base = match output_name.strip_suffix('*') {
        Some(stripped) => stripped.strip_suffix('-').unwrap_or(stripped),
        None => output_name,
    };
    PathBuf::from(format!("{}{}", base, crate::defaults::NODE_OUTPUT_SUFFIX))
}

/// Output file for a round or cross-pattern pass: `<name>.json`
pub fn aggregate_output_path(output_name: &str) -> PathBuf {
    PathBuf::from(format!("{}.{}", output_name, crate::defaults::RESULT_EXTENSION))
}

// Persisted wire format

#[derive(Debug, Serialize, Deserialize)]
struct PersistedResult {
    #[serde(
        rename = "test-pattern",
        default,
        deserialize_with = "one_or_many"
    )]
    test_pattern: Vec<String>,
    #[serde(
        rename = "averaged-throughput",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    averaged_throughput: Option<PersistedThroughput>,
    #[serde(
        rename = "averaged-service-time",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    averaged_service_time: Option<PersistedPercentiles>,
    #[serde(
        rename = "averaged-latency",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    averaged_latency: Option<PersistedPercentiles>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedThroughput {
    #[serde(default)]
    min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    min_rsd: Option<f64>,
    #[serde(default)]
    mean: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mean_rsd: Option<f64>,
    #[serde(default)]
    median: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    median_rsd: Option<f64>,
    #[serde(default)]
    units: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedPercentiles {
    #[serde(rename = "50_0", default)]
    p50: Option<f64>,
    #[serde(rename = "50_0_rsd", default, skip_serializing_if = "Option::is_none")]
    p50_rsd: Option<f64>,
    #[serde(rename = "90_0", default)]
    p90: Option<f64>,
    #[serde(rename = "90_0_rsd", default, skip_serializing_if = "Option::is_none")]
    p90_rsd: Option<f64>,
    #[serde(rename = "99_0", default)]
    p99: Option<f64>,
    #[serde(rename = "99_0_rsd", default, skip_serializing_if = "Option::is_none")]
    p99_rsd: Option<f64>,
    #[serde(rename = "99_9", default)]
    p99_9: Option<f64>,
    #[serde(rename = "99_9_rsd", default, skip_serializing_if = "Option::is_none")]
    p99_9_rsd: Option<f64>,
    #[serde(rename = "99_99", default)]
    p99_99: Option<f64>,
    #[serde(rename = "99_99_rsd", default, skip_serializing_if = "Option::is_none")]
    p99_99_rsd: Option<f64>,
    #[serde(rename = "100_0", default)]
    p100: Option<f64>,
    #[serde(rename = "100_0_rsd", default, skip_serializing_if = "Option::is_none")]
    p100_rsd: Option<f64>,
    #[serde(default)]
    units: Option<String>,
}

/// Node-level files written by older tooling store `test-pattern` as a string.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(pattern) => vec![pattern],
        OneOrMany::Many(patterns) => patterns,
    })
}

impl PersistedThroughput {
    /// No bucket carries a value, as in node files with an unreported kind
    fn is_blank(&self) -> bool {
        ThroughputField::ALL.iter().all(|&f| self.slot(f).0.is_none())
    }

    fn slot(&self, field: ThroughputField) -> (Option<f64>, Option<f64>) {
        match field {
            ThroughputField::Min => (self.min, self.min_rsd),
            ThroughputField::Mean => (self.mean, self.mean_rsd),
            ThroughputField::Median => (self.median, self.median_rsd),
        }
    }

    fn into_averaged(self, source_name: &str) -> Result<AveragedThroughput> {
        let buckets = Throughput::try_from_fn(|field| {
            let (value, rsd) = self.slot(field);
            let value = value.ok_or_else(|| {
                AggregationError::missing(
                    source_name,
                    format!("{}.{}", MetricKind::Throughput.section_key(), field.label()),
                )
            })?;
            Ok::<_, AggregationError>(Stat::new(value, rsd))
        })?;
        Ok(AveragedThroughput {
            buckets,
            units: self
                .units
                .unwrap_or_else(|| MetricKind::Throughput.default_units().to_string()),
        })
    }
}

impl From<&AveragedThroughput> for PersistedThroughput {
    fn from(averaged: &AveragedThroughput) -> Self {
        let b = &averaged.buckets;
        Self {
            min: Some(b.min.value),
            min_rsd: b.min.rsd,
            mean: Some(b.mean.value),
            mean_rsd: b.mean.rsd,
            median: Some(b.median.value),
            median_rsd: b.median.rsd,
            units: Some(averaged.units.clone()),
        }
    }
}

impl PersistedPercentiles {
    fn is_blank(&self) -> bool {
        Percentile::ALL.iter().all(|&p| self.slot(p).0.is_none())
    }

    fn slot(&self, percentile: Percentile) -> (Option<f64>, Option<f64>) {
        match percentile {
            Percentile::P50 => (self.p50, self.p50_rsd),
            Percentile::P90 => (self.p90, self.p90_rsd),
            Percentile::P99 => (self.p99, self.p99_rsd),
            Percentile::P99_9 => (self.p99_9, self.p99_9_rsd),
            Percentile::P99_99 => (self.p99_99, self.p99_99_rsd),
            Percentile::P100 => (self.p100, self.p100_rsd),
        }
    }

    fn into_averaged(self, kind: MetricKind, source_name: &str) -> Result<AveragedPercentileMetric> {
        let buckets = Percentiles::try_from_fn(|percentile| {
            let (value, rsd) = self.slot(percentile);
            let value = value.ok_or_else(|| {
                AggregationError::missing(
                    source_name,
                    format!("{}.{}", kind.section_key(), percentile.label()),
                )
            })?;
            Ok::<_, AggregationError>(Stat::new(value, rsd))
        })?;
        Ok(AveragedPercentileMetric {
            buckets,
            units: self
                .units
                .unwrap_or_else(|| kind.default_units().to_string()),
        })
    }
}

impl From<&AveragedPercentileMetric> for PersistedPercentiles {
    fn from(averaged: &AveragedPercentileMetric) -> Self {
        let b = &averaged.buckets;
        Self {
            p50: Some(b.p50.value),
            p50_rsd: b.p50.rsd,
            p90: Some(b.p90.value),
            p90_rsd: b.p90.rsd,
            p99: Some(b.p99.value),
            p99_rsd: b.p99.rsd,
            p99_9: Some(b.p99_9.value),
            p99_9_rsd: b.p99_9.rsd,
            p99_99: Some(b.p99_99.value),
            p99_99_rsd: b.p99_99.rsd,
            p100: Some(b.p100.value),
            p100_rsd: b.p100.rsd,
            units: Some(averaged.units.clone()),
        }
    }
}

impl PersistedResult {
    fn into_result(self, source_name: &str) -> Result<AggregateResult> {
        Ok(AggregateResult {
            test_pattern: self.test_pattern,
            averaged_throughput: self
                .averaged_throughput
                .filter(|t| !t.is_blank())
                .map(|t| t.into_averaged(source_name))
                .transpose()?,
            averaged_service_time: self
                .averaged_service_time
                .filter(|p| !p.is_blank())
                .map(|p| p.into_averaged(MetricKind::ServiceTime, source_name))
                .transpose()?,
            averaged_latency: self
                .averaged_latency
                .filter(|p| !p.is_blank())
                .map(|p| p.into_averaged(MetricKind::Latency, source_name))
                .transpose()?,
        })
    }
}

impl From<&AggregateResult> for PersistedResult {
    fn from(result: &AggregateResult) -> Self {
        Self {
            test_pattern: result.test_pattern.clone(),
            averaged_throughput: result.averaged_throughput.as_ref().map(Into::into),
            averaged_service_time: result.averaged_service_time.as_ref().map(Into::into),
            averaged_latency: result.averaged_latency.as_ref().map(Into::into),
        }
    }
}
