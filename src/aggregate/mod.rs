//! # Hierarchical Aggregation Engine
//!
//! Raw store documents are reduced in three steps, each producing an
//! [`AggregateResult`](crate::results::AggregateResult):
//!
//! 1. **Node level** (`nodes`): documents of one logical test execution,
//!    reported by several load-generator hosts, are averaged per bucket.
//! 2. **Round level** (`rounds`): several repetitions of the same test are
//!    reduced to a mean and a relative standard deviation per bucket.
//! 3. **Cross pattern** (`cross_pattern`): persisted round-level results found
//!    in a folder are ordered by run number and reduced the same way.
//!
//! Bucket alignment is structural: every level works on `Throughput<T>` and
//! `Percentiles<T>` records, so a bucket cannot go missing between levels.
//! RSD is always a percentage of the mean.

use tracing::warn;

use crate::error::{AggregationError, Result};
use crate::model::{MetricKind, PercentileSample, Percentiles, Throughput, ThroughputSample};
use crate::results::{AveragedPercentileMetric, AveragedThroughput, Stat};
use crate::utils;

pub mod cross_pattern;
pub mod nodes;
pub mod rounds;

pub use cross_pattern::{
    aggregate_cross_pattern, aggregate_folder, discover_round_files, run_number, select_round_files,
    RoundFile,
};
pub use nodes::{aggregate_nodes, aggregate_nodes_from_store, NodeAggregation, NodeSample};
pub use rounds::{aggregate_filtered_rounds, aggregate_rounds, aggregate_rounds_from_store};

/// Sample count a reduction insists on
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Dispersion {
    /// One sample is enough; RSD is reported only from two samples on
    Optional,
    /// At least two samples, so every bucket carries an RSD
    Required,
}

impl Dispersion {
    fn min_samples(self) -> usize {
        match self {
            Dispersion::Optional => 1,
            Dispersion::Required => 2,
        }
    }
}

/// Mean and RSD of one bucket across samples.
fn reduce_bucket(values: &[f64], metric: &str, dispersion: Dispersion) -> Result<Stat> {
    let required = dispersion.min_samples();
    let value = match utils::mean(values) {
        Some(value) if values.len() >= required => value,
        _ => {
            return Err(AggregationError::InsufficientSamples {
                metric: metric.to_string(),
                found: values.len(),
                required,
            })
        }
    };

    let rsd = utils::relative_std_dev(values);
    if rsd.is_none() && values.len() >= 2 {
        warn!("RSD of {} is undefined: mean is zero", metric);
    }
    Ok(Stat::new(value, rsd))
}

pub(crate) fn reduce_throughput(
    samples: &[ThroughputSample],
    units: &str,
    dispersion: Dispersion,
) -> Result<AveragedThroughput> {
    let buckets = Throughput::try_from_fn(|field| {
        let values: Vec<f64> = samples.iter().map(|s| *s.get(field)).collect();
        reduce_bucket(
            &values,
            &format!("{} {}", MetricKind::Throughput, field.label()),
            dispersion,
        )
    })?;
    Ok(AveragedThroughput {
        buckets,
        units: units.to_string(),
    })
}

pub(crate) fn reduce_percentiles(
    kind: MetricKind,
    samples: &[PercentileSample],
    units: &str,
    dispersion: Dispersion,
) -> Result<AveragedPercentileMetric> {
    let buckets = Percentiles::try_from_fn(|percentile| {
        let values: Vec<f64> = samples.iter().map(|s| *s.get(percentile)).collect();
        reduce_bucket(&values, &format!("{} {}", kind, percentile), dispersion)
    })?;
    Ok(AveragedPercentileMetric {
        buckets,
        units: units.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reduce_bucket_dispersion_rules() {
        let stat = reduce_bucket(&[7.0], "x", Dispersion::Optional).unwrap();
        assert_eq!(stat, Stat::new(7.0, None));

        let err = reduce_bucket(&[7.0], "latency p50", Dispersion::Required).unwrap_err();
        match err {
            AggregationError::InsufficientSamples {
                metric,
                found,
                required,
            } => {
                assert_eq!(metric, "latency p50");
                assert_eq!((found, required), (1, 2));
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(reduce_bucket(&[], "x", Dispersion::Optional).is_err());
    }

    #[test]
    fn test_reduce_bucket_zero_mean_leaves_rsd_undefined() {
        let stat = reduce_bucket(&[0.0, 0.0, 0.0], "x", Dispersion::Required).unwrap();
        assert_eq!(stat.value, 0.0);
        assert_eq!(stat.rsd, None);
    }

    #[test]
    fn test_reduce_percentiles_keeps_bucket_alignment() {
        let samples = vec![
            Percentiles { p50: 10.0, p90: 20.0, p99: 30.0, p99_9: 40.0, p99_99: 50.0, p100: 60.0 },
            Percentiles { p50: 14.0, p90: 24.0, p99: 34.0, p99_9: 44.0, p99_99: 54.0, p100: 64.0 },
        ];
        let averaged =
            reduce_percentiles(MetricKind::Latency, &samples, "ms", Dispersion::Required).unwrap();
        assert_eq!(averaged.buckets.p50.value, 12.0);
        assert_eq!(averaged.buckets.p99_99.value, 52.0);
        assert_eq!(averaged.buckets.p100.value, 62.0);
        assert_eq!(averaged.units, "ms");
    }
}
