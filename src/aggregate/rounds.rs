//! Round-level aggregation: several repetitions of one test configuration
//! reduced to a mean and an RSD per bucket.

use tracing::{info, warn};

use super::{reduce_percentiles, reduce_throughput, Dispersion};
use crate::error::{AggregationError, Result};
use crate::filter::{filter_documents, FilteredDocuments};
use crate::model::{MetricKind, PercentileSample, ThroughputSample};
use crate::results::{AggregateResult, AveragedPercentileMetric, AveragedThroughput};
use crate::store::{fetch_documents, IdFilter, MetricsStore, QueryOptions};

const MIN_ROUNDS: usize = 2;

/// Reduce a set of per-round results to one result.
///
/// Every round must carry the same sections: a section present in some
/// rounds but not in others fails with `MissingBucket`, a section absent from
/// all of them is left undefined. Units are taken from the first round.
pub fn aggregate_rounds(rounds: &[AggregateResult]) -> Result<AggregateResult> {
    if rounds.len() < MIN_ROUNDS {
        return Err(AggregationError::InsufficientSamples {
            metric: "rounds".to_string(),
            found: rounds.len(),
            required: MIN_ROUNDS,
        });
    }

    let throughput = collect_section(rounds, MetricKind::Throughput, |r| {
        r.averaged_throughput.as_ref()
    })?;
    let service_time = collect_section(rounds, MetricKind::ServiceTime, |r| {
        r.averaged_service_time.as_ref()
    })?;
    let latency = collect_section(rounds, MetricKind::Latency, |r| r.averaged_latency.as_ref())?;

    let test_pattern: Vec<String> = rounds
        .iter()
        .flat_map(|r| r.test_pattern.iter().cloned())
        .collect();
    info!("Aggregating {} rounds: {}", rounds.len(), test_pattern.join(", "));

    Ok(AggregateResult {
        test_pattern,
        averaged_throughput: throughput
            .map(|sections| reduce_throughput_section(&sections))
            .transpose()?,
        averaged_service_time: service_time
            .map(|sections| reduce_percentile_section(MetricKind::ServiceTime, &sections))
            .transpose()?,
        averaged_latency: latency
            .map(|sections| reduce_percentile_section(MetricKind::Latency, &sections))
            .transpose()?,
    })
}

/// Gather one section from every round, or `None` when no round has it.
fn collect_section<'a, T>(
    rounds: &'a [AggregateResult],
    kind: MetricKind,
    section: impl Fn(&'a AggregateResult) -> Option<&'a T>,
) -> Result<Option<Vec<&'a T>>> {
    let present: Vec<Option<&T>> = rounds.iter().map(&section).collect();
    if present.iter().all(Option::is_none) {
        warn!("No round carries {}; leaving it undefined", kind.section_key());
        return Ok(None);
    }

    present
        .into_iter()
        .zip(rounds)
        .map(|(value, round)| {
            value.ok_or_else(|| {
                AggregationError::missing(round_label(round), kind.section_key())
            })
        })
        .collect::<Result<Vec<_>>>()
        .map(Some)
}

fn round_label(round: &AggregateResult) -> String {
    if round.test_pattern.is_empty() {
        "round with no test pattern".to_string()
    } else {
        format!("round '{}'", round.test_pattern.join(","))
    }
}

fn first_units<'a>(kind: MetricKind, units: impl Iterator<Item = &'a str>) -> String {
    let mut units = units;
    let Some(first) = units.next() else {
        return kind.default_units().to_string();
    };
    for other in units {
        if other != first {
            warn!(
                "{} units differ between rounds ('{}' vs '{}'); keeping '{}'",
                kind, first, other, first
            );
        }
    }
    first.to_string()
}

fn reduce_throughput_section(sections: &[&AveragedThroughput]) -> Result<AveragedThroughput> {
    let samples: Vec<ThroughputSample> = sections
        .iter()
        .map(|s| s.buckets.map(|stat| stat.value))
        .collect();
    let units = first_units(
        MetricKind::Throughput,
        sections.iter().map(|s| s.units.as_str()),
    );
    reduce_throughput(&samples, &units, Dispersion::Required)
}

fn reduce_percentile_section(
    kind: MetricKind,
    sections: &[&AveragedPercentileMetric],
) -> Result<AveragedPercentileMetric> {
    let samples: Vec<PercentileSample> = sections
        .iter()
        .map(|s| s.buckets.map(|stat| stat.value))
        .collect();
    let units = first_units(kind, sections.iter().map(|s| s.units.as_str()));
    reduce_percentiles(kind, &samples, &units, Dispersion::Required)
}

/// Reduce the filtered documents of several rounds directly.
///
/// Each document is one round's sample. Kinds with no document are left
/// undefined; a kind with a single document cannot carry an RSD and fails.
pub fn aggregate_filtered_rounds(filtered: &FilteredDocuments) -> Result<AggregateResult> {
    info!(
        "Throughput Metrics: {}, Service Time Metrics: {}, Latency Metrics: {}",
        filtered.throughput.len(),
        filtered.service_time.len(),
        filtered.latency.len()
    );

    let averaged_throughput = if filtered.throughput.is_empty() {
        warn!("No throughput documents; leaving it undefined");
        None
    } else {
        Some(reduce_throughput(
            &filtered.throughput,
            MetricKind::Throughput.default_units(),
            Dispersion::Required,
        )?)
    };

    let percentiles = |kind: MetricKind, samples: &[PercentileSample]| {
        if samples.is_empty() {
            warn!("No {} documents; leaving it undefined", kind);
            return Ok(None);
        }
        reduce_percentiles(kind, samples, kind.default_units(), Dispersion::Required).map(Some)
    };

    Ok(AggregateResult {
        test_pattern: filtered.unique_ids.iter().cloned().collect(),
        averaged_throughput,
        averaged_service_time: percentiles(MetricKind::ServiceTime, &filtered.service_time)?,
        averaged_latency: percentiles(MetricKind::Latency, &filtered.latency)?,
    })
}

/// Fetch every round matching `filters` from the store and aggregate them.
pub async fn aggregate_rounds_from_store(
    store: &dyn MetricsStore,
    filters: &[IdFilter],
    options: &QueryOptions,
) -> Result<AggregateResult> {
    let documents = fetch_documents(store, filters, options).await?;
    let filtered = filter_documents(&documents)?;
    aggregate_filtered_rounds(&filtered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Percentile, ThroughputField};
    use crate::results::testing::{percentile_metric, sample_result};
    use crate::results::Stat;
    use crate::store::testing::{hit, response, CannedStore};
    use crate::store::SearchHit;
    use serde_json::json;

    fn latency_round(pattern: &str, p50: f64) -> AggregateResult {
        let mut round = sample_result(pattern, 1000.0, 1.0);
        round.averaged_latency = Some(percentile_metric(p50, Some(1.0)));
        round
    }

    #[test]
    fn test_three_rounds_mean_and_rsd() {
        let rounds = vec![
            latency_round("r-1", 10.0),
            latency_round("r-2", 12.0),
            latency_round("r-3", 14.0),
        ];
        let result = aggregate_rounds(&rounds).unwrap();

        let latency = result.averaged_latency.unwrap();
        assert_eq!(latency.buckets.p50.value, 12.0);
        let rsd = latency.buckets.p50.rsd.unwrap();
        assert!((rsd - 16.666_666_666_666_668).abs() < 1e-9);
        assert_eq!(latency.units, "ms");
        assert_eq!(result.test_pattern, vec!["r-1", "r-2", "r-3"]);

        // Identical throughput in every round: zero dispersion
        let throughput = result.averaged_throughput.unwrap();
        assert_eq!(throughput.buckets.mean, Stat::new(1000.0, Some(0.0)));
    }

    #[test]
    fn test_rsd_independent_of_round_order() {
        let forward = vec![
            latency_round("a", 3.0),
            latency_round("b", 7.0),
            latency_round("c", 11.0),
        ];
        let mut reversed = forward.clone();
        reversed.reverse();

        let a = aggregate_rounds(&forward).unwrap().averaged_latency.unwrap();
        let b = aggregate_rounds(&reversed).unwrap().averaged_latency.unwrap();
        for p in Percentile::ALL {
            let (x, y) = (a.buckets.get(p), b.buckets.get(p));
            assert!((x.value - y.value).abs() < 1e-12);
            assert!((x.rsd.unwrap() - y.rsd.unwrap()).abs() < 1e-9);
        }
    }

    #[test]
    fn test_single_round_is_rejected() {
        let err = aggregate_rounds(&[latency_round("only", 1.0)]).unwrap_err();
        assert!(matches!(
            err,
            AggregationError::InsufficientSamples { found: 1, required: 2, .. }
        ));
        assert!(aggregate_rounds(&[]).is_err());
    }

    #[test]
    fn test_section_missing_in_one_round() {
        let mut second = latency_round("r-2", 2.0);
        second.averaged_service_time = None;
        let rounds = vec![latency_round("r-1", 1.0), second];

        match aggregate_rounds(&rounds).unwrap_err() {
            AggregationError::MissingBucket { source_name, bucket } => {
                assert_eq!(bucket, "averaged-service-time");
                assert!(source_name.contains("r-2"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_section_missing_everywhere_stays_undefined() {
        let rounds: Vec<AggregateResult> = ["r-1", "r-2"]
            .iter()
            .map(|p| {
                let mut round = latency_round(p, 1.0);
                round.averaged_throughput = None;
                round
            })
            .collect();
        let result = aggregate_rounds(&rounds).unwrap();
        assert!(result.averaged_throughput.is_none());
        assert!(result.averaged_latency.is_some());
    }

    #[test]
    fn test_units_follow_first_round() {
        let first = latency_round("r-1", 1.0);
        let mut second = latency_round("r-2", 1.0);
        if let Some(latency) = second.averaged_latency.as_mut() {
            latency.units = "us".to_string();
        }
        let result = aggregate_rounds(&[first, second]).unwrap();
        assert_eq!(result.averaged_latency.unwrap().units, "ms");
    }

    #[test]
    fn test_filtered_rounds() {
        let documents: Vec<SearchHit> = [(100.0, "big5-1"), (120.0, "big5-2"), (140.0, "big5-3")]
            .iter()
            .map(|(mean, id)| {
                serde_json::from_value(hit(
                    "throughput",
                    id,
                    json!({"min": mean - 10.0, "mean": mean, "median": mean + 1.0}),
                ))
                .unwrap()
            })
            .collect();
        let filtered = filter_documents(&documents).unwrap();
        let result = aggregate_filtered_rounds(&filtered).unwrap();

        assert_eq!(result.test_pattern, vec!["big5-1", "big5-2", "big5-3"]);
        let throughput = result.averaged_throughput.unwrap();
        assert_eq!(throughput.buckets.get(ThroughputField::Mean).value, 120.0);
        assert!((throughput.buckets.mean.rsd.unwrap() - 100.0 / 6.0).abs() < 1e-9);
        assert!(result.averaged_latency.is_none());
    }

    #[tokio::test]
    async fn test_rounds_from_store_single_document_fails() {
        let store = CannedStore::new(vec![response(vec![hit(
            "latency",
            "big5-1",
            json!({"50_0": 1.0, "90_0": 1.0, "99_0": 1.0, "99_9": 1.0, "99_99": 1.0, "100_0": 1.0}),
        )])]);
        let filters = vec![IdFilter::Wildcard("big5-*".to_string())];
        let err = aggregate_rounds_from_store(&store, &filters, &QueryOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AggregationError::InsufficientSamples { found: 1, .. }));
    }
}
