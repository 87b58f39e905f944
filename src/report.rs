//! Console tables for per-node inputs and aggregated results.

use std::collections::BTreeMap;

use comfy_table::{presets::UTF8_FULL, Cell, CellAlignment, Row, Table};

use crate::aggregate::{NodeAggregation, NodeSample};
use crate::model::{MetricKind, Percentile, ThroughputField};
use crate::results::{AggregateResult, Stat};
use crate::utils::{format_rsd, round_to};

const DISPLAY_DECIMALS: u32 = 3;

fn new_table(header: Vec<String>) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(header);
    table
}

fn number(value: f64) -> Cell {
    Cell::new(round_to(value, DISPLAY_DECIMALS)).set_alignment(CellAlignment::Right)
}

fn node_rows<S>(
    table: &mut Table,
    nodes: &BTreeMap<String, NodeSample<S>>,
    values: impl Fn(&S) -> Vec<f64>,
) {
    for (id, node) in nodes {
        let mut row = Row::new();
        row.add_cell(Cell::new(id))
            .add_cell(Cell::new(node.host))
            .add_cell(Cell::new(node.operation.as_deref().unwrap_or("-")));
        for value in values(&node.sample) {
            row.add_cell(number(value));
        }
        table.add_row(row);
    }
}

/// One row per contributing host for `kind`, or `None` when no host reported it.
pub fn node_table(aggregation: &NodeAggregation, kind: MetricKind) -> Option<Table> {
    if aggregation.node_count(kind) == 0 {
        return None;
    }

    let mut header: Vec<String> = ["Test execution", "Host", "Operation"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let table = match kind {
        MetricKind::Throughput => {
            header.extend(ThroughputField::ALL.iter().map(|f| f.label().to_string()));
            let mut table = new_table(header);
            node_rows(&mut table, &aggregation.per_node_throughput, |s| {
                ThroughputField::ALL.iter().map(|f| *s.get(*f)).collect()
            });
            table
        }
        MetricKind::ServiceTime | MetricKind::Latency => {
            header.extend(Percentile::ALL.iter().map(|p| p.to_string()));
            let nodes = if kind == MetricKind::Latency {
                &aggregation.per_node_latency
            } else {
                &aggregation.per_node_service_time
            };
            let mut table = new_table(header);
            node_rows(&mut table, nodes, |s| {
                Percentile::ALL.iter().map(|p| *s.get(*p)).collect()
            });
            table
        }
    };
    Some(table)
}

fn stat_row(table: &mut Table, kind: MetricKind, bucket: String, stat: &Stat, units: &str) {
    table.add_row(vec![
        Cell::new(kind),
        Cell::new(bucket),
        number(stat.value),
        Cell::new(format_rsd(stat.rsd)).set_alignment(CellAlignment::Right),
        Cell::new(units),
    ]);
}

/// Mean and RSD of every bucket. Latency rows are shown only on request.
pub fn aggregate_table(result: &AggregateResult, include_latency: bool) -> Table {
    let mut table = new_table(
        ["Metric", "Bucket", "Mean", "RSD", "Units"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
    );

    if let Some(throughput) = &result.averaged_throughput {
        for field in ThroughputField::ALL {
            stat_row(
                &mut table,
                MetricKind::Throughput,
                field.label().to_string(),
                throughput.buckets.get(field),
                &throughput.units,
            );
        }
    }

    let mut kinds = vec![MetricKind::ServiceTime];
    if include_latency {
        kinds.push(MetricKind::Latency);
    }
    for kind in kinds {
        if let Some(section) = result.percentile_section(kind) {
            for percentile in Percentile::ALL {
                stat_row(
                    &mut table,
                    kind,
                    percentile.to_string(),
                    section.buckets.get(percentile),
                    &section.units,
                );
            }
        }
    }
    table
}
