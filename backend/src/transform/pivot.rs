//! Reshape the combined table into one months × organisations sheet per metric.
//!
//! A sheet only carries the months and organisations that have at least one
//! value for its metric; rows and columns that would be entirely empty are
//! left out.

use std::collections::{BTreeMap, BTreeSet};

use crate::models::{CombinedTable, MetricLabel, PivotSheet, ReportingMonth, RowKey};

/// Pivot a single metric out of the combined table.
pub fn pivot_metric(combined: &CombinedTable, metric_idx: usize) -> PivotSheet {
    let observations = combined
        .rows
        .iter()
        .filter_map(|(key, values)| values[metric_idx].map(|v| (key, v)));

    build_sheet(combined.metrics[metric_idx].clone(), observations)
}

/// One sheet per metric, in metric order.
pub fn pivot_all(combined: &CombinedTable) -> Vec<PivotSheet> {
    (0..combined.metrics.len())
        .map(|idx| pivot_metric(combined, idx))
        .collect()
}

/// Pivot loose `(organisation, month, value)` triples. The first value seen
/// for a key is kept.
pub fn pivot_triples(
    metric: MetricLabel,
    triples: impl IntoIterator<Item = (String, ReportingMonth, f64)>,
) -> PivotSheet {
    let mut by_key: BTreeMap<RowKey, f64> = BTreeMap::new();
    for (org, month, value) in triples {
        by_key.entry(RowKey::new(org, month)).or_insert(value);
    }
    build_sheet(metric, by_key.iter().map(|(k, v)| (k, *v)))
}

fn build_sheet<'a>(
    metric: MetricLabel,
    observations: impl Iterator<Item = (&'a RowKey, f64)>,
) -> PivotSheet {
    let observations: Vec<(&RowKey, f64)> = observations.collect();

    let months: Vec<ReportingMonth> = observations
        .iter()
        .map(|(k, _)| k.month)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let organisations: Vec<String> = observations
        .iter()
        .map(|(k, _)| k.organisation.as_str())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect();

    let month_idx: BTreeMap<ReportingMonth, usize> =
        months.iter().enumerate().map(|(i, m)| (*m, i)).collect();
    let org_idx: BTreeMap<&str, usize> = organisations
        .iter()
        .enumerate()
        .map(|(i, o)| (o.as_str(), i))
        .collect();

    let mut cells = vec![vec![None; organisations.len()]; months.len()];
    for (key, value) in &observations {
        let r = month_idx[&key.month];
        let c = org_idx[key.organisation.as_str()];
        cells[r][c] = Some(*value);
    }

    PivotSheet {
        metric,
        months,
        organisations,
        cells,
    }
}
