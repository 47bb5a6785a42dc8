//! Merge cleaned tables into one wide table.
//!
//! Two steps:
//!
//! 1. Per label, concatenate every table and keep the first non-empty value
//!    for each `(organisation, month)`. A local and a national file sharing a
//!    label therefore never add up; the earlier file wins.
//! 2. Outer-join the per-label tables on `(organisation, month)`, one column
//!    per label, in the order labels were first seen.

use std::collections::BTreeMap;

use crate::error::{PipelineError, PipelineResult};
use crate::models::{CleanedTable, CombinedTable, MetricLabel, RowKey};

/// One label's rows after de-duplication.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelTable {
    pub label: MetricLabel,
    pub values: BTreeMap<RowKey, Option<f64>>,
}

/// Collapse all tables sharing `label` into one value per key.
pub fn merge_label<'a>(
    label: &MetricLabel,
    tables: impl IntoIterator<Item = &'a CleanedTable>,
) -> LabelTable {
    let mut values: BTreeMap<RowKey, Option<f64>> = BTreeMap::new();

    for table in tables {
        for row in &table.rows {
            let slot = values.entry(row.key()).or_insert(None);
            if slot.is_none() {
                *slot = row.value;
            }
        }
    }

    LabelTable {
        label: label.clone(),
        values,
    }
}

/// Group tables by label, keeping labels in first-seen order.
pub fn group_by_label(cleaned: &[CleanedTable]) -> Vec<(MetricLabel, Vec<&CleanedTable>)> {
    let mut groups: Vec<(MetricLabel, Vec<&CleanedTable>)> = Vec::new();

    for table in cleaned {
        match groups.iter_mut().find(|(label, _)| *label == table.label) {
            Some((_, members)) => members.push(table),
            None => groups.push((table.label.clone(), vec![table])),
        }
    }

    groups
}

/// Outer join on `(organisation, month)`. Missing values stay empty.
pub fn outer_join(tables: Vec<LabelTable>) -> CombinedTable {
    let width = tables.len();
    let mut combined = CombinedTable {
        metrics: Vec::with_capacity(width),
        rows: BTreeMap::new(),
    };

    for (col, table) in tables.into_iter().enumerate() {
        combined.metrics.push(table.label);
        for (key, value) in table.values {
            let row = combined.rows.entry(key).or_insert_with(|| vec![None; width]);
            row[col] = value;
        }
    }

    combined
}

/// Merge every cleaned table into one [`CombinedTable`].
///
/// Fails with [`PipelineError::NoData`] when there is nothing to merge.
pub fn combine(cleaned: &[CleanedTable]) -> PipelineResult<CombinedTable> {
    if cleaned.is_empty() {
        return Err(PipelineError::NoData);
    }

    let merged = group_by_label(cleaned)
        .into_iter()
        .map(|(label, members)| merge_label(&label, members))
        .collect();

    Ok(outer_join(merged))
}
