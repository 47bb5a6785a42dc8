//! Row normalization for local and national extracts.
//!
//! ```text
//! Local extract                               Cleaned table
//! ┌──────────────────────────────────────┐   ┌───────────────────────────────┐
//! │ Org A │ Practice 1 │ Jan-24 │ 30 │ 50 │   │ Org A  │ Jan-24 │ 50.0         │
//! │ Org A │ Practice 2 │ Jan-24 │ 20 │ 50 │ → │ Org B  │ Jan-24 │ 25.0         │
//! │ Org B │ Practice 3 │ Jan-24 │ 10 │ 40 │   │ Region │ Jan-24 │ 42.86        │
//! └──────────────────────────────────────┘   └───────────────────────────────┘
//! ```
//!
//! Local rows are filtered (closed and dispensing practices), summed per
//! organisation and month, topped up with a regional rollup, and turned
//! into percentages. National rows already carry the percentage and are
//! only renamed and canonicalized.

use regex::Regex;
use std::collections::BTreeMap;

use crate::api::logs::{log_info_indent, log_success_indent, log_warning_indent};
use crate::config::{
    CLOSED_PRACTICE_PATTERN, COL_COUNTRY, COL_DENOMINATOR, COL_MONTH, COL_NUMERATOR,
    COL_ORGANISATION, COL_PRACTICE_CODE, COL_VALUE, LOCAL_EXTRANEOUS_COLUMNS,
    NATIONAL_EXTRANEOUS_COLUMNS, ORGANISATIONS,
};
use crate::error::{NormalizeError, NormalizeResult};
use crate::loader::LoadedTable;
use crate::models::{
    CleanStats, CleanedRow, CleanedTable, MetricLabel, ReportingMonth, RowKey, SourceKind,
};
use crate::parser::{field, ParseResult};

/// How many offending month values to quote in a warning.
const MONTH_SAMPLE_SIZE: usize = 3;

/// Clean a loaded file according to its kind.
pub fn clean(loaded: &LoadedTable, region_name: &str) -> NormalizeResult<CleanedTable> {
    let file = &loaded.file;
    let cleaned = match file.kind {
        SourceKind::Local => clean_local(&file.name, &loaded.table, &file.label, region_name)?,
        SourceKind::National => clean_national(&file.name, &loaded.table, &file.label)?,
    };
    report(&cleaned);
    Ok(cleaned)
}

/// Local branch: filter, sum per organisation/month, add the regional
/// rollup, compute percentages.
pub fn clean_local(
    file: &str,
    table: &ParseResult,
    label: &MetricLabel,
    region_name: &str,
) -> NormalizeResult<CleanedTable> {
    require_columns(
        file,
        table,
        &[COL_ORGANISATION, COL_MONTH, COL_NUMERATOR, COL_DENOMINATOR],
    )?;
    note_ignored_columns(file, table, LOCAL_EXTRANEOUS_COLUMNS);

    let closed_practice = Regex::new(CLOSED_PRACTICE_PATTERN)?;
    let has_practice_code = table.has_column(COL_PRACTICE_CODE);

    let mut stats = CleanStats {
        input_rows: table.row_count(),
        ..CleanStats::default()
    };
    let mut bad_months = Vec::new();
    let mut totals: BTreeMap<RowKey, (f64, f64)> = BTreeMap::new();

    for (idx, record) in table.records.iter().enumerate() {
        if has_practice_code {
            let code = field(record, COL_PRACTICE_CODE).unwrap_or("");
            if closed_practice.is_match(code) {
                stats.closed_practice_rows += 1;
                continue;
            }
        }

        let raw_month = field(record, COL_MONTH).unwrap_or("");
        let Some(month) = ReportingMonth::parse(raw_month) else {
            stats.unparsed_month_rows += 1;
            sample(&mut bad_months, raw_month);
            continue;
        };

        let raw_org = field(record, COL_ORGANISATION).unwrap_or("");
        if raw_org.is_empty() {
            stats.blank_organisation_rows += 1;
            continue;
        }
        let organisation = ORGANISATIONS.canonicalize(raw_org);

        let line = idx + 2;
        let numerator = parse_number(file, line, COL_NUMERATOR, record)?.unwrap_or(0.0);
        let denominator = parse_number(file, line, COL_DENOMINATOR, record)?.unwrap_or(0.0);

        let entry = totals
            .entry(RowKey::new(organisation, month))
            .or_insert((0.0, 0.0));
        entry.0 += numerator;
        entry.1 += denominator;
    }

    let mut rollup: BTreeMap<ReportingMonth, (f64, f64)> = BTreeMap::new();
    for (key, (num, den)) in &totals {
        let entry = rollup.entry(key.month).or_insert((0.0, 0.0));
        entry.0 += num;
        entry.1 += den;
    }

    // A source organisation already named like the region keeps its own row.
    let clashing: Vec<ReportingMonth> = rollup
        .keys()
        .filter(|month| totals.contains_key(&RowKey::new(region_name, **month)))
        .copied()
        .collect();
    if !clashing.is_empty() {
        log_warning_indent(
            format!(
                "{}: '{}' already present for {} month(s), no rollup row added",
                file,
                region_name,
                clashing.len()
            ),
            2,
        );
    }

    let mut rows: Vec<CleanedRow> = totals
        .into_iter()
        .map(|(key, (num, den))| CleanedRow {
            organisation: key.organisation,
            month: key.month,
            value: Some(percentage(num, den)),
        })
        .collect();

    rows.extend(
        rollup
            .into_iter()
            .filter(|(month, _)| !clashing.contains(month))
            .map(|(month, (num, den))| CleanedRow {
                organisation: region_name.to_string(),
                month,
                value: Some(percentage(num, den)),
            }),
    );

    warn_bad_months(file, &bad_months, stats.unparsed_month_rows);

    Ok(CleanedTable {
        source: file.to_string(),
        kind: SourceKind::Local,
        label: label.clone(),
        rows,
        stats,
    })
}

/// National branch: rename `Country`/`Value`, parse months, canonicalize.
/// One output row per usable input row; nothing is aggregated.
pub fn clean_national(
    file: &str,
    table: &ParseResult,
    label: &MetricLabel,
) -> NormalizeResult<CleanedTable> {
    require_columns(file, table, &[COL_COUNTRY, COL_MONTH, COL_VALUE])?;
    note_ignored_columns(file, table, NATIONAL_EXTRANEOUS_COLUMNS);

    let mut stats = CleanStats {
        input_rows: table.row_count(),
        ..CleanStats::default()
    };
    let mut bad_months = Vec::new();
    let mut rows = Vec::with_capacity(table.row_count());

    for (idx, record) in table.records.iter().enumerate() {
        let raw_month = field(record, COL_MONTH).unwrap_or("");
        let Some(month) = ReportingMonth::parse(raw_month) else {
            stats.unparsed_month_rows += 1;
            sample(&mut bad_months, raw_month);
            continue;
        };

        let raw_country = field(record, COL_COUNTRY).unwrap_or("");
        if raw_country.is_empty() {
            stats.blank_organisation_rows += 1;
            continue;
        }

        rows.push(CleanedRow {
            organisation: ORGANISATIONS.canonicalize(raw_country).to_string(),
            month,
            value: parse_number(file, idx + 2, COL_VALUE, record)?,
        });
    }

    warn_bad_months(file, &bad_months, stats.unparsed_month_rows);

    Ok(CleanedTable {
        source: file.to_string(),
        kind: SourceKind::National,
        label: label.clone(),
        rows,
        stats,
    })
}

/// `numerator / denominator × 100` rounded to 2 decimals (ties to even),
/// or `0` when the denominator is zero.
pub fn percentage(numerator: f64, denominator: f64) -> f64 {
    if denominator != 0.0 {
        round2(numerator / denominator * 100.0)
    } else {
        0.0
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

/// Empty (or NaN) cells are `None`; anything else must be a number.
fn parse_number(
    file: &str,
    line: usize,
    column: &str,
    record: &serde_json::Value,
) -> NormalizeResult<Option<f64>> {
    let raw = field(record, column).unwrap_or("");
    if raw.is_empty() {
        return Ok(None);
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_nan() => Ok(None),
        Ok(v) => Ok(Some(v)),
        Err(_) => Err(NormalizeError::InvalidNumber {
            file: file.to_string(),
            line,
            column: column.to_string(),
            value: raw.to_string(),
        }),
    }
}

fn require_columns(file: &str, table: &ParseResult, columns: &[&str]) -> NormalizeResult<()> {
    match columns.iter().find(|c| !table.has_column(c)) {
        Some(missing) => Err(NormalizeError::MissingColumn {
            file: file.to_string(),
            column: missing.to_string(),
        }),
        None => Ok(()),
    }
}

fn note_ignored_columns(file: &str, table: &ParseResult, extraneous: &[&str]) {
    let present: Vec<&str> = extraneous
        .iter()
        .copied()
        .filter(|c| table.has_column(c))
        .collect();
    if !present.is_empty() {
        log_info_indent(format!("{}: ignoring {}", file, present.join(", ")), 2);
    }
}

fn sample(samples: &mut Vec<String>, raw: &str) {
    if samples.len() < MONTH_SAMPLE_SIZE {
        samples.push(format!("'{}'", raw));
    }
}

fn warn_bad_months(file: &str, samples: &[String], count: usize) {
    if count > 0 {
        log_warning_indent(
            format!(
                "{}: {} row(s) dropped, Month is not Mon-YY (e.g. {})",
                file,
                count,
                samples.join(", ")
            ),
            2,
        );
    }
}

fn report(cleaned: &CleanedTable) {
    let stats = &cleaned.stats;
    if stats.closed_practice_rows > 0 {
        log_info_indent(
            format!(
                "{}: {} closed/dispensing practice row(s) excluded",
                cleaned.source, stats.closed_practice_rows
            ),
            2,
        );
    }
    if stats.blank_organisation_rows > 0 {
        log_warning_indent(
            format!(
                "{}: {} row(s) dropped, no organisation",
                cleaned.source, stats.blank_organisation_rows
            ),
            2,
        );
    }
    log_success_indent(
        format!(
            "{} → '{}': {} row(s) from {} input row(s)",
            cleaned.source,
            cleaned.label,
            cleaned.rows.len(),
            stats.input_rows
        ),
        1,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_str;

    const REGION: &str = "North East and North Cumbria";

    fn local(csv: &str) -> CleanedTable {
        let table = parse_str(csv, ',').unwrap();
        clean_local("local.csv", &table, &"Screening (%)".into(), REGION).unwrap()
    }

    fn national(csv: &str) -> CleanedTable {
        let table = parse_str(csv, ',').unwrap();
        clean_national("national.csv", &table, &"Screening (%)".into()).unwrap()
    }

    fn value_of(table: &CleanedTable, org: &str, month: &str) -> Option<f64> {
        let month = ReportingMonth::parse(month).unwrap();
        table
            .rows
            .iter()
            .find(|r| r.organisation == org && r.month == month)
            .and_then(|r| r.value)
    }

    #[test]
    fn test_percentage() {
        assert_eq!(percentage(50.0, 100.0), 50.0);
        assert_eq!(percentage(1.0, 3.0), 33.33);
        assert_eq!(percentage(2.0, 3.0), 66.67);
        assert_eq!(percentage(5.0, 0.0), 0.0);
        assert_eq!(percentage(0.0, 0.0), 0.0);
    }

    #[test]
    fn test_local_single_org_with_rollup() {
        let cleaned = local(
            "Commissioner / Provider,Month,Numerator,Denominator\n\
             ORG A,Jan-24,50,100\n\
             ORG A,Feb-24,60,120\n",
        );

        assert_eq!(cleaned.rows.len(), 4);
        assert_eq!(value_of(&cleaned, "ORG A", "Jan-24"), Some(50.0));
        assert_eq!(value_of(&cleaned, "ORG A", "Feb-24"), Some(50.0));
        assert_eq!(value_of(&cleaned, REGION, "Jan-24"), Some(50.0));
        assert_eq!(value_of(&cleaned, REGION, "Feb-24"), Some(50.0));
    }

    #[test]
    fn test_local_sums_practices_per_org() {
        let cleaned = local(
            "Commissioner / Provider,Practice plus Code,Month,Numerator,Denominator\n\
             ORG A,P1 (A81001),Jan-24,30,50\n\
             ORG A,P2 (A81002),Jan-24,20,50\n\
             ORG B,P3 (A81003),Jan-24,10,40\n",
        );

        assert_eq!(value_of(&cleaned, "ORG A", "Jan-24"), Some(50.0));
        assert_eq!(value_of(&cleaned, "ORG B", "Jan-24"), Some(25.0));
        // rollup: 60 / 140
        assert_eq!(value_of(&cleaned, REGION, "Jan-24"), Some(42.86));
        let keys: Vec<RowKey> = cleaned.rows.iter().map(CleanedRow::key).collect();
        let mut unique = keys.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(keys.len(), unique.len());
    }

    #[test]
    fn test_local_excludes_closed_and_dispensing_practices() {
        let cleaned = local(
            "Commissioner / Provider,Practice plus Code,Month,Numerator,Denominator\n\
             ORG A,OPEN SURGERY (A81001),Jan-24,10,10\n\
             ORG A,CLOSED SURGERY (C81002),Jan-24,90,90\n\
             ORG A,DISPENSING ( D 1),Jan-24,90,90\n\
             ORG A,( C9) OLD SITE,Jan-24,90,90\n\
             ORG A,,Jan-24,0,10\n\
             ORG A,lowercase (c1),Jan-24,0,0\n",
        );

        assert_eq!(cleaned.stats.closed_practice_rows, 3);
        // kept: 10/10 + 0/10 + 0/0
        assert_eq!(value_of(&cleaned, "ORG A", "Jan-24"), Some(50.0));
    }

    #[test]
    fn test_local_without_practice_column_keeps_everything() {
        let cleaned = local(
            "Commissioner / Provider,Month,Numerator,Denominator,Age Band,Value\n\
             ORG A,Jan-24,1,4,65+,99\n\
             ORG A,Jan-24,1,4,75+,99\n",
        );
        assert_eq!(cleaned.stats.dropped(), 0);
        assert_eq!(value_of(&cleaned, "ORG A", "Jan-24"), Some(25.0));
    }

    #[test]
    fn test_local_zero_denominator() {
        let cleaned = local(
            "Commissioner / Provider,Month,Numerator,Denominator\n\
             ORG A,Jan-24,0,0\n",
        );
        assert_eq!(value_of(&cleaned, "ORG A", "Jan-24"), Some(0.0));
        assert_eq!(value_of(&cleaned, REGION, "Jan-24"), Some(0.0));
    }

    #[test]
    fn test_local_rollup_sums_all_orgs_per_month() {
        let cleaned = local(
            "Commissioner / Provider,Month,Numerator,Denominator\n\
             ORG A,Jan-24,1,3\n\
             ORG B,Jan-24,1,0\n\
             ORG C,Feb-24,7,7\n",
        );
        // Jan: 2 / 3
        assert_eq!(value_of(&cleaned, REGION, "Jan-24"), Some(66.67));
        assert_eq!(value_of(&cleaned, REGION, "Feb-24"), Some(100.0));
        assert_eq!(value_of(&cleaned, "ORG B", "Jan-24"), Some(0.0));
    }

    #[test]
    fn test_local_canonicalizes_before_grouping() {
        let cleaned = local(
            "Commissioner / Provider,Month,Numerator,Denominator\n\
             NHS NORTH EAST AND NORTH CUMBRIA ICB - 84H,Jan-24,1,2\n\
             Durham,Jan-24,1,2\n",
        );
        assert_eq!(value_of(&cleaned, "Durham", "Jan-24"), Some(50.0));
        assert_eq!(cleaned.rows.len(), 2);
    }

    #[test]
    fn test_local_region_named_source_row_not_duplicated() {
        let cleaned = local(
            "Commissioner / Provider,Month,Numerator,Denominator\n\
             North East and North Cumbria,Jan-24,1,4\n\
             ORG A,Jan-24,3,4\n\
             ORG A,Feb-24,1,2\n",
        );

        let jan = ReportingMonth::parse("Jan-24").unwrap();
        let region_rows = cleaned
            .rows
            .iter()
            .filter(|r| r.organisation == REGION && r.month == jan)
            .count();
        assert_eq!(region_rows, 1);
        // the source row wins over the 4 / 8 rollup
        assert_eq!(value_of(&cleaned, REGION, "Jan-24"), Some(25.0));
        assert_eq!(value_of(&cleaned, REGION, "Feb-24"), Some(50.0));
        assert_eq!(cleaned.rows.len(), 4);
    }

    #[test]
    fn test_local_bad_months_dropped_and_counted() {
        let cleaned = local(
            "Commissioner / Provider,Month,Numerator,Denominator\n\
             ORG A,Jan-24,1,2\n\
             ORG A,2024-02,1,2\n\
             ORG A,,1,2\n",
        );
        assert_eq!(cleaned.stats.unparsed_month_rows, 2);
        assert_eq!(cleaned.rows.len(), 2);
    }

    #[test]
    fn test_local_empty_numbers_count_as_zero() {
        let cleaned = local(
            "Commissioner / Provider,Month,Numerator,Denominator\n\
             ORG A,Jan-24,,4\n\
             ORG A,Jan-24,1,\n",
        );
        assert_eq!(value_of(&cleaned, "ORG A", "Jan-24"), Some(25.0));
    }

    #[test]
    fn test_local_invalid_number() {
        let table = parse_str(
            "Commissioner / Provider,Month,Numerator,Denominator\nORG A,Jan-24,lots,4\n",
            ',',
        )
        .unwrap();
        let err = clean_local("local.csv", &table, &"M".into(), REGION).unwrap_err();
        match err {
            NormalizeError::InvalidNumber { line, column, value, .. } => {
                assert_eq!(line, 2);
                assert_eq!(column, "Numerator");
                assert_eq!(value, "lots");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_local_missing_column() {
        let table = parse_str("Commissioner / Provider,Month,Numerator\nORG A,Jan-24,1\n", ',').unwrap();
        let err = clean_local("local.csv", &table, &"M".into(), REGION).unwrap_err();
        assert_eq!(
            err.to_string(),
            "File 'local.csv' is missing the expected column 'Denominator'"
        );
    }

    #[test]
    fn test_national_renames_and_keeps_rows() {
        let cleaned = national(
            "Country,Month,Value,Comparator Description\n\
             ENGLAND,Jan-24,42.5,National\n\
             ENGLAND,Feb-24,,National\n",
        );

        assert_eq!(cleaned.rows.len(), 2);
        assert_eq!(value_of(&cleaned, "England", "Jan-24"), Some(42.5));
        assert_eq!(value_of(&cleaned, "England", "Feb-24"), None);
    }

    #[test]
    fn test_national_does_not_aggregate() {
        let cleaned = national(
            "Country,Month,Value\n\
             ENGLAND,Jan-24,40\n\
             ENGLAND,Jan-24,50\n\
             WALES,Jan-24,30\n\
             ENGLAND,Month?,1\n",
        );
        assert_eq!(cleaned.stats.input_rows, 4);
        assert_eq!(cleaned.rows.len(), 3);
        assert_eq!(cleaned.stats.unparsed_month_rows, 1);
        assert_eq!(cleaned.rows[0].value, Some(40.0));
        assert_eq!(cleaned.rows[1].value, Some(50.0));
        assert_eq!(cleaned.rows[2].organisation, "WALES");
    }

    #[test]
    fn test_national_missing_column() {
        let table = parse_str("Country,Month\nENGLAND,Jan-24\n", ',').unwrap();
        let err = clean_national("national.csv", &table, &"M".into()).unwrap_err();
        assert!(matches!(err, NormalizeError::MissingColumn { ref column, .. } if column == "Value"));
    }
}
