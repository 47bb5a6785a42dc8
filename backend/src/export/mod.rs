//! Workbook export.
//!
//! Each [`PivotSheet`] becomes one worksheet:
//!
//! ```text
//! Month  │ Durham │ England │ North East and North Cumbria │ ...
//! Jan-24 │ 48.1   │ 42.5    │ 47.3                         │
//! Feb-24 │ 49.0   │         │ 47.9                         │
//! ```
//!
//! Sheet names are the metric labels. Labels up to 31 characters are used
//! verbatim; longer ones are cut to 31, and a cut name that clashes with an
//! existing one gets a ` (n)` suffix.

use rust_xlsxwriter::{ColNum, Format, RowNum, Workbook};

use crate::api::logs::log_warning_indent;
use crate::config::SHEET_NAME_MAX_CHARS;
use crate::error::{ExportError, ExportResult};
use crate::models::{MetricLabel, PivotSheet};

const INVALID_SHEET_CHARS: &[char] = &['[', ']', ':', '*', '?', '/', '\\'];

const MONTH_COLUMN_WIDTH: f64 = 10.0;
const VALUE_COLUMN_WIDTH: f64 = 14.0;

/// Worksheet name for every label, in order, unique ignoring case.
pub fn sheet_names(labels: &[MetricLabel]) -> Vec<String> {
    let mut names: Vec<Option<String>> = vec![None; labels.len()];
    let mut taken: Vec<String> = Vec::with_capacity(labels.len());

    // Labels that already fit are placed first so nothing can displace them.
    for (i, label) in labels.iter().enumerate() {
        let candidate = sanitize(label.as_str(), i);
        if candidate.chars().count() <= SHEET_NAME_MAX_CHARS && !is_taken(&taken, &candidate) {
            taken.push(candidate.to_lowercase());
            names[i] = Some(candidate);
        }
    }

    for (i, label) in labels.iter().enumerate() {
        if names[i].is_some() {
            continue;
        }
        let base = sanitize(label.as_str(), i);
        let mut candidate = truncate(&base, SHEET_NAME_MAX_CHARS);
        let mut n = 2;
        while is_taken(&taken, &candidate) {
            let suffix = format!(" ({})", n);
            let stem = truncate(&base, SHEET_NAME_MAX_CHARS - suffix.chars().count());
            candidate = format!("{}{}", stem.trim_end(), suffix);
            n += 1;
        }
        taken.push(candidate.to_lowercase());
        names[i] = Some(candidate);
    }

    labels
        .iter()
        .zip(names)
        .map(|(label, name)| {
            let name = name.unwrap_or_default();
            if !label.fits_sheet_name() || name != label.as_str() {
                log_warning_indent(format!("Sheet for '{}' named '{}'", label, name), 2);
            }
            name
        })
        .collect()
}

fn sanitize(label: &str, index: usize) -> String {
    let cleaned: String = label
        .chars()
        .map(|c| if INVALID_SHEET_CHARS.contains(&c) { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim_matches('\'').to_string();
    if cleaned.trim().is_empty() {
        format!("Sheet{}", index + 1)
    } else {
        cleaned
    }
}

/// First `max_chars` characters. A cut that leaves a trailing `'` drops it,
/// since a sheet name may not end with one.
fn truncate(name: &str, max_chars: usize) -> String {
    let cut: String = name.chars().take(max_chars).collect();
    cut.trim_end_matches('\'').to_string()
}

fn is_taken(taken: &[String], candidate: &str) -> bool {
    let lower = candidate.to_lowercase();
    taken.iter().any(|t| *t == lower)
}

/// Serialize all sheets into one xlsx workbook held in memory.
pub fn write_workbook(sheets: &[PivotSheet]) -> ExportResult<Vec<u8>> {
    let labels: Vec<MetricLabel> = sheets.iter().map(|s| s.metric.clone()).collect();
    write_workbook_named(sheets, &sheet_names(&labels))
}

/// Like [`write_workbook`], with worksheet names already chosen by [`sheet_names`].
pub fn write_workbook_named(sheets: &[PivotSheet], names: &[String]) -> ExportResult<Vec<u8>> {
    if sheets.is_empty() {
        return Err(ExportError::NoSheets);
    }

    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();

    for (sheet, name) in sheets.iter().zip(names) {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(name)?;

        worksheet.write_string_with_format(0, 0, "Month", &header)?;
        for (c, org) in sheet.organisations.iter().enumerate() {
            worksheet.write_string_with_format(0, (c + 1) as ColNum, org, &header)?;
        }

        for (r, month) in sheet.months.iter().enumerate() {
            let row = (r + 1) as RowNum;
            worksheet.write_string(row, 0, month.to_string())?;
            for (c, value) in sheet.cells[r].iter().enumerate() {
                if let Some(v) = value {
                    worksheet.write_number(row, (c + 1) as ColNum, *v)?;
                }
            }
        }

        worksheet.set_column_width(0, MONTH_COLUMN_WIDTH)?;
        for c in 0..sheet.organisations.len() {
            worksheet.set_column_width((c + 1) as ColNum, VALUE_COLUMN_WIDTH)?;
        }
        worksheet.set_freeze_panes(1, 1)?;
    }

    Ok(workbook.save_to_buffer()?)
}

/// Read a generated workbook back as `(sheet name, rows)` pairs.
#[cfg(test)]
pub(crate) fn read_back(bytes: &[u8]) -> Vec<(String, Vec<Vec<calamine::Data>>)> {
    use calamine::{Reader, Xlsx};
    use std::io::Cursor;

    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes.to_vec())).expect("open xlsx");
    let names = workbook.sheet_names();
    names
        .into_iter()
        .map(|name| {
            let range = workbook.worksheet_range(&name).expect("sheet range");
            let rows = range.rows().map(|r| r.to_vec()).collect();
            (name, rows)
        })
        .collect()
}
