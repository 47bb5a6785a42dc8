//! High-level pipeline API: uploads in, workbook bytes out.
//!
//! ```text
//! MetricFile[] → load → clean → combine → pivot → xlsx
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use epact_compiler::{compile, CompileOptions, MetricFile, SourceKind};
//!
//! let files = vec![MetricFile::new(
//!     "local.csv",
//!     SourceKind::Local,
//!     "Screening (%)".into(),
//!     std::fs::read("local.csv")?,
//! )];
//! let result = compile(files, &CompileOptions::default())?;
//! std::fs::write(&result.file_name, &result.workbook)?;
//! ```
//!
//! Every stage either succeeds or aborts the run; there is no partial output.

use serde::Serialize;
use std::path::{Path, PathBuf};

use super::merge::combine;
use super::normalize::clean;
use super::pivot::pivot_all;
use crate::api::logs::{log_info, log_success, log_warning};
use crate::config::{DEFAULT_REGION_NAME, OUTPUT_FILE_NAME};
use crate::error::{PipelineError, PipelineResult};
use crate::export::{sheet_names, write_workbook_named};
use crate::loader::{load, pair_labels, Upload};
use crate::models::{CleanedTable, MetricFile, MetricLabel, PivotSheet, SourceKind};

/// Options for a compilation run
#[derive(Debug, Clone, PartialEq)]
pub struct CompileOptions {
    /// Organisation name used for the synthesized regional rollup rows.
    pub region_name: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            region_name: DEFAULT_REGION_NAME.to_string(),
        }
    }
}

/// Summary of one output sheet
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetSummary {
    /// Worksheet name as written
    pub name: String,
    pub metric: MetricLabel,
    pub months: usize,
    pub organisations: usize,
}

/// Result of a complete run
#[derive(Debug, Clone)]
pub struct CompileResult {
    /// The xlsx workbook
    pub workbook: Vec<u8>,
    /// Suggested download name
    pub file_name: String,
    /// The sheets, as pivoted
    pub sheets: Vec<PivotSheet>,
    /// Worksheet names, aligned with `sheets`
    pub sheet_names: Vec<String>,
    /// Rows dropped or otherwise worth telling the user about
    pub warnings: Vec<String>,
}

impl CompileResult {
    pub fn summaries(&self) -> Vec<SheetSummary> {
        self.sheets
            .iter()
            .zip(&self.sheet_names)
            .map(|(sheet, name)| SheetSummary {
                name: name.clone(),
                metric: sheet.metric.clone(),
                months: sheet.months.len(),
                organisations: sheet.organisations.len(),
            })
            .collect()
    }
}

/// One entry of a JSON manifest: `{ "path": ..., "kind": ..., "label": ... }`.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ManifestEntry {
    pub path: PathBuf,
    pub kind: SourceKind,
    pub label: MetricLabel,
}

/// Run the whole pipeline over already-labelled files.
pub fn compile(files: Vec<MetricFile>, options: &CompileOptions) -> PipelineResult<CompileResult> {
    if files.is_empty() {
        log_warning("No valid datasets were uploaded yet");
        return Err(PipelineError::NoData);
    }

    log_info(format!("📖 Loading {} file(s)...", files.len()));
    let loaded = load(files)?;

    log_info("🧹 Cleaning...");
    let cleaned = loaded
        .iter()
        .map(|table| clean(table, &options.region_name))
        .collect::<Result<Vec<CleanedTable>, _>>()?;
    let warnings = collect_warnings(&cleaned);

    log_info("🔗 Merging metrics...");
    let combined = combine(&cleaned)?;
    log_success(format!(
        "{} metric(s) over {} organisation-month row(s)",
        combined.metrics.len(),
        combined.len()
    ));

    log_info("📊 Pivoting...");
    let sheets = pivot_all(&combined);
    for sheet in &sheets {
        if sheet.months.is_empty() {
            log_warning(format!("'{}' has no values; its sheet will only hold a header", sheet.metric));
        }
    }

    log_info("💾 Writing workbook...");
    let labels: Vec<MetricLabel> = sheets.iter().map(|s| s.metric.clone()).collect();
    let names = sheet_names(&labels);
    let workbook = write_workbook_named(&sheets, &names)?;
    log_success(format!("✅ {} sheet(s), {} bytes", sheets.len(), workbook.len()));

    Ok(CompileResult {
        workbook,
        file_name: OUTPUT_FILE_NAME.to_string(),
        sheets,
        sheet_names: names,
        warnings,
    })
}

/// Pair labels with uploads for both kinds, then compile.
///
/// Label counts are checked for both kinds before anything is parsed.
pub fn compile_uploads(
    local: (Vec<Upload>, Vec<MetricLabel>),
    national: (Vec<Upload>, Vec<MetricLabel>),
    options: &CompileOptions,
) -> PipelineResult<CompileResult> {
    let mut files = pair_labels(SourceKind::Local, local.0, local.1).map_err(warn_mismatch)?;
    files.extend(pair_labels(SourceKind::National, national.0, national.1).map_err(warn_mismatch)?);
    compile(files, options)
}

/// Read a manifest file and compile the files it lists. Relative paths are
/// resolved against the manifest's directory.
pub fn compile_manifest(manifest: &Path, options: &CompileOptions) -> PipelineResult<CompileResult> {
    let files = read_manifest(manifest)?;
    compile(files, options)
}

/// Load the files named in a manifest, local entries first then national,
/// each kind in listed order.
pub fn read_manifest(manifest: &Path) -> PipelineResult<Vec<MetricFile>> {
    let content = std::fs::read_to_string(manifest)?;
    let entries: Vec<ManifestEntry> = serde_json::from_str(&content)?;
    let base = manifest.parent().unwrap_or_else(|| Path::new("."));

    let mut files = Vec::with_capacity(entries.len());
    for kind in [SourceKind::Local, SourceKind::National] {
        for entry in entries.iter().filter(|e| e.kind == kind) {
            let path = if entry.path.is_absolute() {
                entry.path.clone()
            } else {
                base.join(&entry.path)
            };
            let upload = Upload::from_path(&path)?;
            files.push(MetricFile::new(upload.name, kind, entry.label.clone(), upload.bytes));
        }
    }
    Ok(files)
}

fn warn_mismatch(err: PipelineError) -> PipelineError {
    log_warning(format!("{} - nothing was processed", err));
    err
}

fn collect_warnings(cleaned: &[CleanedTable]) -> Vec<String> {
    let mut warnings = Vec::new();
    for table in cleaned {
        let stats = &table.stats;
        if stats.unparsed_month_rows > 0 {
            warnings.push(format!(
                "{}: {} row(s) dropped because Month was not Mon-YY",
                table.source, stats.unparsed_month_rows
            ));
        }
        if stats.blank_organisation_rows > 0 {
            warnings.push(format!(
                "{}: {} row(s) dropped because the organisation was blank",
                table.source, stats.blank_organisation_rows
            ));
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::read_back;
    use crate::models::ReportingMonth;
    use calamine::Data;

    const LOCAL_CSV: &str = "Commissioner / Provider,Month,Numerator,Denominator\n\
                             ORG A,Jan-24,50,100\n\
                             ORG A,Feb-24,60,120\n";
    const NATIONAL_CSV: &str = "Country,Month,Value\nENGLAND,Jan-24,42.5\n";

    fn month(s: &str) -> ReportingMonth {
        ReportingMonth::parse(s).unwrap()
    }

    fn local(label: &str, csv: &str) -> MetricFile {
        MetricFile::new("local.csv", SourceKind::Local, label.into(), csv)
    }

    fn national(label: &str, csv: &str) -> MetricFile {
        MetricFile::new("national.csv", SourceKind::National, label.into(), csv)
    }

    fn s(v: &str) -> Data {
        Data::String(v.to_string())
    }

    #[test]
    fn test_default_options() {
        assert_eq!(CompileOptions::default().region_name, "North East and North Cumbria");
    }

    #[test]
    fn test_local_only_end_to_end() {
        let result = compile(vec![local("Screening (%)", LOCAL_CSV)], &CompileOptions::default()).unwrap();

        assert_eq!(result.file_name, "overprescribing_charts.xlsx");
        assert_eq!(result.sheet_names, vec!["Screening (%)"]);

        let sheets = read_back(&result.workbook);
        let (name, rows) = &sheets[0];
        assert_eq!(name, "Screening (%)");
        assert_eq!(rows[0], vec![s("Month"), s("North East and North Cumbria"), s("ORG A")]);
        assert_eq!(rows[1], vec![s("Jan-24"), Data::Float(50.0), Data::Float(50.0)]);
        assert_eq!(rows[2], vec![s("Feb-24"), Data::Float(50.0), Data::Float(50.0)]);
    }

    #[test]
    fn test_local_and_national_share_a_sheet() {
        let result = compile(
            vec![local("Screening (%)", LOCAL_CSV), national("Screening (%)", NATIONAL_CSV)],
            &CompileOptions::default(),
        )
        .unwrap();

        assert_eq!(result.sheets.len(), 1);
        let sheet = &result.sheets[0];
        assert_eq!(sheet.organisations, vec!["England", "North East and North Cumbria", "ORG A"]);
        assert_eq!(sheet.cell(month("Jan-24"), "England"), Some(42.5));
        assert_eq!(sheet.cell(month("Feb-24"), "England"), None);

        let sheets = read_back(&result.workbook);
        let rows = &sheets[0].1;
        assert_eq!(rows[1], vec![s("Jan-24"), Data::Float(42.5), Data::Float(50.0), Data::Float(50.0)]);
        assert_eq!(rows[2], vec![s("Feb-24"), Data::Empty, Data::Float(50.0), Data::Float(50.0)]);
    }

    #[test]
    fn test_distinct_labels_make_distinct_sheets() {
        let result = compile(
            vec![local("Screening (%)", LOCAL_CSV), national("Other (%)", NATIONAL_CSV)],
            &CompileOptions::default(),
        )
        .unwrap();

        assert_eq!(result.sheet_names, vec!["Screening (%)", "Other (%)"]);
        // the national-only sheet carries only England
        assert_eq!(result.sheets[1].organisations, vec!["England"]);
        assert_eq!(result.sheets[1].months, vec![month("Jan-24")]);
        let summaries = result.summaries();
        assert_eq!(summaries[0].organisations, 2);
        assert_eq!(summaries[1].months, 1);
    }

    #[test]
    fn test_custom_region_name() {
        let options = CompileOptions {
            region_name: "Test ICB".to_string(),
        };
        let result = compile(vec![local("M", LOCAL_CSV)], &options).unwrap();
        assert_eq!(result.sheets[0].organisations, vec!["ORG A", "Test ICB"]);
    }

    #[test]
    fn test_no_files_is_an_error() {
        assert!(matches!(compile(vec![], &CompileOptions::default()), Err(PipelineError::NoData)));
        let err = compile_uploads((vec![], vec![]), (vec![], vec![]), &CompileOptions::default())
            .unwrap_err();
        assert!(matches!(err, PipelineError::NoData));
    }

    #[test]
    fn test_label_mismatch_stops_before_parsing() {
        // the national file is not even valid CSV; the mismatch must win
        let err = compile_uploads(
            (vec![Upload::new("local.csv", LOCAL_CSV)], vec![]),
            (vec![Upload::new("national.csv", "")], vec!["M".into()]),
            &CompileOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::LabelCountMismatch { kind: SourceKind::Local, files: 1, labels: 0 }
        ));
    }

    #[test]
    fn test_missing_column_aborts() {
        let err = compile(
            vec![local("M", LOCAL_CSV), national("M", "Country,Month\nENGLAND,Jan-24\n")],
            &CompileOptions::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("national.csv"));
        assert!(err.to_string().contains("Value"));
    }

    #[test]
    fn test_dropped_months_become_warnings() {
        let csv = "Country,Month,Value\nENGLAND,Jan-24,1\nENGLAND,January,2\n";
        let result = compile(vec![national("M", csv)], &CompileOptions::default()).unwrap();
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("1 row(s)"));
    }

    #[test]
    fn test_compile_manifest() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("local.csv"), LOCAL_CSV).unwrap();
        std::fs::write(dir.path().join("national.csv"), NATIONAL_CSV).unwrap();
        let manifest = dir.path().join("manifest.json");
        std::fs::write(
            &manifest,
            r#"[
                {"path": "national.csv", "kind": "national", "label": "Screening (%)"},
                {"path": "local.csv", "kind": "local", "label": "Screening (%)"}
            ]"#,
        )
        .unwrap();

        let files = read_manifest(&manifest).unwrap();
        assert_eq!(files[0].kind, SourceKind::Local);
        assert_eq!(files[1].kind, SourceKind::National);

        let result = compile_manifest(&manifest, &CompileOptions::default()).unwrap();
        assert_eq!(result.sheets[0].cell(month("Jan-24"), "England"), Some(42.5));
    }

    #[test]
    fn test_bad_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("manifest.json");
        std::fs::write(&manifest, r#"[{"path": "x.csv", "kind": "regional", "label": "M"}]"#).unwrap();
        assert!(matches!(read_manifest(&manifest), Err(PipelineError::Manifest(_))));
    }
}
