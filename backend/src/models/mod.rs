//! Domain models for the compilation pipeline.
//!
//! - [`SourceKind`] - Local (commissioner-level) or national extract
//! - [`MetricLabel`] - User-chosen metric name, also the output sheet name
//! - [`MetricFile`] - One uploaded file paired with its kind and label
//! - [`ReportingMonth`] - A `Mon-YY` reporting period
//! - [`CleanedTable`] - Normalized `(organisation, month, value)` rows
//! - [`CombinedTable`] - All metrics joined on `(organisation, month)`
//! - [`PivotSheet`] - Months × organisations grid for one metric

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::config::SHEET_NAME_MAX_CHARS;

// =============================================================================
// Source Kind
// =============================================================================

/// Which dashboard extract a file came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Commissioner / practice level rows with numerator and denominator.
    Local,
    /// One pre-computed value per country and month.
    National,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Local => f.write_str("local"),
            SourceKind::National => f.write_str("national"),
        }
    }
}

// =============================================================================
// Metric Label
// =============================================================================

/// Name of one percentage metric.
///
/// Files sharing a label are merged into the same output sheet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricLabel(String);

impl MetricLabel {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// Label given to the `index`-th (0-based) file of a kind when the user
    /// leaves the default in place.
    pub fn default_for(index: usize) -> Self {
        Self(format!("Metric {} (%)", index + 1))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn fits_sheet_name(&self) -> bool {
        self.0.chars().count() <= SHEET_NAME_MAX_CHARS
    }
}

impl fmt::Display for MetricLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MetricLabel {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// =============================================================================
// Uploaded File
// =============================================================================

/// One uploaded extract with everything needed to process it.
#[derive(Debug, Clone)]
pub struct MetricFile {
    /// File name as uploaded (used in messages only).
    pub name: String,
    pub kind: SourceKind,
    pub label: MetricLabel,
    /// Raw CSV bytes.
    pub bytes: Vec<u8>,
}

impl MetricFile {
    pub fn new(
        name: impl Into<String>,
        kind: SourceKind,
        label: MetricLabel,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            label,
            bytes: bytes.into(),
        }
    }
}

// =============================================================================
// Reporting Month
// =============================================================================

/// First two-digit year read as 19xx.
const YEAR_PIVOT: i32 = 69;

/// Reporting period, stored as the first day of the month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReportingMonth(NaiveDate);

impl ReportingMonth {
    /// Build from a calendar year and month (1-12).
    pub fn from_ym(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(Self)
    }

    /// Parse `Mon-YY` (e.g. `Jan-24`). Anything else yields `None`.
    ///
    /// Two-digit years 00-68 are 20xx, 69-99 are 19xx.
    pub fn parse(raw: &str) -> Option<Self> {
        let (mon, yy) = raw.trim().split_once('-')?;
        if mon.len() != 3
            || !mon.chars().all(|c| c.is_ascii_alphabetic())
            || yy.len() != 2
            || !yy.chars().all(|c| c.is_ascii_digit())
        {
            return None;
        }
        let yy: i32 = yy.parse().ok()?;
        let year = if yy < YEAR_PIVOT { 2000 + yy } else { 1900 + yy };

        NaiveDate::parse_from_str(&format!("01-{}-{}", mon, year), "%d-%b-%Y")
            .ok()
            .map(Self)
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }
}

impl fmt::Display for ReportingMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%b-%y"))
    }
}

impl FromStr for ReportingMonth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("'{}' is not a Mon-YY month", s))
    }
}

impl Serialize for ReportingMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// =============================================================================
// Cleaned Table
// =============================================================================

/// Join key shared by every table after cleaning.
///
/// Field order gives the output ordering: month first, then organisation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RowKey {
    pub month: ReportingMonth,
    pub organisation: String,
}

impl RowKey {
    pub fn new(organisation: impl Into<String>, month: ReportingMonth) -> Self {
        Self {
            month,
            organisation: organisation.into(),
        }
    }
}

/// One normalized observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanedRow {
    pub organisation: String,
    pub month: ReportingMonth,
    /// `None` when the source cell was empty.
    pub value: Option<f64>,
}

impl CleanedRow {
    pub fn key(&self) -> RowKey {
        RowKey::new(self.organisation.clone(), self.month)
    }
}

/// Rows removed while cleaning one file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleanStats {
    pub input_rows: usize,
    pub closed_practice_rows: usize,
    pub unparsed_month_rows: usize,
    pub blank_organisation_rows: usize,
}

impl CleanStats {
    pub fn dropped(&self) -> usize {
        self.closed_practice_rows + self.unparsed_month_rows + self.blank_organisation_rows
    }
}

/// Normalized rows of one file for one metric label.
#[derive(Debug, Clone, Serialize)]
pub struct CleanedTable {
    pub source: String,
    pub kind: SourceKind,
    pub label: MetricLabel,
    pub rows: Vec<CleanedRow>,
    pub stats: CleanStats,
}

// =============================================================================
// Combined Table
// =============================================================================

/// Wide table: one row per `(organisation, month)`, one column per metric.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CombinedTable {
    /// Metric columns in encounter order.
    pub metrics: Vec<MetricLabel>,
    /// Values per key, aligned with `metrics`. Iterates in `(month, organisation)` order.
    pub rows: BTreeMap<RowKey, Vec<Option<f64>>>,
}

impl CombinedTable {
    pub fn value(&self, key: &RowKey, metric: &MetricLabel) -> Option<f64> {
        let idx = self.metrics.iter().position(|m| m == metric)?;
        self.rows.get(key).and_then(|values| values[idx])
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// =============================================================================
// Pivot Sheet
// =============================================================================

/// One metric reshaped to months (rows) × organisations (columns).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotSheet {
    pub metric: MetricLabel,
    pub months: Vec<ReportingMonth>,
    pub organisations: Vec<String>,
    /// `cells[month_idx][organisation_idx]`
    pub cells: Vec<Vec<Option<f64>>>,
}

impl PivotSheet {
    pub fn cell(&self, month: ReportingMonth, organisation: &str) -> Option<f64> {
        let r = self.months.iter().position(|m| *m == month)?;
        let c = self.organisations.iter().position(|o| o == organisation)?;
        self.cells[r][c]
    }

    /// Non-empty cells as `(organisation, month, value)`.
    pub fn triples(&self) -> Vec<(String, ReportingMonth, f64)> {
        let mut out = Vec::new();
        for (r, month) in self.months.iter().enumerate() {
            for (c, org) in self.organisations.iter().enumerate() {
                if let Some(v) = self.cells[r][c] {
                    out.push((org.clone(), *month, v));
                }
            }
        }
        out
    }

    /// Header row as written to the worksheet.
    pub fn header(&self) -> Vec<&str> {
        std::iter::once("Month")
            .chain(self.organisations.iter().map(String::as_str))
            .collect()
    }
}
