//! Application configuration.
//!
//! Fixed constants, the organisation display-name map, and the few runtime
//! settings that may come from the environment (or a `.env` file).

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::env;

/// File name offered for the generated workbook.
pub const OUTPUT_FILE_NAME: &str = "overprescribing_charts.xlsx";

/// MIME type of the generated workbook.
pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Longest worksheet name the xlsx format accepts.
pub const SHEET_NAME_MAX_CHARS: usize = 31;

/// Name given to the synthesized ICB rollup rows.
pub const DEFAULT_REGION_NAME: &str = "North East and North Cumbria";

/// Port used by `serve` when nothing else is configured.
pub const DEFAULT_PORT: u16 = 3000;

/// Upload cap for the HTTP surface, in megabytes.
pub const DEFAULT_MAX_UPLOAD_MB: usize = 50;

// =============================================================================
// Column names
// =============================================================================

pub const COL_ORGANISATION: &str = "Commissioner / Provider";
pub const COL_COUNTRY: &str = "Country";
pub const COL_MONTH: &str = "Month";
pub const COL_NUMERATOR: &str = "Numerator";
pub const COL_DENOMINATOR: &str = "Denominator";
pub const COL_VALUE: &str = "Value";
pub const COL_PRACTICE_CODE: &str = "Practice plus Code";

/// Columns local extracts may carry that play no part in the output.
pub const LOCAL_EXTRANEOUS_COLUMNS: &[&str] = &[
    COL_PRACTICE_CODE,
    "Comparator Description",
    "Age Band",
    COL_VALUE,
];

/// Columns national extracts may carry that play no part in the output.
pub const NATIONAL_EXTRANEOUS_COLUMNS: &[&str] = &["Comparator Description", "Age Band"];

/// Closed (`C`) or dispensing (`D`) practice marker inside a practice code.
pub const CLOSED_PRACTICE_PATTERN: &str = r"\( ?[CD] ?\d";

// =============================================================================
// Organisation display names
// =============================================================================

const ORGANISATION_NAMES: &[(&str, &str)] = &[
    ("NHS NORTH EAST AND NORTH CUMBRIA ICB - 84H", "Durham"),
    ("NHS NORTH EAST AND NORTH CUMBRIA ICB - 00P", "Sunderland"),
    ("NHS NORTH EAST AND NORTH CUMBRIA ICB - 00L", "Northumberland"),
    ("NHS NORTH EAST AND NORTH CUMBRIA ICB - 01H", "North Cumbria"),
    ("NHS NORTH EAST AND NORTH CUMBRIA ICB - 13T", "Newcastle-Gateshead"),
    ("NHS NORTH EAST AND NORTH CUMBRIA ICB - 16C", "Tees Valley"),
    ("NHS NORTH EAST AND NORTH CUMBRIA ICB - 99C", "North Tyneside"),
    ("NHS NORTH EAST AND NORTH CUMBRIA ICB - 00N", "South Tyneside"),
    ("ENGLAND", "England"),
];

/// Closed lookup from dashboard identifiers to chart legend names.
#[derive(Debug)]
pub struct OrganisationMap {
    names: HashMap<&'static str, &'static str>,
}

impl OrganisationMap {
    fn builtin() -> Self {
        Self {
            names: ORGANISATION_NAMES.iter().copied().collect(),
        }
    }

    /// Display name for `raw`, or `raw` itself when it is not mapped.
    pub fn canonicalize<'a>(&self, raw: &'a str) -> &'a str {
        match self.names.get(raw) {
            Some(name) => *name,
            None => raw,
        }
    }

    /// All entries in declaration order.
    pub fn entries(&self) -> &'static [(&'static str, &'static str)] {
        ORGANISATION_NAMES
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Process-wide, read-only organisation map.
pub static ORGANISATIONS: Lazy<OrganisationMap> = Lazy::new(OrganisationMap::builtin);

// =============================================================================
// Runtime settings
// =============================================================================

/// Settings that may be overridden through the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// `EPACT_PORT`
    pub port: u16,
    /// `EPACT_REGION_NAME`
    pub region_name: String,
    /// `EPACT_MAX_UPLOAD_MB`
    pub max_upload_mb: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            region_name: DEFAULT_REGION_NAME.to_string(),
            max_upload_mb: DEFAULT_MAX_UPLOAD_MB,
        }
    }
}

impl Settings {
    /// Load `.env` (if present) then read overrides from the environment.
    ///
    /// Unparseable numbers fall back to the defaults.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            port: lookup("EPACT_PORT")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.port),
            region_name: lookup("EPACT_REGION_NAME")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.region_name),
            max_upload_mb: lookup("EPACT_MAX_UPLOAD_MB")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.max_upload_mb),
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb * 1024 * 1024
    }
}
