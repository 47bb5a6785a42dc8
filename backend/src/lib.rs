//! # ePACT2 compiler - overprescribing dashboard charts
//!
//! Turns monthly ePACT2 CSV exports (local practice-level numerators and
//! denominators, national percentages) into one xlsx workbook with a
//! months × organisations sheet per metric.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌───────────┐   ┌─────────┐   ┌─────────┐   ┌──────────┐
//! │ CSV files│──▶│  Loader  │──▶│ Normalize │──▶│  Merge  │──▶│  Pivot  │──▶│  Export  │
//! │ + labels │   │(auto-enc)│   │(local/nat)│   │(by label)│  │(per tab)│   │  (xlsx)  │
//! └──────────┘   └──────────┘   └───────────┘   └─────────┘   └─────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use epact_compiler::{compile, CompileOptions, MetricFile, SourceKind};
//!
//! let bytes = std::fs::read("antibiotics_local.csv")?;
//! let file = MetricFile::new("antibiotics_local.csv", SourceKind::Local, "Antibiotics (%)".into(), bytes);
//! let result = compile(vec![file], &CompileOptions::default())?;
//! std::fs::write(&result.file_name, &result.workbook)?;
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`config`] - Column names, organisation map, runtime settings
//! - [`models`] - Domain models (MetricFile, ReportingMonth, PivotSheet)
//! - [`parser`] - CSV parsing with auto-detection
//! - [`loader`] - Label pairing and parsing of uploads
//! - [`transform`] - Normalize, merge, pivot and the pipeline
//! - [`export`] - xlsx workbook writer
//! - [`api`] - HTTP API server

// Core modules
pub mod config;
pub mod error;
pub mod models;

// Parsing
pub mod loader;
pub mod parser;

// Transformation
pub mod transform;

// Output
pub mod export;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    CsvError, ExportError, NormalizeError, PipelineError, PipelineResult, ServerError,
};

// =============================================================================
// Re-exports - Models & config
// =============================================================================

pub use config::{Settings, ORGANISATIONS, OUTPUT_FILE_NAME};
pub use models::{
    CleanedRow, CleanedTable, CombinedTable, MetricFile, MetricLabel, PivotSheet,
    ReportingMonth, RowKey, SourceKind,
};

// =============================================================================
// Re-exports - CSV Parsing
// =============================================================================

pub use parser::{
    decode_content, detect_delimiter, detect_encoding, parse_bytes_auto, parse_csv_file_auto,
    parse_str, ParseResult,
};

pub use loader::{default_labels, pair_labels, pair_labels_or_default, Upload};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use transform::pipeline::{
    compile, compile_manifest, compile_uploads, read_manifest, CompileOptions, CompileResult,
    ManifestEntry, SheetSummary,
};
pub use transform::{clean, combine, pivot_all};

pub use export::{sheet_names, write_workbook};

// =============================================================================
// Re-exports - API
// =============================================================================

pub use api::types::{error_response, PreviewResponse, PreviewSheet};

// Server
pub mod server {
    pub use crate::api::server::start_server;
}
