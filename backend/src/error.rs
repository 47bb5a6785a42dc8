//! Error types for the compilation pipeline.
//!
//! - [`CsvError`] - CSV decoding and parsing errors
//! - [`NormalizeError`] - Per-file cleaning errors (missing columns, bad numbers)
//! - [`ExportError`] - Workbook serialization errors
//! - [`PipelineError`] - Top-level orchestration errors
//! - [`ServerError`] - HTTP surface errors
//!
//! Lower-level errors convert into [`PipelineError`] through `From`,
//! so `?` works across stage boundaries.

use thiserror::Error;

use crate::models::SourceKind;

// =============================================================================
// CSV Parsing Errors
// =============================================================================

/// Errors while decoding or parsing a CSV file.
#[derive(Debug, Error)]
pub enum CsvError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// Empty file.
    #[error("CSV file is empty")]
    EmptyFile,

    /// No headers found.
    #[error("No headers found in CSV")]
    NoHeaders,

    /// Malformed record.
    #[error("Line {line}: {message}")]
    Parse { line: u64, message: String },
}

impl From<csv::Error> for CsvError {
    fn from(err: csv::Error) -> Self {
        let line = err.position().map(|p| p.line()).unwrap_or(0);
        CsvError::Parse {
            line,
            message: err.to_string(),
        }
    }
}

// =============================================================================
// Normalization Errors
// =============================================================================

/// Errors while cleaning one uploaded file.
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// An expected column is absent from the file.
    #[error("File '{file}' is missing the expected column '{column}'")]
    MissingColumn { file: String, column: String },

    /// A numeric column holds something that is not a number.
    #[error("File '{file}', line {line}, column '{column}': '{value}' is not a number")]
    InvalidNumber {
        file: String,
        line: usize,
        column: String,
        value: String,
    },

    /// The closed-practice pattern failed to compile.
    #[error("Invalid practice code pattern: {0}")]
    Pattern(#[from] regex::Error),
}

// =============================================================================
// Export Errors
// =============================================================================

/// Errors while writing the output workbook.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The xlsx writer rejected a sheet, cell or the workbook itself.
    #[error("Workbook error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    /// Nothing to write.
    #[error("No sheets to write")]
    NoSheets,
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline errors.
///
/// This is the error returned by [`crate::transform::pipeline::compile`].
/// Every variant is terminal for the run: no workbook is produced.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Label count does not match file count for one source kind.
    #[error("{files} {kind} file(s) were uploaded but {labels} {kind} label(s) were given")]
    LabelCountMismatch {
        kind: SourceKind,
        files: usize,
        labels: usize,
    },

    /// A file could not be parsed.
    #[error("Could not read '{file}': {source}")]
    Csv {
        file: String,
        #[source]
        source: CsvError,
    },

    /// A file could not be cleaned.
    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    /// Workbook serialization failed.
    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    /// IO error (reading inputs, writing the workbook).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Manifest could not be read.
    #[error("Manifest error: {0}")]
    Manifest(#[from] serde_json::Error),

    /// No files were supplied at all.
    #[error("No valid datasets were uploaded yet")]
    NoData,
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Could not bind or serve.
    #[error("Server IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for CSV operations.
pub type CsvResult<T> = Result<T, CsvError>;

/// Result type for normalization.
pub type NormalizeResult<T> = Result<T, NormalizeError>;

/// Result type for workbook export.
pub type ExportResult<T> = Result<T, ExportError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        let err = NormalizeError::MissingColumn {
            file: "local.csv".into(),
            column: "Numerator".into(),
        };
        let pipeline_err: PipelineError = err.into();
        let msg = pipeline_err.to_string();
        assert!(msg.contains("local.csv"));
        assert!(msg.contains("Numerator"));

        let export_err: PipelineError = ExportError::NoSheets.into();
        assert!(export_err.to_string().contains("No sheets"));
    }

    #[test]
    fn test_label_mismatch_message() {
        let err = PipelineError::LabelCountMismatch {
            kind: SourceKind::National,
            files: 2,
            labels: 1,
        };
        let msg = err.to_string();
        assert!(msg.contains("2 national file(s)"));
        assert!(msg.contains("1 national label(s)"));
    }

    #[test]
    fn test_csv_error_names_file() {
        let err = PipelineError::Csv {
            file: "broken.csv".into(),
            source: CsvError::EmptyFile,
        };
        assert_eq!(err.to_string(), "Could not read 'broken.csv': CSV file is empty");
    }
}
