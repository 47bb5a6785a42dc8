//! REST API types.
//!
//! The compile endpoint answers with the workbook itself; the preview
//! endpoint answers with the same sheets as JSON so a client can draw them
//! before downloading.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::transform::pipeline::CompileResult;

/// Response of `POST /api/preview`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    /// Unique job identifier
    pub job_id: String,

    /// "ready" or "warning" (some rows were dropped)
    pub status: String,

    /// Name the workbook would be downloaded as
    pub file_name: String,

    pub sheets: Vec<PreviewSheet>,

    pub warnings: Vec<String>,
}

/// One worksheet, as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewSheet {
    /// Worksheet name (label, possibly shortened)
    pub name: String,
    /// Full metric label
    pub metric: String,
    /// `Mon-YY` row labels
    pub months: Vec<String>,
    pub organisations: Vec<String>,
    /// `values[month][organisation]`, `null` where there is no value
    pub values: Vec<Vec<Option<f64>>>,
}

impl From<CompileResult> for PreviewResponse {
    fn from(result: CompileResult) -> Self {
        let sheets = result
            .sheets
            .into_iter()
            .zip(result.sheet_names)
            .map(|(sheet, name)| PreviewSheet {
                name,
                metric: sheet.metric.to_string(),
                months: sheet.months.iter().map(ToString::to_string).collect(),
                organisations: sheet.organisations,
                values: sheet.cells,
            })
            .collect();

        PreviewResponse {
            job_id: Uuid::new_v4().to_string(),
            status: if result.warnings.is_empty() { "ready" } else { "warning" }.to_string(),
            file_name: result.file_name,
            sheets,
            warnings: result.warnings,
        }
    }
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "jobId": Uuid::new_v4().to_string(),
        "status": "error",
        "error": error,
        "sheets": [],
        "warnings": []
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PivotSheet, ReportingMonth};

    fn result(warnings: Vec<String>) -> CompileResult {
        CompileResult {
            workbook: vec![],
            file_name: "overprescribing_charts.xlsx".into(),
            sheets: vec![PivotSheet {
                metric: "A very long metric label that will not fit (%)".into(),
                months: vec![ReportingMonth::parse("Jan-24").unwrap()],
                organisations: vec!["England".into(), "ORG A".into()],
                cells: vec![vec![Some(42.5), None]],
            }],
            sheet_names: vec!["A very long metric label that w".into()],
            warnings,
        }
    }

    #[test]
    fn test_preview_shape() {
        let preview = PreviewResponse::from(result(vec![]));
        assert_eq!(preview.status, "ready");

        let json = serde_json::to_value(&preview).unwrap();
        assert_eq!(json["fileName"], "overprescribing_charts.xlsx");
        assert_eq!(json["sheets"][0]["name"], "A very long metric label that w");
        assert_eq!(json["sheets"][0]["months"][0], "Jan-24");
        assert_eq!(json["sheets"][0]["values"][0][0], 42.5);
        assert!(json["sheets"][0]["values"][0][1].is_null());
    }

    #[test]
    fn test_preview_with_warnings() {
        let preview = PreviewResponse::from(result(vec!["2 rows dropped".into()]));
        assert_eq!(preview.status, "warning");
        assert_eq!(preview.warnings.len(), 1);
    }

    #[test]
    fn test_error_response() {
        let err = error_response("No valid datasets were uploaded yet");
        assert_eq!(err["status"], "error");
        assert_eq!(err["error"], "No valid datasets were uploaded yet");
    }
}
