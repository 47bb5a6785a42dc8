//! Pairs uploaded files with their metric labels and parses them.
//!
//! Labels are attached to files once, here, as explicit [`MetricFile`]
//! records. Later stages never zip parallel lists.

use std::path::Path;

use crate::api::logs::{log_info_indent, log_success_indent};
use crate::error::{PipelineError, PipelineResult};
use crate::models::{MetricFile, MetricLabel, SourceKind};
use crate::parser::{parse_bytes_auto, ParseResult};

/// An uploaded file: name and raw bytes.
#[derive(Debug, Clone)]
pub struct Upload {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk, named after its file name.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { name, bytes })
    }
}

/// A file after parsing.
#[derive(Debug, Clone)]
pub struct LoadedTable {
    pub file: MetricFile,
    pub table: ParseResult,
}

/// Labels pre-filled for `count` files: `Metric 1 (%)`, `Metric 2 (%)`, ...
pub fn default_labels(count: usize) -> Vec<MetricLabel> {
    (0..count).map(MetricLabel::default_for).collect()
}

/// Attach one label to each upload of `kind`.
///
/// Fails without touching any file when the counts differ.
pub fn pair_labels(
    kind: SourceKind,
    uploads: Vec<Upload>,
    labels: Vec<MetricLabel>,
) -> PipelineResult<Vec<MetricFile>> {
    if uploads.len() != labels.len() {
        return Err(PipelineError::LabelCountMismatch {
            kind,
            files: uploads.len(),
            labels: labels.len(),
        });
    }

    Ok(uploads
        .into_iter()
        .zip(labels)
        .map(|(upload, label)| MetricFile::new(upload.name, kind, label, upload.bytes))
        .collect())
}

/// Like [`pair_labels`], but an empty label list means "use the defaults".
pub fn pair_labels_or_default(
    kind: SourceKind,
    uploads: Vec<Upload>,
    labels: Vec<MetricLabel>,
) -> PipelineResult<Vec<MetricFile>> {
    let labels = if labels.is_empty() {
        default_labels(uploads.len())
    } else {
        labels
    };
    pair_labels(kind, uploads, labels)
}

/// Parse one file.
pub fn load_file(file: MetricFile) -> PipelineResult<LoadedTable> {
    let table = parse_bytes_auto(&file.bytes).map_err(|source| PipelineError::Csv {
        file: file.name.clone(),
        source,
    })?;

    log_success_indent(
        format!(
            "{} ({}): {} rows, {} columns, encoding {}",
            file.name,
            file.kind,
            table.row_count(),
            table.headers.len(),
            table.encoding
        ),
        1,
    );

    Ok(LoadedTable { file, table })
}

/// Parse every file, in order. The first failure aborts the whole batch.
pub fn load(files: Vec<MetricFile>) -> PipelineResult<Vec<LoadedTable>> {
    log_info_indent(format!("Reading {} file(s)...", files.len()), 1);
    files.into_iter().map(load_file).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(name: &str) -> Upload {
        Upload::new(name, "Country,Month,Value\nENGLAND,Jan-24,1\n")
    }

    #[test]
    fn test_default_labels() {
        let labels = default_labels(2);
        assert_eq!(labels, vec![MetricLabel::new("Metric 1 (%)"), MetricLabel::new("Metric 2 (%)")]);
        assert!(default_labels(0).is_empty());
    }

    #[test]
    fn test_pair_labels_keeps_order() {
        let files = pair_labels(
            SourceKind::National,
            vec![upload("a.csv"), upload("b.csv")],
            vec!["First".into(), "Second".into()],
        )
        .unwrap();

        assert_eq!(files.len(), 2);
        assert_eq!(files[0].name, "a.csv");
        assert_eq!(files[0].label.as_str(), "First");
        assert_eq!(files[1].label.as_str(), "Second");
        assert_eq!(files[1].kind, SourceKind::National);
    }

    #[test]
    fn test_pair_labels_count_mismatch() {
        let err = pair_labels(SourceKind::Local, vec![upload("a.csv")], vec![]).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::LabelCountMismatch { kind: SourceKind::Local, files: 1, labels: 0 }
        ));

        let err = pair_labels(
            SourceKind::Local,
            vec![upload("a.csv")],
            vec!["x".into(), "y".into()],
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::LabelCountMismatch { labels: 2, .. }));
    }

    #[test]
    fn test_pair_labels_or_default() {
        let files =
            pair_labels_or_default(SourceKind::Local, vec![upload("a.csv"), upload("b.csv")], vec![])
                .unwrap();
        assert_eq!(files[1].label.as_str(), "Metric 2 (%)");
    }

    #[test]
    fn test_load_reports_file_name() {
        let file = MetricFile::new("empty.csv", SourceKind::Local, "M".into(), Vec::new());
        let err = load(vec![file]).unwrap_err();
        assert!(err.to_string().contains("empty.csv"));
    }

    #[test]
    fn test_upload_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.csv");
        std::fs::write(&path, "a,b\n1,2\n").unwrap();

        let upload = Upload::from_path(&path).unwrap();
        assert_eq!(upload.name, "local.csv");
        assert_eq!(upload.bytes, b"a,b\n1,2\n");
    }
}
