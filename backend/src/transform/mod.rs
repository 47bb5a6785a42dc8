//! Transformation module.
//!
//! - Normalize: per-file cleaning (local and national branches)
//! - Merge: per-label de-duplication and outer join
//! - Pivot: one months × organisations sheet per metric
//! - Pipeline: the end-to-end run

pub mod merge;
pub mod normalize;
pub mod pipeline;
pub mod pivot;

pub use merge::{combine, group_by_label, merge_label, outer_join, LabelTable};
pub use normalize::{clean, clean_local, clean_national, percentage};
pub use pipeline::*;
pub use pivot::{pivot_all, pivot_metric, pivot_triples};
