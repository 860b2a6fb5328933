//! Expression matrix access by file format.
//!
//! Both readers share the same two-pass contract: [`read_row_ids`] returns the
//! gene-id axis in file order, [`read_rows`] materialises a row subset for an
//! optional instance subset.

use crate::error::{PipelineError, Result};
use crate::gct;
use crate::matrix::ExpressionMatrix;
use itertools::Itertools;
use std::collections::HashMap;
use std::path::Path;

const MAX_REPORTED_IDS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixFormat {
    /// Tab-delimited `#1.2` / `#1.3` text, plain or gzip.
    Gct,
    /// HDF5 container with `/0/DATA/0/matrix` and `/0/META/{ROW,COL}/id`.
    Gctx,
}

impl MatrixFormat {
    pub fn from_path(path: &Path) -> Self {
        let name = path.to_string_lossy().to_ascii_lowercase();
        if name.trim_end_matches(".gz").ends_with(".gctx") {
            MatrixFormat::Gctx
        } else {
            MatrixFormat::Gct
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MatrixFormat::Gct => "gct",
            MatrixFormat::Gctx => "gctx",
        }
    }
}

/// Formats this build can read, as reported by `capabilities`.
pub fn supported_formats() -> Vec<String> {
    let mut formats = vec!["gct-1.2".to_string(), "gct-1.3".to_string()];
    if cfg!(feature = "gctx") {
        formats.push("gctx".to_string());
    }
    formats
}

pub fn read_row_ids(path: &Path) -> Result<Vec<String>> {
    match MatrixFormat::from_path(path) {
        MatrixFormat::Gct => gct::read_row_ids(path),
        MatrixFormat::Gctx => gctx_reader::read_row_ids(path),
    }
}

pub fn read_rows(
    path: &Path,
    row_indices: &[usize],
    columns: Option<&[String]>,
) -> Result<ExpressionMatrix> {
    match MatrixFormat::from_path(path) {
        MatrixFormat::Gct => gct::read_rows(path, row_indices, columns),
        MatrixFormat::Gctx => gctx_reader::read_rows(path, row_indices, columns),
    }
}

#[cfg(feature = "gctx")]
mod gctx_reader {
    pub(super) use crate::gctx::{read_row_ids, read_rows};
}

#[cfg(not(feature = "gctx"))]
mod gctx_reader {
    use crate::error::{PipelineError, Result};
    use crate::matrix::ExpressionMatrix;
    use std::path::Path;

    fn unsupported(path: &Path) -> PipelineError {
        PipelineError::invalid_input(format!(
            "'{}' is an HDF5 GCTX file but this build lacks the 'gctx' feature",
            path.display()
        ))
    }

    pub(super) fn read_row_ids(path: &Path) -> Result<Vec<String>> {
        Err(unsupported(path))
    }

    pub(super) fn read_rows(
        path: &Path,
        _row_indices: &[usize],
        _columns: Option<&[String]>,
    ) -> Result<ExpressionMatrix> {
        Err(unsupported(path))
    }
}

/// Sorted, deduplicated `row_indices`, each checked against `n_rows`.
pub(crate) fn wanted_rows(path: &Path, row_indices: &[usize], n_rows: usize) -> Result<Vec<usize>> {
    let mut wanted = row_indices.to_vec();
    wanted.sort_unstable();
    wanted.dedup();
    if let Some(&last) = wanted.last() {
        if last >= n_rows {
            return Err(PipelineError::invalid_input(format!(
                "Row index {last} is out of range for matrix '{}' with {n_rows} rows",
                path.display()
            )));
        }
    }
    Ok(wanted)
}

/// Positions of `requested` within `available`, in requested order; all
/// columns when `requested` is `None`. Absent ids are an alignment error.
pub(crate) fn column_positions(
    path: &Path,
    available: &[String],
    requested: Option<&[String]>,
) -> Result<Vec<usize>> {
    let Some(requested) = requested else {
        return Ok((0..available.len()).collect());
    };
    let by_id: HashMap<&str, usize> = available
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();
    let missing = requested
        .iter()
        .filter(|id| !by_id.contains_key(id.as_str()))
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(PipelineError::alignment(format!(
            "{} requested instance id(s) absent from matrix '{}': {}",
            missing.len(),
            path.display(),
            missing.iter().take(MAX_REPORTED_IDS).join(", ")
        )));
    }
    Ok(requested.iter().map(|id| by_id[id.as_str()]).collect())
}
