//! GCT expression matrix reader.
//!
//! Level-4 L1000 matrices are far larger than the landmark/instance slice the
//! pipeline needs, so reading happens in two passes: [`read_row_ids`] scans
//! only the gene-id column, then [`read_rows`] parses values for a precise row
//! subset (and optionally a column subset). Both `#1.2` and `#1.3` layouts
//! are accepted, plain or gzip-compressed.

use crate::error::{PipelineError, Result};
use crate::matrix::ExpressionMatrix;
use crate::matrix_io::{column_positions, wanted_rows};
use crate::table::open_maybe_gzip;
use itertools::Itertools;
use std::io::{BufRead, BufReader};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GctVersion {
    V1_2,
    V1_3,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GctHeader {
    pub version: GctVersion,
    pub n_rows: usize,
    pub n_cols: usize,
    pub n_row_meta: usize,
    pub n_col_meta: usize,
    pub column_ids: Vec<String>,
}

impl GctHeader {
    fn fields_per_row(&self) -> usize {
        1 + self.n_row_meta + self.n_cols
    }
}

struct GctLines {
    reader: Box<dyn BufRead>,
    line: String,
    line_no: usize,
    path: String,
}

impl GctLines {
    fn open(path: &Path) -> Result<Self> {
        if path
            .to_string_lossy()
            .to_ascii_lowercase()
            .trim_end_matches(".gz")
            .ends_with(".gctx")
        {
            return Err(PipelineError::invalid_input(format!(
                "'{}' is an HDF5 GCTX file, not GCT text",
                path.display()
            )));
        }
        Ok(Self {
            reader: Box::new(BufReader::new(open_maybe_gzip(path)?)),
            line: String::new(),
            line_no: 0,
            path: path.display().to_string(),
        })
    }

    /// Next line without its line terminator, or `None` at end of file.
    fn next_line(&mut self) -> Result<Option<&str>> {
        self.line.clear();
        let n = self.reader.read_line(&mut self.line).map_err(|e| {
            PipelineError::io(format!("Could not read GCT '{}': {e}", self.path))
        })?;
        if n == 0 {
            return Ok(None);
        }
        self.line_no += 1;
        Ok(Some(self.line.trim_end_matches(['\n', '\r'])))
    }

    fn require_line(&mut self, what: &str) -> Result<&str> {
        let path = self.path.clone();
        self.next_line()?.ok_or_else(|| {
            PipelineError::schema(format!("GCT '{path}' ended before the {what}"))
        })
    }

    fn schema_error(&self, message: impl AsRef<str>) -> PipelineError {
        PipelineError::schema(format!(
            "GCT '{}' line {}: {}",
            self.path,
            self.line_no,
            message.as_ref()
        ))
    }
}

fn parse_count(raw: &str, what: &str) -> std::result::Result<usize, String> {
    raw.trim()
        .parse::<usize>()
        .map_err(|e| format!("invalid {what} '{raw}': {e}"))
}

fn parse_value(raw: &str) -> std::result::Result<f64, String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("na") {
        return Ok(f64::NAN);
    }
    raw.parse::<f64>()
        .map_err(|e| format!("invalid matrix value '{raw}': {e}"))
}

fn read_header(lines: &mut GctLines) -> Result<GctHeader> {
    let version_line = lines.require_line("version line")?.trim().to_string();
    let version = match version_line.as_str() {
        "#1.2" => GctVersion::V1_2,
        "#1.3" => GctVersion::V1_3,
        other => {
            return Err(lines.schema_error(format!("unsupported GCT version '{other}'")));
        }
    };

    let dims = lines
        .require_line("dimensions line")?
        .split('\t')
        .map(|s| s.to_string())
        .collect::<Vec<_>>();
    let expected_dims = match version {
        GctVersion::V1_2 => 2,
        GctVersion::V1_3 => 4,
    };
    if dims.len() < expected_dims {
        return Err(lines.schema_error(format!(
            "expected {expected_dims} dimension fields, found {}",
            dims.len()
        )));
    }
    let counts = dims
        .iter()
        .take(expected_dims)
        .zip(["row count", "column count", "row metadata count", "column metadata count"])
        .map(|(raw, what)| parse_count(raw, what))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| lines.schema_error(e))?;
    let (n_rows, n_cols) = (counts[0], counts[1]);
    let (n_row_meta, n_col_meta) = match version {
        GctVersion::V1_2 => (1, 0),
        GctVersion::V1_3 => (counts[2], counts[3]),
    };

    let header_fields = lines
        .require_line("header row")?
        .split('\t')
        .map(|s| s.to_string())
        .collect::<Vec<_>>();
    if header_fields.len() != 1 + n_row_meta + n_cols {
        return Err(lines.schema_error(format!(
            "header has {} fields, expected {}",
            header_fields.len(),
            1 + n_row_meta + n_cols
        )));
    }
    let column_ids = header_fields[1 + n_row_meta..].to_vec();
    if let Some(duplicate) = column_ids.iter().duplicates().next() {
        let duplicate = duplicate.clone();
        return Err(lines.schema_error(format!("duplicate column id '{duplicate}'")));
    }
    for _ in 0..n_col_meta {
        lines.require_line("column metadata")?;
    }

    Ok(GctHeader {
        version,
        n_rows,
        n_cols,
        n_row_meta,
        n_col_meta,
        column_ids,
    })
}

pub fn read_header_from_path(path: &Path) -> Result<GctHeader> {
    let mut lines = GctLines::open(path)?;
    read_header(&mut lines)
}

/// First pass: the gene-id axis, in file order. Values are not parsed.
pub fn read_row_ids(path: &Path) -> Result<Vec<String>> {
    let mut lines = GctLines::open(path)?;
    let header = read_header(&mut lines)?;
    let mut ids = Vec::with_capacity(header.n_rows);
    while let Some(line) = lines.next_line()? {
        if line.is_empty() {
            continue;
        }
        let id = line.split('\t').next().unwrap_or_default().to_string();
        if id.is_empty() {
            return Err(lines.schema_error("row without an id"));
        }
        ids.push(id);
    }
    if ids.len() != header.n_rows {
        return Err(PipelineError::schema(format!(
            "GCT '{}' declares {} rows but contains {}",
            path.display(),
            header.n_rows,
            ids.len()
        )));
    }
    if ids.is_empty() {
        return Err(PipelineError::schema(format!(
            "GCT '{}' has an empty gene id axis",
            path.display()
        )));
    }
    log::info!("Scanned {} gene ids in '{}'", ids.len(), path.display());
    Ok(ids)
}

/// Second pass: values for the rows at `row_indices` (positions on the gene
/// axis, returned in file order) restricted to `columns` when given (returned
/// in the requested order). A requested column absent from the file is an
/// alignment error naming the missing ids.
pub fn read_rows(
    path: &Path,
    row_indices: &[usize],
    columns: Option<&[String]>,
) -> Result<ExpressionMatrix> {
    let mut lines = GctLines::open(path)?;
    let header = read_header(&mut lines)?;

    let wanted = wanted_rows(path, row_indices, header.n_rows)?;
    let value_offset = 1 + header.n_row_meta;
    let column_positions = column_positions(path, &header.column_ids, columns)?;
    let instance_ids = column_positions
        .iter()
        .map(|&c| header.column_ids[c].clone())
        .collect::<Vec<_>>();

    let mut gene_ids = Vec::with_capacity(wanted.len());
    let mut values = Vec::with_capacity(wanted.len());
    let mut next_wanted = wanted.iter().peekable();
    let mut row = 0usize;
    while next_wanted.peek().is_some() {
        let Some(line) = lines.next_line()? else {
            break;
        };
        if line.is_empty() {
            continue;
        }
        if next_wanted.peek() == Some(&&row) {
            next_wanted.next();
            let fields = line.split('\t').collect::<Vec<_>>();
            if fields.len() != header.fields_per_row() {
                let found = fields.len();
                return Err(lines.schema_error(format!(
                    "row has {found} fields, expected {}",
                    header.fields_per_row()
                )));
            }
            let parsed = column_positions
                .iter()
                .map(|&c| parse_value(fields[value_offset + c]))
                .collect::<std::result::Result<Vec<_>, _>>();
            let gene_id = fields[0].to_string();
            let parsed = parsed.map_err(|e| lines.schema_error(e))?;
            gene_ids.push(gene_id);
            values.push(parsed);
        }
        row += 1;
    }
    if gene_ids.len() != wanted.len() {
        return Err(PipelineError::schema(format!(
            "GCT '{}' ended after {row} rows; {} requested rows were not found",
            path.display(),
            wanted.len() - gene_ids.len()
        )));
    }
    log::info!(
        "Read {} gene rows x {} instances from '{}'",
        gene_ids.len(),
        instance_ids.len(),
        path.display()
    );
    ExpressionMatrix::new(gene_ids, instance_ids, values)
}

/// Single-pass read of the whole matrix; only sensible for small files.
pub fn read_matrix(path: &Path) -> Result<ExpressionMatrix> {
    let n_rows = read_header_from_path(path)?.n_rows;
    let all = (0..n_rows).collect::<Vec<_>>();
    read_rows(path, &all, None)
}
