use crate::error::{PipelineError, Result};
use crate::persist::TabularExport;
use crate::split::RowSelect;
use csv::{ReaderBuilder, StringRecord};
use flate2::read::GzDecoder;
use itertools::Itertools;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

/// A delimited text table with a header row. Cells are kept as text; the
/// pipeline only ever compares identifiers and copies feature columns through.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

pub(crate) fn is_gzip_path(path: &Path) -> bool {
    path.to_string_lossy().to_ascii_lowercase().ends_with(".gz")
}

/// `.csv` and `.csv.gz` are comma separated, everything else tab separated.
fn infer_delimiter(path: &Path) -> u8 {
    let lower = path.to_string_lossy().to_ascii_lowercase();
    let lower = lower.strip_suffix(".gz").unwrap_or(&lower);
    if lower.ends_with(".csv") {
        b','
    } else {
        b'\t'
    }
}

pub(crate) fn open_maybe_gzip(path: &Path) -> Result<Box<dyn Read>> {
    let file = File::open(path)
        .map_err(|e| PipelineError::io(format!("Could not open '{}': {e}", path.display())))?;
    if is_gzip_path(path) {
        Ok(Box::new(GzDecoder::new(BufReader::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self> {
        if let Some(duplicate) = columns.iter().duplicates().next() {
            return Err(PipelineError::schema(format!(
                "Duplicate column name '{duplicate}'"
            )));
        }
        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(PipelineError::schema(format!(
                    "Row {i} has {} fields, expected {}",
                    row.len(),
                    columns.len()
                )));
            }
        }
        Ok(Self { columns, rows })
    }

    pub fn read(path: &Path) -> Result<Self> {
        Self::read_with_delimiter(path, infer_delimiter(path))
    }

    pub fn read_with_delimiter(path: &Path, delimiter: u8) -> Result<Self> {
        let reader = open_maybe_gzip(path)?;
        let mut rdr = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .from_reader(reader);
        let columns = rdr
            .headers()
            .map_err(|e| {
                PipelineError::schema(format!(
                    "Could not read header of '{}': {e}",
                    path.display()
                ))
            })?
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>();
        let mut rows = Vec::new();
        let mut record = StringRecord::new();
        loop {
            let more = rdr.read_record(&mut record).map_err(|e| {
                let err: PipelineError = e.into();
                PipelineError::new(
                    err.code,
                    format!("Could not read '{}': {}", path.display(), err.message),
                )
            })?;
            if !more {
                break;
            }
            rows.push(record.iter().map(|s| s.to_string()).collect());
        }
        log::debug!(
            "Read {} rows x {} columns from '{}'",
            rows.len(),
            columns.len(),
            path.display()
        );
        Self::new(columns, rows)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| PipelineError::schema(format!("Expected column '{name}' is missing")))
    }

    pub fn column_values(&self, name: &str) -> Result<Vec<&str>> {
        let idx = self.column_index(name)?;
        Ok(self.rows.iter().map(|row| row[idx].as_str()).collect())
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows.get(row).and_then(|r| r.get(column)).map(String::as_str)
    }

    /// Keeps rows for which `keep` returns true, in source order.
    pub fn filter_rows<F>(self, mut keep: F) -> Self
    where
        F: FnMut(&[String]) -> bool,
    {
        let rows = self.rows.into_iter().filter(|row| keep(row)).collect();
        Self {
            columns: self.columns,
            rows,
        }
    }

    /// Appends a column filled with `fill`, returning its index. No-op when
    /// the column already exists.
    pub(crate) fn ensure_column(&mut self, name: &str, fill: &str) -> usize {
        if let Some(idx) = self.columns.iter().position(|c| c == name) {
            return idx;
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(fill.to_string());
        }
        self.columns.len() - 1
    }

    pub(crate) fn set_cell(&mut self, row: usize, column: usize, value: &str) {
        if let Some(cell) = self.rows.get_mut(row).and_then(|r| r.get_mut(column)) {
            *cell = value.to_string();
        }
    }

    /// Occurrence count per distinct value, most frequent first, ties by value.
    pub fn value_counts(&self, name: &str) -> Result<Vec<(String, usize)>> {
        let mut counts = self
            .column_values(name)?
            .into_iter()
            .counts()
            .into_iter()
            .map(|(value, n)| (value.to_string(), n))
            .collect::<Vec<_>>();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(counts)
    }
}

impl RowSelect for Table {
    fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn select_rows(&self, indices: &[usize]) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }
}

impl TabularExport for Table {
    fn header(&self) -> Vec<String> {
        self.columns.clone()
    }

    fn write_records<W: Write>(&self, writer: &mut csv::Writer<W>) -> csv::Result<()> {
        for row in &self.rows {
            writer.write_record(row)?;
        }
        Ok(())
    }
}
