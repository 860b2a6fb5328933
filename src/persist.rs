use crate::error::{PipelineError, Result};
use csv::WriterBuilder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

pub const CELL_PAINTING_PREFIX: &str = "cp";
pub const EXPRESSION_PREFIX: &str = "expr";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitSide {
    Train,
    Test,
}

impl SplitSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            SplitSide::Train => "train",
            SplitSide::Test => "test",
        }
    }
}

/// `<prefix>_<split>_data.tsv.gz`
pub fn output_file_name(prefix: &str, side: SplitSide) -> String {
    format!("{prefix}_{}_data.tsv.gz", side.as_str())
}

/// Anything that can be written as a header row plus data rows.
pub trait TabularExport {
    fn header(&self) -> Vec<String>;
    fn write_records<W: Write>(&self, writer: &mut csv::Writer<W>) -> csv::Result<()>;
}

/// Writes `dataset` as gzip-compressed TSV with a header and no row index.
pub fn persist<T: TabularExport>(dataset: &T, path: &Path) -> Result<()> {
    let io_err = |e: &dyn std::fmt::Display| {
        PipelineError::io(format!("Could not write '{}': {e}", path.display()))
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            PipelineError::io(format!(
                "Could not create output directory '{}': {e}",
                parent.display()
            ))
        })?;
    }
    let file = File::create(path).map_err(|e| io_err(&e))?;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    let mut writer = WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_writer(encoder);
    writer.write_record(dataset.header()).map_err(|e| io_err(&e))?;
    dataset.write_records(&mut writer).map_err(|e| io_err(&e))?;
    let encoder = writer.into_inner().map_err(|e| io_err(e.error()))?;
    encoder
        .finish()
        .map_err(|e| io_err(&e))?
        .flush()
        .map_err(|e| io_err(&e))?;
    log::info!("Wrote '{}'", path.display());
    Ok(())
}
