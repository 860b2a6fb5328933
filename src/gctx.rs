//! GCTX (HDF5) expression matrix reader.
//!
//! The values live in `/0/DATA/0/matrix`, stored instances x genes; the gene
//! and instance ids in `/0/META/ROW/id` and `/0/META/COL/id`. Pass one reads
//! only the row-id vector. Pass two reads one instance hyperslab at a time and
//! keeps the requested gene rows, so memory stays proportional to the subset.

use crate::error::{PipelineError, Result};
use crate::matrix::ExpressionMatrix;
use crate::matrix_io::{column_positions, wanted_rows};
use hdf5::types::{FixedAscii, FixedUnicode, TypeDescriptor, VarLenAscii, VarLenUnicode};
use hdf5::{Dataset, File};
use ndarray::s;
use std::path::Path;

pub const MATRIX_DATASET: &str = "0/DATA/0/matrix";
pub const ROW_ID_DATASET: &str = "0/META/ROW/id";
pub const COL_ID_DATASET: &str = "0/META/COL/id";

const MAX_FIXED_ID_LEN: usize = 256;

fn open(path: &Path) -> Result<File> {
    if path.to_string_lossy().to_ascii_lowercase().ends_with(".gz") {
        return Err(PipelineError::invalid_input(format!(
            "'{}' is still gzip-compressed; run the decompress stage first",
            path.display()
        )));
    }
    File::open(path)
        .map_err(|e| PipelineError::io(format!("Could not open GCTX '{}': {e}", path.display())))
}

fn dataset(file: &File, name: &str, path: &Path) -> Result<Dataset> {
    file.dataset(name).map_err(|e| {
        PipelineError::schema(format!(
            "GCTX '{}' has no dataset '/{name}': {e}",
            path.display()
        ))
    })
}

fn trim_id(raw: &str) -> String {
    raw.trim_end_matches('\0').trim().to_string()
}

/// Reads an id axis, whichever string or integer encoding the writer chose.
fn read_ids(file: &File, name: &str, path: &Path) -> Result<Vec<String>> {
    let ds = dataset(file, name, path)?;
    let schema_err = |e: hdf5::Error| {
        PipelineError::schema(format!(
            "Could not read '/{name}' from GCTX '{}': {e}",
            path.display()
        ))
    };
    let descriptor = ds.dtype().and_then(|t| t.to_descriptor()).map_err(schema_err)?;
    let ids: hdf5::Result<Vec<String>> = match descriptor {
        TypeDescriptor::VarLenUnicode => ds
            .read_raw::<VarLenUnicode>()
            .map(|v| v.iter().map(|s| trim_id(s.as_str())).collect()),
        TypeDescriptor::VarLenAscii => ds
            .read_raw::<VarLenAscii>()
            .map(|v| v.iter().map(|s| trim_id(s.as_str())).collect()),
        TypeDescriptor::FixedAscii(_) => ds
            .read_raw::<FixedAscii<MAX_FIXED_ID_LEN>>()
            .map(|v| v.iter().map(|s| trim_id(s.as_str())).collect()),
        TypeDescriptor::FixedUnicode(_) => ds
            .read_raw::<FixedUnicode<MAX_FIXED_ID_LEN>>()
            .map(|v| v.iter().map(|s| trim_id(s.as_str())).collect()),
        TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_) => ds
            .read_raw::<i64>()
            .map(|v| v.iter().map(|n| n.to_string()).collect()),
        other => {
            return Err(PipelineError::schema(format!(
                "GCTX '{}' stores '/{name}' as unsupported type {other:?}",
                path.display()
            )));
        }
    };
    ids.map_err(schema_err)
}

/// Matrix dataset plus its `(n_instances, n_genes)` shape, checked against
/// the id axes.
fn matrix_dataset(file: &File, path: &Path, n_genes: usize, n_instances: usize) -> Result<Dataset> {
    let ds = dataset(file, MATRIX_DATASET, path)?;
    let shape = ds.shape();
    if shape != [n_instances, n_genes] {
        return Err(PipelineError::schema(format!(
            "GCTX '{}' matrix has shape {shape:?}, expected [{n_instances}, {n_genes}] from its id axes",
            path.display()
        )));
    }
    Ok(ds)
}

/// First pass: the gene-id axis, in file order.
pub fn read_row_ids(path: &Path) -> Result<Vec<String>> {
    let file = open(path)?;
    let ids = read_ids(&file, ROW_ID_DATASET, path)?;
    if ids.is_empty() {
        return Err(PipelineError::schema(format!(
            "GCTX '{}' has an empty gene id axis",
            path.display()
        )));
    }
    log::info!("Scanned {} gene ids in '{}'", ids.len(), path.display());
    Ok(ids)
}

/// Second pass: gene rows at `row_indices` (returned in file order) for the
/// instances in `columns` (returned in requested order, all when `None`).
pub fn read_rows(
    path: &Path,
    row_indices: &[usize],
    columns: Option<&[String]>,
) -> Result<ExpressionMatrix> {
    let file = open(path)?;
    let row_ids = read_ids(&file, ROW_ID_DATASET, path)?;
    let col_ids = read_ids(&file, COL_ID_DATASET, path)?;
    let ds = matrix_dataset(&file, path, row_ids.len(), col_ids.len())?;

    let wanted = wanted_rows(path, row_indices, row_ids.len())?;
    let positions = column_positions(path, &col_ids, columns)?;

    let mut values = vec![Vec::with_capacity(positions.len()); wanted.len()];
    for &c in &positions {
        let instance = ds.read_slice_1d::<f32, _>(s![c, ..]).map_err(|e| {
            PipelineError::schema(format!(
                "Could not read instance '{}' from GCTX '{}': {e}",
                col_ids[c],
                path.display()
            ))
        })?;
        for (out, &r) in values.iter_mut().zip(&wanted) {
            out.push(f64::from(instance[r]));
        }
    }

    let gene_ids = wanted.iter().map(|&r| row_ids[r].clone()).collect::<Vec<_>>();
    let instance_ids = positions.iter().map(|&c| col_ids[c].clone()).collect::<Vec<_>>();
    log::info!(
        "Read {} gene rows x {} instances from '{}'",
        gene_ids.len(),
        instance_ids.len(),
        path.display()
    );
    ExpressionMatrix::new(gene_ids, instance_ids, values)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use tempfile::tempdir;

    /// Writes a GCTX with integer gene ids and string instance ids.
    /// `values` is genes x instances, as in the GCT text layout.
    pub(crate) fn write_gctx(
        path: &Path,
        gene_ids: &[i64],
        instance_ids: &[&str],
        values: &[Vec<f32>],
    ) {
        let file = File::create(path).unwrap();
        let root = file.create_group("0").unwrap();
        let meta = root.create_group("META").unwrap();
        meta.create_group("ROW")
            .unwrap()
            .new_dataset::<i64>()
            .shape(gene_ids.len())
            .create("id")
            .unwrap()
            .write_raw(gene_ids)
            .unwrap();
        let col_ids = instance_ids
            .iter()
            .map(|id| id.parse::<VarLenUnicode>().unwrap())
            .collect::<Vec<_>>();
        meta.create_group("COL")
            .unwrap()
            .new_dataset::<VarLenUnicode>()
            .shape(col_ids.len())
            .create("id")
            .unwrap()
            .write_raw(col_ids.as_slice())
            .unwrap();
        let stored = (0..instance_ids.len())
            .flat_map(|c| values.iter().map(move |row| row[c]))
            .collect::<Vec<f32>>();
        root.create_group("DATA")
            .unwrap()
            .create_group("0")
            .unwrap()
            .new_dataset::<f32>()
            .shape((instance_ids.len(), gene_ids.len()))
            .create("matrix")
            .unwrap()
            .write_raw(stored.as_slice())
            .unwrap();
    }

    pub(crate) fn write_toy_gctx(path: &Path) {
        write_gctx(
            path,
            &[5720, 466, 6009, 2309],
            &["inst_a1", "inst_a2", "inst_b1", "inst_c1"],
            &[
                vec![0.5, 0.25, 1.5, 0.0],
                vec![-1.0, -0.5, 2.0, 0.75],
                vec![3.0, 2.5, -2.0, 1.0],
                vec![0.125, -0.125, 4.0, -4.0],
            ],
        );
    }

    #[test]
    fn first_pass_reads_gene_axis() {
        let td = tempdir().unwrap();
        let path = td.path().join("toy.gctx");
        write_toy_gctx(&path);
        assert_eq!(read_row_ids(&path).unwrap(), vec!["5720", "466", "6009", "2309"]);
    }

    #[test]
    fn second_pass_slices_rows_and_columns() {
        let td = tempdir().unwrap();
        let path = td.path().join("toy.gctx");
        write_toy_gctx(&path);
        let columns = vec!["inst_b1".to_string(), "inst_a1".to_string()];
        let m = read_rows(&path, &[3, 0], Some(columns.as_slice())).unwrap();
        assert_eq!(m.gene_ids(), ["5720", "2309"]);
        assert_eq!(m.instance_ids(), ["inst_b1", "inst_a1"]);
        assert_eq!(m.values(), [vec![1.5, 0.5], vec![4.0, 0.125]]);
    }

    #[test]
    fn unknown_instance_is_alignment_error() {
        let td = tempdir().unwrap();
        let path = td.path().join("toy.gctx");
        write_toy_gctx(&path);
        let columns = vec!["inst_zz".to_string()];
        let err = read_rows(&path, &[0], Some(columns.as_slice())).unwrap_err();
        assert_eq!(err.code, ErrorCode::Alignment);
    }

    #[test]
    fn gzipped_container_must_be_decompressed_first() {
        let err = read_row_ids(Path::new("data/matrix.gctx.gz")).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);
        assert!(err.message.contains("decompress"));
    }

    #[test]
    fn missing_row_axis_is_schema_error() {
        let td = tempdir().unwrap();
        let path = td.path().join("empty.gctx");
        File::create(&path).unwrap().create_group("0").unwrap();
        let err = read_row_ids(&path).unwrap_err();
        assert_eq!(err.code, ErrorCode::Schema);
    }
}
