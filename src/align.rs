use crate::error::{PipelineError, Result};
use crate::matrix::{AlignedMatrix, ExpressionMatrix};
use crate::table::Table;
use itertools::Itertools;
use std::collections::HashMap;

const MAX_REPORTED_IDS: usize = 10;

/// Reorders `matrix` columns to follow the instance-id sequence of
/// `instance_metadata` and transposes, so output row `i` is metadata row `i`.
/// `label_column` supplies the per-row stratification label.
pub fn align(
    matrix: &ExpressionMatrix,
    instance_metadata: &Table,
    inst_id_column: &str,
    label_column: &str,
) -> Result<AlignedMatrix> {
    let instance_ids = instance_metadata.column_values(inst_id_column)?;
    let labels = instance_metadata.column_values(label_column)?;

    let duplicates = instance_ids.iter().duplicates().collect::<Vec<_>>();
    if !duplicates.is_empty() {
        return Err(PipelineError::alignment(format!(
            "Instance metadata repeats {} instance id(s): {}",
            duplicates.len(),
            duplicates.iter().take(MAX_REPORTED_IDS).join(", ")
        )));
    }

    let column_of: HashMap<&str, usize> = matrix
        .instance_ids()
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();
    let missing = instance_ids
        .iter()
        .filter(|id| !column_of.contains_key(*id))
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(PipelineError::alignment(format!(
            "{} instance id(s) from the metadata are absent from the expression matrix: {}",
            missing.len(),
            missing.iter().take(MAX_REPORTED_IDS).join(", ")
        )));
    }

    let values = instance_ids
        .iter()
        .map(|id| {
            let c = column_of[id];
            matrix.values().iter().map(|gene_row| gene_row[c]).collect()
        })
        .collect::<Vec<Vec<f64>>>();

    log::info!(
        "Aligned {} instances x {} genes",
        instance_ids.len(),
        matrix.n_genes()
    );
    Ok(AlignedMatrix::from_parts(
        instance_ids.iter().map(|s| s.to_string()).collect(),
        matrix.gene_ids().to_vec(),
        labels.iter().map(|s| s.to_string()).collect(),
        values,
    ))
}
