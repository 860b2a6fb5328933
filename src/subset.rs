use crate::config::{InstanceColumns, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::matrix::ExpressionMatrix;
use crate::table::Table;
use itertools::Itertools;
use std::collections::HashSet;

/// Which gene-annotation column marks landmark genes, and with what value.
#[derive(Debug, Clone, Copy)]
pub struct LandmarkFilter<'a> {
    pub id_column: &'a str,
    pub flag_column: &'a str,
    pub truthy: &'a str,
}

impl<'a> LandmarkFilter<'a> {
    pub fn from_config(config: &'a PipelineConfig) -> Self {
        Self {
            id_column: &config.gene_id_column,
            flag_column: &config.landmark_flag_column,
            truthy: &config.landmark_flag_value,
        }
    }

    /// Text match first, then numeric so `1` and `1.0` agree.
    fn is_flagged(&self, value: &str) -> bool {
        let value = value.trim();
        if value == self.truthy.trim() {
            return true;
        }
        match (value.parse::<f64>(), self.truthy.trim().parse::<f64>()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

pub fn landmark_gene_ids(genes: &Table, filter: &LandmarkFilter) -> Result<HashSet<String>> {
    let ids = genes.column_values(filter.id_column)?;
    let flags = genes.column_values(filter.flag_column)?;
    if let Some(duplicate) = ids.iter().map(|id| id.trim()).duplicates().next() {
        return Err(PipelineError::schema(format!(
            "Gene annotation id '{duplicate}' appears more than once in column '{}'",
            filter.id_column
        )));
    }
    let landmarks = ids
        .iter()
        .zip(flags)
        .filter(|(_, flag)| filter.is_flagged(flag))
        .map(|(id, _)| id.trim().to_string())
        .collect::<HashSet<_>>();
    log::info!(
        "{} of {} annotated genes are landmarks ({} == {})",
        landmarks.len(),
        ids.len(),
        filter.flag_column,
        filter.truthy
    );
    Ok(landmarks)
}

/// Positions on the matrix gene axis that are landmark genes, in matrix order.
pub fn landmark_row_indices(matrix_gene_ids: &[String], landmarks: &HashSet<String>) -> Vec<usize> {
    matrix_gene_ids
        .iter()
        .enumerate()
        .filter(|(_, id)| landmarks.contains(id.trim()))
        .map(|(i, _)| i)
        .collect()
}

/// Restricts `matrix` to landmark rows, keeping the matrix's own row order.
pub fn subset_genes(
    matrix: ExpressionMatrix,
    gene_annotations: &Table,
    filter: &LandmarkFilter,
) -> Result<ExpressionMatrix> {
    if matrix.n_genes() == 0 {
        return Err(PipelineError::schema(
            "Expression matrix has an empty gene id axis",
        ));
    }
    let landmarks = landmark_gene_ids(gene_annotations, filter)?;
    let indices = landmark_row_indices(matrix.gene_ids(), &landmarks);
    log::info!(
        "Keeping {} of {} matrix rows as landmark genes",
        indices.len(),
        matrix.n_genes()
    );
    Ok(matrix.select_gene_rows(&indices))
}

/// Instances of `target_cell_line` treated with one of `allowed_perturbations`,
/// in source order.
pub fn subset_instances(
    instance_metadata: Table,
    allowed_perturbations: &HashSet<String>,
    target_cell_line: &str,
    columns: &InstanceColumns,
) -> Result<Table> {
    let pert_idx = instance_metadata.column_index(&columns.pert_id)?;
    let cell_idx = instance_metadata.column_index(&columns.cell_id)?;
    instance_metadata.column_index(&columns.inst_id)?;
    let before = instance_metadata.len();
    let kept = instance_metadata.filter_rows(|row| {
        row[cell_idx] == target_cell_line && allowed_perturbations.contains(&row[pert_idx])
    });
    log::info!(
        "Kept {} of {} instances (cell line '{target_cell_line}', {} allowed perturbations); dropped {}",
        kept.len(),
        before,
        allowed_perturbations.len(),
        before - kept.len()
    );
    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(columns: &[&str], rows: &[&[&str]]) -> Table {
        Table::new(
            columns.iter().map(|s| s.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        )
        .unwrap()
    }

    fn filter() -> LandmarkFilter<'static> {
        LandmarkFilter {
            id_column: "pr_gene_id",
            flag_column: "pr_is_lm",
            truthy: "1",
        }
    }

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn keeps_landmark_rows_in_matrix_order() {
        let matrix = ExpressionMatrix::new(
            ids(&["g1", "g2", "g3"]),
            ids(&["i1"]),
            vec![vec![1.0], vec![2.0], vec![3.0]],
        )
        .unwrap();
        // annotation order deliberately differs from matrix order
        let genes = table(
            &["pr_gene_id", "pr_is_lm"],
            &[&["g3", "1"], &["g2", "0"], &["g1", "1"]],
        );
        let out = subset_genes(matrix, &genes, &filter()).unwrap();
        assert_eq!(out.gene_ids(), ["g1", "g3"]);
        assert_eq!(out.values(), [vec![1.0], vec![3.0]]);
    }

    #[test]
    fn landmark_rows_are_the_exact_intersection() {
        let genes = table(
            &["pr_gene_id", "pr_is_lm"],
            &[&["g1", "1"], &["g4", "1"], &["g2", "0"], &["g3", "1.0"]],
        );
        let landmarks = landmark_gene_ids(&genes, &filter()).unwrap();
        let matrix_ids = ids(&["g0", "g1", "g2", "g3"]);
        assert_eq!(landmark_row_indices(&matrix_ids, &landmarks), vec![1, 3]);
    }

    #[test]
    fn duplicate_gene_ids_are_schema_errors() {
        let genes = table(&["pr_gene_id", "pr_is_lm"], &[&["g1", "1"], &["g1", "0"]]);
        let err = landmark_gene_ids(&genes, &filter()).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::Schema);
        assert!(err.message.contains("g1"));
    }

    #[test]
    fn missing_flag_column_is_schema_error() {
        let genes = table(&["pr_gene_id"], &[&["g1"]]);
        let err = landmark_gene_ids(&genes, &filter()).unwrap_err();
        assert!(err.message.contains("pr_is_lm"));
    }

    #[test]
    fn empty_matrix_axis_is_schema_error() {
        let genes = table(&["pr_gene_id", "pr_is_lm"], &[&["g1", "1"]]);
        let err = subset_genes(ExpressionMatrix::default(), &genes, &filter()).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::Schema);
    }

    #[test]
    fn filters_instances_by_cell_line_and_perturbation() {
        let meta = table(
            &["inst_id", "pert_id", "cell_id"],
            &[
                &["i1", "A", "A549"],
                &["i2", "A", "MCF7"],
                &["i3", "Z", "A549"],
                &["i4", "B", "A549"],
            ],
        );
        let allowed = ["A", "B"].iter().map(|s| s.to_string()).collect();
        let out = subset_instances(meta, &allowed, "A549", &InstanceColumns::default()).unwrap();
        assert_eq!(out.column_values("inst_id").unwrap(), vec!["i1", "i4"]);
    }
}
