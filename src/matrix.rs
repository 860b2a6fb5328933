use crate::error::{PipelineError, Result};
use crate::persist::TabularExport;
use crate::split::RowSelect;
use std::io::Write;

/// Genes x instances, as stored in L1000 level-4 files.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpressionMatrix {
    gene_ids: Vec<String>,
    instance_ids: Vec<String>,
    values: Vec<Vec<f64>>,
}

impl ExpressionMatrix {
    pub fn new(
        gene_ids: Vec<String>,
        instance_ids: Vec<String>,
        values: Vec<Vec<f64>>,
    ) -> Result<Self> {
        if values.len() != gene_ids.len() {
            return Err(PipelineError::schema(format!(
                "Matrix has {} value rows for {} gene ids",
                values.len(),
                gene_ids.len()
            )));
        }
        if let Some((i, row)) = values
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != instance_ids.len())
        {
            return Err(PipelineError::schema(format!(
                "Matrix row '{}' has {} values for {} instance ids",
                gene_ids[i],
                row.len(),
                instance_ids.len()
            )));
        }
        Ok(Self {
            gene_ids,
            instance_ids,
            values,
        })
    }

    pub fn gene_ids(&self) -> &[String] {
        &self.gene_ids
    }

    pub fn instance_ids(&self) -> &[String] {
        &self.instance_ids
    }

    pub fn values(&self) -> &[Vec<f64>] {
        &self.values
    }

    pub fn n_genes(&self) -> usize {
        self.gene_ids.len()
    }

    /// Keeps the gene rows at `indices`, in the order given.
    pub fn select_gene_rows(self, indices: &[usize]) -> Self {
        Self {
            gene_ids: indices.iter().map(|&i| self.gene_ids[i].clone()).collect(),
            values: indices.iter().map(|&i| self.values[i].clone()).collect(),
            instance_ids: self.instance_ids,
        }
    }
}

/// Instances x genes with one stratification label per instance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlignedMatrix {
    instance_ids: Vec<String>,
    gene_ids: Vec<String>,
    labels: Vec<String>,
    values: Vec<Vec<f64>>,
}

impl AlignedMatrix {
    pub(crate) fn from_parts(
        instance_ids: Vec<String>,
        gene_ids: Vec<String>,
        labels: Vec<String>,
        values: Vec<Vec<f64>>,
    ) -> Self {
        debug_assert_eq!(instance_ids.len(), labels.len());
        debug_assert_eq!(instance_ids.len(), values.len());
        Self {
            instance_ids,
            gene_ids,
            labels,
            values,
        }
    }

    pub fn instance_ids(&self) -> &[String] {
        &self.instance_ids
    }

    pub fn gene_ids(&self) -> &[String] {
        &self.gene_ids
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn values(&self) -> &[Vec<f64>] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.instance_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instance_ids.is_empty()
    }
}

impl RowSelect for AlignedMatrix {
    fn row_count(&self) -> usize {
        self.instance_ids.len()
    }

    fn select_rows(&self, indices: &[usize]) -> Self {
        Self {
            instance_ids: indices.iter().map(|&i| self.instance_ids[i].clone()).collect(),
            gene_ids: self.gene_ids.clone(),
            labels: indices.iter().map(|&i| self.labels[i].clone()).collect(),
            values: indices.iter().map(|&i| self.values[i].clone()).collect(),
        }
    }
}

/// Written as gene columns only; instance ids are the row index and are
/// left out like any other index.
impl TabularExport for AlignedMatrix {
    fn header(&self) -> Vec<String> {
        self.gene_ids.clone()
    }

    fn write_records<W: Write>(&self, writer: &mut csv::Writer<W>) -> csv::Result<()> {
        for row in &self.values {
            writer.write_record(row.iter().map(|v| v.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn rejects_ragged_values() {
        let err = ExpressionMatrix::new(
            ids(&["g1", "g2"]),
            ids(&["i1", "i2"]),
            vec![vec![1.0, 2.0], vec![3.0]],
        )
        .unwrap_err();
        assert!(err.message.contains("'g2'"));
    }

    #[test]
    fn select_gene_rows_follows_indices() {
        let m = ExpressionMatrix::new(
            ids(&["g1", "g2", "g3"]),
            ids(&["i1"]),
            vec![vec![1.0], vec![2.0], vec![3.0]],
        )
        .unwrap()
        .select_gene_rows(&[0, 2]);
        assert_eq!(m.gene_ids(), ["g1", "g3"]);
        assert_eq!(m.values(), [vec![1.0], vec![3.0]]);
    }

    #[test]
    fn aligned_rows_keep_labels_paired() {
        let aligned = AlignedMatrix::from_parts(
            ids(&["i1", "i2", "i3"]),
            ids(&["g1"]),
            ids(&["A", "B", "C"]),
            vec![vec![1.0], vec![2.0], vec![3.0]],
        );
        let picked = aligned.select_rows(&[2, 0]);
        assert_eq!(picked.instance_ids(), ["i3", "i1"]);
        assert_eq!(picked.labels(), ["C", "A"]);
        assert_eq!(picked.values(), [vec![3.0], vec![1.0]]);
    }

    #[test]
    fn export_has_gene_columns_without_instance_ids() {
        let aligned = AlignedMatrix::from_parts(
            ids(&["i1", "i2"]),
            ids(&["5720", "6009"]),
            ids(&["A", "A"]),
            vec![vec![0.5, -1.0], vec![f64::NAN, 2.0]],
        );
        assert_eq!(aligned.header(), ["5720", "6009"]);
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(Vec::new());
        aligned.write_records(&mut writer).unwrap();
        writer.flush().unwrap();
        let text = String::from_utf8(writer.get_ref().clone()).unwrap();
        assert_eq!(text, "0.5\t-1\nNaN\t2\n");
    }
}
