use crate::error::{PipelineError, Result};
use crate::normalize::{default_corrections, MetadataCorrection};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "kheper.json";
pub const DEFAULT_DATA_DIR: &str = "data";

pub const L1000_PHASE1_BASE_URL: &str =
    "https://ftp.ncbi.nlm.nih.gov/geo/series/GSE92nnn/GSE92742/suppl/";
pub const L1000_PHASE1_MATRIX: &str =
    "GSE92742_Broad_LINCS_Level4_ZSPCINF_mlr12k_n1319138x12328.gctx.gz";
pub const L1000_PHASE1_METADATA: [&str; 5] = [
    "GSE92742_Broad_LINCS_cell_info.txt.gz",
    "GSE92742_Broad_LINCS_gene_info.txt.gz",
    "GSE92742_Broad_LINCS_pert_info.txt.gz",
    "GSE92742_Broad_LINCS_pert_metrics.txt.gz",
    "GSE92742_Broad_LINCS_inst_info.txt.gz",
];

/// Remote files making up one release of the L1000 dataset family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceCatalog {
    pub base_url: String,
    pub matrix_file: String,
    pub metadata_files: Vec<String>,
}

impl Default for ResourceCatalog {
    fn default() -> Self {
        Self {
            base_url: L1000_PHASE1_BASE_URL.to_string(),
            matrix_file: L1000_PHASE1_MATRIX.to_string(),
            metadata_files: L1000_PHASE1_METADATA
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl ResourceCatalog {
    /// Matrix first, then metadata, in download order.
    pub fn file_names(&self) -> Vec<String> {
        let mut names = vec![self.matrix_file.clone()];
        names.extend(self.metadata_files.iter().cloned());
        names
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceColumns {
    pub inst_id: String,
    pub pert_id: String,
    pub cell_id: String,
}

impl Default for InstanceColumns {
    fn default() -> Self {
        Self {
            inst_id: "inst_id".to_string(),
            pert_id: "pert_id".to_string(),
            cell_id: "cell_id".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileColumns {
    pub pert_id: String,
    pub pert_name: String,
    pub broad_sample: String,
}

impl Default for ProfileColumns {
    fn default() -> Self {
        Self {
            pert_id: "Metadata_pert_id".to_string(),
            pert_name: "Metadata_pert_iname".to_string(),
            broad_sample: "Metadata_broad_sample".to_string(),
        }
    }
}

/// Everything a run depends on. File names are resolved against `data_dir`;
/// absolute paths are used as given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub data_dir: String,
    pub resources: ResourceCatalog,
    pub expression_matrix: String,
    pub gene_info_file: String,
    pub inst_info_file: String,
    pub cell_painting_profiles: String,
    pub cell_painting_annotations: Option<String>,
    pub annotation_cell_line_column: String,
    pub test_fraction: f64,
    pub seed: u64,
    pub target_cell_line: String,
    pub gene_id_column: String,
    pub landmark_flag_column: String,
    pub landmark_flag_value: String,
    pub instances: InstanceColumns,
    pub profiles: ProfileColumns,
    /// Explicit correction list; when unset the built-in corrections are
    /// derived from `profiles`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corrections: Option<Vec<MetadataCorrection>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: DEFAULT_DATA_DIR.to_string(),
            resources: ResourceCatalog::default(),
            expression_matrix: L1000_PHASE1_MATRIX
                .trim_end_matches(".gz")
                .to_string(),
            gene_info_file: "GSE92742_Broad_LINCS_gene_info.txt.gz".to_string(),
            inst_info_file: "GSE92742_Broad_LINCS_inst_info.txt.gz".to_string(),
            cell_painting_profiles: "2016_04_01_a549_48hr_batch1.csv".to_string(),
            cell_painting_annotations: None,
            annotation_cell_line_column: "cell_id".to_string(),
            test_fraction: 0.15,
            seed: 123,
            target_cell_line: "A549".to_string(),
            gene_id_column: "pr_gene_id".to_string(),
            landmark_flag_column: "pr_is_lm".to_string(),
            landmark_flag_value: "1".to_string(),
            instances: InstanceColumns::default(),
            profiles: ProfileColumns::default(),
            corrections: None,
        }
    }
}

impl PipelineConfig {
    pub fn load_from_path(path: &str) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::io(format!("Could not read config file '{path}': {e}")))?;
        let config: Self = serde_json::from_str(&text).map_err(|e| {
            PipelineError::invalid_input(format!("Could not parse config JSON '{path}': {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Falls back to defaults when `path` does not exist.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load_from_path(path)
        } else {
            log::debug!("No config at '{path}', using defaults");
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(PipelineError::invalid_input(format!(
                "test_fraction must lie strictly between 0 and 1, got {}",
                self.test_fraction
            )));
        }
        for (field, value) in [
            ("data_dir", &self.data_dir),
            ("target_cell_line", &self.target_cell_line),
            ("gene_id_column", &self.gene_id_column),
            ("landmark_flag_column", &self.landmark_flag_column),
            ("expression_matrix", &self.expression_matrix),
            ("cell_painting_profiles", &self.cell_painting_profiles),
        ] {
            if value.trim().is_empty() {
                return Err(PipelineError::invalid_input(format!(
                    "Config field '{field}' must not be empty"
                )));
            }
        }
        Ok(())
    }

    pub fn corrections(&self) -> Vec<MetadataCorrection> {
        match &self.corrections {
            Some(corrections) => corrections.clone(),
            None => default_corrections(&self.profiles),
        }
    }

    pub fn data_path(&self, name: &str) -> PathBuf {
        Path::new(&self.data_dir).join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_match_reference_workflow() {
        let config = PipelineConfig::default();
        assert_eq!(config.test_fraction, 0.15);
        assert_eq!(config.seed, 123);
        assert_eq!(config.target_cell_line, "A549");
        assert_eq!(config.landmark_flag_column, "pr_is_lm");
        assert_eq!(config.landmark_flag_value, "1");
        assert_eq!(config.resources.file_names().len(), 6);
        assert_eq!(config.corrections().len(), 3);
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let td = tempdir().unwrap();
        let path = td.path().join("kheper.json");
        std::fs::write(&path, r#"{"seed": 7, "target_cell_line": "MCF7"}"#).unwrap();
        let config = PipelineConfig::load_from_path(&path.to_string_lossy()).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.target_cell_line, "MCF7");
        assert_eq!(config.test_fraction, 0.15);
        assert_eq!(config.instances.pert_id, "pert_id");
    }

    #[test]
    fn rejects_out_of_range_test_fraction() {
        let td = tempdir().unwrap();
        let path = td.path().join("kheper.json");
        std::fs::write(&path, r#"{"test_fraction": 1.0}"#).unwrap();
        let err = PipelineConfig::load_from_path(&path.to_string_lossy()).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::InvalidInput);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let td = tempdir().unwrap();
        let path = td.path().join("absent.json");
        let config = PipelineConfig::load_or_default(&path.to_string_lossy()).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn data_path_keeps_absolute_names() {
        let config = PipelineConfig::default();
        assert_eq!(config.data_path("x.tsv"), PathBuf::from("data/x.tsv"));
        assert_eq!(config.data_path("/tmp/x.tsv"), PathBuf::from("/tmp/x.tsv"));
    }

    #[test]
    fn default_matrix_is_what_decompress_leaves_behind() {
        let config = PipelineConfig::default();
        assert_eq!(
            config.resources.matrix_file.strip_suffix(".gz"),
            Some(config.expression_matrix.as_str())
        );
        assert!(config.expression_matrix.ends_with(".gctx"));
    }

    #[test]
    fn corrections_track_profile_column_overrides() {
        let td = tempdir().unwrap();
        let path = td.path().join("kheper.json");
        std::fs::write(
            &path,
            r#"{"profiles": {"broad_sample": "Metadata_sample", "pert_name": "Metadata_name"}}"#,
        )
        .unwrap();
        let config = PipelineConfig::load_from_path(&path.to_string_lossy()).unwrap();
        let corrections = config.corrections();
        assert_eq!(corrections[2].match_column, "Metadata_sample");
        assert_eq!(corrections[0].match_column, "Metadata_pert_id");
        assert_eq!(corrections[0].assignments[0].column, "Metadata_name");
    }

    #[test]
    fn explicit_corrections_replace_defaults() {
        let td = tempdir().unwrap();
        let path = td.path().join("kheper.json");
        std::fs::write(
            &path,
            r#"{"corrections": [{"match_column": "x", "match_value": "y", "assignments": []}]}"#,
        )
        .unwrap();
        let config = PipelineConfig::load_from_path(&path.to_string_lossy()).unwrap();
        assert_eq!(config.corrections().len(), 1);
    }
}
