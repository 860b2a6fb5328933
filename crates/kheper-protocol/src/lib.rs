//! Machine-readable reports emitted by the kheper pipeline stages.
//!
//! These types are printed as JSON by `kheper_cli` and are the stable
//! contract for anything scripting around the batch steps.

use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: &str = "kheper.reports.v1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchReport {
    pub source: String,
    pub output: String,
    pub bytes: u64,
    pub sha1: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecompressReport {
    pub source: String,
    pub output: String,
    pub bytes: u64,
}

/// Per-label counts of one stratified split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StratumCount {
    pub label: String,
    pub total: usize,
    pub test: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitReport {
    pub modality: String,
    pub test_fraction: f64,
    pub seed: u64,
    pub input_rows: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub train_path: String,
    pub test_path: String,
    pub strata: Vec<StratumCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellLineCount {
    pub cell_line: String,
    pub profiles: usize,
}

/// Outcome of one batch stage. Only the fields relevant to the stage are set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fetched: Vec<FetchReport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub decompressed: Vec<DecompressReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split: Option<SplitReport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cell_lines: Vec<CellLineCount>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
}

impl StageReport {
    pub fn new(stage: &str) -> Self {
        Self {
            stage: stage.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub protocol_version: String,
    pub stages: Vec<String>,
    pub matrix_formats: Vec<String>,
    pub fetch_schemes: Vec<String>,
    pub deterministic_split: bool,
}
