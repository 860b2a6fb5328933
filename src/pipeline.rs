//! Fixed-order batch stages and their reports.

use crate::align::align;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::fetch::{decompress_gzip, fetch_with_progress};
use crate::matrix_io;
use crate::normalize::normalize;
use crate::persist::{
    output_file_name, persist, SplitSide, TabularExport, CELL_PAINTING_PREFIX, EXPRESSION_PREFIX,
};
use crate::split::{split_rows, RowSelect, SplitIndices};
use crate::subset::{landmark_gene_ids, landmark_row_indices, subset_genes, subset_instances, LandmarkFilter};
use crate::table::Table;
use kheper_protocol::{Capabilities, CellLineCount, SplitReport, StageReport, PROTOCOL_VERSION};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Download,
    Decompress,
    ProcessCellPainting,
    ProcessExpression,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Download,
        Stage::Decompress,
        Stage::ProcessCellPainting,
        Stage::ProcessExpression,
    ];

    /// The stages `run` executes: everything after the downloads are in place.
    pub const PROCESSING: [Stage; 2] = [Stage::ProcessCellPainting, Stage::ProcessExpression];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Download => "download",
            Stage::Decompress => "decompress",
            Stage::ProcessCellPainting => "process-cell-painting",
            Stage::ProcessExpression => "process-expression",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|stage| stage.name() == name)
    }
}

pub fn capabilities() -> Capabilities {
    Capabilities {
        protocol_version: PROTOCOL_VERSION.to_string(),
        stages: Stage::ALL.iter().map(|s| s.name().to_string()).collect(),
        matrix_formats: matrix_io::supported_formats(),
        fetch_schemes: vec![
            "http".to_string(),
            "https".to_string(),
            "file".to_string(),
        ],
        deterministic_split: true,
    }
}

pub fn apply(stage: Stage, config: &PipelineConfig) -> Result<StageReport> {
    log::info!("Starting stage '{}'", stage.name());
    let result = match stage {
        Stage::Download => download(config),
        Stage::Decompress => decompress(config),
        Stage::ProcessCellPainting => process_cell_painting(config),
        Stage::ProcessExpression => process_expression(config),
    };
    result.map_err(|e| e.in_stage(stage.name()))
}

/// Runs `stages` in order, stopping at the first failure.
pub fn run_stages(stages: &[Stage], config: &PipelineConfig) -> Result<Vec<StageReport>> {
    stages.iter().map(|&stage| apply(stage, config)).collect()
}

fn log_progress(name: &str) -> impl FnMut(u64, Option<u64>) + '_ {
    let mut last_decile = None;
    move |done, total| {
        let Some(total) = total.filter(|t| *t > 0) else {
            return;
        };
        let decile = (done.saturating_mul(10) / total).min(10);
        if last_decile != Some(decile) {
            last_decile = Some(decile);
            log::info!("{name}: {}% ({done}/{total} bytes)", decile * 10);
        }
    }
}

pub fn download(config: &PipelineConfig) -> Result<StageReport> {
    let mut report = StageReport::new(Stage::Download.name());
    let folder = Path::new(&config.data_dir);
    for name in config.resources.file_names() {
        let mut progress = log_progress(&name);
        let fetched = fetch_with_progress(&config.resources.base_url, &name, folder, true, &mut progress)?;
        report.fetched.push(fetched);
    }
    Ok(report)
}

/// Gunzips the downloaded matrix in place.
pub fn decompress(config: &PipelineConfig) -> Result<StageReport> {
    let mut report = StageReport::new(Stage::Decompress.name());
    let path = config.data_path(&config.resources.matrix_file);
    report.decompressed.push(decompress_gzip(&path)?);
    Ok(report)
}

/// Reads the Cell Painting profiles and applies the metadata corrections.
pub fn load_cell_painting(config: &PipelineConfig) -> Result<Table> {
    let path = config.data_path(&config.cell_painting_profiles);
    let profiles = Table::read(&path)?;
    log::info!(
        "Loaded {} Cell Painting profiles x {} columns",
        profiles.len(),
        profiles.columns().len()
    );
    Ok(normalize(profiles, &config.corrections()))
}

fn write_split<T: RowSelect + TabularExport>(
    config: &PipelineConfig,
    prefix: &str,
    dataset: &T,
    labels: &[String],
) -> Result<SplitReport> {
    let (train, test, indices): (T, T, SplitIndices) =
        split_rows(dataset, labels, config.test_fraction, config.seed)?;
    let train_path = config.data_path(&output_file_name(prefix, SplitSide::Train));
    let test_path = config.data_path(&output_file_name(prefix, SplitSide::Test));
    persist(&train, &train_path)?;
    persist(&test, &test_path)?;
    Ok(SplitReport {
        modality: prefix.to_string(),
        test_fraction: config.test_fraction,
        seed: config.seed,
        input_rows: dataset.row_count(),
        train_rows: train.row_count(),
        test_rows: test.row_count(),
        train_path: train_path.display().to_string(),
        test_path: test_path.display().to_string(),
        strata: indices.strata().to_vec(),
    })
}

pub fn process_cell_painting(config: &PipelineConfig) -> Result<StageReport> {
    let mut report = StageReport::new(Stage::ProcessCellPainting.name());
    let profiles = load_cell_painting(config)?;
    let labels = profiles
        .column_values(&config.profiles.pert_id)?
        .into_iter()
        .map(str::to_string)
        .collect::<Vec<_>>();
    report.split = Some(write_split(config, CELL_PAINTING_PREFIX, &profiles, &labels)?);

    if let Some(annotations) = &config.cell_painting_annotations {
        let table = Table::read(&config.data_path(annotations))?;
        for (cell_line, profiles) in table.value_counts(&config.annotation_cell_line_column)? {
            log::info!("Cell Painting annotation: {cell_line} has {profiles} profiles");
            report.cell_lines.push(CellLineCount { cell_line, profiles });
        }
    }
    Ok(report)
}

pub fn process_expression(config: &PipelineConfig) -> Result<StageReport> {
    let mut report = StageReport::new(Stage::ProcessExpression.name());
    let filter = LandmarkFilter::from_config(config);

    let genes = Table::read(&config.data_path(&config.gene_info_file))?;
    let landmarks = landmark_gene_ids(&genes, &filter)?;

    // first pass: gene axis only, to find the landmark rows
    let matrix_path = config.data_path(&config.expression_matrix);
    let row_ids = matrix_io::read_row_ids(&matrix_path)?;
    let rows = landmark_row_indices(&row_ids, &landmarks);
    if rows.is_empty() {
        return Err(PipelineError::schema(format!(
            "None of the {} landmark genes occur in '{}'",
            landmarks.len(),
            matrix_path.display()
        )));
    }

    let profiles = load_cell_painting(config)?;
    let allowed = profiles
        .column_values(&config.profiles.pert_id)?
        .into_iter()
        .map(str::to_string)
        .collect::<HashSet<_>>();
    let instances = Table::read(&config.data_path(&config.inst_info_file))?;
    let instances = subset_instances(
        instances,
        &allowed,
        &config.target_cell_line,
        &config.instances,
    )?;
    if instances.is_empty() {
        return Err(PipelineError::insufficient_data(format!(
            "No '{}' instances share a perturbation with the Cell Painting profiles",
            config.target_cell_line
        )));
    }

    // second pass: landmark rows for the selected instances only
    let instance_ids = instances
        .column_values(&config.instances.inst_id)?
        .into_iter()
        .map(str::to_string)
        .collect::<Vec<_>>();
    let matrix = matrix_io::read_rows(&matrix_path, &rows, Some(instance_ids.as_slice()))?;
    let matrix = subset_genes(matrix, &genes, &filter)?;

    let aligned = align(
        &matrix,
        &instances,
        &config.instances.inst_id,
        &config.instances.pert_id,
    )?;
    let labels = aligned.labels().to_vec();
    report.split = Some(write_split(config, EXPRESSION_PREFIX, &aligned, &labels)?);
    report.messages.push(format!(
        "{} landmark genes x {} instances",
        aligned.gene_ids().len(),
        aligned.len()
    ));
    Ok(report)
}
