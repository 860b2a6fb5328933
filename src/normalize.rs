use crate::config::ProfileColumns;
use crate::table::Table;
use serde::{Deserialize, Serialize};

pub const VEHICLE_CONTROL: &str = "DMSO";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnAssignment {
    pub column: String,
    pub value: String,
}

/// Overwrites `assignments` on every row whose `match_column` equals
/// `match_value` exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataCorrection {
    pub match_column: String,
    pub match_value: String,
    pub assignments: Vec<ColumnAssignment>,
}

impl MetadataCorrection {
    pub fn new(match_column: &str, match_value: &str, assignments: &[(&str, &str)]) -> Self {
        Self {
            match_column: match_column.to_string(),
            match_value: match_value.to_string(),
            assignments: assignments
                .iter()
                .map(|(column, value)| ColumnAssignment {
                    column: column.to_string(),
                    value: value.to_string(),
                })
                .collect(),
        }
    }
}

/// Known gaps in the 2016 A549 Cell Painting batch: two compounds lack their
/// display name, and vehicle wells carry no perturbation id.
pub fn default_corrections(columns: &ProfileColumns) -> Vec<MetadataCorrection> {
    vec![
        MetadataCorrection::new(
            &columns.pert_id,
            "BRD-K60230970",
            &[(columns.pert_name.as_str(), "MG-132")],
        ),
        MetadataCorrection::new(
            &columns.pert_id,
            "BRD-K50691590",
            &[(columns.pert_name.as_str(), "bortezomib")],
        ),
        MetadataCorrection::new(
            &columns.broad_sample,
            VEHICLE_CONTROL,
            &[
                (columns.pert_name.as_str(), VEHICLE_CONTROL),
                (columns.pert_id.as_str(), VEHICLE_CONTROL),
            ],
        ),
    ]
}

/// Applies `corrections` in order. Never fails: a correction whose match
/// column is absent matches nothing, and a target column absent from the table
/// is added (empty for untouched rows) once some row matches.
pub fn normalize(mut table: Table, corrections: &[MetadataCorrection]) -> Table {
    for correction in corrections {
        let Ok(match_idx) = table.column_index(&correction.match_column) else {
            log::debug!(
                "Correction on '{}' skipped: column not present",
                correction.match_column
            );
            continue;
        };
        let matching = (0..table.len())
            .filter(|&row| table.cell(row, match_idx) == Some(correction.match_value.as_str()))
            .collect::<Vec<_>>();
        if matching.is_empty() {
            continue;
        }
        for assignment in &correction.assignments {
            if !table.has_column(&assignment.column) {
                log::debug!("Adding column '{}' for metadata correction", assignment.column);
            }
            let target = table.ensure_column(&assignment.column, "");
            for &row in &matching {
                table.set_cell(row, target, &assignment.value);
            }
        }
        log::info!(
            "Corrected {} row(s) where {} == '{}'",
            matching.len(),
            correction.match_column,
            correction.match_value
        );
    }
    table
}
