//! Project table loader.
//!
//! Reads the parcel-to-project assignment CSV and, when present, the
//! project metadata CSV, and left-joins them by `project_id`. Every cell is
//! read as text so keys like `"007"` never turn into numbers.

use std::collections::BTreeMap;
use std::path::Path;

use parcel_map_layers_models::{
    Assignment, Attributes, LayersConfig, ProjectDetails, ProjectMetadata, ProjectRow,
};

use crate::LayerError;
use crate::reconcile::merge_attributes;

/// Column holding the parcel key in the assignment table.
pub const PARCEL_ID_COLUMN: &str = "parcel_id";

/// Column holding the project identifier in both tables.
pub const PROJECT_ID_COLUMN: &str = "project_id";

/// Suffix given to metadata columns that collide with assignment columns.
pub const METADATA_SUFFIX: &str = "_meta";

const NAME_COLUMN: &str = "project_name";
const LINK_COLUMN: &str = "project_link";
const STATUS_COLUMN: &str = "project_status";
const YEAR_COLUMN: &str = "completed_year";

/// Loads the assignment table and joins the metadata table onto it.
///
/// # Errors
///
/// Returns [`LayerError`] if the assignment table is missing or
/// malformed, if the metadata table exists but is malformed, or if the
/// metadata table lists a project more than once.
pub fn load_project_table(config: &LayersConfig) -> Result<Vec<ProjectRow>, LayerError> {
    let assignments = load_assignments(&config.sources.project_parcels)?;
    log::info!(
        "Loaded {} parcel assignments from {}",
        assignments.len(),
        config.sources.project_parcels.display()
    );

    let metadata = match &config.sources.project_list {
        None => Vec::new(),
        Some(path) => match load_metadata(path) {
            Ok(rows) => {
                log::info!("Loaded {} project list rows", rows.len());
                rows
            }
            Err(e) if e.is_not_found() => {
                log::info!("No {} found; projects keep assignment fields only.", path.display());
                Vec::new()
            }
            Err(e) => return Err(e),
        },
    };

    join_metadata(assignments, &metadata)
}

/// Reads the assignment table. Rows missing `parcel_id` or `project_id`
/// are skipped with a warning.
///
/// # Errors
///
/// Returns [`LayerError`] if the file cannot be read, is not valid CSV,
/// or lacks either key column.
pub fn load_assignments(path: &Path) -> Result<Vec<Assignment>, LayerError> {
    let rows = read_table(path, &[PARCEL_ID_COLUMN, PROJECT_ID_COLUMN])?;

    let mut assignments = Vec::with_capacity(rows.len());
    for (line, mut row) in rows.into_iter().enumerate() {
        let (Some(parcel_id), Some(project_id)) = (
            row.remove(PARCEL_ID_COLUMN),
            row.remove(PROJECT_ID_COLUMN),
        ) else {
            log::warn!(
                "{}: skipping row {} without parcel_id/project_id",
                path.display(),
                line + 2
            );
            continue;
        };
        let details = take_details(&mut row);
        assignments.push(Assignment {
            parcel_id,
            project_id,
            details,
            attributes: row,
        });
    }

    Ok(assignments)
}

/// Reads the project metadata table. Rows without `project_id` are
/// skipped with a warning.
///
/// # Errors
///
/// Returns [`LayerError`] if the file cannot be read, is not valid CSV,
/// or lacks the `project_id` column.
pub fn load_metadata(path: &Path) -> Result<Vec<ProjectMetadata>, LayerError> {
    let rows = read_table(path, &[PROJECT_ID_COLUMN])?;

    let mut metadata = Vec::with_capacity(rows.len());
    for (line, mut row) in rows.into_iter().enumerate() {
        let Some(project_id) = row.remove(PROJECT_ID_COLUMN) else {
            log::warn!("{}: skipping row {} without project_id", path.display(), line + 2);
            continue;
        };
        let details = take_details(&mut row);
        metadata.push(ProjectMetadata {
            project_id,
            details,
            attributes: row,
        });
    }

    Ok(metadata)
}

/// Left-joins metadata onto assignments by `project_id`.
///
/// Assignments without metadata are kept with their own fields only.
/// For descriptive fields the metadata value wins when present; extra
/// columns that exist on both sides keep the assignment value under the
/// plain name and the metadata value under a [`METADATA_SUFFIX`] name.
///
/// # Errors
///
/// Returns [`LayerError::DuplicateProject`] if `metadata` lists a
/// `project_id` more than once.
pub fn join_metadata(
    assignments: Vec<Assignment>,
    metadata: &[ProjectMetadata],
) -> Result<Vec<ProjectRow>, LayerError> {
    let mut by_project: BTreeMap<&str, &ProjectMetadata> = BTreeMap::new();
    for row in metadata {
        if by_project.insert(row.project_id.as_str(), row).is_some() {
            return Err(LayerError::DuplicateProject {
                project_id: row.project_id.clone(),
            });
        }
    }

    let mut unmatched = 0usize;
    let rows: Vec<ProjectRow> = assignments
        .into_iter()
        .map(|assignment| {
            let (details, attributes) = match by_project.get(assignment.project_id.as_str()) {
                Some(meta) => (
                    meta.details.clone().or(assignment.details),
                    merge_attributes(&assignment.attributes, &meta.attributes, METADATA_SUFFIX),
                ),
                None => {
                    unmatched += 1;
                    (assignment.details, assignment.attributes)
                }
            };
            ProjectRow {
                parcel_id: assignment.parcel_id,
                project_id: assignment.project_id,
                details,
                attributes,
            }
        })
        .collect();

    if unmatched > 0 && !metadata.is_empty() {
        log::info!("{unmatched} assignment rows have no project list entry");
    }

    Ok(rows)
}

/// Reads a CSV file into one attribute map per row.
///
/// Headers and cells are trimmed and blank cells are dropped. Fails if any
/// of `required` is not a header, or if a row's field count differs from
/// the header's (usually an unquoted comma inside a value).
fn read_table(path: &Path, required: &[&str]) -> Result<Vec<Attributes>, LayerError> {
    let csv_error = |source| LayerError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .from_path(path)
        .map_err(csv_error)?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(csv_error)?
        .iter()
        .map(|h| h.trim().trim_start_matches('\u{feff}').to_owned())
        .collect();

    for column in required {
        if !headers.iter().any(|h| h == column) {
            return Err(LayerError::MissingColumn {
                path: path.to_path_buf(),
                column: (*column).to_string(),
            });
        }
    }

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(csv_error)?;
        let row: Attributes = headers
            .iter()
            .zip(record.iter())
            .filter_map(|(header, value)| {
                let value = value.trim();
                (!value.is_empty()).then(|| (header.clone(), value.to_owned()))
            })
            .collect();
        rows.push(row);
    }

    log::debug!("Parsed {} rows from {}", rows.len(), path.display());

    Ok(rows)
}

/// Lifts the descriptive project columns out of a row.
fn take_details(row: &mut Attributes) -> ProjectDetails {
    ProjectDetails {
        name: row.remove(NAME_COLUMN),
        link: row.remove(LINK_COLUMN),
        status: row.remove(STATUS_COLUMN),
        completed_year: row.remove(YEAR_COLUMN),
    }
}
