//! Reconciler: inner join of parcel geometries to project rows.
//!
//! Only parcels that have at least one project assignment survive. A parcel
//! assigned to several projects yields one row per assignment.

use std::collections::BTreeMap;

use parcel_map_layers_models::{Attributes, Parcel, ProjectRow, ReconciledRow};

/// Suffix given to project-side attributes that collide with parcel-side
/// attributes.
pub const PROJECT_SUFFIX: &str = "_proj";

/// Inner-joins parcels to project rows on `parcel.key == row.parcel_id`.
///
/// Output order follows parcel load order, then assignment order within a
/// parcel, so "first value wins" aggregation downstream is deterministic.
#[must_use]
pub fn reconcile(parcels: &[Parcel], projects: &[ProjectRow]) -> Vec<ReconciledRow> {
    let mut by_parcel: BTreeMap<&str, Vec<&ProjectRow>> = BTreeMap::new();
    for row in projects {
        by_parcel.entry(row.parcel_id.as_str()).or_default().push(row);
    }

    let rows: Vec<ReconciledRow> = parcels
        .iter()
        .flat_map(|parcel| {
            by_parcel
                .get(parcel.key.as_str())
                .into_iter()
                .flatten()
                .map(move |project| join_row(parcel, project))
        })
        .collect();

    log::info!("Matched {} parcels with projects", rows.len());

    rows
}

fn join_row(parcel: &Parcel, project: &ProjectRow) -> ReconciledRow {
    ReconciledRow {
        parcel_key: parcel.key.clone(),
        parcel_id: project.parcel_id.clone(),
        address: parcel.address.clone(),
        link: parcel.link.clone(),
        source: parcel.source,
        geometry: parcel.geometry.clone(),
        project_id: project.project_id.clone(),
        project: project.details.clone(),
        attributes: merge_attributes(&parcel.attributes, &project.attributes, PROJECT_SUFFIX),
    }
}

/// Merges two attribute maps without losing values.
///
/// Left-side names are kept as-is. A right-side name that already exists on
/// the left is renamed with `suffix` (repeated until the name is free).
#[must_use]
pub fn merge_attributes(left: &Attributes, right: &Attributes, suffix: &str) -> Attributes {
    let mut merged = left.clone();
    for (name, value) in right {
        let mut target = name.clone();
        while merged.contains_key(&target) {
            target.push_str(suffix);
        }
        merged.insert(target, value.clone());
    }
    merged
}
