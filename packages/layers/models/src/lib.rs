#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Parcel, project, and layer settings types.
//!
//! These types describe the data flowing through the layer pipeline:
//! parcel geometries loaded from `GeoJSON`, parcel-to-project assignments
//! and project metadata loaded from CSV, the reconciled rows produced by
//! joining the two, and the settings object that replaces hard-coded file
//! paths.

use std::collections::BTreeMap;
use std::path::PathBuf;

use geo::MultiPolygon;
use serde::{Deserialize, Serialize};

/// Free-form string attributes keyed by column or property name.
///
/// A missing key means the value is null. Empty CSV cells and JSON `null`
/// never appear as values.
pub type Attributes = BTreeMap<String, String>;

/// Where a parcel geometry came from.
///
/// Set once at load time and carried through every join, so that layer
/// builders can route custom geometries without inspecting key strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParcelSource {
    /// The citywide parcel dataset.
    City,
    /// The hand-authored override/supplement dataset.
    Custom,
}

/// A parcel geometry with its normalized key.
#[derive(Debug, Clone, PartialEq)]
pub struct Parcel {
    /// Trimmed string key (`PIN`).
    pub key: String,
    /// Human-readable mailing address.
    pub address: Option<String>,
    /// Link to the external parcel detail page.
    pub link: Option<String>,
    /// Which dataset the parcel was loaded from.
    pub source: ParcelSource,
    /// Parcel boundary in WGS84. Single polygons are wrapped.
    pub geometry: MultiPolygon<f64>,
    /// Every other feature property, stringified.
    pub attributes: Attributes,
}

impl Parcel {
    /// Whether this parcel came from the custom override dataset.
    #[must_use]
    pub fn is_custom(&self) -> bool {
        self.source == ParcelSource::Custom
    }
}

/// Descriptive project fields shared by assignments, metadata rows, and
/// reconciled rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDetails {
    /// Display name of the project.
    pub name: Option<String>,
    /// Link to the project's detail page.
    pub link: Option<String>,
    /// Status label, e.g. "Under Construction" or "Completed".
    pub status: Option<String>,
    /// Year the project was completed, kept as text.
    pub completed_year: Option<String>,
}

impl ProjectDetails {
    /// Returns `self` with every missing field filled from `fallback`.
    #[must_use]
    pub fn or(self, fallback: Self) -> Self {
        Self {
            name: self.name.or(fallback.name),
            link: self.link.or(fallback.link),
            status: self.status.or(fallback.status),
            completed_year: self.completed_year.or(fallback.completed_year),
        }
    }

    /// Fills each missing field from `other` without replacing values
    /// already present. Used for first-non-null aggregation.
    pub fn fill_missing(&mut self, other: &Self) {
        if self.name.is_none() {
            self.name.clone_from(&other.name);
        }
        if self.link.is_none() {
            self.link.clone_from(&other.link);
        }
        if self.status.is_none() {
            self.status.clone_from(&other.status);
        }
        if self.completed_year.is_none() {
            self.completed_year.clone_from(&other.completed_year);
        }
    }
}

/// One row of the parcel-to-project assignment table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    /// Parcel key this row assigns.
    pub parcel_id: String,
    /// Project the parcel belongs to.
    pub project_id: String,
    /// Project fields present directly in the assignment table.
    pub details: ProjectDetails,
    /// Remaining columns.
    pub attributes: Attributes,
}

/// One row of the project metadata table. `project_id` is unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectMetadata {
    /// Project identifier.
    pub project_id: String,
    /// Descriptive fields.
    pub details: ProjectDetails,
    /// Remaining columns.
    pub attributes: Attributes,
}

/// An assignment left-joined with its project metadata (if any).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRow {
    /// Parcel key this row assigns.
    pub parcel_id: String,
    /// Project the parcel belongs to.
    pub project_id: String,
    /// Metadata fields, falling back to the assignment's own values.
    pub details: ProjectDetails,
    /// Combined extra columns from both tables.
    pub attributes: Attributes,
}

/// A parcel joined to one of its project rows.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledRow {
    /// Key of the parcel side.
    pub parcel_key: String,
    /// `parcel_id` of the project side. Always equal to `parcel_key`.
    pub parcel_id: String,
    /// Parcel mailing address.
    pub address: Option<String>,
    /// Parcel detail link.
    pub link: Option<String>,
    /// Which dataset the parcel geometry came from.
    pub source: ParcelSource,
    /// Parcel geometry in WGS84.
    pub geometry: MultiPolygon<f64>,
    /// Project identifier.
    pub project_id: String,
    /// Project descriptive fields.
    pub project: ProjectDetails,
    /// Parcel and project attributes merged with collision suffixes.
    pub attributes: Attributes,
}

impl ReconciledRow {
    /// Whether this row's geometry should bypass dissolve/convex hull.
    #[must_use]
    pub fn is_custom(&self) -> bool {
        self.source == ParcelSource::Custom
    }
}

/// Settings for one pipeline run.
///
/// Every field has a default, so an empty TOML document is a valid
/// configuration that reproduces the stock file layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayersConfig {
    /// Input file locations.
    pub sources: SourcePaths,
    /// Parcel property names.
    pub fields: ParcelFields,
    /// Output file locations.
    pub outputs: OutputPaths,
    /// Key suffix that marks hand-authored custom parcels.
    pub custom_suffix: String,
    /// Simplification tolerance in degrees.
    pub simplify_tolerance: f64,
    /// Additional reconciled attributes copied into every output layer.
    pub extra_properties: Vec<String>,
    /// Named subsets of the per-project layer.
    pub splits: Vec<SplitConfig>,
}

impl Default for LayersConfig {
    fn default() -> Self {
        Self {
            sources: SourcePaths::default(),
            fields: ParcelFields::default(),
            outputs: OutputPaths::default(),
            custom_suffix: "CUST".to_string(),
            simplify_tolerance: 0.000_05,
            extra_properties: Vec::new(),
            splits: Vec::new(),
        }
    }
}

/// Input file locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourcePaths {
    /// Citywide parcel `GeoJSON`. Required.
    pub parcels: PathBuf,
    /// CRS to assume when the parcel file has no `crs` member.
    pub parcels_crs: Option<String>,
    /// Custom parcel `GeoJSON`. Skipped when absent on disk.
    pub custom_parcels: Option<PathBuf>,
    /// CRS to assume when the custom parcel file has no `crs` member.
    pub custom_parcels_crs: Option<String>,
    /// Parcel-to-project assignment CSV. Required.
    pub project_parcels: PathBuf,
    /// Project metadata CSV. Skipped when absent on disk.
    pub project_list: Option<PathBuf>,
}

impl Default for SourcePaths {
    fn default() -> Self {
        Self {
            parcels: PathBuf::from("data_local/parcels_citywide.geojson"),
            parcels_crs: None,
            custom_parcels: Some(PathBuf::from("data_local/custom_parcels.geojson")),
            custom_parcels_crs: None,
            project_parcels: PathBuf::from("data_local/project_parcels.csv"),
            project_list: Some(PathBuf::from("data_local/project_list.csv")),
        }
    }
}

/// Parcel property names in the source `GeoJSON`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParcelFields {
    /// Unique parcel key.
    pub key: String,
    /// Readable mailing address.
    pub address: String,
    /// Link to the parcel detail page.
    pub link: String,
}

impl Default for ParcelFields {
    fn default() -> Self {
        Self {
            key: "PIN".to_string(),
            address: "MAILTOADD".to_string(),
            link: "SDATLINK".to_string(),
        }
    }
}

/// Output file locations. Each file is overwritten in full on every run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputPaths {
    /// Per-parcel polygon layer.
    pub parcels: Option<PathBuf>,
    /// Per-project polygon layer.
    pub projects: PathBuf,
    /// Per-project centroid point layer.
    pub centroids: Option<PathBuf>,
}

impl Default for OutputPaths {
    fn default() -> Self {
        Self {
            parcels: Some(PathBuf::from("data/projects_parcels.geojson")),
            projects: PathBuf::from("data/projects_polys.geojson"),
            centroids: None,
        }
    }
}

/// A named subset of the per-project layer, selected by status and
/// optionally by completion year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SplitConfig {
    /// Unique subset name used in log output.
    pub name: String,
    /// Where the subset is written.
    pub output: PathBuf,
    /// Required `project_status` value.
    pub status: String,
    /// Required `completed_year` value, if any.
    pub completed_year: Option<String>,
}

impl SplitConfig {
    /// Whether a project with the given status and year belongs to this
    /// subset. Comparison is exact; a missing status never matches.
    #[must_use]
    pub fn matches(&self, status: Option<&str>, completed_year: Option<&str>) -> bool {
        if status != Some(self.status.as_str()) {
            return false;
        }
        match &self.completed_year {
            Some(year) => completed_year == Some(year.as_str()),
            None => true,
        }
    }
}
