#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Parcel/project reconciliation and map layer generation.
//!
//! Loads a citywide parcel dataset (plus an optional custom supplement),
//! joins it against a hand-maintained CSV of development projects, and
//! writes derived `GeoJSON` layers for the web map: per-parcel polygons,
//! per-project convex-hull polygons, per-project centroids, and named
//! status/year subsets of the project layer.
//!
//! Every run reads all inputs fresh and overwrites every output, so the
//! pipeline is idempotent given unchanged inputs.

pub mod build;
pub mod config;
pub mod crs;
pub mod inspect;
pub mod output;
pub mod parcels;
pub mod pipeline;
pub mod projects;
pub mod reconcile;

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while building layers.
#[derive(Debug, Error)]
pub enum LayerError {
    /// Reading or writing a file failed.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        /// File that could not be read or written.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A `GeoJSON` document could not be parsed.
    #[error("GeoJSON error in {}: {source}", .path.display())]
    GeoJson {
        /// Offending file.
        path: PathBuf,
        /// Underlying error.
        source: Box<geojson::Error>,
    },

    /// A CSV file could not be parsed.
    #[error("CSV error in {}: {source}", .path.display())]
    Csv {
        /// Offending file.
        path: PathBuf,
        /// Underlying error.
        source: csv::Error,
    },

    /// Serializing an output layer failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The settings file is not valid TOML for [`LayersConfig`].
    ///
    /// [`LayersConfig`]: parcel_map_layers_models::LayersConfig
    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// The settings are well-formed but inconsistent.
    #[error("Config error: {message}")]
    Config {
        /// Description of what went wrong.
        message: String,
    },

    /// A geometry source uses a coordinate system this tool cannot
    /// convert to WGS84.
    #[error("Unsupported CRS '{crs}' in {}", .path.display())]
    UnsupportedCrs {
        /// Offending file.
        path: PathBuf,
        /// CRS name as found in the file or settings.
        crs: String,
    },

    /// A feature's coordinates could not be converted to WGS84.
    #[error("Cannot reproject feature {index} of {} from {crs}: {source}", .path.display())]
    Reproject {
        /// Offending file.
        path: PathBuf,
        /// Position of the feature in the collection.
        index: usize,
        /// Source system, e.g. `EPSG:2248`.
        crs: String,
        /// Underlying error.
        source: proj4rs::errors::Error,
    },

    /// A CSV file lacks a required column.
    #[error("Missing column '{column}' in {}", .path.display())]
    MissingColumn {
        /// Offending file.
        path: PathBuf,
        /// Name of the missing column.
        column: String,
    },

    /// The project metadata table lists a project more than once, which
    /// would duplicate assignment rows on join.
    #[error("Project '{project_id}' appears more than once in the project list")]
    DuplicateProject {
        /// The repeated identifier.
        project_id: String,
    },
}

impl LayerError {
    /// Whether this error means a file simply does not exist.
    ///
    /// Optional inputs are skipped on this condition only; every other
    /// failure on them is still fatal.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Io { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            Self::Csv { source, .. } => match source.kind() {
                csv::ErrorKind::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
                _ => false,
            },
            _ => false,
        }
    }
}

/// Reads a whole file, attaching the path to any error.
pub(crate) fn read_file(path: &std::path::Path) -> Result<String, LayerError> {
    std::fs::read_to_string(path).map_err(|source| LayerError::Io {
        path: path.to_path_buf(),
        source,
    })
}
