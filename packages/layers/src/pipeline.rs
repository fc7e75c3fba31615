//! End-to-end layer generation.
//!
//! Loads every input, reconciles, builds every configured layer in memory,
//! and only then writes outputs. A failure anywhere before the write phase
//! leaves existing output files untouched.

use std::path::PathBuf;

use parcel_map_layers_models::LayersConfig;

use crate::LayerError;
use crate::build::{self, LayerFeature};

/// A layer written by [`run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSummary {
    /// Layer name used in log output.
    pub name: String,
    /// File the layer was written to.
    pub path: PathBuf,
    /// Number of features written.
    pub features: usize,
}

/// Runs the full pipeline for `config`.
///
/// # Errors
///
/// Returns [`LayerError`] if the settings are invalid, a required input is
/// missing or malformed, the metadata join finds a duplicated project, or
/// an output cannot be written.
pub fn run(config: &LayersConfig) -> Result<Vec<LayerSummary>, LayerError> {
    crate::config::validate(config)?;

    let parcels = crate::parcels::load_parcels(config)?;
    let projects = crate::projects::load_project_table(config)?;
    log::info!(
        "Loaded {} parcels, {} project parcel rows",
        parcels.len(),
        projects.len()
    );

    let rows = crate::reconcile::reconcile(&parcels, &projects);

    let mut layers: Vec<(String, PathBuf, Vec<LayerFeature>)> = Vec::new();

    if let Some(path) = &config.outputs.parcels {
        let features = build::build_parcel_layer(&rows, config);
        layers.push(("parcels".to_string(), path.clone(), features));
    }

    let project_features = build::build_project_layer(&rows, config);
    let centroids = config.outputs.centroids.as_ref().map(|path| {
        let features = build::build_centroid_layer(&project_features);
        ("centroids".to_string(), path.clone(), features)
    });
    let splits: Vec<_> = config
        .splits
        .iter()
        .map(|split| {
            let features = build::split_layer(&project_features, split);
            (split.name.clone(), split.output.clone(), features)
        })
        .collect();

    layers.push((
        "projects".to_string(),
        config.outputs.projects.clone(),
        project_features,
    ));
    layers.extend(centroids);
    layers.extend(splits);

    let mut summaries = Vec::with_capacity(layers.len());
    for (name, path, features) in layers {
        crate::output::write_layer(&path, &features)?;
        log::info!(
            "Wrote {} with {} {name} features",
            path.display(),
            features.len()
        );
        summaries.push(LayerSummary {
            name,
            path,
            features: features.len(),
        });
    }

    log::info!("Complete");
    Ok(summaries)
}
