//! Settings loading.
//!
//! A run is configured by a TOML file deserialized into [`LayersConfig`].
//! Relative paths in the file are resolved against the file's directory,
//! so a settings file and its `data_local/` tree can move together.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use parcel_map_layers_models::LayersConfig;

use crate::LayerError;

/// Settings file picked up from the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "layers.toml";

/// Parses settings from a TOML string and validates them.
///
/// # Errors
///
/// Returns [`LayerError::Toml`] for malformed TOML or unknown keys, and
/// [`LayerError::Config`] for inconsistent values.
pub fn from_toml_str(s: &str) -> Result<LayersConfig, LayerError> {
    let config: LayersConfig = toml::de::from_str(s)?;
    validate(&config)?;
    Ok(config)
}

/// Reads settings from `path` and resolves relative paths against the
/// file's directory.
///
/// # Errors
///
/// Returns [`LayerError`] if the file cannot be read, parsed, or
/// validated.
pub fn load(path: &Path) -> Result<LayersConfig, LayerError> {
    let text = crate::read_file(path)?;
    let config = from_toml_str(&text)?;
    let base = path.parent().unwrap_or_else(|| Path::new(""));
    log::info!("Loaded settings from {}", path.display());
    Ok(resolve(config, base))
}

/// Loads `path` if given, else [`DEFAULT_CONFIG_FILE`] if it exists, else
/// the built-in defaults.
///
/// # Errors
///
/// Returns [`LayerError`] if an explicitly given file cannot be loaded, or
/// if the default file exists but is invalid.
pub fn load_or_default(path: Option<&Path>) -> Result<LayersConfig, LayerError> {
    if let Some(path) = path {
        return load(path);
    }

    let default_path = Path::new(DEFAULT_CONFIG_FILE);
    if default_path.exists() {
        return load(default_path);
    }

    log::info!("No {DEFAULT_CONFIG_FILE} found; using built-in defaults");
    Ok(LayersConfig::default())
}

/// Rewrites every relative input and output path to be relative to `base`.
#[must_use]
pub fn resolve(mut config: LayersConfig, base: &Path) -> LayersConfig {
    let join = |p: &mut PathBuf| {
        if p.is_relative() {
            *p = base.join(&*p);
        }
    };

    let sources = &mut config.sources;
    join(&mut sources.parcels);
    join(&mut sources.project_parcels);
    sources.custom_parcels.iter_mut().for_each(join);
    sources.project_list.iter_mut().for_each(join);

    let outputs = &mut config.outputs;
    join(&mut outputs.projects);
    outputs.parcels.iter_mut().for_each(join);
    outputs.centroids.iter_mut().for_each(join);

    for split in &mut config.splits {
        join(&mut split.output);
    }

    config
}

/// Checks settings that TOML deserialization cannot.
///
/// # Errors
///
/// Returns [`LayerError::Config`] describing the first problem found.
pub fn validate(config: &LayersConfig) -> Result<(), LayerError> {
    let fail = |message: String| Err(LayerError::Config { message });

    if !config.simplify_tolerance.is_finite() || config.simplify_tolerance < 0.0 {
        return fail(format!(
            "simplify_tolerance must be a non-negative number, got {}",
            config.simplify_tolerance
        ));
    }

    if config.custom_suffix.is_empty() {
        return fail("custom_suffix must not be empty".to_string());
    }

    let mut outputs = BTreeSet::new();
    outputs.insert(&config.outputs.projects);
    for (layer, path) in [
        ("parcels", &config.outputs.parcels),
        ("centroids", &config.outputs.centroids),
    ] {
        if let Some(path) = path
            && !outputs.insert(path)
        {
            return fail(format!(
                "{layer} layer writes to {}, which another layer already uses",
                path.display()
            ));
        }
    }

    let mut names = BTreeSet::new();
    for split in &config.splits {
        if split.name.trim().is_empty() {
            return fail("split name must not be empty".to_string());
        }
        if split.status.trim().is_empty() {
            return fail(format!("split '{}' has an empty status", split.name));
        }
        if !names.insert(split.name.as_str()) {
            return fail(format!("split '{}' is defined more than once", split.name));
        }
        if !outputs.insert(&split.output) {
            return fail(format!(
                "split '{}' writes to {}, which another layer already uses",
                split.name,
                split.output.display()
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
custom_suffix = "CUST"
simplify_tolerance = 0.0001
extra_properties = ["ZONING"]

[sources]
parcels = "data_local/parcels.geojson"
parcels_crs = "EPSG:3857"
project_parcels = "data_local/project_parcels.csv"

[outputs]
projects = "data/projects_polys.geojson"
centroids = "data/projects_points.geojson"

[[splits]]
name = "under_construction"
output = "data/projects_under_construction.geojson"
status = "Under Construction"

[[splits]]
name = "completed_2025"
output = "data/projects_completed_2025.geojson"
status = "Completed"
completed_year = "2025"
"#;

    #[test]
    fn parses_sample_settings() {
        let config = from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.sources.parcels_crs.as_deref(), Some("EPSG:3857"));
        assert_eq!(config.extra_properties, vec!["ZONING".to_string()]);
        assert_eq!(config.splits.len(), 2);
        assert_eq!(config.splits[1].completed_year.as_deref(), Some("2025"));
        // Unspecified sections keep their defaults.
        assert_eq!(config.fields.key, "PIN");
        assert!(config.sources.custom_parcels.is_some());
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = from_toml_str("simplify_tolerence = 1.0").unwrap_err();
        assert!(matches!(err, LayerError::Toml(_)));
    }

    #[test]
    fn rejects_negative_tolerance() {
        let err = from_toml_str("simplify_tolerance = -1.0").unwrap_err();
        assert!(matches!(err, LayerError::Config { .. }));
    }

    #[test]
    fn rejects_duplicate_split_names() {
        let toml = r#"
[[splits]]
name = "a"
output = "a.geojson"
status = "Completed"

[[splits]]
name = "a"
output = "b.geojson"
status = "Planned"
"#;
        let err = from_toml_str(toml).unwrap_err();
        assert!(matches!(err, LayerError::Config { message } if message.contains("more than once")));
    }

    #[test]
    fn rejects_split_overwriting_project_layer() {
        let toml = r#"
[[splits]]
name = "a"
output = "data/projects_polys.geojson"
status = "Completed"
"#;
        let err = from_toml_str(toml).unwrap_err();
        assert!(matches!(err, LayerError::Config { .. }));
    }

    #[test]
    fn rejects_centroids_overwriting_project_layer() {
        let toml = r#"
[outputs]
projects = "data/projects.geojson"
centroids = "data/projects.geojson"
"#;
        let err = from_toml_str(toml).unwrap_err();
        assert!(
            matches!(err, LayerError::Config { message } if message.starts_with("centroids layer"))
        );
    }

    #[test]
    fn rejects_parcels_overwriting_centroids() {
        let toml = r#"
[outputs]
parcels = "data/points.geojson"
centroids = "data/points.geojson"
"#;
        let err = from_toml_str(toml).unwrap_err();
        assert!(matches!(err, LayerError::Config { .. }));
    }

    #[test]
    fn rejects_split_overwriting_parcel_layer() {
        let toml = r#"
[[splits]]
name = "a"
output = "data/projects_parcels.geojson"
status = "Completed"
"#;
        let err = from_toml_str(toml).unwrap_err();
        assert!(matches!(err, LayerError::Config { message } if message.starts_with("split 'a'")));
    }

    #[test]
    fn resolves_relative_paths_against_base() {
        let config = resolve(from_toml_str(SAMPLE).unwrap(), Path::new("/srv/map"));
        assert_eq!(
            config.sources.parcels,
            PathBuf::from("/srv/map/data_local/parcels.geojson")
        );
        assert_eq!(
            config.outputs.centroids,
            Some(PathBuf::from("/srv/map/data/projects_points.geojson"))
        );
        assert_eq!(
            config.splits[0].output,
            PathBuf::from("/srv/map/data/projects_under_construction.geojson")
        );
    }

    #[test]
    fn load_reads_file_and_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layers.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = load(&path).unwrap();
        assert_eq!(
            config.sources.project_parcels,
            dir.path().join("data_local/project_parcels.csv")
        );
    }
}
