//! `GeoJSON` layer writer.
//!
//! Output files are always rewritten in full. Property maps are ordered, so
//! unchanged inputs produce byte-identical files.

use std::path::Path;

use geojson::{Feature, FeatureCollection, JsonObject, JsonValue};

use crate::LayerError;
use crate::build::LayerFeature;

/// Converts layer features into a `FeatureCollection` tagged as WGS84.
#[must_use]
pub fn to_feature_collection(features: &[LayerFeature]) -> FeatureCollection {
    let mut foreign_members = JsonObject::new();
    foreign_members.insert("crs".to_string(), crate::crs::wgs84_member());

    FeatureCollection {
        bbox: None,
        features: features.iter().map(to_feature).collect(),
        foreign_members: Some(foreign_members),
    }
}

fn to_feature(feature: &LayerFeature) -> Feature {
    let properties: JsonObject = feature
        .properties
        .iter()
        .map(|(name, value)| {
            let value = value.clone().map_or(JsonValue::Null, JsonValue::String);
            (name.clone(), value)
        })
        .collect();

    Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::from(&feature.geometry)),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

/// Writes a layer to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`LayerError`] if serialization fails or the file cannot be
/// written.
pub fn write_layer(path: &Path, features: &[LayerFeature]) -> Result<(), LayerError> {
    let io_error = |source| LayerError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent).map_err(io_error)?;
    }

    let collection = to_feature_collection(features);
    let mut body = serde_json::to_string(&collection)?;
    body.push('\n');
    std::fs::write(path, body).map_err(io_error)?;

    log::debug!("Wrote {} features to {}", features.len(), path.display());
    Ok(())
}
