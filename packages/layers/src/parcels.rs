//! Parcel loader.
//!
//! Reads the citywide parcel `GeoJSON` and the optional custom supplement,
//! reprojects both to WGS84, normalizes the parcel key to a trimmed string,
//! and concatenates them. Custom parcels are purely additive: they never
//! replace a city parcel with the same key.

use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr as _;

use geo::MultiPolygon;
use geojson::{Feature, FeatureCollection, JsonObject, JsonValue};
use parcel_map_layers_models::{Attributes, LayersConfig, Parcel, ParcelFields, ParcelSource};

use crate::LayerError;
use crate::crs::Crs;

/// Reads and parses a `GeoJSON` `FeatureCollection`.
///
/// # Errors
///
/// Returns [`LayerError::Io`] if the file cannot be read and
/// [`LayerError::GeoJson`] if it is not a valid `FeatureCollection`.
pub fn read_collection(path: &Path) -> Result<FeatureCollection, LayerError> {
    let text = crate::read_file(path)?;
    FeatureCollection::from_str(&text).map_err(|source| LayerError::GeoJson {
        path: path.to_path_buf(),
        source: Box::new(source),
    })
}

/// Loads the citywide parcels and, when present, the custom parcels.
///
/// # Errors
///
/// Returns [`LayerError`] if the citywide source is missing or malformed,
/// or if the custom source exists but cannot be loaded. A missing custom
/// source is logged and skipped.
pub fn load_parcels(config: &LayersConfig) -> Result<Vec<Parcel>, LayerError> {
    let sources = &config.sources;

    let mut parcels = load_source(
        &sources.parcels,
        ParcelSource::City,
        &config.fields,
        sources.parcels_crs.as_deref(),
    )?;
    log::info!(
        "Loaded {} city parcels from {}",
        parcels.len(),
        sources.parcels.display()
    );

    let suffixed = parcels
        .iter()
        .filter(|p| p.key.ends_with(&config.custom_suffix))
        .count();
    if suffixed > 0 {
        log::warn!(
            "{suffixed} city parcels have keys ending in '{}'; they are still treated as city parcels",
            config.custom_suffix
        );
    }

    if let Some(custom_path) = &sources.custom_parcels {
        load_custom(custom_path, config, &mut parcels)?;
    } else {
        log::info!("No custom parcel source configured; skipping custom geometries.");
    }

    warn_duplicate_keys(&parcels);

    Ok(parcels)
}

/// Appends the custom parcels at `path`, tolerating a missing file.
fn load_custom(
    path: &Path,
    config: &LayersConfig,
    parcels: &mut Vec<Parcel>,
) -> Result<(), LayerError> {
    match load_source(
        path,
        ParcelSource::Custom,
        &config.fields,
        config.sources.custom_parcels_crs.as_deref(),
    ) {
        Ok(custom) => {
            let unsuffixed = custom
                .iter()
                .filter(|p| !p.key.ends_with(&config.custom_suffix))
                .count();
            if unsuffixed > 0 {
                log::warn!(
                    "{unsuffixed} custom parcels have keys not ending in '{}'",
                    config.custom_suffix
                );
            }
            log::info!("Loaded {} custom parcel geometries", custom.len());
            parcels.extend(custom);
        }
        Err(e) if e.is_not_found() => {
            log::info!("No {} found; skipping custom geometries.", path.display());
        }
        Err(e) => return Err(e),
    }

    Ok(())
}

/// Logs keys shared by more than one parcel. Each copy still joins to the
/// key's project rows.
fn warn_duplicate_keys(parcels: &[Parcel]) {
    let mut seen = BTreeSet::new();
    let duplicates: BTreeSet<&str> = parcels
        .iter()
        .map(|p| p.key.as_str())
        .filter(|key| !seen.insert(*key))
        .collect();

    if !duplicates.is_empty() {
        log::warn!(
            "{} parcel keys appear more than once: {}",
            duplicates.len(),
            duplicates.into_iter().collect::<Vec<_>>().join(", ")
        );
    }
}

/// Loads one parcel `GeoJSON` file.
///
/// Features without a usable key or without polygonal geometry are
/// skipped with a warning.
///
/// # Errors
///
/// Returns [`LayerError`] if the file cannot be read or parsed, if its
/// CRS is not supported, or if a feature cannot be reprojected.
pub fn load_source(
    path: &Path,
    source: ParcelSource,
    fields: &ParcelFields,
    crs_fallback: Option<&str>,
) -> Result<Vec<Parcel>, LayerError> {
    let collection = read_collection(path)?;
    let crs = Crs::detect(collection.foreign_members.as_ref(), crs_fallback, path)?;
    log::debug!("{}: {crs}, {} features", path.display(), collection.features.len());

    let total = collection.features.len();
    let mut parcels = Vec::with_capacity(total);
    for (index, feature) in collection.features.into_iter().enumerate() {
        let Some(mut parcel) = normalize_feature(feature, source, fields) else {
            log::warn!(
                "{}: skipping feature {index} (missing '{}' or non-polygon geometry)",
                path.display(),
                fields.key
            );
            continue;
        };
        crs.reproject(&mut parcel.geometry)
            .map_err(|source| LayerError::Reproject {
                path: path.to_path_buf(),
                index,
                crs: crs.to_string(),
                source,
            })?;
        parcels.push(parcel);
    }

    if parcels.len() < total {
        log::info!(
            "{}: kept {} of {total} features",
            path.display(),
            parcels.len()
        );
    }

    Ok(parcels)
}

/// Converts one feature into a [`Parcel`].
fn normalize_feature(
    feature: Feature,
    source: ParcelSource,
    fields: &ParcelFields,
) -> Option<Parcel> {
    let props = feature.properties.unwrap_or_default();
    let key = props.get(&fields.key).and_then(property_text)?;

    let geometry = match geo::Geometry::<f64>::try_from(feature.geometry?).ok()? {
        geo::Geometry::Polygon(p) => MultiPolygon(vec![p]),
        geo::Geometry::MultiPolygon(mp) => mp,
        _ => return None,
    };

    Some(Parcel {
        key,
        address: props.get(&fields.address).and_then(property_text),
        link: props.get(&fields.link).and_then(property_text),
        source,
        geometry,
        attributes: stringify_properties(&props, fields),
    })
}

/// Renders a property value as trimmed text.
///
/// Numbers keep their JSON spelling, so `7` becomes `"7"` while the string
/// `"007"` stays `"007"`. Null and blank strings are treated as missing.
#[must_use]
pub fn property_text(value: &JsonValue) -> Option<String> {
    let text = match value {
        JsonValue::Null => return None,
        JsonValue::String(s) => s.trim().to_string(),
        other => other.to_string(),
    };
    if text.is_empty() { None } else { Some(text) }
}

/// Stringifies every property except the ones already lifted onto
/// [`Parcel`] fields.
fn stringify_properties(props: &JsonObject, fields: &ParcelFields) -> Attributes {
    props
        .iter()
        .filter(|(name, _)| {
            **name != fields.key && **name != fields.address && **name != fields.link
        })
        .filter_map(|(name, value)| property_text(value).map(|text| (name.clone(), text)))
        .collect()
}
