//! Quick look at a parcel `GeoJSON` source: declared CRS, property
//! columns, and one example feature. Used to pick the key and display
//! field names before writing a settings file.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use geojson::JsonObject;

use crate::LayerError;

/// Summary of a `GeoJSON` source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSummary {
    /// File that was inspected.
    pub path: PathBuf,
    /// CRS name from the file's `crs` member, if it has one.
    pub crs: Option<String>,
    /// Number of features.
    pub features: usize,
    /// Union of property names across all features, sorted.
    pub columns: Vec<String>,
    /// Properties of the first feature.
    pub example: Option<JsonObject>,
}

/// Reads `path` and summarizes it.
///
/// # Errors
///
/// Returns [`LayerError`] if the file cannot be read or is not a
/// `FeatureCollection`.
pub fn inspect_source(path: &Path) -> Result<SourceSummary, LayerError> {
    let collection = crate::parcels::read_collection(path)?;

    let crs = collection
        .foreign_members
        .as_ref()
        .and_then(|m| m.get("crs"))
        .map(|member| {
            member
                .get("properties")
                .and_then(|p| p.get("name"))
                .and_then(serde_json::Value::as_str)
                .map_or_else(|| member.to_string(), str::to_string)
        });

    let columns: BTreeSet<&String> = collection
        .features
        .iter()
        .filter_map(|f| f.properties.as_ref())
        .flat_map(JsonObject::keys)
        .collect();

    Ok(SourceSummary {
        path: path.to_path_buf(),
        crs,
        features: collection.features.len(),
        columns: columns.into_iter().cloned().collect(),
        example: collection
            .features
            .first()
            .and_then(|f| f.properties.clone()),
    })
}

impl fmt::Display for SourceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Source: {}", self.path.display())?;
        match &self.crs {
            Some(crs) => writeln!(f, "CRS: {crs}")?,
            None => writeln!(f, "CRS: none declared (WGS84)")?,
        }
        writeln!(f, "Features: {}", self.features)?;

        writeln!(f, "\nColumns:")?;
        for column in &self.columns {
            writeln!(f, "  {column}")?;
        }

        writeln!(f, "\nExample row:")?;
        match &self.example {
            Some(props) => {
                let width = props.keys().map(String::len).max().unwrap_or(0);
                for (name, value) in props {
                    writeln!(f, "  {name:<width$}  {value}")?;
                }
            }
            None => writeln!(f, "  (no features)")?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarizes_columns_across_features() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parcels.geojson");
        let collection = serde_json::json!({
            "type": "FeatureCollection",
            "crs": {"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::3857"}},
            "features": [
                {"type": "Feature", "properties": {"PIN": "101", "MAILTOADD": "101 Main St"}, "geometry": null},
                {"type": "Feature", "properties": {"PIN": "102", "ACRES": 0.5}, "geometry": null},
            ]
        });
        std::fs::write(&path, collection.to_string()).unwrap();

        let summary = inspect_source(&path).unwrap();

        assert_eq!(summary.crs.as_deref(), Some("urn:ogc:def:crs:EPSG::3857"));
        assert_eq!(summary.features, 2);
        assert_eq!(summary.columns, vec!["ACRES", "MAILTOADD", "PIN"]);
        let example = summary.example.as_ref().unwrap();
        assert_eq!(example.get("PIN"), Some(&serde_json::json!("101")));

        let text = summary.to_string();
        assert!(text.contains("CRS: urn:ogc:def:crs:EPSG::3857"));
        assert!(text.contains("  MAILTOADD"));
    }

    #[test]
    fn empty_collection_has_no_example() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.geojson");
        std::fs::write(&path, r#"{"type":"FeatureCollection","features":[]}"#).unwrap();

        let summary = inspect_source(&path).unwrap();

        assert_eq!(summary.crs, None);
        assert!(summary.columns.is_empty());
        assert!(summary.to_string().contains("(no features)"));
    }
}
