//! Layer builders.
//!
//! Derives the output layers from reconciled rows:
//!
//! * a per-parcel layer (one feature per reconciled row),
//! * a per-project layer (one convex-hull feature per project, plus custom
//!   geometries passed through as authored),
//! * a per-project centroid layer,
//! * named status/year subsets of the per-project layer.
//!
//! Per-project attributes use a first-non-null rule: rows are visited in
//! reconciled order and the first value seen for each field is kept. When
//! parcels of one project disagree, later values are ignored.

use std::collections::BTreeMap;

use geo::{Centroid as _, ConvexHull as _, MultiPolygon, Polygon, SimplifyVwPreserve as _};
use parcel_map_layers_models::{LayersConfig, ProjectDetails, ReconciledRow, SplitConfig};

/// Output properties. `None` is written as JSON `null`.
pub type Properties = BTreeMap<String, Option<String>>;

/// Property name for the project identifier.
pub const PROJECT_ID: &str = "project_id";
/// Property name for the project display name.
pub const PROJECT_NAME: &str = "project_name";
/// Property name for the project link.
pub const PROJECT_LINK: &str = "project_link";
/// Property name for the project status.
pub const PROJECT_STATUS: &str = "project_status";
/// Property name for the completion year.
pub const COMPLETED_YEAR: &str = "completed_year";

/// One feature of an output layer.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerFeature {
    /// Geometry in WGS84.
    pub geometry: geo::Geometry<f64>,
    /// Attribute values.
    pub properties: Properties,
}

impl LayerFeature {
    /// Returns a property value, treating `null` as missing.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).and_then(Option::as_deref)
    }
}

/// Builds the per-parcel layer: each reconciled parcel, simplified, with
/// its display fields.
#[must_use]
pub fn build_parcel_layer(rows: &[ReconciledRow], config: &LayersConfig) -> Vec<LayerFeature> {
    rows.iter()
        .map(|row| {
            let mut properties = Properties::new();
            properties.insert(config.fields.key.clone(), Some(row.parcel_key.clone()));
            properties.insert(config.fields.address.clone(), row.address.clone());
            properties.insert(config.fields.link.clone(), row.link.clone());
            properties.insert(PROJECT_ID.to_string(), Some(row.project_id.clone()));
            properties.insert(PROJECT_NAME.to_string(), row.project.name.clone());
            for name in &config.extra_properties {
                properties
                    .entry(name.clone())
                    .or_insert_with(|| row.attributes.get(name).cloned());
            }

            LayerFeature {
                geometry: output_geometry(simplify(&row.geometry, config.simplify_tolerance)),
                properties,
            }
        })
        .collect()
}

/// Builds the per-project layer.
///
/// City parcels are grouped by project and replaced by the convex hull of
/// the group, so every project becomes a single polygon. Custom parcels
/// skip grouping and are appended after the hulls with their authored
/// geometry. Everything is simplified.
#[must_use]
pub fn build_project_layer(rows: &[ReconciledRow], config: &LayersConfig) -> Vec<LayerFeature> {
    let (custom, city): (Vec<&ReconciledRow>, Vec<&ReconciledRow>) =
        rows.iter().partition(|row| row.is_custom());

    let groups = group_by_project(&city);
    log::debug!(
        "{} city rows in {} projects, {} custom rows",
        city.len(),
        groups.len(),
        custom.len()
    );

    let dissolved = groups.into_iter().map(|group| {
        let hull = project_hull(group.iter().map(|row| &row.geometry));
        let simplified = simplify(&MultiPolygon(vec![hull]), config.simplify_tolerance);
        LayerFeature {
            geometry: output_geometry(simplified),
            properties: aggregate_properties(&group, &config.extra_properties),
        }
    });

    let passed_through = custom.into_iter().map(|row| LayerFeature {
        geometry: output_geometry(simplify(&row.geometry, config.simplify_tolerance)),
        properties: aggregate_properties(&[row], &config.extra_properties),
    });

    dissolved.chain(passed_through).collect()
}

/// Builds one point per per-project feature, at the centroid of its
/// polygon, carrying the same properties.
#[must_use]
pub fn build_centroid_layer(projects: &[LayerFeature]) -> Vec<LayerFeature> {
    projects
        .iter()
        .filter_map(|feature| {
            let centroid = feature.geometry.centroid();
            if centroid.is_none() {
                log::warn!(
                    "Project {} has an empty geometry; no centroid written",
                    feature.property(PROJECT_ID).unwrap_or("<unknown>")
                );
            }
            centroid.map(|point| LayerFeature {
                geometry: geo::Geometry::Point(point),
                properties: feature.properties.clone(),
            })
        })
        .collect()
}

/// Selects the per-project features that belong to `split`.
///
/// Features matching no split are simply absent from every subset.
#[must_use]
pub fn split_layer(projects: &[LayerFeature], split: &SplitConfig) -> Vec<LayerFeature> {
    projects
        .iter()
        .filter(|feature| {
            split.matches(
                feature.property(PROJECT_STATUS),
                feature.property(COMPLETED_YEAR),
            )
        })
        .cloned()
        .collect()
}

/// Convex hull of the union of the given geometries.
///
/// The hull of a union equals the hull of all member vertices, so no
/// polygon union is computed.
#[must_use]
pub fn project_hull<'a>(geometries: impl IntoIterator<Item = &'a MultiPolygon<f64>>) -> Polygon<f64> {
    let all: MultiPolygon<f64> = geometries
        .into_iter()
        .flat_map(|mp| mp.0.iter().cloned())
        .collect();
    all.convex_hull()
}

/// Topology-preserving simplification.
///
/// `tolerance` is given in degrees, like a Douglas-Peucker distance, but
/// Visvalingam-Whyatt thresholds the triangle each vertex forms with its
/// neighbors, so it is applied as the area `tolerance²`. This is not the
/// same cut as a distance tolerance. A vertex sitting `d` off an edge of
/// length `L` goes when `L * d / 2 < tolerance²`, so along edges longer
/// than `2 * tolerance` small deviations survive that Douglas-Peucker would
/// flatten. Edges shorter than that (about 10 m at the default `0.00005`)
/// lose spikes taller than `tolerance` that Douglas-Peucker would keep.
///
/// A `tolerance` of zero or less returns the geometry unchanged.
#[must_use]
pub fn simplify(geometry: &MultiPolygon<f64>, tolerance: f64) -> MultiPolygon<f64> {
    if tolerance <= 0.0 {
        return geometry.clone();
    }
    geometry.simplify_vw_preserve(tolerance * tolerance)
}

/// Writes single-part geometries as `Polygon` and the rest as
/// `MultiPolygon`.
fn output_geometry(geometry: MultiPolygon<f64>) -> geo::Geometry<f64> {
    let MultiPolygon(mut polygons) = geometry;
    if polygons.len() == 1 {
        geo::Geometry::Polygon(polygons.remove(0))
    } else {
        geo::Geometry::MultiPolygon(MultiPolygon(polygons))
    }
}

/// Groups rows by project in order of first appearance.
fn group_by_project<'a>(rows: &[&'a ReconciledRow]) -> Vec<Vec<&'a ReconciledRow>> {
    let mut index: BTreeMap<&str, usize> = BTreeMap::new();
    let mut groups: Vec<Vec<&ReconciledRow>> = Vec::new();

    for &row in rows {
        let slot = *index.entry(row.project_id.as_str()).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(row);
    }

    groups
}

/// First-non-null aggregation of project fields over a group of rows that
/// share a `project_id`.
fn aggregate_properties(group: &[&ReconciledRow], extra: &[String]) -> Properties {
    let mut details = ProjectDetails::default();
    for row in group {
        details.fill_missing(&row.project);
    }

    let mut properties = Properties::new();
    properties.insert(
        PROJECT_ID.to_string(),
        group.first().map(|row| row.project_id.clone()),
    );
    properties.insert(PROJECT_NAME.to_string(), details.name);
    properties.insert(PROJECT_LINK.to_string(), details.link);
    properties.insert(PROJECT_STATUS.to_string(), details.status);
    properties.insert(COMPLETED_YEAR.to_string(), details.completed_year);

    for name in extra {
        let value = group.iter().find_map(|row| row.attributes.get(name).cloned());
        properties.entry(name.clone()).or_insert(value);
    }

    properties
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Area as _, Intersects as _, Point, polygon};
    use parcel_map_layers_models::{Attributes, ParcelSource};
    use std::path::PathBuf;

    fn square(x: f64, y: f64, size: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: x, y: y),
            (x: x + size, y: y),
            (x: x + size, y: y + size),
            (x: x, y: y + size),
        ]])
    }

    fn row(key: &str, project_id: &str, geometry: MultiPolygon<f64>) -> ReconciledRow {
        ReconciledRow {
            parcel_key: key.to_string(),
            parcel_id: key.to_string(),
            address: Some(format!("{key} Main St")),
            link: Some(format!("https://sdat.example.com/{key}")),
            source: if key.ends_with("CUST") {
                ParcelSource::Custom
            } else {
                ParcelSource::City
            },
            geometry,
            project_id: project_id.to_string(),
            project: ProjectDetails::default(),
            attributes: Attributes::new(),
        }
    }

    fn named(mut r: ReconciledRow, name: &str) -> ReconciledRow {
        r.project.name = Some(name.to_string());
        r
    }

    fn with_status(mut r: ReconciledRow, status: &str, year: Option<&str>) -> ReconciledRow {
        r.project.status = Some(status.to_string());
        r.project.completed_year = year.map(str::to_string);
        r
    }

    #[test]
    fn two_parcels_one_project_yield_one_hull() {
        let rows = vec![
            named(row("101", "P1", square(0.0, 0.0, 1.0)), "Library Renovation"),
            named(row("102", "P1", square(1.0, 0.0, 1.0)), "Library Renovation"),
        ];

        let layer = build_project_layer(&rows, &LayersConfig::default());

        assert_eq!(layer.len(), 1);
        assert_eq!(layer[0].property(PROJECT_ID), Some("P1"));
        assert_eq!(layer[0].property(PROJECT_NAME), Some("Library Renovation"));
        assert_eq!(layer[0].property(PROJECT_STATUS), None);
        let geo::Geometry::Polygon(hull) = &layer[0].geometry else {
            panic!("expected a single polygon, got {:?}", layer[0].geometry);
        };
        assert!((hull.unsigned_area() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn hull_contains_every_parcel_vertex() {
        let parcels = [
            square(0.0, 0.0, 1.0),
            square(3.0, 2.0, 0.5),
            MultiPolygon(vec![polygon![(x: 1.0, y: -2.0), (x: 2.0, y: -1.5), (x: 1.5, y: -1.0)]]),
        ];

        let hull = project_hull(parcels.iter());

        for parcel in &parcels {
            for polygon in &parcel.0 {
                for coord in polygon.exterior().coords() {
                    assert!(hull.intersects(&Point::from(*coord)), "{coord:?} outside hull");
                }
            }
        }
    }

    #[test]
    fn custom_rows_bypass_hull() {
        let triangle = MultiPolygon(vec![polygon![
            (x: 10.0, y: 10.0),
            (x: 12.0, y: 10.0),
            (x: 11.0, y: 12.0),
        ]]);
        let rows = vec![
            row("101", "P1", square(0.0, 0.0, 1.0)),
            row("P2CUST", "P2", triangle.clone()),
            row("P3CUST", "P3", square(20.0, 20.0, 1.0)),
            row("P3bCUST", "P3", square(30.0, 30.0, 1.0)),
        ];

        let layer = build_project_layer(&rows, &LayersConfig::default());

        assert_eq!(layer.len(), 4);
        assert_eq!(layer[0].property(PROJECT_ID), Some("P1"));
        assert_eq!(layer[1].property(PROJECT_ID), Some("P2"));
        assert_eq!(layer[1].geometry, geo::Geometry::Polygon(triangle.0[0].clone()));
        assert_eq!(layer[2].property(PROJECT_ID), Some("P3"));
        assert_eq!(layer[3].property(PROJECT_ID), Some("P3"));
    }

    #[test]
    fn first_non_null_value_wins() {
        let mut second = named(row("102", "P1", square(1.0, 0.0, 1.0)), "Later Name");
        second.project.link = Some("https://example.com/p1".to_string());
        let rows = vec![
            named(row("101", "P1", square(0.0, 0.0, 1.0)), "First Name"),
            second,
        ];

        let layer = build_project_layer(&rows, &LayersConfig::default());

        assert_eq!(layer[0].property(PROJECT_NAME), Some("First Name"));
        assert_eq!(layer[0].property(PROJECT_LINK), Some("https://example.com/p1"));
    }

    #[test]
    fn projects_keep_first_appearance_order() {
        let rows = vec![
            row("1", "Z", square(0.0, 0.0, 1.0)),
            row("2", "A", square(2.0, 0.0, 1.0)),
            row("3", "Z", square(4.0, 0.0, 1.0)),
        ];

        let layer = build_project_layer(&rows, &LayersConfig::default());
        let ids: Vec<_> = layer.iter().map(|f| f.property(PROJECT_ID)).collect();
        assert_eq!(ids, vec![Some("Z"), Some("A")]);
    }

    #[test]
    fn parcel_layer_has_one_feature_per_row() {
        let mut config = LayersConfig::default();
        config.extra_properties = vec!["ZONING".to_string()];
        let mut first = named(row("101", "P1", square(0.0, 0.0, 1.0)), "Library");
        first.attributes.insert("ZONING".to_string(), "R-8".to_string());
        let rows = vec![first, row("102", "P1", square(1.0, 0.0, 1.0))];

        let layer = build_parcel_layer(&rows, &config);

        assert_eq!(layer.len(), 2);
        assert_eq!(layer[0].property("PIN"), Some("101"));
        assert_eq!(layer[0].property("MAILTOADD"), Some("101 Main St"));
        assert_eq!(layer[0].property("SDATLINK"), Some("https://sdat.example.com/101"));
        assert_eq!(layer[0].property(PROJECT_NAME), Some("Library"));
        assert_eq!(layer[0].property("ZONING"), Some("R-8"));
        assert!(layer[1].properties.contains_key("ZONING"));
        assert_eq!(layer[1].property("ZONING"), None);
    }

    #[test]
    fn simplify_removes_negligible_vertices() {
        let noisy = MultiPolygon(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 0.5, y: 0.000_001),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 1.0),
        ]]);

        let simplified = simplify(&noisy, 0.01);
        assert_eq!(simplified.0[0].exterior().0.len(), 5);
        assert_eq!(simplify(&noisy, 0.0), noisy);
    }

    #[test]
    fn simplify_keeps_small_bends_on_long_edges() {
        // 0.001 off a unit edge is well under the 0.01 tolerance, but the
        // triangle (5e-4) is larger than 0.01².
        let bent = MultiPolygon(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 0.5, y: 0.001),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 1.0),
        ]]);

        let simplified = simplify(&bent, 0.01);
        assert_eq!(simplified.0[0].exterior().0.len(), 6);
    }

    #[test]
    fn simplify_drops_narrow_spikes_on_short_edges() {
        // The spike rises 0.03, three times the tolerance, over a 0.004
        // base, so its triangle (6e-5) is under 0.01².
        let spiked = MultiPolygon(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 0.5, y: 0.0),
            (x: 0.502, y: 0.03),
            (x: 0.504, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 1.0),
        ]]);

        let simplified = simplify(&spiked, 0.01);
        let ring = &simplified.0[0].exterior().0;
        assert!(ring.iter().all(|c| c.y < 0.01 || c.y > 0.99));
        assert_eq!(ring.len(), 5);
    }

    #[test]
    fn centroid_layer_follows_projects() {
        let rows = vec![row("101", "P1", square(0.0, 0.0, 2.0))];
        let projects = build_project_layer(&rows, &LayersConfig::default());

        let centroids = build_centroid_layer(&projects);

        assert_eq!(centroids.len(), 1);
        let geo::Geometry::Point(point) = centroids[0].geometry else {
            panic!("expected a point, got {:?}", centroids[0].geometry);
        };
        assert!((point.x() - 1.0).abs() < 1e-9);
        assert!((point.y() - 1.0).abs() < 1e-9);
        assert_eq!(centroids[0].properties, projects[0].properties);
    }

    #[test]
    fn splits_partition_by_status_and_year() {
        let rows = vec![
            with_status(row("1", "UC", square(0.0, 0.0, 1.0)), "Under Construction", None),
            with_status(row("2", "C25", square(2.0, 0.0, 1.0)), "Completed", Some("2025")),
            with_status(row("3", "C24", square(4.0, 0.0, 1.0)), "Completed", Some("2024")),
            with_status(row("4", "PL", square(6.0, 0.0, 1.0)), "Planned", None),
        ];
        let projects = build_project_layer(&rows, &LayersConfig::default());

        let under_construction = SplitConfig {
            name: "under_construction".to_string(),
            output: PathBuf::from("uc.geojson"),
            status: "Under Construction".to_string(),
            completed_year: None,
        };
        let completed_2025 = SplitConfig {
            name: "completed_2025".to_string(),
            output: PathBuf::from("c25.geojson"),
            status: "Completed".to_string(),
            completed_year: Some("2025".to_string()),
        };

        let uc = split_layer(&projects, &under_construction);
        let c25 = split_layer(&projects, &completed_2025);

        let ids = |layer: &[LayerFeature]| -> Vec<String> {
            layer
                .iter()
                .filter_map(|f| f.property(PROJECT_ID).map(str::to_string))
                .collect()
        };
        assert_eq!(ids(&uc), vec!["UC"]);
        assert_eq!(ids(&c25), vec!["C25"]);
        for layer in [&uc, &c25] {
            assert!(!ids(layer).contains(&"PL".to_string()));
        }
    }
}
