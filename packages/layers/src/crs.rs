//! Coordinate reference system detection and reprojection to WGS84.
//!
//! `GeoJSON` is WGS84 by definition (RFC 7946), but older exports still
//! carry a `crs` member naming some other system, typically a state plane
//! or Web Mercator. Any EPSG code with a known proj definition is converted
//! with `proj4rs`; anything else is rejected rather than silently
//! mis-projected.

use std::fmt;
use std::path::Path;

use geo::{Coord, CoordsIter as _, MapCoordsInPlace, MultiPolygon};
use geojson::JsonObject;
use proj4rs::Proj;

use crate::LayerError;

/// The CRS name written into every output layer.
pub const WGS84_URN: &str = "urn:ogc:def:crs:OGC:1.3:CRS84";

const WGS84_EPSG: u16 = 4326;

/// The coordinate reference system of a geometry source.
#[derive(Debug, Clone)]
pub enum Crs {
    /// Longitude/latitude on WGS84 (`EPSG:4326`, `CRS84`). Needs no work.
    Wgs84,
    /// Any other EPSG system, converted through `proj4rs`.
    Epsg(Box<Reprojection>),
}

/// A resolved conversion from one EPSG system to WGS84 longitude/latitude.
#[derive(Clone)]
pub struct Reprojection {
    code: u16,
    source: Proj,
    target: Proj,
}

impl fmt::Debug for Reprojection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reprojection")
            .field("code", &self.code)
            .field("projname", &self.source.projname())
            .finish()
    }
}

impl Reprojection {
    /// Looks up `code` in the bundled EPSG definitions.
    fn new(code: u16) -> Option<Self> {
        let source = Proj::from_epsg_code(code)
            .inspect_err(|e| log::debug!("EPSG:{code} not usable: {e}"))
            .ok()?;
        let target = Proj::from_epsg_code(WGS84_EPSG).ok()?;
        Some(Self {
            code,
            source,
            target,
        })
    }
}

impl Crs {
    /// Parses a CRS name such as `EPSG:4326`, `urn:ogc:def:crs:EPSG::2248`
    /// or `urn:ogc:def:crs:OGC:1.3:CRS84`.
    ///
    /// Returns `None` when the name carries no EPSG code, or the code has no
    /// definition `proj4rs` can build.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let upper = name.trim().to_ascii_uppercase();
        let code = upper.rsplit(':').next().unwrap_or_default();

        let epsg: u16 = match code {
            "CRS84" | "WGS84" => return Some(Self::Wgs84),
            "CRS83" => 4269,
            // Pre-EPSG and ESRI spellings of Web Mercator.
            "900913" | "102100" | "102113" => 3857,
            other => other.parse().ok()?,
        };

        if epsg == WGS84_EPSG {
            return Some(Self::Wgs84);
        }
        Reprojection::new(epsg).map(|r| Self::Epsg(Box::new(r)))
    }

    /// Determines the CRS of a `GeoJSON` source.
    ///
    /// The file's own `crs` member wins. Without one, `fallback` (from the
    /// settings) is used, and without that the source is taken to be WGS84.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::UnsupportedCrs`] if the named system cannot be
    /// resolved to a projection.
    pub fn detect(
        foreign_members: Option<&JsonObject>,
        fallback: Option<&str>,
        path: &Path,
    ) -> Result<Self, LayerError> {
        let unsupported = |crs: String| LayerError::UnsupportedCrs {
            path: path.to_path_buf(),
            crs,
        };

        if let Some(member) = foreign_members.and_then(|m| m.get("crs")) {
            let name = member
                .get("properties")
                .and_then(|p| p.get("name"))
                .and_then(serde_json::Value::as_str)
                .ok_or_else(|| unsupported(member.to_string()))?;
            return Self::from_name(name).ok_or_else(|| unsupported(name.to_string()));
        }

        match fallback {
            Some(name) => Self::from_name(name).ok_or_else(|| unsupported(name.to_string())),
            None => Ok(Self::Wgs84),
        }
    }

    /// The EPSG code of this system.
    #[must_use]
    pub fn epsg(&self) -> u16 {
        match self {
            Self::Wgs84 => WGS84_EPSG,
            Self::Epsg(r) => r.code,
        }
    }

    /// Reprojects a geometry to WGS84 degrees in place. No-op for WGS84
    /// input.
    ///
    /// `proj4rs` works in radians on the geographic side, so geographic
    /// sources are converted on the way in and the result on the way out.
    ///
    /// # Errors
    ///
    /// Returns the `proj4rs` error if a coordinate falls outside the
    /// projection's domain. The geometry is left partially converted.
    pub fn reproject(
        &self,
        geometry: &mut MultiPolygon<f64>,
    ) -> Result<(), proj4rs::errors::Error> {
        let Self::Epsg(r) = self else {
            return Ok(());
        };

        if r.source.is_latlong() {
            geometry.map_coords_in_place(|c| Coord {
                x: c.x.to_radians(),
                y: c.y.to_radians(),
            });
        }
        proj4rs::transform::transform(&r.source, &r.target, geometry)?;
        geometry.map_coords_in_place(|c| Coord {
            x: c.x.to_degrees(),
            y: c.y.to_degrees(),
        });

        if geometry
            .coords_iter()
            .all(|c| c.x.is_finite() && c.y.is_finite())
        {
            Ok(())
        } else {
            Err(proj4rs::errors::Error::NanCoordinateValue)
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wgs84 => f.write_str("WGS84"),
            Self::Epsg(r) => write!(f, "EPSG:{}", r.code),
        }
    }
}

/// Builds the `crs` foreign member written into output collections.
#[must_use]
pub fn wgs84_member() -> serde_json::Value {
    serde_json::json!({
        "type": "name",
        "properties": { "name": WGS84_URN },
    })
}

/// Forward spherical mercator, used to build fixtures.
#[cfg(test)]
pub(crate) fn web_mercator_from_wgs84(lon: f64, lat: f64) -> Coord<f64> {
    const RADIUS: f64 = 6_378_137.0;
    Coord {
        x: RADIUS * lon.to_radians(),
        y: RADIUS * (std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln(),
    }
}
