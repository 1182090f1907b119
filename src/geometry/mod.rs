//! Crop-field geometry: `geo-types` polygons with a GeoJSON face, plus the
//! GML decode path and the RD New <-> WGS84 transform.
//!
//! Decoded geometries are always in WGS84 (`x = lon`, `y = lat`); the GML
//! encoder in [`crate::writer`] reprojects them back to RD New.

pub mod gml;
pub mod transform;

use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::error::{MalformedInput, Result};

pub use geo_types::{Coord, LineString, MultiPolygon, Polygon};
pub use gml::{decode_gml_geometry, decode_gml_polygon, parse_position_list};
pub use transform::{project_to_geographic, project_to_projected, RdNew};

/// The two border shapes EDI-Crop exchanges.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Polygon(Polygon),
    MultiPolygon(MultiPolygon),
}

impl Geometry {
    /// Reads a GeoJSON geometry object. Only `Polygon` and `MultiPolygon`
    /// are accepted; any other `type` is [`MalformedInput::UnsupportedGeometry`].
    pub fn from_geojson(value: &Value) -> Result<Self> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("geometry has no `type` member"))?;
        if kind != "Polygon" && kind != "MultiPolygon" {
            return Err(MalformedInput::UnsupportedGeometry(kind.to_string()).into());
        }

        let geometry =
            geojson::Geometry::from_json_value(value.clone()).map_err(|err| invalid(err.to_string()))?;
        match geometry.value {
            geojson::Value::Polygon(rings) => Ok(Self::Polygon(polygon_from_rings(&rings)?)),
            geojson::Value::MultiPolygon(polygons) => Ok(Self::MultiPolygon(
                polygons
                    .iter()
                    .map(|rings| polygon_from_rings(rings))
                    .collect::<Result<Vec<_>>>()?
                    .into(),
            )),
            _ => Err(MalformedInput::UnsupportedGeometry(kind.to_string()).into()),
        }
    }

    pub fn to_geojson(&self) -> Value {
        Value::Object(geojson::JsonObject::from(&geojson::Geometry::from(self)))
    }

    pub fn polygons(&self) -> &[Polygon] {
        match self {
            Self::Polygon(polygon) => std::slice::from_ref(polygon),
            Self::MultiPolygon(polygons) => &polygons.0,
        }
    }
}

impl From<&Geometry> for geojson::Geometry {
    fn from(geometry: &Geometry) -> Self {
        let value = match geometry {
            Geometry::Polygon(polygon) => geojson::Value::Polygon(polygon_to_rings(polygon)),
            Geometry::MultiPolygon(polygons) => {
                geojson::Value::MultiPolygon(polygons.iter().map(polygon_to_rings).collect())
            }
        };
        geojson::Geometry::new(value)
    }
}

impl Serialize for Geometry {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        geojson::Geometry::from(self).serialize(serializer)
    }
}

/// Exterior first, then the holes. A polygon whose exterior holds no
/// positions has no rings at all; it is written as an empty container.
pub fn polygon_rings(polygon: &Polygon) -> Vec<&LineString> {
    if polygon.exterior().0.is_empty() {
        return Vec::new();
    }
    std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .collect()
}

fn polygon_to_rings(polygon: &Polygon) -> Vec<Vec<geojson::Position>> {
    polygon_rings(polygon)
        .into_iter()
        .map(|ring| ring.coords().map(|c| vec![c.x, c.y]).collect())
        .collect()
}

fn invalid(message: impl Into<String>) -> crate::error::Error {
    MalformedInput::InvalidGeoJson(message.into()).into()
}

fn polygon_from_rings(rings: &[Vec<geojson::Position>]) -> Result<Polygon> {
    let mut rings = rings.iter().map(|ring| ring_from_positions(ring));
    let exterior = rings
        .next()
        .transpose()?
        .unwrap_or_else(|| LineString::new(Vec::new()));
    let interiors = rings.collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(exterior, interiors))
}

/// Positions may carry an altitude; only x and y are kept.
fn ring_from_positions(positions: &[geojson::Position]) -> Result<LineString> {
    positions
        .iter()
        .map(|position| match position.as_slice() {
            [x, y, ..] => Ok(Coord { x: *x, y: *y }),
            _ => Err(invalid(format!("position {position:?} needs two numbers"))),
        })
        .collect::<Result<Vec<_>>>()
        .map(LineString::new)
}
