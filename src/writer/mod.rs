pub mod geojson;
pub mod request;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde_json::Value;

use crate::error::Result;
use crate::geometry::{polygon_rings, project_to_projected, Coord, Geometry, LineString, Polygon};

pub use geojson::write_feature_collection;

pub const RD_NEW_SRS: &str = "EPSG:28992";

/// Writes WGS84 geometries as RD New GML.
///
/// Positions are printed with exactly four decimals (0.1 mm), the precision
/// the service stores. The exterior ring comes first, every hole becomes its
/// own `gml:interior`. Non-finite coordinates are rejected before anything is
/// sent.
#[derive(Debug, Clone)]
pub struct GmlWriter {
    srs_name: String,
}

impl Default for GmlWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl GmlWriter {
    pub fn new() -> Self {
        Self {
            srs_name: RD_NEW_SRS.to_string(),
        }
    }

    pub fn write(&self, geometry: &Geometry) -> Result<String> {
        let mut writer = Writer::new(Vec::new());
        match geometry {
            Geometry::Polygon(polygon) => {
                write_polygon(&mut writer, polygon, Some(&self.srs_name))?;
            }
            Geometry::MultiPolygon(polygons) => {
                let mut start = BytesStart::new("gml:MultiSurface");
                start.push_attribute(("srsName", self.srs_name.as_str()));
                writer.write_event(Event::Start(start))?;
                for polygon in &polygons.0 {
                    writer.write_event(Event::Start(BytesStart::new("gml:surfaceMember")))?;
                    write_polygon(&mut writer, polygon, None)?;
                    writer.write_event(Event::End(BytesEnd::new("gml:surfaceMember")))?;
                }
                writer.write_event(Event::End(BytesEnd::new("gml:MultiSurface")))?;
            }
        }

        let bytes = writer.into_inner();
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Encodes a typed geometry to GML.
pub fn encode_gml(geometry: &Geometry) -> Result<String> {
    GmlWriter::new().write(geometry)
}

/// Encodes a GeoJSON geometry object to GML. Anything but `Polygon` and
/// `MultiPolygon` fails with `UnsupportedGeometry`.
pub fn encode_geojson_to_gml(value: &Value) -> Result<String> {
    encode_gml(&Geometry::from_geojson(value)?)
}

/// A polygon with an empty exterior is still written as an (empty)
/// `gml:Polygon` element; the service distinguishes it from a missing border.
fn write_polygon(
    writer: &mut Writer<Vec<u8>>,
    polygon: &Polygon,
    srs_name: Option<&str>,
) -> Result<()> {
    let mut start = BytesStart::new("gml:Polygon");
    if let Some(srs_name) = srs_name {
        start.push_attribute(("srsName", srs_name));
    }
    writer.write_event(Event::Start(start))?;

    for (index, ring) in polygon_rings(polygon).into_iter().enumerate() {
        let container = if index == 0 {
            "gml:exterior"
        } else {
            "gml:interior"
        };
        write_ring(writer, container, ring)?;
    }

    writer.write_event(Event::End(BytesEnd::new("gml:Polygon")))?;
    Ok(())
}

fn write_ring(writer: &mut Writer<Vec<u8>>, container: &str, ring: &LineString) -> Result<()> {
    let projected = project_to_projected(&ring.0)?;

    writer.write_event(Event::Start(BytesStart::new(container)))?;
    writer.write_event(Event::Start(BytesStart::new("gml:LinearRing")))?;
    let mut pos_list = BytesStart::new("gml:posList");
    pos_list.push_attribute(("srsDimension", "2"));
    writer.write_event(Event::Start(pos_list))?;
    writer.write_event(Event::Text(BytesText::new(&format_position_list(&projected))))?;
    writer.write_event(Event::End(BytesEnd::new("gml:posList")))?;
    writer.write_event(Event::End(BytesEnd::new("gml:LinearRing")))?;
    writer.write_event(Event::End(BytesEnd::new(container)))?;
    Ok(())
}

/// `x y x y ...` with four fixed decimals per ordinate.
pub fn format_position_list(points: &[Coord]) -> String {
    points
        .iter()
        .map(|Coord { x, y }| format!("{x:.4} {y:.4}"))
        .collect::<Vec<_>>()
        .join(" ")
}
