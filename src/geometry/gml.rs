//! GML (RD New) -> GeoJSON (WGS84) decoding.
//!
//! EDI-Crop borders arrive as
//!
//! ```xml
//! <gml:Polygon>
//!   <gml:exterior><gml:LinearRing><gml:posList>x y x y ...</gml:posList></gml:LinearRing></gml:exterior>
//!   <gml:interior>...</gml:interior>
//! </gml:Polygon>
//! ```
//!
//! or as a `gml:MultiSurface` of `gml:surfaceMember` polygons. Decoding works
//! on the parsed [`XmlNode`] tree, so namespace prefixes are already gone.

use tracing::{debug, warn};

use super::transform::project_to_geographic;
use super::{Coord, Geometry, LineString, MultiPolygon, Polygon};
use crate::error::Result;
use crate::tree::XmlNode;

/// Splits a whitespace-separated coordinate list into `(x, y)` pairs.
///
/// Tokens that are not numbers are ignored. A trailing unpaired number is
/// dropped with a warning; the service has been seen to send such lists and
/// rejecting them would lose the whole field.
pub fn parse_position_list(text: &str) -> Vec<Coord> {
    let numbers: Vec<f64> = text
        .split_whitespace()
        .filter_map(|token| token.parse().ok())
        .collect();

    if let [.., last] = numbers.as_slice() {
        if numbers.len() % 2 == 1 {
            warn!("Dropping trailing unpaired coordinate {last} from position list");
        }
    }

    numbers
        .chunks_exact(2)
        .map(|pair| Coord {
            x: pair[0],
            y: pair[1],
        })
        .collect()
}

/// Decodes a `Polygon` node. `None` when the exterior ring is absent or holds
/// no positions: a border without exterior is "no geometry", never an empty
/// shape. Interior rings without positions are dropped individually.
pub fn decode_gml_polygon(node: &XmlNode) -> Result<Option<Polygon>> {
    let exterior = match node.get("exterior") {
        Some(container) => decode_ring(container)?,
        None => None,
    };
    let Some(exterior) = exterior else {
        debug!("Polygon has no usable exterior ring");
        return Ok(None);
    };

    let mut interiors = Vec::new();
    for container in node.list("interior") {
        match decode_ring(container)? {
            Some(ring) => interiors.push(ring),
            None => debug!("Dropping empty interior ring"),
        }
    }

    Ok(Some(Polygon::new(exterior, interiors)))
}

/// Decodes a border-like container holding either a `Polygon` or a
/// `MultiSurface`. A bare polygon node (with `exterior` directly) is accepted
/// too. Members without exterior are skipped; a multi-surface with no
/// surviving member is `None`.
pub fn decode_gml_geometry(node: &XmlNode) -> Result<Option<Geometry>> {
    if let Some(polygon) = node.get("Polygon") {
        return Ok(decode_gml_polygon(polygon)?.map(Geometry::Polygon));
    }

    if let Some(surface) = node.get("MultiSurface") {
        let mut polygons = Vec::new();
        for polygon in surface
            .list("surfaceMember")
            .into_iter()
            .filter_map(|member| member.get("Polygon"))
        {
            polygons.extend(decode_gml_polygon(polygon)?);
        }
        return Ok((!polygons.is_empty()).then(|| Geometry::MultiPolygon(MultiPolygon(polygons))));
    }

    if node.get("exterior").is_some() {
        return Ok(decode_gml_polygon(node)?.map(Geometry::Polygon));
    }

    Ok(None)
}

/// `exterior`/`interior` container -> reprojected ring. Attributes on
/// `posList` (srsDimension, count) are left on the node; only its text is read.
fn decode_ring(container: &XmlNode) -> Result<Option<LineString>> {
    let Some(text) = container
        .get("LinearRing")
        .and_then(|ring| ring.get("posList"))
        .and_then(XmlNode::text)
    else {
        return Ok(None);
    };

    let points = parse_position_list(text);
    if points.is_empty() {
        return Ok(None);
    }
    Ok(Some(LineString::new(project_to_geographic(&points)?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_xml_tree;
    use geo_types::coord;

    fn polygon_xml(exterior: &str, interiors: &[&str]) -> String {
        let interiors: String = interiors
            .iter()
            .map(|pos| {
                format!("<gml:interior><gml:LinearRing><gml:posList>{pos}</gml:posList></gml:LinearRing></gml:interior>")
            })
            .collect();
        format!(
            r#"<gml:Polygon xmlns:gml="http://www.opengis.net/gml/3.2">
                 <gml:exterior><gml:LinearRing><gml:posList srsDimension="2">{exterior}</gml:posList></gml:LinearRing></gml:exterior>
                 {interiors}
               </gml:Polygon>"#
        )
    }

    const SQUARE: &str = "155000 463000 155100 463000 155100 463100 155000 463100 155000 463000";
    const HOLE: &str = "155040 463040 155060 463040 155060 463060 155040 463040";

    #[test]
    fn test_parse_position_list_pairs() {
        assert_eq!(
            parse_position_list("100 200 110 210 120 220"),
            vec![
                coord! { x: 100.0, y: 200.0 },
                coord! { x: 110.0, y: 210.0 },
                coord! { x: 120.0, y: 220.0 },
            ]
        );
        assert!(parse_position_list("").is_empty());
        assert!(parse_position_list("abc def").is_empty());
    }

    /// Compatibility behaviour: the unpaired value may hide a truncated
    /// upstream list, but it is dropped rather than rejected.
    #[test]
    fn test_parse_position_list_drops_trailing_unpaired_value() {
        assert_eq!(
            parse_position_list("100 200 300"),
            vec![coord! { x: 100.0, y: 200.0 }]
        );
    }

    #[test]
    fn test_decode_polygon_with_holes() {
        let tree = parse_xml_tree(&polygon_xml(SQUARE, &[HOLE, HOLE])).unwrap();
        let polygon = decode_gml_polygon(tree.get("Polygon").unwrap())
            .unwrap()
            .unwrap();

        assert_eq!(polygon.interiors().len(), 2);
        let exterior = &polygon.exterior().0;
        assert_eq!(exterior.len(), 5);
        assert!((exterior[0].x - 5.387).abs() < 0.01 && (exterior[0].y - 52.155).abs() < 0.01);
        assert_eq!(exterior[0], exterior[4]);
    }

    #[test]
    fn test_empty_exterior_is_no_geometry() {
        let tree = parse_xml_tree(&polygon_xml("", &[HOLE])).unwrap();
        assert!(decode_gml_polygon(tree.get("Polygon").unwrap())
            .unwrap()
            .is_none());

        let no_exterior = parse_xml_tree("<Polygon><interior/></Polygon>").unwrap();
        assert!(decode_gml_polygon(no_exterior.get("Polygon").unwrap())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_empty_interior_is_dropped() {
        let tree = parse_xml_tree(&polygon_xml(SQUARE, &["", HOLE])).unwrap();
        let polygon = decode_gml_polygon(tree.get("Polygon").unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(polygon.interiors().len(), 1);
    }

    #[test]
    fn test_decode_multi_surface() {
        let xml = format!(
            r#"<Border><gml:MultiSurface xmlns:gml="http://www.opengis.net/gml/3.2">
                 <gml:surfaceMember>{}</gml:surfaceMember>
                 <gml:surfaceMember>{}</gml:surfaceMember>
                 <gml:surfaceMember>{}</gml:surfaceMember>
               </gml:MultiSurface></Border>"#,
            polygon_xml(SQUARE, &[]),
            polygon_xml("", &[]),
            polygon_xml(SQUARE, &[HOLE]),
        );
        let tree = parse_xml_tree(&xml).unwrap();

        match decode_gml_geometry(tree.get("Border").unwrap()).unwrap() {
            Some(Geometry::MultiPolygon(polygons)) => {
                assert_eq!(polygons.0.len(), 2);
                assert_eq!(polygons.0[1].interiors().len(), 1);
            }
            other => panic!("expected MultiPolygon, got {other:?}"),
        }
    }

    #[test]
    fn test_border_without_shape_is_none() {
        let tree = parse_xml_tree("<Border><Note>none</Note></Border>").unwrap();
        assert!(decode_gml_geometry(tree.get("Border").unwrap())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_overflowing_ordinate_is_rejected() {
        let overflowing = polygon_xml("155000 1e309 155100 463000 155000 463000", &[]);
        let tree = parse_xml_tree(&overflowing).unwrap();
        assert!(decode_gml_polygon(tree.get("Polygon").unwrap()).is_err());
    }
}
