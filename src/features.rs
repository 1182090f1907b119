//! Farm -> Field -> CropField walk producing a GeoJSON feature collection.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::geometry::{decode_gml_geometry, Geometry};
use crate::model::CROP_FIELD_ID;
use crate::tree::{XmlNode, ATTRIBUTE_PREFIX};

/// Keys holding a crop field's own geometry; never copied into properties.
const GEOMETRY_KEYS: &[&str] = &["Border"];

const QUALITY_INDICATOR_KEY: &str = "QualityIndicatorType";
const INDICATOR_GEOMETRY_KEY: &str = "Geometry";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// One crop field. `properties` holds the field's simplified XML content;
/// quality indicators are always a list under `QualityIndicatorType`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub struct Feature {
    pub geometry: Geometry,
    pub properties: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QualityIndicator {
    pub properties: Map<String, Value>,
    pub geometry: Option<Geometry>,
}

impl QualityIndicator {
    fn from_node(node: &XmlNode) -> Result<Self> {
        let properties = simplified_entries(node, &[INDICATOR_GEOMETRY_KEY]);
        let geometry = match node.get(INDICATOR_GEOMETRY_KEY) {
            Some(container) => decode_gml_geometry(container)?,
            None => None,
        };
        Ok(Self {
            properties,
            geometry,
        })
    }

    pub fn to_value(&self) -> Value {
        let mut object = self.properties.clone();
        if let Some(geometry) = &self.geometry {
            object.insert("geometry".to_string(), geometry.to_geojson());
        }
        Value::Object(object)
    }
}

/// Builds a feature collection from a node holding `Farm` children (one or
/// many). Crop fields whose border yields no geometry are skipped, not
/// emitted with a null geometry. Source order is kept.
pub fn project_features(root: &XmlNode) -> Result<FeatureCollection> {
    let mut features = Vec::new();
    let mut skipped = 0usize;

    for farm in root.list("Farm") {
        for field in farm.list("Field") {
            for crop_field in field.list("CropField") {
                match project_crop_field(crop_field)? {
                    Some(feature) => features.push(feature),
                    None => skipped += 1,
                }
            }
        }
    }

    info!(
        "Projected {} crop fields ({} skipped without geometry)",
        features.len(),
        skipped
    );
    Ok(FeatureCollection { features })
}

/// `None` when the border is missing or has no exterior ring.
pub fn project_crop_field(crop_field: &XmlNode) -> Result<Option<Feature>> {
    let border = match crop_field.get("Border") {
        Some(border) => decode_gml_geometry(border)?,
        None => None,
    };
    let Some(geometry) = border else {
        warn!(
            "Skipping crop field {} without usable border",
            crop_field.child_text(CROP_FIELD_ID).unwrap_or("<unknown>")
        );
        return Ok(None);
    };

    let mut properties = Map::new();
    for (key, node) in crop_field.entries() {
        if is_attribute(key) || GEOMETRY_KEYS.contains(&key.as_str()) {
            continue;
        }
        let value = if key == QUALITY_INDICATOR_KEY {
            let indicators = node
                .items()
                .into_iter()
                .map(|indicator| QualityIndicator::from_node(indicator).map(|q| q.to_value()))
                .collect::<Result<Vec<_>>>()?;
            debug!("Crop field carries {} quality indicators", indicators.len());
            Value::Array(indicators)
        } else {
            node.simplify()
        };
        properties.insert(key.clone(), value);
    }

    Ok(Some(Feature {
        geometry,
        properties,
    }))
}

fn is_attribute(key: &str) -> bool {
    key.starts_with(ATTRIBUTE_PREFIX)
}

fn simplified_entries(node: &XmlNode, skip: &[&str]) -> Map<String, Value> {
    node.entries()
        .iter()
        .filter(|(key, _)| !is_attribute(key) && !skip.contains(&key.as_str()))
        .map(|(key, child)| (key.clone(), child.simplify()))
        .collect()
}
