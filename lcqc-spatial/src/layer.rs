//! Input layers: features, boundaries and attribute values.
//!
//! A [`FeatureLayer`] is the polygon table under validation. A
//! [`BoundaryLayer`] is the reference area the delivery must cover, optionally
//! split into management units selected by a discriminator column.

use std::collections::BTreeMap;
use std::fmt;

use geo_types::{Geometry, Polygon};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::geometry::{check_polygon, parse_wkt, polygon_dump, BBox, GeometryType};

/// Stable integer feature identifier.
pub type FeatureId = i64;

/// Attribute value with SQL comparison semantics.
///
/// Any comparison involving [`AttrValue::Null`] is unknown (`None`), so a null
/// never satisfies an equality or an inequality predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl AttrValue {
    pub fn is_null(&self) -> bool {
        matches!(self, AttrValue::Null)
    }

    /// Numeric view of the value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Int(i) => Some(*i as f64),
            AttrValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// SQL `=`.
    pub fn sql_eq(&self, other: &AttrValue) -> Option<bool> {
        match (self, other) {
            (AttrValue::Null, _) | (_, AttrValue::Null) => None,
            (AttrValue::Text(a), AttrValue::Text(b)) => Some(a == b),
            (AttrValue::Int(a), AttrValue::Int(b)) => Some(a == b),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => Some(x == y),
                _ => Some(false),
            },
        }
    }

    /// SQL `!=`.
    pub fn sql_ne(&self, other: &AttrValue) -> Option<bool> {
        self.sql_eq(other).map(|eq| !eq)
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Null => write!(f, "NULL"),
            AttrValue::Int(i) => write!(f, "{i}"),
            AttrValue::Float(v) => write!(f, "{v}"),
            AttrValue::Text(s) => write!(f, "'{s}'"),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Text(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Text(s)
    }
}

impl From<i64> for AttrValue {
    fn from(i: i64) -> Self {
        AttrValue::Int(i)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Float(v)
    }
}

/// One feature row of a polygon layer.
#[derive(Debug, Clone)]
pub struct Feature {
    pub fid: FeatureId,
    pub geom: Geometry<f64>,
    pub attributes: BTreeMap<String, AttrValue>,
}

impl Feature {
    /// Create a feature without attributes.
    pub fn new(fid: FeatureId, geom: impl Into<Geometry<f64>>) -> Self {
        Self {
            fid,
            geom: geom.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Create a feature from WKT.
    pub fn from_wkt(fid: FeatureId, wkt: &str) -> Result<Self> {
        Ok(Self::new(fid, parse_wkt(wkt)?))
    }

    /// Set an attribute.
    pub fn with_attr(mut self, column: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(column.into(), value.into());
        self
    }

    /// Look up an attribute. A missing key is an error, an explicit null is not.
    pub fn attr(&self, layer: &str, column: &str) -> Result<&AttrValue> {
        self.attributes
            .get(column)
            .ok_or_else(|| EngineError::MissingColumn {
                layer: layer.to_string(),
                fid: self.fid,
                column: column.to_string(),
            })
    }

    /// The polygon parts of this feature.
    pub fn polygons(&self) -> Vec<Polygon<f64>> {
        polygon_dump(&self.geom)
    }
}

/// A polygon layer under validation.
#[derive(Debug, Clone)]
pub struct FeatureLayer {
    pub name: String,
    pub srid: u32,
    pub features: Vec<Feature>,
}

impl FeatureLayer {
    pub fn new(name: impl Into<String>, srid: u32) -> Self {
        Self {
            name: name.into(),
            srid,
            features: Vec::new(),
        }
    }

    /// Append a feature.
    pub fn with_feature(mut self, feature: Feature) -> Self {
        self.features.push(feature);
        self
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Bounding box of every feature, or `None` for an empty layer.
    pub fn extent(&self) -> Option<BBox> {
        self.features
            .iter()
            .filter_map(|f| BBox::from_geometry(&f.geom))
            .reduce(|a, b| a.union(&b))
    }

    /// Distinct non-null values of a column.
    pub fn distinct_values(&self, column: &str) -> Result<Vec<AttrValue>> {
        let mut values: Vec<AttrValue> = Vec::new();
        for feature in &self.features {
            let value = feature.attr(&self.name, column)?;
            if value.is_null() {
                continue;
            }
            if !values.iter().any(|v| v.sql_eq(value) == Some(true)) {
                values.push(value.clone());
            }
        }
        Ok(values)
    }

    /// Check ids are unique and every geometry is a usable polygon set.
    pub fn validate(&self) -> Result<()> {
        let mut seen: FxHashSet<FeatureId> = FxHashSet::default();
        for feature in &self.features {
            if !seen.insert(feature.fid) {
                return Err(EngineError::DuplicateFeature {
                    layer: self.name.clone(),
                    fid: feature.fid,
                });
            }
            validate_polygonal(&self.name, feature.fid, &feature.geom)?;
        }
        Ok(())
    }
}

/// One unit of a reference boundary.
#[derive(Debug, Clone)]
pub struct BoundaryUnit {
    pub geom: Geometry<f64>,
    pub attributes: BTreeMap<String, AttrValue>,
}

impl BoundaryUnit {
    pub fn new(geom: impl Into<Geometry<f64>>) -> Self {
        Self {
            geom: geom.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Set an attribute.
    pub fn with_attr(mut self, column: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(column.into(), value.into());
        self
    }
}

/// A reference boundary layer.
#[derive(Debug, Clone)]
pub struct BoundaryLayer {
    pub name: String,
    pub srid: u32,
    pub units: Vec<BoundaryUnit>,
}

impl BoundaryLayer {
    pub fn new(name: impl Into<String>, srid: u32) -> Self {
        Self {
            name: name.into(),
            srid,
            units: Vec::new(),
        }
    }

    /// Append a unit.
    pub fn with_unit(mut self, unit: BoundaryUnit) -> Self {
        self.units.push(unit);
        self
    }

    /// Every unit geometry must be polygonal. Units are reported by position.
    pub fn validate(&self) -> Result<()> {
        for (i, unit) in self.units.iter().enumerate() {
            validate_polygonal(&self.name, i as FeatureId, &unit.geom)?;
        }
        Ok(())
    }

    /// Check the boundary shares the layer's spatial reference.
    pub fn check_srid(&self, layer: &FeatureLayer) -> Result<()> {
        if self.srid != layer.srid {
            return Err(EngineError::SridMismatch {
                layer: layer.name.clone(),
                layer_srid: layer.srid,
                boundary: self.name.clone(),
                boundary_srid: self.srid,
            });
        }
        Ok(())
    }
}

fn validate_polygonal(layer: &str, fid: FeatureId, geom: &Geometry<f64>) -> Result<()> {
    let geom_type = GeometryType::from_geometry(geom);
    let parts = polygon_dump(geom);
    let polygonal = geom_type.is_polygonal()
        || (geom_type == GeometryType::GeometryCollection && !parts.is_empty());
    if !polygonal {
        return Err(EngineError::NonPolygonal {
            layer: layer.to_string(),
            fid,
            geom_type: geom_type.as_str().to_string(),
        });
    }
    for part in &parts {
        check_polygon(part).map_err(|reason| EngineError::InvalidGeometry {
            layer: layer.to_string(),
            fid,
            reason,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_null_semantics() {
        let a = AttrValue::from("A");
        assert_eq!(a.sql_eq(&AttrValue::Null), None);
        assert_eq!(AttrValue::Null.sql_ne(&AttrValue::Null), None);
        assert_eq!(a.sql_eq(&AttrValue::from("A")), Some(true));
        assert_eq!(a.sql_ne(&AttrValue::from("B")), Some(true));
    }

    #[test]
    fn test_numeric_comparison_across_types() {
        assert_eq!(AttrValue::Int(3).sql_eq(&AttrValue::Float(3.0)), Some(true));
        assert_eq!(AttrValue::Int(3).sql_eq(&AttrValue::from("3")), Some(false));
    }

    #[test]
    fn test_extent() {
        let layer = FeatureLayer::new("mylayer", 4326)
            .with_feature(Feature::from_wkt(1, "POLYGON((-1.1 -2.2, 1 -2.2, 1 1, -1.1 1, -1.1 -2.2))").unwrap())
            .with_feature(Feature::from_wkt(2, "POLYGON((10 10, 11.3 10, 11.3 11.4, 10 11.4, 10 10))").unwrap());
        assert_eq!(layer.extent(), Some(BBox::new(-1.1, -2.2, 11.3, 11.4)));
        assert_eq!(FeatureLayer::new("empty", 4326).extent(), None);
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let layer = FeatureLayer::new("dup", 3035)
            .with_feature(Feature::from_wkt(1, "POLYGON((0 0, 1 0, 1 1, 0 1, 0 0))").unwrap())
            .with_feature(Feature::from_wkt(1, "POLYGON((2 0, 3 0, 3 1, 2 1, 2 0))").unwrap());
        assert!(matches!(
            layer.validate(),
            Err(EngineError::DuplicateFeature { fid: 1, .. })
        ));
    }

    #[test]
    fn test_validate_rejects_lines() {
        let layer = FeatureLayer::new("lines", 3035)
            .with_feature(Feature::from_wkt(7, "LINESTRING(0 0, 1 1)").unwrap());
        assert!(matches!(
            layer.validate(),
            Err(EngineError::NonPolygonal { fid: 7, .. })
        ));
    }

    #[test]
    fn test_validate_rejects_degenerate_polygon() {
        let layer = FeatureLayer::new("flat", 3035)
            .with_feature(Feature::from_wkt(3, "POLYGON((0 0, 1 0, 2 0, 0 0))").unwrap());
        assert!(matches!(
            layer.validate(),
            Err(EngineError::InvalidGeometry { fid: 3, .. })
        ));
    }

    #[test]
    fn test_distinct_values_skip_null() {
        let layer = FeatureLayer::new("units", 3035)
            .with_feature(Feature::from_wkt(1, "POLYGON((0 0, 1 0, 1 1, 0 1, 0 0))").unwrap().with_attr("du", "CZ"))
            .with_feature(Feature::from_wkt(2, "POLYGON((1 0, 2 0, 2 1, 1 1, 1 0))").unwrap().with_attr("du", "CZ"))
            .with_feature(Feature::from_wkt(3, "POLYGON((2 0, 3 0, 3 1, 2 1, 2 0))").unwrap().with_attr("du", AttrValue::Null));
        assert_eq!(layer.distinct_values("du").unwrap(), vec![AttrValue::from("CZ")]);
    }

    #[test]
    fn test_missing_column() {
        let feature = Feature::from_wkt(4, "POLYGON((0 0, 1 0, 1 1, 0 1, 0 0))").unwrap();
        assert!(matches!(
            feature.attr("l", "code"),
            Err(EngineError::MissingColumn { fid: 4, .. })
        ));
    }

    #[test]
    fn test_boundary_srid_mismatch() {
        let layer = FeatureLayer::new("l", 3035);
        let boundary = BoundaryLayer::new("b", 4326);
        assert!(matches!(
            boundary.check_srid(&layer),
            Err(EngineError::SridMismatch { .. })
        ));
    }
}
