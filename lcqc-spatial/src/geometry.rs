//! Geometry helpers shared by every engine step.
//!
//! This module provides:
//! - WKT parsing for fixtures and callers holding text geometries
//! - Axis-aligned boxes with grid alignment and halving
//! - "Polygon dump": exploding any geometry into its polygon parts and
//!   discarding lower-dimensional fragments left behind by clipping
//! - Vertex counting, validity checks and contact measurement (overlap area
//!   and shared boundary length) between two polygons
//!
//! All set operations go through `geo::BooleanOps`, which is the only spatial
//! backend the engine talks to.
//!
//! # Precision
//!
//! `BooleanOps` rounds its operands onto an integer grid scaled to their
//! extent, so output vertices drift by roughly `extent * 1e-9`. Clipping,
//! dissolving and differencing therefore snap every output vertex that lies
//! within [`SNAP_RELATIVE_TOLERANCE`] of an exact candidate (an input vertex,
//! a box corner or an edge crossing computed from canonically ordered
//! endpoints) back onto that candidate. Neighbouring features clipped by the
//! same line end up with bit-identical crossing vertices.

use geo::algorithm::orient::Direction;
use geo::{unary_union, Area, BooleanOps, BoundingRect, Buffer, CoordsIter, Orient, Relate};
use geo_types::{coord, Coord, Geometry, Line, LineString, MultiPolygon, Polygon, Rect};
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::RTree;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Geometry type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum GeometryType {
    Point = 0,
    LineString = 1,
    Polygon = 2,
    MultiPoint = 3,
    MultiLineString = 4,
    MultiPolygon = 5,
    GeometryCollection = 6,
    Other = 7,
}

impl GeometryType {
    /// Classify a geo-types Geometry.
    pub fn from_geometry(geom: &Geometry<f64>) -> Self {
        match geom {
            Geometry::Point(_) => GeometryType::Point,
            Geometry::LineString(_) | Geometry::Line(_) => GeometryType::LineString,
            Geometry::Polygon(_) | Geometry::Rect(_) | Geometry::Triangle(_) => {
                GeometryType::Polygon
            }
            Geometry::MultiPoint(_) => GeometryType::MultiPoint,
            Geometry::MultiLineString(_) => GeometryType::MultiLineString,
            Geometry::MultiPolygon(_) => GeometryType::MultiPolygon,
            Geometry::GeometryCollection(_) => GeometryType::GeometryCollection,
            #[allow(unreachable_patterns)]
            _ => GeometryType::Other,
        }
    }

    /// Check if this is an areal type.
    pub fn is_polygonal(&self) -> bool {
        matches!(self, GeometryType::Polygon | GeometryType::MultiPolygon)
    }

    /// Name used in error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            GeometryType::Point => "Point",
            GeometryType::LineString => "LineString",
            GeometryType::Polygon => "Polygon",
            GeometryType::MultiPoint => "MultiPoint",
            GeometryType::MultiLineString => "MultiLineString",
            GeometryType::MultiPolygon => "MultiPolygon",
            GeometryType::GeometryCollection => "GeometryCollection",
            GeometryType::Other => "Other",
        }
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BBox {
    /// Create a box, swapping reversed bounds.
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            min_x: x1.min(x2),
            min_y: y1.min(y2),
            max_x: x1.max(x2),
            max_y: y1.max(y2),
        }
    }

    /// Compute from a geo-types Rect.
    pub fn from_rect(rect: Rect<f64>) -> Self {
        Self::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
    }

    /// Compute from a polygon.
    pub fn from_polygon(polygon: &Polygon<f64>) -> Option<Self> {
        polygon.bounding_rect().map(Self::from_rect)
    }

    /// Compute from any geometry.
    pub fn from_geometry(geom: &Geometry<f64>) -> Option<Self> {
        geom.bounding_rect().map(Self::from_rect)
    }

    /// Smallest box containing both.
    pub fn union(&self, other: &BBox) -> BBox {
        BBox {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Check if this bbox intersects another (touching counts).
    pub fn intersects(&self, other: &BBox) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// Check if this bbox fully contains another bbox.
    pub fn contains_bbox(&self, other: &BBox) -> bool {
        self.min_x <= other.min_x
            && self.max_x >= other.max_x
            && self.min_y <= other.min_y
            && self.max_y >= other.max_y
    }

    /// Grow by `margin` on every side.
    pub fn expand(&self, margin: f64) -> BBox {
        BBox {
            min_x: self.min_x - margin,
            min_y: self.min_y - margin,
            max_x: self.max_x + margin,
            max_y: self.max_y + margin,
        }
    }

    fn corners(&self) -> [[f64; 2]; 4] {
        [
            [self.min_x, self.min_y],
            [self.max_x, self.min_y],
            [self.max_x, self.max_y],
            [self.min_x, self.max_y],
        ]
    }

    /// Expand outwards to the grid with at least one cell of margin.
    ///
    /// `(-1.1, -2.2, 11.3, 11.4)` with grid 2 becomes `(-4, -6, 14, 14)`.
    pub fn expand_to_grid(&self, grid: f64) -> BBox {
        BBox {
            min_x: ((self.min_x - grid) / grid).floor() * grid,
            min_y: ((self.min_y - grid) / grid).floor() * grid,
            max_x: ((self.max_x + grid) / grid).ceil() * grid,
            max_y: ((self.max_y + grid) / grid).ceil() * grid,
        }
    }

    /// Snap outwards to the grid without margin.
    pub fn snap_to_grid(&self, grid: f64) -> BBox {
        BBox {
            min_x: (self.min_x / grid).floor() * grid,
            min_y: (self.min_y / grid).floor() * grid,
            max_x: (self.max_x / grid).ceil() * grid,
            max_y: (self.max_y / grid).ceil() * grid,
        }
    }

    /// Closed polygon ring of the box (5 vertices).
    pub fn to_polygon(&self) -> Polygon<f64> {
        Rect::new(
            coord! { x: self.min_x, y: self.min_y },
            coord! { x: self.max_x, y: self.max_y },
        )
        .to_polygon()
    }

    /// The R-tree envelope of this box.
    pub fn envelope(&self) -> rstar::AABB<[f64; 2]> {
        rstar::AABB::from_corners([self.min_x, self.min_y], [self.max_x, self.max_y])
    }

    /// The R-tree rectangle primitive of this box.
    pub fn rectangle(&self) -> rstar::primitives::Rectangle<[f64; 2]> {
        rstar::primitives::Rectangle::from_corners(
            [self.min_x, self.min_y],
            [self.max_x, self.max_y],
        )
    }
}

/// Axis along which a box is halved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitAxis {
    /// Split by a vertical line.
    X,
    /// Split by a horizontal line.
    Y,
}

/// Halve a grid-aligned box along its longer side.
///
/// The split line is `floor(mid / grid) * grid`, so the lower half is never
/// larger than the upper one. Returns `None` when the lower half would be
/// narrower than one grid cell.
pub fn halve_on_grid(bbox: &BBox, grid: f64) -> Option<(SplitAxis, BBox, BBox)> {
    let x_center = ((bbox.min_x + bbox.max_x) / 2.0 / grid).floor() * grid;
    let y_center = ((bbox.min_y + bbox.max_y) / 2.0 / grid).floor() * grid;

    if x_center - bbox.min_x > y_center - bbox.min_y {
        if x_center - bbox.min_x < grid {
            return None;
        }
        Some((
            SplitAxis::X,
            BBox::new(bbox.min_x, bbox.min_y, x_center, bbox.max_y),
            BBox::new(x_center, bbox.min_y, bbox.max_x, bbox.max_y),
        ))
    } else {
        if y_center - bbox.min_y < grid {
            return None;
        }
        Some((
            SplitAxis::Y,
            BBox::new(bbox.min_x, bbox.min_y, bbox.max_x, y_center),
            BBox::new(bbox.min_x, y_center, bbox.max_x, bbox.max_y),
        ))
    }
}

/// Intersection dimension of two geometries that meet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum IntersectionDimension {
    /// The geometries meet at isolated points.
    Point = 0,
    /// The geometries share a boundary segment.
    Line = 1,
    /// The geometries overlap.
    Area = 2,
}

impl IntersectionDimension {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// How two polygons meet: overlap area and shared boundary length.
///
/// Contacts of the parts of one feature pair add up to the contact of the
/// whole features, because parts tile their feature without overlap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub area: f64,
    pub length: f64,
}

impl Contact {
    /// Add a contact observed between two other parts of the same pair.
    pub fn merge(&mut self, other: Contact) {
        self.area += other.area;
        self.length += other.length;
    }

    /// Dimension under a length tolerance.
    ///
    /// An overlap counts as area above `tolerance²`, a shared boundary as a
    /// line above `tolerance`. Anything smaller is a point contact.
    pub fn dimension(&self, tolerance: f64) -> IntersectionDimension {
        if self.area > tolerance * tolerance {
            IntersectionDimension::Area
        } else if self.length > tolerance {
            IntersectionDimension::Line
        } else {
            IntersectionDimension::Point
        }
    }
}

/// Measure the contact of two polygons, or `None` when they are disjoint.
pub fn contact(a: &Polygon<f64>, b: &Polygon<f64>) -> Result<Option<Contact>> {
    let length = shared_boundary_length(a, b);
    let matrix = a.relate(b);
    if !matrix.is_intersects() && length == 0.0 {
        return Ok(None);
    }
    let interiors_meet = matrix
        .matches("T********")
        .map_err(|e| EngineError::Internal(format!("DE-9IM pattern: {e:?}")))?;
    let area = if interiors_meet {
        a.intersection(b).unsigned_area()
    } else {
        0.0
    };
    Ok(Some(Contact { area, length }))
}

/// Dimension of `a ∩ b` under a length tolerance, or `None` when disjoint.
pub fn intersection_dimension(
    a: &Polygon<f64>,
    b: &Polygon<f64>,
    tolerance: f64,
) -> Result<Option<IntersectionDimension>> {
    Ok(contact(a, b)?.map(|c| c.dimension(tolerance)))
}

fn rings(polygon: &Polygon<f64>) -> impl Iterator<Item = &LineString<f64>> {
    std::iter::once(polygon.exterior()).chain(polygon.interiors())
}

/// Total length along which the rings of `a` and `b` run together.
///
/// Segments count as collinear when both endpoints of one lie within the
/// snap tolerance of the other's supporting line.
fn shared_boundary_length(a: &Polygon<f64>, b: &Polygon<f64>) -> f64 {
    let (Some(box_a), Some(box_b)) = (BBox::from_polygon(a), BBox::from_polygon(b)) else {
        return 0.0;
    };
    let eps = snap_tolerance(&box_a.union(&box_b));
    if !box_a.expand(eps).intersects(&box_b) {
        return 0.0;
    }

    let segments: RTree<GeomWithData<Rectangle<[f64; 2]>, Line<f64>>> = RTree::bulk_load(
        rings(b)
            .flat_map(|ring| ring.lines())
            .map(|line| {
                let envelope = Rectangle::from_corners(
                    [line.start.x, line.start.y],
                    [line.end.x, line.end.y],
                );
                GeomWithData::new(envelope, line)
            })
            .collect(),
    );

    let mut total = 0.0;
    for s in rings(a).flat_map(|ring| ring.lines()) {
        let len = s.dx().hypot(s.dy());
        if len == 0.0 {
            continue;
        }
        let (ux, uy) = (s.dx() / len, s.dy() / len);
        let along = |c: Coord<f64>| (c.x - s.start.x) * ux + (c.y - s.start.y) * uy;
        let across = |c: Coord<f64>| ((c.y - s.start.y) * ux - (c.x - s.start.x) * uy).abs();

        let query = BBox::new(s.start.x, s.start.y, s.end.x, s.end.y).expand(eps);
        for t in segments.locate_in_envelope_intersecting(&query.envelope()) {
            let t = t.data;
            if across(t.start) > eps || across(t.end) > eps {
                continue;
            }
            let (t0, t1) = (along(t.start), along(t.end));
            let overlap = t0.max(t1).min(len) - t0.min(t1).max(0.0);
            if overlap > 0.0 {
                total += overlap;
            }
        }
    }
    total
}

/// Relative snap distance, scaled by the extent of the operands.
pub const SNAP_RELATIVE_TOLERANCE: f64 = 1e-8;

/// Snap distance for set operations over `extent`.
fn snap_tolerance(extent: &BBox) -> f64 {
    let size = extent.width().max(extent.height());
    let magnitude = extent
        .corners()
        .iter()
        .flatten()
        .fold(0.0_f64, |m, v| m.max(v.abs()));
    (size * SNAP_RELATIVE_TOLERANCE).max(magnitude * f64::EPSILON * 16.0)
}

/// Moves set-operation output back onto exact candidate vertices.
struct VertexSnapper {
    tree: RTree<[f64; 2]>,
    tolerance: f64,
}

impl VertexSnapper {
    fn new(candidates: Vec<[f64; 2]>, tolerance: f64) -> Self {
        Self {
            tree: RTree::bulk_load(candidates),
            tolerance,
        }
    }

    fn snap(&self, c: Coord<f64>) -> Coord<f64> {
        match self.tree.nearest_neighbor(&[c.x, c.y]) {
            Some(p) if (p[0] - c.x).hypot(p[1] - c.y) <= self.tolerance => {
                coord! { x: p[0], y: p[1] }
            }
            _ => c,
        }
    }

    /// Snap every polygon, dropping those that collapse.
    fn snap_multi(&self, multi: MultiPolygon<f64>) -> Vec<Polygon<f64>> {
        multi
            .0
            .iter()
            .filter_map(|p| rebuild(p, |c| self.snap(c)))
            .collect()
    }
}

fn polygon_vertices<'a>(polygons: impl IntoIterator<Item = &'a Polygon<f64>>) -> Vec<[f64; 2]> {
    polygons
        .into_iter()
        .flat_map(|p| p.coords_iter())
        .map(|c| [c.x, c.y])
        .collect()
}

/// Rebuild a polygon through `f`, cleaning the rings it damages.
///
/// Returns `None` when the exterior collapses; collapsed holes are dropped.
fn rebuild(polygon: &Polygon<f64>, f: impl Fn(Coord<f64>) -> Coord<f64>) -> Option<Polygon<f64>> {
    let exterior = clean_ring(polygon.exterior().coords().map(|c| f(*c)))?;
    let interiors = polygon
        .interiors()
        .iter()
        .filter_map(|ring| clean_ring(ring.coords().map(|c| f(*c))))
        .collect();
    let polygon = Polygon::new(exterior, interiors);
    (polygon.unsigned_area() > 0.0).then_some(polygon)
}

/// Drop repeated vertices and zero-width spikes; `None` if the ring collapses.
fn clean_ring(coords: impl IntoIterator<Item = Coord<f64>>) -> Option<LineString<f64>> {
    let mut out: Vec<Coord<f64>> = Vec::new();
    for c in coords {
        if out.last() == Some(&c) {
            continue;
        }
        if out.len() >= 2 && out[out.len() - 2] == c {
            out.pop();
            continue;
        }
        out.push(c);
    }
    // The sequence is cyclic: strip the closing vertex and spikes across it.
    loop {
        let n = out.len();
        if n < 3 {
            return None;
        }
        if out[n - 1] == out[0] {
            out.pop();
        } else if out[n - 1] == out[1] {
            out.remove(0);
            out.pop();
        } else if out[n - 2] == out[0] {
            out.truncate(n - 2);
        } else {
            break;
        }
    }
    out.push(out[0]);
    let ring = LineString::new(out);
    let area = Polygon::new(ring.clone(), vec![]).unsigned_area();
    (area > 0.0).then_some(ring)
}

/// Crossings of a segment with the lines of a box.
///
/// Endpoints are ordered before interpolating, so a segment shared by two
/// rings yields bit-identical crossings whichever way it runs.
fn edge_crossings(line: Line<f64>, bbox: &BBox) -> Vec<[f64; 2]> {
    let (p, q) = if (line.start.x, line.start.y) <= (line.end.x, line.end.y) {
        (line.start, line.end)
    } else {
        (line.end, line.start)
    };
    let mut crossings = Vec::new();
    for x in [bbox.min_x, bbox.max_x] {
        if (p.x - x) * (q.x - x) < 0.0 {
            crossings.push([x, p.y + (x - p.x) * (q.y - p.y) / (q.x - p.x)]);
        }
    }
    for y in [bbox.min_y, bbox.max_y] {
        if (p.y - y) * (q.y - y) < 0.0 {
            crossings.push([p.x + (y - p.y) * (q.x - p.x) / (q.y - p.y), y]);
        }
    }
    crossings
}

/// Parse WKT string to geo-types Geometry.
pub fn parse_wkt(wkt: &str) -> Result<Geometry<f64>> {
    use std::str::FromStr;
    let parsed = wkt::Wkt::<f64>::from_str(wkt)
        .map_err(|e| EngineError::WktParse(format!("{:?}", e)))?;
    Geometry::try_from(parsed).map_err(|e| EngineError::WktParse(format!("{:?}", e)))
}

/// Number of vertices, counting each ring's closing coordinate.
pub fn vertex_count(polygon: &Polygon<f64>) -> usize {
    polygon.coords_count()
}

/// Explode a geometry into its polygon parts.
///
/// Points and lines (including those nested in collections) are dropped.
pub fn polygon_dump(geom: &Geometry<f64>) -> Vec<Polygon<f64>> {
    match geom {
        Geometry::Polygon(p) => vec![p.clone()],
        Geometry::Rect(r) => vec![r.to_polygon()],
        Geometry::Triangle(t) => vec![t.to_polygon()],
        Geometry::MultiPolygon(mp) => mp.0.clone(),
        Geometry::GeometryCollection(gc) => gc.0.iter().flat_map(polygon_dump).collect(),
        _ => Vec::new(),
    }
}

/// Explode a set-operation result, discarding degenerate parts.
pub fn dump_multi(multi: MultiPolygon<f64>) -> Vec<Polygon<f64>> {
    multi
        .0
        .into_iter()
        .filter(|p| p.unsigned_area() > 0.0)
        .collect()
}

/// Clip a polygon to a box.
///
/// Output vertices are exact: input vertices, box corners or crossings from
/// [`edge_crossings`]. A polygon inside the box is returned unchanged.
pub fn clip_to_bbox(polygon: &Polygon<f64>, bbox: &BBox) -> Vec<Polygon<f64>> {
    let Some(extent) = BBox::from_polygon(polygon) else {
        return Vec::new();
    };
    if bbox.contains_bbox(&extent) {
        return vec![polygon.clone()];
    }
    if !bbox.intersects(&extent) {
        return Vec::new();
    }

    let clipped = polygon.intersection(&bbox.to_polygon());
    let mut candidates = polygon_vertices([polygon]);
    candidates.extend(bbox.corners());
    for line in rings(polygon).flat_map(|ring| ring.lines()) {
        candidates.extend(edge_crossings(line, bbox));
    }
    VertexSnapper::new(candidates, snap_tolerance(&extent.union(bbox))).snap_multi(clipped)
}

/// `a - b`, with output vertices snapped back onto the vertices of either.
pub fn subtract(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> Vec<Polygon<f64>> {
    let Some(extent) = a.bounding_rect().map(BBox::from_rect) else {
        return Vec::new();
    };
    let Some(other) = b.bounding_rect().map(BBox::from_rect) else {
        return dump_multi(a.clone());
    };
    if !extent.intersects(&other) {
        return dump_multi(a.clone());
    }

    let remainder = a.difference(b);
    let candidates = polygon_vertices(a.0.iter().chain(b.0.iter()));
    VertexSnapper::new(candidates, snap_tolerance(&extent.union(&other))).snap_multi(remainder)
}

/// Round every coordinate to a multiple of `precision`.
///
/// Rings that collapse are dropped; `None` when the exterior collapses.
/// Zero returns the polygon unchanged.
pub fn snap_to_precision(polygon: &Polygon<f64>, precision: f64) -> Option<Polygon<f64>> {
    if precision == 0.0 {
        return Some(polygon.clone());
    }
    rebuild(polygon, |c| coord! {
        x: (c.x / precision).round() * precision,
        y: (c.y / precision).round() * precision
    })
}

/// Shrink polygons by `tolerance`; zero returns them unchanged.
pub fn shrink(polygons: Vec<Polygon<f64>>, tolerance: f64) -> Vec<Polygon<f64>> {
    if tolerance == 0.0 {
        return polygons;
    }
    polygons
        .iter()
        .flat_map(|p| dump_multi(p.buffer(-tolerance)))
        .collect()
}

/// Dissolve polygons into one multipolygon.
///
/// Inputs are oriented first so mixed ring winding unions correctly.
pub fn dissolve<'a>(polygons: impl IntoIterator<Item = &'a Polygon<f64>>) -> MultiPolygon<f64> {
    let polygons: Vec<Polygon<f64>> = polygons
        .into_iter()
        .map(|p| p.orient(Direction::Default))
        .collect();
    if polygons.len() < 2 {
        return MultiPolygon::new(polygons);
    }
    let Some(extent) = polygons
        .iter()
        .filter_map(BBox::from_polygon)
        .reduce(|a, b| a.union(&b))
    else {
        return MultiPolygon::new(Vec::new());
    };

    let merged = unary_union(&polygons);
    let snapper = VertexSnapper::new(polygon_vertices(&polygons), snap_tolerance(&extent));
    MultiPolygon::new(snapper.snap_multi(merged))
}

/// Check that a polygon is usable by the set operations.
///
/// Returns a human-readable reason on failure.
pub fn check_polygon(polygon: &Polygon<f64>) -> std::result::Result<(), String> {
    if polygon.coords_iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
        return Err("non-finite coordinate".into());
    }
    if polygon.exterior().0.len() < 4 {
        return Err(format!(
            "exterior ring has {} coordinates",
            polygon.exterior().0.len()
        ));
    }
    if let Some(hole) = polygon.interiors().iter().find(|r| r.0.len() < 4) {
        return Err(format!("interior ring has {} coordinates", hole.0.len()));
    }
    if polygon.unsigned_area() == 0.0 {
        return Err("zero area".into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::polygon;

    fn rect(x1: f64, y1: f64, x2: f64, y2: f64) -> Polygon<f64> {
        BBox::new(x1, y1, x2, y2).to_polygon()
    }

    #[test]
    fn test_parse_polygon() {
        let geom = parse_wkt("POLYGON((0 0, 1 0, 1 1, 0 1, 0 0))").unwrap();
        assert!(matches!(geom, Geometry::Polygon(_)));
    }

    #[test]
    fn test_parse_garbage() {
        assert!(matches!(
            parse_wkt("POLYGON((0 0, 1"),
            Err(EngineError::WktParse(_))
        ));
    }

    #[test]
    fn test_expand_to_grid() {
        let bbox = BBox::new(-1.1, -2.2, 11.3, 11.4).expand_to_grid(2.0);
        assert_eq!(bbox, BBox::new(-4.0, -6.0, 14.0, 14.0));
    }

    #[test]
    fn test_bbox_normalises_swapped_bounds() {
        let bbox = BBox::new(5.0, 7.0, 1.0, 2.0);
        assert_eq!(bbox.min_x, 1.0);
        assert_eq!(bbox.max_y, 7.0);
    }

    #[test]
    fn test_halve_longer_axis() {
        let (axis, left, right) = halve_on_grid(&BBox::new(0.0, 0.0, 6.0, 1.0), 1.0).unwrap();
        assert_eq!(axis, SplitAxis::X);
        assert_eq!(left, BBox::new(0.0, 0.0, 3.0, 1.0));
        assert_eq!(right, BBox::new(3.0, 0.0, 6.0, 1.0));

        let (axis, low, high) = halve_on_grid(&BBox::new(0.0, 0.0, 2.0, 8.0), 1.0).unwrap();
        assert_eq!(axis, SplitAxis::Y);
        assert_eq!(low, BBox::new(0.0, 0.0, 2.0, 4.0));
        assert_eq!(high, BBox::new(0.0, 4.0, 2.0, 8.0));
    }

    #[test]
    fn test_halve_snaps_to_grid() {
        let (_, low, high) = halve_on_grid(&BBox::new(0.0, 0.0, 5.0, 1.0), 1.0).unwrap();
        assert_eq!(low.max_x, 2.0);
        assert_eq!(high.min_x, 2.0);
    }

    #[test]
    fn test_halve_rejects_sub_grid() {
        assert!(halve_on_grid(&BBox::new(0.0, 0.0, 1.0, 1.0), 1.0).is_none());
    }

    #[test]
    fn test_vertex_count_rectangle() {
        assert_eq!(vertex_count(&rect(0.0, 0.0, 1.0, 1.0)), 5);
    }

    #[test]
    fn test_polygon_dump_drops_lines() {
        let geom = parse_wkt(
            "GEOMETRYCOLLECTION(POLYGON((0 0, 1 0, 1 1, 0 1, 0 0)), LINESTRING(0 0, 5 5), POINT(3 3))",
        )
        .unwrap();
        let parts = polygon_dump(&geom);
        assert_eq!(parts.len(), 1);
    }

    #[test]
    fn test_polygon_dump_multipolygon() {
        let geom = parse_wkt(
            "MULTIPOLYGON(((0 0, 1 0, 1 1, 0 1, 0 0)), ((5 5, 6 5, 6 6, 5 6, 5 5)))",
        )
        .unwrap();
        assert_eq!(polygon_dump(&geom).len(), 2);
    }

    #[test]
    fn test_intersection_dimension() {
        let r1 = rect(0.0, 0.0, 1.1, 1.0);
        let r2 = rect(1.0, 0.0, 2.0, 1.0);
        let r3 = rect(2.0, 0.0, 3.0, 1.0);
        let r4 = rect(4.0, 0.0, 5.0, 1.0);
        let corner = rect(3.0, 1.0, 4.0, 2.0);

        assert_eq!(
            intersection_dimension(&r1, &r2, 0.001).unwrap(),
            Some(IntersectionDimension::Area)
        );
        assert_eq!(
            intersection_dimension(&r2, &r3, 0.001).unwrap(),
            Some(IntersectionDimension::Line)
        );
        assert_eq!(
            intersection_dimension(&r3, &corner, 0.001).unwrap(),
            Some(IntersectionDimension::Point)
        );
        assert_eq!(intersection_dimension(&r3, &r4, 0.001).unwrap(), None);
    }

    #[test]
    fn test_clip_to_bbox() {
        let parts = clip_to_bbox(&rect(4.0, 1.0, 7.0, 2.0), &BBox::new(5.0, 0.0, 10.0, 3.0));
        assert_eq!(parts.len(), 1);
        assert!((parts[0].unsigned_area() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_contact_below_tolerance_is_point() {
        // Shares a 0.0005 stretch of boundary with `base`.
        let base = rect(0.0, 0.0, 1.0, 1.0);
        let nub = rect(1.0, 0.9995, 2.0, 2.0);
        let measured = contact(&base, &nub).unwrap().unwrap();
        assert!((measured.length - 0.0005).abs() < 1e-12);
        assert_eq!(measured.area, 0.0);
        assert_eq!(measured.dimension(0.001), IntersectionDimension::Point);
        assert_eq!(measured.dimension(0.0), IntersectionDimension::Line);
    }

    #[test]
    fn test_contact_sums_over_parts() {
        let left = rect(0.0, 0.0, 1.0, 1.0);
        let lower = rect(1.0, 0.0, 2.0, 0.0006);
        let upper = rect(1.0, 0.0006, 2.0, 0.0012);
        let mut total = contact(&left, &lower).unwrap().unwrap();
        total.merge(contact(&left, &upper).unwrap().unwrap());
        assert_eq!(total.dimension(0.001), IntersectionDimension::Line);
    }

    #[test]
    fn test_shared_boundary_with_extra_vertices() {
        // Same edge, split by a vertex on one side only.
        let a = rect(0.0, 0.0, 1.0, 1.0);
        let b = polygon![
            (x: 1.0, y: 0.0), (x: 2.0, y: 0.0), (x: 2.0, y: 1.0),
            (x: 1.0, y: 1.0), (x: 1.0, y: 0.5), (x: 1.0, y: 0.0)
        ];
        let measured = contact(&a, &b).unwrap().unwrap();
        assert!((measured.length - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_clip_crossings_are_shared() {
        // Two triangles sharing a slanted edge, clipped by the same box.
        let a = polygon![(x: 0.113, y: 0.271), (x: 1.483, y: 0.271), (x: 1.483, y: 1.641)];
        let b = polygon![(x: 0.113, y: 0.271), (x: 1.483, y: 1.641), (x: 0.113, y: 1.641)];
        let bbox = BBox::new(0.0, 0.0, 1.0, 1.0);
        let coords = |parts: Vec<Polygon<f64>>| -> Vec<(f64, f64)> {
            parts.iter().flat_map(|p| p.exterior().coords().map(|c| (c.x, c.y)).collect::<Vec<_>>()).collect()
        };
        let from_a = coords(clip_to_bbox(&a, &bbox));
        let from_b = coords(clip_to_bbox(&b, &bbox));
        // The diagonal leaves the box through its top edge.
        let crossing_a: Vec<_> = from_a.iter().filter(|v| v.1 == 1.0 && v.0 < 1.0).collect();
        assert!(!crossing_a.is_empty());
        for v in crossing_a {
            assert!(from_b.contains(v), "crossing {v:?} missing from the neighbour");
        }
        for v in from_a.iter().chain(&from_b) {
            assert!(v.0 >= 0.0 && v.0 <= 1.0 && v.1 >= 0.0 && v.1 <= 1.0);
        }
    }

    #[test]
    fn test_clip_inside_is_unchanged() {
        let inner = rect(0.113, 0.271, 0.5, 0.6);
        assert_eq!(clip_to_bbox(&inner, &BBox::new(0.0, 0.0, 1.0, 1.0)), vec![inner]);
    }

    #[test]
    fn test_subtract_full_cover_leaves_nothing() {
        let square = MultiPolygon::new(vec![rect(0.113, 0.271, 2.853, 3.011)]);
        let halves = MultiPolygon::new(vec![
            polygon![(x: 0.113, y: 0.271), (x: 2.853, y: 0.271), (x: 2.853, y: 3.011)],
            polygon![(x: 0.113, y: 0.271), (x: 2.853, y: 3.011), (x: 0.113, y: 3.011)],
        ]);
        assert!(subtract(&square, &halves).is_empty());
    }

    #[test]
    fn test_snap_to_precision() {
        let snapped = snap_to_precision(&rect(0.1130000004, 0.0, 1.0, 0.9999999996), 1e-6).unwrap();
        let bbox = BBox::from_polygon(&snapped).unwrap();
        assert!((bbox.min_x - 0.113).abs() < 1e-15);
        assert!((bbox.max_y - 1.0).abs() < 1e-15);
        assert!(snap_to_precision(&rect(0.0, 0.0, 1.0, 1e-8), 1e-6).is_none());
    }

    #[test]
    fn test_clean_ring_drops_spikes() {
        let ring = clean_ring(
            [(0.0, 0.0), (2.0, 0.0), (3.0, 0.0), (2.0, 0.0), (2.0, 2.0), (0.0, 2.0), (0.0, 0.0)]
                .map(|(x, y)| coord! { x: x, y: y }),
        )
        .unwrap();
        assert_eq!(ring.0.len(), 5);
        assert!(clean_ring([(0.0, 0.0), (1.0, 0.0), (0.0, 0.0)].map(|(x, y)| coord! { x: x, y: y })).is_none());
    }

    #[test]
    fn test_clip_on_edge_is_empty() {
        let parts = clip_to_bbox(&rect(0.0, 0.0, 2.0, 1.0), &BBox::new(2.0, 0.0, 4.0, 1.0));
        assert!(parts.is_empty());
    }

    #[test]
    fn test_dissolve_adjacent() {
        let a = rect(0.0, 0.0, 1.0, 1.0);
        let b = rect(1.0, 0.0, 2.0, 1.0);
        let dissolved = dissolve([&a, &b]);
        assert!((dissolved.unsigned_area() - 2.0).abs() < 1e-9);
        assert_eq!(dissolved.0.len(), 1);
    }

    #[test]
    fn test_shrink_rectangle() {
        let shrunk = shrink(vec![rect(0.0, 0.0, 10.0, 10.0)], 0.5);
        assert_eq!(shrunk.len(), 1);
        assert!((shrunk[0].unsigned_area() - 81.0).abs() < 1e-6);
    }

    #[test]
    fn test_check_polygon() {
        assert!(check_polygon(&rect(0.0, 0.0, 1.0, 1.0)).is_ok());

        let flat = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 2.0, y: 0.0)];
        assert!(check_polygon(&flat).is_err());

        let nan = polygon![(x: 0.0, y: 0.0), (x: f64::NAN, y: 0.0), (x: 1.0, y: 1.0)];
        assert!(check_polygon(&nan).is_err());
    }
}
