//! Gap detection against a reference boundary.
//!
//! The boundary, optionally restricted to the units the layer declares, is
//! shrunk by a tolerance and cut into pieces of bounded extent and vertex
//! count. The interior of every leaf partition is then subtracted, one leaf
//! at a time in ascending id order, from the pieces whose box touches it.
//! Whatever survives the last leaf is not covered by any feature.
//!
//! Both operands of each subtraction, and its result, are rounded to the
//! configured precision, so a piece edge and an interior edge that agree up
//! to that precision coincide exactly and leave no sliver behind.

use geo_types::{MultiPolygon, Polygon};
use serde::Serialize;

use crate::cancel::CancelHandle;
use crate::config::GapConfig;
use crate::error::{EngineError, Result};
use crate::geometry::{
    clip_to_bbox, polygon_dump, shrink, snap_to_precision, subtract, vertex_count, BBox,
};
use crate::layer::{AttrValue, BoundaryLayer, FeatureId, FeatureLayer};
use crate::marginal::InteriorTable;
use crate::partition::PartitionedLayer;

/// One uncovered piece of the boundary.
#[derive(Debug, Clone, Serialize)]
pub struct GapPolygon {
    pub id: u64,
    #[serde(skip)]
    pub geom: Polygon<f64>,
    pub bbox: BBox,
}

/// Limits a gap piece must satisfy before subtraction.
#[derive(Debug, Clone, Copy)]
struct PieceLimits {
    grid_size: f64,
    max_piece_size: f64,
    max_vertices: usize,
}

impl PieceLimits {
    fn exceeded_by(&self, piece: &Piece) -> bool {
        piece.bbox.width() > self.max_piece_size
            || piece.bbox.height() > self.max_piece_size
            || vertex_count(&piece.geom) > self.max_vertices
    }
}

#[derive(Debug, Clone)]
struct Piece {
    geom: Polygon<f64>,
    bbox: BBox,
}

impl Piece {
    fn new(geom: Polygon<f64>) -> Option<Self> {
        let bbox = BBox::from_polygon(&geom)?;
        Some(Self { geom, bbox })
    }
}

/// Halve a piece on the grid along the longer side of its snapped box.
///
/// Returns `None` when the lower half would be narrower than one grid cell.
fn split_piece(piece: &Piece, grid: f64) -> Option<Vec<Polygon<f64>>> {
    let b = piece.bbox.snap_to_grid(grid);
    let (low, high) = if b.width() >= b.height() {
        let x_center = ((b.min_x + b.max_x) / 2.0 / grid).floor() * grid;
        if x_center - b.min_x < grid {
            return None;
        }
        (
            BBox::new(b.min_x, b.min_y, x_center, b.max_y),
            BBox::new(x_center, b.min_y, b.max_x, b.max_y),
        )
    } else {
        let y_center = ((b.min_y + b.max_y) / 2.0 / grid).floor() * grid;
        if y_center - b.min_y < grid {
            return None;
        }
        (
            BBox::new(b.min_x, b.min_y, b.max_x, y_center),
            BBox::new(b.min_x, y_center, b.max_x, b.max_y),
        )
    };
    let mut halves = clip_to_bbox(&piece.geom, &low);
    halves.extend(clip_to_bbox(&piece.geom, &high));
    Some(halves)
}

/// The gap table.
#[derive(Debug, Clone, Default)]
pub struct GapTable {
    rows: Vec<GapPolygon>,
}

impl GapTable {
    /// Compute the uncovered parts of `boundary`.
    pub fn build(
        layer: &FeatureLayer,
        index: &PartitionedLayer,
        interiors: &InteriorTable,
        boundary: &BoundaryLayer,
        config: &GapConfig,
        cancel: &CancelHandle,
    ) -> Result<Self> {
        boundary.check_srid(layer)?;
        let table = format!("gap_{}", index.layer_name());
        let limits = PieceLimits {
            grid_size: index.grid_size(),
            max_piece_size: config.max_piece_size,
            max_vertices: index.max_vertices(),
        };

        let seeds = select_boundary(layer, boundary, config.boundary_unit_column.as_deref())?;
        let mut pieces: Vec<Piece> = shrink(seeds, config.boundary_tolerance)
            .into_iter()
            .filter_map(Piece::new)
            .collect();
        tracing::debug!(table = %table, pieces = pieces.len(), "gap table seeded from boundary");

        for interior in interiors.iter() {
            cancel.check(&table)?;
            split_until_bounded(&mut pieces, &limits, &table, cancel)?;

            let interior_geom = MultiPolygon::new(
                interior
                    .geom
                    .0
                    .iter()
                    .filter_map(|p| snap_to_precision(p, config.snap_precision))
                    .collect(),
            );
            let mut subtracted = 0usize;
            let mut next: Vec<Piece> = Vec::with_capacity(pieces.len());
            for piece in pieces {
                if !piece.bbox.intersects(&interior.bbox) {
                    next.push(piece);
                    continue;
                }
                subtracted += 1;
                let Some(geom) = snap_to_precision(&piece.geom, config.snap_precision) else {
                    continue;
                };
                let remainder = subtract(&MultiPolygon::new(vec![geom]), &interior_geom);
                next.extend(
                    remainder
                        .iter()
                        .filter_map(|p| snap_to_precision(p, config.snap_precision))
                        .filter_map(Piece::new),
                );
            }
            pieces = next;
            tracing::trace!(
                partition_id = interior.partition_id,
                subtracted,
                remaining = pieces.len(),
                "partition interior subtracted"
            );
        }
        split_until_bounded(&mut pieces, &limits, &table, cancel)?;

        let rows: Vec<GapPolygon> = pieces
            .into_iter()
            .enumerate()
            .map(|(i, p)| GapPolygon {
                id: i as u64 + 1,
                geom: p.geom,
                bbox: p.bbox,
            })
            .collect();
        tracing::debug!(table = %table, gaps = rows.len(), "gap table filled");
        Ok(Self { rows })
    }

    pub fn iter(&self) -> impl Iterator<Item = &GapPolygon> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Gap polygons as one multipolygon.
    pub fn to_multi_polygon(&self) -> MultiPolygon<f64> {
        MultiPolygon::new(self.rows.iter().map(|r| r.geom.clone()).collect())
    }
}

/// Split every over-limit piece until a pass splits nothing.
fn split_until_bounded(
    pieces: &mut Vec<Piece>,
    limits: &PieceLimits,
    table: &str,
    cancel: &CancelHandle,
) -> Result<()> {
    loop {
        cancel.check(table)?;
        let mut split_count = 0usize;
        let mut next: Vec<Piece> = Vec::with_capacity(pieces.len());
        for piece in pieces.drain(..) {
            if !limits.exceeded_by(&piece) {
                next.push(piece);
                continue;
            }
            match split_piece(&piece, limits.grid_size) {
                Some(halves) => {
                    split_count += 1;
                    next.extend(halves.into_iter().filter_map(Piece::new));
                }
                None => next.push(piece),
            }
        }
        *pieces = next;
        if split_count == 0 {
            return Ok(());
        }
        tracing::trace!(split_count, pieces = pieces.len(), "gap pieces split");
    }
}

/// Boundary polygons relevant to the layer.
///
/// With a unit column, only units whose value occurs in the layer are kept.
fn select_boundary(
    layer: &FeatureLayer,
    boundary: &BoundaryLayer,
    unit_column: Option<&str>,
) -> Result<Vec<Polygon<f64>>> {
    let Some(column) = unit_column else {
        return Ok(boundary.units.iter().flat_map(|u| polygon_dump(&u.geom)).collect());
    };

    let declared = layer.distinct_values(column)?;
    let mut selected = Vec::new();
    for (i, unit) in boundary.units.iter().enumerate() {
        let value = unit_value(boundary, i, column)?;
        if declared.iter().any(|d| d.sql_eq(value) == Some(true)) {
            selected.extend(polygon_dump(&unit.geom));
        }
    }
    tracing::debug!(
        boundary = %boundary.name,
        column,
        declared = declared.len(),
        selected = selected.len(),
        "boundary units selected"
    );
    Ok(selected)
}

fn unit_value<'a>(boundary: &'a BoundaryLayer, i: usize, column: &str) -> Result<&'a AttrValue> {
    boundary
        .units
        .get(i)
        .and_then(|u| u.attributes.get(column))
        .ok_or_else(|| EngineError::MissingColumn {
            layer: boundary.name.clone(),
            fid: i as FeatureId,
            column: column.to_string(),
        })
}

/// Features whose unit value is null or matches no boundary unit.
///
/// Such features never select a boundary unit, so their area is not checked
/// for gaps.
pub fn unknown_unit_features(
    layer: &FeatureLayer,
    boundary: &BoundaryLayer,
    column: &str,
) -> Result<Vec<FeatureId>> {
    let known: Vec<&AttrValue> = (0..boundary.units.len())
        .map(|i| unit_value(boundary, i, column))
        .collect::<Result<_>>()?;

    let mut unknown = Vec::new();
    for feature in &layer.features {
        let value = feature.attr(&layer.name, column)?;
        if !known.iter().any(|k| k.sql_eq(value) == Some(true)) {
            unknown.push(feature.fid);
        }
    }
    unknown.sort_unstable();
    Ok(unknown)
}
