//! Neighbour graph over a partitioned layer.
//!
//! Every leaf's parts are joined against every part whose box touches them,
//! so pairs meeting across a partition border are found as well as pairs
//! sharing a leaf. Observations are oriented `fida < fidb` and their contacts
//! are added up per pair. The pair's dimension is read from the total under
//! the length tolerance, so a boundary cut into several leaves classifies the
//! same as the uncut one. Pairs are then mirrored.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::cancel::CancelHandle;
use crate::dedup::{dedup_keep_first, merge_contacts, PairObservation};
use crate::error::Result;
use crate::geometry::{contact, IntersectionDimension};
use crate::layer::FeatureId;
use crate::partition::PartitionedLayer;

/// One directed adjacency edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighbourEdge {
    pub fida: FeatureId,
    pub fidb: FeatureId,
    pub dim: IntersectionDimension,
}

/// Symmetric adjacency table.
#[derive(Debug, Clone, Default)]
pub struct NeighbourTable {
    edges: Vec<NeighbourEdge>,
    adjacency: FxHashMap<FeatureId, Vec<FeatureId>>,
}

impl NeighbourTable {
    /// Build the adjacency table of a partitioned layer.
    ///
    /// Shared boundaries up to `tolerance` long count as point contacts.
    pub fn build(
        index: &PartitionedLayer,
        tolerance: f64,
        cancel: &CancelHandle,
    ) -> Result<Self> {
        let table = format!("neighbour_{}", index.layer_name());
        let tree = index.part_tree();
        let rows = index.rows_by_partition();

        let mut observations: Vec<PairObservation> = Vec::new();
        let mut candidates = 0usize;
        for leaf in index.partitions().iter() {
            cancel.check(&table)?;
            let Some(leaf_rows) = rows.get(&leaf.partition_id) else {
                continue;
            };
            for &row in leaf_rows {
                let Some(part) = index.features().get(row) else {
                    continue;
                };
                for hit in tree.locate_in_envelope_intersecting(&part.bbox.envelope()) {
                    let Some(other) = index.features().get(hit.data) else {
                        continue;
                    };
                    if part.fid >= other.fid {
                        continue;
                    }
                    candidates += 1;
                    if let Some(found) = contact(&part.geom, &other.geom)? {
                        observations.push(PairObservation::oriented(part.fid, other.fid, found));
                    }
                }
            }
        }

        let pairs = merge_contacts(observations);
        tracing::debug!(
            table = %table,
            candidates,
            pairs = pairs.len(),
            tolerance,
            "neighbouring pairs found"
        );
        Ok(Self::from_pairs(pairs, tolerance))
    }

    /// Insert each pair and its inverse.
    fn from_pairs(pairs: Vec<PairObservation>, tolerance: f64) -> Self {
        let mut edges: Vec<NeighbourEdge> = pairs
            .iter()
            .flat_map(|p| {
                let dim = p.contact.dimension(tolerance);
                [
                    NeighbourEdge {
                        fida: p.fida,
                        fidb: p.fidb,
                        dim,
                    },
                    NeighbourEdge {
                        fida: p.fidb,
                        fidb: p.fida,
                        dim,
                    },
                ]
            })
            .collect();
        edges.sort_by_key(|e| (e.fida, e.fidb));

        let mut adjacency: FxHashMap<FeatureId, Vec<FeatureId>> = FxHashMap::default();
        for edge in &edges {
            adjacency.entry(edge.fida).or_default().push(edge.fidb);
        }
        Self { edges, adjacency }
    }

    /// All directed edges sorted by `(fida, fidb)`.
    pub fn edges(&self) -> &[NeighbourEdge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Ids of the features adjacent to `fid`, ascending.
    pub fn neighbours_of(&self, fid: FeatureId) -> &[FeatureId] {
        self.adjacency.get(&fid).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Dimension of the edge `a -> b`, if any.
    pub fn dimension(&self, a: FeatureId, b: FeatureId) -> Option<IntersectionDimension> {
        self.edges
            .binary_search_by_key(&(a, b), |e| (e.fida, e.fidb))
            .ok()
            .map(|i| self.edges[i].dim)
    }

    /// Features with at least one neighbour, ascending.
    pub fn features(&self) -> Vec<FeatureId> {
        dedup_keep_first(self.edges.iter().map(|e| e.fida))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PartitionConfig, DEFAULT_LENGTH_TOLERANCE};
    use crate::geometry::BBox;
    use crate::layer::{Feature, FeatureLayer};

    fn strip_layer() -> FeatureLayer {
        let rects = [
            (1, BBox::new(0.0, 0.0, 1.1, 1.0)),
            (2, BBox::new(1.0, 0.0, 2.0, 1.0)),
            (3, BBox::new(2.0, 0.0, 3.0, 1.0)),
            (4, BBox::new(4.0, 0.0, 5.0, 1.0)),
            (5, BBox::new(5.0, 0.0, 6.0, 1.0)),
        ];
        rects.into_iter().fold(FeatureLayer::new("mylayer", 4326), |layer, (fid, bbox)| {
            layer.with_feature(Feature::new(fid, bbox.to_polygon()))
        })
    }

    fn build(layer: &FeatureLayer, max_vertices: usize) -> NeighbourTable {
        let cancel = CancelHandle::new();
        let index = PartitionedLayer::build(layer, &PartitionConfig::new(1.0, max_vertices), &cancel).unwrap();
        NeighbourTable::build(&index, DEFAULT_LENGTH_TOLERANCE, &cancel).unwrap()
    }

    fn triples(table: &NeighbourTable) -> Vec<(FeatureId, FeatureId, u8)> {
        table
            .edges()
            .iter()
            .map(|e| (e.fida, e.fidb, e.dim.as_u8()))
            .collect()
    }

    #[test]
    fn test_fill() {
        let table = build(&strip_layer(), 50_000);
        assert_eq!(
            triples(&table),
            vec![(1, 2, 2), (2, 1, 2), (2, 3, 1), (3, 2, 1), (4, 5, 1), (5, 4, 1)]
        );
    }

    #[test]
    fn test_fill_across_partitions() {
        // A budget of 5 vertices leaves at most one rectangle per leaf.
        let single = build(&strip_layer(), 50_000);
        let split = build(&strip_layer(), 5);
        assert_eq!(triples(&split), triples(&single));
    }

    #[test]
    fn test_symmetric() {
        let table = build(&strip_layer(), 7);
        for edge in table.edges() {
            assert_eq!(table.dimension(edge.fidb, edge.fida), Some(edge.dim));
        }
    }

    #[test]
    fn test_point_touch() {
        let layer = FeatureLayer::new("corners", 3035)
            .with_feature(Feature::new(1, BBox::new(0.0, 0.0, 1.0, 1.0).to_polygon()))
            .with_feature(Feature::new(2, BBox::new(1.0, 1.0, 2.0, 2.0).to_polygon()));
        let table = build(&layer, 50_000);
        assert_eq!(table.dimension(1, 2), Some(IntersectionDimension::Point));
    }

    #[test]
    fn test_short_shared_boundary_is_point() {
        // 2 and 3 share 0.0005 of boundary; 1 and 2 share 0.0015 over two leaves.
        let layer = FeatureLayer::new("slivers", 3035)
            .with_feature(Feature::new(1, BBox::new(0.0, 0.0, 4.0, 1.0).to_polygon()))
            .with_feature(Feature::new(2, BBox::new(1.9995, 1.0, 2.001, 2.0).to_polygon()))
            .with_feature(Feature::new(3, BBox::new(2.001, 1.9995, 3.0, 3.0).to_polygon()));
        for max_vertices in [50_000, 5] {
            let table = build(&layer, max_vertices);
            assert_eq!(table.dimension(1, 2), Some(IntersectionDimension::Line));
            assert_eq!(table.dimension(2, 3), Some(IntersectionDimension::Point));
        }
    }

    #[test]
    fn test_neighbours_of() {
        let table = build(&strip_layer(), 50_000);
        assert_eq!(table.neighbours_of(2), &[1, 3]);
        assert_eq!(table.neighbours_of(3), &[2]);
        assert!(table.neighbours_of(99).is_empty());
        assert_eq!(table.features(), vec![1, 2, 3, 4, 5]);
    }
}
