//! Adaptive partition index.
//!
//! Builds a forest of axis-aligned rectangles over one polygon layer such
//! that every leaf carries a bounded number of vertices. The builder:
//! 1. Extracts the layer extent and expands it to the grid with a margin
//! 2. Inserts one root partition and assigns every polygon part to it
//! 3. Caches the vertex count of every partition whose cache is unset
//! 4. Halves every oversized leaf along its longer side
//! 5. Moves parts lying inside one child, clips parts straddling the split
//! 6. Deletes the superseded parents and their assignments
//!
//! Steps 3-6 repeat until a pass performs no split. Each step is a bulk
//! transform over the whole partition or feature table.
//!
//! # Usage
//!
//! ```ignore
//! let config = PartitionConfig::new(1.0, 50_000);
//! let index = PartitionedLayer::build(&layer, &config, &CancelHandle::new())?;
//!
//! for leaf in index.partitions().iter() {
//!     let parts = index.parts_in(leaf.partition_id);
//! }
//! ```

use geo::Area;
use geo_types::{MultiPolygon, Polygon};
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::RTree;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::cancel::CancelHandle;
use crate::config::PartitionConfig;
use crate::error::Result;
use crate::geometry::{clip_to_bbox, dissolve, halve_on_grid, vertex_count, BBox};
use crate::layer::{FeatureId, FeatureLayer};

/// Partition identifier, assigned sequentially from 1.
pub type PartitionId = u32;

/// R-tree entry pointing at a row of the feature table.
pub type PartEnvelope = GeomWithData<Rectangle<[f64; 2]>, usize>;

/// One row of the partition table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Partition {
    pub partition_id: PartitionId,

    /// Parent this partition was halved from; `None` for the root.
    pub superpartition_id: Option<PartitionId>,

    /// Cached vertex count of the assigned parts; `None` until computed.
    pub num_vertices: Option<usize>,

    pub bbox: BBox,
}

/// One row of the feature table: a polygon part clipped to a leaf.
#[derive(Debug, Clone)]
pub struct FeaturePart {
    pub fid: FeatureId,
    pub partition_id: PartitionId,
    pub geom: Polygon<f64>,
    pub bbox: BBox,
}

impl FeaturePart {
    fn new(fid: FeatureId, partition_id: PartitionId, geom: Polygon<f64>) -> Option<Self> {
        let bbox = BBox::from_polygon(&geom)?;
        Some(Self {
            fid,
            partition_id,
            geom,
            bbox,
        })
    }
}

/// The partition table.
#[derive(Debug, Clone)]
pub struct PartitionTable {
    rows: Vec<Partition>,
    next_id: PartitionId,
}

impl PartitionTable {
    fn new() -> Self {
        Self {
            rows: Vec::new(),
            next_id: 1,
        }
    }

    fn insert(&mut self, superpartition_id: Option<PartitionId>, bbox: BBox) -> PartitionId {
        let partition_id = self.next_id;
        self.next_id += 1;
        self.rows.push(Partition {
            partition_id,
            superpartition_id,
            num_vertices: None,
            bbox,
        });
        partition_id
    }

    pub fn get(&self, partition_id: PartitionId) -> Option<&Partition> {
        self.rows.iter().find(|p| p.partition_id == partition_id)
    }

    /// Rows in ascending partition id order.
    pub fn iter(&self) -> impl Iterator<Item = &Partition> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// The feature assignment table.
#[derive(Debug, Clone, Default)]
pub struct FeatureTable {
    rows: Vec<FeaturePart>,
}

impl FeatureTable {
    pub fn iter(&self) -> impl Iterator<Item = &FeaturePart> {
        self.rows.iter()
    }

    pub fn get(&self, row: usize) -> Option<&FeaturePart> {
        self.rows.get(row)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Parts of one feature across every leaf.
    pub fn parts_of(&self, fid: FeatureId) -> impl Iterator<Item = &FeaturePart> {
        self.rows.iter().filter(move |p| p.fid == fid)
    }
}

/// Statistics collected while partitioning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartitionStats {
    /// Number of split passes run, including the final no-op pass.
    pub passes: u64,

    /// Number of partitions halved.
    pub splits: u64,

    /// Oversized leaves whose split was rejected in the last pass.
    pub rejected_splits: u64,

    /// Parts moved into a child without clipping.
    pub moved_parts: u64,

    /// Parts produced by clipping a straddling part.
    pub clipped_parts: u64,

    /// Leaf partitions after convergence.
    pub leaves: u64,

    /// Feature assignments after convergence.
    pub assignments: u64,
}

/// A layer together with its partition and feature tables.
#[derive(Debug, Clone)]
pub struct PartitionedLayer {
    layer_name: String,
    grid_size: f64,
    max_vertices: usize,
    partitions: PartitionTable,
    features: FeatureTable,
    stats: PartitionStats,
}

impl PartitionedLayer {
    /// Partition a layer.
    ///
    /// An empty layer yields empty tables.
    pub fn build(
        layer: &FeatureLayer,
        config: &PartitionConfig,
        cancel: &CancelHandle,
    ) -> Result<Self> {
        let mut index = Self::empty(&layer.name, config);

        let Some(extent) = extract_extent(layer) else {
            tracing::debug!(layer = %layer.name, "layer is empty, nothing to partition");
            return Ok(index);
        };
        let root_bbox = extent.expand_to_grid(index.grid_size);
        let root_id = index.fill_initial_partition(root_bbox);
        index.fill_initial_features(layer, root_id);
        index.update_num_vertices();

        index.refine(cancel)?;
        Ok(index)
    }

    fn empty(layer_name: &str, config: &PartitionConfig) -> Self {
        Self {
            layer_name: layer_name.to_string(),
            grid_size: config.grid_size,
            max_vertices: config.max_vertices,
            partitions: PartitionTable::new(),
            features: FeatureTable::default(),
            stats: PartitionStats::default(),
        }
    }

    /// Run split passes until one performs no split.
    ///
    /// Returns the number of splits performed; zero on a converged index.
    pub fn refine(&mut self, cancel: &CancelHandle) -> Result<u64> {
        let table = format!("partition_{}", self.layer_name);
        let mut total = 0u64;
        loop {
            cancel.check(&table)?;
            self.stats.passes += 1;

            let splits = self.split_partitions();
            if splits.is_empty() {
                break;
            }
            total += splits.len() as u64;
            self.fill_subpartitions(&splits);
            self.delete_superitems(&splits);
            self.update_num_vertices();
        }

        self.stats.leaves = self.partitions.len() as u64;
        self.stats.assignments = self.features.len() as u64;
        tracing::debug!(
            layer = %self.layer_name,
            splits = total,
            leaves = self.stats.leaves,
            assignments = self.stats.assignments,
            "partition refinement converged"
        );
        Ok(total)
    }

    fn fill_initial_partition(&mut self, bbox: BBox) -> PartitionId {
        self.partitions.insert(None, bbox)
    }

    fn fill_initial_features(&mut self, layer: &FeatureLayer, root_id: PartitionId) {
        self.features.rows = layer
            .features
            .iter()
            .flat_map(|f| {
                f.polygons()
                    .into_iter()
                    .filter_map(move |p| FeaturePart::new(f.fid, root_id, p))
            })
            .collect();
    }

    /// Fill the vertex cache of every partition whose cache is unset.
    fn update_num_vertices(&mut self) {
        let mut sums: FxHashMap<PartitionId, usize> = FxHashMap::default();
        for part in &self.features.rows {
            *sums.entry(part.partition_id).or_default() += vertex_count(&part.geom);
        }

        let mut updated = 0usize;
        for partition in self.partitions.rows.iter_mut() {
            if partition.num_vertices.is_none() {
                partition.num_vertices = Some(sums.get(&partition.partition_id).copied().unwrap_or(0));
                updated += 1;
            }
        }
        tracing::trace!(updated, "partition vertex counts updated");
    }

    /// Halve every partition over the vertex budget.
    ///
    /// Returns a map from each split parent to its two children.
    fn split_partitions(&mut self) -> FxHashMap<PartitionId, [PartitionId; 2]> {
        let oversized: Vec<(PartitionId, BBox)> = self
            .partitions
            .rows
            .iter()
            .filter(|p| p.num_vertices.is_some_and(|n| n > self.max_vertices))
            .map(|p| (p.partition_id, p.bbox))
            .collect();

        let mut splits = FxHashMap::default();
        let mut rejected = 0u64;
        for (parent_id, bbox) in oversized {
            match halve_on_grid(&bbox, self.grid_size) {
                Some((axis, low, high)) => {
                    let low_id = self.partitions.insert(Some(parent_id), low);
                    let high_id = self.partitions.insert(Some(parent_id), high);
                    splits.insert(parent_id, [low_id, high_id]);
                    tracing::trace!(partition_id = parent_id, ?axis, "partition split");
                }
                None => {
                    rejected += 1;
                    tracing::debug!(
                        partition_id = parent_id,
                        grid_size = self.grid_size,
                        "split rejected, half would be smaller than one grid cell"
                    );
                }
            }
        }

        self.stats.splits += splits.len() as u64;
        self.stats.rejected_splits = rejected;
        tracing::debug!(
            layer = %self.layer_name,
            splits = splits.len(),
            rejected,
            "partitions split"
        );
        splits
    }

    /// Assign the parts of split parents to their children.
    ///
    /// Parent rows are left in place for [`Self::delete_superitems`].
    fn fill_subpartitions(&mut self, splits: &FxHashMap<PartitionId, [PartitionId; 2]>) {
        let child_boxes: FxHashMap<PartitionId, BBox> = self
            .partitions
            .rows
            .iter()
            .filter(|p| p.superpartition_id.is_some_and(|s| splits.contains_key(&s)))
            .map(|p| (p.partition_id, p.bbox))
            .collect();

        let mut moved = 0u64;
        let mut inserted: Vec<FeaturePart> = Vec::new();
        for part in self.features.rows.iter_mut() {
            let Some(children) = splits.get(&part.partition_id) else {
                continue;
            };
            let covering = children.iter().copied().find(|child| {
                child_boxes
                    .get(child)
                    .is_some_and(|bbox| bbox.contains_bbox(&part.bbox))
            });
            if let Some(child) = covering {
                part.partition_id = child;
                moved += 1;
                continue;
            }
            for child in children {
                let Some(bbox) = child_boxes.get(child) else {
                    continue;
                };
                inserted.extend(
                    clip_to_bbox(&part.geom, bbox)
                        .into_iter()
                        .filter_map(|geom| FeaturePart::new(part.fid, *child, geom)),
                );
            }
        }

        self.stats.moved_parts += moved;
        self.stats.clipped_parts += inserted.len() as u64;
        tracing::debug!(
            moved,
            clipped = inserted.len(),
            "parts assigned to subpartitions"
        );
        self.features.rows.extend(inserted);
    }

    /// Delete split parents and the parts still assigned to them.
    fn delete_superitems(&mut self, splits: &FxHashMap<PartitionId, [PartitionId; 2]>) {
        let parts_before = self.features.rows.len();
        self.features
            .rows
            .retain(|p| !splits.contains_key(&p.partition_id));

        let partitions_before = self.partitions.rows.len();
        self.partitions
            .rows
            .retain(|p| !splits.contains_key(&p.partition_id));

        tracing::debug!(
            parts = parts_before - self.features.rows.len(),
            partitions = partitions_before - self.partitions.rows.len(),
            "superitems deleted"
        );
    }

    pub fn layer_name(&self) -> &str {
        &self.layer_name
    }

    pub fn grid_size(&self) -> f64 {
        self.grid_size
    }

    pub fn max_vertices(&self) -> usize {
        self.max_vertices
    }

    /// Leaf partitions.
    pub fn partitions(&self) -> &PartitionTable {
        &self.partitions
    }

    /// Feature assignments.
    pub fn features(&self) -> &FeatureTable {
        &self.features
    }

    pub fn stats(&self) -> &PartitionStats {
        &self.stats
    }

    /// Parts assigned to one leaf.
    pub fn parts_in(&self, partition_id: PartitionId) -> impl Iterator<Item = &FeaturePart> {
        self.features
            .rows
            .iter()
            .filter(move |p| p.partition_id == partition_id)
    }

    /// Feature-table row indices grouped by leaf.
    pub fn rows_by_partition(&self) -> FxHashMap<PartitionId, Vec<usize>> {
        let mut grouped: FxHashMap<PartitionId, Vec<usize>> = FxHashMap::default();
        for (row, part) in self.features.rows.iter().enumerate() {
            grouped.entry(part.partition_id).or_default().push(row);
        }
        grouped
    }

    /// Bulk-loaded R-tree over the part boxes, keyed by feature-table row.
    pub fn part_tree(&self) -> RTree<PartEnvelope> {
        RTree::bulk_load(
            self.features
                .rows
                .iter()
                .enumerate()
                .map(|(row, part)| GeomWithData::new(part.bbox.rectangle(), row))
                .collect(),
        )
    }

    /// Reassemble one feature from its parts.
    pub fn feature_geometry(&self, fid: FeatureId) -> MultiPolygon<f64> {
        dissolve(self.features.parts_of(fid).map(|p| &p.geom))
    }

    /// Clipped area of one feature summed over its parts.
    pub fn feature_area(&self, fid: FeatureId) -> f64 {
        self.features
            .parts_of(fid)
            .map(|p| p.geom.unsigned_area())
            .sum()
    }
}

/// Bounding box of the whole layer.
pub fn extract_extent(layer: &FeatureLayer) -> Option<BBox> {
    layer.extent()
}
