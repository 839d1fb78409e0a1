//! Interior, exterior and marginal tables.
//!
//! The interior of a leaf is the dissolved union of its parts; the exterior
//! is the leaf rectangle minus that interior. A feature is marginal when its
//! parts share more than the length tolerance of boundary with the exteriors,
//! which means it touches the uncovered edge of the dataset rather than an
//! internal partition border.

use geo_types::{MultiPolygon, Polygon};
use rstar::primitives::GeomWithData;
use rstar::RTree;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::cancel::CancelHandle;
use crate::error::Result;
use crate::geometry::{contact, dissolve, subtract, BBox, Contact, IntersectionDimension};
use crate::layer::{FeatureId, FeatureLayer};
use crate::partition::{PartitionId, PartitionedLayer};

/// Dissolved coverage of one leaf.
#[derive(Debug, Clone)]
pub struct Interior {
    pub partition_id: PartitionId,
    pub geom: MultiPolygon<f64>,
    pub bbox: BBox,
}

/// Interior per leaf; leaves without parts have no row.
#[derive(Debug, Clone, Default)]
pub struct InteriorTable {
    rows: Vec<Interior>,
    by_partition: FxHashMap<PartitionId, usize>,
}

impl InteriorTable {
    pub fn build(index: &PartitionedLayer, cancel: &CancelHandle) -> Result<Self> {
        let table = format!("interior_{}", index.layer_name());
        let grouped = index.rows_by_partition();

        let mut rows = Vec::with_capacity(grouped.len());
        for leaf in index.partitions().iter() {
            cancel.check(&table)?;
            let Some(part_rows) = grouped.get(&leaf.partition_id) else {
                continue;
            };
            let geom = dissolve(
                part_rows
                    .iter()
                    .filter_map(|&row| index.features().get(row))
                    .map(|p| &p.geom),
            );
            let Some(bbox) = geom
                .0
                .iter()
                .filter_map(BBox::from_polygon)
                .reduce(|a, b| a.union(&b))
            else {
                continue;
            };
            rows.push(Interior {
                partition_id: leaf.partition_id,
                geom,
                bbox,
            });
        }

        tracing::debug!(table = %table, rows = rows.len(), "interiors dissolved");
        Ok(Self::from_rows(rows))
    }

    fn from_rows(rows: Vec<Interior>) -> Self {
        let by_partition = rows
            .iter()
            .enumerate()
            .map(|(i, row)| (row.partition_id, i))
            .collect();
        Self { rows, by_partition }
    }

    pub fn get(&self, partition_id: PartitionId) -> Option<&Interior> {
        self.by_partition.get(&partition_id).map(|&i| &self.rows[i])
    }

    /// Rows in ascending partition id order.
    pub fn iter(&self) -> impl Iterator<Item = &Interior> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Uncovered remainder of one leaf.
#[derive(Debug, Clone)]
pub struct Exterior {
    pub partition_id: PartitionId,
    pub geom: MultiPolygon<f64>,
}

/// Exterior per leaf; fully covered leaves have no row.
#[derive(Debug, Clone, Default)]
pub struct ExteriorTable {
    rows: Vec<Exterior>,
    by_partition: FxHashMap<PartitionId, usize>,
}

impl ExteriorTable {
    pub fn build(
        index: &PartitionedLayer,
        interiors: &InteriorTable,
        cancel: &CancelHandle,
    ) -> Result<Self> {
        let table = format!("exterior_{}", index.layer_name());

        let mut rows = Vec::new();
        for leaf in index.partitions().iter() {
            cancel.check(&table)?;
            let rect = MultiPolygon::new(vec![leaf.bbox.to_polygon()]);
            let parts = match interiors.get(leaf.partition_id) {
                Some(interior) => subtract(&rect, &interior.geom),
                None => rect.0,
            };
            if parts.is_empty() {
                continue;
            }
            rows.push(Exterior {
                partition_id: leaf.partition_id,
                geom: MultiPolygon::new(parts),
            });
        }

        tracing::debug!(table = %table, rows = rows.len(), "exteriors computed");
        Ok(Self::from_rows(rows))
    }

    fn from_rows(rows: Vec<Exterior>) -> Self {
        let by_partition = rows
            .iter()
            .enumerate()
            .map(|(i, row)| (row.partition_id, i))
            .collect();
        Self { rows, by_partition }
    }

    pub fn get(&self, partition_id: PartitionId) -> Option<&Exterior> {
        self.by_partition.get(&partition_id).map(|&i| &self.rows[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Exterior> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// R-tree over every exterior polygon.
    fn polygon_tree(&self) -> RTree<GeomWithData<rstar::primitives::Rectangle<[f64; 2]>, &Polygon<f64>>> {
        RTree::bulk_load(
            self.rows
                .iter()
                .flat_map(|e| e.geom.0.iter())
                .filter_map(|p| BBox::from_polygon(p).map(|b| GeomWithData::new(b.rectangle(), p)))
                .collect(),
        )
    }
}

/// Marginal flag of one feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarginalFlag {
    pub fid: FeatureId,
    pub is_marginal: bool,
}

/// One flag per layer feature, sorted by id.
#[derive(Debug, Clone, Default)]
pub struct MarginalTable {
    rows: Vec<MarginalFlag>,
}

impl MarginalTable {
    /// Flag every feature of `layer`.
    ///
    /// Contacts of all parts of a feature with all exteriors are added up
    /// before the length tolerance is applied.
    pub fn build(
        layer: &FeatureLayer,
        index: &PartitionedLayer,
        exteriors: &ExteriorTable,
        tolerance: f64,
        cancel: &CancelHandle,
    ) -> Result<Self> {
        let table = format!("marginal_{}", index.layer_name());
        cancel.check(&table)?;

        let tree = exteriors.polygon_tree();
        let mut contacts: FxHashMap<FeatureId, Contact> = FxHashMap::default();
        for part in index.features().iter() {
            for candidate in tree.locate_in_envelope_intersecting(&part.bbox.envelope()) {
                if let Some(found) = contact(&part.geom, candidate.data)? {
                    contacts.entry(part.fid).or_default().merge(found);
                }
            }
        }
        let is_marginal = |fid: FeatureId| {
            contacts
                .get(&fid)
                .is_some_and(|c| c.dimension(tolerance) >= IntersectionDimension::Line)
        };

        let mut rows: Vec<MarginalFlag> = layer
            .features
            .iter()
            .map(|f| MarginalFlag {
                fid: f.fid,
                is_marginal: is_marginal(f.fid),
            })
            .collect();
        rows.sort_by_key(|r| r.fid);

        let marginal = rows.iter().filter(|r| r.is_marginal).count();
        tracing::debug!(table = %table, marginal, features = rows.len(), "marginal features flagged");
        Ok(Self { rows })
    }

    pub fn iter(&self) -> impl Iterator<Item = &MarginalFlag> {
        self.rows.iter()
    }

    /// Flag of one feature; `None` for unknown ids.
    pub fn is_marginal(&self, fid: FeatureId) -> Option<bool> {
        self.rows
            .binary_search_by_key(&fid, |r| r.fid)
            .ok()
            .map(|i| self.rows[i].is_marginal)
    }

    /// Ids of marginal features, ascending.
    pub fn marginal_features(&self) -> Vec<FeatureId> {
        self.rows
            .iter()
            .filter(|r| r.is_marginal)
            .map(|r| r.fid)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
