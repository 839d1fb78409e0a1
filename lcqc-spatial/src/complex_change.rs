//! Complex-change clustering.
//!
//! A feature is *changed* when its initial and final code differ. Changed
//! features that are connected through shared boundaries (neighbour edges of
//! dimension 1 or 2; corner touches do not connect) while holding one code
//! column constant form a complex change, identified by the id of the
//! feature its traversal started from. The clustering runs once for the
//! initial and once for the final code column.

use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::geometry::IntersectionDimension;
use crate::layer::{AttrValue, FeatureId, FeatureLayer};
use crate::neighbour::NeighbourTable;

/// Attribute columns read by the clusterer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplexChangeColumns {
    pub initial_code: String,
    pub final_code: String,
    pub area: String,
}

impl ComplexChangeColumns {
    pub fn new(
        initial_code: impl Into<String>,
        final_code: impl Into<String>,
        area: impl Into<String>,
    ) -> Self {
        Self {
            initial_code: initial_code.into(),
            final_code: final_code.into(),
            area: area.into(),
        }
    }
}

/// Cluster membership of one feature under one code column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    pub fid: FeatureId,
    pub cluster_id: Option<FeatureId>,
    pub aggregate_area: Option<f64>,
}

/// Cluster assignments of every layer feature under one code column.
#[derive(Debug, Clone)]
pub struct ClusterTable {
    column: String,
    rows: Vec<ClusterAssignment>,
}

/// Per-feature attributes the traversal needs.
struct ClusterInput<'a> {
    eligible: FxHashSet<FeatureId>,
    values: FxHashMap<FeatureId, &'a AttrValue>,
    areas: FxHashMap<FeatureId, Option<f64>>,
    fids: Vec<FeatureId>,
}

impl<'a> ClusterInput<'a> {
    fn read(layer: &'a FeatureLayer, columns: &ComplexChangeColumns, clustered: &str) -> Result<Self> {
        let mut input = Self {
            eligible: FxHashSet::default(),
            values: FxHashMap::default(),
            areas: FxHashMap::default(),
            fids: Vec::with_capacity(layer.len()),
        };
        for feature in &layer.features {
            let initial = feature.attr(&layer.name, &columns.initial_code)?;
            let last = feature.attr(&layer.name, &columns.final_code)?;
            if initial.sql_ne(last) == Some(true) {
                input.eligible.insert(feature.fid);
            }
            input
                .values
                .insert(feature.fid, feature.attr(&layer.name, clustered)?);

            let area = feature.attr(&layer.name, &columns.area)?;
            let area = match area {
                AttrValue::Null => None,
                other => Some(other.as_f64().ok_or_else(|| EngineError::AttributeType {
                    column: columns.area.clone(),
                    fid: feature.fid,
                    value: other.to_string(),
                })?),
            };
            input.areas.insert(feature.fid, area);
            input.fids.push(feature.fid);
        }
        input.fids.sort_unstable();
        Ok(input)
    }

    fn admits(&self, seed_value: &AttrValue, fid: FeatureId) -> bool {
        self.eligible.contains(&fid)
            && self
                .values
                .get(&fid)
                .is_some_and(|v| seed_value.sql_eq(v) == Some(true))
    }
}

impl ClusterTable {
    /// Cluster changed features holding `clustered` constant along every edge.
    pub fn build(
        layer: &FeatureLayer,
        neighbours: &NeighbourTable,
        columns: &ComplexChangeColumns,
        clustered: &str,
    ) -> Result<Self> {
        let input = ClusterInput::read(layer, columns, clustered)?;

        let mut processed: FxHashSet<FeatureId> = FxHashSet::default();
        let mut cluster_of: FxHashMap<FeatureId, FeatureId> = FxHashMap::default();
        let mut clusters = 0usize;
        for &seed in &input.fids {
            if !input.eligible.contains(&seed) || !processed.insert(seed) {
                continue;
            }
            let Some(&seed_value) = input.values.get(&seed) else {
                continue;
            };

            let mut members = vec![seed];
            let mut queue = VecDeque::from([seed]);
            while let Some(fid) = queue.pop_front() {
                for &next in neighbours.neighbours_of(fid) {
                    let shares_boundary =
                        neighbours.dimension(fid, next) >= Some(IntersectionDimension::Line);
                    if shares_boundary
                        && input.admits(seed_value, next)
                        && processed.insert(next)
                    {
                        members.push(next);
                        queue.push_back(next);
                    }
                }
            }

            if members.len() > 1 {
                clusters += 1;
                cluster_of.extend(members.into_iter().map(|m| (m, seed)));
            }
        }

        let mut areas: FxHashMap<FeatureId, Option<f64>> = FxHashMap::default();
        for (fid, cluster_id) in &cluster_of {
            let area = input.areas.get(fid).copied().flatten();
            let slot = areas.entry(*cluster_id).or_insert(None);
            if let Some(a) = area {
                *slot = Some(slot.unwrap_or(0.0) + a);
            }
        }

        let rows: Vec<ClusterAssignment> = input
            .fids
            .iter()
            .map(|&fid| {
                let cluster_id = cluster_of.get(&fid).copied();
                ClusterAssignment {
                    fid,
                    cluster_id,
                    aggregate_area: cluster_id.and_then(|c| areas.get(&c).copied().flatten()),
                }
            })
            .collect();

        tracing::debug!(
            layer = %layer.name,
            column = clustered,
            clusters,
            members = cluster_of.len(),
            "complex changes clustered"
        );
        Ok(Self {
            column: clustered.to_string(),
            rows,
        })
    }

    /// The clustered code column.
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Rows sorted by feature id.
    pub fn iter(&self) -> impl Iterator<Item = &ClusterAssignment> {
        self.rows.iter()
    }

    pub fn get(&self, fid: FeatureId) -> Option<&ClusterAssignment> {
        self.rows
            .binary_search_by_key(&fid, |r| r.fid)
            .ok()
            .map(|i| &self.rows[i])
    }

    /// Members of one cluster, ascending.
    pub fn members(&self, cluster_id: FeatureId) -> Vec<FeatureId> {
        self.rows
            .iter()
            .filter(|r| r.cluster_id == Some(cluster_id))
            .map(|r| r.fid)
            .collect()
    }
}

/// Combined complex-change properties of one feature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComplexChange {
    pub fid: FeatureId,
    pub cc_id_initial: Option<FeatureId>,
    pub cc_id_final: Option<FeatureId>,
    pub cc_area: Option<f64>,
}

/// Both cluster passes plus the combined per-feature view.
#[derive(Debug, Clone)]
pub struct ComplexChangeTable {
    initial: ClusterTable,
    last: ClusterTable,
    rows: Vec<ComplexChange>,
}

fn larger(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

impl ComplexChangeTable {
    /// Cluster on the initial code, then on the final code.
    ///
    /// `cc_area` is the larger of the two cluster areas; a feature in one
    /// cluster only takes that cluster's area.
    pub fn build(
        layer: &FeatureLayer,
        neighbours: &NeighbourTable,
        columns: &ComplexChangeColumns,
    ) -> Result<Self> {
        let initial = ClusterTable::build(layer, neighbours, columns, &columns.initial_code)?;
        let last = ClusterTable::build(layer, neighbours, columns, &columns.final_code)?;

        let rows = initial
            .iter()
            .zip(last.iter())
            .map(|(a, b)| ComplexChange {
                fid: a.fid,
                cc_id_initial: a.cluster_id,
                cc_id_final: b.cluster_id,
                cc_area: larger(a.aggregate_area, b.aggregate_area),
            })
            .collect();

        Ok(Self {
            initial,
            last,
            rows,
        })
    }

    /// Clusters on the initial code column.
    pub fn initial(&self) -> &ClusterTable {
        &self.initial
    }

    /// Clusters on the final code column.
    pub fn last(&self) -> &ClusterTable {
        &self.last
    }

    pub fn iter(&self) -> impl Iterator<Item = &ComplexChange> {
        self.rows.iter()
    }

    pub fn get(&self, fid: FeatureId) -> Option<&ComplexChange> {
        self.rows
            .binary_search_by_key(&fid, |r| r.fid)
            .ok()
            .map(|i| &self.rows[i])
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
