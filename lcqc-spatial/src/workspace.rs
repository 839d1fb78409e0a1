//! Job context owning layers and working tables.
//!
//! A [`Workspace`] stands for one validation job. Layers and boundaries are
//! registered up front; every `make_*` call builds one working table (and its
//! prerequisites on demand) and returns the table name the calling rule
//! queries. Tables live until they are dropped or the workspace is.
//!
//! Each table is marked [`TableState::Building`] before its build starts and
//! [`TableState::Ready`] once it finishes. A ready table is reused. A table
//! still marked building was left behind by a failed or cancelled run and is
//! refused until [`Workspace::drop_table`] discards it.

use std::collections::BTreeMap;
use std::fmt;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::cancel::CancelHandle;
use crate::complex_change::{ComplexChangeColumns, ComplexChangeTable};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::gap::{unknown_unit_features, GapTable};
use crate::layer::{BoundaryLayer, FeatureId, FeatureLayer};
use crate::marginal::{ExteriorTable, InteriorTable, MarginalTable};
use crate::neighbour::NeighbourTable;
use crate::partition::{PartitionStats, PartitionedLayer};

/// Lifecycle state of a working table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableState {
    Building,
    Ready,
}

/// Kinds of working table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Partition,
    Feature,
    Neighbour,
    Interior,
    Exterior,
    Marginal,
    ComplexChange,
    Gap,
}

impl TableKind {
    pub const ALL: [TableKind; 8] = [
        TableKind::Partition,
        TableKind::Feature,
        TableKind::Neighbour,
        TableKind::Interior,
        TableKind::Exterior,
        TableKind::Marginal,
        TableKind::ComplexChange,
        TableKind::Gap,
    ];

    pub fn prefix(&self) -> &'static str {
        match self {
            TableKind::Partition => "partition",
            TableKind::Feature => "feature",
            TableKind::Neighbour => "neighbour",
            TableKind::Interior => "interior",
            TableKind::Exterior => "exterior",
            TableKind::Marginal => "marginal",
            TableKind::ComplexChange => "complex_change",
            TableKind::Gap => "gap",
        }
    }

    /// Working table name for a layer, e.g. `neighbour_clc2018`.
    pub fn table_name(&self, layer: &str) -> String {
        format!("{}_{}", self.prefix(), layer)
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Names of the two tables making up a partitioned layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionedNames {
    pub partition_table: String,
    pub feature_table: String,
}

/// Built tables of one layer.
#[derive(Debug, Default)]
struct LayerTables {
    partitioned: Option<PartitionedLayer>,
    neighbours: Option<NeighbourTable>,
    interiors: Option<InteriorTable>,
    exteriors: Option<ExteriorTable>,
    marginal: Option<MarginalTable>,
    complex_change: Option<ComplexChangeTable>,
    gap: Option<GapTable>,
    /// Boundary the gap table was (or is being) built against.
    gap_boundary: Option<String>,
}

impl LayerTables {
    fn clear(&mut self, kind: TableKind) {
        match kind {
            TableKind::Partition | TableKind::Feature => self.partitioned = None,
            TableKind::Neighbour => self.neighbours = None,
            TableKind::Interior => self.interiors = None,
            TableKind::Exterior => self.exteriors = None,
            TableKind::Marginal => self.marginal = None,
            TableKind::ComplexChange => self.complex_change = None,
            TableKind::Gap => {
                self.gap = None;
                self.gap_boundary = None;
            }
        }
    }
}

/// Context of one validation job.
#[derive(Debug)]
pub struct Workspace {
    job_id: String,
    config: EngineConfig,
    layers: BTreeMap<String, FeatureLayer>,
    boundaries: BTreeMap<String, BoundaryLayer>,
    states: BTreeMap<String, TableState>,
    tables: FxHashMap<String, LayerTables>,
    cancel: CancelHandle,
}

impl Workspace {
    /// Create a workspace for one job.
    pub fn new(job_id: impl Into<String>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            job_id: job_id.into(),
            config,
            layers: BTreeMap::new(),
            boundaries: BTreeMap::new(),
            states: BTreeMap::new(),
            tables: FxHashMap::default(),
            cancel: CancelHandle::new(),
        })
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Handle the job dispatcher uses to abort running loops.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Register a validated feature layer.
    ///
    /// Re-registering a layer drops every working table derived from it.
    pub fn register_layer(&mut self, layer: FeatureLayer) -> Result<()> {
        layer.validate()?;
        let name = layer.name.clone();
        if self.layers.insert(name.clone(), layer).is_some() {
            self.drop_layer_tables(&name);
        }
        tracing::debug!(job = %self.job_id, layer = %name, "layer registered");
        Ok(())
    }

    /// Register a validated boundary layer.
    pub fn register_boundary(&mut self, boundary: BoundaryLayer) -> Result<()> {
        boundary.validate()?;
        tracing::debug!(job = %self.job_id, boundary = %boundary.name, units = boundary.units.len(), "boundary registered");
        self.boundaries.insert(boundary.name.clone(), boundary);
        Ok(())
    }

    pub fn layer(&self, name: &str) -> Result<&FeatureLayer> {
        self.layers
            .get(name)
            .ok_or_else(|| EngineError::UnknownLayer(name.to_string()))
    }

    pub fn boundary(&self, name: &str) -> Result<&BoundaryLayer> {
        self.boundaries
            .get(name)
            .ok_or_else(|| EngineError::UnknownBoundary(name.to_string()))
    }

    /// State of a working table, `None` when it does not exist.
    pub fn table_state(&self, table: &str) -> Option<TableState> {
        self.states.get(table).copied()
    }

    /// Names of every existing working table, sorted.
    pub fn table_names(&self) -> Vec<String> {
        self.states.keys().cloned().collect()
    }

    /// Decide whether `table` must be built.
    ///
    /// Returns `Ok(false)` for a ready table and fails on a half-built one.
    fn start(&mut self, table: &str) -> Result<bool> {
        match self.states.get(table) {
            Some(TableState::Ready) => {
                tracing::info!(job = %self.job_id, table, "working table has already been created");
                Ok(false)
            }
            Some(TableState::Building) => Err(EngineError::IncompleteTable(table.to_string())),
            None => Ok(true),
        }
    }

    fn mark(&mut self, table: &str, state: TableState) {
        self.states.insert(table.to_string(), state);
        if state == TableState::Ready {
            tracing::info!(job = %self.job_id, table, "working table has just been created");
        }
    }

    fn slot(&mut self, layer: &str) -> &mut LayerTables {
        self.tables.entry(layer.to_string()).or_default()
    }

    fn built(&self, layer: &str) -> Option<&LayerTables> {
        self.tables.get(layer)
    }

    /// Partition a layer; returns the partition and feature table names.
    pub fn make_partitioned_layer(&mut self, layer: &str) -> Result<PartitionedNames> {
        let names = PartitionedNames {
            partition_table: TableKind::Partition.table_name(layer),
            feature_table: TableKind::Feature.table_name(layer),
        };
        self.layer(layer)?;
        if !self.start(&names.partition_table)? {
            return Ok(names);
        }
        self.start(&names.feature_table)?;

        let _span = tracing::info_span!("partition_layer", job = %self.job_id, layer).entered();
        self.mark(&names.partition_table, TableState::Building);
        self.mark(&names.feature_table, TableState::Building);

        let index = PartitionedLayer::build(self.layer(layer)?, &self.config.partition, &self.cancel)?;
        tracing::debug!(stats = ?index.stats(), "layer partitioned");
        self.slot(layer).partitioned = Some(index);

        self.mark(&names.partition_table, TableState::Ready);
        self.mark(&names.feature_table, TableState::Ready);
        Ok(names)
    }

    /// Build the adjacency table of a layer.
    pub fn make_neighbour_table(&mut self, layer: &str) -> Result<String> {
        let table = TableKind::Neighbour.table_name(layer);
        self.layer(layer)?;
        if !self.start(&table)? {
            return Ok(table);
        }
        self.make_partitioned_layer(layer)?;

        let _span = tracing::info_span!("neighbour_table", job = %self.job_id, layer).entered();
        self.mark(&table, TableState::Building);
        let neighbours = NeighbourTable::build(
            self.partitioned_layer(layer)?,
            self.config.topology.length_tolerance,
            &self.cancel,
        )?;
        tracing::debug!(edges = neighbours.len(), "neighbour table filled");
        self.slot(layer).neighbours = Some(neighbours);
        self.mark(&table, TableState::Ready);
        Ok(table)
    }

    /// Dissolve the parts of every leaf of a layer.
    pub fn make_interior_table(&mut self, layer: &str) -> Result<String> {
        let table = TableKind::Interior.table_name(layer);
        self.layer(layer)?;
        if !self.start(&table)? {
            return Ok(table);
        }
        self.make_partitioned_layer(layer)?;

        let _span = tracing::info_span!("interior_table", job = %self.job_id, layer).entered();
        self.mark(&table, TableState::Building);
        let interiors = InteriorTable::build(self.partitioned_layer(layer)?, &self.cancel)?;
        self.slot(layer).interiors = Some(interiors);
        self.mark(&table, TableState::Ready);
        Ok(table)
    }

    /// Subtract the interior of every leaf of a layer from its rectangle.
    pub fn make_exterior_table(&mut self, layer: &str) -> Result<String> {
        let table = TableKind::Exterior.table_name(layer);
        self.layer(layer)?;
        if !self.start(&table)? {
            return Ok(table);
        }
        self.make_interior_table(layer)?;

        let _span = tracing::info_span!("exterior_table", job = %self.job_id, layer).entered();
        self.mark(&table, TableState::Building);
        let exteriors = ExteriorTable::build(
            self.partitioned_layer(layer)?,
            self.interior_table(layer)?,
            &self.cancel,
        )?;
        self.slot(layer).exteriors = Some(exteriors);
        self.mark(&table, TableState::Ready);
        Ok(table)
    }

    /// Flag the features of a layer touching its uncovered edge.
    pub fn make_marginal_table(&mut self, layer: &str) -> Result<String> {
        let table = TableKind::Marginal.table_name(layer);
        self.layer(layer)?;
        if !self.start(&table)? {
            return Ok(table);
        }
        self.make_exterior_table(layer)?;

        let _span = tracing::info_span!("marginal_table", job = %self.job_id, layer).entered();
        self.mark(&table, TableState::Building);
        let marginal = MarginalTable::build(
            self.layer(layer)?,
            self.partitioned_layer(layer)?,
            self.exterior_table(layer)?,
            self.config.topology.length_tolerance,
            &self.cancel,
        )?;
        self.slot(layer).marginal = Some(marginal);
        self.mark(&table, TableState::Ready);
        Ok(table)
    }

    /// Cluster complex changes of a layer.
    ///
    /// The table is keyed by layer only; a ready table is reused whatever
    /// columns are passed.
    pub fn make_complex_change_table(
        &mut self,
        layer: &str,
        columns: &ComplexChangeColumns,
    ) -> Result<String> {
        let table = TableKind::ComplexChange.table_name(layer);
        self.layer(layer)?;
        if !self.start(&table)? {
            return Ok(table);
        }
        self.make_neighbour_table(layer)?;

        let _span = tracing::info_span!(
            "complex_change_table",
            job = %self.job_id,
            layer,
            initial = %columns.initial_code,
            last = %columns.final_code
        )
        .entered();
        self.mark(&table, TableState::Building);
        self.cancel.check(&table)?;
        let complex_change =
            ComplexChangeTable::build(self.layer(layer)?, self.neighbour_table(layer)?, columns)?;
        self.slot(layer).complex_change = Some(complex_change);
        self.mark(&table, TableState::Ready);
        Ok(table)
    }

    /// Compute the parts of `boundary` not covered by a layer.
    ///
    /// The table is keyed by layer; asking for it against another boundary
    /// than the one it was built with fails until it is dropped.
    pub fn make_gap_table(&mut self, layer: &str, boundary: &str) -> Result<String> {
        let table = TableKind::Gap.table_name(layer);
        self.boundary(boundary)?.check_srid(self.layer(layer)?)?;
        if let Some(built_with) = self.gap_boundary(layer) {
            if built_with != boundary {
                return Err(EngineError::BoundaryConflict {
                    table,
                    built_with: built_with.to_string(),
                    requested: boundary.to_string(),
                });
            }
        }
        if !self.start(&table)? {
            return Ok(table);
        }
        self.make_interior_table(layer)?;

        let _span = tracing::info_span!("gap_table", job = %self.job_id, layer, boundary).entered();
        self.mark(&table, TableState::Building);
        self.slot(layer).gap_boundary = Some(boundary.to_string());
        let gap = GapTable::build(
            self.layer(layer)?,
            self.partitioned_layer(layer)?,
            self.interior_table(layer)?,
            self.boundary(boundary)?,
            &self.config.gap,
            &self.cancel,
        )?;
        self.slot(layer).gap = Some(gap);
        self.mark(&table, TableState::Ready);
        Ok(table)
    }

    /// Boundary the gap table of `layer` was built against, if any.
    pub fn gap_boundary(&self, layer: &str) -> Option<&str> {
        self.built(layer)?.gap_boundary.as_deref()
    }

    /// Features whose boundary unit value is null or unknown.
    ///
    /// Requires `gap.boundary_unit_column` to be configured.
    pub fn unknown_unit_features(&self, layer: &str, boundary: &str) -> Result<Vec<FeatureId>> {
        let column = self
            .config
            .gap
            .boundary_unit_column
            .as_deref()
            .ok_or_else(|| EngineError::Config("gap.boundary_unit_column is not set".into()))?;
        unknown_unit_features(self.layer(layer)?, self.boundary(boundary)?, column)
    }

    fn ready<'a, T>(
        &'a self,
        layer: &str,
        kind: TableKind,
        pick: impl FnOnce(&'a LayerTables) -> Option<&'a T>,
    ) -> Result<&'a T> {
        let table = kind.table_name(layer);
        match self.states.get(&table) {
            Some(TableState::Ready) => self
                .built(layer)
                .and_then(pick)
                .ok_or_else(|| EngineError::Internal(format!("{table} is ready but not stored"))),
            Some(TableState::Building) => Err(EngineError::IncompleteTable(table)),
            None => Err(EngineError::MissingTable(table)),
        }
    }

    pub fn partitioned_layer(&self, layer: &str) -> Result<&PartitionedLayer> {
        self.ready(layer, TableKind::Partition, |t| t.partitioned.as_ref())
    }

    pub fn partition_stats(&self, layer: &str) -> Result<&PartitionStats> {
        self.partitioned_layer(layer).map(PartitionedLayer::stats)
    }

    pub fn neighbour_table(&self, layer: &str) -> Result<&NeighbourTable> {
        self.ready(layer, TableKind::Neighbour, |t| t.neighbours.as_ref())
    }

    pub fn interior_table(&self, layer: &str) -> Result<&InteriorTable> {
        self.ready(layer, TableKind::Interior, |t| t.interiors.as_ref())
    }

    pub fn exterior_table(&self, layer: &str) -> Result<&ExteriorTable> {
        self.ready(layer, TableKind::Exterior, |t| t.exteriors.as_ref())
    }

    pub fn marginal_table(&self, layer: &str) -> Result<&MarginalTable> {
        self.ready(layer, TableKind::Marginal, |t| t.marginal.as_ref())
    }

    pub fn complex_change_table(&self, layer: &str) -> Result<&ComplexChangeTable> {
        self.ready(layer, TableKind::ComplexChange, |t| t.complex_change.as_ref())
    }

    pub fn gap_table(&self, layer: &str) -> Result<&GapTable> {
        self.ready(layer, TableKind::Gap, |t| t.gap.as_ref())
    }

    /// Drop one working table. Returns `false` if it did not exist.
    ///
    /// The partition and feature tables are one unit; dropping either drops
    /// both.
    pub fn drop_table(&mut self, table: &str) -> bool {
        let Some((kind, layer)) = self.resolve(table) else {
            return false;
        };
        let mut dropped = self.states.remove(table).is_some();
        if matches!(kind, TableKind::Partition | TableKind::Feature) {
            for sibling in [TableKind::Partition, TableKind::Feature] {
                dropped |= self.states.remove(&sibling.table_name(&layer)).is_some();
            }
        }
        if let Some(tables) = self.tables.get_mut(&layer) {
            tables.clear(kind);
        }
        if dropped {
            tracing::info!(job = %self.job_id, table, "working table dropped");
        }
        dropped
    }

    /// Drop every working table of a layer. Returns the number dropped.
    pub fn drop_layer_tables(&mut self, layer: &str) -> usize {
        let names: Vec<String> = TableKind::ALL
            .iter()
            .map(|k| k.table_name(layer))
            .filter(|t| self.states.contains_key(t))
            .collect();
        for name in &names {
            self.states.remove(name);
        }
        self.tables.remove(layer);
        if !names.is_empty() {
            tracing::info!(job = %self.job_id, layer, dropped = names.len(), "layer tables dropped");
        }
        names.len()
    }

    /// Map a table name back to its kind and layer.
    fn resolve(&self, table: &str) -> Option<(TableKind, String)> {
        // Longest prefix first so `complex_change_x` never parses as another kind.
        let mut kinds = TableKind::ALL;
        kinds.sort_by_key(|k| std::cmp::Reverse(k.prefix().len()));
        kinds.iter().find_map(|kind| {
            let layer = table.strip_prefix(kind.prefix())?.strip_prefix('_')?;
            self.layers
                .contains_key(layer)
                .then(|| (*kind, layer.to_string()))
        })
    }

    /// JSON summary of the workspace for job logs.
    pub fn summary(&self) -> serde_json::Value {
        let tables: serde_json::Map<String, serde_json::Value> = self
            .states
            .iter()
            .map(|(name, state)| (name.clone(), serde_json::json!(state)))
            .collect();
        let partitions: serde_json::Map<String, serde_json::Value> = self
            .tables
            .iter()
            .filter_map(|(layer, t)| {
                t.partitioned
                    .as_ref()
                    .map(|p| (layer.clone(), serde_json::json!(p.stats())))
            })
            .collect();
        serde_json::json!({
            "job_id": self.job_id,
            "layers": self.layers.keys().collect::<Vec<_>>(),
            "boundaries": self.boundaries.keys().collect::<Vec<_>>(),
            "tables": tables,
            "partition_stats": partitions,
        })
    }
}
