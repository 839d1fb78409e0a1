//! Partitioning and graph-analysis engine for land-cover quality control.
//!
//! Land-cover layers hold hundreds of thousands of polygons with millions of
//! vertices. Pairwise spatial operations over a whole layer do not scale, so
//! this crate first splits the layer's extent into an adaptive quadtree-like
//! partition whose leaves each hold a bounded number of vertices, and then
//! derives the working tables QC rules query:
//!
//! - **Neighbour graph**: every touching pair with the dimension of the touch,
//!   judged on the whole shared boundary under a length tolerance
//! - **Interior / exterior**: dissolved coverage of each leaf and its complement
//! - **Marginal flags**: features touching the uncovered edge of the layer
//! - **Complex changes**: clusters of adjacent changed features with equal codes
//! - **Gaps**: parts of a reference boundary the layer leaves uncovered
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                            Workspace                             │
//! │        layers · boundaries · table states · CancelHandle         │
//! └──────────────────────────────────────────────────────────────────┘
//!                                 │
//!                                 ▼
//!                PartitionedLayer (partition_ / feature_)
//!                 split · fill_subpartitions · delete_superitems
//!                                 │
//!             ┌───────────────────┼──────────────────────┐
//!             ▼                   ▼                      │
//!      NeighbourTable       InteriorTable                │
//!             │            │             │               │
//!             ▼            ▼             ▼               │
//!    ComplexChangeTable  ExteriorTable  GapTable ◄── BoundaryLayer
//!                          │
//!                          ▼
//!                    MarginalTable
//! ```
//!
//! All geometry work runs in-process on [`geo`] types; box lookups go
//! through an [`rstar`] R-tree.
//!
//! # Modules
//!
//! - [`config`]: Engine configuration (TOML-loadable)
//! - [`layer`]: Feature and boundary layer input model
//! - [`geometry`]: Bounding boxes, WKT parsing and polygon helpers
//! - [`partition`]: Adaptive partition index
//! - [`neighbour`]: Neighbour table
//! - [`marginal`]: Interior, exterior and marginal tables
//! - [`complex_change`]: Complex-change clustering
//! - [`gap`]: Gap detection against a boundary layer
//! - [`workspace`]: Job context and working-table lifecycle
//! - [`cancel`]: Cooperative cancellation
//! - [`error`]: Error types

pub mod cancel;
pub mod complex_change;
pub mod config;
pub(crate) mod dedup;
pub mod error;
pub mod gap;
pub mod geometry;
pub mod layer;
pub mod marginal;
pub mod neighbour;
pub mod partition;
pub mod workspace;

// Re-export key types
pub use cancel::CancelHandle;
pub use complex_change::{
    ClusterAssignment, ClusterTable, ComplexChange, ComplexChangeColumns, ComplexChangeTable,
};
pub use config::{EngineConfig, GapConfig, PartitionConfig, TopologyConfig};
pub use error::{EngineError, Result};
pub use gap::{unknown_unit_features, GapPolygon, GapTable};
pub use geometry::{BBox, Contact, GeometryType, IntersectionDimension};
pub use layer::{AttrValue, BoundaryLayer, BoundaryUnit, Feature, FeatureId, FeatureLayer};
pub use marginal::{Exterior, ExteriorTable, Interior, InteriorTable, MarginalFlag, MarginalTable};
pub use neighbour::{NeighbourEdge, NeighbourTable};
pub use partition::{
    FeaturePart, FeatureTable, Partition, PartitionId, PartitionStats, PartitionTable,
    PartitionedLayer,
};
pub use workspace::{PartitionedNames, TableKind, TableState, Workspace};
