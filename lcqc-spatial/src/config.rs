//! Engine configuration types.
//!
//! Configuration can be built in code with the `with_*` helpers or loaded from
//! a TOML file. Every section is optional in the file; absent values fall back
//! to the defaults below.
//!
//! ```toml
//! [partition]
//! grid_size = 1.0
//! max_vertices = 50000
//!
//! [topology]
//! length_tolerance = 0.001
//!
//! [gap]
//! boundary_tolerance = 0.001
//! max_piece_size = 100000.0
//! snap_precision = 0.000001
//! boundary_unit_column = "du"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Default vertex budget of one leaf partition.
pub const DEFAULT_MAX_VERTICES: usize = 50_000;

/// Default grid alignment (in layer units).
pub const DEFAULT_GRID_SIZE: f64 = 1.0;

/// Default negative buffer applied to the reference boundary.
pub const DEFAULT_BOUNDARY_TOLERANCE: f64 = 0.001;

/// Default maximum gap piece extent on either axis.
pub const DEFAULT_MAX_PIECE_SIZE: f64 = 100_000.0;

/// Default shared boundary length below which two polygons only touch.
pub const DEFAULT_LENGTH_TOLERANCE: f64 = 0.001;

/// Default coordinate precision of gap subtraction operands.
pub const DEFAULT_SNAP_PRECISION: f64 = 0.000_001;

/// Configuration of the adaptive partition index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    /// Grid the root box and every split line snap to.
    pub grid_size: f64,

    /// A leaf is split while its assigned parts carry more vertices than this.
    pub max_vertices: usize,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            grid_size: DEFAULT_GRID_SIZE,
            max_vertices: DEFAULT_MAX_VERTICES,
        }
    }
}

impl PartitionConfig {
    /// Create a config with the given grid size and vertex budget.
    pub fn new(grid_size: f64, max_vertices: usize) -> Self {
        Self {
            grid_size,
            max_vertices,
        }
    }
}

/// How contacts between polygons are classified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    /// Shared boundaries up to this length are point contacts, and overlaps
    /// up to its square are not areal. Used by the neighbour and marginal
    /// tables. Zero classifies exactly.
    pub length_tolerance: f64,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            length_tolerance: DEFAULT_LENGTH_TOLERANCE,
        }
    }
}

/// Configuration of the gap detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GapConfig {
    /// Negative buffer distance applied to the boundary. Zero disables it.
    pub boundary_tolerance: f64,

    /// Gap pieces wider or taller than this are halved before subtraction.
    pub max_piece_size: f64,

    /// Coordinates of both subtraction operands are rounded to this. Zero
    /// disables rounding.
    pub snap_precision: f64,

    /// Boundary column selecting the management unit of the delivery.
    pub boundary_unit_column: Option<String>,
}

impl Default for GapConfig {
    fn default() -> Self {
        Self {
            boundary_tolerance: DEFAULT_BOUNDARY_TOLERANCE,
            max_piece_size: DEFAULT_MAX_PIECE_SIZE,
            snap_precision: DEFAULT_SNAP_PRECISION,
            boundary_unit_column: None,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// `[partition]`
    pub partition: PartitionConfig,

    /// `[topology]`
    pub topology: TopologyConfig,

    /// `[gap]`
    pub gap: GapConfig,
}

impl EngineConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| EngineError::Config(format!("{e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        tracing::debug!(path = %path.display(), "Loaded engine config file");
        Self::from_toml_str(&content)
    }

    /// Set the partition configuration.
    pub fn with_partition(mut self, partition: PartitionConfig) -> Self {
        self.partition = partition;
        self
    }

    /// Set the grid size.
    pub fn with_grid_size(mut self, grid_size: f64) -> Self {
        self.partition.grid_size = grid_size;
        self
    }

    /// Set the per-leaf vertex budget.
    pub fn with_max_vertices(mut self, max_vertices: usize) -> Self {
        self.partition.max_vertices = max_vertices;
        self
    }

    /// Set the contact length tolerance.
    pub fn with_length_tolerance(mut self, tolerance: f64) -> Self {
        self.topology.length_tolerance = tolerance;
        self
    }

    /// Set the gap configuration.
    pub fn with_gap(mut self, gap: GapConfig) -> Self {
        self.gap = gap;
        self
    }

    /// Set the boundary tolerance.
    pub fn with_boundary_tolerance(mut self, tolerance: f64) -> Self {
        self.gap.boundary_tolerance = tolerance;
        self
    }

    /// Set the boundary unit column.
    pub fn with_boundary_unit_column(mut self, column: impl Into<String>) -> Self {
        self.gap.boundary_unit_column = Some(column.into());
        self
    }

    /// Reject values the iterative loops cannot converge with.
    pub fn validate(&self) -> Result<()> {
        let grid = self.partition.grid_size;
        if !grid.is_finite() || grid <= 0.0 {
            return Err(EngineError::Config(format!(
                "grid_size must be positive, got {grid}"
            )));
        }
        if self.partition.max_vertices == 0 {
            return Err(EngineError::Config("max_vertices must be positive".into()));
        }
        let tolerance = self.gap.boundary_tolerance;
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(EngineError::Config(format!(
                "boundary_tolerance must be non-negative, got {tolerance}"
            )));
        }
        let length = self.topology.length_tolerance;
        if !length.is_finite() || length < 0.0 {
            return Err(EngineError::Config(format!(
                "length_tolerance must be non-negative, got {length}"
            )));
        }
        let precision = self.gap.snap_precision;
        if !precision.is_finite() || precision < 0.0 {
            return Err(EngineError::Config(format!(
                "snap_precision must be non-negative, got {precision}"
            )));
        }
        let piece = self.gap.max_piece_size;
        if !piece.is_finite() || piece <= 0.0 {
            return Err(EngineError::Config(format!(
                "max_piece_size must be positive, got {piece}"
            )));
        }
        Ok(())
    }
}
