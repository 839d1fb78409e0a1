//! Error types for the partitioning engine.

use thiserror::Error;

use crate::layer::FeatureId;

/// Engine errors.
///
/// The engine never reports rule verdicts through this type; every variant is
/// an infrastructure or input problem that should fail the validation step.
#[derive(Error, Debug)]
pub enum EngineError {
    /// WKT parsing error.
    #[error("WKT parse error: {0}")]
    WktParse(String),

    /// A feature or boundary geometry has no areal component.
    #[error("Non-polygonal geometry in layer {layer} (id {fid}): {geom_type}")]
    NonPolygonal {
        layer: String,
        fid: FeatureId,
        geom_type: String,
    },

    /// Malformed geometry (unclosed ring, non-finite coordinate, zero area).
    #[error("Invalid geometry in layer {layer} (id {fid}): {reason}")]
    InvalidGeometry {
        layer: String,
        fid: FeatureId,
        reason: String,
    },

    /// Layer and boundary do not share a spatial reference.
    #[error("SRID mismatch: layer {layer} has {layer_srid}, boundary {boundary} has {boundary_srid}")]
    SridMismatch {
        layer: String,
        layer_srid: u32,
        boundary: String,
        boundary_srid: u32,
    },

    /// Two features share an identifier.
    #[error("Duplicate feature id {fid} in layer {layer}")]
    DuplicateFeature { layer: String, fid: FeatureId },

    /// Layer has not been registered with the workspace.
    #[error("Unknown layer: {0}")]
    UnknownLayer(String),

    /// Boundary layer has not been registered with the workspace.
    #[error("Unknown boundary layer: {0}")]
    UnknownBoundary(String),

    /// A feature lacks a required attribute column.
    #[error("Missing column {column} on feature {fid} of layer {layer}")]
    MissingColumn {
        layer: String,
        fid: FeatureId,
        column: String,
    },

    /// Attribute holds a value of the wrong type.
    #[error("Column {column} of feature {fid} is not numeric: {value}")]
    AttributeType {
        column: String,
        fid: FeatureId,
        value: String,
    },

    /// A working table was left half-built by an earlier, aborted run.
    #[error("Working table {0} is incomplete; drop it before rebuilding")]
    IncompleteTable(String),

    /// A gap table exists for another boundary than the one requested.
    #[error("Working table {table} was built against boundary {built_with}, not {requested}; drop it first")]
    BoundaryConflict {
        table: String,
        built_with: String,
        requested: String,
    },

    /// A working table was requested before being made.
    #[error("Working table {0} does not exist")]
    MissingTable(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The job was cancelled while an iterative loop was running.
    #[error("Cancelled while building {0}")]
    Cancelled(String),

    /// IO error while loading configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error (should not happen).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
