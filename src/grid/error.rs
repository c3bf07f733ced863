use thiserror::Error;

use super::{Coord, NodeId};
use crate::transform::TransformKind;

/// The result of a prefix grid operation.
pub type Result<T> = std::result::Result<T, PrefixError>;

/// Error returned when a prefix grid operation failed.
#[derive(Debug, Error)]
pub enum PrefixError {
    /// A node could not be placed (out of bounds, skipped level, occupied slot).
    #[error("invalid placement: {0}")]
    InvalidPlacement(String),

    /// No node lives at the given coordinates.
    #[error("no node at {0}")]
    NotFound(Coord),

    /// The node handle is stale or was never allocated.
    #[error("node with id={0} does not exist")]
    NodeDoesNotExist(NodeId),

    /// The ports are not complementary, or a slot is bound to something else.
    #[error("port mismatch: {0}")]
    PortMismatch(String),

    /// A net must go from a producer to a consumer at a strictly higher level.
    #[error("net from {producer} to {consumer} does not go downstream")]
    DirectionError { producer: Coord, consumer: Coord },

    /// The transform precondition does not hold at the requested coordinates.
    #[error("{kind} is not applicable at column {x}")]
    TransformNotApplicable { kind: TransformKind, x: usize },

    /// Invalid block membership request.
    #[error("block conflict: {0}")]
    BlockConflict(String),

    /// The P/G invariant is broken. This is an engine bug, never a user error.
    #[error("validity failure: {0}")]
    ValidityFailure(String),

    /// The repair search found no repair set within its budget.
    #[error("repair search exhausted after {0} steps")]
    RepairSearchExhausted(usize),

    /// A topology or transform name could not be parsed.
    #[error("unknown name {0}")]
    UnknownName(String),

    /// The cell tag is not part of the catalog.
    #[error("unknown cell type {0}")]
    UnknownCell(String),

    /// A custom cell definition has an invalid shape.
    #[error("invalid cell definition for {tag}: {reason}")]
    InvalidCellDef { tag: String, reason: String },

    /// The grid has reached an invalid state - this should not happen.
    #[error("the grid has reached an invalid state - this should not happen - error: {0}")]
    InvalidState(String),

    /// Just forwarding a [`serde_json::Error`].
    #[error("{0}")]
    Config(#[from] serde_json::Error),
}
