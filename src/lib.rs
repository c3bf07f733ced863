pub mod catalog;
pub mod cleanup;
pub mod dot;
pub mod grid;
pub mod timing;
pub mod topology;
pub mod transform;

// Re-exporting symbols and modules.
pub use grid::walk;
pub use grid::{
    Coord, MAX_WIDTH, NetRef, Node, NodeId, Port, PrefixError, PrefixGrid, Result, Role, bit,
    full_mask, is_contiguous, low_bit, net_name, verso,
};
pub use topology::Topology;
pub use transform::{Pivot, TransformKind};
