use std::{collections::BTreeSet, fmt::Display};

use super::net::Port;
use crate::catalog::{CellDef, Section};

/// A node handle into the grid arena.
///
/// Handles are stable for the lifetime of the node: moving a node to another level keeps its id.
pub type NodeId = usize;

/// Grid coordinates: `x` is the bit column, `y` the level (0 for the pre-processing row).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Coord {
    pub x: usize,
    pub y: usize,
}

impl Coord {
    pub fn new(x: usize, y: usize) -> Self {
        Coord { x, y }
    }
}

impl Display for Coord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// The role a node plays in the tree. The catalog tag of a node is derived from its role
/// through the [`CellRoleMap`].
///
/// [`CellRoleMap`]: crate::catalog::CellRoleMap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Pre-processing cell, seeds the P/G of its column.
    Pre,
    /// Combine cell whose range does not reach bit 0.
    Black,
    /// Combine cell whose range reaches bit 0 (only the generate signal is needed).
    Grey,
    /// Pass-through placeholder with at least one diagonal successor.
    Buffer,
    /// Pass-through placeholder nobody reads diagonally.
    Invisible,
    /// Post-processing cell.
    Post,
}

impl Role {
    pub fn is_combine(self) -> bool {
        matches!(self, Role::Black | Role::Grey)
    }

    pub fn is_placeholder(self) -> bool {
        matches!(self, Role::Buffer | Role::Invisible)
    }

    pub fn is_real(self) -> bool {
        !self.is_placeholder()
    }

    pub fn section(self) -> Section {
        match self {
            Role::Pre => Section::Pre,
            Role::Post => Section::Post,
            _ => Section::Main,
        }
    }
}

/// Single-bit P/G mask of a column.
pub fn bit(x: usize) -> u64 {
    1 << x
}

/// The full prefix mask `(1 << (x + 1)) - 1`, without overflowing on column 63.
pub fn full_mask(x: usize) -> u64 {
    u64::MAX >> (63 - x)
}

/// Lowest bit covered by a mask.
pub fn low_bit(pg: u64) -> usize {
    pg.trailing_zeros() as usize
}

/// Whether the mask is a single run of ones.
pub fn is_contiguous(pg: u64) -> bool {
    if pg == 0 {
        return false;
    }
    let shifted = pg >> pg.trailing_zeros();
    shifted.count_ones() == 64 - shifted.leading_zeros()
}

/// A placed cell instance.
///
/// The diagonal predecessor is stored as a column: it always lives one level above the node,
/// so moving nodes vertically never leaves a dangling reference behind.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub(super) x: usize,
    pub(super) y: usize,
    pub(super) role: Role,
    pub(super) cell_type: String,
    pub(super) pre: Option<usize>,
    pub(super) in_ports: Vec<Port>,
    pub(super) out_ports: Vec<Port>,
    pub(super) pg: u64,
    pub(super) upstream: BTreeSet<NodeId>,
    pub(super) block: Option<usize>,
    pub(super) top_delay: f64,
    pub(super) pre_delay: f64,
}

impl Node {
    /// Returns a new unplaced node with empty ports shaped after `def`.
    pub fn new(coord: Coord, role: Role, cell_type: &str, def: &CellDef, pre: Option<usize>) -> Self {
        let mut node = Node {
            x: coord.x,
            y: coord.y,
            role,
            cell_type: String::new(),
            pre,
            in_ports: Vec::new(),
            out_ports: Vec::new(),
            pg: 0,
            upstream: BTreeSet::new(),
            block: None,
            top_delay: 0.0,
            pre_delay: 0.0,
        };
        node.set_cell(role, cell_type, def);
        node
    }

    /// Changes the cell of the node and reshapes its ports. Nets are dropped.
    pub(super) fn set_cell(&mut self, role: Role, cell_type: &str, def: &CellDef) {
        self.role = role;
        self.cell_type = cell_type.to_string();
        self.in_ports = def
            .inputs
            .iter()
            .map(|p| Port::new(&p.name, p.total_bits, p.diag_bits))
            .collect();
        self.out_ports = def
            .outputs
            .iter()
            .map(|p| Port::new(&p.name, p.bits, 0))
            .collect();
    }

    pub fn coord(&self) -> Coord {
        Coord::new(self.x, self.y)
    }

    pub fn x(&self) -> usize {
        self.x
    }

    pub fn y(&self) -> usize {
        self.y
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn cell_type(&self) -> &str {
        &self.cell_type
    }

    /// Column of the diagonal predecessor, if any.
    pub fn pre_column(&self) -> Option<usize> {
        self.pre
    }

    pub fn pg(&self) -> u64 {
        self.pg
    }

    /// Real ancestors of this node.
    pub fn upstream(&self) -> &BTreeSet<NodeId> {
        &self.upstream
    }

    pub fn block(&self) -> Option<usize> {
        self.block
    }

    pub fn in_ports(&self) -> &[Port] {
        &self.in_ports
    }

    pub fn out_ports(&self) -> &[Port] {
        &self.out_ports
    }

    /// Delay of the vertical and diagonal edges into this node, see [`PrefixGrid::recalc_weights`].
    ///
    /// [`PrefixGrid::recalc_weights`]: crate::PrefixGrid::recalc_weights
    pub fn edge_delays(&self) -> (f64, f64) {
        (self.top_delay, self.pre_delay)
    }

    pub(crate) fn set_edge_delays(&mut self, top: f64, pre: f64) {
        self.top_delay = top;
        self.pre_delay = pre;
    }

    /// A node is valid iff its mask is the full prefix of its column.
    pub fn is_valid(&self) -> bool {
        self.pg == full_mask(self.x)
    }
}
