//! Module defining the [`PrefixGrid`] struct, as well as [`Node`], [`Coord`] and the net model.
//!
//! A prefix grid is a rectangular array of cells: one column per bit, level 0 holding the
//! pre-processing cells, the last level holding the post-processing cells and every level in
//! between holding either a combine cell or a pass-through placeholder. A node only ever reads the
//! node right above it and, for combine cells, one node of the previous level in a lower column
//! (its diagonal predecessor).
//!
//! To build a grid, see [`PrefixGrid::new_tree`]. To rewrite it, see [`crate::transform`].

mod error;
mod integrity;
mod net;
mod node;
pub mod walk;

use std::{
    collections::BTreeSet,
    ops::{Index, IndexMut},
    rc::Rc,
};

pub use error::{PrefixError, Result};
pub use net::{NetRef, Port, net_name, verso};
pub use node::{Coord, Node, NodeId, Role, bit, full_mask, is_contiguous, low_bit};

use crate::catalog::{CellCatalog, CellRoleMap};
use walk::Downstream;

/// Widest supported grid, P/G masks are `u64`.
pub const MAX_WIDTH: usize = 64;

/// A whole prefix tree.
///
/// Nodes live in an arena and are referred to by [`NodeId`]. Ids are stable when a node moves to
/// another level or changes role, and are recycled once a node has been removed.
///
/// The low-level mutations ([`place`], [`morph`], [`swap_vertical`], layer insertion and
/// removal) only record which nodes changed. [`settle`] then propagates: P/G masks and upstream
/// sets are re-derived downstream of what changed, roles reclassified, edge delays and nets
/// rebuilt. Transforms and cleanup passes always leave the grid settled.
///
/// [`place`]: PrefixGrid::place
/// [`morph`]: PrefixGrid::morph
/// [`swap_vertical`]: PrefixGrid::swap_vertical
/// [`settle`]: PrefixGrid::settle
#[derive(Debug, Clone)]
pub struct PrefixGrid {
    width: usize,
    /// `levels[y][x]`
    levels: Vec<Vec<Option<NodeId>>>,
    nodes: Vec<Option<Node>>,
    free: Vec<NodeId>,
    next_net: u64,
    blocks: Vec<Option<BTreeSet<NodeId>>>,
    /// Nodes whose inputs changed since the last settle.
    dirty: Vec<NodeId>,
    catalog: Rc<CellCatalog>,
    roles: CellRoleMap,
}

impl PrefixGrid {
    /// Creates an empty grid. The role map is validated against the catalog.
    pub fn new(width: usize, roles: CellRoleMap, catalog: Rc<CellCatalog>) -> Result<Self> {
        if width == 0 || width > MAX_WIDTH {
            return Err(PrefixError::InvalidPlacement(format!(
                "width must be between 1 and {}, got {}",
                MAX_WIDTH, width
            )));
        }
        roles.validate(&catalog)?;
        Ok(PrefixGrid {
            width,
            levels: Vec::new(),
            nodes: Vec::new(),
            free: Vec::new(),
            next_net: 0,
            blocks: Vec::new(),
            dirty: Vec::new(),
            catalog,
            roles,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of levels, pre-processing and post-processing rows included.
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Level of the post-processing row.
    pub fn post_level(&self) -> usize {
        self.depth().saturating_sub(1)
    }

    /// Whether `y` is a level of the main body.
    pub fn is_main_level(&self, y: usize) -> bool {
        y >= 1 && y < self.post_level()
    }

    pub fn catalog(&self) -> &CellCatalog {
        &self.catalog
    }

    pub fn roles(&self) -> &CellRoleMap {
        &self.roles
    }

    /// Retrieves a node from its id.
    pub fn get(&self, id: NodeId) -> Result<&Node> {
        self.slot(id).ok_or(PrefixError::NodeDoesNotExist(id))
    }

    fn slot(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)?.as_ref()
    }

    /// Iterates over all nodes, in no particular order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(id, node)| node.as_ref().map(|node| (id, node)))
    }

    /// Ids of the nodes of a level, from column 0 up. Empty slots are skipped.
    pub fn level(&self, y: usize) -> Vec<NodeId> {
        self.levels
            .get(y)
            .map(|row| row.iter().flatten().copied().collect())
            .unwrap_or_default()
    }

    pub fn id_at(&self, x: usize, y: usize) -> Option<NodeId> {
        *self.levels.get(y)?.get(x)?
    }

    pub fn node_at(&self, x: usize, y: usize) -> Option<&Node> {
        self.id_at(x, y).and_then(|id| self.slot(id))
    }

    pub(crate) fn require(&self, x: usize, y: usize) -> Result<NodeId> {
        self.id_at(x, y)
            .ok_or(PrefixError::NotFound(Coord::new(x, y)))
    }

    /// Catalog tag used for a role in a given column.
    pub(crate) fn tag_for(&self, role: Role, x: usize) -> &str {
        match role {
            Role::Pre => self.roles.pre_for(x),
            Role::Post => &self.roles.post,
            Role::Black => &self.roles.black,
            Role::Grey => &self.roles.grey,
            Role::Buffer => self.roles.buffer_for(x),
            Role::Invisible => &self.roles.invisible,
        }
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.nodes[id] = Some(node);
                id
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        }
    }

    fn new_node(&self, coord: Coord, role: Role, pre: Option<usize>) -> Result<Node> {
        let tag = self.tag_for(role, coord.x);
        let def = self.catalog.lookup(tag)?;
        let mut node = Node::new(coord, role, tag, def, pre);
        if role == Role::Pre {
            node.pg = bit(coord.x);
        }
        Ok(node)
    }

    /// Places a new node. The grid grows one level at a time: `coord.y` is either an existing
    /// level or the next one.
    ///
    /// Only pre-processing cells go on level 0, and only combine cells have a diagonal
    /// predecessor, which must lie in a lower column.
    pub fn place(&mut self, coord: Coord, role: Role, pre: Option<usize>) -> Result<NodeId> {
        let Coord { x, y } = coord;
        let invalid = |reason: &str| {
            Err(PrefixError::InvalidPlacement(format!("{} at {}", reason, coord)))
        };
        if x >= self.width {
            return invalid("column out of bounds");
        }
        if y > self.depth() {
            return invalid("skipped level");
        }
        if self.id_at(x, y).is_some() {
            return invalid("slot already occupied");
        }
        if (y == 0) != (role == Role::Pre) {
            return invalid("pre-processing cells live on level 0 only");
        }
        match (role.is_combine(), pre) {
            (true, Some(px)) if px < x => (),
            (true, _) => return invalid("combine cell needs a predecessor column on its left"),
            (false, Some(_)) => return invalid("only combine cells read diagonally"),
            (false, None) => (),
        }

        let node = self.new_node(coord, role, pre)?;
        if y == self.depth() {
            self.levels.push(vec![None; self.width]);
        }
        let id = self.alloc(node);
        self.levels[y][x] = Some(id);
        self.dirty.push(id);
        Ok(id)
    }

    /// Clears a slot and returns the removed node.
    ///
    /// Connections are not repaired: the caller must fill the slot again (or drop the whole
    /// level) before the grid is settled.
    pub fn remove(&mut self, x: usize, y: usize) -> Result<Node> {
        let id = self.require(x, y)?;
        self.levels[y][x] = None;
        let node = self.nodes[id]
            .take()
            .ok_or_else(|| PrefixError::InvalidState(format!("slot {} holds a dead id", id)))?;
        if let Some(block) = node.block {
            if let Some(Some(members)) = self.blocks.get_mut(block) {
                members.remove(&id);
            }
        }
        self.free.push(id);
        self.dirty.retain(|&d| d != id);
        Ok(node)
    }

    /// Node right above.
    pub fn top(&self, id: NodeId) -> Option<NodeId> {
        let node = self.slot(id)?;
        self.id_at(node.x, node.y.checked_sub(1)?)
    }

    /// Node right below.
    pub fn bottom(&self, id: NodeId) -> Option<NodeId> {
        let node = self.slot(id)?;
        self.id_at(node.x, node.y + 1)
    }

    /// Diagonal predecessor.
    pub fn pre(&self, id: NodeId) -> Option<NodeId> {
        let node = self.slot(id)?;
        self.id_at(node.pre?, node.y.checked_sub(1)?)
    }

    /// Diagonal successors, from left to right.
    pub fn post(&self, id: NodeId) -> Vec<NodeId> {
        let Some(node) = self.slot(id) else {
            return Vec::new();
        };
        let x = node.x;
        self.level(node.y + 1)
            .into_iter()
            .filter(|&s| self[s].pre == Some(x))
            .collect()
    }

    /// Nearest real node above, skipping placeholders.
    pub fn r_top(&self, id: NodeId) -> Option<NodeId> {
        let mut current = self.top(id)?;
        while self[current].role.is_placeholder() {
            current = self.top(current)?;
        }
        Some(current)
    }

    /// Nearest real node below, skipping placeholders.
    pub fn r_bot(&self, id: NodeId) -> Option<NodeId> {
        let mut current = self.bottom(id)?;
        while self[current].role.is_placeholder() {
            current = self.bottom(current)?;
        }
        Some(current)
    }

    /// Number of nodes reading the output of `id`.
    pub fn fanout(&self, id: NodeId) -> usize {
        self.post(id).len() + self.bottom(id).map_or(0, |_| 1)
    }

    /// Whether `n` contributes to `e`.
    pub fn feeds(&self, n: NodeId, e: NodeId) -> bool {
        self.slot(e).is_some_and(|e| e.upstream.contains(&n))
    }

    /// Turns a main-body node into a combine cell reading column `pre`, or into a placeholder
    /// when `pre` is `None`. The final role is assigned when the grid is settled.
    pub fn morph(&mut self, id: NodeId, pre: Option<usize>) -> Result<()> {
        let node = self.get(id)?;
        let coord = node.coord();
        if !self.is_main_level(coord.y) {
            return Err(PrefixError::InvalidPlacement(format!(
                "cannot morph {} outside the main body",
                coord
            )));
        }
        let role = match pre {
            Some(px) if px < coord.x => match node.role.is_combine() {
                true => node.role,
                false => Role::Black,
            },
            Some(px) => {
                return Err(PrefixError::InvalidPlacement(format!(
                    "{} cannot read column {}",
                    coord, px
                )));
            }
            None => match node.role.is_placeholder() {
                true => node.role,
                false => Role::Invisible,
            },
        };
        if role != node.role {
            let tag = self.tag_for(role, coord.x).to_string();
            let catalog = Rc::clone(&self.catalog);
            let def = catalog.lookup(&tag)?;
            self[id].set_cell(role, &tag, def);
        }
        self[id].pre = pre;
        self.dirty.push(id);
        Ok(())
    }

    /// Swaps the nodes at `(x, y)` and `(x, y + 1)`, both in the main body.
    ///
    /// Diagonal predecessors are columns, so both nodes keep reading the same columns from their
    /// new level.
    pub fn swap_vertical(&mut self, x: usize, y: usize) -> Result<()> {
        if !self.is_main_level(y) || !self.is_main_level(y + 1) {
            return Err(PrefixError::InvalidPlacement(format!(
                "cannot swap {} and {} outside the main body",
                Coord::new(x, y),
                Coord::new(x, y + 1)
            )));
        }
        let upper = self.require(x, y)?;
        let lower = self.require(x, y + 1)?;
        self.levels[y][x] = Some(lower);
        self.levels[y + 1][x] = Some(upper);
        self[upper].y = y + 1;
        self[lower].y = y;
        self.dirty.extend([upper, lower]);
        Ok(())
    }

    /// Inserts a level of invisible placeholders at `level`, pushing every level from `level`
    /// on one step down.
    pub fn insert_layer(&mut self, level: usize) -> Result<()> {
        if level == 0 || level > self.post_level() {
            return Err(PrefixError::InvalidPlacement(format!(
                "cannot insert a layer at level {}",
                level
            )));
        }
        let mut row = Vec::with_capacity(self.width);
        for x in 0..self.width {
            let mut node = self.new_node(Coord::new(x, level), Role::Invisible, None)?;
            node.pg = self.node_at(x, level - 1).map_or(0, |above| above.pg);
            row.push(node);
        }
        for moved in self.levels[level..].iter().flatten().flatten() {
            if let Some(node) = self.nodes[*moved].as_mut() {
                node.y += 1;
            }
        }
        let ids: Vec<Option<NodeId>> = row.into_iter().map(|node| Some(self.alloc(node))).collect();
        self.dirty.extend(ids.iter().flatten());
        self.levels.insert(level, ids);
        clilog::debug!(PG_GRID, "inserted layer {}", level);
        Ok(())
    }

    /// Removes a main-body level made only of placeholders.
    pub fn remove_layer(&mut self, level: usize) -> Result<()> {
        if !self.is_main_level(level) {
            return Err(PrefixError::InvalidPlacement(format!(
                "level {} is not part of the main body",
                level
            )));
        }
        if let Some(real) = self.level(level).into_iter().find(|&id| self[id].role.is_real()) {
            return Err(PrefixError::InvalidPlacement(format!(
                "level {} holds the real cell {}",
                level,
                self[real].coord()
            )));
        }
        for x in 0..self.width {
            self.remove(x, level)?;
        }
        self.levels.remove(level);
        for moved in self.levels[level..].iter().flatten().flatten() {
            if let Some(node) = self.nodes[*moved].as_mut() {
                node.y -= 1;
            }
        }
        let below = self.level(level);
        self.dirty.extend(below);
        clilog::debug!(PG_GRID, "removed layer {}", level);
        Ok(())
    }

    /// Groups nodes into a block. Returns the block id, the smallest free one.
    ///
    /// A node belongs to at most one block, and a block holds at most one node per level.
    pub fn add_block(&mut self, members: &[NodeId]) -> Result<usize> {
        if members.is_empty() {
            return Err(PrefixError::BlockConflict("empty block".to_string()));
        }
        let mut levels = BTreeSet::new();
        for &id in members {
            let node = self.get(id)?;
            if let Some(block) = node.block {
                return Err(PrefixError::BlockConflict(format!(
                    "{} already belongs to block {}",
                    node.coord(),
                    block
                )));
            }
            if !levels.insert(node.y) {
                return Err(PrefixError::BlockConflict(format!(
                    "two nodes on level {}",
                    node.y
                )));
            }
        }

        let block = self
            .blocks
            .iter()
            .position(Option::is_none)
            .unwrap_or(self.blocks.len());
        if block == self.blocks.len() {
            self.blocks.push(None);
        }
        for &id in members {
            self[id].block = Some(block);
        }
        self.blocks[block] = Some(members.iter().copied().collect());
        Ok(block)
    }

    /// Dissolves a block and returns its members.
    pub fn remove_block(&mut self, block: usize) -> Result<BTreeSet<NodeId>> {
        let members = self
            .blocks
            .get_mut(block)
            .and_then(Option::take)
            .ok_or_else(|| PrefixError::BlockConflict(format!("no block {}", block)))?;
        for &id in &members {
            if let Some(node) = self.nodes[id].as_mut() {
                node.block = None;
            }
        }
        Ok(members)
    }

    /// Dissolves every block.
    pub fn clear_blocks(&mut self) {
        for block in 0..self.blocks.len() {
            let _ = self.remove_block(block);
        }
        self.blocks.clear();
    }

    pub fn blocks(&self) -> impl Iterator<Item = (usize, &BTreeSet<NodeId>)> {
        self.blocks
            .iter()
            .enumerate()
            .filter_map(|(id, block)| block.as_ref().map(|members| (id, members)))
    }

    /// Re-derives P/G masks and upstream sets of every node reachable from `seeds` through
    /// vertical and diagonal successors. Nodes are refreshed level by level, so each one reads
    /// up-to-date predecessors.
    pub fn walk_downstream(&mut self, seeds: &[NodeId]) {
        let mut walk = Downstream::from_nodes(seeds.iter().copied().filter(|&id| self.slot(id).is_some()));
        let mut reached = Vec::new();
        while let Some(id) = walk.next(self) {
            reached.push(id);
        }
        reached.sort_by_key(|&id| (self[id].y, self[id].x));
        for id in reached {
            self.refresh(id);
        }
    }

    fn refresh(&mut self, id: NodeId) {
        if self[id].role == Role::Pre {
            let x = self[id].x;
            let node = &mut self[id];
            node.pg = bit(x);
            node.upstream.clear();
            return;
        }
        let mut pg = 0;
        let mut upstream = BTreeSet::new();
        for producer in [self.top(id), self.pre(id)].into_iter().flatten() {
            let p = &self[producer];
            pg |= p.pg;
            upstream.extend(p.upstream.iter().copied());
            if p.role.is_real() {
                upstream.insert(producer);
            }
        }
        let node = &mut self[id];
        node.pg = pg;
        node.upstream = upstream;
    }

    /// Assigns the role each main-body node should play: combines reaching bit 0 are grey, the
    /// others black; placeholders read diagonally are buffers, the others invisible.
    ///
    /// Returns whether some node changed its cell.
    pub fn reclassify(&mut self) -> Result<bool> {
        let mut changed = false;
        for y in 1..self.post_level() {
            for id in self.level(y) {
                let node = &self[id];
                let role = match node.role {
                    Role::Black | Role::Grey if node.pg & 1 == 1 => Role::Grey,
                    Role::Black | Role::Grey => Role::Black,
                    Role::Buffer | Role::Invisible if self.post(id).is_empty() => Role::Invisible,
                    Role::Buffer | Role::Invisible => Role::Buffer,
                    Role::Pre | Role::Post => {
                        return Err(PrefixError::InvalidState(format!(
                            "{:?} cell in the main body at {}",
                            node.role,
                            node.coord()
                        )));
                    }
                };
                let tag = self.tag_for(role, node.x).to_string();
                if role != node.role || tag != node.cell_type {
                    let catalog = Rc::clone(&self.catalog);
                    let def = catalog.lookup(&tag)?;
                    self[id].set_cell(role, &tag, def);
                    changed = true;
                }
            }
        }
        Ok(changed)
    }

    /// Propagates pending changes to masks and roles only. Passes made of many small steps use
    /// this between steps and [`settle`] once at the end.
    ///
    /// [`settle`]: PrefixGrid::settle
    pub(crate) fn propagate(&mut self) -> Result<()> {
        let seeds = std::mem::take(&mut self.dirty);
        self.walk_downstream(&seeds);
        self.reclassify()?;
        Ok(())
    }

    /// Propagates every pending change: masks, roles, edge delays and nets.
    pub fn settle(&mut self) -> Result<()> {
        self.propagate()?;
        self.recalc_weights()?;
        self.rebind_nets()
    }

    /// Per level, the cell tag and diagonal predecessor column of every slot.
    ///
    /// Two grids with the same layout compute the same function with the same cells, whatever
    /// their node ids.
    pub fn layout(&self) -> Vec<Vec<(String, Option<usize>)>> {
        self.levels
            .iter()
            .map(|row| {
                row.iter()
                    .map(|id| match id.and_then(|id| self.slot(id)) {
                        Some(node) => (node.cell_type.clone(), node.pre),
                        None => (String::new(), None),
                    })
                    .collect()
            })
            .collect()
    }

    /// Number of real cells (pre-processing, combine and post-processing).
    pub fn real_count(&self) -> usize {
        self.nodes().filter(|(_, node)| node.role.is_real()).count()
    }
}

impl Index<NodeId> for PrefixGrid {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        match self.slot(id) {
            Some(node) => node,
            None => panic!("node with id={} does not exist", id),
        }
    }
}

impl IndexMut<NodeId> for PrefixGrid {
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        match self.nodes.get_mut(id).and_then(Option::as_mut) {
            Some(node) => node,
            None => panic!("node with id={} does not exist", id),
        }
    }
}
