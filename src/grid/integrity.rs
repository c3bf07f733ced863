use std::collections::BTreeSet;

use super::{Coord, NodeId, PrefixError, PrefixGrid, Result, Role, bit, full_mask, is_contiguous};

impl PrefixGrid {
    fn check_node_integrity(&self, x: usize, y: usize, id: NodeId) -> Result<()> {
        let node = self.get(id)?;
        let here = Coord::new(x, y);
        if node.coord() != here {
            return Err(PrefixError::InvalidState(format!(
                "node {} is stored at {}",
                node.coord(),
                here
            )));
        }

        let section_ok = match node.role {
            Role::Pre => y == 0,
            Role::Post => y == self.post_level() && y > 0,
            _ => self.is_main_level(y),
        };
        if !section_ok {
            return Err(PrefixError::InvalidState(format!(
                "{:?} cell at {}",
                node.role, here
            )));
        }
        if node.cell_type != self.tag_for(node.role, x) {
            return Err(PrefixError::InvalidState(format!(
                "{} is a {:?} cell tagged {}",
                here, node.role, node.cell_type
            )));
        }

        match (node.role.is_combine(), node.pre) {
            (true, Some(px)) if px < x => (),
            (false, None) => (),
            _ => {
                return Err(PrefixError::InvalidState(format!(
                    "{:?} cell at {} reads column {:?}",
                    node.role, here, node.pre
                )));
            }
        }

        // P/G monotonicity, and the shape every mask must keep
        let expected = match node.role {
            Role::Pre => bit(x),
            _ => [self.top(id), self.pre(id)]
                .into_iter()
                .flatten()
                .fold(0, |acc, p| acc | self[p].pg),
        };
        if node.pg != expected {
            return Err(PrefixError::InvalidState(format!(
                "{} holds mask {:#b}, its inputs give {:#b}",
                here, node.pg, expected
            )));
        }
        if !is_contiguous(node.pg) || node.pg & !full_mask(x) != 0 || node.pg & bit(x) == 0 {
            return Err(PrefixError::InvalidState(format!(
                "{} holds mask {:#b}, not a run ending at its column",
                here, node.pg
            )));
        }
        self.check_upstream(id)
    }

    /// Upstream set of a node: the real cells among its producers and their own upstream sets,
    /// all of them on earlier levels.
    fn check_upstream(&self, id: NodeId) -> Result<()> {
        let node = &self[id];
        let mut expected = BTreeSet::new();
        if node.role != Role::Pre {
            for producer in [self.top(id), self.pre(id)].into_iter().flatten() {
                let p = &self[producer];
                expected.extend(p.upstream.iter().copied());
                if p.role.is_real() {
                    expected.insert(producer);
                }
            }
        }
        if let Some(&late) = node
            .upstream
            .iter()
            .find(|&&u| self.get(u).map_or(true, |u| u.y >= node.y))
        {
            return Err(PrefixError::InvalidState(format!(
                "{} lists node {} upstream, which is not on an earlier level",
                node.coord(),
                late
            )));
        }
        if node.upstream != expected {
            return Err(PrefixError::InvalidState(format!(
                "{} has {} upstream nodes, its inputs give {}",
                node.coord(),
                node.upstream.len(),
                expected.len()
            )));
        }
        Ok(())
    }

    /// Checks the grid structure.
    /// This function was written for debug purposes, as the library is supposed to maintain
    /// integrity of the grid at any moment:
    /// - every slot holds a node, which knows its own coordinates
    /// - pre-processing cells on level 0, post-processing cells on the last level, and nothing
    ///   else in between than combine cells and placeholders, tagged after the role map
    /// - only combine cells read diagonally, always a lower column
    /// - every mask is the OR of its inputs and a contiguous run ending at its own column
    /// - every upstream set is derived from the inputs and only holds nodes of earlier levels
    /// - blocks are disjoint and hold at most one node per level.
    pub fn check_integrity(&self) -> Result<()> {
        if self.depth() < 2 {
            return Err(PrefixError::InvalidState(format!(
                "a tree has at least 2 levels, got {}",
                self.depth()
            )));
        }
        let mut placed = BTreeSet::new();
        for y in 0..self.depth() {
            for x in 0..self.width {
                let id = self.require(x, y)?;
                self.check_node_integrity(x, y, id)?;
                placed.insert(id);
            }
        }
        if placed.len() != self.nodes().count() {
            return Err(PrefixError::InvalidState(format!(
                "{} nodes placed but {} alive",
                placed.len(),
                self.nodes().count()
            )));
        }

        let mut in_blocks = BTreeSet::new();
        for (block, members) in self.blocks() {
            let mut levels = BTreeSet::new();
            for &id in members {
                let node = self.get(id)?;
                if node.block != Some(block) || !in_blocks.insert(id) || !levels.insert(node.y) {
                    return Err(PrefixError::InvalidState(format!(
                        "block {} is inconsistent around {}",
                        block,
                        node.coord()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Re-derives P/G from the pre-processing row and checks that every post-processing cell holds
    /// the full prefix of its column.
    ///
    /// Stored masks are ignored, so this catches a stale mask as well as a wrong topology.
    pub fn check_tree(&self) -> Result<()> {
        let post = self.post_level();
        if self.depth() < 2 {
            return Err(PrefixError::ValidityFailure("the tree has no post-processing row".to_string()));
        }
        let mut masks: Vec<u64> = (0..self.width).map(bit).collect();
        for y in 1..=post {
            let mut next = Vec::with_capacity(self.width);
            for x in 0..self.width {
                let node = self
                    .node_at(x, y)
                    .ok_or_else(|| PrefixError::ValidityFailure(format!("hole at {}", Coord::new(x, y))))?;
                let diag = node.pre.map_or(0, |px| masks[px]);
                next.push(masks[x] | diag);
            }
            masks = next;
        }
        for (x, &pg) in masks.iter().enumerate() {
            if pg != full_mask(x) {
                return Err(PrefixError::ValidityFailure(format!(
                    "output {} covers {:#b} instead of {:#b}",
                    x,
                    pg,
                    full_mask(x)
                )));
            }
            if self.node_at(x, post).map(|node| node.pg) != Some(pg) {
                return Err(PrefixError::ValidityFailure(format!(
                    "output {} holds a stale mask",
                    x
                )));
            }
        }
        Ok(())
    }
}
