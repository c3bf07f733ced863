//! Cleanup passes bringing a tree back to a canonical minimal form after a rewrite.
//!
//! - [`PrefixGrid::reduce_idem`] turns combine cells that add nothing into placeholders,
//! - [`PrefixGrid::compact`] pulls combine cells up through empty slots,
//! - [`PrefixGrid::trim_layers`] drops trailing main levels left without real cells,
//! - [`PrefixGrid::clean`] runs the first two to a joint fixpoint, then the third.
//!
//! None of them changes what the tree computes.

use crate::{NodeId, PrefixGrid, Result, Role};

impl PrefixGrid {
    /// Whether a combine cell can become a placeholder without changing any mask downstream:
    /// - its diagonal input is already covered by its vertical one, or
    /// - nobody reads it diagonally, nor the placeholders down to the next real cell, and that
    ///   cell (a combine) already gets everything from above.
    fn is_idempotent(&self, id: NodeId) -> bool {
        let (Some(top), Some(pre)) = (self.top(id), self.pre(id)) else {
            return false;
        };
        let top_pg = self[top].pg();
        if top_pg | self[pre].pg() == top_pg {
            return true;
        }
        if !self.post(id).is_empty() {
            return false;
        }
        let mut below = self.bottom(id);
        while let Some(current) = below {
            let node = &self[current];
            if node.role().is_combine() {
                return self
                    .pre(current)
                    .is_some_and(|m_pre| top_pg | self[m_pre].pg() == node.pg());
            }
            if !node.role().is_placeholder() || !self.post(current).is_empty() {
                return false;
            }
            below = self.bottom(current);
        }
        false
    }

    fn find_idempotent(&self) -> Option<NodeId> {
        (1..self.post_level())
            .flat_map(|y| self.level(y))
            .find(|&id| self[id].role().is_combine() && self.is_idempotent(id))
    }

    /// A combine cell sitting under an invisible slot, reading a placeholder: both can swap.
    fn find_compactable(&self) -> Option<NodeId> {
        (2..self.post_level())
            .flat_map(|y| self.level(y))
            .find(|&id| {
                self[id].role().is_combine()
                    && self.top(id).is_some_and(|top| self[top].role() == Role::Invisible)
                    && self.pre(id).is_some_and(|pre| self[pre].role().is_placeholder())
            })
    }

    fn reduce_idem_pass(&mut self) -> Result<bool> {
        let mut changed = false;
        while let Some(id) = self.find_idempotent() {
            clilog::debug!(PG_CLEAN, "cell {} is idempotent", self[id].coord());
            self.morph(id, None)?;
            self.propagate()?;
            changed = true;
        }
        Ok(changed)
    }

    fn compact_pass(&mut self) -> Result<bool> {
        let mut changed = false;
        while let Some(id) = self.find_compactable() {
            let coord = self[id].coord();
            clilog::debug!(PG_CLEAN, "moving cell {} up", coord);
            self.swap_vertical(coord.x, coord.y - 1)?;
            self.propagate()?;
            changed = true;
        }
        Ok(changed)
    }

    fn trim_pass(&mut self) -> Result<bool> {
        let mut changed = false;
        while self.post_level() >= 2 {
            let last = self.post_level() - 1;
            if self.level(last).iter().any(|&id| self[id].role().is_real()) {
                break;
            }
            self.remove_layer(last)?;
            self.propagate()?;
            changed = true;
        }
        Ok(changed)
    }

    /// Turns every idempotent combine cell into a placeholder, until none is left.
    pub fn reduce_idem(&mut self) -> Result<bool> {
        let changed = self.reduce_idem_pass()?;
        self.settle()?;
        Ok(changed)
    }

    /// Moves combine cells one level up while the slot above is free and their diagonal input
    /// is a placeholder, until no cell can move.
    pub fn compact(&mut self) -> Result<bool> {
        let changed = self.compact_pass()?;
        self.settle()?;
        Ok(changed)
    }

    /// Removes the last main levels while they hold no real cell.
    pub fn trim_layers(&mut self) -> Result<bool> {
        let changed = self.trim_pass()?;
        self.settle()?;
        Ok(changed)
    }

    /// Idempotence reduction and compaction to a joint fixpoint, then layer trimming.
    pub fn clean(&mut self) -> Result<bool> {
        let timer = clilog::stimer!("clean");
        let mut changed = false;
        loop {
            let reduced = self.reduce_idem_pass()?;
            let compacted = self.compact_pass()?;
            if !reduced && !compacted {
                break;
            }
            changed = true;
        }
        changed |= self.trim_pass()?;
        self.settle()?;
        clilog::finish!(timer);
        Ok(changed)
    }
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use crate::{PrefixGrid, Role, Topology};

    #[test]
    fn ripple_has_nothing_to_trim() {
        let mut grid = PrefixGrid::with_defaults(8, Topology::Ripple).unwrap();
        assert!(!grid.trim_layers().unwrap());
        assert_eq!(grid.depth(), 9);
    }

    #[rstest]
    fn fresh_trees_are_clean(
        #[values(Topology::Ripple, Topology::Sklansky, Topology::KoggeStone, Topology::BrentKung)]
        topology: Topology,
    ) {
        let mut grid = PrefixGrid::with_defaults(16, topology).unwrap();
        let layout = grid.layout();
        assert!(!grid.clean().unwrap());
        assert_eq!(grid.layout(), layout);
    }

    #[test]
    fn covered_diagonal_input() {
        let mut grid = PrefixGrid::with_defaults(8, Topology::KoggeStone).unwrap();
        let layout = grid.layout();
        // (3, 2) already covers bits 0 to 3, reading (2, 2) brings nothing
        let placeholder = grid.id_at(3, 3).unwrap();
        grid.morph(placeholder, Some(2)).unwrap();
        grid.settle().unwrap();
        assert_eq!(grid[placeholder].role(), Role::Grey);
        grid.check_tree().unwrap();

        assert!(grid.reduce_idem().unwrap());
        assert_eq!(grid[placeholder].role(), Role::Invisible);
        assert_eq!(grid.layout(), layout);
        assert!(!grid.reduce_idem().unwrap());
    }

    #[test]
    fn covered_by_next_combine() {
        let mut grid = PrefixGrid::with_defaults(4, Topology::Ripple).unwrap();
        let layout = grid.layout();
        // (2, 1) reading column 1 is redundant with (2, 2) reading column 1 below it
        let placeholder = grid.id_at(2, 1).unwrap();
        grid.morph(placeholder, Some(1)).unwrap();
        grid.settle().unwrap();
        assert_eq!(grid[placeholder].pg(), 0b110);
        grid.check_integrity().unwrap();

        assert!(grid.clean().unwrap());
        assert_eq!(grid.layout(), layout);
        grid.check_tree().unwrap();
    }

    #[test]
    fn compact_then_trim() {
        let mut grid = PrefixGrid::with_defaults(8, Topology::Sklansky).unwrap();
        let layout = grid.layout();
        // Push (4, 3) down into a new last level
        grid.insert_layer(grid.post_level()).unwrap();
        grid.swap_vertical(4, 3).unwrap();
        grid.settle().unwrap();
        grid.check_integrity().unwrap();
        grid.check_tree().unwrap();
        assert_eq!(grid.node_at(4, 4).unwrap().pre_column(), Some(3));

        assert!(grid.compact().unwrap());
        assert_eq!(grid.node_at(4, 3).unwrap().pre_column(), Some(3));
        assert!(!grid.compact().unwrap());
        assert!(grid.trim_layers().unwrap());
        assert_eq!(grid.layout(), layout);
    }
}
