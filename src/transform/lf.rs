use std::collections::BTreeSet;

use super::{Plan, RepairSearch};
use crate::{NodeId, PrefixGrid, Result, Role, low_bit};

/// Moving a node and everything reading it diagonally one level down.
#[derive(Debug, Clone)]
pub(super) struct Shift {
    /// Nodes to move, bottom-up.
    nodes: Vec<NodeId>,
    /// Whether a level must be inserted above the post-processing row first.
    grow: bool,
}

impl PrefixGrid {
    /// Lowest bit reached by column `x` at level `y`.
    pub(super) fn low_at(&self, x: usize, y: usize) -> Result<usize> {
        Ok(low_bit(self[self.require(x, y)?].pg()))
    }

    /// `a` reads `b` diagonally, and `b` reads a third column `c`. If the slot above `a` is
    /// free, `a` moves up into it and reads `c` like `b` does, once its column is repaired to
    /// touch `c`. The nodes of `a`'s level reading `b` beyond `a` are re-pointed to `a`.
    pub(super) fn plan_lf(&self, x: usize, y: usize) -> Result<Option<Plan>> {
        if y < 2 {
            return Ok(None);
        }
        let a = self.require(x, y)?;
        let Some(xb) = self[a].pre_column() else {
            return Ok(None);
        };
        if self[self.require(x, y - 1)?].role() != Role::Invisible {
            return Ok(None);
        }
        let b = self.require(xb, y - 1)?;
        let Some(xc) = self[b].pre_column() else {
            return Ok(None);
        };
        let mut search = RepairSearch::new(self);
        let Some(repairs) = self.repairs_for(&mut search, x, y - 2, xc + 1)? else {
            return Ok(None);
        };
        let moved = self
            .level(y)
            .into_iter()
            .filter(|&id| self[id].x() > x && self[id].pre_column() == Some(xb))
            .collect();
        Ok(Some(Plan::Lf {
            a,
            b,
            a_pre: xc,
            repairs,
            moved,
        }))
    }

    /// Partner `b` of `a` for `FL`: the nearest combine on `a`'s left reading the same column
    /// `xc`, or else the nearest invisible placeholder that can read `xc` and that `a`'s column
    /// touches. Returns the partner and the column it must be turned to read, if any.
    fn fl_partner(&self, x: usize, y: usize, xc: usize) -> Result<Option<(NodeId, Option<usize>)>> {
        for xb in (xc + 1..x).rev() {
            let id = self.require(xb, y)?;
            if self[id].pre_column() == Some(xc) {
                return Ok(Some((id, None)));
            }
        }
        for xb in (xc + 1..x).rev() {
            let id = self.require(xb, y)?;
            if self[id].role() == Role::Invisible
                && self.low_at(xb, y - 1)? <= xc + 1
                && self.low_at(x, y - 1)? <= xb + 1
            {
                return Ok(Some((id, Some(xc))));
            }
        }
        Ok(None)
    }

    /// `a` reads column `xc` and has a partner `b` on its level reading `xc` too. `a` moves one
    /// level down and reads `b` instead. Its diagonal successors whose column already touches
    /// `b` read `b` from now on, the others move down with `a`.
    pub(super) fn plan_fl(&self, x: usize, y: usize) -> Result<Option<Plan>> {
        let a = self.require(x, y)?;
        let Some(xc) = self[a].pre_column() else {
            return Ok(None);
        };
        let Some((b, b_pre)) = self.fl_partner(x, y, xc)? else {
            return Ok(None);
        };
        let xb = self[b].x();
        if self.low_at(x, y - 1)? > xb + 1 {
            return Ok(None);
        }

        let mut rehomed = Vec::new();
        let mut followers = Vec::new();
        for succ in self.post(a) {
            match self.low_at(self[succ].x(), y)? <= xb + 1 {
                true => rehomed.push(succ),
                false => followers.push(succ),
            }
        }
        let Some(shift) = self.shift_set(a, followers)? else {
            return Ok(None);
        };
        Ok(Some(Plan::Fl {
            a,
            b,
            b_pre,
            rehomed,
            shift,
        }))
    }

    /// `a`, the given followers and everything downstream of them through diagonal reads, if
    /// each of them can move one level down: the slot below must be invisible, part of the set,
    /// or the post-processing row (a level is then inserted).
    fn shift_set(&self, a: NodeId, followers: Vec<NodeId>) -> Result<Option<Shift>> {
        let mut members = BTreeSet::from([a]);
        members.extend(followers.iter().copied());
        let mut stack = followers;
        while let Some(id) = stack.pop() {
            for succ in self.post(id) {
                if members.insert(succ) {
                    stack.push(succ);
                }
            }
        }

        let mut grow = false;
        for &id in &members {
            let below = self[id].y() + 1;
            if below == self.post_level() {
                grow = true;
                continue;
            }
            let target = self.require(self[id].x(), below)?;
            if !members.contains(&target) && self[target].role() != Role::Invisible {
                return Ok(None);
            }
        }
        let mut nodes: Vec<NodeId> = members.into_iter().collect();
        nodes.sort_by_key(|&id| (std::cmp::Reverse(self[id].y()), self[id].x()));
        Ok(Some(Shift { nodes, grow }))
    }

    pub(super) fn shift_down(&mut self, shift: Shift) -> Result<()> {
        if shift.grow {
            self.insert_layer(self.post_level())?;
        }
        for id in shift.nodes {
            let coord = self[id].coord();
            self.swap_vertical(coord.x, coord.y)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use crate::{Coord, PrefixGrid, Topology};

    #[test]
    fn lf_then_fl() {
        let mut grid = PrefixGrid::with_defaults(8, Topology::Ripple).unwrap();
        let ripple = grid.layout();
        let pivot = grid.lf(3, None, true).unwrap().unwrap();
        // (3, 3) moved up to read column 1 like (2, 2), (3, 1) now reads column 2
        assert_eq!(pivot.a, Coord::new(3, 2));
        assert_eq!(pivot.b, Coord::new(2, 2));
        assert_eq!(pivot.repairs, vec![Coord::new(3, 1)]);

        let pivot = grid.fl(pivot.a.x, Some(pivot.a.y), true).unwrap().unwrap();
        assert_eq!(pivot.a, Coord::new(3, 3));
        assert_eq!(pivot.b, Coord::new(2, 2));
        // The ripple chain was pushed down, a level was added for it
        assert_eq!(grid.post_level(), 8);
        assert_eq!(grid.layout(), ripple);
    }

    #[test]
    fn lf_repoints_the_fan_out() {
        let mut grid = PrefixGrid::with_defaults(16, Topology::BrentKung).unwrap();
        let brent_kung = grid.layout();
        // (12, 5) and (13, 5) both read (11, 4)
        let pivot = grid.lf(12, Some(5), true).unwrap().unwrap();
        assert_eq!(pivot.a, Coord::new(12, 4));
        assert_eq!(pivot.b, Coord::new(11, 4));
        assert_eq!(grid.node_at(12, 3).unwrap().pre_column(), Some(11));
        assert_eq!(grid.node_at(12, 4).unwrap().pre_column(), Some(7));
        assert_eq!(grid.node_at(13, 5).unwrap().pre_column(), Some(12));
        grid.check_tree().unwrap();

        // (13, 5) goes back to (11, 4) as its column still touches it
        let pivot = grid.fl(12, Some(4), true).unwrap().unwrap();
        assert_eq!(pivot.a, Coord::new(12, 5));
        assert_eq!(grid.node_at(13, 5).unwrap().pre_column(), Some(11));
        assert_eq!(grid.layout(), brent_kung);
    }

    #[test]
    fn lf_preconditions() {
        let grid = PrefixGrid::with_defaults(8, Topology::BrentKung).unwrap();
        // (6, 4) reads (5, 3), which reads column 3, and (6, 3) is free
        assert!(grid.plan_lf(6, 4).unwrap().is_some());
        // The slot above (7, 3) is taken by (7, 2)
        assert!(grid.plan_lf(7, 3).unwrap().is_none());
        // Placeholders read nothing
        assert!(grid.plan_lf(6, 3).unwrap().is_none());
        assert!(grid.plan_lf(1, 1).unwrap().is_none());

        let grid = PrefixGrid::with_defaults(8, Topology::Ripple).unwrap();
        assert!(grid.plan_lf(3, 3).unwrap().is_some());
        // Column 2 cannot reach bit 1 from level 0
        assert!(grid.plan_lf(2, 2).unwrap().is_none());
    }

    #[test]
    fn fl_preconditions() {
        let grid = PrefixGrid::with_defaults(8, Topology::Sklansky).unwrap();
        // (3, 2) moves below (2, 2), which also reads column 1
        assert!(grid.plan_fl(3, 2).unwrap().is_some());
        // Nothing reads column 1 between columns 1 and 2
        assert!(grid.plan_fl(2, 2).unwrap().is_none());
        // (7, 2) would move below (6, 2), but (7, 3) is in the way
        assert!(grid.plan_fl(7, 2).unwrap().is_none());
        assert!(grid.plan_fl(7, 3).unwrap().is_some());
    }
}
