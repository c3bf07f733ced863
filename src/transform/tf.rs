use super::{Plan, RepairSearch};
use crate::{Coord, PrefixError, PrefixGrid, Result, low_bit};

impl PrefixGrid {
    /// Runs a repair search, treating an exhausted budget as "no repair set".
    pub(super) fn repairs_for(
        &self,
        search: &mut RepairSearch<'_>,
        column: usize,
        level: usize,
        target: usize,
    ) -> Result<Option<Vec<(Coord, usize)>>> {
        match search.run(column, level, target) {
            Err(PrefixError::RepairSearchExhausted(steps)) => {
                clilog::debug!(
                    PG_REPAIR,
                    "gave up on column {} at level {} after {} steps",
                    column,
                    level,
                    steps
                );
                Ok(None)
            }
            other => other,
        }
    }

    /// `a` reads a column further left, already reaching its lowest bit. Its own column is
    /// repaired so that both inputs still touch. The nearest candidate column wins, which is
    /// also the cheapest one.
    pub(super) fn plan_tf(&self, x: usize, y: usize) -> Result<Option<Plan>> {
        let a = self.require(x, y)?;
        let Some(xp) = self[a].pre_column() else {
            return Ok(None);
        };
        let lo = low_bit(self[a].pg());
        let mut search = RepairSearch::new(self);
        for xq in (0..xp).rev() {
            if self.low_at(xq, y - 1)? > lo {
                continue;
            }
            if let Some(repairs) = self.repairs_for(&mut search, x, y - 1, xq + 1)? {
                return Ok(Some(Plan::Retarget {
                    a,
                    new_pre: xq,
                    repairs,
                }));
            }
        }
        Ok(None)
    }

    /// `a` reads a column further right, which is repaired so that `a` keeps its lowest bit.
    /// The candidate needing the fewest repairs wins, then the one nearest to the current
    /// predecessor.
    pub(super) fn plan_ft(&self, x: usize, y: usize) -> Result<Option<Plan>> {
        let a = self.require(x, y)?;
        let Some(xp) = self[a].pre_column() else {
            return Ok(None);
        };
        let lo = low_bit(self[a].pg());
        let mut search = RepairSearch::new(self);
        let mut best: Option<(usize, Vec<(Coord, usize)>)> = None;
        for xq in xp + 1..x {
            let Some(repairs) = self.repairs_for(&mut search, xq, y - 1, lo)? else {
                continue;
            };
            if best.as_ref().is_none_or(|(_, kept)| repairs.len() < kept.len()) {
                let free = repairs.is_empty();
                best = Some((xq, repairs));
                if free {
                    break;
                }
            }
        }
        Ok(best.map(|(new_pre, repairs)| Plan::Retarget {
            a,
            new_pre,
            repairs,
        }))
    }
}

#[cfg(test)]
mod test {
    use crate::{Coord, PrefixGrid, Topology, TransformKind};

    #[test]
    fn tf_then_ft() {
        let mut grid = PrefixGrid::with_defaults(8, Topology::Sklansky).unwrap();
        let sklansky = grid.layout();
        // (2, 2) reaches bit 0, column 4 is repaired to reach bit 3 at level 2
        let pivot = grid.tf(4, Some(3), true).unwrap().unwrap();
        assert_eq!(pivot.a, Coord::new(4, 3));
        assert_eq!(pivot.b, Coord::new(2, 2));
        assert_eq!(pivot.repairs, vec![Coord::new(4, 2)]);
        assert_eq!(grid.node_at(4, 2).unwrap().pre_column(), Some(3));
        assert_eq!(grid.node_at(4, 3).unwrap().pre_column(), Some(2));

        // Back to (3, 2), the repair is idempotent again and goes away
        let pivot = grid.ft(4, Some(3), true).unwrap().unwrap();
        assert_eq!(pivot.b, Coord::new(3, 2));
        assert!(pivot.repairs.is_empty());
        assert_eq!(grid.layout(), sklansky);
    }

    #[test]
    fn ft_then_tf() {
        let mut grid = PrefixGrid::with_defaults(8, Topology::KoggeStone).unwrap();
        let kogge_stone = grid.layout();
        // (3, 2) already covers bits 0 to 3, nothing to repair
        let pivot = grid.ft(6, Some(3), true).unwrap().unwrap();
        assert_eq!(pivot.a, Coord::new(6, 3));
        assert_eq!(pivot.b, Coord::new(3, 2));
        assert!(pivot.repairs.is_empty());
        assert_eq!(grid.node_at(6, 3).unwrap().pre_column(), Some(3));

        let pivot = grid.tf(6, Some(3), true).unwrap().unwrap();
        assert_eq!(pivot.b, Coord::new(2, 2));
        assert_eq!(grid.layout(), kogge_stone);
    }

    #[test]
    fn ft_with_repair() {
        let mut grid = PrefixGrid::with_defaults(8, Topology::Ripple).unwrap();
        grid.lf(4, None, true).unwrap().unwrap();
        grid.tf(4, None, true).unwrap().unwrap();
        let before = grid.layout();
        // (4, 2) reads column 2: reading column 3 needs column 3 to reach bit 2 at level 1
        let pivot = grid.check(TransformKind::Ft, 4, Some(2)).unwrap().unwrap();
        assert_eq!(pivot.b, Coord::new(3, 1));
        assert_eq!(pivot.repairs, vec![Coord::new(3, 1)]);
        assert_eq!(grid.layout(), before);

        grid.ft(4, Some(2), true).unwrap().unwrap();
        assert_eq!(grid.node_at(3, 1).unwrap().pre_column(), Some(2));
        assert_eq!(grid.node_at(4, 2).unwrap().pre_column(), Some(3));
        grid.check_tree().unwrap();

        grid.tf(pivot.a.x, Some(pivot.a.y), true).unwrap().unwrap();
        assert_eq!(grid.layout(), before);
    }

    #[test]
    fn nothing_to_retarget() {
        let grid = PrefixGrid::with_defaults(8, Topology::Ripple).unwrap();
        // (1, 1) reads column 0, there is no other column to read
        assert!(grid.check(TransformKind::Tf, 1, None).unwrap().is_none());
        assert!(grid.check(TransformKind::Ft, 1, None).unwrap().is_none());
        // Column 0 holds no combine cell
        assert!(grid.check(TransformKind::Tf, 0, None).unwrap().is_none());
        // Every column right of a ripple predecessor misses bit 0
        assert!(grid.check(TransformKind::Ft, 5, None).unwrap().is_none());

        // (2, 2) can read column 0 once (2, 1) reads column 1
        let pivot = grid.check(TransformKind::Tf, 2, None).unwrap().unwrap();
        assert_eq!(pivot.b, Coord::new(0, 1));
        assert_eq!(pivot.repairs, vec![Coord::new(2, 1)]);
    }

    #[test]
    fn irreversible_rewrites_do_not_apply() {
        let grid = PrefixGrid::with_defaults(8, Topology::Ripple).unwrap();
        // (3, 3) could read column 1 through a repair at (3, 2), but cleaning then lifts both
        // cells and reading column 2 again no longer brings the ripple chain back
        assert!(grid.plan_tf(3, 3).unwrap().is_some());
        assert!(grid.check(TransformKind::Tf, 3, None).unwrap().is_none());
    }
}
