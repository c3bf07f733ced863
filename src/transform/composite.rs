use super::{Applied, Pivot, TransformKind};
use crate::{PrefixError, PrefixGrid, Result};

impl PrefixGrid {
    /// Runs both halves of `LT` or `TL` at `(x, y)`. The grid is left half-transformed when the
    /// second half does not apply, callers work on a copy.
    ///
    /// `LT` folds the node at `(x, y)` up next to its predecessor `b`, then makes `b` read
    /// further left. `TL` starts from such a `b`: it reads further right again, and the nearest
    /// node on its right reading the same column moves back below it. Either way the pivot is
    /// `b` first, then the node that changed level.
    pub(super) fn composite_at(
        &mut self,
        kind: TransformKind,
        x: usize,
        y: usize,
    ) -> Result<Option<Applied>> {
        match kind {
            TransformKind::Lt => {
                let Some(first) = self.apply_simple(TransformKind::Lf, x, y)? else {
                    return Ok(None);
                };
                let b = self[first.b].coord();
                let Some(second) = self.apply_simple(TransformKind::Tf, b.x, b.y)? else {
                    return Ok(None);
                };
                Ok(Some(Applied {
                    a: first.b,
                    b: first.a,
                    pivot: Pivot {
                        a: b,
                        b: self[first.a].coord(),
                        repairs: second.pivot.repairs,
                    },
                }))
            }
            TransformKind::Tl => {
                let n = self.require(x, y)?;
                let Some(first) = self.apply_simple(TransformKind::Ft, x, y)? else {
                    return Ok(None);
                };
                let column = self[n].pre_column();
                let Some(a) = self
                    .level(y)
                    .into_iter()
                    .find(|&id| self[id].x() > x && self[id].pre_column() == column)
                else {
                    return Ok(None);
                };
                let Some(second) = self.apply_simple(TransformKind::Fl, self[a].x(), y)? else {
                    return Ok(None);
                };
                Ok(Some(Applied {
                    a: second.a,
                    b: n,
                    pivot: Pivot {
                        a: self[second.a].coord(),
                        b: self[n].coord(),
                        repairs: first.pivot.repairs,
                    },
                }))
            }
            _ => Err(PrefixError::InvalidState(format!(
                "{} is not a composite transform",
                kind
            ))),
        }
    }
}

#[cfg(test)]
mod test {
    use crate::{Coord, PrefixGrid, Topology, TransformKind};

    #[test]
    fn lt_on_ripple() {
        let grid = PrefixGrid::with_defaults(8, Topology::Ripple).unwrap();
        // (2, 2) cannot fold: column 2 never reaches bit 1 above level 1
        assert!(grid.check(TransformKind::Lt, 2, None).unwrap().is_none());

        let pivot = grid.check(TransformKind::Lt, 3, None).unwrap().unwrap();
        assert_eq!(pivot.a, Coord::new(2, 2));
        assert_eq!(pivot.b, Coord::new(3, 2));
        assert_eq!(pivot.repairs, vec![Coord::new(2, 1)]);

        let mut grid = grid;
        let ripple = grid.layout();
        grid.lt(3, None, true).unwrap().unwrap();
        assert_eq!(grid.node_at(2, 1).unwrap().pre_column(), Some(1));
        assert_eq!(grid.node_at(2, 2).unwrap().pre_column(), Some(0));
        assert_eq!(grid.node_at(3, 1).unwrap().pre_column(), Some(2));
        assert_eq!(grid.node_at(3, 2).unwrap().pre_column(), Some(1));
        grid.check_tree().unwrap();

        let pivot = grid.tl(pivot.a.x, Some(pivot.a.y), true).unwrap().unwrap();
        assert_eq!(pivot.a, Coord::new(3, 3));
        assert_eq!(grid.layout(), ripple);
    }

    #[test]
    fn tl_on_kogge_stone() {
        let mut grid = PrefixGrid::with_defaults(8, Topology::KoggeStone).unwrap();
        let kogge_stone = grid.layout();
        // (5, 3) reads column 2 instead of 1, then (6, 3) moves below it
        let pivot = grid.tl(5, None, true).unwrap().unwrap();
        assert_eq!(pivot.a, Coord::new(6, 4));
        assert_eq!(pivot.b, Coord::new(5, 3));
        assert_eq!(grid.node_at(5, 3).unwrap().pre_column(), Some(2));
        assert_eq!(grid.node_at(6, 4).unwrap().pre_column(), Some(5));
        grid.check_tree().unwrap();

        let pivot = grid.lt(pivot.a.x, Some(pivot.a.y), true).unwrap().unwrap();
        assert_eq!(pivot.a, Coord::new(5, 3));
        assert_eq!(grid.layout(), kogge_stone);
    }
}
