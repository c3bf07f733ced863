//! Branch-and-bound search for the smallest set of combine cells to synthesize in a column so
//! that its mask reaches a given bit.

use std::collections::HashMap;

use crate::{Coord, PrefixError, PrefixGrid, Result, low_bit};

/// Default number of search steps before giving up.
pub const DEFAULT_BUDGET: usize = 10_000;

/// How a `(level, target)` subproblem is solved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// The column already reaches the target.
    Covered,
    /// The placeholder of this level becomes a combine reading the given column.
    Repair(usize),
    /// This level is left as is, the column is fixed further up.
    Pass,
}

/// A subproblem being explored.
struct Frame {
    level: usize,
    target: usize,
    options: Vec<Step>,
    next: usize,
    /// Option waiting for the answer of its subproblem.
    pending: Option<Step>,
    best: Option<(usize, Step)>,
}

fn step_cost(step: Step) -> usize {
    usize::from(matches!(step, Step::Repair(_)))
}

/// Search for repair sets in one column of a grid.
///
/// Solving `(level, target)` means making the mask of the column at `level` reach bit
/// `target` or lower. A placeholder at `level` can become a combine cell reading any node of
/// the previous level that reaches the target; the column above must then reach one past that
/// node's column for the new mask to stay contiguous. Otherwise the level is left untouched and
/// the problem moves one level up. Solutions are minimal in number of new cells. Among minimal
/// ones, repairs are preferred over passes and the rightmost predecessor wins.
///
/// Options are explored depth first against the best solution found so far: an option that
/// cannot beat it is skipped without opening its subproblem. Solved subproblems are memoized.
///
/// ```rust
/// use prefixgrid::{Coord, PrefixGrid, Topology, transform::RepairSearch};
/// let grid = PrefixGrid::with_defaults(8, Topology::Ripple).unwrap();
/// let mut search = RepairSearch::new(&grid);
/// // (3, 1) can read (2, 0), which brings column 3 down to bit 2 at level 1
/// let repairs = search.run(3, 1, 2).unwrap().unwrap();
/// assert_eq!(repairs, vec![(Coord::new(3, 1), 2)]);
/// ```
pub struct RepairSearch<'g> {
    grid: &'g PrefixGrid,
    budget: usize,
    steps: usize,
    column: usize,
    memo: HashMap<(usize, usize), Option<(usize, Step)>>,
}

impl<'g> RepairSearch<'g> {
    pub fn new(grid: &'g PrefixGrid) -> Self {
        RepairSearch::with_budget(grid, DEFAULT_BUDGET)
    }

    /// A search that fails with [`PrefixError::RepairSearchExhausted`] after `budget` steps.
    pub fn with_budget(grid: &'g PrefixGrid, budget: usize) -> Self {
        RepairSearch {
            grid,
            budget,
            steps: 0,
            column: 0,
            memo: HashMap::new(),
        }
    }

    /// Number of steps used by the last run.
    pub fn steps(&self) -> usize {
        self.steps
    }

    fn low(&self, x: usize, y: usize) -> Result<usize> {
        let id = self.grid.require(x, y)?;
        Ok(low_bit(self.grid[id].pg()))
    }

    fn covered(&self, level: usize, target: usize) -> Result<bool> {
        Ok(self.low(self.column, level)? <= target)
    }

    /// Solves the trivial cases on the spot, or returns the frame to explore.
    fn open(&mut self, level: usize, target: usize) -> Result<Option<Frame>> {
        if self.covered(level, target)? {
            self.memo.insert((level, target), Some((0, Step::Covered)));
            return Ok(None);
        }
        if level == 0 {
            self.memo.insert((level, target), None);
            return Ok(None);
        }
        let mut options = Vec::new();
        let slot = self.grid.require(self.column, level)?;
        if self.grid[slot].role().is_placeholder() {
            for xr in (0..self.column).rev() {
                if self.low(xr, level - 1)? <= target {
                    options.push(Step::Repair(xr));
                }
            }
        }
        options.push(Step::Pass);
        Ok(Some(Frame {
            level,
            target,
            options,
            next: 0,
            pending: None,
            best: None,
        }))
    }

    fn subproblem(frame: &Frame, step: Step) -> (usize, usize) {
        match step {
            Step::Repair(xr) => (frame.level - 1, xr + 1),
            _ => (frame.level - 1, frame.target),
        }
    }

    /// Lowest cost an option can reach: its own cell, plus one more if its subproblem is not
    /// solved for free.
    fn floor(&self, frame: &Frame, step: Step) -> Result<usize> {
        let (level, target) = RepairSearch::subproblem(frame, step);
        let extra = usize::from(!self.covered(level, target)?);
        Ok(step_cost(step) + extra)
    }

    /// Skips the options that cannot beat the best solution of the frame.
    fn prune(&self, frame: &mut Frame) -> Result<()> {
        let Some((best, _)) = frame.best else {
            return Ok(());
        };
        while frame.next < frame.options.len() && self.floor(frame, frame.options[frame.next])? >= best {
            frame.next += 1;
        }
        Ok(())
    }

    fn consider(&self, frame: &mut Frame, step: Step) {
        let key = RepairSearch::subproblem(frame, step);
        if let Some(Some((cost, _))) = self.memo.get(&key) {
            let total = cost + step_cost(step);
            if frame.best.is_none_or(|(best, _)| total < best) {
                frame.best = Some((total, step));
            }
        }
    }

    /// Finds a minimal repair set making the mask of `column` at `level` reach bit `target`.
    ///
    /// Returns the cells to turn into combine cells with the column each one must read, from
    /// the bottom up, or None if no repair set exists.
    pub fn run(
        &mut self,
        column: usize,
        level: usize,
        target: usize,
    ) -> Result<Option<Vec<(Coord, usize)>>> {
        self.column = column;
        self.steps = 0;
        self.memo.clear();

        let mut stack: Vec<Frame> = self.open(level, target)?.into_iter().collect();
        while let Some(mut frame) = stack.pop() {
            self.steps += 1;
            if self.steps > self.budget {
                return Err(PrefixError::RepairSearchExhausted(self.steps - 1));
            }
            if let Some(step) = frame.pending.take() {
                self.consider(&mut frame, step);
            }
            self.prune(&mut frame)?;
            if frame.next >= frame.options.len() {
                self.memo.insert((frame.level, frame.target), frame.best);
                continue;
            }

            let step = frame.options[frame.next];
            frame.next += 1;
            let key = RepairSearch::subproblem(&frame, step);
            if self.memo.contains_key(&key) {
                self.consider(&mut frame, step);
                stack.push(frame);
                continue;
            }
            let child = self.open(key.0, key.1)?;
            frame.pending = Some(step);
            stack.push(frame);
            stack.extend(child);
        }

        let mut repairs = Vec::new();
        let (mut k, mut t) = (level, target);
        loop {
            match self.memo.get(&(k, t)).copied().flatten() {
                None => return Ok(None),
                Some((_, Step::Covered)) => break,
                Some((_, Step::Repair(xr))) => {
                    repairs.push((Coord::new(column, k), xr));
                    (k, t) = (k - 1, xr + 1);
                }
                Some((_, Step::Pass)) => k -= 1,
            }
        }
        clilog::debug!(
            PG_REPAIR,
            "column {} down to bit {}: {} repairs in {} steps",
            column,
            target,
            repairs.len(),
            self.steps
        );
        Ok(Some(repairs))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Topology;

    #[test]
    fn already_covered() {
        let grid = PrefixGrid::with_defaults(8, Topology::KoggeStone).unwrap();
        let mut search = RepairSearch::new(&grid);
        // (3, 2) covers bits 0 to 3
        assert_eq!(search.run(3, 2, 0).unwrap(), Some(Vec::new()));
    }

    #[test]
    fn chain_of_repairs() {
        let grid = PrefixGrid::with_defaults(8, Topology::Ripple).unwrap();
        let mut search = RepairSearch::new(&grid);
        // (5, 5) reaches bit 0, column 7 then needs bit 6 one level up
        let repairs = search.run(7, 6, 0).unwrap().unwrap();
        assert_eq!(repairs, vec![(Coord::new(7, 6), 5), (Coord::new(7, 5), 6)]);

        // Reaching bit 4 from level 3: bits 4 to 6 are still spread over three columns
        let repairs = search.run(7, 3, 4).unwrap().unwrap();
        assert_eq!(
            repairs,
            vec![(Coord::new(7, 3), 4), (Coord::new(7, 2), 5), (Coord::new(7, 1), 6)]
        );
    }

    #[test]
    fn impossible() {
        let grid = PrefixGrid::with_defaults(8, Topology::Ripple).unwrap();
        let mut search = RepairSearch::new(&grid);
        // Level 0 only ever holds single bits
        assert_eq!(search.run(2, 0, 1).unwrap(), None);
        // From level 1, bit 0 is out of reach of column 3
        assert_eq!(search.run(3, 1, 0).unwrap(), None);
    }

    #[test]
    fn budget() {
        let grid = PrefixGrid::with_defaults(16, Topology::Ripple).unwrap();
        let mut search = RepairSearch::with_budget(&grid, 3);
        assert!(matches!(
            search.run(15, 14, 0),
            Err(PrefixError::RepairSearchExhausted(3))
        ));
        let mut search = RepairSearch::new(&grid);
        assert!(search.run(15, 14, 0).unwrap().is_some());
        assert!(search.steps() > 3);
    }

    #[test]
    fn bounded_by_best_solution() {
        let grid = PrefixGrid::with_defaults(16, Topology::Ripple).unwrap();
        // Options that cannot beat the two repairs found first are never opened, which keeps
        // the search well under the size of the whole tree of options
        let mut search = RepairSearch::with_budget(&grid, 2_000);
        let repairs = search.run(15, 14, 0).unwrap().unwrap();
        assert_eq!(repairs, vec![(Coord::new(15, 14), 13), (Coord::new(15, 13), 14)]);
        assert!(search.steps() <= 2_000);
    }
}
