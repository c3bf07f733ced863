//! Local rewrites between the three canonical forms of a prefix tree region.
//!
//! - L: a column fed by a chain of diagonal reads, one level at a time,
//! - F: a fan-out node feeding several columns at once,
//! - T: a node reading a predecessor further away, with its column repaired.
//!
//! `LF`/`FL` and `TF`/`FT` are inverse pairs, `LT` and `TL` chain two of them. Every rewrite
//! first finds a complete plan by inspecting the grid, then mutates: a transform that does not
//! apply leaves the grid untouched. A plan is only accepted if the inverse transform, run at
//! the returned pivot once the grid is cleaned, gives the cleaned grid back.
//!
//! ```rust
//! use prefixgrid::{PrefixGrid, Topology};
//! let mut grid = PrefixGrid::with_defaults(8, Topology::Sklansky).unwrap();
//! let sklansky = grid.layout();
//! let pivot = grid.fl(6, None, true).unwrap().unwrap();
//! assert_eq!(grid.layout(), PrefixGrid::with_defaults(8, Topology::BrentKung).unwrap().layout());
//! grid.lf(pivot.a.x, Some(pivot.a.y), true).unwrap();
//! assert_eq!(grid.layout(), sklansky);
//! ```

mod composite;
mod lf;
mod repair;
mod tf;

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

pub use repair::{DEFAULT_BUDGET, RepairSearch};

use crate::{Coord, NodeId, PrefixError, PrefixGrid, Result};

/// The six transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransformKind {
    Lf,
    Fl,
    Tf,
    Ft,
    Lt,
    Tl,
}

impl TransformKind {
    pub const ALL: [TransformKind; 6] = [
        TransformKind::Lf,
        TransformKind::Fl,
        TransformKind::Tf,
        TransformKind::Ft,
        TransformKind::Lt,
        TransformKind::Tl,
    ];

    pub fn inverse(self) -> Self {
        match self {
            TransformKind::Lf => TransformKind::Fl,
            TransformKind::Fl => TransformKind::Lf,
            TransformKind::Tf => TransformKind::Ft,
            TransformKind::Ft => TransformKind::Tf,
            TransformKind::Lt => TransformKind::Tl,
            TransformKind::Tl => TransformKind::Lt,
        }
    }

    /// Whether the transform chains two others.
    pub fn is_composite(self) -> bool {
        matches!(self, TransformKind::Lt | TransformKind::Tl)
    }
}

impl Display for TransformKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TransformKind::Lf => "LF",
            TransformKind::Fl => "FL",
            TransformKind::Tf => "TF",
            TransformKind::Ft => "FT",
            TransformKind::Lt => "LT",
            TransformKind::Tl => "TL",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for TransformKind {
    type Err = PrefixError;

    fn from_str(s: &str) -> Result<Self> {
        TransformKind::ALL
            .into_iter()
            .find(|kind| kind.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| PrefixError::UnknownName(s.to_string()))
    }
}

/// Where a transform happened.
///
/// `a` is the node the transform was applied to and `b` its partner: the node `a` now reads
/// or used to read for `LF` and `FL`, its new diagonal predecessor for `TF` and `FT`. For the
/// composites `a` is the node whose predecessor was rebound and `b` the node that changed
/// level. Applying the inverse transform at `a` undoes the transform. `repairs` are the
/// placeholders turned into combine cells by the repair search.
///
/// Coordinates are read once the grid has been cleaned. Repairs keep the coordinates they had
/// right after the rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pivot {
    pub a: Coord,
    pub b: Coord,
    pub repairs: Vec<Coord>,
}

/// The mutations a transform will perform, fully determined before any of them happens.
#[derive(Debug, Clone)]
enum Plan {
    /// Synthesize the repairs, move `a` into the invisible slot above it to read `a_pre`, and
    /// make `moved` read `a`'s column.
    Lf {
        a: NodeId,
        b: NodeId,
        a_pre: usize,
        repairs: Vec<(Coord, usize)>,
        moved: Vec<NodeId>,
    },
    /// Turn `b` into a combine reading `b_pre` if needed, make `rehomed` read `b`'s column,
    /// then move `a` down with the shift and make it read `b`.
    Fl {
        a: NodeId,
        b: NodeId,
        b_pre: Option<usize>,
        rehomed: Vec<NodeId>,
        shift: lf::Shift,
    },
    /// Synthesize the repairs, then make `a` read `new_pre`.
    Retarget {
        a: NodeId,
        new_pre: usize,
        repairs: Vec<(Coord, usize)>,
    },
}

impl Plan {
    fn repairs(&self) -> Vec<Coord> {
        match self {
            Plan::Lf { repairs, .. } | Plan::Retarget { repairs, .. } => {
                repairs.iter().map(|(coord, _)| *coord).collect()
            }
            Plan::Fl { .. } => Vec::new(),
        }
    }
}

/// A transform that went through, before cleanup.
#[derive(Debug, Clone)]
struct Applied {
    a: NodeId,
    b: NodeId,
    pivot: Pivot,
}

impl PrefixGrid {
    /// Levels to try for a transform on column `x`: the given one, or every main level from
    /// the bottom up.
    fn candidate_levels(&self, x: usize, y: Option<usize>) -> Result<Vec<usize>> {
        if x >= self.width() {
            return Err(PrefixError::InvalidPlacement(format!(
                "column {} out of bounds",
                x
            )));
        }
        match y {
            Some(y) if y >= self.depth() => Err(PrefixError::NotFound(Coord::new(x, y))),
            Some(y) => Ok(vec![y]),
            None => Ok((1..self.post_level()).rev().collect()),
        }
    }

    /// Plan of a simple transform at `(x, y)`, if its pattern matches there.
    fn plan_at(&self, kind: TransformKind, x: usize, y: usize) -> Result<Option<Plan>> {
        if !self.is_main_level(y) {
            return Ok(None);
        }
        match kind {
            TransformKind::Lf => self.plan_lf(x, y),
            TransformKind::Fl => self.plan_fl(x, y),
            TransformKind::Tf => self.plan_tf(x, y),
            TransformKind::Ft => self.plan_ft(x, y),
            TransformKind::Lt | TransformKind::Tl => Err(PrefixError::InvalidState(format!(
                "{} has no single plan",
                kind
            ))),
        }
    }

    fn synthesize(&mut self, repairs: Vec<(Coord, usize)>) -> Result<()> {
        for (coord, pre) in repairs {
            let slot = self.require(coord.x, coord.y)?;
            self.morph(slot, Some(pre))?;
        }
        Ok(())
    }

    fn execute(&mut self, plan: Plan) -> Result<Applied> {
        let repairs = plan.repairs();
        let (a, b) = match plan {
            Plan::Lf {
                a,
                b,
                a_pre,
                repairs,
                moved,
            } => {
                self.synthesize(repairs)?;
                let here = self[a].coord();
                self.swap_vertical(here.x, here.y - 1)?;
                self.morph(a, Some(a_pre))?;
                for id in moved {
                    self.morph(id, Some(here.x))?;
                }
                (a, b)
            }
            Plan::Fl {
                a,
                b,
                b_pre,
                rehomed,
                shift,
            } => {
                if let Some(pre) = b_pre {
                    self.morph(b, Some(pre))?;
                }
                let xb = self[b].x();
                for id in rehomed {
                    self.morph(id, Some(xb))?;
                }
                self.shift_down(shift)?;
                self.morph(a, Some(xb))?;
                (a, b)
            }
            Plan::Retarget {
                a,
                new_pre,
                repairs,
            } => {
                self.synthesize(repairs)?;
                self.morph(a, Some(new_pre))?;
                let y = self[a].y();
                (a, self.require(new_pre, y - 1)?)
            }
        };
        self.propagate()?;
        let pivot = Pivot {
            a: self[a].coord(),
            b: self[b].coord(),
            repairs,
        };
        Ok(Applied { a, b, pivot })
    }

    /// Applies a simple transform at `(x, y)` without cleaning, reversible or not.
    fn apply_simple(&mut self, kind: TransformKind, x: usize, y: usize) -> Result<Option<Applied>> {
        let Some(plan) = self.plan_at(kind, x, y)? else {
            return Ok(None);
        };
        self.clear_blocks();
        let applied = self.execute(plan)?;
        clilog::debug!(
            PG_XFORM,
            "{} at {}, partner {}",
            kind,
            applied.pivot.a,
            applied.pivot.b
        );
        Ok(Some(applied))
    }

    /// Applies any transform at `(x, y)` without cleaning. Composites run on a copy, the grid
    /// only changes when both halves apply.
    fn apply_at(&mut self, kind: TransformKind, x: usize, y: usize) -> Result<Option<Applied>> {
        if !kind.is_composite() {
            return self.apply_simple(kind, x, y);
        }
        let mut trial = self.clone();
        let applied = trial.composite_at(kind, x, y)?;
        if applied.is_some() {
            *self = trial;
        }
        Ok(applied)
    }

    /// Reads the pivot coordinates again after the nodes moved.
    fn relocate(&self, applied: &mut Applied) {
        if let Ok(node) = self.get(applied.a) {
            applied.pivot.a = node.coord();
        }
        if let Ok(node) = self.get(applied.b) {
            applied.pivot.b = node.coord();
        }
    }

    /// Pivot of `kind` at `(x, y)`, if it applies there and the inverse transform at that
    /// pivot brings back the cleaned grid. Runs on copies only.
    fn reversible_at(&self, kind: TransformKind, x: usize, y: usize) -> Result<Option<Pivot>> {
        let mut forward = self.clone();
        let Some(mut applied) = forward.apply_at(kind, x, y)? else {
            return Ok(None);
        };
        forward.clean()?;
        forward.relocate(&mut applied);
        let pivot = applied.pivot;

        let mut back = forward;
        if back.apply_at(kind.inverse(), pivot.a.x, pivot.a.y)?.is_none() {
            clilog::debug!(
                PG_XFORM,
                "{} at {}: no {} at {}",
                kind,
                Coord::new(x, y),
                kind.inverse(),
                pivot.a
            );
            return Ok(None);
        }
        back.clean()?;
        let mut before = self.clone();
        before.clean()?;
        if back.layout() != before.layout() {
            clilog::debug!(PG_XFORM, "{} at {} cannot be undone", kind, Coord::new(x, y));
            return Ok(None);
        }
        Ok(Some(pivot))
    }

    /// First candidate level where `kind` applies on column `x`, with its pivot.
    fn find_level(
        &self,
        kind: TransformKind,
        x: usize,
        y: Option<usize>,
    ) -> Result<Option<(usize, Pivot)>> {
        for y in self.candidate_levels(x, y)? {
            if !self.is_main_level(y) {
                continue;
            }
            if let Some(pivot) = self.reversible_at(kind, x, y)? {
                return Ok(Some((y, pivot)));
            }
        }
        Ok(None)
    }

    /// Whether a transform applies on column `x`, at level `y` or at the lowest level where it
    /// does, and the pivot it would return with cleaning. The grid is never modified.
    ///
    /// A transform applies where its pattern matches and the inverse transform, run at the
    /// returned pivot, restores the cleaned grid.
    pub fn check(&self, kind: TransformKind, x: usize, y: Option<usize>) -> Result<Option<Pivot>> {
        Ok(self.find_level(kind, x, y)?.map(|(_, pivot)| pivot))
    }

    /// Applies a transform on column `x`, at level `y` or at the lowest level where it applies,
    /// then cleans the grid if asked to. Existing blocks are dissolved.
    ///
    /// Returns None, leaving the grid untouched, when the transform does not apply.
    pub fn apply(
        &mut self,
        kind: TransformKind,
        x: usize,
        y: Option<usize>,
        clean: bool,
    ) -> Result<Option<Pivot>> {
        let Some((y, _)) = self.find_level(kind, x, y)? else {
            clilog::debug!(PG_XFORM, "{} does not apply on column {}", kind, x);
            return Ok(None);
        };
        self.clear_blocks();
        let Some(mut applied) = self.apply_at(kind, x, y)? else {
            return Err(PrefixError::InvalidState(format!(
                "{} at {} stopped applying",
                kind,
                Coord::new(x, y)
            )));
        };
        if clean {
            self.clean()?;
        } else {
            self.settle()?;
        }
        self.relocate(&mut applied);
        Ok(Some(applied.pivot))
    }

    pub fn lf(&mut self, x: usize, y: Option<usize>, clean: bool) -> Result<Option<Pivot>> {
        self.apply(TransformKind::Lf, x, y, clean)
    }

    pub fn fl(&mut self, x: usize, y: Option<usize>, clean: bool) -> Result<Option<Pivot>> {
        self.apply(TransformKind::Fl, x, y, clean)
    }

    pub fn tf(&mut self, x: usize, y: Option<usize>, clean: bool) -> Result<Option<Pivot>> {
        self.apply(TransformKind::Tf, x, y, clean)
    }

    pub fn ft(&mut self, x: usize, y: Option<usize>, clean: bool) -> Result<Option<Pivot>> {
        self.apply(TransformKind::Ft, x, y, clean)
    }

    pub fn lt(&mut self, x: usize, y: Option<usize>, clean: bool) -> Result<Option<Pivot>> {
        self.apply(TransformKind::Lt, x, y, clean)
    }

    pub fn tl(&mut self, x: usize, y: Option<usize>, clean: bool) -> Result<Option<Pivot>> {
        self.apply(TransformKind::Tl, x, y, clean)
    }

    /// Applies a transform on columns `x_start, x_start + step, ...` below `x_end`, cleaning
    /// after each one.
    ///
    /// Fails with [`PrefixError::TransformNotApplicable`] on the first column where the
    /// transform does not apply. Transforms applied before that column are kept.
    pub fn batch_transform(
        &mut self,
        kind: TransformKind,
        x_start: usize,
        x_end: usize,
        step: usize,
    ) -> Result<Vec<Pivot>> {
        if step == 0 {
            return Err(PrefixError::InvalidPlacement(
                "batch step must be positive".to_string(),
            ));
        }
        let timer = clilog::stimer!("batch_transform");
        let mut pivots = Vec::new();
        for x in (x_start..x_end).step_by(step) {
            match self.apply(kind, x, None, true)? {
                Some(pivot) => pivots.push(pivot),
                None => return Err(PrefixError::TransformNotApplicable { kind, x }),
            }
        }
        clilog::finish!(timer);
        Ok(pivots)
    }
}
