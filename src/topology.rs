//! Construction of prefix trees in one of the classic shapes.
//!
//! ```rust
//! use prefixgrid::{PrefixGrid, Topology};
//! let grid = PrefixGrid::with_defaults(16, Topology::KoggeStone).unwrap();
//! assert!(grid.check_tree().is_ok());
//! // pre-processing row, 4 main levels, post-processing row
//! assert_eq!(grid.depth(), 6);
//! ```

use std::{fmt::Display, rc::Rc, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    Coord, PrefixError, PrefixGrid, Result, Role,
    catalog::{CellCatalog, CellRoleMap},
};

/// Initial shape of a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topology {
    /// Serial prefix: one combine per level.
    Ripple,
    /// Minimal depth, fan-out doubling at each level.
    Sklansky,
    /// Minimal depth, fan-out of 2 everywhere.
    KoggeStone,
    /// Up-sweep then down-sweep, minimal cell count.
    BrentKung,
}

impl Display for Topology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Topology::Ripple => "ripple",
            Topology::Sklansky => "sklansky",
            Topology::KoggeStone => "kogge-stone",
            Topology::BrentKung => "brent-kung",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Topology {
    type Err = PrefixError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace(['_', ' '], "-").as_str() {
            "ripple" | "serial" => Ok(Topology::Ripple),
            "sklansky" => Ok(Topology::Sklansky),
            "kogge-stone" | "koggestone" => Ok(Topology::KoggeStone),
            "brent-kung" | "brentkung" => Ok(Topology::BrentKung),
            _ => Err(PrefixError::UnknownName(s.to_string())),
        }
    }
}

/// `floor(log2(n))`, for `n >= 1`.
fn log2_floor(n: usize) -> usize {
    (usize::BITS - 1 - n.leading_zeros()) as usize
}

impl Topology {
    /// The combine cells of each main level, as `(column, predecessor column)` pairs.
    /// Empty levels are dropped.
    fn main_levels(self, width: usize) -> Vec<Vec<(usize, usize)>> {
        let mut levels: Vec<Vec<(usize, usize)>> = Vec::new();
        match self {
            Topology::Ripple => {
                for x in 1..width {
                    levels.push(vec![(x, x - 1)]);
                }
            }
            Topology::Sklansky => {
                let mut span = 1;
                while span < width {
                    levels.push(
                        (0..width)
                            .filter(|x| x & span != 0)
                            .map(|x| (x, x / span * span - 1))
                            .collect(),
                    );
                    span <<= 1;
                }
            }
            Topology::KoggeStone => {
                let mut span = 1;
                while span < width {
                    levels.push((span..width).map(|x| (x, x - span)).collect());
                    span <<= 1;
                }
            }
            Topology::BrentKung => {
                let top = log2_floor(width);
                for k in 1..=top {
                    let span = 1 << k;
                    levels.push(
                        (0..width)
                            .filter(|x| (x + 1) % span == 0)
                            .map(|x| (x, x - span / 2))
                            .collect(),
                    );
                }
                for k in (1..=top).rev() {
                    let span = 1 << k;
                    levels.push(
                        (span..width)
                            .filter(|x| (x + 1) % span == span / 2)
                            .map(|x| (x, x - span / 2))
                            .collect(),
                    );
                }
            }
        }
        levels.retain(|level| !level.is_empty());
        levels
    }
}

impl PrefixGrid {
    /// Builds a tree of the given shape. The result is cleaned, so Brent-Kung trees come out
    /// compacted.
    pub fn new_tree(
        width: usize,
        topology: Topology,
        roles: CellRoleMap,
        catalog: Rc<CellCatalog>,
    ) -> Result<Self> {
        let mut grid = PrefixGrid::new(width, roles, catalog)?;
        let levels = topology.main_levels(width);

        for x in 0..width {
            grid.place(Coord::new(x, 0), Role::Pre, None)?;
        }
        for (i, combines) in levels.iter().enumerate() {
            let y = i + 1;
            let mut pres = vec![None; width];
            for &(x, pre) in combines {
                pres[x] = Some(pre);
            }
            for (x, pre) in pres.into_iter().enumerate() {
                let role = match pre {
                    Some(_) => Role::Black,
                    None => Role::Invisible,
                };
                grid.place(Coord::new(x, y), role, pre)?;
            }
        }
        let post = levels.len() + 1;
        for x in 0..width {
            grid.place(Coord::new(x, post), Role::Post, None)?;
        }
        grid.settle()?;
        grid.clean()?;

        clilog::debug!(
            PG_BUILD,
            "built {} tree of width {}: {} levels, {} real cells",
            topology,
            width,
            grid.depth(),
            grid.real_count()
        );
        Ok(grid)
    }

    /// Builds a tree with the standard cells of [`CellCatalog::default`].
    pub fn with_defaults(width: usize, topology: Topology) -> Result<Self> {
        PrefixGrid::new_tree(
            width,
            topology,
            CellRoleMap::default(),
            Rc::new(CellCatalog::default()),
        )
    }
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn every_output_is_valid(
        #[values(4, 8, 16, 32)] width: usize,
        #[values(
            Topology::Ripple,
            Topology::Sklansky,
            Topology::KoggeStone,
            Topology::BrentKung
        )]
        topology: Topology,
    ) {
        clilog::init_stdout_simple_trace();
        let grid = PrefixGrid::with_defaults(width, topology).unwrap();
        grid.check_integrity().unwrap();
        grid.check_tree().unwrap();
        for x in 0..width {
            assert!(grid.node_at(x, grid.post_level()).unwrap().is_valid());
        }
    }

    #[rstest]
    #[case(1)]
    #[case(3)]
    #[case(5)]
    #[case(7)]
    #[case(12)]
    #[case(33)]
    #[case(64)]
    fn odd_widths(#[case] width: usize) {
        for topology in [
            Topology::Ripple,
            Topology::Sklansky,
            Topology::KoggeStone,
            Topology::BrentKung,
        ] {
            let grid = PrefixGrid::with_defaults(width, topology).unwrap();
            grid.check_integrity().unwrap();
            grid.check_tree().unwrap();
        }
    }

    #[test]
    fn ripple_depth() {
        let grid = PrefixGrid::with_defaults(8, Topology::Ripple).unwrap();
        assert_eq!(grid.depth(), 9);
        assert_eq!(grid.real_count(), 8 + 7 + 8);
        for x in 1..8 {
            assert_eq!(grid.node_at(x, x).unwrap().pre_column(), Some(x - 1));
        }
    }

    #[rstest]
    #[case(Topology::Sklansky, 4, 8 + 12 + 8)]
    #[case(Topology::KoggeStone, 4, 8 + 17 + 8)]
    fn log_depth(#[case] topology: Topology, #[case] post_level: usize, #[case] cells: usize) {
        let grid = PrefixGrid::with_defaults(8, topology).unwrap();
        assert_eq!(grid.post_level(), post_level);
        assert_eq!(grid.real_count(), cells);
    }

    #[test]
    fn brent_kung_is_compacted() {
        let grid = PrefixGrid::with_defaults(8, Topology::BrentKung).unwrap();
        // 4 main levels once the down-sweep has been pulled up
        assert_eq!(grid.post_level(), 5);
        assert_eq!(grid.real_count(), 8 + 11 + 8);
        assert_eq!(grid.node_at(6, 4).unwrap().pre_column(), Some(5));
        assert_eq!(grid.node_at(2, 2).unwrap().pre_column(), Some(1));
    }

    #[test]
    fn width_one() {
        let grid = PrefixGrid::with_defaults(1, Topology::Sklansky).unwrap();
        assert_eq!(grid.depth(), 2);
        grid.check_tree().unwrap();
    }

    #[test]
    fn names() {
        assert_eq!("Kogge_Stone".parse::<Topology>().unwrap(), Topology::KoggeStone);
        assert_eq!("brent-kung".parse::<Topology>().unwrap(), Topology::BrentKung);
        assert!("han-carlson".parse::<Topology>().is_err());
        assert_eq!(Topology::Sklansky.to_string(), "sklansky");
    }
}
