//! Provides a visitor over everything downstream of a set of nodes.
//!
//! See [`Downstream`] for details.

use std::collections::HashSet;

use super::{NodeId, PrefixGrid};

/// A DFS over vertical and diagonal successors.
///
/// Nodes are yielded in preorder, each one once, seeds included. The visitor does not borrow the
/// grid, so the grid can be read between two calls to [`next`]:
///
/// ```rust
/// use prefixgrid::{PrefixGrid, Topology, walk::Downstream};
/// let grid = PrefixGrid::with_defaults(8, Topology::Sklansky).unwrap();
/// let seed = grid.id_at(3, 2).unwrap();
/// let mut walk = Downstream::from_nodes([seed]);
/// let mut count = 0;
/// while let Some(id) = walk.next(&grid) {
///     assert!(grid[id].y() >= 2);
///     count += 1;
/// }
/// assert!(count > 1);
/// ```
///
/// [`next`]: Downstream::next
pub struct Downstream {
    /// All nodes on the stack have not been visited yet, and are already in `seen`.
    stack: Vec<NodeId>,
    seen: HashSet<NodeId>,
}

impl Downstream {
    /// Starts a walk from the given seeds. Duplicates are visited once.
    pub fn from_nodes(seeds: impl IntoIterator<Item = NodeId>) -> Self {
        let mut stack = Vec::new();
        let mut seen = HashSet::new();
        for id in seeds {
            if seen.insert(id) {
                stack.push(id);
            }
        }
        // Seeds are popped in the order they were given
        stack.reverse();
        Downstream { stack, seen }
    }

    /// Yields the next node, or None once everything downstream has been visited.
    pub fn next(&mut self, grid: &PrefixGrid) -> Option<NodeId> {
        let id = self.stack.pop()?;
        let successors = grid.post(id).into_iter().rev().chain(grid.bottom(id));
        for succ in successors {
            if self.seen.insert(succ) {
                self.stack.push(succ);
            }
        }
        Some(id)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Topology;

    #[test]
    fn from_post_node() {
        let grid = PrefixGrid::with_defaults(4, Topology::Ripple).unwrap();
        let post = grid.id_at(2, grid.post_level()).unwrap();
        let mut walk = Downstream::from_nodes([post]);
        assert_eq!(walk.next(&grid), Some(post));
        assert!(walk.next(&grid).is_none());
        assert!(walk.next(&grid).is_none());
    }

    #[test]
    fn bottom_first() {
        // Ripple: (1, 1) feeds (1, 2) vertically and (2, 2) diagonally
        let grid = PrefixGrid::with_defaults(4, Topology::Ripple).unwrap();
        let seed = grid.id_at(1, 1).unwrap();
        let mut walk = Downstream::from_nodes([seed, seed]);
        assert_eq!(walk.next(&grid), Some(seed));
        assert_eq!(walk.next(&grid), grid.id_at(1, 2));
    }

    #[test]
    fn reaches_everything_downstream() {
        let grid = PrefixGrid::with_defaults(8, Topology::KoggeStone).unwrap();
        let mut walk = Downstream::from_nodes(grid.level(0));
        let mut visited = HashSet::new();
        while let Some(id) = walk.next(&grid) {
            assert!(visited.insert(id));
        }
        assert_eq!(visited.len(), grid.nodes().count());

        // Nothing upstream of the seed is reached
        let seed = grid.id_at(4, 2).unwrap();
        let mut walk = Downstream::from_nodes([seed]);
        while let Some(id) = walk.next(&grid) {
            assert!(grid[id].y() >= 2);
            assert!(grid[id].x() >= 4);
        }
    }
}
