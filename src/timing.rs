//! Edge delays and critical path extraction.
//!
//! Every edge into a node is weighted after the consumer cell: its intrinsic delay plus its
//! logical effort times the load seen by the producer. The load is the fan-out of the producer
//! plus the number of diagonal wires crossing over its column between its level and the next.

use std::collections::HashMap;

use crate::{NodeId, PrefixGrid, Result};

impl PrefixGrid {
    /// Number of diagonal edges from the level of `producer` to the next one passing over its
    /// column.
    fn tracks(&self, producer: NodeId) -> usize {
        let node = &self[producer];
        let (xp, y) = (node.x(), node.y());
        self.level(y + 1)
            .into_iter()
            .filter(|&c| {
                let consumer = &self[c];
                consumer
                    .pre_column()
                    .is_some_and(|xs| xs < xp && xp < consumer.x())
            })
            .count()
    }

    fn edge_delay(&self, producer: NodeId, intrinsic: f64, effort: f64) -> f64 {
        let load = self.fanout(producer) + self.tracks(producer);
        intrinsic + effort * load as f64
    }

    /// Recomputes the delay of every edge, see [`Node::edge_delays`].
    ///
    /// [`Node::edge_delays`]: crate::Node::edge_delays
    pub fn recalc_weights(&mut self) -> Result<()> {
        let catalog = self.catalog();
        let mut delays = Vec::new();
        for y in 1..self.depth() {
            for id in self.level(y) {
                let def = catalog.lookup(self[id].cell_type())?;
                let top = self
                    .top(id)
                    .map_or(0.0, |p| self.edge_delay(p, def.intrinsic_delay, def.effort(false)));
                let pre = self
                    .pre(id)
                    .map_or(0.0, |p| self.edge_delay(p, def.intrinsic_delay, def.effort(true)));
                delays.push((id, top, pre));
            }
        }
        for (id, top, pre) in delays {
            self[id].set_edge_delays(top, pre);
        }
        Ok(())
    }

    /// Longest path over the nodes outside of any block, with its delay.
    fn critical(&self) -> Option<(f64, Vec<NodeId>)> {
        let mut dist: HashMap<NodeId, f64> = HashMap::new();
        let mut prev: HashMap<NodeId, NodeId> = HashMap::new();
        let mut end: Option<NodeId> = None;

        for y in 0..self.depth() {
            for id in self.level(y) {
                let node = &self[id];
                if node.block().is_some() {
                    continue;
                }
                let (top_delay, pre_delay) = node.edge_delays();
                // Diagonal first: on a tie, the leftmost predecessor wins
                let mut best: Option<(f64, NodeId)> = None;
                for (producer, delay) in [(self.pre(id), pre_delay), (self.top(id), top_delay)] {
                    let Some(producer) = producer else { continue };
                    let Some(&d) = dist.get(&producer) else { continue };
                    if best.is_none_or(|(b, _)| d + delay > b) {
                        best = Some((d + delay, producer));
                    }
                }
                dist.insert(id, best.map_or(0.0, |(d, _)| d));
                if let Some((_, producer)) = best {
                    prev.insert(id, producer);
                }
                if node.role().is_real() && end.is_none_or(|e| dist[&id] >= dist[&e]) {
                    end = Some(id);
                }
            }
        }

        let end = end?;
        let mut path = vec![end];
        let mut current = end;
        while let Some(&producer) = prev.get(&current) {
            path.push(producer);
            current = producer;
        }
        while path.last().is_some_and(|&id| self[id].role().is_placeholder()) {
            path.pop();
        }
        if path.len() < 2 {
            return None;
        }
        Some((dist[&end], path))
    }

    /// The critical path among nodes not yet grouped in a block, from its end back to its
    /// origin. Both ends are real cells.
    ///
    /// Returns None when no such path spans at least two nodes.
    pub fn longest_path(&self) -> Option<Vec<NodeId>> {
        self.critical().map(|(_, path)| path)
    }

    /// Delay of [`longest_path`](PrefixGrid::longest_path).
    pub fn critical_delay(&self) -> Option<f64> {
        self.critical().map(|(delay, _)| delay)
    }

    /// Groups critical paths into blocks, longest first, until no path is left outside of a
    /// block. Returns the new block ids.
    pub fn add_best_blocks(&mut self) -> Result<Vec<usize>> {
        let timer = clilog::stimer!("add_best_blocks");
        self.recalc_weights()?;
        let mut added = Vec::new();
        while let Some(path) = self.longest_path() {
            let block = self.add_block(&path)?;
            clilog::debug!(
                PG_TIMING,
                "block {}: {} nodes ending at {}",
                block,
                path.len(),
                self[path[0]].coord()
            );
            added.push(block);
        }
        clilog::finish!(timer);
        Ok(added)
    }
}

#[cfg(test)]
mod test {
    use std::collections::BTreeSet;

    use crate::{PrefixGrid, Topology};

    #[test]
    fn delays_follow_load() {
        let grid = PrefixGrid::with_defaults(8, Topology::Sklansky).unwrap();
        // (3, 2) feeds (3, 3) and (4, 3) to (7, 3), nothing crosses over column 3
        let consumer = grid.node_at(4, 3).unwrap();
        let def = grid.catalog().lookup(consumer.cell_type()).unwrap();
        assert_eq!(consumer.edge_delays().1, def.intrinsic_delay + def.effort(true) * 5.0);

        // Kogge-Stone: (1, 1) feeds (1, 2) and (3, 2), and (2, 2) reads column 0 over it
        let grid = PrefixGrid::with_defaults(8, Topology::KoggeStone).unwrap();
        let consumer = grid.node_at(1, 2).unwrap();
        let def = grid.catalog().lookup(consumer.cell_type()).unwrap();
        assert_eq!(consumer.edge_delays().0, def.intrinsic_delay + def.effort(false) * 3.0);
    }

    #[test]
    fn path_shape() {
        for topology in [Topology::Ripple, Topology::Sklansky, Topology::KoggeStone, Topology::BrentKung] {
            let grid = PrefixGrid::with_defaults(8, topology).unwrap();
            let path = grid.longest_path().unwrap();
            assert!(path.len() >= 2);
            assert!(grid[path[0]].role().is_real());
            assert!(grid[*path.last().unwrap()].role().is_real());
            for pair in path.windows(2) {
                let (below, above) = (pair[0], pair[1]);
                assert!(grid.top(below) == Some(above) || grid.pre(below) == Some(above));
            }
        }
    }

    #[test]
    fn ripple_is_slower() {
        let ripple = PrefixGrid::with_defaults(16, Topology::Ripple).unwrap();
        let sklansky = PrefixGrid::with_defaults(16, Topology::Sklansky).unwrap();
        assert!(ripple.critical_delay().unwrap() > sklansky.critical_delay().unwrap());
    }

    #[test]
    fn blocks_are_disjoint() {
        clilog::init_stdout_simple_trace();
        let mut grid = PrefixGrid::with_defaults(8, Topology::KoggeStone).unwrap();
        let blocks = grid.add_best_blocks().unwrap();
        assert!(!blocks.is_empty());
        assert!(grid.longest_path().is_none());
        grid.check_integrity().unwrap();

        let mut seen = BTreeSet::new();
        for (_, members) in grid.blocks() {
            assert!(members.len() >= 2);
            let levels: BTreeSet<usize> = members.iter().map(|&id| grid[id].y()).collect();
            assert_eq!(levels.len(), members.len());
            for &id in members {
                assert!(seen.insert(id));
            }
        }
        // Nothing left to group
        assert!(grid.add_best_blocks().unwrap().is_empty());
    }
}
