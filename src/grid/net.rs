//! Nets between node ports.
//!
//! Topology lives in the grid itself (a node reads the node above it and, for combine cells,
//! one node of the previous level). Nets are the port-level view of that topology handed to the
//! HDL emitter; [`PrefixGrid::rebind_nets`] re-derives them after the grid changed.

use std::collections::BTreeMap;

use super::{NodeId, PrefixGrid, Role};
use crate::{PrefixError, Result};

/// What a port slot is connected to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum NetRef {
    #[default]
    Unassigned,
    /// A net created by the engine, emitted as `n<id>`.
    Synthesized(u64),
    /// A net bound to an external symbolic name.
    Bound(String),
}

impl NetRef {
    pub fn is_assigned(&self) -> bool {
        !matches!(self, NetRef::Unassigned)
    }
}

/// Name of a net as the emitter prints it, `None` for an unassigned slot.
pub fn net_name(net: &NetRef) -> Option<String> {
    match net {
        NetRef::Unassigned => None,
        NetRef::Synthesized(id) => Some(format!("n{}", id)),
        NetRef::Bound(name) => Some(name.clone()),
    }
}

/// A port of a node: a name and one net reference per bit.
///
/// For input ports, the first `diag_bits` slots are reserved for the diagonal predecessor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Port {
    pub(super) name: String,
    pub(super) diag_bits: usize,
    pub(super) slots: Vec<NetRef>,
}

impl Port {
    pub(super) fn new(name: &str, bits: usize, diag_bits: usize) -> Self {
        Port {
            name: name.to_string(),
            diag_bits,
            slots: vec![NetRef::Unassigned; bits],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn slots(&self) -> &[NetRef] {
        &self.slots
    }

    fn slot_range(&self, diagonal: bool) -> std::ops::Range<usize> {
        if diagonal {
            0..self.diag_bits
        } else {
            self.diag_bits..self.slots.len()
        }
    }
}

/// The complementary name of a port: `gin` <-> `gout`.
pub fn verso(name: &str) -> String {
    if let Some(stem) = name.strip_suffix("out") {
        format!("{}in", stem)
    } else if let Some(stem) = name.strip_suffix("in") {
        format!("{}out", stem)
    } else {
        name.to_string()
    }
}

impl PrefixGrid {
    /// Connects `producer.out_port` to `consumer.in_port`.
    ///
    /// The slot used on the consumer side depends on the edge: a producer in another column feeds
    /// the diagonal slots, a producer in the same column the vertical ones. The net id of the
    /// producer is reused when it already drives something. A producer driving nothing yet is
    /// bound to the net already sitting in the consumer slot, if any. Nothing is modified on
    /// error.
    pub fn connect(
        &mut self,
        producer: NodeId,
        out_port: &str,
        consumer: NodeId,
        in_port: &str,
    ) -> Result<()> {
        let p = self.get(producer)?;
        let c = self.get(consumer)?;
        if verso(in_port) != out_port {
            return Err(PrefixError::PortMismatch(format!(
                "{} cannot drive {}",
                out_port, in_port
            )));
        }
        if c.y <= p.y {
            return Err(PrefixError::DirectionError {
                producer: p.coord(),
                consumer: c.coord(),
            });
        }
        let out_idx = p
            .out_ports
            .iter()
            .position(|port| port.name == out_port)
            .ok_or_else(|| {
                PrefixError::PortMismatch(format!("{} has no output {}", p.coord(), out_port))
            })?;
        let in_idx = c
            .in_ports
            .iter()
            .position(|port| port.name == in_port)
            .ok_or_else(|| {
                PrefixError::PortMismatch(format!("{} has no input {}", c.coord(), in_port))
            })?;

        let diagonal = p.x != c.x;
        let driven = p.out_ports[out_idx].slots[0].clone();
        let port = &c.in_ports[in_idx];
        let range = port.slot_range(diagonal);
        if range.is_empty() {
            return Err(PrefixError::PortMismatch(format!(
                "{}.{} has no {} slot",
                c.coord(),
                in_port,
                if diagonal { "diagonal" } else { "vertical" }
            )));
        }
        if driven.is_assigned() && port.slots[range.clone()].contains(&driven) {
            return Ok(());
        }
        let free = range.clone().find(|&i| !port.slots[i].is_assigned());
        // An unbound producer takes over the net already waiting on the consumer side
        let adopted = match (free, driven.is_assigned()) {
            (None, false) => Some(port.slots[range.start].clone()),
            (None, true) => {
                return Err(PrefixError::PortMismatch(format!(
                    "{}.{} is already bound to another net",
                    c.coord(),
                    in_port
                )));
            }
            (Some(_), _) => None,
        };

        let mut upstream = p.upstream.clone();
        if p.role.is_real() {
            upstream.insert(producer);
        }
        let net = match (adopted, driven.is_assigned()) {
            (Some(net), _) => net,
            (None, true) => driven,
            (None, false) => {
                self.next_net += 1;
                NetRef::Synthesized(self.next_net - 1)
            }
        };

        self[producer].out_ports[out_idx].slots[0] = net.clone();
        let c = &mut self[consumer];
        if let Some(slot) = free {
            c.in_ports[in_idx].slots[slot] = net;
        }
        c.upstream.extend(upstream);
        Ok(())
    }

    /// Connects every output of `producer` to the matching input of `consumer`.
    fn connect_edge(&mut self, producer: NodeId, consumer: NodeId) -> Result<()> {
        let diagonal = self[producer].x != self[consumer].x;
        let pairs: Vec<(String, String)> = self[producer]
            .out_ports
            .iter()
            .filter_map(|out| {
                let in_name = verso(&out.name);
                self[consumer]
                    .in_ports
                    .iter()
                    .find(|port| port.name == in_name && !port.slot_range(diagonal).is_empty())
                    .map(|_| (out.name.clone(), in_name))
            })
            .collect();
        for (out_name, in_name) in pairs {
            self.connect(producer, &out_name, consumer, &in_name)?;
        }
        Ok(())
    }

    /// Drops every net and re-derives them from the grid topology.
    ///
    /// Pre-processing inputs and post-processing outputs are bound to the external names
    /// `<port>[<column>]`. Synthesized ids keep growing across calls.
    pub fn rebind_nets(&mut self) -> Result<()> {
        for node in self.nodes.iter_mut().flatten() {
            let (x, role) = (node.x, node.role);
            node.upstream.clear();
            for port in node.in_ports.iter_mut() {
                let external = role == Role::Pre;
                for slot in port.slots.iter_mut() {
                    *slot = match external {
                        true => NetRef::Bound(format!("{}[{}]", port.name, x)),
                        false => NetRef::Unassigned,
                    };
                }
            }
            for port in node.out_ports.iter_mut() {
                let external = role == Role::Post;
                for slot in port.slots.iter_mut() {
                    *slot = match external {
                        true => NetRef::Bound(format!("{}[{}]", port.name, x)),
                        false => NetRef::Unassigned,
                    };
                }
            }
        }
        for y in 1..self.depth() {
            for x in 0..self.width {
                let Some(consumer) = self.id_at(x, y) else {
                    continue;
                };
                if let Some(top) = self.id_at(x, y - 1) {
                    self.connect_edge(top, consumer)?;
                }
                if let Some(pre) = self[consumer].pre.and_then(|px| self.id_at(px, y - 1)) {
                    self.connect_edge(pre, consumer)?;
                }
            }
        }
        Ok(())
    }

    /// Port name to net names of a node, as the HDL emitter consumes it.
    pub fn port_nets(&self, id: NodeId) -> Result<BTreeMap<String, Vec<Option<String>>>> {
        let node = self.get(id)?;
        Ok(node
            .in_ports
            .iter()
            .chain(node.out_ports.iter())
            .map(|port| {
                (
                    port.name.clone(),
                    port.slots.iter().map(net_name).collect(),
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{Coord, Topology};

    #[test]
    fn verso_test() {
        assert_eq!(verso("gin"), "gout");
        assert_eq!(verso("pout"), "pin");
        assert_eq!(verso("sum"), "sum");
    }

    #[test]
    fn net_names() {
        assert_eq!(net_name(&NetRef::Unassigned), None);
        assert_eq!(net_name(&NetRef::Synthesized(12)).as_deref(), Some("n12"));
        assert_eq!(net_name(&NetRef::Bound("b_in[3]".to_string())).as_deref(), Some("b_in[3]"));
    }

    #[test]
    fn nets_follow_topology() {
        let grid = PrefixGrid::with_defaults(4, Topology::Ripple).unwrap();
        // (2, 2) is a grey cell reading (2, 1) vertically and (1, 1) diagonally
        let grey = grid.id_at(2, 2).unwrap();
        let nets = grid.port_nets(grey).unwrap();
        let above = grid.port_nets(grid.id_at(2, 1).unwrap()).unwrap();
        let diag = grid.port_nets(grid.id_at(1, 1).unwrap()).unwrap();
        assert_eq!(nets["gin"][0], diag["gout"][0]);
        assert_eq!(nets["gin"][1], above["gout"][0]);
        assert_eq!(nets["pin"][0], above["pout"][0]);
        assert!(nets["gout"][0].as_ref().unwrap().starts_with('n'));

        let pre = grid.port_nets(grid.id_at(3, 0).unwrap()).unwrap();
        assert_eq!(pre["a_in"][0].as_deref(), Some("a_in[3]"));
        let post = grid.port_nets(grid.id_at(3, grid.post_level()).unwrap()).unwrap();
        assert_eq!(post["sum"][0].as_deref(), Some("sum[3]"));
    }

    #[test]
    fn connect_errors() {
        let mut grid = PrefixGrid::with_defaults(4, Topology::Ripple).unwrap();
        let a = grid.id_at(1, 1).unwrap();
        let b = grid.id_at(2, 2).unwrap();
        // not complementary
        assert!(matches!(
            grid.connect(a, "gout", b, "pin"),
            Err(PrefixError::PortMismatch(_))
        ));
        // upstream
        assert!(matches!(
            grid.connect(b, "gout", a, "gin"),
            Err(PrefixError::DirectionError { .. })
        ));
        // the diagonal slot of (2, 2) is already driven by (1, 1), another producer is refused
        let other = grid.id_at(0, 1).unwrap();
        assert!(matches!(
            grid.connect(other, "gout", b, "gin"),
            Err(PrefixError::PortMismatch(_))
        ));
        // reconnecting the same net is a no-op
        grid.connect(a, "gout", b, "gin").unwrap();
        assert!(grid[b].upstream().contains(&a));
        assert_eq!(grid[b].coord(), Coord::new(2, 2));
    }

    #[test]
    fn unbound_producer_adopts_consumer_net() {
        let mut grid = PrefixGrid::with_defaults(4, Topology::Ripple).unwrap();
        let a = grid.id_at(1, 1).unwrap();
        let b = grid.id_at(2, 2).unwrap();
        let external = NetRef::Bound("carry_x".to_string());
        grid[b].in_ports[0].slots[0] = external.clone();
        grid[a].out_ports[0].slots[0] = NetRef::Unassigned;
        assert_eq!(grid[a].out_ports[0].name, "gout");

        grid.connect(a, "gout", b, "gin").unwrap();
        assert_eq!(grid[a].out_ports[0].slots[0], external);
        assert_eq!(grid[b].in_ports[0].slots[0], external);
        assert!(grid[b].upstream().contains(&a));

        // A bound producer still refuses a slot held by another net
        let other = grid.id_at(0, 1).unwrap();
        assert!(matches!(
            grid.connect(other, "gout", b, "gin"),
            Err(PrefixError::PortMismatch(_))
        ));
    }
}
