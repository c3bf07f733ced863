//! You can export a prefix grid to the Graphviz dot format using [`PrefixGrid::to_dot`].
//!
//! ```rust
//! use prefixgrid::{PrefixGrid, Topology};
//! use prefixgrid::dot::GraphvizStyle;
//!
//! let mut grid = PrefixGrid::with_defaults(8, Topology::Sklansky).unwrap();
//! grid.add_best_blocks().unwrap();
//! println!("{}", grid.to_dot(GraphvizStyle::default()));
//! ```
//!
//! Nodes are pinned at their grid coordinates, bit 0 on the right. Render with
//! `neato -n` to keep the grid shape, or with `dot` to let Graphviz lay it out.

use std::{fmt::Display, ops::Add};

use crate::{Node, NodeId, PrefixGrid, Role};

// Definining default global style.
const DEFAULT_RANKDIR: &str = "TB";
const DEFAULT_SPACING: f64 = 1.0;

// Defining default style for nodes.
const DEFAULT_PRE_NODE_FORMAT: &str = "[shape=box]";
const DEFAULT_BLACK_NODE_FORMAT: &str = "[shape=circle, style=filled, fillcolor=black, fontcolor=white]";
const DEFAULT_GREY_NODE_FORMAT: &str = "[shape=circle, style=filled, fillcolor=grey]";
const DEFAULT_BUFFER_NODE_FORMAT: &str = "[shape=triangle, width=.3, height=.3]";
const DEFAULT_POST_NODE_FORMAT: &str = "[shape=box, style=rounded]";

// Defining default style for edges.
const DEFAULT_EDGE_ALL_FORMAT: &str = "[arrowsize=0.3]";
const DEFAULT_EDGE_DIAGONAL_FORMAT: &str = "[color=\"blue\"]";
const DEFAULT_EDGE_BLOCK_FORMAT: &str = "[penwidth=2]";

/// String containing the graphviz node style (you must manually include square brackets).
///
/// See [`GraphvizStyle`] for what kind of nodes can be described.
#[derive(Debug, Clone)]
pub struct GraphvizNodeStyle(String);

impl Display for GraphvizNodeStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// String containing the graphviz edge style (you must manually include square brackets).
///
/// See [`GraphvizStyle`] for what kind of edges can be described.
#[derive(Debug, Clone, Default)]
pub struct GraphvizEdgeStyle(String);

impl Display for GraphvizEdgeStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add for GraphvizEdgeStyle {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        GraphvizEdgeStyle(format!("{}{}", self.0, rhs.0))
    }
}

/// Parameters for Graphviz rendering.
///
/// ### Global parameters
/// - `rankdir`
/// - `spacing`, distance between two pinned columns or levels (in inches).
///
/// ### Nodes
/// The following nodes can be rendered using [`GraphvizNodeStyle`]:
/// - pre-processing cells
/// - black and grey combine cells
/// - buffers
/// - post-processing cells.
///
/// Invisible placeholders are not drawn: an edge going through them links the nearest drawn
/// node above to the consumer.
///
/// ### Edges
/// Edge styles are additive. All edges implement the `edge_all` style. To that can be added:
/// - `edge_diagonal` if the edge comes from a diagonal predecessor
/// - `edge_block` if both ends belong to the same block.
#[derive(Debug, Clone)]
pub struct GraphvizStyle {
    // Global
    rankdir: String,
    spacing: f64,

    // Nodes
    pre: GraphvizNodeStyle,
    black: GraphvizNodeStyle,
    grey: GraphvizNodeStyle,
    buffer: GraphvizNodeStyle,
    post: GraphvizNodeStyle,

    // Edges
    edge_all: GraphvizEdgeStyle,
    edge_diagonal: GraphvizEdgeStyle,
    edge_block: GraphvizEdgeStyle,
}

impl Default for GraphvizStyle {
    fn default() -> Self {
        GraphvizStyle {
            rankdir: DEFAULT_RANKDIR.to_string(),
            spacing: DEFAULT_SPACING,

            pre: GraphvizNodeStyle(DEFAULT_PRE_NODE_FORMAT.to_string()),
            black: GraphvizNodeStyle(DEFAULT_BLACK_NODE_FORMAT.to_string()),
            grey: GraphvizNodeStyle(DEFAULT_GREY_NODE_FORMAT.to_string()),
            buffer: GraphvizNodeStyle(DEFAULT_BUFFER_NODE_FORMAT.to_string()),
            post: GraphvizNodeStyle(DEFAULT_POST_NODE_FORMAT.to_string()),

            edge_all: GraphvizEdgeStyle(DEFAULT_EDGE_ALL_FORMAT.to_string()),
            edge_diagonal: GraphvizEdgeStyle(DEFAULT_EDGE_DIAGONAL_FORMAT.to_string()),
            edge_block: GraphvizEdgeStyle(DEFAULT_EDGE_BLOCK_FORMAT.to_string()),
        }
    }
}

fn graphviz_id(id: NodeId) -> String {
    format!("n{}", id)
}

impl Node {
    fn graphviz_decl(&self, id: NodeId, width: usize, spacing: f64) -> String {
        let label = match self.role() {
            Role::Pre | Role::Post => self.x().to_string(),
            _ => String::new(),
        };
        format!(
            "{} [label=\"{}\", pos=\"{},{}!\"]\n",
            graphviz_id(id),
            label,
            (width - 1 - self.x()) as f64 * spacing,
            -(self.y() as f64) * spacing
        )
    }
}

impl PrefixGrid {
    /// Nearest node above `id` that is not an invisible placeholder.
    fn visible_top(&self, id: NodeId) -> Option<NodeId> {
        let mut current = self.top(id)?;
        while self[current].role() == Role::Invisible {
            current = self.top(current)?;
        }
        Some(current)
    }

    fn graphviz_edge(&self, from: NodeId, to: NodeId, diagonal: bool, style: &GraphvizStyle) -> String {
        let mut edge_style = GraphvizEdgeStyle::default();
        if diagonal {
            edge_style = edge_style + style.edge_diagonal.clone();
        }
        if self[from].block().is_some() && self[from].block() == self[to].block() {
            edge_style = edge_style + style.edge_block.clone();
        }
        format!("{} -> {} {}\n", graphviz_id(from), graphviz_id(to), edge_style)
    }

    /// Returns a DOT representation of the grid.
    pub fn to_dot(&self, graphviz_style: GraphvizStyle) -> String {
        let mut decl_edges = String::new();

        // Creating different subgraphs for node declarations
        let mut decl_pre = format!("subgraph pre {{\n node {}\n", graphviz_style.pre);
        let mut decl_black = format!("subgraph black {{\n node {}\n", graphviz_style.black);
        let mut decl_grey = format!("subgraph grey {{\n node {}\n", graphviz_style.grey);
        let mut decl_buffers = format!("subgraph buffers {{\n node {}\n", graphviz_style.buffer);
        let mut decl_post = format!("subgraph post {{\n node {}\n", graphviz_style.post);

        for y in 0..self.depth() {
            for id in self.level(y) {
                let node = &self[id];
                let decl = node.graphviz_decl(id, self.width(), graphviz_style.spacing);
                match node.role() {
                    Role::Pre => decl_pre.push_str(&decl),
                    Role::Black => decl_black.push_str(&decl),
                    Role::Grey => decl_grey.push_str(&decl),
                    Role::Buffer => decl_buffers.push_str(&decl),
                    Role::Post => decl_post.push_str(&decl),
                    Role::Invisible => continue,
                }
                if let Some(top) = self.visible_top(id) {
                    decl_edges.push_str(&self.graphviz_edge(top, id, false, &graphviz_style));
                }
                if let Some(pre) = self.pre(id) {
                    decl_edges.push_str(&self.graphviz_edge(pre, id, true, &graphviz_style));
                }
            }
        }

        // One cluster per block
        let mut decl_blocks = String::new();
        for (block, members) in self.blocks() {
            decl_blocks.push_str(&format!(
                "subgraph cluster_block{} {{\n label=\"{}\"\n style=dashed\n",
                block, block
            ));
            for &id in members {
                if self[id].role() != Role::Invisible {
                    decl_blocks.push_str(&format!("{}\n", graphviz_id(id)));
                }
            }
            decl_blocks.push_str("}\n");
        }

        // Concatenating everything together
        format!(
            "
strict digraph {{
    rankdir=\"{}\"
    edge {}
    {}
    }}
    {}
    }}
    {}
    }}
    {}
    }}
    {}
    }}
    {}
    {}
}}",
            graphviz_style.rankdir,
            graphviz_style.edge_all,
            decl_pre,
            decl_black,
            decl_grey,
            decl_buffers,
            decl_post,
            decl_blocks,
            decl_edges
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Topology;

    #[test]
    fn ripple_to_dot() {
        let grid = PrefixGrid::with_defaults(4, Topology::Ripple).unwrap();
        let dot = grid.to_dot(GraphvizStyle::default());
        println!("{}", dot);
        // 4 pre-processing cells, 3 combine cells, no buffer, 4 post-processing cells
        assert_eq!(dot.matches("pos=").count(), 11);
        // Each combine cell has two inputs, each post-processing cell one
        assert_eq!(dot.matches("->").count(), 3 * 2 + 4);
        assert!(!dot.contains("cluster_block"));
    }

    #[test]
    fn blocks_to_dot() {
        let mut grid = PrefixGrid::with_defaults(8, Topology::Sklansky).unwrap();
        grid.add_best_blocks().unwrap();
        let dot = grid.to_dot(GraphvizStyle::default());
        println!("{}", dot);
        assert!(dot.contains("subgraph cluster_block0"));
        let drawn = grid
            .nodes()
            .filter(|(_, node)| node.role() != Role::Invisible)
            .count();
        assert_eq!(dot.matches("pos=").count(), drawn);
    }
}
