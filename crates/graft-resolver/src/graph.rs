//! The walked dependency graph.
//!
//! Nodes live in a petgraph arena and refer to each other by [`NodeIndex`].
//! The graph is a tree rooted at the project: the same library may appear
//! many times in different branches, one node per path that reached it.
//! It is built once from the walker's output and not mutated afterwards;
//! conflict dispositions live in a side map (see [`crate::conflict`]).

use std::collections::VecDeque;
use std::fmt;

use graft_core::library::{DependencyKind, LibraryIdentity, LibraryRange};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

/// How the walker finished with a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WalkOutcome {
    Resolved,
    /// No library satisfied the range.
    Unresolved,
    /// The library was already on the active path; not expanded.
    Cycle,
}

/// A node of the walked tree.
#[derive(Debug, Clone)]
pub struct GraphNode {
    /// The range that produced this node.
    pub range: LibraryRange,
    pub identity: LibraryIdentity,
    pub outcome: WalkOutcome,
    /// Distance from the project root (the root is 0).
    pub depth: usize,
    pub parent: Option<NodeIndex>,
    /// Children in declaration order.
    pub children: Vec<NodeIndex>,
}

impl GraphNode {
    pub fn key(&self) -> String {
        self.range.key()
    }
}

impl fmt::Display for GraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.outcome {
            WalkOutcome::Resolved => write!(f, "{}", self.identity),
            WalkOutcome::Unresolved => write!(f, "{} (unresolved)", self.range),
            WalkOutcome::Cycle => write!(f, "{} (cycle)", self.range),
        }
    }
}

/// Owned tree produced by the walker before it is moved into the arena.
#[derive(Debug)]
pub(crate) struct WalkNode {
    pub(crate) range: LibraryRange,
    pub(crate) identity: LibraryIdentity,
    pub(crate) outcome: WalkOutcome,
    pub(crate) children: Vec<WalkNode>,
}

/// A walked dependency tree backed by petgraph.
#[derive(Debug)]
pub struct ResolvedGraph {
    graph: DiGraph<GraphNode, DependencyKind>,
    root: NodeIndex,
}

impl ResolvedGraph {
    /// Move a walked tree into the arena. Indices follow preorder.
    pub(crate) fn from_walk(root: WalkNode) -> Self {
        let mut graph = DiGraph::new();
        let root = insert(&mut graph, root, 0, None);
        Self { graph, root }
    }

    pub fn root(&self) -> NodeIndex {
        self.root
    }

    pub fn node(&self, idx: NodeIndex) -> &GraphNode {
        &self.graph[idx]
    }

    /// Number of nodes, excluding the root.
    pub fn len(&self) -> usize {
        self.graph.node_count().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn children(&self, idx: NodeIndex) -> &[NodeIndex] {
        &self.graph[idx].children
    }

    /// All node indices in preorder, root first.
    pub fn preorder(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.node_indices()
    }

    /// All node indices level by level, root first, siblings in
    /// declaration order.
    pub fn breadth_first(&self) -> Vec<NodeIndex> {
        let mut order = Vec::with_capacity(self.graph.node_count());
        let mut queue = VecDeque::from([self.root]);
        while let Some(idx) = queue.pop_front() {
            order.push(idx);
            queue.extend(self.children(idx).iter().copied());
        }
        order
    }

    /// Nodes whose range names `name` (case-insensitive), breadth-first.
    pub fn nodes_named(&self, name: &str) -> Vec<NodeIndex> {
        self.breadth_first()
            .into_iter()
            .filter(|&idx| idx != self.root && self.graph[idx].range.is_named(name))
            .collect()
    }

    /// Parents of every node named `name`.
    pub fn dependents_of(&self, name: &str) -> Vec<NodeIndex> {
        let mut parents = Vec::new();
        for idx in self.nodes_named(name) {
            for edge in self.graph.edges_directed(idx, Direction::Incoming) {
                if !parents.contains(&edge.source()) {
                    parents.push(edge.source());
                }
            }
        }
        parents
    }

    /// The path from the root to the shallowest node named `name`.
    pub fn find_path(&self, name: &str) -> Option<Vec<&GraphNode>> {
        let target = self.nodes_named(name).into_iter().next()?;
        let mut path = Vec::new();
        let mut current = Some(target);
        while let Some(idx) = current {
            let node = &self.graph[idx];
            path.push(node);
            current = node.parent;
        }
        path.reverse();
        Some(path)
    }

    /// Render the tree, splitting the root's children into normal and
    /// build-only sections. `annotate` may append a note to each line.
    pub fn print_tree<F>(&self, max_depth: Option<usize>, annotate: F) -> String
    where
        F: Fn(NodeIndex) -> Option<String>,
    {
        let mut output = String::new();
        output.push_str(&format!("{}\n", self.graph[self.root]));

        let (normal, build): (Vec<NodeIndex>, Vec<NodeIndex>) = self
            .children(self.root)
            .iter()
            .partition(|&&idx| self.graph[idx].range.kind() == DependencyKind::Normal);

        let show_headers = !build.is_empty();
        let sections: Vec<(&str, &Vec<NodeIndex>)> =
            [("[dependencies]", &normal), ("[build-dependencies]", &build)]
                .into_iter()
                .filter(|(_, deps)| !deps.is_empty())
                .collect();
        let total_sections = sections.len();

        for (section, (label, deps)) in sections.into_iter().enumerate() {
            if show_headers {
                output.push_str(&format!("{label}\n"));
            }
            let is_last_section = section + 1 == total_sections;
            let count = deps.len();
            for (i, idx) in deps.iter().enumerate() {
                let is_last = i == count - 1 && is_last_section;
                self.print_subtree(&mut output, *idx, "", is_last, max_depth, &annotate);
            }
        }

        output
    }

    fn print_subtree<F>(
        &self,
        output: &mut String,
        idx: NodeIndex,
        prefix: &str,
        is_last: bool,
        max_depth: Option<usize>,
        annotate: &F,
    ) where
        F: Fn(NodeIndex) -> Option<String>,
    {
        let connector = if is_last { "└── " } else { "├── " };
        let node = &self.graph[idx];
        output.push_str(&format!("{prefix}{connector}{node}"));
        if let Some(note) = annotate(idx) {
            output.push_str(&format!(" [{note}]"));
        }
        output.push('\n');

        if max_depth.is_some_and(|max| node.depth >= max) {
            return;
        }

        let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
        let count = node.children.len();
        for (i, child) in node.children.iter().enumerate() {
            self.print_subtree(
                output,
                *child,
                &child_prefix,
                i == count - 1,
                max_depth,
                annotate,
            );
        }
    }
}

fn insert(
    graph: &mut DiGraph<GraphNode, DependencyKind>,
    walked: WalkNode,
    depth: usize,
    parent: Option<NodeIndex>,
) -> NodeIndex {
    let WalkNode {
        range,
        identity,
        outcome,
        children,
    } = walked;
    let kind = range.kind();
    let idx = graph.add_node(GraphNode {
        range,
        identity,
        outcome,
        depth,
        parent,
        children: Vec::with_capacity(children.len()),
    });
    if let Some(parent) = parent {
        graph.add_edge(parent, idx, kind);
    }
    let kids: Vec<NodeIndex> = children
        .into_iter()
        .map(|child| insert(graph, child, depth + 1, Some(idx)))
        .collect();
    graph[idx].children = kids;
    idx
}
