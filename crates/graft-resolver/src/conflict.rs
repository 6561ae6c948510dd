//! Nearest-wins conflict resolution over a walked graph, and the report of
//! what it decided.
//!
//! For every library name the live node closest to the root wins; ties at
//! equal depth go to the node declared first. A live node is one whose
//! parent was accepted, so everything under a losing node drops out without
//! competing. Losers that had picked a higher version than the winner are
//! downgrades.

use std::collections::HashMap;
use std::fmt;

use graft_core::library::LibraryIdentity;
use petgraph::graph::NodeIndex;

use crate::graph::{ResolvedGraph, WalkOutcome};

/// The final state of one graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposition {
    Accepted,
    /// Superseded by a nearer node of the same name, or below a node that
    /// was not accepted.
    Rejected,
    /// Superseded by a nearer node that selected a lower version.
    Downgraded,
    Cycle,
    Unresolved,
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Downgraded => "downgraded",
            Self::Cycle => "cycle",
            Self::Unresolved => "unresolved",
        })
    }
}

/// Why a requested version lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// The winner's version is higher than this node's.
    Superseded,
    /// The winner's version is lower than this node's.
    Downgrade,
}

/// A report of all version conflicts encountered during resolution.
#[derive(Debug, Clone, Default)]
pub struct ConflictReport {
    pub conflicts: Vec<VersionConflict>,
}

/// A single version conflict where one library was selected at different
/// versions in different places but only one was kept.
#[derive(Debug, Clone)]
pub struct VersionConflict {
    pub name: String,
    /// The range the losing node asked for.
    pub requested: String,
    /// The version the losing node selected on its own.
    pub selected: String,
    /// The version that won.
    pub resolved: String,
    pub kind: ConflictKind,
    pub reason: String,
}

impl ConflictReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, conflict: VersionConflict) {
        self.conflicts.push(conflict);
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conflicts.len()
    }

    pub fn downgrades(&self) -> impl Iterator<Item = &VersionConflict> {
        self.conflicts
            .iter()
            .filter(|c| c.kind == ConflictKind::Downgrade)
    }
}

impl fmt::Display for ConflictReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.conflicts.is_empty() {
            return write!(f, "No version conflicts.");
        }
        writeln!(f, "Version conflicts ({}):", self.conflicts.len())?;
        for c in &self.conflicts {
            writeln!(f, "  {c}")?;
        }
        Ok(())
    }
}

impl fmt::Display for VersionConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.kind {
            ConflictKind::Superseded => "",
            ConflictKind::Downgrade => "downgrade: ",
        };
        write!(
            f,
            "{label}{} requested {} (selected {}) but resolved {} ({})",
            self.name, self.requested, self.selected, self.resolved, self.reason
        )
    }
}

/// Dispositions for every node of a graph.
#[derive(Debug, Clone)]
pub struct ConflictResolution {
    dispositions: HashMap<NodeIndex, Disposition>,
    /// Lowercased name to winning node.
    winners: HashMap<String, NodeIndex>,
    pub report: ConflictReport,
}

impl ConflictResolution {
    pub fn disposition(&self, idx: NodeIndex) -> Disposition {
        self.dispositions
            .get(&idx)
            .copied()
            .unwrap_or(Disposition::Rejected)
    }

    /// The winning node for a library name, if any node of it was accepted.
    pub fn winner(&self, name: &str) -> Option<NodeIndex> {
        self.winners.get(&name.to_ascii_lowercase()).copied()
    }

    /// The identity a node ends up with: its own when accepted, the winner's
    /// when it lost to another node, its placeholder otherwise.
    pub fn effective_identity<'g>(
        &self,
        graph: &'g ResolvedGraph,
        idx: NodeIndex,
    ) -> &'g LibraryIdentity {
        let node = graph.node(idx);
        match self.disposition(idx) {
            Disposition::Rejected | Disposition::Downgraded => self
                .winners
                .get(&node.key())
                .map(|&w| &graph.node(w).identity)
                .unwrap_or(&node.identity),
            _ => &node.identity,
        }
    }

    /// Accepted nodes in breadth-first order, root excluded.
    pub fn accepted(&self, graph: &ResolvedGraph) -> Vec<NodeIndex> {
        graph
            .breadth_first()
            .into_iter()
            .filter(|&idx| idx != graph.root() && self.disposition(idx) == Disposition::Accepted)
            .collect()
    }

    /// Nodes with the given disposition in breadth-first order.
    pub fn with_disposition(&self, graph: &ResolvedGraph, wanted: Disposition) -> Vec<NodeIndex> {
        graph
            .breadth_first()
            .into_iter()
            .filter(|&idx| self.disposition(idx) == wanted)
            .collect()
    }
}

/// Assign a disposition to every node of `graph`.
///
/// Nodes are visited breadth-first, so the first live node seen for a name
/// is the nearest one and, at equal depth, the first declared.
pub fn resolve_conflicts(graph: &ResolvedGraph) -> ConflictResolution {
    let mut dispositions = HashMap::new();
    let mut winners: HashMap<String, NodeIndex> = HashMap::new();
    let mut report = ConflictReport::new();

    let root = graph.root();
    dispositions.insert(root, Disposition::Accepted);
    winners.insert(graph.node(root).key(), root);

    for idx in graph.breadth_first().into_iter().skip(1) {
        let node = graph.node(idx);
        let parent_accepted = node
            .parent
            .is_some_and(|p| dispositions.get(&p) == Some(&Disposition::Accepted));

        let disposition = if !parent_accepted {
            Disposition::Rejected
        } else {
            match node.outcome {
                WalkOutcome::Cycle => Disposition::Cycle,
                WalkOutcome::Unresolved => Disposition::Unresolved,
                WalkOutcome::Resolved => match winners.get(&node.key()) {
                    None => {
                        winners.insert(node.key(), idx);
                        Disposition::Accepted
                    }
                    Some(&winner) => {
                        let winning = graph.node(winner);
                        let own = &node.identity.version;
                        let kept = &winning.identity.version;
                        let kind = if own > kept {
                            ConflictKind::Downgrade
                        } else {
                            ConflictKind::Superseded
                        };
                        if own != kept {
                            if kind == ConflictKind::Downgrade {
                                tracing::warn!(
                                    "Detected package downgrade: {} from {} to {}",
                                    node.range.name(),
                                    own,
                                    kept
                                );
                            }
                            report.add(VersionConflict {
                                name: node.range.name().to_string(),
                                requested: node.range.to_string(),
                                selected: own.to_string(),
                                resolved: kept.to_string(),
                                kind,
                                reason: format!(
                                    "nearest wins (depth {} vs {})",
                                    winning.depth, node.depth
                                ),
                            });
                        }
                        match kind {
                            ConflictKind::Downgrade => Disposition::Downgraded,
                            ConflictKind::Superseded => Disposition::Rejected,
                        }
                    }
                },
            }
        };
        dispositions.insert(idx, disposition);
    }

    ConflictResolution {
        dispositions,
        winners,
        report,
    }
}

#[cfg(test)]
mod tests {
    use graft_core::library::LibraryRange;
    use graft_core::version::Version;

    use super::*;
    use crate::graph::WalkNode;

    fn node(name: &str, range: &str, version: &str, children: Vec<WalkNode>) -> WalkNode {
        WalkNode {
            range: LibraryRange::parse(name, range).unwrap(),
            identity: LibraryIdentity::package(name, Version::parse(version).unwrap()),
            outcome: WalkOutcome::Resolved,
            children,
        }
    }

    fn with_outcome(name: &str, outcome: WalkOutcome) -> WalkNode {
        let range = LibraryRange::parse(name, "1.0").unwrap();
        WalkNode {
            identity: LibraryIdentity::unresolved(&range),
            range,
            outcome,
            children: vec![],
        }
    }

    fn graph(children: Vec<WalkNode>) -> ResolvedGraph {
        ResolvedGraph::from_walk(WalkNode {
            range: LibraryRange::parse("App", "[1.0]").unwrap(),
            identity: LibraryIdentity::project("App", Version::parse("1.0").unwrap()),
            outcome: WalkOutcome::Resolved,
            children,
        })
    }

    #[test]
    fn empty_report() {
        let report = ConflictReport::new();
        assert!(report.is_empty());
        assert_eq!(report.len(), 0);
        assert_eq!(report.to_string(), "No version conflicts.");
    }

    #[test]
    fn report_with_conflicts() {
        let mut report = ConflictReport::new();
        report.add(VersionConflict {
            name: "Contoso.Lib".to_string(),
            requested: "Contoso.Lib [2.0.0, )".to_string(),
            selected: "2.0.0".to_string(),
            resolved: "1.0.0".to_string(),
            kind: ConflictKind::Downgrade,
            reason: "nearest wins (depth 1 vs 2)".to_string(),
        });
        assert!(!report.is_empty());
        assert_eq!(report.len(), 1);
        assert_eq!(report.downgrades().count(), 1);
        let s = report.to_string();
        assert!(s.starts_with("Version conflicts (1):"));
        assert!(s.contains("downgrade: Contoso.Lib requested"));
        assert!(s.contains("(selected 2.0.0) but resolved 1.0.0"));
    }

    #[test]
    fn nearest_wins_and_downgrade_is_flagged() {
        // App -> X 1.0 ; App -> A -> B -> X 2.0
        let g = graph(vec![
            node("X", "1.0", "1.0", vec![]),
            node(
                "A",
                "1.0",
                "1.0",
                vec![node("B", "1.0", "1.0", vec![node("X", "2.0", "2.0", vec![])])],
            ),
        ]);
        let res = resolve_conflicts(&g);
        let xs = g.nodes_named("X");
        assert_eq!(res.disposition(xs[0]), Disposition::Accepted);
        assert_eq!(res.disposition(xs[1]), Disposition::Downgraded);
        assert_eq!(res.winner("x"), Some(xs[0]));
        assert_eq!(res.effective_identity(&g, xs[1]).to_string(), "X 1.0.0");

        assert_eq!(res.report.len(), 1);
        let conflict = &res.report.conflicts[0];
        assert_eq!(conflict.kind, ConflictKind::Downgrade);
        assert_eq!(conflict.reason, "nearest wins (depth 1 vs 3)");
    }

    #[test]
    fn higher_nearer_version_is_ordinary_supersession() {
        let g = graph(vec![
            node("X", "2.0", "2.0", vec![]),
            node("A", "1.0", "1.0", vec![node("X", "1.0", "1.0", vec![])]),
        ]);
        let res = resolve_conflicts(&g);
        let deep = g.nodes_named("X")[1];
        assert_eq!(res.disposition(deep), Disposition::Rejected);
        assert_eq!(res.report.conflicts[0].kind, ConflictKind::Superseded);
        assert_eq!(res.report.downgrades().count(), 0);
    }

    #[test]
    fn same_version_is_not_reported() {
        let g = graph(vec![
            node("A", "1.0", "1.0", vec![node("X", "1.0", "1.0", vec![])]),
            node("B", "1.0", "1.0", vec![node("X", "1.0", "1.0", vec![])]),
        ]);
        let res = resolve_conflicts(&g);
        let xs = g.nodes_named("X");
        assert_eq!(res.disposition(xs[0]), Disposition::Accepted);
        assert_eq!(res.disposition(xs[1]), Disposition::Rejected);
        assert!(res.report.is_empty());
    }

    #[test]
    fn equal_depth_goes_to_first_declared() {
        let g = graph(vec![
            node("A", "1.0", "1.0", vec![node("X", "1.5", "1.5", vec![])]),
            node("B", "1.0", "1.0", vec![node("X", "1.2", "1.2", vec![])]),
        ]);
        let res = resolve_conflicts(&g);
        let xs = g.nodes_named("X");
        assert_eq!(res.winner("X"), Some(xs[0]));
        assert_eq!(res.disposition(xs[1]), Disposition::Rejected);
    }

    #[test]
    fn subtree_of_loser_does_not_compete() {
        // The deep Y under the losing X would otherwise be the only Y.
        let g = graph(vec![
            node("X", "1.0", "1.0", vec![]),
            node(
                "A",
                "1.0",
                "1.0",
                vec![node("X", "2.0", "2.0", vec![node("Y", "1.0", "1.0", vec![])])],
            ),
        ]);
        let res = resolve_conflicts(&g);
        let y = g.nodes_named("Y")[0];
        assert_eq!(res.disposition(y), Disposition::Rejected);
        assert!(res.winner("Y").is_none());
        assert_eq!(res.report.len(), 1);
        assert_eq!(res.accepted(&g).len(), 2);
    }

    #[test]
    fn unresolved_and_cycle_nodes_do_not_claim_names() {
        let g = graph(vec![
            with_outcome("X", WalkOutcome::Unresolved),
            node("A", "1.0", "1.0", vec![node("X", "1.0", "1.0", vec![])]),
            with_outcome("App", WalkOutcome::Cycle),
        ]);
        let res = resolve_conflicts(&g);
        let xs = g.nodes_named("X");
        assert_eq!(res.disposition(xs[0]), Disposition::Unresolved);
        assert_eq!(res.disposition(xs[1]), Disposition::Accepted);
        let cycle = g.nodes_named("App")[0];
        assert_eq!(res.disposition(cycle), Disposition::Cycle);
        assert_eq!(res.with_disposition(&g, Disposition::Unresolved), vec![xs[0]]);
    }
}
