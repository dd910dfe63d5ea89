//! Single-path and dual-path highlighting.
//!
//! Both highlighters follow the same three-phase protocol: clear every path
//! marker, `commit` the cleared diagram, then apply the new markers. The
//! commit is what makes a repeated or set-equal highlight animate again.

use std::collections::BTreeSet;

use log::debug;
use thiserror::Error;

use super::diagram::{Diagram, Marker};
use super::{NodeId, Outcome};

#[derive(Debug, Error, PartialEq)]
pub enum HighlightError {
    #[error("node {0} is not present in the diagram")]
    UnknownNode(NodeId),

    #[error("no edge leads to node {0} in the diagram")]
    UnknownEdge(NodeId),
}

/// Coloring of a single highlighted path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathStyle {
    /// Colored by the outcome of the leaf the full path reaches.
    Outcome(Outcome),
    /// Fixed gold color used while a reveal is in progress.
    Tutorial,
}

impl PathStyle {
    fn marker(self) -> Marker {
        match self {
            PathStyle::Outcome(outcome) => Marker::Outcome(outcome),
            PathStyle::Tutorial => Marker::Tutorial,
        }
    }
}

pub fn apply_single_path<D>(
    diagram: &mut D,
    limited: &[NodeId],
    style: PathStyle,
) -> Result<(), HighlightError>
where
    D: Diagram + ?Sized,
{
    diagram.clear_path_markers();
    diagram.commit();

    let Some(&last) = limited.last() else {
        debug!("single path cleared");
        return Ok(());
    };

    let marker = style.marker();
    mark_run(diagram, limited, limited.iter().copied(), marker)?;
    diagram.set_focus(last)?;
    debug!("single path {:?} marked as {:?}", limited, marker);
    Ok(())
}

/// Disjoint split of two limited paths into shared prefix and private tails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonPartition {
    pub shared: BTreeSet<NodeId>,
    pub only_a: BTreeSet<NodeId>,
    pub only_b: BTreeSet<NodeId>,
}

impl ComparisonPartition {
    pub fn new(a: &[NodeId], b: &[NodeId]) -> Self {
        let set_a: BTreeSet<NodeId> = a.iter().copied().collect();
        let set_b: BTreeSet<NodeId> = b.iter().copied().collect();
        let shared: BTreeSet<NodeId> = set_a.intersection(&set_b).copied().collect();
        let only_a = set_a.difference(&shared).copied().collect();
        let only_b = set_b.difference(&shared).copied().collect();
        Self {
            shared,
            only_a,
            only_b,
        }
    }

    /// Both cohorts end on the same visible node.
    pub fn fully_overlapping(&self) -> bool {
        self.only_a.is_empty() && self.only_b.is_empty()
    }
}

pub fn apply_dual_path<D>(
    diagram: &mut D,
    limited_a: &[NodeId],
    limited_b: &[NodeId],
    outcome_a: Outcome,
    outcome_b: Outcome,
) -> Result<Option<ComparisonPartition>, HighlightError>
where
    D: Diagram + ?Sized,
{
    diagram.clear_path_markers();
    diagram.commit();

    if limited_a.is_empty() || limited_b.is_empty() {
        debug!("dual path cleared");
        return Ok(None);
    }

    let partition = ComparisonPartition::new(limited_a, limited_b);
    // Shared ids are walked in path order so the root edge check below
    // sees the same prefix as cohort A.
    let shared = limited_a.iter().copied().filter(|id| partition.shared.contains(id));
    mark_run(diagram, limited_a, shared, Marker::Shared)?;

    let tail_a = limited_a.iter().copied().filter(|id| partition.only_a.contains(id));
    mark_run(diagram, limited_a, tail_a, Marker::CohortA(outcome_a))?;

    let tail_b = limited_b.iter().copied().filter(|id| partition.only_b.contains(id));
    mark_run(diagram, limited_b, tail_b, Marker::CohortB(outcome_b))?;

    debug!(
        "dual path marked: shared {:?}, A {:?}, B {:?}",
        partition.shared, partition.only_a, partition.only_b
    );
    Ok(Some(partition))
}

/// Mark nodes of `path` and the edges leading into them. The first id of
/// `path` is the root and has no incoming edge.
fn mark_run<D, I>(
    diagram: &mut D,
    path: &[NodeId],
    ids: I,
    marker: Marker,
) -> Result<(), HighlightError>
where
    D: Diagram + ?Sized,
    I: IntoIterator<Item = NodeId>,
{
    let root = path.first().copied();
    for id in ids {
        diagram.mark_node(id, marker)?;
        if Some(id) != root {
            diagram.mark_edge(id, marker)?;
        }
    }
    Ok(())
}
