//! Highlight state of the rendered tree, keyed by node id.

use std::collections::{BTreeMap, HashSet};

use super::highlight::HighlightError;
use super::{DecisionTree, NodeId, Outcome};

/// Path marker carried by a diagram element.
///
/// An element holds at most one marker, so comparison classes can never
/// stack on the same link or node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    /// Single path colored by the outcome of the leaf it leads to.
    Outcome(Outcome),
    /// Guided reveal, a fixed gold color independent of outcome.
    Tutorial,
    /// Prefix both compared cohorts share.
    Shared,
    /// Divergent tail of cohort A, colored by A's outcome.
    CohortA(Outcome),
    /// Divergent tail of cohort B, colored by B's outcome.
    CohortB(Outcome),
}

/// Mutable scene the highlighters write to.
pub trait Diagram {
    /// Remove every path marker and the focus node, whatever mode set them.
    fn clear_path_markers(&mut self);

    /// Make the cleared state a distinct rendered step before any marker is
    /// applied again. Without it a renderer may coalesce clear-then-set and
    /// never restart its transition.
    fn commit(&mut self);

    /// Mark the node element (pie and caption) of `id`.
    fn mark_node(&mut self, id: NodeId, marker: Marker) -> Result<(), HighlightError>;

    /// Mark the edge element (link and label) whose child is `child`.
    fn mark_edge(&mut self, child: NodeId, marker: Marker) -> Result<(), HighlightError>;

    /// Node that pulses as the end of the visible path.
    fn set_focus(&mut self, id: NodeId) -> Result<(), HighlightError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ElementState {
    pub marker: Option<Marker>,
    pub hovered: bool,
}

/// Concrete diagram used by the painter.
///
/// `epoch` increases on every `commit`, and the painter restarts its
/// fade-in when it observes a new epoch. Re-applying a set-equal highlight
/// therefore still animates.
#[derive(Debug, Clone, Default)]
pub struct TreeDiagram {
    nodes: BTreeMap<NodeId, ElementState>,
    edges: BTreeMap<NodeId, ElementState>,
    focus: Option<NodeId>,
    epoch: u64,
}

impl TreeDiagram {
    pub fn from_tree(tree: &DecisionTree) -> Self {
        let nodes = tree
            .nodes()
            .iter()
            .map(|n| (n.id(), ElementState::default()))
            .collect();
        let edges = tree
            .edges()
            .into_iter()
            .map(|(_, child)| (child, ElementState::default()))
            .collect();
        Self {
            nodes,
            edges,
            focus: None,
            epoch: 0,
        }
    }

    pub fn node(&self, id: NodeId) -> Option<&ElementState> {
        self.nodes.get(&id)
    }

    pub fn edge(&self, child: NodeId) -> Option<&ElementState> {
        self.edges.get(&child)
    }

    pub fn focus(&self) -> Option<NodeId> {
        self.focus
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    #[cfg(test)]
    pub fn has_markers(&self) -> bool {
        self.nodes
            .values()
            .chain(self.edges.values())
            .any(|e| e.marker.is_some())
    }

    pub fn marked_nodes(&self) -> impl Iterator<Item = (NodeId, Marker)> + '_ {
        self.nodes
            .iter()
            .filter_map(|(id, e)| e.marker.map(|m| (*id, m)))
    }

    #[cfg(test)]
    pub fn marked_edges(&self) -> impl Iterator<Item = (NodeId, Marker)> + '_ {
        self.edges
            .iter()
            .filter_map(|(id, e)| e.marker.map(|m| (*id, m)))
    }

    /// Hover overlay, independent of the path markers.
    pub fn set_hover_path(&mut self, path: &[NodeId]) {
        let on: HashSet<NodeId> = path.iter().copied().collect();
        for (id, state) in self.nodes.iter_mut() {
            state.hovered = on.contains(id);
        }
        for (child, state) in self.edges.iter_mut() {
            state.hovered = on.contains(child) && path.first() != Some(child);
        }
    }

    pub fn clear_hover(&mut self) {
        self.set_hover_path(&[]);
    }
}

impl Diagram for TreeDiagram {
    fn clear_path_markers(&mut self) {
        for state in self.nodes.values_mut().chain(self.edges.values_mut()) {
            state.marker = None;
        }
        self.focus = None;
    }

    fn commit(&mut self) {
        self.epoch += 1;
    }

    fn mark_node(&mut self, id: NodeId, marker: Marker) -> Result<(), HighlightError> {
        let state = self
            .nodes
            .get_mut(&id)
            .ok_or(HighlightError::UnknownNode(id))?;
        state.marker = Some(marker);
        Ok(())
    }

    fn mark_edge(&mut self, child: NodeId, marker: Marker) -> Result<(), HighlightError> {
        let state = self
            .edges
            .get_mut(&child)
            .ok_or(HighlightError::UnknownEdge(child))?;
        state.marker = Some(marker);
        Ok(())
    }

    fn set_focus(&mut self, id: NodeId) -> Result<(), HighlightError> {
        if !self.nodes.contains_key(&id) {
            return Err(HighlightError::UnknownNode(id));
        }
        self.focus = Some(id);
        Ok(())
    }
}
