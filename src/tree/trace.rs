//! Root-to-leaf path tracing.

use thiserror::Error;

use super::profile::Profile;
use super::{DecisionTree, Feature, NodeId, TreeNode};

#[derive(Debug, Error, PartialEq)]
pub enum TraceError {
    #[error("profile has no value for `{feature}` required by node {node}")]
    MissingAttribute { node: NodeId, feature: Feature },

    #[error("value for `{feature}` required by node {node} is not a finite number")]
    InvalidAttribute { node: NodeId, feature: Feature },

    #[error("node {0} is referenced but not present in the tree")]
    MissingNode(NodeId),

    #[error("trace exceeded {0} steps without reaching a leaf")]
    Cycle(usize),
}

/// Ordered node ids from the root to a leaf, both inclusive. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path(Vec<NodeId>);

impl Path {
    #[cfg(test)]
    pub fn root(&self) -> NodeId {
        self.0[0]
    }

    pub fn leaf(&self) -> NodeId {
        self.0[self.0.len() - 1]
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[NodeId] {
        &self.0
    }
}

/// Follow `profile` from the root until a leaf is reached.
pub fn trace(tree: &DecisionTree, profile: &Profile) -> Result<Path, TraceError> {
    let max_steps = tree.depth() + 1;
    let mut visited = Vec::with_capacity(max_steps);
    let mut current = tree.root_id();

    loop {
        if visited.len() >= max_steps {
            return Err(TraceError::Cycle(max_steps));
        }
        visited.push(current);

        let node = tree.node(current).ok_or(TraceError::MissingNode(current))?;
        match node {
            TreeNode::Leaf { .. } => return Ok(Path(visited)),
            TreeNode::Internal {
                id,
                feature,
                predicate,
                left,
                right,
                ..
            } => {
                let value = profile.get(*feature).ok_or(TraceError::MissingAttribute {
                    node: *id,
                    feature: *feature,
                })?;
                if !value.is_finite() {
                    return Err(TraceError::InvalidAttribute {
                        node: *id,
                        feature: *feature,
                    });
                }
                current = if predicate.routes_left(value) { *left } else { *right };
            }
        }
    }
}

/// Path from the root down to an arbitrary node, used for hover highlighting.
pub fn path_to_node(tree: &DecisionTree, id: NodeId) -> Option<Vec<NodeId>> {
    tree.node(id)?;
    let mut lineage = vec![id];
    let mut current = id;
    while let Some(parent) = tree.parent(current) {
        lineage.push(parent);
        current = parent;
    }
    lineage.reverse();
    Some(lineage)
}
