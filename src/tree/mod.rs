use std::collections::{HashMap, HashSet};
use std::fmt;

use thiserror::Error;

pub mod diagram;
pub mod highlight;
pub mod layout;
pub mod painter;
pub mod profile;
pub mod reveal;
pub mod sequencer;
pub mod trace;
pub mod viewer;

#[cfg(test)]
mod test_reveal_highlight;

/// Stable node identifier, as emitted by the model-serving layer.
pub type NodeId = u32;

/// Passenger attributes a split can test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Feature {
    Sex,
    Pclass,
    Age,
    Fare,
}

impl Feature {
    pub const ALL: [Feature; 4] = [Feature::Sex, Feature::Pclass, Feature::Age, Feature::Fare];

    pub fn name(self) -> &'static str {
        match self {
            Feature::Sex => "sex",
            Feature::Pclass => "pclass",
            Feature::Age => "age",
            Feature::Fare => "fare",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "sex" => Some(Feature::Sex),
            "pclass" | "class" => Some(Feature::Pclass),
            "age" => Some(Feature::Age),
            "fare" => Some(Feature::Fare),
            _ => None,
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Binary prediction carried by a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Died,
    Survived,
}

impl Outcome {
    pub fn from_class(class: u8) -> Option<Self> {
        match class {
            0 => Some(Outcome::Died),
            1 => Some(Outcome::Survived),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Outcome::Died => "Died",
            Outcome::Survived => "Survived",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampleCounts {
    pub died: u32,
    pub survived: u32,
}

impl SampleCounts {
    pub fn new(died: u32, survived: u32) -> Self {
        Self { died, survived }
    }

    pub fn total(&self) -> u32 {
        self.died + self.survived
    }

    pub fn survival_rate(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.survived as f64 / total as f64,
        }
    }
}

/// Routing rule of an internal node. A match routes left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Predicate {
    /// `value <= threshold` goes left, `value > threshold` goes right.
    AtMost(f64),
    /// `value == category` goes left, anything else goes right.
    Equals(f64),
}

impl Predicate {
    pub fn routes_left(&self, value: f64) -> bool {
        match *self {
            Predicate::AtMost(threshold) => value <= threshold,
            Predicate::Equals(category) => value == category,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TreeNode {
    Leaf {
        id: NodeId,
        outcome: Outcome,
        survival_rate: f64,
        samples: SampleCounts,
    },
    Internal {
        id: NodeId,
        feature: Feature,
        predicate: Predicate,
        left: NodeId,
        right: NodeId,
        samples: SampleCounts,
        left_label: Option<String>,
        right_label: Option<String>,
    },
}

impl TreeNode {
    pub fn id(&self) -> NodeId {
        match self {
            TreeNode::Leaf { id, .. } | TreeNode::Internal { id, .. } => *id,
        }
    }

    pub fn samples(&self) -> SampleCounts {
        match self {
            TreeNode::Leaf { samples, .. } | TreeNode::Internal { samples, .. } => *samples,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, TreeNode::Leaf { .. })
    }

    pub fn children(&self) -> Option<(NodeId, NodeId)> {
        match self {
            TreeNode::Leaf { .. } => None,
            TreeNode::Internal { left, right, .. } => Some((*left, *right)),
        }
    }

    /// Text drawn next to the node: the split feature or the leaf verdict.
    pub fn caption(&self) -> String {
        match self {
            TreeNode::Leaf { outcome: Outcome::Survived, .. } => "✓ Survived".to_string(),
            TreeNode::Leaf { outcome: Outcome::Died, .. } => "✗ Died".to_string(),
            TreeNode::Internal { feature, .. } => feature.name().to_string(),
        }
    }

    pub fn split_rule(&self) -> String {
        match self {
            TreeNode::Leaf { outcome, .. } => format!("Predict: {}", outcome.label()),
            TreeNode::Internal {
                feature,
                predicate: Predicate::AtMost(threshold),
                ..
            } => format!("{} ≤ {:.2}", feature, threshold),
            TreeNode::Internal {
                feature,
                predicate: Predicate::Equals(category),
                ..
            } => format!("{} = {}", feature, category),
        }
    }

    /// Label of the edge leading from this node to `child`.
    pub fn edge_label(&self, child: NodeId) -> Option<String> {
        let TreeNode::Internal {
            predicate,
            left,
            right,
            left_label,
            right_label,
            ..
        } = self
        else {
            return None;
        };

        let is_left = child == *left;
        if !is_left && child != *right {
            return None;
        }
        let explicit = if is_left { left_label } else { right_label };
        if let Some(label) = explicit {
            return Some(label.clone());
        }
        Some(match (predicate, is_left) {
            (Predicate::AtMost(t), true) => format!("≤ {:.1}", t),
            (Predicate::AtMost(t), false) => format!("> {:.1}", t),
            (Predicate::Equals(c), true) => format!("= {}", c),
            (Predicate::Equals(c), false) => format!("≠ {}", c),
        })
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum TreeError {
    #[error("tree has no nodes")]
    Empty,

    #[error("duplicate node id {0}")]
    DuplicateId(NodeId),

    #[error("root node {0} is not part of the tree")]
    MissingRoot(NodeId),

    #[error("node {parent} references missing child {child}")]
    MissingChild { parent: NodeId, child: NodeId },

    #[error("node {0} must have exactly two children, found {1}")]
    BadArity(NodeId, usize),

    #[error("node {0} is referenced by more than one parent")]
    SharedChild(NodeId),

    #[error("node {0} closes a cycle back to the root")]
    Cycle(NodeId),

    #[error("node {0} is unreachable from the root")]
    Unreachable(NodeId),

    #[error("node {node} splits on unknown feature `{feature}`")]
    UnknownFeature { node: NodeId, feature: String },

    #[error("node {node} is missing field `{field}`")]
    MissingField { node: NodeId, field: &'static str },

    #[error("node {node} has invalid predicted class {class}")]
    InvalidClass { node: NodeId, class: u8 },
}

pub type Result<T> = std::result::Result<T, TreeError>;

/// Validated strict binary decision tree with id lookup.
#[derive(Debug, Clone)]
pub struct DecisionTree {
    root: NodeId,
    nodes: Vec<TreeNode>,
    index: HashMap<NodeId, usize>,
    parents: HashMap<NodeId, NodeId>,
    depth: usize,
}

impl DecisionTree {
    pub fn new(root: NodeId, nodes: Vec<TreeNode>) -> Result<Self> {
        if nodes.is_empty() {
            return Err(TreeError::Empty);
        }

        let mut index = HashMap::with_capacity(nodes.len());
        for (slot, node) in nodes.iter().enumerate() {
            if index.insert(node.id(), slot).is_some() {
                return Err(TreeError::DuplicateId(node.id()));
            }
        }
        if !index.contains_key(&root) {
            return Err(TreeError::MissingRoot(root));
        }

        let mut parents = HashMap::with_capacity(nodes.len());
        for node in &nodes {
            let Some((left, right)) = node.children() else {
                continue;
            };
            if left == right {
                return Err(TreeError::BadArity(node.id(), 1));
            }
            for child in [left, right] {
                if !index.contains_key(&child) {
                    return Err(TreeError::MissingChild {
                        parent: node.id(),
                        child,
                    });
                }
                if child == root {
                    return Err(TreeError::Cycle(node.id()));
                }
                if parents.insert(child, node.id()).is_some() {
                    return Err(TreeError::SharedChild(child));
                }
            }
        }

        // Every node but the root has exactly one parent now, so a walk from
        // the root either reaches everything or leaves a detached cycle.
        let mut seen = HashSet::with_capacity(nodes.len());
        let mut depth = 0;
        let mut stack = vec![(root, 0usize)];
        while let Some((id, level)) = stack.pop() {
            if !seen.insert(id) {
                return Err(TreeError::Cycle(id));
            }
            depth = depth.max(level);
            if let Some((left, right)) = nodes[index[&id]].children() {
                stack.push((right, level + 1));
                stack.push((left, level + 1));
            }
        }
        if let Some(orphan) = nodes.iter().map(TreeNode::id).find(|id| !seen.contains(id)) {
            return Err(TreeError::Unreachable(orphan));
        }

        Ok(Self {
            root,
            nodes,
            index,
            parents,
            depth,
        })
    }

    pub fn root_id(&self) -> NodeId {
        self.root
    }

    #[cfg(test)]
    pub fn root(&self) -> &TreeNode {
        &self.nodes[self.index[&self.root]]
    }

    pub fn node(&self, id: NodeId) -> Option<&TreeNode> {
        self.index.get(&id).map(|&slot| &self.nodes[slot])
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.parents.get(&id).copied()
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges on the longest root-to-leaf path.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// All `(parent, child)` pairs, in node order.
    pub fn edges(&self) -> Vec<(NodeId, NodeId)> {
        self.nodes
            .iter()
            .filter_map(|node| node.children().map(|(l, r)| [(node.id(), l), (node.id(), r)]))
            .flatten()
            .collect()
    }

    pub fn max_samples(&self) -> u32 {
        self.nodes
            .iter()
            .map(|node| node.samples().total())
            .max()
            .unwrap_or(0)
    }

    /// Outcome of the leaf a traced path terminates in.
    pub fn leaf_outcome(&self, path: &trace::Path) -> Option<Outcome> {
        match self.node(path.leaf())? {
            TreeNode::Leaf { outcome, .. } => Some(*outcome),
            TreeNode::Internal { .. } => None,
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn leaf(id: NodeId, outcome: Outcome, died: u32, survived: u32) -> TreeNode {
        let samples = SampleCounts::new(died, survived);
        TreeNode::Leaf {
            id,
            outcome,
            survival_rate: samples.survival_rate(),
            samples,
        }
    }

    pub fn split(
        id: NodeId,
        feature: Feature,
        threshold: f64,
        left: NodeId,
        right: NodeId,
        died: u32,
        survived: u32,
    ) -> TreeNode {
        TreeNode::Internal {
            id,
            feature,
            predicate: Predicate::AtMost(threshold),
            left,
            right,
            samples: SampleCounts::new(died, survived),
            left_label: None,
            right_label: None,
        }
    }

    /// Root splits on sex (female left), each child splits on class.
    ///
    /// ```text
    ///              0 sex
    ///          /          \
    ///      1 pclass      4 pclass
    ///      /    \        /    \
    ///     2      3      5      6
    /// ```
    pub fn sex_class_tree() -> DecisionTree {
        DecisionTree::new(
            0,
            vec![
                split(0, Feature::Sex, 0.5, 1, 4, 424, 290),
                split(1, Feature::Pclass, 1.5, 2, 3, 64, 197),
                leaf(2, Outcome::Survived, 3, 82),
                leaf(3, Outcome::Survived, 61, 115),
                split(4, Feature::Pclass, 1.5, 5, 6, 360, 93),
                leaf(5, Outcome::Died, 61, 40),
                leaf(6, Outcome::Died, 299, 53),
            ],
        )
        .expect("fixture tree is valid")
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn validates_fixture_tree() {
        let tree = sex_class_tree();
        assert_eq!(tree.len(), 7);
        assert_eq!(tree.depth(), 2);
        assert_eq!(tree.root_id(), 0);
        assert_eq!(tree.parent(3), Some(1));
        assert_eq!(tree.parent(0), None);
        assert_eq!(tree.edges().len(), 6);
        assert_eq!(tree.max_samples(), 714);
    }

    #[test]
    fn rejects_missing_child() {
        let err = DecisionTree::new(
            0,
            vec![
                split(0, Feature::Sex, 0.5, 1, 9, 10, 10),
                leaf(1, Outcome::Died, 5, 1),
            ],
        )
        .unwrap_err();
        assert_eq!(err, TreeError::MissingChild { parent: 0, child: 9 });
    }

    #[test]
    fn rejects_shared_child_and_duplicates() {
        let shared = DecisionTree::new(
            0,
            vec![
                split(0, Feature::Sex, 0.5, 1, 2, 10, 10),
                split(1, Feature::Age, 9.5, 3, 4, 5, 5),
                split(2, Feature::Age, 9.5, 3, 5, 5, 5),
                leaf(3, Outcome::Died, 1, 0),
                leaf(4, Outcome::Died, 1, 0),
                leaf(5, Outcome::Died, 1, 0),
            ],
        )
        .unwrap_err();
        assert_eq!(shared, TreeError::SharedChild(3));

        let duplicate = DecisionTree::new(
            0,
            vec![leaf(0, Outcome::Died, 1, 0), leaf(0, Outcome::Died, 1, 0)],
        )
        .unwrap_err();
        assert_eq!(duplicate, TreeError::DuplicateId(0));
    }

    #[test]
    fn rejects_cycles_and_orphans() {
        let cycle = DecisionTree::new(
            0,
            vec![
                split(0, Feature::Sex, 0.5, 1, 2, 10, 10),
                split(1, Feature::Age, 9.5, 0, 3, 5, 5),
                leaf(2, Outcome::Died, 1, 0),
                leaf(3, Outcome::Died, 1, 0),
            ],
        )
        .unwrap_err();
        assert_eq!(cycle, TreeError::Cycle(1));

        let orphan = DecisionTree::new(
            0,
            vec![
                split(0, Feature::Sex, 0.5, 1, 2, 10, 10),
                leaf(1, Outcome::Died, 1, 0),
                leaf(2, Outcome::Died, 1, 0),
                leaf(7, Outcome::Survived, 0, 1),
            ],
        )
        .unwrap_err();
        assert_eq!(orphan, TreeError::Unreachable(7));
    }

    #[test]
    fn single_leaf_tree_is_valid() {
        let tree = DecisionTree::new(3, vec![leaf(3, Outcome::Survived, 1, 4)]).unwrap();
        assert_eq!(tree.depth(), 0);
        assert!(tree.edges().is_empty());
    }

    #[test]
    fn edge_labels_fall_back_to_thresholds() {
        let tree = sex_class_tree();
        let root = tree.root();
        assert_eq!(root.edge_label(1).as_deref(), Some("≤ 0.5"));
        assert_eq!(root.edge_label(4).as_deref(), Some("> 0.5"));
        assert_eq!(root.edge_label(2), None);
        assert_eq!(root.split_rule(), "sex ≤ 0.50");
    }

    #[test]
    fn predicates_route_consistently() {
        assert!(Predicate::AtMost(0.5).routes_left(0.0));
        assert!(!Predicate::AtMost(0.5).routes_left(1.0));
        assert!(Predicate::AtMost(1.5).routes_left(1.5));
        assert!(Predicate::Equals(1.0).routes_left(1.0));
        assert!(!Predicate::Equals(1.0).routes_left(2.0));
    }

    #[test]
    fn feature_names_round_trip() {
        for feature in Feature::ALL {
            assert_eq!(Feature::from_name(feature.name()), Some(feature));
        }
        assert_eq!(Feature::from_name("embarked"), None);
    }
}
