use std::collections::HashMap;

use super::{DecisionTree, NodeId};

/// Horizontal tidy layout: the root sits on the left, depth grows to the
/// right and leaves are spread evenly from top to bottom.
///
/// Coordinates are normalised to `[0, 1]` on both axes; the painter maps
/// them onto the available rect.
#[derive(Debug, Clone)]
pub struct TreeLayout {
    pub positions: HashMap<NodeId, (f32, f32)>,
    pub edges: Vec<(NodeId, NodeId)>,
    max_samples: u32,
}

pub const MIN_STROKE: f32 = 1.0;
pub const MAX_STROKE: f32 = 32.0;

impl TreeLayout {
    pub fn from_tree(tree: &DecisionTree) -> Self {
        let mut state = LayoutState {
            positions: HashMap::with_capacity(tree.len()),
            next_leaf: 0,
        };
        assign_positions(tree, tree.root_id(), 0, &mut state);

        let leaf_count = state.next_leaf.max(1);
        let y_span = leaf_count.saturating_sub(1).max(1) as f32;
        let x_span = tree.depth().max(1) as f32;

        let positions = state
            .positions
            .into_iter()
            .map(|(id, (level, slot))| {
                let y = if leaf_count == 1 { 0.5 } else { slot / y_span };
                (id, (level as f32 / x_span, y))
            })
            .collect();

        Self {
            positions,
            edges: tree.edges(),
            max_samples: tree.max_samples(),
        }
    }

    pub fn position(&self, id: NodeId) -> Option<(f32, f32)> {
        self.positions.get(&id).copied()
    }

    /// Link thickness on a square-root scale of the child's sample count.
    pub fn stroke_width(&self, samples: u32) -> f32 {
        stroke_width(samples, self.max_samples)
    }
}

struct LayoutState {
    positions: HashMap<NodeId, (usize, f32)>,
    next_leaf: usize,
}

/// Leaves take consecutive slots, internal nodes sit midway between their
/// two children. Returns the slot assigned to `id`.
fn assign_positions(
    tree: &DecisionTree,
    id: NodeId,
    level: usize,
    state: &mut LayoutState,
) -> f32 {
    let slot = match tree.node(id).and_then(|node| node.children()) {
        Some((left, right)) => {
            let top = assign_positions(tree, left, level + 1, state);
            let bottom = assign_positions(tree, right, level + 1, state);
            (top + bottom) * 0.5
        }
        None => {
            let slot = state.next_leaf as f32;
            state.next_leaf += 1;
            slot
        }
    };
    state.positions.insert(id, (level, slot));
    slot
}

pub fn stroke_width(samples: u32, max_samples: u32) -> f32 {
    if max_samples == 0 {
        return MIN_STROKE;
    }
    let t = (samples.min(max_samples) as f32 / max_samples as f32).sqrt();
    MIN_STROKE + t * (MAX_STROKE - MIN_STROKE)
}

/// Outer radius of a node's donut, in points.
pub fn node_radius(samples: u32) -> f32 {
    (samples as f32).sqrt() * 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::fixtures::{leaf, sex_class_tree};
    use crate::tree::Outcome;

    #[test]
    fn places_root_left_and_leaves_right() {
        let layout = TreeLayout::from_tree(&sex_class_tree());
        assert_eq!(layout.positions.len(), 7);
        assert_eq!(layout.edges.len(), 6);

        assert_eq!(layout.position(0), Some((0.0, 0.5)));
        for leaf in [2, 3, 5, 6] {
            assert_eq!(layout.position(leaf).unwrap().0, 1.0);
        }
        assert_eq!(layout.position(2).unwrap().1, 0.0);
        assert_eq!(layout.position(6).unwrap().1, 1.0);
    }

    #[test]
    fn parents_sit_between_children() {
        let layout = TreeLayout::from_tree(&sex_class_tree());
        let (_, top) = layout.position(2).unwrap();
        let (_, bottom) = layout.position(3).unwrap();
        let (x, mid) = layout.position(1).unwrap();
        assert_eq!(x, 0.5);
        assert!((mid - (top + bottom) * 0.5).abs() < 1e-6);
    }

    #[test]
    fn single_leaf_is_centred() {
        let tree = DecisionTree::new(4, vec![leaf(4, Outcome::Died, 2, 1)]).unwrap();
        let layout = TreeLayout::from_tree(&tree);
        assert_eq!(layout.position(4), Some((0.0, 0.5)));
        assert!(layout.edges.is_empty());
    }

    #[test]
    fn stroke_scale_is_sqrt_between_bounds() {
        assert_eq!(stroke_width(0, 714), MIN_STROKE);
        assert_eq!(stroke_width(714, 714), MAX_STROKE);
        let quarter = stroke_width(714 / 4, 714);
        assert!((quarter - (MIN_STROKE + 0.5 * (MAX_STROKE - MIN_STROKE))).abs() < 0.1);
        assert_eq!(stroke_width(10, 0), MIN_STROKE);
    }

    #[test]
    fn node_radius_grows_with_samples() {
        assert_eq!(node_radius(0), 0.0);
        assert_eq!(node_radius(100), 20.0);
        assert!(node_radius(714) > node_radius(453));
    }
}
