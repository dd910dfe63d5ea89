/// End-to-end checks that the reveal script, the limiter and both
/// highlighters agree on the bundled Titanic tree.

#[cfg(test)]
mod tests {
    use crate::io::bundled_tree;
    use crate::tree::diagram::{Marker, TreeDiagram};
    use crate::tree::highlight::{apply_dual_path, apply_single_path, PathStyle};
    use crate::tree::profile::find_preset;
    use crate::tree::reveal::limit;
    use crate::tree::sequencer::{AnimationScript, AnimationSequencer};
    use crate::tree::trace::trace;
    use crate::tree::Outcome;

    #[test]
    fn test_scripted_reveal_grows_one_level_per_step() {
        let tree = bundled_tree().unwrap().tree;
        let mut diagram = TreeDiagram::from_tree(&tree);
        let profile = find_preset("man_path").unwrap().profile();
        let path = trace(&tree, &profile).unwrap();
        assert_eq!(path.as_slice(), &[0, 8, 12, 14]);

        let mut seq = AnimationSequencer::new("test", AnimationScript::default());
        seq.trigger(std::time::Duration::ZERO);
        let mut visible = Vec::new();
        let mut epochs = Vec::new();
        loop {
            apply_single_path(&mut diagram, limit(&path, seq.reveal()), PathStyle::Tutorial)
                .unwrap();
            visible.push(diagram.marked_nodes().count());
            epochs.push(diagram.epoch());
            match seq.next_deadline() {
                Some(due) => {
                    seq.poll(due);
                }
                None => break,
            }
        }

        assert_eq!(visible, vec![0, 2, 3, 4, 4, 4]);
        assert!(epochs.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(diagram.focus(), Some(14));
    }

    #[test]
    fn test_edges_follow_visible_nodes() {
        let tree = bundled_tree().unwrap().tree;
        let mut diagram = TreeDiagram::from_tree(&tree);
        let profile = find_preset("woman_path").unwrap().profile();
        let path = trace(&tree, &profile).unwrap();
        let outcome = tree.leaf_outcome(&path).unwrap();
        assert_eq!(outcome, Outcome::Survived);

        apply_single_path(
            &mut diagram,
            limit(&path, crate::tree::reveal::RevealState::Depth(2)),
            PathStyle::Outcome(outcome),
        )
        .unwrap();
        let edges: Vec<_> = diagram.marked_edges().map(|(child, _)| child).collect();
        assert_eq!(edges, vec![1, 2]);
        assert!(diagram
            .marked_edges()
            .all(|(_, m)| m == Marker::Outcome(Outcome::Survived)));
    }

    #[test]
    fn test_overlapping_presets_render_fully_shared() {
        let tree = bundled_tree().unwrap().tree;
        let mut diagram = TreeDiagram::from_tree(&tree);
        let woman = trace(&tree, &find_preset("woman_path").unwrap().profile()).unwrap();
        let child = trace(&tree, &find_preset("first_class_child").unwrap().profile()).unwrap();

        let partition = apply_dual_path(
            &mut diagram,
            woman.as_slice(),
            child.as_slice(),
            Outcome::Survived,
            Outcome::Survived,
        )
        .unwrap()
        .unwrap();
        assert!(partition.fully_overlapping());
        assert!(diagram.marked_nodes().all(|(_, m)| m == Marker::Shared));
        assert_eq!(diagram.marked_nodes().count(), 4);
    }

    #[test]
    fn test_diverging_presets_split_after_root() {
        let tree = bundled_tree().unwrap().tree;
        let mut diagram = TreeDiagram::from_tree(&tree);
        let woman = trace(&tree, &find_preset("woman_path").unwrap().profile()).unwrap();
        let man = trace(&tree, &find_preset("third_class_male").unwrap().profile()).unwrap();

        let partition = apply_dual_path(
            &mut diagram,
            woman.as_slice(),
            man.as_slice(),
            tree.leaf_outcome(&woman).unwrap(),
            tree.leaf_outcome(&man).unwrap(),
        )
        .unwrap()
        .unwrap();
        assert_eq!(partition.shared.len(), 1);
        assert_eq!(partition.only_a.len(), 3);
        assert_eq!(partition.only_b.len(), 3);
        assert_eq!(
            diagram.edge(14).unwrap().marker,
            Some(Marker::CohortB(Outcome::Died))
        );
        assert_eq!(
            diagram.edge(1).unwrap().marker,
            Some(Marker::CohortA(Outcome::Survived))
        );
    }
}
