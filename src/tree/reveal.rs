use std::fmt;
use std::str::FromStr;

use super::trace::Path;
use super::NodeId;

/// How much of a traced path is currently shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RevealState {
    /// Nothing highlighted.
    Empty,
    /// Root plus `n` further levels.
    Depth(usize),
    /// The whole path.
    Full,
}

impl fmt::Display for RevealState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RevealState::Empty => f.write_str("empty"),
            RevealState::Depth(n) => write!(f, "depth {n}"),
            RevealState::Full => f.write_str("full"),
        }
    }
}

impl FromStr for RevealState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "empty" | "none" => Ok(RevealState::Empty),
            "full" | "all" => Ok(RevealState::Full),
            other => other
                .parse::<usize>()
                .map(RevealState::Depth)
                .map_err(|_| format!("expected `empty`, `full` or a depth, got `{s}`")),
        }
    }
}

/// Prefix of `path` visible under `state`.
pub fn limit(path: &Path, state: RevealState) -> &[NodeId] {
    let nodes = path.as_slice();
    match state {
        RevealState::Empty => &[],
        RevealState::Depth(n) => &nodes[..n.saturating_add(1).min(nodes.len())],
        RevealState::Full => nodes,
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::tree::fixtures::sex_class_tree;
    use crate::tree::profile::{Profile, Sex};
    use crate::tree::trace::trace;
    use crate::tree::{DecisionTree, Feature, Outcome};

    fn female_first_class() -> Path {
        trace(
            &sex_class_tree(),
            &Profile::passenger(Sex::Female, 1, 30.0, 84.0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn limits_by_depth() {
        let path = female_first_class();
        assert_eq!(limit(&path, RevealState::Depth(0)), &[0]);
        assert_eq!(limit(&path, RevealState::Depth(1)), &[0, 1]);
        assert_eq!(limit(&path, RevealState::Full), &[0, 1, 2]);
        assert!(limit(&path, RevealState::Empty).is_empty());
    }

    #[test]
    fn clamps_past_the_leaf() {
        let path = female_first_class();
        assert_eq!(limit(&path, RevealState::Depth(7)), path.as_slice());
        assert_eq!(limit(&path, RevealState::Depth(usize::MAX)), path.as_slice());
    }

    #[test]
    fn single_node_path_never_errors() {
        let tree = DecisionTree::new(
            0,
            vec![crate::tree::fixtures::leaf(0, Outcome::Died, 1, 0)],
        )
        .unwrap();
        let path = trace(&tree, &Profile::new().with(Feature::Age, 3.0).unwrap()).unwrap();
        for state in [
            RevealState::Empty,
            RevealState::Depth(0),
            RevealState::Depth(3),
            RevealState::Full,
        ] {
            assert!(limit(&path, state).len() <= 1);
        }
    }

    #[test]
    fn parses_cli_values() {
        assert_eq!("full".parse::<RevealState>(), Ok(RevealState::Full));
        assert_eq!("Empty".parse::<RevealState>(), Ok(RevealState::Empty));
        assert_eq!("2".parse::<RevealState>(), Ok(RevealState::Depth(2)));
        assert!("most".parse::<RevealState>().is_err());
    }

    proptest! {
        #[test]
        fn prop_depth_prefixes_are_strictly_monotonic(
            sex in 0u8..=1,
            pclass in 1u8..=3,
        ) {
            let sex = if sex == 0 { Sex::Female } else { Sex::Male };
            let profile = Profile::passenger(sex, pclass, 30.0, 20.0).unwrap();
            let path = trace(&sex_class_tree(), &profile).unwrap();
            for i in 0..path.len() {
                for j in (i + 1)..path.len() {
                    let shorter = limit(&path, RevealState::Depth(i));
                    let longer = limit(&path, RevealState::Depth(j));
                    prop_assert!(shorter.len() < longer.len());
                    prop_assert_eq!(shorter, &longer[..shorter.len()]);
                }
            }
            prop_assert!(limit(&path, RevealState::Empty).is_empty());
            prop_assert_eq!(limit(&path, RevealState::Full), path.as_slice());
        }
    }
}
