use std::fmt::{self, Write};
use std::time::Duration;

use crate::app::{AppConfig, Session};
use crate::shap::{ExplanationSource, ShapExplanation};
use crate::tree::profile::Cohort;
use crate::tree::reveal::limit;
use crate::tree::viewer::{Selection, TreeViewer};
use crate::tree::{DecisionTree, NodeId, TreeNode};

/// Text rendition of what the GUI would show: traced paths, the static
/// reveal, the comparison partition and a simulated run of the script.
pub fn report(session: Session, config: &AppConfig) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    write_report(&mut out, session, config).ok();
    out
}

fn write_report(out: &mut String, session: Session, config: &AppConfig) -> fmt::Result {
    let tree = &session.loaded.tree;

    write!(
        out,
        "Loaded decision tree with {} nodes (depth {}).",
        tree.len(),
        tree.depth()
    )?;
    if let Some(metrics) = session.loaded.metrics {
        write!(
            out,
            " Accuracy {:.1}%, recall {:.1}%.",
            metrics.accuracy * 100.0,
            metrics.recall * 100.0
        )?;
    }
    out.push('\n');

    let cohorts: Vec<&Cohort> = match &session.selection {
        Selection::Single(cohort) => vec![cohort],
        Selection::Compare(pair) => vec![&pair.a, &pair.b],
    };
    for cohort in &cohorts {
        describe_cohort(out, tree, cohort, config)?;
        match session.explanations.explain(&cohort.profile) {
            Some(explanation) => describe_explanation(out, &explanation)?,
            None => writeln!(out, "  SHAP: no explanation available")?,
        }
    }

    let mut viewer = session.into_viewer();
    viewer.refresh(Duration::ZERO);
    if let Some(partition) = viewer.partition() {
        writeln!(
            out,
            "Comparison: shared {:?}, only A {:?}, only B {:?}",
            partition.shared, partition.only_a, partition.only_b
        )?;
        if partition.fully_overlapping() {
            writeln!(out, "  both cohorts reach the same leaf")?;
        }
    }

    simulate(out, &mut viewer)
}

fn describe_cohort(
    out: &mut String,
    tree: &DecisionTree,
    cohort: &Cohort,
    config: &AppConfig,
) -> fmt::Result {
    writeln!(out, "{}: {}", cohort.label, cohort.profile.describe())?;
    let path = match crate::tree::trace::trace(tree, &cohort.profile) {
        Ok(path) => path,
        Err(err) => return writeln!(out, "  Unable to display this path: {err}"),
    };
    writeln!(out, "  Path: {}", format_path(tree, path.as_slice()))?;
    if let Some(TreeNode::Leaf {
        outcome,
        survival_rate,
        ..
    }) = tree.node(path.leaf())
    {
        writeln!(
            out,
            "  Outcome: {} ({:.1}% survival)",
            outcome.label(),
            survival_rate * 100.0
        )?;
    }
    let visible = limit(&path, config.reveal);
    writeln!(
        out,
        "  Reveal ({}): {}",
        config.reveal,
        format_path(tree, visible)
    )
}

fn describe_explanation(out: &mut String, explanation: &ShapExplanation) -> fmt::Result {
    writeln!(
        out,
        "  SHAP: base {:.3} -> prediction {:.3}",
        explanation.base_value,
        explanation.final_prediction()
    )?;
    for row in explanation.waterfall() {
        writeln!(out, "    {:<7} {:+.3}", row.feature.name(), row.value)?;
    }
    Ok(())
}

/// Drive the replay sequencer on a virtual clock and list every frame.
fn simulate(out: &mut String, viewer: &mut TreeViewer) -> fmt::Result {
    writeln!(out, "Animation:")?;
    let mut now = Duration::ZERO;
    viewer.replay(now);
    loop {
        viewer.refresh(now);
        if let Some(frame) = viewer.current_frame() {
            let features: Vec<&str> = frame.features.iter().map(|f| f.name()).collect();
            let mut marked: Vec<NodeId> =
                viewer.diagram().marked_nodes().map(|(id, _)| id).collect();
            marked.sort_unstable();
            writeln!(
                out,
                "  {:>6} ms  {:<8} [{}] nodes {:?}",
                now.as_millis(),
                frame.reveal.to_string(),
                features.join(", "),
                marked
            )?;
        }
        if let Some(status) = viewer.status() {
            writeln!(out, "  {status}")?;
        }
        match viewer.next_deadline() {
            Some(due) => now = due,
            None => return Ok(()),
        }
    }
}

fn format_path(tree: &DecisionTree, ids: &[NodeId]) -> String {
    if ids.is_empty() {
        return "-".to_string();
    }
    ids.iter()
        .map(|id| match tree.node(*id) {
            Some(node) => format!("{} ({})", id, node.caption()),
            None => id.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" → ")
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    fn run(args: &[&str]) -> String {
        let config =
            AppConfig::try_parse_from(std::iter::once("revealtree").chain(args.iter().copied()))
                .unwrap();
        let session = Session::from_config(&config).unwrap();
        report(session, &config)
    }

    #[test]
    fn reports_single_path_and_animation() {
        let text = run(&["--preset", "man_path", "--reveal", "1"]);
        assert!(text.contains("Loaded decision tree with 15 nodes (depth 3)."));
        assert!(text.contains("Outcome: Died"));
        assert!(text.contains("Reveal (depth 1): 0 (sex) → 8 (age)"));
        assert!(text.contains("SHAP: base -0.470"));
        assert!(text.contains("     0 ms  empty    [] nodes []"));
        assert!(text.contains("nodes [0, 8, 12, 14]"));
    }

    #[test]
    fn reports_overlapping_comparison() {
        let text = run(&[
            "--preset",
            "woman_path",
            "--compare",
            "sex=female,pclass=1,age=5,fare=84",
        ]);
        assert!(text.contains("both cohorts reach the same leaf"));
    }

    #[test]
    fn reports_untraceable_profile() {
        let text = run(&["--profile", "sex=male"]);
        assert!(text.contains("Unable to display this path"));
        assert!(text.contains("SHAP: no explanation available"));
    }
}
