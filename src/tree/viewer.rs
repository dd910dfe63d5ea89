use std::time::Duration;

use log::{debug, error};
use thiserror::Error;

use super::diagram::{Diagram, TreeDiagram};
use super::highlight::{
    apply_dual_path, apply_single_path, ComparisonPartition, HighlightError, PathStyle,
};
use super::layout::TreeLayout;
use super::profile::{Cohort, CohortPair, Profile};
use super::reveal::limit;
use super::sequencer::{AnimationScript, AnimationSequencer, RevealFrame, RevealSource};
use super::trace::{path_to_node, trace, Path, TraceError};
use super::{DecisionTree, NodeId, Outcome};
use crate::shap::{ExplanationSource, ShapChart};
use crate::tutorial::Tutorial;

/// What the user asked to see.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Single(Cohort),
    Compare(CohortPair),
}

impl Selection {
    /// Profile whose explanation the SHAP chart shows.
    pub fn primary(&self) -> &Profile {
        match self {
            Selection::Single(cohort) => &cohort.profile,
            Selection::Compare(pair) => &pair.a.profile,
        }
    }
}

#[derive(Debug, Error)]
pub enum DisplayError {
    #[error(transparent)]
    Trace(#[from] TraceError),

    #[error(transparent)]
    Highlight(#[from] HighlightError),

    #[error("path ends at node {0}, which is not a leaf")]
    NotALeaf(NodeId),
}

/// Which producer drove the last applied highlight, and with which frame.
#[derive(Debug, Clone, PartialEq)]
struct Applied {
    source: &'static str,
    frame: RevealFrame,
    generation: u64,
}

/// A sequencer the host can stop listening to. The sequencer itself only
/// knows `trigger`; a superseded producer is muted here instead.
struct Producer {
    sequencer: AnimationSequencer,
    muted: bool,
}

impl Producer {
    fn new(name: &'static str, script: AnimationScript) -> Self {
        Self {
            sequencer: AnimationSequencer::new(name, script),
            muted: true,
        }
    }

    fn trigger(&mut self, now: Duration) {
        self.muted = false;
        self.sequencer.trigger(now);
    }

    fn mute(&mut self) {
        if !self.muted && self.sequencer.is_active() {
            debug!("{} muted at run {}", self.sequencer.source_name(), self.sequencer.run());
        }
        self.muted = true;
    }

    fn poll(&mut self, now: Duration) {
        if !self.muted {
            self.sequencer.poll(now);
        }
    }

    fn next_deadline(&self) -> Option<Duration> {
        if self.muted {
            None
        } else {
            self.sequencer.next_deadline()
        }
    }
}

impl RevealSource for Producer {
    fn source_name(&self) -> &'static str {
        self.sequencer.source_name()
    }

    fn is_active(&self) -> bool {
        !self.muted && self.sequencer.is_active()
    }

    fn frame(&self) -> RevealFrame {
        self.sequencer.frame()
    }
}

/// Owns the tree scene and decides, on every refresh, which reveal producer
/// is in charge of it.
///
/// Priority is tutorial, then user replay, then the initial-load animation,
/// then a static full reveal.
pub struct TreeViewer {
    tree: DecisionTree,
    layout: TreeLayout,
    diagram: TreeDiagram,
    chart: ShapChart,
    explanations: Box<dyn ExplanationSource>,
    selection: Selection,
    generation: u64,
    replay: Producer,
    intro: Producer,
    tutorial: Tutorial,
    applied: Option<Applied>,
    explained: Option<Profile>,
    partition: Option<ComparisonPartition>,
    hovered: Option<NodeId>,
    status: Option<String>,
}

impl TreeViewer {
    pub fn new(
        tree: DecisionTree,
        explanations: Box<dyn ExplanationSource>,
        selection: Selection,
        script: AnimationScript,
    ) -> Self {
        Self {
            layout: TreeLayout::from_tree(&tree),
            diagram: TreeDiagram::from_tree(&tree),
            tree,
            chart: ShapChart::default(),
            explanations,
            selection,
            generation: 0,
            replay: Producer::new("replay", script.clone()),
            intro: Producer::new("intro", script),
            tutorial: Tutorial::new(),
            applied: None,
            explained: None,
            partition: None,
            hovered: None,
            status: None,
        }
    }

    pub fn tree(&self) -> &DecisionTree {
        &self.tree
    }

    pub fn layout(&self) -> &TreeLayout {
        &self.layout
    }

    pub fn diagram(&self) -> &TreeDiagram {
        &self.diagram
    }

    pub fn chart(&self) -> &ShapChart {
        &self.chart
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn tutorial(&self) -> &Tutorial {
        &self.tutorial
    }

    pub fn partition(&self) -> Option<&ComparisonPartition> {
        self.partition.as_ref()
    }

    /// Error text shown instead of a highlight when the path cannot be drawn.
    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    /// Frame of the last applied highlight.
    pub fn current_frame(&self) -> Option<&RevealFrame> {
        self.applied.as_ref().map(|a| &a.frame)
    }

    pub fn is_animating(&self) -> bool {
        self.replay.is_active() || self.intro.is_active()
    }

    /// Earliest pending step deadline, for scheduling the next wake-up.
    pub fn next_deadline(&self) -> Option<Duration> {
        [self.replay.next_deadline(), self.intro.next_deadline()]
            .into_iter()
            .flatten()
            .min()
    }

    pub fn select(&mut self, selection: Selection) {
        if selection != self.selection {
            self.selection = selection;
            self.generation += 1;
        }
    }

    /// Re-run the reveal animation for the current selection. The intro, if
    /// still running, is no longer listened to.
    pub fn replay(&mut self, now: Duration) {
        self.intro.mute();
        self.replay.trigger(now);
    }

    pub fn start_intro(&mut self, now: Duration) {
        self.intro.trigger(now);
    }

    pub fn start_tutorial(&mut self) {
        self.replay.mute();
        self.intro.mute();
        self.tutorial.start();
    }

    pub fn advance_tutorial(&mut self) {
        self.tutorial.advance();
    }

    pub fn skip_tutorial(&mut self) {
        self.tutorial.skip();
    }

    pub fn hover(&mut self, node: Option<NodeId>) {
        if node == self.hovered {
            return;
        }
        self.hovered = node;
        match node.and_then(|id| path_to_node(&self.tree, id)) {
            Some(path) => self.diagram.set_hover_path(&path),
            None => self.diagram.clear_hover(),
        }
    }

    pub fn hovered(&self) -> Option<NodeId> {
        self.hovered
    }

    fn arbitrate(&self) -> (&'static str, RevealFrame) {
        let sources: [&dyn RevealSource; 3] = [&self.tutorial, &self.replay, &self.intro];
        sources
            .into_iter()
            .find(|source| source.is_active())
            .map(|source| (source.source_name(), source.frame()))
            .unwrap_or(("static", RevealFrame::full()))
    }

    /// Advance timers and re-apply the highlight if anything changed.
    /// Returns true when the diagram was rewritten.
    pub fn refresh(&mut self, now: Duration) -> bool {
        self.replay.poll(now);
        self.intro.poll(now);

        let (source, frame) = self.arbitrate();
        let next = Applied {
            source,
            frame,
            generation: self.generation,
        };
        if self.applied.as_ref() == Some(&next) {
            return false;
        }
        if self.applied.as_ref().map(|a| a.source) != Some(source) {
            debug!("reveal source is now {source}");
        }

        self.apply(&next);
        self.applied = Some(next);
        true
    }

    fn apply(&mut self, applied: &Applied) {
        let tutorial = applied.source == "tutorial";
        let selection = if tutorial {
            Selection::Single(Tutorial::passenger())
        } else {
            self.selection.clone()
        };

        if self.explained.as_ref() != Some(selection.primary()) {
            let explanation = self.explanations.explain(selection.primary());
            self.chart.set_explanation(explanation);
            self.explained = Some(selection.primary().clone());
        }
        self.chart.highlight(&applied.frame.features);

        let gold = tutorial || applied.frame.animating;
        match self.highlight(&selection, &applied.frame, gold) {
            Ok(partition) => {
                self.partition = partition;
                self.status = None;
            }
            Err(err) => {
                error!("failed to highlight path: {err}");
                self.diagram.clear_path_markers();
                self.diagram.commit();
                self.partition = None;
                self.status = Some(format!("Unable to display this path: {err}"));
            }
        }
    }

    fn highlight(
        &mut self,
        selection: &Selection,
        frame: &RevealFrame,
        gold: bool,
    ) -> Result<Option<ComparisonPartition>, DisplayError> {
        match selection {
            Selection::Single(cohort) => {
                let (path, outcome) = self.trace_cohort(cohort)?;
                let style = if gold {
                    PathStyle::Tutorial
                } else {
                    PathStyle::Outcome(outcome)
                };
                apply_single_path(&mut self.diagram, limit(&path, frame.reveal), style)?;
                Ok(None)
            }
            Selection::Compare(pair) => {
                let (path_a, outcome_a) = self.trace_cohort(&pair.a)?;
                let (path_b, outcome_b) = self.trace_cohort(&pair.b)?;
                let partition = apply_dual_path(
                    &mut self.diagram,
                    limit(&path_a, frame.reveal),
                    limit(&path_b, frame.reveal),
                    outcome_a,
                    outcome_b,
                )?;
                Ok(partition)
            }
        }
    }

    pub fn trace_cohort(&self, cohort: &Cohort) -> Result<(Path, Outcome), DisplayError> {
        let path = trace(&self.tree, &cohort.profile)?;
        let outcome = self
            .tree
            .leaf_outcome(&path)
            .ok_or(DisplayError::NotALeaf(path.leaf()))?;
        Ok((path, outcome))
    }
}
