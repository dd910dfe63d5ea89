use std::f32::consts::TAU;

use eframe::egui::{
    self, epaint::CubicBezierShape, Align2, Color32, FontId, Pos2, Shape, Stroke,
};

use super::diagram::{ElementState, Marker, TreeDiagram};
use super::layout::{node_radius, TreeLayout};
use super::{DecisionTree, NodeId, Outcome, TreeNode};

/// Opacity of elements that carry no marker.
pub const DIM_OPACITY: f32 = 0.4;
pub const HOVER_OPACITY: f32 = 0.85;
/// Length of the fade-in that follows every committed highlight change.
pub const FADE_SECONDS: f64 = 0.3;
const PULSE_PERIOD: f64 = 1.5;

/// Restarts whenever the diagram reports a new epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct FadeIn {
    epoch: u64,
    started: f64,
}

impl FadeIn {
    /// Fraction of the fade completed at `now`, in `[0, 1]`.
    pub fn progress(&mut self, epoch: u64, now: f64) -> f32 {
        if epoch != self.epoch {
            self.epoch = epoch;
            self.started = now;
        }
        ((now - self.started) / FADE_SECONDS).clamp(0.0, 1.0) as f32
    }

    pub fn is_running(&self, now: f64) -> bool {
        now - self.started < FADE_SECONDS
    }
}

/// Opacity of a marked element `progress` of the way through its fade.
pub fn marked_opacity(progress: f32) -> f32 {
    DIM_OPACITY + (1.0 - DIM_OPACITY) * progress.clamp(0.0, 1.0)
}

/// Scale factor of the pulsing end node.
pub fn pulse_scale(now: f64) -> f32 {
    let phase = (now % PULSE_PERIOD) / PULSE_PERIOD;
    1.0 + 0.05 * (1.0 - (phase as f32 * TAU).cos())
}

#[derive(Debug, Clone)]
pub struct TreePainter {
    pub background_color: Color32,
    pub link_color: Color32,
    pub label_color: Color32,
    pub died_color: Color32,
    pub survived_color: Color32,
    pub died_slice_color: Color32,
    pub survived_slice_color: Color32,
    pub tutorial_color: Color32,
    pub shared_color: Color32,
    pub hover_color: Color32,
    pub font_size: f32,
    pub edge_font_size: f32,
}

impl Default for TreePainter {
    fn default() -> Self {
        Self {
            background_color: Color32::from_rgb(0x0e, 0x11, 0x17),
            link_color: Color32::from_rgb(0x66, 0x66, 0x66),
            label_color: Color32::from_rgb(0xfa, 0xfa, 0xfa),
            died_color: Color32::from_rgb(0xe7, 0x6f, 0x51),
            survived_color: Color32::from_rgb(0x52, 0xb7, 0x88),
            died_slice_color: Color32::from_rgb(0x5b, 0x8d, 0xb8),
            survived_slice_color: Color32::from_rgb(0x52, 0xb7, 0x88),
            tutorial_color: Color32::from_rgb(0xff, 0xd7, 0x00),
            shared_color: Color32::from_rgb(0xc9, 0xb8, 0xff),
            hover_color: Color32::from_rgb(0xff, 0xd7, 0x00),
            font_size: 12.0,
            edge_font_size: 11.0,
        }
    }
}

/// Everything one frame of the tree canvas needs.
pub struct Canvas<'a> {
    pub tree: &'a DecisionTree,
    pub layout: &'a TreeLayout,
    pub diagram: &'a TreeDiagram,
    pub inner: egui::Rect,
    /// Fade progress of the current epoch.
    pub progress: f32,
    pub time: f64,
    pub pointer: Option<Pos2>,
}

impl TreePainter {
    pub fn outcome_color(&self, outcome: Outcome) -> Color32 {
        match outcome {
            Outcome::Died => self.died_color,
            Outcome::Survived => self.survived_color,
        }
    }

    pub fn marker_color(&self, marker: Marker) -> Color32 {
        match marker {
            Marker::Outcome(outcome) | Marker::CohortA(outcome) | Marker::CohortB(outcome) => {
                self.outcome_color(outcome)
            }
            Marker::Tutorial => self.tutorial_color,
            Marker::Shared => self.shared_color,
        }
    }

    pub fn to_screen(layout_pos: (f32, f32), inner: egui::Rect) -> Pos2 {
        egui::pos2(
            inner.left() + layout_pos.0 * inner.width(),
            inner.top() + layout_pos.1 * inner.height(),
        )
    }

    /// Node whose donut lies under `pointer`.
    pub fn hit_test(&self, canvas: &Canvas<'_>) -> Option<NodeId> {
        let pointer = canvas.pointer?;
        canvas
            .tree
            .nodes()
            .iter()
            .filter_map(|node| {
                let pos = Self::to_screen(canvas.layout.position(node.id())?, canvas.inner);
                let radius = node_radius(node.samples().total()).max(6.0);
                let distance = pos.distance(pointer);
                (distance <= radius).then_some((node.id(), distance))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }

    pub fn paint(&self, painter: &egui::Painter, canvas: &Canvas<'_>) {
        painter.rect_filled(painter.clip_rect(), 0.0, self.background_color);
        for &(parent, child) in &canvas.layout.edges {
            self.paint_link(painter, canvas, parent, child);
        }
        for &(parent, child) in &canvas.layout.edges {
            self.paint_edge_label(painter, canvas, parent, child);
        }
        for node in canvas.tree.nodes() {
            self.paint_node(painter, canvas, node);
        }
    }

    fn element_color(&self, state: &ElementState, base: Color32, progress: f32) -> Color32 {
        match state.marker {
            Some(marker) => self.marker_color(marker).gamma_multiply(marked_opacity(progress)),
            None if state.hovered => self.hover_color.gamma_multiply(HOVER_OPACITY),
            None => base.gamma_multiply(DIM_OPACITY),
        }
    }

    fn paint_link(
        &self,
        painter: &egui::Painter,
        canvas: &Canvas<'_>,
        parent: NodeId,
        child: NodeId,
    ) {
        let (Some(from), Some(to)) = (canvas.layout.position(parent), canvas.layout.position(child))
        else {
            return;
        };
        let from = Self::to_screen(from, canvas.inner);
        let to = Self::to_screen(to, canvas.inner);
        let state = canvas.diagram.edge(child).copied().unwrap_or_default();
        let samples = canvas
            .tree
            .node(child)
            .map(|n| n.samples().total())
            .unwrap_or(0);

        let mut width = canvas.layout.stroke_width(samples);
        if state.marker == Some(Marker::Tutorial) {
            width = width.max(8.0);
        }
        let color = self.element_color(&state, self.link_color, canvas.progress);
        let stroke = Stroke::new(width, color);

        let mid_x = (from.x + to.x) * 0.5;
        let bezier = CubicBezierShape::from_points_stroke(
            [from, egui::pos2(mid_x, from.y), egui::pos2(mid_x, to.y), to],
            false,
            Color32::TRANSPARENT,
            stroke,
        );

        if matches!(state.marker, Some(Marker::CohortB(_))) {
            let points = bezier.flatten(Some(0.5));
            let dash = (width * 1.5).max(6.0);
            painter.extend(Shape::dashed_line(&points, stroke, dash, dash));
        } else {
            painter.add(bezier);
        }
    }

    fn paint_edge_label(
        &self,
        painter: &egui::Painter,
        canvas: &Canvas<'_>,
        parent: NodeId,
        child: NodeId,
    ) {
        let Some(label) = canvas.tree.node(parent).and_then(|n| n.edge_label(child)) else {
            return;
        };
        let (Some(from), Some(to)) = (canvas.layout.position(parent), canvas.layout.position(child))
        else {
            return;
        };
        let from = Self::to_screen(from, canvas.inner);
        let to = Self::to_screen(to, canvas.inner);
        let state = canvas.diagram.edge(child).copied().unwrap_or_default();

        let above = to.y < from.y;
        let mut pos = egui::pos2((from.x + to.x) * 0.5 + 15.0, (from.y + to.y) * 0.5);
        pos.y += if above { -5.0 } else { 12.0 };
        if state.hovered && state.marker.is_none() {
            pos.y -= 16.0;
        }

        let color = match state.marker {
            Some(Marker::Tutorial) => self.tutorial_color,
            Some(_) => self.label_color.gamma_multiply(marked_opacity(canvas.progress)),
            None => self.element_color(&state, self.label_color, canvas.progress),
        };
        painter.text(
            pos,
            Align2::CENTER_BOTTOM,
            label,
            FontId::proportional(self.edge_font_size),
            color,
        );
    }

    fn paint_node(&self, painter: &egui::Painter, canvas: &Canvas<'_>, node: &TreeNode) {
        let Some(pos) = canvas.layout.position(node.id()) else {
            return;
        };
        let center = Self::to_screen(pos, canvas.inner);
        let state = canvas.diagram.node(node.id()).copied().unwrap_or_default();
        let samples = node.samples();
        let mut radius = node_radius(samples.total());
        if canvas.diagram.focus() == Some(node.id()) {
            radius *= pulse_scale(canvas.time);
        }

        let opacity = match state.marker {
            Some(_) => marked_opacity(canvas.progress),
            None if state.hovered => HOVER_OPACITY,
            None => DIM_OPACITY,
        };

        // Donut: died slice first, then survived, clockwise from 12 o'clock.
        let total = samples.total().max(1) as f32;
        let died_sweep = samples.died as f32 / total * TAU;
        let ring = Stroke::new(radius * 0.5, self.died_slice_color.gamma_multiply(opacity));
        paint_arc(painter, center, radius * 0.75, 0.0, died_sweep, ring);
        let ring = Stroke::new(radius * 0.5, self.survived_slice_color.gamma_multiply(opacity));
        paint_arc(painter, center, radius * 0.75, died_sweep, TAU, ring);

        if let Some(marker) = state.marker {
            let glow = self.marker_color(marker).gamma_multiply(opacity);
            painter.circle_stroke(center, radius + 2.0, Stroke::new(2.0, glow));
        } else if state.hovered {
            painter.circle_stroke(
                center,
                radius + 2.0,
                Stroke::new(1.5, self.hover_color.gamma_multiply(HOVER_OPACITY)),
            );
        }

        let text_color = match state.marker {
            Some(Marker::Tutorial) => self.tutorial_color,
            Some(_) => self.label_color,
            None if state.hovered => self.hover_color.gamma_multiply(HOVER_OPACITY),
            None => self.label_color.gamma_multiply(DIM_OPACITY),
        };
        let (anchor, offset) = if node.is_leaf() {
            (Align2::LEFT_CENTER, egui::vec2(radius + 10.0, 0.0))
        } else {
            (Align2::CENTER_TOP, egui::vec2(0.0, radius + 6.0))
        };
        painter.text(
            center + offset,
            anchor,
            node.caption(),
            FontId::proportional(self.font_size),
            text_color,
        );
    }
}

fn paint_arc(
    painter: &egui::Painter,
    center: Pos2,
    radius: f32,
    from: f32,
    to: f32,
    stroke: Stroke,
) {
    if to - from <= f32::EPSILON || radius <= 0.0 {
        return;
    }
    let segments = (((to - from) / TAU) * 48.0).ceil().max(2.0) as usize;
    let points: Vec<Pos2> = (0..=segments)
        .map(|i| {
            let angle = from + (to - from) * i as f32 / segments as f32 - TAU / 4.0;
            center + radius * egui::vec2(angle.cos(), angle.sin())
        })
        .collect();
    painter.add(Shape::line(points, stroke));
}

/// Hover tooltip body for a node.
pub fn tooltip_lines(node: &TreeNode) -> Vec<String> {
    let samples = node.samples();
    let rate = match node {
        TreeNode::Leaf { survival_rate, .. } => *survival_rate,
        TreeNode::Internal { .. } => samples.survival_rate(),
    };
    vec![
        node.split_rule(),
        format!("Samples: {}", samples.total()),
        format!("Died: {} | Survived: {}", samples.died, samples.survived),
        format!("Survival Rate: {:.1}%", rate * 100.0),
    ]
}
