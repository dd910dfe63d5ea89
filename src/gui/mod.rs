use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Result;
use eframe::egui::{self, Color32};
use log::{error, info};
use rfd::FileDialog;

use crate::app::{AppConfig, Session};
use crate::io::{self, ModelMetrics};
use crate::shap::{ExplanationTable, ShapExplanation};
use crate::tree::painter::{
    marked_opacity, tooltip_lines, Canvas, FadeIn, TreePainter, DIM_OPACITY,
};
use crate::tree::profile::{
    class_average_fare, Cohort, CohortPair, InvalidValue, Profile, Sex, PRESETS,
};
use crate::tree::sequencer::AnimationScript;
use crate::tree::viewer::{Selection, TreeViewer};

/// Repaint interval while the focus node pulses.
const PULSE_FRAME: Duration = Duration::from_millis(33);

/// Editable copy of one passenger profile.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ProfileForm {
    sex: Sex,
    pclass: u8,
    age: f64,
    fare: f64,
}

impl ProfileForm {
    fn from_profile(profile: &Profile) -> Self {
        let pclass = profile
            .get(crate::tree::Feature::Pclass)
            .map(|v| v.round().clamp(1.0, 3.0) as u8)
            .unwrap_or(3);
        Self {
            sex: profile
                .get(crate::tree::Feature::Sex)
                .and_then(Sex::from_encoded)
                .unwrap_or(Sex::Female),
            pclass,
            age: profile.get(crate::tree::Feature::Age).unwrap_or(30.0),
            fare: profile
                .get(crate::tree::Feature::Fare)
                .unwrap_or_else(|| class_average_fare(pclass)),
        }
    }

    fn profile(&self) -> Result<Profile, InvalidValue> {
        Profile::passenger(self.sex, self.pclass, self.age, self.fare)
    }

    fn ui(&mut self, ui: &mut egui::Ui, id: &str) {
        egui::ComboBox::from_id_salt(format!("{id}_sex"))
            .selected_text(match self.sex {
                Sex::Female => "Female",
                Sex::Male => "Male",
            })
            .show_ui(ui, |ui| {
                ui.selectable_value(&mut self.sex, Sex::Female, "Female");
                ui.selectable_value(&mut self.sex, Sex::Male, "Male");
            });
        let previous_class = self.pclass;
        ui.add(egui::Slider::new(&mut self.pclass, 1..=3).text("Class"));
        if self.pclass != previous_class {
            self.fare = class_average_fare(self.pclass);
        }
        ui.add(egui::Slider::new(&mut self.age, 0.0..=80.0).text("Age"));
        ui.add(egui::Slider::new(&mut self.fare, 0.0..=512.0).text("Fare (£)"));
    }
}

pub struct RevealTreeGui {
    config: AppConfig,
    viewer: TreeViewer,
    metrics: Option<ModelMetrics>,
    script: AnimationScript,
    tree_painter: TreePainter,
    fade: FadeIn,
    shap_fade: FadeIn,
    started: Instant,
    form_a: ProfileForm,
    form_b: ProfileForm,
    compare: bool,
    label_a: String,
    label_b: String,
    status: String,
    last_error: Option<String>,
}

impl RevealTreeGui {
    pub fn new(_cc: &eframe::CreationContext<'_>, session: Session, config: AppConfig) -> Self {
        let metrics = session.loaded.metrics;
        let script = session.script.clone();
        let (form_a, form_b, compare, label_a, label_b) = match &session.selection {
            Selection::Single(cohort) => {
                let form = ProfileForm::from_profile(&cohort.profile);
                (form, form, false, cohort.label.clone(), String::from("Cohort B"))
            }
            Selection::Compare(pair) => (
                ProfileForm::from_profile(&pair.a.profile),
                ProfileForm::from_profile(&pair.b.profile),
                true,
                pair.a.label.clone(),
                pair.b.label.clone(),
            ),
        };
        let status = format!(
            "Loaded decision tree with {} nodes.",
            session.loaded.tree.len()
        );

        let mut viewer = session.into_viewer();
        if !config.no_intro {
            viewer.start_intro(Duration::ZERO);
        }
        if config.tutorial && viewer.tutorial().should_auto_start() {
            viewer.start_tutorial();
        }

        Self {
            config,
            viewer,
            metrics,
            script,
            tree_painter: TreePainter::default(),
            fade: FadeIn::default(),
            shap_fade: FadeIn::default(),
            started: Instant::now(),
            form_a,
            form_b,
            compare,
            label_a,
            label_b,
            status,
            last_error: None,
        }
    }

    fn now(&self) -> Duration {
        self.started.elapsed()
    }

    fn select_preset(&mut self, index: usize) {
        let Some(preset) = PRESETS.get(index) else {
            return;
        };
        self.form_a = ProfileForm::from_profile(&preset.profile());
        self.label_a = preset.label.to_string();
        self.compare = false;
        let now = self.now();
        self.viewer.select(Selection::Single(preset.cohort()));
        self.viewer.replay(now);
        self.status = format!("Showing {}.", preset.label);
    }

    fn apply_forms(&mut self) {
        let (profile_a, profile_b) = match (self.form_a.profile(), self.form_b.profile()) {
            (Ok(a), Ok(b)) => (a, b),
            (Err(err), _) | (_, Err(err)) => {
                self.last_error = Some(err.to_string());
                return;
            }
        };
        self.last_error = None;
        let a = Cohort::new(self.label_a.clone(), profile_a);
        let selection = if self.compare {
            Selection::Compare(CohortPair {
                a,
                b: Cohort::new(self.label_b.clone(), profile_b),
            })
        } else {
            Selection::Single(a)
        };
        let now = self.now();
        self.viewer.select(selection);
        self.viewer.replay(now);
    }

    fn reload_explanations(&self) -> Result<ExplanationTable> {
        match &self.config.explanations {
            Some(path) => io::load_explanations(path),
            None => io::bundled_explanations(),
        }
    }

    fn load_from_path(&mut self, path: PathBuf) -> Result<()> {
        let loaded = io::load_tree(&path)?;
        let explanations = self.reload_explanations()?;
        info!("Loaded tree file {}", path.display());
        self.status = format!(
            "Loaded {} with {} nodes.",
            path.display(),
            loaded.tree.len()
        );
        self.metrics = loaded.metrics;
        self.last_error = None;
        self.viewer = TreeViewer::new(
            loaded.tree,
            Box::new(explanations),
            self.viewer.selection().clone(),
            self.script.clone(),
        );
        let now = self.now();
        self.viewer.replay(now);
        self.config.tree_path = Some(path);
        Ok(())
    }

    fn open_file_dialog(&mut self) {
        if let Some(path) = FileDialog::new()
            .add_filter("Decision tree", &["json"])
            .pick_file()
        {
            if let Err(err) = self.load_from_path(path) {
                error!("Failed to load tree file: {err:#}");
                self.status = String::from("Failed to load tree file.");
                self.last_error = Some(format!("{err:#}"));
            }
        }
    }

    fn draw_controls(&mut self, ui: &mut egui::Ui) {
        ui.heading("Passengers");
        for (index, preset) in PRESETS.iter().enumerate() {
            if ui.button(preset.label).clicked() {
                self.select_preset(index);
            }
        }

        ui.separator();
        ui.checkbox(&mut self.compare, "Compare two passengers");
        ui.collapsing("Cohort A", |ui| {
            ui.text_edit_singleline(&mut self.label_a);
            self.form_a.ui(ui, "cohort_a");
        });
        if self.compare {
            ui.collapsing("Cohort B", |ui| {
                ui.text_edit_singleline(&mut self.label_b);
                self.form_b.ui(ui, "cohort_b");
            });
        }
        ui.horizontal(|ui| {
            if ui.button("Apply").clicked() {
                self.apply_forms();
            }
            if ui.button("Replay").clicked() {
                let now = self.now();
                self.viewer.replay(now);
            }
        });

        ui.separator();
        self.draw_tutorial(ui);
    }

    fn draw_tutorial(&mut self, ui: &mut egui::Ui) {
        match self.viewer.tutorial().current() {
            Some(step) => {
                ui.label(egui::RichText::new(self.viewer.tutorial().progress_label()).strong());
                ui.label(step.message);
                ui.horizontal(|ui| {
                    if ui.button(step.button_text).clicked() {
                        self.viewer.advance_tutorial();
                    }
                    if ui.button("Skip").clicked() {
                        self.viewer.skip_tutorial();
                    }
                });
            }
            None => {
                if ui.button("Start tutorial").clicked() {
                    self.viewer.start_tutorial();
                }
            }
        }
        if !self.viewer.tutorial().transcript().is_empty() {
            ui.collapsing("Tutorial history", |ui| {
                for line in self.viewer.tutorial().transcript() {
                    ui.label(line.as_str());
                }
            });
        }
    }

    fn draw_shap_panel(&mut self, ui: &mut egui::Ui) {
        ui.heading("SHAP contributions");
        let time = ui.input(|i| i.time);
        let progress = self.shap_fade.progress(self.viewer.chart().epoch(), time);
        let chart = self.viewer.chart();
        let Some(explanation) = chart.explanation() else {
            ui.label("No explanation available for this passenger.");
            return;
        };
        ui.label(format!(
            "Base {:.3} → prediction {:.3}",
            explanation.base_value,
            explanation.final_prediction()
        ));
        self.draw_shap_bars(ui, explanation, |feature| {
            bar_opacity(chart.is_highlighted(feature), progress)
        });
    }

    fn draw_shap_bars(
        &self,
        ui: &mut egui::Ui,
        explanation: &ShapExplanation,
        opacity: impl Fn(crate::tree::Feature) -> f32,
    ) {
        let rows = explanation.waterfall();
        let scale = rows
            .iter()
            .map(|row| row.value.abs())
            .fold(0.0_f64, f64::max)
            .max(1e-6);
        let width = ui.available_width().max(120.0);
        for row in rows {
            let (rect, _) =
                ui.allocate_exact_size(egui::vec2(width, 22.0), egui::Sense::hover());
            let painter = ui.painter_at(rect);
            let label_width = 60.0;
            let center = rect.left() + label_width + (width - label_width) / 2.0;
            let half = (width - label_width) / 2.0 - 4.0;
            let extent = (row.value / scale) as f32 * half;
            let bar = egui::Rect::from_two_pos(
                egui::pos2(center, rect.top() + 4.0),
                egui::pos2(center + extent, rect.bottom() - 4.0),
            );
            let base = if row.value >= 0.0 {
                self.tree_painter.survived_color
            } else {
                self.tree_painter.died_color
            };
            painter.rect_filled(bar, 2.0, base.gamma_multiply(opacity(row.feature)));
            painter.text(
                egui::pos2(rect.left(), rect.center().y),
                egui::Align2::LEFT_CENTER,
                row.feature.name(),
                egui::FontId::proportional(13.0),
                ui.visuals().text_color(),
            );
            painter.text(
                egui::pos2(center + extent, rect.center().y),
                if row.value >= 0.0 {
                    egui::Align2::LEFT_CENTER
                } else {
                    egui::Align2::RIGHT_CENTER
                },
                format!("{:+.3}", row.value),
                egui::FontId::monospace(11.0),
                ui.visuals().weak_text_color(),
            );
        }
    }

    fn draw_tree_canvas(&mut self, ui: &mut egui::Ui) {
        let size = ui.available_size();
        let (response, painter) = ui.allocate_painter(size, egui::Sense::hover());
        let rect = response.rect;
        let margin = egui::vec2(
            (rect.width() * 0.08).clamp(40.0, 120.0),
            (rect.height() * 0.06).clamp(24.0, 60.0),
        );
        let inner = {
            let candidate = rect.shrink2(margin);
            if candidate.is_positive() {
                candidate
            } else {
                rect
            }
        };
        let time = ui.input(|i| i.time);
        let progress = self.fade.progress(self.viewer.diagram().epoch(), time);

        let hit = {
            let canvas = Canvas {
                tree: self.viewer.tree(),
                layout: self.viewer.layout(),
                diagram: self.viewer.diagram(),
                inner,
                progress,
                time,
                pointer: response.hover_pos(),
            };
            self.tree_painter.paint(&painter, &canvas);
            self.tree_painter.hit_test(&canvas)
        };

        if hit != self.viewer.hovered() {
            self.viewer.hover(hit);
            ui.ctx().request_repaint();
        }
        if let Some(node) = hit.and_then(|id| self.viewer.tree().node(id)) {
            let lines = tooltip_lines(node);
            response.on_hover_ui_at_pointer(|ui| {
                for line in lines {
                    ui.label(line);
                }
            });
        }
    }

    fn draw_status(&self, ui: &mut egui::Ui) {
        ui.horizontal_wrapped(|ui| {
            if let Some(message) = self.viewer.status() {
                ui.colored_label(Color32::from_rgb(0xe7, 0x6f, 0x51), message);
            } else if let Some(partition) = self.viewer.partition() {
                legend(ui, self.tree_painter.shared_color, "Shared");
                for (color, label) in cohort_legend(&self.viewer, &self.tree_painter) {
                    legend(ui, color, &label);
                }
                if partition.fully_overlapping() {
                    ui.label("Both cohorts reach the same leaf.");
                } else {
                    ui.label(format!(
                        "{} shared, {} only A, {} only B",
                        partition.shared.len(),
                        partition.only_a.len(),
                        partition.only_b.len()
                    ));
                }
            } else {
                legend(ui, self.tree_painter.survived_color, "Survived");
                legend(ui, self.tree_painter.died_color, "Died");
                if self.viewer.is_animating() || self.viewer.tutorial().current().is_some() {
                    legend(ui, self.tree_painter.tutorial_color, "Revealing");
                }
            }
            ui.separator();
            ui.label(self.status.as_str());
            if let Some(err) = &self.last_error {
                ui.colored_label(Color32::RED, err.as_str());
            }
        });
    }

    fn schedule_repaint(&self, ctx: &egui::Context, now: Duration) {
        let time = ctx.input(|i| i.time);
        if self.fade.is_running(time) || self.shap_fade.is_running(time) {
            ctx.request_repaint();
            return;
        }
        let mut wait = self
            .viewer
            .next_deadline()
            .map(|due| due.saturating_sub(now));
        if self.viewer.diagram().focus().is_some() {
            wait = Some(wait.map_or(PULSE_FRAME, |w| w.min(PULSE_FRAME)));
        }
        if let Some(wait) = wait {
            ctx.request_repaint_after(wait);
        }
    }
}

/// Highlighted bars fade in with the chart's epoch; the rest stay dimmed.
fn bar_opacity(highlighted: bool, progress: f32) -> f32 {
    if highlighted {
        marked_opacity(progress)
    } else {
        DIM_OPACITY
    }
}

/// One legend entry per compared cohort, coloured by the leaf its path
/// reaches, matching the tail markers on the canvas.
fn cohort_legend(viewer: &TreeViewer, painter: &TreePainter) -> Vec<(Color32, String)> {
    let Selection::Compare(pair) = viewer.selection() else {
        return Vec::new();
    };
    [(&pair.a, ""), (&pair.b, " (dashed)")]
        .into_iter()
        .filter_map(|(cohort, suffix)| {
            let (_, outcome) = viewer.trace_cohort(cohort).ok()?;
            Some((
                painter.outcome_color(outcome),
                format!("{}{} → {}", cohort.label, suffix, outcome.label()),
            ))
        })
        .collect()
}

fn legend(ui: &mut egui::Ui, color: Color32, text: &str) {
    let (rect, _) = ui.allocate_exact_size(egui::vec2(12.0, 12.0), egui::Sense::hover());
    ui.painter().rect_filled(rect, 2.0, color);
    ui.label(text);
}

fn metrics_line(metrics: &ModelMetrics) -> String {
    format!(
        "Accuracy {:.1}%  Precision {:.1}%  Recall {:.1}%  F1 {:.3}",
        metrics.accuracy * 100.0,
        metrics.precision * 100.0,
        metrics.recall * 100.0,
        metrics.f1_score
    )
}

impl eframe::App for RevealTreeGui {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let now = self.now();
        if self.viewer.refresh(now) {
            ctx.request_repaint();
        }

        egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
            egui::MenuBar::new().ui(ui, |ui| {
                ui.menu_button("File", |ui| {
                    if ui.button("Open tree…").clicked() {
                        self.open_file_dialog();
                        ui.close();
                    }
                    if ui.button("Quit").clicked() {
                        ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                    }
                });
                ui.separator();
                ui.strong("Titanic decision tree");
                if let Some(metrics) = &self.metrics {
                    ui.separator();
                    ui.label(metrics_line(metrics));
                }
            });
        });

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| self.draw_status(ui));

        egui::SidePanel::left("controls")
            .resizable(true)
            .default_width(260.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| self.draw_controls(ui));
            });

        egui::SidePanel::right("shap")
            .resizable(true)
            .default_width(280.0)
            .show(ctx, |ui| self.draw_shap_panel(ui));

        egui::CentralPanel::default()
            .frame(egui::Frame::new().fill(self.tree_painter.background_color))
            .show(ctx, |ui| self.draw_tree_canvas(ui));

        self.schedule_repaint(ctx, now);
    }
}
