use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use eframe::{egui, NativeOptions};
use log::{error, info, warn};

use crate::io::{self, LoadedTree};
use crate::shap::ExplanationTable;
use crate::tree::profile::{find_preset, Cohort, CohortPair, Profile, PRESETS};
use crate::tree::reveal::RevealState;
use crate::tree::sequencer::AnimationScript;
use crate::tree::viewer::{Selection, TreeViewer};
use crate::{gui::RevealTreeGui, ui};

#[derive(Debug, Clone, Parser)]
#[command(
    name = "revealTree",
    about = "Explore how a Titanic decision tree routes passengers, one split at a time."
)]
pub struct AppConfig {
    /// Tree document to load (JSON, as served by the model's /tree endpoint).
    #[arg(value_name = "TREE_FILE")]
    pub tree_path: Option<PathBuf>,

    /// SHAP explanation table to pair with the tree.
    #[arg(long, value_name = "FILE")]
    pub explanations: Option<PathBuf>,

    /// Start from a bundled passenger preset.
    #[arg(long, value_name = "NAME", conflicts_with = "profile")]
    pub preset: Option<String>,

    /// Passenger profile, e.g. `sex=female,pclass=1,age=30,fare=84`.
    #[arg(long, value_name = "SPEC")]
    pub profile: Option<String>,

    /// Second passenger profile; enables comparison mode.
    #[arg(long, value_name = "SPEC")]
    pub compare: Option<String>,

    /// Display label for the first cohort.
    #[arg(long, value_name = "LABEL")]
    pub label_a: Option<String>,

    /// Display label for the second cohort.
    #[arg(long, value_name = "LABEL")]
    pub label_b: Option<String>,

    /// Reveal state for the static headless render: `empty`, `full` or a depth.
    #[arg(long, value_name = "STATE", default_value = "full")]
    pub reveal: RevealState,

    /// Override every animation step duration, in milliseconds.
    #[arg(long, value_name = "MS")]
    pub step_ms: Option<u64>,

    /// Canvas width in pixels
    #[arg(long, default_value_t = 1280)]
    pub width: u32,

    /// Canvas height in pixels
    #[arg(long, default_value_t = 800)]
    pub height: u32,

    /// Run without launching the GUI; print the traced paths instead.
    #[arg(long)]
    pub headless: bool,

    /// Skip the reveal animation on start-up.
    #[arg(long)]
    pub no_intro: bool,

    /// Start the guided tutorial on launch.
    #[arg(long)]
    pub tutorial: bool,
}

/// Everything loaded from the command line, ready to drive a viewer.
pub struct Session {
    pub loaded: LoadedTree,
    pub explanations: ExplanationTable,
    pub selection: Selection,
    pub script: AnimationScript,
}

impl Session {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let loaded = match &config.tree_path {
            Some(path) => io::load_tree(path)?,
            None => {
                info!("Using bundled Titanic tree");
                io::bundled_tree()?
            }
        };
        let explanations = match &config.explanations {
            Some(path) => io::load_explanations(path)?,
            None => io::bundled_explanations()?,
        };
        let script = match config.step_ms {
            Some(ms) => AnimationScript::default()
                .with_step_duration(Duration::from_millis(ms))
                .context("invalid animation script")?,
            None => AnimationScript::default(),
        };
        Ok(Self {
            loaded,
            explanations,
            selection: selection_from_config(config)?,
            script,
        })
    }

    pub fn into_viewer(self) -> TreeViewer {
        TreeViewer::new(
            self.loaded.tree,
            Box::new(self.explanations),
            self.selection,
            self.script,
        )
    }
}

pub fn selection_from_config(config: &AppConfig) -> Result<Selection> {
    let first = match (&config.preset, &config.profile) {
        (Some(key), _) => find_preset(key)
            .map(|preset| preset.cohort())
            .ok_or_else(|| {
                let known: Vec<_> = PRESETS.iter().map(|p| p.key).collect();
                anyhow!("unknown preset `{key}` (expected one of {})", known.join(", "))
            })?,
        (None, Some(text)) => Cohort::described(
            Profile::parse(text).with_context(|| format!("invalid --profile `{text}`"))?,
        ),
        (None, None) => PRESETS[0].cohort(),
    };
    let first = relabel(first, config.label_a.as_deref());

    let Some(text) = &config.compare else {
        return Ok(Selection::Single(first));
    };
    let second = Cohort::described(
        Profile::parse(text).with_context(|| format!("invalid --compare `{text}`"))?,
    );
    Ok(Selection::Compare(CohortPair {
        a: first,
        b: relabel(second, config.label_b.as_deref()),
    }))
}

fn relabel(mut cohort: Cohort, label: Option<&str>) -> Cohort {
    if let Some(label) = label {
        cohort.label = label.to_string();
    }
    cohort
}

#[cfg(target_os = "macos")]
mod macos {
    use std::ffi::c_uint;

    #[link(name = "CoreGraphics", kind = "framework")]
    extern "C" {
        fn CGMainDisplayID() -> c_uint;
        fn CGDisplayPixelsWide(display: c_uint) -> usize;
    }

    pub unsafe fn primary_display_width() -> Option<usize> {
        let id = CGMainDisplayID();
        if id == 0 {
            return None;
        }
        Some(CGDisplayPixelsWide(id))
    }
}

pub struct RevealTreeApp;

impl RevealTreeApp {
    pub fn run(config: &AppConfig) -> Result<()> {
        let session = Session::from_config(config)?;

        if config.headless {
            return Self::run_headless(session, config);
        }
        if !Self::display_available() {
            warn!("GUI requested but no display was detected; falling back to headless mode.");
            return Self::run_headless(session, config);
        }

        let mut native_options = NativeOptions::default();
        info!("Launching egui window ({}x{}).", config.width, config.height);
        native_options.viewport = egui::ViewportBuilder::default()
            .with_title("revealTree")
            .with_inner_size(egui::vec2(config.width as f32, config.height as f32));

        let initial_config = config.clone();
        let result = eframe::run_native(
            "revealTree",
            native_options,
            Box::new(move |cc| Ok(Box::new(RevealTreeGui::new(cc, session, initial_config)))),
        );
        if let Err(err) = result {
            error!("Failed to launch egui window: {}", err);
            warn!("Falling back to headless mode.");
            let session = Session::from_config(config)?;
            return Self::run_headless(session, config)
                .map_err(|headless| anyhow!("{err}; headless fallback failed: {headless}"));
        }
        Ok(())
    }

    fn display_available() -> bool {
        #[cfg(target_os = "macos")]
        {
            unsafe {
                macos::primary_display_width()
                    .map(|width| width > 0)
                    .unwrap_or(false)
            }
        }
        #[cfg(any(
            target_os = "linux",
            target_os = "freebsd",
            target_os = "dragonfly",
            target_os = "netbsd"
        ))]
        {
            std::env::var("DISPLAY").is_ok() || std::env::var("WAYLAND_DISPLAY").is_ok()
        }
        #[cfg(target_os = "windows")]
        {
            true
        }
        #[cfg(not(any(
            target_os = "macos",
            target_os = "linux",
            target_os = "freebsd",
            target_os = "dragonfly",
            target_os = "netbsd",
            target_os = "windows"
        )))]
        {
            false
        }
    }

    fn run_headless(session: Session, config: &AppConfig) -> Result<()> {
        print!("{}", ui::report(session, config));
        Ok(())
    }
}
