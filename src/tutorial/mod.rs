//! Three-step guided tour over the tutorial passenger's path.

use log::info;

use crate::tree::profile::{Cohort, TUTORIAL_PASSENGER};
use crate::tree::reveal::RevealState;
use crate::tree::sequencer::{RevealFrame, RevealSource};
use crate::tree::Feature;

pub struct TutorialStep {
    pub message: &'static str,
    pub button_text: &'static str,
    pub reveal: RevealState,
    pub features: &'static [Feature],
}

pub static STEPS: [TutorialStep; 3] = [
    TutorialStep {
        message: "👋 Welcome to the Explainable AI Explorer! Let me show you how these models make \
                  predictions. We'll explore a 30-year-old woman in 1st class.",
        button_text: "Next",
        reveal: RevealState::Empty,
        features: &[],
    },
    TutorialStep {
        message: "First, the decision tree splits on sex. Women had a 74% survival rate, while men \
                  had only 19%. Our passenger goes down the left (female) path.",
        button_text: "Next",
        reveal: RevealState::Depth(1),
        features: &[Feature::Sex],
    },
    TutorialStep {
        message: "Following this path leads to a 96% survival probability for women in 1st class. \
                  Now try exploring other passengers using the preset buttons or the profile \
                  controls!",
        button_text: "Finish Tutorial",
        reveal: RevealState::Full,
        features: &Feature::ALL,
    },
];

const SKIPPED: &str = "Tutorial skipped. Feel free to explore on your own using the preset \
                       buttons or the profile controls!";
const FINISHED: &str = "Tutorial complete! You're ready to explore. Try the preset buttons or \
                        compare two passengers.";

#[derive(Debug, Default)]
pub struct Tutorial {
    active: bool,
    step: usize,
    seen: bool,
    /// Bumped on every step change so the host re-applies even when two
    /// steps happen to reveal the same prefix.
    run: u64,
    transcript: Vec<String>,
}

impl Tutorial {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn passenger() -> Cohort {
        TUTORIAL_PASSENGER.cohort()
    }

    pub fn should_auto_start(&self) -> bool {
        !self.seen && !self.active
    }

    pub fn start(&mut self) {
        self.active = true;
        self.seen = true;
        self.step = 0;
        self.run += 1;
        self.transcript.push(STEPS[0].message.to_string());
        info!("tutorial started");
    }

    pub fn advance(&mut self) {
        if !self.active {
            return;
        }
        if self.step + 1 < STEPS.len() {
            self.step += 1;
            self.run += 1;
            self.transcript.push(STEPS[self.step].message.to_string());
        } else {
            self.active = false;
            self.transcript.push(FINISHED.to_string());
            info!("tutorial finished");
        }
    }

    pub fn skip(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        self.seen = true;
        self.transcript.push(SKIPPED.to_string());
        info!("tutorial skipped at step {}", self.step + 1);
    }

    #[cfg(test)]
    pub fn step_index(&self) -> usize {
        self.step
    }

    pub fn current(&self) -> Option<&'static TutorialStep> {
        self.active.then(|| &STEPS[self.step])
    }

    pub fn progress_label(&self) -> String {
        format!("Tutorial: Step {} of {}", self.step + 1, STEPS.len())
    }

    pub fn transcript(&self) -> &[String] {
        &self.transcript
    }
}

impl RevealSource for Tutorial {
    fn source_name(&self) -> &'static str {
        "tutorial"
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn frame(&self) -> RevealFrame {
        let step = &STEPS[self.step];
        RevealFrame {
            reveal: step.reveal,
            features: step.features.to_vec(),
            run: self.run,
            animating: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_three_steps_then_finishes() {
        let mut tutorial = Tutorial::new();
        assert!(tutorial.should_auto_start());
        tutorial.start();
        assert!(tutorial.is_active());
        assert_eq!(tutorial.frame().reveal, RevealState::Empty);

        tutorial.advance();
        assert_eq!(tutorial.frame().reveal, RevealState::Depth(1));
        assert_eq!(tutorial.frame().features, vec![Feature::Sex]);
        assert_eq!(tutorial.progress_label(), "Tutorial: Step 2 of 3");

        tutorial.advance();
        assert_eq!(tutorial.frame().reveal, RevealState::Full);
        assert_eq!(tutorial.current().unwrap().button_text, "Finish Tutorial");

        tutorial.advance();
        assert!(!tutorial.is_active());
        assert!(tutorial.current().is_none());
        assert_eq!(tutorial.transcript().len(), 4);
        assert!(!tutorial.should_auto_start());
    }

    #[test]
    fn skip_ends_immediately() {
        let mut tutorial = Tutorial::new();
        tutorial.start();
        tutorial.skip();
        assert!(!tutorial.is_active());
        assert!(tutorial.transcript().last().unwrap().starts_with("Tutorial skipped"));

        // Ignored once inactive.
        tutorial.advance();
        tutorial.skip();
        assert_eq!(tutorial.transcript().len(), 2);
    }

    #[test]
    fn restart_begins_at_welcome_with_new_run() {
        let mut tutorial = Tutorial::new();
        tutorial.start();
        tutorial.advance();
        let before = tutorial.frame().run;
        tutorial.start();
        assert_eq!(tutorial.step_index(), 0);
        assert!(tutorial.frame().run > before);
    }

    #[test]
    fn tutorial_passenger_is_first_class_woman() {
        let cohort = Tutorial::passenger();
        assert_eq!(cohort.profile.get(Feature::Pclass), Some(1.0));
        assert_eq!(cohort.profile.get(Feature::Sex), Some(0.0));
    }
}
