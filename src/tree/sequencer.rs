//! Timed reveal of a traced path.
//!
//! The sequencer is driven cooperatively: the host passes the current time
//! into [`AnimationSequencer::trigger`] and [`AnimationSequencer::poll`] and
//! schedules its next wake-up from [`AnimationSequencer::next_deadline`].
//! There is exactly one timer slot, so a new trigger always replaces the
//! pending step instead of racing it.

use std::time::Duration;

use log::debug;
use thiserror::Error;

use super::reveal::RevealState;
use super::Feature;

#[derive(Debug, Error, PartialEq)]
pub enum ScriptError {
    #[error("animation script has no steps")]
    Empty,

    #[error("first step must reveal nothing and name no features")]
    FirstStepNotEmpty,

    #[error("last step must reveal the full path and name every feature")]
    LastStepNotFull,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnimationStep {
    pub reveal: RevealState,
    pub features: Vec<Feature>,
    pub duration: Duration,
}

impl AnimationStep {
    pub fn new(reveal: RevealState, features: &[Feature], duration_ms: u64) -> Self {
        Self {
            reveal,
            features: features.to_vec(),
            duration: Duration::from_millis(duration_ms),
        }
    }
}

/// Validated, fixed sequence of reveal steps.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationScript {
    steps: Vec<AnimationStep>,
}

impl AnimationScript {
    pub fn new(steps: Vec<AnimationStep>) -> Result<Self, ScriptError> {
        let (first, last) = match (steps.first(), steps.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(ScriptError::Empty),
        };
        if first.reveal != RevealState::Empty || !first.features.is_empty() {
            return Err(ScriptError::FirstStepNotEmpty);
        }
        let names_all = Feature::ALL.iter().all(|f| last.features.contains(f));
        if last.reveal != RevealState::Full || !names_all {
            return Err(ScriptError::LastStepNotFull);
        }
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[AnimationStep] {
        &self.steps
    }

    pub fn total_duration(&self) -> Duration {
        self.steps.iter().map(|s| s.duration).sum()
    }

    /// Same reveal sequence with every step lasting `duration`, validated
    /// again like any other script.
    pub fn with_step_duration(&self, duration: Duration) -> Result<Self, ScriptError> {
        let steps = self
            .steps
            .iter()
            .map(|step| AnimationStep {
                duration,
                ..step.clone()
            })
            .collect();
        Self::new(steps)
    }

    fn last(&self) -> &AnimationStep {
        &self.steps[self.steps.len() - 1]
    }
}

/// Feature names follow the model's feature order, not the splits of any
/// particular path: on a branch whose second split is `age`, the depth 2 step
/// still lights `pclass` in the SHAP chart.
impl Default for AnimationScript {
    fn default() -> Self {
        use Feature::*;
        Self {
            steps: vec![
                AnimationStep::new(RevealState::Empty, &[], 400),
                AnimationStep::new(RevealState::Depth(1), &[Sex], 1000),
                AnimationStep::new(RevealState::Depth(2), &[Sex, Pclass], 1000),
                AnimationStep::new(RevealState::Depth(3), &[Sex, Pclass, Age], 1000),
                AnimationStep::new(RevealState::Full, &[Sex, Pclass, Age, Fare], 1200),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    Idle,
    Running(usize),
}

/// What a reveal producer currently asks the diagram and the SHAP chart to
/// show. Both consumers read the same frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RevealFrame {
    pub reveal: RevealState,
    pub features: Vec<Feature>,
    /// Increases on every trigger, so a replay of an identical path is
    /// still a different frame.
    pub run: u64,
    pub animating: bool,
}

impl RevealFrame {
    /// Instant, fully revealed display.
    pub fn full() -> Self {
        Self {
            reveal: RevealState::Full,
            features: Feature::ALL.to_vec(),
            run: 0,
            animating: false,
        }
    }
}

/// Contract every reveal producer satisfies. The host asks producers in a
/// fixed priority order and honours the first active one.
pub trait RevealSource {
    fn source_name(&self) -> &'static str;
    fn is_active(&self) -> bool;
    fn frame(&self) -> RevealFrame;
}

#[derive(Debug, Clone)]
pub struct AnimationSequencer {
    name: &'static str,
    script: AnimationScript,
    state: SequencerState,
    deadline: Option<Duration>,
    run: u64,
}

impl AnimationSequencer {
    pub fn new(name: &'static str, script: AnimationScript) -> Self {
        Self {
            name,
            script,
            state: SequencerState::Idle,
            deadline: None,
            run: 0,
        }
    }

    pub fn script(&self) -> &AnimationScript {
        &self.script
    }

    pub fn state(&self) -> SequencerState {
        self.state
    }

    pub fn run(&self) -> u64 {
        self.run
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Restart from step 0, cancelling any step still pending.
    pub fn trigger(&mut self, now: Duration) {
        if let Some(due) = self.deadline.take() {
            debug!("{}: cancelled step timer due at {:?}", self.name, due);
        }
        self.run += 1;
        self.state = SequencerState::Running(0);
        self.deadline = Some(now + self.script.steps[0].duration);
        debug!("{}: run {} started", self.name, self.run);
    }

    /// Advance by at most one step. Returns true when the state changed.
    ///
    /// The next deadline counts from `now`, the moment the new step became
    /// visible, so no step is shown for less than its full duration.
    pub fn poll(&mut self, now: Duration) -> bool {
        let (SequencerState::Running(index), Some(due)) = (self.state, self.deadline) else {
            return false;
        };
        if now < due {
            return false;
        }

        let next = index + 1;
        if let Some(step) = self.script.steps.get(next) {
            self.state = SequencerState::Running(next);
            self.deadline = Some(now + step.duration);
            debug!("{}: step {} -> {}", self.name, next, step.reveal);
        } else {
            self.state = SequencerState::Idle;
            self.deadline = None;
            debug!("{}: run {} finished", self.name, self.run);
        }
        true
    }

    fn current_step(&self) -> &AnimationStep {
        match self.state {
            SequencerState::Running(index) => &self.script.steps[index],
            SequencerState::Idle => self.script.last(),
        }
    }

    pub fn reveal(&self) -> RevealState {
        self.current_step().reveal
    }

    pub fn features(&self) -> &[Feature] {
        &self.current_step().features
    }
}

impl RevealSource for AnimationSequencer {
    fn source_name(&self) -> &'static str {
        self.name
    }

    fn is_active(&self) -> bool {
        matches!(self.state, SequencerState::Running(_))
    }

    fn frame(&self) -> RevealFrame {
        RevealFrame {
            reveal: self.reveal(),
            features: self.features().to_vec(),
            run: self.run,
            animating: self.is_active(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    /// Fire every timer exactly when due and record each observed reveal.
    fn drain(seq: &mut AnimationSequencer) -> Vec<RevealState> {
        let mut seen = vec![seq.reveal()];
        while let Some(due) = seq.next_deadline() {
            assert!(seq.poll(due));
            seen.push(seq.reveal());
        }
        seen
    }

    #[test]
    fn default_script_is_valid() {
        let script = AnimationScript::default();
        assert_eq!(AnimationScript::new(script.steps().to_vec()), Ok(script.clone()));
        assert_eq!(script.total_duration(), ms(4600));
    }

    #[test]
    fn default_steps_light_features_in_model_order() {
        let script = AnimationScript::default();
        for (index, step) in script.steps().iter().enumerate() {
            assert_eq!(step.features.as_slice(), &Feature::ALL[..index]);
        }
        let depth_two = &script.steps()[2];
        assert_eq!(depth_two.reveal, RevealState::Depth(2));
        assert!(!depth_two.features.contains(&Feature::Age));
    }

    #[test]
    fn rejects_malformed_scripts() {
        assert_eq!(AnimationScript::new(vec![]), Err(ScriptError::Empty));
        assert_eq!(
            AnimationScript::new(vec![AnimationStep::new(RevealState::Depth(1), &[], 10)]),
            Err(ScriptError::FirstStepNotEmpty)
        );
        assert_eq!(
            AnimationScript::new(vec![
                AnimationStep::new(RevealState::Empty, &[], 10),
                AnimationStep::new(RevealState::Full, &[Feature::Sex], 10),
            ]),
            Err(ScriptError::LastStepNotFull)
        );
    }

    #[test]
    fn runs_to_idle_at_full() {
        let mut seq = AnimationSequencer::new("test", AnimationScript::default());
        assert!(!seq.is_active());
        seq.trigger(ms(0));
        assert_eq!(seq.state(), SequencerState::Running(0));
        assert_eq!(seq.reveal(), RevealState::Empty);
        assert!(seq.features().is_empty());

        let mut now = ms(0);
        while let Some(due) = seq.next_deadline() {
            now = due;
            seq.poll(now);
        }
        assert_eq!(now, seq.script().total_duration());
        assert_eq!(seq.state(), SequencerState::Idle);
        assert_eq!(seq.reveal(), RevealState::Full);
        assert_eq!(seq.features(), &Feature::ALL);
    }

    #[test]
    fn waits_for_full_step_duration() {
        let mut seq = AnimationSequencer::new("test", AnimationScript::default());
        seq.trigger(ms(0));
        assert!(!seq.poll(ms(399)));
        assert_eq!(seq.reveal(), RevealState::Empty);
        assert!(seq.poll(ms(400)));
        assert_eq!(seq.reveal(), RevealState::Depth(1));
        assert_eq!(seq.features(), &[Feature::Sex]);
        // A late poll still advances one step only.
        assert!(seq.poll(ms(9_000)));
        assert_eq!(seq.reveal(), RevealState::Depth(2));
        assert_eq!(seq.next_deadline(), Some(ms(10_000)));
    }

    #[test]
    fn retrigger_restarts_without_blending_runs() {
        let mut fresh = AnimationSequencer::new("fresh", AnimationScript::default());
        fresh.trigger(ms(0));
        let expected = drain(&mut fresh);

        let mut seq = AnimationSequencer::new("test", AnimationScript::default());
        seq.trigger(ms(0));
        seq.trigger(ms(100));
        assert_eq!(seq.run(), 2);
        assert_eq!(seq.next_deadline(), Some(ms(500)));
        assert_eq!(drain(&mut seq), expected);
    }

    #[test]
    fn retrigger_mid_sequence_resets_to_first_step() {
        let mut seq = AnimationSequencer::new("test", AnimationScript::default());
        seq.trigger(ms(0));
        seq.poll(ms(400));
        seq.poll(ms(1400));
        assert_eq!(seq.state(), SequencerState::Running(2));

        seq.trigger(ms(1500));
        assert_eq!(seq.state(), SequencerState::Running(0));
        assert_eq!(seq.reveal(), RevealState::Empty);
        assert!(!seq.poll(ms(2400)));
        assert_eq!(seq.next_deadline(), Some(ms(1900)));
    }

    #[test]
    fn frames_carry_the_run_counter() {
        let mut seq = AnimationSequencer::new("test", AnimationScript::default());
        seq.trigger(ms(0));
        let first = seq.frame();
        seq.trigger(ms(0));
        let second = seq.frame();
        assert_eq!(first.reveal, second.reveal);
        assert_ne!(first, second);
        assert!(second.animating);
    }

    #[test]
    fn uniform_step_duration_override() {
        let script = AnimationScript::default().with_step_duration(ms(50)).unwrap();
        assert_eq!(script.total_duration(), ms(250));
        assert_eq!(script.steps().len(), AnimationScript::default().steps().len());
    }
}
