//! Reasoning phase detection.
//!
//! The backend does not announce phases. They are inferred from vocabulary
//! in the cumulative reasoning transcript, so under-detection is expected;
//! regressions are not allowed.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

/// Ordered reasoning stages: `None < ChainOfThought < ReactActing < SelfReflection`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningPhase {
    #[default]
    None,
    ChainOfThought,
    ReactActing,
    SelfReflection,
}

impl ReasoningPhase {
    pub fn step(&self) -> u8 {
        match self {
            ReasoningPhase::None => 0,
            ReasoningPhase::ChainOfThought => 1,
            ReasoningPhase::ReactActing => 2,
            ReasoningPhase::SelfReflection => 3,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReasoningPhase::None => "Waiting",
            ReasoningPhase::ChainOfThought => "Chain of Thought",
            ReasoningPhase::ReactActing => "ReAct: acting",
            ReasoningPhase::SelfReflection => "Self-reflection",
        }
    }
}

static PLANNING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(plan(s|ning|ned)?|audiences?|strateg(y|ies|ic)|approach(es)?|outline|target(ing|ed)?|tone|angle|goals?)\b",
    )
    .unwrap()
});

static ACTING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(search(es|ing|ed)?|generat(e|es|ing|ed)|invok(e|es|ing|ed)|call(ing|ed)? (the )?tools?|fetch(es|ing|ed)?|look(ing)? up|retriev(e|es|ing|ed))\b",
    )
    .unwrap()
});

static REFLECTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(review(s|ing|ed)?|evaluat(e|es|ing|ed|ion)|scor(e|es|ing|ed)|revis(e|es|ing|ed|ion)|refin(e|es|ing|ed)|critiqu(e|ing)|self-check|double-check(ing)?)\b",
    )
    .unwrap()
});

/// Highest phase whose vocabulary appears anywhere in `text`.
pub fn detect_phase(text: &str) -> ReasoningPhase {
    if REFLECTION.is_match(text) {
        ReasoningPhase::SelfReflection
    } else if ACTING.is_match(text) {
        ReasoningPhase::ReactActing
    } else if PLANNING.is_match(text) {
        ReasoningPhase::ChainOfThought
    } else {
        ReasoningPhase::None
    }
}

/// One-way phase state machine for a single request.
#[derive(Debug, Clone, Default)]
pub struct ReasoningPhaseDetector {
    phase: ReasoningPhase,
}

impl ReasoningPhaseDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-evaluate against the full transcript so far.
    pub fn update(&mut self, transcript: &str) -> ReasoningPhase {
        let detected = detect_phase(transcript);
        if detected > self.phase {
            debug!(from = ?self.phase, to = ?detected, "Reasoning phase advanced");
            self.phase = detected;
        }
        self.phase
    }

    pub fn phase(&self) -> ReasoningPhase {
        self.phase
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_each_phase() {
        assert_eq!(detect_phase("Hmm."), ReasoningPhase::None);
        assert_eq!(
            detect_phase("The audience is developers, so the tone should be casual."),
            ReasoningPhase::ChainOfThought
        );
        assert_eq!(
            detect_phase("Next I will search the web for recent announcements."),
            ReasoningPhase::ReactActing
        );
        assert_eq!(
            detect_phase("Let me review the draft and score it against the brief."),
            ReasoningPhase::SelfReflection
        );
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert_eq!(detect_phase("STRATEGY first"), ReasoningPhase::ChainOfThought);
    }

    #[test]
    fn detector_never_regresses() {
        let mut detector = ReasoningPhaseDetector::new();
        assert_eq!(detector.update("Planning the post"), ReasoningPhase::ChainOfThought);
        assert_eq!(detector.update("Evaluating quality"), ReasoningPhase::SelfReflection);
        // A replacement transcript with weaker vocabulary keeps the phase.
        assert_eq!(detector.update("Planning again"), ReasoningPhase::SelfReflection);
        assert_eq!(ReasoningPhaseDetector::new().phase(), ReasoningPhase::None);
    }

    #[test]
    fn phases_are_ordered() {
        assert!(ReasoningPhase::None < ReasoningPhase::ChainOfThought);
        assert!(ReasoningPhase::ChainOfThought < ReasoningPhase::ReactActing);
        assert!(ReasoningPhase::ReactActing < ReasoningPhase::SelfReflection);
        assert_eq!(ReasoningPhase::SelfReflection.step(), 3);
    }
}
