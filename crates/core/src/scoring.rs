//! Accuracy scoring for training sessions.
//!
//! A step score is an integer percentage. A session's accuracy is the rounded
//! arithmetic mean of its recorded step scores, halves rounding up.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ScoreError {
    #[error("score must be between 0 and 100, got {0}")]
    OutOfRange(u32),
}

/// An integer accuracy percentage in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Score(u8);

impl Score {
    pub const MAX: Score = Score(100);
    pub const ZERO: Score = Score(0);

    /// # Errors
    ///
    /// Returns `ScoreError::OutOfRange` if `value > 100`.
    pub fn new(value: u32) -> Result<Self, ScoreError> {
        if value > 100 {
            return Err(ScoreError::OutOfRange(value));
        }
        // Bounded above, cannot truncate.
        Ok(Self(u8::try_from(value).map_err(|_| ScoreError::OutOfRange(value))?))
    }

    #[must_use]
    pub fn value(self) -> u32 {
        u32::from(self.0)
    }
}

impl TryFrom<u32> for Score {
    type Error = ScoreError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Score> for u32 {
    fn from(score: Score) -> Self {
        score.value()
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Rounded mean of step scores; `Score::ZERO` for an empty slice.
#[must_use]
pub fn accuracy_score(step_scores: &[Score]) -> Score {
    if step_scores.is_empty() {
        return Score::ZERO;
    }
    let sum: u64 = step_scores.iter().map(|s| u64::from(s.0)).sum();
    let n = step_scores.len() as u64;
    // round(sum / n) with halves going up
    let rounded = (2 * sum + n) / (2 * n);
    Score(u8::try_from(rounded.min(100)).unwrap_or(100))
}

/// Threshold above which a session counts as mastered.
pub const MASTERY_THRESHOLD: u32 = 80;

/// Summary feedback attached to a completed session.
#[must_use]
pub fn session_feedback(accuracy: Score) -> &'static str {
    if accuracy.value() > MASTERY_THRESHOLD {
        "Great job! You've mastered this skill."
    } else {
        "Good effort, but needs more practice."
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(values: &[u32]) -> Vec<Score> {
        values.iter().map(|v| Score::new(*v).unwrap()).collect()
    }

    #[test]
    fn empty_scores_yield_zero() {
        assert_eq!(accuracy_score(&[]), Score::ZERO);
    }

    #[test]
    fn mean_of_two_steps() {
        assert_eq!(accuracy_score(&scores(&[90, 70])).value(), 80);
    }

    #[test]
    fn halves_round_up() {
        assert_eq!(accuracy_score(&scores(&[80, 81])).value(), 81);
        assert_eq!(accuracy_score(&scores(&[20, 21, 21])).value(), 21);
    }

    #[test]
    fn single_score_is_identity() {
        assert_eq!(accuracy_score(&scores(&[85])).value(), 85);
    }

    #[test]
    fn stays_within_bounds() {
        assert_eq!(accuracy_score(&scores(&[100, 100, 100])), Score::MAX);
    }

    #[test]
    fn rejects_out_of_range() {
        assert_eq!(Score::new(101), Err(ScoreError::OutOfRange(101)));
    }

    #[test]
    fn feedback_threshold_is_strict() {
        assert_eq!(
            session_feedback(Score::new(81).unwrap()),
            "Great job! You've mastered this skill."
        );
        assert_eq!(
            session_feedback(Score::new(80).unwrap()),
            "Good effort, but needs more practice."
        );
    }
}
