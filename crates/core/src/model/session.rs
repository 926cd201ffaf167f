use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::ids::{SessionId, SkillId, UserId};
use crate::scoring::{Score, accuracy_score, session_feedback};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TrainingSessionError {
    #[error("completed_at is before started_at")]
    InvalidTimeRange,

    #[error("persisted session is not marked completed")]
    NotCompleted,
}

/// Record of one completed pass through every step of a skill.
///
/// Created once, when the pass completes, and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingSession {
    id: SessionId,
    user_id: UserId,
    skill_id: SkillId,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
    accuracy: Score,
    feedback: String,
    completed: bool,
}

impl TrainingSession {
    /// Build the record for a finished pass from its recorded step scores.
    ///
    /// # Errors
    ///
    /// Returns `TrainingSessionError::InvalidTimeRange` if `completed_at < started_at`.
    pub fn completed(
        id: SessionId,
        user_id: UserId,
        skill_id: SkillId,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        step_scores: &[Score],
    ) -> Result<Self, TrainingSessionError> {
        if completed_at < started_at {
            return Err(TrainingSessionError::InvalidTimeRange);
        }
        let accuracy = accuracy_score(step_scores);
        Ok(Self {
            id,
            user_id,
            skill_id,
            started_at,
            completed_at,
            accuracy,
            feedback: session_feedback(accuracy).to_owned(),
            completed: true,
        })
    }

    /// Rehydrate a session from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `TrainingSessionError` if timestamps are inverted or the record
    /// is not flagged completed (the log only ever holds completed passes).
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        id: SessionId,
        user_id: UserId,
        skill_id: SkillId,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        accuracy: Score,
        feedback: String,
        completed: bool,
    ) -> Result<Self, TrainingSessionError> {
        if completed_at < started_at {
            return Err(TrainingSessionError::InvalidTimeRange);
        }
        if !completed {
            return Err(TrainingSessionError::NotCompleted);
        }
        Ok(Self {
            id,
            user_id,
            skill_id,
            started_at,
            completed_at,
            accuracy,
            feedback,
            completed,
        })
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn skill_id(&self) -> SkillId {
        self.skill_id
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    #[must_use]
    pub fn accuracy(&self) -> Score {
        self.accuracy
    }

    #[must_use]
    pub fn feedback(&self) -> &str {
        &self.feedback
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn scores(values: &[u32]) -> Vec<Score> {
        values.iter().map(|v| Score::new(*v).unwrap()).collect()
    }

    #[test]
    fn completed_session_averages_scores() {
        let now = fixed_now();
        let session = TrainingSession::completed(
            SessionId::generate(),
            UserId::generate(),
            SkillId::generate(),
            now,
            now + chrono::Duration::minutes(3),
            &scores(&[90, 70]),
        )
        .unwrap();

        assert_eq!(session.accuracy().value(), 80);
        assert!(session.is_completed());
        assert_eq!(session.feedback(), "Good effort, but needs more practice.");
    }

    #[test]
    fn high_accuracy_earns_mastery_feedback() {
        let now = fixed_now();
        let session = TrainingSession::completed(
            SessionId::generate(),
            UserId::generate(),
            SkillId::generate(),
            now,
            now,
            &scores(&[95, 88]),
        )
        .unwrap();
        assert_eq!(session.feedback(), "Great job! You've mastered this skill.");
    }

    #[test]
    fn rejects_inverted_time_range() {
        let now = fixed_now();
        let err = TrainingSession::completed(
            SessionId::generate(),
            UserId::generate(),
            SkillId::generate(),
            now,
            now - chrono::Duration::seconds(1),
            &[],
        )
        .unwrap_err();
        assert_eq!(err, TrainingSessionError::InvalidTimeRange);
    }

    #[test]
    fn persisted_record_must_be_completed() {
        let now = fixed_now();
        let err = TrainingSession::from_persisted(
            SessionId::generate(),
            UserId::generate(),
            SkillId::generate(),
            now,
            now,
            Score::new(50).unwrap(),
            "x".into(),
            false,
        )
        .unwrap_err();
        assert_eq!(err, TrainingSessionError::NotCompleted);
    }
}
