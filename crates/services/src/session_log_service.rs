use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use skill_core::model::{SessionId, SkillId, TrainingSession, UserId};
use skill_core::scoring::Score;
use storage::repository::{SessionLogRepository, SkillRepository, StorageError};

/// Number of sessions shown under "Recent Activity".
pub const RECENT_SESSION_LIMIT: u32 = 5;

/// Presentation-agnostic history row: the session plus its skill's title.
///
/// `skill_title` is `None` when the skill no longer resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionListItem {
    pub id: SessionId,
    pub skill_id: SkillId,
    pub skill_title: Option<String>,
    pub completed_at: DateTime<Utc>,
    pub accuracy: Score,
    pub feedback: String,
}

/// Read side of the append-only session log.
#[derive(Clone)]
pub struct SessionLogService {
    sessions: Arc<dyn SessionLogRepository>,
    skills: Arc<dyn SkillRepository>,
}

impl SessionLogService {
    #[must_use]
    pub fn new(sessions: Arc<dyn SessionLogRepository>, skills: Arc<dyn SkillRepository>) -> Self {
        Self { sessions, skills }
    }

    /// Up to `limit` sessions, most recently completed first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on repository failures.
    pub async fn recent(
        &self,
        user: UserId,
        limit: u32,
    ) -> Result<Vec<TrainingSession>, StorageError> {
        self.sessions.list_sessions_for_user(user, Some(limit)).await
    }

    /// Every session of the user, newest first, with skill titles resolved.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on repository failures.
    pub async fn history(&self, user: UserId) -> Result<Vec<SessionListItem>, StorageError> {
        let sessions = self.sessions.list_sessions_for_user(user, None).await?;
        let titles: HashMap<SkillId, String> = self
            .skills
            .list_skills()
            .await?
            .into_iter()
            .map(|s| (s.id(), s.title().to_owned()))
            .collect();

        Ok(sessions
            .into_iter()
            .map(|s| SessionListItem {
                id: s.id(),
                skill_id: s.skill_id(),
                skill_title: titles.get(&s.skill_id()).cloned(),
                completed_at: s.completed_at(),
                accuracy: s.accuracy(),
                feedback: s.feedback().to_owned(),
            })
            .collect())
    }
}
