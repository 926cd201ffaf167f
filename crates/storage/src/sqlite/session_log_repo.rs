use skill_core::model::{TrainingSession, UserId};

use super::SqliteRepository;
use super::mapping::{map_session_row, read_err, write_err};
use crate::repository::{SessionLogRepository, StorageError};

#[async_trait::async_trait]
impl SessionLogRepository for SqliteRepository {
    async fn append_session(&self, session: &TrainingSession) -> Result<(), StorageError> {
        sqlx::query(
            r"
                INSERT INTO training_sessions (
                    id, user_id, skill_id, started_at, completed_at,
                    accuracy_score, feedback, completed
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
        )
        .bind(session.id().to_string())
        .bind(session.user_id().to_string())
        .bind(session.skill_id().to_string())
        .bind(session.started_at())
        .bind(session.completed_at())
        .bind(i64::from(session.accuracy().value()))
        .bind(session.feedback())
        .bind(i64::from(session.is_completed()))
        .execute(&self.pool)
        .await
        .map_err(write_err)?;

        Ok(())
    }

    async fn list_sessions_for_user(
        &self,
        user: UserId,
        limit: Option<u32>,
    ) -> Result<Vec<TrainingSession>, StorageError> {
        // SQLite treats a negative LIMIT as "no limit".
        let limit = limit.map_or(-1_i64, i64::from);
        let rows = sqlx::query(
            r"
                SELECT
                    id, user_id, skill_id, started_at, completed_at,
                    accuracy_score, feedback, completed
                FROM training_sessions
                WHERE user_id = ?1
                ORDER BY completed_at DESC, rowid DESC
                LIMIT ?2
            ",
        )
        .bind(user.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(read_err)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(map_session_row(row)?);
        }
        Ok(out)
    }
}
