use std::collections::BTreeSet;

use skill_core::model::{SkillId, UserId, UserProfile};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{id_column, parse_role, read_err, ser, write_err};
use crate::repository::{StorageError, UserRepository};

#[async_trait::async_trait]
impl UserRepository for SqliteRepository {
    async fn create_profile(&self, profile: &UserProfile) -> Result<(), StorageError> {
        let user_id = profile.id().to_string();
        let mut tx = self.pool.begin().await.map_err(read_err)?;

        sqlx::query(
            r"
            INSERT INTO users (id, email, display_name, role)
            VALUES (?1, ?2, ?3, ?4)
            ",
        )
        .bind(user_id.as_str())
        .bind(profile.email())
        .bind(profile.display_name())
        .bind(profile.role().as_str())
        .execute(&mut *tx)
        .await
        .map_err(write_err)?;

        for skill_id in profile.enrolled_skills() {
            sqlx::query(
                r"
                INSERT INTO user_enrollments (user_id, skill_id)
                VALUES (?1, ?2)
                ON CONFLICT(user_id, skill_id) DO NOTHING
                ",
            )
            .bind(user_id.as_str())
            .bind(skill_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(write_err)?;
        }

        tx.commit().await.map_err(write_err)?;
        Ok(())
    }

    async fn get_profile(&self, id: UserId) -> Result<Option<UserProfile>, StorageError> {
        let user_id = id.to_string();
        let row = sqlx::query(
            r"
            SELECT id, email, display_name, role
            FROM users WHERE id = ?1
            ",
        )
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(read_err)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let enrollment_rows = sqlx::query(
            r"
            SELECT skill_id FROM user_enrollments WHERE user_id = ?1
            ",
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(read_err)?;

        let mut enrolled = BTreeSet::new();
        for er in &enrollment_rows {
            enrolled.insert(id_column::<SkillId>(er, "skill_id")?);
        }

        let role: String = row.try_get("role").map_err(ser)?;
        let profile = UserProfile::from_persisted(
            id_column(&row, "id")?,
            row.try_get::<String, _>("email").map_err(ser)?,
            row.try_get::<String, _>("display_name").map_err(ser)?,
            parse_role(&role)?,
            enrolled,
        )
        .map_err(ser)?;

        Ok(Some(profile))
    }

    async fn add_enrolled_skill(
        &self,
        user: UserId,
        skill_id: SkillId,
    ) -> Result<(), StorageError> {
        let user_id = user.to_string();
        let exists = sqlx::query("SELECT 1 FROM users WHERE id = ?1")
            .bind(user_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(read_err)?;
        if exists.is_none() {
            return Err(StorageError::NotFound);
        }

        sqlx::query(
            r"
            INSERT INTO user_enrollments (user_id, skill_id)
            VALUES (?1, ?2)
            ON CONFLICT(user_id, skill_id) DO NOTHING
            ",
        )
        .bind(user_id)
        .bind(skill_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(write_err)?;

        Ok(())
    }
}
