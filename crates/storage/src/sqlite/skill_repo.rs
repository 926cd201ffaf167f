use std::collections::HashMap;

use skill_core::model::{Skill, SkillId, SkillMetadata, SkillStep};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use url::Url;

use super::SqliteRepository;
use super::mapping::{id_column, order_from_i64, read_err, ser, write_err};
use crate::repository::{SkillRepository, StorageError};

fn map_step_row(row: &SqliteRow) -> Result<(SkillId, SkillStep), StorageError> {
    let skill_id = id_column(row, "skill_id")?;
    let step = SkillStep::from_persisted(
        id_column(row, "id")?,
        row.try_get("title").map_err(ser)?,
        row.try_get("instruction").map_err(ser)?,
        order_from_i64(row.try_get::<i64, _>("step_order").map_err(ser)?)?,
    );
    Ok((skill_id, step))
}

fn map_skill_row(row: &SqliteRow, steps: Vec<SkillStep>) -> Result<Skill, StorageError> {
    let difficulty: String = row.try_get("difficulty").map_err(ser)?;
    let cover_url: String = row.try_get("cover_url").map_err(ser)?;
    Skill::new(
        id_column(row, "id")?,
        SkillMetadata {
            title: row.try_get("title").map_err(ser)?,
            description: row.try_get("description").map_err(ser)?,
            difficulty: difficulty.parse().map_err(ser)?,
            category: row.try_get("category").map_err(ser)?,
        },
        Url::parse(&cover_url).map_err(ser)?,
        steps,
        row.try_get("created_at").map_err(ser)?,
    )
    .map_err(ser)
}

#[async_trait::async_trait]
impl SkillRepository for SqliteRepository {
    async fn insert_skill(&self, skill: &Skill) -> Result<(), StorageError> {
        let skill_id = skill.id().to_string();
        let mut tx = self.pool.begin().await.map_err(read_err)?;

        sqlx::query(
            r"
            INSERT INTO skills (id, title, description, difficulty, category, cover_url, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
        )
        .bind(skill_id.as_str())
        .bind(skill.title())
        .bind(skill.description())
        .bind(skill.difficulty().as_str())
        .bind(skill.category())
        .bind(skill.cover_url().as_str())
        .bind(skill.created_at())
        .execute(&mut *tx)
        .await
        .map_err(write_err)?;

        for step in skill.steps() {
            sqlx::query(
                r"
                INSERT INTO skill_steps (id, skill_id, title, instruction, step_order)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ",
            )
            .bind(step.id().to_string())
            .bind(skill_id.as_str())
            .bind(step.title())
            .bind(step.instruction())
            .bind(i64::from(step.order()))
            .execute(&mut *tx)
            .await
            .map_err(write_err)?;
        }

        tx.commit().await.map_err(write_err)?;
        Ok(())
    }

    async fn get_skill(&self, id: SkillId) -> Result<Option<Skill>, StorageError> {
        let skill_id = id.to_string();
        let row = sqlx::query(
            r"
            SELECT id, title, description, difficulty, category, cover_url, created_at
            FROM skills WHERE id = ?1
            ",
        )
        .bind(skill_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(read_err)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let step_rows = sqlx::query(
            r"
            SELECT id, skill_id, title, instruction, step_order
            FROM skill_steps
            WHERE skill_id = ?1
            ORDER BY step_order ASC
            ",
        )
        .bind(skill_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(read_err)?;

        let mut steps = Vec::with_capacity(step_rows.len());
        for sr in &step_rows {
            steps.push(map_step_row(sr)?.1);
        }

        map_skill_row(&row, steps).map(Some)
    }

    async fn list_skills(&self) -> Result<Vec<Skill>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, title, description, difficulty, category, cover_url, created_at
            FROM skills
            ORDER BY created_at ASC, id ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(read_err)?;

        let step_rows = sqlx::query(
            r"
            SELECT id, skill_id, title, instruction, step_order
            FROM skill_steps
            ORDER BY skill_id ASC, step_order ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(read_err)?;

        let mut steps_by_skill: HashMap<SkillId, Vec<SkillStep>> = HashMap::new();
        for sr in &step_rows {
            let (skill_id, step) = map_step_row(sr)?;
            steps_by_skill.entry(skill_id).or_default().push(step);
        }

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let skill_id: SkillId = id_column(row, "id")?;
            let steps = steps_by_skill.remove(&skill_id).unwrap_or_default();
            out.push(map_skill_row(row, steps)?);
        }
        Ok(out)
    }
}
