use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs the versioned migrations for the current schema.
///
/// Version 1 creates users, enrollments, credentials, skills with their steps,
/// the training session log, blobs, and indexes.
#[allow(clippy::too_many_lines)]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if is_applied(pool, 1).await? {
        return Ok(());
    }

    let mut tx = pool.begin().await?;

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL,
                display_name TEXT NOT NULL,
                role TEXT NOT NULL CHECK (role IN ('user', 'admin'))
            );
        ",
    )
    .execute(&mut *tx)
    .await?;

    // skill_id deliberately has no foreign key: enrolled ids are not checked by storage.
    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS user_enrollments (
                user_id TEXT NOT NULL,
                skill_id TEXT NOT NULL,
                PRIMARY KEY (user_id, skill_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
        ",
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS credentials (
                user_id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
        ",
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS skills (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                difficulty TEXT NOT NULL
                    CHECK (difficulty IN ('Beginner', 'Intermediate', 'Advanced')),
                category TEXT NOT NULL,
                cover_url TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
        ",
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS skill_steps (
                id TEXT PRIMARY KEY,
                skill_id TEXT NOT NULL,
                title TEXT NOT NULL,
                instruction TEXT NOT NULL,
                step_order INTEGER NOT NULL CHECK (step_order >= 1),
                UNIQUE (skill_id, step_order),
                FOREIGN KEY (skill_id) REFERENCES skills(id) ON DELETE CASCADE
            );
        ",
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS training_sessions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                skill_id TEXT NOT NULL,
                started_at TEXT NOT NULL,
                completed_at TEXT NOT NULL,
                accuracy_score INTEGER NOT NULL CHECK (accuracy_score BETWEEN 0 AND 100),
                feedback TEXT NOT NULL,
                completed INTEGER NOT NULL CHECK (completed IN (0, 1))
            );
        ",
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS blobs (
                id TEXT PRIMARY KEY,
                path TEXT NOT NULL UNIQUE,
                bytes BLOB NOT NULL,
                created_at TEXT NOT NULL
            );
        ",
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r"
            CREATE INDEX IF NOT EXISTS idx_skill_steps_skill_order
                ON skill_steps (skill_id, step_order);
        ",
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r"
            CREATE INDEX IF NOT EXISTS idx_training_sessions_user_completed
                ON training_sessions (user_id, completed_at);
        ",
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r"
            INSERT INTO schema_migrations (version, applied_at)
            VALUES (?1, ?2)
            ON CONFLICT(version) DO NOTHING
        ",
    )
    .bind(1_i64)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    tracing::info!(version = 1, "sqlite schema migrated");

    Ok(())
}
