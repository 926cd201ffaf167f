use std::str::FromStr;

use skill_core::model::{ParseIdError, Role, TrainingSession};
use skill_core::scoring::Score;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

/// Maps a failed write, turning unique/primary-key violations into `Conflict`.
pub(crate) fn write_err(e: sqlx::Error) -> StorageError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict,
        _ => StorageError::Connection(e.to_string()),
    }
}

pub(crate) fn read_err(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

/// Reads a TEXT column holding a UUID-backed id.
pub(crate) fn id_column<T>(row: &SqliteRow, column: &'static str) -> Result<T, StorageError>
where
    T: FromStr<Err = ParseIdError>,
{
    let raw: String = row.try_get(column).map_err(ser)?;
    raw.parse::<T>()
        .map_err(|e| StorageError::Serialization(format!("{column}: {e}")))
}

pub(crate) fn parse_role(s: &str) -> Result<Role, StorageError> {
    s.parse::<Role>().map_err(ser)
}

pub(crate) fn order_from_i64(v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid step_order: {v}")))
}

pub(crate) fn score_from_i64(v: i64) -> Result<Score, StorageError> {
    let raw = u32::try_from(v)
        .map_err(|_| StorageError::Serialization(format!("invalid accuracy_score: {v}")))?;
    Score::new(raw).map_err(ser)
}

pub(crate) fn map_session_row(row: &SqliteRow) -> Result<TrainingSession, StorageError> {
    let completed: i64 = row.try_get("completed").map_err(ser)?;
    TrainingSession::from_persisted(
        id_column(row, "id")?,
        id_column(row, "user_id")?,
        id_column(row, "skill_id")?,
        row.try_get("started_at").map_err(ser)?,
        row.try_get("completed_at").map_err(ser)?,
        score_from_i64(row.try_get::<i64, _>("accuracy_score").map_err(ser)?)?,
        row.try_get("feedback").map_err(ser)?,
        completed != 0,
    )
    .map_err(ser)
}
