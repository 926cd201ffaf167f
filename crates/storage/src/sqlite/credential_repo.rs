use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{id_column, read_err, ser, write_err};
use crate::repository::{CredentialRecord, CredentialRepository, StorageError, normalize_email};

#[async_trait::async_trait]
impl CredentialRepository for SqliteRepository {
    async fn insert_credential(&self, record: &CredentialRecord) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO credentials (user_id, email, password_hash, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ",
        )
        .bind(record.user_id.to_string())
        .bind(normalize_email(&record.email))
        .bind(record.password_hash.as_str())
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(write_err)?;
        Ok(())
    }

    async fn find_credential(
        &self,
        email: &str,
    ) -> Result<Option<CredentialRecord>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT user_id, email, password_hash, created_at
            FROM credentials WHERE email = ?1
            ",
        )
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await
        .map_err(read_err)?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(CredentialRecord {
            user_id: id_column(&row, "user_id")?,
            email: row.try_get("email").map_err(ser)?,
            password_hash: row.try_get("password_hash").map_err(ser)?,
            created_at: row.try_get("created_at").map_err(ser)?,
        }))
    }
}
