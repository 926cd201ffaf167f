use chrono::Utc;
use skill_core::model::BlobId;
use sqlx::Row;
use url::Url;

use super::SqliteRepository;
use super::mapping::{read_err, ser, write_err};
use crate::repository::{BlobStore, StorageError, blob_url};

#[async_trait::async_trait]
impl BlobStore for SqliteRepository {
    async fn upload(&self, path: &str, bytes: &[u8]) -> Result<BlobId, StorageError> {
        let id = BlobId::generate();
        sqlx::query(
            r"
            INSERT INTO blobs (id, path, bytes, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ",
        )
        .bind(id.to_string())
        .bind(path)
        .bind(bytes)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(write_err)?;

        tracing::debug!(blob_id = %id, path, size = bytes.len(), "blob uploaded");
        Ok(id)
    }

    async fn public_url(&self, id: BlobId) -> Result<Url, StorageError> {
        let row = sqlx::query("SELECT path FROM blobs WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(read_err)?
            .ok_or(StorageError::NotFound)?;

        let path: String = row.try_get("path").map_err(ser)?;
        blob_url(&self.blob_base, &path)
    }
}
