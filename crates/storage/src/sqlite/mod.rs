use std::sync::Arc;
use std::time::Duration;

use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use thiserror::Error;
use url::Url;

use crate::repository::{
    BlobStore, CredentialRepository, SessionLogRepository, SkillRepository, Storage,
    UserRepository,
};

mod blob_repo;
mod credential_repo;
mod mapping;
mod migrate;
mod session_log_repo;
mod skill_repo;
mod user_repo;

#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
    blob_base: Url,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SqliteInitError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl SqliteRepository {
    /// Connect to `SQLite` using the given URL.
    ///
    /// Blob public URLs are built under `blob_base`.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the connection cannot be established or if
    /// enforcing foreign key constraints fails during setup.
    pub async fn connect(database_url: &str, blob_base: Url) -> Result<Self, SqliteInitError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA foreign_keys = ON;")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA journal_mode = WAL;")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA busy_timeout = 5000;")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect(database_url)
            .await?;
        tracing::debug!(database_url, "sqlite pool connected");
        Ok(Self { pool, blob_base })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    #[must_use]
    pub fn blob_base(&self) -> &Url {
        &self.blob_base
    }

    /// Create tables if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if migration queries fail.
    pub async fn migrate(&self) -> Result<(), SqliteInitError> {
        migrate::run_migrations(&self.pool).await
    }
}

impl Storage {
    /// Build a `Storage` backed by `SQLite`.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if connection or migrations cannot be
    /// completed.
    pub async fn sqlite(database_url: &str, blob_base: Url) -> Result<Self, SqliteInitError> {
        let repo = SqliteRepository::connect(database_url, blob_base).await?;
        repo.migrate().await?;
        let users: Arc<dyn UserRepository> = Arc::new(repo.clone());
        let skills: Arc<dyn SkillRepository> = Arc::new(repo.clone());
        let sessions: Arc<dyn SessionLogRepository> = Arc::new(repo.clone());
        let blobs: Arc<dyn BlobStore> = Arc::new(repo.clone());
        let credentials: Arc<dyn CredentialRepository> = Arc::new(repo);
        Ok(Self {
            users,
            skills,
            sessions,
            blobs,
            credentials,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repository_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SqliteRepository>();
    }
}
