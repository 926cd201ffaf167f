use async_trait::async_trait;
use chrono::{DateTime, Utc};
use skill_core::model::{BlobId, Skill, SkillId, TrainingSession, UserId, UserProfile};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use url::Url;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Persisted login material for one identity.
///
/// `email` is stored lowercased so lookups are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub user_id: UserId,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl CredentialRecord {
    #[must_use]
    pub fn new(
        user_id: UserId,
        email: &str,
        password_hash: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            email: normalize_email(email),
            password_hash,
            created_at,
        }
    }
}

#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// Builds the public URL for a blob path under `base`.
///
/// # Errors
///
/// Returns `StorageError::Serialization` if the path cannot be joined onto the base.
pub fn blob_url(base: &Url, path: &str) -> Result<Url, StorageError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    base.join(path.trim_start_matches('/'))
        .map_err(|e| StorageError::Serialization(e.to_string()))
}

/// Profile documents (`users` collection).
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create the profile document for a new identity.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if a profile already exists for the id.
    async fn create_profile(&self, profile: &UserProfile) -> Result<(), StorageError>;

    /// Fetch a profile by user id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_profile(&self, id: UserId) -> Result<Option<UserProfile>, StorageError>;

    /// Set-union `skill_id` into the user's enrolled skills.
    ///
    /// Adding an id that is already present is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the user has no profile.
    async fn add_enrolled_skill(&self, user: UserId, skill_id: SkillId)
    -> Result<(), StorageError>;
}

/// Skill module documents (`skills` collection).
#[async_trait]
pub trait SkillRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the id is taken.
    async fn insert_skill(&self, skill: &Skill) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_skill(&self, id: SkillId) -> Result<Option<Skill>, StorageError>;

    /// All skills, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_skills(&self) -> Result<Vec<Skill>, StorageError>;
}

/// Append-only log of completed sessions (`training_sessions` collection).
#[async_trait]
pub trait SessionLogRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the backend is unreachable.
    async fn append_session(&self, session: &TrainingSession) -> Result<(), StorageError>;

    /// Sessions for a user, most recently completed first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_sessions_for_user(
        &self,
        user: UserId,
        limit: Option<u32>,
    ) -> Result<Vec<TrainingSession>, StorageError>;
}

/// Blob storage for cover images.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the path is already used.
    async fn upload(&self, path: &str, bytes: &[u8]) -> Result<BlobId, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for unknown blobs.
    async fn public_url(&self, id: BlobId) -> Result<Url, StorageError>;
}

/// Login material backing the identity provider.
#[async_trait]
pub trait CredentialRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the email is already registered.
    async fn insert_credential(&self, record: &CredentialRecord) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn find_credential(&self, email: &str)
    -> Result<Option<CredentialRecord>, StorageError>;
}

#[derive(Default)]
struct MemoryState {
    profiles: HashMap<UserId, UserProfile>,
    skills: HashMap<SkillId, Skill>,
    sessions: Vec<TrainingSession>,
    blobs: HashMap<BlobId, (String, Vec<u8>)>,
    credentials: HashMap<String, CredentialRecord>,
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone)]
pub struct InMemoryRepository {
    state: Arc<Mutex<MemoryState>>,
    blob_base: Url,
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRepository {
    /// # Panics
    ///
    /// Never in practice: the default blob base is a constant valid URL.
    #[must_use]
    pub fn new() -> Self {
        Self::with_blob_base(Url::parse("memory://blobs/").expect("static url is valid"))
    }

    #[must_use]
    pub fn with_blob_base(blob_base: Url) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            blob_base,
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }

    /// Raw bytes of an uploaded blob.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for unknown blobs.
    pub fn blob_bytes(&self, id: BlobId) -> Result<Vec<u8>, StorageError> {
        let guard = self.lock()?;
        guard
            .blobs
            .get(&id)
            .map(|(_, bytes)| bytes.clone())
            .ok_or(StorageError::NotFound)
    }
}

#[async_trait]
impl UserRepository for InMemoryRepository {
    async fn create_profile(&self, profile: &UserProfile) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        if guard.profiles.contains_key(&profile.id()) {
            return Err(StorageError::Conflict);
        }
        guard.profiles.insert(profile.id(), profile.clone());
        Ok(())
    }

    async fn get_profile(&self, id: UserId) -> Result<Option<UserProfile>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.profiles.get(&id).cloned())
    }

    async fn add_enrolled_skill(
        &self,
        user: UserId,
        skill_id: SkillId,
    ) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let profile = guard.profiles.get_mut(&user).ok_or(StorageError::NotFound)?;
        profile.enroll(skill_id);
        Ok(())
    }
}

#[async_trait]
impl SkillRepository for InMemoryRepository {
    async fn insert_skill(&self, skill: &Skill) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        if guard.skills.contains_key(&skill.id()) {
            return Err(StorageError::Conflict);
        }
        guard.skills.insert(skill.id(), skill.clone());
        Ok(())
    }

    async fn get_skill(&self, id: SkillId) -> Result<Option<Skill>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.skills.get(&id).cloned())
    }

    async fn list_skills(&self) -> Result<Vec<Skill>, StorageError> {
        let guard = self.lock()?;
        let mut skills: Vec<Skill> = guard.skills.values().cloned().collect();
        skills.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id().cmp(&b.id()))
        });
        Ok(skills)
    }
}

#[async_trait]
impl SessionLogRepository for InMemoryRepository {
    async fn append_session(&self, session: &TrainingSession) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        if guard.sessions.iter().any(|s| s.id() == session.id()) {
            return Err(StorageError::Conflict);
        }
        guard.sessions.push(session.clone());
        Ok(())
    }

    async fn list_sessions_for_user(
        &self,
        user: UserId,
        limit: Option<u32>,
    ) -> Result<Vec<TrainingSession>, StorageError> {
        let guard = self.lock()?;
        // Later appends win ties, matching insertion order in the SQL adapter.
        let mut sessions: Vec<(usize, TrainingSession)> = guard
            .sessions
            .iter()
            .enumerate()
            .filter(|(_, s)| s.user_id() == user)
            .map(|(idx, s)| (idx, s.clone()))
            .collect();
        sessions.sort_by(|(ia, a), (ib, b)| {
            b.completed_at()
                .cmp(&a.completed_at())
                .then_with(|| ib.cmp(ia))
        });
        let limit = limit.map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
        Ok(sessions.into_iter().take(limit).map(|(_, s)| s).collect())
    }
}

#[async_trait]
impl BlobStore for InMemoryRepository {
    async fn upload(&self, path: &str, bytes: &[u8]) -> Result<BlobId, StorageError> {
        let mut guard = self.lock()?;
        if guard.blobs.values().any(|(p, _)| p == path) {
            return Err(StorageError::Conflict);
        }
        let id = BlobId::generate();
        guard.blobs.insert(id, (path.to_owned(), bytes.to_vec()));
        Ok(id)
    }

    async fn public_url(&self, id: BlobId) -> Result<Url, StorageError> {
        let guard = self.lock()?;
        let (path, _) = guard.blobs.get(&id).ok_or(StorageError::NotFound)?;
        blob_url(&self.blob_base, path)
    }
}

#[async_trait]
impl CredentialRepository for InMemoryRepository {
    async fn insert_credential(&self, record: &CredentialRecord) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let key = normalize_email(&record.email);
        if guard.credentials.contains_key(&key) {
            return Err(StorageError::Conflict);
        }
        guard.credentials.insert(key, record.clone());
        Ok(())
    }

    async fn find_credential(
        &self,
        email: &str,
    ) -> Result<Option<CredentialRecord>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.credentials.get(&normalize_email(email)).cloned())
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub users: Arc<dyn UserRepository>,
    pub skills: Arc<dyn SkillRepository>,
    pub sessions: Arc<dyn SessionLogRepository>,
    pub blobs: Arc<dyn BlobStore>,
    pub credentials: Arc<dyn CredentialRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_in_memory(&InMemoryRepository::new())
    }

    /// Wraps an existing in-memory repository so callers can keep a handle for inspection.
    #[must_use]
    pub fn from_in_memory(repo: &InMemoryRepository) -> Self {
        let users: Arc<dyn UserRepository> = Arc::new(repo.clone());
        let skills: Arc<dyn SkillRepository> = Arc::new(repo.clone());
        let sessions: Arc<dyn SessionLogRepository> = Arc::new(repo.clone());
        let blobs: Arc<dyn BlobStore> = Arc::new(repo.clone());
        let credentials: Arc<dyn CredentialRepository> = Arc::new(repo.clone());
        Self {
            users,
            skills,
            sessions,
            blobs,
            credentials,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skill_core::model::{Difficulty, SessionId, SkillMetadata, SkillStep};
    use skill_core::scoring::Score;
    use skill_core::time::fixed_now;

    fn build_skill(title: &str, created_offset_secs: i64) -> Skill {
        Skill::new(
            SkillId::generate(),
            SkillMetadata {
                title: title.into(),
                description: "desc".into(),
                difficulty: Difficulty::Beginner,
                category: "General".into(),
            },
            Url::parse("memory://blobs/skills/cover.png").unwrap(),
            SkillStep::numbered([("Step", "Do it")]),
            fixed_now() + chrono::Duration::seconds(created_offset_secs),
        )
        .unwrap()
    }

    fn build_session(user: UserId, offset_secs: i64, score: u32) -> TrainingSession {
        let at = fixed_now() + chrono::Duration::seconds(offset_secs);
        TrainingSession::completed(
            SessionId::generate(),
            user,
            SkillId::generate(),
            at,
            at,
            &[Score::new(score).unwrap()],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn enrollment_is_set_union() {
        let repo = InMemoryRepository::new();
        let profile = UserProfile::new_member(UserId::generate(), "a@b.io", "Asha").unwrap();
        repo.create_profile(&profile).await.unwrap();

        let skill = SkillId::generate();
        repo.add_enrolled_skill(profile.id(), skill).await.unwrap();
        repo.add_enrolled_skill(profile.id(), skill).await.unwrap();

        let stored = repo.get_profile(profile.id()).await.unwrap().unwrap();
        assert_eq!(stored.enrolled_skills().len(), 1);
        assert!(stored.is_enrolled(skill));
    }

    #[tokio::test]
    async fn enrolling_unknown_user_is_not_found() {
        let repo = InMemoryRepository::new();
        let err = repo
            .add_enrolled_skill(UserId::generate(), SkillId::generate())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }

    #[tokio::test]
    async fn skills_list_oldest_first() {
        let repo = InMemoryRepository::new();
        let newer = build_skill("Newer", 60);
        let older = build_skill("Older", 0);
        repo.insert_skill(&newer).await.unwrap();
        repo.insert_skill(&older).await.unwrap();

        let titles: Vec<String> = repo
            .list_skills()
            .await
            .unwrap()
            .iter()
            .map(|s| s.title().to_owned())
            .collect();
        assert_eq!(titles, vec!["Older", "Newer"]);
    }

    #[tokio::test]
    async fn sessions_newest_first_with_limit() {
        let repo = InMemoryRepository::new();
        let user = UserId::generate();
        let other = UserId::generate();
        for (offset, score) in [(0, 50), (20, 60), (10, 70)] {
            repo.append_session(&build_session(user, offset, score))
                .await
                .unwrap();
        }
        repo.append_session(&build_session(other, 30, 99))
            .await
            .unwrap();

        let recent = repo.list_sessions_for_user(user, Some(2)).await.unwrap();
        let scores: Vec<u32> = recent.iter().map(|s| s.accuracy().value()).collect();
        assert_eq!(scores, vec![60, 70]);
    }

    #[tokio::test]
    async fn blob_url_is_stable_and_under_base() {
        let repo = InMemoryRepository::with_blob_base(Url::parse("https://cdn.example/b").unwrap());
        let id = repo.upload("skills/abc-cover.png", b"png").await.unwrap();
        let first = repo.public_url(id).await.unwrap();
        let second = repo.public_url(id).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.as_str(), "https://cdn.example/b/skills/abc-cover.png");
        assert_eq!(repo.blob_bytes(id).unwrap(), b"png".to_vec());
    }

    #[tokio::test]
    async fn credentials_are_case_insensitive_and_unique() {
        let repo = InMemoryRepository::new();
        let record = CredentialRecord::new(
            UserId::generate(),
            "Asha@Example.com",
            "h".into(),
            fixed_now(),
        );
        repo.insert_credential(&record).await.unwrap();

        let found = repo.find_credential("asha@example.COM").await.unwrap();
        assert_eq!(found.map(|r| r.user_id), Some(record.user_id));

        let dup = CredentialRecord::new(
            UserId::generate(),
            "asha@example.com",
            "h".into(),
            fixed_now(),
        );
        assert!(matches!(
            repo.insert_credential(&dup).await,
            Err(StorageError::Conflict)
        ));
    }
}
