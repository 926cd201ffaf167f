use std::sync::Arc;

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{
        Error as Argon2Error, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
        rand_core::OsRng,
    },
};
use async_trait::async_trait;
use skill_core::Clock;
use skill_core::model::UserId;
use storage::repository::{CredentialRecord, CredentialRepository, StorageError, normalize_email};
use tokio::sync::watch;

use crate::error::AuthError;

/// An authenticated principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub email: String,
}

/// Identity service contract.
///
/// `subscribe` hands out a receiver that holds the current identity and
/// observes every later sign-in or sign-out.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Register a new email/password identity and sign it in.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::EmailAlreadyInUse` if the email is registered.
    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, AuthError>;

    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredential` for an unknown email or wrong password.
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError>;

    /// # Errors
    ///
    /// Returns `AuthError::Unknown` if the provider cannot end the session.
    async fn sign_out(&self) -> Result<(), AuthError>;

    fn subscribe(&self) -> watch::Receiver<Option<Identity>>;

    fn current(&self) -> Option<Identity>;
}

/// Email/password identities stored through a `CredentialRepository`.
///
/// Passwords are hashed with Argon2id.
pub struct LocalIdentityProvider {
    clock: Clock,
    credentials: Arc<dyn CredentialRepository>,
    state: watch::Sender<Option<Identity>>,
}

impl LocalIdentityProvider {
    #[must_use]
    pub fn new(clock: Clock, credentials: Arc<dyn CredentialRepository>) -> Self {
        let (state, _rx) = watch::channel(None);
        Self {
            clock,
            credentials,
            state,
        }
    }

    fn set_current(&self, identity: Option<Identity>) {
        self.state.send_replace(identity);
    }
}

fn hasher() -> Result<Argon2<'static>, AuthError> {
    let params =
        Params::new(15_000, 2, 1, None).map_err(|e| AuthError::Unknown(e.to_string()))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    hasher()?
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Unknown(e.to_string()))
}

fn verify_password(password: &str, hashed: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(hashed).map_err(|e| AuthError::Unknown(e.to_string()))?;
    match hasher()?.verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(Argon2Error::Password) => Ok(false),
        Err(e) => Err(AuthError::Unknown(e.to_string())),
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let email = normalize_email(email);
        if self.credentials.find_credential(&email).await?.is_some() {
            return Err(AuthError::EmailAlreadyInUse);
        }
        let record = CredentialRecord::new(
            UserId::generate(),
            &email,
            hash_password(password)?,
            self.clock.now(),
        );
        match self.credentials.insert_credential(&record).await {
            Ok(()) => {}
            Err(StorageError::Conflict) => return Err(AuthError::EmailAlreadyInUse),
            Err(err) => return Err(err.into()),
        }
        let identity = Identity {
            user_id: record.user_id,
            email: record.email,
        };
        tracing::info!(user = %identity.user_id, "identity registered");
        self.set_current(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let Some(record) = self.credentials.find_credential(email).await? else {
            return Err(AuthError::InvalidCredential);
        };
        if !verify_password(password, &record.password_hash)? {
            tracing::debug!(user = %record.user_id, "password rejected");
            return Err(AuthError::InvalidCredential);
        }
        let identity = Identity {
            user_id: record.user_id,
            email: record.email,
        };
        self.set_current(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.set_current(None);
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.state.subscribe()
    }

    fn current(&self) -> Option<Identity> {
        self.state.borrow().clone()
    }
}
