use std::sync::{Arc, LazyLock};

use regex::Regex;
use skill_core::model::UserProfile;
use storage::repository::UserRepository;

use super::identity::{Identity, IdentityProvider};
use crate::error::{AuthError, FormError};

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}$").expect("valid regex")
});

pub const MIN_PASSWORD_LEN: usize = 6;

/// Fields of the registration form, as typed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignUpForm {
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl SignUpForm {
    /// Checks the form the way the registration page does, first problem wins.
    ///
    /// # Errors
    ///
    /// Returns the first `FormError` found, in field order.
    pub fn validate(&self) -> Result<(), FormError> {
        if self.full_name.trim().is_empty() {
            return Err(FormError::NameRequired);
        }
        let email = self.email.trim();
        if email.is_empty() {
            return Err(FormError::EmailRequired);
        }
        if !EMAIL_RE.is_match(email) {
            return Err(FormError::InvalidEmail);
        }
        if self.password.is_empty() {
            return Err(FormError::PasswordRequired);
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(FormError::PasswordTooShort);
        }
        if self.confirm_password.is_empty() {
            return Err(FormError::ConfirmRequired);
        }
        if self.password != self.confirm_password {
            return Err(FormError::PasswordMismatch);
        }
        Ok(())
    }
}

/// Registration and sign-in flows that keep identities and profiles in step.
#[derive(Clone)]
pub struct AccountService {
    identity: Arc<dyn IdentityProvider>,
    users: Arc<dyn UserRepository>,
}

impl AccountService {
    #[must_use]
    pub fn new(identity: Arc<dyn IdentityProvider>, users: Arc<dyn UserRepository>) -> Self {
        Self { identity, users }
    }

    /// Validate the form, create the identity, then its `user` profile.
    ///
    /// # Errors
    ///
    /// - `AuthError::Form` if validation fails (nothing is created).
    /// - `AuthError::EmailAlreadyInUse` for a registered email.
    /// - `AuthError::SignUpFailed` if the identity or profile cannot be written.
    pub async fn sign_up(&self, form: &SignUpForm) -> Result<(Identity, UserProfile), AuthError> {
        form.validate()?;
        let identity = self
            .identity
            .sign_up(form.email.trim(), &form.password)
            .await
            .map_err(|err| match err {
                AuthError::Unknown(reason) => AuthError::SignUpFailed(reason),
                other => other,
            })?;
        let profile =
            UserProfile::new_member(identity.user_id, &identity.email, form.full_name.trim())
                .map_err(|err| AuthError::SignUpFailed(err.to_string()))?;
        if let Err(err) = self.users.create_profile(&profile).await {
            // The identity exists without a profile; the gate tolerates that.
            tracing::error!(user = %identity.user_id, error = %err, "failed to create profile");
            return Err(AuthError::SignUpFailed(err.to_string()));
        }
        tracing::info!(user = %identity.user_id, "account created");
        Ok((identity, profile))
    }

    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredential` on a bad email/password pair.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        self.identity.sign_in(email.trim(), password).await
    }

    /// # Errors
    ///
    /// Returns `AuthError::Unknown` if the provider fails.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.identity.sign_out().await
    }

    #[must_use]
    pub fn identity_provider(&self) -> Arc<dyn IdentityProvider> {
        Arc::clone(&self.identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::LocalIdentityProvider;
    use async_trait::async_trait;
    use skill_core::model::{Role, SkillId, UserId};
    use skill_core::time::fixed_clock;
    use storage::repository::{InMemoryRepository, StorageError};

    /// Profile store that is down for writes.
    struct ReadOnlyProfiles;

    #[async_trait]
    impl UserRepository for ReadOnlyProfiles {
        async fn create_profile(&self, _profile: &UserProfile) -> Result<(), StorageError> {
            Err(StorageError::Connection("profiles offline".into()))
        }

        async fn get_profile(&self, _id: UserId) -> Result<Option<UserProfile>, StorageError> {
            Ok(None)
        }

        async fn add_enrolled_skill(
            &self,
            _user: UserId,
            _skill_id: SkillId,
        ) -> Result<(), StorageError> {
            Err(StorageError::NotFound)
        }
    }

    fn form() -> SignUpForm {
        SignUpForm {
            full_name: "Ananya Rao".into(),
            email: "ananya@example.in".into(),
            password: "secret1".into(),
            confirm_password: "secret1".into(),
        }
    }

    fn service(repo: &InMemoryRepository) -> AccountService {
        let identity = Arc::new(LocalIdentityProvider::new(
            fixed_clock(),
            Arc::new(repo.clone()),
        ));
        AccountService::new(identity, Arc::new(repo.clone()))
    }

    #[test]
    fn validation_reports_first_problem() {
        assert_eq!(form().validate(), Ok(()));

        let mut f = form();
        f.full_name = "   ".into();
        assert_eq!(f.validate(), Err(FormError::NameRequired));

        let mut f = form();
        f.email = "ananya@example".into();
        assert_eq!(f.validate(), Err(FormError::InvalidEmail));

        let mut f = form();
        f.email = "Ananya.R+work@Mail.Example.IN".into();
        assert_eq!(f.validate(), Ok(()));

        let mut f = form();
        f.password = "12345".into();
        f.confirm_password = "12345".into();
        assert_eq!(f.validate(), Err(FormError::PasswordTooShort));

        let mut f = form();
        f.confirm_password = String::new();
        assert_eq!(f.validate(), Err(FormError::ConfirmRequired));
        assert_eq!(
            FormError::ConfirmRequired.to_string(),
            "Please confirm your password"
        );

        let mut f = form();
        f.confirm_password = "secret2".into();
        assert_eq!(f.validate(), Err(FormError::PasswordMismatch));
        assert_eq!(
            FormError::PasswordMismatch.to_string(),
            "Passwords do not match"
        );
    }

    #[tokio::test]
    async fn sign_up_creates_member_profile() {
        let repo = InMemoryRepository::new();
        let accounts = service(&repo);
        let (identity, profile) = accounts.sign_up(&form()).await.unwrap();

        assert_eq!(profile.id(), identity.user_id);
        assert_eq!(profile.role(), Role::User);
        assert!(profile.enrolled_skills().is_empty());
        let stored = repo.get_profile(identity.user_id).await.unwrap().unwrap();
        assert_eq!(stored.display_name(), "Ananya Rao");
    }

    #[tokio::test]
    async fn invalid_form_creates_nothing() {
        let repo = InMemoryRepository::new();
        let accounts = service(&repo);
        let mut f = form();
        f.confirm_password = "different".into();
        let err = accounts.sign_up(&f).await.unwrap_err();
        assert!(matches!(err, AuthError::Form(FormError::PasswordMismatch)));
        assert!(accounts.identity_provider().current().is_none());
        assert!(
            accounts
                .sign_in("ananya@example.in", "secret1")
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn second_sign_up_with_same_email_fails() {
        let repo = InMemoryRepository::new();
        let accounts = service(&repo);
        accounts.sign_up(&form()).await.unwrap();
        let err = accounts.sign_up(&form()).await.unwrap_err();
        assert!(matches!(err, AuthError::EmailAlreadyInUse));
    }

    #[tokio::test]
    async fn failed_profile_write_uses_sign_up_wording() {
        let repo = InMemoryRepository::new();
        let identity = Arc::new(LocalIdentityProvider::new(
            fixed_clock(),
            Arc::new(repo.clone()),
        ));
        let accounts = AccountService::new(identity, Arc::new(ReadOnlyProfiles));

        let err = accounts.sign_up(&form()).await.unwrap_err();
        assert!(matches!(err, AuthError::SignUpFailed(_)));
        assert_eq!(
            err.to_string(),
            "Failed to create account. Please try again."
        );
    }
}
