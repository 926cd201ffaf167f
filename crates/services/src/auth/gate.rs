use std::sync::Arc;

use skill_core::model::{SkillId, UserId, UserProfile};
use storage::repository::UserRepository;
use tokio::sync::watch;

use super::identity::Identity;
use crate::error::AuthError;

/// The signed-in user as seen by every service call.
///
/// `profile` is `None` when the identity has no profile document yet; such a
/// user is treated as a non-admin with nothing enrolled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    identity: Identity,
    profile: Option<UserProfile>,
}

impl SessionContext {
    #[must_use]
    pub fn new(identity: Identity, profile: Option<UserProfile>) -> Self {
        Self { identity, profile }
    }

    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.identity.user_id
    }

    #[must_use]
    pub fn profile(&self) -> Option<&UserProfile> {
        self.profile.as_ref()
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.profile.as_ref().is_some_and(UserProfile::is_admin)
    }

    #[must_use]
    pub fn is_enrolled(&self, skill_id: SkillId) -> bool {
        self.profile.as_ref().is_some_and(|p| p.is_enrolled(skill_id))
    }

    /// Apply an enrollment that has already been written, without a reload.
    pub fn record_enrollment(&mut self, skill_id: SkillId) -> bool {
        self.profile.as_mut().is_some_and(|p| p.enroll(skill_id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateState {
    SignedOut,
    SignedIn(SessionContext),
}

impl GateState {
    #[must_use]
    pub fn context(&self) -> Option<&SessionContext> {
        match self {
            GateState::SignedOut => None,
            GateState::SignedIn(ctx) => Some(ctx),
        }
    }
}

/// Turns identity transitions into session contexts by loading profiles.
#[derive(Clone)]
pub struct AuthGate {
    users: Arc<dyn UserRepository>,
}

impl AuthGate {
    #[must_use]
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }

    /// # Errors
    ///
    /// Returns `AuthError::Unknown` if the profile lookup fails.
    pub async fn resolve(&self, identity: Option<Identity>) -> Result<GateState, AuthError> {
        let Some(identity) = identity else {
            return Ok(GateState::SignedOut);
        };
        let profile = self.users.get_profile(identity.user_id).await?;
        if profile.is_none() {
            tracing::warn!(user = %identity.user_id, "signed in without a profile document");
        }
        Ok(GateState::SignedIn(SessionContext::new(identity, profile)))
    }

    /// Wait for the next identity transition and resolve it.
    ///
    /// Returns `Ok(None)` once the provider has gone away.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Unknown` if the profile lookup fails.
    pub async fn next(
        &self,
        rx: &mut watch::Receiver<Option<Identity>>,
    ) -> Result<Option<GateState>, AuthError> {
        if rx.changed().await.is_err() {
            return Ok(None);
        }
        let identity = rx.borrow_and_update().clone();
        self.resolve(identity).await.map(Some)
    }

    /// Re-read the profile behind `ctx`, replacing any local patches.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Unknown` if the profile lookup fails.
    pub async fn reconcile(&self, ctx: &mut SessionContext) -> Result<(), AuthError> {
        ctx.profile = self.users.get_profile(ctx.user_id()).await?;
        Ok(())
    }
}
