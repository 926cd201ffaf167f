use skill_core::model::{Skill, SkillId, TrainingSession};

use crate::auth::SessionContext;
use crate::catalog_service::CatalogService;
use crate::error::DashboardError;
use crate::session_log_service::{RECENT_SESSION_LIMIT, SessionLogService};

pub const FALLBACK_GREETING: &str = "Learner";

/// Everything the dashboard screen shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardVm {
    pub greeting_name: String,
    /// Enrolled skills, in catalog order.
    pub enrolled: Vec<Skill>,
    pub available: Vec<Skill>,
    /// Most recent first.
    pub recent_sessions: Vec<TrainingSession>,
    pub completed_sessions: usize,
    /// Enrolled ids that no longer resolve to a skill.
    pub dangling_enrollments: Vec<SkillId>,
}

#[derive(Clone)]
pub struct DashboardService {
    catalog: CatalogService,
    sessions: SessionLogService,
}

impl DashboardService {
    #[must_use]
    pub fn new(catalog: CatalogService, sessions: SessionLogService) -> Self {
        Self { catalog, sessions }
    }

    /// # Errors
    ///
    /// Returns `DashboardError` if skills or sessions cannot be read.
    pub async fn load(&self, ctx: &SessionContext) -> Result<DashboardVm, DashboardError> {
        let skills = self.catalog.list_skills().await?;
        let recent_sessions = self
            .sessions
            .recent(ctx.user_id(), RECENT_SESSION_LIMIT)
            .await?;

        let (enrolled, available): (Vec<Skill>, Vec<Skill>) =
            skills.into_iter().partition(|s| ctx.is_enrolled(s.id()));

        let dangling_enrollments: Vec<SkillId> = ctx
            .profile()
            .map(|p| {
                p.enrolled_skills()
                    .iter()
                    .copied()
                    .filter(|id| !enrolled.iter().any(|s| s.id() == *id))
                    .collect()
            })
            .unwrap_or_default();
        if !dangling_enrollments.is_empty() {
            tracing::warn!(
                user = %ctx.user_id(),
                count = dangling_enrollments.len(),
                "enrolled skills missing from catalog"
            );
        }

        let greeting_name = ctx
            .profile()
            .map_or(FALLBACK_GREETING, |p| p.first_name())
            .to_owned();
        let completed_sessions = recent_sessions
            .iter()
            .filter(|s| s.is_completed())
            .count();

        Ok(DashboardVm {
            greeting_name,
            enrolled,
            available,
            recent_sessions,
            completed_sessions,
            dangling_enrollments,
        })
    }

    /// Enroll, then patch `ctx` and `vm` in place instead of reloading.
    ///
    /// # Errors
    ///
    /// Returns `DashboardError::Catalog` if the enrollment write fails; neither
    /// `ctx` nor `vm` is touched in that case.
    pub async fn enroll(
        &self,
        ctx: &mut SessionContext,
        vm: &mut DashboardVm,
        skill_id: SkillId,
    ) -> Result<(), DashboardError> {
        self.catalog.enroll(ctx.user_id(), skill_id).await?;
        ctx.record_enrollment(skill_id);
        if let Some(pos) = vm.available.iter().position(|s| s.id() == skill_id) {
            let skill = vm.available.remove(pos);
            vm.enrolled.push(skill);
            vm.enrolled
                .sort_by(|a, b| a.created_at().cmp(&b.created_at()).then(a.id().cmp(&b.id())));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Identity;
    use crate::catalog_service::{CoverImage, StepDraft};
    use crate::error::CatalogError;
    use chrono::Duration;
    use skill_core::model::{Difficulty, SessionId, SkillMetadata, UserId, UserProfile};
    use skill_core::scoring::Score;
    use skill_core::time::{fixed_clock, fixed_now};
    use std::sync::Arc;
    use storage::repository::{InMemoryRepository, SessionLogRepository, UserRepository};

    struct Fixture {
        repo: InMemoryRepository,
        dashboard: DashboardService,
        catalog: CatalogService,
    }

    fn fixture() -> Fixture {
        let repo = InMemoryRepository::new();
        let catalog = CatalogService::new(
            fixed_clock(),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
        );
        let sessions = SessionLogService::new(Arc::new(repo.clone()), Arc::new(repo.clone()));
        Fixture {
            dashboard: DashboardService::new(catalog.clone(), sessions),
            catalog,
            repo,
        }
    }

    async fn add_skill(catalog: &CatalogService, title: &str) -> Skill {
        catalog
            .create_skill(
                SkillMetadata {
                    title: title.into(),
                    description: "Module".into(),
                    difficulty: Difficulty::Beginner,
                    category: "General".into(),
                },
                vec![StepDraft {
                    title: "Only step".into(),
                    instruction: "Do it".into(),
                }],
                &CoverImage {
                    file_name: format!("{title}.png"),
                    bytes: vec![1, 2, 3],
                },
            )
            .await
            .unwrap()
    }

    async fn member(repo: &InMemoryRepository, name: &str) -> SessionContext {
        let profile = UserProfile::new_member(UserId::generate(), "m@b.io", name).unwrap();
        repo.create_profile(&profile).await.unwrap();
        SessionContext::new(
            Identity {
                user_id: profile.id(),
                email: "m@b.io".into(),
            },
            Some(profile),
        )
    }

    #[tokio::test]
    async fn load_partitions_catalog_and_greets_by_first_name() {
        let f = fixture();
        let wiring = add_skill(&f.catalog, "Wiring").await;
        let welding = add_skill(&f.catalog, "Welding").await;
        let mut ctx = member(&f.repo, "Meera Iyer").await;
        f.catalog.enroll(ctx.user_id(), wiring.id()).await.unwrap();
        ctx.record_enrollment(wiring.id());

        let vm = f.dashboard.load(&ctx).await.unwrap();
        assert_eq!(vm.greeting_name, "Meera");
        assert_eq!(vm.enrolled, vec![wiring]);
        assert_eq!(vm.available, vec![welding]);
        assert!(vm.recent_sessions.is_empty());
        assert!(vm.dangling_enrollments.is_empty());
    }

    #[tokio::test]
    async fn missing_profile_falls_back_to_learner() {
        let f = fixture();
        let ctx = SessionContext::new(
            Identity {
                user_id: UserId::generate(),
                email: "x@b.io".into(),
            },
            None,
        );
        let vm = f.dashboard.load(&ctx).await.unwrap();
        assert_eq!(vm.greeting_name, "Learner");
    }

    #[tokio::test]
    async fn recent_sessions_are_capped_at_five() {
        let f = fixture();
        let skill = add_skill(&f.catalog, "Wiring").await;
        let ctx = member(&f.repo, "Dev").await;
        for n in 0..7 {
            let at = fixed_now() + Duration::minutes(n);
            let session = TrainingSession::completed(
                SessionId::generate(),
                ctx.user_id(),
                skill.id(),
                at,
                at,
                &[Score::new(80).unwrap()],
            )
            .unwrap();
            f.repo.append_session(&session).await.unwrap();
        }
        let vm = f.dashboard.load(&ctx).await.unwrap();
        assert_eq!(vm.recent_sessions.len(), 5);
        assert_eq!(vm.completed_sessions, 5);
        assert_eq!(
            vm.recent_sessions[0].completed_at(),
            fixed_now() + Duration::minutes(6)
        );
    }

    #[tokio::test]
    async fn dangling_enrollments_are_filtered() {
        let f = fixture();
        let mut ctx = member(&f.repo, "Dev").await;
        let ghost = SkillId::generate();
        f.repo.add_enrolled_skill(ctx.user_id(), ghost).await.unwrap();
        ctx.record_enrollment(ghost);

        let vm = f.dashboard.load(&ctx).await.unwrap();
        assert!(vm.enrolled.is_empty());
        assert_eq!(vm.dangling_enrollments, vec![ghost]);
    }

    #[tokio::test]
    async fn enroll_patches_context_and_view_locally() {
        let f = fixture();
        let skill = add_skill(&f.catalog, "Plumbing").await;
        let mut ctx = member(&f.repo, "Dev").await;
        let mut vm = f.dashboard.load(&ctx).await.unwrap();

        f.dashboard.enroll(&mut ctx, &mut vm, skill.id()).await.unwrap();
        assert!(ctx.is_enrolled(skill.id()));
        assert_eq!(vm.enrolled.len(), 1);
        assert!(vm.available.is_empty());

        // Enrolling again leaves everything as it is.
        f.dashboard.enroll(&mut ctx, &mut vm, skill.id()).await.unwrap();
        assert_eq!(vm.enrolled.len(), 1);

        let err = f
            .dashboard
            .enroll(&mut ctx, &mut vm, SkillId::generate())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DashboardError::Catalog(CatalogError::SkillNotFound(_))
        ));
    }
}
