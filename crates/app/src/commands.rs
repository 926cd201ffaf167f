use std::collections::BTreeSet;
use std::error::Error;
use std::io::Write as _;

use services::training::{TrainingAttempt, TrainingFault, TrainingPhase};
use services::{
    ActiveTraining, AppServices, AuthError, CoverImage, GateState, SessionContext, SignUpForm,
    SkillDraft,
};
use skill_core::model::{Difficulty, Role, Skill, UserProfile};
use storage::repository::Storage;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

use crate::Args;

type CmdResult = Result<(), Box<dyn Error>>;

const SEED_ADMIN_EMAIL: &str = "admin@skillar.in";
const SEED_ADMIN_PASSWORD: &str = "skillar-admin";
const SEED_ADMIN_NAME: &str = "SkillAR Admin";

// 1x1 transparent PNG used as the cover of seeded skills.
const SEED_COVER_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

fn sample_drafts() -> Vec<SkillDraft> {
    let mut wiring = SkillDraft::new(
        "Basic Electrical Wiring",
        "Wire a single switch board safely from the distribution point.",
    )
    .with_step("Switch off the mains", "Turn off the breaker and test the line with a tester.")
    .with_step("Identify the wires", "Locate the phase, neutral and earth conductors.")
    .with_step("Connect the switch", "Fix the phase wire to the switch terminal and tighten it.");
    wiring.category = "Electrical".into();

    let mut plumbing = SkillDraft::new(
        "Tap Washer Replacement",
        "Replace a worn washer to stop a dripping tap.",
    )
    .with_step("Isolate the supply", "Close the valve feeding the tap.")
    .with_step("Open the tap head", "Unscrew the headgear with a spanner.")
    .with_step("Fit the new washer", "Swap the washer and reassemble the tap.");
    plumbing.category = "Plumbing".into();
    plumbing.difficulty = Difficulty::Intermediate;

    vec![wiring, plumbing]
}

fn context_of(state: GateState) -> Result<SessionContext, Box<dyn Error>> {
    match state {
        GateState::SignedIn(ctx) => Ok(ctx),
        GateState::SignedOut => Err("not signed in".into()),
    }
}

fn credentials(args: &Args) -> Result<(&str, &str), Box<dyn Error>> {
    let email = args.email.as_deref().ok_or("--email is required")?;
    let password = args.password.as_deref().ok_or("--password is required")?;
    Ok((email, password))
}

async fn signed_in(app: &AppServices, args: &Args) -> Result<SessionContext, Box<dyn Error>> {
    let (email, password) = credentials(args)?;
    let identity = app.accounts().sign_in(email, password).await?;
    context_of(app.gate().resolve(Some(identity)).await?)
}

fn skill_line(skill: &Skill) -> String {
    format!(
        "{}  {} [{}, {}] {} steps",
        skill.id(),
        skill.title(),
        skill.difficulty(),
        skill.category(),
        skill.step_count()
    )
}

/// Create the admin account and, on an empty catalog, a couple of sample skills.
pub(crate) async fn seed(app: &AppServices, storage: &Storage, args: &Args) -> CmdResult {
    let email = args.email.as_deref().unwrap_or(SEED_ADMIN_EMAIL);
    let password = args.password.as_deref().unwrap_or(SEED_ADMIN_PASSWORD);

    let identity_provider = app.identity();
    let identity = match identity_provider.sign_up(email, password).await {
        Ok(identity) => identity,
        Err(AuthError::EmailAlreadyInUse) => identity_provider.sign_in(email, password).await?,
        Err(err) => return Err(err.into()),
    };

    match storage.users.get_profile(identity.user_id).await? {
        Some(profile) if !profile.is_admin() => {
            return Err(format!("{email} already exists without the admin role").into());
        }
        Some(_) => {}
        None => {
            let profile = UserProfile::from_persisted(
                identity.user_id,
                &identity.email,
                SEED_ADMIN_NAME,
                Role::Admin,
                BTreeSet::new(),
            )?;
            storage.users.create_profile(&profile).await?;
        }
    }
    println!("Admin: {} ({})", identity.email, identity.user_id);

    let ctx = context_of(app.gate().resolve(Some(identity)).await?)?;
    if !app.catalog().list_skills().await?.is_empty() {
        println!("Catalog already has skills; nothing to seed.");
        return Ok(());
    }

    let authoring = app.authoring();
    for draft in sample_drafts() {
        let cover = CoverImage {
            file_name: "cover.png".into(),
            bytes: SEED_COVER_PNG.to_vec(),
        };
        let skill = authoring.publish(&ctx, draft, Some(cover)).await?;
        println!("Seeded {}", skill_line(&skill));
    }
    Ok(())
}

pub(crate) async fn sign_up(app: &AppServices, args: &Args) -> CmdResult {
    let form = SignUpForm {
        full_name: args.name.clone().unwrap_or_default(),
        email: args.email.clone().unwrap_or_default(),
        password: args.password.clone().unwrap_or_default(),
        confirm_password: args.confirm.clone().unwrap_or_default(),
    };
    let (identity, profile) = app.accounts().sign_up(&form).await?;
    println!(
        "Welcome, {}! Account {} created for {}.",
        profile.first_name(),
        identity.user_id,
        identity.email
    );
    Ok(())
}

pub(crate) async fn dashboard(app: &AppServices, args: &Args) -> CmdResult {
    let ctx = signed_in(app, args).await?;
    print_dashboard(app, &ctx).await
}

async fn print_dashboard(app: &AppServices, ctx: &SessionContext) -> CmdResult {
    let vm = app.dashboard().load(ctx).await?;

    println!("Welcome back, {}!", vm.greeting_name);
    println!();
    println!("My skills:");
    if vm.enrolled.is_empty() {
        println!("  (none yet, enroll in a skill below)");
    }
    for skill in &vm.enrolled {
        println!("  {}", skill_line(skill));
    }
    println!();
    println!("Available skills:");
    for skill in &vm.available {
        println!("  {}", skill_line(skill));
    }
    println!();
    println!("Recent activity ({} completed):", vm.completed_sessions);
    for session in &vm.recent_sessions {
        let title = vm
            .enrolled
            .iter()
            .chain(&vm.available)
            .find(|s| s.id() == session.skill_id())
            .map_or("(removed skill)", Skill::title);
        println!(
            "  {}  {}  {}  {}",
            session.completed_at().format("%Y-%m-%d %H:%M"),
            title,
            session.accuracy(),
            session.feedback()
        );
    }
    Ok(())
}

pub(crate) async fn enroll(app: &AppServices, args: &Args) -> CmdResult {
    let skill_id = args.skill.ok_or("--skill is required")?;
    let mut ctx = signed_in(app, args).await?;
    let dashboard = app.dashboard();
    let mut vm = dashboard.load(&ctx).await?;
    dashboard.enroll(&mut ctx, &mut vm, skill_id).await?;
    println!("Enrolled. You now have {} skill(s).", vm.enrolled.len());
    Ok(())
}

pub(crate) async fn author(app: &AppServices, args: &Args) -> CmdResult {
    let draft_path = args.draft.as_ref().ok_or("--draft is required")?;
    let cover_path = args.cover.as_ref().ok_or("--cover is required")?;
    let ctx = signed_in(app, args).await?;

    let draft = SkillDraft::from_json(&tokio::fs::read_to_string(draft_path).await?)?;
    let cover = CoverImage {
        file_name: cover_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "cover".into()),
        bytes: tokio::fs::read(cover_path).await?,
    };
    let skill = app.authoring().publish(&ctx, draft, Some(cover)).await?;
    println!("Published {}", skill_line(&skill));
    println!("Cover: {}", skill.cover_url());
    Ok(())
}

pub(crate) async fn history(app: &AppServices, args: &Args) -> CmdResult {
    let ctx = signed_in(app, args).await?;
    let items = app.session_log().history(ctx.user_id()).await?;
    if items.is_empty() {
        println!("No training sessions yet.");
    }
    for item in items {
        println!(
            "{}  {}  {}  {}",
            item.completed_at.format("%Y-%m-%d %H:%M"),
            item.skill_title.as_deref().unwrap_or("(removed skill)"),
            item.accuracy,
            item.feedback
        );
    }
    Ok(())
}

fn render(attempt: &TrainingAttempt) {
    match attempt.phase() {
        TrainingPhase::StepActive { .. } => {
            let progress = attempt.progress();
            if let Some(step) = attempt.current_step() {
                println!(
                    "Step {}/{} ({}%): {}",
                    progress.step_number,
                    progress.total_steps,
                    progress.percent(),
                    step.title()
                );
                println!("  {}", step.instruction());
            }
            if let Some(message) = attempt.feedback() {
                println!("  {message}");
            }
        }
        TrainingPhase::StepResult { .. } | TrainingPhase::Error(_) => {
            if let Some(message) = attempt.feedback() {
                println!("{message}");
            }
        }
        TrainingPhase::Complete => match attempt.session() {
            Some(session) => {
                println!("Module complete. Accuracy: {}", session.accuracy());
                println!("{}", session.feedback());
            }
            None => println!("Module complete."),
        },
        TrainingPhase::Loading | TrainingPhase::Analyzing { .. } => {}
    }
}

/// A key the trainee can press, resolved against the current phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Choice {
    Verify,
    Next,
    Save,
    Restart,
    Dashboard,
    Quit,
}

fn prompt(attempt: &TrainingAttempt) -> Option<&'static str> {
    match attempt.phase() {
        TrainingPhase::StepActive { .. } => Some("[v]erify  [r]estart  [q]uit"),
        TrainingPhase::StepResult { verdict, .. } if verdict.is_success() => {
            Some("[n]ext  [r]estart  [q]uit")
        }
        TrainingPhase::StepResult { .. } => Some("[v] try again  [r]estart  [q]uit"),
        TrainingPhase::Complete if attempt.session_id().is_none() => {
            Some("[s]ave again  [r]etry module  [q]uit without saving")
        }
        TrainingPhase::Complete => Some("[r]etry module  [d]ashboard  [q]uit"),
        TrainingPhase::Error(TrainingFault::FetchFailed(_)) => Some("[r]etry  [q]uit"),
        TrainingPhase::Error(_) | TrainingPhase::Loading | TrainingPhase::Analyzing { .. } => {
            None
        }
    }
}

/// Only the keys offered by [`prompt`] for the current phase are accepted.
fn choice(attempt: &TrainingAttempt, input: &str) -> Option<Choice> {
    let choice = match input {
        "v" => Choice::Verify,
        "n" => Choice::Next,
        "s" => Choice::Save,
        "r" => Choice::Restart,
        "d" => Choice::Dashboard,
        "q" => Choice::Quit,
        _ => return None,
    };
    let allowed = match (attempt.phase(), choice) {
        (_, Choice::Quit) => prompt(attempt).is_some(),
        (TrainingPhase::StepActive { .. }, Choice::Verify | Choice::Restart) => true,
        (TrainingPhase::StepResult { verdict, .. }, Choice::Next | Choice::Restart) => {
            verdict.is_success() || choice == Choice::Restart
        }
        (TrainingPhase::StepResult { verdict, .. }, Choice::Verify) => !verdict.is_success(),
        (TrainingPhase::Complete, Choice::Restart) => true,
        (TrainingPhase::Complete, Choice::Save) => attempt.session_id().is_none(),
        (TrainingPhase::Complete, Choice::Dashboard) => attempt.session_id().is_some(),
        (TrainingPhase::Error(TrainingFault::FetchFailed(_)), Choice::Restart) => true,
        _ => false,
    };
    allowed.then_some(choice)
}

/// Next line of input, or `None` on end of input or once `interrupt` fires.
async fn next_input<R, F>(lines: &mut Lines<R>, interrupt: F) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
    F: Future<Output = std::io::Result<()>>,
{
    tokio::select! {
        biased;
        Ok(()) = interrupt => Ok(None),
        line = lines.next_line() => line,
    }
}

async fn verify_step(app: &AppServices, active: &mut ActiveTraining) {
    println!("Analyzing... (Ctrl+C cancels)");
    let training = app.training();
    tokio::select! {
        result = training.verify(active) => {
            if let Err(err) = result {
                println!("{err}");
            }
        }
        _ = tokio::signal::ctrl_c() => println!("Analysis cancelled."),
    }
}

/// Interactive training loop over stdin.
pub(crate) async fn train(app: &AppServices, args: &Args) -> CmdResult {
    let skill_id = args.skill.ok_or("--skill is required")?;
    let ctx = signed_in(app, args).await?;
    let training = app.training();
    let mut active = training.open(&ctx, skill_id).await?;
    if let Some(skill) = active.attempt().skill() {
        println!("{}", skill.title());
        println!("{}", skill.description());
        println!();
    }
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        render(active.attempt());
        let Some(choices) = prompt(active.attempt()) else {
            training.abandon(active);
            return Ok(());
        };
        print!("{choices} > ");
        std::io::stdout().flush()?;

        // Ctrl+C at the prompt leaves like `q`.
        let input = next_input(&mut lines, tokio::signal::ctrl_c()).await?;
        let picked = match input.as_deref() {
            None => Some(Choice::Quit),
            Some(line) => choice(active.attempt(), line.trim()),
        };
        match picked {
            Some(Choice::Verify) => verify_step(app, &mut active).await,
            Some(Choice::Next) => {
                if let Err(err) = training.advance(&mut active).await {
                    println!("Could not save the session: {err}");
                }
            }
            Some(Choice::Save) => {
                if let Err(err) = training.finalize_session(&mut active).await {
                    println!("Could not save the session: {err}");
                }
            }
            Some(Choice::Restart) => active = training.retry_module(active).await?,
            Some(Choice::Dashboard) => {
                drop(active);
                println!();
                return print_dashboard(app, &ctx).await;
            }
            Some(Choice::Quit) => {
                if active.attempt().session_id().is_some() {
                    println!("Session saved.");
                } else {
                    training.abandon(active);
                    println!("Left the module. Nothing was saved.");
                }
                return Ok(());
            }
            None => println!("Unknown choice: {}", input.as_deref().unwrap_or_default().trim()),
        }
    }
}
