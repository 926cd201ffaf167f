use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use services::training::{DEFAULT_ANALYSIS_DELAY, SyntheticCamera};
use services::{AppServices, Clock, Devices};
use skill_core::model::SkillId;
use storage::repository::Storage;
use tracing_subscriber::{EnvFilter, fmt as log_fmt, layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

mod commands;

const DEFAULT_DB_URL: &str = "sqlite://skillar.sqlite3";
const DEFAULT_BLOB_BASE: &str = "https://blobs.skillar.local";

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingFlag { command: &'static str, flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidBlobBase { raw: String },
    InvalidDelay { raw: String },
    InvalidSkillId { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingFlag { command, flag } => {
                write!(f, "{command} requires {flag}")
            }
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidBlobBase { raw } => {
                write!(f, "invalid --blob-base value (expected URL): {raw}")
            }
            ArgsError::InvalidDelay { raw } => {
                write!(f, "invalid --analysis-delay-ms value: {raw}")
            }
            ArgsError::InvalidSkillId { raw } => write!(f, "invalid --skill value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  skillar seed      [--email <admin email>] [--password <pw>]");
    eprintln!("  skillar signup    --name <full name> --email <email>");
    eprintln!("                    --password <pw> --confirm <pw>");
    eprintln!("  skillar dashboard --email <email> --password <pw>");
    eprintln!("  skillar enroll    --email <email> --password <pw> --skill <id>");
    eprintln!("  skillar author    --email <email> --password <pw>");
    eprintln!("                    --draft <json file> --cover <image>");
    eprintln!("  skillar train     --email <email> --password <pw> --skill <id>");
    eprintln!("  skillar history   --email <email> --password <pw>");
    eprintln!();
    eprintln!("Common flags:");
    eprintln!("  --db <sqlite_url>            default {DEFAULT_DB_URL}");
    eprintln!("  --blob-base <url>            default {DEFAULT_BLOB_BASE}");
    eprintln!("  --analysis-delay-ms <ms>     default 2000");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  SKILLAR_DB_URL, SKILLAR_BLOB_BASE_URL, SKILLAR_ANALYSIS_DELAY_MS,");
    eprintln!("  SKILLAR_EMAIL, SKILLAR_PASSWORD, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Seed,
    SignUp,
    Dashboard,
    Enroll,
    Author,
    Train,
    History,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "seed" => Some(Self::Seed),
            "signup" => Some(Self::SignUp),
            "dashboard" => Some(Self::Dashboard),
            "enroll" => Some(Self::Enroll),
            "author" => Some(Self::Author),
            "train" => Some(Self::Train),
            "history" => Some(Self::History),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Seed => "seed",
            Self::SignUp => "signup",
            Self::Dashboard => "dashboard",
            Self::Enroll => "enroll",
            Self::Author => "author",
            Self::Train => "train",
            Self::History => "history",
        }
    }
}

/// Settings shared by every command plus the per-command inputs.
#[derive(Debug, Clone)]
pub(crate) struct Args {
    pub db_url: String,
    pub blob_base: Url,
    pub analysis_delay: Duration,
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    pub confirm: Option<String>,
    pub skill: Option<SkillId>,
    pub draft: Option<PathBuf>,
    pub cover: Option<PathBuf>,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("SKILLAR_DB_URL")
            .ok()
            .map_or_else(|| DEFAULT_DB_URL.into(), normalize_sqlite_url);
        let mut blob_base = match std::env::var("SKILLAR_BLOB_BASE_URL") {
            Ok(raw) => parse_blob_base(raw)?,
            Err(_) => parse_blob_base(DEFAULT_BLOB_BASE.into())?,
        };
        let mut analysis_delay = std::env::var("SKILLAR_ANALYSIS_DELAY_MS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .map_or(DEFAULT_ANALYSIS_DELAY, Duration::from_millis);
        let mut email = std::env::var("SKILLAR_EMAIL").ok();
        let mut password = std::env::var("SKILLAR_PASSWORD").ok();
        let mut name = None;
        let mut confirm = None;
        let mut skill = None;
        let mut draft = None;
        let mut cover = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--blob-base" => {
                    blob_base = parse_blob_base(require_value(args, "--blob-base")?)?;
                }
                "--analysis-delay-ms" => {
                    let value = require_value(args, "--analysis-delay-ms")?;
                    let parsed: u64 = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidDelay { raw: value.clone() })?;
                    analysis_delay = Duration::from_millis(parsed);
                }
                "--email" => email = Some(require_value(args, "--email")?),
                "--password" => password = Some(require_value(args, "--password")?),
                "--name" => name = Some(require_value(args, "--name")?),
                "--confirm" => confirm = Some(require_value(args, "--confirm")?),
                "--skill" => {
                    let value = require_value(args, "--skill")?;
                    let parsed: SkillId = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidSkillId { raw: value.clone() })?;
                    skill = Some(parsed);
                }
                "--draft" => draft = Some(PathBuf::from(require_value(args, "--draft")?)),
                "--cover" => cover = Some(PathBuf::from(require_value(args, "--cover")?)),
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            blob_base,
            analysis_delay,
            email,
            password,
            name,
            confirm,
            skill,
            draft,
            cover,
        })
    }

    fn check_required(&self, cmd: Command) -> Result<(), ArgsError> {
        let signed_in = !matches!(cmd, Command::Seed);
        let missing = |present: bool, flag: &'static str| {
            if present {
                Ok(())
            } else {
                Err(ArgsError::MissingFlag {
                    command: cmd.name(),
                    flag,
                })
            }
        };
        if signed_in {
            missing(self.email.is_some(), "--email")?;
            missing(self.password.is_some(), "--password")?;
        }
        match cmd {
            Command::SignUp => {
                missing(self.name.is_some(), "--name")?;
                missing(self.confirm.is_some(), "--confirm")
            }
            Command::Enroll | Command::Train => missing(self.skill.is_some(), "--skill"),
            Command::Author => {
                missing(self.draft.is_some(), "--draft")?;
                missing(self.cover.is_some(), "--cover")
            }
            Command::Seed | Command::Dashboard | Command::History => Ok(()),
        }
    }
}

fn parse_blob_base(raw: String) -> Result<Url, ArgsError> {
    Url::parse(raw.trim()).map_err(|_| ArgsError::InvalidBlobBase { raw })
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(log_fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);

    let cmd = match argv.next() {
        None => {
            print_usage();
            return Ok(());
        }
        Some(first) if first == "--help" || first == "-h" => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(&first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    let parsed = Args::parse(&mut argv)
        .and_then(|args| args.check_required(cmd).map(|()| args))
        .map_err(|e| {
            eprintln!("{e}");
            print_usage();
            e
        })?;

    // Open + migrate SQLite here so core/services stay storage-agnostic.
    prepare_sqlite_file(&parsed.db_url)?;
    let storage = Storage::sqlite(&parsed.db_url, parsed.blob_base.clone()).await?;
    let devices = Devices::simulated(
        Arc::new(SyntheticCamera::granted()),
        parsed.analysis_delay,
    );
    let app = AppServices::from_storage(&storage, Clock::system(), devices);
    tracing::debug!(db = %parsed.db_url, command = cmd.name(), "storage ready");

    match cmd {
        Command::Seed => commands::seed(&app, &storage, &parsed).await,
        Command::SignUp => commands::sign_up(&app, &parsed).await,
        Command::Dashboard => commands::dashboard(&app, &parsed).await,
        Command::Enroll => commands::enroll(&app, &parsed).await,
        Command::Author => commands::author(&app, &parsed).await,
        Command::Train => commands::train(&app, &parsed).await,
        Command::History => commands::history(&app, &parsed).await,
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    if let Err(err) = run().await {
        // Binary glue: print once and exit.
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_urls_are_made_absolute() {
        assert_eq!(
            normalize_sqlite_url("sqlite::memory:".into()),
            "sqlite::memory:"
        );
        assert_eq!(
            normalize_sqlite_url("sqlite:///tmp/skillar.db".into()),
            "sqlite:///tmp/skillar.db"
        );
        assert_eq!(
            normalize_sqlite_url("sqlite:/var/data/skillar.db".into()),
            "sqlite:///var/data/skillar.db"
        );
    }

    #[test]
    fn train_requires_a_skill() {
        let mut argv = ["--email", "a@b.io", "--password", "secret1"]
            .into_iter()
            .map(String::from);
        let args = Args::parse(&mut argv).unwrap();
        let err = args.check_required(Command::Train).unwrap_err();
        assert_eq!(err.to_string(), "train requires --skill");
        assert!(args.check_required(Command::History).is_ok());
    }

    #[test]
    fn unknown_flags_are_rejected() {
        let mut argv = ["--deck-id", "1"].into_iter().map(String::from);
        assert!(matches!(
            Args::parse(&mut argv),
            Err(ArgsError::UnknownArg(arg)) if arg == "--deck-id"
        ));
    }
}
