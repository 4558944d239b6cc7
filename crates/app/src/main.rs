use std::fmt;
use std::path::Path;

use exam_core::model::{Exam, ExamId, QuestionIndex, SessionScope, UserId};
use exam_core::registry::{QuestionView, dispatch};
use exam_core::timer::{Severity, TimerUpdate};
use services::{Clock, SessionEvent, SessionLoopService, SessionRunner};
use storage::record::ExamRecord;
use storage::repository::Storage;
use storage::sqlite::SqliteRepository;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

mod input;

use input::{HELP, Line, parse_line};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingOption {
        flag: &'static str,
        env: Option<&'static str>,
    },
    UnknownArg(String),
    InvalidId { flag: &'static str, raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingOption {
                flag,
                env: Some(env),
            } => write!(f, "{flag} is required (or set {env})"),
            ArgsError::MissingOption { flag, env: None } => write!(f, "{flag} is required"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidId { flag, raw } => write!(f, "invalid {flag} value: {raw:?}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
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
    eprintln!("  app import --file <exam.json> [--db <sqlite_url>] [--exam-id <id>]");
    eprintln!("  app take   --exam-id <id> [--db <sqlite_url>] [--user <id>]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite://exam.sqlite3");
    eprintln!("  --user (none: anonymous attempt)");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  EXAM_DB_URL, EXAM_ID, EXAM_USER, EXAM_LOG (falls back to RUST_LOG)");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Import,
    Take,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "import" => Some(Self::Import),
            "take" => Some(Self::Take),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Args {
    db_url: String,
    exam_id: Option<ExamId>,
    user: Option<UserId>,
    file: Option<String>,
}

fn non_blank_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut parsed = Self {
            db_url: non_blank_env("EXAM_DB_URL")
                .map_or_else(|| "sqlite://exam.sqlite3".into(), normalize_sqlite_url),
            exam_id: non_blank_env("EXAM_ID").map(ExamId::new),
            user: non_blank_env("EXAM_USER").map(UserId::new),
            file: None,
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    parsed.db_url = normalize_sqlite_url(value);
                }
                "--exam-id" => {
                    let value = require_value(args, "--exam-id")?;
                    let id = value.parse().map_err(|_| ArgsError::InvalidId {
                        flag: "--exam-id",
                        raw: value.clone(),
                    })?;
                    parsed.exam_id = Some(id);
                }
                "--user" => {
                    let value = require_value(args, "--user")?;
                    let id = value.parse().map_err(|_| ArgsError::InvalidId {
                        flag: "--user",
                        raw: value.clone(),
                    })?;
                    parsed.user = Some(id);
                }
                "--file" => parsed.file = Some(require_value(args, "--file")?),
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(parsed)
    }

    fn scope(&self) -> SessionScope {
        self.user
            .clone()
            .map_or(SessionScope::Anonymous, SessionScope::User)
    }
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
    let path = Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
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

    let path = Path::new(path);
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
    let filter = non_blank_env("EXAM_LOG")
        .and_then(|spec| EnvFilter::try_new(spec).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

//
// ─── IMPORT ────────────────────────────────────────────────────────────────────
//

async fn run_import(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let file = args.file.ok_or(ArgsError::MissingOption {
        flag: "--file",
        env: None,
    })?;
    let text = std::fs::read_to_string(&file)?;
    let record = ExamRecord::from_json(&text)?;

    // without an explicit or embedded id, the file stem names the exam
    let fallback = args.exam_id.unwrap_or_else(|| {
        ExamId::new(
            Path::new(&file)
                .file_stem()
                .map_or_else(|| "exam".into(), |s| s.to_string_lossy().into_owned()),
        )
    });

    prepare_sqlite_file(&args.db_url)?;
    let repo = SqliteRepository::connect(&args.db_url).await?;
    repo.migrate().await?;
    let id = repo.import_exam(&record, &fallback).await?;
    println!("imported {id}");
    Ok(())
}

//
// ─── TAKE ──────────────────────────────────────────────────────────────────────
//

fn describe_question(exam: &Exam, index: QuestionIndex) -> String {
    let Some(question) = exam.question(index) else {
        return format!("Q{index}");
    };
    match dispatch(question) {
        QuestionView::Supported { question, kind } => {
            let mut line = format!("Q{index} [{kind}]");
            if let Some(instructions) = question.instructions() {
                line.push_str(": ");
                line.push_str(instructions);
            }
            line
        }
        QuestionView::Fallback(diagnostic) => {
            format!("Q{index}: {}\n{}", diagnostic.message, diagnostic.dump)
        }
    }
}

/// Print on severity changes and on whole minutes.
struct ClockPrinter {
    last: Option<Severity>,
}

impl ClockPrinter {
    fn show(&mut self, update: &TimerUpdate) {
        let changed = self.last != Some(update.severity);
        if changed || update.remaining_secs % 60 == 0 {
            println!("[{}] {} left", severity_label(update.severity), update.display);
        }
        self.last = Some(update.severity);
    }
}

fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Normal => "time",
        Severity::Caution => "caution",
        Severity::Warning => "warning",
        Severity::Critical => "critical",
    }
}

async fn print_events(exam: Exam, mut events: mpsc::Receiver<SessionEvent>) {
    let mut clock = ClockPrinter { last: None };
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Timer(update) => clock.show(&update),
            SessionEvent::Answered { index, outcome } => println!("Q{index}: {outcome}"),
            SessionEvent::Moved { current, part } => {
                if let Some(part) = part {
                    println!("Part {part}");
                }
                println!("{}", describe_question(&exam, current));
            }
            SessionEvent::ReviewToggled { index, marked } => {
                let verb = if marked { "marked" } else { "unmarked" };
                println!("Q{index} {verb} for review");
            }
            SessionEvent::Status(status) => {
                let marked: Vec<String> =
                    status.review_marked.iter().map(ToString::to_string).collect();
                println!(
                    "Q{} of {} (part {}), {} answered, review [{}], {} left",
                    status.current,
                    status.total,
                    status.part.map_or_else(|| "-".into(), |p| p.to_string()),
                    status.answered,
                    marked.join(", "),
                    status.timer.display
                );
            }
            SessionEvent::Rejected(reason) => println!("! {reason}"),
            SessionEvent::ConfirmationRequired => {
                println!("Submit the exam? Type `submit!` to confirm.");
            }
            SessionEvent::Submitted { id, trigger } => {
                println!("submitted ({trigger}): {id}");
            }
            SessionEvent::SubmissionFailed { trigger, reason } => {
                println!("! submission ({trigger}) failed: {reason}");
            }
        }
    }
}

async fn run_take(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let exam_id = args.exam_id.clone().ok_or(ArgsError::MissingOption {
        flag: "--exam-id",
        env: Some("EXAM_ID"),
    })?;
    prepare_sqlite_file(&args.db_url)?;
    let storage = Storage::sqlite(&args.db_url).await?;

    let service = SessionLoopService::from_storage(Clock::default(), &storage);
    let session = service.start_session(&exam_id, args.scope()).await?;

    let exam = session.exam().clone();
    println!(
        "{} ({}, {} questions, {} left)",
        exam.title(),
        exam.category(),
        exam.total_questions(),
        TimerUpdate::new(session.remaining_secs()).display
    );
    if let Some(url) = exam.audio_url() {
        println!("audio: {url}");
    }
    println!("{}", describe_question(&exam, session.current_index()));
    println!("type `help` for commands");

    let (events_tx, events_rx) = mpsc::channel(64);
    let (commands_tx, commands_rx) = mpsc::channel(16);
    let printer = tokio::spawn(print_events(exam, events_rx));

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match parse_line(&line) {
                Ok(Line::Command(command)) => {
                    if commands_tx.send(command).await.is_err() {
                        break;
                    }
                }
                Ok(Line::Help) => println!("{HELP}"),
                Ok(Line::Blank) => {}
                Err(err) => println!("! {err}"),
            }
        }
    });

    let session = SessionRunner::new(session, events_tx).run(commands_rx).await;
    printer.await?;

    if session.is_finished() {
        tracing::info!(exam = %exam_id, "session finished");
    } else {
        println!("progress saved; run `take` again to resume");
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let mut argv = std::env::args().skip(1);
    let cmd = match argv.next().as_deref() {
        None | Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            print_usage();
            ArgsError::UnknownArg(first.to_string())
        })?,
    };

    let parsed = Args::parse(&mut argv).inspect_err(|_| print_usage())?;

    match cmd {
        Command::Import => run_import(parsed).await,
        Command::Take => run_take(parsed).await,
    }
}

#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("{err}");
            2
        }
    };
    // stdin is read on a blocking thread that cannot be cancelled; exit
    // without waiting for it
    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, ArgsError> {
        Args::parse(&mut args.iter().map(ToString::to_string))
    }

    #[test]
    fn flags_override_defaults() {
        let args = parse(&[
            "--db",
            "sqlite::memory:",
            "--exam-id",
            "r1",
            "--user",
            "u9",
        ])
        .unwrap();
        assert_eq!(args.db_url, "sqlite::memory:");
        assert_eq!(args.exam_id, Some(ExamId::new("r1")));
        assert_eq!(args.scope(), SessionScope::User(UserId::new("u9")));
    }

    #[test]
    fn bad_flags_are_reported() {
        assert!(matches!(
            parse(&["--exam-id"]),
            Err(ArgsError::MissingValue { flag: "--exam-id" })
        ));
        assert!(matches!(
            parse(&["--exam-id", "  "]),
            Err(ArgsError::InvalidId { .. })
        ));
        assert!(matches!(parse(&["--colour"]), Err(ArgsError::UnknownArg(_))));
    }

    #[test]
    fn relative_paths_become_absolute_urls() {
        let url = normalize_sqlite_url("sqlite:data/exam.db".into());
        assert!(url.starts_with("sqlite:///"));
        assert!(url.ends_with("data/exam.db"));
        assert_eq!(normalize_sqlite_url("sqlite::memory:".into()), "sqlite::memory:");
    }
}
