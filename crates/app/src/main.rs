use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use academy_core::model::{
    AttemptId, Identity, Question, QuizAttempt, QuizDefinition, QuizError, QuizId,
};
use services::{
    AppServices, GuardPhase, InMemoryTokenStore, QuizTimer, SESSION_EXPIRED_NOTICE,
    StaticIdentityProvider, SubmissionState,
};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEMO_USERNAME: &str = "student@example.com";
const DEMO_PASSWORD: &str = "password";
const DEMO_IDENTITY: &str = "student-demo";

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidPollSecs { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidPollSecs { raw } => write!(f, "invalid --poll-secs value: {raw}"),
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
    eprintln!("  cargo run -p app -- quiz    [--db <sqlite_url> | --memory] [--quiz <id>]");
    eprintln!("  cargo run -p app -- seed    [--db <sqlite_url> | --memory]");
    eprintln!("  cargo run -p app -- history [--db <sqlite_url> | --memory] [--quiz <id>]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <url>        sqlite database url (default sqlite:academy.sqlite3)");
    eprintln!("  --memory          in-memory storage, nothing persisted");
    eprintln!("  --poll-secs <n>   session revalidation interval (default 15)");
    eprintln!("  --student <name>  skip the name prompt");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  ACADEMY_DB_URL");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Quiz,
    Seed,
    History,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "quiz" => Some(Self::Quiz),
            "seed" => Some(Self::Seed),
            "history" => Some(Self::History),
            _ => None,
        }
    }
}

struct Args {
    db_url: Option<String>,
    quiz_id: Option<QuizId>,
    poll_secs: u64,
    student: Option<String>,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = Some(
            std::env::var("ACADEMY_DB_URL")
                .ok()
                .map_or_else(|| "sqlite://academy.sqlite3".into(), normalize_sqlite_url),
        );
        let mut quiz_id = None;
        let mut poll_secs = 15;
        let mut student = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = Some(normalize_sqlite_url(value));
                }
                "--memory" => db_url = None,
                "--quiz" => quiz_id = Some(QuizId::new(require_value(args, "--quiz")?)),
                "--poll-secs" => {
                    let value = require_value(args, "--poll-secs")?;
                    poll_secs = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidPollSecs { raw: value.clone() })?;
                    if poll_secs == 0 {
                        return Err(ArgsError::InvalidPollSecs { raw: value });
                    }
                }
                "--student" => student = Some(require_value(args, "--student")?),
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            quiz_id,
            poll_secs,
            student,
        })
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
    let path = std::path::Path::new(&path_str);
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

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuizInput {
    Select(usize),
    Next,
    Previous,
    Submit,
    Quit,
    Blank,
    Unknown,
}

fn parse_quiz_input(line: &str) -> QuizInput {
    match line.trim() {
        "1" | "a" => QuizInput::Select(0),
        "2" | "b" => QuizInput::Select(1),
        "3" | "c" => QuizInput::Select(2),
        "4" | "d" => QuizInput::Select(3),
        "n" => QuizInput::Next,
        "p" => QuizInput::Previous,
        "s" => QuizInput::Submit,
        "q" => QuizInput::Quit,
        "" => QuizInput::Blank,
        _ => QuizInput::Unknown,
    }
}

/// Reply to the submit confirmation; `None` re-asks.
fn parse_confirmation(line: &str) -> Option<bool> {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

fn sample_quiz() -> Result<QuizDefinition, QuizError> {
    let options = |opts: [&str; 4]| opts.iter().map(ToString::to_string).collect();
    QuizDefinition::new(
        QuizId::new("algebra-basics"),
        "class-10",
        "maths",
        "Algebra basics",
        "Linear equations, one variable",
        vec![
            Question::new("3x = 45, x = ?", options(["12", "15", "18", "21"]), 1)?,
            Question::new("x + 7 = 19, x = ?", options(["12", "15", "18", "21"]), 0)?,
            Question::new("2x - 6 = 30, x = ?", options(["12", "15", "18", "21"]), 2)?,
        ],
        2,
    )
}

async fn build_services(args: &Args) -> Result<AppServices, Box<dyn std::error::Error>> {
    let provider = Arc::new(StaticIdentityProvider::new().with_account(
        DEMO_USERNAME,
        DEMO_PASSWORD,
        Identity::new(DEMO_IDENTITY),
    ));

    let services = match &args.db_url {
        Some(url) => {
            prepare_sqlite_file(url)?;
            AppServices::new_sqlite(url, provider).await?
        }
        None => AppServices::new_in_memory(provider),
    };
    Ok(services.with_poll_interval(Duration::from_secs(args.poll_secs)))
}

async fn pick_quiz(
    services: &AppServices,
    requested: Option<&QuizId>,
) -> Result<QuizDefinition, Box<dyn std::error::Error>> {
    let quiz_service = services.quiz_service();
    if let Some(id) = requested {
        return Ok(services.storage().quizzes.get_quiz(id).await?);
    }

    let mut available = quiz_service.available_quizzes().await?;
    if available.is_empty() {
        // An empty store would make the demo a dead end; seed it.
        let quiz = sample_quiz()?;
        services.storage().quizzes.upsert_quiz(&quiz).await?;
        info!(quiz_id = %quiz.id(), "seeded sample quiz into empty store");
        return Ok(quiz);
    }
    Ok(available.remove(0))
}

async fn prompt_line(
    lines: &mut Lines<BufReader<Stdin>>,
    prompt: &str,
) -> Result<String, Box<dyn std::error::Error>> {
    println!("{prompt}");
    let line = lines.next_line().await?.unwrap_or_default();
    Ok(line.trim().to_string())
}

fn render_question(question: &Question, index: usize, total: usize, selected: Option<usize>) {
    println!();
    println!("Question {}/{}: {}", index + 1, total, question.prompt());
    for (i, option) in question.options().iter().enumerate() {
        let marker = if selected == Some(i) { "*" } else { " " };
        println!("  [{marker}] {}. {option}", i + 1);
    }
}

fn render_result(quiz: &QuizDefinition, attempt: &QuizAttempt, id: &AttemptId) {
    println!();
    println!("── Results ──");
    println!(
        "{}: {} / {} correct in {}s (attempt {id})",
        attempt.student_name(),
        attempt.score(),
        attempt.total_questions(),
        attempt.time_taken_secs(),
    );
    for (question, &answer) in quiz.questions().iter().zip(attempt.answers()) {
        let verdict = if answer < 0 {
            "Not Answered".to_string()
        } else if answer as usize == question.correct_answer() {
            format!("Correct ({})", question.options()[answer as usize])
        } else {
            format!(
                "Wrong ({}, correct: {})",
                question.options()[answer as usize],
                question.options()[question.correct_answer()],
            )
        };
        println!("  {} -> {verdict}", question.prompt());
    }
}

async fn run_quiz(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let services = build_services(args).await?;
    let quiz = pick_quiz(&services, args.quiz_id.as_ref()).await?;
    let quiz_service = services.quiz_service();

    let (guard, watcher) = services
        .sign_in(DEMO_USERNAME, DEMO_PASSWORD, Arc::new(InMemoryTokenStore::new()))
        .await?;
    let mut expired = watcher.expired();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let student = match &args.student {
        Some(name) => name.clone(),
        None => {
            let name = prompt_line(&mut lines, "Your name?").await?;
            if name.is_empty() { "anonymous".into() } else { name }
        }
    };

    println!();
    println!(
        "Starting \"{}\" for {student}: {} questions, {} minutes.",
        quiz.title(),
        quiz.total_questions(),
        quiz.time_limit_minutes(),
    );
    println!("Commands: 1-4 (or a-d) select, n next, p previous, s submit, q quit.");

    let engine = quiz_service.start_quiz(quiz.id(), student).await?;
    let engine = Arc::new(Mutex::new(engine));
    let timer = QuizTimer::spawn(Arc::clone(&engine), quiz_service.clone());
    let mut completed = timer.completed();

    // Submission needs an explicit yes once requested; answers freeze only
    // on the confirmed submit.
    let mut confirming = false;

    loop {
        if !confirming {
            let engine = engine.lock().await;
            if engine.state() == SubmissionState::InProgress {
                render_question(
                    engine.current_question(),
                    engine.current_index(),
                    engine.quiz().total_questions(),
                    engine.current_answer(),
                );
                println!(
                    "Progress: {:.0}%  time remaining: {}",
                    engine.progress() * 100.0,
                    engine.remaining_display(),
                );
            }
        }

        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if confirming {
                    match parse_confirmation(&line) {
                        Some(true) => {
                            let mut engine = engine.lock().await;
                            quiz_service.submit(&mut engine, false).await?;
                            confirming = false;
                        }
                        Some(false) => {
                            println!("Submission cancelled; answers stay editable.");
                            confirming = false;
                        }
                        None => println!("Please answer y or n."),
                    }
                    continue;
                }

                let mut engine = engine.lock().await;
                match parse_quiz_input(&line) {
                    QuizInput::Select(option) => {
                        if let Err(error) = engine.select_answer(option) {
                            println!("{error}");
                        }
                    }
                    QuizInput::Next => {
                        if engine.is_last_question() {
                            println!("Already on the last question; submit with 's'.");
                        } else {
                            engine.next();
                        }
                    }
                    QuizInput::Previous => {
                        if engine.is_first_question() {
                            println!("Already on the first question.");
                        } else {
                            engine.previous();
                        }
                    }
                    QuizInput::Submit => {
                        if engine.is_last_question() {
                            println!("Submit and freeze answers? [y/n]");
                            confirming = true;
                        } else {
                            println!("Submission is offered on the last question only.");
                        }
                    }
                    QuizInput::Quit => {
                        println!("Abandoning the attempt.");
                        return Ok(());
                    }
                    QuizInput::Blank => {}
                    QuizInput::Unknown => println!("Unknown command: {}", line.trim()),
                }
            }
            changed = completed.wait_for(|done| done.is_some()) => {
                changed?;
                break;
            }
            changed = expired.wait_for(|expired| *expired) => {
                changed?;
                println!();
                println!("{SESSION_EXPIRED_NOTICE}");
                guard.lock().await.acknowledge_expired(services.provider().as_ref()).await?;
                return Ok(());
            }
        }
    }

    let id = completed
        .borrow()
        .clone()
        .ok_or("attempt finished without a stored id")?;
    let attempt = quiz_service.load_result(&id).await?;
    render_result(&quiz, &attempt, &id);

    let mut guard = guard.lock().await;
    if guard.phase() == GuardPhase::Active {
        guard.logout(services.provider().as_ref()).await?;
    }
    Ok(())
}

async fn run_seed(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let services = build_services(args).await?;
    let quiz = sample_quiz()?;
    services.storage().quizzes.upsert_quiz(&quiz).await?;
    println!(
        "Seeded quiz \"{}\" ({}) with {} questions.",
        quiz.title(),
        quiz.id(),
        quiz.total_questions(),
    );
    Ok(())
}

async fn run_history(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let services = build_services(args).await?;
    let quiz = pick_quiz(&services, args.quiz_id.as_ref()).await?;
    let history = services.quiz_service().attempt_history(quiz.id()).await?;

    println!("Attempts for \"{}\":", quiz.title());
    if history.is_empty() {
        println!("  (none)");
    }
    for (id, attempt) in history {
        println!(
            "  {} | {} | {}/{} in {}s | {}",
            attempt.timestamp().format("%Y-%m-%d %H:%M:%S"),
            attempt.student_name(),
            attempt.score(),
            attempt.total_questions(),
            attempt.time_taken_secs(),
            id,
        );
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    // Default behavior: run the quiz when no subcommand is provided.
    let cmd = match argv.first().map(String::as_str) {
        None => Command::Quiz,
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) if first.starts_with("--") => Command::Quiz,
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    if !argv.is_empty() && !argv[0].starts_with("--") {
        argv.remove(0);
    }

    let mut iter = argv.into_iter();
    let args = Args::parse(&mut iter).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    match cmd {
        Command::Quiz => run_quiz(&args).await,
        Command::Seed => run_seed(&args).await,
        Command::History => run_history(&args).await,
    }
}


#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
