use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use gateway::{Backend, ClientConfig, HttpBackend};
use proctor_core::model::{AssessmentId, LiveSessionId, ParticipantId};
use services::live_sync::Roster;
use services::{
    AssessmentLoader, LiveSessionSync, Lobby, LobbyError, ScheduleChecker, SessionBuilder,
    SessionCommand, SessionDeps, SessionError, SyncConfig, SyncNotification,
};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod terminal;

use terminal::TerminalPrompt;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidId { flag: &'static str, raw: String },
    Required { flag: &'static str },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidId { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::Required { flag } => write!(f, "{flag} is required"),
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

fn parse_id<T: FromStr>(raw: String, flag: &'static str) -> Result<T, ArgsError> {
    raw.parse().map_err(|_| ArgsError::InvalidId { flag, raw })
}

fn env_id<T: FromStr>(var: &str) -> Option<T> {
    std::env::var(var).ok().and_then(|value| value.parse().ok())
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- take    --assessment-id <id> [--participant-id <id>] [options]");
    eprintln!("  cargo run -p app -- observe --session-id <id> [--schedule] [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --api-url <url>   backend base URL");
    eprintln!("  --token <token>   bearer token");
    eprintln!("  -v, --verbose     debug logging");
    eprintln!();
    eprintln!("While taking: an option number (or `1,3`), free text, next, prev, back, submit, retry.");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  PROCTOR_API_URL, PROCTOR_API_TOKEN, PROCTOR_HTTP_TIMEOUT_SECS");
    eprintln!("  PROCTOR_ASSESSMENT_ID, PROCTOR_PARTICIPANT_ID, PROCTOR_SESSION_ID");
    eprintln!("  PROCTOR_POLL_INTERVAL_MS, PROCTOR_SCHEDULE_INTERVAL_MS, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Take,
    Observe,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "take" => Some(Self::Take),
            "observe" => Some(Self::Observe),
            _ => None,
        }
    }
}

struct Args {
    api_url: Option<String>,
    token: Option<String>,
    assessment_id: Option<AssessmentId>,
    participant_id: ParticipantId,
    session_id: Option<LiveSessionId>,
    schedule: bool,
    verbose: bool,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut parsed = Self {
            api_url: None,
            token: std::env::var("PROCTOR_API_TOKEN").ok(),
            assessment_id: env_id("PROCTOR_ASSESSMENT_ID"),
            participant_id: env_id("PROCTOR_PARTICIPANT_ID").unwrap_or(ParticipantId::new(1)),
            session_id: env_id("PROCTOR_SESSION_ID"),
            schedule: false,
            verbose: false,
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--api-url" => parsed.api_url = Some(require_value(args, "--api-url")?),
                "--token" => parsed.token = Some(require_value(args, "--token")?),
                "--assessment-id" => {
                    let value = require_value(args, "--assessment-id")?;
                    parsed.assessment_id = Some(parse_id(value, "--assessment-id")?);
                }
                "--participant-id" => {
                    let value = require_value(args, "--participant-id")?;
                    parsed.participant_id = parse_id(value, "--participant-id")?;
                }
                "--session-id" => {
                    let value = require_value(args, "--session-id")?;
                    parsed.session_id = Some(parse_id(value, "--session-id")?);
                }
                "--schedule" => parsed.schedule = true,
                "--verbose" | "-v" => parsed.verbose = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(parsed)
    }

    fn backend(&self) -> Result<Backend, Box<dyn std::error::Error>> {
        let mut config = match &self.api_url {
            Some(url) => ClientConfig::new(url)?,
            None => ClientConfig::from_env()?,
        };
        if let Some(token) = &self.token {
            config = config.with_token(token.clone());
        }
        Ok(Backend::from_adapter(HttpBackend::new(config)?))
    }
}

fn init_tracing(verbose: bool) {
    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| if verbose { "debug" } else { "info" }.to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Cancelled on Ctrl-C.
fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let on_interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });
    token
}

async fn take(
    backend: &Backend,
    assessment_id: AssessmentId,
    participant: ParticipantId,
    sync: &SyncConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let loader = AssessmentLoader::new(Arc::clone(&backend.assessments));
    let definition = match loader.load(assessment_id).await {
        Ok(definition) => definition,
        Err(err) => {
            eprintln!("{err}. Returning to the library...");
            tokio::time::sleep(err.redirect_delay()).await;
            return Err(err.into());
        }
    };
    println!("{}", definition.title());

    if definition.live_session().is_some() {
        let lobby = Lobby::for_assessment(Arc::clone(&backend.live), &definition, participant, sync)?;
        println!("Waiting for the proctor to start session {}...", lobby.session());
        match lobby.wait_until_active(&interrupt_token()).await {
            Ok(_) => {}
            Err(LobbyError::Cancelled) => return Ok(()),
            Err(err) => return Err(err.into()),
        }
    }

    let prompt = Arc::new(TerminalPrompt::default());
    let mut controller = SessionBuilder::new(
        definition.clone(),
        SessionDeps::from_backend(backend, participant),
    )
    .with_exit_prompt(prompt.clone())
    .build()?;
    let views = controller.subscribe();

    let (commands, inbox) = mpsc::channel(16);
    commands.send(SessionCommand::Start).await?;

    let session = controller.run_until_finished(inbox);
    tokio::pin!(session);
    let input = terminal::drive(&definition, commands, views, prompt.as_ref());

    // EOF drops the command sender, which ends the session loop.
    let finished = tokio::select! {
        result = &mut session => Some(result),
        () = input => None,
    };
    let result = match finished {
        Some(result) => result,
        None => session.await,
    };

    match result {
        Ok(receipt) => {
            println!(
                "Submission {} recorded ({:?}).",
                receipt.submission_id, receipt.trigger
            );
            Ok(())
        }
        Err(SessionError::Abandoned) => {
            eprintln!("Left without submitting.");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

fn print_roster(roster: &Roster) {
    println!(
        "{} participants, {} away, {} submitted{}",
        roster.len(),
        roster.away_count(),
        roster.submitted_count(),
        if roster.is_active() { "" } else { " (not started)" }
    );
    for participant in roster.participants() {
        println!(
            "  {:<24} question {:>3}  answered {:>3}  focus lost {:>2}{}{}",
            participant.display_name,
            participant.current_index + 1,
            participant.answered,
            participant.focus_loss_count,
            if participant.is_away { "  AWAY" } else { "" },
            if participant.submitted { "  SUBMITTED" } else { "" },
        );
    }
}

async fn observe(
    backend: &Backend,
    session: LiveSessionId,
    schedule: bool,
    sync: &SyncConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let cancel = interrupt_token();
    let mut live = LiveSessionSync::new(Arc::clone(&backend.live), sync);
    let mut notifications = live.notifications();
    let mut roster = live.roster();
    live.retarget(session);
    info!(session_id = %session, schedule, "observing live session");

    if schedule {
        let checker = ScheduleChecker::new(Arc::clone(&backend.live), session, sync);
        tokio::spawn(checker.run(cancel.child_token()));
    }

    let mut last_printed: Option<Roster> = None;
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            notification = notifications.recv() => match notification {
                Ok(SyncNotification::SessionStarted(id)) => println!("Session {id} started."),
                Ok(SyncNotification::ParticipantJoined(id)) => println!("+ participant {id}"),
                Ok(SyncNotification::ParticipantLeft(id)) => println!("- participant {id}"),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "observer fell behind on notifications");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            changed = roster.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = roster.borrow_and_update().clone();
                if last_printed.as_ref() != Some(&current) {
                    print_roster(&current);
                    last_printed = Some(current);
                }
            }
        }
    }

    live.stop();
    cancel.cancel();
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    let cmd = match argv.first().map(String::as_str) {
        None | Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };
    argv.remove(0);

    let mut iter = argv.into_iter();
    let parsed = Args::parse(&mut iter).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    init_tracing(parsed.verbose);
    let sync = SyncConfig::from_env()?;
    let backend = parsed.backend()?;

    match cmd {
        Command::Take => {
            let assessment_id = parsed.assessment_id.ok_or(ArgsError::Required {
                flag: "--assessment-id",
            })?;
            take(&backend, assessment_id, parsed.participant_id, &sync).await
        }
        Command::Observe => {
            let session = parsed.session_id.ok_or(ArgsError::Required {
                flag: "--session-id",
            })?;
            observe(&backend, session, parsed.schedule, &sync).await
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
