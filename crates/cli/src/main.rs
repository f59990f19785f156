mod config;
mod error;
mod operator;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use broker::{Checkpoint, Context, Granularity, ResultVector, Session, drive};
use chrono::{Local, TimeZone};
use clap::{Parser, Subcommand, ValueEnum};
use storage::{Event, EventKind, EventStore, GrantTable, SessionId};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use config::Config;
use error::{Error, Result};
use operator::TerminalOperator;

const CONFIG_FILE: &str = "permgate.toml";

#[derive(Parser)]
#[command(name = "permgate")]
#[command(about = "Runtime capability grant broker", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (policy, session settings and catalog)
    #[arg(short, long, global = true, default_value = CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Request capabilities for an application and answer the prompts
    Request {
        /// Application ID
        #[arg(short, long)]
        app: String,
        /// Ask per group or per capability (overrides the config file)
        #[arg(short, long)]
        granularity: Option<GranularityArg>,
        /// Requested capabilities, in order
        capabilities: Vec<String>,
    },
    /// Continue an unfinished session from its last checkpoint
    Resume {
        /// Session ID (prefix match supported)
        #[arg(short, long)]
        session: String,
    },
    /// List all sessions
    Sessions {
        /// Show only the last N sessions
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
    /// Show audit events for a session
    Logs {
        /// Session ID (prefix match supported)
        #[arg(short, long)]
        session: String,
        /// Filter by event kind (requested, denied, groups_requested, completed)
        #[arg(short, long)]
        kind: Option<String>,
    },
    /// Show stored grant flags for an application
    Grants {
        /// Application ID
        #[arg(short, long)]
        app: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum GranularityArg {
    Group,
    Capability,
}

impl From<GranularityArg> for Granularity {
    fn from(arg: GranularityArg) -> Self {
        match arg {
            GranularityArg::Group => Granularity::Group,
            GranularityArg::Capability => Granularity::Capability,
        }
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

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Request {
            app,
            granularity,
            capabilities,
        } => cmd_request(&cli.config, app, granularity, capabilities).await,
        Commands::Resume { session } => cmd_resume(&cli.config, &session).await,
        Commands::Sessions { limit } => cmd_sessions(limit),
        Commands::Logs { session, kind } => cmd_logs(&session, kind.as_deref()),
        Commands::Grants { app } => cmd_grants(&cli.config, &app),
    }
}

/// Shared collaborators for a session run from the terminal.
struct Runtime {
    ctx: Context,
    store: Arc<EventStore>,
}

fn runtime(config_path: &Path, granularity: Option<GranularityArg>) -> Result<Runtime> {
    let config = Config::load_or_default(config_path)?;
    debug!(path = %config_path.display(), "configuration loaded");

    let db_path = data_dir()?.join("permgate.db");
    let store = Arc::new(EventStore::open(&db_path)?);
    let grants = Arc::new(GrantTable::open(&db_path)?);
    let catalog = Arc::new(config.catalog()?);

    let mut session = config.session;
    if let Some(granularity) = granularity {
        session.granularity = granularity.into();
    }
    let ctx = Context::new(
        catalog.clone(),
        catalog,
        Arc::new(config.policy),
        grants,
        store.clone(),
    )
    .with_config(session);

    Ok(Runtime { ctx, store })
}

async fn cmd_request(
    config_path: &Path,
    app: String,
    granularity: Option<GranularityArg>,
    capabilities: Vec<String>,
) -> Result<()> {
    let Runtime { ctx, store } = runtime(config_path, granularity)?;
    let requested = capabilities.into_iter().map(Into::into).collect();

    let mut session = Session::open(ctx, app, requested);
    println!("Session ID: {}", session.id);
    run_session(&mut session, &store).await
}

async fn cmd_resume(config_path: &Path, session_prefix: &str) -> Result<()> {
    let Runtime { ctx, store } = runtime(config_path, None)?;
    let session_id = find_session(&store, session_prefix)?;
    let checkpoint: Checkpoint = serde_json::from_value(store.load_checkpoint(session_id)?)?;

    let mut session = Session::restore(ctx, checkpoint)?;
    if session.is_complete() {
        println!("Session {session_id} already completed.");
    } else {
        println!("Resuming session {session_id}");
    }
    run_session(&mut session, &store).await
}

async fn run_session(session: &mut Session, store: &Arc<EventStore>) -> Result<()> {
    let mut operator = TerminalOperator::new();
    let sink: &dyn broker::CheckpointSink = &**store;
    let results = drive(session, &mut operator, Some(sink)).await?;
    print_results(session.application().as_str(), &results);
    Ok(())
}

fn print_results(app: &str, results: &ResultVector) {
    println!("\nResults for {app}:");
    if results.is_empty() {
        println!("  (nothing requested)");
    }
    for slot in results.slots() {
        println!("  {:<40}  {}", slot.capability, slot.outcome);
    }
}

fn cmd_sessions(limit: usize) -> Result<()> {
    let store = open_store()?;
    let sessions = store.list_sessions()?;

    if sessions.is_empty() {
        println!("No sessions found.");
        return Ok(());
    }

    println!(
        "{:<36}  {:<24}  {:<16}  {:<5}  STATUS",
        "SESSION ID", "APPLICATION", "STARTED", "REQS"
    );
    println!("{}", "-".repeat(96));

    for summary in sessions.into_iter().take(limit) {
        let started = Local
            .from_utc_datetime(&summary.started_at.naive_utc())
            .format("%Y-%m-%d %H:%M");
        let status = if summary.ended_at.is_some() {
            "completed"
        } else {
            "open"
        };
        println!(
            "{:<36}  {:<24}  {:<16}  {:<5}  {status}",
            summary.id, summary.application, started, summary.request_count
        );
    }

    Ok(())
}

fn cmd_logs(session_prefix: &str, kind_filter: Option<&str>) -> Result<()> {
    let store = open_store()?;
    let session_id = find_session(&store, session_prefix)?;
    let events = store.load_events(session_id, kind_filter)?;

    if events.is_empty() {
        println!("No events found for session {session_id}");
        return Ok(());
    }

    println!("Session: {session_id}\n");

    for event in events {
        print_event(&event);
    }

    Ok(())
}

fn cmd_grants(config_path: &Path, app: &str) -> Result<()> {
    let config = Config::load_or_default(config_path)?;
    let catalog = config.catalog()?;
    let entry = catalog
        .application(&app.into())
        .ok_or_else(|| Error::UnknownApplication(app.to_string()))?;

    let grants = GrantTable::open(data_dir()?.join("permgate.db"))?;

    println!(
        "{:<40}  {:<8}  {:<8}  {:<10}  POLICY FIXED",
        "CAPABILITY", "GRANTED", "USER SET", "USER FIXED"
    );
    println!("{}", "-".repeat(86));
    for capability in &entry.declares {
        let flags = grants.flags(app, capability.as_str())?;
        println!(
            "{:<40}  {:<8}  {:<8}  {:<10}  {}",
            capability,
            yes_no(flags.granted),
            yes_no(flags.user_set),
            yes_no(flags.user_fixed),
            yes_no(flags.policy_fixed)
        );
    }

    Ok(())
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

fn find_session(store: &EventStore, session_prefix: &str) -> Result<SessionId> {
    let sessions = store.list_sessions()?;
    let matching: Vec<_> = sessions
        .iter()
        .filter(|s| s.id.to_string().starts_with(session_prefix))
        .collect();

    match matching.len() {
        0 => Err(Error::SessionNotFound {
            prefix: session_prefix.to_string(),
        }),
        1 => Ok(matching[0].id),
        _ => Err(Error::AmbiguousSession {
            prefix: session_prefix.to_string(),
            matches: matching.iter().map(|s| s.id.to_string()).collect(),
        }),
    }
}

fn print_event(event: &Event) {
    let time = Local
        .from_utc_datetime(&event.timestamp.naive_utc())
        .format("%H:%M:%S");

    match &event.kind {
        EventKind::SessionStart => {
            println!("[{time}] === Session started ({}) ===", event.application);
        }
        EventKind::SessionEnd => {
            println!("[{time}] === Session ended ===");
        }
        EventKind::Requested { capability } => {
            println!("[{time}] REQUESTED: {capability}");
        }
        EventKind::Denied { capability } => {
            println!("[{time}] DENIED: {capability}");
        }
        EventKind::GroupsRequested { groups } => {
            println!("[{time}] GROUPS: {}", groups.join(", "));
        }
        EventKind::Completed { results } => {
            let results: Vec<String> = results
                .iter()
                .map(|r| {
                    let outcome = if r.granted { "GRANTED" } else { "DENIED" };
                    format!("{}={outcome}", r.capability)
                })
                .collect();
            println!("[{time}] COMPLETED: {}", results.join(" "));
        }
    }
}

fn open_store() -> Result<EventStore> {
    let db_path = dirs_data_dir()
        .unwrap_or_else(|| ".permgate".into())
        .join("permgate.db");

    if !db_path.exists() {
        return Err(Error::DatabaseNotFound { path: db_path });
    }

    Ok(EventStore::open(&db_path)?)
}

/// The data directory, created if missing.
fn data_dir() -> Result<PathBuf> {
    let dir = dirs_data_dir().unwrap_or_else(|| ".permgate".into());
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

fn dirs_data_dir() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share/permgate"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share")))
            .map(|p| p.join("permgate"))
    }
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|h| PathBuf::from(h).join("permgate"))
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        None
    }
}
