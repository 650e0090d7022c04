mod api;
mod cli;
mod config;
mod session_store;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use time::macros::format_description;
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;
use utopia_sync::clock::{display_duration, stop_time};
use utopia_sync::domain::{EntityId, TimeEntry};
use utopia_sync::ports::Transport;
use utopia_sync::{
    Credentials, LocalStore, PendingTracker, SyncError, SyncOutcome, SyncSession, TransportError,
};

use api::{DevBackend, HttpTransport};
use cli::{Cli, Commands};
use config::UtopiaConfig;
use session_store::FileSnapshotStore;

const UNAUTH_RELOGIN: &str = "Session expired or invalid. Run `utopia login` to authenticate.";
const UNAUTH_INVALID_CREDENTIALS: &str = "Invalid username or password.";

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("utopia=info,utopia_sync=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::ConfigPath = cli.command {
        let path = UtopiaConfig::config_path()?;
        UtopiaConfig::ensure_exists(&path)?;
        println!("{}", path.display());
        return Ok(());
    }

    let config = UtopiaConfig::load()?;

    if cli.dev {
        let dir = config.dev_state_dir()?;
        tracing::debug!(dir = %dir.display(), "Running against dev backend");
        let backend = DevBackend::open(dir.join("server.json"))
            .context("Failed to open dev backend state")?;
        run(cli.command, Arc::new(backend), FileSnapshotStore::new(dir)).await
    } else {
        let transport =
            HttpTransport::new(&config.api_url, Duration::from_secs(config.timeout_secs))?;
        let store = FileSnapshotStore::new(config.state_dir()?);
        run(cli.command, Arc::new(transport), store).await
    }
}

async fn run<T: Transport>(
    command: Commands,
    transport: Arc<T>,
    snapshots: FileSnapshotStore,
) -> Result<()> {
    let session = SyncSession::restore(&snapshots, transport)
        .await
        .context("Failed to load local data")?;
    let now = OffsetDateTime::now_utc();

    match command {
        Commands::Login { username } => {
            let password = rpassword::prompt_password("Password: ")
                .context("Failed to read password")?;
            match session.login(&Credentials::basic(username, password)).await {
                Err(SyncError::Transport(TransportError::Unauthorized)) => {
                    bail!("{UNAUTH_INVALID_CREDENTIALS}")
                }
                other => other.context("Login failed")?,
            }
            let name = session.with_engine(|engine| {
                engine
                    .store()
                    .user()
                    .map(|user| user.fullname.clone())
                    .unwrap_or_default()
            });
            println!("Logged in as {name}.");
        }
        Commands::Logout => {
            session.logout(&snapshots).await?;
            println!("Logged out. Local data removed.");
            return Ok(());
        }
        Commands::Sync => match session.sync().await {
            Ok(SyncOutcome::Applied(report)) => println!(
                "Synced: {} created, {} changed, {} deleted{}.",
                report.created,
                report.changed,
                report.deleted,
                if report.preserved > 0 {
                    format!(", {} kept for next sync", report.preserved)
                } else {
                    String::new()
                }
            ),
            Ok(SyncOutcome::Discarded) => println!("Sync answer was out of date and ignored."),
            Err(SyncError::Transport(TransportError::Unauthorized)) => bail!("{UNAUTH_RELOGIN}"),
            Err(err) => return Err(err).context("Sync failed, local changes kept"),
        },
        Commands::Start { description } => {
            let started =
                session.with_engine(|engine| engine.start_entry(description.as_deref(), now))?;
            println!("Started {}.", started.id);
        }
        Commands::Stop => match session.with_engine(|engine| engine.stop_running(now)) {
            Some(stopped) => println!(
                "Stopped {} after {}.",
                stopped.id,
                display_duration(&stopped, now)
            ),
            None => println!("Nothing is running."),
        },
        Commands::Continue { id } => {
            let started = session.with_engine(|engine| engine.continue_entry(id, now))?;
            let started = require(started, id)?;
            println!("Started {} from {}.", started.id, id);
        }
        Commands::Describe { id, text } => {
            require(session.with_engine(|engine| engine.edit_description(id, &text, now)), id)?;
        }
        Commands::Project { id, project_id } => {
            if let Some(project_id) = project_id {
                let known =
                    session.with_engine(|engine| engine.store().project(project_id).is_some());
                if !known {
                    bail!("Unknown project {project_id}");
                }
            }
            require(session.with_engine(|engine| engine.edit_project(id, project_id)), id)?;
        }
        Commands::Delete { id } => {
            require(session.with_engine(|engine| engine.delete_entry(id, now)), id)?;
        }
        Commands::List { pending } => session.with_engine(|engine| {
            let store = engine.store();
            for entry in store.visible() {
                if pending && !entry.dirty {
                    continue;
                }
                println!("{}", format_entry(entry, store, now));
            }
        }),
        Commands::Status => session.with_engine(|engine| {
            let store = engine.store();
            match store.user() {
                Some(user) => println!("User:    {} ({:?})", user.fullname, engine.state()),
                None => println!("User:    not logged in"),
            }
            println!(
                "Synced:  {}",
                engine.cursor().map(|c| c.as_str()).unwrap_or("never")
            );
            println!(
                "Pending: {} change(s), {} not yet on the server",
                store.dirty_entries().len(),
                PendingTracker::unconfirmed_ids(store).len()
            );
            match store.running() {
                Some(entry) => println!("Running: {}", format_entry(entry, store, now)),
                None => println!("Running: nothing"),
            }
        }),
        Commands::Discard => {
            let removed = session.with_engine(|engine| engine.discard_unconfirmed());
            let noun = if removed == 1 { "entry" } else { "entries" };
            println!("Discarded {removed} unsynced {noun}.");
        }
        Commands::ConfigPath => {}
    }

    session
        .save(&snapshots)
        .await
        .context("Failed to save local data")?;
    Ok(())
}

fn require(entry: Option<TimeEntry>, id: EntityId) -> Result<TimeEntry> {
    entry.with_context(|| format!("No time entry with id {id}"))
}

fn format_entry(entry: &TimeEntry, store: &LocalStore, now: OffsetDateTime) -> String {
    let start = entry
        .start
        .format(format_description!("[year]-[month]-[day] [hour]:[minute]"))
        .unwrap_or_default();
    let end = match entry.duration {
        Some(duration) => stop_time(entry.start, duration)
            .format(format_description!("[hour]:[minute]"))
            .unwrap_or_default(),
        None => "now".to_string(),
    };
    let project = entry
        .project_id
        .and_then(|id| store.project(id))
        .map(|p| format!(" [{}]", p.name))
        .unwrap_or_default();
    let marker = if entry.dirty { "*" } else { " " };

    format!(
        "{marker}{:>7}  {start}-{end:<5}  {:>9}  {}{project}",
        entry.id,
        display_duration(entry, now),
        entry.description
    )
}
