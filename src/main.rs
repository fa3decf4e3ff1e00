//! trip-budget: per-trip travel budget tracker
//!
//! Entry point. Loads configuration, initialises structured logging and
//! opens the trip store, then lists trips, creates one, or opens one for
//! planning. While planning, edits are read from stdin one per line
//! (`day <index> <amount>`, `budget <amount>`) and every recomputed budget
//! snapshot is logged, until stdin closes or Ctrl+C.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use trip_budget::config;
use trip_budget::engine::TripSnapshot;
use trip_budget::session::{self, Edit, SessionEvent};
use trip_budget::storage::{JsonFileStore, TripStore};
use trip_budget::trip::NewTrip;
use trip_budget::types::{TripId, UserId};

/// Per-trip travel budget tracker.
#[derive(Parser, Debug)]
#[command(name = "trip-budget", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands. Without one, the configured trip is planned, or
/// the user's trips are listed if none is configured.
#[derive(Subcommand, Debug)]
enum Commands {
    /// List the signed-in user's trips.
    List,
    /// Create a trip.
    New {
        #[arg(long)]
        name: String,
        /// First day, YYYY-MM-DD.
        #[arg(long)]
        start: String,
        /// Last day (inclusive), YYYY-MM-DD.
        #[arg(long)]
        end: String,
        #[arg(long)]
        budget: String,
    },
    /// Open a trip and apply edits read from stdin.
    Plan {
        /// Trip to open. Defaults to `session.trip_id` from the config.
        #[arg(long)]
        trip: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path =
        std::env::var("TRIP_BUDGET_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = config::AppConfig::load(&config_path)?;

    init_logging();

    let user = UserId::new(config::AppConfig::resolve_env(&cfg.identity.user_id_env)?);
    let store: Arc<dyn TripStore> = Arc::new(JsonFileStore::open(&cfg.store.path)?);

    info!(
        user = %user,
        store = %cfg.store.path,
        debounce_ms = cfg.session.debounce_ms,
        "trip-budget starting up"
    );

    match cli.command {
        Some(Commands::List) => list_trips(&*store, &user).await,
        Some(Commands::New {
            name,
            start,
            end,
            budget,
        }) => {
            let form = NewTrip {
                trip_name: name,
                start_date: start,
                end_date: end,
                total_budget: budget,
            };
            create_trip(&*store, &user, &form).await
        }
        Some(Commands::Plan { trip }) => match trip.or_else(|| cfg.session.trip_id.clone()) {
            Some(trip) => plan(store, user, TripId::new(trip), &cfg).await,
            None => anyhow::bail!("No trip given: pass --trip or set session.trip_id"),
        },
        None => match cfg.session.trip_id.clone() {
            Some(trip) => plan(store, user, TripId::new(trip), &cfg).await,
            None => list_trips(&*store, &user).await,
        },
    }
}

/// Validate the form and store the new trip.
async fn create_trip(store: &dyn TripStore, user: &UserId, form: &NewTrip) -> Result<()> {
    let record = form.validate()?;
    let id = store
        .create_trip(user, record)
        .await
        .context("Failed to create trip")?;
    info!(id = %id, name = %form.trip_name.trim(), "Trip created");
    Ok(())
}

/// Run a planner session on one trip, feeding it edits typed on stdin.
async fn plan(
    store: Arc<dyn TripStore>,
    user: UserId,
    trip: TripId,
    cfg: &config::AppConfig,
) -> Result<()> {
    let (_identity_tx, identity_rx) = watch::channel(Some(user));
    let (edits_tx, edits_rx) = mpsc::unbounded_channel();
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();

    let driver = tokio::spawn(session::run_session(
        store,
        trip.clone(),
        identity_rx,
        edits_rx,
        events_tx,
        cfg.session.debounce(),
    ));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(trip = %trip, "Planning trip. Type `day <index> <amount>` or `budget <amount>`; Ctrl+C to stop.");

    loop {
        tokio::select! {
            event = events_rx.recv() => match event {
                Some(SessionEvent::Snapshot { trip_name, snapshot }) => {
                    log_snapshot(&trip_name, &snapshot);
                }
                Some(SessionEvent::TripNotFound(trip)) => {
                    warn!(trip = %trip, "Trip not found. It might have been deleted.");
                    break;
                }
                Some(SessionEvent::SignedOut) => {
                    warn!("Not signed in.");
                    break;
                }
                Some(SessionEvent::Failed(e)) => {
                    error!(error = %e, "Trip could not be loaded");
                }
                None => break,
            },
            line = lines.next_line() => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match Edit::parse(&line) {
                    Some(edit) => {
                        let _ = edits_tx.send(edit);
                    }
                    None => warn!(input = %line.trim(), "Unrecognised edit"),
                },
                Ok(None) => {
                    info!("Input closed.");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Failed to read input");
                    break;
                }
            },
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    // Closing the edit channel stops the driver, which flushes any edits.
    drop(edits_tx);
    if let Err(e) = driver.await {
        error!(error = %e, "Session driver panicked");
    }
    info!("trip-budget shut down cleanly.");

    Ok(())
}

/// Log the user's trips.
async fn list_trips(store: &dyn TripStore, user: &UserId) -> Result<()> {
    let trips = store.list_trips(user).await?;
    if trips.is_empty() {
        info!(user = %user, "No trips yet. Create one with `trip-budget new`.");
    }
    for t in &trips {
        info!(
            id = %t.id,
            name = %t.trip_name,
            start = %t.start_date,
            end = %t.end_date,
            "Trip"
        );
    }
    Ok(())
}

/// Log a human-readable snapshot summary, one line per day.
fn log_snapshot(trip_name: &str, snapshot: &TripSnapshot) {
    for day in &snapshot.per_day {
        info!(
            day = day.index,
            date = %day.date.format("%b %-d"),
            spent = ?day.expense,
            remaining = format!("${:.2}", day.remaining_for_day),
            status = %day.status,
            "Day"
        );
    }
    info!(
        trip = trip_name,
        days = snapshot.number_of_days,
        money_remaining = format!("${:.2}", snapshot.money_remaining),
        difference = format!("${:.2}", snapshot.cumulative_budget_difference),
        status = %snapshot.budget_status,
        "Budget"
    );
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("trip_budget=info"));

    let json_logging = std::env::var("TRIP_BUDGET_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
