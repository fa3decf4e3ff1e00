//! Planner session: one open trip for one signed-in user.
//!
//! A `TripSession` pairs a `BudgetEngine` with the commit queue that
//! persists it. `run_session` drives sessions from the outside world: it
//! reacts to sign-in/sign-out, rebuilds the engine whenever the store
//! pushes a new version of the trip, applies edits, and reports every
//! recomputed snapshot on an event channel.

pub mod commit;

use anyhow::Result;
use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::engine::{BudgetEngine, TripSnapshot};
use crate::storage::{TripEvent, TripStore};
use crate::trip::TripRecord;
use crate::types::{parse_amount, parse_budget, TripError, TripId, UserId};

pub use commit::{CommitQueue, DEFAULT_DEBOUNCE};

// ---------------------------------------------------------------------------
// Trip session
// ---------------------------------------------------------------------------

pub struct TripSession {
    user: UserId,
    trip: TripId,
    trip_name: String,
    engine: BudgetEngine,
    commits: CommitQueue,
}

impl TripSession {
    /// Open a session on an already-fetched record. Must be called within a
    /// Tokio runtime (the commit worker is spawned here).
    pub fn open(
        store: Arc<dyn TripStore>,
        user: UserId,
        trip: TripId,
        record: &TripRecord,
        debounce: Duration,
    ) -> Result<Self, TripError> {
        let engine = BudgetEngine::from_record(record)?;
        let commits = CommitQueue::spawn(store, user.clone(), trip.clone(), debounce);

        info!(
            user = %user,
            trip = %trip,
            name = record.display_name(),
            days = engine.number_of_days(),
            total_budget = %record.total_budget,
            "Trip session opened"
        );

        Ok(Self {
            user,
            trip,
            trip_name: record.display_name().to_string(),
            engine,
            commits,
        })
    }

    /// Fetch the trip from the store and open a session on it.
    pub async fn load(
        store: Arc<dyn TripStore>,
        user: UserId,
        trip: TripId,
        debounce: Duration,
    ) -> Result<Self> {
        let record = store
            .load_trip(&user, &trip)
            .await?
            .ok_or_else(|| TripError::TripNotFound(trip.to_string()))?;
        Ok(Self::open(store, user, trip, &record, debounce)?)
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub fn trip(&self) -> &TripId {
        &self.trip
    }

    pub fn trip_name(&self) -> &str {
        &self.trip_name
    }

    pub fn engine(&self) -> &BudgetEngine {
        &self.engine
    }

    pub fn snapshot(&self) -> TripSnapshot {
        self.engine.snapshot()
    }

    /// Apply a typed expense for one day. Unparsable text clears the day.
    /// Edits outside the trip change nothing and are not committed.
    pub fn set_day_expense(&mut self, index: usize, text: &str) -> TripSnapshot {
        let snapshot = if self.engine.set_day_expense(index, parse_amount(text)) {
            let snapshot = self.engine.snapshot();
            self.commits.request(snapshot.to_update());
            snapshot
        } else {
            self.engine.snapshot()
        };
        debug!(trip = %self.trip, day = index, %snapshot, "Recalculated");
        snapshot
    }

    /// Apply a typed total budget. Unparsable text counts as zero.
    pub fn set_total_budget(&mut self, text: &str) -> TripSnapshot {
        self.engine.set_total_budget(parse_budget(text));
        let snapshot = self.engine.snapshot();
        self.commits.request(snapshot.to_update());
        debug!(trip = %self.trip, %snapshot, "Recalculated");
        snapshot
    }

    /// Rebuild from a version of the trip pushed by the store.
    ///
    /// While a local edit is still waiting to be written the push is
    /// skipped (`Ok(None)`): that write will replace it anyway. A record
    /// that fails to parse leaves the current engine in place.
    pub fn apply_remote(&mut self, record: &TripRecord) -> Result<Option<TripSnapshot>, TripError> {
        if !self.commits.is_settled() {
            warn!(trip = %self.trip, "Local edits pending, skipping pushed trip update");
            return Ok(None);
        }
        self.engine = BudgetEngine::from_record(record)?;
        self.trip_name = record.display_name().to_string();
        Ok(Some(self.engine.snapshot()))
    }

    /// `true` once every edit has been handed to the store.
    pub fn is_settled(&self) -> bool {
        self.commits.is_settled()
    }

    /// Flush pending edits and end the session.
    pub async fn close(self) {
        info!(user = %self.user, trip = %self.trip, "Trip session closed");
        self.commits.close().await;
    }
}

// ---------------------------------------------------------------------------
// Session driver
// ---------------------------------------------------------------------------

/// A user edit, as typed.
#[derive(Debug, Clone, PartialEq)]
pub enum Edit {
    DayExpense { index: usize, text: String },
    TotalBudget(String),
}

impl Edit {
    /// Parse one line of planner input: `day <index> [amount]` or
    /// `budget [amount]`. A missing amount clears the day or zeroes the
    /// budget, the same as typing garbage into the field.
    pub fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let command = words.next()?.to_ascii_lowercase();
        match command.as_str() {
            "day" => {
                let index = words.next()?.parse().ok()?;
                let text = words.collect::<Vec<_>>().join(" ");
                Some(Edit::DayExpense { index, text })
            }
            "budget" => Some(Edit::TotalBudget(words.collect::<Vec<_>>().join(" "))),
            _ => None,
        }
    }
}

/// What the driver reports back to its owner.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Snapshot {
        trip_name: String,
        snapshot: TripSnapshot,
    },
    TripNotFound(TripId),
    SignedOut,
    Failed(TripError),
}

/// The trip as seen by the currently signed-in user.
struct ActiveTrip {
    user: UserId,
    updates: BoxStream<'static, TripEvent>,
    session: Option<TripSession>,
}

impl ActiveTrip {
    fn subscribe(store: &Arc<dyn TripStore>, user: UserId, trip: &TripId) -> Self {
        info!(user = %user, trip = %trip, "Watching trip");
        let updates = store.subscribe(&user, trip);
        Self {
            user,
            updates,
            session: None,
        }
    }

    async fn close(self) {
        if let Some(session) = self.session {
            session.close().await;
        }
    }
}

async fn next_trip_event(active: &mut Option<ActiveTrip>) -> Option<TripEvent> {
    match active {
        Some(active) => active.updates.next().await,
        None => std::future::pending().await,
    }
}

/// Drive one trip until the identity source, the edit source or the event
/// receiver goes away.
///
/// Signing in subscribes to the trip for that user; signing out (or
/// switching user) closes the open session, flushing its pending edits.
pub async fn run_session(
    store: Arc<dyn TripStore>,
    trip: TripId,
    mut identity: watch::Receiver<Option<UserId>>,
    mut edits: mpsc::UnboundedReceiver<Edit>,
    events: mpsc::UnboundedSender<SessionEvent>,
    debounce: Duration,
) {
    let mut active = match identity.borrow_and_update().clone() {
        Some(user) => Some(ActiveTrip::subscribe(&store, user, &trip)),
        None => {
            let _ = events.send(SessionEvent::SignedOut);
            None
        }
    };

    loop {
        if events.is_closed() {
            debug!(trip = %trip, "Event receiver dropped");
            break;
        }

        tokio::select! {
            changed = identity.changed() => {
                if changed.is_err() {
                    debug!("Identity source closed");
                    break;
                }
                let user = identity.borrow_and_update().clone();
                if active.as_ref().map(|a| &a.user) == user.as_ref() {
                    continue;
                }
                if let Some(previous) = active.take() {
                    previous.close().await;
                }
                match user {
                    Some(user) => active = Some(ActiveTrip::subscribe(&store, user, &trip)),
                    None => {
                        info!(trip = %trip, "Signed out");
                        let _ = events.send(SessionEvent::SignedOut);
                    }
                }
            }
            event = next_trip_event(&mut active) => {
                let Some(current) = active.as_mut() else { continue };
                match event {
                    Some(TripEvent::Found(record)) => {
                        if let Some(ev) = on_record(&store, current, &trip, &record, debounce) {
                            let _ = events.send(ev);
                        }
                    }
                    Some(TripEvent::NotFound) => {
                        warn!(user = %current.user, trip = %trip, "Trip not found");
                        if let Some(session) = current.session.take() {
                            session.close().await;
                        }
                        let _ = events.send(SessionEvent::TripNotFound(trip.clone()));
                    }
                    None => {
                        info!(trip = %trip, "Trip store closed the subscription");
                        break;
                    }
                }
            }
            edit = edits.recv() => {
                let Some(edit) = edit else {
                    debug!("Edit source closed");
                    break;
                };
                match active.as_mut().and_then(|a| a.session.as_mut()) {
                    Some(session) => {
                        let snapshot = match edit {
                            Edit::DayExpense { index, text } => session.set_day_expense(index, &text),
                            Edit::TotalBudget(text) => session.set_total_budget(&text),
                        };
                        let _ = events.send(SessionEvent::Snapshot {
                            trip_name: session.trip_name().to_string(),
                            snapshot,
                        });
                    }
                    None => warn!(?edit, "No trip open, edit ignored"),
                }
            }
        }
    }

    if let Some(active) = active {
        active.close().await;
    }
}

/// Open or refresh the session from a pushed record.
fn on_record(
    store: &Arc<dyn TripStore>,
    active: &mut ActiveTrip,
    trip: &TripId,
    record: &TripRecord,
    debounce: Duration,
) -> Option<SessionEvent> {
    let result = match active.session.as_mut() {
        Some(session) => session.apply_remote(record),
        None => TripSession::open(
            Arc::clone(store),
            active.user.clone(),
            trip.clone(),
            record,
            debounce,
        )
        .map(|session| {
            let snapshot = session.snapshot();
            active.session = Some(session);
            Some(snapshot)
        }),
    };

    match result {
        Ok(Some(snapshot)) => {
            let trip_name = active
                .session
                .as_ref()
                .map(|s| s.trip_name().to_string())
                .unwrap_or_else(|| record.display_name().to_string());
            Some(SessionEvent::Snapshot {
                trip_name,
                snapshot,
            })
        }
        Ok(None) => None,
        Err(e) => {
            warn!(trip = %trip, error = %e, "Trip record rejected");
            Some(SessionEvent::Failed(e))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
