//! Debounced commit queue.
//!
//! The session asks for a commit after every edit; a background worker
//! keeps only the newest request, waits for a quiet period with no further
//! requests, then writes it. Writes go out one at a time from a single
//! task, so a later snapshot can never be overwritten by an earlier one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::storage::TripStore;
use crate::trip::TripUpdate;
use crate::types::{TripId, UserId};

/// Quiet period after the last edit before the trip is written.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1000);

#[derive(Debug)]
struct CommitRequest {
    generation: u64,
    update: TripUpdate,
}

/// Handle to a trip's commit worker.
pub struct CommitQueue {
    tx: mpsc::UnboundedSender<CommitRequest>,
    requested: u64,
    committed: Arc<AtomicU64>,
    worker: JoinHandle<()>,
}

impl CommitQueue {
    /// Start the worker for one trip. Must be called within a Tokio runtime.
    pub fn spawn(store: Arc<dyn TripStore>, user: UserId, trip: TripId, debounce: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let committed = Arc::new(AtomicU64::new(0));
        let worker = tokio::spawn(commit_worker(
            rx,
            store,
            user,
            trip,
            debounce,
            Arc::clone(&committed),
        ));

        Self {
            tx,
            requested: 0,
            committed,
            worker,
        }
    }

    /// Ask for `update` to be written. Supersedes any request not yet
    /// written.
    pub fn request(&mut self, update: TripUpdate) {
        self.requested += 1;
        let request = CommitRequest {
            generation: self.requested,
            update,
        };
        if self.tx.send(request).is_err() {
            error!(generation = self.requested, "Commit worker gone, update dropped");
        }
    }

    /// `true` once every requested update has been attempted.
    pub fn is_settled(&self) -> bool {
        self.committed.load(Ordering::SeqCst) >= self.requested
    }

    /// Write anything still pending and stop the worker.
    pub async fn close(self) {
        drop(self.tx);
        if let Err(e) = self.worker.await {
            error!(error = %e, "Commit worker panicked");
        }
    }
}

async fn commit_worker(
    mut rx: mpsc::UnboundedReceiver<CommitRequest>,
    store: Arc<dyn TripStore>,
    user: UserId,
    trip: TripId,
    debounce: Duration,
    committed: Arc<AtomicU64>,
) {
    debug!(trip = %trip, debounce_ms = debounce.as_millis() as u64, "Commit worker started");
    let mut pending: Option<CommitRequest> = None;

    loop {
        match pending.take() {
            Some(request) => {
                tokio::select! {
                    next = rx.recv() => match next {
                        Some(newer) => {
                            debug!(superseded = request.generation, by = newer.generation, "Commit superseded");
                            pending = Some(newer);
                        }
                        None => {
                            // Session closed: flush what is left.
                            write(&*store, &user, &trip, request, &committed).await;
                            break;
                        }
                    },
                    _ = tokio::time::sleep(debounce) => {
                        write(&*store, &user, &trip, request, &committed).await;
                    }
                }
            }
            None => match rx.recv().await {
                Some(request) => pending = Some(request),
                None => break,
            },
        }
    }

    debug!(trip = %trip, "Commit worker stopped");
}

async fn write(
    store: &dyn TripStore,
    user: &UserId,
    trip: &TripId,
    request: CommitRequest,
    committed: &AtomicU64,
) {
    let total_budget = request.update.total_budget;
    let entries = request.update.daily_expenses.len();
    match store.update_trip(user, trip, request.update).await {
        Ok(()) => debug!(
            trip = %trip,
            generation = request.generation,
            total_budget = %total_budget,
            entries,
            "Trip committed"
        ),
        Err(e) => error!(trip = %trip, generation = request.generation, error = %e, "Failed to commit trip"),
    }
    committed.store(request.generation, Ordering::SeqCst);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
