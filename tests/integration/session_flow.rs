//! End-to-end session flows against the in-memory store and the JSON file
//! store.

use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use trip_budget::engine::TripSnapshot;
use trip_budget::session::{self, Edit, SessionEvent, TripSession, DEFAULT_DEBOUNCE};
use trip_budget::storage::{JsonFileStore, TripStore};
use trip_budget::trip::{NewTrip, TripUpdate};
use trip_budget::types::{BudgetStatus, DayStatus, TripId, UserId};

use crate::mock_store::MockStore;

struct Harness {
    store: Arc<MockStore>,
    user: UserId,
    trip: TripId,
    identity: watch::Sender<Option<UserId>>,
    edits: mpsc::UnboundedSender<Edit>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    driver: JoinHandle<()>,
}

impl Harness {
    fn start(signed_in: bool) -> Self {
        let user = UserId::from("traveller");
        let trip = TripId::from("lisbon");
        let store = Arc::new(MockStore::with_trip(&user, &trip, MockStore::sample_record()));

        let (identity, identity_rx) = watch::channel(signed_in.then(|| user.clone()));
        let (edits, edits_rx) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();

        let driver = tokio::spawn(session::run_session(
            store.clone() as Arc<dyn TripStore>,
            trip.clone(),
            identity_rx,
            edits_rx,
            events_tx,
            DEFAULT_DEBOUNCE,
        ));

        Self {
            store,
            user,
            trip,
            identity,
            edits,
            events,
            driver,
        }
    }

    async fn next_event(&mut self) -> SessionEvent {
        tokio::time::timeout(Duration::from_secs(30), self.events.recv())
            .await
            .expect("timed out waiting for a session event")
            .expect("session driver stopped")
    }

    async fn next_snapshot(&mut self) -> TripSnapshot {
        match self.next_event().await {
            SessionEvent::Snapshot { snapshot, .. } => snapshot,
            other => panic!("expected a snapshot, got {other:?}"),
        }
    }

    fn edit_day(&self, index: usize, text: &str) {
        self.edits
            .send(Edit::DayExpense {
                index,
                text: text.to_string(),
            })
            .unwrap();
    }

    async fn shutdown(self) {
        drop(self.edits);
        self.driver.await.unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn test_sign_in_reports_current_trip() {
    let mut h = Harness::start(true);

    match h.next_event().await {
        SessionEvent::Snapshot {
            trip_name,
            snapshot,
        } => {
            assert_eq!(trip_name, "Lisbon");
            assert_eq!(snapshot.number_of_days, 3);
            assert_eq!(snapshot.allowance, dec!(100));
            assert_eq!(snapshot.money_remaining, dec!(260));
            assert_eq!(snapshot.cumulative_budget_difference, dec!(-60));
            assert_eq!(snapshot.budget_status, BudgetStatus::Under);
        }
        other => panic!("expected a snapshot, got {other:?}"),
    }

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_edit_recalculates_then_commits_once() {
    let mut h = Harness::start(true);
    h.next_snapshot().await;

    h.edit_day(2, "15");
    h.edit_day(2, "150");
    h.next_snapshot().await;
    let edited = h.next_snapshot().await;
    assert_eq!(edited.day(2).unwrap().status, DayStatus::Over);
    assert_eq!(edited.cumulative_budget_difference, dec!(-10));
    assert_eq!(edited.budget_status, BudgetStatus::Under);
    assert!(h.store.get_updates().is_empty());

    tokio::time::sleep(Duration::from_millis(1100)).await;

    let updates = h.store.get_updates();
    assert_eq!(updates.len(), 1);
    let (trip, update) = &updates[0];
    assert_eq!(trip, &h.trip);
    assert_eq!(update.total_budget, dec!(300));
    assert_eq!(update.daily_expenses.get(0), Some("40"));
    assert_eq!(update.daily_expenses.get(1), None);
    assert_eq!(update.daily_expenses.get(2), Some("150"));

    // The store echoes the write back; the figures do not move.
    let echoed = h.next_snapshot().await;
    assert_eq!(echoed, edited);

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_typed_lines_drive_session() {
    let mut h = Harness::start(true);
    h.next_snapshot().await;

    for line in ["day 1 75", "bogus", "budget 600"] {
        if let Some(edit) = Edit::parse(line) {
            h.edits.send(edit).unwrap();
        }
    }
    assert_eq!(h.next_snapshot().await.total_expenses, dec!(115));
    let snap = h.next_snapshot().await;
    assert_eq!(snap.allowance, dec!(200));
    assert_eq!(snap.day(1).unwrap().status, DayStatus::Under);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    let updates = h.store.get_updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].1.total_budget, dec!(600));
    assert_eq!(updates[0].1.daily_expenses.get(1), Some("75"));

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_change_from_elsewhere_is_pushed() {
    let mut h = Harness::start(true);
    h.next_snapshot().await;

    h.store
        .update_trip(
            &h.user,
            &h.trip,
            TripUpdate {
                total_budget: dec!(600),
                daily_expenses: Default::default(),
            },
        )
        .await
        .unwrap();

    let pushed = h.next_snapshot().await;
    assert_eq!(pushed.total_budget, dec!(600));
    assert_eq!(pushed.allowance, dec!(200));
    assert_eq!(pushed.total_expenses, dec!(0));
    assert_eq!(pushed.money_remaining, dec!(600));

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_deleted_trip_reports_not_found() {
    let mut h = Harness::start(true);
    h.next_snapshot().await;

    h.store.delete_trip(&h.user, &h.trip).await.unwrap();

    match h.next_event().await {
        SessionEvent::TripNotFound(trip) => assert_eq!(trip, h.trip),
        other => panic!("expected TripNotFound, got {other:?}"),
    }

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_sign_out_flushes_pending_edit() {
    let mut h = Harness::start(true);
    h.next_snapshot().await;

    h.edit_day(1, "0");
    let snap = h.next_snapshot().await;
    assert_eq!(snap.day(1).unwrap().status, DayStatus::Neutral);
    assert!(snap.day(1).unwrap().expense_entered);

    h.identity.send(None).unwrap();
    assert!(matches!(h.next_event().await, SessionEvent::SignedOut));

    let updates = h.store.get_updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].1.daily_expenses.get(1), Some("0"));

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_signed_out_ignores_edits_until_sign_in() {
    let mut h = Harness::start(false);
    assert!(matches!(h.next_event().await, SessionEvent::SignedOut));

    h.edit_day(0, "999");
    tokio::time::sleep(Duration::from_millis(10)).await;
    let user = h.user.clone();
    h.identity.send(Some(user)).unwrap();

    let snap = h.next_snapshot().await;
    assert_eq!(snap.total_expenses, dec!(40));
    assert!(h.store.get_updates().is_empty());

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_commit_keeps_session_running() {
    let mut h = Harness::start(true);
    h.next_snapshot().await;

    h.store.set_error("backend unavailable");
    h.edit_day(0, "55");
    h.next_snapshot().await;
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(h.store.get_updates().is_empty());

    h.edit_day(1, "10");
    let snap = h.next_snapshot().await;
    assert_eq!(snap.total_expenses, dec!(65));

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_closing_edits_stops_driver_and_flushes() {
    let mut h = Harness::start(true);
    h.next_snapshot().await;

    h.edits.send(Edit::TotalBudget("450".to_string())).unwrap();
    assert_eq!(h.next_snapshot().await.allowance, dec!(150));

    let store = Arc::clone(&h.store);
    let (user, trip) = (h.user.clone(), h.trip.clone());
    h.shutdown().await;

    let updates = store.get_updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].1.total_budget, dec!(450));
    assert_eq!(store.get_trip(&user, &trip).unwrap().total_budget, dec!(450));
}

// ---------------------------------------------------------------------------
// JSON file store
// ---------------------------------------------------------------------------

fn temp_path() -> std::path::PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("trip_budget_flow_{}.json", uuid::Uuid::new_v4()));
    p
}

#[tokio::test]
async fn test_file_store_round_trip_through_session() {
    let path = temp_path();
    let user = UserId::from("traveller");

    let record = NewTrip {
        trip_name: "Kyoto".to_string(),
        start_date: "2024-10-01".to_string(),
        end_date: "2024-10-04".to_string(),
        total_budget: "400".to_string(),
    }
    .validate()
    .unwrap();

    let store: Arc<dyn TripStore> = Arc::new(JsonFileStore::open(&path).unwrap());
    let trip = store.create_trip(&user, record).await.unwrap();

    let mut session = TripSession::load(
        Arc::clone(&store),
        user.clone(),
        trip.clone(),
        Duration::from_millis(10),
    )
    .await
    .unwrap();
    session.set_day_expense(0, "120");
    session.set_day_expense(1, "0");
    let snap = session.set_day_expense(3, "12.50");
    assert_eq!(snap.money_remaining, dec!(267.50));
    assert_eq!(snap.cumulative_budget_difference, dec!(-67.50));
    session.close().await;

    // A fresh store sees what the session wrote.
    let reopened = JsonFileStore::open(&path).unwrap();
    let saved = reopened.load_trip(&user, &trip).await.unwrap().unwrap();
    assert_eq!(saved.trip_name, "Kyoto");
    assert_eq!(saved.daily_expenses.get(0), Some("120"));
    assert_eq!(saved.daily_expenses.get(1), Some("0"));
    assert_eq!(saved.daily_expenses.get(2), None);
    assert_eq!(saved.daily_expenses.get(3), Some("12.50"));

    let listed = reopened.list_trips(&user).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, trip);

    let _ = std::fs::remove_file(&path);
}
