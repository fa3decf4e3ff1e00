//! Mock trip store for integration testing.
//!
//! Provides a deterministic `TripStore` implementation that keeps trips
//! in memory, records every partial update it receives and pushes change
//! notifications to subscribers. Nothing touches the filesystem.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

use trip_budget::storage::{TripEvent, TripStore};
use trip_budget::trip::{DailyExpenses, TripRecord, TripSummary, TripUpdate};
use trip_budget::types::{TripId, UserId};

type TripKey = (UserId, TripId);

/// An in-memory trip store for deterministic testing.
///
/// Trips, recorded updates and forced failures are all controllable from
/// test code.
pub struct MockStore {
    trips: Arc<Mutex<HashMap<TripKey, TripRecord>>>,
    updates: Arc<Mutex<Vec<(TripId, TripUpdate)>>>,
    /// If set, all writes will return this error.
    force_error: Arc<Mutex<Option<String>>>,
    changes: broadcast::Sender<TripKey>,
}

impl MockStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(16);
        Self {
            trips: Arc::new(Mutex::new(HashMap::new())),
            updates: Arc::new(Mutex::new(Vec::new())),
            force_error: Arc::new(Mutex::new(None)),
            changes,
        }
    }

    /// A store holding one trip under a known key.
    pub fn with_trip(user: &UserId, trip: &TripId, record: TripRecord) -> Self {
        let store = Self::new();
        store
            .trips
            .lock()
            .unwrap()
            .insert((user.clone(), trip.clone()), record);
        store
    }

    /// Force all subsequent writes to return an error.
    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    /// Every partial update received so far, oldest first.
    pub fn get_updates(&self) -> Vec<(TripId, TripUpdate)> {
        self.updates.lock().unwrap().clone()
    }

    pub fn get_trip(&self, user: &UserId, trip: &TripId) -> Option<TripRecord> {
        self.trips
            .lock()
            .unwrap()
            .get(&(user.clone(), trip.clone()))
            .cloned()
    }

    /// 2024-06-01 ..= 2024-06-03, budget 300, 40 spent on day 0.
    pub fn sample_record() -> TripRecord {
        TripRecord {
            trip_name: "Lisbon".to_string(),
            start_date: "2024-06-01".to_string(),
            end_date: "2024-06-03".to_string(),
            total_budget: dec!(300),
            daily_expenses: DailyExpenses::from_amounts([(0, dec!(40))]),
        }
    }

    fn check_error(&self) -> Result<()> {
        match self.force_error.lock().unwrap().as_ref() {
            Some(msg) => Err(anyhow!("{msg}")),
            None => Ok(()),
        }
    }

    fn lookup(trips: &Mutex<HashMap<TripKey, TripRecord>>, key: &TripKey) -> TripEvent {
        trips.lock().unwrap().get(key).cloned().into()
    }
}

#[async_trait]
impl TripStore for MockStore {
    async fn create_trip(&self, user: &UserId, record: TripRecord) -> Result<TripId> {
        self.check_error()?;
        let trip = TripId::generate();
        let key = (user.clone(), trip.clone());
        self.trips.lock().unwrap().insert(key.clone(), record);
        let _ = self.changes.send(key);
        Ok(trip)
    }

    async fn load_trip(&self, user: &UserId, trip: &TripId) -> Result<Option<TripRecord>> {
        Ok(self.get_trip(user, trip))
    }

    async fn update_trip(&self, user: &UserId, trip: &TripId, update: TripUpdate) -> Result<()> {
        self.check_error()?;
        let key = (user.clone(), trip.clone());
        {
            let mut trips = self.trips.lock().unwrap();
            let record = trips
                .get_mut(&key)
                .ok_or_else(|| anyhow!("Trip not found: {trip}"))?;
            record.apply(update.clone());
        }
        self.updates.lock().unwrap().push((trip.clone(), update));
        let _ = self.changes.send(key);
        Ok(())
    }

    async fn list_trips(&self, user: &UserId) -> Result<Vec<TripSummary>> {
        let trips = self.trips.lock().unwrap();
        Ok(trips
            .iter()
            .filter(|((u, _), _)| u == user)
            .map(|((_, id), record)| TripSummary {
                id: id.clone(),
                trip_name: record.display_name().to_string(),
                start_date: record.start_date.clone(),
                end_date: record.end_date.clone(),
            })
            .collect())
    }

    async fn delete_trip(&self, user: &UserId, trip: &TripId) -> Result<()> {
        self.check_error()?;
        let key = (user.clone(), trip.clone());
        self.trips.lock().unwrap().remove(&key);
        let _ = self.changes.send(key);
        Ok(())
    }

    fn subscribe(&self, user: &UserId, trip: &TripId) -> BoxStream<'static, TripEvent> {
        let key: TripKey = (user.clone(), trip.clone());
        let receiver = self.changes.subscribe();
        let initial = Self::lookup(&self.trips, &key);
        let trips = Arc::clone(&self.trips);

        let updates = stream::unfold(receiver, move |mut receiver| {
            let trips = Arc::clone(&trips);
            let key = key.clone();
            async move {
                loop {
                    match receiver.recv().await {
                        Ok(changed) if changed == key => break,
                        Ok(_) => continue,
                        Err(broadcast::error::RecvError::Lagged(_)) => break,
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
                Some((Self::lookup(&trips, &key), receiver))
            }
        });

        stream::once(async move { initial }).chain(updates).boxed()
    }
}
