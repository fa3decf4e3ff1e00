//! JSON-file trip store.
//!
//! Keeps the whole document (`users/{uid}/trips/{tid}`) in memory, writes
//! it back to disk after every change and fans change notifications out to
//! subscribers over a broadcast channel.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info};

use super::{TripEvent, TripStore};
use crate::trip::{TripRecord, TripSummary, TripUpdate};
use crate::types::{TripError, TripId, UserId};

/// Pending change notifications a slow subscriber may fall behind by
/// before it is told to re-read.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

type TripKey = (UserId, TripId);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    users: BTreeMap<UserId, UserTrips>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct UserTrips {
    #[serde(default)]
    trips: BTreeMap<TripId, TripRecord>,
}

impl StoreDocument {
    fn trip(&self, user: &UserId, trip: &TripId) -> Option<&TripRecord> {
        self.users.get(user).and_then(|u| u.trips.get(trip))
    }

    fn trip_mut(&mut self, user: &UserId, trip: &TripId) -> Option<&mut TripRecord> {
        self.users.get_mut(user).and_then(|u| u.trips.get_mut(trip))
    }
}

pub struct JsonFileStore {
    path: PathBuf,
    document: Arc<RwLock<StoreDocument>>,
    changes: broadcast::Sender<TripKey>,
}

impl JsonFileStore {
    /// Open the store at `path`, starting empty if the file doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let document = if path.exists() {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read trip store from {}", path.display()))?;
            let document: StoreDocument = serde_json::from_str(&json)
                .with_context(|| format!("Failed to parse trip store from {}", path.display()))?;
            info!(
                path = %path.display(),
                users = document.users.len(),
                "Trip store loaded from disk"
            );
            document
        } else {
            info!(path = %path.display(), "No trip store found, starting empty");
            StoreDocument::default()
        };

        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self {
            path,
            document: Arc::new(RwLock::new(document)),
            changes,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `change` to a copy of the document, write the copy to disk and
    /// only then make it current and notify subscribers of `key`. A failed
    /// write leaves the in-memory document untouched.
    fn write<T>(
        &self,
        key: TripKey,
        change: impl FnOnce(&mut StoreDocument) -> Result<T>,
    ) -> Result<T> {
        let out = {
            let mut document = self.document.write().unwrap_or_else(PoisonError::into_inner);
            let mut updated = document.clone();
            let out = change(&mut updated)?;
            let json = serde_json::to_string_pretty(&updated)
                .context("Failed to serialise trip store")?;
            std::fs::write(&self.path, json)
                .with_context(|| format!("Failed to write trip store to {}", self.path.display()))?;
            *document = updated;
            out
        };

        debug!(path = %self.path.display(), user = %key.0, trip = %key.1, "Trip store saved");
        // No receivers is fine: nobody is watching this trip.
        let _ = self.changes.send(key);
        Ok(out)
    }
}

fn lookup(document: &RwLock<StoreDocument>, key: &TripKey) -> TripEvent {
    let document = document.read().unwrap_or_else(PoisonError::into_inner);
    document.trip(&key.0, &key.1).cloned().into()
}

#[async_trait]
impl TripStore for JsonFileStore {
    async fn create_trip(&self, user: &UserId, record: TripRecord) -> Result<TripId> {
        let trip = TripId::generate();
        let name = record.trip_name.clone();
        self.write((user.clone(), trip.clone()), |document| {
            document
                .users
                .entry(user.clone())
                .or_default()
                .trips
                .insert(trip.clone(), record);
            Ok(())
        })?;
        info!(user = %user, trip = %trip, name = %name, "Trip created");
        Ok(trip)
    }

    async fn load_trip(&self, user: &UserId, trip: &TripId) -> Result<Option<TripRecord>> {
        let document = self.document.read().unwrap_or_else(PoisonError::into_inner);
        Ok(document.trip(user, trip).cloned())
    }

    async fn update_trip(&self, user: &UserId, trip: &TripId, update: TripUpdate) -> Result<()> {
        self.write((user.clone(), trip.clone()), |document| {
            let record = document
                .trip_mut(user, trip)
                .ok_or_else(|| TripError::TripNotFound(trip.to_string()))?;
            record.apply(update);
            Ok(())
        })
    }

    async fn list_trips(&self, user: &UserId) -> Result<Vec<TripSummary>> {
        let document = self.document.read().unwrap_or_else(PoisonError::into_inner);
        let trips = document
            .users
            .get(user)
            .map(|u| {
                u.trips
                    .iter()
                    .map(|(id, record)| TripSummary {
                        id: id.clone(),
                        trip_name: record.display_name().to_string(),
                        start_date: record.start_date.clone(),
                        end_date: record.end_date.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(trips)
    }

    async fn delete_trip(&self, user: &UserId, trip: &TripId) -> Result<()> {
        let removed = self.write((user.clone(), trip.clone()), |document| {
            Ok(document
                .users
                .get_mut(user)
                .and_then(|u| u.trips.remove(trip))
                .is_some())
        })?;
        info!(user = %user, trip = %trip, removed, "Trip deleted");
        Ok(())
    }

    fn subscribe(&self, user: &UserId, trip: &TripId) -> BoxStream<'static, TripEvent> {
        let key: TripKey = (user.clone(), trip.clone());
        // Subscribe before reading so no change slips between the two.
        let receiver = self.changes.subscribe();
        let initial = lookup(&self.document, &key);
        let document = Arc::clone(&self.document);

        let updates = stream::unfold(receiver, move |mut receiver| {
            let document = Arc::clone(&document);
            let key = key.clone();
            async move {
                loop {
                    match receiver.recv().await {
                        Ok(changed) if changed == key => break,
                        Ok(_) => continue,
                        Err(RecvError::Lagged(skipped)) => {
                            debug!(skipped, trip = %key.1, "Subscriber lagged, re-reading trip");
                            break;
                        }
                        Err(RecvError::Closed) => return None,
                    }
                }
                Some((lookup(&document, &key), receiver))
            }
        });

        stream::once(async move { initial }).chain(updates).boxed()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
