//! Persistence layer.
//!
//! Defines the `TripStore` contract the planner consumes and a JSON-file
//! implementation of it. Stores hold loosely typed trip records keyed by
//! user and trip; the planner only ever rewrites the budget and the daily
//! expenses of a trip it has open.

pub mod json_file;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::trip::{TripRecord, TripSummary, TripUpdate};
use crate::types::{TripId, UserId};

pub use json_file::JsonFileStore;

/// What a trip subscription yields: the record as it is now, or notice
/// that it no longer exists.
#[derive(Debug, Clone, PartialEq)]
pub enum TripEvent {
    Found(TripRecord),
    NotFound,
}

impl From<Option<TripRecord>> for TripEvent {
    fn from(record: Option<TripRecord>) -> Self {
        match record {
            Some(record) => TripEvent::Found(record),
            None => TripEvent::NotFound,
        }
    }
}

/// Abstraction over the document store holding users' trips.
///
/// Writes are plain overwrites: concurrent sessions editing the same trip
/// are not merged, and whichever `update_trip` lands last wins.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TripStore: Send + Sync {
    /// Store a new trip and return its freshly generated id.
    async fn create_trip(&self, user: &UserId, record: TripRecord) -> Result<TripId>;

    /// Fetch a trip. `None` if it doesn't exist.
    async fn load_trip(&self, user: &UserId, trip: &TripId) -> Result<Option<TripRecord>>;

    /// Overwrite the budget and daily expenses of an existing trip, leaving
    /// every other field as stored. Fails if the trip doesn't exist.
    async fn update_trip(&self, user: &UserId, trip: &TripId, update: TripUpdate) -> Result<()>;

    /// All of a user's trips, for the trip list.
    async fn list_trips(&self, user: &UserId) -> Result<Vec<TripSummary>>;

    /// Remove a trip. Removing a missing trip is not an error.
    async fn delete_trip(&self, user: &UserId, trip: &TripId) -> Result<()>;

    /// Live view of one trip: the current state first, then one event per
    /// change until the store goes away.
    fn subscribe(&self, user: &UserId, trip: &TripId) -> BoxStream<'static, TripEvent>;
}
