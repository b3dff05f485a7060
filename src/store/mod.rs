//! Persistence port for reservations.
//!
//! The pipeline only needs keyed get/put/delete plus two queries by
//! facility, so any backend that can answer those can sit behind
//! [`ReservationStore`]. Deleting a reservation always removes its detail
//! attributes with it.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::StoreError;
use crate::models::{DetailMap, IdentityKey, Reservation};
use async_trait::async_trait;

#[async_trait]
pub trait ReservationStore: Send + Sync {
    async fn get(
        &self,
        facility: &str,
        key: &IdentityKey,
    ) -> Result<Option<Reservation>, StoreError>;

    /// Create or overwrite, details included
    async fn put(&self, reservation: &Reservation) -> Result<(), StoreError>;

    /// Returns whether a record was removed
    async fn delete(&self, facility: &str, key: &IdentityKey) -> Result<bool, StoreError>;

    async fn query_by_source(&self, facility: &str) -> Result<Vec<Reservation>, StoreError>;

    async fn query_by_source_and_date(
        &self,
        facility: &str,
        date: &str,
    ) -> Result<Vec<Reservation>, StoreError>;

    /// Records with `date` strictly less than `before` (string order)
    async fn query_by_source_and_date_before(
        &self,
        facility: &str,
        before: &str,
    ) -> Result<Vec<Reservation>, StoreError>;

    /// Detail attributes of one reservation; empty when it does not exist
    async fn details(&self, facility: &str, key: &IdentityKey) -> Result<DetailMap, StoreError>;

    /// Facilities with at least one stored reservation
    async fn facilities(&self) -> Result<Vec<String>, StoreError>;
}

/// Sort order every backend returns records in
pub(crate) fn sort_reservations(records: &mut [Reservation]) {
    records.sort_by(|a, b| {
        (&a.date, &a.place, &a.event, &a.key).cmp(&(&b.date, &b.place, &b.event, &b.key))
    });
}
