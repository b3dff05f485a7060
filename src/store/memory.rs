use super::{sort_reservations, ReservationStore};
use crate::error::StoreError;
use crate::models::{DetailMap, IdentityKey, Reservation};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

type Records = BTreeMap<(String, IdentityKey), Reservation>;

/// In-process store, mainly for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Records>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Records>, StoreError> {
        self.records.lock().map_err(|_| StoreError::Poisoned)
    }

    fn select(
        &self,
        facility: &str,
        keep: impl Fn(&Reservation) -> bool,
    ) -> Result<Vec<Reservation>, StoreError> {
        let records = self.lock()?;
        let mut found: Vec<Reservation> = records
            .values()
            .filter(|r| r.facility == facility && keep(r))
            .cloned()
            .collect();
        sort_reservations(&mut found);
        Ok(found)
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ReservationStore for MemoryStore {
    async fn get(
        &self,
        facility: &str,
        key: &IdentityKey,
    ) -> Result<Option<Reservation>, StoreError> {
        let records = self.lock()?;
        Ok(records.get(&(facility.to_string(), key.clone())).cloned())
    }

    async fn put(&self, reservation: &Reservation) -> Result<(), StoreError> {
        let mut records = self.lock()?;
        records.insert(
            (reservation.facility.clone(), reservation.key.clone()),
            reservation.clone(),
        );
        Ok(())
    }

    async fn delete(&self, facility: &str, key: &IdentityKey) -> Result<bool, StoreError> {
        let mut records = self.lock()?;
        Ok(records.remove(&(facility.to_string(), key.clone())).is_some())
    }

    async fn query_by_source(&self, facility: &str) -> Result<Vec<Reservation>, StoreError> {
        self.select(facility, |_| true)
    }

    async fn query_by_source_and_date(
        &self,
        facility: &str,
        date: &str,
    ) -> Result<Vec<Reservation>, StoreError> {
        self.select(facility, |r| r.date == date)
    }

    async fn query_by_source_and_date_before(
        &self,
        facility: &str,
        before: &str,
    ) -> Result<Vec<Reservation>, StoreError> {
        self.select(facility, |r| r.date.as_str() < before)
    }

    async fn details(&self, facility: &str, key: &IdentityKey) -> Result<DetailMap, StoreError> {
        let records = self.lock()?;
        Ok(records
            .get(&(facility.to_string(), key.clone()))
            .map(|r| r.details.clone())
            .unwrap_or_default())
    }

    async fn facilities(&self) -> Result<Vec<String>, StoreError> {
        let records = self.lock()?;
        let names: BTreeSet<String> = records.keys().map(|(f, _)| f.clone()).collect();
        Ok(names.into_iter().collect())
    }
}
