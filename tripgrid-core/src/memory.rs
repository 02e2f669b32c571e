use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::debug;

use crate::repository::FlightStore;
use crate::search::{FlightCandidate, FlightIdentity, LegKey};
use crate::{CoreError, CoreResult};

/// Uniqueness scope: search day, leg date and flight identity.
type RowKey = (NaiveDate, NaiveDate, FlightIdentity);

#[derive(Default)]
struct Rows {
    flights: Vec<(LegKey, FlightCandidate)>,
    keys: HashSet<RowKey>,
}

fn row_key(leg: &LegKey, candidate: &FlightCandidate) -> RowKey {
    (candidate.searched_on, leg.date, candidate.identity())
}

/// Process-local flight store.
///
/// Used when no database is configured and by tests. `set_available(false)`
/// makes every call fail with `StoreUnavailable`.
pub struct InMemoryFlightStore {
    rows: RwLock<Rows>,
    available: AtomicBool,
    save_calls: AtomicUsize,
}

impl InMemoryFlightStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Rows::default()),
            available: AtomicBool::new(true),
            save_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        self.rows.read().map(|rows| rows.flights.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `save_unique` batches attempted, successful or not.
    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    fn ensure_available(&self) -> CoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CoreError::StoreUnavailable("in-memory store switched off".to_string()))
        }
    }
}

impl Default for InMemoryFlightStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> CoreError {
    CoreError::StoreUnavailable("in-memory store lock poisoned".to_string())
}

#[async_trait]
impl FlightStore for InMemoryFlightStore {
    async fn find_by_key(
        &self,
        leg: &LegKey,
        searched_on: NaiveDate,
    ) -> CoreResult<Vec<FlightCandidate>> {
        self.ensure_available()?;
        let rows = self.rows.read().map_err(poisoned)?;

        Ok(rows
            .flights
            .iter()
            .filter(|(stored_leg, f)| stored_leg == leg && f.searched_on == searched_on)
            .map(|(_, f)| f.clone())
            .collect())
    }

    async fn exists(&self, leg: &LegKey, candidate: &FlightCandidate) -> CoreResult<bool> {
        self.ensure_available()?;
        let rows = self.rows.read().map_err(poisoned)?;
        Ok(rows.keys.contains(&row_key(leg, candidate)))
    }

    async fn save_unique(&self, leg: &LegKey, candidates: &[FlightCandidate]) -> CoreResult<usize> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_available()?;
        let mut rows = self.rows.write().map_err(poisoned)?;

        let mut inserted = 0;
        for candidate in candidates {
            // Check and insert under one write lock: concurrent saves of the
            // same flight leave exactly one row.
            if rows.keys.insert(row_key(leg, candidate)) {
                rows.flights.push((leg.clone(), candidate.clone()));
                inserted += 1;
            }
        }

        debug!("Stored {} of {} flights for {} in memory", inserted, candidates.len(), leg);
        Ok(inserted)
    }

    async fn health_check(&self) -> CoreResult<()> {
        self.ensure_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn flight(price: f64) -> FlightCandidate {
        FlightCandidate {
            origin: "OPO".to_string(),
            destination: "NRT".to_string(),
            searched_on: NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
            departure: NaiveDateTime::parse_from_str("2026-08-01 06:10", "%Y-%m-%d %H:%M").unwrap(),
            arrival: NaiveDateTime::parse_from_str("2026-08-02 09:40", "%Y-%m-%d %H:%M").unwrap(),
            price: Some(price),
            total_hours: Some(14.0),
            carriers: vec!["TP".to_string()],
            connections: String::new(),
        }
    }

    fn leg(day: u32) -> LegKey {
        LegKey::new("OPO", "NRT", NaiveDate::from_ymd_opt(2026, 8, day).unwrap())
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 7, 1).unwrap()
    }

    #[tokio::test]
    async fn test_save_unique_is_idempotent() {
        let store = InMemoryFlightStore::new();

        assert_eq!(store.save_unique(&leg(1), &[flight(400.0)]).await.unwrap(), 1);
        assert_eq!(store.save_unique(&leg(1), &[flight(400.0)]).await.unwrap(), 0);
        assert!(store.exists(&leg(1), &flight(400.0)).await.unwrap());
        assert!(!store.exists(&leg(1), &flight(401.0)).await.unwrap());

        let stored = store.find_by_key(&leg(1), today()).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(store.save_calls(), 2);
    }

    #[tokio::test]
    async fn test_find_by_key_is_scoped_to_search_day() {
        let store = InMemoryFlightStore::new();
        store.save_unique(&leg(1), &[flight(400.0)]).await.unwrap();

        let tomorrow = NaiveDate::from_ymd_opt(2026, 7, 2).unwrap();
        assert!(store.find_by_key(&leg(1), tomorrow).await.unwrap().is_empty());

        let other_leg = LegKey::new("NRT", "OPO", leg(1).date);
        assert!(store.find_by_key(&other_leg, today()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rows_belong_to_the_leg_that_found_them() {
        let store = InMemoryFlightStore::new();
        let mut overnight = flight(380.0);
        overnight.departure =
            NaiveDateTime::parse_from_str("2026-08-02 00:30", "%Y-%m-%d %H:%M").unwrap();

        store.save_unique(&leg(1), &[overnight.clone()]).await.unwrap();

        assert_eq!(store.find_by_key(&leg(1), today()).await.unwrap(), vec![overnight.clone()]);
        assert!(store.find_by_key(&leg(2), today()).await.unwrap().is_empty());

        // The same flight found again by the next day's leg is its own row.
        assert!(!store.exists(&leg(2), &overnight).await.unwrap());
        assert_eq!(store.save_unique(&leg(2), &[overnight]).await.unwrap(), 1);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_every_call() {
        let store = InMemoryFlightStore::new();
        store.set_available(false);

        assert!(matches!(
            store.find_by_key(&leg(1), today()).await,
            Err(CoreError::StoreUnavailable(_))
        ));
        assert!(matches!(
            store.save_unique(&leg(1), &[flight(400.0)]).await,
            Err(CoreError::StoreUnavailable(_))
        ));
        assert!(store.health_check().await.is_err());
        assert!(store.is_empty());
    }
}
