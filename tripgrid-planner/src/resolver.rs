use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, warn};
use tripgrid_core::{CoreError, CoreResult, FlightCandidate, FlightSource, FlightStore, LegKey};

use crate::reducer::CandidateReducer;
use crate::throttle::FetchThrottle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Provenance {
    /// Served from flights stored by an earlier search today.
    CacheHit,
    /// Looked up from the flight source during this call.
    Fetched,
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub leg: LegKey,
    pub candidates: Vec<FlightCandidate>,
    pub provenance: Provenance,
    /// Candidates newly written to the store.
    pub persisted: usize,
    /// Set when the store failed during this call and was bypassed.
    pub store_degraded: bool,
}

/// Cache-or-fetch lookup of the candidate flights for one leg.
///
/// 1. Ask the store for flights found today for the leg. A non-empty answer
///    is returned as is.
/// 2. On a miss, or when the store fails, fetch from the source, reduce the
///    result and store whatever is not stored yet.
///
/// Store failures never fail the call: the leg degrades to fetch-only.
/// Source failures are returned as `SourceUnavailable`.
pub struct LegResolver {
    source: Arc<dyn FlightSource>,
    store: Option<Arc<dyn FlightStore>>,
    reducer: CandidateReducer,
    throttle: FetchThrottle,
}

impl LegResolver {
    pub fn new(
        source: Arc<dyn FlightSource>,
        store: Option<Arc<dyn FlightStore>>,
        reducer: CandidateReducer,
    ) -> Self {
        Self {
            source,
            store,
            reducer,
            throttle: FetchThrottle::disabled(),
        }
    }

    pub fn with_throttle(mut self, throttle: FetchThrottle) -> Self {
        self.throttle = throttle;
        self
    }

    pub async fn resolve(&self, leg: &LegKey, today: NaiveDate) -> CoreResult<Resolution> {
        let mut store_degraded = false;

        if let Some(store) = &self.store {
            match store.find_by_key(leg, today).await {
                Ok(cached) if !cached.is_empty() => {
                    debug!("Cache hit for {}: {} flights", leg, cached.len());
                    return Ok(Resolution {
                        leg: leg.clone(),
                        candidates: cached,
                        provenance: Provenance::CacheHit,
                        persisted: 0,
                        store_degraded: false,
                    });
                }
                Ok(_) => debug!("Cache miss for {}", leg),
                Err(e) => {
                    warn!("Store lookup failed for {}, fetching instead: {}", leg, e);
                    store_degraded = true;
                }
            }
        }

        let fetched = self.source.fetch(leg).await;
        self.throttle.pause().await;

        let fetched = fetched.map_err(|e| match e {
            CoreError::SourceUnavailable { .. } => e,
            other => CoreError::SourceUnavailable {
                leg: leg.clone(),
                reason: other.to_string(),
            },
        })?;

        let total = fetched.len();
        let candidates = self.reducer.reduce(
            fetched
                .into_iter()
                .map(|mut flight| {
                    flight.searched_on = today;
                    flight
                })
                .collect(),
        );
        debug!("Fetched {} flights for {}, kept {}", total, leg, candidates.len());

        let mut persisted = 0;
        if let (Some(store), false) = (&self.store, store_degraded) {
            match persist_new(store.as_ref(), leg, &candidates).await {
                Ok(count) => persisted = count,
                Err(e) => {
                    warn!("Could not store flights for {}: {}", leg, e);
                    store_degraded = true;
                }
            }
        }

        Ok(Resolution {
            leg: leg.clone(),
            candidates,
            provenance: Provenance::Fetched,
            persisted,
            store_degraded,
        })
    }
}

/// One batch write of the candidates the store does not know yet.
async fn persist_new(
    store: &dyn FlightStore,
    leg: &LegKey,
    candidates: &[FlightCandidate],
) -> CoreResult<usize> {
    let mut fresh = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if !store.exists(leg, candidate).await? {
            fresh.push(candidate.clone());
        }
    }

    if fresh.is_empty() {
        return Ok(0);
    }

    match store.save_unique(leg, &fresh).await {
        Ok(count) => Ok(count),
        // Someone else stored them first.
        Err(CoreError::DuplicateInsert(_)) => Ok(0),
        Err(e) => Err(e),
    }
}
