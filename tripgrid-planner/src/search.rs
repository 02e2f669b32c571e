use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;

use chrono::NaiveDate;
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};
use tripgrid_core::{
    partition_itineraries, CoreResult, FlightCandidate, FlightSource, FlightStore,
    ItineraryPartition, ItineraryRecord, LegKey, SearchRequest,
};

use crate::matrix::{build_itineraries, LegMap};
use crate::reducer::{CandidateReducer, DEFAULT_PER_CRITERION};
use crate::resolver::{LegResolver, Provenance};
use crate::throttle::FetchThrottle;
use crate::window::{build_schedule, DateWindow};

#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    /// Cheapest and fastest offers kept per leg, each.
    pub candidates_per_criterion: usize,
    /// Legs resolved at the same time.
    pub max_concurrent_fetches: usize,
    pub throttle: FetchThrottle,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            candidates_per_criterion: DEFAULT_PER_CRITERION,
            max_concurrent_fetches: 2,
            throttle: FetchThrottle::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchStats {
    /// Distinct legs across both directions.
    pub legs: usize,
    pub cache_hits: usize,
    pub fetched: usize,
    pub failed: usize,
    /// Legs left unresolved by cancellation.
    pub skipped: usize,
    pub persisted: usize,
    pub store_degraded: usize,
    /// Nominal (departure, stay) slots inside the trip window.
    pub slots: usize,
    pub partitions: usize,
    pub itineraries: usize,
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub window: DateWindow,
    pub outbound: LegMap,
    pub inbound: LegMap,
    pub itineraries: Vec<ItineraryRecord>,
    pub stats: SearchStats,
    pub cancelled: bool,
}

impl SearchOutcome {
    pub fn partitions(&self) -> BTreeMap<ItineraryPartition, Vec<ItineraryRecord>> {
        partition_itineraries(self.itineraries.iter().cloned())
    }
}

/// One round-trip search across airports, dates and stays.
///
/// Every distinct leg is resolved once per run, a few at a time, and the
/// results are joined into itineraries. Per-leg failures only shrink the
/// result; an invalid request or window aborts before any lookup.
pub struct TripSearch {
    resolver: LegResolver,
    settings: EngineSettings,
}

impl TripSearch {
    pub fn new(
        source: Arc<dyn FlightSource>,
        store: Option<Arc<dyn FlightStore>>,
        settings: EngineSettings,
    ) -> Self {
        let resolver = LegResolver::new(
            source,
            store,
            CandidateReducer::new(settings.candidates_per_criterion),
        )
        .with_throttle(settings.throttle);

        Self { resolver, settings }
    }

    pub async fn run(&self, request: &SearchRequest, today: NaiveDate) -> CoreResult<SearchOutcome> {
        self.run_until(request, today, std::future::pending()).await
    }

    /// Like `run`, but stops resolving legs once `shutdown` completes. Legs
    /// resolved so far are still joined.
    pub async fn run_until<F>(
        &self,
        request: &SearchRequest,
        today: NaiveDate,
        shutdown: F,
    ) -> CoreResult<SearchOutcome>
    where
        F: Future<Output = ()>,
    {
        request.validate()?;
        let trip = request.trip_window()?;

        let window = DateWindow::for_trip(&request.departure_dates, &trip);
        let schedule = build_schedule(&window.departure_dates, &trip);

        let outbound_keys = leg_keys(&request.origins, &request.destinations, &window.departure_dates);
        let return_keys = leg_keys(&request.destinations, &request.origins, &window.return_dates);
        let distinct: BTreeSet<LegKey> = outbound_keys.iter().chain(return_keys.iter()).cloned().collect();

        info!(
            "Searching {} legs ({} outbound, {} return) for {} trip slots",
            distinct.len(),
            outbound_keys.len(),
            return_keys.len(),
            schedule.len()
        );

        let mut stats = SearchStats {
            legs: distinct.len(),
            slots: schedule.len(),
            ..Default::default()
        };

        let resolver = &self.resolver;
        let mut pending = stream::iter(distinct)
            .map(|leg| async move {
                let result = resolver.resolve(&leg, today).await;
                (leg, result)
            })
            .buffer_unordered(self.settings.max_concurrent_fetches.max(1));

        let mut resolved: HashMap<LegKey, Vec<FlightCandidate>> = HashMap::new();
        let mut cancelled = false;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    warn!("Search cancelled with {} of {} legs resolved", resolved.len(), stats.legs);
                    cancelled = true;
                    break;
                }
                next = pending.next() => {
                    let Some((leg, result)) = next else { break };
                    match result {
                        Ok(resolution) => {
                            match resolution.provenance {
                                Provenance::CacheHit => stats.cache_hits += 1,
                                Provenance::Fetched => stats.fetched += 1,
                            }
                            stats.persisted += resolution.persisted;
                            if resolution.store_degraded {
                                stats.store_degraded += 1;
                            }
                            debug!("{} resolved with {} flights", leg, resolution.candidates.len());
                            resolved.insert(leg, resolution.candidates);
                        }
                        Err(e) => {
                            warn!("No flights for {}: {}", leg, e);
                            stats.failed += 1;
                            resolved.insert(leg, Vec::new());
                        }
                    }
                }
            }
        }
        stats.skipped = stats.legs - resolved.len();

        let outbound = collect_legs(outbound_keys, &resolved);
        let inbound = collect_legs(return_keys, &resolved);
        let itineraries = build_itineraries(&outbound, &inbound, trip.stays());

        stats.itineraries = itineraries.len();
        stats.partitions = itineraries
            .iter()
            .map(ItineraryRecord::partition)
            .collect::<BTreeSet<_>>()
            .len();

        info!(
            "Search finished: {} itineraries in {} partitions ({} fetched, {} cached, {} failed)",
            stats.itineraries, stats.partitions, stats.fetched, stats.cache_hits, stats.failed
        );

        Ok(SearchOutcome {
            window,
            outbound,
            inbound,
            itineraries,
            stats,
            cancelled,
        })
    }
}

fn leg_keys(from: &[String], to: &[String], dates: &[NaiveDate]) -> Vec<LegKey> {
    let mut keys = Vec::new();
    for origin in from {
        for destination in to {
            if origin == destination {
                debug!("Skipping {} -> {}: same airport", origin, destination);
                continue;
            }
            for date in dates {
                keys.push(LegKey::new(origin.clone(), destination.clone(), *date));
            }
        }
    }
    keys
}

// Keys never resolved (cancelled run) stay out of the map.
fn collect_legs(keys: Vec<LegKey>, resolved: &HashMap<LegKey, Vec<FlightCandidate>>) -> LegMap {
    keys.into_iter()
        .filter_map(|key| {
            let flights = resolved.get(&key)?.clone();
            Some((key, flights))
        })
        .collect()
}
