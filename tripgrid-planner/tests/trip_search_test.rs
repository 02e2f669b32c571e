use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as Span, NaiveDate};
use tripgrid_core::{
    CoreError, CoreResult, FlightCandidate, FlightSource, FlightStore, InMemoryFlightStore, LegKey,
    SearchRequest,
};
use tripgrid_planner::{EngineSettings, FetchThrottle, TripSearch};

/// Flight source answering from a fixed table and counting lookups.
#[derive(Default)]
struct ScriptedSource {
    answers: HashMap<LegKey, Vec<FlightCandidate>>,
    failing: HashSet<LegKey>,
    hanging: HashSet<LegKey>,
    calls: AtomicUsize,
    seen: Mutex<Vec<LegKey>>,
}

impl ScriptedSource {
    fn answer(mut self, leg: LegKey, flights: Vec<FlightCandidate>) -> Self {
        self.answers.insert(leg, flights);
        self
    }

    fn fail(mut self, leg: LegKey) -> Self {
        self.failing.insert(leg);
        self
    }

    fn hang(mut self, leg: LegKey) -> Self {
        self.hanging.insert(leg);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FlightSource for ScriptedSource {
    async fn fetch(&self, leg: &LegKey) -> CoreResult<Vec<FlightCandidate>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(leg.clone());

        if self.hanging.contains(leg) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.failing.contains(leg) {
            return Err(CoreError::SourceUnavailable {
                leg: leg.clone(),
                reason: "captcha wall".to_string(),
            });
        }
        Ok(self.answers.get(leg).cloned().unwrap_or_default())
    }
}

fn day(m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, m, d).unwrap()
}

fn today() -> NaiveDate {
    day(7, 1)
}

fn flight(leg: &LegKey, hour: i64, price: f64, hours: i64) -> FlightCandidate {
    let departure = leg.date.and_hms_opt(0, 0, 0).unwrap() + Span::hours(hour);
    FlightCandidate {
        origin: leg.origin.clone(),
        destination: leg.destination.clone(),
        searched_on: today(),
        departure,
        arrival: departure + Span::hours(hours),
        price: Some(price),
        total_hours: Some(hours as f64),
        carriers: vec!["TP".to_string()],
        connections: String::new(),
    }
}

fn request(dates: Vec<NaiveDate>, stays: Vec<u32>) -> SearchRequest {
    SearchRequest {
        origins: vec!["OPO".to_string()],
        destinations: vec!["NRT".to_string()],
        departure_dates: dates,
        stays,
        last_day: day(8, 31),
    }
}

fn settings() -> EngineSettings {
    EngineSettings {
        candidates_per_criterion: 5,
        max_concurrent_fetches: 2,
        throttle: FetchThrottle::disabled(),
    }
}

fn engine(source: Arc<ScriptedSource>, store: Option<Arc<InMemoryFlightStore>>) -> TripSearch {
    TripSearch::new(
        source,
        store.map(|s| s as Arc<dyn FlightStore>),
        settings(),
    )
}

fn scenario_a() -> ScriptedSource {
    let out_leg = LegKey::new("OPO", "NRT", day(8, 1));
    let ret_leg = LegKey::new("NRT", "OPO", day(8, 10));
    ScriptedSource::default()
        .answer(out_leg.clone(), vec![flight(&out_leg, 6, 400.0, 14)])
        .answer(ret_leg.clone(), vec![flight(&ret_leg, 10, 420.0, 15)])
}

#[tokio::test]
async fn test_single_round_trip() {
    let source = Arc::new(scenario_a());
    let store = Arc::new(InMemoryFlightStore::new());
    let search = engine(source.clone(), Some(store.clone()));

    let outcome = search
        .run(&request(vec![day(8, 1)], vec![9]), today())
        .await
        .unwrap();

    assert_eq!(outcome.itineraries.len(), 1);
    let trip = &outcome.itineraries[0];
    assert_eq!(trip.total_price, 820.0);
    assert_eq!(trip.realized_stay_days, 9);
    assert_eq!(trip.nominal_stay_days, 9);
    assert_eq!(trip.departure_date, day(8, 1));
    assert_eq!(trip.return_date, day(8, 10));

    assert!(!outcome.cancelled);
    assert_eq!(outcome.stats.legs, 2);
    assert_eq!(outcome.stats.fetched, 2);
    assert_eq!(outcome.stats.partitions, 1);
    assert_eq!(source.calls(), 2);
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn test_empty_return_leg_is_not_fatal() {
    let out_leg = LegKey::new("OPO", "NRT", day(8, 1));
    let source = Arc::new(
        ScriptedSource::default()
            .answer(out_leg.clone(), vec![flight(&out_leg, 6, 400.0, 14)])
            .answer(LegKey::new("NRT", "OPO", day(8, 10)), Vec::new()),
    );
    let search = engine(source, Some(Arc::new(InMemoryFlightStore::new())));

    let outcome = search
        .run(&request(vec![day(8, 1)], vec![9]), today())
        .await
        .unwrap();

    assert!(outcome.itineraries.is_empty());
    assert_eq!(outcome.stats.failed, 0);
}

#[tokio::test]
async fn test_two_departures_two_stays() {
    let mut source = ScriptedSource::default();
    for d in [1, 2] {
        let leg = LegKey::new("OPO", "NRT", day(8, d));
        let flights = (0..3).map(|h| flight(&leg, 6 + h, 400.0 + h as f64, 14)).collect();
        source = source.answer(leg, flights);
    }
    for d in 9..=11 {
        let leg = LegKey::new("NRT", "OPO", day(8, d));
        let flights = (0..2).map(|h| flight(&leg, 10 + h, 420.0 + h as f64, 15)).collect();
        source = source.answer(leg, flights);
    }
    let source = Arc::new(source);
    let search = engine(source.clone(), None);

    let outcome = search
        .run(&request(vec![day(8, 1), day(8, 2)], vec![8, 9]), today())
        .await
        .unwrap();

    // (08-01, 8), (08-01, 9), (08-02, 8), (08-02, 9) all have a return leg.
    assert_eq!(outcome.itineraries.len(), 4 * 3 * 2);
    assert_eq!(outcome.stats.partitions, 4);
    assert_eq!(outcome.stats.slots, 4);
    assert_eq!(outcome.window.return_dates, vec![day(8, 9), day(8, 10), day(8, 11)]);

    let partitions = outcome.partitions();
    assert!(partitions.values().all(|records| records.len() == 6));

    // 2 outbound + 3 return legs, each fetched exactly once.
    assert_eq!(source.calls(), 5);
    let seen = source.seen.lock().unwrap();
    let distinct: HashSet<&LegKey> = seen.iter().collect();
    assert_eq!(distinct.len(), seen.len());
}

#[tokio::test]
async fn test_rerun_same_day_hits_cache() {
    let source = Arc::new(scenario_a());
    let store = Arc::new(InMemoryFlightStore::new());
    let search = engine(source.clone(), Some(store.clone()));
    let req = request(vec![day(8, 1)], vec![9]);

    search.run(&req, today()).await.unwrap();
    let second = search.run(&req, today()).await.unwrap();

    assert_eq!(source.calls(), 2);
    assert_eq!(second.stats.cache_hits, 2);
    assert_eq!(second.stats.fetched, 0);
    assert_eq!(second.itineraries.len(), 1);

    // Stored once, not once per run.
    let out_leg = LegKey::new("OPO", "NRT", day(8, 1));
    let stored = store.find_by_key(&out_leg, today()).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(store.save_calls(), 2);
}

#[tokio::test]
async fn test_new_search_day_fetches_again() {
    let source = Arc::new(scenario_a());
    let store = Arc::new(InMemoryFlightStore::new());
    let search = engine(source.clone(), Some(store.clone()));
    let req = request(vec![day(8, 1)], vec![9]);

    search.run(&req, today()).await.unwrap();
    search.run(&req, day(7, 2)).await.unwrap();

    assert_eq!(source.calls(), 4);
    assert_eq!(store.len(), 4);
}

#[tokio::test]
async fn test_store_outage_still_returns_itineraries() {
    let source = Arc::new(scenario_a());
    let store = Arc::new(InMemoryFlightStore::new());
    store.set_available(false);
    let search = engine(source.clone(), Some(store.clone()));

    let outcome = search
        .run(&request(vec![day(8, 1)], vec![9]), today())
        .await
        .unwrap();

    assert_eq!(outcome.itineraries.len(), 1);
    assert_eq!(outcome.stats.store_degraded, 2);
    assert_eq!(outcome.stats.persisted, 0);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_source_failure_is_isolated() {
    let source = Arc::new(scenario_a().fail(LegKey::new("NRT", "OPO", day(8, 10))));
    let search = engine(source.clone(), None);

    let outcome = search
        .run(&request(vec![day(8, 1)], vec![9]), today())
        .await
        .unwrap();

    assert!(outcome.itineraries.is_empty());
    assert_eq!(outcome.stats.failed, 1);
    assert_eq!(outcome.stats.fetched, 1);
    assert_eq!(
        outcome.inbound.get(&LegKey::new("NRT", "OPO", day(8, 10))),
        Some(&Vec::new())
    );
}

#[tokio::test]
async fn test_invalid_request_aborts_before_lookups() {
    let source = Arc::new(scenario_a());
    let search = engine(source.clone(), None);

    let err = search
        .run(&request(vec![day(8, 1)], Vec::new()), today())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidWindow(_)));

    let mut req = request(vec![day(8, 1)], vec![9]);
    req.origins.clear();
    let err = search.run(&req, today()).await.unwrap_err();
    assert!(matches!(err, CoreError::ValidationError(_)));

    assert_eq!(source.calls(), 0);
}

#[tokio::test]
async fn test_hot_route_is_capped() {
    let out_leg = LegKey::new("OPO", "NRT", day(8, 1));
    let ret_leg = LegKey::new("NRT", "OPO", day(8, 10));
    let source = Arc::new(
        ScriptedSource::default()
            .answer(
                out_leg.clone(),
                (0..40).map(|h| flight(&out_leg, h, 900.0 - h as f64, 10 + h)).collect(),
            )
            .answer(
                ret_leg.clone(),
                (0..40).map(|h| flight(&ret_leg, h, 500.0 + h as f64, 50 - h)).collect(),
            ),
    );
    let search = engine(source, None);

    let outcome = search
        .run(&request(vec![day(8, 1)], vec![9]), today())
        .await
        .unwrap();

    assert_eq!(outcome.outbound[&out_leg].len(), 10);
    assert_eq!(outcome.inbound[&ret_leg].len(), 10);
    assert_eq!(outcome.itineraries.len(), 100);
}

#[tokio::test]
async fn test_cancelled_run_keeps_resolved_legs() {
    let out_leg = LegKey::new("OPO", "NRT", day(8, 1));
    let ret_leg = LegKey::new("NRT", "OPO", day(8, 10));
    let source = Arc::new(
        ScriptedSource::default()
            .answer(out_leg.clone(), vec![flight(&out_leg, 6, 400.0, 14)])
            .hang(ret_leg.clone()),
    );
    let search = engine(source, None);

    let outcome = search
        .run_until(
            &request(vec![day(8, 1)], vec![9]),
            today(),
            tokio::time::sleep(Duration::from_millis(100)),
        )
        .await
        .unwrap();

    assert!(outcome.cancelled);
    assert!(outcome.itineraries.is_empty());
    assert!(outcome.outbound.contains_key(&out_leg));
    assert!(!outcome.inbound.contains_key(&ret_leg));
    assert_eq!(outcome.stats.skipped, 1);
}

#[tokio::test]
async fn test_overnight_flight_stays_with_its_own_leg() {
    let first = LegKey::new("OPO", "NRT", day(8, 1));
    let second = LegKey::new("OPO", "NRT", day(8, 2));
    let source = Arc::new(
        ScriptedSource::default()
            // Found by the 08-01 lookup but leaving just after midnight.
            .answer(first.clone(), vec![flight(&first, 24, 380.0, 14)])
            .answer(
                second.clone(),
                (0..3).map(|h| flight(&second, 8 + h, 450.0 + h as f64, 14)).collect(),
            ),
    );
    let store = Arc::new(InMemoryFlightStore::new());
    let search = TripSearch::new(
        source.clone(),
        Some(store.clone() as Arc<dyn FlightStore>),
        EngineSettings {
            max_concurrent_fetches: 1,
            ..settings()
        },
    );
    let req = request(vec![day(8, 1), day(8, 2)], vec![9]);

    let outcome = search.run(&req, today()).await.unwrap();

    assert!(source.seen.lock().unwrap().contains(&second));
    assert_eq!(outcome.stats.cache_hits, 0);
    assert_eq!(outcome.outbound[&first].len(), 1);
    let prices: Vec<Option<f64>> = outcome.outbound[&second].iter().map(|f| f.price).collect();
    assert_eq!(prices, vec![Some(450.0), Some(451.0), Some(452.0)]);

    // A rerun the same day is served per leg from the store.
    let calls = source.calls();
    let rerun = search.run(&req, today()).await.unwrap();
    assert_eq!(source.calls(), calls + 2);
    assert_eq!(rerun.stats.cache_hits, 2);
    assert_eq!(rerun.outbound[&first].len(), 1);
    assert_eq!(rerun.outbound[&second].len(), 3);
}
