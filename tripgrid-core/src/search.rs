use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::{CoreError, CoreResult};

/// A directed airport pair, e.g. OPO -> NRT.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Route {
    pub origin: String,
    pub destination: String,
}

impl Route {
    pub fn new(origin: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            destination: destination.into(),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.origin, self.destination)
    }
}

/// One directional search: origin -> destination on a given day.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LegKey {
    pub origin: String,
    pub destination: String,
    pub date: NaiveDate, // Travel day looked up, not the day the search ran
}

impl LegKey {
    pub fn new(origin: impl Into<String>, destination: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            origin: origin.into(),
            destination: destination.into(),
            date,
        }
    }

    pub fn route(&self) -> Route {
        Route::new(self.origin.clone(), self.destination.clone())
    }

    /// The opposite direction on another day (the way home).
    pub fn reversed_on(&self, date: NaiveDate) -> Self {
        Self::new(self.destination.clone(), self.origin.clone(), date)
    }
}

impl fmt::Display for LegKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}@{}", self.origin, self.destination, self.date)
    }
}

/// One priced, scheduled flight offer as returned by a flight source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightCandidate {
    pub origin: String,
    pub destination: String,
    /// Day the lookup was performed.
    pub searched_on: NaiveDate,
    pub departure: NaiveDateTime,
    pub arrival: NaiveDateTime,
    pub price: Option<f64>,
    pub total_hours: Option<f64>,
    #[serde(default)]
    pub carriers: Vec<String>,
    #[serde(default)]
    pub connections: String,
}

impl FlightCandidate {
    pub fn identity(&self) -> FlightIdentity {
        FlightIdentity {
            origin: self.origin.clone(),
            destination: self.destination.clone(),
            departure: self.departure,
            arrival: self.arrival,
            price: self.price.map(canonical_bits),
            total_hours: self.total_hours.map(canonical_bits),
        }
    }

    pub fn route(&self) -> Route {
        Route::new(self.origin.clone(), self.destination.clone())
    }

    /// Ranking price: unknown sorts after every known price.
    pub fn price_rank(&self) -> f64 {
        rank_value(self.price)
    }

    /// Ranking duration: unknown sorts after every known duration.
    pub fn duration_rank(&self) -> f64 {
        rank_value(self.total_hours)
    }

    /// Price as it contributes to an itinerary total.
    pub fn price_or_zero(&self) -> f64 {
        self.price.filter(|p| p.is_finite()).unwrap_or(0.0)
    }
}

fn rank_value(value: Option<f64>) -> f64 {
    match value {
        Some(v) if !v.is_nan() => v,
        _ => f64::INFINITY,
    }
}

// -0.0 and 0.0 must compare equal, and every NaN collapses to one pattern.
fn canonical_bits(value: f64) -> u64 {
    if value == 0.0 {
        0.0f64.to_bits()
    } else if value.is_nan() {
        f64::NAN.to_bits()
    } else {
        value.to_bits()
    }
}

/// Composite identity of a flight offer.
///
/// Two candidates are the same flight when route, schedule, price and
/// duration match exactly. Search day, carriers and connection text are
/// not part of the identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlightIdentity {
    origin: String,
    destination: String,
    departure: NaiveDateTime,
    arrival: NaiveDateTime,
    price: Option<u64>,
    total_hours: Option<u64>,
}

impl FlightIdentity {
    /// Canonical text form, stable across processes. Used as the store's
    /// uniqueness column.
    pub fn fingerprint(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}",
            self.origin,
            self.destination,
            self.departure.format("%Y-%m-%dT%H:%M:%S"),
            self.arrival.format("%Y-%m-%dT%H:%M:%S"),
            render_bits(self.price),
            render_bits(self.total_hours),
        )
    }
}

fn render_bits(bits: Option<u64>) -> String {
    match bits {
        Some(b) => format!("{:?}", f64::from_bits(b)),
        None => "-".to_string(),
    }
}

/// Stay-duration constraints of a trip and the day it must be over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TripWindow {
    stays: Vec<u32>,
    min_stay: u32,
    max_stay: u32,
    last_day: NaiveDate,
}

impl TripWindow {
    /// Window over an explicit set of stay durations (days).
    pub fn new(stays: impl IntoIterator<Item = u32>, last_day: NaiveDate) -> CoreResult<Self> {
        let mut stays: Vec<u32> = stays.into_iter().collect();
        stays.sort_unstable();
        stays.dedup();

        let (min_stay, max_stay) = match (stays.first(), stays.last()) {
            (Some(min), Some(max)) => (*min, *max),
            _ => {
                return Err(CoreError::InvalidWindow(
                    "at least one stay duration is required".to_string(),
                ))
            }
        };

        Ok(Self {
            stays,
            min_stay,
            max_stay,
            last_day,
        })
    }

    /// Window over every stay between `min_stay` and `max_stay`, inclusive.
    pub fn from_range(min_stay: u32, max_stay: u32, last_day: NaiveDate) -> CoreResult<Self> {
        if min_stay > max_stay {
            return Err(CoreError::InvalidWindow(format!(
                "minimum stay {} exceeds maximum stay {}",
                min_stay, max_stay
            )));
        }
        Self::new(min_stay..=max_stay, last_day)
    }

    pub fn stays(&self) -> &[u32] {
        &self.stays
    }

    pub fn min_stay(&self) -> u32 {
        self.min_stay
    }

    pub fn max_stay(&self) -> u32 {
        self.max_stay
    }

    pub fn last_day(&self) -> NaiveDate {
        self.last_day
    }
}

/// Airports, dates and stays to search across.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub origins: Vec<String>,
    pub destinations: Vec<String>,
    pub departure_dates: Vec<NaiveDate>,
    pub stays: Vec<u32>,
    pub last_day: NaiveDate,
}

impl SearchRequest {
    pub fn validate(&self) -> CoreResult<()> {
        if self.origins.is_empty() {
            return Err(CoreError::ValidationError("no origin airports".to_string()));
        }
        if self.destinations.is_empty() {
            return Err(CoreError::ValidationError("no destination airports".to_string()));
        }
        if self.departure_dates.is_empty() {
            return Err(CoreError::ValidationError("no departure dates".to_string()));
        }
        if let Some(code) = self
            .origins
            .iter()
            .chain(self.destinations.iter())
            .find(|code| code.trim().is_empty())
        {
            return Err(CoreError::ValidationError(format!(
                "invalid airport code {:?}",
                code
            )));
        }
        Ok(())
    }

    pub fn trip_window(&self) -> CoreResult<TripWindow> {
        TripWindow::new(self.stays.iter().copied(), self.last_day)
    }
}

/// One fully priced round trip.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItineraryRecord {
    pub outbound_route: Route,
    pub return_route: Route,
    /// Outbound lookup day.
    pub departure_date: NaiveDate,
    /// Return lookup day (`departure_date + nominal_stay_days`).
    pub return_date: NaiveDate,
    pub outbound: FlightCandidate,
    pub inbound: FlightCandidate,
    pub total_price: f64,
    /// Stay used to look up the return leg.
    pub nominal_stay_days: u32,
    /// Days between outbound arrival and return departure.
    pub realized_stay_days: i64,
}

impl ItineraryRecord {
    pub fn partition(&self) -> ItineraryPartition {
        ItineraryPartition {
            outbound: self.outbound_route.clone(),
            departure_date: self.departure_date,
            inbound: self.return_route.clone(),
            return_date: self.return_date,
        }
    }
}

/// Grouping key for exported itineraries: one route and date pair each way.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ItineraryPartition {
    pub outbound: Route,
    pub departure_date: NaiveDate,
    pub inbound: Route,
    pub return_date: NaiveDate,
}

impl ItineraryPartition {
    pub fn file_stem(&self) -> String {
        format!(
            "dep_{}_{}_{}__arr_{}_{}_{}",
            self.outbound.origin,
            self.outbound.destination,
            self.departure_date.format("%Y-%m-%d"),
            self.inbound.origin,
            self.inbound.destination,
            self.return_date.format("%Y-%m-%d"),
        )
    }
}

pub fn partition_itineraries(
    records: impl IntoIterator<Item = ItineraryRecord>,
) -> BTreeMap<ItineraryPartition, Vec<ItineraryRecord>> {
    let mut partitions: BTreeMap<ItineraryPartition, Vec<ItineraryRecord>> = BTreeMap::new();
    for record in records {
        partitions.entry(record.partition()).or_default().push(record);
    }
    partitions
}
