pub mod search;
pub mod repository;
pub mod supplier;
pub mod memory;

pub use search::{
    partition_itineraries, FlightCandidate, FlightIdentity, ItineraryPartition, ItineraryRecord,
    LegKey, Route, SearchRequest, TripWindow,
};
pub use repository::FlightStore;
pub use supplier::FlightSource;
pub use memory::InMemoryFlightStore;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Invalid trip window: {0}")]
    InvalidWindow(String),
    #[error("Flight source unavailable for {leg}: {reason}")]
    SourceUnavailable { leg: LegKey, reason: String },
    #[error("Flight store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("Flight already stored: {0}")]
    DuplicateInsert(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
