use async_trait::async_trait;

use crate::search::{FlightCandidate, LegKey};
use crate::CoreResult;

#[async_trait]
pub trait FlightSource: Send + Sync {
    /// Look up every flight offer for one leg.
    ///
    /// Failures are reported as `CoreError::SourceUnavailable`; retries,
    /// if any, are the source's own business.
    async fn fetch(&self, leg: &LegKey) -> CoreResult<Vec<FlightCandidate>>;
}
