use async_trait::async_trait;
use chrono::NaiveDate;

use crate::search::{FlightCandidate, LegKey};
use crate::CoreResult;

/// Long-lived storage for flight candidates across search runs.
///
/// Rows are filed under the leg they were fetched for and the day the search
/// ran. A flight leaving after midnight still belongs to the leg that found
/// it, and the same flight found on two different days is stored twice.
#[async_trait]
pub trait FlightStore: Send + Sync {
    /// Candidates stored for `leg` by a search performed on `searched_on`.
    async fn find_by_key(
        &self,
        leg: &LegKey,
        searched_on: NaiveDate,
    ) -> CoreResult<Vec<FlightCandidate>>;

    /// Whether a candidate with the same identity was already stored for
    /// `leg` on the candidate's search day.
    async fn exists(&self, leg: &LegKey, candidate: &FlightCandidate) -> CoreResult<bool>;

    /// Store every candidate of `leg` not stored yet. Returns how many were
    /// new. Already-stored candidates are skipped, never reported as errors.
    async fn save_unique(&self, leg: &LegKey, candidates: &[FlightCandidate]) -> CoreResult<usize>;

    async fn health_check(&self) -> CoreResult<()> {
        Ok(())
    }
}
