use std::collections::HashSet;

use tripgrid_core::FlightCandidate;

pub const DEFAULT_PER_CRITERION: usize = 5;

/// Cuts a scraped result list down to its cheapest and fastest offers.
///
/// Keeps the `per_criterion` cheapest and the `per_criterion` fastest
/// candidates, cheapest first, without identity duplicates. Unknown prices
/// and durations rank last; ties keep input order.
#[derive(Debug, Clone, Copy)]
pub struct CandidateReducer {
    per_criterion: usize,
}

impl CandidateReducer {
    pub fn new(per_criterion: usize) -> Self {
        // Zero would turn a non-empty result into an empty one.
        Self {
            per_criterion: per_criterion.max(1),
        }
    }

    pub fn per_criterion(&self) -> usize {
        self.per_criterion
    }

    pub fn reduce(&self, candidates: Vec<FlightCandidate>) -> Vec<FlightCandidate> {
        let mut by_price: Vec<usize> = (0..candidates.len()).collect();
        by_price.sort_by(|&a, &b| {
            candidates[a]
                .price_rank()
                .total_cmp(&candidates[b].price_rank())
        });

        let mut by_duration: Vec<usize> = (0..candidates.len()).collect();
        by_duration.sort_by(|&a, &b| {
            candidates[a]
                .duration_rank()
                .total_cmp(&candidates[b].duration_rank())
        });

        let picked = by_price
            .into_iter()
            .take(self.per_criterion)
            .chain(by_duration.into_iter().take(self.per_criterion));

        let mut seen = HashSet::new();
        let mut keep = Vec::with_capacity(self.per_criterion * 2);
        for index in picked {
            if seen.insert(candidates[index].identity()) {
                keep.push(index);
            }
        }

        let mut slots: Vec<Option<FlightCandidate>> = candidates.into_iter().map(Some).collect();
        keep.into_iter()
            .filter_map(|index| slots[index].take())
            .collect()
    }
}

impl Default for CandidateReducer {
    fn default() -> Self {
        Self::new(DEFAULT_PER_CRITERION)
    }
}
