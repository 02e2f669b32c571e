use std::collections::BTreeMap;

use chrono::Days;
use tripgrid_core::{FlightCandidate, ItineraryRecord, LegKey};

/// Run-scoped candidates per leg. Ordered so output is deterministic.
pub type LegMap = BTreeMap<LegKey, Vec<FlightCandidate>>;

/// Join outbound and return candidates into round trips.
///
/// For every outbound leg with candidates and every stay `s`, the return leg
/// is the reversed route on `departure + s`. A missing or empty return leg
/// produces nothing for that slot. Each surviving pair becomes one record.
pub fn build_itineraries(outbound: &LegMap, inbound: &LegMap, stays: &[u32]) -> Vec<ItineraryRecord> {
    let mut records = Vec::new();

    for (out_leg, out_flights) in outbound {
        if out_flights.is_empty() {
            continue;
        }

        for &stay in stays {
            let Some(return_date) = out_leg.date.checked_add_days(Days::new(u64::from(stay))) else {
                continue;
            };
            let return_leg = out_leg.reversed_on(return_date);
            let Some(in_flights) = inbound.get(&return_leg) else {
                continue;
            };

            for out_flight in out_flights {
                for in_flight in in_flights {
                    records.push(pair(out_leg, &return_leg, stay, out_flight, in_flight));
                }
            }
        }
    }

    records
}

fn pair(
    out_leg: &LegKey,
    return_leg: &LegKey,
    stay: u32,
    outbound: &FlightCandidate,
    inbound: &FlightCandidate,
) -> ItineraryRecord {
    // Realized stay follows the actual timestamps, which can drift from
    // the nominal stay on overnight flights.
    let realized = (inbound.departure.date() - outbound.arrival.date()).num_days();

    ItineraryRecord {
        outbound_route: out_leg.route(),
        return_route: return_leg.route(),
        departure_date: out_leg.date,
        return_date: return_leg.date,
        outbound: outbound.clone(),
        inbound: inbound.clone(),
        total_price: outbound.price_or_zero() + inbound.price_or_zero(),
        nominal_stay_days: stay,
        realized_stay_days: realized,
    }
}
