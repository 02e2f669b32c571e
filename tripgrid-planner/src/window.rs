use chrono::{Days, NaiveDate};
use serde::Serialize;
use tripgrid_core::{CoreError, CoreResult, TripWindow};

/// Days to search in each direction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DateWindow {
    /// Departure days on or before the last allowed day, ascending.
    pub departure_dates: Vec<NaiveDate>,
    /// Every day a return flight may leave on, ascending and contiguous.
    pub return_dates: Vec<NaiveDate>,
}

impl DateWindow {
    pub fn for_trip(departure_dates: &[NaiveDate], window: &TripWindow) -> Self {
        // A TripWindow always satisfies min <= max.
        build_date_window(
            departure_dates,
            window.min_stay(),
            window.max_stay(),
            window.last_day(),
        )
        .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.departure_dates.is_empty() || self.return_dates.is_empty()
    }
}

/// Compute the departure and return days of a trip.
///
/// Returns run from `earliest departure + min_stay` to
/// `min(last_day, latest departure + max_stay)`, one per day. The bounds use
/// every candidate departure day, including ones past `last_day`. An empty
/// range yields no return days rather than an error.
pub fn build_date_window(
    departure_dates: &[NaiveDate],
    min_stay: u32,
    max_stay: u32,
    last_day: NaiveDate,
) -> CoreResult<DateWindow> {
    if min_stay > max_stay {
        return Err(CoreError::InvalidWindow(format!(
            "minimum stay {} exceeds maximum stay {}",
            min_stay, max_stay
        )));
    }

    let mut departures: Vec<NaiveDate> = departure_dates
        .iter()
        .copied()
        .filter(|d| *d <= last_day)
        .collect();
    departures.sort_unstable();
    departures.dedup();

    let (Some(earliest), Some(latest)) = (
        departure_dates.iter().min().copied(),
        departure_dates.iter().max().copied(),
    ) else {
        return Ok(DateWindow::default());
    };

    let first_return = earliest.checked_add_days(Days::new(u64::from(min_stay)));
    let last_return = latest
        .checked_add_days(Days::new(u64::from(max_stay)))
        .map(|d| d.min(last_day))
        .unwrap_or(last_day);

    let return_dates = match first_return {
        Some(first) if first <= last_return => first
            .iter_days()
            .take_while(|d| *d <= last_return)
            .collect(),
        _ => Vec::new(),
    };

    Ok(DateWindow {
        departure_dates: departures,
        return_dates,
    })
}

/// A nominal (departure, return) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ScheduleSlot {
    pub departure: NaiveDate,
    pub return_date: NaiveDate,
    pub stay: u32,
}

/// Every (departure, stay) pair whose return day is within the window.
pub fn build_schedule(departure_dates: &[NaiveDate], window: &TripWindow) -> Vec<ScheduleSlot> {
    let mut departures = departure_dates.to_vec();
    departures.sort_unstable();
    departures.dedup();

    let mut slots = Vec::new();
    for departure in departures {
        for &stay in window.stays() {
            let Some(return_date) = departure.checked_add_days(Days::new(u64::from(stay))) else {
                continue;
            };
            if return_date <= window.last_day() {
                slots.push(ScheduleSlot {
                    departure,
                    return_date,
                    stay,
                });
            }
        }
    }
    slots
}
