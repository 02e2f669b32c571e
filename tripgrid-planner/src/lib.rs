pub mod window;
pub mod reducer;
pub mod resolver;
pub mod matrix;
pub mod throttle;
pub mod search;

pub use window::{build_date_window, build_schedule, DateWindow, ScheduleSlot};
pub use reducer::CandidateReducer;
pub use resolver::{LegResolver, Provenance, Resolution};
pub use matrix::{build_itineraries, LegMap};
pub use throttle::FetchThrottle;
pub use search::{EngineSettings, SearchOutcome, SearchStats, TripSearch};
