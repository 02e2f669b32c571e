use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;
use tripgrid_core::{CoreError, CoreResult, FlightCandidate, FlightSource, LegKey};

/// Flight source replaying recorded lookups from disk.
///
/// One JSON array per leg, at `{dir}/{ORIGIN}-{DESTINATION}-{YYYY-MM-DD}.json`.
/// A missing file means the leg has no flights.
pub struct FileFlightSource {
    dir: PathBuf,
    searched_on: NaiveDate,
}

/// A flight as recorded, before it is tied to a search day.
#[derive(Debug, Deserialize)]
struct RecordedFlight {
    origin: Option<String>,
    destination: Option<String>,
    departure: NaiveDateTime,
    arrival: NaiveDateTime,
    price: Option<f64>,
    total_hours: Option<f64>,
    #[serde(default)]
    carriers: Vec<String>,
    #[serde(default)]
    connections: String,
}

impl FileFlightSource {
    pub fn new(dir: impl Into<PathBuf>, searched_on: NaiveDate) -> Self {
        Self {
            dir: dir.into(),
            searched_on,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, leg: &LegKey) -> PathBuf {
        self.dir.join(format!(
            "{}-{}-{}.json",
            leg.origin,
            leg.destination,
            leg.date.format("%Y-%m-%d")
        ))
    }
}

/// Parse one recorded response. Missing airports default to the leg's.
pub fn parse_recorded(
    json: &str,
    leg: &LegKey,
    searched_on: NaiveDate,
) -> Result<Vec<FlightCandidate>, serde_json::Error> {
    let recorded: Vec<RecordedFlight> = serde_json::from_str(json)?;

    Ok(recorded
        .into_iter()
        .map(|r| FlightCandidate {
            origin: r.origin.unwrap_or_else(|| leg.origin.clone()),
            destination: r.destination.unwrap_or_else(|| leg.destination.clone()),
            searched_on,
            departure: r.departure,
            arrival: r.arrival,
            price: r.price,
            total_hours: r.total_hours,
            carriers: r.carriers,
            connections: r.connections,
        })
        .collect())
}

#[async_trait]
impl FlightSource for FileFlightSource {
    async fn fetch(&self, leg: &LegKey) -> CoreResult<Vec<FlightCandidate>> {
        let path = self.path_for(leg);

        let json = match tokio::fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No recording for {} at {}", leg, path.display());
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(CoreError::SourceUnavailable {
                    leg: leg.clone(),
                    reason: format!("{}: {}", path.display(), e),
                })
            }
        };

        parse_recorded(&json, leg, self.searched_on).map_err(|e| CoreError::SourceUnavailable {
            leg: leg.clone(),
            reason: format!("{}: {}", path.display(), e),
        })
    }
}
