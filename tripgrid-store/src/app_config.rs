use chrono::NaiveDate;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use tripgrid_core::{CoreError, CoreResult, SearchRequest, TripWindow};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub search: SearchConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    pub origins: Vec<String>,
    pub destinations: Vec<String>,
    #[serde(default)]
    pub departure_dates: Vec<NaiveDate>,
    pub first_departure: Option<NaiveDate>,
    #[serde(default = "default_span")]
    pub departure_span_days: u32,
    #[serde(default)]
    pub stay_days: Vec<u32>,
    pub min_stay: Option<u32>,
    pub max_stay: Option<u32>,
    pub last_day: NaiveDate,
}

fn default_span() -> u32 { 1 }

#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    #[serde(default = "default_per_criterion")]
    pub candidates_per_criterion: usize,
    #[serde(default = "default_concurrency")]
    pub max_concurrent_fetches: usize,
    #[serde(default = "default_min_delay")]
    pub min_fetch_delay_ms: u64,
    #[serde(default = "default_max_delay")]
    pub max_fetch_delay_ms: u64,
}

fn default_per_criterion() -> usize { 5 }
fn default_concurrency() -> usize { 2 }
fn default_min_delay() -> u64 { 50 }
fn default_max_delay() -> u64 { 5500 }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            candidates_per_criterion: default_per_criterion(),
            max_concurrent_fetches: default_concurrency(),
            min_fetch_delay_ms: default_min_delay(),
            max_fetch_delay_ms: default_max_delay(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Postgres URL. Without one the run keeps flights in memory only.
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub fixtures_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExportConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_output_dir() -> PathBuf { PathBuf::from("outputs") }

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Untracked local overrides
            .add_source(config::File::with_name("config/local").required(false))
            // Eg.. `TRIPGRID__DATABASE__URL=postgres://...`
            .add_source(config::Environment::with_prefix("TRIPGRID").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

impl SearchConfig {
    /// Resolve list/range settings into a concrete search request.
    pub fn to_request(&self) -> CoreResult<SearchRequest> {
        let origins = normalize_codes(&self.origins);
        let destinations = normalize_codes(&self.destinations);

        let mut departure_dates = self.departure_dates.clone();
        if let Some(first) = self.first_departure {
            departure_dates.extend(
                first
                    .iter_days()
                    .take(self.departure_span_days as usize),
            );
        }
        departure_dates.sort_unstable();
        departure_dates.dedup();

        let stays = self.stays()?;

        let request = SearchRequest {
            origins,
            destinations,
            departure_dates,
            stays,
            last_day: self.last_day,
        };
        request.validate()?;
        Ok(request)
    }

    fn stays(&self) -> CoreResult<Vec<u32>> {
        let mut stays = self.stay_days.clone();
        match (self.min_stay, self.max_stay) {
            (Some(min), Some(max)) => {
                let window = TripWindow::from_range(min, max, self.last_day)?;
                stays.extend_from_slice(window.stays());
            }
            (None, None) => {}
            _ => {
                return Err(CoreError::ValidationError(
                    "min_stay and max_stay must be set together".to_string(),
                ))
            }
        }
        stays.sort_unstable();
        stays.dedup();
        Ok(stays)
    }
}

fn normalize_codes(codes: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(codes.len());
    for code in codes {
        let code = code.trim().to_ascii_uppercase();
        if !out.contains(&code) {
            out.push(code);
        }
    }
    out
}
