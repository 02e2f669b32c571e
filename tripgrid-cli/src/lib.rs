pub mod export;

use std::path::{Path, PathBuf};

use anyhow::Context;
use tripgrid_planner::{EngineSettings, FetchThrottle, SearchStats};
use tripgrid_store::app_config::EngineConfig;

pub fn engine_settings(config: &EngineConfig) -> EngineSettings {
    EngineSettings {
        candidates_per_criterion: config.candidates_per_criterion,
        max_concurrent_fetches: config.max_concurrent_fetches,
        throttle: FetchThrottle::from_millis(config.min_fetch_delay_ms, config.max_fetch_delay_ms),
    }
}

/// Write run counters to `{dir}/summary.json`.
pub fn write_summary(dir: &Path, stats: &SearchStats, cancelled: bool) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output dir {}", dir.display()))?;

    let path = dir.join("summary.json");
    let body = serde_json::json!({
        "cancelled": cancelled,
        "stats": stats,
    });
    std::fs::write(&path, serde_json::to_vec_pretty(&body)?)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}
