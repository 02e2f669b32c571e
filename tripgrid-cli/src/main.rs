use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tripgrid_cli::{engine_settings, export, write_summary};
use tripgrid_core::{FlightStore, InMemoryFlightStore};
use tripgrid_planner::TripSearch;
use tripgrid_store::{app_config::Config, DbClient, FileFlightSource, PostgresFlightStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tripgrid_cli=info,tripgrid_planner=info,tripgrid_store=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    let request = config.search.to_request()?;
    let today = chrono::Local::now().date_naive();

    tracing::info!(
        "Starting trip search from {:?} to {:?} ({} departure dates, stays {:?})",
        request.origins,
        request.destinations,
        request.departure_dates.len(),
        request.stays
    );

    let store: Arc<dyn FlightStore> = match DbClient::from_config(&config.database)
        .await
        .context("Failed to connect to Postgres")?
    {
        Some(db) => {
            db.migrate().await.context("Failed to run migrations")?;
            tracing::info!("Using Postgres flight store");
            Arc::new(PostgresFlightStore::new(&db))
        }
        None => {
            tracing::warn!("No database configured; flights are kept in memory for this run");
            Arc::new(InMemoryFlightStore::new())
        }
    };
    store.health_check().await.context("Flight store health check failed")?;

    let source = Arc::new(FileFlightSource::new(&config.source.fixtures_dir, today));
    let search = TripSearch::new(source, Some(store), engine_settings(&config.engine));

    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing with the legs resolved so far");
        } else {
            // No signal handler; run to completion.
            std::future::pending::<()>().await;
        }
    };

    let outcome = search.run_until(&request, today, shutdown).await?;

    let partitions = outcome.partitions();
    export::export_partitions(&config.export.output_dir, &partitions)?;
    let summary = write_summary(&config.export.output_dir, &outcome.stats, outcome.cancelled)?;

    let stats = &outcome.stats;
    tracing::info!(
        "Search finished: {} legs ({} cached, {} fetched, {} failed, {} skipped), {} flights stored, {} itineraries in {} partitions",
        stats.legs,
        stats.cache_hits,
        stats.fetched,
        stats.failed,
        stats.skipped,
        stats.persisted,
        stats.itineraries,
        stats.partitions
    );
    if stats.store_degraded > 0 {
        tracing::warn!("{} legs ran without the flight store", stats.store_degraded);
    }
    tracing::info!("Summary written to {}", summary.display());

    Ok(())
}
