use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::info;
use tripgrid_core::{FlightCandidate, ItineraryPartition, ItineraryRecord};

const FLIGHT_COLUMNS: [&str; 11] = [
    "searched_on",
    "origin",
    "destination",
    "departure_date",
    "departure_time",
    "arrival_date",
    "arrival_time",
    "price",
    "total_hours",
    "carriers",
    "connections",
];

/// Column names: outbound flight, return flight, then the pairing.
pub fn headers() -> Vec<String> {
    let mut headers = Vec::with_capacity(FLIGHT_COLUMNS.len() * 2 + 3);
    for prefix in ["dep", "arr"] {
        headers.extend(FLIGHT_COLUMNS.iter().map(|c| format!("{}_{}", prefix, c)));
    }
    headers.push("total_price".to_string());
    headers.push("realized_stay_days".to_string());
    headers.push("nominal_stay_days".to_string());
    headers
}

fn flight_fields(flight: &FlightCandidate) -> [String; 11] {
    [
        flight.searched_on.format("%Y-%m-%d").to_string(),
        flight.origin.clone(),
        flight.destination.clone(),
        flight.departure.format("%Y-%m-%d").to_string(),
        flight.departure.format("%H:%M").to_string(),
        flight.arrival.format("%Y-%m-%d").to_string(),
        flight.arrival.format("%H:%M").to_string(),
        flight.price.unwrap_or(0.0).to_string(),
        flight.total_hours.unwrap_or(0.0).to_string(),
        flight.carriers.join("/"),
        flight.connections.clone(),
    ]
}

pub fn row(record: &ItineraryRecord) -> Vec<String> {
    let mut row = Vec::with_capacity(FLIGHT_COLUMNS.len() * 2 + 3);
    row.extend(flight_fields(&record.outbound));
    row.extend(flight_fields(&record.inbound));
    row.push(record.total_price.to_string());
    row.push(record.realized_stay_days.to_string());
    row.push(record.nominal_stay_days.to_string());
    row
}

/// Write one partition's itineraries, header first.
pub fn write_records<W: Write>(
    writer: &mut csv::Writer<W>,
    records: &[ItineraryRecord],
) -> csv::Result<()> {
    writer.write_record(headers())?;
    for record in records {
        writer.write_record(row(record))?;
    }
    writer.flush()?;
    Ok(())
}

/// Write every partition to `{dir}/{file_stem}.csv`. Returns the files written.
pub fn export_partitions(
    dir: &Path,
    partitions: &BTreeMap<ItineraryPartition, Vec<ItineraryRecord>>,
) -> anyhow::Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output dir {}", dir.display()))?;

    let mut written = Vec::with_capacity(partitions.len());
    for (partition, records) in partitions {
        let path = dir.join(format!("{}.csv", partition.file_stem()));
        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        write_records(&mut writer, records)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        written.push(path);
    }

    info!("Exported {} partitions to {}", written.len(), dir.display());
    Ok(written)
}
