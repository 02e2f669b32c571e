use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use tracing::debug;
use tripgrid_core::{CoreError, CoreResult, FlightCandidate, FlightStore, LegKey};

use crate::database::DbClient;

pub struct PostgresFlightStore {
    pub pool: sqlx::PgPool,
}

impl PostgresFlightStore {
    pub fn new(db: &DbClient) -> Self {
        Self {
            pool: db.pool.clone(),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct FlightRow {
    origin: String,
    destination: String,
    searched_on: NaiveDate,
    departure_at: NaiveDateTime,
    arrival_at: NaiveDateTime,
    price: Option<f64>,
    total_hours: Option<f64>,
    carriers: Vec<String>,
    connections: String,
}

impl From<FlightRow> for FlightCandidate {
    fn from(row: FlightRow) -> Self {
        FlightCandidate {
            origin: row.origin,
            destination: row.destination,
            searched_on: row.searched_on,
            departure: row.departure_at,
            arrival: row.arrival_at,
            price: row.price,
            total_hours: row.total_hours,
            carriers: row.carriers,
            connections: row.connections,
        }
    }
}

const EXISTS_SQL: &str = "SELECT EXISTS(SELECT 1 FROM flights WHERE searched_on = $1 AND leg_date = $2 AND identity_key = $3)";

fn store_error(err: sqlx::Error) -> CoreError {
    match err.as_database_error() {
        Some(db) if db.is_unique_violation() => CoreError::DuplicateInsert(db.message().to_string()),
        _ => CoreError::StoreUnavailable(err.to_string()),
    }
}

#[async_trait]
impl FlightStore for PostgresFlightStore {
    async fn find_by_key(
        &self,
        leg: &LegKey,
        searched_on: NaiveDate,
    ) -> CoreResult<Vec<FlightCandidate>> {
        let rows: Vec<FlightRow> = sqlx::query_as(
            r#"
            SELECT
                origin, destination, searched_on, departure_at, arrival_at,
                price, total_hours, carriers, connections
            FROM flights
            WHERE
                origin = $1
                AND destination = $2
                AND leg_date = $3
                AND searched_on = $4
            ORDER BY id
            "#,
        )
        .bind(&leg.origin)
        .bind(&leg.destination)
        .bind(leg.date)
        .bind(searched_on)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(rows.into_iter().map(FlightCandidate::from).collect())
    }

    async fn exists(&self, leg: &LegKey, candidate: &FlightCandidate) -> CoreResult<bool> {
        sqlx::query_scalar::<_, bool>(EXISTS_SQL)
            .bind(candidate.searched_on)
            .bind(leg.date)
            .bind(candidate.identity().fingerprint())
            .fetch_one(&self.pool)
            .await
            .map_err(store_error)
    }

    async fn save_unique(&self, leg: &LegKey, candidates: &[FlightCandidate]) -> CoreResult<usize> {
        if candidates.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.map_err(store_error)?;
        let mut inserted = 0;

        for candidate in candidates {
            // Check-then-insert; the unique index settles any race with a
            // concurrent writer.
            let identity_key = candidate.identity().fingerprint();
            let known: bool = sqlx::query_scalar(EXISTS_SQL)
                .bind(candidate.searched_on)
                .bind(leg.date)
                .bind(&identity_key)
                .fetch_one(&mut *tx)
                .await
                .map_err(store_error)?;

            if known {
                continue;
            }

            let result = sqlx::query(
                r#"
                INSERT INTO flights (
                    searched_on, origin, destination, leg_date, departure_at, arrival_at,
                    price, total_hours, carriers, connections, identity_key
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                ON CONFLICT (searched_on, leg_date, identity_key) DO NOTHING
                "#,
            )
            .bind(candidate.searched_on)
            .bind(&candidate.origin)
            .bind(&candidate.destination)
            .bind(leg.date)
            .bind(candidate.departure)
            .bind(candidate.arrival)
            .bind(candidate.price)
            .bind(candidate.total_hours)
            .bind(&candidate.carriers)
            .bind(&candidate.connections)
            .bind(&identity_key)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;

            inserted += result.rows_affected() as usize;
        }

        match tx.commit().await.map_err(store_error) {
            Ok(()) => {}
            Err(CoreError::DuplicateInsert(msg)) => {
                debug!("Concurrent insert won the race: {}", msg);
                return Ok(0);
            }
            Err(e) => return Err(e),
        }

        Ok(inserted)
    }

    async fn health_check(&self) -> CoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(())
    }
}
