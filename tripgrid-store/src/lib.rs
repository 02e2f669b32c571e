pub mod app_config;
pub mod database;
pub mod flight_repo;
pub mod file_source;

pub use database::DbClient;
pub use flight_repo::PostgresFlightStore;
pub use file_source::FileFlightSource;
