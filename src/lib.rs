pub mod audit;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod locale;
pub mod models;
pub mod pagination;
pub mod pdf;
pub mod routes;
pub mod schema;
pub mod state;
pub mod trash;
pub mod workers;

pub use workers::{default_handlers, Worker};

/// Installs the compact `tracing` subscriber shared by every binary.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
