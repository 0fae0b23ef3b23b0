use std::{sync::Arc, time::Duration};

use tokio::signal;

use paw_legal::{
    auth::jwt::JwtService, config::AppConfig, db, default_handlers, init_tracing,
    pdf::PdfiumRenderer, state::AppState, Worker,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "worker",
        database_url = %config.redacted_database_url(),
        pool_size = 1,
        trash_retention_days = config.trash_retention_days,
        purge_interval_minutes = config.trash_purge_interval_minutes,
        "loaded configuration"
    );
    let pool = db::init_pool_with_size(&config.database_url, 1)?;
    let renderer = Arc::new(PdfiumRenderer::new(config.pdfium_library_path.clone()));
    let jwt = JwtService::from_config(&config);

    let state = Arc::new(AppState::new(pool, config, renderer, jwt));
    let worker = Worker::new(state, default_handlers(), Duration::from_secs(2));

    tokio::select! {
        _ = worker.run() => {}
        _ = signal::ctrl_c() => {
            tracing::info!("worker received shutdown signal");
        }
    }

    Ok(())
}
