use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use paw_legal::{
    auth::jwt::JwtService, config::AppConfig, db, init_tracing, pdf::PdfiumRenderer, routes,
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "api",
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        server_host = %config.server_host,
        server_port = config.server_port,
        trash_retention_days = config.trash_retention_days,
        pdfium_library = config.pdfium_library_path.as_deref().unwrap_or("system"),
        "loaded configuration"
    );

    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    let applied = db::run_migrations(&pool)?;
    if applied > 0 {
        tracing::info!(applied, "applied pending migrations");
    }

    let renderer = Arc::new(PdfiumRenderer::new(config.pdfium_library_path.clone()));
    let jwt = JwtService::from_config(&config);
    let listen_addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port).parse()?;

    let state = AppState::new(pool, config, renderer, jwt);
    let router = routes::create_router(state);

    let listener = TcpListener::bind(listen_addr).await?;
    tracing::info!("listening on {}", listen_addr);
    axum::serve(listener, router).await?;
    Ok(())
}
