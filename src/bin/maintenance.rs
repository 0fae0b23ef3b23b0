use std::env;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;

use paw_legal::{audit::Actor, auth::password, config::AppConfig, db, init_tracing, trash};

const USAGE: &str = "Usage: maintenance <purge-trash | hash-password <password>>";

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let mut args = env::args().skip(1);
    match args.next().as_deref() {
        Some("purge-trash") => purge_trash(),
        Some("hash-password") => {
            let password = args.next().ok_or_else(|| anyhow!(USAGE))?;
            println!("{}", password::hash_password(&password)?);
            Ok(())
        }
        Some(cmd) => Err(anyhow!("unknown command: {cmd}\n{USAGE}")),
        None => Err(anyhow!(USAGE)),
    }
}

fn purge_trash() -> Result<()> {
    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "maintenance",
        database_url = %config.redacted_database_url(),
        trash_retention_days = config.trash_retention_days,
        "loaded configuration"
    );
    let pool = db::init_pool_with_size(&config.database_url, 1)?;
    let mut conn = pool.get().context("failed to get database connection")?;

    let purged = trash::purge_expired(
        &mut conn,
        &Actor::system(),
        Utc::now().naive_utc(),
        config.trash_retention(),
    )
    .context("failed to purge expired trash items")?;

    println!("Purged {purged} expired trash items.");
    Ok(())
}
