#[macro_use]
extern crate lazy_static;

use std::{str::FromStr, sync::Arc, time::Duration};

use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};
use tera::Tera;

pub mod accounts;
pub mod config;
pub mod db;
pub mod errors;
pub mod mailer;
pub mod messages;
pub mod policy;
pub mod quote;
pub mod rates;
pub mod routes;
pub mod structs;
pub mod utils;

use config::Config;
use errors::AppError;
use mailer::Mailer;

#[derive(Debug, Clone)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub config: Config,
    pub mailer: Arc<dyn Mailer>,
}

lazy_static! {
    pub static ref TEMPLATES: Tera = {
        let mut tera = match Tera::new(concat!(env!("CARGO_MANIFEST_DIR"), "/templates/**/*")) {
            Ok(t) => t,
            Err(e) => {
                log::error!("Parsing error(s): {}", e);
                ::std::process::exit(1);
            }
        };
        tera.autoescape_on(vec![".html"]);
        tera
    };
}

/// Opens the SQLite pool. In-memory databases get a single long-lived
/// connection, since each connection would otherwise see its own database.
pub async fn connect(database_url: &str) -> Result<SqlitePool, AppError> {
    let in_memory = database_url.contains(":memory:");
    let mut opts = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .read_only(false)
        .busy_timeout(Duration::from_secs(5));
    if !in_memory {
        opts = opts.journal_mode(SqliteJournalMode::Wal);
    }

    let pool_opts = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new()
    };
    Ok(pool_opts.connect_with(opts).await?)
}

pub async fn migrate(pool: &SqlitePool) -> Result<(), AppError> {
    sqlx::migrate!().run(pool).await.map_err(sqlx::Error::from)?;
    log::info!("Database migrated successfully");
    Ok(())
}
