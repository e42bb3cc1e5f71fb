use std::sync::Arc;

use actix_identity::IdentityMiddleware;
use actix_session::{storage::CookieSessionStore, SessionMiddleware};
use actix_web::{
    middleware,
    web::{self, Data},
    App, HttpServer,
};
use log::info;

use quotedesk::{accounts, config::Config, mailer::LogMailer, routes, AppState};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = Config::from_env().map_err(|e| {
        log::error!("FATAL: {}", e);
        e
    })?;
    info!("Loaded configuration: {:?}", config);

    let db_pool = quotedesk::connect(&config.database_url).await?;
    quotedesk::migrate(&db_pool).await?;

    let state = AppState {
        db_pool,
        config: config.clone(),
        mailer: Arc::new(LogMailer),
    };
    accounts::ensure_bootstrap_admin(&state).await?;

    info!("Starting HTTP server on http://{}:{}/", config.bind_addr, config.port);

    let session_key = config.session_key();
    HttpServer::new(move || {
        App::new()
            // enable automatic response compression - usually register this first
            .wrap(middleware::Compress::default())
            .wrap(IdentityMiddleware::default())
            .wrap(SessionMiddleware::new(
                CookieSessionStore::default(),
                session_key.clone(),
            ))
            // enable logger - always register Actix Web Logger middleware last
            .wrap(middleware::Logger::default())
            .app_data(Data::new(state.clone()))
            .configure(routes::configure)
            .default_service(web::to(routes::default_handler))
    })
    .bind((config.bind_addr.as_str(), config.port))?
    .run()
    .await
}
