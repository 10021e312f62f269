use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use chrono::Utc;
use std::sync::Arc;

use quillpad::api::{self, AppState};
use quillpad::auth::AuthService;
use quillpad::config::Config;
use quillpad::media::MediaStore;
use quillpad::metrics::MetricsCollector;
use quillpad::store::Store;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env().map_err(std::io::Error::other)?;

    // Initialize store
    let store = Arc::new(Store::new(&config.database_path).map_err(std::io::Error::other)?);
    match store.delete_expired_sessions(Utc::now()) {
        Ok(0) => {}
        Ok(n) => log::info!("Removed {} expired sessions", n),
        Err(e) => log::warn!("Failed to clean up expired sessions: {}", e),
    }

    let auth_service = Arc::new(
        AuthService::new(config.jwt_secret.clone(), store.clone())
            .with_session_days(config.session_days),
    );

    let media = MediaStore::new(&config.upload_dir, config.max_upload_bytes)
        .map_err(std::io::Error::other)?;

    let metrics_collector = MetricsCollector::new();

    log::info!("Database: {}", config.database_path);
    log::info!("Uploads: {}", config.upload_dir);
    if config.admin_username.is_none() {
        log::info!("ADMIN_USERNAME not set, scheduled publishing sweep is disabled");
    }

    let state = web::Data::new(AppState::new(
        store.clone(),
        auth_service.clone(),
        media,
        config.admin_username.clone(),
    )
    .with_avatars(config.avatar_provider.clone()));
    let max_upload_bytes = config.max_upload_bytes;

    log::info!("Starting quillpad server on port {}", config.port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .wrap(metrics_collector.clone())
            // Registered individually for the auth extractors
            .app_data(web::Data::new(auth_service.clone()))
            .app_data(web::Data::new(metrics_collector.clone()))
            .app_data(state.clone())
            .app_data(web::PayloadConfig::new(max_upload_bytes))
            .configure(api::configure_routes)
    })
    .bind(("0.0.0.0", config.port))?
    .run()
    .await
}
