//Third-party-dependencies
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use log::info;
use std::io;

use prp_change_tracker::routes::change_routes;
use prp_change_tracker::services::ChangeTracker;
use prp_change_tracker::utils::config::{server_address, TrackerConfig};

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = TrackerConfig::from_env();
    info!("Change storage at {:?}", config.changes_path());

    let tracker = web::Data::new(ChangeTracker::new(config));
    tracker
        .initialize()
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

    let address = server_address();
    info!("Server started at {}", address);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(tracker.clone())
            .configure(change_routes::init_routes)
    })
        .bind(address)?
        .run()
        .await
}
