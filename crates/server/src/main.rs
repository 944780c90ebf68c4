mod app;
mod doc;
mod dtos;
mod error;
mod routes;
mod state;
mod utils;

use database::{config::DatabaseConfig, db::connect};
use log::info;
use state::AppState;
use std::env;
use utils::shutdown::shutdown_signal;

const DEFAULT_ADDR: &str = "0.0.0.0:3000";

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::init();

    let database = DatabaseConfig::from_env().expect("Invalid database configuration");
    let db = connect(&database)
        .await
        .expect("Failed to connect to the database");

    let app = app::router(AppState { db, database });

    let addr = env::var("SERVER_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_owned());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind server address");
    info!("Running axum on http://{addr}, docs at /swagger-ui");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");
}
