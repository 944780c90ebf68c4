use crate::{
    error::{ApiError, ErrorResponse},
    state::AppState,
};
use axum::{extract::State, http::StatusCode};
use database::db::connect;
use log::info;

/// Returns "OK" while the service is up
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", content_type = "text/plain", body = String)
    ),
    tag = "Status"
)]
pub async fn health() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

/// Opens a fresh connection with the configured credentials and reports the outcome
#[utoipa::path(
    get,
    path = "/db/check",
    responses(
        (status = 200, description = "Connection succeeded", content_type = "text/plain", body = String),
        (status = 400, description = "Connection failed", body = ErrorResponse)
    ),
    tag = "Status"
)]
pub async fn check_database(State(state): State<AppState>) -> Result<String, ApiError> {
    let url = state.database.redacted_url();
    info!("Connecting to database: {url}");

    let db = connect(&state.database).await?;
    db.ping().await?;
    db.close().await?;

    Ok(format!("Connecting to database: {url}\nSUCCESS!!!"))
}
