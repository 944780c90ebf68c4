use axum::{extract::Request, middleware::Next, response::Response};
use log::{info, warn};
use std::time::Instant;

/// Logs every call before it reaches its handler and again once it has
/// answered, with the status and how long it took
pub async fn log_calls(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    info!("Calling {method} {path}");

    let started = Instant::now();
    let response = next.run(request).await;
    let elapsed = started.elapsed().as_millis();

    let status = response.status();
    if status.is_server_error() || status.is_client_error() {
        warn!("{method} {path} answered {status} after {elapsed}ms");
    } else {
        info!("{method} {path} answered {status} after {elapsed}ms");
    }
    response
}
