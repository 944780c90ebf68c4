use crate::{
    doc::ApiDoc,
    routes::{customer, status},
    state::AppState,
    utils::logging::log_calls,
};
use axum::{Router, middleware};
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use utoipa::OpenApi;
use utoipa_axum::{router::OpenApiRouter, routes};
use utoipa_swagger_ui::SwaggerUi;

pub fn router(state: AppState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .routes(routes!(status::health))
        .routes(routes!(status::check_database))
        .routes(routes!(customer::get_customers, customer::create_customer))
        .routes(routes!(
            customer::get_customer,
            customer::update_customer,
            customer::delete_customer
        ))
        .with_state(state)
        .split_for_parts();

    router
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api))
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(log_calls))
                .layer(CompressionLayer::new()),
        )
}
