use utoipa::OpenApi;

/// API Documentation. Paths are collected from the router.
#[derive(OpenApi)]
#[openapi(
    tags(
        (name = "Customers", description = "Customer management endpoints"),
        (name = "Status", description = "Service and database status"),
    ),
    info(
        title = "Customer Tracker API",
        version = "1.0.0",
        description = "CRUD over customers, plus a database connection check",
        license(
            name = "MIT OR Apache-2.0",
        )
    )
)]
pub struct ApiDoc;
