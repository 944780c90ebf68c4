use crate::{
    dtos::customer::{CustomerRequest, CustomerResponse, MessageResponse},
    error::{ApiError, ErrorResponse},
    state::AppState,
};
use axum::{
    Json,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
};
use database::services::customer::CustomerService;
use uuid::Uuid;

/// List every customer, sorted by last name
#[utoipa::path(
    get,
    path = "/api/customers",
    responses(
        (status = 200, description = "Customers retrieved successfully", body = [CustomerResponse]),
        (status = 400, description = "Database error", body = ErrorResponse)
    ),
    tag = "Customers"
)]
pub async fn get_customers(
    State(state): State<AppState>,
) -> Result<Json<Vec<CustomerResponse>>, ApiError> {
    let customers = CustomerService::get_customers(&state.db).await?;
    Ok(Json(customers.into_iter().map(Into::into).collect()))
}

/// Get a customer by ID
#[utoipa::path(
    get,
    path = "/api/customers/{id}",
    params(
        ("id" = Uuid, Path, description = "Customer ID")
    ),
    responses(
        (status = 200, description = "Customer found", body = CustomerResponse),
        (status = 404, description = "Customer not found", body = ErrorResponse),
        (status = 400, description = "Malformed ID", body = ErrorResponse)
    ),
    tag = "Customers"
)]
pub async fn get_customer(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<CustomerResponse>, ApiError> {
    let Path(id) = id?;
    CustomerService::get_customer(&state.db, id)
        .await?
        .map(|customer| Json(customer.into()))
        .ok_or(ApiError::CustomerNotFound(id))
}

/// Create a customer; any ID in the body is ignored
#[utoipa::path(
    post,
    path = "/api/customers",
    request_body = CustomerRequest,
    responses(
        (status = 201, description = "Customer created", body = CustomerResponse),
        (status = 400, description = "Invalid body", body = ErrorResponse)
    ),
    tag = "Customers"
)]
pub async fn create_customer(
    State(state): State<AppState>,
    body: Result<Json<CustomerRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CustomerResponse>), ApiError> {
    let Json(body) = body?;
    let customer =
        CustomerService::create_customer(&state.db, &body.first_name, &body.last_name, &body.email)
            .await?;
    Ok((StatusCode::CREATED, Json(customer.into())))
}

/// Replace a customer's fields
#[utoipa::path(
    put,
    path = "/api/customers/{id}",
    params(
        ("id" = Uuid, Path, description = "Customer ID")
    ),
    request_body = CustomerRequest,
    responses(
        (status = 200, description = "Customer updated", body = CustomerResponse),
        (status = 404, description = "Customer not found", body = ErrorResponse),
        (status = 400, description = "Invalid body or ID", body = ErrorResponse)
    ),
    tag = "Customers"
)]
pub async fn update_customer(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<CustomerRequest>, JsonRejection>,
) -> Result<Json<CustomerResponse>, ApiError> {
    let Path(id) = id?;
    let Json(body) = body?;
    CustomerService::update_customer(
        &state.db,
        id,
        &body.first_name,
        &body.last_name,
        &body.email,
    )
    .await?
    .map(|customer| Json(customer.into()))
    .ok_or(ApiError::CustomerNotFound(id))
}

/// Delete a customer
#[utoipa::path(
    delete,
    path = "/api/customers/{id}",
    params(
        ("id" = Uuid, Path, description = "Customer ID")
    ),
    responses(
        (status = 200, description = "Customer deleted", body = MessageResponse),
        (status = 404, description = "Customer not found", body = ErrorResponse),
        (status = 400, description = "Malformed ID", body = ErrorResponse)
    ),
    tag = "Customers"
)]
pub async fn delete_customer(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Path(id) = id?;
    if !CustomerService::delete_customer(&state.db, id).await? {
        return Err(ApiError::CustomerNotFound(id));
    }

    Ok(Json(MessageResponse {
        message: format!("Deleted customer id - {id}"),
    }))
}
