use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    dto::payments::{PaymentList, PaymentWithOrder, ProcessPaymentRequest, RefundRequest},
    error::AppResult,
    middleware::auth::AuthUser,
    models::Payment,
    response::ApiResponse,
    routes::params::Pagination,
    services::payment_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(process_payment).get(list_payments))
        .route("/{id}", get(get_payment))
        .route("/{id}/refund", post(request_refund))
}

#[utoipa::path(
    post,
    path = "/api/payments",
    request_body = ProcessPaymentRequest,
    responses(
        (status = 200, description = "Payment completed", body = ApiResponse<PaymentWithOrder>),
        (status = 400, description = "Gateway declined or details mismatch"),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Order is already paid"),
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn process_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<ProcessPaymentRequest>,
) -> AppResult<Json<ApiResponse<PaymentWithOrder>>> {
    let response = payment_service::process_payment(&state, &user, payload).await?;
    Ok(Json(response))
}

#[utoipa::path(
    get,
    path = "/api/payments",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
    ),
    responses(
        (status = 200, description = "Current user's payments", body = ApiResponse<PaymentList>)
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn list_payments(
    State(state): State<AppState>,
    user: AuthUser,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<PaymentList>>> {
    let response = payment_service::list_my_payments(&state, &user, pagination).await?;
    Ok(Json(response))
}

#[utoipa::path(
    get,
    path = "/api/payments/{id}",
    params(
        ("id" = Uuid, Path, description = "Payment ID")
    ),
    responses(
        (status = 200, description = "Payment record", body = ApiResponse<Payment>),
        (status = 404, description = "Payment not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn get_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Payment>>> {
    let response = payment_service::get_payment(&state, &user, id).await?;
    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/api/payments/{id}/refund",
    params(
        ("id" = Uuid, Path, description = "Payment ID")
    ),
    request_body = RefundRequest,
    responses(
        (status = 200, description = "Refund completed", body = ApiResponse<PaymentWithOrder>),
        (status = 400, description = "Payment not refundable or order delivered"),
        (status = 404, description = "Payment not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn request_refund(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<RefundRequest>,
) -> AppResult<Json<ApiResponse<PaymentWithOrder>>> {
    let response = payment_service::request_refund(&state, &user, id, payload).await?;
    Ok(Json(response))
}
