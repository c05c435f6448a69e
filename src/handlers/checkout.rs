use crate::handlers::common::{
    created_response, map_service_error, no_content_response, success_response, validate_input,
};
use crate::{
    auth::bearer_from_headers,
    errors::ApiError,
    models::{Address, PaymentMethod, ServiceOffering},
    services::checkout::{ScheduleInput, SubmitBookingInput},
    AppState,
};
use axum::{
    extract::{Json, Path, State},
    http::HeaderMap,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::services::checkout::session::{CheckoutSession, StepAdvance, StepRetreat};
use crate::services::FinalizeOutcome;

/// Creates the router for checkout endpoints
pub fn checkout_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/{id}", get(get_session))
        .route("/sessions/{id}/items", post(add_item))
        .route("/sessions/{id}/items/{service_id}", delete(remove_item))
        .route(
            "/sessions/{id}/items/{service_id}/decrement",
            post(remove_one_unit),
        )
        .route("/sessions/{id}/address", put(set_address))
        .route("/sessions/{id}/schedule", put(set_schedule))
        .route("/sessions/{id}/payment-method", put(set_payment_method))
        .route("/sessions/{id}/offer", post(apply_offer))
        .route("/sessions/{id}/offer", delete(revoke_offer))
        .route("/sessions/{id}/quote", get(get_quote))
        .route("/sessions/{id}/next", post(next_step))
        .route("/sessions/{id}/prev", post(prev_step))
        .route("/sessions/{id}/goto/{step}", post(go_to_step))
        .route("/sessions/{id}/handoff", post(begin_auth_handoff))
        .route("/sessions/{id}/submit", post(submit_booking))
        .route("/sessions/{id}/abandon", post(abandon_session))
}

/// Start a checkout session, restoring any persisted state for the scope
async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .services
        .checkout
        .create_session(payload.scope)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(session))
}

/// Get a checkout session
async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .services
        .checkout
        .get_session(id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(session))
}

/// Add one unit of a service to the cart
async fn add_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AddItemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;

    let session = state
        .services
        .checkout
        .add_item(id, payload.into_offering())
        .await
        .map_err(map_service_error)?;

    Ok(success_response(session))
}

/// Remove a service from the cart entirely
async fn remove_item(
    State(state): State<Arc<AppState>>,
    Path((id, service_id)): Path<(Uuid, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .services
        .checkout
        .remove_item(id, &service_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(session))
}

/// Remove one unit of a service from the cart
async fn remove_one_unit(
    State(state): State<Arc<AppState>>,
    Path((id, service_id)): Path<(Uuid, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .services
        .checkout
        .remove_one_unit(id, &service_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(session))
}

/// Set the service address
async fn set_address(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AddressRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;

    let session = state
        .services
        .checkout
        .set_address(id, payload.into_address())
        .await
        .map_err(map_service_error)?;

    Ok(success_response(session))
}

/// Set the service date, time slot and extra fee
async fn set_schedule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ScheduleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .services
        .checkout
        .set_schedule(
            id,
            ScheduleInput {
                date: payload.date,
                time: payload.time,
                extra_fee: payload.extra_fee,
            },
        )
        .await
        .map_err(map_service_error)?;

    Ok(success_response(session))
}

/// Select the payment method
async fn set_payment_method(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PaymentMethodRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .services
        .checkout
        .set_payment_method(id, payload.method)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(session))
}

/// Validate and apply an offer code
async fn apply_offer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ApplyOfferRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;

    let session = state
        .services
        .checkout
        .apply_offer(id, &payload.code)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(session))
}

/// Remove an applied offer
async fn revoke_offer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .checkout
        .revoke_offer(id)
        .await
        .map_err(map_service_error)?;

    Ok(no_content_response())
}

/// Price breakdown for the review step
async fn get_quote(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let quote = state
        .services
        .checkout
        .quote(id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(quote))
}

/// Forward navigation
async fn next_step(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let bearer = bearer_from_headers(&headers);
    let (session, outcome) = state
        .services
        .checkout
        .next_step(id, bearer.as_deref())
        .await
        .map_err(map_service_error)?;

    Ok(success_response(StepResponse {
        outcome: StepOutcome::Advance(outcome),
        session,
    }))
}

/// Backward navigation
async fn prev_step(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let (session, outcome) = state
        .services
        .checkout
        .prev_step(id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(StepResponse {
        outcome: StepOutcome::Retreat(outcome),
        session,
    }))
}

/// Direct navigation to a visited step (or back to step 1)
async fn go_to_step(
    State(state): State<Arc<AppState>>,
    Path((id, step)): Path<(Uuid, u8)>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .services
        .checkout
        .go_to_step(id, step)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(session))
}

/// Persist the handoff snapshot ahead of an authentication redirect
async fn begin_auth_handoff(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .checkout
        .begin_auth_handoff(id)
        .await
        .map_err(map_service_error)?;

    Ok(no_content_response())
}

/// Submit the booking
async fn submit_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<SubmitBookingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;

    let bearer = bearer_from_headers(&headers);
    let (session, outcome) = state
        .services
        .checkout
        .submit(
            id,
            SubmitBookingInput {
                notes: payload.notes,
            },
            bearer.as_deref(),
        )
        .await
        .map_err(map_service_error)?;

    Ok(created_response(SubmitResponse { outcome, session }))
}

/// Explicitly abandon the checkout, clearing persisted state
async fn abandon_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .services
        .checkout
        .abandon(id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(session))
}

// Request/Response DTOs

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub scope: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddItemRequest {
    #[validate(length(min = 1))]
    pub service_id: String,
    #[validate(length(min = 1))]
    pub display_name: String,
    pub unit_price: Decimal,
    pub discounted_unit_price: Option<Decimal>,
    #[validate(length(min = 1))]
    pub room_type_slug: String,
    #[validate(length(min = 1))]
    pub property_type_slug: String,
    #[validate(length(min = 1))]
    pub category_slug: String,
    pub max_quantity: Option<u32>,
}

impl AddItemRequest {
    fn into_offering(self) -> ServiceOffering {
        ServiceOffering {
            service_id: self.service_id,
            display_name: self.display_name,
            unit_price: self.unit_price,
            discounted_unit_price: self.discounted_unit_price,
            room_type_slug: self.room_type_slug,
            property_type_slug: self.property_type_slug,
            category_slug: self.category_slug,
            max_quantity: self.max_quantity,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddressRequest {
    #[validate(length(min = 1))]
    pub id: String,
    pub label: Option<String>,
    #[validate(length(min = 1))]
    pub line_one: String,
    pub line_two: Option<String>,
    #[validate(length(min = 1))]
    pub city: String,
    pub phone: Option<String>,
}

impl AddressRequest {
    fn into_address(self) -> Address {
        Address {
            id: self.id,
            label: self.label,
            line_one: self.line_one,
            line_two: self.line_two,
            city: self.city,
            phone: self.phone,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    pub date: Option<String>,
    pub time: Option<String>,
    pub extra_fee: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentMethodRequest {
    pub method: PaymentMethod,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ApplyOfferRequest {
    #[validate(length(min = 1, max = 64))]
    pub code: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitBookingRequest {
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum StepOutcome {
    Advance(StepAdvance),
    Retreat(StepRetreat),
}

#[derive(Debug, Serialize)]
struct StepResponse {
    outcome: StepOutcome,
    session: CheckoutSession,
}

#[derive(Debug, Serialize)]
struct SubmitResponse {
    outcome: FinalizeOutcome,
    session: CheckoutSession,
}
