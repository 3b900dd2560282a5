//! Simple REST API server example for the ticketing engine.
//!
//! Run with: `cargo run --example server`
//!
//! ## Endpoints
//!
//! - `POST /offers` - Publish an offer into the inventory
//! - `POST /commands` - Run a checkout command (add/update/remove/clear/checkout/pay)
//! - `GET /carts/:user_id` - Get a user's active cart
//! - `GET /tickets/:key` - Verify a ticket by its final key
//! - `POST /tickets/:key/scan` - Scan a ticket for admission (single use)
//!
//! ## Example Usage
//!
//! ```bash
//! # Publish an offer
//! curl -X POST http://localhost:3000/offers \
//!   -H "Content-Type: application/json" \
//!   -d '{"offer_id": 1, "kind": "duo", "price": "25.00", "quantity": 100}'
//!
//! # Add to cart
//! curl -X POST http://localhost:3000/commands \
//!   -H "Content-Type: application/json" \
//!   -d '{"type": "add_line", "user_id": 1, "offer_id": 1, "quantity": 2}'
//!
//! # Checkout, then pay
//! curl -X POST http://localhost:3000/commands \
//!   -H "Content-Type: application/json" \
//!   -d '{"type": "checkout", "user_id": 1, "cart_id": null}'
//! curl -X POST http://localhost:3000/commands \
//!   -H "Content-Type: application/json" \
//!   -d '{"type": "submit_payment", "user_id": 1, "cart_id": null, "method": "card", "token": "tok_demo"}'
//! ```

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use ticketing_engine_rs::{
    CheckoutEngine, CheckoutError, Command, OfferId, OfferKind, SimulatedGateway, UserId,
};
use time::OffsetDateTime;
use tokio::net::TcpListener;

// === Request/Response DTOs ===

/// Request body for publishing an offer.
#[derive(Debug, Deserialize)]
pub struct PublishOfferRequest {
    pub offer_id: u64,
    pub kind: OfferKind,
    pub price: Decimal,
    pub quantity: u32,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
}

/// Response body for errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// === Application State ===

/// Shared application state containing the checkout engine.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<CheckoutEngine>,
}

// === Error Handling ===

/// Wrapper for converting `CheckoutError` into HTTP responses.
pub struct AppError(CheckoutError);

impl From<CheckoutError> for AppError {
    fn from(err: CheckoutError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            CheckoutError::InvalidCommand { .. } => (StatusCode::BAD_REQUEST, "INVALID_COMMAND"),
            CheckoutError::InvalidQuantity => (StatusCode::BAD_REQUEST, "INVALID_QUANTITY"),
            CheckoutError::OfferNotFound => (StatusCode::NOT_FOUND, "OFFER_NOT_FOUND"),
            CheckoutError::OfferUnavailable => {
                (StatusCode::UNPROCESSABLE_ENTITY, "OFFER_UNAVAILABLE")
            }
            CheckoutError::InsufficientStock { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "INSUFFICIENT_STOCK")
            }
            CheckoutError::DuplicateOffer => (StatusCode::CONFLICT, "DUPLICATE_OFFER"),
            CheckoutError::CartNotFound => (StatusCode::NOT_FOUND, "CART_NOT_FOUND"),
            CheckoutError::CartOwnerMismatch => (StatusCode::FORBIDDEN, "CART_OWNER_MISMATCH"),
            CheckoutError::LineNotFound => (StatusCode::NOT_FOUND, "LINE_NOT_FOUND"),
            CheckoutError::CartNotOpen => (StatusCode::CONFLICT, "CART_NOT_OPEN"),
            CheckoutError::EmptyCart => (StatusCode::UNPROCESSABLE_ENTITY, "EMPTY_CART"),
            CheckoutError::CartNotReadyForPayment => {
                (StatusCode::CONFLICT, "CART_NOT_READY_FOR_PAYMENT")
            }
            CheckoutError::CartAlreadyFinalized => {
                (StatusCode::CONFLICT, "CART_ALREADY_FINALIZED")
            }
            CheckoutError::PaymentDeclined { .. } => {
                (StatusCode::PAYMENT_REQUIRED, "PAYMENT_DECLINED")
            }
            CheckoutError::PaymentGatewayError { .. } => {
                (StatusCode::BAD_GATEWAY, "PAYMENT_GATEWAY_ERROR")
            }
            CheckoutError::TicketIssuanceFailure { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "TICKET_ISSUANCE_FAILURE")
            }
            CheckoutError::TicketNotFound => (StatusCode::NOT_FOUND, "TICKET_NOT_FOUND"),
            CheckoutError::TicketAlreadyScanned { .. } => {
                (StatusCode::CONFLICT, "TICKET_ALREADY_SCANNED")
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

// === Handlers ===

/// POST /offers - Publish a new offer.
async fn publish_offer(
    State(state): State<AppState>,
    Json(request): Json<PublishOfferRequest>,
) -> Result<StatusCode, AppError> {
    state.engine.offers().publish(
        OfferId(request.offer_id),
        request.kind,
        request.price,
        request.quantity,
        request.expires_at,
    )?;
    Ok(StatusCode::CREATED)
}

/// POST /commands - Run a checkout command.
async fn run_command(
    State(state): State<AppState>,
    Json(command): Json<Command>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state.engine.process(command)?;
    Ok((StatusCode::OK, Json(outcome)))
}

/// GET /carts/{user_id} - Get a user's active cart.
async fn get_cart(
    State(state): State<AppState>,
    Path(user_id): Path<u64>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    state
        .engine
        .active_cart_id(UserId(user_id))
        .and_then(|cart_id| state.engine.cart_view(cart_id))
        .map(Json)
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: "no active cart for this user".to_string(),
                    code: "CART_NOT_FOUND".to_string(),
                }),
            )
        })
}

/// GET /tickets/{key} - Verify a ticket by final key.
async fn verify_ticket(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    state.engine.verify_ticket(&key).map(Json).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "ticket not found".to_string(),
                code: "TICKET_NOT_FOUND".to_string(),
            }),
        )
    })
}

/// POST /tickets/{key}/scan - Scan a ticket for admission.
async fn scan_ticket(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let receipt = state.engine.scan_ticket(&key)?;
    Ok((StatusCode::OK, Json(receipt)))
}

// === Router ===

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/offers", post(publish_offer))
        .route("/commands", post(run_command))
        .route("/carts/{user_id}", get(get_cart))
        .route("/tickets/{key}", get(verify_ticket))
        .route("/tickets/{key}/scan", post(scan_ticket))
        .with_state(state)
}

// === Main ===

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let state = AppState {
        engine: Arc::new(CheckoutEngine::new(
            SimulatedGateway::default(),
            SecretString::from("demo-server-salt"),
        )),
    };

    let app = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:3000").await.unwrap();
    println!("Ticketing API server running on http://127.0.0.1:3000");
    println!();
    println!("Endpoints:");
    println!("  POST /offers              - Publish an offer");
    println!("  POST /commands            - Run a checkout command");
    println!("  GET  /carts/:user_id      - Get a user's active cart");
    println!("  GET  /tickets/:key        - Verify a ticket");
    println!("  POST /tickets/:key/scan   - Scan a ticket for admission");

    axum::serve(listener, app).await.unwrap();
}
