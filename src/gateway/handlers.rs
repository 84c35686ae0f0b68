//! HTTP handlers
//!
//! Thin adapters: extract, check required fields, call [`WalletService`],
//! map errors through [`ApiError`].
//!
//! [`WalletService`]: crate::wallet::WalletService

use std::sync::Arc;

use axum::{
    BoxError, Json,
    body::Body,
    extract::{Path, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::IntoResponse,
};
use chrono::Utc;
use futures::StreamExt;
use tracing::{error, info};

use super::state::AppState;
use super::types::{
    ApiError, ApiResponse, ApiResult, CreditBody, HealthResponse, RegisterUserRequest,
    TransferBody, ok,
};
use crate::wallet::UserWallet;

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| ApiError::bad_request(format!("Invalid request body: {}", e.body_text())))
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, ApiError> {
    value.ok_or_else(|| ApiError::bad_request(format!("Missing required field: {}", field)))
}

/// Health check endpoint
///
/// - Healthy: 200 OK + {code: 0, data: {store, timestamp_ms}}
/// - Unhealthy: 503 Service Unavailable
#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses(
        (status = 200, description = "Service healthy", body = HealthResponse, content_type = "application/json"),
        (status = 503, description = "Store unavailable")
    ),
    tag = "System"
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> ApiResult<HealthResponse> {
    let store = state.wallet.store();
    if let Err(e) = store.health_check().await {
        error!(store = store.name(), error = %e, "[HEALTH] Store ping failed");
        return ApiError::service_unavailable("unavailable").into_err();
    }
    ok(HealthResponse {
        store: store.name().to_string(),
        timestamp_ms: Utc::now().timestamp_millis(),
    })
}

/// List every user with its wallet
#[utoipa::path(
    get,
    path = "/api/v1/user",
    responses(
        (status = 200, description = "Users with wallets", body = [UserWallet]),
        (status = 500, description = "Store failure")
    ),
    tag = "User"
)]
pub async fn list_users(State(state): State<Arc<AppState>>) -> ApiResult<Vec<UserWallet>> {
    ok(state.wallet.list_users().await?)
}

/// Media type of the streamed user list
pub const NDJSON: &str = "application/x-ndjson";

/// Stream every user with its wallet, one JSON object per line
///
/// A store failure after the first line aborts the response body.
#[utoipa::path(
    get,
    path = "/api/v1/user/stream",
    responses(
        (status = 200, description = "One user with wallet per line", body = [UserWallet], content_type = "application/x-ndjson")
    ),
    tag = "User"
)]
pub async fn stream_users(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    info!("[USER] Streaming users");
    let lines = state.wallet.stream_users().map(|item| {
        let mut line = serde_json::to_vec(&item?)?;
        line.push(b'\n');
        Ok::<_, BoxError>(line)
    });
    ([(header::CONTENT_TYPE, NDJSON)], Body::from_stream(lines))
}

/// Register a user; the wallet is created in the same transaction
#[utoipa::path(
    post,
    path = "/api/v1/user",
    request_body = RegisterUserRequest,
    responses(
        (status = 201, description = "User created", body = UserWallet),
        (status = 400, description = "Missing or blank name")
    ),
    tag = "User"
)]
pub async fn register_user(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegisterUserRequest>, JsonRejection>,
) -> ApiResult<UserWallet> {
    let req = body(payload)?;
    let firstname = required(req.firstname, "firstname")?;
    let lastname = required(req.lastname, "lastname")?;

    let user = state.wallet.register_user(&firstname, &lastname).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(user))))
}

/// Get one user with its wallet
#[utoipa::path(
    get,
    path = "/api/v1/user/{user_id}",
    params(("user_id" = String, Path, description = "36-character user id")),
    responses(
        (status = 200, description = "User found", body = UserWallet),
        (status = 404, description = "Invalid or unknown user id")
    ),
    tag = "User"
)]
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> ApiResult<UserWallet> {
    ok(state.wallet.get_user_wallet(&user_id).await?)
}

/// Delete a user and its wallet (admin)
#[utoipa::path(
    delete,
    path = "/api/v1/user/{user_id}",
    params(("user_id" = String, Path, description = "36-character user id")),
    responses(
        (status = 200, description = "User deleted", body = bool),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Not an admin token"),
        (status = 404, description = "Invalid or unknown user id")
    ),
    security(("bearer_auth" = [])),
    tag = "User"
)]
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> ApiResult<bool> {
    ok(state.wallet.delete_user(&user_id).await?)
}

/// Transfer currency between two wallets
#[utoipa::path(
    post,
    path = "/api/v1/user/transfer",
    request_body = TransferBody,
    responses(
        (status = 200, description = "Transfer committed", body = bool),
        (status = 400, description = "Missing field, invalid amount or currency, same account"),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Unknown user"),
        (status = 422, description = "Insufficient funds or user without wallet"),
        (status = 503, description = "Wallets busy, retries exhausted")
    ),
    security(("bearer_auth" = [])),
    tag = "Transfer"
)]
pub async fn transfer(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TransferBody>, JsonRejection>,
) -> ApiResult<bool> {
    let req = body(payload)?;
    let sender_id = required(req.sender_id, "senderId")?;
    let receiver_id = required(req.receiver_id, "receiverId")?;
    let amount = required(req.amount, "amount")?;
    let currency = required(req.currency, "currency")?;

    info!(sender_id = %sender_id, receiver_id = %receiver_id, amount, currency = %currency, "Transfer request");
    let done = state
        .wallet
        .transfer(&currency, &sender_id, &receiver_id, amount)
        .await?;
    ok(done)
}

/// Credit a wallet directly (admin, non-transactional)
#[utoipa::path(
    post,
    path = "/api/v1/user/{user_id}/credit",
    params(("user_id" = String, Path, description = "36-character user id")),
    request_body = CreditBody,
    responses(
        (status = 200, description = "Wallet credited", body = bool),
        (status = 400, description = "Missing field, invalid amount or currency"),
        (status = 403, description = "Not an admin token"),
        (status = 404, description = "Unknown user")
    ),
    security(("bearer_auth" = [])),
    tag = "User"
)]
pub async fn credit(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    payload: Result<Json<CreditBody>, JsonRejection>,
) -> ApiResult<bool> {
    let req = body(payload)?;
    let amount = required(req.amount, "amount")?;
    let currency = required(req.currency, "currency")?;

    ok(state.wallet.add_currency(&user_id, &currency, amount).await?)
}
