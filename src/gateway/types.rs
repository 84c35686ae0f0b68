//! API envelope, error codes and request DTOs
//!
//! - `ApiResponse<T>`: unified response wrapper
//! - `ApiError`: error half of every handler result
//! - `error_codes`: stable numeric codes carried in `ApiResponse::code`

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::wallet::{ServiceError, StoreError, TransferError};

// ============================================================================
// Unified API Response Format
// ============================================================================

/// Unified API response wrapper
///
/// - code: 0 = success, non-zero = error code
/// - msg: short message description
/// - data: actual data (success) or absent (error)
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    /// Response code: 0 for success, non-zero for errors
    #[schema(example = 0)]
    pub code: i32,
    /// Response message
    #[schema(example = "ok")]
    pub msg: String,
    /// Response data (only present when code == 0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Create success response
    pub fn success(data: T) -> Self {
        Self {
            code: 0,
            msg: "ok".to_string(),
            data: Some(data),
        }
    }

    /// Create error response
    pub fn error(code: i32, msg: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            code,
            msg: msg.into(),
            data: None,
        }
    }
}

// ============================================================================
// Error Codes
// ============================================================================

/// Standard API error codes
pub mod error_codes {
    // Success
    pub const SUCCESS: i32 = 0;

    // Client errors (1xxx)
    pub const INVALID_PARAMETER: i32 = 1001;
    pub const INSUFFICIENT_BALANCE: i32 = 1002;
    pub const INVALID_CURRENCY: i32 = 1003;
    pub const SAME_ACCOUNT: i32 = 1004;
    pub const BALANCE_OVERFLOW: i32 = 1005;

    // Auth errors (2xxx)
    pub const MISSING_AUTH: i32 = 2001;
    pub const AUTH_FAILED: i32 = 2002;
    pub const PERMISSION_DENIED: i32 = 2003;

    // Resource errors (4xxx)
    pub const USER_NOT_FOUND: i32 = 4001;
    pub const WALLET_NOT_FOUND: i32 = 4002;

    // Server errors (5xxx)
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const SERVICE_UNAVAILABLE: i32 = 5001;
}

// ============================================================================
// ApiError
// ============================================================================

/// Handler error: HTTP status plus envelope code and message
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: i32,
    pub msg: String,
}

pub type ApiResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), ApiError>;

/// 200 OK with data
pub fn ok<T>(data: T) -> ApiResult<T> {
    Ok((StatusCode::OK, Json(ApiResponse::success(data))))
}

impl ApiError {
    pub fn new(status: StatusCode, code: i32, msg: impl Into<String>) -> Self {
        Self {
            status,
            code,
            msg: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error_codes::INVALID_PARAMETER, msg)
    }

    pub fn unauthorized(code: i32, msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, code, msg)
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, error_codes::PERMISSION_DENIED, msg)
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            error_codes::SERVICE_UNAVAILABLE,
            msg,
        )
    }

    pub fn into_err<T>(self) -> ApiResult<T> {
        Err(self)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiResponse::<()>::error(self.code, self.msg))).into_response()
    }
}

fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn transfer_error_code(err: &TransferError) -> i32 {
    match err.validation_cause() {
        TransferError::InvalidCurrency(_) => error_codes::INVALID_CURRENCY,
        TransferError::SameAccount => error_codes::SAME_ACCOUNT,
        TransferError::InvalidAmount | TransferError::InvalidUserId(_) => {
            error_codes::INVALID_PARAMETER
        }
        TransferError::InsufficientFunds { .. } => error_codes::INSUFFICIENT_BALANCE,
        TransferError::BalanceOverflow { .. } => error_codes::BALANCE_OVERFLOW,
        TransferError::UserHasNoWallet(_) => error_codes::WALLET_NOT_FOUND,
        TransferError::UserLookupFailed {
            source: StoreError::UserNotFound(_),
            ..
        } => error_codes::USER_NOT_FOUND,
        TransferError::LockAcquisitionFailed { .. } | TransferError::MaxRetriesExceeded { .. } => {
            error_codes::SERVICE_UNAVAILABLE
        }
        _ => error_codes::INTERNAL_ERROR,
    }
}

impl From<TransferError> for ApiError {
    fn from(err: TransferError) -> Self {
        Self::new(
            status(err.http_status()),
            transfer_error_code(&err),
            err.to_string(),
        )
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let code = match &err {
            ServiceError::InvalidName(_) | ServiceError::InvalidAmount => {
                error_codes::INVALID_PARAMETER
            }
            ServiceError::InvalidCurrency(_) => error_codes::INVALID_CURRENCY,
            ServiceError::InvalidUserId(_) | ServiceError::UserNotFound(_) => {
                error_codes::USER_NOT_FOUND
            }
            ServiceError::UserHasNoWallet(_) => error_codes::WALLET_NOT_FOUND,
            ServiceError::Store { .. } => error_codes::INTERNAL_ERROR,
        };
        Self::new(status(err.http_status()), code, err.to_string())
    }
}

// ============================================================================
// Request DTOs
// ============================================================================

/// Register request
///
/// Fields are optional at the serde layer so that a missing field is reported
/// as a 400 envelope instead of a framework rejection.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RegisterUserRequest {
    #[schema(example = "Ada")]
    pub firstname: Option<String>,
    #[schema(example = "Lovelace")]
    pub lastname: Option<String>,
}

/// Transfer request
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferBody {
    #[schema(example = "0f8fad5b-d9cb-469f-a165-70867728950e")]
    pub sender_id: Option<String>,
    #[schema(example = "7c9e6679-7425-40de-944b-e07fc1f90ae7")]
    pub receiver_id: Option<String>,
    #[schema(example = 7)]
    pub amount: Option<i64>,
    /// `hardCurrency` or `softCurrency`
    #[schema(example = "hardCurrency")]
    pub currency: Option<String>,
}

/// Direct credit request
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreditBody {
    #[schema(example = 100)]
    pub amount: Option<i64>,
    /// `hardCurrency` or `softCurrency`
    #[schema(example = "softCurrency")]
    pub currency: Option<String>,
}

/// Health check response data
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Active store backend
    #[schema(example = "postgres")]
    pub store: String,
    /// Server timestamp in milliseconds
    #[schema(example = 1703494800000_i64)]
    pub timestamp_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_error_mapping() {
        let err: ApiError = TransferError::ParamsValidationFailed {
            source: Box::new(TransferError::InsufficientFunds {
                balance: 100,
                amount: 200,
            }),
        }
        .into();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.code, error_codes::INSUFFICIENT_BALANCE);
        assert!(err.msg.contains("Insufficient funds"));

        let err: ApiError = TransferError::SameAccount.into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, error_codes::SAME_ACCOUNT);

        let err: ApiError = TransferError::BalanceOverflow {
            wallet_id: "wb".into(),
            balance: i64::MAX,
            amount: 1,
        }
        .into();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.code, error_codes::BALANCE_OVERFLOW);
    }

    #[test]
    fn test_service_error_mapping() {
        let err: ApiError = ServiceError::UserNotFound("u1".into()).into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.code, error_codes::USER_NOT_FOUND);

        let err: ApiError =
            ServiceError::store("Error - Failed to delete user", StoreError::Unavailable("x".into()))
                .into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.msg.starts_with("Error - Failed to delete user"));
    }

    #[test]
    fn test_transfer_body_camel_case() {
        let body: TransferBody = serde_json::from_str(
            r#"{"senderId":"a","receiverId":"b","amount":3,"currency":"softCurrency"}"#,
        )
        .unwrap();
        assert_eq!(body.sender_id.as_deref(), Some("a"));
        assert_eq!(body.amount, Some(3));

        let partial: TransferBody = serde_json::from_str(r#"{"senderId":"a"}"#).unwrap();
        assert!(partial.receiver_id.is_none());
    }
}
