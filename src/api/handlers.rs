//! REST 핸들러
//!
//! 입력 검증 후 저장소/서비스를 호출하고, 오류를 HTTP 상태 코드로 매핑합니다.
//! 5xx 응답에는 내부 오류 내용을 노출하지 않습니다 (로그로만 남김).

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use log::error;
use uuid::Uuid;

use super::models::{
    clamp_limit, clamp_offset, CreateAccountRequest, CreateTransactionRequest, ErrorResponse,
    ListTransactionsQuery, TransactionListResponse,
};
use super::ApiState;
use crate::db::models::{Account, Transaction};
use crate::service::{CreateTransactionCommand, ServiceError};

type ApiError = (StatusCode, Json<ErrorResponse>);

fn bad_request(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(message)))
}

fn not_found(message: &str) -> ApiError {
    (StatusCode::NOT_FOUND, Json(ErrorResponse::new(message)))
}

fn internal_error(message: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new(message)),
    )
}

/// 헬스 체크 핸들러
pub async fn health() -> &'static str {
    "OK"
}

/// 계좌 생성 핸들러
pub async fn create_account(
    State(state): State<ApiState>,
    payload: Result<Json<CreateAccountRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Account>), ApiError> {
    let Ok(Json(request)) = payload else {
        return Err(bad_request("Invalid request body"));
    };

    if request.currency.is_empty() {
        return Err(bad_request("currency is required"));
    }

    let account = state.accounts.create(&request.currency).await.map_err(|e| {
        error!("계좌 생성 실패: {}", e);
        internal_error("Failed to create account")
    })?;

    Ok((StatusCode::CREATED, Json(account)))
}

/// 계좌 조회 핸들러
pub async fn get_account(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Account>, ApiError> {
    let account_id = Uuid::parse_str(&id).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::with_details("Invalid account ID", &e.to_string())),
        )
    })?;

    let account = state
        .accounts
        .find_by_id(account_id)
        .await
        .map_err(|e| {
            error!("계좌 조회 실패: {}", e);
            internal_error("Failed to get account")
        })?
        .ok_or_else(|| not_found("Account not found"))?;

    Ok(Json(account))
}

/// 거래 생성 핸들러
pub async fn create_transaction(
    State(state): State<ApiState>,
    payload: Result<Json<CreateTransactionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Transaction>), ApiError> {
    let Ok(Json(request)) = payload else {
        return Err(bad_request("Invalid request body"));
    };

    // 입력 검증
    if request.account_id.is_nil() {
        return Err(bad_request("account_id is required"));
    }
    if request.amount_cents <= 0 {
        return Err(bad_request("amount_cents must be positive"));
    }
    if request.currency.is_empty() {
        return Err(bad_request("currency is required"));
    }
    if request.idempotency_key.is_empty() {
        return Err(bad_request("idempotency_key is required"));
    }

    let command = CreateTransactionCommand {
        account_id: request.account_id,
        amount_cents: request.amount_cents,
        currency: request.currency,
        tx_type: request.tx_type,
        idempotency_key: request.idempotency_key,
        metadata: request.metadata,
    };

    let transaction = state
        .transaction_service
        .create_transaction(command)
        .await
        .map_err(|e| match e {
            ServiceError::AccountNotFound => not_found("Account not found"),
            ServiceError::AccountInactive => bad_request("Account is not active"),
            ServiceError::InvalidAmount => bad_request("amount_cents must be positive"),
            ServiceError::Timeout | ServiceError::Serialization(_) | ServiceError::Database(_) => {
                error!("거래 생성 실패: {}", e);
                internal_error("Failed to create transaction")
            }
        })?;

    Ok((StatusCode::CREATED, Json(transaction)))
}

/// 거래 조회 핸들러
pub async fn get_transaction(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Transaction>, ApiError> {
    let transaction_id = Uuid::parse_str(&id).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::with_details(
                "Invalid transaction ID",
                &e.to_string(),
            )),
        )
    })?;

    let transaction = state
        .transactions
        .find_by_id(transaction_id)
        .await
        .map_err(|e| {
            error!("거래 조회 실패: {}", e);
            internal_error("Failed to get transaction")
        })?
        .ok_or_else(|| not_found("Transaction not found"))?;

    Ok(Json(transaction))
}

/// 거래 목록 조회 핸들러
pub async fn list_transactions(
    State(state): State<ApiState>,
    query: Result<Query<ListTransactionsQuery>, axum::extract::rejection::QueryRejection>,
) -> Result<Json<TransactionListResponse>, ApiError> {
    let Ok(Query(query)) = query else {
        return Err(bad_request("Invalid query parameters"));
    };

    let limit = clamp_limit(query.limit);
    let offset = clamp_offset(query.offset);

    let transactions = state
        .transactions
        .list(query.account_id, limit, offset)
        .await
        .map_err(|e| {
            error!("거래 목록 조회 실패: {}", e);
            internal_error("Failed to list transactions")
        })?;

    Ok(Json(TransactionListResponse {
        transactions,
        limit,
        offset,
    }))
}
