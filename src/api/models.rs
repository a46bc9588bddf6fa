use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::models::{Transaction, TransactionType};

/// 계좌 생성 요청
#[derive(Debug, Deserialize, Serialize)]
pub struct CreateAccountRequest {
    pub currency: String,
}

/// 거래 생성 요청
#[derive(Debug, Deserialize, Serialize)]
pub struct CreateTransactionRequest {
    pub account_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub idempotency_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// 거래 목록 조회 쿼리
#[derive(Debug, Deserialize)]
pub struct ListTransactionsQuery {
    pub account_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// 거래 목록 응답
#[derive(Debug, Serialize)]
pub struct TransactionListResponse {
    pub transactions: Vec<Transaction>,
    pub limit: i64,
    pub offset: i64,
}

/// API 오류 응답
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: &str) -> Self {
        Self {
            error: error.to_string(),
            details: None,
        }
    }

    pub fn with_details(error: &str, details: &str) -> Self {
        Self {
            error: error.to_string(),
            details: Some(details.to_string()),
        }
    }
}

/// 페이지네이션 한계 적용 (기본 50, 최대 100)
pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.filter(|l| *l > 0 && *l <= 100).unwrap_or(50)
}

/// 오프셋 정규화 (음수는 기본값 0)
pub fn clamp_offset(offset: Option<i64>) -> i64 {
    offset.filter(|o| *o >= 0).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(None), 50);
        assert_eq!(clamp_limit(Some(10)), 10);
        assert_eq!(clamp_limit(Some(100)), 100);
        assert_eq!(clamp_limit(Some(101)), 50);
        assert_eq!(clamp_limit(Some(0)), 50);
        assert_eq!(clamp_limit(Some(-5)), 50);
    }

    #[test]
    fn test_clamp_offset() {
        assert_eq!(clamp_offset(None), 0);
        assert_eq!(clamp_offset(Some(20)), 20);
        assert_eq!(clamp_offset(Some(-1)), 0);
    }

    #[test]
    fn test_create_transaction_request_parsing() {
        let json = serde_json::json!({
            "account_id": Uuid::new_v4(),
            "amount_cents": 10000,
            "currency": "USD",
            "type": "CREDIT",
            "idempotency_key": "k1"
        });

        let request: CreateTransactionRequest = serde_json::from_value(json).unwrap();
        assert_eq!(request.tx_type, TransactionType::Credit);
        assert!(request.metadata.is_none());

        // 알 수 없는 type 값은 파싱 실패
        let invalid = serde_json::json!({
            "account_id": Uuid::new_v4(),
            "amount_cents": 10000,
            "currency": "USD",
            "type": "TRANSFER",
            "idempotency_key": "k1"
        });
        assert!(serde_json::from_value::<CreateTransactionRequest>(invalid).is_err());
    }

    #[test]
    fn test_error_response_details_omitted_when_none() {
        let value = serde_json::to_value(ErrorResponse::new("Unauthorized")).unwrap();
        assert_eq!(value, serde_json::json!({"error": "Unauthorized"}));
    }
}
