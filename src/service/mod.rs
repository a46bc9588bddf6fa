//! Ingress 비즈니스 로직
//!
//! 거래 생성은 멱등성 확인, 계좌 검증, 거래 행과 아웃박스 행의 원자적 기록을
//! 하나의 직렬화 가능 DB 트랜잭션으로 수행합니다.

pub mod transaction_service;

pub use transaction_service::{CreateTransactionCommand, TransactionService};

/// 서비스 계층 오류 타입
#[derive(Debug)]
pub enum ServiceError {
    AccountNotFound,
    AccountInactive,
    InvalidAmount,
    Timeout,
    Serialization(serde_json::Error),
    Database(sqlx::Error),
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceError::AccountNotFound => write!(f, "account not found"),
            ServiceError::AccountInactive => write!(f, "account is not active"),
            ServiceError::InvalidAmount => write!(f, "amount must be positive"),
            ServiceError::Timeout => write!(f, "operation timed out"),
            ServiceError::Serialization(e) => write!(f, "serialization error: {}", e),
            ServiceError::Database(e) => write!(f, "database error: {}", e),
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<sqlx::Error> for ServiceError {
    fn from(e: sqlx::Error) -> Self {
        ServiceError::Database(e)
    }
}
