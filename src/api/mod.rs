//! REST Ingress 모듈

pub mod auth;
pub mod handlers;
pub mod models;
pub mod routes;

pub use routes::create_api_router;

use crate::db::{AccountRepository, TransactionRepository};
use crate::service::TransactionService;

/// API 서버 상태
#[derive(Clone)]
pub struct ApiState {
    pub accounts: AccountRepository,
    pub transactions: TransactionRepository,
    pub transaction_service: TransactionService,
    pub api_key: Option<String>,
}
