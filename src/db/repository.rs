use chrono::Utc;
use log::{error, info};
use sqlx::postgres::PgPool;
use sqlx::Error as SqlxError;
use uuid::Uuid;

use super::models::{Account, AccountStatus, Transaction};

/// 계좌 저장소
#[derive(Clone)]
pub struct AccountRepository {
    pool: PgPool,
}

impl AccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 계좌 생성 (잔고 0, ACTIVE 상태)
    pub async fn create(&self, currency: &str) -> Result<Account, SqlxError> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        let account = sqlx::query_as::<_, Account>(
            "INSERT INTO accounts (id, currency, balance_cents, status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id, currency, balance_cents, status, created_at, updated_at",
        )
        .bind(id)
        .bind(currency)
        .bind(0_i64)
        .bind(AccountStatus::Active.as_str())
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("계좌 생성 실패: {}", e);
            e
        })?;

        info!("계좌 생성 완료: {} ({})", account.id, account.currency);
        Ok(account)
    }

    /// 계좌 조회
    pub async fn find_by_id(&self, account_id: Uuid) -> Result<Option<Account>, SqlxError> {
        sqlx::query_as::<_, Account>(
            "SELECT id, currency, balance_cents, status, created_at, updated_at
             FROM accounts
             WHERE id = $1",
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
    }
}

/// 거래 저장소 (조회 전용; 생성은 TransactionService, 상태 전이는 Worker 담당)
#[derive(Clone)]
pub struct TransactionRepository {
    pool: PgPool,
}

impl TransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 거래 조회
    pub async fn find_by_id(&self, transaction_id: Uuid) -> Result<Option<Transaction>, SqlxError> {
        sqlx::query_as::<_, Transaction>(
            "SELECT id, account_id, amount_cents, currency, type, status, idempotency_key,
                    failure_reason, metadata, created_at, updated_at
             FROM transactions
             WHERE id = $1",
        )
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// 거래 목록 조회 (created_at 내림차순, 페이지네이션)
    pub async fn list(
        &self,
        account_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transaction>, SqlxError> {
        match account_id {
            Some(account_id) => {
                sqlx::query_as::<_, Transaction>(
                    "SELECT id, account_id, amount_cents, currency, type, status,
                            idempotency_key, failure_reason, metadata, created_at, updated_at
                     FROM transactions
                     WHERE account_id = $1
                     ORDER BY created_at DESC
                     LIMIT $2 OFFSET $3",
                )
                .bind(account_id)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, Transaction>(
                    "SELECT id, account_id, amount_cents, currency, type, status,
                            idempotency_key, failure_reason, metadata, created_at, updated_at
                     FROM transactions
                     ORDER BY created_at DESC
                     LIMIT $1 OFFSET $2",
                )
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await
            }
        }
    }
}
