//! 거래 생성 서비스 (transactional outbox)
//!
//! 거래 행과 transaction.created 아웃박스 행은 반드시 같은 DB 트랜잭션에서
//! 커밋됩니다. 커밋 성공이 곧 "언젠가 전달됨"을 의미하며, Ingress가 이벤트를
//! 내보내는 경로는 아웃박스가 유일합니다.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{info, warn};
use sqlx::postgres::PgPool;
use uuid::Uuid;

use super::ServiceError;
use crate::db::models::{AccountStatus, Transaction, TransactionStatus, TransactionType};
use crate::monitoring::PipelineMetrics;
use crate::mq::envelope::{TransactionCreatedPayload, EVENT_TRANSACTION_CREATED};

const CREATE_TIMEOUT: Duration = Duration::from_secs(10);

const SELECT_BY_IDEMPOTENCY_KEY: &str =
    "SELECT id, account_id, amount_cents, currency, type, status, idempotency_key,
            failure_reason, metadata, created_at, updated_at
     FROM transactions
     WHERE account_id = $1 AND idempotency_key = $2
     LIMIT 1";

/// 거래 생성 명령
#[derive(Debug, Clone)]
pub struct CreateTransactionCommand {
    pub account_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub tx_type: TransactionType,
    pub idempotency_key: String,
    pub metadata: Option<serde_json::Value>,
}

/// 거래 생성 서비스
#[derive(Clone)]
pub struct TransactionService {
    pool: PgPool,
    metrics: Arc<PipelineMetrics>,
}

impl TransactionService {
    pub fn new(pool: PgPool, metrics: Arc<PipelineMetrics>) -> Self {
        Self { pool, metrics }
    }

    /// 거래 생성 (멱등)
    ///
    /// 같은 (account_id, idempotency_key)로 재호출하면 기존 거래를 상태와
    /// 무관하게 그대로 반환합니다. 응답은 Applier를 기다리지 않으며, 최초
    /// 생성 시 상태는 항상 PENDING입니다.
    pub async fn create_transaction(
        &self,
        command: CreateTransactionCommand,
    ) -> Result<Transaction, ServiceError> {
        if command.amount_cents <= 0 {
            return Err(ServiceError::InvalidAmount);
        }

        tokio::time::timeout(CREATE_TIMEOUT, self.create_transaction_inner(command))
            .await
            .map_err(|_| ServiceError::Timeout)?
    }

    async fn create_transaction_inner(
        &self,
        command: CreateTransactionCommand,
    ) -> Result<Transaction, ServiceError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;

        // 멱등성 확인: 같은 키의 거래가 있으면 그대로 반환
        let existing = sqlx::query_as::<_, Transaction>(SELECT_BY_IDEMPOTENCY_KEY)
            .bind(command.account_id)
            .bind(&command.idempotency_key)
            .fetch_optional(&mut *tx)
            .await?;

        if let Some(existing) = existing {
            tx.commit().await?;
            self.metrics.inc_idempotent_replays();
            info!(
                "멱등 재요청: transaction_id={} idempotency_key={}",
                existing.id, existing.idempotency_key
            );
            return Ok(existing);
        }

        // 계좌 존재 및 상태 확인
        let account_status: Option<String> =
            sqlx::query_scalar("SELECT status FROM accounts WHERE id = $1")
                .bind(command.account_id)
                .fetch_optional(&mut *tx)
                .await?;

        match account_status.as_deref() {
            None => return Err(ServiceError::AccountNotFound),
            Some(status) if status != AccountStatus::Active.as_str() => {
                return Err(ServiceError::AccountInactive);
            }
            Some(_) => {}
        }

        let transaction_id = Uuid::new_v4();
        let now = Utc::now();

        // 거래 행 삽입 (PENDING)
        let inserted = sqlx::query_as::<_, Transaction>(
            "INSERT INTO transactions (id, account_id, amount_cents, currency, type, status,
                                       idempotency_key, metadata, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING id, account_id, amount_cents, currency, type, status, idempotency_key,
                       failure_reason, metadata, created_at, updated_at",
        )
        .bind(transaction_id)
        .bind(command.account_id)
        .bind(command.amount_cents)
        .bind(&command.currency)
        .bind(command.tx_type.as_str())
        .bind(TransactionStatus::Pending.as_str())
        .bind(&command.idempotency_key)
        .bind(&command.metadata)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await;

        let transaction = match inserted {
            Ok(transaction) => transaction,
            Err(e) if is_idempotency_conflict(&e) => {
                // 동시 요청과의 경합에서 졌음. 실패한 트랜잭션을 버리고 승자
                // 행을 다시 읽어 반환하면 동시 재시도에서도 멱등이 유지됨.
                drop(tx);
                warn!(
                    "멱등성 키 경합 감지, 승자 행 재조회: account_id={} idempotency_key={}",
                    command.account_id, command.idempotency_key
                );

                let winner = sqlx::query_as::<_, Transaction>(SELECT_BY_IDEMPOTENCY_KEY)
                    .bind(command.account_id)
                    .bind(&command.idempotency_key)
                    .fetch_optional(&self.pool)
                    .await?;

                return match winner {
                    Some(winner) => {
                        self.metrics.inc_idempotent_replays();
                        Ok(winner)
                    }
                    None => Err(ServiceError::Database(e)),
                };
            }
            Err(e) => return Err(ServiceError::Database(e)),
        };

        // 같은 트랜잭션 내에 아웃박스 행 삽입. aggregate id는 계좌 id이며,
        // 릴레이가 이를 파티션 키로 사용해야 계좌 단위 FIFO가 성립한다.
        let payload = TransactionCreatedPayload {
            transaction_id: transaction.id,
            account_id: transaction.account_id,
            amount_cents: transaction.amount_cents,
            currency: transaction.currency.clone(),
            tx_type: command.tx_type,
            idempotency_key: transaction.idempotency_key.clone(),
            metadata: transaction.metadata.clone(),
        };
        let payload_value = serde_json::to_value(&payload).map_err(ServiceError::Serialization)?;

        sqlx::query(
            "INSERT INTO outbox_events
                 (id, aggregate_type, aggregate_id, event_type, payload, status, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(Uuid::new_v4())
        .bind("account")
        .bind(transaction.account_id)
        .bind(EVENT_TRANSACTION_CREATED)
        .bind(&payload_value)
        .bind("PENDING")
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.metrics.inc_transactions_created();

        info!(
            "거래 생성 완료 (아웃박스 포함): transaction_id={} account_id={} idempotency_key={}",
            transaction.id, transaction.account_id, transaction.idempotency_key
        );

        Ok(transaction)
    }
}

/// (account_id, idempotency_key) 유니크 제약 위반 여부
fn is_idempotency_conflict(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db_err) => {
            db_err.constraint() == Some("transactions_account_id_idempotency_key_key")
        }
        _ => false,
    }
}
