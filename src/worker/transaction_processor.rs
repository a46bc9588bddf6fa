//! 거래 적용 프로세서
//!
//! envelope 하나를 계좌 잔고 변경으로 바꾸는 핵심 로직입니다. 직렬화 가능
//! 격리의 DB 트랜잭션 안에서 processed_events 삽입(선기록) 후 행 잠금을 잡고
//! 잔고를 변경하므로, 커밋 시 중복 제거 상태와 잔고가 함께 영속화되고 롤백
//! 시 둘 다 사라져 재시도가 안전합니다.

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use sqlx::postgres::PgPool;
use uuid::Uuid;

use crate::db::models::{AccountStatus, TransactionType};
use crate::monitoring::PipelineMetrics;
use crate::mq::envelope::{EventEnvelope, TransactionCreatedPayload};

const APPLY_TIMEOUT: Duration = Duration::from_secs(30);

/// 재시도 가능한 처리 오류 (DB/인프라 일시 장애)
#[derive(Debug)]
pub struct RetryableError(pub String);

impl std::fmt::Display for RetryableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for RetryableError {}

impl From<sqlx::Error> for RetryableError {
    fn from(e: sqlx::Error) -> Self {
        RetryableError(e.to_string())
    }
}

/// 메시지 처리 결과
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// 잔고 변경 커밋 완료
    Applied { new_balance: i64 },
    /// 이미 처리된 envelope (부수 효과 없음)
    Duplicate,
    /// 비즈니스 종결 실패 (거래는 FAILED로 기록됨; 파이프라인 관점에서는 성공)
    Failed { reason: String },
    /// 해석 불가능한 payload (건너뜀)
    Skipped { reason: String },
}

/// 잔고 적용 판정
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyDecision {
    Apply { new_balance: i64 },
    Fail { reason: String },
}

/// 잠금 잡은 계좌 상태에 대해 적용 가능 여부 판정
///
/// 통화는 Ingress에서 이미 확인했더라도 적용 시점에 다시 검증합니다
/// (PENDING과 PROCESSED 사이의 통화 변동 방어).
pub fn decide_application(
    balance_cents: i64,
    account_currency: &str,
    account_status: &str,
    payload: &TransactionCreatedPayload,
) -> ApplyDecision {
    if account_currency != payload.currency {
        return ApplyDecision::Fail {
            reason: format!(
                "currency mismatch: account={}, transaction={}",
                account_currency, payload.currency
            ),
        };
    }

    if account_status != AccountStatus::Active.as_str() {
        return ApplyDecision::Fail {
            reason: "account is not active".to_string(),
        };
    }

    let new_balance = match payload.tx_type {
        TransactionType::Credit => balance_cents + payload.amount_cents,
        TransactionType::Debit => balance_cents - payload.amount_cents,
    };

    if payload.tx_type == TransactionType::Debit && new_balance < 0 {
        return ApplyDecision::Fail {
            reason: format!(
                "insufficient balance: current={}, debit={}",
                balance_cents, payload.amount_cents
            ),
        };
    }

    ApplyDecision::Apply { new_balance }
}

/// 거래 적용 프로세서
pub struct TransactionProcessor {
    pool: PgPool,
    metrics: Arc<PipelineMetrics>,
}

impl TransactionProcessor {
    pub fn new(pool: PgPool, metrics: Arc<PipelineMetrics>) -> Self {
        Self { pool, metrics }
    }

    /// transaction.created envelope 처리
    pub async fn process(
        &self,
        envelope: &EventEnvelope,
    ) -> Result<ProcessOutcome, RetryableError> {
        tokio::time::timeout(APPLY_TIMEOUT, self.process_inner(envelope))
            .await
            .map_err(|_| RetryableError("apply transaction timed out".to_string()))?
    }

    async fn process_inner(
        &self,
        envelope: &EventEnvelope,
    ) -> Result<ProcessOutcome, RetryableError> {
        // payload 해석 실패는 재전달해도 소용없으므로 건너뜀
        let payload: TransactionCreatedPayload =
            match serde_json::from_value(envelope.payload.clone()) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("payload 해석 실패: event_id={} ({})", envelope.event_id, e);
                    self.metrics.inc_poison_messages();
                    return Ok(ProcessOutcome::Skipped {
                        reason: format!("failed to parse payload: {}", e),
                    });
                }
            };

        // 사전 중복 확인 (트랜잭션 비용 없이 빠른 경로)
        let already_processed: Option<Uuid> =
            sqlx::query_scalar("SELECT event_id FROM processed_events WHERE event_id = $1")
                .bind(envelope.event_id)
                .fetch_optional(&self.pool)
                .await?;

        if already_processed.is_some() {
            self.metrics.inc_duplicate_events();
            info!(
                "이미 처리된 이벤트 (멱등): event_id={} transaction_id={}",
                envelope.event_id, payload.transaction_id
            );
            return Ok(ProcessOutcome::Duplicate);
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;

        // 선기록: processed_events 삽입으로 envelope를 선점
        let claimed = sqlx::query(
            "INSERT INTO processed_events (event_id, transaction_id)
             VALUES ($1, $2)
             ON CONFLICT (event_id) DO NOTHING",
        )
        .bind(envelope.event_id)
        .bind(payload.transaction_id)
        .execute(&mut *tx)
        .await?;

        if claimed.rows_affected() == 0 {
            // 다른 워커가 선점함
            tx.commit().await?;
            self.metrics.inc_duplicate_events();
            info!("다른 워커가 처리한 이벤트 (멱등): event_id={}", envelope.event_id);
            return Ok(ProcessOutcome::Duplicate);
        }

        // PENDING → PROCESSING (이미 지난 상태면 0행; 실패로 보지 않음)
        sqlx::query(
            "UPDATE transactions
             SET status = 'PROCESSING', updated_at = NOW()
             WHERE id = $1 AND status = 'PENDING'",
        )
        .bind(payload.transaction_id)
        .execute(&mut *tx)
        .await?;

        // 계좌 행 잠금 후 잔고/통화/상태 확인
        let account: Option<(i64, String, String)> = sqlx::query_as(
            "SELECT balance_cents, currency, status
             FROM accounts
             WHERE id = $1
             FOR UPDATE",
        )
        .bind(payload.account_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((balance_cents, account_currency, account_status)) = account else {
            return self
                .fail_transaction(tx, &payload, "account not found".to_string())
                .await;
        };

        match decide_application(balance_cents, &account_currency, &account_status, &payload) {
            ApplyDecision::Fail { reason } => self.fail_transaction(tx, &payload, reason).await,
            ApplyDecision::Apply { new_balance } => {
                sqlx::query(
                    "UPDATE accounts
                     SET balance_cents = $1, updated_at = NOW()
                     WHERE id = $2",
                )
                .bind(new_balance)
                .bind(payload.account_id)
                .execute(&mut *tx)
                .await?;

                // 종결 상태에서는 빠져나오지 않도록 상태 조건을 건다
                sqlx::query(
                    "UPDATE transactions
                     SET status = 'PROCESSED', updated_at = NOW()
                     WHERE id = $1 AND status IN ('PENDING', 'PROCESSING')",
                )
                .bind(payload.transaction_id)
                .execute(&mut *tx)
                .await?;

                tx.commit().await?;
                self.metrics.inc_events_applied();

                info!(
                    "거래 처리 완료: transaction_id={} account_id={} {} {} -> 잔고 {}",
                    payload.transaction_id,
                    payload.account_id,
                    payload.tx_type.as_str(),
                    payload.amount_cents,
                    new_balance
                );

                Ok(ProcessOutcome::Applied { new_balance })
            }
        }
    }

    /// 비즈니스 종결 실패: 같은 트랜잭션에서 FAILED로 기록 후 커밋
    async fn fail_transaction(
        &self,
        mut tx: sqlx::Transaction<'_, sqlx::Postgres>,
        payload: &TransactionCreatedPayload,
        reason: String,
    ) -> Result<ProcessOutcome, RetryableError> {
        sqlx::query(
            "UPDATE transactions
             SET status = 'FAILED', failure_reason = $1, updated_at = NOW()
             WHERE id = $2 AND status IN ('PENDING', 'PROCESSING')",
        )
        .bind(&reason)
        .bind(payload.transaction_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.metrics.inc_failed_transactions();

        info!(
            "거래 실패 처리: transaction_id={} ({})",
            payload.transaction_id, reason
        );

        Ok(ProcessOutcome::Failed { reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credit_payload(amount: i64) -> TransactionCreatedPayload {
        TransactionCreatedPayload {
            transaction_id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            amount_cents: amount,
            currency: "USD".to_string(),
            tx_type: TransactionType::Credit,
            idempotency_key: "k1".to_string(),
            metadata: None,
        }
    }

    fn debit_payload(amount: i64) -> TransactionCreatedPayload {
        TransactionCreatedPayload {
            tx_type: TransactionType::Debit,
            ..credit_payload(amount)
        }
    }

    #[test]
    fn test_credit_increases_balance() {
        let decision = decide_application(10000, "USD", "ACTIVE", &credit_payload(5000));
        assert_eq!(decision, ApplyDecision::Apply { new_balance: 15000 });
    }

    #[test]
    fn test_debit_decreases_balance() {
        let decision = decide_application(10000, "USD", "ACTIVE", &debit_payload(4000));
        assert_eq!(decision, ApplyDecision::Apply { new_balance: 6000 });
    }

    #[test]
    fn test_debit_to_zero_is_allowed() {
        let decision = decide_application(10000, "USD", "ACTIVE", &debit_payload(10000));
        assert_eq!(decision, ApplyDecision::Apply { new_balance: 0 });
    }

    #[test]
    fn test_insufficient_balance_fails() {
        let decision = decide_application(0, "USD", "ACTIVE", &debit_payload(10000));

        match decision {
            ApplyDecision::Fail { reason } => {
                assert!(reason.contains("insufficient balance"));
                assert!(reason.contains("current=0"));
                assert!(reason.contains("debit=10000"));
            }
            other => panic!("예상 외 판정: {:?}", other),
        }
    }

    #[test]
    fn test_currency_mismatch_fails() {
        let mut payload = credit_payload(1);
        payload.currency = "EUR".to_string();

        let decision = decide_application(0, "USD", "ACTIVE", &payload);
        match decision {
            ApplyDecision::Fail { reason } => {
                assert!(reason.contains("currency mismatch"));
                assert!(reason.contains("account=USD"));
                assert!(reason.contains("transaction=EUR"));
            }
            other => panic!("예상 외 판정: {:?}", other),
        }
    }

    #[test]
    fn test_suspended_account_fails() {
        let decision = decide_application(10000, "USD", "SUSPENDED", &credit_payload(1));
        assert_eq!(
            decision,
            ApplyDecision::Fail {
                reason: "account is not active".to_string()
            }
        );
    }

    #[test]
    fn test_credit_has_no_lower_bound_check() {
        // CREDIT은 잔고 하한 검사를 하지 않음
        let decision = decide_application(-500, "USD", "ACTIVE", &credit_payload(100));
        assert_eq!(decision, ApplyDecision::Apply { new_balance: -400 });
    }
}
