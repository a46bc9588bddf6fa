//! PostgreSQL 연결 및 스키마 초기화

pub mod models;
pub mod repository;

use std::time::Duration;

use log::info;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Error as SqlxError;

pub use models::{
    Account, AccountStatus, OutboxEvent, ProcessedEvent, Transaction, TransactionStatus,
    TransactionType,
};
pub use repository::{AccountRepository, TransactionRepository};

/// PostgreSQL 데이터베이스 초기화 및 연결
pub async fn init_database(dsn: &str) -> Result<PgPool, SqlxError> {
    // 연결 풀 생성 (서비스당 최대 25, 유휴 5, 수명 5분)
    let pool = PgPoolOptions::new()
        .max_connections(25)
        .min_connections(5)
        .max_lifetime(Duration::from_secs(300))
        .acquire_timeout(Duration::from_secs(5))
        .connect(dsn)
        .await?;

    // 연결 확인
    sqlx::query("SELECT 1").execute(&pool).await?;

    // 테이블 생성
    create_tables(&pool).await?;

    info!("데이터베이스 초기화 완료");

    Ok(pool)
}

/// 필요한 테이블 및 인덱스 생성
async fn create_tables(pool: &PgPool) -> Result<(), SqlxError> {
    // 계좌 테이블
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS accounts (
            id UUID PRIMARY KEY,
            currency VARCHAR(3) NOT NULL,
            balance_cents BIGINT NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'ACTIVE'
                CHECK (status IN ('ACTIVE', 'SUSPENDED')),
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await?;

    // 거래 테이블
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS transactions (
            id UUID PRIMARY KEY,
            account_id UUID NOT NULL REFERENCES accounts(id),
            amount_cents BIGINT NOT NULL CHECK (amount_cents > 0),
            currency VARCHAR(3) NOT NULL,
            type TEXT NOT NULL CHECK (type IN ('DEBIT', 'CREDIT')),
            status TEXT NOT NULL DEFAULT 'PENDING'
                CHECK (status IN ('PENDING', 'PROCESSING', 'PROCESSED', 'FAILED')),
            idempotency_key TEXT NOT NULL,
            failure_reason TEXT,
            metadata JSONB,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            CONSTRAINT transactions_account_id_idempotency_key_key
                UNIQUE (account_id, idempotency_key)
        )",
    )
    .execute(pool)
    .await?;

    // 아웃박스 테이블 (거래와 같은 DB 트랜잭션에서 기록됨)
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS outbox_events (
            id UUID PRIMARY KEY,
            aggregate_type TEXT NOT NULL,
            aggregate_id UUID NOT NULL,
            event_type TEXT NOT NULL,
            payload JSONB NOT NULL,
            status TEXT NOT NULL DEFAULT 'PENDING'
                CHECK (status IN ('PENDING', 'PUBLISHED')),
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            published_at TIMESTAMPTZ,
            publish_attempts INTEGER NOT NULL DEFAULT 0,
            last_error TEXT
        )",
    )
    .execute(pool)
    .await?;

    // 처리 완료 이벤트 테이블 (envelope id 기준 중복 제거)
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS processed_events (
            event_id UUID PRIMARY KEY,
            transaction_id UUID NOT NULL,
            processed_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await?;

    // 인덱스 생성
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_outbox_events_status_created
         ON outbox_events(status, created_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_transactions_account
         ON transactions(account_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_transactions_status
         ON transactions(status)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_accounts_status ON accounts(status)")
        .execute(pool)
        .await?;

    info!("테이블 생성 완료");

    Ok(())
}
