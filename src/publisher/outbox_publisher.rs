//! 아웃박스 릴레이
//!
//! 주기적으로 PENDING 아웃박스 행을 FOR UPDATE SKIP LOCKED로 집어
//! Kafka에 발행하고 PUBLISHED로 표시합니다. SKIP LOCKED 덕분에 여러
//! 복제본이 리더 선출 없이 작업을 나눠 가질 수 있습니다.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use sqlx::postgres::PgPool;
use tokio::sync::watch;

use crate::db::models::OutboxEvent;
use crate::monitoring::PipelineMetrics;
use crate::mq::{EventEnvelope, EventProducer, KafkaError};

const BATCH_TIMEOUT: Duration = Duration::from_secs(30);

/// 릴레이 오류 타입
#[derive(Debug)]
pub enum PublishError {
    Database(sqlx::Error),
    Kafka(KafkaError),
    Timeout,
}

impl std::fmt::Display for PublishError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PublishError::Database(e) => write!(f, "database error: {}", e),
            PublishError::Kafka(e) => write!(f, "kafka error: {}", e),
            PublishError::Timeout => write!(f, "batch timed out"),
        }
    }
}

impl std::error::Error for PublishError {}

impl From<sqlx::Error> for PublishError {
    fn from(e: sqlx::Error) -> Self {
        PublishError::Database(e)
    }
}

impl From<KafkaError> for PublishError {
    fn from(e: KafkaError) -> Self {
        PublishError::Kafka(e)
    }
}

/// 아웃박스 릴레이
pub struct OutboxPublisher {
    pool: PgPool,
    producer: EventProducer,
    batch_size: i64,
    poll_interval: Duration,
    metrics: Arc<PipelineMetrics>,
}

impl OutboxPublisher {
    pub fn new(
        pool: PgPool,
        producer: EventProducer,
        batch_size: i64,
        poll_interval: Duration,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            pool,
            producer,
            batch_size,
            poll_interval,
            metrics,
        }
    }

    /// 릴레이 루프 실행
    ///
    /// 종료 신호를 받으면 진행 중인 배치를 끝내고 새 틱을 시작하지 않습니다.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.poll_interval);

        info!(
            "아웃박스 릴레이 시작: batch_size={} poll_interval={:?}",
            self.batch_size, self.poll_interval
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("아웃박스 릴레이 종료 중...");
                    break;
                }
                _ = ticker.tick() => {
                    match tokio::time::timeout(BATCH_TIMEOUT, self.publish_batch()).await {
                        Ok(Ok(published)) => {
                            if published > 0 {
                                debug!("배치 발행 완료: {}건", published);
                            }
                        }
                        Ok(Err(e)) => {
                            // 다음 틱에서 재시도 (행은 PENDING 상태로 남아 있음)
                            error!("배치 발행 실패: {}", e);
                        }
                        Err(_) => {
                            error!("배치 발행 실패: {}", PublishError::Timeout);
                        }
                    }
                }
            }
        }
    }

    /// PENDING 아웃박스 배치 한 번 처리
    ///
    /// 행 잠금은 발행이 끝날 때까지 유지되어 다른 복제본이 같은 행을 집지
    /// 못합니다. 발행 결과 기록과 잠금 해제는 한 번의 커밋으로 끝납니다.
    pub async fn publish_batch(&self) -> Result<usize, PublishError> {
        let mut tx = self.pool.begin().await?;

        let events = sqlx::query_as::<_, OutboxEvent>(
            "SELECT id, aggregate_type, aggregate_id, event_type, payload, status,
                    created_at, published_at, publish_attempts, last_error
             FROM outbox_events
             WHERE status = 'PENDING'
             ORDER BY created_at ASC
             LIMIT $1
             FOR UPDATE SKIP LOCKED",
        )
        .bind(self.batch_size)
        .fetch_all(&mut *tx)
        .await?;

        if events.is_empty() {
            tx.commit().await?;
            self.record_outbox_lag().await;
            return Ok(0);
        }

        let mut published = 0;
        for event in &events {
            let envelope = EventEnvelope::from_outbox(event);

            match self.producer.publish(&envelope).await {
                Ok(_) => {
                    sqlx::query(
                        "UPDATE outbox_events
                         SET status = 'PUBLISHED', published_at = NOW()
                         WHERE id = $1",
                    )
                    .bind(event.id)
                    .execute(&mut *tx)
                    .await?;

                    self.metrics.inc_events_published();
                    published += 1;
                }
                Err(e) => {
                    // 발행 실패 행은 PENDING 유지, 시도 횟수와 오류만 기록
                    warn!("이벤트 발행 실패: {} ({})", event.id, e);

                    sqlx::query(
                        "UPDATE outbox_events
                         SET publish_attempts = publish_attempts + 1, last_error = $1
                         WHERE id = $2",
                    )
                    .bind(e.to_string())
                    .bind(event.id)
                    .execute(&mut *tx)
                    .await?;

                    self.metrics.inc_publish_failures();
                }
            }
        }

        tx.commit().await?;
        self.record_outbox_lag().await;

        Ok(published)
    }

    /// 아웃박스 적체 게이지 갱신
    async fn record_outbox_lag(&self) {
        match sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM outbox_events WHERE status = 'PENDING'",
        )
        .fetch_one(&self.pool)
        .await
        {
            Ok(lag) => self.metrics.set_outbox_lag(lag),
            Err(e) => debug!("아웃박스 적체 조회 실패: {}", e),
        }
    }
}
