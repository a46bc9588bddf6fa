//! Applier (Worker) 모듈
//!
//! transactions 토픽을 consumer group으로 소비하고, 메시지당 재시도 루프와
//! DLQ 라우팅을 수행합니다. 오프셋은 처리 성공 또는 DLQ 기록 확인 후에만
//! 커밋합니다.

pub mod transaction_processor;

pub use transaction_processor::{
    decide_application, ApplyDecision, ProcessOutcome, RetryableError, TransactionProcessor,
};

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use rdkafka::message::{BorrowedMessage, Message};
use tokio::sync::watch;

use crate::monitoring::PipelineMetrics;
use crate::mq::{DlqProducer, EventConsumer, EventEnvelope, KafkaError};

const MESSAGE_TIMEOUT: Duration = Duration::from_secs(60);

/// Worker 재시도 설정
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            retry_backoff: Duration::from_secs(2),
        }
    }
}

/// 선형 백오프 지연 계산 (attempt × base)
pub fn backoff_delay(attempt: u32, base: Duration) -> Duration {
    base * attempt
}

/// 거래 이벤트 Worker
pub struct TransactionWorker {
    consumer: EventConsumer,
    dlq: DlqProducer,
    processor: TransactionProcessor,
    config: WorkerConfig,
    metrics: Arc<PipelineMetrics>,
}

impl TransactionWorker {
    pub fn new(
        consumer: EventConsumer,
        dlq: DlqProducer,
        processor: TransactionProcessor,
        config: WorkerConfig,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            consumer,
            dlq,
            processor,
            config,
            metrics,
        }
    }

    /// 소비 루프 실행
    ///
    /// 종료 신호를 받으면 진행 중인 메시지(필요 시 DLQ 기록 포함)를 끝내고
    /// 오프셋을 커밋한 뒤 멈춥니다. 중단된 작업의 오프셋은 커밋하지 않습니다.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("Worker 시작: topic={}", self.consumer.topic());

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("Worker 종료 중...");
                    break;
                }
                received = self.consumer.recv() => {
                    match received {
                        Ok(msg) => {
                            if let Err(e) = self.handle_message(&msg).await {
                                error!("메시지 처리 실패 (재전달 예정): {}", e);
                            }
                        }
                        Err(e) => {
                            error!("메시지 수신 실패: {}", e);
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            }
        }
    }

    /// 메시지 한 건 처리
    async fn handle_message(&self, msg: &BorrowedMessage<'_>) -> Result<(), KafkaError> {
        // envelope 해석 실패는 재전달 루프를 막기 위해 커밋하고 넘어감
        let envelope: EventEnvelope = match msg
            .payload()
            .ok_or(())
            .and_then(|bytes| serde_json::from_slice(bytes).map_err(|_| ()))
        {
            Ok(envelope) => envelope,
            Err(()) => {
                error!(
                    "envelope 해석 실패, 건너뜀: partition={} offset={}",
                    msg.partition(),
                    msg.offset()
                );
                self.metrics.inc_poison_messages();
                return self.consumer.commit(msg);
            }
        };

        debug!(
            "메시지 처리 시작: event_id={} type={} partition={} offset={}",
            envelope.event_id,
            envelope.event_type,
            msg.partition(),
            msg.offset()
        );

        let result =
            tokio::time::timeout(MESSAGE_TIMEOUT, self.process_with_retries(&envelope)).await;

        let failure_reason = match result {
            Ok(Ok(outcome)) => {
                match &outcome {
                    ProcessOutcome::Applied { new_balance } => {
                        debug!("적용 완료: event_id={} 잔고={}", envelope.event_id, new_balance);
                    }
                    ProcessOutcome::Duplicate => {
                        debug!("중복 이벤트: event_id={}", envelope.event_id);
                    }
                    ProcessOutcome::Failed { reason } => {
                        // 비즈니스 실패는 파이프라인의 정상 결과이므로 DLQ로 보내지 않음
                        info!("비즈니스 실패 기록: event_id={} ({})", envelope.event_id, reason);
                    }
                    ProcessOutcome::Skipped { reason } => {
                        warn!("payload 건너뜀: event_id={} ({})", envelope.event_id, reason);
                    }
                }
                None
            }
            Ok(Err(RetryableError(reason))) => Some(reason),
            Err(_) => Some("message processing timed out".to_string()),
        };

        if let Some(reason) = failure_reason {
            error!(
                "최대 재시도 초과, DLQ로 전송: event_id={} attempts={} ({})",
                envelope.event_id, self.config.max_retries, reason
            );

            // DLQ 기록이 확인되기 전에는 오프셋을 커밋하지 않는다.
            // DLQ 쓰기가 실패하면 메시지는 재전달된다.
            self.dlq.send(msg, &reason).await?;
            self.metrics.inc_dlq_messages();
        }

        self.consumer.commit(msg)
    }

    /// 재시도 루프 (최대 N회, 선형 백오프)
    async fn process_with_retries(
        &self,
        envelope: &EventEnvelope,
    ) -> Result<ProcessOutcome, RetryableError> {
        let mut last_error = String::new();

        for attempt in 0..self.config.max_retries {
            if attempt > 0 {
                let backoff = backoff_delay(attempt, self.config.retry_backoff);
                self.metrics.inc_retries();
                info!(
                    "재시도: event_id={} attempt={}/{} backoff={:?}",
                    envelope.event_id,
                    attempt + 1,
                    self.config.max_retries,
                    backoff
                );
                tokio::time::sleep(backoff).await;
            }

            match self.processor.process(envelope).await {
                Ok(outcome) => return Ok(outcome),
                Err(RetryableError(reason)) => {
                    warn!(
                        "처리 실패 (재시도 가능): event_id={} ({})",
                        envelope.event_id, reason
                    );
                    last_error = reason;
                }
            }
        }

        Err(RetryableError(last_error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_backoff_schedule() {
        let base = Duration::from_secs(2);

        assert_eq!(backoff_delay(1, base), Duration::from_secs(2));
        assert_eq!(backoff_delay(2, base), Duration::from_secs(4));
        assert_eq!(backoff_delay(3, base), Duration::from_secs(6));
        assert_eq!(backoff_delay(4, base), Duration::from_secs(8));
    }

    #[test]
    fn test_default_worker_config() {
        let config = WorkerConfig::default();

        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_backoff, Duration::from_secs(2));
    }
}
