//! 파이프라인 지표 수집기
//!
//! 각 서비스가 처리 결과를 원자적 카운터로 기록하고, 주기적으로 스냅샷을
//! 로그에 남깁니다. 외부 노출용 익스포터는 두지 않습니다.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::info;
use serde::Serialize;

/// 파이프라인 지표 카운터
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    // Ingress
    transactions_created: AtomicU64,
    idempotent_replays: AtomicU64,

    // Relay
    events_published: AtomicU64,
    publish_failures: AtomicU64,
    outbox_lag: AtomicI64,

    // Applier
    events_applied: AtomicU64,
    duplicate_events: AtomicU64,
    failed_transactions: AtomicU64,
    retries: AtomicU64,
    dlq_messages: AtomicU64,
    poison_messages: AtomicU64,
}

/// 지표 스냅샷
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub transactions_created: u64,
    pub idempotent_replays: u64,
    pub events_published: u64,
    pub publish_failures: u64,
    pub outbox_lag: i64,
    pub events_applied: u64,
    pub duplicate_events: u64,
    pub failed_transactions: u64,
    pub retries: u64,
    pub dlq_messages: u64,
    pub poison_messages: u64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_transactions_created(&self) {
        self.transactions_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_idempotent_replays(&self) {
        self.idempotent_replays.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_events_published(&self) {
        self.events_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_publish_failures(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// 아웃박스 적체(PENDING 행 수) 게이지 갱신
    pub fn set_outbox_lag(&self, lag: i64) {
        self.outbox_lag.store(lag, Ordering::Relaxed);
    }

    pub fn inc_events_applied(&self) {
        self.events_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_duplicate_events(&self) {
        self.duplicate_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failed_transactions(&self) {
        self.failed_transactions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_retries(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_dlq_messages(&self) {
        self.dlq_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_poison_messages(&self) {
        self.poison_messages.fetch_add(1, Ordering::Relaxed);
    }

    /// 현재 지표 스냅샷
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            transactions_created: self.transactions_created.load(Ordering::Relaxed),
            idempotent_replays: self.idempotent_replays.load(Ordering::Relaxed),
            events_published: self.events_published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            outbox_lag: self.outbox_lag.load(Ordering::Relaxed),
            events_applied: self.events_applied.load(Ordering::Relaxed),
            duplicate_events: self.duplicate_events.load(Ordering::Relaxed),
            failed_transactions: self.failed_transactions.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            dlq_messages: self.dlq_messages.load(Ordering::Relaxed),
            poison_messages: self.poison_messages.load(Ordering::Relaxed),
        }
    }

    /// 주기적 지표 리포트 태스크 시작 (백그라운드)
    pub fn spawn_reporter(self: &Arc<Self>, interval: Duration) {
        let metrics = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let snapshot = metrics.snapshot();
                info!(
                    "지표 리포트: created={} replayed={} published={} publish_failed={} \
                     outbox_lag={} applied={} duplicate={} failed={} retries={} dlq={} poison={}",
                    snapshot.transactions_created,
                    snapshot.idempotent_replays,
                    snapshot.events_published,
                    snapshot.publish_failures,
                    snapshot.outbox_lag,
                    snapshot.events_applied,
                    snapshot.duplicate_events,
                    snapshot.failed_transactions,
                    snapshot.retries,
                    snapshot.dlq_messages,
                    snapshot.poison_messages,
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = PipelineMetrics::new();

        metrics.inc_transactions_created();
        metrics.inc_transactions_created();
        metrics.inc_duplicate_events();
        metrics.set_outbox_lag(42);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.transactions_created, 2);
        assert_eq!(snapshot.duplicate_events, 1);
        assert_eq!(snapshot.outbox_lag, 42);
        assert_eq!(snapshot.dlq_messages, 0);
    }

    #[test]
    fn test_outbox_lag_is_gauge() {
        let metrics = PipelineMetrics::new();

        metrics.set_outbox_lag(100);
        metrics.set_outbox_lag(3);

        // 게이지이므로 마지막 값으로 덮어씀
        assert_eq!(metrics.snapshot().outbox_lag, 3);
    }
}
