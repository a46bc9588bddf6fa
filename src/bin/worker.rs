//! Applier (Worker) 실행 바이너리

use std::sync::Arc;
use std::time::Duration;

use log::info;
use tokio::sync::watch;

use xledger::config::Config;
use xledger::db;
use xledger::monitoring::PipelineMetrics;
use xledger::mq::{ConsumerConfig, DlqProducer, EventConsumer};
use xledger::worker::{TransactionProcessor, TransactionWorker, WorkerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 초기화
    env_logger::init();

    // 설정 로드
    let config = Config::from_env();

    // 데이터베이스 연결
    let pool = db::init_database(&config.postgres_dsn()).await?;

    // 지표 수집기
    let metrics = Arc::new(PipelineMetrics::new());
    metrics.spawn_reporter(Duration::from_secs(30));

    // Kafka Consumer 및 DLQ Producer
    let consumer = EventConsumer::new(&ConsumerConfig {
        brokers: config.kafka_brokers.clone(),
        topic: config.kafka_transactions_topic.clone(),
        group_id: config.worker_consumer_group.clone(),
    })?;
    let dlq = DlqProducer::new(&config.kafka_brokers, &config.kafka_dlq_topic)?;

    // 프로세서 및 Worker 구성
    let processor = TransactionProcessor::new(pool, metrics.clone());
    let worker = TransactionWorker::new(
        consumer,
        dlq,
        processor,
        WorkerConfig::default(),
        metrics,
    );

    // 종료 신호 전파
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("종료 신호 수신");
        let _ = shutdown_tx.send(true);
    });

    worker.run(shutdown_rx).await;

    info!("Worker 종료 완료");
    Ok(())
}
