//! 아웃박스 릴레이 (Publisher) 실행 바이너리

use std::sync::Arc;
use std::time::Duration;

use log::info;
use tokio::sync::watch;

use xledger::config::Config;
use xledger::db;
use xledger::monitoring::PipelineMetrics;
use xledger::mq::EventProducer;
use xledger::publisher::OutboxPublisher;

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

    // Kafka Producer
    let producer = EventProducer::new(&config.kafka_brokers, &config.kafka_transactions_topic)?;

    let publisher = OutboxPublisher::new(
        pool,
        producer,
        config.publisher_batch_size,
        config.publisher_interval,
        metrics,
    );

    // 종료 신호 전파
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("종료 신호 수신");
        let _ = shutdown_tx.send(true);
    });

    publisher.run(shutdown_rx).await;

    info!("Publisher 종료 완료");
    Ok(())
}
