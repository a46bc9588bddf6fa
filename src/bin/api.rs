//! API 서버 (Ingress) 실행 바이너리

use std::sync::Arc;
use std::time::Duration;

use log::{error, info};

use xledger::api::{create_api_router, ApiState};
use xledger::config::Config;
use xledger::db::{self, AccountRepository, TransactionRepository};
use xledger::monitoring::PipelineMetrics;
use xledger::service::TransactionService;

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

    // 서버 상태 구성
    let state = ApiState {
        accounts: AccountRepository::new(pool.clone()),
        transactions: TransactionRepository::new(pool.clone()),
        transaction_service: TransactionService::new(pool.clone(), metrics.clone()),
        api_key: config.api_key.clone(),
    };

    let router = create_api_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.api_port)).await?;
    info!("API 서버 시작: port={}", config.api_port);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("API 서버 종료 완료");
    Ok(())
}

/// OS 인터럽트 대기 (수신 시 새 요청을 받지 않고 진행 중인 핸들러를 정리)
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("종료 신호 대기 실패: {}", e);
        return;
    }
    info!("종료 신호 수신, API 서버 정리 중...");
}
