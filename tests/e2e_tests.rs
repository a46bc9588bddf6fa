//! 엔드투엔드 시나리오 테스트
//!
//! 실행 중인 전체 스택(PostgreSQL + Kafka + api/publisher/worker)이 필요하며
//! 기본적으로 ignore 처리되어 있습니다.
//!
//! ```text
//! API_URL=http://localhost:8080 API_KEY=demo-api-key-12345 \
//!     cargo test --test e2e_tests -- --ignored
//! ```

use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};
use uuid::Uuid;

fn api_url() -> String {
    std::env::var("API_URL").unwrap_or_else(|_| "http://localhost:8080".to_string())
}

fn api_key() -> String {
    std::env::var("API_KEY").unwrap_or_else(|_| "demo-api-key-12345".to_string())
}

async fn create_account(client: &Client, currency: &str) -> Value {
    let response = client
        .post(format!("{}/v1/accounts", api_url()))
        .header("X-API-Key", api_key())
        .json(&json!({"currency": currency}))
        .send()
        .await
        .expect("계좌 생성 요청 실패");

    assert_eq!(response.status(), 201);
    response.json().await.expect("계좌 응답 파싱 실패")
}

async fn get_account(client: &Client, account_id: &str) -> Value {
    let response = client
        .get(format!("{}/v1/accounts/{}", api_url(), account_id))
        .header("X-API-Key", api_key())
        .send()
        .await
        .expect("계좌 조회 요청 실패");

    assert_eq!(response.status(), 200);
    response.json().await.expect("계좌 응답 파싱 실패")
}

async fn post_transaction(client: &Client, body: Value) -> (u16, Value) {
    let response = client
        .post(format!("{}/v1/transactions", api_url()))
        .header("X-API-Key", api_key())
        .json(&body)
        .send()
        .await
        .expect("거래 생성 요청 실패");

    let status = response.status().as_u16();
    let value = response.json().await.expect("거래 응답 파싱 실패");
    (status, value)
}

/// 거래가 기대 상태에 도달할 때까지 폴링
async fn wait_for_status(client: &Client, transaction_id: &str, expected: &str) -> Value {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);

    loop {
        let response = client
            .get(format!("{}/v1/transactions/{}", api_url(), transaction_id))
            .header("X-API-Key", api_key())
            .send()
            .await
            .expect("거래 조회 요청 실패");
        assert_eq!(response.status(), 200);

        let transaction: Value = response.json().await.expect("거래 응답 파싱 실패");
        if transaction["status"] == expected {
            return transaction;
        }

        if tokio::time::Instant::now() > deadline {
            panic!(
                "상태 대기 시간 초과: transaction_id={} 기대={} 현재={}",
                transaction_id, expected, transaction["status"]
            );
        }

        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

/// S1 - 단일 CREDIT: 잔고가 입금액만큼 증가
#[tokio::test]
#[ignore = "실행 중인 전체 스택 필요"]
async fn s1_single_credit() {
    let client = Client::new();

    let account = create_account(&client, "USD").await;
    let account_id = account["id"].as_str().unwrap().to_string();
    assert_eq!(account["balance_cents"], 0);
    assert_eq!(account["status"], "ACTIVE");

    let (status, transaction) = post_transaction(
        &client,
        json!({
            "account_id": account_id,
            "amount_cents": 10000,
            "currency": "USD",
            "type": "CREDIT",
            "idempotency_key": "k1"
        }),
    )
    .await;
    assert_eq!(status, 201);
    assert_eq!(transaction["status"], "PENDING");

    let transaction_id = transaction["id"].as_str().unwrap();
    wait_for_status(&client, transaction_id, "PROCESSED").await;

    let account = get_account(&client, &account_id).await;
    assert_eq!(account["balance_cents"], 10000);
}

/// S2 - 멱등 재요청: 같은 본문 재전송 시 같은 거래 id, 잔고 불변
#[tokio::test]
#[ignore = "실행 중인 전체 스택 필요"]
async fn s2_idempotent_replay() {
    let client = Client::new();

    let account = create_account(&client, "USD").await;
    let account_id = account["id"].as_str().unwrap().to_string();

    let body = json!({
        "account_id": account_id,
        "amount_cents": 10000,
        "currency": "USD",
        "type": "CREDIT",
        "idempotency_key": Uuid::new_v4().to_string()
    });

    let (_, first) = post_transaction(&client, body.clone()).await;
    let first_id = first["id"].as_str().unwrap().to_string();
    wait_for_status(&client, &first_id, "PROCESSED").await;

    let (status, second) = post_transaction(&client, body).await;
    assert_eq!(status, 201);
    assert_eq!(second["id"].as_str().unwrap(), first_id);

    let account = get_account(&client, &account_id).await;
    assert_eq!(account["balance_cents"], 10000);
}

/// S3 - DEBIT 성공: 잔고 차감
#[tokio::test]
#[ignore = "실행 중인 전체 스택 필요"]
async fn s3_debit_success() {
    let client = Client::new();

    let account = create_account(&client, "USD").await;
    let account_id = account["id"].as_str().unwrap().to_string();

    let (_, credit) = post_transaction(
        &client,
        json!({
            "account_id": account_id,
            "amount_cents": 10000,
            "currency": "USD",
            "type": "CREDIT",
            "idempotency_key": Uuid::new_v4().to_string()
        }),
    )
    .await;
    wait_for_status(&client, credit["id"].as_str().unwrap(), "PROCESSED").await;

    let (_, debit) = post_transaction(
        &client,
        json!({
            "account_id": account_id,
            "amount_cents": 5000,
            "currency": "USD",
            "type": "DEBIT",
            "idempotency_key": Uuid::new_v4().to_string()
        }),
    )
    .await;
    wait_for_status(&client, debit["id"].as_str().unwrap(), "PROCESSED").await;

    let account = get_account(&client, &account_id).await;
    assert_eq!(account["balance_cents"], 5000);
}

/// S4 - 잔고 부족: FAILED + failure_reason, 잔고 불변
#[tokio::test]
#[ignore = "실행 중인 전체 스택 필요"]
async fn s4_insufficient_balance() {
    let client = Client::new();

    let account = create_account(&client, "USD").await;
    let account_id = account["id"].as_str().unwrap().to_string();

    let (_, transaction) = post_transaction(
        &client,
        json!({
            "account_id": account_id,
            "amount_cents": 10000,
            "currency": "USD",
            "type": "DEBIT",
            "idempotency_key": Uuid::new_v4().to_string()
        }),
    )
    .await;

    let failed = wait_for_status(&client, transaction["id"].as_str().unwrap(), "FAILED").await;
    assert!(failed["failure_reason"]
        .as_str()
        .unwrap()
        .contains("insufficient balance"));

    let account = get_account(&client, &account_id).await;
    assert_eq!(account["balance_cents"], 0);
}

/// S5 - 통화 불일치: FAILED + 통화 불일치 사유, 잔고 불변
#[tokio::test]
#[ignore = "실행 중인 전체 스택 필요"]
async fn s5_currency_mismatch() {
    let client = Client::new();

    let account = create_account(&client, "USD").await;
    let account_id = account["id"].as_str().unwrap().to_string();

    let (_, transaction) = post_transaction(
        &client,
        json!({
            "account_id": account_id,
            "amount_cents": 1,
            "currency": "EUR",
            "type": "CREDIT",
            "idempotency_key": Uuid::new_v4().to_string()
        }),
    )
    .await;

    let failed = wait_for_status(&client, transaction["id"].as_str().unwrap(), "FAILED").await;
    assert!(failed["failure_reason"]
        .as_str()
        .unwrap()
        .contains("currency mismatch"));

    let account = get_account(&client, &account_id).await;
    assert_eq!(account["balance_cents"], 0);
}

/// S6 - 중복 전달: 같은 envelope를 두 번 주입해도 잔고 변경은 한 번
#[tokio::test]
#[ignore = "실행 중인 전체 스택 필요"]
async fn s6_duplicate_delivery() {
    use xledger::db::models::TransactionType;
    use xledger::mq::envelope::{
        EventEnvelope, TransactionCreatedPayload, EVENT_TRANSACTION_CREATED,
    };
    use xledger::mq::EventProducer;

    let client = Client::new();
    let brokers =
        std::env::var("KAFKA_BROKERS").unwrap_or_else(|_| "localhost:9092".to_string());
    let topic = std::env::var("KAFKA_TRANSACTIONS_TOPIC")
        .unwrap_or_else(|_| "transactions".to_string());

    let account = create_account(&client, "USD").await;
    let account_id = Uuid::parse_str(account["id"].as_str().unwrap()).unwrap();

    // 릴레이 재발행을 재현: 같은 event_id의 envelope를 두 번 발행
    let payload = TransactionCreatedPayload {
        transaction_id: Uuid::new_v4(),
        account_id,
        amount_cents: 777,
        currency: "USD".to_string(),
        tx_type: TransactionType::Credit,
        idempotency_key: Uuid::new_v4().to_string(),
        metadata: None,
    };
    let envelope = EventEnvelope {
        event_id: Uuid::new_v4(),
        event_type: EVENT_TRANSACTION_CREATED.to_string(),
        occurred_at: chrono::Utc::now(),
        trace_id: Uuid::new_v4().to_string(),
        idempotency_key: payload.idempotency_key.clone(),
        aggregate_id: account_id,
        payload: serde_json::to_value(&payload).unwrap(),
    };

    let producer = EventProducer::new(&brokers, &topic).expect("Producer 생성 실패");
    producer.publish(&envelope).await.expect("1차 발행 실패");
    producer.publish(&envelope).await.expect("2차 발행 실패");

    // 잔고가 한 번 반영될 때까지 대기
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    loop {
        let account = get_account(&client, &account_id.to_string()).await;
        if account["balance_cents"] == 777 {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "잔고 반영 대기 시간 초과"
        );
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    // 두 번째 전달이 처리될 시간을 준 뒤에도 잔고는 그대로여야 함
    tokio::time::sleep(Duration::from_secs(3)).await;
    let account = get_account(&client, &account_id.to_string()).await;
    assert_eq!(account["balance_cents"], 777);
}

/// 인증 없는 v1 요청은 401
#[tokio::test]
#[ignore = "실행 중인 전체 스택 필요"]
async fn unauthorized_without_api_key() {
    let client = Client::new();

    let response = client
        .post(format!("{}/v1/accounts", api_url()))
        .json(&json!({"currency": "USD"}))
        .send()
        .await
        .expect("요청 실패");

    assert_eq!(response.status(), 401);
    let body: Value = response.json().await.expect("응답 파싱 실패");
    assert_eq!(body["error"], "Unauthorized");
}
