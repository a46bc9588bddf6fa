//! Kafka Consumer 및 DLQ Producer 구현
//!
//! Worker가 transactions 토픽을 소비할 때 사용합니다. 오프셋은 자동 커밋하지
//! 않으며, 처리 완료(성공 또는 DLQ 기록 확인) 후에만 커밋합니다.

use std::time::Duration;

use log::info;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Header, Headers, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;

use super::KafkaError;

/// Consumer 설정
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub brokers: String,
    pub topic: String,
    pub group_id: String,
}

/// 이벤트 소비용 Kafka Consumer (수동 커밋)
pub struct EventConsumer {
    consumer: StreamConsumer,
    topic: String,
}

impl EventConsumer {
    /// 새 Consumer 생성 및 토픽 구독
    pub fn new(config: &ConsumerConfig) -> Result<Self, KafkaError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .create()
            .map_err(|e| KafkaError::Connection(e.to_string()))?;

        consumer
            .subscribe(&[&config.topic])
            .map_err(|e| KafkaError::Connection(e.to_string()))?;

        info!(
            "Kafka Consumer 초기화 완료: topic={} group={}",
            config.topic, config.group_id
        );

        Ok(Self {
            consumer,
            topic: config.topic.clone(),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// 다음 메시지 수신 (메시지가 올 때까지 대기)
    pub async fn recv(&self) -> Result<BorrowedMessage<'_>, KafkaError> {
        self.consumer
            .recv()
            .await
            .map_err(|e| KafkaError::Receive(e.to_string()))
    }

    /// 메시지 오프셋 커밋 (진행 상황이 기록되는 유일한 지점)
    pub fn commit(&self, msg: &BorrowedMessage<'_>) -> Result<(), KafkaError> {
        self.consumer
            .commit_message(msg, CommitMode::Sync)
            .map_err(|e| KafkaError::Commit(e.to_string()))
    }
}

/// DLQ 발행용 Producer
pub struct DlqProducer {
    producer: FutureProducer,
    topic: String,
    delivery_timeout: Duration,
}

impl DlqProducer {
    /// 새 DLQ Producer 생성
    pub fn new(brokers: &str, topic: &str) -> Result<Self, KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("acks", "all")
            .set("message.timeout.ms", "10000")
            .create()
            .map_err(|e| KafkaError::Connection(e.to_string()))?;

        Ok(Self {
            producer,
            topic: topic.to_string(),
            delivery_timeout: Duration::from_secs(10),
        })
    }

    /// 원본 메시지를 진단 헤더와 함께 DLQ 토픽으로 발행
    ///
    /// 원본 바이트와 키는 그대로 보존하고 dlq_reason, original_partition,
    /// original_offset 헤더만 추가합니다.
    pub async fn send(
        &self,
        original: &BorrowedMessage<'_>,
        reason: &str,
    ) -> Result<(), KafkaError> {
        let key = original.key().unwrap_or_default();
        let payload = original.payload().unwrap_or_default();
        let partition = original.partition().to_string();
        let offset = original.offset().to_string();

        let mut headers = OwnedHeaders::new();
        if let Some(original_headers) = original.headers() {
            for header in original_headers.iter() {
                headers = headers.insert(header);
            }
        }
        headers = headers
            .insert(Header {
                key: "dlq_reason",
                value: Some(reason),
            })
            .insert(Header {
                key: "original_partition",
                value: Some(partition.as_str()),
            })
            .insert(Header {
                key: "original_offset",
                value: Some(offset.as_str()),
            });

        let record = FutureRecord::to(&self.topic)
            .key(key)
            .payload(payload)
            .headers(headers);

        self.producer
            .send(record, Timeout::After(self.delivery_timeout))
            .await
            .map_err(|(e, _)| KafkaError::Send(e.to_string()))?;

        info!(
            "DLQ 발행 완료: partition={} offset={} reason={}",
            partition, offset, reason
        );

        Ok(())
    }
}
