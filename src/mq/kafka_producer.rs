//! Kafka Producer 구현
//!
//! 아웃박스 릴레이가 envelope를 발행할 때 사용합니다. 모든 복제본의 확인
//! 응답(acks=all)을 받을 때까지 발행 성공으로 간주하지 않습니다.

use std::time::Duration;

use log::info;
use rdkafka::config::ClientConfig;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;

use super::envelope::EventEnvelope;
use super::KafkaError;

/// 이벤트 발행용 Kafka Producer
pub struct EventProducer {
    producer: FutureProducer,
    topic: String,
    delivery_timeout: Duration,
}

impl EventProducer {
    /// 새 Producer 생성
    pub fn new(brokers: &str, topic: &str) -> Result<Self, KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("acks", "all")
            .set("message.timeout.ms", "10000")
            .create()
            .map_err(|e| KafkaError::Connection(e.to_string()))?;

        info!("Kafka Producer 초기화 완료: {} -> {}", brokers, topic);

        Ok(Self {
            producer,
            topic: topic.to_string(),
            delivery_timeout: Duration::from_secs(10),
        })
    }

    /// envelope를 토픽에 발행
    ///
    /// 파티션 키는 aggregate id이므로 같은 계좌의 이벤트는 같은 파티션으로
    /// 들어가며, 계좌 단위 FIFO가 보장됩니다.
    pub async fn publish(&self, envelope: &EventEnvelope) -> Result<(i32, i64), KafkaError> {
        let payload = serde_json::to_vec(envelope)
            .map_err(|e| KafkaError::Serialization(e.to_string()))?;
        let key = envelope.aggregate_id.to_string();

        let headers = OwnedHeaders::new()
            .insert(Header {
                key: "event_type",
                value: Some(envelope.event_type.as_str()),
            })
            .insert(Header {
                key: "aggregate_id",
                value: Some(key.as_str()),
            });

        let record = FutureRecord::to(&self.topic)
            .key(&key)
            .payload(&payload)
            .headers(headers);

        let (partition, offset) = self
            .producer
            .send(record, Timeout::After(self.delivery_timeout))
            .await
            .map_err(|(e, _)| KafkaError::Send(e.to_string()))?;

        info!(
            "이벤트 발행 완료: {} ({}) partition={} offset={}",
            envelope.event_id, envelope.event_type, partition, offset
        );

        Ok((partition, offset))
    }
}
