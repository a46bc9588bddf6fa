//! Kafka 연동 모듈
//!
//! 아웃박스 이벤트를 감싸는 envelope 포맷과 Kafka Producer/Consumer 래퍼를
//! 제공합니다. Producer는 acks=all 동기 발행, Consumer는 수동 오프셋 커밋을
//! 사용합니다.

pub mod envelope;
pub mod kafka_consumer;
pub mod kafka_producer;

pub use envelope::{
    EventEnvelope, TransactionCreatedPayload, TransactionFailedPayload,
    TransactionProcessedPayload, EVENT_TRANSACTION_CREATED, EVENT_TRANSACTION_FAILED,
    EVENT_TRANSACTION_PROCESSED,
};
pub use kafka_consumer::{ConsumerConfig, DlqProducer, EventConsumer};
pub use kafka_producer::EventProducer;

/// Kafka 오류 타입
#[derive(Debug)]
pub enum KafkaError {
    Connection(String),
    Serialization(String),
    Send(String),
    Receive(String),
    Commit(String),
}

impl std::fmt::Display for KafkaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KafkaError::Connection(msg) => write!(f, "Connection error: {}", msg),
            KafkaError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            KafkaError::Send(msg) => write!(f, "Send error: {}", msg),
            KafkaError::Receive(msg) => write!(f, "Receive error: {}", msg),
            KafkaError::Commit(msg) => write!(f, "Commit error: {}", msg),
        }
    }
}

impl std::error::Error for KafkaError {}
