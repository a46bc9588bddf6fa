//! 아웃박스 릴레이 모듈

pub mod outbox_publisher;

pub use outbox_publisher::{OutboxPublisher, PublishError};
