//! 이벤트 envelope 포맷
//!
//! 로그 토픽으로 전송되는 메시지 단위입니다. envelope id는 아웃박스 행 id에서
//! 결정적으로 파생되므로, 같은 행이 재발행되어도 Applier 쪽 중복 제거 키는
//! 동일합니다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::models::{OutboxEvent, TransactionType};

pub const EVENT_TRANSACTION_CREATED: &str = "transaction.created";
pub const EVENT_TRANSACTION_PROCESSED: &str = "transaction.processed";
pub const EVENT_TRANSACTION_FAILED: &str = "transaction.failed";

/// 이벤트 envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: Uuid,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    pub trace_id: String,
    pub idempotency_key: String,
    pub aggregate_id: Uuid,
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// 아웃박스 행에서 envelope 생성
    ///
    /// event_id는 아웃박스 행 id를 그대로 사용합니다. transaction.created
    /// 이벤트는 관측용으로 payload의 idempotency key를 헤더 필드로 올립니다.
    pub fn from_outbox(event: &OutboxEvent) -> Self {
        let idempotency_key = if event.event_type == EVENT_TRANSACTION_CREATED {
            event
                .payload
                .get("idempotency_key")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        } else {
            String::new()
        };

        Self {
            event_id: event.id,
            event_type: event.event_type.clone(),
            occurred_at: event.created_at,
            trace_id: Uuid::new_v4().to_string(),
            idempotency_key,
            aggregate_id: event.aggregate_id,
            payload: event.payload.clone(),
        }
    }
}

/// transaction.created 이벤트 payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionCreatedPayload {
    pub transaction_id: Uuid,
    pub account_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub idempotency_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// transaction.processed 이벤트 payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionProcessedPayload {
    pub transaction_id: Uuid,
    pub account_id: Uuid,
    pub new_balance: i64,
}

/// transaction.failed 이벤트 payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionFailedPayload {
    pub transaction_id: Uuid,
    pub account_id: Uuid,
    pub failure_reason: String,
}
