//! API 키 인증 미들웨어
//!
//! `X-API-Key` 헤더 또는 `Authorization: Bearer` 헤더로 키를 받습니다.
//! 설정에 키가 없으면 인증을 건너뜁니다.

use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};

use super::models::ErrorResponse;
use super::ApiState;

/// v1 경로 공통 인증 미들웨어
pub async fn require_api_key(
    State(state): State<ApiState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected_key) = &state.api_key else {
        // 키 미설정 시 인증 비활성화
        return next.run(request).await;
    };

    match extract_api_key(request.headers()) {
        Some(provided) if provided == *expected_key => next.run(request).await,
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new("Unauthorized")),
        )
            .into_response(),
    }
}

/// 요청 헤더에서 API 키 추출
pub fn extract_api_key(headers: &HeaderMap) -> Option<String> {
    if let Some(key) = headers.get("X-API-Key").and_then(|v| v.to_str().ok()) {
        if !key.is_empty() {
            return Some(key.to_string());
        }
    }

    let auth = headers.get("Authorization").and_then(|v| v.to_str().ok())?;
    let key = auth.strip_prefix("Bearer ").unwrap_or(auth);
    if key.is_empty() {
        None
    } else {
        Some(key.to_string())
    }
}
