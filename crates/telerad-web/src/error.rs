//! 错误到HTTP响应的转换

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use telerad_core::TeleradError;

/// HTTP边界错误包装
///
/// 业务层的错误在这里统一翻译为状态码: 未认证401、策略拒绝403、
/// 资源未找到404、签名或载荷问题400、网关及内部故障500。
#[derive(Debug)]
pub struct ApiError(pub TeleradError);

impl From<TeleradError> for ApiError {
    fn from(err: TeleradError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            TeleradError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            TeleradError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            TeleradError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            TeleradError::InvalidSignature(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            TeleradError::InvalidState(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            TeleradError::InvalidStateTransition { .. } => {
                (StatusCode::BAD_REQUEST, self.0.to_string())
            }
            TeleradError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            TeleradError::Upstream(msg) => {
                tracing::error!("Upstream gateway failure: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
            other => {
                tracing::error!("Internal error: {}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": true,
            "message": message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

/// HTTP处理器统一结果类型
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_mapping() {
        let cases = [
            (TeleradError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (TeleradError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (TeleradError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (TeleradError::InvalidSignature("x".into()), StatusCode::BAD_REQUEST),
            (TeleradError::InvalidState("x".into()), StatusCode::BAD_REQUEST),
            (TeleradError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (TeleradError::Upstream("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (TeleradError::Database("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            let response = ApiError(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[test]
    fn test_internal_errors_do_not_leak_details() {
        let response = ApiError(TeleradError::Database("connection refused".into()));
        let response = response.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
