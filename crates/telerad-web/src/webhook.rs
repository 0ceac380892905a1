//! 支付网关回调入口
//!
//! 回调不带用户token，靠网关签名头认证；签名未通过之前不解析载荷。
//! 处理必须尽快返回成功，否则网关会不断重发。

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Json},
};
use serde_json::json;
use telerad_billing::{parse_webhook_event, verify_webhook_signature};
use telerad_core::TeleradError;
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult};
use crate::server::AppState;

const SIGNATURE_HEADER: &str = "stripe-signature";

/// Stripe回调处理器
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            TeleradError::InvalidSignature("Missing signature header".to_string())
        })?;

    // 先验签，验签失败的载荷一个字节都不处理
    verify_webhook_signature(
        &body,
        signature,
        &state.webhook_secret,
        chrono::Utc::now().timestamp(),
    )
    .map_err(ApiError)?;

    let Some((session_id, observed)) = parse_webhook_event(&body)? else {
        // 未订阅的事件类型，确认收到即可
        return Ok(Json(json!({ "received": true })));
    };

    // 未知会话按已确认处理，避免网关对无法恢复的投递反复重试
    match state.checkout.apply_webhook_status(&session_id, observed).await {
        Ok(txn) => {
            info!(
                "Webhook for session {} merged, status {}",
                session_id,
                txn.payment_status.as_str()
            );
        }
        Err(TeleradError::NotFound(msg)) => {
            warn!("Webhook for unknown session {}: {}", session_id, msg);
        }
        Err(e) => return Err(ApiError(e)),
    }

    Ok(Json(json!({ "received": true })))
}
