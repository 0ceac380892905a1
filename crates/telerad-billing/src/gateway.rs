//! 支付网关适配器
//!
//! 封装第三方支付服务: 创建结账会话、查询会话状态、校验回调签名。
//! 网关调用带有限时超时；调用未成功前本地不产生任何状态变更。

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use std::time::Duration;
use telerad_core::{Invoice, PaymentStatus, Result, TeleradError};

type HmacSha256 = Hmac<Sha256>;

/// 回调签名时间戳容差（秒），超过视为重放
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// 网关配置
#[derive(Debug, Clone, serde::Serialize, Deserialize)]
pub struct GatewayConfig {
    /// API密钥
    pub secret_key: String,
    /// 回调签名密钥
    pub webhook_secret: String,
    /// 网关请求超时（秒）
    pub timeout_secs: u64,
}

/// 网关创建的结账会话
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub session_id: String,
    pub url: String,
}

/// 支付网关接口
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// 为账单创建结账会话
    async fn create_checkout_session(
        &self,
        invoice: &Invoice,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<CheckoutSession>;

    /// 查询会话当前的支付状态
    async fn fetch_session_status(&self, session_id: &str) -> Result<PaymentStatus>;
}

/// Stripe结账网关
pub struct StripeGateway {
    client: reqwest::Client,
    secret_key: String,
    api_base: String,
}

#[derive(Debug, Deserialize)]
struct StripeSession {
    id: String,
    url: Option<String>,
    status: Option<String>,
    payment_status: Option<String>,
}

impl StripeGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TeleradError::Config(e.to_string()))?;

        Ok(Self {
            client,
            secret_key: config.secret_key.clone(),
            api_base: "https://api.stripe.com/v1".to_string(),
        })
    }

    /// 把网关上报的会话状态映射到内部支付状态
    fn map_session_status(session: &StripeSession) -> PaymentStatus {
        if session.payment_status.as_deref() == Some("paid") {
            PaymentStatus::Paid
        } else if session.status.as_deref() == Some("expired") {
            PaymentStatus::Expired
        } else {
            PaymentStatus::Pending
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_checkout_session(
        &self,
        invoice: &Invoice,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<CheckoutSession> {
        // 金额以最小货币单位计
        let unit_amount = (invoice.total_amount * 100.0).round() as i64;
        let product_name = format!("Invoice {}", invoice.invoice_number);

        let params = [
            ("mode", "payment"),
            ("success_url", success_url),
            ("cancel_url", cancel_url),
            ("line_items[0][quantity]", "1"),
            ("line_items[0][price_data][currency]", &invoice.currency),
            ("line_items[0][price_data][product_data][name]", &product_name),
            (
                "line_items[0][price_data][unit_amount]",
                &unit_amount.to_string(),
            ),
            ("metadata[invoice_id]", &invoice.id.to_string()),
        ];

        let response = self
            .client
            .post(format!("{}/checkout/sessions", self.api_base))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&params)
            .send()
            .await
            .map_err(|e| TeleradError::Upstream(format!("Gateway unreachable: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Checkout session creation failed ({}): {}", status, body);
            return Err(TeleradError::Upstream(format!(
                "Gateway rejected session creation: {}",
                status
            )));
        }

        let session: StripeSession = response
            .json()
            .await
            .map_err(|e| TeleradError::Upstream(format!("Malformed gateway response: {}", e)))?;

        let url = session.url.ok_or_else(|| {
            TeleradError::Upstream("Gateway response missing checkout url".to_string())
        })?;

        Ok(CheckoutSession {
            session_id: session.id,
            url,
        })
    }

    async fn fetch_session_status(&self, session_id: &str) -> Result<PaymentStatus> {
        let response = self
            .client
            .get(format!("{}/checkout/sessions/{}", self.api_base, session_id))
            .basic_auth(&self.secret_key, None::<&str>)
            .send()
            .await
            .map_err(|e| TeleradError::Upstream(format!("Gateway unreachable: {}", e)))?;

        if response.status().as_u16() == 404 {
            return Err(TeleradError::NotFound(format!(
                "Gateway session {} not found",
                session_id
            )));
        }

        if !response.status().is_success() {
            return Err(TeleradError::Upstream(format!(
                "Gateway status query failed: {}",
                response.status()
            )));
        }

        let session: StripeSession = response
            .json()
            .await
            .map_err(|e| TeleradError::Upstream(format!("Malformed gateway response: {}", e)))?;

        Ok(Self::map_session_status(&session))
    }
}

/// 校验回调签名
///
/// 签名头格式 `t=<unix秒>,v1=<hex hmac>`；对 `{t}.{payload}` 做HMAC-SHA256，
/// 时间戳超出容差按重放拒绝。任何失败都在处理载荷之前返回。
pub fn verify_webhook_signature(
    payload: &[u8],
    signature_header: &str,
    secret: &str,
    now_unix: i64,
) -> Result<()> {
    let mut timestamp: Option<i64> = None;
    let mut signature: Option<String> = None;

    for part in signature_header.split(',') {
        match part.split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => signature = Some(value.to_string()),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| {
        TeleradError::InvalidSignature("Signature header missing timestamp".to_string())
    })?;
    let signature = signature.ok_or_else(|| {
        TeleradError::InvalidSignature("Signature header missing v1 signature".to_string())
    })?;

    if (now_unix - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(TeleradError::InvalidSignature(
            "Signature timestamp outside tolerance".to_string(),
        ));
    }

    let expected = hex::decode(&signature)
        .map_err(|_| TeleradError::InvalidSignature("Signature is not valid hex".to_string()))?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| TeleradError::Internal(e.to_string()))?;
    mac.update(format!("{}.", timestamp).as_bytes());
    mac.update(payload);

    mac.verify_slice(&expected)
        .map_err(|_| TeleradError::InvalidSignature("Signature mismatch".to_string()))
}

/// 解析回调事件，提取会话标识与观测到的支付状态
///
/// 与对账无关的事件类型返回None，按成功确认处理以避免网关重试堆积。
pub fn parse_webhook_event(payload: &[u8]) -> Result<Option<(String, PaymentStatus)>> {
    let event: Value = serde_json::from_slice(payload)
        .map_err(|e| TeleradError::Validation(format!("Malformed webhook payload: {}", e)))?;

    let event_type = event
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| TeleradError::Validation("Webhook payload missing type".to_string()))?;

    let session_id = event
        .pointer("/data/object/id")
        .and_then(Value::as_str)
        .map(str::to_string);

    let observed = match event_type {
        "checkout.session.completed" => {
            // completed事件里payment_status可能仍是unpaid（延迟支付方式）
            match event.pointer("/data/object/payment_status").and_then(Value::as_str) {
                Some("paid") => Some(PaymentStatus::Paid),
                _ => Some(PaymentStatus::Pending),
            }
        }
        "checkout.session.async_payment_succeeded" => Some(PaymentStatus::Paid),
        "checkout.session.async_payment_failed" => Some(PaymentStatus::Failed),
        "checkout.session.expired" => Some(PaymentStatus::Expired),
        _ => None,
    };

    match (session_id, observed) {
        (Some(id), Some(status)) => Ok(Some((id, status))),
        (None, Some(_)) => Err(TeleradError::Validation(
            "Webhook payload missing session id".to_string(),
        )),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{}.", timestamp).as_bytes());
        mac.update(payload);
        format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn test_valid_signature() {
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let now = Utc::now().timestamp();
        let header = sign(payload, "whsec_test", now);
        assert!(verify_webhook_signature(payload, &header, "whsec_test", now).is_ok());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let now = Utc::now().timestamp();
        let header = sign(payload, "wrong_secret", now);
        let err = verify_webhook_signature(payload, &header, "whsec_test", now).unwrap_err();
        assert!(matches!(err, TeleradError::InvalidSignature(_)));
    }

    #[test]
    fn test_modified_payload_rejected() {
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let tampered = br#"{"type":"checkout.session.completed","extra":1}"#;
        let now = Utc::now().timestamp();
        let header = sign(payload, "whsec_test", now);
        let err = verify_webhook_signature(tampered, &header, "whsec_test", now).unwrap_err();
        assert!(matches!(err, TeleradError::InvalidSignature(_)));
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let now = Utc::now().timestamp();
        let header = sign(payload, "whsec_test", now - 600);
        let err = verify_webhook_signature(payload, &header, "whsec_test", now).unwrap_err();
        assert!(matches!(err, TeleradError::InvalidSignature(_)));
    }

    #[test]
    fn test_malformed_header_rejected() {
        let payload = br#"{}"#;
        let now = Utc::now().timestamp();
        for header in ["", "v1=abc", "t=123", "t=123,v1=zzzz"] {
            let err = verify_webhook_signature(payload, header, "whsec_test", now).unwrap_err();
            assert!(matches!(err, TeleradError::InvalidSignature(_)));
        }
    }

    #[test]
    fn test_parse_completed_event() {
        let payload = br#"{
            "type": "checkout.session.completed",
            "data": {"object": {"id": "cs_test_123", "payment_status": "paid"}}
        }"#;
        let parsed = parse_webhook_event(payload).unwrap();
        assert_eq!(parsed, Some(("cs_test_123".to_string(), PaymentStatus::Paid)));
    }

    #[test]
    fn test_parse_expired_event() {
        let payload = br#"{
            "type": "checkout.session.expired",
            "data": {"object": {"id": "cs_test_456"}}
        }"#;
        let parsed = parse_webhook_event(payload).unwrap();
        assert_eq!(parsed, Some(("cs_test_456".to_string(), PaymentStatus::Expired)));
    }

    #[test]
    fn test_parse_irrelevant_event_ignored() {
        let payload = br#"{"type": "invoice.created", "data": {"object": {"id": "in_1"}}}"#;
        assert_eq!(parse_webhook_event(payload).unwrap(), None);
    }

    #[test]
    fn test_parse_malformed_payload() {
        assert!(parse_webhook_event(b"not json").is_err());
        assert!(parse_webhook_event(b"{}").is_err());
    }
}
