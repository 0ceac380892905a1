//! 结账流程
//!
//! 为账单创建网关结账会话并落支付流水；流水只在网关成功返回之后插入，
//! 网关失败不留下任何本地记录。轮询入口把网关观测交给对账器合并。

use crate::gateway::PaymentGateway;
use crate::reconcile::PaymentReconciler;
use crate::store::PaymentStore;
use serde::Serialize;
use std::sync::Arc;
use telerad_core::{
    InvoiceStatus, PaymentTransaction, Principal, Result, Role, TeleradError,
};
use telerad_database::NewPaymentTransaction;
use uuid::Uuid;

/// 创建结账会话的返回结果
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutResponse {
    pub url: String,
    pub session_id: String,
    pub transaction_id: Uuid,
}

/// 结账服务
pub struct CheckoutService {
    store: Arc<dyn PaymentStore>,
    gateway: Arc<dyn PaymentGateway>,
    reconciler: PaymentReconciler,
}

impl CheckoutService {
    pub fn new(store: Arc<dyn PaymentStore>, gateway: Arc<dyn PaymentGateway>) -> Self {
        let reconciler = PaymentReconciler::new(store.clone());
        Self {
            store,
            gateway,
            reconciler,
        }
    }

    /// 为账单创建结账会话
    ///
    /// 管理员可为任意账单发起支付，中心账号只能支付本中心的账单。
    /// 金额与状态在调用网关之前检查，零额或已支付的账单直接拒绝。
    pub async fn create_session(
        &self,
        actor: &Principal,
        invoice_id: Uuid,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<CheckoutResponse> {
        let invoice = self
            .store
            .get_invoice(invoice_id)
            .await?
            .ok_or_else(|| TeleradError::NotFound(format!("Invoice {} not found", invoice_id)))?;

        let permitted = match actor.role {
            Role::Admin => true,
            Role::Centre => actor.centre_id == Some(invoice.centre_id),
            _ => false,
        };
        if !permitted {
            return Err(TeleradError::Forbidden(
                "Only admins or the owning centre may pay an invoice".to_string(),
            ));
        }

        if invoice.status == InvoiceStatus::Paid {
            return Err(TeleradError::InvalidState(format!(
                "Invoice {} is already paid",
                invoice.invoice_number
            )));
        }
        if invoice.total_amount <= 0.0 {
            return Err(TeleradError::InvalidState(format!(
                "Invoice {} has nothing to pay",
                invoice.invoice_number
            )));
        }

        let session = self
            .gateway
            .create_checkout_session(&invoice, success_url, cancel_url)
            .await?;

        let txn = self
            .store
            .insert_transaction(&NewPaymentTransaction {
                id: Uuid::new_v4(),
                session_id: session.session_id.clone(),
                invoice_id: invoice.id,
                amount: invoice.total_amount,
                currency: invoice.currency.clone(),
            })
            .await?;

        tracing::info!(
            "Checkout session {} created for invoice {}",
            session.session_id,
            invoice.invoice_number
        );

        Ok(CheckoutResponse {
            url: session.url,
            session_id: session.session_id,
            transaction_id: txn.id,
        })
    }

    /// 轮询会话状态
    ///
    /// 向网关查询后把观测并入本地流水，返回合并后的流水。
    pub async fn poll_status(&self, session_id: &str) -> Result<PaymentTransaction> {
        self.reconciler.poll(&self.gateway, session_id).await
    }

    /// 处理回调通道上报的状态
    pub async fn apply_webhook_status(
        &self,
        session_id: &str,
        observed: telerad_core::PaymentStatus,
    ) -> Result<PaymentTransaction> {
        self.reconciler.apply_status(session_id, observed).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::CheckoutSession;
    use crate::store::testing::MemoryStore;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use telerad_core::{Invoice, PaymentStatus};

    struct CountingGateway {
        status: PaymentStatus,
        sessions_created: AtomicUsize,
    }

    impl CountingGateway {
        fn new(status: PaymentStatus) -> Self {
            Self {
                status,
                sessions_created: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PaymentGateway for CountingGateway {
        async fn create_checkout_session(
            &self,
            invoice: &Invoice,
            _success_url: &str,
            _cancel_url: &str,
        ) -> Result<CheckoutSession> {
            self.sessions_created.fetch_add(1, Ordering::SeqCst);
            Ok(CheckoutSession {
                session_id: format!("cs_test_{}", invoice.invoice_number),
                url: "https://checkout.example/session".to_string(),
            })
        }

        async fn fetch_session_status(&self, _session_id: &str) -> Result<PaymentStatus> {
            Ok(self.status)
        }
    }

    fn sample_invoice(total_amount: f64, status: InvoiceStatus) -> Invoice {
        Invoice {
            id: Uuid::new_v4(),
            invoice_number: "INV-202608-ABC123".to_string(),
            centre_id: Uuid::new_v4(),
            period_start: Utc::now(),
            period_end: Utc::now(),
            study_breakdown: Default::default(),
            total_amount,
            currency: "USD".to_string(),
            status,
            generated_at: Utc::now(),
            paid_at: None,
        }
    }

    fn admin() -> Principal {
        Principal {
            id: Uuid::new_v4(),
            role: Role::Admin,
            centre_id: None,
        }
    }

    fn service(
        invoice: &Invoice,
        gateway_status: PaymentStatus,
    ) -> (CheckoutService, Arc<MemoryStore>, Arc<CountingGateway>) {
        let store = Arc::new(MemoryStore::new());
        store.seed_invoice(invoice.clone());
        let gateway = Arc::new(CountingGateway::new(gateway_status));
        let service = CheckoutService::new(store.clone(), gateway.clone());
        (service, store, gateway)
    }

    #[tokio::test]
    async fn test_create_session_records_transaction() {
        let invoice = sample_invoice(300.0, InvoiceStatus::Pending);
        let (service, store, _) = service(&invoice, PaymentStatus::Pending);

        let response = service
            .create_session(&admin(), invoice.id, "https://a/ok", "https://a/cancel")
            .await
            .unwrap();

        assert_eq!(response.session_id, "cs_test_INV-202608-ABC123");
        assert_eq!(
            store.transaction_status(&response.session_id),
            Some(PaymentStatus::Initiated)
        );
    }

    #[tokio::test]
    async fn test_zero_amount_invoice_rejected_before_gateway() {
        // 零额账单在本地拒绝，网关不该收到任何会话创建请求
        let invoice = sample_invoice(0.0, InvoiceStatus::Pending);
        let (service, _, gateway) = service(&invoice, PaymentStatus::Pending);

        let err = service
            .create_session(&admin(), invoice.id, "https://a/ok", "https://a/cancel")
            .await
            .unwrap_err();

        assert!(matches!(err, TeleradError::InvalidState(_)));
        assert_eq!(gateway.sessions_created.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_paid_invoice_rejected_before_gateway() {
        let invoice = sample_invoice(300.0, InvoiceStatus::Paid);
        let (service, _, gateway) = service(&invoice, PaymentStatus::Pending);

        let err = service
            .create_session(&admin(), invoice.id, "https://a/ok", "https://a/cancel")
            .await
            .unwrap_err();

        assert!(matches!(err, TeleradError::InvalidState(_)));
        assert_eq!(gateway.sessions_created.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_foreign_centre_cannot_pay() {
        let invoice = sample_invoice(300.0, InvoiceStatus::Pending);
        let (service, _, gateway) = service(&invoice, PaymentStatus::Pending);
        let other_centre = Principal {
            id: Uuid::new_v4(),
            role: Role::Centre,
            centre_id: Some(Uuid::new_v4()),
        };

        let err = service
            .create_session(&other_centre, invoice.id, "https://a/ok", "https://a/cancel")
            .await
            .unwrap_err();

        assert!(matches!(err, TeleradError::Forbidden(_)));
        assert_eq!(gateway.sessions_created.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_poll_merges_gateway_status() {
        let invoice = sample_invoice(300.0, InvoiceStatus::Pending);
        let (service, store, _) = service(&invoice, PaymentStatus::Paid);

        let response = service
            .create_session(&admin(), invoice.id, "https://a/ok", "https://a/cancel")
            .await
            .unwrap();
        let txn = service.poll_status(&response.session_id).await.unwrap();

        assert_eq!(txn.payment_status, PaymentStatus::Paid);
        assert_eq!(store.invoice_status(invoice.id), Some(InvoiceStatus::Paid));
    }
}
