//! 支付数据访问缝
//!
//! 结账与对账只依赖这组窄接口，生产实现落在Postgres上。

use async_trait::async_trait;
use telerad_core::{Invoice, PaymentStatus, PaymentTransaction, Result};
use telerad_database::{BillingQueries, DatabasePool, NewPaymentTransaction};
use uuid::Uuid;

/// 支付侧需要的存储操作
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn get_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>>;

    async fn insert_transaction(
        &self,
        txn: &NewPaymentTransaction,
    ) -> Result<PaymentTransaction>;

    async fn get_transaction_by_session(
        &self,
        session_id: &str,
    ) -> Result<Option<PaymentTransaction>>;

    /// 推进流水状态，仅当存储值仍等于expected时生效
    async fn cas_transaction_status(
        &self,
        session_id: &str,
        expected: PaymentStatus,
        next: PaymentStatus,
    ) -> Result<bool>;

    /// 把账单标记为已支付，已支付时返回false
    async fn mark_invoice_paid(&self, invoice_id: Uuid) -> Result<bool>;
}

#[async_trait]
impl PaymentStore for DatabasePool {
    async fn get_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>> {
        BillingQueries::new(self).get_invoice(invoice_id).await
    }

    async fn insert_transaction(
        &self,
        txn: &NewPaymentTransaction,
    ) -> Result<PaymentTransaction> {
        BillingQueries::new(self).insert_transaction(txn).await
    }

    async fn get_transaction_by_session(
        &self,
        session_id: &str,
    ) -> Result<Option<PaymentTransaction>> {
        BillingQueries::new(self)
            .get_transaction_by_session(session_id)
            .await
    }

    async fn cas_transaction_status(
        &self,
        session_id: &str,
        expected: PaymentStatus,
        next: PaymentStatus,
    ) -> Result<bool> {
        BillingQueries::new(self)
            .cas_transaction_status(session_id, expected, next)
            .await
    }

    async fn mark_invoice_paid(&self, invoice_id: Uuid) -> Result<bool> {
        BillingQueries::new(self).mark_invoice_paid(invoice_id).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use telerad_core::InvoiceStatus;

    /// 内存版支付存储，CAS语义与Postgres实现一致
    pub(crate) struct MemoryStore {
        invoices: Mutex<HashMap<Uuid, Invoice>>,
        transactions: Mutex<HashMap<String, PaymentTransaction>>,
        /// 账单实际被改写为已支付的次数
        paid_markings: AtomicUsize,
    }

    impl MemoryStore {
        pub(crate) fn new() -> Self {
            Self {
                invoices: Mutex::new(HashMap::new()),
                transactions: Mutex::new(HashMap::new()),
                paid_markings: AtomicUsize::new(0),
            }
        }

        pub(crate) fn seed_invoice(&self, invoice: Invoice) {
            self.invoices.lock().unwrap().insert(invoice.id, invoice);
        }

        pub(crate) fn seed_transaction(&self, txn: PaymentTransaction) {
            self.transactions
                .lock()
                .unwrap()
                .insert(txn.session_id.clone(), txn);
        }

        pub(crate) fn invoice_status(&self, invoice_id: Uuid) -> Option<InvoiceStatus> {
            self.invoices
                .lock()
                .unwrap()
                .get(&invoice_id)
                .map(|i| i.status)
        }

        pub(crate) fn transaction_status(&self, session_id: &str) -> Option<PaymentStatus> {
            self.transactions
                .lock()
                .unwrap()
                .get(session_id)
                .map(|t| t.payment_status)
        }

        pub(crate) fn paid_markings(&self) -> usize {
            self.paid_markings.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PaymentStore for MemoryStore {
        async fn get_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>> {
            Ok(self.invoices.lock().unwrap().get(&invoice_id).cloned())
        }

        async fn insert_transaction(
            &self,
            txn: &NewPaymentTransaction,
        ) -> Result<PaymentTransaction> {
            let now = Utc::now();
            let stored = PaymentTransaction {
                id: txn.id,
                session_id: txn.session_id.clone(),
                invoice_id: txn.invoice_id,
                amount: txn.amount,
                currency: txn.currency.clone(),
                payment_status: PaymentStatus::Initiated,
                created_at: now,
                updated_at: now,
            };
            self.transactions
                .lock()
                .unwrap()
                .insert(stored.session_id.clone(), stored.clone());
            Ok(stored)
        }

        async fn get_transaction_by_session(
            &self,
            session_id: &str,
        ) -> Result<Option<PaymentTransaction>> {
            Ok(self.transactions.lock().unwrap().get(session_id).cloned())
        }

        async fn cas_transaction_status(
            &self,
            session_id: &str,
            expected: PaymentStatus,
            next: PaymentStatus,
        ) -> Result<bool> {
            let mut transactions = self.transactions.lock().unwrap();
            match transactions.get_mut(session_id) {
                Some(txn) if txn.payment_status == expected => {
                    txn.payment_status = next;
                    txn.updated_at = Utc::now();
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn mark_invoice_paid(&self, invoice_id: Uuid) -> Result<bool> {
            let mut invoices = self.invoices.lock().unwrap();
            match invoices.get_mut(&invoice_id) {
                Some(invoice) if invoice.status != InvoiceStatus::Paid => {
                    invoice.status = InvoiceStatus::Paid;
                    invoice.paid_at = Some(Utc::now());
                    self.paid_markings.fetch_add(1, Ordering::SeqCst);
                    Ok(true)
                }
                Some(_) => Ok(false),
                None => Ok(false),
            }
        }
    }
}
