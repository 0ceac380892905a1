//! 账单与支付相关数据库操作
//!
//! 账单的已支付标记和支付流水的状态推进都采用条件更新（compare-and-set），
//! 由数据库层保证多实例并发下每个终态副作用至多发生一次。

use crate::connection::DatabasePool;
use crate::models::*;
use chrono::{DateTime, Utc};
use telerad_core::{
    BillingRate, Invoice, PaymentStatus, PaymentTransaction, Result, Study, TeleradError,
};
use uuid::Uuid;

/// 账单数据查询接口
pub struct BillingQueries<'a> {
    pool: &'a DatabasePool,
}

impl<'a> BillingQueries<'a> {
    pub fn new(pool: &'a DatabasePool) -> Self {
        Self { pool }
    }

    // ========== 费率相关操作 ==========

    /// 创建费率
    pub async fn insert_rate(&self, rate: &NewBillingRate) -> Result<BillingRate> {
        let db_rate = sqlx::query_as::<_, DbBillingRate>(r#"
            INSERT INTO billing_rates (id, modality, base_rate, currency, description)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
        "#)
        .bind(rate.id)
        .bind(&rate.modality)
        .bind(rate.base_rate)
        .bind(&rate.currency)
        .bind(&rate.description)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| TeleradError::Database(e.to_string()))?;

        Ok(BillingRate::from(db_rate))
    }

    /// 列出全部费率
    pub async fn list_rates(&self) -> Result<Vec<BillingRate>> {
        let results = sqlx::query_as::<_, DbBillingRate>(
            "SELECT * FROM billing_rates ORDER BY modality, currency"
        )
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| TeleradError::Database(e.to_string()))?;

        Ok(results.into_iter().map(BillingRate::from).collect())
    }

    /// 列出指定币种的费率（费率表按 (设备类型, 币种) 取值）
    pub async fn rates_for_currency(&self, currency: &str) -> Result<Vec<BillingRate>> {
        let results = sqlx::query_as::<_, DbBillingRate>(
            "SELECT * FROM billing_rates WHERE currency = $1"
        )
        .bind(currency)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| TeleradError::Database(e.to_string()))?;

        Ok(results.into_iter().map(BillingRate::from).collect())
    }

    /// 更新费率
    pub async fn update_rate(
        &self,
        rate_id: Uuid,
        base_rate: f64,
        description: Option<&str>,
    ) -> Result<Option<BillingRate>> {
        let result = sqlx::query_as::<_, DbBillingRate>(r#"
            UPDATE billing_rates
            SET base_rate = $2, description = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING *
        "#)
        .bind(rate_id)
        .bind(base_rate)
        .bind(description)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| TeleradError::Database(e.to_string()))?;

        Ok(result.map(BillingRate::from))
    }

    // ========== 账单相关操作 ==========

    /// 查询账期内某中心的全部已完成检查（两端闭区间）
    pub async fn completed_studies_in_period(
        &self,
        centre_id: Uuid,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<Vec<Study>> {
        let results = sqlx::query_as::<_, DbStudy>(r#"
            SELECT * FROM studies
            WHERE centre_id = $1
              AND status = 'completed'
              AND uploaded_at >= $2
              AND uploaded_at <= $3
            ORDER BY uploaded_at ASC
        "#)
        .bind(centre_id)
        .bind(period_start)
        .bind(period_end)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| TeleradError::Database(e.to_string()))?;

        Ok(results.into_iter().map(Study::from).collect())
    }

    /// 查找同一中心同一账期已有的账单
    pub async fn find_invoice_by_period(
        &self,
        centre_id: Uuid,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<Option<Invoice>> {
        let result = sqlx::query_as::<_, DbInvoice>(r#"
            SELECT * FROM invoices
            WHERE centre_id = $1 AND period_start = $2 AND period_end = $3
        "#)
        .bind(centre_id)
        .bind(period_start)
        .bind(period_end)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| TeleradError::Database(e.to_string()))?;

        Ok(result.map(Invoice::from))
    }

    /// 创建账单
    pub async fn insert_invoice(&self, invoice: &NewInvoice) -> Result<Invoice> {
        let db_invoice = sqlx::query_as::<_, DbInvoice>(r#"
            INSERT INTO invoices (id, invoice_number, centre_id, period_start, period_end,
                                  study_breakdown, total_amount, currency, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending')
            RETURNING *
        "#)
        .bind(invoice.id)
        .bind(&invoice.invoice_number)
        .bind(invoice.centre_id)
        .bind(invoice.period_start)
        .bind(invoice.period_end)
        .bind(&invoice.study_breakdown)
        .bind(invoice.total_amount)
        .bind(&invoice.currency)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| TeleradError::Database(e.to_string()))?;

        Ok(Invoice::from(db_invoice))
    }

    /// 根据ID查找账单
    pub async fn get_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>> {
        let result = sqlx::query_as::<_, DbInvoice>("SELECT * FROM invoices WHERE id = $1")
            .bind(invoice_id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| TeleradError::Database(e.to_string()))?;

        Ok(result.map(Invoice::from))
    }

    /// 列出账单，可按中心过滤
    pub async fn list_invoices(&self, centre_id: Option<Uuid>) -> Result<Vec<Invoice>> {
        let results = sqlx::query_as::<_, DbInvoice>(r#"
            SELECT * FROM invoices
            WHERE ($1::uuid IS NULL OR centre_id = $1)
            ORDER BY generated_at DESC
        "#)
        .bind(centre_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| TeleradError::Database(e.to_string()))?;

        Ok(results.into_iter().map(Invoice::from).collect())
    }

    /// 把账单置为已支付
    ///
    /// 条件更新: 仅当账单尚未支付时生效。两个通道并发调用时只有一方成功，
    /// 失败方视为无操作。返回本次调用是否真正完成了状态变更。
    pub async fn mark_invoice_paid(&self, invoice_id: Uuid) -> Result<bool> {
        let result = sqlx::query(r#"
            UPDATE invoices SET status = 'paid', paid_at = NOW()
            WHERE id = $1 AND status <> 'paid'
        "#)
        .bind(invoice_id)
        .execute(self.pool.pool())
        .await
        .map_err(|e| TeleradError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    // ========== 支付流水相关操作 ==========

    /// 创建支付流水，初始状态为initiated
    ///
    /// 只在网关会话创建成功之后调用；网关调用失败不留下任何流水。
    pub async fn insert_transaction(
        &self,
        txn: &NewPaymentTransaction,
    ) -> Result<PaymentTransaction> {
        let db_txn = sqlx::query_as::<_, DbPaymentTransaction>(r#"
            INSERT INTO payment_transactions (id, session_id, invoice_id, amount, currency, payment_status)
            VALUES ($1, $2, $3, $4, $5, 'initiated')
            RETURNING *
        "#)
        .bind(txn.id)
        .bind(&txn.session_id)
        .bind(txn.invoice_id)
        .bind(txn.amount)
        .bind(&txn.currency)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| TeleradError::Database(e.to_string()))?;

        Ok(PaymentTransaction::from(db_txn))
    }

    /// 根据网关会话标识查找支付流水
    pub async fn get_transaction_by_session(
        &self,
        session_id: &str,
    ) -> Result<Option<PaymentTransaction>> {
        let result = sqlx::query_as::<_, DbPaymentTransaction>(
            "SELECT * FROM payment_transactions WHERE session_id = $1"
        )
        .bind(session_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| TeleradError::Database(e.to_string()))?;

        Ok(result.map(PaymentTransaction::from))
    }

    /// 推进支付流水状态（compare-and-set）
    ///
    /// 仅当数据库中的状态仍等于调用方读到的状态时更新；
    /// 更新失败说明另一个通道已经并发推进，调用方应视为无操作。
    pub async fn cas_transaction_status(
        &self,
        session_id: &str,
        expected: PaymentStatus,
        next: PaymentStatus,
    ) -> Result<bool> {
        let result = sqlx::query(r#"
            UPDATE payment_transactions
            SET payment_status = $3, updated_at = NOW()
            WHERE session_id = $1 AND payment_status = $2
        "#)
        .bind(session_id)
        .bind(expected.as_str())
        .bind(next.as_str())
        .execute(self.pool.pool())
        .await
        .map_err(|e| TeleradError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}
