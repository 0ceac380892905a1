//! 账单生成
//!
//! 把账期内某中心的全部已完成检查按设备类型汇总成一张账单。
//! 纯聚合计算，不对检查记录产生任何副作用。

use crate::rates::RateTable;
use chrono::{DateTime, Utc};
use rand::Rng;
use std::collections::HashMap;
use telerad_core::access::{self, Action, Ownership, Principal};
use telerad_core::{Invoice, Result, Study, TeleradError};
use telerad_database::{BillingQueries, DatabasePool, NewInvoice};
use uuid::Uuid;

/// 按设备类型汇总检查数量
pub fn aggregate_breakdown(studies: &[Study]) -> HashMap<String, i64> {
    let mut breakdown = HashMap::new();
    for study in studies {
        *breakdown.entry(study.modality.clone()).or_insert(0) += 1;
    }
    breakdown
}

/// 计算账单总额: 各设备类型数量乘以对应费率后求和
pub fn compute_total(breakdown: &HashMap<String, i64>, rates: &RateTable) -> f64 {
    breakdown
        .iter()
        .map(|(modality, count)| *count as f64 * rates.rate_for(modality))
        .sum()
}

/// 生成账单编号
fn generate_invoice_number() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..6)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect();
    format!("INV-{}-{}", Utc::now().format("%Y%m"), suffix)
}

/// 账单生成器
pub struct InvoiceGenerator {
    db: DatabasePool,
}

impl InvoiceGenerator {
    pub fn new(db: DatabasePool) -> Self {
        Self { db }
    }

    /// 为中心生成指定账期的账单
    ///
    /// 同一 (中心, 账期) 幂等: 已存在的账单原样返回，不重复生成。
    pub async fn generate(
        &self,
        actor: &Principal,
        centre_id: Uuid,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        currency: &str,
    ) -> Result<Invoice> {
        if !access::allow(actor.role, Action::GenerateInvoice, Ownership::NotApplicable) {
            return Err(TeleradError::Forbidden(
                "Only admins can generate invoices".to_string(),
            ));
        }

        if period_end < period_start {
            return Err(TeleradError::Validation(
                "Period end precedes period start".to_string(),
            ));
        }

        let queries = BillingQueries::new(&self.db);

        if let Some(existing) = queries
            .find_invoice_by_period(centre_id, period_start, period_end)
            .await?
        {
            tracing::info!(
                "Invoice {} already exists for centre {} period, returning it",
                existing.invoice_number,
                centre_id
            );
            return Ok(existing);
        }

        let studies = queries
            .completed_studies_in_period(centre_id, period_start, period_end)
            .await?;
        let breakdown = aggregate_breakdown(&studies);

        let rates = RateTable::from_rates(&queries.rates_for_currency(currency).await?);
        let total_amount = compute_total(&breakdown, &rates);

        let invoice = NewInvoice {
            id: Uuid::new_v4(),
            invoice_number: generate_invoice_number(),
            centre_id,
            period_start,
            period_end,
            study_breakdown: serde_json::to_value(&breakdown)?,
            total_amount,
            currency: currency.to_string(),
        };

        let created = queries.insert_invoice(&invoice).await?;
        tracing::info!(
            "Generated invoice {} for centre {}: {} studies, total {} {}",
            created.invoice_number,
            centre_id,
            studies.len(),
            created.total_amount,
            created.currency
        );
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use telerad_core::{BillingRate, StudyStatus};

    fn study(modality: &str) -> Study {
        Study {
            id: Uuid::new_v4(),
            display_id: "A1B2C3D4".to_string(),
            patient_name: "Doe, John".to_string(),
            patient_age: 52,
            patient_gender: "M".to_string(),
            modality: modality.to_string(),
            centre_id: Uuid::new_v4(),
            technician_id: Uuid::new_v4(),
            radiologist_id: None,
            status: StudyStatus::Completed,
            notes: None,
            file_refs: vec![],
            uploaded_at: Utc::now(),
            ai_report_id: None,
            final_report_id: None,
            is_draft: false,
            delete_requested: false,
            delete_requested_by: None,
            delete_requested_at: None,
        }
    }

    fn rate(modality: &str, base_rate: f64) -> BillingRate {
        BillingRate {
            id: Uuid::new_v4(),
            modality: modality.to_string(),
            base_rate,
            currency: "USD".to_string(),
            description: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_aggregate_breakdown() {
        let studies = vec![
            study("CT"),
            study("CT"),
            study("MRI"),
            study("CT"),
            study("MRI"),
        ];
        let breakdown = aggregate_breakdown(&studies);
        assert_eq!(breakdown.get("CT"), Some(&3));
        assert_eq!(breakdown.get("MRI"), Some(&2));
        assert_eq!(breakdown.len(), 2);
    }

    #[test]
    fn test_total_amount() {
        // 3×CT@100 + 2×MRI@150 = 600
        let studies = vec![
            study("CT"),
            study("CT"),
            study("CT"),
            study("MRI"),
            study("MRI"),
        ];
        let breakdown = aggregate_breakdown(&studies);
        let rates = RateTable::from_rates(&[rate("CT", 100.0), rate("MRI", 150.0)]);
        assert_eq!(compute_total(&breakdown, &rates), 600.0);
    }

    #[test]
    fn test_total_with_default_rate() {
        // 未配置费率的设备类型按默认费率100计价
        let studies = vec![study("PET"), study("PET")];
        let breakdown = aggregate_breakdown(&studies);
        let rates = RateTable::from_rates(&[rate("CT", 250.0)]);
        assert_eq!(compute_total(&breakdown, &rates), 200.0);
    }

    #[test]
    fn test_empty_period() {
        let breakdown = aggregate_breakdown(&[]);
        let rates = RateTable::from_rates(&[]);
        assert!(breakdown.is_empty());
        assert_eq!(compute_total(&breakdown, &rates), 0.0);
    }

    #[test]
    fn test_invoice_number_format() {
        let number = generate_invoice_number();
        assert!(number.starts_with("INV-"));
        let parts: Vec<&str> = number.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1].len(), 6); // YYYYMM
        assert_eq!(parts[2].len(), 6);
    }
}
