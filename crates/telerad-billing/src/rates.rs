//! 费率表
//!
//! 按 (设备类型, 币种) 查询计费费率，未配置的设备类型回退到默认费率。

use std::collections::HashMap;
use telerad_core::BillingRate;

/// 未配置费率时的默认单价
pub const DEFAULT_RATE: f64 = 100.0;

/// 费率查询表
///
/// 由某一币种下的全部费率构建，定价配置本身由外部维护。
#[derive(Debug)]
pub struct RateTable {
    rates: HashMap<String, f64>,
}

impl RateTable {
    /// 从费率记录构建查询表
    pub fn from_rates(rates: &[BillingRate]) -> Self {
        Self {
            rates: rates
                .iter()
                .map(|r| (r.modality.clone(), r.base_rate))
                .collect(),
        }
    }

    /// 查询设备类型的单价，缺省回退到默认费率
    pub fn rate_for(&self, modality: &str) -> f64 {
        self.rates.get(modality).copied().unwrap_or(DEFAULT_RATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

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
    fn test_lookup() {
        let table = RateTable::from_rates(&[rate("CT", 250.0), rate("MRI", 400.0)]);
        assert_eq!(table.rate_for("CT"), 250.0);
        assert_eq!(table.rate_for("MRI"), 400.0);
    }

    #[test]
    fn test_default_fallback() {
        let table = RateTable::from_rates(&[rate("CT", 250.0)]);
        assert_eq!(table.rate_for("Ultrasound"), DEFAULT_RATE);

        let empty = RateTable::from_rates(&[]);
        assert_eq!(empty.rate_for("CT"), DEFAULT_RATE);
    }
}
