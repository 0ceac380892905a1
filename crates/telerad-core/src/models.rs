//! 核心数据模型定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// 用户角色
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// 管理员 - 平台级管理权限
    Admin,
    /// 诊断中心账号 - 管理本中心人员与删除审批
    Centre,
    /// 临床医生 - 仅查看权限
    Doctor,
    /// 技师 - 上传检查
    Technician,
    /// 放射科医生 - 诊断报告权限
    Radiologist,
    /// 患者 - 仅查看本人检查
    Patient,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Centre => "centre",
            Self::Doctor => "doctor",
            Self::Technician => "technician",
            Self::Radiologist => "radiologist",
            Self::Patient => "patient",
        }
    }
}

impl TryFrom<&str> for Role {
    type Error = crate::TeleradError;

    fn try_from(value: &str) -> crate::Result<Self> {
        match value {
            "admin" => Ok(Self::Admin),
            "centre" => Ok(Self::Centre),
            "doctor" => Ok(Self::Doctor),
            "technician" => Ok(Self::Technician),
            "radiologist" => Ok(Self::Radiologist),
            "patient" => Ok(Self::Patient),
            _ => Err(crate::TeleradError::Validation(format!(
                "Unknown role: {}",
                value
            ))),
        }
    }
}

/// 用户信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub centre_id: Option<Uuid>,
    pub phone: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// 诊断中心
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticCentre {
    pub id: Uuid,
    pub name: String,
    pub address: String,
    pub phone: String,
    pub email: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// 检查状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StudyStatus {
    Pending,       // 待分配
    Assigned,      // 已分配
    Completed,     // 已出最终报告
    Draft,         // 草稿
    DeleteRequested, // 已申请删除
}

impl StudyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::Completed => "completed",
            Self::Draft => "draft",
            Self::DeleteRequested => "delete_requested",
        }
    }
}

impl TryFrom<&str> for StudyStatus {
    type Error = crate::TeleradError;

    fn try_from(value: &str) -> crate::Result<Self> {
        match value {
            "pending" => Ok(Self::Pending),
            "assigned" => Ok(Self::Assigned),
            "completed" => Ok(Self::Completed),
            "draft" => Ok(Self::Draft),
            "delete_requested" => Ok(Self::DeleteRequested),
            _ => Err(crate::TeleradError::Validation(format!(
                "Unknown study status: {}",
                value
            ))),
        }
    }
}

/// 影像检查
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Study {
    pub id: Uuid,
    pub display_id: String, // 8位大写字母数字组合，面向用户的全局唯一编号
    pub patient_name: String,
    pub patient_age: i32,
    pub patient_gender: String,
    pub modality: String, // 检查设备类型 (CT, MRI, X-ray等)
    pub centre_id: Uuid,
    pub technician_id: Uuid,
    pub radiologist_id: Option<Uuid>,
    pub status: StudyStatus,
    pub notes: Option<String>,
    pub file_refs: Vec<Uuid>,
    pub uploaded_at: DateTime<Utc>,
    pub ai_report_id: Option<Uuid>,
    pub final_report_id: Option<Uuid>,
    pub is_draft: bool,
    pub delete_requested: bool,
    pub delete_requested_by: Option<Uuid>,
    pub delete_requested_at: Option<DateTime<Utc>>,
}

/// AI初步报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiReport {
    pub id: Uuid,
    pub study_id: Uuid,
    pub findings: String,
    pub preliminary_diagnosis: String,
    pub confidence_score: f64,
    pub model_version: String,
    pub generated_at: DateTime<Utc>,
}

/// 最终诊断报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalReport {
    pub id: Uuid,
    pub study_id: Uuid,
    pub radiologist_id: Uuid,
    pub findings: String,
    pub diagnosis: String,
    pub recommendations: Option<String>,
    pub approved_at: DateTime<Utc>,
}

/// 报告修订记录
///
/// 每次编辑最终报告时追加一条，保存编辑前的内容，只追加不修改。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRevision {
    pub id: Uuid,
    pub report_id: Uuid,
    pub findings: String,
    pub diagnosis: String,
    pub recommendations: Option<String>,
    pub edited_by: Uuid,
    pub edited_at: DateTime<Utc>,
}

/// 计费费率
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingRate {
    pub id: Uuid,
    pub modality: String,
    pub base_rate: f64,
    pub currency: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 账单状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Pending,
    Paid,
    Overdue,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Overdue => "overdue",
        }
    }
}

impl TryFrom<&str> for InvoiceStatus {
    type Error = crate::TeleradError;

    fn try_from(value: &str) -> crate::Result<Self> {
        match value {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "overdue" => Ok(Self::Overdue),
            _ => Err(crate::TeleradError::Validation(format!(
                "Unknown invoice status: {}",
                value
            ))),
        }
    }
}

/// 账单
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub invoice_number: String,
    pub centre_id: Uuid,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub study_breakdown: HashMap<String, i64>, // 按设备类型统计的检查数量
    pub total_amount: f64,
    pub currency: String,
    pub status: InvoiceStatus,
    pub generated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

/// 支付状态
///
/// 状态构成单调格: initiated < pending < {paid, failed, expired}，
/// 其中 paid/failed/expired 为互斥的终态。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Initiated,
    Pending,
    Paid,
    Failed,
    Expired,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Expired => "expired",
        }
    }

    /// 状态在格上的高度，用于禁止状态回退
    pub fn rank(&self) -> u8 {
        match self {
            Self::Initiated => 0,
            Self::Pending => 1,
            Self::Paid | Self::Failed | Self::Expired => 2,
        }
    }

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        self.rank() == 2
    }
}

impl TryFrom<&str> for PaymentStatus {
    type Error = crate::TeleradError;

    fn try_from(value: &str) -> crate::Result<Self> {
        match value {
            "initiated" => Ok(Self::Initiated),
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            "expired" => Ok(Self::Expired),
            _ => Err(crate::TeleradError::Validation(format!(
                "Unknown payment status: {}",
                value
            ))),
        }
    }
}

/// 支付流水
///
/// 一条流水只属于一个账单；一个账单在重试场景下可以累积多条流水，
/// 但最多只有一条可以把账单置为已支付。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: Uuid,
    pub session_id: String, // 外部网关分配的会话标识
    pub invoice_id: Uuid,
    pub amount: f64,
    pub currency: String,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_status_lattice() {
        assert!(PaymentStatus::Initiated.rank() < PaymentStatus::Pending.rank());
        assert!(PaymentStatus::Pending.rank() < PaymentStatus::Paid.rank());
        assert_eq!(PaymentStatus::Paid.rank(), PaymentStatus::Failed.rank());
        assert_eq!(PaymentStatus::Paid.rank(), PaymentStatus::Expired.rank());

        assert!(PaymentStatus::Paid.is_terminal());
        assert!(PaymentStatus::Failed.is_terminal());
        assert!(PaymentStatus::Expired.is_terminal());
        assert!(!PaymentStatus::Initiated.is_terminal());
        assert!(!PaymentStatus::Pending.is_terminal());
    }

    #[test]
    fn test_status_string_round_trip() {
        for status in [
            StudyStatus::Pending,
            StudyStatus::Assigned,
            StudyStatus::Completed,
            StudyStatus::Draft,
            StudyStatus::DeleteRequested,
        ] {
            assert_eq!(StudyStatus::try_from(status.as_str()).unwrap(), status);
        }

        assert!(PaymentStatus::try_from("unknown").is_err());
        assert!(Role::try_from("superuser").is_err());
    }
}
