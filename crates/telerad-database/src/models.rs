//! 数据库模型

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use telerad_core::models::*;
use uuid::Uuid;

// 数据库表模型 - 使用FromRow trait用于SQL查询

/// 数据库用户表
#[derive(Debug, FromRow)]
pub struct DbUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: String, // 存储为字符串，转换为Role枚举
    pub centre_id: Option<Uuid>,
    pub phone: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<DbUser> for User {
    fn from(db: DbUser) -> Self {
        User {
            id: db.id,
            email: db.email,
            name: db.name,
            role: Role::try_from(db.role.as_str()).unwrap_or(Role::Patient),
            centre_id: db.centre_id,
            phone: db.phone,
            is_active: db.is_active,
            created_at: db.created_at,
        }
    }
}

/// 数据库诊断中心表
#[derive(Debug, FromRow)]
pub struct DbCentre {
    pub id: Uuid,
    pub name: String,
    pub address: String,
    pub phone: String,
    pub email: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<DbCentre> for DiagnosticCentre {
    fn from(db: DbCentre) -> Self {
        DiagnosticCentre {
            id: db.id,
            name: db.name,
            address: db.address,
            phone: db.phone,
            email: db.email,
            is_active: db.is_active,
            created_at: db.created_at,
        }
    }
}

/// 数据库检查表
#[derive(Debug, FromRow)]
pub struct DbStudy {
    pub id: Uuid,
    pub display_id: String,
    pub patient_name: String,
    pub patient_age: i32,
    pub patient_gender: String,
    pub modality: String,
    pub centre_id: Uuid,
    pub technician_id: Uuid,
    pub radiologist_id: Option<Uuid>,
    pub status: String, // 存储为字符串，转换为StudyStatus枚举
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

impl From<DbStudy> for Study {
    fn from(db: DbStudy) -> Self {
        Study {
            id: db.id,
            display_id: db.display_id,
            patient_name: db.patient_name,
            patient_age: db.patient_age,
            patient_gender: db.patient_gender,
            modality: db.modality,
            centre_id: db.centre_id,
            technician_id: db.technician_id,
            radiologist_id: db.radiologist_id,
            status: StudyStatus::try_from(db.status.as_str()).unwrap_or(StudyStatus::Pending),
            notes: db.notes,
            file_refs: db.file_refs,
            uploaded_at: db.uploaded_at,
            ai_report_id: db.ai_report_id,
            final_report_id: db.final_report_id,
            is_draft: db.is_draft,
            delete_requested: db.delete_requested,
            delete_requested_by: db.delete_requested_by,
            delete_requested_at: db.delete_requested_at,
        }
    }
}

/// 数据库AI报告表
#[derive(Debug, FromRow)]
pub struct DbAiReport {
    pub id: Uuid,
    pub study_id: Uuid,
    pub findings: String,
    pub preliminary_diagnosis: String,
    pub confidence_score: f64,
    pub model_version: String,
    pub generated_at: DateTime<Utc>,
}

impl From<DbAiReport> for AiReport {
    fn from(db: DbAiReport) -> Self {
        AiReport {
            id: db.id,
            study_id: db.study_id,
            findings: db.findings,
            preliminary_diagnosis: db.preliminary_diagnosis,
            confidence_score: db.confidence_score,
            model_version: db.model_version,
            generated_at: db.generated_at,
        }
    }
}

/// 数据库最终报告表
#[derive(Debug, FromRow)]
pub struct DbFinalReport {
    pub id: Uuid,
    pub study_id: Uuid,
    pub radiologist_id: Uuid,
    pub findings: String,
    pub diagnosis: String,
    pub recommendations: Option<String>,
    pub approved_at: DateTime<Utc>,
}

impl From<DbFinalReport> for FinalReport {
    fn from(db: DbFinalReport) -> Self {
        FinalReport {
            id: db.id,
            study_id: db.study_id,
            radiologist_id: db.radiologist_id,
            findings: db.findings,
            diagnosis: db.diagnosis,
            recommendations: db.recommendations,
            approved_at: db.approved_at,
        }
    }
}

/// 数据库报告修订表
#[derive(Debug, FromRow)]
pub struct DbReportRevision {
    pub id: Uuid,
    pub report_id: Uuid,
    pub findings: String,
    pub diagnosis: String,
    pub recommendations: Option<String>,
    pub edited_by: Uuid,
    pub edited_at: DateTime<Utc>,
}

impl From<DbReportRevision> for ReportRevision {
    fn from(db: DbReportRevision) -> Self {
        ReportRevision {
            id: db.id,
            report_id: db.report_id,
            findings: db.findings,
            diagnosis: db.diagnosis,
            recommendations: db.recommendations,
            edited_by: db.edited_by,
            edited_at: db.edited_at,
        }
    }
}

/// 数据库费率表
#[derive(Debug, FromRow)]
pub struct DbBillingRate {
    pub id: Uuid,
    pub modality: String,
    pub base_rate: f64,
    pub currency: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbBillingRate> for BillingRate {
    fn from(db: DbBillingRate) -> Self {
        BillingRate {
            id: db.id,
            modality: db.modality,
            base_rate: db.base_rate,
            currency: db.currency,
            description: db.description,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

/// 数据库账单表
#[derive(Debug, FromRow)]
pub struct DbInvoice {
    pub id: Uuid,
    pub invoice_number: String,
    pub centre_id: Uuid,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub study_breakdown: serde_json::Value, // JSONB: 设备类型 -> 数量
    pub total_amount: f64,
    pub currency: String,
    pub status: String,
    pub generated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl From<DbInvoice> for Invoice {
    fn from(db: DbInvoice) -> Self {
        Invoice {
            id: db.id,
            invoice_number: db.invoice_number,
            centre_id: db.centre_id,
            period_start: db.period_start,
            period_end: db.period_end,
            study_breakdown: serde_json::from_value(db.study_breakdown).unwrap_or_default(),
            total_amount: db.total_amount,
            currency: db.currency,
            status: InvoiceStatus::try_from(db.status.as_str()).unwrap_or(InvoiceStatus::Pending),
            generated_at: db.generated_at,
            paid_at: db.paid_at,
        }
    }
}

/// 数据库支付流水表
#[derive(Debug, FromRow)]
pub struct DbPaymentTransaction {
    pub id: Uuid,
    pub session_id: String,
    pub invoice_id: Uuid,
    pub amount: f64,
    pub currency: String,
    pub payment_status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbPaymentTransaction> for PaymentTransaction {
    fn from(db: DbPaymentTransaction) -> Self {
        PaymentTransaction {
            id: db.id,
            session_id: db.session_id,
            invoice_id: db.invoice_id,
            amount: db.amount,
            currency: db.currency,
            payment_status: PaymentStatus::try_from(db.payment_status.as_str())
                .unwrap_or(PaymentStatus::Initiated),
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

// 插入模型 - 用于创建新记录

/// 新检查插入模型
#[derive(Debug)]
pub struct NewStudy {
    pub id: Uuid,
    pub display_id: String,
    pub patient_name: String,
    pub patient_age: i32,
    pub patient_gender: String,
    pub modality: String,
    pub centre_id: Uuid,
    pub technician_id: Uuid,
    pub notes: Option<String>,
}

/// 新AI报告插入模型
#[derive(Debug)]
pub struct NewAiReport {
    pub id: Uuid,
    pub findings: String,
    pub preliminary_diagnosis: String,
    pub confidence_score: f64,
    pub model_version: String,
}

/// 新最终报告插入模型
#[derive(Debug)]
pub struct NewFinalReport {
    pub id: Uuid,
    pub study_id: Uuid,
    pub radiologist_id: Uuid,
    pub findings: String,
    pub diagnosis: String,
    pub recommendations: Option<String>,
}

/// 新检查文件插入模型
#[derive(Debug)]
pub struct NewStudyFile {
    pub id: Uuid,
    pub file_name: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

/// 新费率插入模型
#[derive(Debug)]
pub struct NewBillingRate {
    pub id: Uuid,
    pub modality: String,
    pub base_rate: f64,
    pub currency: String,
    pub description: Option<String>,
}

/// 新账单插入模型
#[derive(Debug)]
pub struct NewInvoice {
    pub id: Uuid,
    pub invoice_number: String,
    pub centre_id: Uuid,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub study_breakdown: serde_json::Value,
    pub total_amount: f64,
    pub currency: String,
}

/// 新支付流水插入模型
#[derive(Debug)]
pub struct NewPaymentTransaction {
    pub id: Uuid,
    pub session_id: String,
    pub invoice_id: Uuid,
    pub amount: f64,
    pub currency: String,
}
