//! 数据库表结构

use crate::connection::DatabasePool;
use telerad_core::{Result, TeleradError};

/// 创建全部数据库表
pub async fn create_tables(db: &DatabasePool) -> Result<()> {
    let pool = db.pool();

    // 用户表
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS users (
            id UUID PRIMARY KEY,
            email VARCHAR(255) UNIQUE NOT NULL,
            name VARCHAR(255) NOT NULL,
            role VARCHAR(20) NOT NULL,
            centre_id UUID,
            phone VARCHAR(32),
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
        )
    "#).execute(pool).await.map_err(|e| TeleradError::Database(e.to_string()))?;

    // 诊断中心表
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS centres (
            id UUID PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            address TEXT NOT NULL,
            phone VARCHAR(32) NOT NULL,
            email VARCHAR(255) NOT NULL,
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
        )
    "#).execute(pool).await.map_err(|e| TeleradError::Database(e.to_string()))?;

    // 检查表
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS studies (
            id UUID PRIMARY KEY,
            display_id VARCHAR(8) UNIQUE NOT NULL,
            patient_name VARCHAR(255) NOT NULL,
            patient_age INTEGER NOT NULL,
            patient_gender VARCHAR(16) NOT NULL,
            modality VARCHAR(32) NOT NULL,
            centre_id UUID NOT NULL,
            technician_id UUID NOT NULL,
            radiologist_id UUID,
            status VARCHAR(20) NOT NULL DEFAULT 'pending',
            notes TEXT,
            file_refs UUID[] NOT NULL DEFAULT '{}',
            uploaded_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
            ai_report_id UUID,
            final_report_id UUID,
            is_draft BOOLEAN NOT NULL DEFAULT FALSE,
            delete_requested BOOLEAN NOT NULL DEFAULT FALSE,
            delete_requested_by UUID,
            delete_requested_at TIMESTAMP WITH TIME ZONE
        )
    "#).execute(pool).await.map_err(|e| TeleradError::Database(e.to_string()))?;

    // 检查文件表（文件内容本体，检查通过file_refs引用）
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS study_files (
            id UUID PRIMARY KEY,
            study_id UUID NOT NULL,
            file_name VARCHAR(512) NOT NULL,
            content_type VARCHAR(128) NOT NULL,
            file_size BIGINT NOT NULL,
            content BYTEA NOT NULL,
            uploaded_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
        )
    "#).execute(pool).await.map_err(|e| TeleradError::Database(e.to_string()))?;

    // AI报告表
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS ai_reports (
            id UUID PRIMARY KEY,
            study_id UUID NOT NULL,
            findings TEXT NOT NULL,
            preliminary_diagnosis TEXT NOT NULL,
            confidence_score DOUBLE PRECISION NOT NULL,
            model_version VARCHAR(64) NOT NULL,
            generated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
        )
    "#).execute(pool).await.map_err(|e| TeleradError::Database(e.to_string()))?;

    // 最终报告表（与已完成检查一对一）
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS final_reports (
            id UUID PRIMARY KEY,
            study_id UUID UNIQUE NOT NULL,
            radiologist_id UUID NOT NULL,
            findings TEXT NOT NULL,
            diagnosis TEXT NOT NULL,
            recommendations TEXT,
            approved_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
        )
    "#).execute(pool).await.map_err(|e| TeleradError::Database(e.to_string()))?;

    // 报告修订表（只追加）
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS report_revisions (
            id UUID PRIMARY KEY,
            report_id UUID NOT NULL,
            findings TEXT NOT NULL,
            diagnosis TEXT NOT NULL,
            recommendations TEXT,
            edited_by UUID NOT NULL,
            edited_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
        )
    "#).execute(pool).await.map_err(|e| TeleradError::Database(e.to_string()))?;

    // 费率表
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS billing_rates (
            id UUID PRIMARY KEY,
            modality VARCHAR(32) NOT NULL,
            base_rate DOUBLE PRECISION NOT NULL,
            currency VARCHAR(8) NOT NULL,
            description TEXT,
            created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
            UNIQUE (modality, currency)
        )
    "#).execute(pool).await.map_err(|e| TeleradError::Database(e.to_string()))?;

    // 账单表，(centre_id, period_start, period_end) 唯一保证同一账期幂等
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS invoices (
            id UUID PRIMARY KEY,
            invoice_number VARCHAR(32) UNIQUE NOT NULL,
            centre_id UUID NOT NULL,
            period_start TIMESTAMP WITH TIME ZONE NOT NULL,
            period_end TIMESTAMP WITH TIME ZONE NOT NULL,
            study_breakdown JSONB NOT NULL DEFAULT '{}',
            total_amount DOUBLE PRECISION NOT NULL,
            currency VARCHAR(8) NOT NULL,
            status VARCHAR(20) NOT NULL DEFAULT 'pending',
            generated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
            paid_at TIMESTAMP WITH TIME ZONE,
            UNIQUE (centre_id, period_start, period_end)
        )
    "#).execute(pool).await.map_err(|e| TeleradError::Database(e.to_string()))?;

    // 支付流水表
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS payment_transactions (
            id UUID PRIMARY KEY,
            session_id VARCHAR(255) UNIQUE NOT NULL,
            invoice_id UUID NOT NULL,
            amount DOUBLE PRECISION NOT NULL,
            currency VARCHAR(8) NOT NULL,
            payment_status VARCHAR(20) NOT NULL DEFAULT 'initiated',
            created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
        )
    "#).execute(pool).await.map_err(|e| TeleradError::Database(e.to_string()))?;

    // 创建索引以优化查询性能
    create_indexes(db).await?;

    tracing::info!("Database tables created successfully");
    Ok(())
}

/// 创建数据库索引
async fn create_indexes(db: &DatabasePool) -> Result<()> {
    let pool = db.pool();

    let indexes = vec![
        "CREATE INDEX IF NOT EXISTS idx_studies_display_id ON studies(display_id)",
        "CREATE INDEX IF NOT EXISTS idx_studies_centre_id ON studies(centre_id)",
        "CREATE INDEX IF NOT EXISTS idx_studies_technician_id ON studies(technician_id)",
        "CREATE INDEX IF NOT EXISTS idx_studies_radiologist_id ON studies(radiologist_id)",
        "CREATE INDEX IF NOT EXISTS idx_studies_status ON studies(status)",
        "CREATE INDEX IF NOT EXISTS idx_studies_uploaded_at ON studies(uploaded_at)",
        "CREATE INDEX IF NOT EXISTS idx_study_files_study_id ON study_files(study_id)",
        "CREATE INDEX IF NOT EXISTS idx_ai_reports_study_id ON ai_reports(study_id)",
        "CREATE INDEX IF NOT EXISTS idx_final_reports_study_id ON final_reports(study_id)",
        "CREATE INDEX IF NOT EXISTS idx_report_revisions_report_id ON report_revisions(report_id)",
        "CREATE INDEX IF NOT EXISTS idx_invoices_centre_id ON invoices(centre_id)",
        "CREATE INDEX IF NOT EXISTS idx_payment_transactions_invoice_id ON payment_transactions(invoice_id)",
        "CREATE INDEX IF NOT EXISTS idx_payment_transactions_session_id ON payment_transactions(session_id)",
    ];

    for index_sql in indexes {
        sqlx::query(index_sql)
            .execute(pool)
            .await
            .map_err(|e| TeleradError::Database(e.to_string()))?;
    }

    tracing::info!("Database indexes created successfully");
    Ok(())
}
