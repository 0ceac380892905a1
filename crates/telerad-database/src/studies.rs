//! 检查相关数据库操作
//!
//! 单个检查上的状态转换全部通过条件更新串行化（WHERE中带上期望的当前状态），
//! 不同检查之间的操作完全独立。

use crate::connection::DatabasePool;
use crate::models::*;
use telerad_core::{
    AiReport, FinalReport, ReportRevision, Result, Study, StudyStatus, TeleradError, User,
};
use uuid::Uuid;

/// 检查列表排序方式
///
/// 排序是查询接口的显式参数，不依赖插入顺序。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListOrder {
    UploadedAtDesc,
    UploadedAtAsc,
}

impl ListOrder {
    fn as_sql(&self) -> &'static str {
        match self {
            Self::UploadedAtDesc => "uploaded_at DESC",
            Self::UploadedAtAsc => "uploaded_at ASC",
        }
    }
}

/// 检查列表过滤条件
#[derive(Debug, Clone, Default)]
pub struct StudyFilter {
    pub status: Option<StudyStatus>,
    pub centre_id: Option<Uuid>,
    pub technician_id: Option<Uuid>,
    pub radiologist_id: Option<Uuid>,
}

/// 检查数据查询接口
pub struct StudyQueries<'a> {
    pool: &'a DatabasePool,
}

impl<'a> StudyQueries<'a> {
    pub fn new(pool: &'a DatabasePool) -> Self {
        Self { pool }
    }

    // ========== 检查相关操作 ==========

    /// 检查编号是否已被占用
    pub async fn display_id_exists(&self, display_id: &str) -> Result<bool> {
        let row: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM studies WHERE display_id = $1")
                .bind(display_id)
                .fetch_optional(self.pool.pool())
                .await
                .map_err(|e| TeleradError::Database(e.to_string()))?;
        Ok(row.is_some())
    }

    /// 创建检查及其附属记录（AI报告 + 文件），全部成功或全部失败
    pub async fn insert_study_with_artifacts(
        &self,
        study: &NewStudy,
        ai_report: &NewAiReport,
        files: &[NewStudyFile],
    ) -> Result<Study> {
        let mut tx = self
            .pool
            .pool()
            .begin()
            .await
            .map_err(|e| TeleradError::Database(e.to_string()))?;

        sqlx::query(r#"
            INSERT INTO ai_reports (id, study_id, findings, preliminary_diagnosis, confidence_score, model_version)
            VALUES ($1, $2, $3, $4, $5, $6)
        "#)
        .bind(ai_report.id)
        .bind(study.id)
        .bind(&ai_report.findings)
        .bind(&ai_report.preliminary_diagnosis)
        .bind(ai_report.confidence_score)
        .bind(&ai_report.model_version)
        .execute(&mut *tx)
        .await
        .map_err(|e| TeleradError::Database(e.to_string()))?;

        let mut file_refs = Vec::with_capacity(files.len());
        for file in files {
            sqlx::query(r#"
                INSERT INTO study_files (id, study_id, file_name, content_type, file_size, content)
                VALUES ($1, $2, $3, $4, $5, $6)
            "#)
            .bind(file.id)
            .bind(study.id)
            .bind(&file.file_name)
            .bind(&file.content_type)
            .bind(file.content.len() as i64)
            .bind(&file.content)
            .execute(&mut *tx)
            .await
            .map_err(|e| TeleradError::Database(e.to_string()))?;
            file_refs.push(file.id);
        }

        let db_study = sqlx::query_as::<_, DbStudy>(r#"
            INSERT INTO studies (id, display_id, patient_name, patient_age, patient_gender,
                                 modality, centre_id, technician_id, status, notes,
                                 file_refs, ai_report_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending', $9, $10, $11)
            RETURNING *
        "#)
        .bind(study.id)
        .bind(&study.display_id)
        .bind(&study.patient_name)
        .bind(study.patient_age)
        .bind(&study.patient_gender)
        .bind(&study.modality)
        .bind(study.centre_id)
        .bind(study.technician_id)
        .bind(&study.notes)
        .bind(&file_refs)
        .bind(ai_report.id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| TeleradError::Database(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| TeleradError::Database(e.to_string()))?;

        Ok(Study::from(db_study))
    }

    /// 根据检查编号查找检查
    pub async fn get_by_display_id(&self, display_id: &str) -> Result<Option<Study>> {
        let result = sqlx::query_as::<_, DbStudy>(
            "SELECT * FROM studies WHERE display_id = $1"
        )
        .bind(display_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| TeleradError::Database(e.to_string()))?;

        Ok(result.map(Study::from))
    }

    /// 按条件列出检查
    pub async fn list(&self, filter: &StudyFilter, order: ListOrder, limit: i64) -> Result<Vec<Study>> {
        let sql = format!(
            r#"
            SELECT * FROM studies
            WHERE ($1::varchar IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR centre_id = $2)
              AND ($3::uuid IS NULL OR technician_id = $3)
              AND ($4::uuid IS NULL OR radiologist_id = $4)
            ORDER BY {}
            LIMIT $5
            "#,
            order.as_sql()
        );

        let results = sqlx::query_as::<_, DbStudy>(&sql)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.centre_id)
            .bind(filter.technician_id)
            .bind(filter.radiologist_id)
            .bind(limit)
            .fetch_all(self.pool.pool())
            .await
            .map_err(|e| TeleradError::Database(e.to_string()))?;

        Ok(results.into_iter().map(Study::from).collect())
    }

    /// 认领检查: 设置放射科医生并置为assigned
    ///
    /// 条件更新，仅当检查仍处于期望状态时生效。返回是否更新成功。
    pub async fn assign(
        &self,
        display_id: &str,
        radiologist_id: Uuid,
        expected: StudyStatus,
    ) -> Result<bool> {
        let result = sqlx::query(r#"
            UPDATE studies SET radiologist_id = $2, status = 'assigned'
            WHERE display_id = $1 AND status = $3
        "#)
        .bind(display_id)
        .bind(radiologist_id)
        .bind(expected.as_str())
        .execute(self.pool.pool())
        .await
        .map_err(|e| TeleradError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// 标记/取消草稿状态
    pub async fn set_draft(
        &self,
        display_id: &str,
        is_draft: bool,
        expected: StudyStatus,
        next: StudyStatus,
    ) -> Result<bool> {
        let result = sqlx::query(r#"
            UPDATE studies SET is_draft = $2, status = $3
            WHERE display_id = $1 AND status = $4
        "#)
        .bind(display_id)
        .bind(is_draft)
        .bind(next.as_str())
        .bind(expected.as_str())
        .execute(self.pool.pool())
        .await
        .map_err(|e| TeleradError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// 申请删除: 打删除标记并记录申请人和时间，状态本身不变
    pub async fn request_delete(&self, display_id: &str, requested_by: Uuid) -> Result<bool> {
        let result = sqlx::query(r#"
            UPDATE studies
            SET delete_requested = TRUE, delete_requested_by = $2, delete_requested_at = NOW()
            WHERE display_id = $1 AND delete_requested = FALSE
        "#)
        .bind(display_id)
        .bind(requested_by)
        .execute(self.pool.pool())
        .await
        .map_err(|e| TeleradError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// 驳回删除申请: 仅清除删除标记，不恢复任何状态快照
    pub async fn reject_delete(&self, display_id: &str) -> Result<bool> {
        let result = sqlx::query(r#"
            UPDATE studies
            SET delete_requested = FALSE, delete_requested_by = NULL, delete_requested_at = NULL
            WHERE display_id = $1 AND delete_requested = TRUE
        "#)
        .bind(display_id)
        .execute(self.pool.pool())
        .await
        .map_err(|e| TeleradError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// 审批删除: 在一个事务中删除检查、文件、AI报告、最终报告及其修订记录
    ///
    /// 全部删除或全部保留；若删除标记已被并发清除则整体回滚。
    pub async fn approve_delete(&self, study_id: Uuid) -> Result<bool> {
        let mut tx = self
            .pool
            .pool()
            .begin()
            .await
            .map_err(|e| TeleradError::Database(e.to_string()))?;

        sqlx::query(r#"
            DELETE FROM report_revisions
            WHERE report_id IN (SELECT id FROM final_reports WHERE study_id = $1)
        "#)
        .bind(study_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| TeleradError::Database(e.to_string()))?;

        sqlx::query("DELETE FROM final_reports WHERE study_id = $1")
            .bind(study_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| TeleradError::Database(e.to_string()))?;

        sqlx::query("DELETE FROM ai_reports WHERE study_id = $1")
            .bind(study_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| TeleradError::Database(e.to_string()))?;

        sqlx::query("DELETE FROM study_files WHERE study_id = $1")
            .bind(study_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| TeleradError::Database(e.to_string()))?;

        let result = sqlx::query(
            "DELETE FROM studies WHERE id = $1 AND delete_requested = TRUE"
        )
        .bind(study_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| TeleradError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| TeleradError::Database(e.to_string()))?;
            return Ok(false);
        }

        tx.commit()
            .await
            .map_err(|e| TeleradError::Database(e.to_string()))?;
        Ok(true)
    }

    // ========== 报告相关操作 ==========

    /// 获取检查的AI初步报告
    pub async fn get_ai_report(&self, study_id: Uuid) -> Result<Option<AiReport>> {
        let result = sqlx::query_as::<_, DbAiReport>(
            "SELECT * FROM ai_reports WHERE study_id = $1"
        )
        .bind(study_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| TeleradError::Database(e.to_string()))?;

        Ok(result.map(AiReport::from))
    }

    /// 获取检查的最终报告
    pub async fn get_final_report(&self, study_id: Uuid) -> Result<Option<FinalReport>> {
        let result = sqlx::query_as::<_, DbFinalReport>(
            "SELECT * FROM final_reports WHERE study_id = $1"
        )
        .bind(study_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| TeleradError::Database(e.to_string()))?;

        Ok(result.map(FinalReport::from))
    }

    /// 创建最终报告并把检查置为completed，同一事务内完成
    pub async fn complete_with_final_report(
        &self,
        report: &NewFinalReport,
        expected: StudyStatus,
    ) -> Result<Option<FinalReport>> {
        let mut tx = self
            .pool
            .pool()
            .begin()
            .await
            .map_err(|e| TeleradError::Database(e.to_string()))?;

        let db_report = sqlx::query_as::<_, DbFinalReport>(r#"
            INSERT INTO final_reports (id, study_id, radiologist_id, findings, diagnosis, recommendations)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
        "#)
        .bind(report.id)
        .bind(report.study_id)
        .bind(report.radiologist_id)
        .bind(&report.findings)
        .bind(&report.diagnosis)
        .bind(&report.recommendations)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| TeleradError::Database(e.to_string()))?;

        let result = sqlx::query(r#"
            UPDATE studies SET final_report_id = $2, status = 'completed'
            WHERE id = $1 AND status = $3
        "#)
        .bind(report.study_id)
        .bind(report.id)
        .bind(expected.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| TeleradError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| TeleradError::Database(e.to_string()))?;
            return Ok(None);
        }

        tx.commit()
            .await
            .map_err(|e| TeleradError::Database(e.to_string()))?;
        Ok(Some(FinalReport::from(db_report)))
    }

    /// 编辑最终报告: 先把当前内容追加到修订表，再覆盖字段
    ///
    /// 行锁 + 单事务，保证修订记录与覆盖内容一致。
    pub async fn edit_final_report(
        &self,
        study_id: Uuid,
        findings: &str,
        diagnosis: &str,
        recommendations: Option<&str>,
        edited_by: Uuid,
    ) -> Result<Option<FinalReport>> {
        let mut tx = self
            .pool
            .pool()
            .begin()
            .await
            .map_err(|e| TeleradError::Database(e.to_string()))?;

        let current = sqlx::query_as::<_, DbFinalReport>(
            "SELECT * FROM final_reports WHERE study_id = $1 FOR UPDATE"
        )
        .bind(study_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| TeleradError::Database(e.to_string()))?;

        let Some(current) = current else {
            tx.rollback()
                .await
                .map_err(|e| TeleradError::Database(e.to_string()))?;
            return Ok(None);
        };

        sqlx::query(r#"
            INSERT INTO report_revisions (id, report_id, findings, diagnosis, recommendations, edited_by)
            VALUES ($1, $2, $3, $4, $5, $6)
        "#)
        .bind(Uuid::new_v4())
        .bind(current.id)
        .bind(&current.findings)
        .bind(&current.diagnosis)
        .bind(&current.recommendations)
        .bind(edited_by)
        .execute(&mut *tx)
        .await
        .map_err(|e| TeleradError::Database(e.to_string()))?;

        let updated = sqlx::query_as::<_, DbFinalReport>(r#"
            UPDATE final_reports
            SET findings = $2, diagnosis = $3, recommendations = $4
            WHERE id = $1
            RETURNING *
        "#)
        .bind(current.id)
        .bind(findings)
        .bind(diagnosis)
        .bind(recommendations)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| TeleradError::Database(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| TeleradError::Database(e.to_string()))?;
        Ok(Some(FinalReport::from(updated)))
    }

    /// 获取报告的全部修订记录，按时间正序
    pub async fn get_report_revisions(&self, report_id: Uuid) -> Result<Vec<ReportRevision>> {
        let results = sqlx::query_as::<_, DbReportRevision>(
            "SELECT * FROM report_revisions WHERE report_id = $1 ORDER BY edited_at ASC"
        )
        .bind(report_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| TeleradError::Database(e.to_string()))?;

        Ok(results.into_iter().map(ReportRevision::from).collect())
    }

    // ========== 用户相关操作 ==========

    /// 根据ID查找用户
    pub async fn get_user_by_id(&self, user_id: Uuid) -> Result<Option<User>> {
        let result = sqlx::query_as::<_, DbUser>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| TeleradError::Database(e.to_string()))?;

        Ok(result.map(User::from))
    }

    /// 切换用户启用状态，返回新状态
    pub async fn toggle_user_active(&self, user_id: Uuid) -> Result<Option<bool>> {
        let row: Option<(bool,)> = sqlx::query_as(
            "UPDATE users SET is_active = NOT is_active WHERE id = $1 RETURNING is_active"
        )
        .bind(user_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| TeleradError::Database(e.to_string()))?;

        Ok(row.map(|(active,)| active))
    }

    /// 创建诊断中心
    pub async fn insert_centre(
        &self,
        id: Uuid,
        name: &str,
        address: &str,
        phone: &str,
        email: &str,
    ) -> Result<telerad_core::DiagnosticCentre> {
        let db_centre = sqlx::query_as::<_, DbCentre>(r#"
            INSERT INTO centres (id, name, address, phone, email)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
        "#)
        .bind(id)
        .bind(name)
        .bind(address)
        .bind(phone)
        .bind(email)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| TeleradError::Database(e.to_string()))?;

        Ok(telerad_core::DiagnosticCentre::from(db_centre))
    }
}
